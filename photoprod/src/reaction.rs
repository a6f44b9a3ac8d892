use crate::error::{GeneratorError, Result};
use crate::particle::{self, Particle};
use tracing::debug;

/// The reaction `e T -> e' h_1 ... h_n`: the target and the ordered final state.
///
/// The final state always starts with the scattered lepton, followed by the hadrons
/// in the order they were configured. The topology is validated once on construction
/// and is immutable afterwards.
#[derive(Debug, Clone)]
pub struct ReactionTopology {
    target: Particle,
    lepton: Particle,
    hadrons: Vec<Particle>,
}

impl ReactionTopology {
    /// Build the topology for an electron beam on `target`, resolving the hadronic
    /// final state by name.
    ///
    /// Fails if a particle is unknown, if no hadron is given, or if the hadrons do not
    /// carry the target's charge (the exchanged photon is neutral).
    pub fn new<S: AsRef<str>>(target: &str, hadrons: &[S]) -> Result<ReactionTopology> {
        let target = particle::lookup(target)?;
        let lepton = particle::lookup("e-")?;

        if hadrons.is_empty() {
            return Err(GeneratorError::Configuration(
                "The hadronic final state is empty".to_owned(),
            ));
        }

        let hadrons = hadrons
            .iter()
            .map(|name| particle::lookup(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        for h in &hadrons {
            debug!(particle = h.name, mass = h.mass, charge = h.charge, "Particle found in table");
        }

        let net_charge = hadrons.iter().map(|h| h.charge).sum::<i32>() - target.charge;
        if net_charge != 0 {
            return Err(GeneratorError::Configuration(format!(
                "The total charge of the hadronic final state is off by {:+}; it should balance the {} target",
                net_charge, target.name
            )));
        }

        Ok(ReactionTopology {
            target,
            lepton,
            hadrons,
        })
    }

    pub fn target(&self) -> &Particle {
        &self.target
    }

    pub fn lepton(&self) -> &Particle {
        &self.lepton
    }

    pub fn hadrons(&self) -> &[Particle] {
        &self.hadrons
    }

    /// Number of final-state particles, scattered lepton included.
    pub fn len(&self) -> usize {
        self.hadrons.len() + 1
    }

    pub fn hadron_masses(&self) -> Vec<f64> {
        self.hadrons.iter().map(|h| h.mass).collect()
    }

    /// Lower kinematic bound on the invariant mass of the hadronic system.
    pub fn hadron_mass_sum(&self) -> f64 {
        self.hadrons.iter().map(|h| h.mass).sum()
    }

    /// PDG ids of the final state in event order: lepton first, then the hadrons.
    pub fn final_state_pdgs(&self) -> Vec<i32> {
        std::iter::once(self.lepton.pdg)
            .chain(self.hadrons.iter().map(|h| h.pdg))
            .collect()
    }
}
