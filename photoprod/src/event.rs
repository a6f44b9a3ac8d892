use serde::{Deserialize, Serialize};
use std::fmt;
use vector::LorentzVector;

pub const BEAM: usize = 0;
pub const LEPTON: usize = 1;
pub const TARGET: usize = 2;
pub const FIRST_HADRON: usize = 3;

/// One kinematic configuration in canonical order: beam, scattered lepton, target,
/// then the hadrons, plus an event weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicEvent {
    particles: Vec<LorentzVector<f64>>,
    weight: f64,
}

impl KinematicEvent {
    pub fn new(
        beam: LorentzVector<f64>,
        lepton: LorentzVector<f64>,
        target: LorentzVector<f64>,
        hadrons: &[LorentzVector<f64>],
    ) -> KinematicEvent {
        let mut particles = Vec::with_capacity(hadrons.len() + 3);
        particles.push(beam);
        particles.push(lepton);
        particles.push(target);
        particles.extend_from_slice(hadrons);

        KinematicEvent {
            particles,
            weight: 1.,
        }
    }

    pub fn particles(&self) -> &[LorentzVector<f64>] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    pub fn beam(&self) -> &LorentzVector<f64> {
        &self.particles[BEAM]
    }

    pub fn scattered_lepton(&self) -> &LorentzVector<f64> {
        &self.particles[LEPTON]
    }

    pub fn target(&self) -> &LorentzVector<f64> {
        &self.particles[TARGET]
    }

    pub fn hadrons(&self) -> &[LorentzVector<f64>] {
        &self.particles[FIRST_HADRON..]
    }

    /// The outgoing particles only: scattered lepton followed by the hadrons.
    pub fn final_state(&self) -> Vec<LorentzVector<f64>> {
        std::iter::once(self.particles[LEPTON])
            .chain(self.hadrons().iter().cloned())
            .collect()
    }

    /// Sum of outgoing minus incoming four-momenta. Zero up to rounding for a valid event.
    pub fn momentum_imbalance(&self) -> LorentzVector<f64> {
        let outgoing: LorentzVector<f64> = self.final_state().iter().sum();
        outgoing - self.beam() - self.target()
    }

    /// Four-momentum of the exchanged virtual photon.
    pub fn virtual_photon(&self) -> LorentzVector<f64> {
        self.beam() - self.scattered_lepton()
    }

    pub fn q2(&self) -> f64 {
        -self.virtual_photon().square()
    }

    /// Invariant mass of the hadronic recoil system.
    pub fn recoil_mass(&self) -> f64 {
        self.hadrons().iter().sum::<LorentzVector<f64>>().mass()
    }

    /// `-t`, the momentum transfer between the target and the first hadron.
    pub fn minus_t(&self) -> f64 {
        -(self.target() - &self.particles[FIRST_HADRON]).square()
    }
}

impl fmt::Display for KinematicEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " #     E                        p_x                      p_y                      p_z")?;
        for (i, p) in self.particles.iter().enumerate() {
            writeln!(
                f,
                " {}{:25.16e}{:25.16e}{:25.16e}{:25.16e}",
                i + 1,
                p.t,
                p.x,
                p.y,
                p.z
            )?;
        }
        writeln!(f, " weight: {:.16e}", self.weight)
    }
}
