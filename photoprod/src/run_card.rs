use crate::error::Result;
use crate::orchestrator::{GenerationSettings, KinematicVariable};
use crate::sampler::SamplerSettings;
use serde::Deserialize;
use serde_yaml;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Run parameters read from a YAML card. Missing fields take their default.
/// Angles are in degrees, energies in GeV.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunCard {
    pub beam_energy: f64,
    pub target: String,
    pub final_state: Vec<String>,
    pub theta_min: f64,
    pub theta_max: f64,
    pub eprime_min: f64,
    pub eprime_max: f64,
    pub n_events: usize,
    pub seed: u64,
    pub safety_factor: f64,
    pub saved_min: usize,
    pub t_weight: bool,
    pub n_t: usize,
    pub reweight_variable: KinematicVariable,
    pub max_iterations: usize,
    pub mass_shape_samples: usize,
    pub mass_shape_bins: usize,
    /// Slope of the `exp(-b|t|)` demo intensity; flat intensity if absent.
    pub t_slope: Option<f64>,
    pub output: String,
}

impl Default for RunCard {
    fn default() -> RunCard {
        RunCard {
            beam_energy: 11.,
            target: "p".to_owned(),
            final_state: vec!["p".to_owned(), "pi+".to_owned(), "pi-".to_owned()],
            theta_min: 2.5,
            theta_max: 4.5,
            eprime_min: 0.5,
            eprime_max: 4.5,
            n_events: 1000,
            seed: 0,
            safety_factor: 2.,
            saved_min: 100,
            t_weight: false,
            n_t: 100000,
            reweight_variable: KinematicVariable::MinusT,
            max_iterations: 10,
            mass_shape_samples: 100000,
            mass_shape_bins: 1000,
            t_slope: None,
            output: "events.lund".to_owned(),
        }
    }
}

impl RunCard {
    pub fn from_file<P: AsRef<Path>>(filename: P) -> Result<RunCard> {
        let f = File::open(filename)?;
        let reader = BufReader::new(f);
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn from_str(card: &str) -> Result<RunCard> {
        Ok(serde_yaml::from_str(card)?)
    }

    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            beam_energy: self.beam_energy,
            theta_min: self.theta_min.to_radians(),
            theta_max: self.theta_max.to_radians(),
            eprime_min: self.eprime_min,
            eprime_max: self.eprime_max,
            mass_shape_samples: self.mass_shape_samples,
            mass_shape_bins: self.mass_shape_bins,
        }
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            safety_factor: self.safety_factor,
            saved_min: self.saved_min,
            n_t: self.n_t,
            max_iterations: self.max_iterations,
            reweight_variable: self.reweight_variable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeneratorError;

    #[test]
    fn test_partial_card_uses_defaults() {
        let card = RunCard::from_str(
            "beam_energy: 10.6\nfinal_state: [p, pi+, pi-]\nt_weight: true\nreweight_variable: q2\n",
        )
        .unwrap();
        assert_eq!(card.beam_energy, 10.6);
        assert_eq!(card.final_state, vec!["p", "pi+", "pi-"]);
        assert!(card.t_weight);
        assert_eq!(card.reweight_variable, KinematicVariable::Q2);
        assert_eq!(card.target, "p");
        assert_eq!(card.n_events, 1000);
        assert!(card.t_slope.is_none());

        let sampler = card.sampler_settings();
        assert!((sampler.theta_max - 4.5f64.to_radians()).abs() < 1e-15);
        assert_eq!(card.generation_settings().saved_min, 100);
    }

    #[test]
    fn test_bad_card() {
        match RunCard::from_str("beam_energy: eleven\n") {
            Err(GeneratorError::RunCard(_)) => {}
            other => panic!("expected run card error, got {:?}", other),
        }
        assert!(RunCard::from_str("beam_energyy: 11\n").is_err());
        assert!(RunCard::from_file("/nonexistent/run_card.yaml").is_err());
    }
}
