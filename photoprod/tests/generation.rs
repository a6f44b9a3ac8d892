// Integration tests for the generation loop: kinematic windows, the iteration guard,
// batch submission to the oracle and the reweighting stage.

use photoprod::orchestrator::{hit_or_miss, GenerationSettings, GenerationState};
use photoprod::{
    EventOrchestrator, FnIntensity, GeneratorError, IntensityOracle, KinematicEvent, PhaseSpaceSampler,
    ReactionTopology, SamplerSettings, TSlopeIntensity,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::f64::consts::PI;

/// Forwards to an inner oracle and records every batch submitted to it.
struct RecordingOracle<O> {
    inner: O,
    loads: Vec<usize>,
    evaluations: usize,
}

impl<O: IntensityOracle> IntensityOracle for RecordingOracle<O> {
    fn load_batch(&mut self, events: &[KinematicEvent]) {
        self.loads.push(events.len());
        self.inner.load_batch(events);
    }

    fn evaluate(&mut self) -> f64 {
        self.evaluations += 1;
        self.inner.evaluate()
    }

    fn intensity(&self, index: usize) -> f64 {
        self.inner.intensity(index)
    }

    fn batch_len(&self) -> usize {
        self.inner.batch_len()
    }
}

/// Uniform in [0, 1) over the azimuth of the scattered lepton.
fn azimuthal_intensity(event: &KinematicEvent) -> f64 {
    (event.scattered_lepton().phi() + PI) / (2. * PI)
}

fn elastic_sampler() -> PhaseSpaceSampler {
    let topology = ReactionTopology::new("p", &["p"]).unwrap();
    PhaseSpaceSampler::new(
        topology,
        SamplerSettings {
            beam_energy: 11.,
            eprime_max: 11.,
            ..SamplerSettings::default()
        },
    )
    .unwrap()
}

fn two_pion_sampler() -> PhaseSpaceSampler {
    let topology = ReactionTopology::new("p", &["p", "pi+", "pi-"]).unwrap();
    PhaseSpaceSampler::new(
        topology,
        SamplerSettings {
            mass_shape_samples: 20000,
            mass_shape_bins: 500,
            ..SamplerSettings::default()
        },
    )
    .unwrap()
}

fn assert_in_window(sampler: &PhaseSpaceSampler, event: &KinematicEvent) {
    let settings = sampler.settings();
    let lepton = event.scattered_lepton();
    let theta = lepton.theta();
    assert!(theta >= settings.theta_min - 1e-9 && theta <= settings.theta_max + 1e-9);
    assert!(lepton.t >= settings.eprime_min - 1e-9 && lepton.t <= settings.eprime_max + 1e-9);

    let imbalance = event.momentum_imbalance();
    for k in 0..4 {
        assert!(imbalance[k].abs() < 1e-6 * settings.beam_energy);
    }

    let (w_min, w_max) = sampler.physical_w_range();
    let w = event.recoil_mass();
    assert!(w >= w_min - 1e-6 && w <= w_max + 1e-6);
}

#[test]
fn test_single_recoil_scenario() {
    let mut orch = EventOrchestrator::new(
        elastic_sampler(),
        TSlopeIntensity::new(3.),
        GenerationSettings::default(),
        1,
    )
    .unwrap();

    let n = orch.generate(1000).unwrap().len();
    assert!(n >= 1000);
    assert_eq!(orch.state(), GenerationState::Done);
    assert_eq!(orch.generation_history().last().unwrap().accepted, n);

    for event in orch.accepted() {
        assert_in_window(orch.sampler(), event);
        assert_eq!(event.len(), 4);
        assert_eq!(event.weight(), 1.);
    }
}

#[test]
fn test_multi_hadron_generation() {
    let mut orch = EventOrchestrator::new(
        two_pion_sampler(),
        TSlopeIntensity::new(2.),
        GenerationSettings::default(),
        3,
    )
    .unwrap();

    orch.generate(300).unwrap();
    for event in orch.accepted() {
        assert_in_window(orch.sampler(), event);
        assert_eq!(event.hadrons().len(), 3);
    }
}

#[test]
fn test_unbalanced_charge_is_rejected_before_sampling() {
    for hadrons in &[vec!["n"], vec!["p", "pi+"], vec!["p", "pi+", "pi+"]] {
        match ReactionTopology::new("p", hadrons) {
            Err(GeneratorError::Configuration(_)) => {}
            other => panic!("expected configuration error for {:?}, got {:?}", hadrons, other),
        }
    }
}

#[test]
fn test_non_positive_maximum_accepts_none() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut sampler = elastic_sampler();
    let events = (0..100)
        .map(|_| sampler.generate(&mut rng))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    let mut oracle = FnIntensity::new(|_: &KinematicEvent| -1.);
    oracle.load_batch(&events);
    let max = oracle.evaluate();
    assert!(max < 0.);
    assert!(hit_or_miss(&oracle, &mut rng, events.len(), max).is_empty());

    let mut orch = EventOrchestrator::new(
        elastic_sampler(),
        FnIntensity::new(|_: &KinematicEvent| -1.),
        GenerationSettings {
            max_iterations: 2,
            ..GenerationSettings::default()
        },
        5,
    )
    .unwrap();
    match orch.generate(10) {
        Err(GeneratorError::Convergence(_)) => {}
        other => panic!("expected convergence error, got {:?}", other.map(|e| e.len())),
    }
    assert_eq!(orch.state(), GenerationState::Idle);
    assert!(orch.accepted().is_empty());
}

#[test]
fn test_acceptance_rate_is_mean_over_max() {
    let mut rng = StdRng::seed_from_u64(9);
    let mut sampler = elastic_sampler();
    let events = (0..40000)
        .map(|_| sampler.generate(&mut rng))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    let mut oracle = FnIntensity::new(azimuthal_intensity);
    oracle.load_batch(&events);
    let max = oracle.evaluate();
    let mean = (0..events.len()).map(|i| oracle.intensity(i)).sum::<f64>() / events.len() as f64;

    let accepted = hit_or_miss(&oracle, &mut rng, events.len(), max);
    let rate = accepted.len() as f64 / events.len() as f64;
    assert!((rate - mean / max).abs() < 0.01, "rate {} vs {}", rate, mean / max);
}

#[test]
fn test_efficiency_batches_grow_tenfold() {
    let mut orch = EventOrchestrator::new(
        elastic_sampler(),
        FnIntensity::new(|_: &KinematicEvent| 1.),
        GenerationSettings {
            saved_min: 500,
            ..GenerationSettings::default()
        },
        2,
    )
    .unwrap();

    let efficiency = orch.estimate_efficiency(100).unwrap();
    assert_eq!(efficiency, 1.);

    let history = orch.efficiency_history();
    assert_eq!(history.len(), 2);
    for pair in history.windows(2) {
        assert!(pair[1].batch_size >= 10 * pair[0].batch_size);
    }
    assert_eq!(history[0].accepted, 100);
}

#[test]
fn test_whole_batch_is_submitted_each_iteration() {
    let oracle = RecordingOracle {
        inner: FnIntensity::new(azimuthal_intensity),
        loads: vec![],
        evaluations: 0,
    };
    let mut orch = EventOrchestrator::new(
        elastic_sampler(),
        oracle,
        GenerationSettings {
            safety_factor: 0.5,
            ..GenerationSettings::default()
        },
        4,
    )
    .unwrap();

    orch.estimate_efficiency(2000).unwrap();
    assert_eq!(orch.oracle().loads.len(), orch.efficiency_history().len());
    orch.oracle_mut().loads.clear();
    orch.oracle_mut().evaluations = 0;

    let n = orch.generate(1000).unwrap().len();
    assert!(n >= 1000);

    let loads = &orch.oracle().loads;
    assert_eq!(loads.len(), orch.generation_history().len());
    assert_eq!(orch.oracle().evaluations, loads.len());
    for (k, &size) in loads.iter().enumerate() {
        assert_eq!(size, (k + 1) * loads[0]);
    }
}

#[test]
fn test_reweighting_reproduces_calibration_shape() {
    let mut orch = EventOrchestrator::new(
        elastic_sampler(),
        TSlopeIntensity::new(3.),
        GenerationSettings {
            n_t: 50000,
            ..GenerationSettings::default()
        },
        6,
    )
    .unwrap();
    orch.enable_reweighting();
    orch.generate(3000).unwrap();

    let calibration = orch.reweight_histogram().unwrap().histogram().mean();
    let (sum, sum_w) = orch
        .accepted()
        .iter()
        .fold((0., 0.), |(s, sw), e| (s + e.weight() * e.minus_t(), sw + e.weight()));
    let weighted_mean = sum / sum_w;

    assert!(
        (weighted_mean - calibration).abs() < 0.05 * calibration,
        "weighted mean {} vs calibration {}",
        weighted_mean,
        calibration
    );
}

#[test]
fn test_beam_energy_change_invalidates_run() {
    let mut orch = EventOrchestrator::new(
        elastic_sampler(),
        TSlopeIntensity::new(3.),
        GenerationSettings {
            n_t: 5000,
            ..GenerationSettings::default()
        },
        8,
    )
    .unwrap();
    orch.enable_reweighting();
    orch.generate(100).unwrap();
    assert!(orch.reweight_histogram().is_some());
    assert!(orch.efficiency().is_some());

    orch.set_beam_energy(8.8).unwrap();
    assert_eq!(orch.state(), GenerationState::Idle);
    assert!(orch.reweight_histogram().is_none());
    assert!(orch.efficiency().is_none());

    orch.generate(100).unwrap();
    for event in orch.accepted() {
        assert_eq!(event.beam().t, 8.8);
        assert_in_window(orch.sampler(), event);
    }
}
