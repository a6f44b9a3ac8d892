use crate::error::{GeneratorError, Result};
use crate::event::KinematicEvent;
use crate::histogram::Histogram1D;
use crate::intensity::IntensityOracle;
use crate::sampler::{uniform, PhaseSpaceSampler};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{info, warn};

/// Kinematic variable used by the reweighting stage.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KinematicVariable {
    /// Momentum transfer between the target and the first hadron.
    MinusT,
    /// Invariant mass W of the hadronic system.
    RecoilMass,
    Q2,
}

impl KinematicVariable {
    pub fn value(&self, event: &KinematicEvent) -> f64 {
        match self {
            KinematicVariable::MinusT => event.minus_t(),
            KinematicVariable::RecoilMass => event.recoil_mass(),
            KinematicVariable::Q2 => event.q2(),
        }
    }

    /// Upper edge of the histogram range for a squared centre-of-mass energy `s`.
    fn upper_bound(&self, s: f64) -> f64 {
        match self {
            KinematicVariable::RecoilMass => s.sqrt(),
            KinematicVariable::MinusT | KinematicVariable::Q2 => s,
        }
    }
}

impl Default for KinematicVariable {
    fn default() -> KinematicVariable {
        KinematicVariable::MinusT
    }
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// Oversampling applied when sizing the generation batch from the efficiency.
    pub safety_factor: f64,
    /// The efficiency estimate converges once strictly more events than this survive.
    pub saved_min: usize,
    /// Number of trial events in the reweighting pre-pass.
    pub n_t: usize,
    pub max_iterations: usize,
    pub reweight_variable: KinematicVariable,
}

impl Default for GenerationSettings {
    fn default() -> GenerationSettings {
        GenerationSettings {
            safety_factor: 2.,
            saved_min: 100,
            n_t: 100000,
            max_iterations: 10,
            reweight_variable: KinematicVariable::MinusT,
        }
    }
}

/// Intensity-weighted distribution of a kinematic variable, normalised per trial event.
#[derive(Debug, Clone)]
pub struct ReweightHistogram {
    histogram: Histogram1D,
    maximum: f64,
    n_trials: usize,
    variable: KinematicVariable,
}

impl ReweightHistogram {
    pub const N_BINS: usize = 1000;

    pub fn histogram(&self) -> &Histogram1D {
        &self.histogram
    }

    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    pub fn n_trials(&self) -> usize {
        self.n_trials
    }

    pub fn variable(&self) -> KinematicVariable {
        self.variable
    }

    /// Histogram value at the event's kinematic variable.
    pub fn weight_at(&self, event: &KinematicEvent) -> f64 {
        self.histogram.content_at(self.variable.value(event))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    EfficiencyPending,
    EfficiencyKnown,
    Generating,
    Done,
}

/// Summary of one pass of the efficiency or generation loop.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IterationRecord {
    pub batch_size: usize,
    pub max_intensity: f64,
    pub accepted: usize,
}

/// Hit-or-miss over the first `n` intensities of the evaluated batch: event `i` is
/// kept iff its intensity exceeds a uniform draw in `[0, max)`.
///
/// A non-positive or non-finite maximum keeps nothing.
pub fn hit_or_miss<O, R>(oracle: &O, rng: &mut R, n: usize, max: f64) -> Vec<usize>
where
    O: IntensityOracle + ?Sized,
    R: Rng + ?Sized,
{
    if !(max > 0.) || !max.is_finite() {
        warn!(max_intensity = max, batch_size = n, "Maximum intensity is not positive, accepting no event");
        return vec![];
    }

    (0..n)
        .filter(|&i| oracle.intensity(i) > uniform(rng, 0., max))
        .collect()
}

/// Turns phase-space events into intensity-distributed events.
///
/// Owns the sampler, the oracle and the random stream. Batches are always handed
/// to the oracle whole: one `load_batch` and one `evaluate` per iteration.
pub struct EventOrchestrator<O: IntensityOracle> {
    sampler: PhaseSpaceSampler,
    oracle: O,
    rng: StdRng,
    settings: GenerationSettings,
    state: GenerationState,
    efficiency: Option<f64>,
    reweight_enabled: bool,
    reweight: Option<ReweightHistogram>,
    batch: Vec<KinematicEvent>,
    accepted: Vec<KinematicEvent>,
    efficiency_history: Vec<IterationRecord>,
    generation_history: Vec<IterationRecord>,
}

impl<O: IntensityOracle> EventOrchestrator<O> {
    const MAX_REWEIGHT_ATTEMPTS: usize = 1000000;

    pub fn new(
        sampler: PhaseSpaceSampler,
        oracle: O,
        settings: GenerationSettings,
        seed: u64,
    ) -> Result<EventOrchestrator<O>> {
        EventOrchestrator::<O>::validate(&settings)?;

        Ok(EventOrchestrator {
            sampler,
            oracle,
            rng: StdRng::seed_from_u64(seed),
            settings,
            state: GenerationState::Idle,
            efficiency: None,
            reweight_enabled: false,
            reweight: None,
            batch: vec![],
            accepted: vec![],
            efficiency_history: vec![],
            generation_history: vec![],
        })
    }

    fn validate(settings: &GenerationSettings) -> Result<()> {
        if !(settings.safety_factor > 0. && settings.safety_factor.is_finite()) {
            return Err(GeneratorError::Configuration(format!(
                "The safety factor must be positive, got {}",
                settings.safety_factor
            )));
        }
        if settings.max_iterations == 0 {
            return Err(GeneratorError::Configuration(
                "At least one iteration must be allowed".to_owned(),
            ));
        }
        Ok(())
    }

    /// Restart the random stream. Cached efficiency and histograms are kept.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn state(&self) -> GenerationState {
        self.state
    }

    pub fn sampler(&self) -> &PhaseSpaceSampler {
        &self.sampler
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    /// Change the beam energy, dropping every cached quantity that depends on it.
    pub fn set_beam_energy(&mut self, beam_energy: f64) -> Result<()> {
        self.sampler.set_beam_energy(beam_energy)?;
        self.efficiency = None;
        self.reweight = None;
        self.batch.clear();
        self.accepted.clear();
        self.state = GenerationState::Idle;
        Ok(())
    }

    /// The calibration histogram is built on the next efficiency estimate or run.
    pub fn enable_reweighting(&mut self) {
        if !self.reweight_enabled {
            self.reweight_enabled = true;
            self.efficiency = None;
        }
    }

    pub fn disable_reweighting(&mut self) {
        if self.reweight_enabled {
            self.reweight_enabled = false;
            self.efficiency = None;
        }
    }

    pub fn is_reweighting(&self) -> bool {
        self.reweight_enabled
    }

    pub fn reweight_histogram(&self) -> Option<&ReweightHistogram> {
        self.reweight.as_ref()
    }

    pub fn set_n_t(&mut self, n_t: usize) {
        self.settings.n_t = n_t;
        self.reweight = None;
        if self.reweight_enabled {
            self.efficiency = None;
        }
    }

    pub fn set_reweight_variable(&mut self, variable: KinematicVariable) {
        self.settings.reweight_variable = variable;
        self.reweight = None;
        if self.reweight_enabled {
            self.efficiency = None;
        }
    }

    pub fn set_safety_factor(&mut self, safety_factor: f64) -> Result<()> {
        let mut settings = self.settings.clone();
        settings.safety_factor = safety_factor;
        EventOrchestrator::<O>::validate(&settings)?;
        self.settings = settings;
        Ok(())
    }

    pub fn set_saved_min(&mut self, saved_min: usize) {
        self.settings.saved_min = saved_min;
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> Result<()> {
        let mut settings = self.settings.clone();
        settings.max_iterations = max_iterations;
        EventOrchestrator::<O>::validate(&settings)?;
        self.settings = settings;
        Ok(())
    }

    pub fn efficiency(&self) -> Option<f64> {
        self.efficiency
    }

    /// The cached efficiency, estimated from an initial batch of `n_events` if unknown.
    pub fn efficiency_or_estimate(&mut self, n_events: usize) -> Result<f64> {
        match self.efficiency {
            Some(e) => Ok(e),
            None => self.estimate_efficiency(n_events),
        }
    }

    pub fn efficiency_history(&self) -> &[IterationRecord] {
        &self.efficiency_history
    }

    pub fn generation_history(&self) -> &[IterationRecord] {
        &self.generation_history
    }

    pub fn accepted(&self) -> &[KinematicEvent] {
        &self.accepted
    }

    pub fn event(&self, index: usize) -> Option<&KinematicEvent> {
        self.accepted.get(index)
    }

    pub fn weight(&self, index: usize) -> Option<f64> {
        self.accepted.get(index).map(|e| e.weight())
    }

    /// Fraction of phase-space events surviving hit-or-miss.
    ///
    /// Starts from `n_events` phase-space events and multiplies the batch by ten
    /// until strictly more than `saved_min` events survive.
    pub fn estimate_efficiency(&mut self, n_events: usize) -> Result<f64> {
        if n_events == 0 {
            return Err(GeneratorError::Configuration(
                "The efficiency needs a non-empty initial batch".to_owned(),
            ));
        }

        self.prepare_reweighting()?;
        self.state = GenerationState::EfficiencyPending;
        self.efficiency = None;
        self.efficiency_history.clear();

        let result = self.run_efficiency_loop(n_events);
        match result {
            Ok(efficiency) => {
                self.efficiency = Some(efficiency);
                self.state = GenerationState::EfficiencyKnown;
            }
            Err(_) => self.state = GenerationState::Idle,
        }
        result
    }

    fn run_efficiency_loop(&mut self, n_events: usize) -> Result<f64> {
        let mut batch_size = n_events;
        for iteration in 0..self.settings.max_iterations {
            let batch = (0..batch_size)
                .map(|_| self.sample_event())
                .collect::<Result<Vec<_>>>()?;

            self.oracle.load_batch(&batch);
            let max_intensity = self.oracle.evaluate();
            let saved = hit_or_miss(&self.oracle, &mut self.rng, batch.len(), max_intensity).len();
            self.efficiency_history.push(IterationRecord {
                batch_size,
                max_intensity,
                accepted: saved,
            });
            info!(iteration, batch_size, max_intensity, saved, "Efficiency iteration");

            if saved > self.settings.saved_min {
                let efficiency = saved as f64 / batch_size as f64;
                info!(efficiency, "Efficiency estimated");
                return Ok(efficiency);
            }

            batch_size = batch_size.checked_mul(10).ok_or_else(|| {
                GeneratorError::Convergence("The efficiency batch size overflowed".to_owned())
            })?;
            info!(
                saved,
                saved_min = self.settings.saved_min,
                batch_size,
                "Not enough events saved, increasing the batch size"
            );
        }

        Err(GeneratorError::Convergence(format!(
            "The efficiency estimate did not save more than {} events within {} iterations",
            self.settings.saved_min, self.settings.max_iterations
        )))
    }

    /// Generate at least `target` accepted events.
    ///
    /// Every iteration adds a fresh slice of phase-space events to the ones kept from
    /// earlier iterations, submits the whole sample to the oracle and redoes the
    /// hit-or-miss over all of it. The accepted set is the last iteration's.
    pub fn generate(&mut self, target: usize) -> Result<&[KinematicEvent]> {
        if target == 0 {
            return Err(GeneratorError::Configuration(
                "The number of requested events must be positive".to_owned(),
            ));
        }

        self.prepare_reweighting()?;
        let efficiency = self.efficiency_or_estimate(target)?;

        self.state = GenerationState::Generating;
        self.batch.clear();
        self.accepted.clear();
        self.generation_history.clear();

        let n = (target as f64 * self.settings.safety_factor / efficiency)
            .ceil()
            .max(1.) as usize;
        info!(target, efficiency, batch_size = n, "Start generating");

        match self.run_generation_loop(target, n) {
            Ok(()) => {
                self.state = GenerationState::Done;
                Ok(self.accepted.as_slice())
            }
            Err(e) => {
                self.state = GenerationState::Idle;
                Err(e)
            }
        }
    }

    fn run_generation_loop(&mut self, target: usize, n: usize) -> Result<()> {
        for iteration in 0..self.settings.max_iterations {
            self.batch.reserve(n);
            for _ in 0..n {
                let event = self.sample_event()?;
                self.batch.push(event);
            }

            self.oracle.load_batch(&self.batch);
            let max_intensity = self.oracle.evaluate();
            let accepted = hit_or_miss(&self.oracle, &mut self.rng, self.batch.len(), max_intensity);

            let batch = &self.batch;
            self.accepted = accepted.into_iter().map(|i| batch[i].clone()).collect();
            self.generation_history.push(IterationRecord {
                batch_size: self.batch.len(),
                max_intensity,
                accepted: self.accepted.len(),
            });
            info!(
                iteration,
                batch_size = self.batch.len(),
                max_intensity,
                accepted = self.accepted.len(),
                "Generation iteration"
            );

            if self.accepted.len() >= target {
                return Ok(());
            }
            info!(
                accepted = self.accepted.len(),
                target,
                added = n,
                "Not enough events accepted, growing the batch"
            );
        }

        Err(GeneratorError::Convergence(format!(
            "Only {} of {} events accepted after {} iterations",
            self.accepted.len(),
            target,
            self.settings.max_iterations
        )))
    }

    fn prepare_reweighting(&mut self) -> Result<()> {
        if self.reweight_enabled && self.reweight.is_none() {
            let reweight = self.build_reweight_histogram()?;
            self.reweight = Some(reweight);
        }
        Ok(())
    }

    /// Pre-pass filling the variable's distribution weighted by intensity.
    fn build_reweight_histogram(&mut self) -> Result<ReweightHistogram> {
        let n_trials = self.settings.n_t;
        if n_trials == 0 {
            return Err(GeneratorError::Configuration(
                "Reweighting needs at least one trial event".to_owned(),
            ));
        }

        let variable = self.settings.reweight_variable;
        info!(n_trials, ?variable, "Start computing the reweighting histogram");

        let trials = (0..n_trials)
            .map(|_| self.sampler.generate(&mut self.rng))
            .collect::<Result<Vec<_>>>()?;
        self.oracle.load_batch(&trials);
        let max_intensity = self.oracle.evaluate();

        let m = self.sampler.target().t;
        let s = m * m + 2. * m * self.sampler.beam_energy();
        let values = trials.iter().map(|e| variable.value(e)).collect::<Vec<_>>();
        // -t against a leading meson can be negative
        let low = values.iter().cloned().fold(0., f64::min);
        let mut histogram = Histogram1D::new(ReweightHistogram::N_BINS, low, variable.upper_bound(s));
        for (i, &x) in values.iter().enumerate() {
            histogram.fill(x, self.oracle.intensity(i));
        }
        histogram.scale(1. / n_trials as f64);

        let maximum = histogram.maximum();
        info!(max_intensity, maximum, "Done computing the reweighting histogram");
        if !(maximum > 0.) {
            return Err(GeneratorError::Convergence(
                "The reweighting histogram is empty; no event could pass the secondary test".to_owned(),
            ));
        }

        Ok(ReweightHistogram {
            histogram,
            maximum,
            n_trials,
            variable,
        })
    }

    /// One phase-space event. With reweighting, events are resampled in place until
    /// one passes the test against the calibration histogram; it is then weighted by
    /// the inverse of its selection probability.
    fn sample_event(&mut self) -> Result<KinematicEvent> {
        let mut event = self.sampler.generate(&mut self.rng)?;
        if !self.reweight_enabled {
            return Ok(event);
        }

        let reweight = self.reweight.as_ref().ok_or_else(|| {
            GeneratorError::Configuration("The reweighting histogram has not been built".to_owned())
        })?;
        for _ in 0..EventOrchestrator::<O>::MAX_REWEIGHT_ATTEMPTS {
            let h = reweight.weight_at(&event);
            if h > uniform(&mut self.rng, 0., reweight.maximum) {
                event.set_weight(reweight.maximum / h);
                return Ok(event);
            }
            event = self.sampler.generate(&mut self.rng)?;
        }

        Err(GeneratorError::Convergence(format!(
            "No event passed the reweighting test in {} attempts",
            EventOrchestrator::<O>::MAX_REWEIGHT_ATTEMPTS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intensity::FnIntensity;
    use crate::reaction::ReactionTopology;
    use crate::sampler::SamplerSettings;

    fn elastic_sampler() -> PhaseSpaceSampler {
        let topology = ReactionTopology::new("p", &["p"]).unwrap();
        PhaseSpaceSampler::new(
            topology,
            SamplerSettings {
                eprime_max: 11.,
                ..SamplerSettings::default()
            },
        )
        .unwrap()
    }

    fn orchestrator<F: Fn(&KinematicEvent) -> f64>(f: F) -> EventOrchestrator<FnIntensity<F>> {
        EventOrchestrator::new(
            elastic_sampler(),
            FnIntensity::new(f),
            GenerationSettings {
                n_t: 5000,
                max_iterations: 3,
                ..GenerationSettings::default()
            },
            42,
        )
        .unwrap()
    }

    #[test]
    fn test_hit_or_miss_with_non_positive_maximum() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut oracle = FnIntensity::new(|_: &KinematicEvent| 0.);
        let events = vec![elastic_sampler().generate(&mut rng).unwrap(); 10];
        oracle.load_batch(&events);
        let max = oracle.evaluate();

        assert!(hit_or_miss(&oracle, &mut rng, 10, max).is_empty());
        assert!(hit_or_miss(&oracle, &mut rng, 10, -1.).is_empty());
        assert!(hit_or_miss(&oracle, &mut rng, 10, f64::NAN).is_empty());
    }

    #[test]
    fn test_state_transitions() {
        let mut orch = orchestrator(|_: &KinematicEvent| 1.);
        assert_eq!(orch.state(), GenerationState::Idle);

        let efficiency = orch.estimate_efficiency(200).unwrap();
        assert_eq!(efficiency, 1.);
        assert_eq!(orch.state(), GenerationState::EfficiencyKnown);

        let n = orch.generate(150).unwrap().len();
        assert!(n >= 150);
        assert_eq!(orch.state(), GenerationState::Done);
        assert_eq!(orch.weight(0), Some(1.));

        orch.set_beam_energy(10.6).unwrap();
        assert_eq!(orch.state(), GenerationState::Idle);
        assert!(orch.efficiency().is_none());
        assert!(orch.accepted().is_empty());
    }

    #[test]
    fn test_zero_intensity_hits_iteration_guard() {
        let mut orch = orchestrator(|_: &KinematicEvent| 0.);
        match orch.estimate_efficiency(10) {
            Err(GeneratorError::Convergence(_)) => {}
            other => panic!("expected convergence error, got {:?}", other),
        }
        assert_eq!(orch.state(), GenerationState::Idle);

        let sizes: Vec<_> = orch.efficiency_history().iter().map(|r| r.batch_size).collect();
        assert_eq!(sizes, vec![10, 100, 1000]);
        assert!(orch.efficiency_history().iter().all(|r| r.accepted == 0));
    }

    #[test]
    fn test_zero_intensity_reweighting_fails() {
        let mut orch = orchestrator(|_: &KinematicEvent| 0.);
        orch.enable_reweighting();
        match orch.generate(10) {
            Err(GeneratorError::Convergence(_)) => {}
            other => panic!("expected convergence error, got {:?}", other),
        }
        assert!(orch.reweight_histogram().is_none());
    }

    #[test]
    fn test_reweighted_events_carry_inverse_selection_weight() {
        let mut orch = orchestrator(|e: &KinematicEvent| (-3. * e.minus_t()).exp());
        orch.enable_reweighting();
        orch.generate(200).unwrap();

        let reweight = orch.reweight_histogram().unwrap().clone();
        assert_eq!(reweight.n_trials(), 5000);
        assert_eq!(reweight.variable(), KinematicVariable::MinusT);
        for event in orch.accepted() {
            let h = reweight.weight_at(event);
            assert!(h > 0.);
            assert!((event.weight() - reweight.maximum() / h).abs() < 1e-9 * event.weight());
            assert!(event.weight() >= 1.);
        }

        orch.set_n_t(1000);
        assert!(orch.reweight_histogram().is_none());
        assert!(orch.efficiency().is_none());
    }

    #[test]
    fn test_negative_minus_t_is_reweighted() {
        let topology = ReactionTopology::new("p", &["pi+", "n"]).unwrap();
        let sampler = PhaseSpaceSampler::new(
            topology,
            SamplerSettings {
                eprime_min: 10.,
                eprime_max: 10.75,
                mass_shape_samples: 20000,
                mass_shape_bins: 400,
                ..SamplerSettings::default()
            },
        )
        .unwrap();
        let backward = |e: &KinematicEvent| if e.minus_t() < 0. { 1. } else { 0. };
        let mut orch = EventOrchestrator::new(
            sampler,
            FnIntensity::new(backward),
            GenerationSettings {
                n_t: 5000,
                ..GenerationSettings::default()
            },
            7,
        )
        .unwrap();
        orch.enable_reweighting();
        orch.generate(100).unwrap();

        let reweight = orch.reweight_histogram().unwrap().clone();
        assert!(reweight.histogram().low() < 0.);
        assert!(!orch.accepted().is_empty());
        for event in orch.accepted() {
            assert!(event.minus_t() < 0.);
            assert!(event.minus_t() >= reweight.histogram().low());
            assert!(reweight.weight_at(event) > 0.);
        }
    }

    #[test]
    fn test_invalid_settings() {
        let bad = GenerationSettings {
            safety_factor: 0.,
            ..GenerationSettings::default()
        };
        assert!(EventOrchestrator::new(elastic_sampler(), FnIntensity::new(|_: &KinematicEvent| 1.), bad, 0).is_err());

        let mut orch = orchestrator(|_: &KinematicEvent| 1.);
        assert!(orch.set_safety_factor(-2.).is_err());
        assert!(orch.set_max_iterations(0).is_err());
        assert!(orch.generate(0).is_err());
    }
}
