use crate::error::{GeneratorError, Result};
use crate::event::KinematicEvent;
use crate::histogram::Histogram1D;
use crate::phase_space_generator::{PhaseSpaceGenerator, RauboldLynchGenerator};
use crate::reaction::ReactionTopology;
use rand::Rng;
use std::f64::consts::PI;
use tracing::{debug, info};
use vector::LorentzVector;

/// Uniform draw in `[low, high)`; an empty or inverted interval yields `low`.
#[inline]
pub(crate) fn uniform<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    low + (high - low) * rng.gen::<f64>()
}

/// Kinematic configuration of the sampler. Angles are in radians, energies in GeV.
#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub beam_energy: f64,
    pub theta_min: f64,
    pub theta_max: f64,
    pub eprime_min: f64,
    pub eprime_max: f64,
    /// Number of accepted auxiliary decays used to build the recoil mass shape.
    pub mass_shape_samples: usize,
    pub mass_shape_bins: usize,
}

impl Default for SamplerSettings {
    fn default() -> SamplerSettings {
        SamplerSettings {
            beam_energy: 11.,
            theta_min: 2.5f64.to_radians(),
            theta_max: 4.5f64.to_radians(),
            eprime_min: 0.5,
            eprime_max: 4.5,
            mass_shape_samples: 100000,
            mass_shape_bins: 1000,
        }
    }
}

/// Distribution of the recoil invariant mass W under pure phase space.
#[derive(Debug, Clone)]
pub enum MassShape {
    /// A single recoiling hadron: W is its mass.
    Fixed(f64),
    Binned(Histogram1D),
}

impl MassShape {
    const TOLERANCE: f64 = 1e-9;

    #[inline]
    fn fixed_within(w: f64, low: f64, high: f64) -> bool {
        w >= low - MassShape::TOLERANCE && w <= high + MassShape::TOLERANCE
    }

    /// Whether a W value inside `(low, high)` can be drawn.
    fn admits(&self, low: f64, high: f64) -> bool {
        match self {
            MassShape::Fixed(w) => MassShape::fixed_within(*w, low, high),
            MassShape::Binned(h) => h.integral_within(low, high) > 0.,
        }
    }

    /// Draw W inside `(low, high)`, or `None` when the window holds no content.
    fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R, low: f64, high: f64) -> Option<f64> {
        match self {
            MassShape::Fixed(w) => Some(*w).filter(|&w| MassShape::fixed_within(w, low, high)),
            MassShape::Binned(h) => h.sample_within(rng, low, high),
        }
    }
}

/// Phase-space generator for `e T -> e' X`, `X -> h_1 ... h_n`.
///
/// The scattered lepton is drawn first as a pseudo two-body process against the
/// recoil system of mass W, then the recoil system decays isotropically through
/// N-body phase space.
pub struct PhaseSpaceSampler {
    settings: SamplerSettings,
    topology: ReactionTopology,
    beam: LorentzVector<f64>,
    target: LorentzVector<f64>,
    p0: LorentzVector<f64>,
    w_min: f64,
    w_max: f64,
    mass_shape: Option<MassShape>,
    window_checked: bool,
    decay: Option<RauboldLynchGenerator>,
    decay_max_weight: f64,
    random: Vec<f64>,
    decay_ps: Vec<LorentzVector<f64>>,
}

impl PhaseSpaceSampler {
    const MAX_ANGLE_ATTEMPTS: usize = 100000;
    const WINDOW_SCAN_POINTS: usize = 256;
    const MAX_DECAY_ATTEMPTS: usize = 1000000;

    pub fn new(topology: ReactionTopology, settings: SamplerSettings) -> Result<PhaseSpaceSampler> {
        PhaseSpaceSampler::validate(&settings)?;

        let hadron_masses = topology.hadron_masses();
        let decay = if hadron_masses.len() > 1 {
            Some(RauboldLynchGenerator::new(hadron_masses.clone()))
        } else {
            None
        };
        let random = vec![0.; decay.as_ref().map_or(0, |d| d.n_random())];

        let mut sampler = PhaseSpaceSampler {
            target: LorentzVector::at_rest(topology.target().mass),
            w_min: topology.hadron_mass_sum(),
            beam: LorentzVector::default(),
            p0: LorentzVector::default(),
            w_max: 0.,
            settings,
            topology,
            mass_shape: None,
            window_checked: false,
            decay,
            decay_max_weight: 1.,
            random,
            decay_ps: vec![LorentzVector::default(); hadron_masses.len()],
        };
        sampler.update_initial_state();
        Ok(sampler)
    }

    fn validate(settings: &SamplerSettings) -> Result<()> {
        if !(settings.beam_energy > 0.) {
            return Err(GeneratorError::Configuration(format!(
                "Beam energy must be positive, got {}",
                settings.beam_energy
            )));
        }
        if !(settings.theta_min >= 0. && settings.theta_min < settings.theta_max && settings.theta_max <= PI) {
            return Err(GeneratorError::Configuration(format!(
                "Invalid lepton angle window [{}, {}] rad",
                settings.theta_min, settings.theta_max
            )));
        }
        if !(settings.eprime_min >= 0. && settings.eprime_min < settings.eprime_max) {
            return Err(GeneratorError::Configuration(format!(
                "Invalid scattered energy window [{}, {}] GeV",
                settings.eprime_min, settings.eprime_max
            )));
        }
        if settings.mass_shape_samples == 0 || settings.mass_shape_bins == 0 {
            return Err(GeneratorError::Configuration(
                "The recoil mass shape needs at least one sample and one bin".to_owned(),
            ));
        }
        Ok(())
    }

    fn update_initial_state(&mut self) {
        let e0 = self.settings.beam_energy;
        let m = self.target.t;
        self.beam = LorentzVector::from_args(e0, 0., 0., e0);
        self.p0 = self.beam + self.target;
        // W^2 = M^2 + 2 M (E0 - E') - 4 E0 E' sin^2(theta / 2) is largest for E' -> 0
        self.w_max = (m * m + 2. * e0 * m).sqrt();
    }

    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }

    pub fn topology(&self) -> &ReactionTopology {
        &self.topology
    }

    pub fn beam_energy(&self) -> f64 {
        self.settings.beam_energy
    }

    /// Change the beam energy. The recoil mass shape is discarded and rebuilt on the
    /// next `prepare` or `generate`.
    pub fn set_beam_energy(&mut self, beam_energy: f64) -> Result<()> {
        let mut settings = self.settings.clone();
        settings.beam_energy = beam_energy;
        PhaseSpaceSampler::validate(&settings)?;

        self.settings = settings;
        self.update_initial_state();
        self.mass_shape = None;
        self.window_checked = false;
        Ok(())
    }

    pub fn set_theta_window(&mut self, theta_min: f64, theta_max: f64) -> Result<()> {
        let mut settings = self.settings.clone();
        settings.theta_min = theta_min;
        settings.theta_max = theta_max;
        PhaseSpaceSampler::validate(&settings)?;
        self.settings = settings;
        self.window_checked = false;
        Ok(())
    }

    pub fn set_eprime_window(&mut self, eprime_min: f64, eprime_max: f64) -> Result<()> {
        let mut settings = self.settings.clone();
        settings.eprime_min = eprime_min;
        settings.eprime_max = eprime_max;
        PhaseSpaceSampler::validate(&settings)?;
        self.settings = settings;
        self.window_checked = false;
        Ok(())
    }

    pub fn beam(&self) -> &LorentzVector<f64> {
        &self.beam
    }

    pub fn target(&self) -> &LorentzVector<f64> {
        &self.target
    }

    /// The physically allowed range of the recoil mass W.
    pub fn physical_w_range(&self) -> (f64, f64) {
        (self.w_min, self.w_max)
    }

    pub fn mass_shape(&self) -> Option<&MassShape> {
        self.mass_shape.as_ref()
    }

    pub fn decay_max_weight(&self) -> f64 {
        self.decay_max_weight
    }

    /// Raise the running maximum of the decay weight if `weight` exceeds it.
    /// The maximum never decreases.
    pub(crate) fn observe_decay_weight(&mut self, weight: f64) -> f64 {
        if weight > self.decay_max_weight {
            debug!(
                old = self.decay_max_weight,
                new = weight,
                "Raising the decay weight maximum"
            );
            self.decay_max_weight = weight;
        }
        self.decay_max_weight
    }

    /// Reparametrisation of the lepton angle in which the sampling is uniform.
    #[inline]
    fn u(&self, cos_theta: f64) -> f64 {
        let m = self.target.t;
        let e0 = self.settings.beam_energy;
        m / 2. * (cos_theta + 1.) / (m + e0 * (1. - cos_theta))
    }

    #[inline]
    fn cos_theta_from_u(&self, u: f64) -> f64 {
        let m = self.target.t;
        let e0 = self.settings.beam_energy;
        (2. * u * (e0 + m) - m) / (m + 2. * u * e0)
    }

    /// W reached for a scattered energy `eprime` at fixed angle; zero if unphysical.
    #[inline]
    fn w_from_eprime(&self, eprime: f64, cos_theta: f64) -> f64 {
        let m = self.target.t;
        let e0 = self.settings.beam_energy;
        let w2 = m * m + 2. * m * (e0 - eprime) - 2. * e0 * eprime * (1. - cos_theta);
        if w2 > 0. {
            w2.sqrt()
        } else {
            0.
        }
    }

    /// The W window selected by the E' window at the given angle, clamped to the
    /// physical range. A lower bound on E' is an upper bound on W and vice versa.
    pub fn w_window(&self, cos_theta: f64) -> (f64, f64) {
        let low = self.w_from_eprime(self.settings.eprime_max, cos_theta).max(self.w_min);
        let high = self.w_from_eprime(self.settings.eprime_min, cos_theta).min(self.w_max);
        (low, high)
    }

    /// Build the recoil mass shape if needed and check that the configured lepton
    /// window leaves a non-empty range of W.
    pub fn prepare<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        if self.window_checked && self.mass_shape.is_some() {
            return Ok(());
        }
        if self.mass_shape.is_none() {
            let shape = self.build_mass_shape(rng)?;
            self.mass_shape = Some(shape);
        }

        let c_low = self.settings.theta_max.cos();
        let c_high = self.settings.theta_min.cos();
        let n = PhaseSpaceSampler::WINDOW_SCAN_POINTS;
        let shape = self.mass_shape.as_ref().ok_or_else(|| {
            GeneratorError::Configuration("The recoil mass shape is not available".to_owned())
        })?;
        let any = (0..=n).any(|k| {
            let c = c_low + (c_high - c_low) * k as f64 / n as f64;
            let (low, high) = self.w_window(c);
            shape.admits(low, high)
        });

        if !any {
            return Err(GeneratorError::Configuration(format!(
                "The lepton window theta in [{:.4}, {:.4}] rad, E' in [{}, {}] GeV leaves no valid recoil mass in [{:.4}, {:.4}] GeV",
                self.settings.theta_min,
                self.settings.theta_max,
                self.settings.eprime_min,
                self.settings.eprime_max,
                self.w_min,
                self.w_max
            )));
        }
        self.window_checked = true;
        Ok(())
    }

    /// Histogram the hadronic invariant mass of unweighted phase-space decays of the
    /// full initial state into lepton plus hadrons.
    fn build_mass_shape<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<MassShape> {
        let hadrons = self.topology.hadron_masses();
        if hadrons.len() == 1 {
            return Ok(MassShape::Fixed(hadrons[0]));
        }

        let lepton_mass = self.topology.lepton().mass;
        if !(self.p0.mass() > lepton_mass + self.w_min) {
            return Err(GeneratorError::Configuration(format!(
                "A beam energy of {} GeV is below the threshold of the final state",
                self.settings.beam_energy
            )));
        }

        let mut masses = vec![lepton_mass];
        masses.extend_from_slice(&hadrons);
        let mut gen = RauboldLynchGenerator::new(masses);
        let mut x = vec![0.; gen.n_random()];
        let mut ps = vec![LorentzVector::default(); hadrons.len() + 1];
        let mut histogram = Histogram1D::new(self.settings.mass_shape_bins, self.w_min, self.w_max);
        let mut max_weight = 1.;

        info!(
            samples = self.settings.mass_shape_samples,
            "Start computing the events for the W-distribution sampling"
        );
        let mut filled = 0;
        while filled < self.settings.mass_shape_samples {
            for r in x.iter_mut() {
                *r = rng.gen();
            }
            let weight = gen.generate(&self.p0, &x, &mut ps);
            if weight > max_weight {
                max_weight = weight;
            }
            if weight <= uniform(rng, 0., max_weight) {
                continue;
            }

            let w = ps[1..].iter().sum::<LorentzVector<f64>>().mass();
            histogram.fill(w, 1.);
            filled += 1;
        }
        info!("Done computing the W-distribution");

        Ok(MassShape::Binned(histogram))
    }

    /// Generate one phase-space event in canonical order (beam, e', target, hadrons).
    pub fn generate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<KinematicEvent> {
        self.prepare(rng)?;

        let m = self.target.t;
        let e0 = self.settings.beam_energy;
        let u_low = self.u(self.settings.theta_max.cos());
        let u_high = self.u(self.settings.theta_min.cos());

        for _ in 0..PhaseSpaceSampler::MAX_ANGLE_ATTEMPTS {
            let u = uniform(rng, u_low, u_high);
            let cos_theta = self.cos_theta_from_u(u).max(-1.).min(1.);
            let (low, high) = self.w_window(cos_theta);

            let w = match self.mass_shape.as_mut().and_then(|shape| shape.draw(rng, low, high)) {
                Some(w) => w,
                None => continue,
            };

            let eprime = (m * m + 2. * m * e0 - w * w) / (2. * m + 2. * e0 * (1. - cos_theta));
            let sin_theta = (1. - cos_theta * cos_theta).max(0.).sqrt();
            let (sin_phi, cos_phi) = uniform(rng, 0., 2. * PI).sin_cos();
            let lepton = LorentzVector::from_args(
                eprime,
                eprime * sin_theta * cos_phi,
                eprime * sin_theta * sin_phi,
                eprime * cos_theta,
            );

            let recoil = self.p0 - lepton;
            if let Some(hadrons) = self.decay_recoil(rng, &recoil) {
                return Ok(KinematicEvent::new(self.beam, lepton, self.target, &hadrons));
            }
        }

        Err(GeneratorError::Configuration(format!(
            "No scattering angle admitted a recoil mass after {} attempts",
            PhaseSpaceSampler::MAX_ANGLE_ATTEMPTS
        )))
    }

    /// Decay the recoil system by hit-or-miss on the phase-space weight.
    ///
    /// Returns `None` when the recoil cannot decay, which happens when rounding puts
    /// a mass drawn at the edge of the window on or below the threshold. The caller
    /// then draws a new angle.
    fn decay_recoil<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        recoil: &LorentzVector<f64>,
    ) -> Option<Vec<LorentzVector<f64>>> {
        if self.decay.is_some() && !(recoil.mass() > self.w_min) {
            debug!(w = recoil.mass(), threshold = self.w_min, "Recoil at threshold, redrawing");
            return None;
        }

        for _ in 0..PhaseSpaceSampler::MAX_DECAY_ATTEMPTS {
            for r in self.random.iter_mut() {
                *r = rng.gen();
            }
            let weight = match self.decay.as_mut() {
                Some(gen) => gen.generate(recoil, &self.random, &mut self.decay_ps),
                None => return Some(vec![*recoil]),
            };
            let max_weight = self.observe_decay_weight(weight);
            if weight > uniform(rng, 0., max_weight) {
                return Some(self.decay_ps.clone());
            }
        }
        None
    }
}
