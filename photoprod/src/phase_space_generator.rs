use std::f64::consts::PI;
use vector::LorentzVector;

pub trait PhaseSpaceGenerator {
    /// Number of uniform random numbers consumed by one call to `generate`.
    fn n_random(&self) -> usize;

    /// Decay `parent` into the configured particles, writing their lab-frame momenta
    /// to `ps`. Returns the phase-space weight of the configuration; zero when the
    /// decay is kinematically forbidden.
    fn generate(&mut self, parent: &LorentzVector<f64>, x: &[f64], ps: &mut [LorentzVector<f64>]) -> f64;
}

/// N-body phase space by the Raubold-Lynch method (GENBOD).
///
/// The intermediate invariant masses are built from sorted uniform numbers, each
/// two-body step is isotropic in its own rest frame, and the chain is boosted back
/// up to the parent. The returned weight is normalised by the product of the
/// largest attainable two-body momenta, which bounds it by one.
pub struct RauboldLynchGenerator {
    masses: Vec<f64>,
    rno: Vec<f64>,
    inv_mass: Vec<f64>,
    pd: Vec<f64>,
}

impl RauboldLynchGenerator {
    pub const MAX_EXTERNAL: usize = 18;

    pub fn new(masses: Vec<f64>) -> RauboldLynchGenerator {
        let n = masses.len();
        debug_assert!(n >= 2 && n <= RauboldLynchGenerator::MAX_EXTERNAL);

        RauboldLynchGenerator {
            masses,
            rno: vec![0.; n],
            inv_mass: vec![0.; n],
            pd: vec![0.; n],
        }
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    /// Momentum of either daughter in the two-body decay `a -> b c`.
    #[inline]
    fn pdk(a: f64, b: f64, c: f64) -> f64 {
        let x = (a - b - c) * (a + b + c) * (a - b + c) * (a + b - c);
        x.max(0.).sqrt() / (2. * a.abs())
    }
}

impl PhaseSpaceGenerator for RauboldLynchGenerator {
    fn n_random(&self) -> usize {
        3 * self.masses.len() - 4
    }

    fn generate(&mut self, parent: &LorentzVector<f64>, x: &[f64], ps: &mut [LorentzVector<f64>]) -> f64 {
        let n = self.masses.len();
        debug_assert!(x.len() >= self.n_random() && ps.len() >= n);

        let kinetic = parent.mass() - self.masses.iter().sum::<f64>();
        if !(kinetic > 0.) {
            return 0.;
        }

        // sorted intermediate mass fractions, pinned to 0 and 1 at the ends
        self.rno[0] = 0.;
        self.rno[1..n - 1].copy_from_slice(&x[..n - 2]);
        self.rno[1..n - 1].sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        self.rno[n - 1] = 1.;

        let mut mass_sum = 0.;
        for i in 0..n {
            mass_sum += self.masses[i];
            self.inv_mass[i] = self.rno[i] * kinetic + mass_sum;
        }

        let mut em_max = kinetic + self.masses[0];
        let mut em_min = 0.;
        let mut weight_max = 1.;
        let mut weight = 1.;
        for i in 1..n {
            em_min += self.masses[i - 1];
            em_max += self.masses[i];
            weight_max *= RauboldLynchGenerator::pdk(em_max, em_min, self.masses[i]);

            self.pd[i - 1] =
                RauboldLynchGenerator::pdk(self.inv_mass[i], self.inv_mass[i - 1], self.masses[i]);
            weight *= self.pd[i - 1];
        }

        let angles = &x[n - 2..];
        ps[0] = LorentzVector::from_args(self.pd[0].hypot(self.masses[0]), 0., self.pd[0], 0.);

        let mut i = 1;
        loop {
            ps[i] = LorentzVector::from_args(
                self.pd[i - 1].hypot(self.masses[i]),
                0.,
                -self.pd[i - 1],
                0.,
            );

            let cos_z = 2. * angles[2 * (i - 1)] - 1.;
            let sin_z = (1. - cos_z * cos_z).max(0.).sqrt();
            let (sin_y, cos_y) = (2. * PI * angles[2 * (i - 1) + 1]).sin_cos();
            for p in ps[..=i].iter_mut() {
                *p = p.rotate_z(cos_z, sin_z).rotate_y(cos_y, sin_y);
            }

            if i == n - 1 {
                break;
            }

            // boost the subsystem into the rest frame of the next intermediate mass
            let beta = self.pd[i] / self.pd[i].hypot(self.inv_mass[i]);
            let boost = LorentzVector::from_args(0., 0., beta, 0.);
            for p in ps[..=i].iter_mut() {
                *p = p.boost(&boost);
            }
            i += 1;
        }

        let to_lab = parent.boost_vector();
        for p in ps[..n].iter_mut() {
            *p = p.boost(&to_lab);
        }

        weight / weight_max
    }
}
