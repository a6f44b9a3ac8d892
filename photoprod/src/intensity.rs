use crate::event::KinematicEvent;

/// Computes relative intensities over a batch of events.
///
/// A batch is loaded in one call and evaluated in the next; the maximum returned
/// by `evaluate` is shared by the whole batch, so a batch must never be submitted
/// in pieces.
pub trait IntensityOracle {
    /// Replace the current batch.
    fn load_batch(&mut self, events: &[KinematicEvent]);

    /// Evaluate the loaded batch and return the largest intensity in it.
    fn evaluate(&mut self) -> f64;

    /// Intensity of event `index` of the last evaluated batch.
    fn intensity(&self, index: usize) -> f64;

    fn batch_len(&self) -> usize;
}

/// An oracle built from a per-event intensity function.
pub struct FnIntensity<F>
where
    F: Fn(&KinematicEvent) -> f64,
{
    f: F,
    batch: Vec<KinematicEvent>,
    intensities: Vec<f64>,
}

impl<F> FnIntensity<F>
where
    F: Fn(&KinematicEvent) -> f64,
{
    pub fn new(f: F) -> FnIntensity<F> {
        FnIntensity {
            f,
            batch: vec![],
            intensities: vec![],
        }
    }
}

impl<F> IntensityOracle for FnIntensity<F>
where
    F: Fn(&KinematicEvent) -> f64,
{
    fn load_batch(&mut self, events: &[KinematicEvent]) {
        self.batch.clear();
        self.batch.extend_from_slice(events);
        self.intensities.clear();
    }

    fn evaluate(&mut self) -> f64 {
        let f = &self.f;
        self.intensities = self.batch.iter().map(|e| f(e)).collect();
        self.intensities.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }

    fn intensity(&self, index: usize) -> f64 {
        self.intensities[index]
    }

    fn batch_len(&self) -> usize {
        self.batch.len()
    }
}

/// Diffractive intensity `exp(-b |t|)` in the momentum transfer to the first hadron.
pub struct TSlopeIntensity {
    slope: f64,
    minus_t: Vec<f64>,
    intensities: Vec<f64>,
}

impl TSlopeIntensity {
    pub fn new(slope: f64) -> TSlopeIntensity {
        TSlopeIntensity {
            slope,
            minus_t: vec![],
            intensities: vec![],
        }
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }
}

impl IntensityOracle for TSlopeIntensity {
    fn load_batch(&mut self, events: &[KinematicEvent]) {
        self.minus_t = events.iter().map(|e| e.minus_t()).collect();
        self.intensities.clear();
    }

    fn evaluate(&mut self) -> f64 {
        let slope = self.slope;
        self.intensities = self.minus_t.iter().map(|t| (-slope * t.abs()).exp()).collect();
        self.intensities.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }

    fn intensity(&self, index: usize) -> f64 {
        self.intensities[index]
    }

    fn batch_len(&self) -> usize {
        self.minus_t.len()
    }
}
