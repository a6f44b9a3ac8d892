use rand::Rng;

/// Fixed-width one dimensional histogram over `[low, high)`.
///
/// Entries outside the range go to the under- and overflow counters and never take
/// part in `maximum`, `integral` or random draws.
#[derive(Debug, Clone)]
pub struct Histogram1D {
    low: f64,
    high: f64,
    bins: Vec<f64>,
    underflow: f64,
    overflow: f64,
    entries: usize,
}

impl Histogram1D {
    pub fn new(n_bins: usize, low: f64, high: f64) -> Histogram1D {
        debug_assert!(n_bins > 0 && high > low);

        Histogram1D {
            low,
            high,
            bins: vec![0.; n_bins],
            underflow: 0.,
            overflow: 0.,
            entries: 0,
        }
    }

    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn bin_width(&self) -> f64 {
        (self.high - self.low) / self.bins.len() as f64
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    /// Index of the bin containing `x`, or `None` outside the range.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        if !(x >= self.low && x < self.high) {
            return None;
        }
        let i = ((x - self.low) / self.bin_width()) as usize;
        Some(i.min(self.bins.len() - 1))
    }

    pub fn bin_low_edge(&self, i: usize) -> f64 {
        self.low + i as f64 * self.bin_width()
    }

    pub fn bin_center(&self, i: usize) -> f64 {
        self.low + (i as f64 + 0.5) * self.bin_width()
    }

    pub fn fill(&mut self, x: f64, weight: f64) {
        self.entries += 1;
        match self.find_bin(x) {
            Some(i) => self.bins[i] += weight,
            None if x < self.low => self.underflow += weight,
            None => self.overflow += weight,
        }
    }

    pub fn bin_content(&self, i: usize) -> f64 {
        self.bins[i]
    }

    /// Content of the bin containing `x`; zero outside the range.
    pub fn content_at(&self, x: f64) -> f64 {
        self.find_bin(x).map_or(0., |i| self.bins[i])
    }

    pub fn scale(&mut self, factor: f64) {
        for b in self.bins.iter_mut() {
            *b *= factor;
        }
        self.underflow *= factor;
        self.overflow *= factor;
    }

    pub fn maximum(&self) -> f64 {
        self.bins.iter().cloned().fold(0., f64::max)
    }

    pub fn integral(&self) -> f64 {
        self.bins.iter().sum()
    }

    /// Content inside `(low, high)`, counting partially covered bins by the covered
    /// fraction of their width.
    pub fn integral_within(&self, low: f64, high: f64) -> f64 {
        self.bin_range(low, high)
            .filter_map(|i| self.clipped_content(i, low, high))
            .map(|(_, _, c)| c)
            .sum()
    }

    /// Mean of the in-range content, using bin centres.
    pub fn mean(&self) -> f64 {
        let total = self.integral();
        if total <= 0. {
            return 0.;
        }
        self.bins
            .iter()
            .enumerate()
            .map(|(i, c)| c * self.bin_center(i))
            .sum::<f64>()
            / total
    }

    /// Draw a value distributed like the histogram: a bin is chosen with probability
    /// proportional to its content, then a point uniformly inside it.
    ///
    /// Returns `None` for an empty histogram.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<f64> {
        self.sample_within(rng, self.low, self.high)
    }

    /// Draw from the histogram restricted to the window from `low` to `high`.
    ///
    /// The bins at the window edges are clipped to the window and weighted by the
    /// covered fraction, so the draw is a direct inversion with no rejection. Returns
    /// `None` when the window holds no content.
    pub fn sample_within<R: Rng + ?Sized>(&self, rng: &mut R, low: f64, high: f64) -> Option<f64> {
        let total = self.integral_within(low, high);
        if !(total > 0.) {
            return None;
        }

        let r = rng.gen::<f64>() * total;
        let mut sum = 0.;
        let mut last = None;
        for (a, b, c) in self.bin_range(low, high).filter_map(|i| self.clipped_content(i, low, high)) {
            if c <= 0. {
                continue;
            }
            sum += c;
            last = Some((a, b));
            if sum > r {
                break;
            }
        }

        last.map(|(a, b)| a + (b - a) * rng.gen::<f64>())
    }

    /// Indices of the bins that can intersect `(low, high)`.
    fn bin_range(&self, low: f64, high: f64) -> std::ops::Range<usize> {
        let low = low.max(self.low);
        let high = high.min(self.high);
        if !(high > low) {
            return 0..0;
        }
        let w = self.bin_width();
        let first = (((low - self.low) / w).floor() as usize).min(self.bins.len() - 1);
        let last = (((high - self.low) / w).ceil() as usize).min(self.bins.len());
        first..last
    }

    /// The part of bin `i` inside `(low, high)` and its share of the bin content.
    fn clipped_content(&self, i: usize, low: f64, high: f64) -> Option<(f64, f64, f64)> {
        let edge = self.bin_low_edge(i);
        let a = edge.max(low);
        let b = (edge + self.bin_width()).min(high);
        if !(b > a) {
            return None;
        }
        Some((a, b, self.bins[i].max(0.) * (b - a) / self.bin_width()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fill_and_find_bin() {
        let mut h = Histogram1D::new(10, 0., 1.);
        h.fill(0.05, 1.);
        h.fill(0.99, 2.);
        h.fill(1.0, 5.);
        h.fill(-0.1, 3.);

        assert_eq!(h.find_bin(0.05), Some(0));
        assert_eq!(h.find_bin(1.0), None);
        assert_eq!(h.bin_content(9), 2.);
        assert_eq!(h.overflow(), 5.);
        assert_eq!(h.underflow(), 3.);
        assert_eq!(h.entries(), 4);
        assert_eq!(h.integral(), 3.);
        assert_eq!(h.maximum(), 2.);
        assert_eq!(h.content_at(0.95), 2.);
        assert_eq!(h.content_at(7.), 0.);
    }

    #[test]
    fn test_scale() {
        let mut h = Histogram1D::new(4, 0., 4.);
        h.fill(1.5, 4.);
        h.scale(0.25);
        assert_eq!(h.bin_content(1), 1.);
        assert_eq!(h.maximum(), 1.);
    }

    #[test]
    fn test_sampling_follows_content() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut h = Histogram1D::new(2, 0., 2.);
        h.fill(0.5, 1.);
        h.fill(1.5, 3.);

        let n = 40000;
        let upper = (0..n)
            .filter(|_| h.sample(&mut rng).unwrap() >= 1.)
            .count();
        let fraction = upper as f64 / n as f64;
        assert!((fraction - 0.75).abs() < 0.01, "fraction = {}", fraction);
    }

    #[test]
    fn test_sample_within_window() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut h = Histogram1D::new(100, 0., 10.);
        for i in 0..100 {
            h.fill(i as f64 / 10. + 0.05, 1.);
        }

        for _ in 0..1000 {
            let x = h.sample_within(&mut rng, 2.5, 3.1).unwrap();
            assert!(x >= 2.5 && x <= 3.1);
        }

        let mut empty = Histogram1D::new(10, 0., 1.);
        assert!(empty.sample(&mut rng).is_none());
        empty.fill(0.05, 1.);
        assert!(empty.sample_within(&mut rng, 0.5, 0.9).is_none());
        assert!(empty.sample_within(&mut rng, 0.9, 0.5).is_none());
        assert!(empty.sample_within(&mut rng, 2., 3.).is_none());
    }

    #[test]
    fn test_edge_bins_are_clipped() {
        let mut h = Histogram1D::new(2, 0., 2.);
        h.fill(0.5, 1.);
        h.fill(1.5, 3.);

        // half of each bin lies inside the window
        assert!((h.integral_within(0.5, 1.5) - 2.).abs() < 1e-12);
        assert!((h.integral_within(-1., 5.) - 4.).abs() < 1e-12);
        assert_eq!(h.integral_within(0.2, 0.2), 0.);

        let mut rng = StdRng::seed_from_u64(8);
        let n = 40000;
        let upper = (0..n)
            .map(|_| h.sample_within(&mut rng, 0.5, 1.5).unwrap())
            .inspect(|&x| assert!(x >= 0.5 && x <= 1.5))
            .filter(|&x| x >= 1.)
            .count();
        let fraction = upper as f64 / n as f64;
        assert!((fraction - 0.75).abs() < 0.01, "fraction = {}", fraction);
    }

    #[test]
    fn test_sliver_window_is_drawn_directly() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut h = Histogram1D::new(1000, 1., 5.);
        for i in 0..1000 {
            h.fill(1. + 0.004 * (i as f64 + 0.5), 1.);
        }

        let (low, high) = (3.0001, 3.0001 + 1e-12);
        assert!(h.integral_within(low, high) > 0.);
        for _ in 0..1000 {
            let x = h.sample_within(&mut rng, low, high).unwrap();
            assert!(x >= low && x <= high);
        }
    }
}
