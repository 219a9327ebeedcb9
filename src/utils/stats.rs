//! Summary statistics over scalar samples
//!
//! Shared by advantage normalization and evaluation aggregation.

/// Mean and population standard deviation of `values`
///
/// Returns `(0.0, 0.0)` for an empty slice.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Online summary using Welford's algorithm
///
/// Tracks count, mean, variance, min and max in one pass.
#[derive(Debug, Clone, Copy)]
pub struct Welford {
    count: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for Welford {
    fn default() -> Self {
        Self { count: 0, mean: 0.0, m2: 0.0, min: f64::INFINITY, max: f64::NEG_INFINITY }
    }
}

impl Welford {
    /// Empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Number of samples seen
    pub fn count(&self) -> usize {
        self.count
    }

    /// Sample mean, 0 when empty
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation, 0 when empty
    pub fn std(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }

    /// Smallest sample, 0 when empty
    pub fn min(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.min }
    }

    /// Largest sample, 0 when empty
    pub fn max(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.max }
    }
}

impl FromIterator<f64> for Welford {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut acc = Self::new();
        for value in iter {
            acc.push(value);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_std() {
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-12);
        assert!((std - 2.0).abs() < 1e-12);
        assert_eq!(mean_std(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_welford_matches_two_pass() {
        let values = [1.5, -3.0, 8.25, 0.0, 2.0];
        let acc: Welford = values.iter().copied().collect();
        let (mean, std) = mean_std(&values);

        assert_eq!(acc.count(), 5);
        assert!((acc.mean() - mean).abs() < 1e-12);
        assert!((acc.std() - std).abs() < 1e-12);
        assert_eq!(acc.min(), -3.0);
        assert_eq!(acc.max(), 8.25);
    }

    #[test]
    fn test_welford_empty() {
        let acc = Welford::new();
        assert_eq!(acc.count(), 0);
        assert_eq!((acc.mean(), acc.std(), acc.min(), acc.max()), (0.0, 0.0, 0.0, 0.0));
    }
}
