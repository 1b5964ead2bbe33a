//! Descriptive statistics over small numeric samples.

/// A sample of observations used to derive detection thresholds.
pub struct Series {
    values: Vec<f64>,
}

impl Series {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Sample standard deviation (ddof = 1). Zero for fewer than two samples.
    pub fn std_dev(&self) -> f64 {
        let n = self.values.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.values.iter().map(|&x| (x - mean).powi(2)).sum();
        (sum_sq_diff / (n - 1) as f64).sqrt()
    }

    /// Quantile by linear interpolation between order statistics.
    /// `q` is clamped to [0, 1]. Zero for an empty sample.
    pub fn quantile(&self, q: f64) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);
        let q = q.clamp(0.0, 1.0);
        let pos = q * (sorted.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        if lo == hi {
            return sorted[lo];
        }
        let frac = pos - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }

    /// Z-score of a value against this sample.
    ///
    /// With zero spread any deviation from the mean is reported as an
    /// infinite Z; a value equal to the mean scores zero.
    pub fn z_score(&self, value: f64) -> f64 {
        let std = self.std_dev();
        if std == 0.0 {
            if (value - self.mean()).abs() > f64::EPSILON {
                return f64::INFINITY;
            }
            return 0.0;
        }
        (value - self.mean()) / std
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        let s = Series::new(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(s.mean(), 3.0);
        // Sample variance of 1..5 is 2.5, std ~ 1.581
        assert!((s.std_dev() - 2.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_quantiles_interpolate() {
        let s = Series::new(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(s.quantile(0.25), 1.75);
        assert_eq!(s.quantile(0.75), 3.25);
        assert_eq!(s.quantile(0.0), 1.0);
        assert_eq!(s.quantile(1.0), 4.0);
    }

    #[test]
    fn test_z_score_zero_spread_is_infinite() {
        let s = Series::new(vec![2.0, 2.0, 2.0]);
        assert!(s.z_score(5.0).is_infinite());
        assert_eq!(s.z_score(2.0), 0.0);
    }

    #[test]
    fn test_z_score() {
        let s = Series::new(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        // (10 - 3) / 1.581 ~ 4.43
        let z = s.z_score(10.0);
        assert!(z > 4.4 && z < 4.5);
    }

    #[test]
    fn test_empty_sample() {
        let s = Series::new(vec![]);
        assert!(s.is_empty());
        assert_eq!(s.mean(), 0.0);
        assert_eq!(s.std_dev(), 0.0);
        assert_eq!(s.quantile(0.5), 0.0);
    }
}
