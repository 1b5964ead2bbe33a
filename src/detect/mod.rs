//! Anomaly detectors over a batch of access-log records.
//!
//! The three detectors are independent, read-only over the batch, and
//! infallible: statistical degeneracy or missing fields shrink the
//! result to an empty list instead of producing an error.

pub mod bursts;
pub mod patterns;
pub mod traffic;

pub use bursts::ErrorBurstFinding;
pub use patterns::UnusualPatternFinding;
pub use traffic::HighTrafficFinding;

/// Tuning for the error-burst detector.
#[derive(Debug, Clone)]
pub struct BurstConfig {
    /// Window length for error bucketing, in minutes.
    pub window_minutes: i64,
    /// Standard deviations above the mean before a window counts as a burst.
    pub threshold_factor: f64,
    /// Absolute floor: never flag a window with fewer errors than this.
    pub min_errors: u64,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            window_minutes: 5,
            threshold_factor: 2.0,
            min_errors: 3,
        }
    }
}

/// Tuning for the high-traffic source detector.
#[derive(Debug, Clone)]
pub struct TrafficConfig {
    /// Window length for per-source rate calculation, in minutes.
    pub window_minutes: i64,
    /// IQR multiplier above Q3 before a peak rate counts as an outlier.
    pub iqr_factor: f64,
    /// Absolute floor: never flag a source peaking below this many requests.
    pub min_requests: u64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            window_minutes: 60,
            iqr_factor: 2.5,
            min_requests: 20,
        }
    }
}

/// Tuning for the unusual-pattern detector.
#[derive(Debug, Clone)]
pub struct PatternConfig {
    /// Window length for the traffic-spike sub-analysis, in minutes.
    pub window_minutes: i64,
    /// Findings below this confidence are dropped.
    pub min_confidence: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            window_minutes: 5,
            min_confidence: 0.8,
        }
    }
}

/// Full configuration surface for one analysis run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfig {
    pub bursts: BurstConfig,
    pub traffic: TrafficConfig,
    pub patterns: PatternConfig,
}

/// Serde helper for z-score fields.
///
/// Zero-variance baselines yield `f64::INFINITY`, which `serde_json`
/// would flatten to `null`. Every serialized z-score instead goes
/// through this module so non-finite values appear as the strings
/// `"Infinity"` / `"-Infinity"`, distinguishable from ordinary floats.
pub(crate) mod zscore {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if *value > 0.0 {
            serializer.serialize_str("Infinity")
        } else {
            serializer.serialize_str("-Infinity")
        }
    }
}
