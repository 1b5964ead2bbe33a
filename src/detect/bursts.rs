//! Error-burst detection: windows with abnormal error-response density.

use crate::detect::BurstConfig;
use crate::record::LogRecord;
use crate::stats::Series;
use crate::window::{window_end, window_floor};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// A time window whose error count statistically exceeds the baseline.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBurstFinding {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub error_count: u64,
    /// Distinct source addresses that produced errors in the window.
    pub source_count: usize,
    pub status_codes: BTreeMap<u16, u64>,
    pub threshold: f64,
    pub mean_errors: f64,
    #[serde(serialize_with = "crate::detect::zscore::serialize")]
    pub z_score: f64,
    pub explanation: String,
}

/// Flag windows where the error count exceeds `mean + factor * std_dev`
/// of the per-window error-count distribution, subject to the
/// `min_errors` floor.
///
/// Each window is scored against a baseline built from the *other*
/// windows, so a massive burst cannot inflate the very statistics it is
/// being compared to. With zero baseline spread the threshold falls back
/// to `mean * factor` and the z-score becomes the infinity sentinel.
/// Findings come back sorted descending by error count; degenerate
/// batches yield an empty list, never an error.
pub fn detect(records: &[LogRecord], config: &BurstConfig) -> Vec<ErrorBurstFinding> {
    // Only timestamped error responses participate in windowing.
    let errors: Vec<&LogRecord> = records
        .iter()
        .filter(|r| r.is_error() && r.timestamp.is_some())
        .collect();
    if errors.is_empty() {
        return Vec::new();
    }

    let mut window_counts: BTreeMap<DateTime<Utc>, u64> = BTreeMap::new();
    for record in &errors {
        let window = window_floor(record.timestamp.unwrap(), config.window_minutes);
        *window_counts.entry(window).or_default() += 1;
    }

    // A single window gives no baseline to compare against.
    if window_counts.len() < 2 {
        return Vec::new();
    }

    let all_counts: Vec<f64> = window_counts.values().map(|&c| c as f64).collect();

    let mut bursts = Vec::new();
    for (idx, (&start, &count)) in window_counts.iter().enumerate() {
        let rest: Vec<f64> = all_counts
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != idx)
            .map(|(_, &c)| c)
            .collect();
        let baseline = Series::new(rest);
        let mean = baseline.mean();
        let std = baseline.std_dev();

        let threshold = if std == 0.0 {
            (config.min_errors as f64).max(mean * config.threshold_factor)
        } else {
            (config.min_errors as f64).max(mean + config.threshold_factor * std)
        };

        if (count as f64) < threshold {
            continue;
        }

        let end = window_end(start, config.window_minutes);

        // Re-scan the error set for the exact half-open window so the
        // evidence matches the boundaries reported to the caller.
        let in_window: Vec<&&LogRecord> = errors
            .iter()
            .filter(|r| {
                let ts = r.timestamp.unwrap();
                ts >= start && ts < end
            })
            .collect();

        let sources: HashSet<&str> = in_window.iter().map(|r| r.source.as_str()).collect();
        let mut status_codes: BTreeMap<u16, u64> = BTreeMap::new();
        for record in &in_window {
            *status_codes.entry(record.status).or_default() += 1;
        }

        bursts.push(ErrorBurstFinding {
            window_start: start,
            window_end: end,
            error_count: count,
            source_count: sources.len(),
            status_codes,
            threshold,
            mean_errors: mean,
            z_score: baseline.z_score(count as f64),
            explanation: format!(
                "Found {} errors in a {}-minute window, which exceeds the threshold of {:.2} (baseline: {:.2} errors)",
                count, config.window_minutes, threshold, mean
            ),
        });
    }

    bursts.sort_by(|a, b| b.error_count.cmp(&a.error_count));
    debug!(bursts = bursts.len(), windows = window_counts.len(), "error burst scan complete");
    bursts
}
