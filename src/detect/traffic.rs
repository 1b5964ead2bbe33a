//! High-traffic source detection via interquartile-range thresholding.

use crate::detect::TrafficConfig;
use crate::record::LogRecord;
use crate::stats::Series;
use crate::window::window_floor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Requests to one path, used for the top-paths breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct PathCount {
    pub path: String,
    pub count: u64,
}

/// A source address whose peak request rate is an outlier.
#[derive(Debug, Clone, Serialize)]
pub struct HighTrafficFinding {
    pub source: String,
    pub request_count: u64,
    pub max_rate_per_window: u64,
    /// Share of the whole batch attributable to this source, in percent.
    pub traffic_percentage: f64,
    pub threshold: f64,
    pub q3: f64,
    pub iqr: f64,
    pub status_codes: BTreeMap<u16, u64>,
    /// Up to five most-requested paths, descending by count.
    pub top_paths: Vec<PathCount>,
    pub explanation: String,
}

/// Flag sources whose peak per-window request rate exceeds
/// `Q3 + factor * IQR` of the peak-rate distribution, subject to the
/// `min_requests` floor.
///
/// Peak-rate distributions across sources are right-skewed with extreme
/// outliers; quartiles stay put where mean and standard deviation would
/// be dragged up by the very sources being searched for. Without
/// timestamps a source's peak rate is its total count. Returns findings
/// sorted descending by peak rate.
pub fn detect(records: &[LogRecord], config: &TrafficConfig) -> Vec<HighTrafficFinding> {
    if records.is_empty() {
        return Vec::new();
    }

    let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
    for record in records {
        *totals.entry(record.source.as_str()).or_default() += 1;
    }

    // One source is its own baseline; nothing to compare.
    if totals.len() < 2 {
        return Vec::new();
    }

    let mut peaks: BTreeMap<&str, u64> = BTreeMap::new();
    if records.iter().any(|r| r.timestamp.is_some()) {
        let mut per_window: HashMap<(&str, DateTime<Utc>), u64> = HashMap::new();
        for record in records {
            if let Some(ts) = record.timestamp {
                let window = window_floor(ts, config.window_minutes);
                *per_window.entry((record.source.as_str(), window)).or_default() += 1;
            }
        }
        for ((source, _), count) in per_window {
            let peak = peaks.entry(source).or_default();
            *peak = (*peak).max(count);
        }
        // A source with no timestamped records still gets a rate: its total.
        for (&source, &total) in &totals {
            peaks.entry(source).or_insert(total);
        }
    } else {
        peaks = totals.clone();
    }

    let rates = Series::new(peaks.values().map(|&p| p as f64).collect());
    let q1 = rates.quantile(0.25);
    let q3 = rates.quantile(0.75);
    let iqr = q3 - q1;

    let threshold = if iqr > 0.0 {
        q3 + config.iqr_factor * iqr
    } else {
        rates.mean() * config.iqr_factor
    };
    let threshold = (config.min_requests as f64).max(threshold);

    let batch_total = records.len() as f64;
    let mut findings = Vec::new();
    for (&source, &peak) in &peaks {
        if (peak as f64) < threshold {
            continue;
        }
        let total = totals[source];

        let mut status_codes: BTreeMap<u16, u64> = BTreeMap::new();
        let mut path_counts: HashMap<&str, u64> = HashMap::new();
        for record in records.iter().filter(|r| r.source == source) {
            *status_codes.entry(record.status).or_default() += 1;
            *path_counts.entry(record.path.as_str()).or_default() += 1;
        }

        let mut top_paths: Vec<PathCount> = path_counts
            .into_iter()
            .map(|(path, count)| PathCount {
                path: path.to_string(),
                count,
            })
            .collect();
        top_paths.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.path.cmp(&b.path)));
        top_paths.truncate(5);

        findings.push(HighTrafficFinding {
            source: source.to_string(),
            request_count: total,
            max_rate_per_window: peak,
            traffic_percentage: total as f64 / batch_total * 100.0,
            threshold,
            q3,
            iqr,
            status_codes,
            top_paths,
            explanation: format!(
                "Source {} made {} requests with a maximum rate of {} requests per {}-minute window, which exceeds the threshold of {:.2} (Q3: {:.2}, IQR: {:.2})",
                source, total, peak, config.window_minutes, threshold, q3, iqr
            ),
        });
    }

    findings.sort_by(|a, b| {
        b.max_rate_per_window
            .cmp(&a.max_rate_per_window)
            .then_with(|| a.source.cmp(&b.source))
    });
    debug!(flagged = findings.len(), threshold, q3, iqr, "high traffic scan complete");
    findings
}
