//! Multi-factor behavioral deviation detection.
//!
//! Three independent sub-analyses, each a pure function over the batch:
//! off-hour access, per-path success-rate deviation, and contribution to
//! traffic spikes. Their findings are merged and gated by a shared
//! confidence floor.

use crate::detect::PatternConfig;
use crate::record::LogRecord;
use crate::stats::Series;
use crate::window::window_floor;
use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Minimum batch size for pattern analysis to be meaningful.
const MIN_RECORDS: usize = 10;
/// Minimum per-source sample before a source is profiled.
const MIN_SOURCE_RECORDS: usize = 5;
/// Hour share of total traffic above which an hour counts as typical.
const TYPICAL_HOUR_SHARE: f64 = 0.03;
/// Success-rate deviation from path baseline that qualifies a path.
const DEVIATION_THRESHOLD: f64 = 0.3;
/// Window z-score magnitude above which a window is a spike.
const SPIKE_Z: f64 = 2.5;
/// Share of spike-window traffic above which a source is a contributor.
const CONTRIBUTION_THRESHOLD: f64 = 0.2;

/// Per-path comparison of a source's success rate against the baseline.
#[derive(Debug, Clone, Serialize)]
pub struct PathDeviation {
    pub baseline_success: f64,
    pub observed_success: f64,
    pub deviation: f64,
    pub requests: u64,
}

/// Per-window activity of a source during a traffic spike.
#[derive(Debug, Clone, Serialize)]
pub struct WindowDetail {
    pub source_requests: u64,
    pub total_requests: u64,
    #[serde(serialize_with = "crate::detect::zscore::serialize")]
    pub z_score: f64,
}

/// A confidence-scored behavioral finding.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum UnusualPatternFinding {
    #[serde(rename = "unusual_hour_access")]
    OffHourAccess {
        source: String,
        /// Hours of day (0-23) outside the batch's typical traffic hours.
        unusual_hours: Vec<u32>,
        request_count: u64,
        unusual_count: u64,
        confidence: f64,
        explanation: String,
    },
    #[serde(rename = "unusual_error_rate")]
    PathStatusDeviation {
        source: String,
        affected_paths: Vec<String>,
        max_deviation: f64,
        path_details: BTreeMap<String, PathDeviation>,
        confidence: f64,
        explanation: String,
    },
    #[serde(rename = "unusual_request_rate")]
    TrafficContribution {
        source: String,
        /// Fraction of all spike-window traffic attributable to this source.
        contribution: f64,
        window_details: BTreeMap<String, WindowDetail>,
        confidence: f64,
        explanation: String,
    },
}

impl UnusualPatternFinding {
    pub fn confidence(&self) -> f64 {
        match self {
            Self::OffHourAccess { confidence, .. }
            | Self::PathStatusDeviation { confidence, .. }
            | Self::TrafficContribution { confidence, .. } => *confidence,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Self::OffHourAccess { source, .. }
            | Self::PathStatusDeviation { source, .. }
            | Self::TrafficContribution { source, .. } => source,
        }
    }
}

/// Run all three sub-analyses and merge their findings, sorted
/// descending by confidence. Batches under [`MIN_RECORDS`] yield empty.
pub fn detect(records: &[LogRecord], config: &PatternConfig) -> Vec<UnusualPatternFinding> {
    if records.len() < MIN_RECORDS {
        return Vec::new();
    }

    let mut findings = off_hour_access(records, config.min_confidence);
    findings.extend(path_status_deviation(records, config.min_confidence));
    findings.extend(spike_contribution(
        records,
        config.window_minutes,
        config.min_confidence,
    ));

    findings.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
    debug!(findings = findings.len(), "unusual pattern scan complete");
    findings
}

fn group_by_source(records: &[LogRecord]) -> BTreeMap<&str, Vec<&LogRecord>> {
    let mut groups: BTreeMap<&str, Vec<&LogRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.source.as_str()).or_default().push(record);
    }
    groups
}

/// Sources concentrating requests in hours where the batch as a whole is
/// quiet. Typical hours carry more than [`TYPICAL_HOUR_SHARE`] of the
/// batch; an hour is unusual for a source if it is outside that set and
/// the source has more than 2 requests in it.
fn off_hour_access(records: &[LogRecord], min_confidence: f64) -> Vec<UnusualPatternFinding> {
    let total = records.len() as f64;
    let mut hour_counts = [0u64; 24];
    let mut any_timestamp = false;
    for record in records {
        if let Some(ts) = record.timestamp {
            hour_counts[ts.hour() as usize] += 1;
            any_timestamp = true;
        }
    }
    if !any_timestamp {
        return Vec::new();
    }

    let typical_hours: Vec<u32> = (0..24)
        .filter(|&h| hour_counts[h as usize] as f64 > total * TYPICAL_HOUR_SHARE)
        .collect();

    let mut findings = Vec::new();
    for (source, group) in group_by_source(records) {
        if group.len() < MIN_SOURCE_RECORDS {
            continue;
        }
        let mut source_hours = [0u64; 24];
        for record in &group {
            if let Some(ts) = record.timestamp {
                source_hours[ts.hour() as usize] += 1;
            }
        }

        let unusual_hours: Vec<u32> = (0..24)
            .filter(|&h| !typical_hours.contains(&h) && source_hours[h as usize] > 2)
            .collect();
        if unusual_hours.is_empty() {
            continue;
        }

        let unusual_count: u64 = unusual_hours
            .iter()
            .map(|&h| source_hours[h as usize])
            .sum();
        let confidence =
            (unusual_count as f64 / (group.len() as f64 + 1.0) * 2.0).min(1.0);
        if confidence < min_confidence {
            continue;
        }

        findings.push(UnusualPatternFinding::OffHourAccess {
            explanation: format!(
                "Source {} made {} requests during unusual hours {:?}, when most traffic occurs during {:?}",
                source, unusual_count, unusual_hours, typical_hours
            ),
            source: source.to_string(),
            unusual_hours,
            request_count: group.len() as u64,
            unusual_count,
            confidence,
        });
    }
    findings
}

/// Sources whose per-path success rate deviates sharply from the
/// batch-wide baseline for that path.
fn path_status_deviation(records: &[LogRecord], min_confidence: f64) -> Vec<UnusualPatternFinding> {
    // Baseline success rate per path, restricted to paths with enough samples.
    let mut path_counts: HashMap<&str, (u64, u64)> = HashMap::new();
    for record in records {
        let entry = path_counts.entry(record.path.as_str()).or_default();
        entry.0 += 1;
        if !record.is_error() {
            entry.1 += 1;
        }
    }
    let baselines: HashMap<&str, f64> = path_counts
        .iter()
        .filter(|(_, &(count, _))| count >= MIN_SOURCE_RECORDS as u64)
        .map(|(&path, &(count, ok))| (path, ok as f64 / count as f64))
        .collect();
    if baselines.is_empty() {
        return Vec::new();
    }

    let mut findings = Vec::new();
    for (source, group) in group_by_source(records) {
        if group.len() < MIN_SOURCE_RECORDS {
            continue;
        }

        let mut per_path: HashMap<&str, (u64, u64)> = HashMap::new();
        for record in &group {
            let entry = per_path.entry(record.path.as_str()).or_default();
            entry.0 += 1;
            if !record.is_error() {
                entry.1 += 1;
            }
        }

        let mut details: BTreeMap<String, PathDeviation> = BTreeMap::new();
        for (path, (count, ok)) in per_path {
            if count < 3 {
                continue;
            }
            let Some(&baseline) = baselines.get(path) else {
                continue;
            };
            let observed = ok as f64 / count as f64;
            let deviation = (baseline - observed).abs();
            if deviation > DEVIATION_THRESHOLD {
                details.insert(
                    path.to_string(),
                    PathDeviation {
                        baseline_success: baseline,
                        observed_success: observed,
                        deviation,
                        requests: count,
                    },
                );
            }
        }
        if details.is_empty() {
            continue;
        }

        let total_unusual: u64 = details.values().map(|d| d.requests).sum();
        let max_deviation = details
            .values()
            .map(|d| d.deviation)
            .fold(0.0f64, f64::max);
        let confidence =
            (total_unusual as f64 / group.len() as f64 * max_deviation * 2.0).min(1.0);
        if confidence < min_confidence {
            continue;
        }

        findings.push(UnusualPatternFinding::PathStatusDeviation {
            explanation: format!(
                "Source {} has unusual success/error rates on {} paths, with up to {:.2} deviation from normal baseline",
                source,
                details.len(),
                max_deviation
            ),
            source: source.to_string(),
            affected_paths: details.keys().cloned().collect(),
            max_deviation,
            path_details: details,
            confidence,
        });
    }
    findings
}

/// Sources dominating windows whose request rate is a statistical outlier
/// for the batch.
fn spike_contribution(
    records: &[LogRecord],
    window_minutes: i64,
    min_confidence: f64,
) -> Vec<UnusualPatternFinding> {
    let mut window_counts: BTreeMap<DateTime<Utc>, u64> = BTreeMap::new();
    for record in records {
        if let Some(ts) = record.timestamp {
            *window_counts.entry(window_floor(ts, window_minutes)).or_default() += 1;
        }
    }
    if window_counts.len() < 3 {
        return Vec::new();
    }

    let counts = Series::new(window_counts.values().map(|&c| c as f64).collect());
    if counts.std_dev() == 0.0 {
        return Vec::new();
    }

    let spikes: BTreeMap<DateTime<Utc>, f64> = window_counts
        .iter()
        .filter_map(|(&window, &count)| {
            let z = counts.z_score(count as f64);
            (z.abs() > SPIKE_Z).then_some((window, z))
        })
        .collect();
    if spikes.is_empty() {
        return Vec::new();
    }

    let spike_total: u64 = spikes.keys().map(|w| window_counts[w]).sum();
    if spike_total == 0 {
        return Vec::new();
    }

    // Per source: per-window counts, restricted to timestamped activity.
    let mut source_windows: BTreeMap<&str, BTreeMap<DateTime<Utc>, u64>> = BTreeMap::new();
    for record in records {
        if let Some(ts) = record.timestamp {
            let window = window_floor(ts, window_minutes);
            *source_windows
                .entry(record.source.as_str())
                .or_default()
                .entry(window)
                .or_default() += 1;
        }
    }

    let mut findings = Vec::new();
    for (source, windows) in source_windows {
        // Single-window sources carry no rate pattern of their own.
        if windows.len() < 2 {
            continue;
        }
        let source_spike: u64 = spikes
            .keys()
            .filter_map(|w| windows.get(w))
            .sum();
        if source_spike == 0 {
            continue;
        }

        let contribution = source_spike as f64 / spike_total as f64;
        if contribution <= CONTRIBUTION_THRESHOLD {
            continue;
        }
        let confidence = (contribution * 1.5).min(1.0);
        if confidence < min_confidence {
            continue;
        }

        let window_details: BTreeMap<String, WindowDetail> = spikes
            .iter()
            .filter_map(|(window, &z)| {
                windows.get(window).map(|&count| {
                    (
                        window.format("%Y-%m-%d %H:%M:%S").to_string(),
                        WindowDetail {
                            source_requests: count,
                            total_requests: window_counts[window],
                            z_score: z,
                        },
                    )
                })
            })
            .collect();

        findings.push(UnusualPatternFinding::TrafficContribution {
            explanation: format!(
                "Source {} contributed {} requests during unusual traffic windows, accounting for {:.1}% of the unusual traffic",
                source,
                source_spike,
                contribution * 100.0
            ),
            source: source.to_string(),
            contribution,
            window_details,
            confidence,
        });
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record_at(source: &str, hour: u32, minute: i64, path: &str, status: u16) -> LogRecord {
        LogRecord {
            source: source.to_string(),
            timestamp: Some(
                Utc.with_ymd_and_hms(2025, 4, 17, hour, 0, 0).unwrap()
                    + chrono::Duration::minutes(minute),
            ),
            method: "GET".to_string(),
            path: path.to_string(),
            status,
            bytes: 100,
            referrer: None,
            user_agent: "test".to_string(),
        }
    }

    /// Daytime background: 100 requests per hour from 09:00 to 18:00,
    /// spread over distinct quiet sources.
    fn daytime_background() -> Vec<LogRecord> {
        let mut records = Vec::new();
        for hour in 9..19 {
            for i in 0..100 {
                records.push(record_at(
                    &format!("10.1.{}.{}", hour, i % 25),
                    hour,
                    (i % 60) as i64,
                    "/index.html",
                    200,
                ));
            }
        }
        records
    }

    #[test]
    fn test_off_hour_access_detected() {
        let mut records = daytime_background();
        // 40 requests at 02:00-04:00, 10 during normal hours.
        for i in 0..20 {
            records.push(record_at("203.0.113.8", 2, (i % 60) as i64, "/wp-admin", 200));
            records.push(record_at("203.0.113.8", 3, (i % 60) as i64, "/wp-admin", 200));
        }
        for i in 0..10 {
            records.push(record_at("203.0.113.8", 10, i, "/index.html", 200));
        }

        let findings = detect(&records, &PatternConfig::default());
        let off_hour = findings
            .iter()
            .find(|f| matches!(f, UnusualPatternFinding::OffHourAccess { .. }))
            .expect("off-hour finding expected");
        match off_hour {
            UnusualPatternFinding::OffHourAccess {
                source,
                unusual_hours,
                request_count,
                unusual_count,
                confidence,
                ..
            } => {
                assert_eq!(source, "203.0.113.8");
                assert!(unusual_hours.contains(&2));
                assert!(unusual_hours.contains(&3));
                assert_eq!(*request_count, 50);
                assert_eq!(*unusual_count, 40);
                assert!(*confidence >= 0.8);
                assert!(*confidence <= 1.0);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_path_status_deviation_detected() {
        let mut records = daytime_background();
        // Baseline on /login is healthy; one source fails every attempt.
        for i in 0..20 {
            records.push(record_at(&format!("10.2.0.{}", i % 10), 12, i, "/login", 200));
        }
        for i in 0..5 {
            records.push(record_at("198.51.100.7", 12, 30 + i, "/login", 401));
        }

        let findings = detect(&records, &PatternConfig::default());
        let deviation = findings
            .iter()
            .find(|f| matches!(f, UnusualPatternFinding::PathStatusDeviation { .. }))
            .expect("path deviation finding expected");
        match deviation {
            UnusualPatternFinding::PathStatusDeviation {
                source,
                affected_paths,
                max_deviation,
                path_details,
                confidence,
                ..
            } => {
                assert_eq!(source, "198.51.100.7");
                assert_eq!(affected_paths, &vec!["/login".to_string()]);
                assert!(*max_deviation > 0.3);
                let detail = &path_details["/login"];
                assert_eq!(detail.observed_success, 0.0);
                assert!(detail.baseline_success > 0.7);
                assert!(*confidence >= 0.8);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_spike_contribution_detected() {
        let mut records = Vec::new();
        // 20 quiet 5-minute windows, 10 requests each.
        for w in 0..20 {
            for i in 0..10 {
                records.push(record_at(
                    &format!("10.3.0.{}", i),
                    9,
                    w * 5 + (i as i64 % 5),
                    "/",
                    200,
                ));
            }
        }
        // Spike window at 11:40: 150 requests from one source, 50 background.
        for _ in 0..150 {
            records.push(record_at("203.0.113.2", 11, 41, "/api/flood", 200));
        }
        for i in 0..50 {
            records.push(record_at(&format!("10.3.0.{}", i % 10), 11, 42, "/", 200));
        }
        // The flooding source is also active in one quiet window.
        records.push(record_at("203.0.113.2", 9, 0, "/", 200));

        let findings = detect(&records, &PatternConfig::default());
        let spike = findings
            .iter()
            .find(|f| matches!(f, UnusualPatternFinding::TrafficContribution { .. }))
            .expect("spike contribution finding expected");
        match spike {
            UnusualPatternFinding::TrafficContribution {
                source,
                contribution,
                window_details,
                confidence,
                ..
            } => {
                assert_eq!(source, "203.0.113.2");
                assert!(*contribution > 0.2);
                assert!(*confidence >= 0.8);
                assert_eq!(window_details.len(), 1);
                let detail = window_details.values().next().unwrap();
                assert_eq!(detail.source_requests, 150);
                assert_eq!(detail.total_requests, 200);
                assert!(detail.z_score > 2.5);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_small_batch_yields_empty() {
        let records: Vec<LogRecord> = (0..9)
            .map(|i| record_at("10.0.0.1", 2, i, "/x", 500))
            .collect();
        assert!(detect(&records, &PatternConfig::default()).is_empty());
    }

    #[test]
    fn test_no_timestamps_degrades_to_path_analysis_only() {
        let mut records = Vec::new();
        for i in 0..20 {
            records.push(LogRecord {
                timestamp: None,
                ..record_at(&format!("10.4.0.{}", i % 10), 9, 0, "/login", 200)
            });
        }
        for _ in 0..5 {
            records.push(LogRecord {
                timestamp: None,
                ..record_at("198.51.100.9", 9, 0, "/login", 403)
            });
        }

        let findings = detect(&records, &PatternConfig::default());
        assert!(findings
            .iter()
            .all(|f| matches!(f, UnusualPatternFinding::PathStatusDeviation { .. })));
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_confidence_floor_gates_findings() {
        let mut records = daytime_background();
        for i in 0..20 {
            records.push(record_at("203.0.113.8", 2, i, "/wp-admin", 200));
            records.push(record_at("203.0.113.8", 3, i, "/wp-admin", 200));
        }

        let strict = PatternConfig {
            min_confidence: 1.01,
            ..PatternConfig::default()
        };
        assert!(detect(&records, &strict).is_empty());

        for finding in detect(&records, &PatternConfig::default()) {
            assert!(finding.confidence() >= 0.8);
            assert!(finding.confidence() <= 1.0);
        }
    }

    #[test]
    fn test_sorted_descending_by_confidence() {
        let mut records = daytime_background();
        for i in 0..20 {
            records.push(record_at("203.0.113.8", 2, i, "/wp-admin", 200));
            records.push(record_at("203.0.113.8", 3, i, "/wp-admin", 200));
        }
        for i in 0..20 {
            records.push(record_at(&format!("10.2.0.{}", i % 10), 12, i, "/login", 200));
        }
        for i in 0..5 {
            records.push(record_at("198.51.100.7", 12, 30 + i, "/login", 401));
        }

        let findings = detect(&records, &PatternConfig::default());
        for pair in findings.windows(2) {
            assert!(pair[0].confidence() >= pair[1].confidence());
        }
    }
}
