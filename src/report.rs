//! Report assembly: batch validation, detector fan-out, result merge.

use crate::detect::{self, AnalysisConfig, ErrorBurstFinding, HighTrafficFinding, UnusualPatternFinding};
use crate::record::{self, LogRecord};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Error,
}

/// The unified result of one analysis run.
#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub error_bursts: Vec<ErrorBurstFinding>,
    pub high_traffic_ips: Vec<HighTrafficFinding>,
    pub unusual_patterns: Vec<UnusualPatternFinding>,
    pub status: ReportStatus,
    pub message: String,
}

impl AnalysisReport {
    fn error(message: impl Into<String>) -> Self {
        Self {
            error_bursts: Vec::new(),
            high_traffic_ips: Vec::new(),
            unusual_patterns: Vec::new(),
            status: ReportStatus::Error,
            message: message.into(),
        }
    }

    fn assemble(
        error_bursts: Vec<ErrorBurstFinding>,
        high_traffic_ips: Vec<HighTrafficFinding>,
        unusual_patterns: Vec<UnusualPatternFinding>,
    ) -> Self {
        let message = format!(
            "Analysis complete: {} error bursts, {} high traffic IPs, {} unusual patterns",
            error_bursts.len(),
            high_traffic_ips.len(),
            unusual_patterns.len()
        );
        info!(
            bursts = error_bursts.len(),
            high_traffic = high_traffic_ips.len(),
            patterns = unusual_patterns.len(),
            "anomaly detection complete"
        );
        Self {
            error_bursts,
            high_traffic_ips,
            unusual_patterns,
            status: ReportStatus::Success,
            message,
        }
    }
}

/// Analyze a structured batch synchronously.
///
/// Pure over its input: the same batch and configuration always produce
/// the same report, regardless of detector invocation order. An empty
/// batch yields a successful report with no findings.
pub fn analyze_records(records: &[LogRecord], config: &AnalysisConfig) -> AnalysisReport {
    info!(records = records.len(), "starting anomaly detection analysis");
    AnalysisReport::assemble(
        detect::bursts::detect(records, &config.bursts),
        detect::traffic::detect(records, &config.traffic),
        detect::patterns::detect(records, &config.patterns),
    )
}

/// Analyze a raw JSON value, coercing it into a record batch first.
///
/// An empty array or an unrecognized shape produces an error-status
/// report with empty finding lists; nothing escapes as a fault.
pub fn analyze_json(value: &serde_json::Value, config: &AnalysisConfig) -> AnalysisReport {
    match record::records_from_json(value) {
        Ok(records) => analyze_records(&records, config),
        Err(err) => {
            info!(%err, "rejecting batch");
            AnalysisReport::error("Invalid data format for anomaly detection")
        }
    }
}

/// Analyze a structured batch with the three detectors running
/// concurrently on blocking tasks.
///
/// The detectors are read-only over a shared snapshot and independent of
/// one another; the result is identical to [`analyze_records`].
pub async fn analyze(records: Vec<LogRecord>, config: AnalysisConfig) -> AnalysisReport {
    info!(records = records.len(), "starting anomaly detection analysis");
    let records = Arc::new(records);

    let bursts = {
        let records = Arc::clone(&records);
        let config = config.bursts.clone();
        tokio::task::spawn_blocking(move || detect::bursts::detect(&records, &config))
    };
    let traffic = {
        let records = Arc::clone(&records);
        let config = config.traffic.clone();
        tokio::task::spawn_blocking(move || detect::traffic::detect(&records, &config))
    };
    let patterns = {
        let records = Arc::clone(&records);
        let config = config.patterns.clone();
        tokio::task::spawn_blocking(move || detect::patterns::detect(&records, &config))
    };

    match tokio::try_join!(bursts, traffic, patterns) {
        Ok((bursts, traffic, patterns)) => AnalysisReport::assemble(bursts, traffic, patterns),
        // Join failure means a detector task panicked; keep the contract
        // that nothing escapes the orchestrator boundary.
        Err(err) => AnalysisReport::error(format!("analysis task failed: {err}")),
    }
}
