//! logvigil -- Statistical anomaly detection for web server access logs.
//!
//! This crate provides the core library for parsing access-log records
//! and analyzing a batch for three classes of suspicious behavior:
//! error-rate bursts, abnormally high-traffic sources, and multi-factor
//! behavioral deviations.
//!
//! The engine is a pure, stateless batch computation: every threshold is
//! re-derived from the batch itself using closed-form statistics, and
//! nothing persists between runs.

pub mod detect;
pub mod parser;
pub mod record;
pub mod report;
pub mod stats;
pub mod window;

pub use detect::{AnalysisConfig, BurstConfig, PatternConfig, TrafficConfig};
pub use detect::{ErrorBurstFinding, HighTrafficFinding, UnusualPatternFinding};
pub use record::LogRecord;
pub use report::{analyze, analyze_json, analyze_records, AnalysisReport, ReportStatus};
