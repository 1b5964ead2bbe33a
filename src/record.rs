//! Structured access-log records and batch coercion.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invalid data format: expected a non-empty array of record objects")]
    InvalidShape,
}

/// One parsed access-log entry.
///
/// Deserialization is lenient by design: a missing or unparseable
/// `dateTime` becomes `None` and optional fields default, so a partially
/// populated upstream export degrades individual detectors instead of
/// failing the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(alias = "ipAddress", alias = "ip_address", default)]
    pub source: String,

    #[serde(
        alias = "dateTime",
        alias = "date_time",
        default,
        deserialize_with = "lenient_timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub method: String,

    #[serde(default)]
    pub path: String,

    #[serde(alias = "statusCode", alias = "status_code", default)]
    pub status: u16,

    #[serde(default)]
    pub bytes: u64,

    #[serde(alias = "referer", default)]
    pub referrer: Option<String>,

    #[serde(alias = "userAgent", alias = "user_agent", default)]
    pub user_agent: String,
}

impl LogRecord {
    /// Error responses are 4xx and 5xx.
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

/// Parse a timestamp string in any of the shapes upstream tooling emits.
///
/// Tries RFC 3339, then naive ISO-8601 (assumed UTC), then the raw
/// access-log clock (`17/Apr/2025:05:10:56 +0100`). Anything else is
/// treated as missing.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%d/%b/%Y:%H:%M:%S %z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%d/%b/%Y:%H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    // Accept any JSON shape here; non-string and unparseable values are
    // simply missing timestamps.
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(parse_timestamp))
}

/// Coerce a raw JSON value into a record batch.
///
/// Accepts a non-empty array of objects; each element deserializes with
/// the leniency documented on [`LogRecord`]. Anything else is an
/// [`BatchError::InvalidShape`], which the orchestrator turns into an
/// error-status report rather than a fault.
pub fn records_from_json(value: &serde_json::Value) -> Result<Vec<LogRecord>, BatchError> {
    let items = match value.as_array() {
        Some(items) if !items.is_empty() => items,
        _ => return Err(BatchError::InvalidShape),
    };

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        if !item.is_object() {
            return Err(BatchError::InvalidShape);
        }
        let record = LogRecord::deserialize(item).map_err(|_| BatchError::InvalidShape)?;
        records.push(record);
    }
    Ok(records)
}
