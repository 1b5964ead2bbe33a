//! Combined-format access-log line extraction.

use crate::record::{parse_timestamp, LogRecord};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

// nginx/Apache combined format:
// 203.0.113.9 - alice [17/Apr/2025:05:10:56 +0100] "GET /index.html HTTP/1.1" 200 512 "-" "curl/8.0"
fn standard_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^(\S+) - (\S+) \[(.*?)\] "(\S+) (.*?) (\S+)" (\d+) (\d+) "([^"]*)" "([^"]*)""#,
        )
        .expect("standard log regex is valid")
    })
}

// Malformed clients produce an empty request field: ... [ts] "" 400 0 "-" "-"
fn empty_request_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(\S+) - (\S+) \[(.*?)\] "" (\d+) (\d+) "([^"]*)" "([^"]*)""#)
            .expect("empty request regex is valid")
    })
}

fn optional_field(raw: &str) -> Option<String> {
    if raw.is_empty() || raw == "-" {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Parse raw access-log text into records, skipping lines that match
/// neither the standard nor the empty-request shape.
pub fn parse_lines(content: &str) -> Vec<LogRecord> {
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        if let Some(caps) = standard_line().captures(line) {
            records.push(LogRecord {
                source: caps[1].to_string(),
                timestamp: parse_timestamp(&caps[3]),
                method: caps[4].to_string(),
                path: caps[5].to_string(),
                status: caps[7].parse().unwrap_or(0),
                bytes: caps[8].parse().unwrap_or(0),
                referrer: optional_field(&caps[9]),
                user_agent: caps[10].to_string(),
            });
        } else if let Some(caps) = empty_request_line().captures(line) {
            records.push(LogRecord {
                source: caps[1].to_string(),
                timestamp: parse_timestamp(&caps[3]),
                method: String::new(),
                path: String::new(),
                status: caps[4].parse().unwrap_or(0),
                bytes: caps[5].parse().unwrap_or(0),
                referrer: optional_field(&caps[6]),
                user_agent: caps[7].to_string(),
            });
        } else {
            skipped += 1;
        }
    }

    if skipped > 0 {
        debug!(skipped, parsed = records.len(), "skipped unparseable log lines");
    }
    records
}

/// Headline totals for a parsed batch.
#[derive(Debug, Serialize)]
pub struct ParseSummary {
    pub total_requests: usize,
    pub unique_visitors: usize,
    pub total_bandwidth: u64,
}

impl ParseSummary {
    pub fn from_records(records: &[LogRecord]) -> Self {
        let unique: HashSet<&str> = records.iter().map(|r| r.source.as_str()).collect();
        Self {
            total_requests: records.len(),
            unique_visitors: unique.len(),
            total_bandwidth: records.iter().map(|r| r.bytes).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
203.0.113.9 - alice [17/Apr/2025:05:10:56 +0100] \"GET /index.html HTTP/1.1\" 200 512 \"-\" \"curl/8.0\"
198.51.100.4 - - [17/Apr/2025:05:11:02 +0100] \"POST /login HTTP/1.1\" 401 128 \"https://example.com/\" \"Mozilla/5.0\"
192.0.2.1 - - [17/Apr/2025:05:11:10 +0100] \"\" 400 0 \"-\" \"-\"
this line is garbage
";

    #[test]
    fn test_parses_standard_lines() {
        let records = parse_lines(SAMPLE);
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.source, "203.0.113.9");
        assert_eq!(first.method, "GET");
        assert_eq!(first.path, "/index.html");
        assert_eq!(first.status, 200);
        assert_eq!(first.bytes, 512);
        assert!(first.referrer.is_none());
        assert_eq!(first.user_agent, "curl/8.0");
        assert_eq!(
            first.timestamp.unwrap().to_rfc3339(),
            "2025-04-17T04:10:56+00:00"
        );

        let second = &records[1];
        assert_eq!(second.referrer.as_deref(), Some("https://example.com/"));
        assert!(second.is_error());
    }

    #[test]
    fn test_parses_empty_request_variant() {
        let records = parse_lines(SAMPLE);
        let empty = &records[2];
        assert_eq!(empty.source, "192.0.2.1");
        assert_eq!(empty.method, "");
        assert_eq!(empty.path, "");
        assert_eq!(empty.status, 400);
    }

    #[test]
    fn test_summary_totals() {
        let records = parse_lines(SAMPLE);
        let summary = ParseSummary::from_records(&records);
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.unique_visitors, 3);
        assert_eq!(summary.total_bandwidth, 640);
    }

    #[test]
    fn test_garbage_lines_are_skipped() {
        let records = parse_lines("garbage\n\n   \nmore garbage\n");
        assert!(records.is_empty());
    }
}
