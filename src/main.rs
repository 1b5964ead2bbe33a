use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use logvigil::detect::{AnalysisConfig, BurstConfig, PatternConfig, TrafficConfig};
use logvigil::parser::ParseSummary;
use logvigil::record::LogRecord;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "logvigil",
    about = "Statistical anomaly detection for web server access logs",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum InputFormat {
    /// Decide from the file content
    Auto,
    /// JSON array of record objects
    Json,
    /// Raw combined-format access log
    Combined,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a log file and report anomalies
    Analyze {
        /// Input file (JSON records or raw access log)
        #[arg(long)]
        input: PathBuf,

        /// Input format
        #[arg(long, value_enum, default_value_t = InputFormat::Auto)]
        format: InputFormat,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,

        /// Error-burst window size in minutes
        #[arg(long, default_value = "5")]
        burst_window: i64,

        /// Standard-deviation multiplier for the burst threshold
        #[arg(long, default_value = "2.0")]
        burst_factor: f64,

        /// Minimum error count for a window to qualify as a burst
        #[arg(long, default_value = "3")]
        min_errors: u64,

        /// High-traffic rate window size in minutes
        #[arg(long, default_value = "60")]
        rate_window: i64,

        /// IQR multiplier for the high-traffic threshold
        #[arg(long, default_value = "2.5")]
        iqr_factor: f64,

        /// Minimum peak request count for a source to qualify
        #[arg(long, default_value = "20")]
        min_requests: u64,

        /// Pattern-analysis window size in minutes
        #[arg(long, default_value = "5")]
        pattern_window: i64,

        /// Minimum confidence for unusual-pattern findings
        #[arg(long, default_value = "0.8")]
        min_confidence: f64,
    },

    /// Parse a log file and print records plus summary totals
    Parse {
        /// Input file (raw access log)
        #[arg(long)]
        input: PathBuf,

        /// Print at most this many records (0 = all)
        #[arg(long, default_value = "0")]
        limit: usize,
    },
}

fn load_records(input: &PathBuf, format: InputFormat) -> Result<Vec<LogRecord>> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    let format = match format {
        InputFormat::Auto => {
            if content.trim_start().starts_with('[') {
                InputFormat::Json
            } else {
                InputFormat::Combined
            }
        }
        other => other,
    };

    match format {
        InputFormat::Json => {
            let value: serde_json::Value =
                serde_json::from_str(&content).context("input is not valid JSON")?;
            logvigil::record::records_from_json(&value).map_err(Into::into)
        }
        InputFormat::Combined => Ok(logvigil::parser::parse_lines(&content)),
        InputFormat::Auto => unreachable!(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            format,
            json,
            burst_window,
            burst_factor,
            min_errors,
            rate_window,
            iqr_factor,
            min_requests,
            pattern_window,
            min_confidence,
        } => {
            tracing::info!(input = %input.display(), "Analyzing log file");
            let records = load_records(&input, format)?;
            let config = AnalysisConfig {
                bursts: BurstConfig {
                    window_minutes: burst_window,
                    threshold_factor: burst_factor,
                    min_errors,
                },
                traffic: TrafficConfig {
                    window_minutes: rate_window,
                    iqr_factor,
                    min_requests,
                },
                patterns: PatternConfig {
                    window_minutes: pattern_window,
                    min_confidence,
                },
            };

            let report = logvigil::analyze(records, config).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nlogvigil Anomaly Report");
                println!("Status: {:?}", report.status);
                println!("{}", report.message);

                if !report.error_bursts.is_empty() {
                    println!("\n=== Error Bursts ===");
                    for burst in &report.error_bursts {
                        println!(
                            "{} - {} | {:>5} errors | {:>3} sources | z={:.1}",
                            burst.window_start.format("%Y-%m-%d %H:%M"),
                            burst.window_end.format("%H:%M"),
                            burst.error_count,
                            burst.source_count,
                            burst.z_score
                        );
                    }
                }

                if !report.high_traffic_ips.is_empty() {
                    println!("\n=== High-Traffic Sources ===");
                    println!("{:<40} | {:>8} | {:>11} | Share", "Source", "Requests", "Peak/Window");
                    for finding in &report.high_traffic_ips {
                        println!(
                            "{:<40} | {:>8} | {:>11} | {:.1}%",
                            finding.source,
                            finding.request_count,
                            finding.max_rate_per_window,
                            finding.traffic_percentage
                        );
                    }
                }

                if !report.unusual_patterns.is_empty() {
                    println!("\n=== Unusual Patterns ===");
                    for pattern in &report.unusual_patterns {
                        println!(
                            "[{:.2}] {}",
                            pattern.confidence(),
                            match pattern {
                                logvigil::UnusualPatternFinding::OffHourAccess { explanation, .. }
                                | logvigil::UnusualPatternFinding::PathStatusDeviation { explanation, .. }
                                | logvigil::UnusualPatternFinding::TrafficContribution { explanation, .. } =>
                                    explanation,
                            }
                        );
                    }
                }
                println!();
            }
        }
        Commands::Parse { input, limit } => {
            tracing::info!(input = %input.display(), "Parsing log file");
            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let records = logvigil::parser::parse_lines(&content);
            let summary = ParseSummary::from_records(&records);

            let shown: Vec<&LogRecord> = if limit > 0 {
                records.iter().take(limit).collect()
            } else {
                records.iter().collect()
            };
            let output = serde_json::json!({
                "summary": summary,
                "entries": shown,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
