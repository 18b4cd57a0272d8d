//! CLI entry point for the traffic re-bucketing tool.
//!
//! Provides subcommands for fanning raw sample columns out to per-index
//! bucket files and for aggregating source intervals into coarser
//! weekday-labelled buckets.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use traffic_rebucket::bucketing::driver::process_source;
use traffic_rebucket::bucketing::naming::{NamingPolicy, start_of_week};
use traffic_rebucket::config::{IntervalConfig, WeekdayFilter};
use traffic_rebucket::progress::ConsoleProgress;
use traffic_rebucket::report::{RunReport, print_json};

#[derive(Parser)]
#[command(name = "traffic_rebucket")]
#[command(about = "Re-buckets gzipped traffic-speed CSV feeds by time-of-week bucket", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fan every sample column out to its own raw-index bucket file
    Split {
        /// Gzip-compressed CSV files to process, space separated
        #[arg(long, required = true, value_delimiter = ' ', num_args = 1..)]
        sources: Vec<PathBuf>,

        /// Directory for per-bucket output files, created if absent
        #[arg(long)]
        destination: PathBuf,

        /// Input lines between flushes; 0 flushes every line
        #[arg(long, default_value_t = 5000)]
        batch: u64,

        /// Expected line count across all sources, used only to size the
        /// progress percentage (e.g. from an external `zcat | wc -l`)
        #[arg(long = "totalLines")]
        total_lines: Option<u64>,
    },
    /// Aggregate source intervals into coarser weekday-HHMM buckets
    Aggregate {
        /// Gzip-compressed CSV files to process, space separated
        #[arg(long, required = true, value_delimiter = ' ', num_args = 1..)]
        sources: Vec<PathBuf>,

        /// Directory for per-bucket output files, created if absent
        #[arg(long)]
        destination: PathBuf,

        /// Input lines between flushes; 0 flushes every line
        #[arg(long, default_value_t = 625)]
        batch: u64,

        /// Minutes represented by one input sample column
        #[arg(long = "sourceInterval", default_value_t = 5)]
        source_interval: u32,

        /// Minutes represented by one output bucket; must be a multiple of
        /// the source interval
        #[arg(long = "targetInterval", default_value_t = 5)]
        target_interval: u32,

        /// Comma-separated weekday indices (0-6) to retain
        #[arg(long, value_delimiter = ',', default_values_t = [0u8, 1, 2, 3, 4, 5, 6])]
        weekdays: Vec<u8>,

        /// Expected line count across all sources, used only to size the
        /// progress percentage (e.g. from an external `zcat | wc -l`)
        #[arg(long = "totalLines")]
        total_lines: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/traffic_rebucket.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("traffic_rebucket.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Split {
            sources,
            destination,
            batch,
            total_lines,
        } => {
            run(
                &sources,
                &destination,
                batch,
                IntervalConfig::identity(),
                WeekdayFilter::all(),
                NamingPolicy::Raw,
                total_lines,
            )
            .await?;
        }
        Commands::Aggregate {
            sources,
            destination,
            batch,
            source_interval,
            target_interval,
            weekdays,
            total_lines,
        } => {
            // Config validation happens before any I/O.
            let intervals = IntervalConfig::new(source_interval, target_interval)?;
            let weekdays = WeekdayFilter::from_indices(&weekdays)?;

            let naming = NamingPolicy::WeekdayTime {
                week_start: start_of_week(Local::now().date_naive()),
                target_interval,
            };

            run(
                &sources,
                &destination,
                batch,
                intervals,
                weekdays,
                naming,
                total_lines,
            )
            .await?;
        }
    }

    Ok(())
}

/// Processes the sources strictly one after another, sharing one progress
/// reporter so the parsed-line count is cumulative across the whole run.
async fn run(
    sources: &[PathBuf],
    destination: &Path,
    batch: u64,
    intervals: IntervalConfig,
    weekdays: WeekdayFilter,
    naming: NamingPolicy,
    total_lines: Option<u64>,
) -> Result<()> {
    let started = Instant::now();

    std::fs::create_dir_all(destination)?;
    info!(destination = %destination.display(), "Destination directory ready");

    let mut progress = ConsoleProgress::new(total_lines);
    let mut report = RunReport::new();

    for source in sources {
        let source_report = process_source(
            source,
            destination,
            batch,
            &intervals,
            &weekdays,
            naming.clone(),
            &mut progress,
        )
        .await?;

        report.push(source_report);
    }

    progress.finish();
    print_json(&report)?;
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "Finished");

    Ok(())
}
