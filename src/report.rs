//! Per-run accounting, logged as JSON when a run completes.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Counts for one fully processed source file.
#[derive(Debug, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub lines: u64,
    pub entries: u64,
    pub buckets: usize,
    pub elapsed_ms: u128,
}

/// Whole-run accounting across all sources.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub total_lines: u64,
    pub total_entries: u64,
}

impl RunReport {
    pub fn new() -> Self {
        RunReport {
            started_at: Utc::now(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, source: SourceReport) {
        self.total_lines += source.lines;
        self.total_entries += source.entries;
        self.sources.push(source);
    }
}

/// Logs the run report as pretty-printed JSON.
pub fn print_json(report: &RunReport) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
