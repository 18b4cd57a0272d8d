use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use tracing::debug;

use super::accumulator::BucketAccumulator;
use super::aggregate::aggregate_line;
use super::naming::NamingPolicy;
use super::writer::BucketWriter;
use crate::config::{IntervalConfig, WeekdayFilter};
use crate::progress::ProgressSink;
use crate::report::SourceReport;

/// Streams one gzipped source through the aggregation pipeline.
///
/// Lines are decoded strictly in order. Every `batch` lines, or every line
/// when `batch` is zero, the accumulator is drained to the writer; at end of
/// stream one final flush runs regardless of batch alignment and all pending
/// appends are joined before the source is reported done. The progress sink
/// is told after each flush how many lines were parsed since the previous
/// one.
#[tracing::instrument(skip_all, fields(source = %source.display(), batch))]
pub async fn process_source(
    source: &Path,
    destination: &Path,
    batch: u64,
    intervals: &IntervalConfig,
    weekdays: &WeekdayFilter,
    naming: NamingPolicy,
    progress: &mut dyn ProgressSink,
) -> Result<SourceReport> {
    let started = Instant::now();

    let file = File::open(source)
        .with_context(|| format!("failed to open source {}", source.display()))?;
    let reader = BufReader::new(MultiGzDecoder::new(file));

    let mut writer = BucketWriter::new(destination, naming);
    let mut accumulator = BucketAccumulator::new();
    let mut buckets: BTreeSet<usize> = BTreeSet::new();

    let mut lines: u64 = 0;
    let mut entries: u64 = 0;
    let mut reported: u64 = 0;

    for line in reader.lines() {
        let line = line.with_context(|| format!("failed reading {}", source.display()))?;
        lines += 1;

        for (key, entry) in aggregate_line(&line, intervals, weekdays) {
            buckets.insert(key);
            accumulator.add(key, entry);
            entries += 1;
        }

        if batch == 0 || lines % batch == 0 {
            writer.flush(accumulator.drain());
            progress.flushed(lines - reported);
            reported = lines;
        }
    }

    // Final flush regardless of batch alignment, then join every pending
    // append so nothing is lost when the caller moves on.
    writer.flush(accumulator.drain());
    progress.flushed(lines - reported);
    writer.drain().await;

    let report = SourceReport {
        source: source.display().to_string(),
        lines,
        entries,
        buckets: buckets.len(),
        elapsed_ms: started.elapsed().as_millis(),
    };
    debug!(lines, entries, buckets = report.buckets, "Source complete");

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::env;
    use std::fs;
    use std::io::Write;
    use std::path::PathBuf;

    struct RecordingProgress {
        deltas: Vec<u64>,
    }

    impl RecordingProgress {
        fn new() -> Self {
            RecordingProgress { deltas: Vec::new() }
        }
    }

    impl ProgressSink for RecordingProgress {
        fn flushed(&mut self, lines: u64) {
            self.deltas.push(lines);
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("traffic_rebucket_driver_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_gzipped_rows(path: &Path, rows: usize, samples: usize) {
        let mut encoder = GzEncoder::new(fs::File::create(path).unwrap(), Compression::default());
        for row in 0..rows {
            let mut line = format!("start{row},end{row}");
            for sample in 0..samples {
                line.push_str(&format!(",{sample}"));
            }
            writeln!(encoder, "{line}").unwrap();
        }
        encoder.finish().unwrap();
    }

    fn total_output_entries(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| {
                let content = fs::read_to_string(entry.unwrap().path()).unwrap();
                content.lines().count()
            })
            .sum()
    }

    async fn run_with_batch(dir: &Path, source: &Path, batch: u64) -> SourceReport {
        let mut progress = RecordingProgress::new();
        process_source(
            source,
            dir,
            batch,
            &IntervalConfig::identity(),
            &WeekdayFilter::all(),
            NamingPolicy::Raw,
            &mut progress,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_batch_size_never_drops_or_duplicates_entries() {
        let workspace = temp_dir("batch_invariance");
        let source = workspace.join("source.csv.gz");
        write_gzipped_rows(&source, 40, 14);

        for batch in [0u64, 7, 10_000] {
            let dir = workspace.join(format!("batch_{batch}"));
            fs::create_dir_all(&dir).unwrap();

            let report = run_with_batch(&dir, &source, batch).await;

            assert_eq!(report.lines, 40);
            assert_eq!(report.entries, 40 * 14);
            assert_eq!(report.buckets, 14);
            assert_eq!(total_output_entries(&dir), 40 * 14);
        }

        fs::remove_dir_all(&workspace).unwrap();
    }

    #[tokio::test]
    async fn test_rerun_appends_duplicate_entries() {
        let workspace = temp_dir("rerun");
        let source = workspace.join("source.csv.gz");
        write_gzipped_rows(&source, 10, 7);

        let dir = workspace.join("out");
        fs::create_dir_all(&dir).unwrap();

        run_with_batch(&dir, &source, 0).await;
        assert_eq!(total_output_entries(&dir), 10 * 7);

        // Output files are append-only with no dedup, so a second run over
        // the same source doubles every bucket.
        run_with_batch(&dir, &source, 0).await;
        assert_eq!(total_output_entries(&dir), 2 * 10 * 7);

        fs::remove_dir_all(&workspace).unwrap();
    }

    #[tokio::test]
    async fn test_entries_within_a_bucket_keep_row_order() {
        let workspace = temp_dir("row_order");
        let source = workspace.join("source.csv.gz");
        write_gzipped_rows(&source, 5, 3);

        let dir = workspace.join("out");
        fs::create_dir_all(&dir).unwrap();
        run_with_batch(&dir, &source, 2).await;

        let bucket = fs::read_to_string(dir.join("0.csv")).unwrap();
        let starts: Vec<&str> = bucket
            .lines()
            .map(|l| l.split(',').next().unwrap())
            .collect();
        assert_eq!(starts, ["start0", "start1", "start2", "start3", "start4"]);

        fs::remove_dir_all(&workspace).unwrap();
    }

    #[tokio::test]
    async fn test_progress_deltas_sum_to_line_count() {
        let workspace = temp_dir("progress");
        let source = workspace.join("source.csv.gz");
        write_gzipped_rows(&source, 10, 7);

        let dir = workspace.join("out");
        fs::create_dir_all(&dir).unwrap();

        let mut progress = RecordingProgress::new();
        process_source(
            &source,
            &dir,
            3,
            &IntervalConfig::identity(),
            &WeekdayFilter::all(),
            NamingPolicy::Raw,
            &mut progress,
        )
        .await
        .unwrap();

        // Flushes at lines 3, 6, 9 and the final drain covering the rest.
        assert_eq!(progress.deltas, vec![3, 3, 3, 1]);
        assert_eq!(progress.deltas.iter().sum::<u64>(), 10);

        fs::remove_dir_all(&workspace).unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_gzip_aborts_the_source() {
        let workspace = temp_dir("corrupt");
        let source = workspace.join("broken.csv.gz");
        fs::write(&source, b"this is not gzip data").unwrap();

        let dir = workspace.join("out");
        fs::create_dir_all(&dir).unwrap();

        let mut progress = RecordingProgress::new();
        let result = process_source(
            &source,
            &dir,
            0,
            &IntervalConfig::identity(),
            &WeekdayFilter::all(),
            NamingPolicy::Raw,
            &mut progress,
        )
        .await;

        assert!(result.is_err());

        fs::remove_dir_all(&workspace).unwrap();
    }

    #[tokio::test]
    async fn test_missing_source_errors_before_any_output() {
        let workspace = temp_dir("missing");
        let dir = workspace.join("out");
        fs::create_dir_all(&dir).unwrap();

        let mut progress = RecordingProgress::new();
        let result = process_source(
            &workspace.join("no_such_file.csv.gz"),
            &dir,
            0,
            &IntervalConfig::identity(),
            &WeekdayFilter::all(),
            NamingPolicy::Raw,
            &mut progress,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);

        fs::remove_dir_all(&workspace).unwrap();
    }

    #[tokio::test]
    async fn test_empty_source_flushes_nothing_but_completes() {
        let workspace = temp_dir("empty_source");
        let source = workspace.join("source.csv.gz");
        write_gzipped_rows(&source, 0, 0);

        let dir = workspace.join("out");
        fs::create_dir_all(&dir).unwrap();

        let report = run_with_batch(&dir, &source, 625).await;

        assert_eq!(report.lines, 0);
        assert_eq!(report.entries, 0);
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);

        fs::remove_dir_all(&workspace).unwrap();
    }
}
