use crate::config::{IntervalConfig, WeekdayFilter};

/// Fans one row's samples out to `(bucket key, entry)` pairs.
///
/// The first two comma-separated tokens are the row's start and end location
/// identifiers, carried through unchanged; every remaining token is the
/// reading for one source sub-interval of the week. A sample survives when
/// its index lands exactly on a target-interval boundary and its weekday is
/// retained; its bucket key is the index of the target bucket it folds into.
///
/// Rows are split positionally, with no quoting or schema checks. A row with
/// fewer than three tokens produces no pairs.
pub fn aggregate_line(
    line: &str,
    intervals: &IntervalConfig,
    weekdays: &WeekdayFilter,
) -> Vec<(usize, String)> {
    let mut tokens = line.split(',');
    let start = tokens.next().unwrap_or("");
    let end = tokens.next().unwrap_or("");
    let samples: Vec<&str> = tokens.collect();

    let source = intervals.source() as usize;
    let target = intervals.target() as usize;
    let ratio = intervals.ratio();

    let mut pairs = Vec::new();
    for (i, sample) in samples.iter().enumerate() {
        // Keep only indices that land exactly on a target-interval boundary:
        // one representative sample per target bucket, not an average.
        if (i * source) % target != 0 {
            continue;
        }

        // Weekday blocks are contiguous: weekday(i) = floor(i / (len / 7)).
        // Truncates when the sample count is not a multiple of 7.
        let weekday = i * 7 / samples.len();
        if !weekdays.contains(weekday) {
            continue;
        }

        pairs.push((i / ratio, format!("{start},{end},{sample}")));
    }

    pairs
}
