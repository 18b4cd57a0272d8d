//! Bucket key to output file name translation.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

/// How a bucket key turns into an output file name.
#[derive(Debug, Clone)]
pub enum NamingPolicy {
    /// The raw bucket key itself.
    Raw,
    /// `weekday-HHMM`, lowercased: the wall-clock moment
    /// `key * target_interval` minutes past the given start of week.
    ///
    /// The week start is passed in explicitly so callers that need
    /// date-stable names can pin the run date instead of taking the
    /// current week.
    WeekdayTime {
        week_start: NaiveDateTime,
        target_interval: u32,
    },
}

impl NamingPolicy {
    /// File name stem for `key`; the writer adds the `.csv` extension.
    pub fn file_name(&self, key: usize) -> String {
        match self {
            NamingPolicy::Raw => key.to_string(),
            NamingPolicy::WeekdayTime {
                week_start,
                target_interval,
            } => {
                let minutes = key as i64 * i64::from(*target_interval);
                let moment = *week_start + Duration::minutes(minutes);
                moment.format("%A-%H%M").to_string().to_lowercase()
            }
        }
    }
}

/// Midnight on the Monday of the week containing `today`.
pub fn start_of_week(today: NaiveDate) -> NaiveDateTime {
    today
        .week(Weekday::Mon)
        .first_day()
        .and_time(NaiveTime::MIN)
}
