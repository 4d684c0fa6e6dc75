/*!
 # Derived feeding metrics

 Pure calculations over a setting's feed level, dispatch amount and time gap:
 how many cycles it takes, how long it runs and when it ends.

 End times are always computed from a single base instant (the device
 reported start when known, otherwise the given day at the start time). The
 day-relative `HH:MM` drops the date; [`end_timestamp`] keeps it, and
 [`SettingMetrics::ends_next_day`] flags a run that crosses midnight.
*/

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::setting::{FeedingSetting, StartTime};

/// Number of dispatch cycles for a feed level in kilograms
///
/// Returns 0 when `dispatch_grams` is 0.
pub fn cycles(feed_level_kg: u32, dispatch_grams: u32) -> u32 {
    if dispatch_grams == 0 {
        return 0;
    }
    let cycles = u64::from(feed_level_kg) * 1000 / u64::from(dispatch_grams);
    u32::try_from(cycles).unwrap_or(u32::MAX)
}

/// Total run time in seconds
pub fn run_duration_seconds(feed_level_kg: u32, dispatch_grams: u32, time_gap_seconds: u32) -> u64 {
    u64::from(cycles(feed_level_kg, dispatch_grams)) * u64::from(time_gap_seconds)
}

/// Half-open `[start, end)` run interval in minutes since midnight
///
/// The end is not wrapped at midnight, so a late run can end past 1440.
/// Returns `None` when the start time is not `HH:MM`.
pub fn interval_minutes(
    start_time: &StartTime,
    feed_level_kg: u32,
    dispatch_grams: u32,
    time_gap_seconds: u32,
) -> Option<(u32, u32)> {
    let start = start_time.minutes_of_day()?;
    let run_minutes = run_duration_seconds(feed_level_kg, dispatch_grams, time_gap_seconds) / 60;
    let end = u64::from(start) + run_minutes;
    Some((start, u32::try_from(end).unwrap_or(u32::MAX)))
}

/// Instant the run finishes
pub fn end_timestamp(start: NaiveDateTime, run_duration_seconds: u64) -> Option<NaiveDateTime> {
    let seconds = i64::try_from(run_duration_seconds).ok()?;
    start.checked_add_signed(TimeDelta::try_seconds(seconds)?)
}

/// Wall-clock `HH:MM` at which the run finishes, truncated to the minute
pub fn end_time_of_day(start: NaiveDateTime, run_duration_seconds: u64) -> Option<String> {
    end_timestamp(start, run_duration_seconds).map(|end| end.format("%H:%M").to_string())
}

/// Formats a run time as `{hours}h {minutes}m`
pub fn format_run_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    format!("{hours}h {minutes}m")
}

/// Everything the operator sees next to a setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingMetrics {
    /// Dispatch cycles
    pub cycles: u32,
    /// Total run time in seconds
    pub run_duration_seconds: u64,
    /// Run time as `{h}h {m}m`
    pub run_text: String,
    /// End time as `HH:MM`, or `-` when it cannot be computed
    pub end_time: String,
    /// Whether the run ends on a later day than it starts
    pub ends_next_day: bool,
}

impl SettingMetrics {
    /// Computes the metrics of `setting`, anchoring bare start times on `today`
    ///
    /// A setting with no feed has no run, so its end time is `-`.
    pub fn compute(setting: &FeedingSetting, today: NaiveDate) -> Self {
        let cycles = setting.cycles();
        let run_duration_seconds = setting.run_duration_seconds();

        let end = (cycles > 0)
            .then(|| setting.base_instant(today))
            .flatten()
            .and_then(|start| end_timestamp(start, run_duration_seconds).map(|end| (start, end)));

        let (end_time, ends_next_day) = match end {
            Some((start, end)) => (end.format("%H:%M").to_string(), end.date() > start.date()),
            None => ("-".to_string(), false),
        };

        Self {
            cycles,
            run_duration_seconds,
            run_text: format_run_duration(run_duration_seconds),
            end_time,
            ends_next_day,
        }
    }
}
