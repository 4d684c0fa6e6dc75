/*!
 # Controller timestamps

 The controller reports times as a run of digits, `DDMMYYHHMM` with optional
 trailing `SS`. Separators, if any, are ignored.
*/

use chrono::{NaiveDate, NaiveDateTime};
use tracing::trace;

/// Digits required for a timestamp without seconds
const MIN_DIGITS: usize = 10;

fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

fn field(digits: &str, at: usize) -> Option<u32> {
    digits.get(at..at + 2)?.parse().ok()
}

/// Parses a compact controller timestamp
///
/// Years are offset by 2000. Returns `None` with fewer than ten digits or when
/// the components do not form a real calendar date and time; out-of-range
/// values are never rolled over into the next month or day.
pub fn parse(raw: &str) -> Option<NaiveDateTime> {
    let digits = digits(raw);
    if digits.len() < MIN_DIGITS {
        trace!("Timestamp {:?} has only {} digits", raw, digits.len());
        return None;
    }

    let day = field(&digits, 0)?;
    let month = field(&digits, 2)?;
    let year = 2000 + field(&digits, 4)? as i32;
    let hour = field(&digits, 6)?;
    let minute = field(&digits, 8)?;
    let second = field(&digits, 10).unwrap_or(0);

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Formats a compact controller timestamp as `DD-MM-20YY HH:MM:SS`
///
/// This only rearranges digits and does not check the date.
pub fn format_device_time(raw: &str) -> Option<String> {
    let d = digits(raw);
    if d.len() < MIN_DIGITS {
        return None;
    }
    let seconds = d.get(10..12).unwrap_or("00");
    Some(format!(
        "{}-{}-20{} {}:{}:{}",
        &d[0..2],
        &d[2..4],
        &d[4..6],
        &d[6..8],
        &d[8..10],
        seconds
    ))
}
