/*!
 # Setting validation

 Decides whether a candidate setting may join a list of settings. Checks run
 in a fixed order and the first failure wins:

 1. missing start time
 2. start time already used
 3. exact duplicate (start, feed level, gap and dispatch)
 4. run interval overlaps another run
*/

use thiserror::Error;
use tracing::{debug, instrument};

use crate::setting::FeedingSetting;

/// The first rule a candidate setting breaks
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Candidate has no start time
    #[error("Start time is required.")]
    MissingStartTime,

    /// Another setting starts at the same time
    #[error("Another setting already uses this start time.")]
    DuplicateStartTime,

    /// Another setting matches on every compared field
    #[error("This exact setting already exists.")]
    ExactDuplicate,

    /// Candidate runs while another setting is running
    #[error("This setting overlaps with another setting.")]
    Overlap,
}

/// Whether two half-open `[start, end)` intervals intersect
pub fn intervals_overlap(a: (u32, u32), b: (u32, u32)) -> bool {
    a.0 < b.1 && a.1 > b.0
}

/// Whether the runs of two settings overlap
///
/// A setting whose start time is not `HH:MM` has no interval and overlaps nothing.
pub fn overlaps(a: &FeedingSetting, b: &FeedingSetting) -> bool {
    match (a.interval_minutes(), b.interval_minutes()) {
        (Some(a), Some(b)) => intervals_overlap(a, b),
        _ => false,
    }
}

/// Checks `candidate` against `list`, skipping the entry at `ignore_position`
///
/// Returns `None` when the candidate may be stored.
#[instrument(skip(candidate, list), fields(start = %candidate.start_time, others = list.len()))]
pub fn validate(
    candidate: &FeedingSetting,
    list: &[FeedingSetting],
    ignore_position: Option<usize>,
) -> Option<ViolationKind> {
    if candidate.start_time.is_empty() {
        debug!("Rejected: no start time");
        return Some(ViolationKind::MissingStartTime);
    }

    let others = || {
        list.iter()
            .filter(move |s| ignore_position != Some(s.position()))
    };

    let violation = if others().any(|s| s.start_time.same_as(&candidate.start_time)) {
        Some(ViolationKind::DuplicateStartTime)
    } else if others().any(|s| s.is_exact_duplicate_of(candidate)) {
        Some(ViolationKind::ExactDuplicate)
    } else if others().any(|s| overlaps(candidate, s)) {
        Some(ViolationKind::Overlap)
    } else {
        None
    };

    match violation {
        Some(kind) => debug!("Rejected: {:?}", kind),
        None => debug!("Candidate accepted"),
    }
    violation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setting::{DispatchGrams, FeedLevel, TimeGap};

    // 10 kg at 250 g every 180 s runs for 120 minutes
    fn setting(position: usize, start: &str, kg: u32) -> FeedingSetting {
        let mut s = FeedingSetting::new(start, FeedLevel::new(kg).unwrap(), DispatchGrams::G250, TimeGap::S180);
        s.position = position;
        s
    }

    #[test]
    fn accepts_disjoint_settings() {
        let list = vec![setting(1, "06:00", 10), setting(2, "12:00", 10)];
        assert_eq!(validate(&setting(0, "09:00", 10), &list, None), None);
    }

    #[test]
    fn missing_start_time_comes_first() {
        let list = vec![setting(1, "", 10)];
        assert_eq!(
            validate(&setting(0, "", 10), &list, None),
            Some(ViolationKind::MissingStartTime)
        );
    }

    #[test]
    fn duplicate_start_time_before_exact_duplicate() {
        let list = vec![setting(1, "06:00", 10)];
        assert_eq!(
            validate(&setting(0, "06:00", 10), &list, None),
            Some(ViolationKind::DuplicateStartTime)
        );
        assert_eq!(
            validate(&setting(0, "06:00", 99), &list, None),
            Some(ViolationKind::DuplicateStartTime)
        );
    }

    #[test]
    fn duplicate_start_ignores_hour_padding() {
        let list = vec![setting(1, "06:00", 0)];
        assert_eq!(
            validate(&setting(0, "6:00", 0), &list, None),
            Some(ViolationKind::DuplicateStartTime)
        );
    }

    #[test]
    fn overlap_is_half_open() {
        let list = vec![setting(1, "06:00", 10)];
        assert_eq!(
            validate(&setting(0, "07:59", 10), &list, None),
            Some(ViolationKind::Overlap)
        );
        assert_eq!(validate(&setting(0, "08:00", 10), &list, None), None);
        assert_eq!(
            validate(&setting(0, "05:00", 10), &list, None),
            Some(ViolationKind::Overlap)
        );
        assert_eq!(validate(&setting(0, "04:00", 10), &list, None), None);
    }

    #[test]
    fn overlap_is_symmetric() {
        let pairs = [
            (setting(1, "06:00", 10), setting(2, "07:00", 1)),
            (setting(1, "06:00", 10), setting(2, "08:00", 10)),
            (setting(1, "23:00", 10), setting(2, "23:30", 0)),
            (setting(1, "00:00", 0), setting(2, "00:00", 10)),
        ];
        for (a, b) in &pairs {
            assert_eq!(overlaps(a, b), overlaps(b, a), "{} / {}", a.start_time, b.start_time);
        }
    }

    #[test]
    fn ignored_position_is_skipped() {
        let list = vec![setting(1, "06:00", 10), setting(2, "12:00", 10)];
        assert_eq!(validate(&setting(0, "06:00", 20), &list, Some(1)), None);
        assert_eq!(
            validate(&setting(0, "11:00", 10), &list, Some(1)),
            Some(ViolationKind::Overlap)
        );
    }

    // Only decoded controller data can carry such starts
    #[test]
    fn unparseable_start_never_overlaps() {
        let list = vec![setting(1, "0600", 10)];
        assert_eq!(validate(&setting(0, "06:00", 10), &list, None), None);
    }

    #[test]
    fn messages_match_operator_wording() {
        assert_eq!(ViolationKind::Overlap.to_string(), "This setting overlaps with another setting.");
        assert_eq!(ViolationKind::MissingStartTime.to_string(), "Start time is required.");
    }
}
