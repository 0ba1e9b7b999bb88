//! crates/promo_core/src/recurrence.rs
//!
//! Pure recurrence math for weekly promotions. The only supported cadence is
//! a fixed seven-day advance; the caller persists whatever this computes.

use chrono::{DateTime, Duration, Utc};

/// The outcome of advancing a recurring promotion by one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advanced {
    /// Recurrence continues; this is the next fire instant.
    Continues(DateTime<Utc>),
    /// The advanced instant passed the end date; recurrence terminates.
    Ended,
}

/// Advances `reference` by exactly seven days.
///
/// Returns [`Advanced::Ended`] when `end_date` is set and the advanced
/// instant is strictly after it; an end date exactly on the advanced instant
/// still fires.
pub fn advance(reference: DateTime<Utc>, end_date: Option<DateTime<Utc>>) -> Advanced {
    let next = reference + Duration::days(7);
    match end_date {
        Some(end) if next > end => Advanced::Ended,
        _ => Advanced::Continues(next),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 10, 30, 0).unwrap()
    }

    #[test]
    fn advances_exactly_seven_days() {
        let next = advance(instant(), None);
        assert_eq!(next, Advanced::Continues(instant() + Duration::days(7)));
    }

    #[test]
    fn end_date_on_the_advanced_instant_still_fires() {
        let end = instant() + Duration::days(7);
        assert_eq!(advance(instant(), Some(end)), Advanced::Continues(end));
    }

    #[test]
    fn end_date_before_the_advanced_instant_terminates() {
        let end = instant() + Duration::days(7) - Duration::seconds(1);
        assert_eq!(advance(instant(), Some(end)), Advanced::Ended);
    }

    #[test]
    fn ten_day_window_allows_one_extra_cycle() {
        // scheduled at T, end date T+10d: T+7d fires, T+14d does not.
        let t = instant();
        let end = t + Duration::days(10);

        let first = advance(t, Some(end));
        assert_eq!(first, Advanced::Continues(t + Duration::days(7)));

        let second = advance(t + Duration::days(7), Some(end));
        assert_eq!(second, Advanced::Ended);
    }

    proptest! {
        // Without an end date, the advance always continues and is always
        // exactly seven days, no matter where the reference sits.
        #[test]
        fn open_ended_recurrence_never_terminates(offset_mins in -100_000i64..100_000) {
            let reference = instant() + Duration::minutes(offset_mins);
            match advance(reference, None) {
                Advanced::Continues(next) => {
                    prop_assert_eq!((next - reference).num_days(), 7);
                    prop_assert_eq!(next - reference, Duration::days(7));
                }
                Advanced::Ended => prop_assert!(false, "open-ended recurrence ended"),
            }
        }

        // Repeated advances walk forward in exact one-week steps.
        #[test]
        fn repeated_advances_are_weekly(cycles in 1usize..50) {
            let mut reference = instant();
            for _ in 0..cycles {
                match advance(reference, None) {
                    Advanced::Continues(next) => reference = next,
                    Advanced::Ended => prop_assert!(false, "open-ended recurrence ended"),
                }
            }
            prop_assert_eq!(reference - instant(), Duration::days(7 * cycles as i64));
        }

        // With an end date, the decision is exactly "next > end".
        #[test]
        fn end_date_decision_is_strict(end_offset_hours in -500i64..500) {
            let reference = instant();
            let end = reference + Duration::days(7) + Duration::hours(end_offset_hours);
            let outcome = advance(reference, Some(end));
            if end_offset_hours >= 0 {
                prop_assert_eq!(outcome, Advanced::Continues(reference + Duration::days(7)));
            } else {
                prop_assert_eq!(outcome, Advanced::Ended);
            }
        }
    }
}
