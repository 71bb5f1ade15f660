//! Usage-window arithmetic.
//!
//! Windows are daily and contiguous per account: each report covers
//! `[last, report_time)` and a successful submission persists
//! `report_time` as the next `last`. Suspension and resumption markers
//! clamp or advance the boundaries without ever creating overlap.

use chrono::{DateTime, Duration, Utc};
use connector_core::models::start_of_day;

/// Midnight of the day after the last report. Reports always end on a
/// day boundary, whatever time of day the last report was persisted.
pub fn next_report_time(last: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(last + Duration::days(1))
}

/// For a halted account, the final report ends at the stop marker when
/// it falls inside the pending window. A stop before `last` is already
/// reported; a stop after `report_time` is handled by a later cycle.
pub fn clamp_to_stop(
    last: DateTime<Utc>,
    report_time: DateTime<Utc>,
    stop: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    match stop {
        Some(stop) if last < stop && stop <= report_time => stop,
        _ => report_time,
    }
}

/// A resumption strictly inside the window moves the window start
/// forward: the account was disabled between `last` and `start`, so
/// that span carries no billable usage.
pub fn advance_past_start(
    last: DateTime<Utc>,
    report_time: DateTime<Utc>,
    start: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    match start {
        Some(start) if last < start && start < report_time => start,
        _ => last,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn report_time_is_next_midnight() {
        assert_eq!(next_report_time(at(4, 0)), at(5, 0));
        // mid-day last report still ends on the next day boundary
        assert_eq!(next_report_time(at(4, 15)), at(5, 0));
    }

    #[test]
    fn consecutive_windows_are_contiguous() {
        let first_end = next_report_time(at(3, 0));
        let second_end = next_report_time(first_end);
        assert_eq!(first_end, at(4, 0));
        assert_eq!(second_end, at(5, 0));
    }

    #[test]
    fn stop_inside_window_clamps_the_end() {
        assert_eq!(clamp_to_stop(at(4, 0), at(5, 0), Some(at(4, 11))), at(4, 11));
    }

    #[test]
    fn stop_outside_window_is_ignored() {
        // already reported
        assert_eq!(clamp_to_stop(at(4, 0), at(5, 0), Some(at(3, 22))), at(5, 0));
        // belongs to a later window
        assert_eq!(clamp_to_stop(at(4, 0), at(5, 0), Some(at(6, 1))), at(5, 0));
        assert_eq!(clamp_to_stop(at(4, 0), at(5, 0), None), at(5, 0));
    }

    #[test]
    fn stop_at_window_end_is_kept() {
        assert_eq!(clamp_to_stop(at(4, 0), at(5, 0), Some(at(5, 0))), at(5, 0));
    }

    #[test]
    fn resumption_inside_window_moves_the_start() {
        assert_eq!(advance_past_start(at(4, 0), at(5, 0), Some(at(4, 9))), at(4, 9));
    }

    #[test]
    fn resumption_outside_window_keeps_the_start() {
        assert_eq!(advance_past_start(at(4, 0), at(5, 0), Some(at(3, 9))), at(4, 0));
        assert_eq!(advance_past_start(at(4, 0), at(5, 0), Some(at(5, 0))), at(4, 0));
        assert_eq!(advance_past_start(at(4, 0), at(5, 0), None), at(4, 0));
    }
}
