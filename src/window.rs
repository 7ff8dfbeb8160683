//! Incremental fetch-window planning
//!
//! The store is the checkpoint: the next window for a repository starts
//! just before the newest timestamp already persisted for it, so repeated
//! runs resume where the last one stopped without any external bookkeeping.
//! The overlap buffer deliberately re-fetches a thin slice of already-seen
//! entries to tolerate upstream clock skew and late-arriving events; the
//! store's composite-key dedup absorbs the repeats.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

/// A (start, end) pair submitted to the upstream log API.
///
/// The API accepts calendar-granularity bounds in MM/DD/YYYY form; the
/// sub-day precision kept here only feeds the planner's arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    /// Window start formatted the way the upstream expects it.
    pub fn start_param(&self) -> String {
        self.start.format("%m/%d/%Y").to_string()
    }

    /// Window end formatted the way the upstream expects it.
    pub fn end_param(&self) -> String {
        self.end.format("%m/%d/%Y").to_string()
    }
}

impl std::fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} .. {}", self.start_param(), self.end_param())
    }
}

/// Operator-supplied date-range overrides. When either bound is present the
/// automatic computation is bypassed entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowOverrides {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl WindowOverrides {
    pub fn is_empty(&self) -> bool {
        self.start_date.is_none() && self.end_date.is_none()
    }
}

/// Computes the next fetch window for a repository.
#[derive(Debug, Clone, Copy)]
pub struct WindowPlanner {
    /// Backward offset from the newest stored timestamp, tolerating
    /// boundary misses around the previous run's end.
    pub overlap: Duration,
    /// Window length used on the first run, when nothing is stored yet.
    pub initial_lookback: Duration,
}

impl WindowPlanner {
    pub fn new(overlap_hours: i64, lookback_days: i64) -> Self {
        Self {
            overlap: Duration::hours(overlap_hours),
            initial_lookback: Duration::days(lookback_days),
        }
    }

    /// Produce the window for one repository.
    ///
    /// Precedence: explicit overrides, then resumption from the newest
    /// stored timestamp minus the overlap buffer, then the fixed initial
    /// lookback. An end-date override is inclusive of its whole final
    /// calendar day.
    pub fn plan(
        &self,
        max_stored: Option<i64>,
        overrides: &WindowOverrides,
        now: DateTime<Utc>,
    ) -> FetchWindow {
        if !overrides.is_empty() {
            let start = overrides
                .start_date
                .map(|d| day_start(d))
                .unwrap_or_else(|| now - self.initial_lookback);
            let end = overrides.end_date.map(|d| day_end(d)).unwrap_or(now);
            return FetchWindow { start, end };
        }

        let start = match max_stored.and_then(|ts| DateTime::from_timestamp(ts, 0)) {
            Some(newest) => newest - self.overlap,
            None => now - self.initial_lookback,
        };
        FetchWindow { start, end: now }
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc()
}

fn day_end(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59).expect("end of day is valid").and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn planner() -> WindowPlanner {
        WindowPlanner::new(1, 7)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn first_run_uses_initial_lookback() {
        let window = planner().plan(None, &WindowOverrides::default(), now());
        assert_eq!(window.end, now());
        assert_eq!(window.start, now() - Duration::days(7));
    }

    #[test]
    fn resumption_backs_off_by_overlap() {
        let newest = Utc.with_ymd_and_hms(2025, 6, 9, 18, 30, 0).unwrap();
        let window = planner().plan(
            Some(newest.timestamp()),
            &WindowOverrides::default(),
            now(),
        );
        assert_eq!(window.start, newest - Duration::hours(1));
        assert!(window.start.timestamp() <= newest.timestamp());
        assert_eq!(window.end, now());
    }

    #[test]
    fn overrides_win_over_stored_state() {
        let overrides = WindowOverrides {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 31),
        };
        let window = planner().plan(Some(now().timestamp()), &overrides, now());
        assert_eq!(window.start_param(), "01/01/2025");
        assert_eq!(window.end_param(), "01/31/2025");
        // The override end covers the entire final day.
        assert_eq!(window.end.format("%H:%M:%S").to_string(), "23:59:59");
    }

    #[test]
    fn start_only_override_ends_now() {
        let overrides = WindowOverrides {
            start_date: NaiveDate::from_ymd_opt(2025, 5, 1),
            end_date: None,
        };
        let window = planner().plan(None, &overrides, now());
        assert_eq!(window.start_param(), "05/01/2025");
        assert_eq!(window.end, now());
    }

    #[test]
    fn api_params_are_calendar_granularity() {
        let window = planner().plan(None, &WindowOverrides::default(), now());
        assert_eq!(window.end_param(), "06/10/2025");
        assert_eq!(window.start_param(), "06/03/2025");
    }
}
