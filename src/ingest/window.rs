//! Processing window: which reference times the current run is responsible for.

use chrono::{NaiveDateTime, NaiveTime, Timelike};

/// Closed interval `[start, end]` of reference times to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ProcessingWindow {
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Midnight of `now`'s calendar date
pub fn day_start(now: NaiveDateTime) -> NaiveDateTime {
    now.date().and_time(NaiveTime::MIN)
}

/// Compute the window for a run starting at `now`.
///
/// The window never reaches back past today's midnight, so a multi-day
/// outage does not replay the whole backlog. Same-day gaps are caught by
/// resuming from `last_run`.
pub fn compute_window(now: NaiveDateTime, last_run: Option<NaiveDateTime>) -> ProcessingWindow {
    let end = now.with_nanosecond(0).unwrap_or(now);
    let midnight = day_start(now);

    let mut start = match last_run {
        Some(last) if last.date() == now.date() => last,
        _ => midnight,
    };

    if start >= now || start < midnight {
        start = midnight;
    }

    ProcessingWindow { start, end }
}
