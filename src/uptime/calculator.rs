//! Hourly-grid uptime/downtime accumulation over a trailing window.

use super::calendar::BusinessCalendar;
use super::resolver::StatusTimeline;
use crate::db::StoreStatus;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;

/// Minutes credited for each open hour on the grid.
pub const MINUTES_PER_SAMPLE: u32 = 60;

/// A trailing window reported for every store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportWindow {
    LastHour,
    LastDay,
    LastWeek,
}

impl ReportWindow {
    pub const ALL: [ReportWindow; 3] = [
        ReportWindow::LastHour,
        ReportWindow::LastDay,
        ReportWindow::LastWeek,
    ];

    pub fn duration(&self) -> ChronoDuration {
        match self {
            ReportWindow::LastHour => ChronoDuration::hours(1),
            ReportWindow::LastDay => ChronoDuration::days(1),
            ReportWindow::LastWeek => ChronoDuration::weeks(1),
        }
    }
}

/// Uptime and downtime accumulated over one window, in minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowTotals {
    pub uptime_minutes: u32,
    pub downtime_minutes: u32,
}

/// Accumulate uptime and downtime over the `duration` ending at `end`.
///
/// The window is sampled once per whole hour starting at `end - duration`.
/// A sample that falls outside business hours in the store's local time is
/// skipped; otherwise the status resolved at that instant credits a full hour
/// to uptime or downtime. A trailing partial hour is dropped.
pub fn compute_window(
    timeline: &StatusTimeline,
    calendar: &BusinessCalendar,
    tz: Tz,
    end: DateTime<Utc>,
    duration: ChronoDuration,
) -> WindowTotals {
    let start = end - duration;
    let mut totals = WindowTotals::default();

    for i in 0..duration.num_hours().max(0) {
        let t = start + ChronoDuration::hours(i);
        let local = t.with_timezone(&tz).naive_local();

        if !calendar.is_open(local) {
            continue;
        }

        match timeline.resolve(t) {
            StoreStatus::Active => totals.uptime_minutes += MINUTES_PER_SAMPLE,
            StoreStatus::Inactive => totals.downtime_minutes += MINUTES_PER_SAMPLE,
        }
    }

    totals
}
