//! Weekly business-hours calendar for a store.

use crate::db::BusinessHourRule;

use chrono::{Datelike, NaiveDateTime, NaiveTime};

/// Opening window for a single weekday, both bounds inclusive.
///
/// A window whose start is after its end runs overnight into the next day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DayWindow {
    /// The default window for weekdays without a rule.
    pub fn all_day() -> Self {
        Self {
            start: NaiveTime::MIN,
            end: last_instant_of_day(),
        }
    }

    pub fn is_overnight(&self) -> bool {
        self.start > self.end
    }

    /// Whether `time` falls in the part of this window on its own day.
    fn covers_same_day(&self, time: NaiveTime) -> bool {
        if self.is_overnight() {
            time >= self.start
        } else {
            self.start <= time && time <= self.end
        }
    }

    /// Whether `time` falls in the part of this window spilling into the next day.
    fn covers_next_day(&self, time: NaiveTime) -> bool {
        self.is_overnight() && time <= self.end
    }
}

fn last_instant_of_day() -> NaiveTime {
    NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN)
}

/// Business hours for all seven weekdays, indexed from Monday = 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessCalendar {
    days: [DayWindow; 7],
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self::always_open()
    }
}

impl BusinessCalendar {
    /// A calendar open around the clock on every day.
    pub fn always_open() -> Self {
        Self {
            days: [DayWindow::all_day(); 7],
        }
    }

    /// Build a calendar from a store's rules.
    ///
    /// Weekdays without a rule are open all day. When several rules name the
    /// same weekday the first one is used.
    pub fn from_rules(rules: &[BusinessHourRule]) -> Self {
        let mut days: [Option<DayWindow>; 7] = [None; 7];

        for rule in rules {
            let Some(slot) = days.get_mut(rule.day_of_week as usize) else {
                tracing::warn!(
                    "Ignoring business hours for store {} with weekday {}",
                    rule.store_id,
                    rule.day_of_week
                );
                continue;
            };
            if slot.is_some() {
                tracing::debug!(
                    "Ignoring duplicate business hours for store {} on weekday {}",
                    rule.store_id,
                    rule.day_of_week
                );
                continue;
            }
            *slot = Some(DayWindow {
                start: rule.start_local,
                end: rule.end_local,
            });
        }

        Self {
            days: days.map(|d| d.unwrap_or_else(DayWindow::all_day)),
        }
    }

    /// Window in effect for a weekday, Monday = 0.
    #[cfg(test)]
    pub fn window(&self, weekday: usize) -> DayWindow {
        self.days[weekday % 7]
    }

    /// Whether the store is open at the given local wall-clock time.
    pub fn is_open(&self, local: NaiveDateTime) -> bool {
        let weekday = local.weekday().num_days_from_monday() as usize;
        let time = local.time();

        if self.days[weekday].covers_same_day(time) {
            return true;
        }

        let previous = (weekday + 6) % 7;
        self.days[previous].covers_next_day(time)
    }
}
