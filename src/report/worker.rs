//! Report computation across all stores and CSV artifact output.

use super::ReportError;
use crate::db::{DbError, Store};
use crate::uptime::{compute_window, BusinessCalendar, ReportWindow, StatusTimeline};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Column names of the report artifact.
pub const REPORT_HEADER: [&str; 7] = [
    "store_id",
    "uptime_last_hour",
    "uptime_last_day",
    "uptime_last_week",
    "downtime_last_hour",
    "downtime_last_day",
    "downtime_last_week",
];

/// Why a single store could not be reported.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),
}

/// One line of the report, minutes per window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub store_id: String,
    pub uptime_last_hour: u32,
    pub uptime_last_day: u32,
    pub uptime_last_week: u32,
    pub downtime_last_hour: u32,
    pub downtime_last_day: u32,
    pub downtime_last_week: u32,
}

/// Result of computing one store.
pub type StoreOutcome = Result<ReportRow, StoreError>;

/// Everything one report run produced.
#[derive(Debug, Default)]
pub struct ReportSummary {
    /// Latest observation time used as "now"; `None` when there is no data.
    pub anchor: Option<DateTime<Utc>>,
    pub rows: Vec<ReportRow>,
    pub failures: Vec<(String, StoreError)>,
}

impl ReportSummary {
    fn collect(anchor: DateTime<Utc>, outcomes: Vec<(String, StoreOutcome)>) -> Self {
        let mut summary = Self {
            anchor: Some(anchor),
            ..Default::default()
        };
        for (store_id, outcome) in outcomes {
            match outcome {
                Ok(row) => summary.rows.push(row),
                Err(e) => summary.failures.push((store_id, e)),
            }
        }
        summary
    }
}

/// Compute a row for every observed store.
///
/// All windows end at the latest observation across every store. A store that
/// fails is recorded in `failures` and left out of `rows`. With no
/// observations at all the summary is empty.
///
/// `cancel` is checked before each store; once set the run stops with
/// `ReportError::Cancelled`.
pub fn build_report(
    store: &Store,
    default_tz: Tz,
    cancel: &AtomicBool,
) -> Result<ReportSummary, ReportError> {
    let Some(anchor) = store.get_latest_observation_time()? else {
        tracing::warn!("No observations found, producing an empty report");
        return Ok(ReportSummary::default());
    };

    let store_ids = store.get_store_ids()?;
    tracing::info!(
        "Computing report for {} stores anchored at {}",
        store_ids.len(),
        anchor
    );

    let mut outcomes: Vec<(String, StoreOutcome)> = Vec::with_capacity(store_ids.len());
    for store_id in store_ids {
        if cancel.load(Ordering::Relaxed) {
            return Err(ReportError::Cancelled);
        }
        let outcome = compute_store_row(store, &store_id, anchor, default_tz);
        outcomes.push((store_id, outcome));
    }

    let summary = ReportSummary::collect(anchor, outcomes);
    for (store_id, e) in &summary.failures {
        tracing::error!("Error calculating uptime/downtime for store {}: {}", store_id, e);
    }

    Ok(summary)
}

/// Compute the three windows for one store.
pub fn compute_store_row(
    store: &Store,
    store_id: &str,
    anchor: DateTime<Utc>,
    default_tz: Tz,
) -> StoreOutcome {
    let tz = match store.get_timezone(store_id)? {
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| StoreError::UnknownTimezone(name))?,
        None => default_tz,
    };
    let calendar = BusinessCalendar::from_rules(&store.get_business_hours(store_id)?);
    let observations = store.get_observations(store_id)?;
    tracing::debug!(
        "Store {}: {} observations, timezone {}",
        store_id,
        observations.len(),
        tz
    );
    let timeline = StatusTimeline::new(observations);

    let [hour, day, week] = ReportWindow::ALL
        .map(|w| compute_window(&timeline, &calendar, tz, anchor, w.duration()));

    Ok(ReportRow {
        store_id: store_id.to_string(),
        uptime_last_hour: hour.uptime_minutes,
        uptime_last_day: day.uptime_minutes,
        uptime_last_week: week.uptime_minutes,
        downtime_last_hour: hour.downtime_minutes,
        downtime_last_day: day.downtime_minutes,
        downtime_last_week: week.downtime_minutes,
    })
}

/// Write rows as CSV to `path`.
///
/// The data goes to a sibling temporary file first and is renamed into place
/// once synced to disk, so `path` never holds a partial report.
pub fn write_artifact(path: &Path, rows: &[ReportRow]) -> Result<(), ReportError> {
    let tmp = path.with_extension("csv.tmp");

    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp)?;
        writer.write_record(REPORT_HEADER)?;
        for row in rows {
            writer.serialize(row)?;
        }
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(e.error().kind(), e.to_string()))?;
        file.sync_all()?;
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BusinessHourRule, Observation, StoreStatus, TimezoneAssignment};
    use chrono::{Duration as ChronoDuration, NaiveTime, TimeZone};
    use tempfile::{tempdir, NamedTempFile};

    fn obs(store_id: &str, ts: DateTime<Utc>, status: StoreStatus) -> Observation {
        Observation {
            store_id: store_id.to_string(),
            timestamp: ts,
            status,
        }
    }

    fn tz(store_id: &str, name: &str) -> TimezoneAssignment {
        TimezoneAssignment {
            store_id: store_id.to_string(),
            timezone: name.to_string(),
        }
    }

    #[test]
    fn test_empty_store_gives_empty_report() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();

        let summary = build_report(&store, chrono_tz::UTC, &AtomicBool::new(false)).unwrap();
        assert!(summary.anchor.is_none());
        assert!(summary.rows.is_empty());
        assert!(summary.failures.is_empty());
    }

    #[test]
    fn test_build_report_shared_anchor() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();

        store
            .add_observations(&[
                obs("a", now - ChronoDuration::days(10), StoreStatus::Active),
                // b's last report is older, but it is still measured up to a's latest
                obs("b", now - ChronoDuration::days(10), StoreStatus::Active),
                obs("b", now - ChronoDuration::hours(5), StoreStatus::Inactive),
                obs("a", now, StoreStatus::Active),
            ])
            .unwrap();
        store.set_timezones(&[tz("a", "UTC"), tz("b", "UTC")]).unwrap();

        let summary = build_report(&store, chrono_tz::America::Chicago, &AtomicBool::new(false)).unwrap();
        assert_eq!(summary.anchor, Some(now));
        assert!(summary.failures.is_empty());
        assert_eq!(
            summary.rows,
            vec![
                ReportRow {
                    store_id: "a".to_string(),
                    uptime_last_hour: 60,
                    uptime_last_day: 1440,
                    uptime_last_week: 10080,
                    downtime_last_hour: 0,
                    downtime_last_day: 0,
                    downtime_last_week: 0,
                },
                ReportRow {
                    store_id: "b".to_string(),
                    uptime_last_hour: 0,
                    uptime_last_day: 19 * 60,
                    uptime_last_week: 163 * 60,
                    downtime_last_hour: 60,
                    downtime_last_day: 5 * 60,
                    downtime_last_week: 5 * 60,
                },
            ]
        );
    }

    #[test]
    fn test_bad_store_does_not_abort_report() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();

        store
            .add_observations(&[
                obs("good", now, StoreStatus::Active),
                obs("bad", now, StoreStatus::Active),
            ])
            .unwrap();
        store.set_timezones(&[tz("bad", "Not/AZone")]).unwrap();

        let summary = build_report(&store, chrono_tz::UTC, &AtomicBool::new(false)).unwrap();
        assert_eq!(summary.rows.len(), 1);
        assert_eq!(summary.rows[0].store_id, "good");
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0, "bad");
        assert!(matches!(
            summary.failures[0].1,
            StoreError::UnknownTimezone(_)
        ));
    }

    #[test]
    fn test_cancelled_build_stops_before_next_store() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();
        store
            .add_observations(&[
                obs("a", now, StoreStatus::Active),
                obs("b", now, StoreStatus::Active),
            ])
            .unwrap();

        let cancel = AtomicBool::new(true);
        assert!(matches!(
            build_report(&store, chrono_tz::UTC, &cancel),
            Err(ReportError::Cancelled)
        ));
    }

    #[test]
    fn test_store_row_uses_business_hours_and_default_zone() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        // 2024-01-01 is a Monday; 16:00 UTC is 10:00 in Chicago
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 16, 0, 0).unwrap();

        store
            .add_observations(&[obs("s", now - ChronoDuration::days(8), StoreStatus::Active)])
            .unwrap();
        store
            .add_business_hours(&[BusinessHourRule {
                store_id: "s".to_string(),
                day_of_week: 0,
                start_local: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_local: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            }])
            .unwrap();

        let row = compute_store_row(&store, "s", now, chrono_tz::America::Chicago).unwrap();
        // Last hour sample is 09:00 Monday Chicago time, inside 09:00-09:30
        assert_eq!(row.uptime_last_hour, 60);
        // Sunday 10:00-23:00 plus Monday 09:00
        assert_eq!(row.uptime_last_day, 15 * 60);
        assert_eq!(row.uptime_last_week, 6 * 24 * 60 + 60);
        assert_eq!(row.downtime_last_week, 0);
    }

    #[test]
    fn test_write_artifact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report_x.csv");

        write_artifact(&path, &[]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim_end(), REPORT_HEADER.join(","));

        let row = ReportRow {
            store_id: "42".to_string(),
            uptime_last_hour: 60,
            uptime_last_day: 600,
            uptime_last_week: 4200,
            downtime_last_hour: 0,
            downtime_last_day: 840,
            downtime_last_week: 5880,
        };
        write_artifact(&path, &[row]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], REPORT_HEADER.join(","));
        assert_eq!(lines[1], "42,60,600,4200,0,840,5880");
        assert!(!dir.path().join("report_x.csv.tmp").exists());
    }
}
