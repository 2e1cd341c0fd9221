//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";
const LOCAL_TIME_FORMAT: &str = "%H:%M:%S";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("database connection lock poisoned")]
    Poisoned,
    #[error("invalid stored value: {0}")]
    InvalidData(String),
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // --- Observations ---

    /// Add observations in batch.
    pub fn add_observations(&self, observations: &[Observation]) -> Result<(), DbError> {
        if observations.is_empty() {
            return Ok(());
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO store_status (store_id, timestamp_utc, status) VALUES (?1, ?2, ?3)",
            )?;

            for o in observations {
                stmt.execute(params![
                    o.store_id,
                    format_db_time(o.timestamp),
                    o.status.as_str(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Total number of stored observations.
    pub fn count_observations(&self) -> Result<i64, DbError> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM store_status", [], |r| r.get(0))?)
    }

    /// Every store that has at least one observation, sorted.
    pub fn get_store_ids(&self) -> Result<Vec<String>, DbError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT store_id FROM store_status ORDER BY store_id ASC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<SqlResult<Vec<String>>>()?;
        Ok(ids)
    }

    /// Latest observation time across all stores.
    pub fn get_latest_observation_time(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        let conn = self.conn()?;
        let result: Option<String> =
            conn.query_row("SELECT MAX(timestamp_utc) FROM store_status", [], |row| {
                row.get(0)
            })?;

        match result {
            None => Ok(None),
            Some(s) => parse_db_time(&s)
                .map(Some)
                .ok_or_else(|| DbError::InvalidData(format!("timestamp {:?}", s))),
        }
    }

    /// All observations for a store, oldest first, ties in insertion order.
    pub fn get_observations(&self, store_id: &str) -> Result<Vec<Observation>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT store_id, timestamp_utc, status FROM store_status
             WHERE store_id = ?1 ORDER BY timestamp_utc ASC, rowid ASC",
        )?;

        let observations = stmt
            .query_map(params![store_id], |row| {
                let time_str: String = row.get(1)?;
                let status_str: String = row.get(2)?;
                Ok(Observation {
                    store_id: row.get(0)?,
                    timestamp: parse_db_time(&time_str)
                        .ok_or_else(|| conversion_error(1, format!("bad timestamp {:?}", time_str)))?,
                    status: status_str.parse().map_err(|e| conversion_error(2, e))?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(observations)
    }

    // --- Business hours ---

    /// Add business hour rules in batch.
    pub fn add_business_hours(&self, rules: &[BusinessHourRule]) -> Result<(), DbError> {
        if rules.is_empty() {
            return Ok(());
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO business_hours (store_id, day_of_week, start_time_local, end_time_local)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;

            for r in rules {
                stmt.execute(params![
                    r.store_id,
                    r.day_of_week,
                    r.start_local.format(LOCAL_TIME_FORMAT).to_string(),
                    r.end_local.format(LOCAL_TIME_FORMAT).to_string(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Business hour rules for a store in insertion order.
    pub fn get_business_hours(&self, store_id: &str) -> Result<Vec<BusinessHourRule>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT store_id, day_of_week, start_time_local, end_time_local FROM business_hours
             WHERE store_id = ?1 ORDER BY rowid ASC",
        )?;

        let rules = stmt
            .query_map(params![store_id], |row| {
                let start: String = row.get(2)?;
                let end: String = row.get(3)?;
                Ok(BusinessHourRule {
                    store_id: row.get(0)?,
                    day_of_week: row.get(1)?,
                    start_local: parse_local_time(&start)
                        .ok_or_else(|| conversion_error(2, format!("bad time {:?}", start)))?,
                    end_local: parse_local_time(&end)
                        .ok_or_else(|| conversion_error(3, format!("bad time {:?}", end)))?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(rules)
    }

    // --- Timezones ---

    /// Insert or replace timezone assignments.
    pub fn set_timezones(&self, assignments: &[TimezoneAssignment]) -> Result<(), DbError> {
        if assignments.is_empty() {
            return Ok(());
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO timezones (store_id, timezone_str) VALUES (?1, ?2)
                 ON CONFLICT(store_id) DO UPDATE SET timezone_str=excluded.timezone_str",
            )?;

            for a in assignments {
                stmt.execute(params![a.store_id, a.timezone])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Timezone name assigned to a store, if any.
    pub fn get_timezone(&self, store_id: &str) -> Result<Option<String>, DbError> {
        let conn = self.conn()?;
        let tz = conn
            .query_row(
                "SELECT timezone_str FROM timezones WHERE store_id = ?1",
                params![store_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(tz)
    }

    // --- Reports ---

    /// Insert a new report in the Running state.
    pub fn create_report(&self, report_id: &str) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO reports (report_id, status, created_at) VALUES (?1, ?2, ?3)",
            params![
                report_id,
                ReportStatus::Running.as_str(),
                format_db_time(Utc::now()),
            ],
        )?;
        Ok(())
    }

    /// Move a Running report to Complete. Returns false if it was not Running.
    pub fn complete_report(&self, report_id: &str, csv_path: &str) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE reports SET status = ?2, csv_path = ?3, completed_at = ?4
             WHERE report_id = ?1 AND status = ?5",
            params![
                report_id,
                ReportStatus::Complete.as_str(),
                csv_path,
                format_db_time(Utc::now()),
                ReportStatus::Running.as_str(),
            ],
        )?;
        Ok(changed == 1)
    }

    /// Move a Running report to Failed. Returns false if it was not Running.
    pub fn fail_report(&self, report_id: &str) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE reports SET status = ?2, completed_at = ?3
             WHERE report_id = ?1 AND status = ?4",
            params![
                report_id,
                ReportStatus::Failed.as_str(),
                format_db_time(Utc::now()),
                ReportStatus::Running.as_str(),
            ],
        )?;
        Ok(changed == 1)
    }

    /// Fail every report still marked Running, returning how many were updated.
    ///
    /// Called at startup: a Running row left behind by a previous process has
    /// no worker any more and would otherwise never finish.
    pub fn fail_interrupted_reports(&self) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE reports SET status = ?1, completed_at = ?2 WHERE status = ?3",
            params![
                ReportStatus::Failed.as_str(),
                format_db_time(Utc::now()),
                ReportStatus::Running.as_str(),
            ],
        )?;
        Ok(changed)
    }

    /// Get a report by ID.
    pub fn get_report(&self, report_id: &str) -> Result<Option<ReportJob>, DbError> {
        let conn = self.conn()?;
        let report = conn
            .query_row(
                "SELECT report_id, status, csv_path, created_at, completed_at FROM reports
                 WHERE report_id = ?1",
                params![report_id],
                |row| {
                    let status: String = row.get(1)?;
                    let created_at: String = row.get(3)?;
                    let completed_at: Option<String> = row.get(4)?;
                    Ok(ReportJob {
                        report_id: row.get(0)?,
                        status: status.parse().map_err(|e| conversion_error(1, e))?,
                        csv_path: row.get(2)?,
                        created_at: parse_db_time(&created_at).ok_or_else(|| {
                            conversion_error(3, format!("bad timestamp {:?}", created_at))
                        })?,
                        completed_at: completed_at.as_deref().and_then(parse_db_time),
                    })
                },
            )
            .optional()?;
        Ok(report)
    }
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

/// Format a UTC instant the way it is stored in the database.
pub fn format_db_time(dt: DateTime<Utc>) -> String {
    dt.format(DB_TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database or a seed file.
pub fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    let formats = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f UTC",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    // Try ISO 8601 with an explicit offset or Z
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

/// Parse an `HH:MM:SS` local clock time.
pub fn parse_local_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), LOCAL_TIME_FORMAT).ok()
}
