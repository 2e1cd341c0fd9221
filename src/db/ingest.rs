//! Seed data ingestion from CSV files.
//!
//! Loads `store_status.csv`, `business_hours.csv` and `timezones.csv` from a
//! data directory into the store. Rows that fail validation are skipped and
//! counted rather than aborting the load.

use super::models::*;
use super::store::{parse_db_time, parse_local_time, DbError, Store};

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const STATUS_FILE: &str = "store_status.csv";
pub const BUSINESS_HOURS_FILE: &str = "business_hours.csv";
pub const TIMEZONES_FILE: &str = "timezones.csv";

/// Ingestion error types.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Row counts for one seed file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileSummary {
    pub loaded: usize,
    pub skipped: usize,
}

/// Outcome of a seed load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// False when the store already held observations and nothing was read.
    pub performed: bool,
    pub observations: FileSummary,
    pub business_hours: FileSummary,
    pub timezones: FileSummary,
}

#[derive(Debug, Deserialize)]
struct StatusRecord {
    store_id: String,
    timestamp_utc: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct BusinessHoursRecord {
    store_id: String,
    #[serde(alias = "dayOfWeek", alias = "day")]
    day_of_week: String,
    start_time_local: String,
    end_time_local: String,
}

#[derive(Debug, Deserialize)]
struct TimezoneRecord {
    store_id: String,
    timezone_str: String,
}

/// Load the seed CSV files in `data_dir` into an empty store.
///
/// Missing files are skipped with a warning. If the store already holds
/// observations the load is skipped entirely so restarts do not duplicate data.
pub fn load_seed_data(store: &Store, data_dir: &Path) -> Result<IngestSummary, IngestError> {
    let existing = store.count_observations()?;
    if existing > 0 {
        tracing::info!(
            "Store already holds {} observations, skipping seed load",
            existing
        );
        return Ok(IngestSummary::default());
    }

    let mut summary = IngestSummary {
        performed: true,
        ..Default::default()
    };

    if let Some((rows, file)) = read_file(&data_dir.join(STATUS_FILE), parse_status)? {
        store.add_observations(&rows)?;
        summary.observations = file;
    }

    if let Some((rows, file)) =
        read_file(&data_dir.join(BUSINESS_HOURS_FILE), parse_business_hours)?
    {
        store.add_business_hours(&rows)?;
        summary.business_hours = file;
    }

    if let Some((rows, file)) = read_file(&data_dir.join(TIMEZONES_FILE), parse_timezone)? {
        store.set_timezones(&rows)?;
        summary.timezones = file;
    }

    tracing::info!("Seed data loading complete");
    Ok(summary)
}

/// Read and validate every record of a CSV file.
///
/// Returns `None` if the file does not exist.
fn read_file<R, T, F>(
    path: &Path,
    convert: F,
) -> Result<Option<(Vec<T>, FileSummary)>, IngestError>
where
    R: for<'de> Deserialize<'de>,
    F: Fn(R) -> Result<T, String>,
{
    if !path.exists() {
        tracing::warn!("{} not found, skipping", path.display());
        return Ok(None);
    }

    tracing::info!("Loading data from {}", path.display());

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut rows = Vec::new();
    let mut file = FileSummary::default();

    for (line, record) in reader.deserialize::<R>().enumerate() {
        let converted = record
            .map_err(|e| e.to_string())
            .and_then(&convert);
        match converted {
            Ok(row) => {
                rows.push(row);
                file.loaded += 1;
            }
            Err(e) => {
                tracing::debug!("{}: skipping record {}: {}", path.display(), line + 1, e);
                file.skipped += 1;
            }
        }
    }

    if file.skipped > 0 {
        tracing::warn!(
            "{}: skipped {} invalid records",
            path.display(),
            file.skipped
        );
    }
    tracing::info!("Loaded {} rows from {}", file.loaded, path.display());

    Ok(Some((rows, file)))
}

fn parse_status(r: StatusRecord) -> Result<Observation, String> {
    if r.store_id.is_empty() {
        return Err("empty store_id".to_string());
    }
    let timestamp = parse_db_time(&r.timestamp_utc)
        .ok_or_else(|| format!("invalid timestamp {:?}", r.timestamp_utc))?;
    Ok(Observation {
        store_id: r.store_id,
        timestamp,
        status: r.status.parse()?,
    })
}

fn parse_business_hours(r: BusinessHoursRecord) -> Result<BusinessHourRule, String> {
    if r.store_id.is_empty() {
        return Err("empty store_id".to_string());
    }
    let day_of_week: u8 = r
        .day_of_week
        .parse()
        .ok()
        .filter(|d| *d <= 6)
        .ok_or_else(|| format!("invalid day of week {:?}", r.day_of_week))?;
    let start_local = parse_local_time(&r.start_time_local)
        .ok_or_else(|| format!("invalid start time {:?}", r.start_time_local))?;
    let end_local = parse_local_time(&r.end_time_local)
        .ok_or_else(|| format!("invalid end time {:?}", r.end_time_local))?;
    Ok(BusinessHourRule {
        store_id: r.store_id,
        day_of_week,
        start_local,
        end_local,
    })
}

fn parse_timezone(r: TimezoneRecord) -> Result<TimezoneAssignment, String> {
    if r.store_id.is_empty() || r.timezone_str.is_empty() {
        return Err("empty field".to_string());
    }
    Ok(TimezoneAssignment {
        store_id: r.store_id,
        timezone: r.timezone_str,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone, Utc};
    use std::fs;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_load_seed_data() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(STATUS_FILE),
            "store_id,status,timestamp_utc\n\
             1,active,2023-01-22 12:09:39.388884 UTC\n\
             1,inactive,2023-01-22T13:00:00Z\n\
             2,unknown,2023-01-22 12:00:00 UTC\n\
             2,active,not a time\n\
             3,inactive,2023-01-24 09:00:00\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(BUSINESS_HOURS_FILE),
            "store_id,dayOfWeek,start_time_local,end_time_local\n\
             1,0,09:00:00,17:00:00\n\
             1,7,09:00:00,17:00:00\n\
             1,1,9am,17:00:00\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(TIMEZONES_FILE),
            "store_id,timezone_str\n1,Asia/Kolkata\n",
        )
        .unwrap();

        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let summary = load_seed_data(&store, dir.path()).unwrap();

        assert!(summary.performed);
        assert_eq!(summary.observations, FileSummary { loaded: 3, skipped: 2 });
        assert_eq!(summary.business_hours, FileSummary { loaded: 1, skipped: 2 });
        assert_eq!(summary.timezones, FileSummary { loaded: 1, skipped: 0 });

        assert_eq!(store.get_store_ids().unwrap(), vec!["1", "3"]);
        assert_eq!(
            store.get_latest_observation_time().unwrap(),
            Some(Utc.with_ymd_and_hms(2023, 1, 24, 9, 0, 0).unwrap())
        );
        let rules = store.get_business_hours("1").unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].day_of_week, 0);
        assert_eq!(rules[0].end_local, NaiveTime::from_hms_opt(17, 0, 0).unwrap());
        assert_eq!(store.get_timezone("1").unwrap().as_deref(), Some("Asia/Kolkata"));
    }

    #[test]
    fn test_load_skipped_when_populated() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(STATUS_FILE),
            "store_id,timestamp_utc,status\n1,2023-01-22 12:00:00 UTC,active\n",
        )
        .unwrap();

        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();

        let first = load_seed_data(&store, dir.path()).unwrap();
        assert!(first.performed);
        let second = load_seed_data(&store, dir.path()).unwrap();
        assert!(!second.performed);
        assert_eq!(store.count_observations().unwrap(), 1);
    }

    #[test]
    fn test_missing_files_are_skipped() {
        let dir = tempdir().unwrap();
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();

        let summary = load_seed_data(&store, dir.path()).unwrap();
        assert!(summary.performed);
        assert_eq!(summary.observations, FileSummary::default());
        assert_eq!(store.count_observations().unwrap(), 0);
    }
}
