//! Database model types.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reported state of a store at the moment of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Active,
    Inactive,
}

impl StoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreStatus::Active => "active",
            StoreStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for StoreStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "active" => Ok(StoreStatus::Active),
            "inactive" => Ok(StoreStatus::Inactive),
            other => Err(format!("unknown store status: {}", other)),
        }
    }
}

/// A single timestamped status sample for a store.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub store_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: StoreStatus,
}

/// Opening window of a store for one weekday, in store-local time.
#[derive(Debug, Clone, PartialEq)]
pub struct BusinessHourRule {
    pub store_id: String,
    /// 0 = Monday, 6 = Sunday
    pub day_of_week: u8,
    pub start_local: NaiveTime,
    pub end_local: NaiveTime,
}

/// IANA timezone assigned to a store.
#[derive(Debug, Clone, PartialEq)]
pub struct TimezoneAssignment {
    pub store_id: String,
    pub timezone: String,
}

/// Lifecycle state of a report job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Running,
    Complete,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Running => "Running",
            ReportStatus::Complete => "Complete",
            ReportStatus::Failed => "Failed",
        }
    }

    #[cfg(test)]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReportStatus::Running)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Running" => Ok(ReportStatus::Running),
            "Complete" => Ok(ReportStatus::Complete),
            "Failed" => Ok(ReportStatus::Failed),
            other => Err(format!("unknown report status: {}", other)),
        }
    }
}

/// A report job record.
#[derive(Debug, Clone, Serialize)]
pub struct ReportJob {
    pub report_id: String,
    pub status: ReportStatus,
    #[serde(skip)]
    pub csv_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
