//! Configuration module for storepulse.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::report::ReportSettings;

use chrono_tz::Tz;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
    #[error("max concurrent reports must be at least 1")]
    NoWorkers,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "storepulse.db")
    pub db_path: String,
    /// Directory holding the seed CSV files (default: ".")
    pub data_dir: PathBuf,
    /// Directory where report artifacts are written (default: "reports")
    pub report_dir: PathBuf,
    /// Zone used for stores without a timezone assignment
    pub default_timezone: String,
    /// Upper bound on a single report computation, in seconds
    pub report_timeout_secs: u64,
    /// Number of reports that may compute at the same time
    pub max_concurrent_reports: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "storepulse.db".to_string(),
            data_dir: PathBuf::from("."),
            report_dir: PathBuf::from("reports"),
            default_timezone: "America/Chicago".to_string(),
            report_timeout_secs: 900,
            max_concurrent_reports: 2,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `STOREPULSE_HTTP_PORT`: HTTP port (default: 8080)
    /// - `STOREPULSE_DB_PATH`: Database file path (default: "storepulse.db")
    /// - `STOREPULSE_DATA_DIR`: Seed CSV directory (default: ".")
    /// - `STOREPULSE_REPORT_DIR`: Report output directory (default: "reports")
    /// - `STOREPULSE_DEFAULT_TIMEZONE`: Fallback zone (default: "America/Chicago")
    /// - `STOREPULSE_REPORT_TIMEOUT_SECS`: Report timeout (default: 900)
    /// - `STOREPULSE_MAX_CONCURRENT_REPORTS`: Worker limit (default: 2)
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("STOREPULSE_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(db_path) = env::var("STOREPULSE_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Ok(dir) = env::var("STOREPULSE_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = env::var("STOREPULSE_REPORT_DIR") {
            cfg.report_dir = PathBuf::from(dir);
        }

        if let Ok(tz) = env::var("STOREPULSE_DEFAULT_TIMEZONE") {
            cfg.default_timezone = tz;
        }

        if let Ok(secs) = env::var("STOREPULSE_REPORT_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                cfg.report_timeout_secs = secs;
            }
        }

        if let Ok(n) = env::var("STOREPULSE_MAX_CONCURRENT_REPORTS") {
            if let Ok(n) = n.parse() {
                cfg.max_concurrent_reports = n;
            }
        }

        cfg
    }

    /// Validate the report-related settings and build the manager's view of them.
    pub fn report_settings(&self) -> Result<ReportSettings, ConfigError> {
        let default_timezone: Tz = self
            .default_timezone
            .parse()
            .map_err(|_| ConfigError::UnknownTimezone(self.default_timezone.clone()))?;

        if self.max_concurrent_reports == 0 {
            return Err(ConfigError::NoWorkers);
        }

        Ok(ReportSettings {
            report_dir: self.report_dir.clone(),
            default_timezone,
            timeout: Duration::from_secs(self.report_timeout_secs),
            max_concurrent: self.max_concurrent_reports,
        })
    }
}
