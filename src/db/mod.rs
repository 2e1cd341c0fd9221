//! Database module for storepulse.
//!
//! Provides SQLite storage for observations, business hours, timezones and
//! report jobs, plus seed ingestion from CSV files.

mod ingest;
mod models;
mod store;

pub use ingest::*;
pub use models::*;
pub use store::*;
