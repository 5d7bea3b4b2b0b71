//! SQLite persistence for screening runs: the watchlist, the latest judged record
//! per entity and the external estimates used as deviation baselines.

pub mod db;
pub mod estimates;
pub mod results;
pub mod watchlist;

pub use db::ScreeningDb;

use chrono::{DateTime, Utc};

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn db_error(e: anyhow::Error) -> screening_core::ScreeningError {
    screening_core::ScreeningError::Database(format!("{:#}", e))
}
