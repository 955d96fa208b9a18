//! SQLite storage layer.
//!
//! Config store and audit sink backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod audit;
pub mod config_store;
pub mod pool;

use chrono::{DateTime, SecondsFormat, Utc};

use switchboard_types::error::RepositoryError;

pub use audit::SqliteAuditSink;
pub use config_store::SqliteConfigStore;
pub use pool::DatabasePool;

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::InvalidData(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so stored timestamps sort as text.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn query_error(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => RepositoryError::Connection,
        other => RepositoryError::Query(other.to_string()),
    }
}
