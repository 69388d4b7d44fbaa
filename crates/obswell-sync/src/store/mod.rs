//! Observation stores
//!
//! A store holds one logical table of [`ObservationRow`]s and supports the
//! three operations the pipeline needs: a destructive table reset for bulk
//! loads, the high-water-mark query used by reconciliation, and an atomic
//! per-file append.
//!
//! Implementations:
//! - [`PgObservationStore`]: Postgres table (the production store)
//! - [`CsvFileStore`]: a local CSV file

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

use crate::models::ObservationRow;

pub mod csv_file;
pub mod postgres;

pub use csv_file::CsvFileStore;
pub use postgres::PgObservationStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unreadable store file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Human-readable location, for logs
    fn describe(&self) -> String;

    /// Drop and recreate the observation table, discarding all rows
    async fn reset_table(&self) -> StoreResult<()>;

    /// Timestamps stored for `entity_id` at or after `since`, ascending
    async fn existing_timestamps(
        &self,
        entity_id: &str,
        since: NaiveDateTime,
    ) -> StoreResult<Vec<NaiveDateTime>>;

    /// Append rows as one unit: either all are stored or none are
    ///
    /// Returns the number of rows written.
    async fn append(&self, rows: &[ObservationRow]) -> StoreResult<u64>;

    /// Release connections; the store must not be used afterwards
    async fn close(&self) {}
}
