//! Error types for observation synchronization
//!
//! Listing-level errors abort a run. Everything else is raised while
//! processing a single file and ends up in that file's
//! [`FetchOutcome`](crate::models::FetchOutcome).

use thiserror::Error;

use crate::store::StoreError;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The listing page could not be fetched (network error or non-2xx)
    #[error("listing unavailable at {url}: {reason}")]
    ListingUnavailable { url: String, reason: String },

    /// The listing page has no table with a `Name` column
    #[error("unexpected listing format: {0}")]
    ListingFormat(String),

    #[error("fetch failed for {file}: {source}")]
    Fetch {
        file: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A value could not be coerced; `line` is 1-based and counts the header
    #[error("line {line}, column {column}: cannot parse '{value}' as {expected}")]
    RowType {
        line: usize,
        column: String,
        value: String,
        expected: &'static str,
    },

    #[error("reconciliation query failed for {entity}: {source}")]
    ReconciliationQuery {
        entity: String,
        #[source]
        source: StoreError,
    },

    #[error("write failed for {file}: {source}")]
    Write {
        file: String,
        #[source]
        source: StoreError,
    },

    /// The table could not be recreated for a bulk load
    #[error("table reset failed: {0}")]
    TableReset(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether this error stops the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::ListingUnavailable { .. }
                | SyncError::ListingFormat(_)
                | SyncError::Config(_)
                | SyncError::Client(_)
        )
    }
}
