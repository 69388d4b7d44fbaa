//! Obswell Sync Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Keeps a store of hourly groundwater observations in step with the BC
//! observation-well data directory.
//!
//! # Overview
//!
//! - **Discovery**: file names scraped from the directory listing page
//! - **Fetching**: one HTTP GET per data file
//! - **Normalization**: CSV text into typed [`ObservationRow`]s
//! - **Reconciliation**: high-water-mark query plus set difference, so only
//!   unseen rows are appended
//! - **Stores**: Postgres table or local CSV file behind [`ObservationStore`]
//! - **Reporting**: plain-text summary of every file's outcome
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use obswell_sync::{CsvFileStore, SyncConfig, SyncMode, SyncPipeline};
//!
//! # async fn run() -> obswell_sync::Result<()> {
//! let config = SyncConfig::from_env()?;
//! let store = Arc::new(CsvFileStore::new("ObsWellHourly.csv"));
//! let pipeline = SyncPipeline::new(&config, store)?;
//!
//! let summary = pipeline.run(SyncMode::Incremental).await?;
//! obswell_sync::report::write_report(&summary, &config.report_path).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod schema;
pub mod store;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use models::{DatasetFile, DatasetKind, FetchOutcome, ObservationRow};
pub use pipeline::{RunSummary, SyncMode, SyncPipeline};
pub use store::{CsvFileStore, ObservationStore, PgObservationStore, StoreError};
