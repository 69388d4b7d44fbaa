//! Sync pipeline
//!
//! One run discovers the listing once, then processes every file of the
//! selected kind through fetch, normalize, reconcile (incremental runs only)
//! and append. Each file ends in exactly one [`FetchOutcome`]; a failure in
//! one file is recorded and the run moves on.
//!
//! A bulk run resets the table lazily: just before the first bulk file with
//! rows is appended, and at most once. A run whose bulk files are all
//! missing or unreadable leaves the table as it was.
//!
//! Files are processed through an ordered buffered stream, so with the
//! default concurrency of 1 the run is sequential in listing order and with
//! higher values outcomes are still returned in listing order.

use std::sync::Arc;

use chrono::{DateTime, Local};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::config::SyncConfig;
use crate::discovery::ListingDiscoverer;
use crate::error::{Result, SyncError};
use crate::fetcher::{build_client, FileFetcher};
use crate::models::{DatasetFile, DatasetKind, FetchOutcome};
use crate::normalizer;
use crate::reconcile::reconcile;
use crate::store::ObservationStore;

/// Which file set a run loads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Recreate the table and load every full-history file
    Bulk,
    /// Append the unseen rows of every recent-observations file
    Incremental,
}

impl SyncMode {
    pub fn kind(self) -> DatasetKind {
        match self {
            SyncMode::Bulk => DatasetKind::Bulk,
            SyncMode::Incremental => DatasetKind::Incremental,
        }
    }

    /// CLI subcommand that starts this mode
    pub fn command(self) -> &'static str {
        match self {
            SyncMode::Bulk => "reset",
            SyncMode::Incremental => "update",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SyncMode::Bulk => "full reset",
            SyncMode::Incremental => "incremental update",
        }
    }
}

/// Everything a finished run reports
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub mode: SyncMode,
    /// One entry per processed file, in listing order
    pub outcomes: Vec<(DatasetFile, FetchOutcome)>,
}

impl RunSummary {
    pub fn all_links_valid(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.link_valid())
    }

    pub fn all_error_free(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_error_free())
    }

    pub fn rows_written(&self) -> u64 {
        self.outcomes.iter().map(|(_, outcome)| outcome.rows_written()).sum()
    }

    pub fn failed_files(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_error_free())
            .count()
    }

    pub fn outcome(&self, name: &str) -> Option<&FetchOutcome> {
        self.outcomes
            .iter()
            .find(|(file, _)| file.name == name)
            .map(|(_, outcome)| outcome)
    }
}

enum ResetState {
    Pending,
    Done,
    Failed(String),
}

/// Drops and recreates the table at most once per run
///
/// Bulk files call [`TableReset::ensure`] only once they have rows ready to
/// append, so a run that loads nothing leaves the stored history in place.
struct TableReset {
    state: Mutex<ResetState>,
}

impl Default for TableReset {
    fn default() -> Self {
        Self {
            state: Mutex::new(ResetState::Pending),
        }
    }
}

impl TableReset {
    async fn ensure(&self, store: &dyn ObservationStore) -> Result<()> {
        let mut state = self.state.lock().await;

        if let ResetState::Pending = *state {
            *state = match store.reset_table().await {
                Ok(()) => {
                    info!("Observation table reset before first bulk load");
                    ResetState::Done
                },
                Err(e) => {
                    error!(error = %e, "Table reset failed, no bulk file will be loaded");
                    ResetState::Failed(e.to_string())
                },
            };
        }

        match &*state {
            ResetState::Failed(reason) => Err(SyncError::TableReset(reason.clone())),
            _ => Ok(()),
        }
    }
}

pub struct SyncPipeline {
    discoverer: ListingDiscoverer,
    fetcher: FileFetcher,
    store: Arc<dyn ObservationStore>,
    concurrency: usize,
}

impl SyncPipeline {
    /// Build the HTTP client from `config` and wire it to `store`
    pub fn new(config: &SyncConfig, store: Arc<dyn ObservationStore>) -> Result<Self> {
        config.validate()?;
        let client = build_client(config)?;

        Ok(Self {
            discoverer: ListingDiscoverer::new(client.clone(), config.listing_url.clone()),
            fetcher: FileFetcher::new(client, config.listing_url.clone()),
            store,
            concurrency: config.concurrency,
        })
    }

    pub fn store(&self) -> &Arc<dyn ObservationStore> {
        &self.store
    }

    /// Run one sync
    ///
    /// Only listing errors are returned; every per-file problem is captured
    /// in the summary.
    #[instrument(skip(self), fields(store = %self.store.describe()))]
    pub async fn run(&self, mode: SyncMode) -> Result<RunSummary> {
        let started_at = Local::now();
        info!(mode = mode.command(), concurrency = self.concurrency, "Starting sync run");

        let files: Vec<DatasetFile> = self
            .discoverer
            .discover()
            .await?
            .into_iter()
            .filter(|file| file.kind == mode.kind())
            .collect();

        if files.is_empty() {
            warn!(kind = %mode.kind(), "No files of the requested kind on the listing");
        }

        let reset = TableReset::default();
        let outcomes = self.process_all(files, mode, &reset).await;

        let summary = RunSummary {
            started_at,
            mode,
            outcomes,
        };

        info!(
            files = summary.outcomes.len(),
            failed = summary.failed_files(),
            rows_written = summary.rows_written(),
            all_links_valid = summary.all_links_valid(),
            "Sync run completed"
        );

        Ok(summary)
    }

    async fn process_all(
        &self,
        files: Vec<DatasetFile>,
        mode: SyncMode,
        reset: &TableReset,
    ) -> Vec<(DatasetFile, FetchOutcome)> {
        let total = files.len();

        stream::iter(files.into_iter().enumerate())
            .map(|(index, file)| async move {
                info!(file = %file.name, "Processing file {} / {}", index + 1, total);
                let outcome = self.process_file(&file, mode, reset).await;
                (file, outcome)
            })
            .buffered(self.concurrency.max(1))
            .collect()
            .await
    }

    /// Process one file to its final outcome
    #[instrument(skip(self, file, reset), fields(file = %file.name, entity = %file.entity_id))]
    async fn process_file(
        &self,
        file: &DatasetFile,
        mode: SyncMode,
        reset: &TableReset,
    ) -> FetchOutcome {
        let fetched = match self.fetcher.fetch(file).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(error = %e, "Fetch failed");
                return FetchOutcome::failed(None, e);
            },
        };

        if !fetched.is_success() {
            warn!(status = fetched.status, "File not available");
            return FetchOutcome::http_status_only(fetched.status);
        }

        match self.load(file, &fetched.body, mode, reset).await {
            Ok(written) => {
                info!(written, "✓ File loaded");
                FetchOutcome::stored(fetched.status, written)
            },
            Err(e) => {
                warn!(error = %e, "✗ File failed (continuing with next file)");
                FetchOutcome::failed(Some(fetched.status), e)
            },
        }
    }

    async fn load(
        &self,
        file: &DatasetFile,
        body: &str,
        mode: SyncMode,
        reset: &TableReset,
    ) -> Result<u64> {
        let rows = normalizer::normalize(body)?;

        let rows = match mode {
            SyncMode::Bulk => {
                if !rows.is_empty() {
                    reset.ensure(self.store.as_ref()).await?;
                }
                rows
            },
            SyncMode::Incremental => reconcile(&file.entity_id, rows, self.store.as_ref()).await?,
        };

        self.store
            .append(&rows)
            .await
            .map_err(|source| SyncError::Write {
                file: file.name.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_selects_kind() {
        assert_eq!(SyncMode::Bulk.kind(), DatasetKind::Bulk);
        assert_eq!(SyncMode::Incremental.kind(), DatasetKind::Incremental);
        assert_eq!(SyncMode::Bulk.command(), "reset");
        assert_eq!(SyncMode::Incremental.command(), "update");
    }
}
