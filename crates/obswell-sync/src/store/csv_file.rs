//! Observation store backed by a local CSV file
//!
//! Writes the same four columns as the database table, header first. Each
//! append is serialized in memory and written while a lock is held, so
//! concurrent pipelines never interleave rows. A write that fails part way
//! truncates the file back to its length before the append.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::{ObservationStore, StoreError, StoreResult};
use crate::models::ObservationRow;
use crate::normalizer;

pub struct CsvFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Every stored row; a missing file is an empty store
    pub async fn read_all(&self) -> StoreResult<Vec<ObservationRow>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        normalizer::normalize(&text).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Current file length; a missing file has length 0
    async fn current_len(&self) -> StoreResult<u64> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn encode(rows: &[ObservationRow], include_header: bool, path: &Path) -> StoreResult<Vec<u8>> {
        let mut buffer = Vec::new();
        normalizer::write_rows(&mut buffer, rows, include_header).map_err(|e| {
            StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        Ok(buffer)
    }
}

#[async_trait]
impl ObservationStore for CsvFileStore {
    fn describe(&self) -> String {
        format!("csv file {}", self.path.display())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn reset_table(&self) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| self.io_error(e))?;
        }

        let header = Self::encode(&[], true, &self.path)?;
        tokio::fs::write(&self.path, header).await.map_err(|e| self.io_error(e))?;

        warn!("Observation file truncated");
        Ok(())
    }

    async fn existing_timestamps(
        &self,
        entity_id: &str,
        since: NaiveDateTime,
    ) -> StoreResult<Vec<NaiveDateTime>> {
        let _guard = self.write_lock.lock().await;

        let mut timestamps: Vec<NaiveDateTime> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|row| row.entity_id == entity_id && row.timestamp >= since)
            .map(|row| row.timestamp)
            .collect();
        timestamps.sort_unstable();

        debug!(entity_id, existing = timestamps.len(), "Loaded existing timestamps");
        Ok(timestamps)
    }

    async fn append(&self, rows: &[ObservationRow]) -> StoreResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;

        let original_len = self.current_len().await?;
        let bytes = Self::encode(rows, original_len == 0, &self.path)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        write_or_restore(&mut file, &bytes, &self.path, original_len)
            .await
            .map_err(|e| self.io_error(e))?;

        Ok(rows.len() as u64)
    }
}

/// Write `bytes` in full, or put the file back to `original_len`
///
/// The write error is returned either way.
async fn write_or_restore<W>(
    writer: &mut W,
    bytes: &[u8],
    path: &Path,
    original_len: u64,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = match writer.write_all(bytes).await {
        Ok(()) => writer.flush().await,
        Err(e) => Err(e),
    };

    if let Err(e) = written {
        // Drain whatever the writer still holds before truncating
        writer.flush().await.ok();
        if let Err(restore) = restore_len(path, original_len).await {
            warn!(
                path = %path.display(),
                error = %restore,
                "Could not truncate observation file after a failed append"
            );
        }
        return Err(e);
    }

    Ok(())
}

async fn restore_len(path: &Path, len: u64) -> std::io::Result<()> {
    let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
    file.set_len(len).await?;
    file.sync_all().await
}
