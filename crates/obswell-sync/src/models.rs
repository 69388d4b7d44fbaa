//! Core data types: dataset files, observations and per-file outcomes

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// File-name suffix of a full-history file
pub const BULK_SUFFIX: &str = "-data.csv";

/// File-name suffix of a recent-observations file
pub const INCREMENTAL_SUFFIX: &str = "-recent.csv";

/// How a remote file is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Full history for an entity, loaded with table-replace semantics
    Bulk,
    /// Recent observations, reconciled before append
    Incremental,
}

impl DatasetKind {
    pub fn suffix(self) -> &'static str {
        match self {
            DatasetKind::Bulk => BULK_SUFFIX,
            DatasetKind::Incremental => INCREMENTAL_SUFFIX,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DatasetKind::Bulk => "bulk",
            DatasetKind::Incremental => "incremental",
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A data file named in the remote listing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetFile {
    pub name: String,
    /// Name with the kind's suffix removed, e.g. "OW001" for "OW001-data.csv"
    pub entity_id: String,
    pub kind: DatasetKind,
}

impl DatasetFile {
    /// Classify a listing entry by suffix
    ///
    /// Returns `None` for names that are neither bulk nor incremental files,
    /// and for names that are nothing but a suffix.
    pub fn classify(name: &str) -> Option<Self> {
        [DatasetKind::Bulk, DatasetKind::Incremental]
            .into_iter()
            .find_map(|kind| {
                name.strip_suffix(kind.suffix())
                    .filter(|entity| !entity.is_empty())
                    .map(|entity| DatasetFile {
                        name: name.to_string(),
                        entity_id: entity.to_string(),
                        kind,
                    })
            })
    }
}

/// One observation in canonical form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub timestamp: NaiveDateTime,
    /// `None` when the source held a missing-value marker
    pub value: Option<f64>,
    pub approval: String,
    pub entity_id: String,
}

/// Result of processing one file, finalized once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchOutcome {
    http_status: Option<u16>,
    error_message: String,
    rows_written: u64,
}

impl FetchOutcome {
    /// The file was fetched and its rows were stored
    pub fn stored(http_status: u16, rows_written: u64) -> Self {
        Self {
            http_status: Some(http_status),
            error_message: String::new(),
            rows_written,
        }
    }

    /// The server answered with a non-success status; nothing was parsed
    pub fn http_status_only(http_status: u16) -> Self {
        Self {
            http_status: Some(http_status),
            error_message: String::new(),
            rows_written: 0,
        }
    }

    /// Processing raised an error; `http_status` is `None` when no response
    /// was received
    pub fn failed(http_status: Option<u16>, error: impl std::fmt::Display) -> Self {
        let mut error_message = error.to_string();
        if error_message.is_empty() {
            error_message = "unknown error".to_string();
        }
        Self {
            http_status,
            error_message,
            rows_written: 0,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Link validity as the report counts it: exactly HTTP 200
    pub fn link_valid(&self) -> bool {
        self.http_status == Some(200)
    }

    pub fn is_error_free(&self) -> bool {
        self.error_message.is_empty()
    }
}
