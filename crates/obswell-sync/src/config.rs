//! Sync configuration
//!
//! Defaults live in the constants below. [`SyncConfig::from_env`] reads a
//! `.env` file (if present) and `OBSWELL_*` variables; the CLI applies its
//! flags on top through the builder.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SyncError};

// ============================================================================
// Defaults
// ============================================================================

/// Directory listing of the BC observation-well data files.
pub const DEFAULT_LISTING_URL: &str =
    "https://www.env.gov.bc.ca/wsd/data_searches/obswell/map/data/";

/// Default location of the run report.
pub const DEFAULT_REPORT_PATH: &str = "update_report.txt";

/// Default HTTP timeout for the listing and each file, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Default number of files processed at once (sequential).
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Default observation table name.
pub const DEFAULT_TABLE: &str = "hourly";

/// Rows per multi-row INSERT statement (4 binds per row).
pub const DEFAULT_INSERT_CHUNK_SIZE: usize = 1000;

/// Postgres limit on bind parameters in one statement.
const MAX_BIND_PARAMETERS: usize = 65_535;

pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_USER_AGENT: &str = concat!("obswell-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Listing page; always ends with `/` so file names join beneath it
    pub listing_url: Url,
    pub report_path: PathBuf,
    /// `None` disables the timeout
    pub http_timeout_secs: Option<u64>,
    pub user_agent: String,
    pub concurrency: usize,
    pub table: String,
    pub insert_chunk_size: usize,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            listing_url: Url::parse(DEFAULT_LISTING_URL)
                .unwrap_or_else(|_| unreachable!("default listing URL is valid")),
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
            http_timeout_secs: Some(DEFAULT_HTTP_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            table: DEFAULT_TABLE.to_string(),
            insert_chunk_size: DEFAULT_INSERT_CHUNK_SIZE,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            db_acquire_timeout_secs: DEFAULT_DB_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

/// Parse a listing URL and make sure its path ends with `/`
pub fn listing_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| SyncError::Config(format!("invalid listing URL '{raw}': {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SyncError::Config(format!("{key} has invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}

impl SyncConfig {
    /// Load configuration from the environment
    ///
    /// - `OBSWELL_LISTING_URL`
    /// - `OBSWELL_REPORT_PATH`
    /// - `OBSWELL_HTTP_TIMEOUT_SECS` (`0` disables the timeout)
    /// - `OBSWELL_CONCURRENCY`
    /// - `OBSWELL_TABLE`
    /// - `OBSWELL_INSERT_CHUNK_SIZE`
    /// - `OBSWELL_DB_MAX_CONNECTIONS`
    /// - `OBSWELL_DB_ACQUIRE_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(raw) = std::env::var("OBSWELL_LISTING_URL") {
            config.listing_url = listing_base_url(&raw)?;
        }
        if let Ok(path) = std::env::var("OBSWELL_REPORT_PATH") {
            config.report_path = PathBuf::from(path);
        }
        if let Some(secs) = env_parse::<u64>("OBSWELL_HTTP_TIMEOUT_SECS")? {
            config.http_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(concurrency) = env_parse("OBSWELL_CONCURRENCY")? {
            config.concurrency = concurrency;
        }
        if let Ok(table) = std::env::var("OBSWELL_TABLE") {
            config.table = table;
        }
        if let Some(size) = env_parse("OBSWELL_INSERT_CHUNK_SIZE")? {
            config.insert_chunk_size = size;
        }
        if let Some(max) = env_parse("OBSWELL_DB_MAX_CONNECTIONS")? {
            config.db_max_connections = max;
        }
        if let Some(secs) = env_parse("OBSWELL_DB_ACQUIRE_TIMEOUT_SECS")? {
            config.db_acquire_timeout_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder { config: Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(SyncError::Config("concurrency must be greater than 0".to_string()));
        }
        if self.table.trim().is_empty() {
            return Err(SyncError::Config("table name cannot be empty".to_string()));
        }
        if self.insert_chunk_size == 0 || self.insert_chunk_size * 4 > MAX_BIND_PARAMETERS {
            return Err(SyncError::Config(format!(
                "insert chunk size must be between 1 and {}",
                MAX_BIND_PARAMETERS / 4
            )));
        }
        if self.db_max_connections == 0 {
            return Err(SyncError::Config("db max connections must be greater than 0".to_string()));
        }
        if self.report_path.as_os_str().is_empty() {
            return Err(SyncError::Config("report path cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for SyncConfig
#[derive(Debug)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn from_config(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn listing_url(mut self, url: Url) -> Self {
        self.config.listing_url = url;
        self
    }

    pub fn report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.report_path = path.into();
        self
    }

    pub fn http_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.http_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.config.table = table.into();
        self
    }

    pub fn insert_chunk_size(mut self, size: usize) -> Self {
        self.config.insert_chunk_size = size;
        self
    }

    pub fn build(self) -> Result<SyncConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
