//! Shared helpers for obswell-sync integration tests
//!
//! - [`MemoryStore`]: in-memory [`ObservationStore`] with failure injection
//! - listing and file mocks for a `wiremock` server
//! - row and CSV builders

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use obswell_sync::normalizer::{parse_timestamp, to_csv};
use obswell_sync::store::StoreResult;
use obswell_sync::{ObservationRow, ObservationStore, StoreError, SyncConfig, SyncPipeline};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock listing is served under
pub const LISTING_PATH: &str = "/obswell/data/";

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,obswell_sync=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// In-memory store
///
/// `append` is all-or-nothing: when it fails for an entity nothing from that
/// call is kept, as a rolled-back transaction would leave it.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<ObservationRow>>,
    resets: AtomicUsize,
    queries: AtomicUsize,
    fail_append_for: Option<String>,
    fail_reset: bool,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<ObservationRow>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    /// Fail every append that contains a row for `entity_id`
    pub fn failing_append_for(mut self, entity_id: &str) -> Self {
        self.fail_append_for = Some(entity_id.to_string());
        self
    }

    pub fn failing_reset(mut self) -> Self {
        self.fail_reset = true;
        self
    }

    pub fn rows(&self) -> Vec<ObservationRow> {
        self.rows.lock().unwrap().clone()
    }

    pub fn rows_for(&self, entity_id: &str) -> Vec<ObservationRow> {
        self.rows()
            .into_iter()
            .filter(|row| row.entity_id == entity_id)
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn reset_table(&self) -> StoreResult<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        if self.fail_reset {
            return Err(StoreError::Database(sqlx::Error::Protocol(
                "permission denied for schema obswell".to_string(),
            )));
        }
        self.rows.lock().unwrap().clear();
        Ok(())
    }

    async fn existing_timestamps(
        &self,
        entity_id: &str,
        since: NaiveDateTime,
    ) -> StoreResult<Vec<NaiveDateTime>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut found: Vec<NaiveDateTime> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.entity_id == entity_id && row.timestamp >= since)
            .map(|row| row.timestamp)
            .collect();
        found.sort_unstable();
        Ok(found)
    }

    async fn append(&self, rows: &[ObservationRow]) -> StoreResult<u64> {
        if let Some(target) = &self.fail_append_for {
            if rows.iter().any(|row| &row.entity_id == target) {
                return Err(StoreError::Database(sqlx::Error::Protocol(
                    "value too long for type character varying".to_string(),
                )));
            }
        }
        self.rows.lock().unwrap().extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub fn ts(text: &str) -> NaiveDateTime {
    parse_timestamp(text).expect("valid timestamp")
}

pub fn row(entity: &str, time: &str, value: f64) -> ObservationRow {
    ObservationRow {
        timestamp: ts(time),
        value: Some(value),
        approval: "Provisional".to_string(),
        entity_id: entity.to_string(),
    }
}

/// Observation file body for `entity` with one row per `(time, value)`
pub fn csv_body(entity: &str, points: &[(&str, f64)]) -> String {
    let rows: Vec<ObservationRow> = points
        .iter()
        .map(|(time, value)| row(entity, time, *value))
        .collect();
    to_csv(&rows).expect("serializable rows")
}

/// Apache-style directory index listing `names`
pub fn listing_html(names: &[&str]) -> String {
    let mut html = String::from(
        "<html><head><title>Index of /obswell/data</title></head><body>\n<table>\n\
         <tr><th valign=\"top\"><img src=\"/icons/blank.gif\" alt=\"[ICO]\"></th>\
         <th><a href=\"?C=N;O=D\">Name</a></th><th>Last modified</th><th>Size</th></tr>\n\
         <tr><th colspan=\"4\"><hr></th></tr>\n\
         <tr><td><img src=\"/icons/back.gif\" alt=\"[PARENTDIR]\"></td>\
         <td><a href=\"/obswell/\">Parent Directory</a></td><td>&nbsp;</td><td>-</td></tr>\n",
    );
    for name in names {
        html.push_str(&format!(
            "<tr><td><img src=\"/icons/text.gif\" alt=\"[TXT]\"></td>\
             <td><a href=\"{name}\">{name}</a></td><td>2021-06-01 03:12</td><td>4K</td></tr>\n"
        ));
    }
    html.push_str("<tr><th colspan=\"4\"><hr></th></tr>\n</table>\n</body></html>\n");
    html
}

pub async fn mount_listing(server: &MockServer, names: &[&str]) {
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(names)))
        .mount(server)
        .await;
}

pub async fn mount_file(server: &MockServer, name: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("{LISTING_PATH}{name}")))
        .respond_with(ResponseTemplate::new(status).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

pub fn listing_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}{LISTING_PATH}", server.uri())).expect("mock server URL")
}

pub fn test_config(server: &MockServer, concurrency: usize) -> SyncConfig {
    SyncConfig::builder()
        .listing_url(listing_url(server))
        .http_timeout_secs(Some(5))
        .concurrency(concurrency)
        .build()
        .expect("valid test config")
}

pub fn pipeline(server: &MockServer, store: Arc<dyn ObservationStore>) -> SyncPipeline {
    SyncPipeline::new(&test_config(server, 1), store).expect("pipeline")
}
