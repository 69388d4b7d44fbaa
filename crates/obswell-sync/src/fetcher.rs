//! HTTP retrieval of individual data files

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::models::DatasetFile;

/// Build the HTTP client shared by the discoverer and the fetcher
pub fn build_client(config: &SyncConfig) -> Result<Client> {
    let mut builder = Client::builder().user_agent(config.user_agent.clone());
    if let Some(secs) = config.http_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

/// Response of a single file request
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub status: u16,
    pub body: String,
}

impl FetchedFile {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Downloads files relative to the listing's base URL
pub struct FileFetcher {
    client: Client,
    base_url: Url,
}

impl FileFetcher {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn file_url(&self, file: &DatasetFile) -> Result<Url> {
        self.base_url
            .join(&file.name)
            .map_err(|e| SyncError::Config(format!("cannot build URL for {}: {e}", file.name)))
    }

    /// GET one file
    ///
    /// Non-2xx responses are returned with their status, not as errors;
    /// only transport failures (timeouts, resets, undecodable bodies) fail.
    #[instrument(skip(self, file), fields(file = %file.name))]
    pub async fn fetch(&self, file: &DatasetFile) -> Result<FetchedFile> {
        let url = self.file_url(file)?;
        let fetch_error = |source| SyncError::Fetch {
            file: file.name.clone(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(fetch_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(fetch_error)?;

        debug!(status, bytes = body.len(), "Fetched file");
        Ok(FetchedFile { status, body })
    }
}
