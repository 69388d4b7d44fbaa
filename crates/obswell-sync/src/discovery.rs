//! Remote listing discovery
//!
//! The data directory is published as an HTML index page with one table.
//! File names come from that table's `Name` column and are classified by
//! suffix; anything that is not a bulk or incremental data file (parent
//! directory links, readme files, images) is dropped without error.

use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::{Result, SyncError};
use crate::models::{DatasetFile, DatasetKind};

/// Header text of the column holding file names
pub const NAME_COLUMN: &str = "Name";

/// Discovers dataset files from the remote directory listing
pub struct ListingDiscoverer {
    client: Client,
    listing_url: Url,
}

impl ListingDiscoverer {
    pub fn new(client: Client, listing_url: Url) -> Self {
        Self { client, listing_url }
    }

    /// Fetch the listing and classify every data file on it, in page order
    #[instrument(skip(self), fields(url = %self.listing_url))]
    pub async fn discover(&self) -> Result<Vec<DatasetFile>> {
        let html = self.fetch_listing().await?;
        let names = parse_listing_names(&html)?;
        let files = classify_names(&names);

        info!(
            listed = names.len(),
            bulk = files.iter().filter(|f| f.kind == DatasetKind::Bulk).count(),
            incremental = files.iter().filter(|f| f.kind == DatasetKind::Incremental).count(),
            "Discovered dataset files"
        );

        Ok(files)
    }

    async fn fetch_listing(&self) -> Result<String> {
        let unavailable = |reason: String| SyncError::ListingUnavailable {
            url: self.listing_url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(self.listing_url.clone())
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {status}")));
        }

        response.text().await.map_err(|e| unavailable(e.to_string()))
    }
}

/// Keep the names that are data files, preserving order
pub fn classify_names<S: AsRef<str>>(names: &[S]) -> Vec<DatasetFile> {
    names
        .iter()
        .filter_map(|name| {
            let name = name.as_ref();
            let file = DatasetFile::classify(name);
            if file.is_none() {
                debug!(name, "Ignoring non-data listing entry");
            }
            file
        })
        .collect()
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| SyncError::ListingFormat(format!("bad selector '{css}': {e}")))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Extract the `Name` column of the first table on the page
///
/// The header row is the first row with a cell reading exactly `Name`.
/// Rows too short to reach that column and empty cells are skipped.
pub fn parse_listing_names(html: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let table_selector = selector("table")?;
    let row_selector = selector("tr")?;
    let cell_selector = selector("th, td")?;

    let table = document
        .select(&table_selector)
        .next()
        .ok_or_else(|| SyncError::ListingFormat("no <table> element on listing page".to_string()))?;

    let mut rows = table.select(&row_selector);

    let name_index = rows
        .by_ref()
        .find_map(|row| {
            row.select(&cell_selector)
                .position(|cell| cell_text(cell) == NAME_COLUMN)
        })
        .ok_or_else(|| {
            SyncError::ListingFormat(format!("listing table has no '{NAME_COLUMN}' column"))
        })?;

    let names = rows
        .filter_map(|row| row.select(&cell_selector).nth(name_index))
        .map(cell_text)
        .filter(|name| !name.is_empty())
        .collect();

    Ok(names)
}
