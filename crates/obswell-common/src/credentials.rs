//! Database credentials
//!
//! Credentials are read from a JSON file shaped like:
//!
//! ```json
//! {
//!     "host": "localhost",
//!     "port": 5432,
//!     "user": "obswell",
//!     "password": "secret",
//!     "dbname": "gws",
//!     "schema": "obswell"
//! }
//! ```
//!
//! `schema` is optional and falls back to [`DEFAULT_SCHEMA`]. `port` may be a
//! number or a numeric string.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use tracing::debug;
use url::Url;

use crate::error::{CommonError, Result};

/// Schema used when the credentials file does not name one.
pub const DEFAULT_SCHEMA: &str = "obswell";

/// Connection parameters for the observation store
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub host: String,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    #[serde(default = "default_schema")]
    pub schema: String,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl Credentials {
    /// Load credentials from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CommonError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let creds = Self::from_json(&raw).map_err(|source| CommonError::Credentials {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(
            path = %path.display(),
            host = %creds.host,
            dbname = %creds.dbname,
            schema = %creds.schema,
            "Loaded database credentials"
        );

        Ok(creds)
    }

    /// Parse credentials from JSON text
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let mut creds: Self = serde_json::from_str(raw)?;
        if creds.schema.trim().is_empty() {
            creds.schema = default_schema();
        }
        Ok(creds)
    }

    /// Build a Postgres connection URL with the schema on the search path
    ///
    /// User and password are percent-encoded, so credentials containing `@`
    /// or `/` stay intact.
    pub fn connection_url(&self) -> Result<String> {
        if self.host.is_empty() {
            return Err(CommonError::Config("database host cannot be empty".to_string()));
        }
        if self.dbname.is_empty() {
            return Err(CommonError::Config("database name cannot be empty".to_string()));
        }

        let mut url = Url::parse(&format!(
            "postgresql://{}:{}/{}",
            self.host, self.port, self.dbname
        ))?;

        url.set_username(&self.user)
            .map_err(|()| CommonError::Config(format!("invalid database user '{}'", self.user)))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|()| CommonError::Config("invalid database password".to_string()))?;
        }

        url.query_pairs_mut()
            .append_pair("options", &format!("-csearch_path={}", self.schema));

        Ok(url.into())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("dbname", &self.dbname)
            .field("schema", &self.schema)
            .finish()
    }
}
