//! Obswell Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the obswell workspace members.
//!
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` variables
//! - **Credentials**: database credential files and connection URLs
//! - **Errors**: the shared error type and result alias
//!
//! # Example
//!
//! ```no_run
//! use obswell_common::credentials::Credentials;
//!
//! fn connection_url() -> obswell_common::Result<String> {
//!     let creds = Credentials::from_file("credentials.json")?;
//!     Ok(creds.connection_url()?)
//! }
//! ```

pub mod credentials;
pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
