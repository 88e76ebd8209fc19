//! Fetch backends that bring jar content to the staging step.
//!
//! The staging resource only talks to the [`Fetcher`] trait, so tests and
//! embedders can swap in their own transport.

pub mod http;
pub mod retry;

use crate::source::Source;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub use http::DefaultFetcher;
pub use retry::{RetryConfig, with_retry};

/// Errors from fetching content
#[derive(Error, Debug)]
pub enum FetchError {
    /// Reading a local source failed
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The server answered with an error or the body was unusable
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        status: Option<u16>,
    },

    /// Connection-level failure
    #[error("network error: {message}")]
    Network { message: String },

    /// Plain-text or unverified transfer without `allow_insecure`
    #[error("refusing insecure transfer from {url}: set allow_insecure to permit it")]
    InsecureTransport { url: String },

    /// The backend cannot handle this source
    #[error("unsupported source: {0}")]
    Unsupported(String),
}

impl FetchError {
    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Http {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

impl From<ureq::Error> for FetchError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {}", code),
                status: Some(code),
            },
            other => Self::Network {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// A backend able to bring source content into memory
pub trait Fetcher: Send + Sync {
    /// Whether URLs with this scheme can be fetched
    fn supports_scheme(&self, scheme: &str) -> bool;

    /// Fetch the full content of a source
    ///
    /// `allow_insecure` permits unencrypted or unverified transport.
    fn fetch(&self, source: &Source, allow_insecure: bool) -> FetchResult<Vec<u8>>;
}
