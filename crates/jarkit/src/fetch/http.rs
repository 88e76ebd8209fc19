//! Default fetch backend: local files and HTTP(S) via ureq.

use super::{FetchError, FetchResult, Fetcher, RetryConfig, with_retry};
use crate::source::Source;
use std::fs;
use ureq::tls::TlsConfig;

/// Maximum download size (jars are rarely larger than this).
pub const DEFAULT_MAX_BODY_SIZE: u64 = 256 * 1024 * 1024;

const USER_AGENT: &str = concat!("tomcat-jar/", env!("CARGO_PKG_VERSION"));

/// Fetches local paths from disk and remote sources over HTTP(S).
///
/// Remote fetches are retried on transient failures. With
/// `allow_insecure`, plain `http` is permitted and TLS certificates are
/// not verified; without it, plain `http` is refused.
pub struct DefaultFetcher {
    /// Agent verifying TLS certificates.
    secure: ureq::Agent,
    /// Agent used when insecure transport was allowed.
    insecure: ureq::Agent,
    retry: RetryConfig,
    max_body_size: u64,
}

impl DefaultFetcher {
    /// Create a fetcher with default retry and size settings.
    pub fn new() -> Self {
        let insecure_config = ureq::Agent::config_builder()
            .tls_config(TlsConfig::builder().disable_verification(true).build())
            .build();

        Self {
            secure: ureq::Agent::new_with_defaults(),
            insecure: ureq::Agent::new_with_config(insecure_config),
            retry: RetryConfig::default(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Use a custom retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Limit the size of downloaded bodies.
    pub fn with_max_body_size(mut self, bytes: u64) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Current retry policy.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    fn download(&self, url: &url::Url, allow_insecure: bool) -> FetchResult<Vec<u8>> {
        let agent = if allow_insecure {
            &self.insecure
        } else {
            &self.secure
        };

        let mut response = agent
            .get(url.as_str())
            .header("User-Agent", USER_AGENT)
            .call()?;

        response
            .body_mut()
            .with_config()
            .limit(self.max_body_size)
            .read_to_vec()
            .map_err(|e| FetchError::Http {
                message: e.to_string(),
                status: None,
            })
    }
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for DefaultFetcher {
    fn supports_scheme(&self, scheme: &str) -> bool {
        matches!(scheme, "file" | "http" | "https")
    }

    fn fetch(&self, source: &Source, allow_insecure: bool) -> FetchResult<Vec<u8>> {
        match source {
            Source::Local(path) => {
                log::debug!("Reading {}", path.display());
                fs::read(path).map_err(|e| FetchError::Io {
                    path: path.clone(),
                    source: e,
                })
            }
            Source::Remote(url) => {
                if url.scheme() == "http" && !allow_insecure {
                    return Err(FetchError::InsecureTransport {
                        url: url.to_string(),
                    });
                }
                if !self.supports_scheme(url.scheme()) {
                    return Err(FetchError::Unsupported(url.to_string()));
                }
                log::info!("Downloading {}", url);
                with_retry(&self.retry, url.as_str(), || {
                    self.download(url, allow_insecure)
                })
            }
        }
    }
}
