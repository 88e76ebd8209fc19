//! Resolution of a declared `jar_source` into a fetchable source

use crate::error::{JarError, Result};
use crate::fetch::Fetcher;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Where staged content comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// An absolute path on this machine
    Local(PathBuf),
    /// A URL handled by the fetch backend
    Remote(Url),
}

impl Source {
    /// Resolve a raw source string against the backend's capabilities
    ///
    /// Absolute paths are local. Anything else must parse as a URL whose
    /// scheme the fetcher supports; `file://` URLs become local paths.
    pub fn resolve(raw: &str, fetcher: &dyn Fetcher) -> Result<Self> {
        let invalid = |reason: String| JarError::SourceResolution {
            source_url: raw.to_string(),
            reason,
        };

        if raw.starts_with('/') {
            return Ok(Self::Local(PathBuf::from(raw)));
        }

        let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;

        if !fetcher.supports_scheme(url.scheme()) {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }

        if url.scheme() == "file" {
            return url
                .to_file_path()
                .map(Self::Local)
                .map_err(|()| invalid("not a local file path".to_string()));
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }

        Ok(Self::Remote(url))
    }

    /// Whether this source is read from the local filesystem
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}
