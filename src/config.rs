//! Manifest of jar declarations
//!
//! ```toml
//! [server]
//! catalina_base = "/opt/apache-tomcat"
//! user = "tomcat"
//! group = "tomcat"
//!
//! [fetch]
//! retries = 3
//!
//! [[jar]]
//! name = "sample.jar"
//! jar_source = "/tmp/sample.jar"
//! ```

use anyhow::{Context, Result, bail};
use jarkit::{DefaultFetcher, JarParams, RetryConfig, ServerDefaults};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Fetch backend tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Attempts per remote download, including the first
    pub retries: u32,
    /// Base delay before the first retry
    pub retry_delay_secs: u64,
    /// Largest accepted download
    pub max_size_mb: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay_secs: 2,
            max_size_mb: 256,
        }
    }
}

impl FetchConfig {
    /// Build the fetch backend described by this section
    pub fn fetcher(&self) -> DefaultFetcher {
        DefaultFetcher::new()
            .with_retry(RetryConfig::new(
                self.retries,
                Duration::from_secs(self.retry_delay_secs),
                2.0,
            ))
            .with_max_body_size(self.max_size_mb * 1024 * 1024)
    }
}

/// One `[[jar]]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JarDeclaration {
    pub name: String,
    #[serde(flatten)]
    pub params: JarParams,
    /// Keys that matched no parameter
    #[serde(flatten, skip_serializing)]
    extra: BTreeMap<String, toml::Value>,
}

impl JarDeclaration {
    pub fn new(name: impl Into<String>, params: JarParams) -> Self {
        Self {
            name: name.into(),
            params,
            extra: BTreeMap::new(),
        }
    }
}

/// The whole manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub server: ServerDefaults,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default, rename = "jar")]
    pub jars: Vec<JarDeclaration>,
}

impl Manifest {
    /// Parse a manifest from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(content).context("Invalid manifest format")?;
        manifest.check_known_keys()?;
        manifest.check_unique_names()?;
        Ok(manifest)
    }

    /// Load a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("In {}", path.display()))
    }

    fn check_known_keys(&self) -> Result<()> {
        for jar in &self.jars {
            if let Some(key) = jar.extra.keys().next() {
                bail!("Jar '{}': unknown parameter '{}'", jar.name, key);
            }
        }
        Ok(())
    }

    fn check_unique_names(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for jar in &self.jars {
            if !seen.insert(jar.name.as_str()) {
                bail!("Jar '{}' is declared more than once", jar.name);
            }
        }
        Ok(())
    }
}
