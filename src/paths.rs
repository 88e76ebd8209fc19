//! Path resolution for tomcat-jar
//!
//! # Environment Variables
//!
//! - `TOMCAT_JAR_CONFIG_DIR` - Override config directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `TOMCAT_JAR_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/tomcat-jar` (if set)
//! 3. `~/.config/tomcat-jar`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "TOMCAT_JAR_CONFIG_DIR";

/// File name of the default manifest
pub const MANIFEST_FILE: &str = "jars.toml";

/// Get the tomcat-jar config directory path
pub fn config_dir() -> Result<PathBuf> {
    // 1. Check environment variable override
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    // 2. Check XDG_CONFIG_HOME
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("tomcat-jar");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    // 3. Default: ~/.config/tomcat-jar
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("tomcat-jar");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Path of the manifest, honoring an explicit `--file`
pub fn manifest_path(explicit: Option<&str>) -> Result<PathBuf> {
    match explicit {
        Some(file) => Ok(expand(file)),
        None => Ok(config_dir()?.join(MANIFEST_FILE)),
    }
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
