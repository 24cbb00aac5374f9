//! CLI configuration at `~/.mu/config.toml`.
//!
//! The `[service]` section holds the same fields the browser client is
//! initialized with (API key, hosts, protocol, API version). CLI flags
//! always override config file values.

use anyhow::{Context, Result};
use mu_core::MuConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote service settings.
    #[serde(default)]
    pub service: MuConfig,
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;
        config
            .service
            .validate()
            .with_context(|| format!("invalid config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }
}

/// `~/.mu/config.toml`, or a relative fallback when there is no home directory.
pub fn default_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".mu")
        .join("config.toml")
}

/// Split a `key=value` argument. The value may itself contain `=`.
pub fn parse_pair(arg: &str) -> Result<(String, String)> {
    match arg.split_once('=') {
        Some((key, _)) if key.is_empty() => anyhow::bail!("empty key in '{arg}'"),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => anyhow::bail!("expected key=value, got '{arg}'"),
    }
}
