//! Client configuration.
//!
//! Every field has a default so an empty JSON object is a valid config; the
//! wasm entry point and the CLI both start from here.

use serde::{Deserialize, Serialize};

/// Top-level configuration for a [`crate::Mu`] instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuConfig {
    /// Application API key. Optional: share and publish work without one.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Host serving the dialogs and the cross-domain proxy page.
    #[serde(default = "default_www_host")]
    pub www_host: String,

    /// Host serving the REST endpoint.
    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// Scheme for both hosts, e.g. `https:`. Falls back to the page protocol.
    #[serde(default)]
    pub protocol: Option<String>,

    /// Closed-popup poll period.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    /// Grace delay before a resolved iframe is removed from the document.
    #[serde(default = "default_iframe_teardown_delay_ms")]
    pub iframe_teardown_delay_ms: u64,

    /// Global name prefix that API responses invoke.
    #[serde(default = "default_jsonp_callback_prefix")]
    pub jsonp_callback_prefix: String,

    /// Protocol version sent as `v` on signed calls.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_www_host() -> String {
    "www.facebook.com".to_string()
}

fn default_api_host() -> String {
    "api.facebook.com".to_string()
}

fn default_monitor_interval_ms() -> u64 {
    100
}

fn default_iframe_teardown_delay_ms() -> u64 {
    500
}

fn default_jsonp_callback_prefix() -> String {
    "Mu._callbacks.".to_string()
}

fn default_api_version() -> String {
    "1.0".to_string()
}

impl Default for MuConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            www_host: default_www_host(),
            api_host: default_api_host(),
            protocol: None,
            monitor_interval_ms: default_monitor_interval_ms(),
            iframe_teardown_delay_ms: default_iframe_teardown_delay_ms(),
            jsonp_callback_prefix: default_jsonp_callback_prefix(),
            api_version: default_api_version(),
        }
    }
}

impl MuConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "monitor_interval_ms must be > 0".to_string(),
            ));
        }
        for (name, host) in [("www_host", &self.www_host), ("api_host", &self.api_host)] {
            if host.is_empty() || host.contains('/') {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be a bare host name, got '{host}'"
                )));
            }
        }
        if let Some(ref protocol) = self.protocol {
            if !protocol.ends_with(':') {
                return Err(ConfigError::ValidationError(format!(
                    "protocol must end with ':', got '{protocol}'"
                )));
            }
        }
        Ok(())
    }

    /// Base URL of the dialog host, with a trailing slash.
    pub fn www_base(&self, page_protocol: &str) -> String {
        format!("{}//{}/", self.scheme(page_protocol), self.www_host)
    }

    /// Base URL of the REST host, with a trailing slash.
    pub fn api_base(&self, page_protocol: &str) -> String {
        format!("{}//{}/", self.scheme(page_protocol), self.api_host)
    }

    fn scheme<'a>(&'a self, page_protocol: &'a str) -> &'a str {
        match self.protocol.as_deref() {
            Some(p) => p,
            None if page_protocol.is_empty() => "https:",
            None => page_protocol,
        }
    }
}

/// Errors from configuration handling.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("serialize error: {0}")]
    SerializeError(String),
    #[error("validation error: {0}")]
    ValidationError(String),
}
