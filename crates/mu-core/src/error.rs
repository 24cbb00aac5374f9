use thiserror::Error;

use crate::config::ConfigError;

/// Errors produced by the mu protocol core.
///
/// Protocol-level failures (foreign messages, closed popups, unparseable
/// sessions) never surface here; they resolve to callbacks with an empty
/// result instead.
#[derive(Debug, Error)]
pub enum MuError {
    #[error("no cross-domain transport available (need postMessage or the bridge)")]
    TransportUnavailable,

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type MuResult<T> = Result<T, MuError>;
