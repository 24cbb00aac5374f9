//! mu-core: Cross-domain connect client core.
//!
//! Builds handoff URLs that let a remote origin address a pending callback on
//! this page, correlates the replies that come back through a popup or hidden
//! iframe, watches popups for being closed, and signs REST calls. Browser
//! capabilities are reached through the [`Host`] trait.

pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod ids;
pub mod monitor;
pub mod query;
pub mod registry;
pub mod session;
pub mod sign;
pub mod surface;
pub mod transport;
pub mod xd;

#[cfg(test)]
mod testing;

// Re-export commonly used items at crate root.
pub use client::{Mu, Post};
pub use config::{ConfigError, MuConfig};
pub use error::{MuError, MuResult};
pub use host::{
    AccessDenied, Host, IframeHandle, IframeStyle, MessageHandler, PageLocation, PopupHandle,
    ScriptHandle, TimerId, WindowGeometry,
};
pub use query::{decode, encode, encode_with, Params};
pub use session::Session;
pub use sign::{signature, verify, RequestSigner};
pub use transport::TransportKind;
pub use xd::{parse_handoff_url, unwrap_result, Relation, XdProtocol, RESULT_SENTINEL};
