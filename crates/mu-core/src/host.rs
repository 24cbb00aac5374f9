//! Host capabilities: everything the core needs from the embedding page.
//!
//! In the browser these are backed by `window`, `document` and timers (see the
//! mu-wasm crate). Everything here is single-threaded: handles and tasks are
//! neither `Send` nor `Sync`, matching the page's event loop.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// A cross-origin property access was refused by the browser.
///
/// Routine while a surface still shows the remote origin; callers treat it as
/// "state not known yet", never as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cross-origin access denied")]
pub struct AccessDenied;

/// A popup window opened by [`Host::open_popup`].
pub trait PopupHandle {
    fn is_closed(&self) -> Result<bool, AccessDenied>;
    fn close(&self) -> Result<(), AccessDenied>;
}

/// An iframe element inserted by [`Host::create_iframe`].
pub trait IframeHandle {
    /// Detach the element from the document.
    fn remove(&self) -> Result<(), AccessDenied>;
}

/// A script element inserted by [`Host::inject_script`].
pub trait ScriptHandle {
    fn remove(&self);
}

/// Identifies a repeating timer started with [`Host::set_interval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u32);

/// Receives raw payloads from a transport.
pub type MessageHandler = Rc<dyn Fn(String)>;

/// The embedding page's location.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageLocation {
    /// Scheme including the colon, e.g. `https:`.
    pub protocol: String,
    /// Host with optional port.
    pub host: String,
    pub href: String,
}

/// Window geometry signals. Browsers expose different subsets, so every field is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowGeometry {
    pub screen_x: Option<i32>,
    pub screen_left: Option<i32>,
    pub screen_y: Option<i32>,
    pub screen_top: Option<i32>,
    pub outer_width: Option<i32>,
    pub outer_height: Option<i32>,
    pub client_width: Option<i32>,
    pub client_height: Option<i32>,
}

/// Inline style for an iframe that must neither render nor affect layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IframeStyle {
    pub top_px: i32,
    pub left_px: i32,
    pub width_px: u32,
    pub height_px: u32,
}

impl IframeStyle {
    /// Absolutely positioned far outside the viewport with zero size.
    pub fn offscreen() -> Self {
        Self {
            top_px: -10_000,
            left_px: -10_000,
            width_px: 0,
            height_px: 0,
        }
    }
}

impl fmt::Display for IframeStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "position:absolute;top:{}px;left:{}px;width:{}px;height:{}px",
            self.top_px, self.left_px, self.width_px, self.height_px
        )
    }
}

/// Capabilities provided by the page hosting the client.
pub trait Host {
    /// Wall clock in milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;

    /// Seed for surface/callback id generation.
    fn random_seed(&self) -> u64;

    fn page(&self) -> PageLocation;

    fn window_geometry(&self) -> WindowGeometry;

    /// Open a popup. `None` means the browser blocked it.
    fn open_popup(&self, url: &str, features: &str) -> Option<Box<dyn PopupHandle>>;

    /// Create an iframe with the given style and append it to the document body.
    fn create_iframe(&self, url: &str, style: &IframeStyle) -> Box<dyn IframeHandle>;

    fn set_timeout(&self, delay: Duration, task: Box<dyn FnOnce()>);

    fn set_interval(&self, period: Duration, task: Box<dyn FnMut()>) -> TimerId;

    fn clear_interval(&self, id: TimerId);

    /// Append a script element whose source is `url` to the document head.
    fn inject_script(&self, url: &str) -> Box<dyn ScriptHandle>;

    /// Native cross-document messaging is available.
    fn supports_post_message(&self) -> bool;

    /// Register the page-wide message listener.
    fn listen_messages(&self, handler: MessageHandler);

    /// The embedded bridge object can be used.
    fn supports_bridge(&self) -> bool;

    /// Embed the bridge for `target` and route its messages to `handler` once it reports ready.
    fn embed_bridge(&self, target: &str, handler: MessageHandler);
}
