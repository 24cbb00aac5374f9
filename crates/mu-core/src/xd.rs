//! Cross-domain handoff protocol.
//!
//! A handoff URL addresses one pending callback on this page. The remote
//! service eventually navigates a popup or iframe to it; the proxy page served
//! there relays the URL's parameters back through the active transport, and
//! [`XdProtocol::resolve`] matches them to the callback, tears the surface
//! down and fires the callback.
//!
//! Every completion path (a genuine reply on either transport, or the monitor
//! noticing a popup the user closed) goes through `resolve`, and `resolve`
//! only fires a callback it managed to remove from the registry. That is what
//! makes delivery at-most-once per minted URL.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::MuConfig;
use crate::error::MuResult;
use crate::host::{Host, IframeStyle};
use crate::monitor::WindowMonitor;
use crate::query::{encode, Params};
use crate::registry::CallbackRegistry;
use crate::session::Session;
use crate::surface::{PopupPlacement, Surface, WindowTracker};
use crate::transport::{select_transport, TransportKind};

/// Placeholder the remote service substitutes with a real result value.
pub const RESULT_SENTINEL: &str = "xxRESULTTOKENxx";

/// Path of the proxy page, relative to the dialog host. The `?=&` prefix
/// makes the remote side append its own parameters inside the fragment.
const PROXY_PATH: &str = "connect/xd_proxy.php#?=&";

/// How the surface that loads the handoff URL relates to this page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// This page opened the surface as a popup.
    Opener,
    /// This page embeds the surface as an iframe.
    Parent,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Opener => "opener",
            Relation::Parent => "parent",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unwrap a `result` field: the untouched sentinel, `null` and empty all mean "no value".
pub fn unwrap_result(result: Option<&str>) -> Option<String> {
    match result {
        None | Some("") | Some("null") | Some(RESULT_SENTINEL) => None,
        Some(value) => Some(value.to_string()),
    }
}

/// Everything the protocol tracks, owned in one place.
struct XdContext {
    callbacks: CallbackRegistry<Params>,
    surfaces: WindowTracker,
    monitor: WindowMonitor,
}

/// The handoff protocol coordinator. One per page.
pub struct XdProtocol {
    host: Rc<dyn Host>,
    proxy_url: String,
    target: String,
    transport: TransportKind,
    iframe_grace: Duration,
    ctx: RefCell<XdContext>,
}

impl XdProtocol {
    /// Select a transport, generate the return-address token from
    /// `target_id` and start listening.
    ///
    /// Fails with [`crate::MuError::TransportUnavailable`] when the page can
    /// neither post messages nor embed the bridge.
    pub fn init(host: Rc<dyn Host>, config: &MuConfig, target_id: &str) -> MuResult<Rc<Self>> {
        let page = host.page();
        let transport = select_transport(host.as_ref())?;

        let xd = Rc::new(Self {
            proxy_url: format!("{}{}", config.www_base(&page.protocol), PROXY_PATH),
            target: format!("http://{}/{}", page.host, target_id),
            transport: transport.kind(),
            iframe_grace: Duration::from_millis(config.iframe_teardown_delay_ms),
            ctx: RefCell::new(XdContext {
                callbacks: CallbackRegistry::new(),
                surfaces: WindowTracker::new(),
                monitor: WindowMonitor::new(Duration::from_millis(config.monitor_interval_ms)),
            }),
            host,
        });

        let weak = Rc::downgrade(&xd);
        transport.install(
            xd.host.as_ref(),
            &xd.target,
            Rc::new(move |message: Params| {
                if let Some(xd) = weak.upgrade() {
                    xd.resolve(message);
                }
            }),
        );

        info!(transport = %xd.transport, target = %xd.target, "cross-domain transport ready");
        Ok(xd)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Register `callback` and return the handoff URL that will fire it.
    ///
    /// The callback is stored under `callback_id`, or under `surface_id` when
    /// none is given, and is bound to `surface_id`.
    pub fn mint<F>(&self, callback: F, surface_id: &str, relation: Relation, callback_id: Option<&str>) -> String
    where
        F: FnOnce(Params) + 'static,
    {
        let cb_id = callback_id.unwrap_or(surface_id);
        self.ctx
            .borrow_mut()
            .callbacks
            .register(cb_id, Some(surface_id), Box::new(callback));

        let mut params = Params::new();
        params
            .set("frame", surface_id)
            .set("cb", cb_id)
            .set("relation", relation.as_str())
            .set("target", self.target.as_str())
            .set("transport", self.transport.as_str());

        debug!(frame = surface_id, cb = cb_id, %relation, "minted handoff");
        format!("{}{}", self.proxy_url, encode(&params))
    }

    /// Like [`mint`](Self::mint), for endpoints that report a single `result`
    /// value. The callback receives `None` for "no value", which includes a
    /// popup closed by the user.
    pub fn mint_result<F>(&self, callback: F, surface_id: &str, relation: Relation, callback_id: Option<&str>) -> String
    where
        F: FnOnce(Option<String>) + 'static,
    {
        let url = self.mint(
            move |params| callback(unwrap_result(params.get("result"))),
            surface_id,
            relation,
            callback_id,
        );
        format!("{url}&result={RESULT_SENTINEL}")
    }

    /// Like [`mint_result`](Self::mint_result), for endpoints that also hand
    /// back a session. An unparseable or missing session arrives as `None`.
    pub fn mint_session<F>(&self, callback: F, surface_id: &str, relation: Relation, callback_id: Option<&str>) -> String
    where
        F: FnOnce(Option<Session>, Option<String>) + 'static,
    {
        let url = self.mint(
            move |params| {
                let session = Session::from_handoff(params.get("session"));
                let perms = unwrap_result(params.get("result"));
                callback(session, perms)
            },
            surface_id,
            relation,
            callback_id,
        );
        format!("{url}&result={RESULT_SENTINEL}")
    }

    /// Open a popup centered over the page.
    ///
    /// With an `id` the popup is tracked; if a callback is already pending
    /// under that id, the popup is also watched for being closed by the user.
    /// Without an id it is fire-and-forget. A blocked popup resolves its
    /// pending callback immediately, as if the user had closed it.
    pub fn spawn_popup(self: &Rc<Self>, url: &str, width: u32, height: u32, id: Option<&str>) -> Option<String> {
        let placement = PopupPlacement::centered(&self.host.window_geometry(), width, height);
        let Some(handle) = self.host.open_popup(url, &placement.features()) else {
            warn!("popup blocked");
            if let Some(id) = id {
                self.resolve(closed_message(id));
            }
            return None;
        };
        let id = id?;

        let monitored = self.ctx.borrow().callbacks.contains(id);
        if self.track(id, Surface::Popup(handle), monitored) {
            self.start_monitor();
        }

        debug!(id, "popup opened");
        Some(id.to_string())
    }

    /// Append an off-screen iframe. Iframes are never watched for closing.
    pub fn spawn_hidden_iframe(&self, url: &str, id: &str) -> String {
        let frame = self.host.create_iframe(url, &IframeStyle::offscreen());
        self.track(id, Surface::Iframe(frame), false);
        debug!(id, "hidden iframe created");
        id.to_string()
    }

    /// Track `surface` under `id`, closing whatever surface held that id
    /// before. Returns true if the monitor has to be started.
    fn track(&self, id: &str, surface: Surface, monitored: bool) -> bool {
        let (displaced, start, stop) = {
            let mut ctx = self.ctx.borrow_mut();
            let displaced = ctx.surfaces.track(id, surface, monitored);
            let start = monitored && ctx.monitor.watch();
            let stop = match displaced {
                Some(ref old) if old.monitored => ctx.monitor.release(),
                _ => None,
            };
            (displaced, start, stop)
        };
        if let Some(timer) = stop {
            self.host.clear_interval(timer);
        }
        if let Some(old) = displaced {
            debug!(id, "surface id reused, closing the previous surface");
            old.surface.teardown(self.host.as_ref(), self.iframe_grace);
        }
        start
    }

    /// Close and forget a surface. Callbacks bound to it are dropped unfired.
    pub fn teardown(&self, surface_id: &str) -> bool {
        let (surface, stop) = {
            let mut ctx = self.ctx.borrow_mut();
            let Some(tracked) = ctx.surfaces.remove(surface_id) else {
                return false;
            };
            ctx.callbacks.retire_surface(surface_id);
            let stop = if tracked.monitored { ctx.monitor.release() } else { None };
            (tracked.surface, stop)
        };
        if let Some(timer) = stop {
            self.host.clear_interval(timer);
        }
        surface.teardown(self.host.as_ref(), self.iframe_grace);
        true
    }

    /// Resolve a decoded message: remove its callback, tear down its surface,
    /// then fire the callback with the full message.
    ///
    /// Messages whose `cb` is not pending, or whose `frame` is not the
    /// surface that callback is bound to, are dropped. Returns whether a
    /// callback fired.
    pub fn resolve(&self, message: Params) -> bool {
        let Some(cb_id) = message.get("cb").map(str::to_string) else {
            debug!("dropping message without callback id");
            return false;
        };
        let frame_id = message.get("frame").map(str::to_string);

        let (callback, surface, stop) = {
            let mut ctx = self.ctx.borrow_mut();
            let Some(bound) = ctx.callbacks.surface_of(&cb_id) else {
                debug!(cb = %cb_id, "dropping message for unknown callback");
                return false;
            };
            if bound != frame_id.as_deref() {
                warn!(cb = %cb_id, frame = ?frame_id, "dropping message whose frame does not match its callback");
                return false;
            }
            let Some(callback) = ctx.callbacks.take(&cb_id) else {
                return false;
            };

            let mut surface = None;
            let mut stop = None;
            if let Some(ref frame_id) = frame_id {
                let retired = ctx.callbacks.retire_surface(frame_id);
                if retired > 0 {
                    debug!(frame = %frame_id, retired, "retired sibling callbacks");
                }
                if let Some(tracked) = ctx.surfaces.remove(frame_id) {
                    if tracked.monitored {
                        stop = ctx.monitor.release();
                    }
                    surface = Some(tracked.surface);
                }
            }
            (callback, surface, stop)
        };

        if let Some(timer) = stop {
            debug!("no popups left to watch, monitor stopped");
            self.host.clear_interval(timer);
        }
        if let Some(surface) = surface {
            surface.teardown(self.host.as_ref(), self.iframe_grace);
        }

        debug!(cb = %cb_id, frame = ?frame_id, "resolved handoff");
        callback(message);
        true
    }

    fn start_monitor(self: &Rc<Self>) {
        let period = self.ctx.borrow().monitor.interval();
        let weak = Rc::downgrade(self);
        let timer = self.host.set_interval(
            period,
            Box::new(move || {
                if let Some(xd) = weak.upgrade() {
                    xd.monitor_tick();
                }
            }),
        );
        self.ctx.borrow_mut().monitor.started(timer);
        debug!(?period, "window monitor started");
    }

    /// One poll: synthesize a resolution for every watched popup the user
    /// closed, and forget closed popups nothing is waiting on.
    pub fn monitor_tick(&self) {
        let (pending, orphaned) = {
            let mut guard = self.ctx.borrow_mut();
            let ctx = &mut *guard;
            if let Some(timer) = ctx.monitor.stop_if_idle() {
                drop(guard);
                self.host.clear_interval(timer);
                return;
            }
            let closed = ctx.surfaces.closed_popups(|_| true);
            closed
                .into_iter()
                .partition::<Vec<_>, _>(|id| ctx.callbacks.contains(id))
        };

        for id in pending {
            debug!(id = %id, "popup closed by user");
            self.resolve(closed_message(&id));
        }
        for id in orphaned {
            self.teardown(&id);
        }

        let idle = self.ctx.borrow_mut().monitor.stop_if_idle();
        if let Some(timer) = idle {
            self.host.clear_interval(timer);
        }
        tracing::trace!("window monitor tick");
    }

    pub fn pending_callbacks(&self) -> usize {
        self.ctx.borrow().callbacks.len()
    }

    pub fn is_pending(&self, callback_id: &str) -> bool {
        self.ctx.borrow().callbacks.contains(callback_id)
    }

    pub fn is_tracked(&self, surface_id: &str) -> bool {
        self.ctx.borrow().surfaces.contains(surface_id)
    }

    pub fn tracked_surfaces(&self) -> usize {
        self.ctx.borrow().surfaces.len()
    }

    pub fn watched_popups(&self) -> usize {
        self.ctx.borrow().monitor.watched()
    }

    pub fn monitor_running(&self) -> bool {
        self.ctx.borrow().monitor.is_running()
    }
}

/// The message a closed popup stands in for: no result, same ids.
fn closed_message(id: &str) -> Params {
    let mut params = Params::new();
    params.set("cb", id).set("frame", id);
    params
}

/// Split a handoff URL into its proxy base and decoded fragment parameters.
pub fn parse_handoff_url(url: &str) -> Option<(&str, Params)> {
    let (base, fragment) = url.split_once('#')?;
    let query = fragment.strip_prefix("?=&").or_else(|| fragment.strip_prefix('?'))?;
    Some((base, crate::query::decode(query)))
}
