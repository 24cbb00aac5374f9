//! Host imports: functions provided by the JS glue to the WASM module.
//!
//! On wasm32 targets, these are real extern "C" imports from the page.
//! On native targets (for testing), they are inert stubs describing a page
//! with postMessage support where nothing is ever blocked or closed; the stubs
//! record what they were asked to do so tests can inspect it.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use mu_core::host::{
    AccessDenied, Host, IframeHandle, IframeStyle, MessageHandler, PageLocation, PopupHandle,
    ScriptHandle, TimerId, WindowGeometry,
};

/// Capability bits returned by `host_capabilities`.
pub const CAP_POST_MESSAGE: u32 = 1;
pub const CAP_BRIDGE: u32 = 2;

#[cfg(target_arch = "wasm32")]
mod ffi {
    unsafe extern "C" {
        pub fn host_log(level: i32, msg_ptr: *const u8, msg_len: u32);
        pub fn host_now() -> f64;
        pub fn host_random() -> f64;
        pub fn host_capabilities() -> u32;
        /// Writes 8 f64 values; NaN marks a signal the browser lacks.
        pub fn host_window_geometry(out_ptr: *mut f64);
        /// Returns a popup handle, or a negative value if the popup was blocked.
        pub fn host_open_popup(
            url_ptr: *const u8,
            url_len: u32,
            features_ptr: *const u8,
            features_len: u32,
        ) -> i32;
        /// 1 closed, 0 open, negative if access was denied.
        pub fn host_popup_closed(handle: u32) -> i32;
        pub fn host_popup_close(handle: u32) -> i32;
        pub fn host_iframe_create(
            url_ptr: *const u8,
            url_len: u32,
            style_ptr: *const u8,
            style_len: u32,
        ) -> u32;
        pub fn host_iframe_remove(handle: u32) -> i32;
        pub fn host_script_inject(url_ptr: *const u8, url_len: u32) -> u32;
        pub fn host_script_remove(handle: u32);
        pub fn host_set_timeout(token: u32, delay_ms: u32);
        pub fn host_set_interval(token: u32, period_ms: u32);
        pub fn host_clear_interval(token: u32);
        pub fn host_listen_messages();
        pub fn host_embed_bridge(target_ptr: *const u8, target_len: u32);
        pub fn host_events_emit(
            topic_ptr: *const u8,
            topic_len: u32,
            payload_ptr: *const u8,
            payload_len: u32,
        );
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::cell::RefCell;

    thread_local! {
        static CALLS: RefCell<Vec<(String, String)>> = const { RefCell::new(Vec::new()) };
    }

    pub fn record(kind: &str, detail: &str) {
        CALLS.with(|calls| calls.borrow_mut().push((kind.to_string(), detail.to_string())));
    }

    #[cfg(test)]
    pub fn take() -> Vec<(String, String)> {
        CALLS.with(|calls| std::mem::take(&mut *calls.borrow_mut()))
    }
}

/// Drain the stub call log: `(kind, detail)` pairs in call order.
#[cfg(all(test, not(target_arch = "wasm32")))]
pub fn take_recorded() -> Vec<(String, String)> {
    native::take()
}

/// Safe wrapper: log a string at a given level (0=trace … 4=error).
pub fn log(level: i32, msg: &str) {
    #[cfg(target_arch = "wasm32")]
    unsafe {
        ffi::host_log(level, msg.as_ptr(), msg.len() as u32);
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = (level, msg);
    }
}

/// Safe wrapper: emit an event to the page.
pub fn emit_event(topic: &str, payload: &str) {
    #[cfg(target_arch = "wasm32")]
    unsafe {
        ffi::host_events_emit(
            topic.as_ptr(),
            topic.len() as u32,
            payload.as_ptr(),
            payload.len() as u32,
        );
    }
    #[cfg(not(target_arch = "wasm32"))]
    native::record(topic, payload);
}

fn now() -> f64 {
    #[cfg(target_arch = "wasm32")]
    {
        unsafe { ffi::host_now() }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        0.0
    }
}

fn random() -> f64 {
    #[cfg(target_arch = "wasm32")]
    {
        unsafe { ffi::host_random() }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        0.5
    }
}

fn capabilities() -> u32 {
    #[cfg(target_arch = "wasm32")]
    {
        unsafe { ffi::host_capabilities() }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        CAP_POST_MESSAGE
    }
}

fn geometry() -> [f64; 8] {
    let mut out = [f64::NAN; 8];
    #[cfg(target_arch = "wasm32")]
    unsafe {
        ffi::host_window_geometry(out.as_mut_ptr());
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        out[0] = 0.0;
        out[2] = 0.0;
        out[4] = 1024.0;
        out[5] = 768.0;
    }
    out
}

fn open_popup(url: &str, features: &str) -> i32 {
    #[cfg(target_arch = "wasm32")]
    {
        unsafe {
            ffi::host_open_popup(
                url.as_ptr(),
                url.len() as u32,
                features.as_ptr(),
                features.len() as u32,
            )
        }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        native::record("popup", url);
        let _ = features;
        1
    }
}

fn popup_closed(handle: u32) -> i32 {
    #[cfg(target_arch = "wasm32")]
    {
        unsafe { ffi::host_popup_closed(handle) }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = handle;
        0
    }
}

fn popup_close(handle: u32) -> i32 {
    #[cfg(target_arch = "wasm32")]
    {
        unsafe { ffi::host_popup_close(handle) }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        native::record("popup_close", &handle.to_string());
        0
    }
}

fn iframe_create(url: &str, style: &str) -> u32 {
    #[cfg(target_arch = "wasm32")]
    {
        unsafe { ffi::host_iframe_create(url.as_ptr(), url.len() as u32, style.as_ptr(), style.len() as u32) }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        native::record("iframe", url);
        let _ = style;
        1
    }
}

fn iframe_remove(handle: u32) -> i32 {
    #[cfg(target_arch = "wasm32")]
    {
        unsafe { ffi::host_iframe_remove(handle) }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        native::record("iframe_remove", &handle.to_string());
        0
    }
}

fn script_inject(url: &str) -> u32 {
    #[cfg(target_arch = "wasm32")]
    {
        unsafe { ffi::host_script_inject(url.as_ptr(), url.len() as u32) }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        native::record("script", url);
        1
    }
}

fn script_remove(handle: u32) {
    #[cfg(target_arch = "wasm32")]
    unsafe {
        ffi::host_script_remove(handle);
    }
    #[cfg(not(target_arch = "wasm32"))]
    native::record("script_remove", &handle.to_string());
}

fn schedule_timeout(token: u32, delay_ms: u32) {
    #[cfg(target_arch = "wasm32")]
    unsafe {
        ffi::host_set_timeout(token, delay_ms);
    }
    #[cfg(not(target_arch = "wasm32"))]
    native::record("timeout", &format!("{token}:{delay_ms}"));
}

fn schedule_interval(token: u32, period_ms: u32) {
    #[cfg(target_arch = "wasm32")]
    unsafe {
        ffi::host_set_interval(token, period_ms);
    }
    #[cfg(not(target_arch = "wasm32"))]
    native::record("interval", &format!("{token}:{period_ms}"));
}

fn cancel_interval(token: u32) {
    #[cfg(target_arch = "wasm32")]
    unsafe {
        ffi::host_clear_interval(token);
    }
    #[cfg(not(target_arch = "wasm32"))]
    native::record("clear_interval", &token.to_string());
}

fn listen_messages() {
    #[cfg(target_arch = "wasm32")]
    unsafe {
        ffi::host_listen_messages();
    }
    #[cfg(not(target_arch = "wasm32"))]
    native::record("listen", "");
}

fn embed_bridge(target: &str) {
    #[cfg(target_arch = "wasm32")]
    unsafe {
        ffi::host_embed_bridge(target.as_ptr(), target.len() as u32);
    }
    #[cfg(not(target_arch = "wasm32"))]
    native::record("bridge", target);
}

fn millis(d: Duration) -> u32 {
    u32::try_from(d.as_millis()).unwrap_or(u32::MAX)
}

struct WasmPopup(u32);

impl PopupHandle for WasmPopup {
    fn is_closed(&self) -> Result<bool, AccessDenied> {
        match popup_closed(self.0) {
            0 => Ok(false),
            n if n > 0 => Ok(true),
            _ => Err(AccessDenied),
        }
    }

    fn close(&self) -> Result<(), AccessDenied> {
        if popup_close(self.0) < 0 {
            return Err(AccessDenied);
        }
        Ok(())
    }
}

struct WasmIframe(u32);

impl IframeHandle for WasmIframe {
    fn remove(&self) -> Result<(), AccessDenied> {
        if iframe_remove(self.0) < 0 {
            return Err(AccessDenied);
        }
        Ok(())
    }
}

struct WasmScript(u32);

impl ScriptHandle for WasmScript {
    fn remove(&self) {
        script_remove(self.0);
    }
}

enum Timer {
    Once(Box<dyn FnOnce()>),
    Repeat(Rc<RefCell<Box<dyn FnMut()>>>),
}

/// [`Host`] backed by the page. Timers and transport handlers live here and
/// are driven by the `mu_on_*` exports.
pub struct WasmHost {
    page: PageLocation,
    next_token: Cell<u32>,
    timers: RefCell<HashMap<u32, Timer>>,
    message_handler: RefCell<Option<MessageHandler>>,
    bridge_handler: RefCell<Option<MessageHandler>>,
}

impl WasmHost {
    pub fn new(page: PageLocation) -> Self {
        Self {
            page,
            next_token: Cell::new(1),
            timers: RefCell::new(HashMap::new()),
            message_handler: RefCell::new(None),
            bridge_handler: RefCell::new(None),
        }
    }

    fn token(&self) -> u32 {
        let token = self.next_token.get();
        self.next_token.set(token.wrapping_add(1).max(1));
        token
    }

    /// Run the timer registered under `token`. Returns false for unknown or
    /// cleared timers.
    pub fn fire_timer(&self, token: u32) -> bool {
        let timer = {
            let mut timers = self.timers.borrow_mut();
            match timers.get(&token) {
                Some(Timer::Repeat(task)) => Some(Timer::Repeat(task.clone())),
                Some(Timer::Once(_)) => timers.remove(&token),
                None => None,
            }
        };
        match timer {
            Some(Timer::Once(task)) => task(),
            Some(Timer::Repeat(task)) => {
                let mut task = task.borrow_mut();
                (&mut **task)();
            }
            None => return false,
        }
        true
    }

    pub fn deliver_message(&self, payload: &str) -> bool {
        let handler = self.message_handler.borrow().clone();
        match handler {
            Some(handler) => {
                handler(payload.to_string());
                true
            }
            None => false,
        }
    }

    pub fn deliver_bridge_message(&self, payload: &str) -> bool {
        let handler = self.bridge_handler.borrow().clone();
        match handler {
            Some(handler) => {
                handler(payload.to_string());
                true
            }
            None => false,
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }
}

impl Host for WasmHost {
    fn now_ms(&self) -> u64 {
        now().max(0.0) as u64
    }

    fn random_seed(&self) -> u64 {
        (random() * (1u64 << 53) as f64) as u64
    }

    fn page(&self) -> PageLocation {
        self.page.clone()
    }

    fn window_geometry(&self) -> WindowGeometry {
        let raw = geometry();
        let field = |i: usize| {
            let v = raw[i];
            if v.is_finite() {
                Some(v as i32)
            } else {
                None
            }
        };
        WindowGeometry {
            screen_x: field(0),
            screen_left: field(1),
            screen_y: field(2),
            screen_top: field(3),
            outer_width: field(4),
            outer_height: field(5),
            client_width: field(6),
            client_height: field(7),
        }
    }

    fn open_popup(&self, url: &str, features: &str) -> Option<Box<dyn PopupHandle>> {
        let handle = open_popup(url, features);
        if handle < 0 {
            return None;
        }
        Some(Box::new(WasmPopup(handle as u32)))
    }

    fn create_iframe(&self, url: &str, style: &IframeStyle) -> Box<dyn IframeHandle> {
        Box::new(WasmIframe(iframe_create(url, &style.to_string())))
    }

    fn set_timeout(&self, delay: Duration, task: Box<dyn FnOnce()>) {
        let token = self.token();
        self.timers.borrow_mut().insert(token, Timer::Once(task));
        schedule_timeout(token, millis(delay));
    }

    fn set_interval(&self, period: Duration, task: Box<dyn FnMut()>) -> TimerId {
        let token = self.token();
        self.timers
            .borrow_mut()
            .insert(token, Timer::Repeat(Rc::new(RefCell::new(task))));
        schedule_interval(token, millis(period));
        TimerId(token)
    }

    fn clear_interval(&self, id: TimerId) {
        self.timers.borrow_mut().remove(&id.0);
        cancel_interval(id.0);
    }

    fn inject_script(&self, url: &str) -> Box<dyn ScriptHandle> {
        Box::new(WasmScript(script_inject(url)))
    }

    fn supports_post_message(&self) -> bool {
        capabilities() & CAP_POST_MESSAGE != 0
    }

    fn listen_messages(&self, handler: MessageHandler) {
        *self.message_handler.borrow_mut() = Some(handler);
        listen_messages();
    }

    fn supports_bridge(&self) -> bool {
        capabilities() & CAP_BRIDGE != 0
    }

    fn embed_bridge(&self, target: &str, handler: MessageHandler) {
        *self.bridge_handler.borrow_mut() = Some(handler);
        embed_bridge(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> WasmHost {
        WasmHost::new(PageLocation {
            protocol: "https:".into(),
            host: "app.test".into(),
            href: "https://app.test/".into(),
        })
    }

    #[test]
    fn test_timeout_fires_once() {
        let host = host();
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        host.set_timeout(Duration::from_millis(500), Box::new(move || counter.set(counter.get() + 1)));

        assert!(host.fire_timer(1));
        assert!(!host.fire_timer(1));
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_interval_repeats_until_cleared() {
        let host = host();
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        let id = host.set_interval(Duration::from_millis(100), Box::new(move || counter.set(counter.get() + 1)));

        host.fire_timer(id.0);
        host.fire_timer(id.0);
        host.clear_interval(id);
        assert!(!host.fire_timer(id.0));
        assert_eq!(fired.get(), 2);
        assert_eq!(host.pending_timers(), 0);
    }

    #[test]
    fn test_native_geometry_has_gaps() {
        let geometry = host().window_geometry();
        assert_eq!(geometry.outer_width, Some(1024));
        assert_eq!(geometry.screen_left, None);
    }

    #[test]
    fn test_messages_without_listener_are_ignored() {
        assert!(!host().deliver_message("cb=f1"));
    }
}
