//! Scripted host for tests: records what the core opens and lets tests drive
//! timers, popup state and inbound messages by hand.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use crate::host::{
    AccessDenied, Host, IframeHandle, IframeStyle, MessageHandler, PageLocation, PopupHandle,
    ScriptHandle, TimerId, WindowGeometry,
};

struct PopupState {
    url: String,
    features: RefCell<String>,
    closed: Cell<bool>,
    denied: Cell<bool>,
    close_attempts: Cell<u32>,
}

#[derive(Clone)]
pub struct FakePopup(Rc<PopupState>);

impl FakePopup {
    pub fn new(url: &str) -> Self {
        Self(Rc::new(PopupState {
            url: url.to_string(),
            features: RefCell::new(String::new()),
            closed: Cell::new(false),
            denied: Cell::new(false),
            close_attempts: Cell::new(0),
        }))
    }

    pub fn handle(&self) -> FakePopup {
        self.clone()
    }

    pub fn url(&self) -> String {
        self.0.url.clone()
    }

    pub fn features(&self) -> String {
        self.0.features.borrow().clone()
    }

    pub fn set_closed(&self, closed: bool) {
        self.0.closed.set(closed);
    }

    pub fn closed(&self) -> bool {
        self.0.closed.get()
    }

    pub fn deny_access(&self, denied: bool) {
        self.0.denied.set(denied);
    }

    pub fn close_attempts(&self) -> u32 {
        self.0.close_attempts.get()
    }
}

impl PopupHandle for FakePopup {
    fn is_closed(&self) -> Result<bool, AccessDenied> {
        if self.0.denied.get() {
            return Err(AccessDenied);
        }
        Ok(self.0.closed.get())
    }

    fn close(&self) -> Result<(), AccessDenied> {
        self.0.close_attempts.set(self.0.close_attempts.get() + 1);
        if self.0.denied.get() {
            return Err(AccessDenied);
        }
        self.0.closed.set(true);
        Ok(())
    }
}

struct IframeState {
    url: String,
    style: RefCell<String>,
    removed: Cell<bool>,
}

#[derive(Clone)]
pub struct FakeIframe(Rc<IframeState>);

impl FakeIframe {
    pub fn new(url: &str) -> Self {
        Self(Rc::new(IframeState {
            url: url.to_string(),
            style: RefCell::new(String::new()),
            removed: Cell::new(false),
        }))
    }

    pub fn handle(&self) -> FakeIframe {
        self.clone()
    }

    pub fn url(&self) -> String {
        self.0.url.clone()
    }

    pub fn style(&self) -> String {
        self.0.style.borrow().clone()
    }

    pub fn is_removed(&self) -> bool {
        self.0.removed.get()
    }
}

impl IframeHandle for FakeIframe {
    fn remove(&self) -> Result<(), AccessDenied> {
        self.0.removed.set(true);
        Ok(())
    }
}

#[derive(Clone)]
pub struct FakeScript {
    pub url: String,
    removed: Rc<Cell<bool>>,
}

impl FakeScript {
    pub fn is_removed(&self) -> bool {
        self.removed.get()
    }
}

impl ScriptHandle for FakeScript {
    fn remove(&self) {
        self.removed.set(true);
    }
}

type IntervalTask = Rc<RefCell<Box<dyn FnMut()>>>;

pub struct FakeHost {
    now: Cell<u64>,
    page: PageLocation,
    geometry: Cell<WindowGeometry>,
    post_message: bool,
    bridge: bool,
    block_popups: Cell<bool>,
    popups: RefCell<Vec<FakePopup>>,
    iframes: RefCell<Vec<FakeIframe>>,
    scripts: RefCell<Vec<FakeScript>>,
    timeouts: RefCell<Vec<(Duration, Box<dyn FnOnce()>)>>,
    intervals: RefCell<BTreeMap<u32, (Duration, IntervalTask)>>,
    next_timer: Cell<u32>,
    intervals_started: Cell<u32>,
    message_handler: RefCell<Option<MessageHandler>>,
    bridge_handler: RefCell<Option<MessageHandler>>,
    bridge_target: RefCell<Option<String>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::with_transports(true, true)
    }

    pub fn with_transports(post_message: bool, bridge: bool) -> Self {
        Self {
            now: Cell::new(1_250_000_000_000),
            page: PageLocation {
                protocol: "http:".to_string(),
                host: "app.example.com".to_string(),
                href: "http://app.example.com/page?x=1".to_string(),
            },
            geometry: Cell::new(WindowGeometry {
                screen_x: Some(0),
                screen_y: Some(0),
                outer_width: Some(1000),
                outer_height: Some(800),
                ..Default::default()
            }),
            post_message,
            bridge,
            block_popups: Cell::new(false),
            popups: RefCell::new(Vec::new()),
            iframes: RefCell::new(Vec::new()),
            scripts: RefCell::new(Vec::new()),
            timeouts: RefCell::new(Vec::new()),
            intervals: RefCell::new(BTreeMap::new()),
            next_timer: Cell::new(1),
            intervals_started: Cell::new(0),
            message_handler: RefCell::new(None),
            bridge_handler: RefCell::new(None),
            bridge_target: RefCell::new(None),
        }
    }

    pub fn block_popups(&self, block: bool) {
        self.block_popups.set(block);
    }

    pub fn popups(&self) -> Vec<FakePopup> {
        self.popups.borrow().clone()
    }

    pub fn last_popup(&self) -> FakePopup {
        self.popups.borrow().last().cloned().expect("no popup opened")
    }

    pub fn iframes(&self) -> Vec<FakeIframe> {
        self.iframes.borrow().clone()
    }

    pub fn last_iframe(&self) -> FakeIframe {
        self.iframes.borrow().last().cloned().expect("no iframe created")
    }

    pub fn scripts(&self) -> Vec<FakeScript> {
        self.scripts.borrow().clone()
    }

    pub fn pending_timeouts(&self) -> Vec<Duration> {
        self.timeouts.borrow().iter().map(|(d, _)| *d).collect()
    }

    /// Fire every queued timeout, including ones queued while firing.
    pub fn run_timeouts(&self) {
        loop {
            let batch: Vec<_> = self.timeouts.borrow_mut().drain(..).collect();
            if batch.is_empty() {
                break;
            }
            for (_, task) in batch {
                task();
            }
        }
    }

    /// Fire every active interval once.
    pub fn tick_intervals(&self) {
        let tasks: Vec<(u32, IntervalTask)> = self
            .intervals
            .borrow()
            .iter()
            .map(|(id, (_, task))| (*id, task.clone()))
            .collect();
        for (id, task) in tasks {
            if self.intervals.borrow().contains_key(&id) {
                let mut task = task.borrow_mut();
                (&mut **task)();
            }
        }
    }

    pub fn active_intervals(&self) -> usize {
        self.intervals.borrow().len()
    }

    pub fn interval_periods(&self) -> Vec<Duration> {
        self.intervals.borrow().values().map(|(d, _)| *d).collect()
    }

    pub fn intervals_started(&self) -> u32 {
        self.intervals_started.get()
    }

    /// Deliver a payload through the page-wide message listener.
    pub fn deliver_message(&self, raw: &str) {
        let handler = self.message_handler.borrow().clone();
        if let Some(handler) = handler {
            handler(raw.to_string());
        }
    }

    /// Deliver a payload through the embedded bridge.
    pub fn deliver_bridge_message(&self, raw: &str) {
        let handler = self.bridge_handler.borrow().clone();
        if let Some(handler) = handler {
            handler(raw.to_string());
        }
    }

    pub fn has_message_listener(&self) -> bool {
        self.message_handler.borrow().is_some()
    }

    pub fn bridge_target(&self) -> Option<String> {
        self.bridge_target.borrow().clone()
    }
}

impl Host for FakeHost {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn random_seed(&self) -> u64 {
        42
    }

    fn page(&self) -> PageLocation {
        self.page.clone()
    }

    fn window_geometry(&self) -> WindowGeometry {
        self.geometry.get()
    }

    fn open_popup(&self, url: &str, features: &str) -> Option<Box<dyn PopupHandle>> {
        if self.block_popups.get() {
            return None;
        }
        let popup = FakePopup::new(url);
        *popup.0.features.borrow_mut() = features.to_string();
        self.popups.borrow_mut().push(popup.clone());
        Some(Box::new(popup))
    }

    fn create_iframe(&self, url: &str, style: &IframeStyle) -> Box<dyn IframeHandle> {
        let frame = FakeIframe::new(url);
        *frame.0.style.borrow_mut() = style.to_string();
        self.iframes.borrow_mut().push(frame.clone());
        Box::new(frame)
    }

    fn set_timeout(&self, delay: Duration, task: Box<dyn FnOnce()>) {
        self.timeouts.borrow_mut().push((delay, task));
    }

    fn set_interval(&self, period: Duration, task: Box<dyn FnMut()>) -> TimerId {
        let id = self.next_timer.get();
        self.next_timer.set(id + 1);
        self.intervals_started.set(self.intervals_started.get() + 1);
        self.intervals
            .borrow_mut()
            .insert(id, (period, Rc::new(RefCell::new(task))));
        TimerId(id)
    }

    fn clear_interval(&self, id: TimerId) {
        self.intervals.borrow_mut().remove(&id.0);
    }

    fn inject_script(&self, url: &str) -> Box<dyn ScriptHandle> {
        let script = FakeScript {
            url: url.to_string(),
            removed: Rc::new(Cell::new(false)),
        };
        self.scripts.borrow_mut().push(script.clone());
        Box::new(script)
    }

    fn supports_post_message(&self) -> bool {
        self.post_message
    }

    fn listen_messages(&self, handler: MessageHandler) {
        *self.message_handler.borrow_mut() = Some(handler);
    }

    fn supports_bridge(&self) -> bool {
        self.bridge
    }

    fn embed_bridge(&self, target: &str, handler: MessageHandler) {
        *self.bridge_target.borrow_mut() = Some(target.to_string());
        *self.bridge_handler.borrow_mut() = Some(handler);
    }
}
