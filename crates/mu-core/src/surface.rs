//! Popup windows and hidden iframes used as cross-domain navigation targets.

use std::collections::HashMap;
use std::time::Duration;

use crate::host::{Host, IframeHandle, PopupHandle, WindowGeometry};

/// A navigation target, tagged at creation time.
pub enum Surface {
    Popup(Box<dyn PopupHandle>),
    Iframe(Box<dyn IframeHandle>),
}

impl Surface {
    pub fn is_iframe(&self) -> bool {
        matches!(self, Surface::Iframe(_))
    }

    /// Whether the user has closed this popup. Iframes never close on their
    /// own, and a denied cross-origin check counts as still open.
    pub fn is_closed(&self) -> bool {
        match self {
            Surface::Popup(popup) => popup.is_closed().unwrap_or_else(|e| {
                tracing::trace!("closed-state check failed: {e}");
                false
            }),
            Surface::Iframe(_) => false,
        }
    }

    /// Best-effort close. Iframes are removed after `grace` so a navigation
    /// still in flight is not cut off mid-load.
    pub fn teardown(self, host: &dyn Host, grace: Duration) {
        match self {
            Surface::Popup(popup) => {
                if let Err(e) = popup.close() {
                    tracing::trace!("popup close ignored: {e}");
                }
            }
            Surface::Iframe(frame) => host.set_timeout(
                grace,
                Box::new(move || {
                    if let Err(e) = frame.remove() {
                        tracing::trace!("iframe removal ignored: {e}");
                    }
                }),
            ),
        }
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Surface::Popup(_) => f.write_str("Surface::Popup"),
            Surface::Iframe(_) => f.write_str("Surface::Iframe"),
        }
    }
}

/// A surface plus whether it counts toward the closed-window monitor.
#[derive(Debug)]
pub struct TrackedSurface {
    pub surface: Surface,
    pub monitored: bool,
}

/// Open surfaces by id.
#[derive(Debug, Default)]
pub struct WindowTracker {
    surfaces: HashMap<String, TrackedSurface>,
}

impl WindowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `surface` under `id`. A surface already tracked under that id is returned.
    pub fn track(&mut self, id: impl Into<String>, surface: Surface, monitored: bool) -> Option<TrackedSurface> {
        self.surfaces
            .insert(id.into(), TrackedSurface { surface, monitored })
    }

    pub fn remove(&mut self, id: &str) -> Option<TrackedSurface> {
        self.surfaces.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&TrackedSurface> {
        self.surfaces.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.surfaces.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Ids of popups that report closed and satisfy `pending`.
    pub fn closed_popups(&self, pending: impl Fn(&str) -> bool) -> Vec<String> {
        let mut ids: Vec<String> = self
            .surfaces
            .iter()
            .filter(|(id, tracked)| pending(id.as_str()) && !tracked.surface.is_iframe())
            .filter(|(_, tracked)| tracked.surface.is_closed())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

/// Screen position for a popup centered over the calling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupPlacement {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
}

impl PopupPlacement {
    pub fn centered(geometry: &WindowGeometry, width: u32, height: u32) -> Self {
        let screen_x = geometry.screen_x.or(geometry.screen_left).unwrap_or(0);
        let screen_y = geometry.screen_y.or(geometry.screen_top).unwrap_or(0);
        // Host-supplied values can be anything; f64 keeps the math from overflowing
        // and the final casts saturate.
        let outer_width = geometry
            .outer_width
            .or(geometry.client_width)
            .map_or(f64::from(width), f64::from);
        let outer_height = geometry
            .outer_height
            .map(f64::from)
            .or(geometry.client_height.map(|h| f64::from(h) - 22.0))
            .unwrap_or(f64::from(height));

        let left = f64::from(screen_x) + (outer_width - f64::from(width)) / 2.0;
        let top = f64::from(screen_y) + (outer_height - f64::from(height)) / 2.5;

        Self {
            width,
            height,
            left: left.trunc() as i32,
            top: top.trunc() as i32,
        }
    }

    /// The `window.open` feature string.
    pub fn features(&self) -> String {
        format!(
            "width={},height={},left={},top={}",
            self.width, self.height, self.left, self.top
        )
    }
}
