//! Pending-callback registry.
//!
//! The registry is the single source of truth for "already handled": a
//! callback leaves it exactly once, and whoever removes it is the only party
//! allowed to invoke it.

use std::collections::HashMap;

/// A pending callback taking the resolution payload.
pub type Callback<A> = Box<dyn FnOnce(A)>;

struct Pending<A> {
    /// Surface the response will come back through, if any.
    surface_id: Option<String>,
    callback: Callback<A>,
}

/// Maps callback ids to pending callbacks.
pub struct CallbackRegistry<A> {
    entries: HashMap<String, Pending<A>>,
}

impl<A> CallbackRegistry<A> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register `callback` under `id`, replacing any entry already there.
    ///
    /// Ids must be unique per exchange; a reused id silently drops the older callback.
    pub fn register(&mut self, id: impl Into<String>, surface_id: Option<&str>, callback: Callback<A>) {
        let id = id.into();
        let previous = self.entries.insert(
            id.clone(),
            Pending {
                surface_id: surface_id.map(str::to_string),
                callback,
            },
        );
        if previous.is_some() {
            tracing::debug!(id = %id, "callback id reused, previous callback dropped");
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// The surface `id` is bound to: `None` if `id` is not pending,
    /// `Some(None)` if it is pending but unbound.
    pub fn surface_of(&self, id: &str) -> Option<Option<&str>> {
        self.entries.get(id).map(|p| p.surface_id.as_deref())
    }

    /// Remove the entry for `id` and hand its callback to the caller.
    ///
    /// Used when the callback must run after other state borrows are released.
    pub fn take(&mut self, id: &str) -> Option<Callback<A>> {
        self.entries.remove(id).map(|p| p.callback)
    }

    /// Remove the entry for `id` and invoke it with `args`.
    ///
    /// Returns false without doing anything if `id` is not pending.
    pub fn resolve_and_remove(&mut self, id: &str, args: A) -> bool {
        match self.take(id) {
            Some(callback) => {
                callback(args);
                true
            }
            None => false,
        }
    }

    /// Drop, without invoking, every entry bound to `surface_id`. Returns how many were dropped.
    pub fn retire_surface(&mut self, surface_id: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, p| p.surface_id.as_deref() != Some(surface_id));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<A> Default for CallbackRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}
