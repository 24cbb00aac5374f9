//! Global WASM state: the one client instance per page.
//!
//! Exports clone the handles they need and release the slot before calling
//! into the client, since client callbacks may emit events whose JS handlers
//! call straight back into another export.

use std::cell::RefCell;
use std::rc::Rc;

use mu_core::Mu;

use crate::host::WasmHost;

/// The complete runtime state.
pub struct Runtime {
    pub mu: Mu,
    pub host: Rc<WasmHost>,
    /// Last value handed out through `mu_get_result` (e.g. an API call id).
    pub result_buffer: String,
}

thread_local! {
    static RUNTIME: RefCell<Option<Runtime>> = const { RefCell::new(None) };
}

/// Install a runtime, replacing any existing one.
pub fn init(runtime: Runtime) {
    let previous = RUNTIME.with(|slot| slot.borrow_mut().replace(runtime));
    drop(previous);
}

/// The client and host, if initialized.
pub fn handles() -> Option<(Mu, Rc<WasmHost>)> {
    RUNTIME.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|rt| (rt.mu.clone(), rt.host.clone()))
    })
}

pub fn set_result(value: String) {
    RUNTIME.with(|slot| {
        if let Some(rt) = slot.borrow_mut().as_mut() {
            rt.result_buffer = value;
        }
    });
}

pub fn result() -> Option<String> {
    RUNTIME.with(|slot| slot.borrow().as_ref().map(|rt| rt.result_buffer.clone()))
}
