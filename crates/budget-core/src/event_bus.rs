//! Process-wide publish/subscribe keyed by event name.
//!
//! Single-threaded (WASM constraint): interior mutability via RefCell, cheap
//! clones via Rc. Listeners for one event run in registration order; the
//! list is snapshotted before delivery so listeners may subscribe,
//! unsubscribe or emit re-entrantly.
//!
//! A listener that returns `Err` is logged and skipped. Panics are caught
//! the same way on native targets only: wasm32-unknown-unknown aborts on
//! panic, so in the browser a panicking listener takes the module down.

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use budget_types::Result;
use serde_json::Value;

use crate::subscription::Subscription;

/// A registered callback. Identity (for `off`) is the Rc allocation.
pub type Listener = Rc<dyn Fn(&Value) -> Result<()>>;

type Registry = RefCell<HashMap<String, Vec<Listener>>>;

/// Shared event bus, clone-cheap via Rc.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Registering the same listener twice delivers twice.
    pub fn on(&self, event: &str, listener: Listener) {
        self.inner
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push(listener);
    }

    /// Remove the first registration of `listener`. Unknown events or
    /// listeners are ignored.
    pub fn off(&self, event: &str, listener: &Listener) {
        remove_first(&self.inner, event, listener);
    }

    /// Register a closure and get a guard that unregisters it on drop.
    pub fn subscribe<F>(&self, event: &str, f: F) -> Subscription
    where
        F: Fn(&Value) -> Result<()> + 'static,
    {
        let listener: Listener = Rc::new(f);
        self.on(event, listener.clone());

        let registry: Weak<Registry> = Rc::downgrade(&self.inner);
        let event = event.to_string();
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                remove_first(&registry, &event, &listener);
            }
        })
    }

    /// Deliver `payload` to every listener of `event`. A failing listener is
    /// logged and skipped. Returns how many listeners were invoked.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        let snapshot: Vec<Listener> = match self.inner.borrow().get(event) {
            Some(list) => list.clone(),
            None => return 0,
        };

        log::debug!("emit {} -> {} listener(s)", event, snapshot.len());
        for listener in &snapshot {
            run_isolated(event, || listener(payload));
        }
        snapshot.len()
    }

    pub fn remove_all_listeners(&self, event: &str) {
        self.inner.borrow_mut().remove(event);
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().clear();
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.borrow().get(event).map_or(0, Vec::len)
    }

    /// Events with at least one listener, sorted
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.borrow().keys().cloned().collect();
        names.sort();
        names
    }
}

fn remove_first(registry: &Registry, event: &str, listener: &Listener) {
    let mut map = registry.borrow_mut();
    if let Some(list) = map.get_mut(event) {
        if let Some(pos) = list.iter().position(|l| Rc::ptr_eq(l, listener)) {
            list.remove(pos);
        }
        if list.is_empty() {
            map.remove(event);
        }
    }
}

/// Run one callback so that an `Err` (and, on native targets, a panic)
/// does not escape. Returns whether the callback succeeded.
pub(crate) fn run_isolated(target: &str, f: impl FnOnce() -> Result<()>) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::error!("Listener for '{}' failed: {}", target, e);
            false
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("Listener for '{}' panicked: {}", target, message);
            false
        }
    }
}
