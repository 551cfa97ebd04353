//! Named-key invalidation with fire-now-or-fire-later delivery.
//!
//! Each key is in exactly one state:
//!
//! | state            | `invalidate`                     | `on_invalidate`                        |
//! |------------------|----------------------------------|----------------------------------------|
//! | `Idle`           | → `Pending`                      | → `Subscribed([cb])`                   |
//! | `Pending`        | stays `Pending` (one slot only)  | → `Subscribed([cb])`, `cb` deferred    |
//! | `Subscribed(cbs)`| run every `cb` now, in order     | append                                 |
//!
//! An invalidation is never dropped: it reaches current subscribers now or
//! the first future subscriber on the next tick. Repeated invalidations of a
//! pending key collapse into one.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use budget_types::Result;
use serde::Serialize;

use crate::event_bus::run_isolated;
use crate::ports::Scheduler;
use crate::subscription::Subscription;

pub type InvalidationCallback = Rc<dyn Fn() -> Result<()>>;

/// Per-key state. A key absent from the map is `Idle`.
#[derive(Clone)]
pub enum KeyState {
    Idle,
    Pending,
    Subscribed(Vec<InvalidationCallback>),
}

impl KeyState {
    pub fn is_pending(&self) -> bool {
        matches!(self, KeyState::Pending)
    }
}

impl std::fmt::Debug for KeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyState::Idle => write!(f, "Idle"),
            KeyState::Pending => write!(f, "Pending"),
            KeyState::Subscribed(cbs) => write!(f, "Subscribed({})", cbs.len()),
        }
    }
}

/// Debug view of the registry (backs `window.debugCache`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheSnapshot {
    /// (key, callback count), sorted by key
    pub subscribed: Vec<(String, usize)>,
    pub pending: Vec<String>,
}

type Keys = RefCell<HashMap<String, KeyState>>;

struct Inner {
    keys: Keys,
    scheduler: Rc<dyn Scheduler>,
}

#[derive(Clone)]
pub struct CacheManager {
    inner: Rc<Inner>,
}

impl CacheManager {
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            inner: Rc::new(Inner {
                keys: RefCell::new(HashMap::new()),
                scheduler,
            }),
        }
    }

    /// Register `callback` for `key`. If the key is pending, the callback is
    /// also invoked on the next tick and the pending mark is cleared.
    pub fn on_invalidate(&self, key: &str, callback: InvalidationCallback) {
        let was_pending = {
            let mut keys = self.inner.keys.borrow_mut();
            let state = keys.remove(key).unwrap_or(KeyState::Idle);
            let (next, was_pending) = match state {
                KeyState::Idle => (KeyState::Subscribed(vec![callback.clone()]), false),
                KeyState::Pending => (KeyState::Subscribed(vec![callback.clone()]), true),
                KeyState::Subscribed(mut cbs) => {
                    cbs.push(callback.clone());
                    (KeyState::Subscribed(cbs), false)
                }
            };
            keys.insert(key.to_string(), next);
            was_pending
        };

        if was_pending {
            log::debug!("Delivering pending invalidation of '{}' on next tick", key);
            self.defer_delivery(key, callback);
        }
    }

    /// Register a closure and get a guard that removes it on drop.
    pub fn subscribe<F>(&self, key: &str, f: F) -> Subscription
    where
        F: Fn() -> Result<()> + 'static,
    {
        let callback: InvalidationCallback = Rc::new(f);
        self.on_invalidate(key, callback.clone());

        let inner: Weak<Inner> = Rc::downgrade(&self.inner);
        let key = key.to_string();
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                remove_callback(&inner.keys, &key, &callback);
            }
        })
    }

    /// Notify subscribers of `key` now, or mark it pending if there are none.
    /// Returns how many callbacks ran.
    pub fn invalidate(&self, key: &str) -> usize {
        let snapshot = {
            let mut keys = self.inner.keys.borrow_mut();
            match keys.get(key).cloned() {
                Some(KeyState::Subscribed(cbs)) if !cbs.is_empty() => cbs,
                Some(KeyState::Pending) => {
                    log::debug!("'{}' already pending", key);
                    return 0;
                }
                _ => {
                    log::debug!("No subscribers for '{}', marking pending", key);
                    keys.insert(key.to_string(), KeyState::Pending);
                    return 0;
                }
            }
        };

        log::debug!("invalidate {} -> {} callback(s)", key, snapshot.len());
        for cb in &snapshot {
            run_isolated(key, || cb());
        }
        snapshot.len()
    }

    /// Invalidate each key independently.
    pub fn invalidate_multiple<S: AsRef<str>>(&self, keys: &[S]) -> usize {
        keys.iter().map(|k| self.invalidate(k.as_ref())).sum()
    }

    /// Forget every callback and any pending mark for `key`.
    pub fn clear_callbacks(&self, key: &str) {
        self.inner.keys.borrow_mut().remove(key);
    }

    pub fn state(&self, key: &str) -> KeyState {
        self.inner
            .keys
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or(KeyState::Idle)
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.state(key).is_pending()
    }

    pub fn callback_count(&self, key: &str) -> usize {
        match self.inner.keys.borrow().get(key) {
            Some(KeyState::Subscribed(cbs)) => cbs.len(),
            _ => 0,
        }
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let keys = self.inner.keys.borrow();
        let mut snap = CacheSnapshot::default();
        for (key, state) in keys.iter() {
            match state {
                KeyState::Pending => snap.pending.push(key.clone()),
                KeyState::Subscribed(cbs) => snap.subscribed.push((key.clone(), cbs.len())),
                KeyState::Idle => {}
            }
        }
        snap.subscribed.sort();
        snap.pending.sort();
        snap
    }

    fn defer_delivery(&self, key: &str, callback: InvalidationCallback) {
        let inner = Rc::downgrade(&self.inner);
        let key = key.to_string();
        self.inner.scheduler.spawn(Box::pin(async move {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            // Skip delivery to a callback that was removed before this tick.
            let still_registered = matches!(
                inner.keys.borrow().get(&key),
                Some(KeyState::Subscribed(cbs)) if cbs.iter().any(|c| Rc::ptr_eq(c, &callback))
            );
            if still_registered {
                run_isolated(&key, || callback());
            }
        }));
    }
}

fn remove_callback(keys: &Keys, key: &str, callback: &InvalidationCallback) {
    let mut keys = keys.borrow_mut();
    if let Some(KeyState::Subscribed(cbs)) = keys.get_mut(key) {
        if let Some(pos) = cbs.iter().position(|c| Rc::ptr_eq(c, callback)) {
            cbs.remove(pos);
        }
        if cbs.is_empty() {
            keys.remove(key);
        }
    }
}
