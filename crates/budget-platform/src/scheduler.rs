//! Scheduler backed by browser timers (`setTimeout` / `setInterval` through
//! gloo-timers) and the wasm-bindgen-futures microtask queue.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use gloo_timers::callback::{Interval, Timeout};

use budget_core::ports::{Scheduler, TimerHandle};

enum BrowserTimer {
    Once(Timeout),
    Every(Interval),
}

/// Owns every live gloo timer; dropping a timer cancels it.
#[derive(Default)]
pub struct BrowserScheduler {
    next_handle: Cell<TimerHandle>,
    timers: Rc<RefCell<HashMap<TimerHandle, BrowserTimer>>>,
}

impl BrowserScheduler {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn active_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    fn next_handle(&self) -> TimerHandle {
        let handle = self.next_handle.get() + 1;
        self.next_handle.set(handle);
        handle
    }
}

/// Largest delay `setTimeout` honours. gloo-timers casts to i32, and
/// anything above this wraps negative and fires on the next tick.
pub const MAX_DELAY_MS: u32 = i32::MAX as u32;

pub fn clamp_delay(ms: u64) -> u32 {
    u32::try_from(ms).map_or(MAX_DELAY_MS, |ms| ms.min(MAX_DELAY_MS))
}

impl Scheduler for BrowserScheduler {
    fn now_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }

    fn set_timeout(&self, delay_ms: u64, task: Box<dyn FnOnce()>) -> TimerHandle {
        let handle = self.next_handle();
        let timers = self.timers.clone();
        let timeout = Timeout::new(clamp_delay(delay_ms), move || {
            // The Timeout running this closure is released after it returns.
            let fired = timers.borrow_mut().remove(&handle);
            task();
            if let Some(fired) = fired {
                wasm_bindgen_futures::spawn_local(async move { drop(fired) });
            }
        });
        self.timers
            .borrow_mut()
            .insert(handle, BrowserTimer::Once(timeout));
        handle
    }

    fn set_interval(&self, period_ms: u64, task: Rc<dyn Fn()>) -> TimerHandle {
        let handle = self.next_handle();
        let interval = Interval::new(clamp_delay(period_ms), move || task());
        self.timers
            .borrow_mut()
            .insert(handle, BrowserTimer::Every(interval));
        handle
    }

    fn clear(&self, handle: TimerHandle) {
        let removed = self.timers.borrow_mut().remove(&handle);
        match removed {
            Some(BrowserTimer::Once(timeout)) => drop(timeout.cancel()),
            Some(BrowserTimer::Every(interval)) => drop(interval.cancel()),
            None => {}
        }
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }
}
