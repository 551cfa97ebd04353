//! Refresh driver with three independent stimuli: a fixed interval, window
//! focus, and the page becoming visible again.
//!
//! The interval fires unconditionally. Focus and visibility only refresh if
//! [`FOCUS_DEBOUNCE_MS`] have passed since the last successful refresh, so
//! rapid tab switching does not hammer the backend. A failed refresh is
//! logged and leaves the timestamp untouched; retrying is the caller's job.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use budget_types::{Result, config::RefreshConfig};
use futures::future::LocalBoxFuture;

use crate::ports::{ListenerHandle, PageEvents, PageSignal, Scheduler, TimerHandle};

/// Minimum gap between focus/visibility-triggered refreshes
pub const FOCUS_DEBOUNCE_MS: u64 = 30_000;

pub type RefreshAction = Rc<dyn Fn() -> LocalBoxFuture<'static, Result<()>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stimulus {
    Interval,
    Focus,
    Visible,
}

struct Inner {
    scheduler: Rc<dyn Scheduler>,
    page: Rc<dyn PageEvents>,
    on_refresh: RefreshAction,
    last_refresh_ms: Cell<u64>,
    interval: Cell<Option<TimerHandle>>,
    listeners: RefCell<Vec<ListenerHandle>>,
    active: Cell<bool>,
}

/// Owned by exactly one consumer. Dropping it stops every stimulus.
pub struct AutoRefresh {
    inner: Rc<Inner>,
}

impl AutoRefresh {
    pub fn start(
        scheduler: Rc<dyn Scheduler>,
        page: Rc<dyn PageEvents>,
        config: &RefreshConfig,
        on_refresh: RefreshAction,
    ) -> Self {
        let now = scheduler.now_ms();
        let inner = Rc::new(Inner {
            scheduler,
            page,
            on_refresh,
            last_refresh_ms: Cell::new(now),
            interval: Cell::new(None),
            listeners: RefCell::new(Vec::new()),
            active: Cell::new(true),
        });

        if config.interval_ms > 0 {
            let weak = Rc::downgrade(&inner);
            let handle = inner.scheduler.set_interval(
                config.interval_ms,
                Rc::new(move || trigger(&weak, Stimulus::Interval)),
            );
            inner.interval.set(Some(handle));
        }

        let mut signals = Vec::new();
        if config.refresh_on_focus {
            signals.push((PageSignal::Focus, Stimulus::Focus));
        }
        if config.refresh_on_visibility_change {
            signals.push((PageSignal::BecameVisible, Stimulus::Visible));
        }
        for (signal, stimulus) in signals {
            let weak = Rc::downgrade(&inner);
            let handle = inner
                .page
                .listen(signal, Rc::new(move || trigger(&weak, stimulus)));
            inner.listeners.borrow_mut().push(handle);
        }

        log::debug!(
            "Auto-refresh started (interval {}ms, focus {}, visibility {})",
            config.interval_ms,
            config.refresh_on_focus,
            config.refresh_on_visibility_change
        );
        Self { inner }
    }

    /// Refresh immediately, bypassing the debounce.
    pub async fn refresh_now(&self) -> Result<()> {
        run(self.inner.clone()).await
    }

    pub fn last_refresh_ms(&self) -> u64 {
        self.inner.last_refresh_ms.get()
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Release the timer and both page listeners together.
    pub fn stop(&self) {
        if !self.inner.active.replace(false) {
            return;
        }
        if let Some(handle) = self.inner.interval.take() {
            self.inner.scheduler.clear(handle);
        }
        for handle in self.inner.listeners.borrow_mut().drain(..) {
            self.inner.page.unlisten(handle);
        }
        log::debug!("Auto-refresh stopped");
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.stop();
    }
}

fn trigger(weak: &Weak<Inner>, stimulus: Stimulus) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    if !inner.active.get() {
        return;
    }

    if stimulus != Stimulus::Interval {
        let elapsed = inner
            .scheduler
            .now_ms()
            .saturating_sub(inner.last_refresh_ms.get());
        if elapsed < FOCUS_DEBOUNCE_MS {
            log::debug!("{:?} ignored, last refresh {}ms ago", stimulus, elapsed);
            return;
        }
    }

    let task = run(inner.clone());
    inner.scheduler.spawn(Box::pin(async move {
        let _ = task.await;
    }));
}

async fn run(inner: Rc<Inner>) -> Result<()> {
    match (inner.on_refresh)().await {
        Ok(()) => {
            inner.last_refresh_ms.set(inner.scheduler.now_ms());
            Ok(())
        }
        Err(e) => {
            log::warn!("Auto-refresh failed: {}", e);
            Err(e)
        }
    }
}
