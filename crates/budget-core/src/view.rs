//! Synced views: stateful view-models that stay consistent with the backend.
//!
//! A [`SyncedView`] owns one [`ViewLoader`] and refreshes it when
//! - it mounts,
//! - a subscribed domain event is emitted or a subscribed cache key is invalidated,
//! - its [`AutoRefresh`] fires (interval, focus, visibility),
//! - the owner calls [`refresh`](SyncedView::refresh),
//! - the single retry timer or the post-mutation confirmation timer fires.
//!
//! Phases: `Idle → Loading → Ready | Error`, and any refresh goes back to
//! `Loading`. Overlapping refreshes are not coalesced unless
//! `single_flight` is set; the last one to resolve wins.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::{Rc, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use budget_types::{Result, config::{RefreshConfig, SyncConfig}};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auto_refresh::{AutoRefresh, RefreshAction};
use crate::context::SyncContext;
use crate::ports::{FetchMode, Scheduler, TimerHandle};
use crate::subscription::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPhase {
    Idle,
    Loading,
    Ready,
    Error,
}

/// What started a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOrigin {
    Mount,
    Manual,
    Auto,
    Event,
    Retry,
    /// Reconciling after an optimistic update
    Reconcile,
}

impl RefreshOrigin {
    /// Only the first load may be answered from an HTTP cache.
    pub fn mode(&self) -> FetchMode {
        match self {
            RefreshOrigin::Mount => FetchMode::Cached,
            _ => FetchMode::Force,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewState<V> {
    pub phase: LoadPhase,
    pub data: V,
    pub error: Option<String>,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl<V: Default> Default for ViewState<V> {
    fn default() -> Self {
        Self {
            phase: LoadPhase::Idle,
            data: V::default(),
            error: None,
            last_refresh: None,
        }
    }
}

impl<V> ViewState<V> {
    pub fn loading(&self) -> bool {
        self.phase == LoadPhase::Loading
    }
}

/// Fetches everything one view shows. Both halves of a composite view must
/// succeed for the load to succeed.
#[async_trait(?Send)]
pub trait ViewLoader: 'static {
    type View: Clone + Default + 'static;

    /// Short name for logs
    fn name(&self) -> String;

    async fn load(&self, mode: FetchMode) -> Result<Self::View>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewOptions {
    pub events: Vec<String>,
    pub cache_keys: Vec<String>,
    pub refresh: RefreshConfig,
    pub retry_delay_ms: u64,
    pub confirm_delay_ms: u64,
    pub single_flight: bool,
}

impl ViewOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            events: Vec::new(),
            cache_keys: Vec::new(),
            refresh: config.refresh.clone(),
            retry_delay_ms: config.retry_delay_ms,
            confirm_delay_ms: config.confirm_delay_ms,
            single_flight: config.single_flight,
        }
    }

    pub fn with_events<S: AsRef<str>>(mut self, events: &[S]) -> Self {
        self.events.extend(events.iter().map(|e| e.as_ref().to_string()));
        self
    }

    pub fn with_cache_keys<S: AsRef<str>>(mut self, keys: &[S]) -> Self {
        self.cache_keys.extend(keys.iter().map(|k| k.as_ref().to_string()));
        self
    }
}

pub type ChangeListener<V> = Rc<dyn Fn(&ViewState<V>)>;

struct ViewInner<L: ViewLoader> {
    id: Uuid,
    name: String,
    loader: L,
    scheduler: Rc<dyn Scheduler>,
    options: ViewOptions,
    state: RefCell<ViewState<L::View>>,
    alive: Cell<bool>,
    in_flight: Cell<u32>,
    rerun: Cell<Option<RefreshOrigin>>,
    retry_timer: Cell<Option<TimerHandle>>,
    confirm_timer: Cell<Option<TimerHandle>>,
    subscriptions: RefCell<Vec<Subscription>>,
    auto_refresh: RefCell<Option<AutoRefresh>>,
    on_change: RefCell<Option<ChangeListener<L::View>>>,
}

/// A mounted view. Dropping it unmounts: every subscription, timer and
/// page listener it holds is released.
pub struct SyncedView<L: ViewLoader> {
    inner: Rc<ViewInner<L>>,
}

impl<L: ViewLoader> SyncedView<L> {
    /// Subscribe, start auto-refresh and kick off the first load.
    pub fn mount(ctx: &SyncContext, loader: L, options: ViewOptions) -> Self {
        let inner = Rc::new(ViewInner {
            id: Uuid::new_v4(),
            name: loader.name(),
            loader,
            scheduler: ctx.scheduler.clone(),
            options,
            state: RefCell::new(ViewState::default()),
            alive: Cell::new(true),
            in_flight: Cell::new(0),
            rerun: Cell::new(None),
            retry_timer: Cell::new(None),
            confirm_timer: Cell::new(None),
            subscriptions: RefCell::new(Vec::new()),
            auto_refresh: RefCell::new(None),
            on_change: RefCell::new(None),
        });

        let mut subscriptions = Vec::new();
        for event in &inner.options.events {
            let weak = Rc::downgrade(&inner);
            subscriptions.push(ctx.event_bus.subscribe(event, move |_payload| {
                spawn_fetch(&weak, RefreshOrigin::Event);
                Ok(())
            }));
        }
        for key in &inner.options.cache_keys {
            let weak = Rc::downgrade(&inner);
            subscriptions.push(ctx.cache.subscribe(key, move || {
                spawn_fetch(&weak, RefreshOrigin::Event);
                Ok(())
            }));
        }
        *inner.subscriptions.borrow_mut() = subscriptions;

        let weak = Rc::downgrade(&inner);
        let action: RefreshAction = Rc::new(move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => ViewInner::fetch(inner, RefreshOrigin::Auto).await,
                    None => Ok(()),
                }
            }
            .boxed_local()
        });
        let auto = AutoRefresh::start(
            ctx.scheduler.clone(),
            ctx.page.clone(),
            &inner.options.refresh,
            action,
        );
        *inner.auto_refresh.borrow_mut() = Some(auto);

        log::info!("Mounted {} view {}", inner.name, inner.id);
        spawn_fetch(&Rc::downgrade(&inner), RefreshOrigin::Mount);
        Self { inner }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.alive.get()
    }

    pub fn state(&self) -> ViewState<L::View> {
        self.inner.state.borrow().clone()
    }

    pub fn data(&self) -> L::View {
        self.inner.state.borrow().data.clone()
    }

    pub fn loader(&self) -> &L {
        &self.inner.loader
    }

    /// Called after every state change with the new state.
    pub fn on_change(&self, listener: impl Fn(&ViewState<L::View>) + 'static) {
        *self.inner.on_change.borrow_mut() = Some(Rc::new(listener));
    }

    /// Forced refresh requested by the owner.
    pub async fn refresh(&self) -> Result<()> {
        ViewInner::fetch(self.inner.clone(), RefreshOrigin::Manual).await
    }

    pub fn has_pending_retry(&self) -> bool {
        self.inner.retry_timer.get().is_some()
    }

    pub fn has_pending_confirmation(&self) -> bool {
        self.inner.confirm_timer.get().is_some()
    }

    /// Apply `optimistic` to local data right away, then await `call`.
    /// On success a confirmation refresh follows after `confirm_delay_ms`;
    /// on failure the view is refreshed immediately so backend state wins.
    pub async fn mutate_optimistic<T, F>(
        &self,
        optimistic: impl FnOnce(&mut L::View),
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.patch(optimistic);
        let outcome = call.await;
        self.settle(&outcome).await;
        outcome
    }

    /// Edit local data without fetching. Ignored once unmounted.
    pub fn patch(&self, edit: impl FnOnce(&mut L::View)) {
        if self.inner.alive.get() {
            self.inner.update(|state| edit(&mut state.data));
        }
    }

    /// Follow up a write that was already applied with [`patch`](Self::patch):
    /// schedule the confirmation refresh, or resync right away on failure.
    pub async fn settle<T>(&self, outcome: &Result<T>) {
        match outcome {
            Ok(_) => ViewInner::schedule_confirmation(&self.inner),
            Err(e) => {
                log::warn!("{} optimistic update failed: {}; resyncing", self.inner.name, e);
                let _ = ViewInner::fetch(self.inner.clone(), RefreshOrigin::Reconcile).await;
            }
        }
    }

    /// Release everything. Idempotent; also runs on drop.
    pub fn unmount(&self) {
        self.inner.teardown();
    }
}

impl<L: ViewLoader> Drop for SyncedView<L> {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

fn spawn_fetch<L: ViewLoader>(weak: &Weak<ViewInner<L>>, origin: RefreshOrigin) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let scheduler = inner.scheduler.clone();
    scheduler.spawn(Box::pin(async move {
        let _ = ViewInner::fetch(inner, origin).await;
    }));
}

impl<L: ViewLoader> ViewInner<L> {
    async fn fetch(self: Rc<Self>, origin: RefreshOrigin) -> Result<()> {
        if !self.alive.get() {
            return Ok(());
        }
        if self.options.single_flight && self.in_flight.get() > 0 {
            log::debug!("{} refresh ({:?}) coalesced into in-flight load", self.name, origin);
            self.rerun.set(Some(origin));
            return Ok(());
        }

        self.cancel_retry();
        self.in_flight.set(self.in_flight.get() + 1);
        self.update(|state| {
            state.phase = LoadPhase::Loading;
            state.error = None;
        });

        let result = self.loader.load(origin.mode()).await;
        self.in_flight.set(self.in_flight.get() - 1);

        if !self.alive.get() {
            return result.map(|_| ());
        }

        let outcome = match result {
            Ok(data) => {
                let now = DateTime::<Utc>::from_timestamp_millis(self.scheduler.now_ms() as i64);
                self.update(|state| {
                    state.data = data;
                    state.phase = LoadPhase::Ready;
                    state.error = None;
                    state.last_refresh = now;
                });
                Ok(())
            }
            Err(e) => {
                log::warn!("{} load failed ({:?}): {}", self.name, origin, e);
                self.update(|state| {
                    state.phase = LoadPhase::Error;
                    state.error = Some(e.to_string());
                });
                // A failed retry does not schedule another; auto-refresh covers longer outages.
                if origin != RefreshOrigin::Retry {
                    Self::schedule_retry(&self);
                }
                Err(e)
            }
        };

        if let Some(next) = self.rerun.take() {
            spawn_fetch(&Rc::downgrade(&self), next);
        }
        outcome
    }

    fn update(&self, f: impl FnOnce(&mut ViewState<L::View>)) {
        let snapshot = {
            let mut state = self.state.borrow_mut();
            f(&mut state);
            state.clone()
        };
        let listener = self.on_change.borrow().clone();
        if let Some(listener) = listener {
            listener(&snapshot);
        }
    }

    fn schedule_retry(this: &Rc<Self>) {
        this.cancel_retry();
        let weak = Rc::downgrade(this);
        let handle = this.scheduler.set_timeout(
            this.options.retry_delay_ms,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.retry_timer.set(None);
                    log::info!("{} retrying after failure", inner.name);
                    spawn_fetch(&weak, RefreshOrigin::Retry);
                }
            }),
        );
        this.retry_timer.set(Some(handle));
    }

    fn cancel_retry(&self) {
        if let Some(handle) = self.retry_timer.take() {
            self.scheduler.clear(handle);
        }
    }

    fn schedule_confirmation(this: &Rc<Self>) {
        if !this.alive.get() {
            return;
        }
        if let Some(handle) = this.confirm_timer.take() {
            this.scheduler.clear(handle);
        }
        let weak = Rc::downgrade(this);
        let handle = this.scheduler.set_timeout(
            this.options.confirm_delay_ms,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.confirm_timer.set(None);
                    spawn_fetch(&weak, RefreshOrigin::Reconcile);
                }
            }),
        );
        this.confirm_timer.set(Some(handle));
    }

    fn teardown(&self) {
        if !self.alive.replace(false) {
            return;
        }
        self.subscriptions.borrow_mut().clear();
        if let Some(auto) = self.auto_refresh.borrow_mut().take() {
            auto.stop();
        }
        self.cancel_retry();
        if let Some(handle) = self.confirm_timer.take() {
            self.scheduler.clear(handle);
        }
        self.rerun.set(None);
        *self.on_change.borrow_mut() = None;
        log::info!("Unmounted {} view {}", self.name, self.id);
    }
}
