#[cfg(test)]
mod tests {
    use crate::auto_refresh::{AutoRefresh, RefreshAction, FOCUS_DEBOUNCE_MS};
    use crate::cache_manager::{CacheManager, CacheSnapshot, InvalidationCallback, KeyState};
    use crate::context::SyncContext;
    use crate::event_bus::{EventBus, Listener};
    use crate::hooks::*;
    use crate::ports::*;
    use crate::services::*;
    use crate::testing::*;
    use crate::view::*;
    use budget_types::{
        BudgetError,
        budget::{Budget, BudgetDraft},
        config::{RefreshConfig, SyncConfig},
        entry::{EntryDraft, EntryKind},
        event::{self, keys},
        project::ProjectStatus,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, Utc};
    use futures::executor::block_on;
    use futures::FutureExt;
    use serde_json::{json, Value};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    const T0: u64 = 1_700_000_000_000;

    fn quiet_config() -> SyncConfig {
        SyncConfig {
            refresh: RefreshConfig::disabled(),
            ..Default::default()
        }
    }

    fn setup(config: SyncConfig) -> (Rc<ManualScheduler>, Rc<ManualPage>, SyncContext) {
        let sched = ManualScheduler::new(T0);
        let page = ManualPage::new();
        let ctx = SyncContext::new(sched.clone(), page.clone(), config);
        (sched, page, ctx)
    }

    fn seeded_backend() -> Rc<MemoryBackend> {
        MemoryBackend::with_projects(vec![
            project("p1", ProjectStatus::InProgress),
            project("p2", ProjectStatus::Completed),
        ])
    }

    fn as_listener(f: impl Fn(&Value) -> budget_types::Result<()> + 'static) -> Listener {
        Rc::new(f)
    }

    fn as_callback(f: impl Fn() -> budget_types::Result<()> + 'static) -> InvalidationCallback {
        Rc::new(f)
    }

    fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let c = Rc::new(Cell::new(0));
        (c.clone(), c)
    }

    // ─── EventBus Tests ──────────────────────────────────────

    #[test]
    fn test_event_bus_delivers_in_registration_order() {
        let bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let (o1, o2) = (order.clone(), order.clone());
        bus.on(event::PROJECT_UPDATED, as_listener(move |_| { o1.borrow_mut().push(1); Ok(()) }));
        bus.on(event::PROJECT_UPDATED, as_listener(move |_| { o2.borrow_mut().push(2); Ok(()) }));

        assert_eq!(bus.emit(event::PROJECT_UPDATED, &Value::Null), 2);
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_event_bus_passes_payload_through() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Value::Null));
        let s = seen.clone();
        bus.on("x", as_listener(move |payload| { *s.borrow_mut() = payload.clone(); Ok(()) }));

        bus.emit("x", &json!(["p1", "เสร็จแล้ว"]));
        assert_eq!(*seen.borrow(), json!(["p1", "เสร็จแล้ว"]));
    }

    #[test]
    fn test_event_bus_emit_without_listeners() {
        let bus = EventBus::new();
        assert_eq!(bus.emit("nobody", &Value::Null), 0);
    }

    #[test]
    fn test_event_bus_duplicate_registration_fires_twice() {
        let bus = EventBus::new();
        let (count, c) = counter();
        let listener = as_listener(move |_| { c.set(c.get() + 1); Ok(()) });
        bus.on("x", listener.clone());
        bus.on("x", listener.clone());

        bus.emit("x", &Value::Null);
        assert_eq!(count.get(), 2);

        // off removes only the first registration
        bus.off("x", &listener);
        assert_eq!(bus.listener_count("x"), 1);
        bus.emit("x", &Value::Null);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn test_event_bus_off_unknown_is_noop() {
        let bus = EventBus::new();
        let listener = as_listener(|_| Ok(()));
        bus.off("missing", &listener);

        bus.on("x", as_listener(|_| Ok(())));
        bus.off("x", &listener);
        assert_eq!(bus.listener_count("x"), 1);
    }

    #[test]
    fn test_event_bus_failing_listeners_are_isolated() {
        let bus = EventBus::new();
        let (count, c1) = counter();
        let c2 = count.clone();
        bus.on("x", as_listener(move |_| { c1.set(c1.get() + 1); Ok(()) }));
        bus.on("x", as_listener(|_| Err(BudgetError::Listener("bad listener".to_string()))));
        bus.on("x", as_listener(|_| panic!("listener blew up")));
        bus.on("x", as_listener(move |_| { c2.set(c2.get() + 1); Ok(()) }));

        assert_eq!(bus.emit("x", &Value::Null), 4);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_event_bus_subscription_guard() {
        let bus = EventBus::new();
        let (count, c) = counter();
        let sub = bus.subscribe("x", move |_| { c.set(c.get() + 1); Ok(()) });
        bus.emit("x", &Value::Null);
        drop(sub);
        bus.emit("x", &Value::Null);

        assert_eq!(count.get(), 1);
        assert_eq!(bus.listener_count("x"), 0);
    }

    #[test]
    fn test_event_bus_explicit_unsubscribe() {
        let bus = EventBus::new();
        let sub = bus.subscribe("x", |_| Ok(()));
        assert_eq!(bus.listener_count("x"), 1);
        sub.unsubscribe();
        assert_eq!(bus.listener_count("x"), 0);
    }

    #[test]
    fn test_event_bus_remove_all_and_clear() {
        let bus = EventBus::new();
        bus.on("a", as_listener(|_| Ok(())));
        bus.on("a", as_listener(|_| Ok(())));
        bus.on("b", as_listener(|_| Ok(())));
        assert_eq!(bus.event_names(), vec!["a".to_string(), "b".to_string()]);

        bus.remove_all_listeners("a");
        assert_eq!(bus.listener_count("a"), 0);
        assert_eq!(bus.listener_count("b"), 1);

        bus.clear();
        assert!(bus.event_names().is_empty());
    }

    #[test]
    fn test_event_bus_reentrant_listener() {
        let bus = EventBus::new();
        let (count, c) = counter();
        bus.on("inner", as_listener(move |_| { c.set(c.get() + 1); Ok(()) }));
        let b = bus.clone();
        bus.on("outer", as_listener(move |_| {
            b.on("outer", as_listener(|_| Ok(())));
            b.emit("inner", &Value::Null);
            Ok(())
        }));

        bus.emit("outer", &Value::Null);
        assert_eq!(count.get(), 1);
        assert_eq!(bus.listener_count("outer"), 2);
    }

    #[test]
    fn test_event_bus_clone_shares_state() {
        let bus1 = EventBus::new();
        let bus2 = bus1.clone();
        bus1.on("x", as_listener(|_| Ok(())));
        assert_eq!(bus2.listener_count("x"), 1);
    }

    // ─── CacheManager Tests ──────────────────────────────────

    fn cache() -> (Rc<ManualScheduler>, CacheManager) {
        let sched = ManualScheduler::new(T0);
        let cache = CacheManager::new(sched.clone());
        (sched, cache)
    }

    #[test]
    fn test_cache_invalidate_runs_subscribers_in_order() {
        let (_sched, cache) = cache();
        let order = Rc::new(RefCell::new(Vec::new()));
        let (o1, o2) = (order.clone(), order.clone());
        cache.on_invalidate(keys::DASHBOARD, as_callback(move || { o1.borrow_mut().push("a"); Ok(()) }));
        cache.on_invalidate(keys::DASHBOARD, as_callback(move || { o2.borrow_mut().push("b"); Ok(()) }));

        assert_eq!(cache.invalidate(keys::DASHBOARD), 2);
        assert_eq!(*order.borrow(), vec!["a", "b"]);
        assert!(!cache.is_pending(keys::DASHBOARD));
    }

    #[test]
    fn test_cache_invalidation_without_subscribers_is_delivered_later() {
        let (sched, cache) = cache();
        assert_eq!(cache.invalidate(keys::PROJECTS), 0);
        assert!(cache.is_pending(keys::PROJECTS));

        let (count, c) = counter();
        cache.on_invalidate(keys::PROJECTS, as_callback(move || { c.set(c.get() + 1); Ok(()) }));
        // Not synchronously during registration
        assert_eq!(count.get(), 0);
        assert!(!cache.is_pending(keys::PROJECTS));

        sched.run_until_idle();
        assert_eq!(count.get(), 1);

        sched.advance(10_000);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_cache_pending_is_a_single_slot() {
        let (sched, cache) = cache();
        cache.invalidate("k");
        cache.invalidate("k");
        cache.invalidate("k");

        let (count, c) = counter();
        cache.on_invalidate("k", as_callback(move || { c.set(c.get() + 1); Ok(()) }));
        sched.run_until_idle();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_cache_only_first_subscriber_gets_deferred_delivery() {
        let (sched, cache) = cache();
        cache.invalidate("k");

        let (first, c1) = counter();
        let (second, c2) = counter();
        cache.on_invalidate("k", as_callback(move || { c1.set(c1.get() + 1); Ok(()) }));
        cache.on_invalidate("k", as_callback(move || { c2.set(c2.get() + 1); Ok(()) }));
        sched.run_until_idle();

        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 0);
    }

    #[test]
    fn test_cache_clear_callbacks_drops_pending_mark() {
        let (sched, cache) = cache();
        cache.invalidate("k");
        cache.clear_callbacks("k");
        assert!(matches!(cache.state("k"), KeyState::Idle));

        let (count, c) = counter();
        cache.on_invalidate("k", as_callback(move || { c.set(c.get() + 1); Ok(()) }));
        sched.run_until_idle();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_cache_clear_callbacks_removes_subscribers() {
        let (_sched, cache) = cache();
        cache.on_invalidate("k", as_callback(|| Ok(())));
        cache.on_invalidate("k", as_callback(|| Ok(())));
        cache.clear_callbacks("k");
        assert_eq!(cache.callback_count("k"), 0);

        // With nobody listening the next invalidation is held again.
        cache.invalidate("k");
        assert!(cache.is_pending("k"));
    }

    #[test]
    fn test_cache_deferred_delivery_skipped_after_unsubscribe() {
        let (sched, cache) = cache();
        cache.invalidate("k");

        let (count, c) = counter();
        let sub = cache.subscribe("k", move || { c.set(c.get() + 1); Ok(()) });
        drop(sub);
        sched.run_until_idle();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_cache_failing_callbacks_are_isolated() {
        let (_sched, cache) = cache();
        let (count, c) = counter();
        cache.on_invalidate("k", as_callback(|| Err(BudgetError::Other("nope".to_string()))));
        cache.on_invalidate("k", as_callback(|| panic!("boom")));
        cache.on_invalidate("k", as_callback(move || { c.set(c.get() + 1); Ok(()) }));

        assert_eq!(cache.invalidate("k"), 3);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_cache_invalidate_multiple_is_per_key() {
        let (_sched, cache) = cache();
        let (count, c) = counter();
        cache.on_invalidate("a", as_callback(move || { c.set(c.get() + 1); Ok(()) }));

        assert_eq!(cache.invalidate_multiple(&["a", "b"]), 1);
        assert_eq!(count.get(), 1);
        assert!(cache.is_pending("b"));
        assert!(!cache.is_pending("a"));
    }

    #[test]
    fn test_cache_guard_collapses_key_to_idle() {
        let (_sched, cache) = cache();
        let sub = cache.subscribe("k", || Ok(()));
        assert_eq!(cache.callback_count("k"), 1);
        drop(sub);
        assert!(matches!(cache.state("k"), KeyState::Idle));
    }

    #[test]
    fn test_cache_snapshot() {
        let (_sched, cache) = cache();
        cache.on_invalidate(keys::DASHBOARD, as_callback(|| Ok(())));
        cache.on_invalidate(keys::DASHBOARD, as_callback(|| Ok(())));
        cache.invalidate(keys::BUDGETS);

        assert_eq!(
            cache.snapshot(),
            CacheSnapshot {
                subscribed: vec![(keys::DASHBOARD.to_string(), 2)],
                pending: vec![keys::BUDGETS.to_string()],
            }
        );
    }

    // ─── AutoRefresh Tests ───────────────────────────────────

    fn counting_action(count: Rc<Cell<u32>>, fail: Rc<Cell<bool>>) -> RefreshAction {
        Rc::new(move || {
            let count = count.clone();
            let fail = fail.clone();
            async move {
                count.set(count.get() + 1);
                if fail.get() {
                    Err(BudgetError::Network("offline".to_string()))
                } else {
                    Ok(())
                }
            }
            .boxed_local()
        })
    }

    fn page_signals_only() -> RefreshConfig {
        RefreshConfig {
            interval_ms: 0,
            refresh_on_focus: true,
            refresh_on_visibility_change: true,
        }
    }

    #[test]
    fn test_auto_refresh_interval_is_unconditional() {
        let sched = ManualScheduler::new(T0);
        let page = ManualPage::new();
        let (count, c) = counter();
        let config = RefreshConfig { interval_ms: 10_000, ..page_signals_only() };
        let _auto = AutoRefresh::start(sched.clone(), page.clone(), &config, counting_action(c, Rc::new(Cell::new(false))));

        sched.advance(30_000);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn test_auto_refresh_zero_interval_disables_timer() {
        let sched = ManualScheduler::new(T0);
        let page = ManualPage::new();
        let (count, c) = counter();
        let _auto = AutoRefresh::start(sched.clone(), page.clone(), &page_signals_only(), counting_action(c, Rc::new(Cell::new(false))));

        assert_eq!(sched.pending_timers(), 0);
        sched.advance(120_000);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_auto_refresh_focus_debounce() {
        let sched = ManualScheduler::new(T0);
        let page = ManualPage::new();
        let (count, c) = counter();
        let _auto = AutoRefresh::start(sched.clone(), page.clone(), &page_signals_only(), counting_action(c, Rc::new(Cell::new(false))));

        sched.advance(10_000);
        page.fire(PageSignal::Focus);
        sched.run_until_idle();
        assert_eq!(count.get(), 0);

        sched.advance(21_000);
        page.fire(PageSignal::Focus);
        sched.run_until_idle();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_auto_refresh_visibility_uses_same_debounce() {
        let sched = ManualScheduler::new(T0);
        let page = ManualPage::new();
        let (count, c) = counter();
        let auto = AutoRefresh::start(sched.clone(), page.clone(), &page_signals_only(), counting_action(c, Rc::new(Cell::new(false))));

        sched.advance(FOCUS_DEBOUNCE_MS);
        page.fire(PageSignal::BecameVisible);
        sched.run_until_idle();
        assert_eq!(count.get(), 1);
        assert_eq!(auto.last_refresh_ms(), T0 + FOCUS_DEBOUNCE_MS);

        // Immediately after a successful refresh the next signal is ignored.
        sched.advance(1_000);
        page.fire(PageSignal::BecameVisible);
        sched.run_until_idle();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_auto_refresh_failure_keeps_last_refresh() {
        let sched = ManualScheduler::new(T0);
        let page = ManualPage::new();
        let (count, c) = counter();
        let fail = Rc::new(Cell::new(true));
        let auto = AutoRefresh::start(sched.clone(), page.clone(), &page_signals_only(), counting_action(c, fail.clone()));

        sched.advance(31_000);
        page.fire(PageSignal::Focus);
        sched.run_until_idle();
        assert_eq!(count.get(), 1);
        assert_eq!(auto.last_refresh_ms(), T0);

        // No automatic retry is scheduled by the controller itself.
        assert_eq!(sched.pending_timers(), 0);

        // Still stale, so the next focus refreshes again.
        sched.advance(1_000);
        page.fire(PageSignal::Focus);
        sched.run_until_idle();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_auto_refresh_stop_releases_every_stimulus() {
        let sched = ManualScheduler::new(T0);
        let page = ManualPage::new();
        let (count, c) = counter();
        let config = RefreshConfig { interval_ms: 5_000, ..page_signals_only() };
        let auto = AutoRefresh::start(sched.clone(), page.clone(), &config, counting_action(c, Rc::new(Cell::new(false))));
        assert_eq!(sched.pending_timers(), 1);
        assert_eq!(page.listener_count(), 2);

        auto.stop();
        assert!(!auto.is_active());
        assert_eq!(sched.pending_timers(), 0);
        assert_eq!(page.listener_count(), 0);

        sched.advance(60_000);
        page.fire(PageSignal::Focus);
        sched.run_until_idle();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_auto_refresh_drop_releases_every_stimulus() {
        let sched = ManualScheduler::new(T0);
        let page = ManualPage::new();
        let config = RefreshConfig { interval_ms: 5_000, ..page_signals_only() };
        let auto = AutoRefresh::start(sched.clone(), page.clone(), &config, counting_action(Rc::new(Cell::new(0)), Rc::new(Cell::new(false))));
        drop(auto);
        assert_eq!(sched.pending_timers(), 0);
        assert_eq!(page.listener_count(), 0);
    }

    #[test]
    fn test_auto_refresh_flags_control_listeners() {
        let sched = ManualScheduler::new(T0);
        let page = ManualPage::new();
        let config = RefreshConfig {
            interval_ms: 0,
            refresh_on_focus: true,
            refresh_on_visibility_change: false,
        };
        let _auto = AutoRefresh::start(sched.clone(), page.clone(), &config, counting_action(Rc::new(Cell::new(0)), Rc::new(Cell::new(false))));
        assert_eq!(page.listener_count(), 1);
        assert_eq!(page.fire(PageSignal::BecameVisible), 0);
    }

    #[test]
    fn test_auto_refresh_now_bypasses_debounce() {
        let sched = ManualScheduler::new(T0);
        let page = ManualPage::new();
        let (count, c) = counter();
        let auto = AutoRefresh::start(sched.clone(), page.clone(), &page_signals_only(), counting_action(c, Rc::new(Cell::new(false))));

        sched.advance(500);
        block_on(auto.refresh_now()).unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(auto.last_refresh_ms(), T0 + 500);
    }

    // ─── Dashboard Hook Tests ────────────────────────────────

    #[test]
    fn test_dashboard_initial_load() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let hook = DashboardHook::mount(&ctx, &Backend::shared(backend.clone()));
        assert_eq!(hook.state().phase, LoadPhase::Idle);

        sched.run_until_idle();
        let state = hook.state();
        assert_eq!(state.phase, LoadPhase::Ready);
        assert!(state.error.is_none());
        assert_eq!(state.data.project_summaries.len(), 2);
        let data = state.data.dashboard_data.unwrap();
        assert_eq!(data.in_progress_projects, 1);
        assert_eq!(data.completed_projects, 1);
        assert_eq!(state.last_refresh, DateTime::<Utc>::from_timestamp_millis(T0 as i64));
        assert_eq!(backend.last_mode(), Some(FetchMode::Cached));
    }

    #[test]
    fn test_dashboard_phase_transitions() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let hook = DashboardHook::mount(&ctx, &Backend::shared(backend.clone()));
        let phases = Rc::new(RefCell::new(Vec::new()));
        let p = phases.clone();
        hook.on_change(move |state| p.borrow_mut().push(state.phase));

        sched.run_until_idle();
        block_on(hook.refresh()).unwrap();
        assert_eq!(
            *phases.borrow(),
            vec![LoadPhase::Loading, LoadPhase::Ready, LoadPhase::Loading, LoadPhase::Ready]
        );
        assert_eq!(backend.last_mode(), Some(FetchMode::Force));
    }

    #[test]
    fn test_dashboard_failed_load_retries_once_after_delay() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        backend.fail_reads(1);
        let hook = DashboardHook::mount(&ctx, &Backend::shared(backend.clone()));

        sched.run_until_idle();
        let state = hook.state();
        assert_eq!(state.phase, LoadPhase::Error);
        assert_eq!(state.error.as_deref(), Some("Network error: connection refused"));
        assert!(hook.has_pending_retry());

        sched.advance(4_999);
        assert_eq!(backend.metrics_calls(), 1);
        sched.advance(1);
        assert_eq!(backend.metrics_calls(), 2);
        assert_eq!(hook.state().phase, LoadPhase::Ready);
        assert!(hook.state().error.is_none());
    }

    #[test]
    fn test_dashboard_retry_superseded_by_manual_refresh() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        backend.fail_reads(1);
        let hook = DashboardHook::mount(&ctx, &Backend::shared(backend.clone()));
        sched.run_until_idle();
        assert!(hook.has_pending_retry());

        sched.advance(2_000);
        block_on(hook.refresh()).unwrap();
        assert_eq!(backend.metrics_calls(), 2);
        assert!(!hook.has_pending_retry());

        sched.advance(3_000);
        sched.advance(10_000);
        assert_eq!(backend.metrics_calls(), 2);
    }

    #[test]
    fn test_dashboard_failed_retry_does_not_reschedule() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        backend.fail_reads(2);
        let hook = DashboardHook::mount(&ctx, &Backend::shared(backend.clone()));
        sched.run_until_idle();

        sched.advance(5_000);
        assert_eq!(backend.metrics_calls(), 2);
        assert_eq!(hook.state().phase, LoadPhase::Error);
        assert!(!hook.has_pending_retry());

        sched.advance(30_000);
        assert_eq!(backend.metrics_calls(), 2);
    }

    #[test]
    fn test_dashboard_refreshes_on_every_domain_event() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let _hook = DashboardHook::mount(&ctx, &Backend::shared(backend.clone()));
        sched.run_until_idle();

        for name in event::DASHBOARD_EVENTS {
            ctx.event_bus.emit(name, &Value::Null);
        }
        sched.run_until_idle();
        assert_eq!(backend.metrics_calls(), 1 + event::DASHBOARD_EVENTS.len() as u32);
        assert_eq!(backend.last_mode(), Some(FetchMode::Force));
    }

    #[test]
    fn test_dashboard_refreshes_on_cache_keys() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let _hook = DashboardHook::mount(&ctx, &Backend::shared(backend.clone()));
        sched.run_until_idle();

        ctx.cache.invalidate(keys::DASHBOARD);
        ctx.cache.invalidate(keys::PROJECTS);
        sched.run_until_idle();
        assert_eq!(backend.metrics_calls(), 3);
    }

    #[test]
    fn test_dashboard_picks_up_invalidation_raised_before_mount() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        ctx.cache.invalidate(keys::DASHBOARD);

        let _hook = DashboardHook::mount(&ctx, &Backend::shared(backend.clone()));
        sched.run_until_idle();
        assert_eq!(backend.metrics_calls(), 2);
        assert!(!ctx.cache.is_pending(keys::DASHBOARD));
    }

    /// Loader that counts loads and shows nothing
    struct CountingLoader {
        loads: Rc<Cell<u32>>,
    }

    #[async_trait(?Send)]
    impl ViewLoader for CountingLoader {
        type View = u32;

        fn name(&self) -> String {
            "counting".to_string()
        }

        async fn load(&self, _mode: FetchMode) -> budget_types::Result<u32> {
            self.loads.set(self.loads.get() + 1);
            Ok(self.loads.get())
        }
    }

    #[test]
    fn test_project_invalidation_reaches_dashboard_only_subscriber() {
        let (sched, _page, ctx) = setup(quiet_config());
        let (loads, l) = counter();
        let options = ViewOptions::from_config(&ctx.config).with_cache_keys(&[keys::DASHBOARD]);
        let view = SyncedView::mount(&ctx, CountingLoader { loads: l }, options);
        sched.run_until_idle();
        assert_eq!(loads.get(), 1);

        ctx.notifier().invalidate_project_caches(None);
        sched.run_until_idle();
        assert_eq!(loads.get(), 2);
        assert_eq!(view.data(), 2);
        // The projects key was invalidated too; nobody listens, so it waits.
        assert!(ctx.cache.is_pending(keys::PROJECTS));
    }

    #[test]
    fn test_dashboard_unmount_releases_everything() {
        let (sched, page, ctx) = setup(SyncConfig::default());
        let backend = seeded_backend();
        let hook = DashboardHook::mount(&ctx, &Backend::shared(backend.clone()));
        sched.run_until_idle();
        assert_eq!(page.listener_count(), 2);
        assert_eq!(sched.pending_timers(), 1);
        assert_eq!(ctx.cache.callback_count(keys::DASHBOARD), 1);

        drop(hook);
        for name in event::DASHBOARD_EVENTS {
            assert_eq!(ctx.event_bus.listener_count(name), 0);
        }
        assert_eq!(ctx.cache.callback_count(keys::DASHBOARD), 0);
        assert_eq!(ctx.cache.callback_count(keys::PROJECTS), 0);
        assert_eq!(page.listener_count(), 0);
        assert_eq!(sched.pending_timers(), 0);

        ctx.event_bus.emit(event::PROJECT_UPDATED, &Value::Null);
        ctx.cache.invalidate(keys::DASHBOARD);
        sched.advance(120_000);
        assert_eq!(backend.metrics_calls(), 1);
    }

    #[test]
    fn test_unmount_ignores_late_completion() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        backend.hold_reads(true);
        let hook = DashboardHook::mount(&ctx, &Backend::shared(backend.clone()));
        sched.run_until_idle();
        assert_eq!(hook.state().phase, LoadPhase::Loading);

        hook.unmount();
        assert!(!hook.is_mounted());
        assert!(backend.release_next_read());
        sched.run_until_idle();
        assert_eq!(hook.state().phase, LoadPhase::Loading);
        assert!(hook.state().data.dashboard_data.is_none());
    }

    #[test]
    fn test_dashboard_auto_refresh_on_interval_and_focus() {
        let config = SyncConfig {
            refresh: RefreshConfig {
                interval_ms: 60_000,
                refresh_on_focus: true,
                refresh_on_visibility_change: false,
            },
            ..Default::default()
        };
        let (sched, page, ctx) = setup(config);
        let backend = seeded_backend();
        let _hook = DashboardHook::mount(&ctx, &Backend::shared(backend.clone()));
        sched.run_until_idle();

        sched.advance(31_000);
        page.fire(PageSignal::Focus);
        sched.run_until_idle();
        assert_eq!(backend.metrics_calls(), 2);

        // Interval fires regardless of the focus refresh 29s earlier.
        sched.advance(29_000);
        assert_eq!(backend.metrics_calls(), 3);
    }

    #[test]
    fn test_overlapping_refreshes_last_to_resolve_wins() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        backend.hold_reads(true);
        let hook = Rc::new(DashboardHook::mount(&ctx, &Backend::shared(backend.clone())));
        sched.run_until_idle();

        backend.set_status("p1", ProjectStatus::Completed);
        let h = hook.clone();
        sched.spawn(Box::pin(async move {
            let _ = h.refresh().await;
        }));
        sched.run_until_idle();
        assert_eq!(backend.held_reads(), 2);

        // Release the newer request first; the older, stale one lands last.
        assert!(backend.release_newest_read());
        sched.run_until_idle();
        assert_eq!(hook.data().project("p1").unwrap().status, ProjectStatus::Completed);

        backend.release_next_read();
        sched.run_until_idle();
        assert_eq!(hook.data().project("p1").unwrap().status, ProjectStatus::InProgress);
    }

    #[test]
    fn test_single_flight_coalesces_refreshes() {
        let config = SyncConfig {
            single_flight: true,
            ..quiet_config()
        };
        let (sched, _page, ctx) = setup(config);
        let backend = seeded_backend();
        backend.hold_reads(true);
        let _hook = DashboardHook::mount(&ctx, &Backend::shared(backend.clone()));
        sched.run_until_idle();

        ctx.event_bus.emit(event::PROJECT_UPDATED, &Value::Null);
        ctx.event_bus.emit(event::PROJECT_CREATED, &Value::Null);
        sched.run_until_idle();
        assert_eq!(backend.metrics_calls(), 1);

        backend.release_next_read();
        sched.run_until_idle();
        assert_eq!(backend.metrics_calls(), 2);

        backend.release_next_read();
        sched.run_until_idle();
        assert_eq!(backend.metrics_calls(), 2);
        assert_eq!(backend.held_reads(), 0);
    }

    // ─── Optimistic Update Tests ─────────────────────────────

    #[test]
    fn test_optimistic_update_reverts_on_write_failure() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let hook = Rc::new(DashboardHook::mount(&ctx, &Backend::shared(backend.clone())));
        sched.run_until_idle();

        backend.fail_writes(true);
        backend.hold_reads(true);
        let outcome = Rc::new(RefCell::new(None));
        let (h, o) = (hook.clone(), outcome.clone());
        sched.spawn(Box::pin(async move {
            let result = h.update_project_status("p1", ProjectStatus::Completed).await;
            *o.borrow_mut() = Some(result);
        }));
        sched.run_until_idle();

        // Optimistic state is visible while the resync is in flight.
        let view = hook.data();
        assert_eq!(view.project("p1").unwrap().status, ProjectStatus::Completed);
        let data = view.dashboard_data.unwrap();
        assert_eq!(data.completed_projects, 2);
        assert_eq!(data.in_progress_projects, 0);
        assert_eq!(backend.metrics_calls(), 2);

        backend.release_next_read();
        sched.run_until_idle();
        assert_eq!(hook.data().project("p1").unwrap().status, ProjectStatus::InProgress);
        assert_eq!(hook.data().dashboard_data.unwrap().in_progress_projects, 1);
        assert!(matches!(*outcome.borrow(), Some(Err(BudgetError::Network(_)))));
        assert!(!hook.has_pending_confirmation());
    }

    #[test]
    fn test_optimistic_update_rejected_write_emits_nothing() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let hook = DashboardHook::mount(&ctx, &Backend::shared(backend.clone()));
        sched.run_until_idle();
        let (events, e) = counter();
        let _sub = ctx.event_bus.subscribe(event::PROJECT_STATUS_CHANGED, move |_| {
            e.set(e.get() + 1);
            Ok(())
        });

        backend.reject_writes(true);
        let result = block_on(hook.update_project_status("p1", ProjectStatus::Cancelled));
        assert!(matches!(result, Err(BudgetError::Rejected(_))));
        sched.run_until_idle();

        assert_eq!(events.get(), 0);
        assert!(!ctx.cache.is_pending(&keys::project("p1")));
        // Mount plus the one resync
        assert_eq!(backend.metrics_calls(), 2);
        assert_eq!(hook.data().project("p1").unwrap().status, ProjectStatus::InProgress);
    }

    #[test]
    fn test_optimistic_update_success_confirms_later() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let hook = DashboardHook::mount(&ctx, &Backend::shared(backend.clone()));
        sched.run_until_idle();

        let updated = block_on(hook.update_project_status("p1", ProjectStatus::Completed)).unwrap();
        assert_eq!(updated.status, ProjectStatus::Completed);
        assert_eq!(hook.data().project("p1").unwrap().status, ProjectStatus::Completed);
        assert!(hook.has_pending_confirmation());

        // dashboard key, projects key and the status event each refresh once.
        sched.run_until_idle();
        assert_eq!(backend.metrics_calls(), 4);

        sched.advance(999);
        assert_eq!(backend.metrics_calls(), 4);
        sched.advance(1);
        assert_eq!(backend.metrics_calls(), 5);
        assert!(!hook.has_pending_confirmation());
        assert_eq!(hook.data().dashboard_data.unwrap().completed_projects, 2);
    }

    #[test]
    fn test_optimistic_update_unknown_project_still_writes() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let hook = DashboardHook::mount(&ctx, &Backend::shared(backend.clone()));
        sched.run_until_idle();

        let result = block_on(hook.update_project_status("ghost", ProjectStatus::Completed));
        assert!(result.is_err());
        assert_eq!(backend.write_calls(), 1);
    }

    fn detail_status(hook: &ProjectDashboardHook) -> ProjectStatus {
        hook.data().detail.unwrap().summary.status
    }

    #[test]
    fn test_status_update_patches_dashboard_and_project_views() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let api = Backend::shared(backend.clone());
        let dashboard = DashboardHook::mount(&ctx, &api);
        let project_view = ProjectDashboardHook::mount(&ctx, &api, "p1");
        sched.run_until_idle();
        let service = ProjectService::new(api.projects.clone(), ctx.notifier());
        let detail_calls = backend.detail_calls();

        let updated = block_on(update_project_status_in_views(
            Some(&dashboard),
            Some(&project_view),
            &service,
            "p1",
            ProjectStatus::Completed,
        ))
        .unwrap();
        assert_eq!(updated.status, ProjectStatus::Completed);
        assert_eq!(backend.write_calls(), 1);

        // Both views show the change before any refetch has run.
        assert_eq!(backend.detail_calls(), detail_calls);
        assert_eq!(dashboard.data().project("p1").unwrap().status, ProjectStatus::Completed);
        assert_eq!(detail_status(&project_view), ProjectStatus::Completed);
        assert!(dashboard.has_pending_confirmation());
        assert!(project_view.has_pending_confirmation());

        sched.run_until_idle();
        sched.advance(1_000);
        assert!(!project_view.has_pending_confirmation());
        assert_eq!(detail_status(&project_view), ProjectStatus::Completed);
    }

    #[test]
    fn test_status_update_failure_resyncs_both_views() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let api = Backend::shared(backend.clone());
        let dashboard = DashboardHook::mount(&ctx, &api);
        let project_view = ProjectDashboardHook::mount(&ctx, &api, "p1");
        sched.run_until_idle();
        let service = ProjectService::new(api.projects.clone(), ctx.notifier());
        let detail_calls = backend.detail_calls();

        backend.fail_writes(true);
        let result = block_on(update_project_status_in_views(
            Some(&dashboard),
            Some(&project_view),
            &service,
            "p1",
            ProjectStatus::Cancelled,
        ));
        assert!(matches!(result, Err(BudgetError::Network(_))));

        assert_eq!(backend.detail_calls(), detail_calls + 1);
        assert_eq!(dashboard.data().project("p1").unwrap().status, ProjectStatus::InProgress);
        assert_eq!(detail_status(&project_view), ProjectStatus::InProgress);
        assert!(!dashboard.has_pending_confirmation());
        assert!(!project_view.has_pending_confirmation());
    }

    #[test]
    fn test_status_update_skips_project_view_for_other_id() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let api = Backend::shared(backend.clone());
        let project_view = ProjectDashboardHook::mount(&ctx, &api, "p2");
        sched.run_until_idle();
        let service = ProjectService::new(api.projects.clone(), ctx.notifier());

        block_on(update_project_status_in_views(None, Some(&project_view), &service, "p1", ProjectStatus::Cancelled))
            .unwrap();
        assert!(!project_view.has_pending_confirmation());
        assert_eq!(backend.project("p1").unwrap().status, ProjectStatus::Cancelled);
    }

    // ─── Project Dashboard Tests ─────────────────────────────

    #[test]
    fn test_project_dashboard_loads_detail() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        backend.seed_budgets(vec![Budget {
            id: "b1".to_string(),
            project_id: "p1".to_string(),
            category: "ค่าวัสดุ".to_string(),
            amount: 1200.0,
            spent: 300.0,
        }]);
        let hook = ProjectDashboardHook::mount(&ctx, &Backend::shared(backend.clone()), "p1");
        sched.run_until_idle();

        let view = hook.data();
        let detail = view.detail.as_ref().unwrap();
        assert_eq!(detail.summary.id, "p1");
        assert_eq!(detail.budget_lines.len(), 1);
        assert_eq!(view.budget_total(), 1200.0);
        assert_eq!(hook.project_id(), "p1");
    }

    #[test]
    fn test_project_dashboard_refreshes_on_own_key() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let _hook = ProjectDashboardHook::mount(&ctx, &Backend::shared(backend.clone()), "p1");
        sched.run_until_idle();

        ctx.cache.invalidate(&keys::project("p1"));
        sched.run_until_idle();
        assert_eq!(backend.detail_calls(), 2);

        // Another project's key is not ours.
        ctx.cache.invalidate(&keys::project("p2"));
        sched.run_until_idle();
        assert_eq!(backend.detail_calls(), 2);
    }

    #[test]
    fn test_project_dashboard_status_update() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let hook = ProjectDashboardHook::mount(&ctx, &Backend::shared(backend.clone()), "p1");
        sched.run_until_idle();

        block_on(hook.update_project_status(ProjectStatus::Completed)).unwrap();
        let view = hook.data();
        assert_eq!(view.detail.unwrap().summary.status, ProjectStatus::Completed);
        sched.advance(1_000);
        assert_eq!(backend.project("p1").unwrap().status, ProjectStatus::Completed);
        assert_eq!(hook.state().phase, LoadPhase::Ready);
    }

    #[test]
    fn test_status_change_reaches_every_mounted_view() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let api = Backend::shared(backend.clone());
        let dashboard = DashboardHook::mount(&ctx, &api);
        let project_view = ProjectDashboardHook::mount(&ctx, &api, "p2");
        sched.run_until_idle();

        block_on(project_view.update_project_status(ProjectStatus::Cancelled)).unwrap();
        sched.run_until_idle();

        let data = dashboard.data();
        assert_eq!(data.project("p2").unwrap().status, ProjectStatus::Cancelled);
        assert_eq!(data.dashboard_data.unwrap().cancelled_projects, 1);
    }

    // ─── Budget Hook Tests ───────────────────────────────────

    #[test]
    fn test_budget_hook_follows_budget_service() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let api = Backend::shared(backend.clone());
        let hook = mount_budgets(&ctx, &api);
        sched.run_until_idle();
        assert!(hook.data().budgets.is_empty());

        let service = BudgetService::new(api.budgets.clone(), ctx.notifier());
        let draft = BudgetDraft {
            project_id: "p1".to_string(),
            category: "ค่าแรง".to_string(),
            amount: 800.0,
        };
        block_on(service.create(&draft)).unwrap();
        sched.run_until_idle();

        let view = hook.data();
        assert_eq!(view.budgets.len(), 1);
        assert_eq!(view.total_allocated(), 800.0);
        assert_eq!(view.for_project("p1").count(), 1);
        assert!(backend.budget_calls() >= 2);
    }

    #[test]
    fn test_budget_view_over_budget() {
        let view = BudgetView {
            budgets: vec![
                Budget { id: "b1".into(), project_id: "p1".into(), category: "a".into(), amount: 10.0, spent: 20.0 },
                Budget { id: "b2".into(), project_id: "p2".into(), category: "b".into(), amount: 10.0, spent: 5.0 },
            ],
        };
        assert_eq!(view.over_budget().len(), 1);
        assert_eq!(view.total_spent(), 25.0);
    }

    // ─── Service Tests ───────────────────────────────────────

    #[test]
    fn test_failed_write_does_not_invalidate() {
        let (_sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        backend.fail_writes(true);
        let (events, e) = counter();
        let _sub = ctx.event_bus.subscribe(event::PROJECT_DELETED, move |_| {
            e.set(e.get() + 1);
            Ok(())
        });
        let service = ProjectService::new(Backend::shared(backend.clone()).projects, ctx.notifier());

        assert!(block_on(service.delete("p1")).is_err());
        assert_eq!(events.get(), 0);
        assert!(ctx.cache.snapshot().pending.is_empty());
        assert!(backend.project("p1").is_some());
    }

    #[test]
    fn test_project_create_emits_after_success() {
        let (_sched, _page, ctx) = setup(quiet_config());
        let backend = MemoryBackend::new();
        let seen = Rc::new(RefCell::new(Value::Null));
        let s = seen.clone();
        let _sub = ctx.event_bus.subscribe(event::PROJECT_CREATED, move |payload| {
            *s.borrow_mut() = payload.clone();
            Ok(())
        });
        let service = ProjectService::new(Backend::shared(backend.clone()).projects, ctx.notifier());
        let draft = budget_types::project::ProjectDraft {
            name: "ตลาดนัด".to_string(),
            status: ProjectStatus::Pending,
            budget: 500.0,
            description: None,
        };

        let created = block_on(service.create(&draft)).unwrap();
        assert_eq!(seen.borrow()["id"], json!(created.id));
        let pending = ctx.cache.snapshot().pending;
        assert!(pending.contains(&keys::DASHBOARD.to_string()));
        assert!(pending.contains(&keys::project(&created.id)));
    }

    #[test]
    fn test_status_changed_payload() {
        let (_sched, _page, ctx) = setup(quiet_config());
        let seen = Rc::new(RefCell::new(Value::Null));
        let s = seen.clone();
        let _sub = ctx.event_bus.subscribe(event::PROJECT_STATUS_CHANGED, move |payload| {
            *s.borrow_mut() = payload.clone();
            Ok(())
        });
        ctx.notifier().emit_project_status_changed("p1", ProjectStatus::Completed);
        assert_eq!(*seen.borrow(), json!({ "id": "p1", "status": "เสร็จแล้ว" }));
    }

    #[test]
    fn test_entry_service_invalidates_dependent_keys() {
        let (_sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let service = EntryService::new(Backend::shared(backend.clone()).entries, ctx.notifier());
        let draft = EntryDraft {
            project_id: "p1".to_string(),
            kind: EntryKind::Expense,
            amount: 120.0,
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            description: "ค่าขนส่ง".to_string(),
        };

        block_on(service.record(&draft)).unwrap();
        let mut pending = ctx.cache.snapshot().pending;
        pending.sort();
        assert_eq!(
            pending,
            vec![
                keys::BUDGETS.to_string(),
                keys::DASHBOARD.to_string(),
                keys::project("p1"),
                keys::PROJECTS.to_string(),
            ]
        );
        assert_eq!(backend.project("p1").unwrap().total_expenses, 120.0);
    }

    #[test]
    fn test_dashboard_refresh_needed_reaches_budget_and_dashboard_views() {
        let (sched, _page, ctx) = setup(quiet_config());
        let backend = seeded_backend();
        let api = Backend::shared(backend.clone());
        let _dashboard = DashboardHook::mount(&ctx, &api);
        let _budgets = mount_budgets(&ctx, &api);
        sched.run_until_idle();

        assert_eq!(ctx.notifier().emit_dashboard_refresh_needed(), 2);
        sched.run_until_idle();
        assert_eq!(backend.metrics_calls(), 2);
        assert_eq!(backend.budget_calls(), 2);
    }

    // ─── ManualScheduler Tests ───────────────────────────────

    #[test]
    fn test_manual_scheduler_orders_timers() {
        let sched = ManualScheduler::new(0);
        let order = Rc::new(RefCell::new(Vec::new()));
        let (o1, o2, o3) = (order.clone(), order.clone(), order.clone());
        sched.set_timeout(200, Box::new(move || o1.borrow_mut().push("late")));
        sched.set_timeout(100, Box::new(move || o2.borrow_mut().push("early")));
        let cancelled = sched.set_timeout(50, Box::new(move || o3.borrow_mut().push("cancelled")));
        sched.clear(cancelled);

        sched.advance(150);
        assert_eq!(*order.borrow(), vec!["early"]);
        assert_eq!(sched.now_ms(), 150);
        sched.advance(50);
        assert_eq!(*order.borrow(), vec!["early", "late"]);
    }

    #[test]
    fn test_manual_scheduler_interval_rearms() {
        let sched = ManualScheduler::new(0);
        let (count, c) = counter();
        let handle = sched.set_interval(100, Rc::new(move || c.set(c.get() + 1)));
        sched.advance(350);
        assert_eq!(count.get(), 3);
        sched.clear(handle);
        sched.advance(1_000);
        assert_eq!(count.get(), 3);
    }
}
