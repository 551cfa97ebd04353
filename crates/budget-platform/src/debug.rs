//! Developer-console helpers attached to `window`:
//! - `testDashboardSync()` raises `dashboard:refresh_needed` and invalidates
//!   the dashboard and project keys, returning how many callbacks it reached
//! - `debugCache()` returns the cache manager's registered and pending keys

use gloo_utils::format::JsValueSerdeExt;
use wasm_bindgen::prelude::*;

use budget_core::cache_manager::CacheManager;
use budget_core::services::SyncNotifier;
use budget_types::{BudgetError, Result};

pub const TEST_SYNC_HOOK: &str = "testDashboardSync";
pub const DEBUG_CACHE_HOOK: &str = "debugCache";

/// Install both hooks. The closures live for the rest of the page.
pub fn install(notifier: SyncNotifier, cache: CacheManager) -> Result<()> {
    let window = web_sys::window().ok_or_else(|| BudgetError::JsInterop("No window".to_string()))?;

    let test_sync = Closure::wrap(Box::new(move || -> u32 {
        log::info!("Manual dashboard sync triggered from console");
        let reached = notifier.emit_dashboard_refresh_needed() + notifier.invalidate_project_caches(None);
        reached as u32
    }) as Box<dyn FnMut() -> u32>);

    let debug_cache = Closure::wrap(Box::new(move || -> JsValue {
        let snapshot = cache.snapshot();
        log::info!("Cache state: {:?}", snapshot);
        JsValue::from_serde(&snapshot).unwrap_or(JsValue::NULL)
    }) as Box<dyn FnMut() -> JsValue>);

    set_global(&window, TEST_SYNC_HOOK, test_sync.as_ref())?;
    set_global(&window, DEBUG_CACHE_HOOK, debug_cache.as_ref())?;
    test_sync.forget();
    debug_cache.forget();

    log::info!("Debug hooks installed: window.{}(), window.{}()", TEST_SYNC_HOOK, DEBUG_CACHE_HOOK);
    Ok(())
}

/// Remove both hooks from `window`.
pub fn uninstall() {
    let Some(window) = web_sys::window() else {
        return;
    };
    for name in [TEST_SYNC_HOOK, DEBUG_CACHE_HOOK] {
        let _ = js_sys::Reflect::delete_property(&window, &JsValue::from_str(name));
    }
}

fn set_global(window: &web_sys::Window, name: &str, value: &JsValue) -> Result<()> {
    js_sys::Reflect::set(window, &JsValue::from_str(name), value)
        .map(|_| ())
        .map_err(|e| BudgetError::JsInterop(format!("Failed to set window.{}: {:?}", name, e)))
}
