//! The JS-facing handle: owns the sync context, the REST backend and every
//! mounted view, and hands view state to the rendering layer as plain JS
//! objects.

use std::collections::HashMap;
use std::rc::Rc;

use gloo_utils::format::JsValueSerdeExt;
use js_sys::{Function, Promise};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use budget_core::hooks::{
    mount_budgets, update_project_status_in_views, BudgetHook, DashboardHook, ProjectDashboardHook,
};
use budget_core::ports::Backend;
use budget_core::services::{BudgetService, EntryService, ProjectService};
use budget_core::view::{SyncedView, ViewLoader, ViewState};
use budget_core::SyncContext;
use budget_platform::{debug, BrowserPageEvents, BrowserScheduler, RestClient};
use budget_types::{
    BudgetError,
    budget::BudgetDraft,
    config::SyncConfig,
    entry::{EntryDraft, EntryKind},
    project::{ProjectDraft, ProjectStatus},
};

#[wasm_bindgen]
pub struct DashboardApp {
    ctx: SyncContext,
    backend: Backend,
    dashboard: Option<Rc<DashboardHook>>,
    projects: HashMap<String, Rc<ProjectDashboardHook>>,
    budgets: Option<Rc<BudgetHook>>,
    debug_hooks: bool,
}

#[wasm_bindgen]
impl DashboardApp {
    /// Build from a JSON `SyncConfig`; an empty string uses the defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> std::result::Result<DashboardApp, JsValue> {
        let config = SyncConfig::from_json(config_json).map_err(to_js)?;
        let scheduler = BrowserScheduler::new();
        let page = BrowserPageEvents::new().map_err(to_js)?;
        let backend = Backend::shared(Rc::new(RestClient::new(&config.api)));
        let debug_hooks = config.debug_hooks;
        let ctx = SyncContext::new(scheduler, page, config);

        if debug_hooks {
            if let Err(e) = debug::install(ctx.notifier(), ctx.cache.clone()) {
                log::warn!("Debug hooks unavailable: {}", e);
            }
        }

        log::info!("Dashboard sync ready (api {})", ctx.config.api.base_url);
        Ok(Self {
            ctx,
            backend,
            dashboard: None,
            projects: HashMap::new(),
            budgets: None,
            debug_hooks,
        })
    }

    // ─── Mounting ────────────────────────────────────────────

    #[wasm_bindgen(js_name = mountDashboard)]
    pub fn mount_dashboard(&mut self) {
        if self.dashboard.is_none() {
            self.dashboard = Some(Rc::new(DashboardHook::mount(&self.ctx, &self.backend)));
        }
    }

    #[wasm_bindgen(js_name = unmountDashboard)]
    pub fn unmount_dashboard(&mut self) {
        self.dashboard = None;
    }

    #[wasm_bindgen(js_name = mountProject)]
    pub fn mount_project(&mut self, project_id: String) {
        if !self.projects.contains_key(&project_id) {
            let hook = ProjectDashboardHook::mount(&self.ctx, &self.backend, &project_id);
            self.projects.insert(project_id, Rc::new(hook));
        }
    }

    #[wasm_bindgen(js_name = unmountProject)]
    pub fn unmount_project(&mut self, project_id: &str) {
        self.projects.remove(project_id);
    }

    #[wasm_bindgen(js_name = mountBudgets)]
    pub fn mount_budgets(&mut self) {
        if self.budgets.is_none() {
            self.budgets = Some(Rc::new(mount_budgets(&self.ctx, &self.backend)));
        }
    }

    #[wasm_bindgen(js_name = unmountBudgets)]
    pub fn unmount_budgets(&mut self) {
        self.budgets = None;
    }

    /// Unmount every view and remove the console hooks.
    pub fn dispose(&mut self) {
        self.dashboard = None;
        self.projects.clear();
        self.budgets = None;
        if self.debug_hooks {
            debug::uninstall();
        }
        log::info!("Dashboard sync disposed");
    }

    // ─── State ───────────────────────────────────────────────

    #[wasm_bindgen(js_name = dashboardState)]
    pub fn dashboard_state(&self) -> std::result::Result<JsValue, JsValue> {
        state_of(self.dashboard.as_deref().map(|hook| &**hook))
    }

    #[wasm_bindgen(js_name = projectState)]
    pub fn project_state(&self, project_id: &str) -> std::result::Result<JsValue, JsValue> {
        state_of(self.projects.get(project_id).map(|hook| &***hook))
    }

    #[wasm_bindgen(js_name = budgetState)]
    pub fn budget_state(&self) -> std::result::Result<JsValue, JsValue> {
        state_of(self.budgets.as_deref())
    }

    #[wasm_bindgen(js_name = cacheSnapshot)]
    pub fn cache_snapshot(&self) -> std::result::Result<JsValue, JsValue> {
        to_value(&self.ctx.cache.snapshot())
    }

    /// Call `callback(state)` whenever the dashboard view changes.
    #[wasm_bindgen(js_name = onDashboardChange)]
    pub fn on_dashboard_change(&self, callback: Function) {
        if let Some(hook) = &self.dashboard {
            forward_changes(&***hook, callback);
        }
    }

    #[wasm_bindgen(js_name = onProjectChange)]
    pub fn on_project_change(&self, project_id: &str, callback: Function) {
        if let Some(hook) = self.projects.get(project_id) {
            forward_changes(&***hook, callback);
        }
    }

    #[wasm_bindgen(js_name = onBudgetChange)]
    pub fn on_budget_change(&self, callback: Function) {
        if let Some(hook) = &self.budgets {
            forward_changes(&**hook, callback);
        }
    }

    // ─── Refresh ─────────────────────────────────────────────

    #[wasm_bindgen(js_name = refreshDashboard)]
    pub fn refresh_dashboard(&self) -> Promise {
        let hook = self.dashboard.clone();
        future_to_promise(async move {
            if let Some(hook) = hook {
                hook.refresh().await.map_err(to_js)?;
            }
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = refreshProject)]
    pub fn refresh_project(&self, project_id: &str) -> Promise {
        let hook = self.projects.get(project_id).cloned();
        future_to_promise(async move {
            if let Some(hook) = hook {
                hook.refresh().await.map_err(to_js)?;
            }
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = refreshBudgets)]
    pub fn refresh_budgets(&self) -> Promise {
        let hook = self.budgets.clone();
        future_to_promise(async move {
            if let Some(hook) = hook {
                hook.refresh().await.map_err(to_js)?;
            }
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Raise `dashboard:refresh_needed`; returns how many listeners it reached.
    #[wasm_bindgen(js_name = notifyDashboardRefresh)]
    pub fn notify_dashboard_refresh(&self) -> u32 {
        self.ctx.notifier().emit_dashboard_refresh_needed() as u32
    }

    // ─── Mutations ───────────────────────────────────────────

    /// Optimistic in every mounted view showing the project. `status` is
    /// the wire value, e.g. `"เสร็จแล้ว"`.
    #[wasm_bindgen(js_name = updateProjectStatus)]
    pub fn update_project_status(&self, project_id: String, status: &str) -> std::result::Result<Promise, JsValue> {
        let status: ProjectStatus =
            serde_json::from_value(Value::String(status.to_string())).map_err(|e| to_js(e.into()))?;
        let dashboard = self.dashboard.clone();
        let project_view = self.projects.get(&project_id).cloned();
        let service = self.project_service();

        Ok(future_to_promise(async move {
            let updated = update_project_status_in_views(
                dashboard.as_deref(),
                project_view.as_deref(),
                &service,
                &project_id,
                status,
            )
            .await
            .map_err(to_js)?;
            to_value(&updated)
        }))
    }

    #[wasm_bindgen(js_name = createProject)]
    pub fn create_project(&self, draft_json: &str) -> std::result::Result<Promise, JsValue> {
        let draft: ProjectDraft = parse(draft_json)?;
        let service = self.project_service();
        Ok(future_to_promise(async move {
            let project = service.create(&draft).await.map_err(to_js)?;
            to_value(&project)
        }))
    }

    #[wasm_bindgen(js_name = updateProject)]
    pub fn update_project(&self, project_id: String, draft_json: &str) -> std::result::Result<Promise, JsValue> {
        let draft: ProjectDraft = parse(draft_json)?;
        let service = self.project_service();
        Ok(future_to_promise(async move {
            let project = service.update(&project_id, &draft).await.map_err(to_js)?;
            to_value(&project)
        }))
    }

    #[wasm_bindgen(js_name = deleteProject)]
    pub fn delete_project(&self, project_id: String) -> Promise {
        let service = self.project_service();
        future_to_promise(async move {
            service.delete(&project_id).await.map_err(to_js)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = createBudget)]
    pub fn create_budget(&self, draft_json: &str) -> std::result::Result<Promise, JsValue> {
        let draft: BudgetDraft = parse(draft_json)?;
        let service = self.budget_service();
        Ok(future_to_promise(async move {
            let budget = service.create(&draft).await.map_err(to_js)?;
            to_value(&budget)
        }))
    }

    #[wasm_bindgen(js_name = updateBudget)]
    pub fn update_budget(&self, budget_id: String, draft_json: &str) -> std::result::Result<Promise, JsValue> {
        let draft: BudgetDraft = parse(draft_json)?;
        let service = self.budget_service();
        Ok(future_to_promise(async move {
            let budget = service.update(&budget_id, &draft).await.map_err(to_js)?;
            to_value(&budget)
        }))
    }

    #[wasm_bindgen(js_name = deleteBudget)]
    pub fn delete_budget(&self, budget_id: String) -> Promise {
        let service = self.budget_service();
        future_to_promise(async move {
            service.delete(&budget_id).await.map_err(to_js)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Record a sale or expense.
    #[wasm_bindgen(js_name = recordEntry)]
    pub fn record_entry(&self, draft_json: &str) -> std::result::Result<Promise, JsValue> {
        let draft: EntryDraft = parse(draft_json)?;
        let service = self.entry_service();
        Ok(future_to_promise(async move {
            let entry = service.record(&draft).await.map_err(to_js)?;
            to_value(&entry)
        }))
    }

    /// `kind` is `"sales"` or `"expense"`.
    #[wasm_bindgen(js_name = deleteEntry)]
    pub fn delete_entry(&self, project_id: String, kind: &str, entry_id: String) -> std::result::Result<Promise, JsValue> {
        let kind: EntryKind =
            serde_json::from_value(Value::String(kind.to_string())).map_err(|e| to_js(e.into()))?;
        let service = self.entry_service();
        Ok(future_to_promise(async move {
            service.delete(&project_id, kind, &entry_id).await.map_err(to_js)?;
            Ok(JsValue::UNDEFINED)
        }))
    }
}

impl DashboardApp {
    fn project_service(&self) -> ProjectService {
        ProjectService::new(self.backend.projects.clone(), self.ctx.notifier())
    }

    fn budget_service(&self) -> BudgetService {
        BudgetService::new(self.backend.budgets.clone(), self.ctx.notifier())
    }

    fn entry_service(&self) -> EntryService {
        EntryService::new(self.backend.entries.clone(), self.ctx.notifier())
    }
}

// ─── Conversion helpers ──────────────────────────────────────

fn to_js(e: BudgetError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_value<T: Serialize>(value: &T) -> std::result::Result<JsValue, JsValue> {
    JsValue::from_serde(value).map_err(|e| to_js(e.into()))
}

fn parse<T: DeserializeOwned>(json: &str) -> std::result::Result<T, JsValue> {
    serde_json::from_str(json).map_err(|e| to_js(e.into()))
}

fn state_of<L>(view: Option<&SyncedView<L>>) -> std::result::Result<JsValue, JsValue>
where
    L: ViewLoader,
    L::View: Serialize,
{
    match view {
        Some(view) => to_value(&view.state()),
        None => Ok(JsValue::NULL),
    }
}

/// Route view changes to a JS callback. A throwing callback is logged.
fn forward_changes<L>(view: &SyncedView<L>, callback: Function)
where
    L: ViewLoader,
    L::View: Serialize,
{
    view.on_change(move |state: &ViewState<L::View>| match JsValue::from_serde(state) {
        Ok(value) => {
            if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                log::error!("View change callback threw: {:?}", e);
            }
        }
        Err(e) => log::error!("Failed to serialize view state: {}", e),
    });
}
