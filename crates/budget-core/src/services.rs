//! Mutation side: services wrap the backend write ports and, only after the
//! backend confirms a write, invalidate cache keys and emit domain events so
//! every mounted view converges without waiting for its timer.

use std::rc::Rc;

use budget_types::{
    Result,
    budget::{Budget, BudgetDraft},
    entry::{Entry, EntryDraft, EntryKind},
    event::{self, keys},
    project::{ProjectDraft, ProjectStatus, ProjectSummary},
};
use serde_json::{json, Value};

use crate::cache_manager::CacheManager;
use crate::event_bus::EventBus;
use crate::ports::{BudgetPort, EntryPort, ProjectPort};

// ─── Notifier ────────────────────────────────────────────────

/// Emit and invalidate helpers shared by all services.
#[derive(Clone)]
pub struct SyncNotifier {
    bus: EventBus,
    cache: CacheManager,
}

impl SyncNotifier {
    pub fn new(bus: EventBus, cache: CacheManager) -> Self {
        Self { bus, cache }
    }

    pub fn emit_project_updated(&self, project: &ProjectSummary) {
        self.bus.emit(event::PROJECT_UPDATED, &json!(project));
    }

    pub fn emit_project_status_changed(&self, id: &str, status: ProjectStatus) {
        self.bus
            .emit(event::PROJECT_STATUS_CHANGED, &json!({ "id": id, "status": status }));
    }

    pub fn emit_project_created(&self, project: &ProjectSummary) {
        self.bus.emit(event::PROJECT_CREATED, &json!(project));
    }

    pub fn emit_project_deleted(&self, id: &str) {
        self.bus.emit(event::PROJECT_DELETED, &json!({ "id": id }));
    }

    pub fn emit_dashboard_refresh_needed(&self) -> usize {
        self.bus.emit(event::DASHBOARD_REFRESH_NEEDED, &Value::Null)
    }

    pub fn emit_budget_created(&self, budget: &Budget) {
        self.bus.emit(event::BUDGET_CREATED, &json!(budget));
    }

    pub fn emit_budget_updated(&self, budget: &Budget) {
        self.bus.emit(event::BUDGET_UPDATED, &json!(budget));
    }

    pub fn emit_budget_deleted(&self, id: &str) {
        self.bus.emit(event::BUDGET_DELETED, &json!({ "id": id }));
    }

    /// `dashboard`, `projects`, and the project's own key when given
    pub fn invalidate_project_caches(&self, project_id: Option<&str>) -> usize {
        let mut targets = vec![keys::DASHBOARD.to_string(), keys::PROJECTS.to_string()];
        if let Some(id) = project_id {
            targets.push(keys::project(id));
        }
        self.cache.invalidate_multiple(&targets)
    }

    pub fn invalidate_budget_caches(&self) -> usize {
        self.cache.invalidate_multiple(&[keys::BUDGETS, keys::DASHBOARD])
    }

    /// Sales and expenses move project totals, budget spend and the dashboard.
    pub fn invalidate_entry_caches(&self, project_id: &str) -> usize {
        self.cache.invalidate_multiple(&[
            keys::DASHBOARD.to_string(),
            keys::PROJECTS.to_string(),
            keys::BUDGETS.to_string(),
            keys::project(project_id),
        ])
    }
}

// ─── Project Service ─────────────────────────────────────────

#[derive(Clone)]
pub struct ProjectService {
    api: Rc<dyn ProjectPort>,
    notifier: SyncNotifier,
}

impl ProjectService {
    pub fn new(api: Rc<dyn ProjectPort>, notifier: SyncNotifier) -> Self {
        Self { api, notifier }
    }

    pub async fn update_status(&self, id: &str, status: ProjectStatus) -> Result<ProjectSummary> {
        let project = self.api.update_project_status(id, status).await?;
        log::info!("Project {} status -> {}", id, status.label());
        self.notifier.invalidate_project_caches(Some(id));
        self.notifier.emit_project_status_changed(id, status);
        Ok(project)
    }

    pub async fn create(&self, draft: &ProjectDraft) -> Result<ProjectSummary> {
        let project = self.api.create_project(draft).await?;
        self.notifier.invalidate_project_caches(Some(&project.id));
        self.notifier.emit_project_created(&project);
        Ok(project)
    }

    pub async fn update(&self, id: &str, draft: &ProjectDraft) -> Result<ProjectSummary> {
        let project = self.api.update_project(id, draft).await?;
        self.notifier.invalidate_project_caches(Some(id));
        self.notifier.emit_project_updated(&project);
        Ok(project)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.api.delete_project(id).await?;
        self.notifier.invalidate_project_caches(Some(id));
        self.notifier.emit_project_deleted(id);
        Ok(())
    }
}

// ─── Budget Service ──────────────────────────────────────────

#[derive(Clone)]
pub struct BudgetService {
    api: Rc<dyn BudgetPort>,
    notifier: SyncNotifier,
}

impl BudgetService {
    pub fn new(api: Rc<dyn BudgetPort>, notifier: SyncNotifier) -> Self {
        Self { api, notifier }
    }

    pub async fn create(&self, draft: &BudgetDraft) -> Result<Budget> {
        let budget = self.api.create_budget(draft).await?;
        self.notifier.invalidate_budget_caches();
        self.notifier.emit_budget_created(&budget);
        Ok(budget)
    }

    pub async fn update(&self, id: &str, draft: &BudgetDraft) -> Result<Budget> {
        let budget = self.api.update_budget(id, draft).await?;
        self.notifier.invalidate_budget_caches();
        self.notifier.emit_budget_updated(&budget);
        Ok(budget)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.api.delete_budget(id).await?;
        self.notifier.invalidate_budget_caches();
        self.notifier.emit_budget_deleted(id);
        Ok(())
    }
}

// ─── Entry Service ───────────────────────────────────────────

/// Sales and expense entries
#[derive(Clone)]
pub struct EntryService {
    api: Rc<dyn EntryPort>,
    notifier: SyncNotifier,
}

impl EntryService {
    pub fn new(api: Rc<dyn EntryPort>, notifier: SyncNotifier) -> Self {
        Self { api, notifier }
    }

    pub async fn record(&self, draft: &EntryDraft) -> Result<Entry> {
        let entry = self.api.create_entry(draft).await?;
        self.notifier.invalidate_entry_caches(&entry.project_id);
        Ok(entry)
    }

    pub async fn delete(&self, project_id: &str, kind: EntryKind, id: &str) -> Result<()> {
        self.api.delete_entry(kind, id).await?;
        self.notifier.invalidate_entry_caches(project_id);
        Ok(())
    }
}
