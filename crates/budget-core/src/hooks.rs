//! The concrete dashboard views: the main dashboard, a single project's
//! dashboard, and the budget list.

use std::ops::Deref;
use std::rc::Rc;

use async_trait::async_trait;
use budget_types::{
    Result,
    budget::Budget,
    dashboard::DashboardData,
    event::{self, keys},
    project::{ProjectDetail, ProjectStatus, ProjectSummary},
};
use serde::Serialize;

use crate::context::SyncContext;
use crate::ports::{Backend, BudgetPort, DashboardPort, FetchMode, ProjectPort};
use crate::services::ProjectService;
use crate::view::{SyncedView, ViewLoader, ViewOptions};

// ─── Main dashboard ──────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardView {
    pub dashboard_data: Option<DashboardData>,
    pub project_summaries: Vec<ProjectSummary>,
}

impl DashboardView {
    /// Set a project's status and move the aggregate counters with it.
    /// Returns false if the project is not listed.
    pub fn apply_status(&mut self, id: &str, status: ProjectStatus) -> bool {
        let Some(project) = self.project_summaries.iter_mut().find(|p| p.id == id) else {
            return false;
        };
        let previous = std::mem::replace(&mut project.status, status);
        if let Some(data) = self.dashboard_data.as_mut() {
            data.shift_status(previous, status);
        }
        true
    }

    pub fn project(&self, id: &str) -> Option<&ProjectSummary> {
        self.project_summaries.iter().find(|p| p.id == id)
    }
}

pub struct DashboardLoader {
    dashboard: Rc<dyn DashboardPort>,
    projects: Rc<dyn ProjectPort>,
}

#[async_trait(?Send)]
impl ViewLoader for DashboardLoader {
    type View = DashboardView;

    fn name(&self) -> String {
        "dashboard".to_string()
    }

    async fn load(&self, mode: FetchMode) -> Result<DashboardView> {
        let (metrics, summaries) = futures::try_join!(
            self.dashboard.dashboard_metrics(mode),
            self.projects.project_summaries(mode),
        )?;
        Ok(DashboardView {
            dashboard_data: Some(metrics),
            project_summaries: summaries,
        })
    }
}

pub struct DashboardHook {
    view: SyncedView<DashboardLoader>,
    projects: ProjectService,
}

impl DashboardHook {
    pub fn mount(ctx: &SyncContext, backend: &Backend) -> Self {
        let loader = DashboardLoader {
            dashboard: backend.dashboard.clone(),
            projects: backend.projects.clone(),
        };
        let options = ViewOptions::from_config(&ctx.config)
            .with_events(event::DASHBOARD_EVENTS)
            .with_cache_keys(&[keys::DASHBOARD, keys::PROJECTS]);
        Self {
            view: SyncedView::mount(ctx, loader, options),
            projects: ProjectService::new(backend.projects.clone(), ctx.notifier()),
        }
    }

    /// Show the new status immediately, then persist it.
    pub async fn update_project_status(&self, id: &str, status: ProjectStatus) -> Result<ProjectSummary> {
        self.view
            .mutate_optimistic(
                |view| {
                    if !view.apply_status(id, status) {
                        log::debug!("Project {} not on dashboard; skipping optimistic update", id);
                    }
                },
                self.projects.update_status(id, status),
            )
            .await
    }
}

impl Deref for DashboardHook {
    type Target = SyncedView<DashboardLoader>;

    fn deref(&self) -> &Self::Target {
        &self.view
    }
}

// ─── Single project dashboard ────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectView {
    pub detail: Option<ProjectDetail>,
    pub project_summaries: Vec<ProjectSummary>,
}

impl ProjectView {
    pub fn apply_status(&mut self, id: &str, status: ProjectStatus) -> bool {
        let mut applied = false;
        if let Some(detail) = self.detail.as_mut().filter(|d| d.summary.id == id) {
            detail.summary.status = status;
            applied = true;
        }
        if let Some(project) = self.project_summaries.iter_mut().find(|p| p.id == id) {
            project.status = status;
            applied = true;
        }
        applied
    }

    pub fn budget_total(&self) -> f64 {
        self.detail
            .as_ref()
            .map_or(0.0, |d| d.budget_lines.iter().map(|l| l.allocated).sum())
    }
}

pub struct ProjectLoader {
    project_id: String,
    projects: Rc<dyn ProjectPort>,
}

#[async_trait(?Send)]
impl ViewLoader for ProjectLoader {
    type View = ProjectView;

    fn name(&self) -> String {
        format!("project {}", self.project_id)
    }

    async fn load(&self, mode: FetchMode) -> Result<ProjectView> {
        let (detail, summaries) = futures::try_join!(
            self.projects.project_detail(&self.project_id, mode),
            self.projects.project_summaries(mode),
        )?;
        Ok(ProjectView {
            detail: Some(detail),
            project_summaries: summaries,
        })
    }
}

pub struct ProjectDashboardHook {
    view: SyncedView<ProjectLoader>,
    projects: ProjectService,
}

impl ProjectDashboardHook {
    pub fn mount(ctx: &SyncContext, backend: &Backend, project_id: &str) -> Self {
        let loader = ProjectLoader {
            project_id: project_id.to_string(),
            projects: backend.projects.clone(),
        };
        let options = ViewOptions::from_config(&ctx.config)
            .with_events(event::DASHBOARD_EVENTS)
            .with_cache_keys(&[keys::PROJECTS.to_string(), keys::project(project_id)]);
        Self {
            view: SyncedView::mount(ctx, loader, options),
            projects: ProjectService::new(backend.projects.clone(), ctx.notifier()),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.view.loader().project_id
    }

    pub async fn update_project_status(&self, status: ProjectStatus) -> Result<ProjectSummary> {
        let id = self.project_id().to_string();
        self.view
            .mutate_optimistic(
                |view| {
                    view.apply_status(&id, status);
                },
                self.projects.update_status(&id, status),
            )
            .await
    }
}

impl Deref for ProjectDashboardHook {
    type Target = SyncedView<ProjectLoader>;

    fn deref(&self) -> &Self::Target {
        &self.view
    }
}

/// Change a project's status in every mounted view that shows it, then
/// persist it once. Each view confirms or resyncs on its own.
pub async fn update_project_status_in_views(
    dashboard: Option<&DashboardHook>,
    project: Option<&ProjectDashboardHook>,
    service: &ProjectService,
    id: &str,
    status: ProjectStatus,
) -> Result<ProjectSummary> {
    let project = project.filter(|hook| hook.project_id() == id);
    if let Some(hook) = dashboard {
        hook.patch(|view| {
            if !view.apply_status(id, status) {
                log::debug!("Project {} not on dashboard; skipping optimistic update", id);
            }
        });
    }
    if let Some(hook) = project {
        hook.patch(|view| {
            view.apply_status(id, status);
        });
    }

    let outcome = service.update_status(id, status).await;
    futures::join!(
        async {
            if let Some(hook) = dashboard {
                hook.settle(&outcome).await;
            }
        },
        async {
            if let Some(hook) = project {
                hook.settle(&outcome).await;
            }
        },
    );
    outcome
}

// ─── Budgets ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BudgetView {
    pub budgets: Vec<Budget>,
}

impl BudgetView {
    pub fn for_project<'a>(&'a self, project_id: &'a str) -> impl Iterator<Item = &'a Budget> + 'a {
        self.budgets.iter().filter(move |b| b.project_id == project_id)
    }

    pub fn total_allocated(&self) -> f64 {
        self.budgets.iter().map(|b| b.amount).sum()
    }

    pub fn total_spent(&self) -> f64 {
        self.budgets.iter().map(|b| b.spent).sum()
    }

    pub fn over_budget(&self) -> Vec<&Budget> {
        self.budgets.iter().filter(|b| b.is_over()).collect()
    }
}

pub struct BudgetLoader {
    budgets: Rc<dyn BudgetPort>,
}

#[async_trait(?Send)]
impl ViewLoader for BudgetLoader {
    type View = BudgetView;

    fn name(&self) -> String {
        "budgets".to_string()
    }

    async fn load(&self, mode: FetchMode) -> Result<BudgetView> {
        Ok(BudgetView {
            budgets: self.budgets.budgets(mode).await?,
        })
    }
}

pub type BudgetHook = SyncedView<BudgetLoader>;

pub fn mount_budgets(ctx: &SyncContext, backend: &Backend) -> BudgetHook {
    let loader = BudgetLoader {
        budgets: backend.budgets.clone(),
    };
    let options = ViewOptions::from_config(&ctx.config)
        .with_events(event::BUDGET_EVENTS)
        .with_cache_keys(&[keys::BUDGETS, keys::DASHBOARD]);
    SyncedView::mount(ctx, loader, options)
}
