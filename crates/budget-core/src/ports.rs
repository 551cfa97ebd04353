//! Port traits: the hexagonal architecture boundary.
//!
//! Timers, page lifecycle signals and the REST backend are reached only
//! through these traits. Browser implementations live in `budget-platform`;
//! `crate::testing` (feature `testing`) has virtual-time versions for tests.

use std::rc::Rc;
use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use budget_types::{
    Result,
    budget::{Budget, BudgetDraft},
    dashboard::DashboardData,
    entry::{Entry, EntryDraft, EntryKind},
    project::{ProjectDetail, ProjectDraft, ProjectStatus, ProjectSummary},
};

// ─── Scheduler Port ──────────────────────────────────────────

pub type TimerHandle = u64;

/// Timers and task spawning on the single UI thread.
pub trait Scheduler {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> u64;

    /// Run `task` once after `delay_ms`
    fn set_timeout(&self, delay_ms: u64, task: Box<dyn FnOnce()>) -> TimerHandle;

    /// Run `task` every `period_ms` until cleared
    fn set_interval(&self, period_ms: u64, task: Rc<dyn Fn()>) -> TimerHandle;

    /// Cancel a timeout or interval. Unknown handles are ignored.
    fn clear(&self, handle: TimerHandle);

    /// Run a future to completion on the local executor
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);
}

// ─── Page Events Port ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageSignal {
    /// `window` gained focus
    Focus,
    /// `document.visibilityState` changed to `visible`
    BecameVisible,
}

pub type ListenerHandle = u64;

pub trait PageEvents {
    fn listen(&self, signal: PageSignal, callback: Rc<dyn Fn()>) -> ListenerHandle;
    fn unlisten(&self, handle: ListenerHandle);
}

// ─── Backend Ports ───────────────────────────────────────────

/// Whether a read may be served from an HTTP cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Cached,
    /// Bypass every cache and hit the backend
    Force,
}

#[async_trait(?Send)]
pub trait DashboardPort {
    async fn dashboard_metrics(&self, mode: FetchMode) -> Result<DashboardData>;
}

#[async_trait(?Send)]
pub trait ProjectPort {
    async fn project_summaries(&self, mode: FetchMode) -> Result<Vec<ProjectSummary>>;
    async fn project_detail(&self, id: &str, mode: FetchMode) -> Result<ProjectDetail>;
    async fn update_project_status(&self, id: &str, status: ProjectStatus) -> Result<ProjectSummary>;
    async fn create_project(&self, draft: &ProjectDraft) -> Result<ProjectSummary>;
    async fn update_project(&self, id: &str, draft: &ProjectDraft) -> Result<ProjectSummary>;
    async fn delete_project(&self, id: &str) -> Result<()>;
}

#[async_trait(?Send)]
pub trait BudgetPort {
    async fn budgets(&self, mode: FetchMode) -> Result<Vec<Budget>>;
    async fn create_budget(&self, draft: &BudgetDraft) -> Result<Budget>;
    async fn update_budget(&self, id: &str, draft: &BudgetDraft) -> Result<Budget>;
    async fn delete_budget(&self, id: &str) -> Result<()>;
}

/// Sales and expense entries
#[async_trait(?Send)]
pub trait EntryPort {
    async fn create_entry(&self, draft: &EntryDraft) -> Result<Entry>;
    async fn delete_entry(&self, kind: EntryKind, id: &str) -> Result<()>;
}

/// All backend ports, usually backed by one client
#[derive(Clone)]
pub struct Backend {
    pub dashboard: Rc<dyn DashboardPort>,
    pub projects: Rc<dyn ProjectPort>,
    pub budgets: Rc<dyn BudgetPort>,
    pub entries: Rc<dyn EntryPort>,
}

impl Backend {
    pub fn shared<T>(api: Rc<T>) -> Self
    where
        T: DashboardPort + ProjectPort + BudgetPort + EntryPort + 'static,
    {
        Self {
            dashboard: api.clone(),
            projects: api.clone(),
            budgets: api.clone(),
            entries: api,
        }
    }
}
