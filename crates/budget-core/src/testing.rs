//! In-process implementations of the ports for tests and demos:
//! a virtual-clock scheduler, a page-signal source fired by hand, and an
//! in-memory backend with failure injection and response gating.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;

use budget_types::{
    BudgetError, Result,
    budget::{Budget, BudgetDraft},
    dashboard::DashboardData,
    entry::{Entry, EntryDraft, EntryKind},
    project::{BudgetLine, ProjectDetail, ProjectDraft, ProjectStatus, ProjectSummary},
};

use crate::ports::*;

// ─── ManualScheduler ─────────────────────────────────────────

enum TimerTask {
    Once(Box<dyn FnOnce()>),
    Every { period: u64, task: Rc<dyn Fn()> },
}

struct PendingTimer {
    handle: TimerHandle,
    due: u64,
    task: TimerTask,
}

/// Scheduler driven by [`advance`](Self::advance). Spawned futures run on a
/// `LocalPool`; timers fire in due-time order, ties broken by creation order.
pub struct ManualScheduler {
    now: Cell<u64>,
    next_handle: Cell<TimerHandle>,
    timers: RefCell<Vec<PendingTimer>>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
}

impl ManualScheduler {
    pub fn new(start_ms: u64) -> Rc<Self> {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Rc::new(Self {
            now: Cell::new(start_ms),
            next_handle: Cell::new(1),
            timers: RefCell::new(Vec::new()),
            pool: RefCell::new(pool),
            spawner,
        })
    }

    /// Poll spawned futures until none can make progress.
    pub fn run_until_idle(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Move the clock forward, firing every timer that comes due on the way.
    pub fn advance(&self, ms: u64) {
        let target = self.now.get() + ms;
        loop {
            self.run_until_idle();

            let next = {
                let mut timers = self.timers.borrow_mut();
                let idx = timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.handle))
                    .map(|(i, _)| i);
                idx.map(|i| timers.remove(i))
            };
            let Some(timer) = next else { break };

            self.now.set(timer.due.max(self.now.get()));
            match timer.task {
                TimerTask::Once(task) => task(),
                TimerTask::Every { period, task } => {
                    // Re-arm first so the task can clear its own interval.
                    self.timers.borrow_mut().push(PendingTimer {
                        handle: timer.handle,
                        due: timer.due + period.max(1),
                        task: TimerTask::Every { period, task: task.clone() },
                    });
                    task();
                }
            }
        }
        self.now.set(target);
        self.run_until_idle();
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    fn next_handle(&self) -> TimerHandle {
        let handle = self.next_handle.get();
        self.next_handle.set(handle + 1);
        handle
    }
}

impl Scheduler for ManualScheduler {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn set_timeout(&self, delay_ms: u64, task: Box<dyn FnOnce()>) -> TimerHandle {
        let handle = self.next_handle();
        self.timers.borrow_mut().push(PendingTimer {
            handle,
            due: self.now.get() + delay_ms,
            task: TimerTask::Once(task),
        });
        handle
    }

    fn set_interval(&self, period_ms: u64, task: Rc<dyn Fn()>) -> TimerHandle {
        let handle = self.next_handle();
        self.timers.borrow_mut().push(PendingTimer {
            handle,
            due: self.now.get() + period_ms.max(1),
            task: TimerTask::Every { period: period_ms, task },
        });
        handle
    }

    fn clear(&self, handle: TimerHandle) {
        self.timers.borrow_mut().retain(|t| t.handle != handle);
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        if let Err(e) = self.spawner.spawn_local(task) {
            log::error!("Failed to spawn task: {}", e);
        }
    }
}

// ─── ManualPage ──────────────────────────────────────────────

/// Page signal source fired by hand with [`fire`](Self::fire).
#[derive(Default)]
pub struct ManualPage {
    next_handle: Cell<ListenerHandle>,
    listeners: RefCell<Vec<(ListenerHandle, PageSignal, Rc<dyn Fn()>)>>,
}

impl ManualPage {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Deliver `signal` to its listeners. Returns how many ran.
    pub fn fire(&self, signal: PageSignal) -> usize {
        let snapshot: Vec<Rc<dyn Fn()>> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, s, _)| *s == signal)
            .map(|(_, _, cb)| cb.clone())
            .collect();
        for cb in &snapshot {
            cb();
        }
        snapshot.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl PageEvents for ManualPage {
    fn listen(&self, signal: PageSignal, callback: Rc<dyn Fn()>) -> ListenerHandle {
        let handle = self.next_handle.get() + 1;
        self.next_handle.set(handle);
        self.listeners.borrow_mut().push((handle, signal, callback));
        handle
    }

    fn unlisten(&self, handle: ListenerHandle) {
        self.listeners.borrow_mut().retain(|(h, _, _)| *h != handle);
    }
}

// ─── MemoryBackend ───────────────────────────────────────────

/// In-memory stand-in for the REST backend.
///
/// Primary reads (`dashboard_metrics`, `project_detail`, `budgets`) can be
/// failed with [`fail_reads`](Self::fail_reads) and held open with
/// [`hold_reads`](Self::hold_reads); held reads capture their data at call
/// time and resolve when released.
#[derive(Default)]
pub struct MemoryBackend {
    dashboard: RefCell<DashboardData>,
    projects: RefCell<Vec<ProjectSummary>>,
    budgets: RefCell<Vec<Budget>>,
    entries: RefCell<Vec<Entry>>,
    next_id: Cell<u32>,

    failing_reads: Cell<u32>,
    failing_writes: Cell<bool>,
    rejecting_writes: Cell<bool>,
    holding: Cell<bool>,
    held: RefCell<VecDeque<oneshot::Sender<()>>>,

    metrics_calls: Cell<u32>,
    detail_calls: Cell<u32>,
    budget_calls: Cell<u32>,
    write_calls: Cell<u32>,
    last_mode: Cell<Option<FetchMode>>,
}

impl MemoryBackend {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Seed projects; dashboard counters are recomputed from them.
    pub fn with_projects(projects: Vec<ProjectSummary>) -> Rc<Self> {
        let backend = Self::default();
        *backend.projects.borrow_mut() = projects;
        backend.recount();
        Rc::new(backend)
    }

    pub fn seed_budgets(&self, budgets: Vec<Budget>) {
        *self.budgets.borrow_mut() = budgets;
    }

    /// Fail the next `n` primary reads.
    pub fn fail_reads(&self, n: u32) {
        self.failing_reads.set(n);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.failing_writes.set(fail);
    }

    /// Answer writes with `success: false`
    pub fn reject_writes(&self, reject: bool) {
        self.rejecting_writes.set(reject);
    }

    pub fn hold_reads(&self, hold: bool) {
        self.holding.set(hold);
    }

    /// Let the oldest held read resolve. Returns false if none was held.
    pub fn release_next_read(&self) -> bool {
        match self.held.borrow_mut().pop_front() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Let the most recent held read resolve, leaving older ones waiting.
    pub fn release_newest_read(&self) -> bool {
        match self.held.borrow_mut().pop_back() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn held_reads(&self) -> usize {
        self.held.borrow().len()
    }

    /// Change a project's status behind the views' back.
    pub fn set_status(&self, id: &str, status: ProjectStatus) {
        if let Some(p) = self.projects.borrow_mut().iter_mut().find(|p| p.id == id) {
            p.status = status;
        }
        self.recount();
    }

    pub fn project(&self, id: &str) -> Option<ProjectSummary> {
        self.projects.borrow().iter().find(|p| p.id == id).cloned()
    }

    pub fn metrics_calls(&self) -> u32 {
        self.metrics_calls.get()
    }

    pub fn detail_calls(&self) -> u32 {
        self.detail_calls.get()
    }

    pub fn budget_calls(&self) -> u32 {
        self.budget_calls.get()
    }

    pub fn write_calls(&self) -> u32 {
        self.write_calls.get()
    }

    pub fn last_mode(&self) -> Option<FetchMode> {
        self.last_mode.get()
    }

    fn recount(&self) {
        let projects = self.projects.borrow();
        let mut data = DashboardData {
            total_projects: projects.len() as u32,
            ..Default::default()
        };
        for p in projects.iter() {
            match p.status {
                ProjectStatus::Pending => data.pending_projects += 1,
                ProjectStatus::InProgress => data.in_progress_projects += 1,
                ProjectStatus::Completed => data.completed_projects += 1,
                ProjectStatus::Cancelled => data.cancelled_projects += 1,
            }
            data.total_budget += p.budget;
            data.total_sales += p.total_sales;
            data.total_expenses += p.total_expenses;
        }
        *self.dashboard.borrow_mut() = data;
    }

    fn next_id(&self, prefix: &str) -> String {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        format!("{}{}", prefix, id)
    }

    /// Count a primary read, apply failure injection, then wait on the gate.
    async fn primary_read(&self, counter: &Cell<u32>, mode: FetchMode) -> Result<()> {
        counter.set(counter.get() + 1);
        self.last_mode.set(Some(mode));
        if self.failing_reads.get() > 0 {
            self.failing_reads.set(self.failing_reads.get() - 1);
            return Err(BudgetError::Network("connection refused".to_string()));
        }
        Ok(())
    }

    async fn gate(&self) {
        if !self.holding.get() {
            return;
        }
        let (tx, rx) = oneshot::channel();
        self.held.borrow_mut().push_back(tx);
        let _ = rx.await;
    }

    fn check_write(&self) -> Result<()> {
        self.write_calls.set(self.write_calls.get() + 1);
        if self.failing_writes.get() {
            return Err(BudgetError::Network("write timed out".to_string()));
        }
        if self.rejecting_writes.get() {
            return Err(BudgetError::Rejected("ไม่มีสิทธิ์แก้ไข".to_string()));
        }
        Ok(())
    }

    fn project_or_err(&self, id: &str) -> Result<ProjectSummary> {
        self.project(id)
            .ok_or_else(|| BudgetError::Rejected(format!("project {} not found", id)))
    }
}

#[async_trait(?Send)]
impl DashboardPort for MemoryBackend {
    async fn dashboard_metrics(&self, mode: FetchMode) -> Result<DashboardData> {
        self.primary_read(&self.metrics_calls, mode).await?;
        let data = self.dashboard.borrow().clone();
        self.gate().await;
        Ok(data)
    }
}

#[async_trait(?Send)]
impl ProjectPort for MemoryBackend {
    async fn project_summaries(&self, _mode: FetchMode) -> Result<Vec<ProjectSummary>> {
        Ok(self.projects.borrow().clone())
    }

    async fn project_detail(&self, id: &str, mode: FetchMode) -> Result<ProjectDetail> {
        self.primary_read(&self.detail_calls, mode).await?;
        let summary = self.project_or_err(id)?;
        let budget_lines = self
            .budgets
            .borrow()
            .iter()
            .filter(|b| b.project_id == id)
            .map(|b| BudgetLine {
                category: b.category.clone(),
                allocated: b.amount,
                spent: b.spent,
            })
            .collect();
        let entries = self.entries.borrow();
        let count = |kind: EntryKind| {
            entries
                .iter()
                .filter(|e| e.project_id == id && e.kind == kind)
                .count() as u32
        };
        let detail = ProjectDetail {
            summary,
            description: None,
            budget_lines,
            sales_count: count(EntryKind::Sales),
            expense_count: count(EntryKind::Expense),
        };
        drop(entries);
        self.gate().await;
        Ok(detail)
    }

    async fn update_project_status(&self, id: &str, status: ProjectStatus) -> Result<ProjectSummary> {
        self.check_write()?;
        self.project_or_err(id)?;
        self.set_status(id, status);
        self.project_or_err(id)
    }

    async fn create_project(&self, draft: &ProjectDraft) -> Result<ProjectSummary> {
        self.check_write()?;
        let project = ProjectSummary {
            id: self.next_id("p"),
            name: draft.name.clone(),
            status: draft.status,
            budget: draft.budget,
            total_sales: 0.0,
            total_expenses: 0.0,
        };
        self.projects.borrow_mut().push(project.clone());
        self.recount();
        Ok(project)
    }

    async fn update_project(&self, id: &str, draft: &ProjectDraft) -> Result<ProjectSummary> {
        self.check_write()?;
        {
            let mut projects = self.projects.borrow_mut();
            let project = projects
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| BudgetError::Rejected(format!("project {} not found", id)))?;
            project.name = draft.name.clone();
            project.status = draft.status;
            project.budget = draft.budget;
        }
        self.recount();
        self.project_or_err(id)
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        self.check_write()?;
        self.projects.borrow_mut().retain(|p| p.id != id);
        self.recount();
        Ok(())
    }
}

#[async_trait(?Send)]
impl BudgetPort for MemoryBackend {
    async fn budgets(&self, mode: FetchMode) -> Result<Vec<Budget>> {
        self.primary_read(&self.budget_calls, mode).await?;
        let budgets = self.budgets.borrow().clone();
        self.gate().await;
        Ok(budgets)
    }

    async fn create_budget(&self, draft: &BudgetDraft) -> Result<Budget> {
        self.check_write()?;
        let budget = Budget {
            id: self.next_id("b"),
            project_id: draft.project_id.clone(),
            category: draft.category.clone(),
            amount: draft.amount,
            spent: 0.0,
        };
        self.budgets.borrow_mut().push(budget.clone());
        Ok(budget)
    }

    async fn update_budget(&self, id: &str, draft: &BudgetDraft) -> Result<Budget> {
        self.check_write()?;
        let mut budgets = self.budgets.borrow_mut();
        let budget = budgets
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| BudgetError::Rejected(format!("budget {} not found", id)))?;
        budget.category = draft.category.clone();
        budget.amount = draft.amount;
        Ok(budget.clone())
    }

    async fn delete_budget(&self, id: &str) -> Result<()> {
        self.check_write()?;
        self.budgets.borrow_mut().retain(|b| b.id != id);
        Ok(())
    }
}

#[async_trait(?Send)]
impl EntryPort for MemoryBackend {
    async fn create_entry(&self, draft: &EntryDraft) -> Result<Entry> {
        self.check_write()?;
        let entry = Entry {
            id: self.next_id("e"),
            project_id: draft.project_id.clone(),
            kind: draft.kind,
            amount: draft.amount,
            date: draft.date,
            description: draft.description.clone(),
        };
        if let Some(p) = self
            .projects
            .borrow_mut()
            .iter_mut()
            .find(|p| p.id == draft.project_id)
        {
            match draft.kind {
                EntryKind::Sales => p.total_sales += draft.amount,
                EntryKind::Expense => p.total_expenses += draft.amount,
            }
        }
        self.entries.borrow_mut().push(entry.clone());
        self.recount();
        Ok(entry)
    }

    async fn delete_entry(&self, kind: EntryKind, id: &str) -> Result<()> {
        self.check_write()?;
        self.entries
            .borrow_mut()
            .retain(|e| !(e.kind == kind && e.id == id));
        Ok(())
    }
}

/// Project summary with zero amounts, for seeding tests
pub fn project(id: &str, status: ProjectStatus) -> ProjectSummary {
    ProjectSummary {
        id: id.to_string(),
        name: format!("Project {}", id),
        status,
        budget: 0.0,
        total_sales: 0.0,
        total_expenses: 0.0,
    }
}
