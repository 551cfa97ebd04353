//! Names shared between the mutation side and the dashboard views:
//! domain event names for the event bus and cache keys for the cache manager.

pub const PROJECT_UPDATED: &str = "project:updated";
pub const PROJECT_STATUS_CHANGED: &str = "project:status_changed";
pub const PROJECT_CREATED: &str = "project:created";
pub const PROJECT_DELETED: &str = "project:deleted";
pub const DASHBOARD_REFRESH_NEEDED: &str = "dashboard:refresh_needed";
pub const BUDGET_CREATED: &str = "budget:created";
pub const BUDGET_UPDATED: &str = "budget:updated";
pub const BUDGET_DELETED: &str = "budget:deleted";

/// Events every dashboard-style view refreshes on
pub const DASHBOARD_EVENTS: &[&str] = &[
    PROJECT_UPDATED,
    PROJECT_STATUS_CHANGED,
    PROJECT_CREATED,
    PROJECT_DELETED,
    DASHBOARD_REFRESH_NEEDED,
];

pub const BUDGET_EVENTS: &[&str] = &[
    BUDGET_CREATED,
    BUDGET_UPDATED,
    BUDGET_DELETED,
    DASHBOARD_REFRESH_NEEDED,
];

pub mod keys {
    pub const DASHBOARD: &str = "dashboard";
    pub const PROJECTS: &str = "projects";
    pub const BUDGETS: &str = "budgets";

    /// Per-project key, e.g. `project:p1`
    pub fn project(id: &str) -> String {
        format!("project:{}", id)
    }
}
