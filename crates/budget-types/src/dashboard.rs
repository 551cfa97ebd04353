use serde::{Deserialize, Serialize};
use crate::project::ProjectStatus;

/// Aggregate metrics for the main dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardData {
    #[serde(default)]
    pub total_projects: u32,
    #[serde(default)]
    pub pending_projects: u32,
    #[serde(default)]
    pub in_progress_projects: u32,
    #[serde(default)]
    pub completed_projects: u32,
    #[serde(default)]
    pub cancelled_projects: u32,
    #[serde(default)]
    pub total_budget: f64,
    #[serde(default)]
    pub total_sales: f64,
    #[serde(default)]
    pub total_expenses: f64,
}

impl DashboardData {
    pub fn count_for(&self, status: ProjectStatus) -> u32 {
        match status {
            ProjectStatus::Pending => self.pending_projects,
            ProjectStatus::InProgress => self.in_progress_projects,
            ProjectStatus::Completed => self.completed_projects,
            ProjectStatus::Cancelled => self.cancelled_projects,
        }
    }

    fn counter_mut(&mut self, status: ProjectStatus) -> &mut u32 {
        match status {
            ProjectStatus::Pending => &mut self.pending_projects,
            ProjectStatus::InProgress => &mut self.in_progress_projects,
            ProjectStatus::Completed => &mut self.completed_projects,
            ProjectStatus::Cancelled => &mut self.cancelled_projects,
        }
    }

    /// Move one project between status counters. Counters never go below zero.
    pub fn shift_status(&mut self, from: ProjectStatus, to: ProjectStatus) {
        if from == to {
            return;
        }
        let old = self.counter_mut(from);
        *old = old.saturating_sub(1);
        *self.counter_mut(to) += 1;
    }

    pub fn net_profit(&self) -> f64 {
        self.total_sales - self.total_expenses
    }
}
