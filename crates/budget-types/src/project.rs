use serde::{Deserialize, Serialize};

/// Project lifecycle status. The wire values are the Thai labels the backend stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectStatus {
    #[serde(rename = "รอดำเนินการ")]
    Pending,
    #[serde(rename = "กำลังทำ")]
    InProgress,
    #[serde(rename = "เสร็จแล้ว")]
    Completed,
    #[serde(rename = "ยกเลิก")]
    Cancelled,
}

impl ProjectStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ProjectStatus::Pending => "รอดำเนินการ",
            ProjectStatus::InProgress => "กำลังทำ",
            ProjectStatus::Completed => "เสร็จแล้ว",
            ProjectStatus::Cancelled => "ยกเลิก",
        }
    }

    pub fn all() -> &'static [ProjectStatus] {
        &[
            ProjectStatus::Pending,
            ProjectStatus::InProgress,
            ProjectStatus::Completed,
            ProjectStatus::Cancelled,
        ]
    }
}

/// One row of the per-project summary list shown on dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub status: ProjectStatus,
    #[serde(default)]
    pub budget: f64,
    #[serde(default)]
    pub total_sales: f64,
    #[serde(default)]
    pub total_expenses: f64,
}

impl ProjectSummary {
    pub fn remaining_budget(&self) -> f64 {
        self.budget - self.total_expenses
    }

    pub fn profit(&self) -> f64 {
        self.total_sales - self.total_expenses
    }
}

/// A budget line attached to a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetLine {
    pub category: String,
    pub allocated: f64,
    #[serde(default)]
    pub spent: f64,
}

/// Everything a single-project dashboard shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDetail {
    pub summary: ProjectSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub budget_lines: Vec<BudgetLine>,
    #[serde(default)]
    pub sales_count: u32,
    #[serde(default)]
    pub expense_count: u32,
}

/// Payload for creating or editing a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDraft {
    pub name: String,
    pub status: ProjectStatus,
    #[serde(default)]
    pub budget: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
