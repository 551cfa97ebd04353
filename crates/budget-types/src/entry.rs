use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sales and expense records share one shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Sales,
    Expense,
}

impl EntryKind {
    /// Path segment used by the REST API
    pub fn resource(&self) -> &'static str {
        match self {
            EntryKind::Sales => "sales",
            EntryKind::Expense => "expenses",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub project_id: String,
    pub kind: EntryKind,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub project_id: String,
    pub kind: EntryKind,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
}
