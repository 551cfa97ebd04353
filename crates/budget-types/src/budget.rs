use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: String,
    pub project_id: String,
    pub category: String,
    pub amount: f64,
    #[serde(default)]
    pub spent: f64,
}

impl Budget {
    pub fn remaining(&self) -> f64 {
        self.amount - self.spent
    }

    pub fn is_over(&self) -> bool {
        self.spent > self.amount
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetDraft {
    pub project_id: String,
    pub category: String,
    pub amount: f64,
}
