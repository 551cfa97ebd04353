//! The envelope every backend endpoint replies with.

use serde::{Deserialize, Serialize};
use crate::{BudgetError, Result};

/// `{ success, message?, result? }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
}

impl<T> ServiceResponse<T> {
    pub fn ok(result: T) -> Self {
        Self {
            success: true,
            message: None,
            result: Some(result),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            result: None,
        }
    }

    /// Treat a falsy `success` as failure, keeping whatever `result` came back.
    pub fn into_outcome(self) -> Result<Option<T>> {
        if self.success {
            Ok(self.result)
        } else {
            Err(BudgetError::Rejected(
                self.message.unwrap_or_else(|| "request failed".to_string()),
            ))
        }
    }

    /// Like [`into_outcome`](Self::into_outcome) but a missing `result` is also an error.
    pub fn into_result(self, what: &str) -> Result<T> {
        self.into_outcome()?
            .ok_or_else(|| BudgetError::EmptyResult(what.to_string()))
    }
}
