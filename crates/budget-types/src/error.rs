use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BudgetError {
    /// The backend answered with `success: false`
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Missing result in response to {0}")]
    EmptyResult(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JS interop error: {0}")]
    JsInterop(String),

    #[error("Listener failed: {0}")]
    Listener(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for BudgetError {
    fn from(e: serde_json::Error) -> Self {
        BudgetError::Serialization(e.to_string())
    }
}
