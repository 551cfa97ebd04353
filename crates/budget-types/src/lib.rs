pub mod budget;
pub mod config;
pub mod dashboard;
pub mod entry;
pub mod error;
pub mod event;
pub mod project;
pub mod response;


pub use error::BudgetError;
pub type Result<T> = std::result::Result<T, BudgetError>;
