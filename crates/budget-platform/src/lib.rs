//! Browser adapters for the budget-core ports: timers, page focus and
//! visibility, the REST backend, and the console debug hooks.

pub mod debug;
pub mod page;
pub mod rest;
pub mod scheduler;

pub use page::BrowserPageEvents;
pub use rest::RestClient;
pub use scheduler::BrowserScheduler;
