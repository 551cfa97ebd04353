//! Dashboard data synchronization: a small event-driven cache-invalidation
//! layer that keeps several dashboard views consistent after writes happen
//! elsewhere in the app.

pub mod auto_refresh;
pub mod cache_manager;
pub mod context;
pub mod event_bus;
pub mod hooks;
pub mod ports;
pub mod services;
pub mod subscription;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod view;

#[cfg(test)]
mod tests;

pub use context::SyncContext;
