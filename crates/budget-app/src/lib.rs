//! Budget App: WASM entry point.
//!
//! This crate is the composition root (DI wiring layer).
//! It assembles the browser adapters, hands them to the sync layer, and
//! exposes [`DashboardApp`] to the JS rendering layer.

mod app;

pub use app::DashboardApp;

use wasm_bindgen::prelude::*;

/// Runs when the module is instantiated
#[wasm_bindgen(start)]
pub fn main() {
    wasm_logger::init(wasm_logger::Config::default());
    log::info!("Budget dashboard sync starting...");
}
