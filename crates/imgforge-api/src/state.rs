//! Application state.

use imgforge_core::SharedStore;
use imgforge_scheduler::BuildService;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: BuildService,
    /// Backing store, pinged by the readiness probe.
    pub store: Arc<dyn SharedStore>,
}

impl AppState {
    pub fn new(service: BuildService, store: Arc<dyn SharedStore>) -> Self {
        Self { service, store }
    }
}
