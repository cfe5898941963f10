//! Shared application state for the control API server.

use emotionsim_db::SimStore;

use crate::manager::RunManager;

/// State shared by every handler, wrapped in an `Arc` by the router.
pub struct AppState {
    /// The run manager (live runs, controls, emitters).
    pub manager: RunManager,
    /// The persistence store (history queries).
    pub store: SimStore,
}

impl AppState {
    /// Bundle a manager and store.
    pub const fn new(manager: RunManager, store: SimStore) -> Self {
        Self { manager, store }
    }
}
