//! Control API server for the EmotionSim simulation.
//!
//! Hosts the run manager (one engine task per run) behind an Axum surface:
//! REST endpoints for creating, controlling, and inspecting runs, and a
//! `WebSocket` per run streaming every engine event with token-level
//! granularity.
//!
//! # Modules
//!
//! - [`error`] -- Error types with HTTP response mappings.
//! - [`manager`] -- The run manager and per-run engine tasks.
//! - [`state`] -- Shared application state.
//! - [`handlers`] -- REST handlers.
//! - [`ws`] -- The `WebSocket` event stream.
//! - [`router`] -- Route assembly with CORS and tracing layers.

pub mod error;
pub mod handlers;
pub mod manager;
pub mod router;
pub mod state;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

// Re-export primary types at crate root.
pub use error::ServerError;
pub use manager::{RunHandle, RunManager};
pub use router::build_router;
pub use state::AppState;

/// Bind and serve the control API until the process exits.
///
/// # Errors
///
/// Returns [`ServerError::Storage`] when the listener cannot bind or the
/// server loop fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<(), ServerError> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Storage(format!("failed to bind {addr}: {e}")))?;
    tracing::info!(%addr, "control API listening");
    axum::serve(listener, router)
        .await
        .map_err(|e| ServerError::Storage(format!("server error: {e}")))
}
