//! Axum router construction for the control API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete router for the control API server.
///
/// Routes:
/// - `GET /` -- minimal status page
/// - `POST /api/runs` -- create a run
/// - `GET /api/runs` -- list runs
/// - `GET /api/runs/{id}` -- one run
/// - `POST /api/runs/{id}/control` -- start/pause/resume/stop/step
/// - `GET /api/runs/{id}/agents` -- live agent snapshots
/// - `GET /api/runs/{id}/steps` -- persisted step records
/// - `GET /api/runs/{id}/messages` -- persisted messages
/// - `GET /ws/runs/{id}` -- `WebSocket` event stream
///
/// CORS allows any origin for development; production deployments should
/// restrict it.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index))
        .route("/api/runs", post(handlers::create_run).get(handlers::list_runs))
        .route("/api/runs/{id}", get(handlers::get_run))
        .route("/api/runs/{id}/control", post(handlers::control_run))
        .route("/api/runs/{id}/agents", get(handlers::get_agents))
        .route("/api/runs/{id}/steps", get(handlers::get_steps))
        .route("/api/runs/{id}/messages", get(handlers::get_messages))
        .route("/ws/runs/{id}", get(ws::ws_run_events))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
