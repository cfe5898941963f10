//! REST handlers for the run control API.
//!
//! The scenario CRUD surface lives elsewhere; these endpoints cover the
//! core contract: allocate runs, drive their lifecycle, and page through
//! live and persisted state.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use emotionsim_types::{
    AgentSnapshot, ControlAction, MessageRecord, Run, RunStatus, StepRecord,
};

use crate::error::ServerError;
use crate::state::AppState;

/// Query parameters for paged listings.
#[derive(Debug, Deserialize)]
pub struct Pagination {
    /// Page size (capped at 500).
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Offset into the result set.
    #[serde(default)]
    pub offset: i64,
}

/// Default page size.
const fn default_limit() -> i64 {
    50
}

impl Pagination {
    /// Clamp the page parameters into sane bounds.
    fn clamped(&self) -> (i64, i64) {
        (self.limit.clamp(1, 500), self.offset.max(0))
    }
}

/// Body of `POST /api/runs`.
#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    /// The scenario to instantiate.
    pub scenario_id: Uuid,
    /// Optional deterministic seed.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Optional tick-budget override.
    #[serde(default)]
    pub max_steps: Option<u64>,
}

/// Body of `POST /api/runs/{id}/control`.
#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    /// The lifecycle command.
    pub action: ControlAction,
}

/// Acknowledgement for control commands.
#[derive(Debug, serde::Serialize)]
pub struct ControlResponse {
    /// Always true on the success path.
    pub ok: bool,
    /// Status after the command.
    pub status: RunStatus,
}

/// Extra filters for message listings.
#[derive(Debug, Deserialize)]
pub struct MessageFilter {
    /// Only messages sent by this agent.
    #[serde(default)]
    pub agent_id: Option<Uuid>,
    /// Page size (capped at 500).
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Offset into the result set.
    #[serde(default)]
    pub offset: i64,
}

/// Filter for run listings.
#[derive(Debug, Deserialize)]
pub struct RunFilter {
    /// Only runs of this scenario.
    #[serde(default)]
    pub scenario_id: Option<Uuid>,
    /// Page size (capped at 500).
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Offset into the result set.
    #[serde(default)]
    pub offset: i64,
}

/// `GET /` -- minimal status page.
pub async fn index() -> &'static str {
    "EmotionSim control API. See /api/runs and /ws/runs/{id}."
}

/// `POST /api/runs` -- allocate a run (status `pending`).
pub async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateRunRequest>,
) -> Result<Json<Run>, ServerError> {
    let run = state
        .manager
        .create_run(request.scenario_id.into(), request.seed, request.max_steps)
        .await?;
    Ok(Json(run))
}

/// `POST /api/runs/{id}/control` -- drive the run lifecycle.
pub async fn control_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<ControlResponse>, ServerError> {
    let status = state
        .manager
        .control(run_id.into(), request.action)
        .await?;
    Ok(Json(ControlResponse { ok: true, status }))
}

/// `GET /api/runs/{id}` -- one run, live status preferred over the row.
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<Run>, ServerError> {
    let run_id = run_id.into();
    let mut run = state
        .store
        .get_run(run_id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("run {run_id}")))?;
    // The row lags the loop by design; the manager has the live status.
    if let Some(status) = state.manager.status(run_id).await {
        run.status = status;
    }
    Ok(Json(run))
}

/// `GET /api/runs` -- list runs, newest first.
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RunFilter>,
) -> Result<Json<Vec<Run>>, ServerError> {
    let limit = filter.limit.clamp(1, 500);
    let offset = filter.offset.max(0);
    let runs = state
        .store
        .list_runs(filter.scenario_id.map(Into::into), limit, offset)
        .await?;
    Ok(Json(runs))
}

/// `GET /api/runs/{id}/agents` -- live agent snapshots.
pub async fn get_agents(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<Vec<AgentSnapshot>>, ServerError> {
    let snapshots = state.store.list_agent_snapshots(run_id.into()).await?;
    Ok(Json(snapshots))
}

/// `GET /api/runs/{id}/steps` -- chronological step records.
pub async fn get_steps(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<StepRecord>>, ServerError> {
    let (limit, offset) = page.clamped();
    let steps = state
        .store
        .list_steps(run_id.into(), limit, offset)
        .await?;
    Ok(Json(steps))
}

/// `GET /api/runs/{id}/messages` -- chronological messages.
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
    Query(filter): Query<MessageFilter>,
) -> Result<Json<Vec<MessageRecord>>, ServerError> {
    let limit = filter.limit.clamp(1, 500);
    let offset = filter.offset.max(0);
    let messages = state
        .store
        .list_messages(
            run_id.into(),
            filter.agent_id.map(Into::into),
            limit,
            offset,
        )
        .await?;
    Ok(Json(messages))
}
