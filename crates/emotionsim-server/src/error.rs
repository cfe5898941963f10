//! Error types and HTTP mappings for the server crate.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use emotionsim_core::EngineError;
use emotionsim_db::DbError;

/// Errors surfaced by the control API.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A control command hit an illegal status transition.
    #[error("{0}")]
    InvalidTransition(String),

    /// The request payload failed validation.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A persistence query failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<DbError> for ServerError {
    fn from(error: DbError) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<EngineError> for ServerError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::InvalidTransition { .. } => Self::InvalidTransition(error.to_string()),
            EngineError::Scenario(reason) => Self::Validation(reason),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_transition_maps_to_conflict() {
        let error = ServerError::from(EngineError::InvalidTransition {
            from: emotionsim_types::RunStatus::Completed,
            action: emotionsim_types::ControlAction::Start,
        });
        assert!(matches!(error, ServerError::InvalidTransition(_)));
    }

    #[test]
    fn scenario_error_maps_to_validation() {
        let error = ServerError::from(EngineError::Scenario("bad".to_owned()));
        assert!(matches!(error, ServerError::Validation(_)));
    }
}
