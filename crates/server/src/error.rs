use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crossflow_engine::EngineError;

/// Errors surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Engine(EngineError::UnknownExecution(_) | EngineError::UnknownWorkflow(_)) => {
                StatusCode::NOT_FOUND
            }
            Self::Engine(EngineError::NotPaused(_)) => StatusCode::CONFLICT,
            Self::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({"error": self.to_string()}));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use crossflow_core::{ExecutionId, WorkflowId};

    use super::*;

    #[test]
    fn status_mapping() {
        let err = ServerError::from(EngineError::UnknownExecution(
            ExecutionId::new("x").to_string(),
        ));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err = ServerError::from(EngineError::UnknownWorkflow(WorkflowId::new("w")));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err = ServerError::from(EngineError::NotPaused("x".into()));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);

        let err = ServerError::from(EngineError::Configuration("bad".into()));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
