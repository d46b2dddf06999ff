use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crossflow_engine::WorkflowEngine;
use crossflow_webhook::{DeadLetterStore, WebhookProcessor};

pub mod breakers;
pub mod dlq;
pub mod health;
pub mod webhooks;
pub mod workflows;

/// Shared state handed to every API handler.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<WebhookProcessor>,
    pub engine: Arc<WorkflowEngine>,
    pub dlq: Arc<dyn DeadLetterStore>,
    /// Public base URL used to reconstruct the full request URL for
    /// signature verification.
    pub external_url: String,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(health::health))
        .route("/v1/webhooks/voice", post(webhooks::receive))
        .route("/v1/breakers", get(breakers::list))
        .route("/v1/workflows", get(workflows::list))
        .route("/v1/executions", get(workflows::executions))
        .route("/v1/executions/{id}/resume", post(workflows::resume))
        .route("/v1/dlq", get(dlq::list))
        .route("/v1/dlq/replay", post(dlq::replay))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
