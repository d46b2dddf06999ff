use axum::Json;
use axum::extract::State;

use super::AppState;

/// `GET /v1/breakers` — per-tenant circuit breaker snapshot, for operators.
pub async fn list(State(state): State<AppState>) -> Json<serde_json::Value> {
    let statuses = state.processor.breakers().statuses();
    Json(serde_json::json!({"circuit_breakers": statuses}))
}
