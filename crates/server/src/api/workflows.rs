use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crossflow_core::{ApprovalDecision, ExecutionId, TenantId};

use crate::error::ServerError;

use super::AppState;

/// Query parameters for tenant-scoped listings.
#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant: String,
}

/// `GET /v1/workflows?tenant=...` — workflows whose required modules are
/// all active for the tenant.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let tenant = TenantId::new(query.tenant);
    let available = state.engine.available_workflows(&tenant).await?;
    let workflows: Vec<serde_json::Value> = available
        .iter()
        .map(|w| {
            serde_json::json!({
                "id": &w.id,
                "name": &w.name,
                "description": &w.description,
                "required_modules": &w.required_modules,
                "trigger_events": w.trigger_events.iter().map(|t| {
                    serde_json::json!({
                        "event_type": &t.event_type,
                        "source_module": &t.source_module,
                    })
                }).collect::<Vec<_>>(),
            })
        })
        .collect();
    Ok(Json(serde_json::json!({"workflows": workflows})))
}

/// `GET /v1/executions?tenant=...` — executions retained for the tenant.
pub async fn executions(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let tenant = TenantId::new(query.tenant);
    let executions = state.engine.executions_for_tenant(&tenant).await?;
    Ok(Json(serde_json::json!({"executions": executions})))
}

/// Body for the resume endpoint.
#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    pub tenant: String,
    pub decision: ApprovalDecision,
}

/// `POST /v1/executions/{id}/resume` — apply an approval decision to a
/// paused execution.
pub async fn resume(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ResumeRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let tenant = TenantId::new(body.tenant);
    let execution = state
        .engine
        .resume_execution(&tenant, &ExecutionId::new(id), body.decision)
        .await?;
    Ok(Json(serde_json::json!({"execution": execution})))
}
