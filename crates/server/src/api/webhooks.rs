use std::collections::HashMap;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::IntoResponse;
use serde::Deserialize;

use crossflow_core::TenantId;
use crossflow_webhook::WebhookRequest;

use super::AppState;

/// Query parameters for the webhook endpoint.
#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    /// Tenant the provider is configured to deliver to.
    pub tenant: String,
}

/// `POST /v1/webhooks/voice?tenant=...` — the provider-facing ingestion
/// endpoint.
///
/// Status mapping: 400 for security failures, 503 for an open circuit,
/// 200 with a success flag in the body for everything else.
pub async fn receive(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    // Reconstruct the externally visible URL the provider signed.
    let path_and_query = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_owned(), ToString::to_string);
    let url = format!("{}{path_and_query}", state.external_url);

    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_owned(), v.to_owned()))
        })
        .collect();

    let response = state
        .processor
        .handle(WebhookRequest {
            tenant: TenantId::new(query.tenant),
            url,
            headers: header_map,
            body,
        })
        .await;

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    (status, Json(response.body))
}
