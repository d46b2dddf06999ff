use axum::Json;
use axum::extract::State;

use super::AppState;

/// `GET /v1/dlq` — inspect dead-lettered webhook events.
pub async fn list(State(state): State<AppState>) -> Json<serde_json::Value> {
    let entries = state.dlq.list().await;
    Json(serde_json::json!({
        "count": entries.len(),
        "entries": entries,
    }))
}

/// `POST /v1/dlq/replay` — drain the dead-letter queue and replay every
/// entry through the processing pipeline.
///
/// Events that fail again are re-captured by the processor, so nothing is
/// lost by a failed replay.
pub async fn replay(State(state): State<AppState>) -> Json<serde_json::Value> {
    let entries = state.dlq.drain().await;
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let mut results = Vec::with_capacity(entries.len());

    for entry in entries {
        let result = state.processor.replay(entry.payload).await;
        if result.success {
            succeeded += 1;
        } else {
            failed += 1;
        }
        results.push(serde_json::json!({
            "entry_id": entry.id,
            "success": result.success,
            "error": result.error,
        }));
    }

    Json(serde_json::json!({
        "replayed": results.len(),
        "succeeded": succeeded,
        "failed": failed,
        "results": results,
    }))
}
