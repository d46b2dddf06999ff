use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crossflow_core::{CallId, TenantId, VoiceProvider};

/// One webhook processing attempt, recorded for every inbound request —
/// success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAttempt {
    /// Provider that delivered the webhook, when it could be determined.
    pub provider: Option<VoiceProvider>,
    /// Endpoint path the request hit.
    pub endpoint: String,
    /// HTTP method.
    pub method: String,
    /// Status code returned to the provider.
    pub status_code: u16,
    /// End-to-end processing latency in milliseconds.
    pub latency_ms: u64,
    /// Whether processing succeeded.
    pub success: bool,
    /// Error classification when processing failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Tenant the request was for, when known.
    pub tenant_id: Option<TenantId>,
    /// Call the event belonged to, when parsed.
    pub call_id: Option<CallId>,
    /// Requeue count carried by the event.
    pub retry_count: u32,
    /// Free-form metadata.
    pub metadata: serde_json::Value,
    /// When the attempt was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Sink consuming webhook analytics records.
///
/// Implementations must be `Send + Sync`; recording is fire-and-forget from
/// the handler's perspective and must never fail the request.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, attempt: WebhookAttempt);
}

/// In-memory analytics sink for single-instance deployments and tests.
#[derive(Default)]
pub struct MemoryAnalyticsSink {
    records: Mutex<Vec<WebhookAttempt>>,
}

impl MemoryAnalyticsSink {
    /// Create a new empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot all recorded attempts.
    pub fn records(&self) -> Vec<WebhookAttempt> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AnalyticsSink for MemoryAnalyticsSink {
    async fn record(&self, attempt: WebhookAttempt) {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(attempt);
    }
}
