use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crossflow_core::{DeadLetterPriority, TenantId, VoiceProvider, WebhookEvent};

/// A webhook event that exhausted in-process retries, captured for
/// out-of-band replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedWebhookEvent {
    /// Unique dead-letter entry id.
    pub id: String,
    /// Canonical event type string.
    pub event_type: String,
    /// Provider that delivered the original webhook.
    pub source_provider: VoiceProvider,
    /// The canonical event, preserved for replay.
    pub payload: WebhookEvent,
    /// Headers from the original request (signature headers excluded).
    pub original_headers: HashMap<String, String>,
    /// Why processing ultimately failed.
    pub failure_reason: String,
    /// Optional stack/chain of error causes.
    pub stack_trace: Option<String>,
    /// Tenant the event belongs to.
    pub tenant_id: TenantId,
    /// Replay priority derived from the event type.
    pub priority: DeadLetterPriority,
    /// Maximum replay attempts an out-of-band replayer should make.
    pub max_retries: u32,
    /// When the entry was dead-lettered.
    pub created_at: DateTime<Utc>,
}

impl FailedWebhookEvent {
    /// Build a dead-letter entry from a failed event.
    ///
    /// The priority is derived from the event type; replay budget defaults
    /// to 3 attempts.
    #[must_use]
    pub fn from_event(
        event: &WebhookEvent,
        original_headers: HashMap<String, String>,
        failure_reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            event_type: event.event_type.as_str().to_owned(),
            source_provider: event.provider,
            payload: event.clone(),
            original_headers,
            failure_reason: failure_reason.into(),
            stack_trace: None,
            tenant_id: event.tenant_id.clone(),
            priority: DeadLetterPriority::for_event_type(&event.event_type),
            max_retries: 3,
            created_at: Utc::now(),
        }
    }
}

/// Trait for dead-letter queue backends.
///
/// Implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Append a failed event to the dead-letter queue.
    async fn add_failed_event(&self, entry: FailedWebhookEvent);

    /// Snapshot all entries without removing them.
    async fn list(&self) -> Vec<FailedWebhookEvent>;

    /// Drain all entries from the queue, returning them.
    async fn drain(&self) -> Vec<FailedWebhookEvent>;

    /// Return the number of entries in the queue.
    async fn len(&self) -> usize;

    /// Return true if the queue is empty.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// In-memory dead-letter queue.
///
/// A simple append-only buffer guarded by a [`Mutex`]. In a production
/// deployment this would be backed by durable storage; the in-memory
/// implementation is suitable for single-instance deployments and tests.
///
/// # Thread safety
///
/// Because the lock is a standard `Mutex` (not `tokio::sync::Mutex`),
/// callers must not hold the lock across `.await` points. The public API
/// ensures this by never returning a guard.
#[derive(Default)]
pub struct MemoryDeadLetterQueue {
    entries: Mutex<Vec<FailedWebhookEvent>>,
}

impl MemoryDeadLetterQueue {
    /// Create a new empty dead-letter queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<FailedWebhookEvent>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl DeadLetterStore for MemoryDeadLetterQueue {
    async fn add_failed_event(&self, entry: FailedWebhookEvent) {
        self.lock().push(entry);
    }

    async fn list(&self) -> Vec<FailedWebhookEvent> {
        self.lock().clone()
    }

    async fn drain(&self) -> Vec<FailedWebhookEvent> {
        std::mem::take(&mut *self.lock())
    }

    async fn len(&self) -> usize {
        self.lock().len()
    }
}
