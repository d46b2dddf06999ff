use std::collections::VecDeque;

use dashmap::DashMap;

use crossflow_core::{TenantId, WebhookEvent};

/// Per-tenant FIFO queues of events awaiting background retry.
///
/// Purely in-memory with no residency TTL or backpressure: under sustained
/// provider failure the queues grow without bound. The drain task logs
/// per-tenant depths so operators can see pressure building.
#[derive(Debug, Default)]
pub struct RetryQueue {
    queues: DashMap<TenantId, VecDeque<WebhookEvent>>,
}

impl RetryQueue {
    /// Create a new, empty retry queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to its tenant's queue, incrementing the event's
    /// requeue count. Returns the new queue depth for that tenant.
    pub fn push(&self, mut event: WebhookEvent) -> usize {
        event.retry_count += 1;
        let mut queue = self.queues.entry(event.tenant_id.clone()).or_default();
        queue.push_back(event);
        queue.len()
    }

    /// Pop the oldest queued event for a tenant.
    pub fn pop(&self, tenant: &TenantId) -> Option<WebhookEvent> {
        let mut queue = self.queues.get_mut(tenant)?;
        queue.pop_front()
    }

    /// Tenants that currently have queued events.
    #[must_use]
    pub fn tenants(&self) -> Vec<TenantId> {
        self.queues
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Queue depth for one tenant.
    #[must_use]
    pub fn depth(&self, tenant: &TenantId) -> usize {
        self.queues.get(tenant).map_or(0, |q| q.len())
    }

    /// Total queued events across all tenants.
    #[must_use]
    pub fn total(&self) -> usize {
        self.queues.iter().map(|entry| entry.value().len()).sum()
    }
}
