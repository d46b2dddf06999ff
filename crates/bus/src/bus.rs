use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crossflow_core::ModuleKey;

use crate::event::BusEvent;

/// Capacity of the broadcast observer channel. Lagging observers drop
/// events rather than blocking publishers.
const OBSERVER_CAPACITY: usize = 256;

/// Tenant pattern that matches every tenant.
pub const ALL_TENANTS: &str = "*";

/// Errors raised by event handlers.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("handler error: {0}")]
    Handler(String),
}

/// A subscriber callback invoked for each matching event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &BusEvent) -> Result<(), BusError>;
}

/// Identifies a registered subscription so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    tenant_pattern: String,
    source_module: ModuleKey,
    /// Module that registered the subscription. Used for diagnostics only;
    /// routing is by tenant, source module, and event type.
    target_module: ModuleKey,
    event_types: Vec<String>,
    handler: Arc<dyn EventHandler>,
}

impl Subscription {
    fn matches(&self, event: &BusEvent) -> bool {
        if self.tenant_pattern != ALL_TENANTS && self.tenant_pattern != event.tenant.as_str() {
            return false;
        }
        if self.source_module != event.module {
            return false;
        }
        self.event_types.is_empty()
            || self.event_types.iter().any(|t| t == &event.event_type)
    }
}

/// Publish/subscribe primitive keyed by (tenant, source module, event type).
///
/// Delivery is sequential per publish: each matching handler is awaited in
/// registration order, and a failing handler is logged and isolated so it
/// never blocks the remaining subscribers. A broadcast observer channel
/// mirrors every published event for diagnostics (fire-and-forget; no-op if
/// no observers).
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
    observer_tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Create a new, empty bus.
    #[must_use]
    pub fn new() -> Self {
        let (observer_tx, _) = broadcast::channel(OBSERVER_CAPACITY);
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            observer_tx,
        }
    }

    /// Register a handler for events from `source_module` matching
    /// `event_types`, scoped by `tenant_pattern` (`"*"` = all tenants).
    ///
    /// An empty `event_types` list matches every event type from the module.
    /// Returns an id usable with [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(
        &self,
        tenant_pattern: impl Into<String>,
        source_module: impl Into<ModuleKey>,
        target_module: impl Into<ModuleKey>,
        event_types: Vec<String>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscription = Subscription {
            id,
            tenant_pattern: tenant_pattern.into(),
            source_module: source_module.into(),
            target_module: target_module.into(),
            event_types,
            handler,
        };
        debug!(
            source = %subscription.source_module,
            target = %subscription.target_module,
            tenants = %subscription.tenant_pattern,
            "subscription registered"
        );
        self.subscriptions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(subscription);
        id
    }

    /// Remove a subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .subscriptions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Number of registered subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Obtain a receiver mirroring every published event.
    #[must_use]
    pub fn observe(&self) -> broadcast::Receiver<BusEvent> {
        self.observer_tx.subscribe()
    }

    /// Publish an event to all matching subscribers.
    ///
    /// Returns the number of handlers the event was delivered to.
    pub async fn publish(&self, event: BusEvent) -> usize {
        // Collect matching handlers without holding the lock across awaits.
        let handlers: Vec<(SubscriptionId, Arc<dyn EventHandler>)> = {
            let subs = self
                .subscriptions
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            subs.iter()
                .filter(|s| s.matches(&event))
                .map(|s| (s.id, Arc::clone(&s.handler)))
                .collect()
        };

        debug!(
            module = %event.module,
            event_type = %event.event_type,
            tenant = %event.tenant,
            subscribers = handlers.len(),
            "publishing event"
        );

        let delivered = handlers.len();
        for (id, handler) in handlers {
            if let Err(e) = handler.handle(&event).await {
                warn!(
                    subscription = id.0,
                    event_type = %event.event_type,
                    error = %e,
                    "event handler failed"
                );
            }
        }

        // Mirror to observers; no-op if nobody is listening.
        let _ = self.observer_tx.send(event);

        delivered
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Handler that counts invocations.
    struct Counter {
        count: AtomicUsize,
    }

    impl Counter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                count: AtomicUsize::new(0),
            })
        }

        fn value(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventHandler for Counter {
        async fn handle(&self, _event: &BusEvent) -> Result<(), BusError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Handler that always fails.
    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        async fn handle(&self, _event: &BusEvent) -> Result<(), BusError> {
            Err(BusError::Handler("intentional".into()))
        }
    }

    fn deal_won(tenant: &str) -> BusEvent {
        BusEvent::new("crm", "deal.won", tenant, serde_json::json!({"amount": 1}))
    }

    #[tokio::test]
    async fn delivers_to_matching_subscriber() {
        let bus = EventBus::new();
        let counter = Counter::new();
        bus.subscribe(
            ALL_TENANTS,
            "crm",
            "workflow",
            vec!["deal.won".into()],
            counter.clone(),
        );

        let delivered = bus.publish(deal_won("t1")).await;
        assert_eq!(delivered, 1);
        assert_eq!(counter.value(), 1);
    }

    #[tokio::test]
    async fn wildcard_tenant_matches_all() {
        let bus = EventBus::new();
        let counter = Counter::new();
        bus.subscribe(
            ALL_TENANTS,
            "crm",
            "workflow",
            vec!["deal.won".into()],
            counter.clone(),
        );

        bus.publish(deal_won("t1")).await;
        bus.publish(deal_won("t2")).await;
        assert_eq!(counter.value(), 2);
    }

    #[tokio::test]
    async fn specific_tenant_filters_others() {
        let bus = EventBus::new();
        let counter = Counter::new();
        bus.subscribe(
            "t1",
            "crm",
            "workflow",
            vec!["deal.won".into()],
            counter.clone(),
        );

        bus.publish(deal_won("t1")).await;
        bus.publish(deal_won("t2")).await;
        assert_eq!(counter.value(), 1);
    }

    #[tokio::test]
    async fn wrong_module_or_type_not_delivered() {
        let bus = EventBus::new();
        let counter = Counter::new();
        bus.subscribe(
            ALL_TENANTS,
            "crm",
            "workflow",
            vec!["deal.won".into()],
            counter.clone(),
        );

        bus.publish(BusEvent::new("hr", "deal.won", "t1", serde_json::Value::Null))
            .await;
        bus.publish(BusEvent::new("crm", "deal.lost", "t1", serde_json::Value::Null))
            .await;
        assert_eq!(counter.value(), 0);
    }

    #[tokio::test]
    async fn empty_event_types_matches_everything_from_module() {
        let bus = EventBus::new();
        let counter = Counter::new();
        bus.subscribe(ALL_TENANTS, "crm", "audit", Vec::new(), counter.clone());

        bus.publish(deal_won("t1")).await;
        bus.publish(BusEvent::new("crm", "deal.lost", "t1", serde_json::Value::Null))
            .await;
        assert_eq!(counter.value(), 2);
    }

    #[tokio::test]
    async fn failing_handler_does_not_block_others() {
        let bus = EventBus::new();
        let counter = Counter::new();
        bus.subscribe(
            ALL_TENANTS,
            "crm",
            "broken",
            vec!["deal.won".into()],
            Arc::new(Failing),
        );
        bus.subscribe(
            ALL_TENANTS,
            "crm",
            "workflow",
            vec!["deal.won".into()],
            counter.clone(),
        );

        let delivered = bus.publish(deal_won("t1")).await;
        assert_eq!(delivered, 2);
        assert_eq!(counter.value(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let counter = Counter::new();
        let id = bus.subscribe(
            ALL_TENANTS,
            "crm",
            "workflow",
            vec!["deal.won".into()],
            counter.clone(),
        );

        bus.publish(deal_won("t1")).await;
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id), "second unsubscribe is a no-op");
        bus.publish(deal_won("t1")).await;
        assert_eq!(counter.value(), 1);
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn observer_receives_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.observe();

        bus.publish(deal_won("t1")).await;

        let observed = rx.recv().await.unwrap();
        assert_eq!(observed.event_type, "deal.won");
        assert_eq!(observed.tenant.as_str(), "t1");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_noop() {
        let bus = EventBus::new();
        let delivered = bus.publish(deal_won("t1")).await;
        assert_eq!(delivered, 0);
    }
}
