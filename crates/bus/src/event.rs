use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crossflow_core::{ModuleKey, TenantId};

/// An event published on the bus by a business module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    /// Unique event identifier (UUID v7, time-ordered).
    pub id: String,

    /// Module the event originates from.
    pub module: ModuleKey,

    /// Event type within the module's namespace (e.g. `deal.won`).
    pub event_type: String,

    /// Tenant the event belongs to.
    pub tenant: TenantId,

    /// Event payload.
    pub payload: serde_json::Value,

    /// When the event was published.
    pub timestamp: DateTime<Utc>,
}

impl BusEvent {
    /// Create a new event with a generated id and `timestamp` now.
    #[must_use]
    pub fn new(
        module: impl Into<ModuleKey>,
        event_type: impl Into<String>,
        tenant: impl Into<TenantId>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            module: module.into(),
            event_type: event_type.into(),
            tenant: tenant.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_creation() {
        let event = BusEvent::new("crm", "deal.won", "t1", serde_json::json!({"amount": 100}));
        assert_eq!(event.module.as_str(), "crm");
        assert_eq!(event.event_type, "deal.won");
        assert_eq!(event.tenant.as_str(), "t1");
        assert!(!event.id.is_empty());
    }

    #[test]
    fn event_serde_roundtrip() {
        let event = BusEvent::new("hr", "candidate.hired", "t2", serde_json::Value::Null);
        let json = serde_json::to_string(&event).unwrap();
        let back: BusEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.event_type, "candidate.hired");
    }

    #[test]
    fn event_ids_are_time_ordered() {
        let a = BusEvent::new("crm", "x", "t", serde_json::Value::Null);
        let b = BusEvent::new("crm", "x", "t", serde_json::Value::Null);
        assert!(a.id <= b.id, "v7 ids should be monotonic");
    }
}
