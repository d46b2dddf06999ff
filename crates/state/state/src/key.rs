use serde::{Deserialize, Serialize};

use crossflow_core::TenantId;

/// The kind of state being stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Workflow execution records.
    Execution,
    /// Approval records awaiting a human decision.
    Approval,
    /// Lead records built up from call events.
    Lead,
    /// Generic counters.
    Counter,
    Custom(String),
}

impl KeyKind {
    /// Return a string representation of the key kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Execution => "execution",
            Self::Approval => "approval",
            Self::Lead => "lead",
            Self::Counter => "counter",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key used to address state entries in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub tenant: TenantId,
    pub kind: KeyKind,
    pub id: String,
}

impl StateKey {
    /// Create a new state key.
    #[must_use]
    pub fn new(tenant: impl Into<TenantId>, kind: KeyKind, id: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            kind,
            id: id.into(),
        }
    }

    /// Return a canonical string representation: `tenant:kind:id`
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}:{}:{}", self.tenant, self.kind, self.id)
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_kind_as_str() {
        assert_eq!(KeyKind::Execution.as_str(), "execution");
        assert_eq!(KeyKind::Approval.as_str(), "approval");
        assert_eq!(KeyKind::Lead.as_str(), "lead");
        assert_eq!(KeyKind::Counter.as_str(), "counter");
        assert_eq!(KeyKind::Custom("foo".into()).as_str(), "foo");
    }

    #[test]
    fn state_key_canonical() {
        let key = StateKey::new("t1", KeyKind::Execution, "exec-42");
        assert_eq!(key.canonical(), "t1:execution:exec-42");
    }

    #[test]
    fn state_key_serde_roundtrip() {
        let key = StateKey::new("t1", KeyKind::Lead, "lead-9");
        let json = serde_json::to_string(&key).unwrap();
        let back: StateKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
