use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! newtype_string {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Return the inner string as a str slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(TenantId, "A tenant identifier for multi-tenant isolation.");
newtype_string!(ModuleKey, "A named business module a tenant may subscribe to.");
newtype_string!(WorkflowId, "Identifies a workflow definition.");
newtype_string!(ExecutionId, "A unique workflow execution identifier.");
newtype_string!(CallId, "A voice-call identifier assigned by the provider.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_from_str() {
        let module = ModuleKey::from("crm");
        assert_eq!(module.as_str(), "crm");
        assert_eq!(&*module, "crm");
    }

    #[test]
    fn newtype_from_string() {
        let tenant = TenantId::from("tenant-42".to_string());
        assert_eq!(tenant.to_string(), "tenant-42");
    }

    #[test]
    fn newtype_serde_roundtrip() {
        let id = WorkflowId::new("lead-to-hire");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"lead-to-hire\"");
        let back: WorkflowId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn newtype_display() {
        let call = CallId::new("call-abc123");
        assert_eq!(format!("{call}"), "call-abc123");
    }

    #[test]
    fn module_keys_order() {
        let mut keys = vec![ModuleKey::new("hr"), ModuleKey::new("crm")];
        keys.sort();
        assert_eq!(keys[0].as_str(), "crm");
        assert_eq!(keys[1].as_str(), "hr");
    }
}
