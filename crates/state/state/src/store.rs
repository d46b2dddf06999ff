use std::time::Duration;

use async_trait::async_trait;

use crossflow_core::TenantId;

use crate::error::StateError;
use crate::key::{KeyKind, StateKey};

/// Trait for persisting Crossflow state.
///
/// Everything the engine and webhook pipeline keep between events —
/// executions, approvals, leads, counters — goes through this interface so
/// that a durable or distributed backend can be substituted without touching
/// engine logic.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Check if a key exists; if not, set it atomically with an optional TTL.
    /// Returns `true` if the key was newly set, `false` if it already existed.
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError>;

    /// Get the value for a key. Returns `None` if not found or expired.
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError>;

    /// Set a value with an optional TTL, overwriting any previous value.
    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &StateKey) -> Result<bool, StateError>;

    /// Atomically increment a counter by `delta`. Returns the new value.
    /// Creates the counter at 0 if it doesn't exist before incrementing.
    async fn increment(
        &self,
        key: &StateKey,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StateError>;

    /// Scan all live entries of a given kind for one tenant.
    ///
    /// Returns `(id, value)` pairs. This operation may be expensive on some
    /// backends. Use sparingly.
    async fn scan(
        &self,
        tenant: &TenantId,
        kind: KeyKind,
    ) -> Result<Vec<(String, String)>, StateError>;
}
