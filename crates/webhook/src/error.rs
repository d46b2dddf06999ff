use thiserror::Error;

use crossflow_core::TenantId;
use crossflow_state::StateError;

/// Errors raised while ingesting and processing a webhook.
///
/// The taxonomy matters: security and parse errors are terminal for the
/// request, circuit-open errors are terminal without counting as failures,
/// and only transient infrastructure errors are eligible for retry.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature validation failed. Terminal, never retried.
    #[error("security validation failed: {0}")]
    Security(String),

    /// The provider payload could not be normalized. Terminal, logged.
    #[error("failed to parse webhook payload: {0}")]
    Parse(String),

    /// The tenant's circuit is open; processing was not attempted.
    #[error("circuit open for tenant {0}")]
    CircuitOpen(TenantId),

    /// A downstream call timed out.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A downstream connection was refused or reset.
    #[error("connection error: {0}")]
    Connection(String),

    /// DNS resolution failed for a downstream host.
    #[error("dns resolution failed: {0}")]
    Dns(String),

    /// A downstream service answered with an HTTP error status.
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// A downstream service rejected the call for rate-limit reasons.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The event content failed a business validation. Not retried.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl WebhookError {
    /// Whether the error is a transient infrastructure failure worth
    /// retrying: network-class errors and upstream 502/503/504.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) | Self::Dns(_) => true,
            Self::Upstream { status, .. } => matches!(status, 502 | 503 | 504),
            _ => false,
        }
    }

    /// Short classification tag for analytics records.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Security(_) => "security",
            Self::Parse(_) => "parse",
            Self::CircuitOpen(_) => "circuit_open",
            Self::Timeout(_) => "timeout",
            Self::Connection(_) => "connection",
            Self::Dns(_) => "dns",
            Self::Upstream { .. } => "upstream",
            Self::RateLimited(_) => "rate_limited",
            Self::Validation(_) => "validation",
            Self::State(_) => "state",
            Self::Serialization(_) => "serialization",
            Self::Other(_) => "other",
        }
    }
}

impl From<serde_json::Error> for WebhookError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
