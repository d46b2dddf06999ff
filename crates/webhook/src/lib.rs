pub mod analytics;
pub mod breaker;
pub mod dlq;
pub mod error;
pub mod handler;
pub mod providers;
pub mod queue;
pub mod retry;

pub use analytics::{AnalyticsSink, MemoryAnalyticsSink, WebhookAttempt};
pub use breaker::{BreakerConfig, BreakerStatus, CircuitBreakerRegistry, CircuitState};
pub use dlq::{DeadLetterStore, FailedWebhookEvent, MemoryDeadLetterQueue};
pub use error::WebhookError;
pub use handler::{
    CallProcessing, WebhookConfig, WebhookProcessor, WebhookRequest, WebhookResponse,
    WorkflowLauncher,
};
pub use queue::RetryQueue;
pub use retry::RetryPolicy;
