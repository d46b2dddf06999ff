pub mod error;
pub mod event;
pub mod execution;
pub mod outcome;
pub mod types;
pub mod workflow;

pub use error::CoreError;
pub use event::{VoiceProvider, WebhookEvent, WebhookEventType};
pub use execution::{ApprovalDecision, ExecutionStatus, PendingApproval, WorkflowExecution};
pub use outcome::{DeadLetterPriority, ProcessingResult};
pub use types::{CallId, ExecutionId, ModuleKey, TenantId, WorkflowId};
pub use workflow::{
    AiTaskType, ConditionOperator, StepKind, TriggerSpec, WorkflowCondition, WorkflowDefinition,
    WorkflowStep, resolve_path,
};
