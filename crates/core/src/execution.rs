use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ExecutionId, TenantId, WorkflowId};

/// Key under which the trigger payload is stored in the execution context.
pub const TRIGGER_CONTEXT_KEY: &str = "trigger";

/// Status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Steps are being executed.
    Running,
    /// All steps completed successfully.
    Completed,
    /// A step failed with no usable fallback.
    Failed,
    /// An approval step is awaiting a decision.
    Paused,
}

impl ExecutionStatus {
    /// Return a string representation of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }

    /// Whether the execution has reached a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision applied when resuming a paused execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

/// A record of an approval step awaiting a human decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    /// The paused execution.
    pub execution_id: ExecutionId,
    /// Workflow the execution belongs to.
    pub workflow_id: WorkflowId,
    /// The approval step that paused the execution.
    pub step_id: String,
    /// Tenant owning the execution.
    pub tenant_id: TenantId,
    /// When the approval was requested.
    pub requested_at: DateTime<Utc>,
}

/// Runtime state of a single workflow execution.
///
/// Mutated step-by-step by the engine; retained briefly after reaching a
/// terminal state, then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Unique execution identifier.
    pub id: ExecutionId,
    /// Workflow definition this execution runs.
    pub workflow_id: WorkflowId,
    /// Tenant the triggering event belonged to.
    pub tenant_id: TenantId,
    /// Current status.
    pub status: ExecutionStatus,
    /// Id of the step currently being (or about to be) executed.
    pub current_step: String,
    /// Accumulated step results keyed by step id, plus the trigger payload
    /// under [`TRIGGER_CONTEXT_KEY`].
    pub context: serde_json::Map<String, serde_json::Value>,
    /// When the execution started.
    pub started_at: DateTime<Utc>,
    /// When the execution reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message if the execution failed.
    pub error: Option<String>,
}

impl WorkflowExecution {
    /// Create a new running execution positioned at `entry_step`, with the
    /// trigger payload seeded into the context.
    #[must_use]
    pub fn new(
        workflow_id: impl Into<WorkflowId>,
        tenant_id: impl Into<TenantId>,
        entry_step: impl Into<String>,
        trigger_payload: serde_json::Value,
    ) -> Self {
        let mut context = serde_json::Map::new();
        context.insert(TRIGGER_CONTEXT_KEY.to_owned(), trigger_payload);
        Self {
            id: ExecutionId::new(Uuid::new_v4().to_string()),
            workflow_id: workflow_id.into(),
            tenant_id: tenant_id.into(),
            status: ExecutionStatus::Running,
            current_step: entry_step.into(),
            context,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Merge a step result into the context under the step's id.
    pub fn record_step(&mut self, step_id: &str, result: serde_json::Value) {
        self.context.insert(step_id.to_owned(), result);
    }

    /// Mark the execution completed.
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the execution failed with the given error.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    /// Pause the execution at the given approval step.
    pub fn pause(&mut self, step_id: &str) {
        self.status = ExecutionStatus::Paused;
        self.current_step = step_id.to_owned();
    }

    /// Number of step results recorded so far (the trigger payload is not a
    /// step result).
    #[must_use]
    pub fn steps_completed(&self) -> usize {
        self.context
            .keys()
            .filter(|k| k.as_str() != TRIGGER_CONTEXT_KEY)
            .count()
    }

    /// Elapsed wall-clock duration, up to `completed_at` for terminal
    /// executions or now for live ones.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds()
    }
}
