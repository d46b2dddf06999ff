use thiserror::Error;

use crossflow_core::WorkflowId;
use crossflow_state::StateError;

/// Errors raised by the workflow engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(WorkflowId),

    #[error("unknown execution: {0}")]
    UnknownExecution(String),

    #[error("execution {0} is not paused")]
    NotPaused(String),

    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("module directory error: {0}")]
    ModuleDirectory(String),

    #[error("ai orchestration error: {0}")]
    Ai(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("module call error: {0}")]
    ModuleCall(String),

    #[error("step error: {0}")]
    Step(String),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
