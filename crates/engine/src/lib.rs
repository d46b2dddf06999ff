pub mod builder;
pub mod catalog;
pub mod collaborators;
pub mod engine;
pub mod error;

pub use builder::WorkflowEngineBuilder;
pub use catalog::builtin_workflows;
pub use collaborators::{
    AiAnalysisRequest, AiOrchestrator, AiRequirements, ModuleClient, ModuleDirectory,
    NotificationDispatcher, NotificationRequest, StaticModuleDirectory,
};
pub use engine::{BLOCKED_EVENT, COMPLETED_EVENT, WORKFLOW_MODULE, WorkflowEngine};
pub use error::EngineError;
