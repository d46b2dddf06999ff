use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossflow_bus::EventBus;
use crossflow_core::{WorkflowDefinition, WorkflowId};
use crossflow_state::StateStore;

use crate::collaborators::{AiOrchestrator, ModuleClient, ModuleDirectory, NotificationDispatcher};
use crate::engine::WorkflowEngine;
use crate::error::EngineError;

/// Fluent builder for constructing a [`WorkflowEngine`].
///
/// Every collaborator is required; workflow definitions are validated in
/// [`build`](Self::build) so malformed catalogs fail at construction time,
/// not mid-execution.
pub struct WorkflowEngineBuilder {
    bus: Option<Arc<EventBus>>,
    store: Option<Arc<dyn StateStore>>,
    modules: Option<Arc<dyn ModuleDirectory>>,
    ai: Option<Arc<dyn AiOrchestrator>>,
    notifications: Option<Arc<dyn NotificationDispatcher>>,
    module_client: Option<Arc<dyn ModuleClient>>,
    definitions: Vec<WorkflowDefinition>,
    terminal_ttl: Duration,
}

impl WorkflowEngineBuilder {
    /// Create a new builder with no collaborators configured.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bus: None,
            store: None,
            modules: None,
            ai: None,
            notifications: None,
            module_client: None,
            definitions: Vec::new(),
            terminal_ttl: Duration::from_secs(60),
        }
    }

    /// Set the event bus.
    #[must_use]
    pub fn bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Set the state store backing executions and approvals.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the module entitlement directory.
    #[must_use]
    pub fn modules(mut self, modules: Arc<dyn ModuleDirectory>) -> Self {
        self.modules = Some(modules);
        self
    }

    /// Set the AI orchestration collaborator.
    #[must_use]
    pub fn ai(mut self, ai: Arc<dyn AiOrchestrator>) -> Self {
        self.ai = Some(ai);
        self
    }

    /// Set the notification dispatcher.
    #[must_use]
    pub fn notifications(mut self, notifications: Arc<dyn NotificationDispatcher>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    /// Set the module client used by data-sync and external-API steps.
    #[must_use]
    pub fn module_client(mut self, client: Arc<dyn ModuleClient>) -> Self {
        self.module_client = Some(client);
        self
    }

    /// Register a workflow definition.
    #[must_use]
    pub fn workflow(mut self, definition: WorkflowDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Register several workflow definitions.
    #[must_use]
    pub fn workflows(mut self, definitions: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
        self.definitions.extend(definitions);
        self
    }

    /// How long terminal executions stay queryable (default 60s).
    #[must_use]
    pub fn terminal_ttl(mut self, ttl: Duration) -> Self {
        self.terminal_ttl = ttl;
        self
    }

    /// Consume the builder and produce a configured [`WorkflowEngine`].
    ///
    /// Returns [`EngineError::Configuration`] when a collaborator is
    /// missing and [`EngineError::InvalidDefinition`] when any registered
    /// workflow fails validation or ids collide.
    pub fn build(self) -> Result<WorkflowEngine, EngineError> {
        let bus = self
            .bus
            .ok_or_else(|| EngineError::Configuration("event bus is required".into()))?;
        let store = self
            .store
            .ok_or_else(|| EngineError::Configuration("state store is required".into()))?;
        let modules = self
            .modules
            .ok_or_else(|| EngineError::Configuration("module directory is required".into()))?;
        let ai = self
            .ai
            .ok_or_else(|| EngineError::Configuration("ai orchestrator is required".into()))?;
        let notifications = self.notifications.ok_or_else(|| {
            EngineError::Configuration("notification dispatcher is required".into())
        })?;
        let module_client = self
            .module_client
            .ok_or_else(|| EngineError::Configuration("module client is required".into()))?;

        let mut definitions: HashMap<WorkflowId, WorkflowDefinition> = HashMap::new();
        for definition in self.definitions {
            let errors = definition.validate();
            if !errors.is_empty() {
                return Err(EngineError::InvalidDefinition(errors.join("; ")));
            }
            if definitions.contains_key(&definition.id) {
                return Err(EngineError::InvalidDefinition(format!(
                    "duplicate workflow id: `{}`",
                    definition.id
                )));
            }
            definitions.insert(definition.id.clone(), definition);
        }

        Ok(WorkflowEngine::new(
            definitions,
            bus,
            store,
            modules,
            ai,
            notifications,
            module_client,
            self.terminal_ttl,
        ))
    }
}

impl Default for WorkflowEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use crossflow_core::{StepKind, TriggerSpec, WorkflowStep};
    use crossflow_state_memory::MemoryStateStore;

    use crate::collaborators::{
        AiAnalysisRequest, NotificationRequest, StaticModuleDirectory,
    };

    use super::*;

    struct NullAi;

    #[async_trait]
    impl AiOrchestrator for NullAi {
        async fn analyze(
            &self,
            _request: AiAnalysisRequest,
        ) -> Result<serde_json::Value, EngineError> {
            Ok(serde_json::Value::Null)
        }
    }

    struct NullNotifier;

    #[async_trait]
    impl NotificationDispatcher for NullNotifier {
        async fn dispatch(&self, _notification: &NotificationRequest) -> Result<(), EngineError> {
            Ok(())
        }
    }

    struct NullClient;

    #[async_trait]
    impl ModuleClient for NullClient {
        async fn apply_change(
            &self,
            _tenant: &crossflow_core::TenantId,
            _module: &crossflow_core::ModuleKey,
            _action: &str,
            _parameters: &serde_json::Value,
        ) -> Result<serde_json::Value, EngineError> {
            Ok(serde_json::Value::Null)
        }

        async fn call_endpoint(
            &self,
            _tenant: &crossflow_core::TenantId,
            _endpoint: &str,
            _parameters: &serde_json::Value,
        ) -> Result<serde_json::Value, EngineError> {
            Ok(serde_json::Value::Null)
        }
    }

    fn full_builder() -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::new()
            .bus(Arc::new(EventBus::new()))
            .store(Arc::new(MemoryStateStore::new()))
            .modules(Arc::new(StaticModuleDirectory::new()))
            .ai(Arc::new(NullAi))
            .notifications(Arc::new(NullNotifier))
            .module_client(Arc::new(NullClient))
    }

    fn valid_workflow(id: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(id, "Test")
            .with_trigger(TriggerSpec::new("deal.won", "crm"))
            .with_step(WorkflowStep::new(
                "notify",
                "Notify",
                StepKind::Notification,
                "crm",
                "notify_owner",
            ))
    }

    #[test]
    fn build_missing_bus_fails() {
        let result = WorkflowEngineBuilder::new()
            .store(Arc::new(MemoryStateStore::new()))
            .build();
        let err = result.err().expect("build should fail");
        assert!(err.to_string().contains("event bus is required"));
    }

    #[test]
    fn build_missing_collaborator_fails() {
        let result = WorkflowEngineBuilder::new()
            .bus(Arc::new(EventBus::new()))
            .store(Arc::new(MemoryStateStore::new()))
            .modules(Arc::new(StaticModuleDirectory::new()))
            .build();
        let err = result.err().expect("build should fail");
        assert!(err.to_string().contains("ai orchestrator is required"));
    }

    #[test]
    fn build_with_valid_workflows_succeeds() {
        let engine = full_builder()
            .workflow(valid_workflow("a"))
            .workflow(valid_workflow("b"))
            .build()
            .expect("build should succeed");
        assert!(engine.definition(&WorkflowId::new("a")).is_some());
        assert!(engine.definition(&WorkflowId::new("b")).is_some());
    }

    #[test]
    fn build_rejects_invalid_definition() {
        let broken = WorkflowDefinition::new("broken", "Broken")
            .with_trigger(TriggerSpec::new("x", "crm"))
            .with_step(
                WorkflowStep::new("a", "A", StepKind::DataSync, "crm", "sync").with_next("ghost"),
            );
        let err = full_builder().workflow(broken).build().err().unwrap();
        assert!(matches!(err, EngineError::InvalidDefinition(_)));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn build_rejects_duplicate_workflow_ids() {
        let err = full_builder()
            .workflow(valid_workflow("same"))
            .workflow(valid_workflow("same"))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("duplicate workflow id"));
    }
}
