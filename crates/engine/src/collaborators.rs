use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crossflow_core::{AiTaskType, ModuleKey, TenantId};

use crate::error::EngineError;

/// Answers "which modules does this tenant have active".
///
/// The engine treats the directory as authoritative and re-queries it on
/// every trigger; no caching happens inside the engine.
#[async_trait]
pub trait ModuleDirectory: Send + Sync {
    async fn active_modules(&self, tenant: &TenantId) -> Result<BTreeSet<ModuleKey>, EngineError>;
}

/// Requirements forwarded to the AI orchestration collaborator.
///
/// These are requests, not guarantees — the engine passes them through and
/// does not enforce them itself.
#[derive(Debug, Clone)]
pub struct AiRequirements {
    /// Whether the analysis may draw on data from other modules.
    pub cross_module_context: bool,
    /// Upper bound on analysis time.
    pub max_execution_time: Duration,
    /// Minimum acceptable confidence/accuracy.
    pub accuracy_threshold: f64,
}

impl Default for AiRequirements {
    fn default() -> Self {
        Self {
            cross_module_context: true,
            max_execution_time: Duration::from_secs(30),
            accuracy_threshold: 0.8,
        }
    }
}

/// One analysis request handed to the AI orchestrator.
#[derive(Debug, Clone)]
pub struct AiAnalysisRequest {
    /// Tenant the analysis runs for.
    pub tenant_id: TenantId,
    /// What kind of analysis to perform.
    pub task: AiTaskType,
    /// Step parameters (the analysis input).
    pub input: serde_json::Value,
    /// Accumulated execution context (trigger payload + prior step results).
    pub context: serde_json::Value,
    /// Execution requirements.
    pub requirements: AiRequirements,
}

/// AI orchestration collaborator.
///
/// The returned analysis object is merged verbatim into the execution
/// context under the step's id.
#[async_trait]
pub trait AiOrchestrator: Send + Sync {
    async fn analyze(&self, request: AiAnalysisRequest) -> Result<serde_json::Value, EngineError>;
}

/// An outbound notification produced by a notification step.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    /// Tenant the notification belongs to.
    pub tenant_id: TenantId,
    /// Module whose audience should be notified.
    pub module: ModuleKey,
    /// Notification action name.
    pub action: String,
    /// Step parameters (message content, recipients, ...).
    pub parameters: serde_json::Value,
}

/// Delivers notifications. Delivery is not verified by the engine.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: &NotificationRequest) -> Result<(), EngineError>;
}

/// Applies side effects to business modules and calls external APIs on
/// behalf of `data_sync` / `external_api` steps.
#[async_trait]
pub trait ModuleClient: Send + Sync {
    /// Apply a change to a module. Returns the module's response.
    async fn apply_change(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        action: &str,
        parameters: &serde_json::Value,
    ) -> Result<serde_json::Value, EngineError>;

    /// Call an opaque external endpoint.
    async fn call_endpoint(
        &self,
        tenant: &TenantId,
        endpoint: &str,
        parameters: &serde_json::Value,
    ) -> Result<serde_json::Value, EngineError>;
}

/// In-memory [`ModuleDirectory`] with per-tenant module sets.
///
/// Suitable for tests and single-instance deployments where entitlements
/// are configured statically.
#[derive(Debug, Default)]
pub struct StaticModuleDirectory {
    modules: DashMap<TenantId, BTreeSet<ModuleKey>>,
}

impl StaticModuleDirectory {
    /// Create an empty directory; tenants default to no active modules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a tenant's active module set.
    pub fn set_modules(
        &self,
        tenant: impl Into<TenantId>,
        modules: impl IntoIterator<Item = ModuleKey>,
    ) {
        self.modules
            .insert(tenant.into(), modules.into_iter().collect());
    }
}

#[async_trait]
impl ModuleDirectory for StaticModuleDirectory {
    async fn active_modules(&self, tenant: &TenantId) -> Result<BTreeSet<ModuleKey>, EngineError> {
        Ok(self
            .modules
            .get(tenant)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}
