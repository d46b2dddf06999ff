use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crossflow_bus::{ALL_TENANTS, BusError, BusEvent, EventBus, EventHandler, SubscriptionId};
use crossflow_core::{
    ApprovalDecision, ExecutionId, ModuleKey, PendingApproval, TenantId, WorkflowDefinition,
    WorkflowExecution, WorkflowId, WorkflowStep,
};
use crossflow_core::{ExecutionStatus, StepKind};
use crossflow_state::{KeyKind, StateKey, StateStore};

use crate::collaborators::{
    AiAnalysisRequest, AiOrchestrator, AiRequirements, ModuleClient, ModuleDirectory,
    NotificationDispatcher, NotificationRequest,
};
use crate::error::EngineError;

/// Module name the engine publishes its own lifecycle events under.
pub const WORKFLOW_MODULE: &str = "workflow";

/// Event published when a trigger matched but the tenant lacks modules.
pub const BLOCKED_EVENT: &str = "workflow.blocked";

/// Event published when an execution completes normally.
pub const COMPLETED_EVENT: &str = "workflow.completed";

/// Result of executing one step.
enum StepOutcome {
    /// The step finished; its result goes into the execution context.
    Completed(serde_json::Value),
    /// An approval step paused the execution.
    Paused,
}

/// Event-driven engine executing declarative cross-module workflows.
///
/// Built via [`WorkflowEngineBuilder`](crate::builder::WorkflowEngineBuilder);
/// construction has no side effects. Call [`start`](Self::start) to
/// subscribe to the event bus for every declared trigger (tenant pattern
/// `*`) and [`stop`](Self::stop) to remove those subscriptions again.
///
/// Executions run strictly sequentially: one step completes before the
/// next begins, following each step's single successor. Different
/// executions interleave freely with no cross-execution coordination.
pub struct WorkflowEngine {
    pub(crate) definitions: HashMap<WorkflowId, WorkflowDefinition>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) modules: Arc<dyn ModuleDirectory>,
    pub(crate) ai: Arc<dyn AiOrchestrator>,
    pub(crate) notifications: Arc<dyn NotificationDispatcher>,
    pub(crate) module_client: Arc<dyn ModuleClient>,
    /// How long terminal executions stay queryable before the store
    /// expires them.
    pub(crate) terminal_ttl: Duration,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

/// Bus subscriber forwarding trigger events into the engine.
///
/// Holds a weak reference so engine drop is not prevented by live
/// subscriptions.
struct TriggerSubscriber {
    engine: Weak<WorkflowEngine>,
    workflow_id: WorkflowId,
}

#[async_trait]
impl EventHandler for TriggerSubscriber {
    async fn handle(&self, event: &BusEvent) -> Result<(), BusError> {
        let Some(engine) = self.engine.upgrade() else {
            return Ok(());
        };
        engine
            .handle_trigger(&self.workflow_id, event)
            .await
            .map_err(|e| BusError::Handler(e.to_string()))
    }
}

impl WorkflowEngine {
    pub(crate) fn new(
        definitions: HashMap<WorkflowId, WorkflowDefinition>,
        bus: Arc<EventBus>,
        store: Arc<dyn StateStore>,
        modules: Arc<dyn ModuleDirectory>,
        ai: Arc<dyn AiOrchestrator>,
        notifications: Arc<dyn NotificationDispatcher>,
        module_client: Arc<dyn ModuleClient>,
        terminal_ttl: Duration,
    ) -> Self {
        Self {
            definitions,
            bus,
            store,
            modules,
            ai,
            notifications,
            module_client,
            terminal_ttl,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to the event bus for every declared trigger, scoped to all
    /// tenants. Calling it twice doubles the subscriptions — pair every
    /// `start` with a `stop`.
    pub fn start(engine: &Arc<Self>) {
        let mut ids = Vec::new();
        for definition in engine.definitions.values() {
            for trigger in &definition.trigger_events {
                let subscriber = TriggerSubscriber {
                    engine: Arc::downgrade(engine),
                    workflow_id: definition.id.clone(),
                };
                let id = engine.bus.subscribe(
                    ALL_TENANTS,
                    trigger.source_module.clone(),
                    ModuleKey::new(WORKFLOW_MODULE),
                    vec![trigger.event_type.clone()],
                    Arc::new(subscriber),
                );
                ids.push(id);
            }
        }
        info!(
            workflows = engine.definitions.len(),
            subscriptions = ids.len(),
            "workflow engine started"
        );
        engine
            .subscriptions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend(ids);
    }

    /// Remove every subscription registered by [`start`](Self::start).
    pub fn stop(&self) {
        let ids: Vec<SubscriptionId> = self
            .subscriptions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain(..)
            .collect();
        for id in &ids {
            self.bus.unsubscribe(*id);
        }
        info!(subscriptions = ids.len(), "workflow engine stopped");
    }

    /// Look up a workflow definition by id.
    #[must_use]
    pub fn definition(&self, id: &WorkflowId) -> Option<&WorkflowDefinition> {
        self.definitions.get(id)
    }

    /// Workflows whose required modules are all active for the tenant,
    /// sorted by id.
    pub async fn available_workflows(
        &self,
        tenant: &TenantId,
    ) -> Result<Vec<&WorkflowDefinition>, EngineError> {
        let active = self.modules.active_modules(tenant).await?;
        let mut available: Vec<&WorkflowDefinition> = self
            .definitions
            .values()
            .filter(|d| d.is_active && d.required_modules.iter().all(|m| active.contains(m)))
            .collect();
        available.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(available)
    }

    /// Executions currently retained for a tenant (running, paused, and
    /// terminal ones still inside the retention window), sorted by start
    /// time.
    pub async fn executions_for_tenant(
        &self,
        tenant: &TenantId,
    ) -> Result<Vec<WorkflowExecution>, EngineError> {
        let entries = self.store.scan(tenant, KeyKind::Execution).await?;
        let mut executions = Vec::with_capacity(entries.len());
        for (id, value) in entries {
            match serde_json::from_str::<WorkflowExecution>(&value) {
                Ok(execution) => executions.push(execution),
                Err(e) => warn!(execution_id = %id, error = %e, "unreadable execution record"),
            }
        }
        executions.sort_by_key(|e| e.started_at);
        Ok(executions)
    }

    /// Approvals awaiting a decision for a tenant.
    pub async fn pending_approvals(
        &self,
        tenant: &TenantId,
    ) -> Result<Vec<PendingApproval>, EngineError> {
        let entries = self.store.scan(tenant, KeyKind::Approval).await?;
        let mut approvals = Vec::with_capacity(entries.len());
        for (id, value) in entries {
            match serde_json::from_str::<PendingApproval>(&value) {
                Ok(approval) => approvals.push(approval),
                Err(e) => warn!(approval_id = %id, error = %e, "unreadable approval record"),
            }
        }
        approvals.sort_by_key(|a| a.requested_at);
        Ok(approvals)
    }

    /// Evaluate a trigger event for one workflow and execute it if the
    /// tenant is entitled and every condition holds.
    #[instrument(
        skip(self, event),
        fields(workflow = %workflow_id, tenant = %event.tenant, event_type = %event.event_type)
    )]
    pub async fn handle_trigger(
        &self,
        workflow_id: &WorkflowId,
        event: &BusEvent,
    ) -> Result<(), EngineError> {
        // 1. Unknown or inactive workflows are skipped silently.
        let Some(definition) = self.definitions.get(workflow_id) else {
            debug!("trigger for unknown workflow, skipping");
            return Ok(());
        };
        if !definition.is_active {
            debug!("workflow inactive, skipping");
            return Ok(());
        }

        // Trigger-level conditions are part of trigger matching: a
        // non-matching event is skipped silently.
        let matched = definition
            .trigger_events
            .iter()
            .filter(|t| t.source_module == event.module && t.event_type == event.event_type)
            .any(|t| t.conditions.iter().all(|c| c.evaluate(&event.payload)));
        if !matched {
            debug!("trigger conditions not met, skipping");
            return Ok(());
        }

        // 2. Subscription gate: every required module must be active. A gap
        // publishes exactly one blocked event for upgrade prompts.
        let active = self.modules.active_modules(&event.tenant).await?;
        let missing: Vec<&ModuleKey> = definition
            .required_modules
            .iter()
            .filter(|m| !active.contains(*m))
            .collect();
        if !missing.is_empty() {
            info!(?missing, "workflow blocked by missing modules");
            self.bus
                .publish(BusEvent::new(
                    WORKFLOW_MODULE,
                    BLOCKED_EVENT,
                    event.tenant.clone(),
                    serde_json::json!({
                        "workflow_id": &definition.id,
                        "reason": "insufficient_modules",
                        "required_modules": &definition.required_modules,
                        "missing_modules": missing,
                    }),
                ))
                .await;
            return Ok(());
        }

        // 3. Global conditions: any failure aborts silently.
        if !definition
            .conditions
            .iter()
            .all(|c| c.evaluate(&event.payload))
        {
            debug!("global conditions not met, skipping");
            return Ok(());
        }

        // 4. Create the execution and run steps.
        let mut execution = WorkflowExecution::new(
            definition.id.clone(),
            event.tenant.clone(),
            definition.entry_step.clone(),
            event.payload.clone(),
        );
        info!(execution_id = %execution.id, "workflow execution started");
        self.persist_execution(&execution, None).await?;
        self.run_execution(definition, &mut execution).await
    }

    /// Resume a paused execution with an approval decision.
    ///
    /// Approved continues at the approval step's successor; rejected marks
    /// the execution failed. Returns the execution's final snapshot.
    #[instrument(skip(self), fields(tenant = %tenant, execution = %execution_id))]
    pub async fn resume_execution(
        &self,
        tenant: &TenantId,
        execution_id: &ExecutionId,
        decision: ApprovalDecision,
    ) -> Result<WorkflowExecution, EngineError> {
        let key = StateKey::new(tenant.clone(), KeyKind::Execution, execution_id.as_str());
        let raw = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| EngineError::UnknownExecution(execution_id.to_string()))?;
        let mut execution: WorkflowExecution = serde_json::from_str(&raw)?;

        if execution.status != ExecutionStatus::Paused {
            return Err(EngineError::NotPaused(execution_id.to_string()));
        }

        let definition = self
            .definitions
            .get(&execution.workflow_id)
            .ok_or_else(|| EngineError::UnknownWorkflow(execution.workflow_id.clone()))?;

        // The pending approval is consumed by the decision either way.
        let approval_key =
            StateKey::new(tenant.clone(), KeyKind::Approval, execution_id.as_str());
        self.store.delete(&approval_key).await?;

        let approval_step_id = execution.current_step.clone();
        execution.record_step(
            &approval_step_id,
            serde_json::json!({
                "approved": decision == ApprovalDecision::Approved,
                "decided_at": Utc::now(),
            }),
        );

        match decision {
            ApprovalDecision::Rejected => {
                info!(step = %approval_step_id, "approval rejected, failing execution");
                execution.fail(format!("approval rejected at step `{approval_step_id}`"));
                self.persist_execution(&execution, Some(self.terminal_ttl))
                    .await?;
                Ok(execution)
            }
            ApprovalDecision::Approved => {
                info!(step = %approval_step_id, "approval granted, resuming");
                execution.status = ExecutionStatus::Running;
                let next = definition
                    .step(&approval_step_id)
                    .and_then(|s| s.next_step.clone());
                match next {
                    Some(next_step) => {
                        execution.current_step = next_step;
                        self.run_execution(definition, &mut execution).await?;
                    }
                    None => self.complete_execution(&mut execution).await?,
                }
                Ok(execution)
            }
        }
    }

    /// Execute steps sequentially from `execution.current_step` until the
    /// execution completes, fails, or pauses.
    async fn run_execution(
        &self,
        definition: &WorkflowDefinition,
        execution: &mut WorkflowExecution,
    ) -> Result<(), EngineError> {
        loop {
            let Some(step) = definition.step(&execution.current_step) else {
                // Unreachable for validated definitions; degrade to a failed
                // execution rather than a panic.
                execution.fail(format!("step `{}` not found", execution.current_step));
                self.persist_execution(execution, Some(self.terminal_ttl))
                    .await?;
                return Ok(());
            };

            match self.execute_step(step, execution).await {
                Ok(StepOutcome::Completed(result)) => {
                    execution.record_step(&step.id, result);
                    self.persist_execution(execution, None).await?;
                    match &step.next_step {
                        Some(next) => execution.current_step.clone_from(next),
                        None => return self.complete_execution(execution).await,
                    }
                }
                Ok(StepOutcome::Paused) => {
                    return self.pause_execution(definition, &step.id.clone(), execution).await;
                }
                Err(step_error) => {
                    warn!(
                        execution_id = %execution.id,
                        step = %step.id,
                        error = %step_error,
                        "workflow step failed"
                    );
                    // Single-level fallback: run the first declared fallback
                    // instead, then continue along its successor. A failing
                    // fallback terminates the execution — fallbacks never
                    // chain.
                    let Some(fallback_id) = step.fallback_steps.first().cloned() else {
                        execution.fail(format!("step `{}` failed: {step_error}", step.id));
                        self.persist_execution(execution, Some(self.terminal_ttl))
                            .await?;
                        return Ok(());
                    };
                    let Some(fallback) = definition.step(&fallback_id) else {
                        execution.fail(format!(
                            "fallback step `{fallback_id}` not found after `{}` failed",
                            step.id
                        ));
                        self.persist_execution(execution, Some(self.terminal_ttl))
                            .await?;
                        return Ok(());
                    };
                    info!(
                        execution_id = %execution.id,
                        step = %step.id,
                        fallback = %fallback.id,
                        "running fallback step"
                    );
                    match self.execute_step(fallback, execution).await {
                        Ok(StepOutcome::Completed(result)) => {
                            execution.record_step(&fallback.id, result);
                            self.persist_execution(execution, None).await?;
                            match &fallback.next_step {
                                Some(next) => execution.current_step.clone_from(next),
                                None => return self.complete_execution(execution).await,
                            }
                        }
                        Ok(StepOutcome::Paused) => {
                            return self
                                .pause_execution(definition, &fallback.id.clone(), execution)
                                .await;
                        }
                        Err(fallback_error) => {
                            execution.fail(format!(
                                "step `{}` failed: {step_error}; fallback `{}` failed: {fallback_error}",
                                step.id, fallback.id
                            ));
                            self.persist_execution(execution, Some(self.terminal_ttl))
                                .await?;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Execute one step by kind.
    async fn execute_step(
        &self,
        step: &WorkflowStep,
        execution: &WorkflowExecution,
    ) -> Result<StepOutcome, EngineError> {
        debug!(
            execution_id = %execution.id,
            step = %step.id,
            kind = step.kind.as_str(),
            target = %step.target_module,
            "executing step"
        );
        match &step.kind {
            StepKind::AiAnalysis { task } => {
                let request = AiAnalysisRequest {
                    tenant_id: execution.tenant_id.clone(),
                    task: *task,
                    input: step.parameters.clone(),
                    context: serde_json::Value::Object(execution.context.clone()),
                    requirements: AiRequirements::default(),
                };
                let analysis = self.ai.analyze(request).await?;
                Ok(StepOutcome::Completed(analysis))
            }
            StepKind::DataSync => {
                let result = self
                    .module_client
                    .apply_change(
                        &execution.tenant_id,
                        &step.target_module,
                        &step.action,
                        &step.parameters,
                    )
                    .await?;
                // Announce the change under the target module's namespace so
                // downstream subscribers see it as a module event.
                self.bus
                    .publish(BusEvent::new(
                        step.target_module.clone(),
                        step.action.clone(),
                        execution.tenant_id.clone(),
                        serde_json::json!({
                            "execution_id": &execution.id,
                            "step_id": &step.id,
                            "result": result.clone(),
                        }),
                    ))
                    .await;
                Ok(StepOutcome::Completed(serde_json::json!({
                    "applied": true,
                    "result": result,
                })))
            }
            StepKind::Notification => {
                let notification = NotificationRequest {
                    tenant_id: execution.tenant_id.clone(),
                    module: step.target_module.clone(),
                    action: step.action.clone(),
                    parameters: step.parameters.clone(),
                };
                // Delivery is unverified: the result is marked sent even if
                // the dispatcher reports an error.
                if let Err(e) = self.notifications.dispatch(&notification).await {
                    warn!(
                        execution_id = %execution.id,
                        step = %step.id,
                        error = %e,
                        "notification dispatch reported an error"
                    );
                }
                Ok(StepOutcome::Completed(serde_json::json!({"sent": true})))
            }
            StepKind::Approval => Ok(StepOutcome::Paused),
            StepKind::ExternalApi => {
                let endpoint = step
                    .parameters
                    .get("endpoint")
                    .and_then(serde_json::Value::as_str)
                    .ok_or_else(|| {
                        EngineError::Step(format!(
                            "external_api step `{}` missing `endpoint` parameter",
                            step.id
                        ))
                    })?;
                let result = self
                    .module_client
                    .call_endpoint(&execution.tenant_id, endpoint, &step.parameters)
                    .await?;
                Ok(StepOutcome::Completed(result))
            }
        }
    }

    /// Pause at an approval step and record the pending approval.
    async fn pause_execution(
        &self,
        definition: &WorkflowDefinition,
        step_id: &str,
        execution: &mut WorkflowExecution,
    ) -> Result<(), EngineError> {
        execution.pause(step_id);
        let approval = PendingApproval {
            execution_id: execution.id.clone(),
            workflow_id: definition.id.clone(),
            step_id: step_id.to_owned(),
            tenant_id: execution.tenant_id.clone(),
            requested_at: Utc::now(),
        };
        let key = StateKey::new(
            execution.tenant_id.clone(),
            KeyKind::Approval,
            execution.id.as_str(),
        );
        self.store
            .set(&key, &serde_json::to_string(&approval)?, None)
            .await?;
        self.persist_execution(execution, None).await?;
        info!(
            execution_id = %execution.id,
            step = %step_id,
            "execution paused pending approval"
        );
        Ok(())
    }

    /// Mark an execution completed and announce it.
    async fn complete_execution(
        &self,
        execution: &mut WorkflowExecution,
    ) -> Result<(), EngineError> {
        execution.complete();
        self.persist_execution(execution, Some(self.terminal_ttl))
            .await?;
        let duration_ms = execution.duration_ms();
        info!(
            execution_id = %execution.id,
            duration_ms,
            steps = execution.steps_completed(),
            "workflow execution completed"
        );
        self.bus
            .publish(BusEvent::new(
                WORKFLOW_MODULE,
                COMPLETED_EVENT,
                execution.tenant_id.clone(),
                serde_json::json!({
                    "workflow_id": &execution.workflow_id,
                    "execution_id": &execution.id,
                    "duration_ms": duration_ms,
                    "steps_completed": execution.steps_completed(),
                }),
            ))
            .await;
        Ok(())
    }

    /// Persist the execution record, with a TTL for terminal states.
    async fn persist_execution(
        &self,
        execution: &WorkflowExecution,
        ttl: Option<Duration>,
    ) -> Result<(), EngineError> {
        let key = StateKey::new(
            execution.tenant_id.clone(),
            KeyKind::Execution,
            execution.id.as_str(),
        );
        self.store
            .set(&key, &serde_json::to_string(execution)?, ttl)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("definitions", &self.definitions.len())
            .field("terminal_ttl", &self.terminal_ttl)
            .finish_non_exhaustive()
    }
}
