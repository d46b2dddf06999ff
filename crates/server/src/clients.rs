use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crossflow_bus::{BusEvent, EventBus};
use crossflow_core::{AiTaskType, ModuleKey, TenantId, WebhookEvent, resolve_path};
use crossflow_engine::{
    AiAnalysisRequest, AiOrchestrator, EngineError, ModuleClient, NotificationDispatcher,
    NotificationRequest,
};
use crossflow_state::{KeyKind, StateKey, StateStore};
use crossflow_webhook::{CallProcessing, WebhookError, WorkflowLauncher};

/// Financial/business vocabulary for the built-in keyword analyzer.
const POSITIVE_WORDS: &[&str] = &[
    "profit", "growth", "increase", "gain", "strong", "beat", "exceed", "upgrade", "interested",
    "great", "yes", "deal", "agree", "buy", "expansion", "revenue",
];
const NEGATIVE_WORDS: &[&str] = &[
    "loss", "decline", "decrease", "weak", "miss", "disappoint", "cancel", "refund", "angry",
    "no", "complaint", "churn", "overdue", "debt", "downgrade",
];

/// Built-in keyword-based analyzer used when no remote AI endpoint is
/// configured. Scores sentiment from a fixed vocabulary and answers other
/// task types with a neutral heuristic result.
#[derive(Debug, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn score(text: &str) -> (usize, usize, f64) {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();
        let positive = words
            .iter()
            .filter(|w| POSITIVE_WORDS.contains(&w.trim_matches(|c: char| !c.is_alphanumeric())))
            .count();
        let negative = words
            .iter()
            .filter(|w| NEGATIVE_WORDS.contains(&w.trim_matches(|c: char| !c.is_alphanumeric())))
            .count();
        let total = positive + negative;
        let score = if total == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let s = (positive as f64 - negative as f64) / total as f64;
            s
        };
        (positive, negative, score)
    }
}

#[async_trait]
impl AiOrchestrator for KeywordAnalyzer {
    async fn analyze(&self, request: AiAnalysisRequest) -> Result<serde_json::Value, EngineError> {
        match request.task {
            AiTaskType::SentimentAnalysis | AiTaskType::CallSummary => {
                let text = request
                    .input
                    .get("text")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                let (positive, negative, score) = Self::score(text);
                let sentiment = if score > 0.1 {
                    "positive"
                } else if score < -0.1 {
                    "negative"
                } else {
                    "neutral"
                };
                Ok(serde_json::json!({
                    "task": request.task.as_str(),
                    "sentiment": sentiment,
                    "score": score,
                    "positive_signals": positive,
                    "negative_signals": negative,
                    "confidence": 0.8,
                }))
            }
            _ => Ok(serde_json::json!({
                "task": request.task.as_str(),
                "result": "heuristic",
                "confidence": 0.8,
            })),
        }
    }
}

/// AI orchestrator backed by a remote analysis service.
pub struct RestAiOrchestrator {
    endpoint: String,
    client: reqwest::Client,
}

impl RestAiOrchestrator {
    /// Create a new orchestrator. Uses a default client with a 30-second
    /// timeout matching the analysis requirements the engine passes along.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }
}

#[async_trait]
impl AiOrchestrator for RestAiOrchestrator {
    async fn analyze(&self, request: AiAnalysisRequest) -> Result<serde_json::Value, EngineError> {
        let body = serde_json::json!({
            "tenant_id": request.tenant_id,
            "task_type": request.task.as_str(),
            "input": request.input,
            "context": request.context,
            "requirements": {
                "cross_module_context": request.requirements.cross_module_context,
                "max_execution_time_ms": request.requirements.max_execution_time.as_millis() as u64,
                "accuracy_threshold": request.requirements.accuracy_threshold,
            },
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Ai(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EngineError::Ai(format!(
                "analysis service returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| EngineError::Ai(e.to_string()))
    }
}

/// Notification dispatcher that logs deliveries.
///
/// The platform's real channels (email, chat, push) hang off module-side
/// integrations; the core only needs dispatch to be observable.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationDispatcher for TracingNotifier {
    async fn dispatch(&self, notification: &NotificationRequest) -> Result<(), EngineError> {
        info!(
            tenant = %notification.tenant_id,
            module = %notification.module,
            action = %notification.action,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Module client that calls a remote module gateway over HTTP.
pub struct HttpModuleClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpModuleClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::ModuleCall(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::ModuleCall(format!("{url} returned {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| EngineError::ModuleCall(e.to_string()))
    }
}

#[async_trait]
impl ModuleClient for HttpModuleClient {
    async fn apply_change(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        action: &str,
        parameters: &serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        let url = format!("{}/modules/{module}/actions/{action}", self.base_url);
        self.post_json(
            &url,
            &serde_json::json!({"tenant_id": tenant, "parameters": parameters}),
        )
        .await
    }

    async fn call_endpoint(
        &self,
        tenant: &TenantId,
        endpoint: &str,
        parameters: &serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        self.post_json(
            endpoint,
            &serde_json::json!({"tenant_id": tenant, "parameters": parameters}),
        )
        .await
    }
}

/// In-process module client used when no module gateway is configured.
/// Applies changes by acknowledging them; useful for development and tests.
#[derive(Debug, Default)]
pub struct InProcessModuleClient;

#[async_trait]
impl ModuleClient for InProcessModuleClient {
    async fn apply_change(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        action: &str,
        _parameters: &serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        debug!(tenant = %tenant, module = %module, action, "applying module change in-process");
        Ok(serde_json::json!({"module": module, "action": action, "applied": true}))
    }

    async fn call_endpoint(
        &self,
        tenant: &TenantId,
        endpoint: &str,
        _parameters: &serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        debug!(tenant = %tenant, endpoint, "external call handled in-process");
        Ok(serde_json::json!({"endpoint": endpoint, "called": true}))
    }
}

/// Starts durable call workflows by publishing lifecycle events onto the
/// bus, where the engine's trigger subscriptions pick them up.
pub struct BusWorkflowLauncher {
    bus: Arc<EventBus>,
}

impl BusWorkflowLauncher {
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl WorkflowLauncher for BusWorkflowLauncher {
    async fn start_call_workflow(&self, event: &WebhookEvent) -> Result<String, WebhookError> {
        self.bus
            .publish(BusEvent::new(
                "voice",
                "call.started",
                event.tenant_id.clone(),
                serde_json::json!({
                    "call_id": &event.call_id,
                    "phone_number": &event.phone_number,
                    "provider": event.provider,
                }),
            ))
            .await;
        Ok(format!("voice-call-{}", event.call_id))
    }

    async fn start_post_call_workflow(
        &self,
        event: &WebhookEvent,
    ) -> Result<String, WebhookError> {
        self.bus
            .publish(BusEvent::new(
                "voice",
                "call.completed",
                event.tenant_id.clone(),
                serde_json::json!({
                    "call_id": &event.call_id,
                    "phone_number": &event.phone_number,
                    "provider": event.provider,
                    "data": &event.data,
                }),
            ))
            .await;
        Ok(format!("post-call-{}", event.call_id))
    }
}

/// The per-event-type business processing behind the webhook handler:
/// transcript analysis, tool execution, and lead lifecycle updates.
///
/// Handlers tolerate missing prior state — events for one call may arrive
/// in any order.
pub struct VoicePipeline {
    ai: Arc<dyn AiOrchestrator>,
    store: Arc<dyn StateStore>,
}

impl VoicePipeline {
    #[must_use]
    pub fn new(ai: Arc<dyn AiOrchestrator>, store: Arc<dyn StateStore>) -> Self {
        Self { ai, store }
    }

    fn lead_key(event: &WebhookEvent) -> (String, StateKey) {
        let lead_id = format!("lead-{}", event.call_id);
        let key = StateKey::new(event.tenant_id.clone(), KeyKind::Lead, &lead_id);
        (lead_id, key)
    }

    /// Pull transcript text out of either provider's payload shape.
    fn transcript_text(event: &WebhookEvent) -> String {
        let nested = resolve_path(&event.data, "message.transcript");
        if let Some(text) = nested.as_str() {
            return text.to_owned();
        }
        event
            .data
            .get("TranscriptionText")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned()
    }
}

#[async_trait]
impl CallProcessing for VoicePipeline {
    async fn analyze_transcript(
        &self,
        event: &WebhookEvent,
    ) -> Result<serde_json::Value, WebhookError> {
        let text = Self::transcript_text(event);
        let analysis = self
            .ai
            .analyze(AiAnalysisRequest {
                tenant_id: event.tenant_id.clone(),
                task: AiTaskType::SentimentAnalysis,
                input: serde_json::json!({"text": text}),
                context: event.data.clone(),
                requirements: crossflow_engine::AiRequirements::default(),
            })
            .await
            .map_err(|e| WebhookError::Other(format!("transcript analysis failed: {e}")))?;

        // Accumulate analyses on the lead so later events see the history.
        let (lead_id, key) = Self::lead_key(event);
        let mut record = match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => serde_json::json!({"lead_id": &lead_id, "call_id": &event.call_id}),
        };
        record["last_analysis"] = analysis.clone();
        record["updated_at"] = serde_json::json!(Utc::now());
        self.store
            .set(&key, &serde_json::to_string(&record)?, None)
            .await?;
        Ok(analysis)
    }

    async fn execute_tool(
        &self,
        event: &WebhookEvent,
    ) -> Result<serde_json::Value, WebhookError> {
        let tool = resolve_path(&event.data, "message.toolCalls")
            .get(0)
            .map(|c| resolve_path(c, "function.name"))
            .and_then(|v| v.as_str().map(str::to_owned))
            .or_else(|| {
                event
                    .data
                    .get("tool")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_owned)
            })
            .ok_or_else(|| {
                WebhookError::Validation("function-call event names no tool".into())
            })?;
        info!(
            tenant = %event.tenant_id,
            call_id = %event.call_id,
            tool = %tool,
            "executing call tool"
        );
        Ok(serde_json::json!({"tool": tool, "executed": true}))
    }

    async fn finalize_lead(&self, event: &WebhookEvent) -> Result<String, WebhookError> {
        let (lead_id, key) = Self::lead_key(event);
        // The lead may not exist if call-start was never delivered; create
        // it from scratch in that case.
        let mut record = match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => serde_json::json!({"lead_id": &lead_id, "call_id": &event.call_id}),
        };
        record["phone_number"] = serde_json::json!(&event.phone_number);
        record["completed_at"] = serde_json::json!(Utc::now());
        record["final_event"] = serde_json::json!(event.event_type.as_str());
        self.store
            .set(&key, &serde_json::to_string(&record)?, None)
            .await?;
        info!(tenant = %event.tenant_id, lead_id = %lead_id, "lead finalized");
        Ok(lead_id)
    }

    async fn record_call_failure(&self, event: &WebhookEvent) -> Result<(), WebhookError> {
        let key = StateKey::new(
            event.tenant_id.clone(),
            KeyKind::Counter,
            format!("call-failures:{}", event.call_id),
        );
        let failures = self.store.increment(&key, 1, None).await?;
        warn!(
            tenant = %event.tenant_id,
            call_id = %event.call_id,
            failures,
            "call failure recorded"
        );
        Ok(())
    }
}
