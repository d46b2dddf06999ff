use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crossflow_core::{ProcessingResult, TenantId, VoiceProvider, WebhookEvent, WebhookEventType};

use crate::analytics::{AnalyticsSink, WebhookAttempt};
use crate::breaker::{BreakerConfig, CircuitBreakerRegistry, CircuitState};
use crate::dlq::{DeadLetterStore, FailedWebhookEvent};
use crate::error::WebhookError;
use crate::providers::{self, ProviderSecrets};
use crate::queue::RetryQueue;
use crate::retry::RetryPolicy;

/// Configuration for the webhook processor.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Endpoint path recorded as the event source and in analytics.
    pub endpoint: String,
    /// Provider signing material.
    pub secrets: ProviderSecrets,
    /// In-request retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Per-tenant circuit breaker configuration.
    pub breaker: BreakerConfig,
    /// How often the background task drains the retry queues.
    pub queue_drain_interval: Duration,
}

impl WebhookConfig {
    /// Create a configuration with default resilience settings.
    #[must_use]
    pub fn new(secrets: ProviderSecrets) -> Self {
        Self {
            endpoint: "/v1/webhooks/voice".to_owned(),
            secrets,
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
            queue_drain_interval: Duration::from_secs(10),
        }
    }
}

/// An inbound webhook request, already extracted from the HTTP layer.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Tenant the webhook is addressed to.
    pub tenant: TenantId,
    /// Full request URL (needed for signature verification).
    pub url: String,
    /// Request headers with lowercased names.
    pub headers: HashMap<String, String>,
    /// Raw request body.
    pub body: String,
}

/// Response handed back to the HTTP layer.
///
/// The status is 200 for all business outcomes — the actual result is in
/// the body — except security failures (400) and open circuits (503).
#[derive(Debug, Clone)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Collaborator that starts durable workflows for call lifecycle events.
///
/// Best-effort from the handler's perspective: start failures are logged
/// and swallowed rather than failing the request.
#[async_trait]
pub trait WorkflowLauncher: Send + Sync {
    /// Start the durable workflow for a call-start event. Returns the
    /// workflow id (`voice-call-{call_id}`).
    async fn start_call_workflow(&self, event: &WebhookEvent) -> Result<String, WebhookError>;

    /// Start the post-call workflow for a call-end event.
    async fn start_post_call_workflow(&self, event: &WebhookEvent)
    -> Result<String, WebhookError>;
}

/// Collaborator performing the per-event-type business processing.
#[async_trait]
pub trait CallProcessing: Send + Sync {
    /// Analyze and store a transcript chunk.
    async fn analyze_transcript(
        &self,
        event: &WebhookEvent,
    ) -> Result<serde_json::Value, WebhookError>;

    /// Execute the named tool requested during the call.
    async fn execute_tool(&self, event: &WebhookEvent)
    -> Result<serde_json::Value, WebhookError>;

    /// Finalize the lead record for an ended call. Returns the lead id.
    async fn finalize_lead(&self, event: &WebhookEvent) -> Result<String, WebhookError>;

    /// Record a failed call.
    async fn record_call_failure(&self, event: &WebhookEvent) -> Result<(), WebhookError>;
}

/// What one processing pass produced.
#[derive(Debug, Default)]
struct ProcessOutcome {
    workflow_id: Option<String>,
    lead_id: Option<String>,
    actions: Vec<String>,
}

/// The webhook ingestion pipeline.
///
/// Drives each inbound request through security validation, provider
/// parsing, the per-tenant circuit breaker, typed event dispatch with
/// bounded retries, and failure capture (dead-letter store + background
/// retry queue). Every attempt is recorded to the analytics sink.
pub struct WebhookProcessor {
    config: WebhookConfig,
    breakers: CircuitBreakerRegistry,
    retry_queue: RetryQueue,
    dlq: Arc<dyn DeadLetterStore>,
    analytics: Arc<dyn AnalyticsSink>,
    workflows: Arc<dyn WorkflowLauncher>,
    calls: Arc<dyn CallProcessing>,
    security_failures: AtomicU64,
}

impl WebhookProcessor {
    /// Create a new processor.
    #[must_use]
    pub fn new(
        config: WebhookConfig,
        dlq: Arc<dyn DeadLetterStore>,
        analytics: Arc<dyn AnalyticsSink>,
        workflows: Arc<dyn WorkflowLauncher>,
        calls: Arc<dyn CallProcessing>,
    ) -> Self {
        let breakers = CircuitBreakerRegistry::new(config.breaker.clone());
        Self {
            config,
            breakers,
            retry_queue: RetryQueue::new(),
            dlq,
            analytics,
            workflows,
            calls,
            security_failures: AtomicU64::new(0),
        }
    }

    /// The per-tenant circuit breaker registry.
    #[must_use]
    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// The in-memory retry queue.
    #[must_use]
    pub fn retry_queue(&self) -> &RetryQueue {
        &self.retry_queue
    }

    /// Number of rejected requests that failed security validation.
    #[must_use]
    pub fn security_failure_count(&self) -> u64 {
        self.security_failures.load(Ordering::Relaxed)
    }

    /// Handle one inbound webhook request.
    #[instrument(skip(self, request), fields(tenant = %request.tenant))]
    pub async fn handle(&self, request: WebhookRequest) -> WebhookResponse {
        let start = std::time::Instant::now();

        // 1. Security validation runs first; nothing is parsed before it.
        let Some(provider) = providers::detect_provider(&request.headers) else {
            return self
                .reject_security(
                    None,
                    &request,
                    "no recognizable provider signature header",
                    start,
                )
                .await;
        };
        if let Err(e) = providers::validate_signature(
            provider,
            &self.config.secrets,
            &request.headers,
            &request.url,
            &request.body,
        ) {
            return self
                .reject_security(Some(provider), &request, &e.to_string(), start)
                .await;
        }

        // 2. Normalize the provider payload into the canonical event.
        let event = match providers::parse_event(
            provider,
            &request.tenant,
            &self.config.endpoint,
            &request.body,
        ) {
            Ok(event) => event,
            Err(e) => {
                error!(provider = %provider, error = %e, "webhook payload rejected by parser");
                let duration = elapsed_ms(start);
                self.record_attempt(Some(provider), None, 200, duration, false, Some(&e), 0)
                    .await;
                return WebhookResponse {
                    status: 200,
                    body: serde_json::json!({
                        "success": false,
                        "error": e.to_string(),
                        "duration": duration,
                    }),
                };
            }
        };

        // 3. Circuit breaker gate. A rejection here is not itself a failure.
        if self.breakers.check(&event.tenant_id) == CircuitState::Open {
            warn!(tenant = %event.tenant_id, "circuit open, rejecting webhook");
            let duration = elapsed_ms(start);
            self.record_attempt(
                Some(provider),
                Some(&event),
                503,
                duration,
                false,
                Some(&WebhookError::CircuitOpen(event.tenant_id.clone())),
                event.retry_count,
            )
            .await;
            return WebhookResponse {
                status: 503,
                body: serde_json::json!({
                    "success": false,
                    "error": "Circuit open",
                    "duration": duration,
                }),
            };
        }

        // 4. Dispatch with bounded in-request retries.
        match self.process_with_retry(&event).await {
            Ok(outcome) => {
                self.breakers.record_success(&event.tenant_id);
                let duration = elapsed_ms(start);
                self.record_attempt(
                    Some(provider),
                    Some(&event),
                    200,
                    duration,
                    true,
                    None,
                    event.retry_count,
                )
                .await;
                let mut result = ProcessingResult::success(duration);
                result.workflow_id = outcome.workflow_id;
                result.lead_id = outcome.lead_id;
                result.actions = outcome.actions;
                WebhookResponse {
                    status: 200,
                    body: serde_json::to_value(&result).unwrap_or_default(),
                }
            }
            Err(e) => {
                // One logical failure per inbound request, regardless of how
                // many in-request attempts were made.
                self.breakers.record_failure(&event.tenant_id);
                self.dead_letter(&event, &request.headers, &e).await;
                if e.is_transient() {
                    let depth = self.retry_queue.push(event.clone());
                    info!(
                        tenant = %event.tenant_id,
                        depth,
                        "transient failure queued for background retry"
                    );
                }
                let duration = elapsed_ms(start);
                self.record_attempt(
                    Some(provider),
                    Some(&event),
                    200,
                    duration,
                    false,
                    Some(&e),
                    event.retry_count,
                )
                .await;
                WebhookResponse {
                    status: 200,
                    body: serde_json::json!({
                        "success": false,
                        "error": e.to_string(),
                        "duration": duration,
                    }),
                }
            }
        }
    }

    /// Reprocess a previously captured event (dead-letter replay or the
    /// background retry queue). Signature validation is skipped — the event
    /// was already authenticated when first received.
    pub async fn replay(&self, event: WebhookEvent) -> ProcessingResult {
        let start = std::time::Instant::now();

        if self.breakers.check(&event.tenant_id) == CircuitState::Open {
            return ProcessingResult::failure(elapsed_ms(start), "Circuit open");
        }

        match self.process_event(&event).await {
            Ok(outcome) => {
                self.breakers.record_success(&event.tenant_id);
                let duration = elapsed_ms(start);
                self.record_attempt(
                    Some(event.provider),
                    Some(&event),
                    200,
                    duration,
                    true,
                    None,
                    event.retry_count,
                )
                .await;
                let mut result = ProcessingResult::success(duration);
                result.workflow_id = outcome.workflow_id;
                result.lead_id = outcome.lead_id;
                result.actions = outcome.actions;
                result
            }
            Err(e) => {
                self.breakers.record_failure(&event.tenant_id);
                let duration = elapsed_ms(start);
                self.record_attempt(
                    Some(event.provider),
                    Some(&event),
                    200,
                    duration,
                    false,
                    Some(&e),
                    event.retry_count,
                )
                .await;
                if e.is_transient() {
                    self.retry_queue.push(event);
                } else {
                    self.dead_letter(&event, &HashMap::new(), &e).await;
                }
                ProcessingResult::failure(duration, e.to_string())
            }
        }
    }

    /// Drain one event per tenant from the retry queues, skipping tenants
    /// whose circuit is not closed.
    pub async fn drain_retry_queues_once(&self) {
        for tenant in self.retry_queue.tenants() {
            if self.breakers.state(&tenant) != CircuitState::Closed {
                debug!(
                    tenant = %tenant,
                    depth = self.retry_queue.depth(&tenant),
                    "skipping retry drain while circuit is not closed"
                );
                continue;
            }
            if let Some(event) = self.retry_queue.pop(&tenant) {
                info!(
                    tenant = %tenant,
                    call_id = %event.call_id,
                    retry_count = event.retry_count,
                    remaining = self.retry_queue.depth(&tenant),
                    "reprocessing queued webhook event"
                );
                let _ = self.replay(event).await;
            }
        }
    }

    /// Spawn the fixed-interval retry drain loop. The returned handle must
    /// be aborted on shutdown.
    pub fn spawn_retry_drain(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let processor = Arc::clone(self);
        let period = self.config.queue_drain_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately; skip it so draining
            // starts one full period after startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                processor.drain_retry_queues_once().await;
            }
        })
    }

    /// Run the event dispatch with bounded exponential backoff for
    /// transient failures.
    async fn process_with_retry(&self, event: &WebhookEvent) -> Result<ProcessOutcome, WebhookError> {
        let mut attempt: u32 = 0;
        loop {
            match self.process_event(event).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    attempt += 1;
                    if !e.is_transient() || attempt >= self.config.retry.max_attempts {
                        return Err(e);
                    }
                    let delay = self.config.retry.delay_for(attempt - 1);
                    warn!(
                        tenant = %event.tenant_id,
                        call_id = %event.call_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying in-request"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Dispatch one event by type. Unknown and informational types no-op
    /// successfully; handlers must tolerate missing prior state since
    /// events for the same call may arrive out of order.
    async fn process_event(&self, event: &WebhookEvent) -> Result<ProcessOutcome, WebhookError> {
        let mut outcome = ProcessOutcome::default();
        match &event.event_type {
            WebhookEventType::CallStart => {
                outcome.actions.push("call-started".into());
                match self.workflows.start_call_workflow(event).await {
                    Ok(workflow_id) => {
                        info!(
                            tenant = %event.tenant_id,
                            workflow_id = %workflow_id,
                            "durable call workflow started"
                        );
                        outcome.workflow_id = Some(workflow_id);
                        outcome.actions.push("workflow-started".into());
                    }
                    Err(e) => {
                        // Best-effort: a workflow-start failure never fails
                        // the webhook itself.
                        warn!(
                            tenant = %event.tenant_id,
                            call_id = %event.call_id,
                            error = %e,
                            "failed to start durable call workflow"
                        );
                        outcome.actions.push("workflow-start-failed".into());
                    }
                }
            }
            WebhookEventType::Transcript => {
                let analysis = self.calls.analyze_transcript(event).await?;
                debug!(
                    tenant = %event.tenant_id,
                    call_id = %event.call_id,
                    keys = analysis.as_object().map_or(0, serde_json::Map::len),
                    "transcript analyzed"
                );
                outcome.actions.push("transcript-analyzed".into());
            }
            WebhookEventType::FunctionCall => {
                self.calls.execute_tool(event).await?;
                outcome.actions.push("tool-executed".into());
            }
            WebhookEventType::CallEnd => {
                let lead_id = self.calls.finalize_lead(event).await?;
                outcome.lead_id = Some(lead_id);
                outcome.actions.push("lead-finalized".into());
                match self.workflows.start_post_call_workflow(event).await {
                    Ok(workflow_id) => {
                        outcome.workflow_id = Some(workflow_id);
                        outcome.actions.push("post-call-workflow-started".into());
                    }
                    Err(e) => {
                        warn!(
                            tenant = %event.tenant_id,
                            call_id = %event.call_id,
                            error = %e,
                            "failed to start post-call workflow"
                        );
                        outcome.actions.push("post-call-workflow-failed".into());
                    }
                }
            }
            WebhookEventType::CallFailed => {
                self.calls.record_call_failure(event).await?;
                outcome.actions.push("call-failure-recorded".into());
                if event.data.get("retryable").and_then(serde_json::Value::as_bool)
                    == Some(true)
                {
                    self.retry_queue.push(event.clone());
                    outcome.actions.push("retry-scheduled".into());
                }
            }
            WebhookEventType::SpeechUpdate
            | WebhookEventType::StatusUpdate
            | WebhookEventType::Hangup
            | WebhookEventType::Unknown(_) => {
                debug!(
                    tenant = %event.tenant_id,
                    event_type = %event.event_type,
                    "no handler for event type, ignoring"
                );
                outcome
                    .actions
                    .push(format!("ignored-{}", event.event_type));
            }
        }
        Ok(outcome)
    }

    /// Reject a request that failed security validation.
    async fn reject_security(
        &self,
        provider: Option<VoiceProvider>,
        request: &WebhookRequest,
        details: &str,
        start: std::time::Instant,
    ) -> WebhookResponse {
        self.security_failures.fetch_add(1, Ordering::Relaxed);
        // Log the shape of the failure, never the received secret material.
        warn!(
            tenant = %request.tenant,
            provider = provider.map_or("unknown", VoiceProvider::as_str),
            url = %request.url,
            body_bytes = request.body.len(),
            details,
            "webhook failed security validation"
        );
        let duration = elapsed_ms(start);
        self.record_attempt(
            provider,
            None,
            400,
            duration,
            false,
            Some(&WebhookError::Security(details.to_owned())),
            0,
        )
        .await;
        WebhookResponse {
            status: 400,
            body: serde_json::json!({
                "success": false,
                "error": "Security validation failed",
                "details": details,
                "duration": duration,
            }),
        }
    }

    /// Record the event to the dead-letter store, stripping signature
    /// headers so no secret material is persisted.
    async fn dead_letter(
        &self,
        event: &WebhookEvent,
        headers: &HashMap<String, String>,
        error: &WebhookError,
    ) {
        let sanitized: HashMap<String, String> = headers
            .iter()
            .filter(|(name, _)| {
                name.as_str() != providers::VAPI_SECRET_HEADER
                    && name.as_str() != providers::TWILIO_SIGNATURE_HEADER
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let entry = FailedWebhookEvent::from_event(event, sanitized, error.to_string());
        info!(
            tenant = %event.tenant_id,
            call_id = %event.call_id,
            priority = %entry.priority,
            error = %error,
            "dead-lettering webhook event"
        );
        self.dlq.add_failed_event(entry).await;
    }

    /// Emit an analytics record for one attempt.
    #[allow(clippy::too_many_arguments)]
    async fn record_attempt(
        &self,
        provider: Option<VoiceProvider>,
        event: Option<&WebhookEvent>,
        status_code: u16,
        latency_ms: u64,
        success: bool,
        error: Option<&WebhookError>,
        retry_count: u32,
    ) {
        let attempt = WebhookAttempt {
            provider,
            endpoint: self.config.endpoint.clone(),
            method: "POST".to_owned(),
            status_code,
            latency_ms,
            success,
            error_type: error.map(|e| e.error_type().to_owned()),
            tenant_id: event.map(|e| e.tenant_id.clone()),
            call_id: event.map(|e| e.call_id.clone()),
            retry_count,
            metadata: serde_json::json!({
                "event_type": event.map(|e| e.event_type.as_str().to_owned()),
            }),
            recorded_at: Utc::now(),
        };
        self.analytics.record(attempt).await;
    }
}

impl std::fmt::Debug for WebhookProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookProcessor")
            .field("endpoint", &self.config.endpoint)
            .field("breakers", &self.breakers)
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
