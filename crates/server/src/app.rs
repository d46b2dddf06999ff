use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crossflow_bus::EventBus;
use crossflow_core::ModuleKey;
use crossflow_engine::{
    AiOrchestrator, ModuleClient, StaticModuleDirectory, WorkflowEngine, WorkflowEngineBuilder,
    builtin_workflows,
};
use crossflow_state::StateStore;
use crossflow_state_memory::MemoryStateStore;
use crossflow_webhook::{
    BreakerConfig, MemoryAnalyticsSink, MemoryDeadLetterQueue, RetryPolicy, WebhookConfig,
    WebhookProcessor,
};
use crossflow_webhook::providers::ProviderSecrets;

use crate::api::{self, AppState};
use crate::clients::{
    BusWorkflowLauncher, HttpModuleClient, InProcessModuleClient, KeywordAnalyzer,
    RestAiOrchestrator, TracingNotifier, VoicePipeline,
};
use crate::config::ServerConfig;
use crate::error::ServerError;

/// The wired application: router plus the handles the binary and tests
/// need to drive lifecycle and state.
pub struct App {
    pub router: axum::Router,
    pub engine: Arc<WorkflowEngine>,
    pub processor: Arc<WebhookProcessor>,
    pub bus: Arc<EventBus>,
    pub directory: Arc<StaticModuleDirectory>,
    pub store: Arc<dyn StateStore>,
}

impl App {
    /// Build the full application from configuration. Construction has no
    /// side effects; call [`start`](Self::start) to begin processing.
    pub fn build(config: &ServerConfig) -> Result<Self, ServerError> {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let bus = Arc::new(EventBus::new());

        // Static entitlements from configuration.
        let directory = Arc::new(StaticModuleDirectory::new());
        for (tenant, modules) in &config.modules {
            directory.set_modules(
                tenant.clone(),
                modules.iter().map(|m| ModuleKey::new(m.as_str())),
            );
        }

        let ai: Arc<dyn AiOrchestrator> = match &config.ai.endpoint {
            Some(endpoint) => Arc::new(RestAiOrchestrator::new(endpoint.clone())),
            None => Arc::new(KeywordAnalyzer::new()),
        };
        let module_client: Arc<dyn ModuleClient> = match &config.module_api.base_url {
            Some(base_url) => Arc::new(HttpModuleClient::new(base_url.clone())),
            None => Arc::new(InProcessModuleClient),
        };

        let engine = Arc::new(
            WorkflowEngineBuilder::new()
                .bus(bus.clone())
                .store(store.clone())
                .modules(directory.clone())
                .ai(ai.clone())
                .notifications(Arc::new(TracingNotifier))
                .module_client(module_client)
                .workflows(builtin_workflows())
                .terminal_ttl(Duration::from_secs(config.engine.terminal_ttl_seconds))
                .build()?,
        );

        let dlq = Arc::new(MemoryDeadLetterQueue::new());
        let analytics = Arc::new(MemoryAnalyticsSink::new());
        let webhook_config = WebhookConfig {
            endpoint: "/v1/webhooks/voice".to_owned(),
            secrets: ProviderSecrets {
                vapi_secret: config.webhook.vapi_secret.clone(),
                twilio_auth_token: config.webhook.twilio_auth_token.clone(),
            },
            retry: RetryPolicy {
                max_attempts: config.retry.max_attempts,
                base_delay: Duration::from_secs(config.retry.base_delay_seconds),
                multiplier: 2.0,
                max_delay: Duration::from_secs(config.retry.max_delay_seconds),
            },
            breaker: BreakerConfig {
                failure_threshold: config.breaker.failure_threshold,
                cool_down: Duration::from_secs(config.breaker.cool_down_seconds),
            },
            queue_drain_interval: Duration::from_secs(config.webhook.queue_drain_seconds),
        };
        let processor = Arc::new(WebhookProcessor::new(
            webhook_config,
            dlq.clone(),
            analytics,
            Arc::new(BusWorkflowLauncher::new(bus.clone())),
            Arc::new(VoicePipeline::new(ai, store.clone())),
        ));

        let router = api::router(AppState {
            processor: processor.clone(),
            engine: engine.clone(),
            dlq,
            external_url: config.external_url.clone(),
        });

        Ok(Self {
            router,
            engine,
            processor,
            bus,
            directory,
            store,
        })
    }

    /// Start background processing: subscribe the engine's triggers and
    /// spawn the retry-queue drain. Returns the drain task handle, which
    /// [`stop`](Self::stop) aborts.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        WorkflowEngine::start(&self.engine);
        let drain = self.processor.spawn_retry_drain();
        info!("application started");
        drain
    }

    /// Stop background processing.
    pub fn stop(&self, drain: &tokio::task::JoinHandle<()>) {
        self.engine.stop();
        drain.abort();
        info!("application stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_from_default_config_succeeds() {
        let app = App::build(&ServerConfig::default()).expect("app should build");
        assert!(
            app.engine
                .definition(&crossflow_core::WorkflowId::new("lead-to-hire"))
                .is_some()
        );
    }

    #[tokio::test]
    async fn start_and_stop_manage_subscriptions() {
        let app = App::build(&ServerConfig::default()).unwrap();
        assert_eq!(app.bus.subscription_count(), 0, "no constructor side effects");

        let drain = app.start();
        assert!(app.bus.subscription_count() > 0);

        app.stop(&drain);
        assert_eq!(app.bus.subscription_count(), 0);
    }
}
