use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// Top-level server configuration, loaded from a TOML file with environment
/// overrides applied afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind: String,
    /// Public base URL the providers call (used for signature verification).
    pub external_url: String,
    pub webhook: WebhookSection,
    pub breaker: BreakerSection,
    pub retry: RetrySection,
    pub engine: EngineSection,
    /// Static tenant entitlements: tenant id -> active module keys.
    pub modules: HashMap<String, Vec<String>>,
    pub ai: AiSection,
    pub module_api: ModuleApiSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_owned(),
            external_url: "http://localhost:8080".to_owned(),
            webhook: WebhookSection::default(),
            breaker: BreakerSection::default(),
            retry: RetrySection::default(),
            engine: EngineSection::default(),
            modules: HashMap::new(),
            ai: AiSection::default(),
            module_api: ModuleApiSection::default(),
        }
    }
}

/// Webhook ingestion settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookSection {
    /// Shared secret expected from the assistant-platform provider.
    pub vapi_secret: String,
    /// Auth token used to verify telephony-provider signatures.
    pub twilio_auth_token: String,
    /// Interval between retry-queue drain passes, in seconds.
    pub queue_drain_seconds: u64,
}

impl Default for WebhookSection {
    fn default() -> Self {
        Self {
            vapi_secret: String::new(),
            twilio_auth_token: String::new(),
            queue_drain_seconds: 10,
        }
    }
}

/// Per-tenant circuit breaker settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    pub failure_threshold: u32,
    pub cool_down_seconds: u64,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down_seconds: 30,
        }
    }
}

/// In-request retry settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_seconds: u64,
    pub max_delay_seconds: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_seconds: 1,
            max_delay_seconds: 5,
        }
    }
}

/// Workflow engine settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// How long terminal executions stay queryable, in seconds.
    pub terminal_ttl_seconds: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            terminal_ttl_seconds: 60,
        }
    }
}

/// AI orchestration settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AiSection {
    /// Remote AI orchestration endpoint. When unset, the built-in keyword
    /// analyzer handles analysis tasks locally.
    pub endpoint: Option<String>,
}

/// Module API settings for data-sync and external-API calls.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModuleApiSection {
    /// Base URL of the module gateway. When unset, module changes are
    /// applied by the in-process stub.
    pub base_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist, then apply environment overrides.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config: Self = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `CROSSFLOW_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("CROSSFLOW_BIND") {
            self.bind = bind;
        }
        if let Ok(url) = std::env::var("CROSSFLOW_EXTERNAL_URL") {
            self.external_url = url;
        }
        if let Ok(secret) = std::env::var("CROSSFLOW_VAPI_SECRET") {
            self.webhook.vapi_secret = secret;
        }
        if let Ok(token) = std::env::var("CROSSFLOW_TWILIO_AUTH_TOKEN") {
            self.webhook.twilio_auth_token = token;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.cool_down_seconds, 30);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.engine.terminal_ttl_seconds, 60);
        assert_eq!(config.webhook.queue_drain_seconds, 10);
        assert!(config.ai.endpoint.is_none());
    }

    #[test]
    fn parses_partial_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            bind = "127.0.0.1:9000"

            [webhook]
            vapi_secret = "s1"

            [breaker]
            failure_threshold = 3

            [modules]
            t1 = ["crm", "hr"]
            "#,
        )
        .unwrap();

        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(config.webhook.vapi_secret, "s1");
        assert_eq!(config.webhook.queue_drain_seconds, 10, "default retained");
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.cool_down_seconds, 30, "default retained");
        assert_eq!(config.modules["t1"], vec!["crm", "hr"]);
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.retry.max_attempts, 3);
    }
}
