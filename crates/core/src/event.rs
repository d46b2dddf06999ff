use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{CallId, TenantId};

/// Supported voice-call providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceProvider {
    /// Assistant-platform provider — nests its payload under a `message`
    /// object with `type`/`call`/`transcript`/`toolCalls`/`analysis`.
    Vapi,
    /// Telephony provider — sends flat form-style fields such as `CallSid`,
    /// `CallStatus`, `To`, `RecordingUrl`.
    Twilio,
}

impl VoiceProvider {
    /// Return a string representation of the provider.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vapi => "vapi",
            Self::Twilio => "twilio",
        }
    }
}

impl std::fmt::Display for VoiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of call event carried by a webhook.
///
/// Providers use differing type vocabularies; parsers normalize them into
/// this canonical set. Types with no canonical mapping are preserved as
/// [`Unknown`](Self::Unknown) so the handler can log and no-op them instead
/// of rejecting the request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WebhookEventType {
    CallStart,
    Transcript,
    FunctionCall,
    CallEnd,
    CallFailed,
    SpeechUpdate,
    StatusUpdate,
    Hangup,
    Unknown(String),
}

impl WebhookEventType {
    /// Parse a canonical event-type string.
    ///
    /// Unrecognized strings become [`Unknown`](Self::Unknown).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "call-start" => Self::CallStart,
            "transcript" => Self::Transcript,
            "function-call" => Self::FunctionCall,
            "call-end" => Self::CallEnd,
            "call-failed" => Self::CallFailed,
            "speech-update" => Self::SpeechUpdate,
            "status-update" => Self::StatusUpdate,
            "hangup" => Self::Hangup,
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// Return the canonical string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CallStart => "call-start",
            Self::Transcript => "transcript",
            Self::FunctionCall => "function-call",
            Self::CallEnd => "call-end",
            Self::CallFailed => "call-failed",
            Self::SpeechUpdate => "speech-update",
            Self::StatusUpdate => "status-update",
            Self::Hangup => "hangup",
            Self::Unknown(s) => s.as_str(),
        }
    }
}

impl From<String> for WebhookEventType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<WebhookEventType> for String {
    fn from(t: WebhookEventType) -> Self {
        t.as_str().to_owned()
    }
}

impl std::fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical envelope for an inbound voice webhook.
///
/// Created once a provider payload has been validated and parsed; owned
/// exclusively by the ingestion handler until the event is terminally
/// processed or dead-lettered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Unique event identifier.
    pub id: String,

    /// Normalized event type.
    pub event_type: WebhookEventType,

    /// When the event was received.
    pub timestamp: DateTime<Utc>,

    /// Provider-assigned call identifier.
    pub call_id: CallId,

    /// Tenant the call belongs to.
    pub tenant_id: TenantId,

    /// Customer phone number, when the provider includes one.
    pub phone_number: Option<String>,

    /// Which voice provider delivered the webhook.
    pub provider: VoiceProvider,

    /// Origin address (endpoint path or provider URL) the webhook hit.
    pub source: String,

    /// Provider-specific payload, preserved verbatim.
    pub data: serde_json::Value,

    /// Number of times this event has been requeued for retry.
    #[serde(default)]
    pub retry_count: u32,
}

impl WebhookEvent {
    /// Create a new event with a generated UUID-v7 id and `timestamp` now.
    #[must_use]
    pub fn new(
        event_type: WebhookEventType,
        call_id: impl Into<CallId>,
        tenant_id: impl Into<TenantId>,
        provider: VoiceProvider,
        source: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            event_type,
            timestamp: Utc::now(),
            call_id: call_id.into(),
            tenant_id: tenant_id.into(),
            phone_number: None,
            provider,
            source: source.into(),
            data,
            retry_count: 0,
        }
    }

    /// Set the customer phone number.
    #[must_use]
    pub fn with_phone_number(mut self, number: impl Into<String>) -> Self {
        self.phone_number = Some(number.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_parse_known() {
        assert_eq!(WebhookEventType::parse("call-start"), WebhookEventType::CallStart);
        assert_eq!(WebhookEventType::parse("call-end"), WebhookEventType::CallEnd);
        assert_eq!(WebhookEventType::parse("transcript"), WebhookEventType::Transcript);
        assert_eq!(
            WebhookEventType::parse("function-call"),
            WebhookEventType::FunctionCall
        );
    }

    #[test]
    fn event_type_parse_unknown_preserved() {
        let t = WebhookEventType::parse("conference-join");
        assert_eq!(t, WebhookEventType::Unknown("conference-join".into()));
        assert_eq!(t.as_str(), "conference-join");
    }

    #[test]
    fn event_type_serde_roundtrip() {
        for t in [
            WebhookEventType::CallStart,
            WebhookEventType::CallFailed,
            WebhookEventType::Unknown("beep".into()),
        ] {
            let json = serde_json::to_string(&t).unwrap();
            let back: WebhookEventType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, t);
        }
    }

    #[test]
    fn event_type_serializes_as_plain_string() {
        let json = serde_json::to_string(&WebhookEventType::CallEnd).unwrap();
        assert_eq!(json, "\"call-end\"");
    }

    #[test]
    fn webhook_event_creation() {
        let event = WebhookEvent::new(
            WebhookEventType::CallStart,
            "call-1",
            "tenant-1",
            VoiceProvider::Vapi,
            "/v1/webhooks/voice",
            serde_json::json!({"message": {"type": "call-start"}}),
        );
        assert_eq!(event.call_id.as_str(), "call-1");
        assert_eq!(event.tenant_id.as_str(), "tenant-1");
        assert_eq!(event.retry_count, 0);
        assert!(event.phone_number.is_none());
        assert!(!event.id.is_empty());
    }

    #[test]
    fn webhook_event_serde_roundtrip() {
        let event = WebhookEvent::new(
            WebhookEventType::Transcript,
            "call-2",
            "t",
            VoiceProvider::Twilio,
            "/v1/webhooks/voice",
            serde_json::json!({"CallSid": "call-2"}),
        )
        .with_phone_number("+15551234567");

        let json = serde_json::to_string(&event).unwrap();
        let back: WebhookEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.event_type, WebhookEventType::Transcript);
        assert_eq!(back.phone_number.as_deref(), Some("+15551234567"));
    }

    #[test]
    fn provider_display() {
        assert_eq!(VoiceProvider::Vapi.to_string(), "vapi");
        assert_eq!(VoiceProvider::Twilio.to_string(), "twilio");
    }
}
