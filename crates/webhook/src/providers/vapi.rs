use std::collections::HashMap;

use serde::Deserialize;
use subtle::ConstantTimeEq;

use crossflow_core::{TenantId, VoiceProvider, WebhookEvent, WebhookEventType};

use crate::error::WebhookError;
use crate::providers::{ProviderSecrets, VAPI_SECRET_HEADER};

/// Envelope shape: the provider nests everything under `message`.
#[derive(Debug, Deserialize)]
struct Envelope {
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    #[serde(rename = "type")]
    kind: Option<String>,
    call: Option<Call>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Call {
    id: Option<String>,
    customer: Option<Customer>,
}

#[derive(Debug, Deserialize)]
struct Customer {
    number: Option<String>,
}

/// Validate the shared-secret header in constant time.
pub fn validate(
    secrets: &ProviderSecrets,
    headers: &HashMap<String, String>,
) -> Result<(), WebhookError> {
    let received = headers
        .get(VAPI_SECRET_HEADER)
        .ok_or_else(|| WebhookError::Security("missing vapi secret header".into()))?;

    let matches: bool = received
        .as_bytes()
        .ct_eq(secrets.vapi_secret.as_bytes())
        .into();
    if matches {
        Ok(())
    } else {
        Err(WebhookError::Security("vapi secret mismatch".into()))
    }
}

/// Map the provider's webhook type vocabulary onto the canonical set.
fn map_event_type(kind: &str) -> WebhookEventType {
    match kind {
        "assistant-request" => WebhookEventType::CallStart,
        "tool-calls" => WebhookEventType::FunctionCall,
        "end-of-call-report" => WebhookEventType::CallEnd,
        "hang" => WebhookEventType::Hangup,
        "conversation-update" => WebhookEventType::SpeechUpdate,
        other => WebhookEventType::parse(other),
    }
}

/// Parse a nested-JSON payload into the canonical event.
///
/// Requires `message.type` and `message.call.id`; their absence is a parse
/// error that aborts processing.
pub fn parse(tenant: &TenantId, source: &str, body: &str) -> Result<WebhookEvent, WebhookError> {
    let raw: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| WebhookError::Parse(format!("invalid json: {e}")))?;
    let envelope: Envelope = serde_json::from_value(raw.clone())
        .map_err(|e| WebhookError::Parse(format!("unexpected payload shape: {e}")))?;

    let message = envelope
        .message
        .ok_or_else(|| WebhookError::Parse("missing `message` object".into()))?;
    let kind = message
        .kind
        .ok_or_else(|| WebhookError::Parse("missing `message.type`".into()))?;
    let call = message
        .call
        .ok_or_else(|| WebhookError::Parse("missing `message.call`".into()))?;
    let call_id = call
        .id
        .ok_or_else(|| WebhookError::Parse("missing `message.call.id`".into()))?;

    let mut event = WebhookEvent::new(
        map_event_type(&kind),
        call_id,
        tenant.clone(),
        VoiceProvider::Vapi,
        source,
        raw,
    );
    if let Some(number) = call.customer.and_then(|c| c.number) {
        event = event.with_phone_number(number);
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> ProviderSecrets {
        ProviderSecrets {
            vapi_secret: "vapi-secret-1".into(),
            twilio_auth_token: "unused".into(),
        }
    }

    fn headers_with_secret(secret: &str) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(VAPI_SECRET_HEADER.to_owned(), secret.to_owned());
        headers
    }

    #[test]
    fn validate_accepts_matching_secret() {
        assert!(validate(&secrets(), &headers_with_secret("vapi-secret-1")).is_ok());
    }

    #[test]
    fn validate_rejects_wrong_secret() {
        let err = validate(&secrets(), &headers_with_secret("nope")).unwrap_err();
        assert!(matches!(err, WebhookError::Security(_)));
    }

    #[test]
    fn validate_rejects_missing_header() {
        let err = validate(&secrets(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, WebhookError::Security(_)));
    }

    #[test]
    fn parse_call_start() {
        let body = serde_json::json!({
            "message": {
                "type": "assistant-request",
                "call": {
                    "id": "call-123",
                    "customer": {"number": "+15550001111"}
                }
            }
        })
        .to_string();

        let event = parse(&TenantId::new("t1"), "/v1/webhooks/voice", &body).unwrap();
        assert_eq!(event.event_type, WebhookEventType::CallStart);
        assert_eq!(event.call_id.as_str(), "call-123");
        assert_eq!(event.phone_number.as_deref(), Some("+15550001111"));
        assert_eq!(event.provider, VoiceProvider::Vapi);
        // Original payload is preserved verbatim.
        assert_eq!(event.data["message"]["type"], "assistant-request");
    }

    #[test]
    fn parse_end_of_call_report_maps_to_call_end() {
        let body = serde_json::json!({
            "message": {
                "type": "end-of-call-report",
                "call": {"id": "call-9"},
                "analysis": {"summary": "went well"}
            }
        })
        .to_string();

        let event = parse(&TenantId::new("t1"), "/v1/webhooks/voice", &body).unwrap();
        assert_eq!(event.event_type, WebhookEventType::CallEnd);
    }

    #[test]
    fn parse_tool_calls_maps_to_function_call() {
        let body = serde_json::json!({
            "message": {
                "type": "tool-calls",
                "call": {"id": "call-2"},
                "toolCalls": [{"function": {"name": "book_meeting"}}]
            }
        })
        .to_string();

        let event = parse(&TenantId::new("t1"), "/v1/webhooks/voice", &body).unwrap();
        assert_eq!(event.event_type, WebhookEventType::FunctionCall);
    }

    #[test]
    fn parse_unknown_type_preserved() {
        let body = serde_json::json!({
            "message": {"type": "voicemail-drop", "call": {"id": "c"}}
        })
        .to_string();

        let event = parse(&TenantId::new("t1"), "/x", &body).unwrap();
        assert_eq!(
            event.event_type,
            WebhookEventType::Unknown("voicemail-drop".into())
        );
    }

    #[test]
    fn parse_rejects_missing_call_id() {
        let body = serde_json::json!({
            "message": {"type": "transcript", "call": {}}
        })
        .to_string();

        let err = parse(&TenantId::new("t1"), "/x", &body).unwrap_err();
        assert!(matches!(err, WebhookError::Parse(_)));
        assert!(err.to_string().contains("call.id"));
    }

    #[test]
    fn parse_rejects_missing_message() {
        let err = parse(&TenantId::new("t1"), "/x", "{}").unwrap_err();
        assert!(matches!(err, WebhookError::Parse(_)));
    }

    #[test]
    fn parse_rejects_invalid_json() {
        let err = parse(&TenantId::new("t1"), "/x", "CallSid=123").unwrap_err();
        assert!(matches!(err, WebhookError::Parse(_)));
    }
}
