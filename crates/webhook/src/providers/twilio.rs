use std::collections::{BTreeMap, HashMap};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crossflow_core::{TenantId, VoiceProvider, WebhookEvent, WebhookEventType};

use crate::error::WebhookError;
use crate::providers::{ProviderSecrets, TWILIO_SIGNATURE_HEADER};

type HmacSha256 = Hmac<Sha256>;

/// Compute the expected request signature: HMAC over the full request URL
/// followed by every form parameter concatenated as `key + value` in
/// lexicographic key order, base64-encoded.
#[must_use]
pub fn compute_signature(auth_token: &str, url: &str, params: &BTreeMap<String, String>) -> String {
    let mut data = url.to_owned();
    for (key, value) in params {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = HmacSha256::new_from_slice(auth_token.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(data.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Validate the request signature in constant time.
pub fn validate(
    secrets: &ProviderSecrets,
    headers: &HashMap<String, String>,
    url: &str,
    body: &str,
) -> Result<(), WebhookError> {
    let received = headers
        .get(TWILIO_SIGNATURE_HEADER)
        .ok_or_else(|| WebhookError::Security("missing twilio signature header".into()))?;

    let params = parse_form(body)?;
    let expected = compute_signature(&secrets.twilio_auth_token, url, &params);

    let matches: bool = received.as_bytes().ct_eq(expected.as_bytes()).into();
    if matches {
        Ok(())
    } else {
        Err(WebhookError::Security("twilio signature mismatch".into()))
    }
}

fn parse_form(body: &str) -> Result<BTreeMap<String, String>, WebhookError> {
    serde_urlencoded::from_str(body)
        .map_err(|e| WebhookError::Parse(format!("invalid form body: {e}")))
}

/// Map a `CallStatus` value onto the canonical event type.
fn map_call_status(status: &str) -> WebhookEventType {
    match status {
        "in-progress" | "answered" => WebhookEventType::CallStart,
        "completed" => WebhookEventType::CallEnd,
        "failed" | "busy" | "no-answer" => WebhookEventType::CallFailed,
        "initiated" | "ringing" | "queued" => WebhookEventType::StatusUpdate,
        other => WebhookEventType::Unknown(other.to_owned()),
    }
}

/// Parse a flat form-style payload into the canonical event.
///
/// Requires `CallSid` and `CallStatus`; their absence is a parse error.
pub fn parse(tenant: &TenantId, source: &str, body: &str) -> Result<WebhookEvent, WebhookError> {
    let params = parse_form(body)?;

    let call_sid = params
        .get("CallSid")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| WebhookError::Parse("missing `CallSid`".into()))?;
    let call_status = params
        .get("CallStatus")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| WebhookError::Parse("missing `CallStatus`".into()))?;

    let data = serde_json::Map::from_iter(
        params
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone()))),
    );

    let mut event = WebhookEvent::new(
        map_call_status(call_status),
        call_sid.clone(),
        tenant.clone(),
        VoiceProvider::Twilio,
        source,
        serde_json::Value::Object(data),
    );
    if let Some(from) = params.get("From").filter(|v| !v.is_empty()) {
        event = event.with_phone_number(from.clone());
    }
    Ok(event)
}
