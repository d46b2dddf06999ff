use std::collections::HashMap;

use crossflow_core::{TenantId, VoiceProvider, WebhookEvent};

use crate::error::WebhookError;

pub mod twilio;
pub mod vapi;

/// Shared-secret header carried by the assistant-platform provider.
pub const VAPI_SECRET_HEADER: &str = "x-vapi-secret";
/// Signature header carried by the telephony provider.
pub const TWILIO_SIGNATURE_HEADER: &str = "x-twilio-signature";

/// Signing material for the supported providers.
#[derive(Debug, Clone)]
pub struct ProviderSecrets {
    /// Shared secret expected in the Vapi secret header.
    pub vapi_secret: String,
    /// Auth token used to verify Twilio request signatures.
    pub twilio_auth_token: String,
}

/// Detect the provider from request headers.
///
/// Selection is by signature header: a request carrying neither header
/// cannot be authenticated and yields `None`.
#[must_use]
pub fn detect_provider(headers: &HashMap<String, String>) -> Option<VoiceProvider> {
    if headers.contains_key(VAPI_SECRET_HEADER) {
        Some(VoiceProvider::Vapi)
    } else if headers.contains_key(TWILIO_SIGNATURE_HEADER) {
        Some(VoiceProvider::Twilio)
    } else {
        None
    }
}

/// Run the provider-specific signature validation.
///
/// Errors never echo the received or expected secret material.
pub fn validate_signature(
    provider: VoiceProvider,
    secrets: &ProviderSecrets,
    headers: &HashMap<String, String>,
    url: &str,
    body: &str,
) -> Result<(), WebhookError> {
    match provider {
        VoiceProvider::Vapi => vapi::validate(secrets, headers),
        VoiceProvider::Twilio => twilio::validate(secrets, headers, url, body),
    }
}

/// Run the provider-specific payload parser, normalizing into a
/// [`WebhookEvent`].
pub fn parse_event(
    provider: VoiceProvider,
    tenant: &TenantId,
    source: &str,
    body: &str,
) -> Result<WebhookEvent, WebhookError> {
    match provider {
        VoiceProvider::Vapi => vapi::parse(tenant, source, body),
        VoiceProvider::Twilio => twilio::parse(tenant, source, body),
    }
}
