use serde::{Deserialize, Serialize};

use crate::event::WebhookEventType;

/// Replay priority assigned to dead-lettered webhook events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl DeadLetterPriority {
    /// Derive the replay priority from the event type.
    ///
    /// Call lifecycle boundaries are critical, failures and tool calls are
    /// high, transcripts medium, everything else (heartbeats, status pings)
    /// low.
    #[must_use]
    pub fn for_event_type(event_type: &WebhookEventType) -> Self {
        match event_type {
            WebhookEventType::CallStart | WebhookEventType::CallEnd => Self::Critical,
            WebhookEventType::CallFailed | WebhookEventType::FunctionCall => Self::High,
            WebhookEventType::Transcript => Self::Medium,
            WebhookEventType::SpeechUpdate
            | WebhookEventType::StatusUpdate
            | WebhookEventType::Hangup
            | WebhookEventType::Unknown(_) => Self::Low,
        }
    }

    /// Return a string representation of the priority.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for DeadLetterPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronous result of processing one inbound webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Whether processing succeeded.
    pub success: bool,
    /// Processing duration in milliseconds.
    pub duration_ms: u64,
    /// Error description when processing failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Durable workflow started during processing, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// Lead record finalized during processing, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    /// Ordered tags describing the actions taken while processing.
    #[serde(default)]
    pub actions: Vec<String>,
}

impl ProcessingResult {
    /// Create a successful result.
    #[must_use]
    pub fn success(duration_ms: u64) -> Self {
        Self {
            success: true,
            duration_ms,
            error: None,
            workflow_id: None,
            lead_id: None,
            actions: Vec::new(),
        }
    }

    /// Create a failed result.
    #[must_use]
    pub fn failure(duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            duration_ms,
            error: Some(error.into()),
            workflow_id: None,
            lead_id: None,
            actions: Vec::new(),
        }
    }

    /// Record an action tag.
    pub fn record_action(&mut self, action: impl Into<String>) {
        self.actions.push(action.into());
    }
}
