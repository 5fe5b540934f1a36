use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One item as delivered by the push transport. Producer-controlled; the
/// payload shape is untrusted and may be structured JSON or free text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub kind: String,
    pub payload: RawPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Text(String),
    Structured(Value),
}

impl RawEvent {
    pub fn text(kind: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: RawPayload::Text(payload.into()),
        }
    }

    pub fn structured(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload: RawPayload::Structured(payload),
        }
    }
}

/// Closed set of event kinds the consumer recognizes. Kinds outside the set
/// land in [`EventKind::Other`] and follow the catch-all path instead of
/// being dropped.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CaseCreated,
    RoundStart,
    SimulationProgress,
    ConversationLog,
    NewMessage,
    RoundComplete,
    Log,
    Terminal,
    AgentAction,
    Judgement,
    Guidance,
    Prevention,
    Complete,
    RunEnd,
    RunEndLocal,
    Error,
    Other(String),
}

impl EventKind {
    /// Maps a producer kind string onto the closed set. Alias spellings seen
    /// across producer versions collapse onto one variant each.
    pub fn parse(kind: &str) -> Self {
        match kind {
            "case_created" => Self::CaseCreated,
            "round_start" => Self::RoundStart,
            "simulation_progress" => Self::SimulationProgress,
            "conversation_log" | "conversation_logs" => Self::ConversationLog,
            "new_message" => Self::NewMessage,
            "round_complete" => Self::RoundComplete,
            "log" => Self::Log,
            "terminal" => Self::Terminal,
            "agent_action" => Self::AgentAction,
            "judgement" => Self::Judgement,
            "guidance" | "guidance_generated" => Self::Guidance,
            "prevention" | "prevention_tip" => Self::Prevention,
            "complete" => Self::Complete,
            "run_end" => Self::RunEnd,
            "run_end_local" => Self::RunEndLocal,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    /// True for the diagnostic/log-line kinds that carry free text.
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Log | Self::Terminal | Self::AgentAction)
    }

    /// True for kinds that carry dialogue turns.
    pub fn carries_turns(&self) -> bool {
        matches!(self, Self::ConversationLog | Self::NewMessage)
    }
}

/// Result of normalization: a recognized kind plus a payload that is always a
/// JSON object (raw text is wrapped as `{"message": ...}`).
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEvent {
    pub kind: EventKind,
    pub payload: Value,
}

impl CanonicalEvent {
    /// The `message` field of the payload, if present.
    pub fn message(&self) -> Option<&str> {
        self.payload.get("message").and_then(Value::as_str)
    }
}
