use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::event::CanonicalEvent;

/// Prefix tag marking an embedded turn record inside a diagnostic log line.
pub const EMBEDDED_TURN_TAG: &str = "TURN_JSON:";

/// The two simulated dialogue parties.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The attacking persona driving the dialogue.
    Initiator,
    /// The persona being persuaded; its turns arrive JSON-encoded.
    Responder,
}

#[derive(Debug, Clone, Error)]
#[error("unrecognized dialogue role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    /// Producer versions disagree on role naming; the synonyms collapse here.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "initiator" | "attacker" | "offender" => Ok(Self::Initiator),
            "responder" | "victim" | "target" => Ok(Self::Responder),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiator => f.write_str("initiator"),
            Self::Responder => f.write_str("responder"),
        }
    }
}

/// One utterance by either party. Identity is `(round, turn_index, role)`;
/// the ledger enforces uniqueness of that triple across a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub round: u32,
    pub turn_index: u32,
    pub role: Role,
    pub text: String,
    pub inner_thoughts: Option<String>,
    pub convinced_score: Option<f64>,
    pub timestamp_label: String,
}

impl Turn {
    pub fn key(&self) -> (u32, u32, Role) {
        (self.round, self.turn_index, self.role)
    }
}

/// Extracts canonical turns from a dialogue-bearing event.
///
/// Supports both source shapes: a batch (array of turn-like records under one
/// of the known keys) and a single turn carried directly in the payload.
/// Records without a usable role or body are skipped, never fatal.
pub fn extract_turns(event: &CanonicalEvent) -> Vec<Turn> {
    let round = extract_u32_from_keys(&event.payload, &["round", "run_no"]).map_or(1, clamp_round);

    if let Some(items) = batch_items(&event.payload) {
        return items
            .iter()
            .enumerate()
            .filter_map(|(ordinal, item)| turn_from_record(item, ordinal as u32, round))
            .collect();
    }

    turn_from_record(&event.payload, 0, round)
        .map(|turn| vec![turn])
        .unwrap_or_default()
}

/// Best-effort scan of a diagnostic line for an embedded turn record behind
/// the [`EMBEDDED_TURN_TAG`] prefix. Returns `None` when the tag is absent or
/// the record does not parse; diagnostic capture is unaffected either way.
pub fn extract_embedded_turn(text: &str, default_round: u32) -> Option<Turn> {
    let tail = text.split(EMBEDDED_TURN_TAG).nth(1)?;
    let span = first_object_span(tail)?;
    let record: Value = serde_json::from_str(span).ok()?;
    turn_from_record(&record, 0, default_round)
}

fn batch_items(payload: &Value) -> Option<&Vec<Value>> {
    for key in ["logs", "messages", "turns", "data"] {
        if let Some(items) = payload.get(key).and_then(Value::as_array) {
            return Some(items);
        }
    }
    None
}

fn turn_from_record(record: &Value, ordinal: u32, default_round: u32) -> Option<Turn> {
    let role_str = extract_str_from_keys(record, &["role", "speaker"])?;
    let role = match Role::from_str(role_str) {
        Ok(role) => role,
        Err(err) => {
            debug!(%err, "skipping turn record");
            return None;
        }
    };

    let body = extract_str_from_keys(record, &["message", "text", "content"])?;
    let round =
        extract_u32_from_keys(record, &["round", "run_no"]).map_or(default_round, clamp_round);
    let turn_index =
        extract_u32_from_keys(record, &["turn_index", "turn", "index"]).unwrap_or(ordinal);
    let timestamp_label = extract_str_from_keys(record, &["timestamp", "time"])
        .unwrap_or_default()
        .to_string();

    let (text, inner_thoughts, convinced_score) = match role {
        Role::Initiator => (normalize_whitespace(body), None, None),
        Role::Responder => decode_responder_body(body),
    };

    Some(Turn {
        round,
        turn_index,
        role,
        text,
        inner_thoughts,
        convinced_score,
        timestamp_label,
    })
}

/// Responder turns are emitted as free text embedding a JSON blob with
/// `dialogue`, `thoughts`, and a numeric `is_convinced`. The first balanced
/// `{...}` span is parsed; when that fails the cleaned text stands in and the
/// analytical fields stay empty.
fn decode_responder_body(body: &str) -> (String, Option<String>, Option<f64>) {
    if let Some(span) = first_object_span(body) {
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            if let Some(dialogue) = value.get("dialogue").and_then(Value::as_str) {
                let thoughts = value
                    .get("thoughts")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let convinced = value.get("is_convinced").and_then(number_as_f64);
                return (dialogue.to_string(), thoughts, convinced);
            }
        }
    }
    debug!("responder body had no parseable dialogue object, using cleaned text");
    (clean_annotated_text(body), None, None)
}

/// Locates the first balanced `{...}` span, tolerating braces inside JSON
/// string literals.
fn first_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strips code-fence annotations (``` markers, a leading `json` tag) before
/// whitespace normalization.
fn clean_annotated_text(body: &str) -> String {
    let stripped = body.replace("```", " ");
    let without_tag = stripped
        .trim_start()
        .strip_prefix("json")
        .map(|rest| rest.to_string())
        .unwrap_or(stripped);
    normalize_whitespace(&without_tag)
}

/// Collapses runs of spaces within lines and trims line boundaries; blank
/// lines are dropped.
fn normalize_whitespace(body: &str) -> String {
    body.lines()
        .map(|line| {
            line.split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// Rounds are one-based; a zero from the producer is treated as round one.
fn clamp_round(round: u32) -> u32 {
    round.max(1)
}

fn number_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn extract_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn extract_str_from_keys<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| extract_str(value, key))
}

fn extract_u32_from_keys(value: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter().find_map(|key| {
        value
            .get(key)
            .and_then(number_as_f64)
            .filter(|n| *n >= 0.0)
            .map(|n| n as u32)
    })
}
