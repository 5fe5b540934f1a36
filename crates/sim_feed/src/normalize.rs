use serde_json::{json, Value};

use crate::event::{CanonicalEvent, EventKind, RawEvent, RawPayload};

/// Converts one raw delivered item into the canonical `{kind, payload}` shape.
///
/// Structured payloads pass through. Text payloads get one structured decode
/// attempt: decoded objects and arrays follow the same path as a structured
/// delivery, so the wire encoding never changes downstream semantics. Bare
/// scalars and undecodable text are wrapped as a message payload instead of
/// failing. Several producer versions emit log lines that are JSON and others
/// emit plain diagnostics, so decoding narrows fidelity but never raises.
pub fn normalize(raw: RawEvent) -> CanonicalEvent {
    let kind = EventKind::parse(&raw.kind);
    let payload = match raw.payload {
        RawPayload::Structured(value) => ensure_object(value),
        RawPayload::Text(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value) if value.is_object() || value.is_array() => ensure_object(value),
            _ => json!({ "message": text }),
        },
    };
    CanonicalEvent { kind, payload }
}

/// Non-object structured payloads (arrays, bare scalars) are wrapped under a
/// `data` key so downstream extraction always sees an object.
fn ensure_object(value: Value) -> Value {
    if value.is_object() {
        value
    } else {
        json!({ "data": value })
    }
}
