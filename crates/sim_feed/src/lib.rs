#![forbid(unsafe_code)]
//! Event normalization and turn extraction for the dialogue simulation feed.
//!
//! The simulation server pushes a weakly structured event stream: some events
//! carry typed JSON payloads, some carry free text with a JSON object embedded
//! in it, and some are plain log lines. This crate turns that stream into a
//! canonical shape:
//! - [`normalize`] converts each raw item into a [`CanonicalEvent`] and never
//!   fails; undecodable text is wrapped as a `{"message": ...}` payload.
//! - [`extract_turns`] pulls dialogue [`Turn`]s out of batched and single-turn
//!   events, including the responder's JSON-in-text body shape.
//! - [`TurnLedger`] guarantees at-most-once downstream emission per logical
//!   turn key `(round, turn_index, role)`.

mod event;
mod ledger;
mod normalize;
mod turns;

pub use event::{CanonicalEvent, EventKind, RawEvent, RawPayload};
pub use ledger::TurnLedger;
pub use normalize::normalize;
pub use turns::{extract_embedded_turn, extract_turns, Role, Turn, UnknownRole, EMBEDDED_TURN_TAG};
