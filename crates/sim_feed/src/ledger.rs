use std::collections::HashSet;

use tracing::debug;

use crate::turns::{Role, Turn};

/// Set of already-emitted turn keys for the current run.
///
/// The producer may resend turns (batch replays overlapping earlier single
/// deliveries, reconnect-style duplication); admission through the ledger
/// guarantees at-most-once downstream emission per `(round, turn_index, role)`
/// key. No eviction; the set lives for one run and is cleared when a new run
/// starts.
#[derive(Debug, Default)]
pub struct TurnLedger {
    seen: HashSet<(u32, u32, Role)>,
}

impl TurnLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the turn's key and reports whether it was new. A `false`
    /// return means the turn must be silently dropped.
    pub fn admit(&mut self, turn: &Turn) -> bool {
        let fresh = self.seen.insert(turn.key());
        if !fresh {
            debug!(
                round = turn.round,
                turn_index = turn.turn_index,
                role = %turn.role,
                "dropping duplicate turn"
            );
        }
        fresh
    }

    pub fn contains(&self, key: (u32, u32, Role)) -> bool {
        self.seen.contains(&key)
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
