use thiserror::Error;

/// Message substring identifying a duplicate-run conflict reported by the
/// producer. Recognized errors are additionally surfaced as an [`Advisory`].
pub const DUPLICATE_RUN_PATTERN: &str = "a duplicate run was detected";

/// Terminal failure recorded for a run. The consumer never propagates these
/// as panics or early returns; they are read back through
/// `SessionConsumer::failure`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("producer reported an error: {message}")]
    Producer { message: String },
    #[error("feed stream closed before a terminal event")]
    StreamClosed,
}

/// Failure returned by a [`crate::BundleFetcher`]. Always swallowed by the
/// finalizer; enrichment is best-effort.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("bundle fetch failed: {message}")]
pub struct BundleFetchError {
    pub message: String,
}

impl BundleFetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// User-facing notice raised alongside (not instead of) the standard error
/// handling path.
#[derive(Debug, Clone, PartialEq)]
pub enum Advisory {
    DuplicateRun { message: String },
}
