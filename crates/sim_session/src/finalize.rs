use std::{future::Future, pin::Pin};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BundleFetchError;

/// Case identifier learned once from a `case_created` event. Immutable for
/// the rest of the run; required input to the finalizer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CaseHandle {
    pub case_id: String,
}

/// Server-computed summary of a completed case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseBundle {
    #[serde(default)]
    pub phishing: Option<bool>,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub total_turns: Option<u32>,
    #[serde(default)]
    pub preview: Option<Value>,
}

/// Consolidated result emitted at most once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub phishing_succeeded: Option<bool>,
    pub evidence: Option<String>,
    pub total_turns: u32,
    pub preview: Option<Value>,
}

/// Type-erased future returned by [`BundleFetcher::fetch_bundle`].
pub type BundleFuture = Pin<Box<dyn Future<Output = Result<CaseBundle, BundleFetchError>> + Send>>;

/// External bundle-fetch seam. The call itself (HTTP, database, whatever the
/// host wires in) lives outside this crate; only the contract is used here.
/// Failures are non-fatal: the finalizer swallows them and the run still
/// completes.
pub trait BundleFetcher: Send {
    fn fetch_bundle(&self, case_id: &str) -> BundleFuture;
}

impl<F> BundleFetcher for F
where
    F: Fn(&str) -> BundleFuture + Send,
{
    fn fetch_bundle(&self, case_id: &str) -> BundleFuture {
        self(case_id)
    }
}

impl SessionResult {
    /// Assembles the result record from a fetched bundle, falling back to the
    /// locally reconstructed transcript length when the bundle omits a count.
    pub fn from_bundle(bundle: CaseBundle, transcript_len: usize) -> Self {
        Self {
            phishing_succeeded: bundle.phishing,
            evidence: bundle.evidence,
            total_turns: bundle.total_turns.unwrap_or(transcript_len as u32),
            preview: bundle.preview,
        }
    }
}
