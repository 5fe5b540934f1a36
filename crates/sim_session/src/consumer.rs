use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use sim_feed::{
    extract_embedded_turn, extract_turns, normalize, CanonicalEvent, EventKind, Turn, TurnLedger,
};

use crate::aggregate::{RoundArtifact, RoundTable};
use crate::error::{Advisory, SessionError, DUPLICATE_RUN_PATTERN};
use crate::finalize::{BundleFetcher, CaseHandle, SessionResult};
use crate::transport::{FeedPublisher, FeedTransport, DEFAULT_CHANNEL_CAPACITY};

/// Case-insensitive sentinel phrase: a diagnostic line containing it means
/// the producer's processing chain has finished, even when the explicit
/// end-of-run event never arrives.
pub const COMPLETION_SENTINEL: &str = "agent chain finished";

/// Run lifecycle. Exactly one value at any time for the active run.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Prepare,
    Running,
    Finish,
}

/// Parameters for starting a run.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub stream_id: String,
}

impl StartRequest {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
        }
    }
}

/// Cloneable cancellation handle; flips the flag the drain loop observes
/// before processing each event. Never interrupts in-progress work.
#[derive(Debug, Clone)]
pub struct SessionCancel(Arc<AtomicBool>);

impl SessionCancel {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct SessionConsumerBuilder {
    channel_capacity: Option<usize>,
    fetcher: Option<Box<dyn BundleFetcher>>,
}

impl SessionConsumerBuilder {
    /// Buffer size of the push-to-pull channel.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = Some(capacity);
        self
    }

    /// External bundle-fetch used by the finalizer. Without one, `complete`
    /// still drains the run; it just produces no [`SessionResult`].
    pub fn bundle_fetcher(mut self, fetcher: impl BundleFetcher + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    pub fn build(self) -> SessionConsumer {
        SessionConsumer {
            transport: FeedTransport::new(),
            ledger: TurnLedger::new(),
            rounds: RoundTable::new(),
            transcript: Vec::new(),
            phase: RunPhase::Idle,
            case: None,
            progress: 0,
            diagnostics: Vec::new(),
            advisories: Vec::new(),
            failure: None,
            result: None,
            cancel: Arc::new(AtomicBool::new(false)),
            channel_capacity: self.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY),
            fetcher: self.fetcher,
        }
    }
}

enum Flow {
    Continue,
    Break,
}

/// Single cooperative consumer of the simulation feed.
///
/// Events are processed strictly one at a time in delivery order; the only
/// suspension points are the empty-channel wait and the bundle fetch. The
/// transport handle is owned here and released on every exit path of
/// [`SessionConsumer::drain`].
pub struct SessionConsumer {
    transport: FeedTransport,
    ledger: TurnLedger,
    rounds: RoundTable,
    transcript: Vec<Turn>,
    phase: RunPhase,
    case: Option<CaseHandle>,
    progress: u32,
    diagnostics: Vec<String>,
    advisories: Vec<Advisory>,
    failure: Option<SessionError>,
    result: Option<SessionResult>,
    cancel: Arc<AtomicBool>,
    channel_capacity: usize,
    fetcher: Option<Box<dyn BundleFetcher>>,
}

impl Default for SessionConsumer {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SessionConsumer {
    pub fn builder() -> SessionConsumerBuilder {
        SessionConsumerBuilder::default()
    }

    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a run: clears all per-run state, opens the transport, and
    /// returns the producer-side publisher. No-op (`None`) when a run is
    /// already active.
    pub fn start(&mut self, request: StartRequest) -> Option<FeedPublisher> {
        if matches!(self.phase, RunPhase::Prepare | RunPhase::Running) {
            debug!(stream_id = %request.stream_id, "start ignored, run already active");
            return None;
        }

        self.ledger.clear();
        self.rounds.clear();
        self.transcript.clear();
        self.diagnostics.clear();
        self.advisories.clear();
        self.failure = None;
        self.result = None;
        self.case = None;
        self.progress = 0;
        self.cancel.store(false, Ordering::SeqCst);
        self.phase = RunPhase::Prepare;

        Some(self.transport.open(request.stream_id, self.channel_capacity))
    }

    /// Explicit caller cancellation. Accepted in any state, idempotent:
    /// sets the cancellation flag, tears the transport down, leaves the
    /// consumer at `Idle`.
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.transport.close();
        self.phase = RunPhase::Idle;
    }

    /// Handle for cooperative cancellation from outside the drain loop.
    pub fn cancel_token(&self) -> SessionCancel {
        SessionCancel(Arc::clone(&self.cancel))
    }

    /// Pulls and applies events until a terminal condition: an end-of-run
    /// event kind, the completion sentinel, cancellation, or the stream
    /// ending. The transport handle is closed before returning, on every
    /// path.
    pub async fn drain(&mut self) {
        while let Some(raw) = self.transport.recv().await {
            if self.cancel.load(Ordering::SeqCst) {
                self.phase = RunPhase::Idle;
                break;
            }
            let event = normalize(raw);
            if matches!(self.apply(event).await, Flow::Break) {
                break;
            }
        }

        if matches!(self.phase, RunPhase::Prepare | RunPhase::Running) {
            warn!("feed stream ended without a terminal event");
            self.failure = Some(SessionError::StreamClosed);
            self.phase = RunPhase::Finish;
        }

        self.transport.close();
    }

    async fn apply(&mut self, event: CanonicalEvent) -> Flow {
        debug!(kind = ?event.kind, "applying feed event");
        if event.kind.carries_turns() {
            self.note_activity();
            for turn in extract_turns(&event) {
                self.emit_turn(turn);
            }
            return Flow::Continue;
        }
        if event.kind.is_diagnostic() {
            return self.capture_diagnostic(&event);
        }

        match event.kind {
            EventKind::CaseCreated => {
                self.record_case(&event.payload);
                Flow::Continue
            }
            EventKind::RoundStart => {
                self.note_activity();
                Flow::Continue
            }
            EventKind::SimulationProgress => {
                self.note_activity();
                self.progress = self.progress.saturating_add(1);
                Flow::Continue
            }
            EventKind::RoundComplete => Flow::Continue,
            EventKind::Judgement => {
                self.rounds.apply_judgement(&event.payload);
                Flow::Continue
            }
            EventKind::Guidance => {
                self.rounds.apply_guidance(&event.payload);
                Flow::Continue
            }
            EventKind::Prevention => {
                self.rounds.apply_prevention(&event.payload);
                Flow::Continue
            }
            EventKind::Complete => {
                if self.phase == RunPhase::Running {
                    self.finalize().await;
                }
                self.phase = RunPhase::Idle;
                Flow::Break
            }
            EventKind::RunEnd | EventKind::RunEndLocal => {
                self.phase = RunPhase::Finish;
                Flow::Break
            }
            EventKind::Error => {
                let message = event
                    .message()
                    .unwrap_or("producer reported an unspecified error")
                    .to_string();
                if message.contains(DUPLICATE_RUN_PATTERN) {
                    self.advisories.push(Advisory::DuplicateRun {
                        message: message.clone(),
                    });
                }
                warn!(%message, "feed error event");
                self.failure = Some(SessionError::Producer { message });
                self.phase = RunPhase::Finish;
                Flow::Break
            }
            EventKind::Other(ref kind) => {
                // Catch-all: unrecognized kinds are captured, never dropped.
                debug!(%kind, "unrecognized event kind");
                self.diagnostics
                    .push(format!("[{kind}] {}", event.payload));
                Flow::Continue
            }
            // Handled ahead of the match by the kind predicates.
            EventKind::ConversationLog
            | EventKind::NewMessage
            | EventKind::Log
            | EventKind::Terminal
            | EventKind::AgentAction => Flow::Continue,
        }
    }

    fn record_case(&mut self, payload: &Value) {
        if self.case.is_some() {
            return;
        }
        if let Some(case_id) = payload.get("case_id").and_then(Value::as_str) {
            debug!(%case_id, "case handle learned");
            self.case = Some(CaseHandle {
                case_id: case_id.to_string(),
            });
        }
    }

    fn note_activity(&mut self) {
        if self.phase == RunPhase::Prepare {
            self.phase = RunPhase::Running;
        }
    }

    fn emit_turn(&mut self, turn: Turn) {
        if self.ledger.admit(&turn) {
            self.transcript.push(turn);
        }
    }

    fn capture_diagnostic(&mut self, event: &CanonicalEvent) -> Flow {
        let text = event
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| event.payload.to_string());

        if let Some(turn) = extract_embedded_turn(&text, self.current_round()) {
            self.note_activity();
            self.emit_turn(turn);
        }

        let finished = text.to_lowercase().contains(COMPLETION_SENTINEL);
        self.diagnostics.push(text);
        if finished {
            debug!("completion sentinel observed");
            self.phase = RunPhase::Finish;
            return Flow::Break;
        }
        Flow::Continue
    }

    fn current_round(&self) -> u32 {
        self.transcript.last().map(|turn| turn.round).unwrap_or(1)
    }

    /// Best-effort enrichment: fetches the case bundle and records the
    /// consolidated result. Skipped when no case handle was learned; fetch
    /// failures are swallowed and the run still counts as complete.
    async fn finalize(&mut self) {
        if self.result.is_some() {
            return;
        }
        let Some(case) = self.case.as_ref() else {
            debug!("no case handle learned, skipping bundle fetch");
            return;
        };
        let Some(fetcher) = self.fetcher.as_ref() else {
            return;
        };

        match fetcher.fetch_bundle(&case.case_id).await {
            Ok(bundle) => {
                self.result = Some(SessionResult::from_bundle(bundle, self.transcript.len()));
            }
            Err(err) => {
                warn!(case_id = %case.case_id, %err, "bundle fetch failed, run still complete");
            }
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn rounds(&self) -> impl Iterator<Item = &RoundArtifact> {
        self.rounds.iter()
    }

    pub fn round(&self, round: u32) -> Option<&RoundArtifact> {
        self.rounds.get(round)
    }

    pub fn latest_judgement(&self) -> Option<&RoundArtifact> {
        self.rounds.latest_judgement()
    }

    pub fn latest_guidance(&self) -> Option<&Value> {
        self.rounds.latest_guidance()
    }

    pub fn latest_prevention(&self) -> Option<&Value> {
        self.rounds.latest_prevention()
    }

    pub fn case(&self) -> Option<&CaseHandle> {
        self.case.as_ref()
    }

    pub fn progress(&self) -> u32 {
        self.progress
    }

    pub fn result(&self) -> Option<&SessionResult> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<&SessionError> {
        self.failure.as_ref()
    }

    pub fn advisories(&self) -> &[Advisory] {
        &self.advisories
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }
}
