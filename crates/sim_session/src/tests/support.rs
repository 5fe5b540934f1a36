use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use sim_feed::RawEvent;

use crate::{
    BundleFetchError, BundleFetcher, BundleFuture, CaseBundle, SessionConsumer, StartRequest,
};

pub fn event(kind: &str, payload: Value) -> RawEvent {
    RawEvent::structured(kind, payload)
}

pub fn case_created(case_id: &str) -> RawEvent {
    event("case_created", json!({ "case_id": case_id }))
}

pub fn progress(round: u32) -> RawEvent {
    event(
        "simulation_progress",
        json!({ "round": round, "message": "working" }),
    )
}

pub fn single_turn(round: u32, turn_index: u32, role: &str, message: &str) -> RawEvent {
    event(
        "new_message",
        json!({
            "round": round,
            "turn_index": turn_index,
            "role": role,
            "message": message
        }),
    )
}

/// Pushes every event, ends the stream, and drains the consumer.
pub async fn drive(consumer: &mut SessionConsumer, events: Vec<RawEvent>) {
    let publisher = consumer
        .start(StartRequest::new("run-1"))
        .expect("consumer should be idle");
    for item in events {
        assert!(publisher.publish(item).await, "publish failed");
    }
    drop(publisher);
    consumer.drain().await;
}

/// Bundle fetcher with canned outcome and call recording.
pub struct StubFetcher {
    outcome: Result<CaseBundle, String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StubFetcher {
    pub fn ok(bundle: CaseBundle) -> (Self, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                outcome: Ok(bundle),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }

    pub fn failing(message: &str) -> (Self, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                outcome: Err(message.to_string()),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl BundleFetcher for StubFetcher {
    fn fetch_bundle(&self, case_id: &str) -> BundleFuture {
        self.calls.lock().unwrap().push(case_id.to_string());
        let outcome = self.outcome.clone();
        Box::pin(async move { outcome.map_err(BundleFetchError::new) })
    }
}
