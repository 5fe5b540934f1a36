use serde_json::json;

use sim_feed::{Role, EMBEDDED_TURN_TAG};

use super::*;

#[tokio::test]
async fn replayed_single_turn_is_delivered_once() {
    let mut consumer = SessionConsumer::new();
    drive(
        &mut consumer,
        vec![
            single_turn(1, 0, "initiator", "hello"),
            single_turn(1, 0, "initiator", "hello"),
            event("run_end", json!({})),
        ],
    )
    .await;

    assert_eq!(consumer.transcript().len(), 1);
}

#[tokio::test]
async fn ordering_is_preserved_across_batched_and_single_kinds() {
    let mut consumer = SessionConsumer::new();
    drive(
        &mut consumer,
        vec![
            single_turn(1, 0, "initiator", "opening"),
            event(
                "conversation_logs",
                json!({
                    "round": 1,
                    "logs": [
                        {"role": "initiator", "message": "opening", "turn_index": 0},
                        {"role": "victim", "message": "{\"dialogue\":\"who is this\",\"is_convinced\":5}", "turn_index": 1},
                        {"role": "initiator", "message": "bank security here", "turn_index": 2}
                    ]
                }),
            ),
            single_turn(1, 3, "victim", "{\"dialogue\":\"oh no\",\"thoughts\":\"worried\",\"is_convinced\":35}"),
            event("run_end", json!({})),
        ],
    )
    .await;

    let texts: Vec<&str> = consumer
        .transcript()
        .iter()
        .map(|turn| turn.text.as_str())
        .collect();
    assert_eq!(
        texts,
        vec!["opening", "who is this", "bank security here", "oh no"]
    );

    let last = consumer.transcript().last().unwrap();
    assert_eq!(last.role, Role::Responder);
    assert_eq!(last.inner_thoughts.as_deref(), Some("worried"));
    assert_eq!(last.convinced_score, Some(35.0));
}

#[tokio::test]
async fn embedded_turn_in_a_log_line_joins_the_transcript_and_deduplicates() {
    let mut consumer = SessionConsumer::new();
    let tagged = format!(
        "step complete {EMBEDDED_TURN_TAG} {}",
        json!({"role": "offender", "message": "press one now", "round": 1, "turn_index": 2})
    );
    drive(
        &mut consumer,
        vec![
            RawEvent::text("log", &tagged),
            // Producer later resends the same turn through the normal channel.
            single_turn(1, 2, "initiator", "press one now"),
            event("run_end", json!({})),
        ],
    )
    .await;

    assert_eq!(consumer.transcript().len(), 1);
    assert_eq!(consumer.transcript()[0].text, "press one now");
    assert_eq!(consumer.diagnostics().len(), 1);
}

#[tokio::test]
async fn unknown_event_kinds_follow_the_catch_all_path() {
    let mut consumer = SessionConsumer::new();
    drive(
        &mut consumer,
        vec![
            event("heartbeat", json!({"seq": 7})),
            event("run_end", json!({})),
        ],
    )
    .await;

    assert_eq!(consumer.diagnostics().len(), 1);
    assert!(consumer.diagnostics()[0].starts_with("[heartbeat]"));
}

#[tokio::test]
async fn round_complete_is_advisory_only() {
    let mut consumer = SessionConsumer::new();
    drive(
        &mut consumer,
        vec![
            single_turn(1, 0, "initiator", "hello"),
            event("round_complete", json!({"round": 1, "total_turns": 1})),
            event("run_end", json!({})),
        ],
    )
    .await;

    assert_eq!(consumer.transcript().len(), 1);
    assert!(consumer.rounds().next().is_none());
}
