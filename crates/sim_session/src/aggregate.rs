use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Risk assessment attached to a round judgement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskInfo {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// Analytical artifacts for one round, merged across repeated events.
///
/// Merge rule: a non-null incoming field overwrites the stored one; null or
/// absent fields never regress a previously stored value. Arrays are replaced
/// wholesale, not appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundArtifact {
    pub round: u32,
    pub phishing_succeeded: Option<bool>,
    pub evidence: Option<String>,
    pub risk: Option<RiskInfo>,
    pub victim_vulnerabilities: Vec<String>,
    pub guidance: Option<Value>,
    pub prevention: Option<Value>,
}

impl RoundArtifact {
    fn new(round: u32) -> Self {
        Self {
            round,
            phishing_succeeded: None,
            evidence: None,
            risk: None,
            victim_vulnerabilities: Vec::new(),
            guidance: None,
            prevention: None,
        }
    }
}

/// Per-round artifact map, keyed and iterated ascending by round number.
#[derive(Debug, Default)]
pub struct RoundTable {
    rounds: BTreeMap<u32, RoundArtifact>,
}

impl RoundTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a judgement payload: `round`, `phishing`, `reason`, plus
    /// optional enhancement info (`risk`, `victim_vulnerabilities`) either at
    /// the top level or nested under `enhanced`.
    pub fn apply_judgement(&mut self, payload: &Value) {
        let round = payload_round(payload);
        let artifact = self.entry(round);

        if let Some(phishing) = extract_bool(payload, &["phishing", "phishing_succeeded"]) {
            artifact.phishing_succeeded = Some(phishing);
        }
        if let Some(reason) = extract_str(payload, &["reason", "evidence"]) {
            artifact.evidence = Some(reason.to_string());
        }

        let enhanced = payload.get("enhanced");
        let risk = payload
            .get("risk")
            .or_else(|| enhanced.and_then(|e| e.get("risk")));
        if let Some(risk) = risk.filter(|v| !v.is_null()) {
            match serde_json::from_value::<RiskInfo>(risk.clone()) {
                Ok(info) => artifact.risk = Some(info),
                Err(err) => debug!(%err, round, "ignoring malformed risk info"),
            }
        }

        let vulnerabilities = payload
            .get("victim_vulnerabilities")
            .or_else(|| enhanced.and_then(|e| e.get("victim_vulnerabilities")));
        if let Some(list) = vulnerabilities.and_then(Value::as_array) {
            artifact.victim_vulnerabilities = list
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
    }

    pub fn apply_guidance(&mut self, payload: &Value) {
        let round = payload_round(payload);
        if let Some(value) = artifact_payload(payload) {
            self.entry(round).guidance = Some(value);
        }
    }

    pub fn apply_prevention(&mut self, payload: &Value) {
        let round = payload_round(payload);
        if let Some(value) = artifact_payload(payload) {
            self.entry(round).prevention = Some(value);
        }
    }

    pub fn get(&self, round: u32) -> Option<&RoundArtifact> {
        self.rounds.get(&round)
    }

    /// Artifacts in ascending round order.
    pub fn iter(&self) -> impl Iterator<Item = &RoundArtifact> {
        self.rounds.values()
    }

    pub fn latest_judgement(&self) -> Option<&RoundArtifact> {
        self.rounds
            .values()
            .rev()
            .find(|artifact| artifact.phishing_succeeded.is_some())
    }

    pub fn latest_guidance(&self) -> Option<&Value> {
        self.rounds
            .values()
            .rev()
            .find_map(|artifact| artifact.guidance.as_ref())
    }

    pub fn latest_prevention(&self) -> Option<&Value> {
        self.rounds
            .values()
            .rev()
            .find_map(|artifact| artifact.prevention.as_ref())
    }

    pub fn clear(&mut self) {
        self.rounds.clear();
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    fn entry(&mut self, round: u32) -> &mut RoundArtifact {
        self.rounds
            .entry(round)
            .or_insert_with(|| RoundArtifact::new(round))
    }
}

// Rounds are one-based; zero or a missing key lands in round one.
fn payload_round(payload: &Value) -> u32 {
    ["round", "run_no"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_u64))
        .map(|n| (n as u32).max(1))
        .unwrap_or(1)
}

/// Guidance/prevention payloads arrive in several encodings; checked in
/// priority order: structured payload under `data`, top-level structured
/// payload, `message` fallback string.
fn artifact_payload(payload: &Value) -> Option<Value> {
    if let Some(data) = payload.get("data").filter(|v| !v.is_null()) {
        return Some(data.clone());
    }

    if let Some(object) = payload.as_object() {
        let has_body_keys = object
            .keys()
            .any(|key| !matches!(key.as_str(), "round" | "run_no" | "message"));
        if has_body_keys {
            return Some(payload.clone());
        }
    }

    payload
        .get("message")
        .and_then(Value::as_str)
        .map(|message| Value::String(message.to_string()))
}

fn extract_bool(payload: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| payload.get(*key)?.as_bool())
}

fn extract_str<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| {
        payload
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_never_regresses_stored_fields() {
        let mut table = RoundTable::new();
        table.apply_judgement(&json!({"round": 1, "reason": "E1"}));
        table.apply_judgement(&json!({"round": 1, "reason": null, "risk": {"level": "high"}}));

        let artifact = table.get(1).unwrap();
        assert_eq!(artifact.evidence.as_deref(), Some("E1"));
        assert_eq!(
            artifact.risk.as_ref().unwrap().level.as_deref(),
            Some("high")
        );
    }

    #[test]
    fn arrays_are_replaced_wholesale() {
        let mut table = RoundTable::new();
        table.apply_judgement(&json!({"round": 1, "victim_vulnerabilities": ["urgency", "fear"]}));
        table.apply_judgement(&json!({"round": 1, "victim_vulnerabilities": ["authority"]}));

        assert_eq!(
            table.get(1).unwrap().victim_vulnerabilities,
            vec!["authority".to_string()]
        );
    }

    #[test]
    fn enhancement_info_is_read_from_the_nested_object() {
        let mut table = RoundTable::new();
        table.apply_judgement(&json!({
            "round": 2,
            "phishing": true,
            "reason": "gave out the code",
            "enhanced": {
                "risk": {"level": "critical", "score": 91.5, "rationale": "full account access"},
                "victim_vulnerabilities": ["urgency"]
            }
        }));

        let artifact = table.get(2).unwrap();
        assert_eq!(artifact.phishing_succeeded, Some(true));
        assert_eq!(artifact.risk.as_ref().unwrap().score, Some(91.5));
        assert_eq!(artifact.victim_vulnerabilities, vec!["urgency".to_string()]);
    }

    #[test]
    fn guidance_encoding_priority_is_data_then_top_level_then_message() {
        let mut table = RoundTable::new();

        table.apply_guidance(&json!({"round": 1, "data": {"tip": "slow down"}, "message": "ignored"}));
        assert_eq!(table.latest_guidance().unwrap()["tip"], "slow down");

        table.apply_guidance(&json!({"round": 2, "summary": "verify the caller"}));
        assert_eq!(table.latest_guidance().unwrap()["summary"], "verify the caller");

        table.apply_guidance(&json!({"round": 3, "message": "plain text tip"}));
        assert_eq!(
            table.latest_guidance().unwrap(),
            &Value::String("plain text tip".to_string())
        );
    }

    #[test]
    fn rounds_iterate_ascending_regardless_of_arrival_order() {
        let mut table = RoundTable::new();
        table.apply_judgement(&json!({"round": 3, "phishing": false}));
        table.apply_judgement(&json!({"round": 1, "phishing": true}));
        table.apply_prevention(&json!({"round": 2, "data": {"tip": "hang up"}}));

        let rounds: Vec<u32> = table.iter().map(|artifact| artifact.round).collect();
        assert_eq!(rounds, vec![1, 2, 3]);
    }

    #[test]
    fn missing_round_defaults_to_one() {
        let mut table = RoundTable::new();
        table.apply_prevention(&json!({"data": {"tip": "never share codes"}}));
        assert!(table.get(1).unwrap().prevention.is_some());
    }

    #[test]
    fn round_zero_is_keyed_as_round_one() {
        let mut table = RoundTable::new();
        table.apply_judgement(&json!({"round": 0, "phishing": true}));
        assert!(table.get(0).is_none());
        assert_eq!(table.get(1).unwrap().phishing_succeeded, Some(true));
    }

    #[test]
    fn latest_judgement_is_the_highest_judged_round() {
        let mut table = RoundTable::new();
        table.apply_judgement(&json!({"round": 1, "phishing": true}));
        table.apply_judgement(&json!({"round": 2, "phishing": false}));
        table.apply_guidance(&json!({"round": 5, "data": {"tip": "x"}}));

        assert_eq!(table.latest_judgement().unwrap().round, 2);
    }
}
