//! AI Director: a one-shot, advisory rebalance suggestion after the first round.
//!
//! The suggestion is shown to players but never applied to the board.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::generation::{SYSTEM_INSTRUCTION, TextGenerator, strip_code_fence};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceRequest {
    /// Kept as raw JSON: only a numeric 1 means anything.
    #[serde(default)]
    pub turn_number: Value,
    #[serde(default)]
    pub current_scores: Value,
    #[serde(default)]
    pub board_state: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceAction {
    InjectTile,
    GlobalBuff,
    GlobalNerf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceDetails {
    pub title: String,
    pub description: String,
    pub target_tile_id: i64,
}

/// Suggestion produced by the model when the guarantee fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceSuggestion {
    pub action: RebalanceAction,
    pub details: RebalanceDetails,
    pub is_guarantee_triggered: bool,
}

/// Wire response of the rebalance endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RebalanceResponse {
    Suggestion(RebalanceSuggestion),
    NoAction { action: String, message: String },
}

impl RebalanceResponse {
    pub fn no_action() -> Self {
        RebalanceResponse::NoAction {
            action: "none".to_string(),
            message: "No rebalance needed at this time.".to_string(),
        }
    }

    pub fn suggestion(&self) -> Option<&RebalanceSuggestion> {
        match self {
            RebalanceResponse::Suggestion(s) => Some(s),
            RebalanceResponse::NoAction { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum DirectorError {
    Generation(String),
    Malformed(String),
}

impl std::fmt::Display for DirectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectorError::Generation(e) => write!(f, "Rebalance generation failed: {}", e),
            DirectorError::Malformed(e) => write!(f, "Malformed rebalance suggestion: {}", e),
        }
    }
}

impl std::error::Error for DirectorError {}

/// The guarantee is forced, not probabilistic: it fires for turn 1 only.
pub fn is_guarantee_triggered(turn_number: &Value) -> bool {
    turn_number.as_f64() == Some(1.0)
}

pub fn rebalance_prompt() -> &'static str {
    "現在ターン1が終了しました。盛り上げるために、ゲーム盤面の特定のマス（ID: 2〜4あたり）を\n\
     「全員が1マス進む」などの強力なイベントマス（Rescue/Bonus）に書き換える Rebalance 措置を提案してください。"
}

pub fn rebalance_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "action": { "type": "STRING", "enum": ["inject_tile", "global_buff", "global_nerf"] },
            "details": {
                "type": "OBJECT",
                "properties": {
                    "title": { "type": "STRING" },
                    "description": { "type": "STRING" },
                    "targetTileId": { "type": "INTEGER" }
                },
                "required": ["title", "description", "targetTileId"]
            }
        },
        "required": ["action", "details"]
    })
}

/// Endpoint logic for `POST /api/director/rebalance`.
pub async fn rebalance(
    generator: &dyn TextGenerator,
    request: &RebalanceRequest,
) -> Result<RebalanceResponse, DirectorError> {
    let triggered = is_guarantee_triggered(&request.turn_number);
    info!(turn = %request.turn_number, triggered, "Rebalance check");

    if !triggered {
        return Ok(RebalanceResponse::no_action());
    }

    let text = generator
        .generate(rebalance_prompt(), &rebalance_schema(), SYSTEM_INSTRUCTION)
        .await
        .map_err(|e| DirectorError::Generation(e.to_string()))?;

    #[derive(Deserialize)]
    struct Raw {
        action: RebalanceAction,
        details: RebalanceDetails,
    }

    let raw: Raw = serde_json::from_str(strip_code_fence(&text))
        .map_err(|e| DirectorError::Malformed(e.to_string()))?;

    Ok(RebalanceResponse::Suggestion(RebalanceSuggestion {
        action: raw.action,
        details: raw.details,
        is_guarantee_triggered: true,
    }))
}

/// Client-side latch deciding when to ask for a rebalance.
#[derive(Debug, Clone, Default)]
pub struct RebalanceTrigger {
    fired: bool,
}

impl RebalanceTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly when the last player in turn order has just moved in round 1.
    pub fn should_fire(mover_index: usize, player_count: usize, current_turn: u32) -> bool {
        player_count > 0 && mover_index == player_count - 1 && current_turn == 1
    }

    /// Fires at most once per trigger.
    pub fn check(&mut self, mover_index: usize, player_count: usize, current_turn: u32) -> bool {
        if self.fired || !Self::should_fire(mover_index, player_count, current_turn) {
            return false;
        }
        self.fired = true;
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::testing::{FakeGenerator, FakeText};

    fn request(turn: Value) -> RebalanceRequest {
        RebalanceRequest {
            turn_number: turn,
            current_scores: json!([0, 3]),
            board_state: Value::Null,
        }
    }

    #[tokio::test]
    async fn no_action_outside_first_turn() {
        let generator = FakeGenerator::reply("{}");
        for turn in [Value::Null, json!(0), json!(2), json!(7), json!("1"), json!(2.5), json!(true)] {
            let response = rebalance(&generator, &request(turn)).await.unwrap();
            assert_eq!(response, RebalanceResponse::no_action());
        }
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn forced_suggestion_on_turn_one() {
        let generator = FakeGenerator::reply(
            r#"{"action":"inject_tile","details":{"title":"Boost","description":"Everyone moves 1","targetTileId":3}}"#,
        );
        let response = rebalance(&generator, &request(json!(1))).await.unwrap();
        let suggestion = response.suggestion().expect("suggestion");
        assert_eq!(suggestion.action, RebalanceAction::InjectTile);
        assert_eq!(suggestion.details.target_tile_id, 3);
        assert!(suggestion.is_guarantee_triggered);

        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["action"], "inject_tile");
        assert_eq!(wire["details"]["targetTileId"], 3);
        assert_eq!(wire["isGuaranteeTriggered"], true);
    }

    #[tokio::test]
    async fn malformed_or_failed_generation_is_an_error() {
        let generator = FakeGenerator::reply(r#"{"action":"teleport","details":{}}"#);
        let err = rebalance(&generator, &request(json!(1))).await.unwrap_err();
        assert!(matches!(err, DirectorError::Malformed(_)));

        let generator = FakeGenerator::new(FakeText::Fail);
        let err = rebalance(&generator, &request(json!(1))).await.unwrap_err();
        assert!(matches!(err, DirectorError::Generation(_)));
    }

    #[test]
    fn no_action_wire_shape() {
        let wire = serde_json::to_value(RebalanceResponse::no_action()).unwrap();
        assert_eq!(wire["action"], "none");
        assert!(wire.get("details").is_none());
        let parsed: RebalanceResponse = serde_json::from_value(wire).unwrap();
        assert!(parsed.suggestion().is_none());
    }

    #[test]
    fn request_accepts_missing_fields() {
        let parsed: RebalanceRequest = serde_json::from_value(json!({ "turnNumber": 1 })).unwrap();
        assert_eq!(parsed.turn_number, json!(1));
        assert_eq!(parsed.board_state, Value::Null);
    }

    #[test]
    fn guarantee_needs_a_numeric_one() {
        assert!(is_guarantee_triggered(&json!(1)));
        assert!(is_guarantee_triggered(&json!(1.0)));
        assert!(!is_guarantee_triggered(&json!("1")));
        assert!(!is_guarantee_triggered(&json!(1.5)));
        assert!(!is_guarantee_triggered(&Value::Null));

        let parsed: RebalanceRequest = serde_json::from_value(json!({ "turnNumber": "2" })).unwrap();
        assert!(!is_guarantee_triggered(&parsed.turn_number));
    }

    #[test]
    fn trigger_fires_once_at_end_of_first_round() {
        let mut trigger = RebalanceTrigger::new();
        assert!(!trigger.check(0, 3, 1));
        assert!(!trigger.check(1, 3, 1));
        assert!(trigger.check(2, 3, 1));
        assert!(trigger.has_fired());
        assert!(!trigger.check(2, 3, 1));
    }

    #[test]
    fn trigger_ignores_later_rounds_and_empty_rosters() {
        assert!(!RebalanceTrigger::should_fire(2, 3, 2));
        assert!(!RebalanceTrigger::should_fire(0, 0, 1));
        assert!(RebalanceTrigger::should_fire(0, 1, 1));
    }
}
