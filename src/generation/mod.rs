pub mod client;

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::board::tile::clamp_tile_count;
use crate::board::{create_template_board, create_template_board_for, normalize_against, BoardSpec, Language};
pub use client::{GenerateError, ImageGenerator, TextGenerator};

/// Fixed guard rails sent with every generation request.
pub const SYSTEM_INSTRUCTION: &str = "性格タイプ判定をしない / 医療・メンタル助言をしない / 個人の機微情報を推測しない";

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_millis(2500);

/// Tile count used by the outer catch-all when nothing else is available.
pub const EMERGENCY_TILE_COUNT: i64 = 10;

/// A validated board generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardRequest {
    pub players: Vec<Value>,
    pub session: SessionLength,
    pub language: Language,
}

impl BoardRequest {
    /// Parse a request body. `players` must be present and an array.
    pub fn from_json(body: &Value) -> Result<Self, String> {
        let players = body
            .get("players")
            .and_then(Value::as_array)
            .ok_or_else(|| "players array is required".to_string())?;
        let session = SessionLength::from_json(body.get("sessionMinutes"));
        let language = body
            .get("language")
            .and_then(Value::as_str)
            .and_then(Language::from_name)
            .unwrap_or_default();
        Ok(BoardRequest {
            players: players.clone(),
            session,
            language,
        })
    }

    pub fn tile_count(&self) -> usize {
        self.session.tile_count()
    }
}

/// How a request's `sessionMinutes` reads.
///
/// Missing, `null`, `false`, `0` and `""` mean the default 10 minute session.
/// Any other non-number is kept as `Unrecognized` and never equals 10.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionLength {
    Default,
    Minutes(f64),
    Unrecognized,
}

impl SessionLength {
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) | Some(Value::Bool(false)) => SessionLength::Default,
            Some(Value::Number(n)) => Self::from_minutes(n.as_f64()),
            Some(Value::String(s)) if s.is_empty() => SessionLength::Default,
            Some(_) => SessionLength::Unrecognized,
        }
    }

    pub fn from_minutes(minutes: Option<f64>) -> Self {
        match minutes {
            Some(m) if m != 0.0 && !m.is_nan() => SessionLength::Minutes(m),
            _ => SessionLength::Default,
        }
    }

    /// Short (10 minute) sessions get 10 tiles, everything else 22.
    pub fn tile_count(self) -> usize {
        let requested = match self {
            SessionLength::Default => 10,
            SessionLength::Minutes(m) if m == 10.0 => 10,
            SessionLength::Minutes(_) | SessionLength::Unrecognized => 22,
        };
        clamp_tile_count(requested)
    }
}

pub fn tile_count_for_session(session_minutes: Option<f64>) -> usize {
    SessionLength::from_minutes(session_minutes).tile_count()
}

pub fn build_board_prompt(tile_count: usize, players: &[Value]) -> String {
    let roster = serde_json::to_string_pretty(players).unwrap_or_else(|_| "[]".to_string());
    format!(
        "以下のプレイヤープロフィールを元に、全員が楽しめるすごろくの盤面（BoardSpec）を生成してください。\n\
         マス数（tiles）は正確に {count} 個生成し、最後のマスは id:{count}, type:'goal' としてください。\n\
         \n\
         【プレイヤー一覧】\n\
         {roster}\n",
        count = tile_count,
        roster = roster
    )
}

/// Response schema handed to the model for board generation.
pub fn board_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "world": {
                "type": "OBJECT",
                "properties": {
                    "theme": { "type": "STRING", "description": "Theme based on player profiles" },
                    "tone": { "type": "STRING", "description": "Tone of the game" },
                    "artStylePrompt": { "type": "STRING", "description": "Prompt for background art generation" }
                },
                "required": ["theme", "tone", "artStylePrompt"]
            },
            "tiles": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "id": { "type": "INTEGER" },
                        "title": { "type": "STRING", "description": "Max 15 chars" },
                        "type": { "type": "STRING", "enum": ["normal", "bonus", "penalty", "event", "rescue", "goal"] },
                        "eventSeed": { "type": "STRING", "description": "Max 40 chars. Do not include medical/personality typing." },
                        "effect": {
                            "type": "OBJECT",
                            "properties": {
                                "type": { "type": "STRING", "enum": ["advance", "retreat", "score", "swap", "choice", "none"] },
                                "value": { "type": "INTEGER" }
                            },
                            "required": ["type", "value"]
                        },
                        "iconPrompt": { "type": "STRING", "description": "Prompt for tile icon art" }
                    },
                    "required": ["id", "title", "type", "eventSeed", "effect", "iconPrompt"]
                }
            }
        },
        "required": ["world", "tiles"]
    })
}

/// Remove a leading ```` ```json ```` / ```` ``` ```` fence and a trailing ```` ``` ````.
pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// What came back from the model, before any interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Success(String),
    TimedOut,
    Failed(String),
}

/// Run one generation call, racing it against `timeout`.
pub async fn request_generation(
    generator: &dyn TextGenerator,
    prompt: &str,
    schema: &Value,
    timeout: Duration,
) -> GenerationOutcome {
    match tokio::time::timeout(timeout, generator.generate(prompt, schema, SYSTEM_INSTRUCTION)).await {
        Ok(Ok(text)) => GenerationOutcome::Success(text),
        Ok(Err(e)) => GenerationOutcome::Failed(e.to_string()),
        Err(_) => GenerationOutcome::TimedOut,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardStatus {
    /// Board built from model output (HTTP 200).
    Generated,
    /// Deterministic template board (HTTP 206).
    Fallback,
}

impl BoardStatus {
    pub fn http_code(self) -> u16 {
        match self {
            BoardStatus::Generated => 200,
            BoardStatus::Fallback => 206,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardResponse {
    pub status: BoardStatus,
    pub board: BoardSpec,
}

impl BoardResponse {
    pub fn fallback(board: BoardSpec) -> Self {
        BoardResponse {
            status: BoardStatus::Fallback,
            board,
        }
    }
}

/// Turn a generation outcome into a playable board. Always produces one.
pub fn decide_board(outcome: GenerationOutcome, tile_count: usize, fallback: BoardSpec) -> BoardResponse {
    match outcome {
        GenerationOutcome::Success(text) => {
            let body = strip_code_fence(&text);
            if body.is_empty() {
                error!(tile_count, "Board generation returned empty text, using template board");
                return BoardResponse::fallback(fallback);
            }
            match serde_json::from_str::<Value>(body) {
                Ok(candidate) => BoardResponse {
                    status: BoardStatus::Generated,
                    board: normalize_against(Some(&candidate), &fallback),
                },
                Err(e) => {
                    error!(tile_count, error = %e, "Board response is not JSON, using template board");
                    BoardResponse::fallback(fallback)
                }
            }
        }
        GenerationOutcome::TimedOut => {
            warn!(tile_count, "Board generation timed out, using template board");
            BoardResponse::fallback(fallback)
        }
        GenerationOutcome::Failed(reason) => {
            error!(tile_count, %reason, "Board generation failed, using template board");
            BoardResponse::fallback(fallback)
        }
    }
}

/// Full pipeline: tile policy, prompt, timed generation, normalization.
pub async fn generate_board(
    generator: &dyn TextGenerator,
    request: &BoardRequest,
    timeout: Duration,
) -> BoardResponse {
    let tile_count = request.tile_count();
    // ready before the model is asked anything
    let fallback = create_template_board_for(tile_count as i64, request.language);

    info!(
        players = request.players.len(),
        tile_count,
        "Generating board"
    );

    let prompt = build_board_prompt(tile_count, &request.players);
    let outcome = request_generation(generator, &prompt, &board_response_schema(), timeout).await;
    decide_board(outcome, tile_count, fallback)
}

/// Board served when the request handler itself fails unexpectedly.
pub fn emergency_board() -> BoardResponse {
    BoardResponse::fallback(create_template_board(EMERGENCY_TILE_COUNT))
}
