//! Profile extraction: introduction transcript in, player profile fields out.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::board::tile::truncate_chars;
use crate::game::session::ProfileFields;
use crate::generation::{strip_code_fence, GenerateError, TextGenerator, SYSTEM_INSTRUCTION};

pub const MAX_TAGS: usize = 5;
pub const TAG_MAX_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    #[serde(default)]
    pub player_index: Option<usize>,
    #[serde(default)]
    pub transcript: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub player_index: usize,
    pub profile: ProfileFields,
}

#[derive(Debug)]
pub enum ProfileError {
    MissingTranscript,
    Generation(GenerateError),
    Malformed(String),
}

impl std::fmt::Display for ProfileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileError::MissingTranscript => write!(f, "Transcript is required"),
            ProfileError::Generation(e) => write!(f, "Profile generation failed: {}", e),
            ProfileError::Malformed(e) => write!(f, "Malformed profile: {}", e),
        }
    }
}

impl std::error::Error for ProfileError {}

pub fn profile_prompt(transcript: &str) -> String {
    format!(
        "以下の自己紹介テキストから、プレイヤーのプロフィール（ニックネーム、趣味・関心タグ、ライフスタイル、属性）を抽出してください。\n\
         \n\
         【自己紹介テキスト】\n\
         {}\n",
        transcript
    )
}

pub fn profile_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "displayName": { "type": "STRING" },
            "tags": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "Max 5 tags, max 20 characters each."
            },
            "lifestyle": { "type": "ARRAY", "items": { "type": "STRING" } },
            "attributes": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["displayName", "tags", "lifestyle", "attributes"]
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Clean up a model-authored profile. Never fails on shape, only on non-objects.
pub fn sanitize_profile(raw: &Value, player_index: usize) -> Result<ProfileFields, ProfileError> {
    let object = raw
        .as_object()
        .ok_or_else(|| ProfileError::Malformed("profile is not an object".to_string()))?;

    let display_name = object
        .get("displayName")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Player {}", player_index + 1));

    let tags = string_list(object.get("tags"))
        .into_iter()
        .take(MAX_TAGS)
        .map(|t| truncate_chars(&t, TAG_MAX_CHARS))
        .collect();

    Ok(ProfileFields {
        display_name,
        tags,
        lifestyle: string_list(object.get("lifestyle")),
        attributes: string_list(object.get("attributes")),
    })
}

/// Endpoint logic for `POST /api/generate/profile`.
pub async fn generate_profile(
    generator: &dyn TextGenerator,
    request: &ProfileRequest,
) -> Result<ProfileResponse, ProfileError> {
    let transcript = request
        .transcript
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ProfileError::MissingTranscript)?;
    let player_index = request.player_index.unwrap_or(0);

    info!(player = player_index, "Generating profile");

    let text = generator
        .generate(&profile_prompt(transcript), &profile_schema(), SYSTEM_INSTRUCTION)
        .await
        .map_err(ProfileError::Generation)?;
    let raw: Value = serde_json::from_str(strip_code_fence(&text))
        .map_err(|e| ProfileError::Malformed(e.to_string()))?;

    Ok(ProfileResponse {
        player_index,
        profile: sanitize_profile(&raw, player_index)?,
    })
}
