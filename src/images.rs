//! Best-effort board art. Every image may come back `null`; nothing here blocks play.

use std::collections::HashSet;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::generation::ImageGenerator;

pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(15);
pub const MAX_TILE_ICONS: usize = 6;
pub const MAX_DECORATION_TAGS: usize = 8;
pub const DECORATION_LABELS: [&str; 4] = ["building", "landmark", "nature", "vehicle"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Ok,
    Partial,
}

/// Generate one image, turning every failure (error, timeout, no image) into `None`.
pub async fn generate_single_image(
    generator: &dyn ImageGenerator,
    prompt: &str,
    timeout: Duration,
) -> Option<String> {
    match tokio::time::timeout(timeout, generator.generate_image(prompt)).await {
        Ok(Ok(image)) => image,
        Ok(Err(e)) => {
            error!("Image generation failed: {}", e);
            None
        }
        Err(_) => {
            error!(timeout_ms = timeout.as_millis() as u64, "Image generation timed out");
            None
        }
    }
}

// === Board background and tile icons ===

#[derive(Debug, Clone, PartialEq)]
pub struct ImagesRequest {
    pub art_style_prompt: Option<String>,
    pub tiles: Vec<Value>,
}

impl ImagesRequest {
    pub fn from_json(body: &Value) -> Result<Self, String> {
        let tiles = body
            .get("tiles")
            .and_then(Value::as_array)
            .ok_or_else(|| "tiles array is required".to_string())?;
        Ok(ImagesRequest {
            art_style_prompt: body
                .get("artStylePrompt")
                .and_then(Value::as_str)
                .map(str::to_string),
            tiles: tiles.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileImage {
    pub id: Value,
    #[serde(rename = "type")]
    pub tile_type: String,
    pub image_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardImages {
    pub background: Option<String>,
    pub tiles: Vec<TileImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImagesResponse {
    pub status: ImageStatus,
    pub images: BoardImages,
}

pub fn background_prompt(art_style_prompt: Option<&str>) -> String {
    let theme = art_style_prompt
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("A fun adventure world");
    format!(
        "2.5D isometric game board background, bird's eye view, green grass field with pathways, \
         cute and colorful style. Theme: {}. 16:9 aspect ratio. No text, no UI elements.",
        theme
    )
}

fn tile_field<'a>(tile: &'a Value, key: &str) -> Option<&'a str> {
    tile.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// One icon prompt per distinct tile type, first occurrence wins, capped at [`MAX_TILE_ICONS`].
pub fn icon_prompts(tiles: &[Value]) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut prompts = Vec::new();
    for tile in tiles {
        if prompts.len() >= MAX_TILE_ICONS {
            break;
        }
        let tile_type = tile_field(tile, "type").unwrap_or("normal").to_string();
        if !seen.insert(tile_type.clone()) {
            continue;
        }
        let subject = tile_field(tile, "iconPrompt")
            .or_else(|| tile_field(tile, "title"))
            .unwrap_or("a game tile");
        prompts.push((
            tile_type,
            format!(
                "Small 2.5D isometric game tile icon, cute flat illustration, {}. No text, no background.",
                subject
            ),
        ));
    }
    prompts
}

/// Endpoint logic for `POST /api/generate/images`.
pub async fn generate_board_images(
    generator: &dyn ImageGenerator,
    request: &ImagesRequest,
    timeout: Duration,
) -> ImagesResponse {
    info!(tiles = request.tiles.len(), "Generating board images");

    let bg_prompt = background_prompt(request.art_style_prompt.as_deref());
    let icons = icon_prompts(&request.tiles);

    let background = generate_single_image(generator, &bg_prompt, timeout);
    let icon_images = join_all(
        icons
            .iter()
            .map(|(_, prompt)| generate_single_image(generator, prompt, timeout)),
    );
    let (background, icon_images) = tokio::join!(background, icon_images);

    let by_type: Vec<(&str, Option<String>)> = icons
        .iter()
        .map(|(t, _)| t.as_str())
        .zip(icon_images)
        .collect();

    let tiles: Vec<TileImage> = request
        .tiles
        .iter()
        .map(|tile| {
            let tile_type = tile_field(tile, "type").unwrap_or("normal").to_string();
            let image_data = by_type
                .iter()
                .find(|(t, _)| *t == tile_type)
                .and_then(|(_, img)| img.clone());
            TileImage {
                id: tile.get("id").cloned().unwrap_or(Value::Null),
                tile_type,
                image_data,
            }
        })
        .collect();

    let with_images = tiles.iter().filter(|t| t.image_data.is_some()).count();
    info!(
        background = background.is_some(),
        with_images,
        total = tiles.len(),
        "Board images done"
    );

    ImagesResponse {
        status: if background.is_some() {
            ImageStatus::Ok
        } else {
            ImageStatus::Partial
        },
        images: BoardImages { background, tiles },
    }
}

// === Decorations ===

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecorationProfile {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub lifestyle: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecorationRequest {
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub art_style_prompt: String,
    #[serde(default)]
    pub player_profiles: Vec<DecorationProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decoration {
    pub id: usize,
    pub label: &'static str,
    pub image_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecorationsResponse {
    pub status: ImageStatus,
    pub decorations: Vec<Decoration>,
}

/// Four sprite prompts (building, landmark, nature, vehicle) flavoured by player tags.
pub fn decoration_prompts(request: &DecorationRequest) -> [String; 4] {
    let mut seen = HashSet::new();
    let tags: Vec<&str> = request
        .player_profiles
        .iter()
        .flat_map(|p| p.tags.iter().chain(p.lifestyle.iter()))
        .map(|t| t.trim())
        .filter(|t| !t.is_empty() && seen.insert(*t))
        .take(MAX_DECORATION_TAGS)
        .collect();
    let tag_hint = if tags.is_empty() {
        String::new()
    } else {
        format!("プレイヤーの興味: {}", tags.join(", "))
    };

    let style_source = if request.art_style_prompt.trim().is_empty() {
        &request.theme
    } else {
        &request.art_style_prompt
    };
    let style = format!(
        "2.5D isometric game decoration sprite, flat illustration style, white/transparent background, cute and colorful, {}",
        style_source
    );
    let theme = &request.theme;

    [
        format!("{}. A small cozy building or house inspired by: {}. {}. No text.", style, theme, tag_hint),
        format!("{}. A landmark or monument inspired by: {}. {}. No text.", style, theme, tag_hint),
        format!("{}. Nature element (tree, fountain, or garden) inspired by: {}. {}. No text.", style, theme, tag_hint),
        format!("{}. A vehicle or transport inspired by: {}. {}. No text.", style, theme, tag_hint),
    ]
}

/// Endpoint logic for `POST /api/generate/decorations`. Callers check `theme` first.
pub async fn generate_decorations(
    generator: &dyn ImageGenerator,
    request: &DecorationRequest,
    timeout: Duration,
) -> DecorationsResponse {
    info!(theme = %request.theme, "Generating decorations");

    let prompts = decoration_prompts(request);
    let results = join_all(
        prompts
            .iter()
            .map(|prompt| generate_single_image(generator, prompt, timeout)),
    )
    .await;

    let decorations: Vec<Decoration> = results
        .into_iter()
        .zip(DECORATION_LABELS)
        .enumerate()
        .map(|(id, (image_data, label))| Decoration {
            id,
            label,
            image_data,
        })
        .collect();

    let generated = decorations.iter().filter(|d| d.image_data.is_some()).count();
    info!(generated, total = decorations.len(), "Decorations done");

    DecorationsResponse {
        status: if generated > 0 {
            ImageStatus::Ok
        } else {
            ImageStatus::Partial
        },
        decorations,
    }
}
