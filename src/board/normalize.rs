use serde_json::{Map, Value};

use crate::board::template::create_template_board;
use crate::board::tile::*;

/// Result of a strict schema check on an already-built board payload.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardValidation {
    Valid(BoardSpec),
    Invalid(String),
}

impl BoardValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, BoardValidation::Valid(_))
    }

    pub fn into_board(self) -> Option<BoardSpec> {
        match self {
            BoardValidation::Valid(board) => Some(board),
            BoardValidation::Invalid(_) => None,
        }
    }
}

/// Repair an untrusted candidate into a board that satisfies every invariant.
///
/// The output shape (tile count, ids, goal position) comes from the template
/// board for `requested_tile_count`; candidate content is kept field by field
/// wherever it validates. `None` stands for an absent candidate.
pub fn normalize_board(candidate: Option<&Value>, requested_tile_count: i64) -> BoardSpec {
    normalize_against(candidate, &create_template_board(requested_tile_count))
}

/// Same as [`normalize_board`] with an explicit fallback board, used when the
/// fallback comes from a non-default template language.
pub fn normalize_against(candidate: Option<&Value>, fallback: &BoardSpec) -> BoardSpec {
    let Some(object) = candidate.and_then(Value::as_object) else {
        return fallback.clone();
    };

    let world_candidate = object.get("world").and_then(Value::as_object);
    let world = World {
        theme: safe_string(world_candidate, "theme", THEME_MAX_CHARS, &fallback.world.theme),
        tone: safe_string(world_candidate, "tone", TONE_MAX_CHARS, &fallback.world.tone),
        art_style_prompt: safe_string(
            world_candidate,
            "artStylePrompt",
            ART_STYLE_MAX_CHARS,
            &fallback.world.art_style_prompt,
        ),
    };

    let candidate_tiles = object.get("tiles").and_then(Value::as_array);
    let last = fallback.last_index();

    let tiles = fallback
        .tiles
        .iter()
        .enumerate()
        .map(|(i, base)| {
            let source = candidate_tiles
                .and_then(|tiles| tiles.get(i))
                .and_then(Value::as_object);
            normalize_tile(source, base, i == last)
        })
        .collect();

    BoardSpec { world, tiles }
}

fn normalize_tile(source: Option<&Map<String, Value>>, base: &BoardTile, is_last: bool) -> BoardTile {
    let tile_type = if is_last {
        TileType::Goal
    } else {
        source
            .and_then(|s| s.get("type"))
            .and_then(Value::as_str)
            .and_then(TileType::from_name)
            // only the final tile may be a goal
            .filter(|t| *t != TileType::Goal)
            .unwrap_or(base.tile_type)
    };

    let effect = if is_last {
        Effect::NEUTRAL
    } else {
        normalize_effect(source.and_then(|s| s.get("effect")), base.effect)
    };

    BoardTile {
        id: base.id,
        title: safe_string(source, "title", TITLE_MAX_CHARS, &base.title),
        tile_type,
        event_seed: safe_string(source, "eventSeed", EVENT_SEED_MAX_CHARS, &base.event_seed),
        effect,
        icon_prompt: safe_string(source, "iconPrompt", ICON_PROMPT_MAX_CHARS, &base.icon_prompt),
    }
}

fn normalize_effect(candidate: Option<&Value>, fallback: Effect) -> Effect {
    let Some(effect) = candidate.and_then(Value::as_object) else {
        return fallback;
    };
    let effect_type = effect
        .get("type")
        .and_then(Value::as_str)
        .and_then(EffectType::from_name)
        .unwrap_or(fallback.effect_type);
    let value = effect
        .get("value")
        .and_then(finite_integer)
        .unwrap_or(fallback.value);
    Effect { effect_type, value }
}

/// Finite JSON numbers only; fractional values truncate toward zero.
fn finite_integer(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as i64)
}

fn safe_string(
    source: Option<&Map<String, Value>>,
    key: &str,
    max_chars: usize,
    fallback: &str,
) -> String {
    source
        .and_then(|s| s.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| truncate_chars(s, max_chars))
        .unwrap_or_else(|| fallback.to_string())
}

/// Strict check: the payload must already be a well-formed board.
pub fn validate_board(value: &Value) -> BoardValidation {
    let board: BoardSpec = match serde_json::from_value(value.clone()) {
        Ok(b) => b,
        Err(e) => return BoardValidation::Invalid(format!("not a board: {}", e)),
    };

    let count = board.tiles.len();
    if !(MIN_TILES..=MAX_TILES).contains(&count) {
        return BoardValidation::Invalid(format!(
            "tile count must be {}-{}, got {}",
            MIN_TILES, MAX_TILES, count
        ));
    }

    let world_limits = [
        ("world.theme", &board.world.theme, THEME_MAX_CHARS),
        ("world.tone", &board.world.tone, TONE_MAX_CHARS),
        ("world.artStylePrompt", &board.world.art_style_prompt, ART_STYLE_MAX_CHARS),
    ];
    for (name, text, max) in world_limits {
        if let Err(reason) = check_text(name, text, max) {
            return BoardValidation::Invalid(reason);
        }
    }

    for (i, tile) in board.tiles.iter().enumerate() {
        if tile.id as usize != i + 1 {
            return BoardValidation::Invalid(format!(
                "tile at index {} has id {} (expected {})",
                i,
                tile.id,
                i + 1
            ));
        }
        let is_last = i == count - 1;
        if tile.is_goal() != is_last {
            return BoardValidation::Invalid(format!(
                "tile {} goal placement is wrong: only the last tile may be a goal",
                tile.id
            ));
        }
        if is_last && tile.effect != Effect::NEUTRAL {
            return BoardValidation::Invalid("goal tile must have a neutral effect".to_string());
        }
        let limits = [
            ("title", &tile.title, TITLE_MAX_CHARS),
            ("eventSeed", &tile.event_seed, EVENT_SEED_MAX_CHARS),
            ("iconPrompt", &tile.icon_prompt, ICON_PROMPT_MAX_CHARS),
        ];
        for (name, text, max) in limits {
            if let Err(reason) = check_text(&format!("tile {} {}", tile.id, name), text, max) {
                return BoardValidation::Invalid(reason);
            }
        }
    }

    BoardValidation::Valid(board)
}

fn check_text(name: &str, text: &str, max: usize) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err(format!("{} is empty", name));
    }
    let len = text.chars().count();
    if len > max {
        return Err(format!("{} is {} chars (max {})", name, len, max));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::template::create_template_board;
    use serde_json::json;

    fn assert_invariants(board: &BoardSpec, expected_len: usize) {
        assert_eq!(board.tiles.len(), expected_len);
        for (i, tile) in board.tiles.iter().enumerate() {
            assert_eq!(tile.id as usize, i + 1);
            assert_eq!(tile.is_goal(), i == expected_len - 1);
        }
        assert_eq!(board.tiles[expected_len - 1].effect, Effect::NEUTRAL);
    }

    fn ai_tile(id: u32, tile_type: &str) -> Value {
        json!({
            "id": id,
            "title": format!("Tile {}", id),
            "type": tile_type,
            "eventSeed": format!("Seed {}", id),
            "effect": { "type": "score", "value": id },
            "iconPrompt": format!("Icon {}", id)
        })
    }

    #[test]
    fn absent_and_null_yield_template() {
        for n in [0, 8, 10, 22, 30] {
            assert_eq!(normalize_board(None, n), create_template_board(n));
            assert_eq!(normalize_board(Some(&Value::Null), n), create_template_board(n));
        }
    }

    #[test]
    fn non_object_candidates_yield_template() {
        for candidate in [json!([1, 2, 3]), json!("board"), json!(42), json!(true)] {
            assert_eq!(normalize_board(Some(&candidate), 10), create_template_board(10));
        }
    }

    #[test]
    fn invalid_fields_fall_back_individually() {
        let candidate = json!({
            "tiles": [{
                "title": "x".repeat(100),
                "type": "not-a-type",
                "effect": { "type": "bogus", "value": "NaN" }
            }]
        });
        let board = normalize_board(Some(&candidate), 10);
        let template = create_template_board(10);

        assert_invariants(&board, 10);
        assert_eq!(board.tiles[0].title, "x".repeat(15));
        assert_eq!(board.tiles[0].tile_type, template.tiles[0].tile_type);
        assert_eq!(board.tiles[0].effect, template.tiles[0].effect);
        assert_eq!(board.tiles[0].event_seed, template.tiles[0].event_seed);
        assert_eq!(board.tiles[9].tile_type, TileType::Goal);
        assert_eq!(board.world, template.world);
    }

    #[test]
    fn effect_subfields_validate_independently() {
        let candidate = json!({
            "tiles": [
                { "effect": { "type": "retreat", "value": "three" } },
                { "effect": { "type": "Advance", "value": 4 } },
                { "effect": { "type": "score", "value": 2.9 } },
                { "effect": "advance" }
            ]
        });
        let board = normalize_board(Some(&candidate), 8);
        let template = create_template_board(8);

        assert_eq!(board.tiles[0].effect, Effect::new(EffectType::Retreat, template.tiles[0].effect.value));
        assert_eq!(board.tiles[1].effect, Effect::new(template.tiles[1].effect.effect_type, 4));
        assert_eq!(board.tiles[2].effect, Effect::new(EffectType::Score, 2));
        assert_eq!(board.tiles[3].effect, template.tiles[3].effect);
    }

    #[test]
    fn invariants_hold_for_any_candidate_tile_count() {
        for supplied in [0usize, 3, 10, 30] {
            let tiles: Vec<Value> = (1..=supplied as u32).map(|id| ai_tile(id, "bonus")).collect();
            let candidate = json!({ "world": {}, "tiles": tiles });
            for requested in [1, 10, 22, 50] {
                let board = normalize_board(Some(&candidate), requested);
                assert_invariants(&board, clamp_tile_count(requested));
            }
        }
    }

    #[test]
    fn candidate_goal_before_last_is_rejected() {
        let tiles: Vec<Value> = (1..=10).map(|id| ai_tile(id, "goal")).collect();
        let board = normalize_board(Some(&json!({ "tiles": tiles })), 10);
        let template = create_template_board(10);
        assert_invariants(&board, 10);
        assert_eq!(board.tiles[3].tile_type, template.tiles[3].tile_type);
        assert_eq!(board.tiles[3].title, "Tile 4");
    }

    #[test]
    fn valid_candidate_content_is_preserved() {
        let tiles: Vec<Value> = (1..=10).map(|id| ai_tile(id, "event")).collect();
        let candidate = json!({
            "world": { "theme": "  Night Market  ", "tone": "cozy", "artStylePrompt": "lanterns" },
            "tiles": tiles
        });
        let board = normalize_board(Some(&candidate), 10);
        assert_eq!(board.world.theme, "Night Market");
        assert_eq!(board.world.tone, "cozy");
        assert_eq!(board.tiles[4].title, "Tile 5");
        assert_eq!(board.tiles[4].tile_type, TileType::Event);
        assert_eq!(board.tiles[4].effect, Effect::new(EffectType::Score, 5));
        // the last tile keeps AI text but loses its effect
        assert_eq!(board.tiles[9].title, "Tile 10");
        assert_eq!(board.tiles[9].effect, Effect::NEUTRAL);
    }

    #[test]
    fn blank_and_oversized_world_strings() {
        let candidate = json!({
            "world": { "theme": "   ", "tone": "t".repeat(50), "artStylePrompt": 7 }
        });
        let board = normalize_board(Some(&candidate), 8);
        let template = create_template_board(8);
        assert_eq!(board.world.theme, template.world.theme);
        assert_eq!(board.world.tone.chars().count(), TONE_MAX_CHARS);
        assert_eq!(board.world.art_style_prompt, template.world.art_style_prompt);
    }

    #[test]
    fn normalized_output_always_validates() {
        let candidates = [
            json!({}),
            json!({ "tiles": "nope" }),
            json!({ "tiles": [null, 3, { "title": "" }] }),
            json!({ "world": { "theme": "a".repeat(500) }, "tiles": [{ "iconPrompt": "b".repeat(500) }] }),
        ];
        for candidate in &candidates {
            let board = normalize_board(Some(candidate), 12);
            let value = serde_json::to_value(&board).unwrap();
            assert!(validate_board(&value).is_valid(), "{}", candidate);
        }
    }

    #[test]
    fn validate_rejects_malformed_boards() {
        let mut value = serde_json::to_value(create_template_board(10)).unwrap();
        value["tiles"][2]["id"] = json!(7);
        assert!(matches!(validate_board(&value), BoardValidation::Invalid(r) if r.contains("id 7")));

        let mut value = serde_json::to_value(create_template_board(10)).unwrap();
        value["tiles"][9]["type"] = json!("normal");
        assert!(!validate_board(&value).is_valid());

        let short = json!({ "world": { "theme": "a", "tone": "b", "artStylePrompt": "c" }, "tiles": [] });
        assert!(matches!(validate_board(&short), BoardValidation::Invalid(r) if r.contains("tile count")));

        assert!(!validate_board(&json!({ "tiles": [] })).is_valid());
    }

    #[test]
    fn english_fallback_fills_missing_fields() {
        let fallback = crate::board::template::create_template_board_for(8, crate::board::Language::En);
        let board = normalize_against(Some(&json!({ "tiles": [{ "title": "Hi" }] })), &fallback);
        assert_eq!(board.tiles[0].title, "Hi");
        assert_eq!(board.tiles[1].title, fallback.tiles[1].title);
        assert_eq!(board.world, fallback.world);
    }

    #[test]
    fn validate_accepts_template() {
        let value = serde_json::to_value(create_template_board(22)).unwrap();
        let validation = validate_board(&value);
        assert_eq!(validation.into_board(), Some(create_template_board(22)));
    }
}
