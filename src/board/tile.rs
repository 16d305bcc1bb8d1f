use serde::{Deserialize, Serialize};

// === Limits ===

pub const MIN_TILES: usize = 8;
pub const MAX_TILES: usize = 24;

pub const TITLE_MAX_CHARS: usize = 15;
pub const EVENT_SEED_MAX_CHARS: usize = 40;
pub const ICON_PROMPT_MAX_CHARS: usize = 80;
pub const THEME_MAX_CHARS: usize = 36;
pub const TONE_MAX_CHARS: usize = 30;
pub const ART_STYLE_MAX_CHARS: usize = 200;

/// Clamp a requested tile count into the playable board range.
pub fn clamp_tile_count(requested: i64) -> usize {
    requested.clamp(MIN_TILES as i64, MAX_TILES as i64) as usize
}

// === Enums ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileType {
    Normal,
    Bonus,
    Penalty,
    Event,
    Rescue,
    Goal,
}

impl TileType {
    pub const ALL: [TileType; 6] = [
        TileType::Normal,
        TileType::Bonus,
        TileType::Penalty,
        TileType::Event,
        TileType::Rescue,
        TileType::Goal,
    ];

    /// Exact-match lookup; `"Bonus"` is not a tile type.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TileType::Normal => "normal",
            TileType::Bonus => "bonus",
            TileType::Penalty => "penalty",
            TileType::Event => "event",
            TileType::Rescue => "rescue",
            TileType::Goal => "goal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectType {
    Advance,
    Retreat,
    Score,
    Swap,
    Choice,
    None,
}

impl EffectType {
    pub const ALL: [EffectType; 6] = [
        EffectType::Advance,
        EffectType::Retreat,
        EffectType::Score,
        EffectType::Swap,
        EffectType::Choice,
        EffectType::None,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EffectType::Advance => "advance",
            EffectType::Retreat => "retreat",
            EffectType::Score => "score",
            EffectType::Swap => "swap",
            EffectType::Choice => "choice",
            EffectType::None => "none",
        }
    }
}

// === Board structs ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effect {
    #[serde(rename = "type")]
    pub effect_type: EffectType,
    pub value: i64,
}

impl Effect {
    pub const NEUTRAL: Effect = Effect {
        effect_type: EffectType::None,
        value: 0,
    };

    pub fn new(effect_type: EffectType, value: i64) -> Self {
        Effect { effect_type, value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardTile {
    pub id: u32,
    pub title: String,
    #[serde(rename = "type")]
    pub tile_type: TileType,
    pub event_seed: String,
    pub effect: Effect,
    pub icon_prompt: String,
}

impl BoardTile {
    pub fn is_goal(&self) -> bool {
        self.tile_type == TileType::Goal
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct World {
    pub theme: String,
    pub tone: String,
    pub art_style_prompt: String,
}

/// A complete playable board: world flavour text plus the ordered tile track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSpec {
    pub world: World,
    pub tiles: Vec<BoardTile>,
}

impl BoardSpec {
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Tile at a zero-based track position.
    pub fn tile_at(&self, position: usize) -> Option<&BoardTile> {
        self.tiles.get(position)
    }

    pub fn last_index(&self) -> usize {
        self.tiles.len().saturating_sub(1)
    }
}

/// Truncate to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_tile_count_bounds() {
        assert_eq!(clamp_tile_count(-3), 8);
        assert_eq!(clamp_tile_count(0), 8);
        assert_eq!(clamp_tile_count(10), 10);
        assert_eq!(clamp_tile_count(24), 24);
        assert_eq!(clamp_tile_count(1000), 24);
    }

    #[test]
    fn tile_type_lookup_is_case_sensitive() {
        assert_eq!(TileType::from_name("rescue"), Some(TileType::Rescue));
        assert_eq!(TileType::from_name("Rescue"), None);
        assert_eq!(TileType::from_name(""), None);
        assert_eq!(EffectType::from_name("score"), Some(EffectType::Score));
        assert_eq!(EffectType::from_name("SCORE"), None);
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_chars("ハッカソン緊急リカバリー", 5), "ハッカソン");
        assert_eq!(truncate_chars("short", 15), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn tile_serializes_with_camel_case_wire_names() {
        let tile = BoardTile {
            id: 1,
            title: "Start".to_string(),
            tile_type: TileType::Bonus,
            event_seed: "seed".to_string(),
            effect: Effect::new(EffectType::Advance, 2),
            icon_prompt: "icon".to_string(),
        };
        let json = serde_json::to_value(&tile).unwrap();
        assert_eq!(json["type"], "bonus");
        assert_eq!(json["eventSeed"], "seed");
        assert_eq!(json["iconPrompt"], "icon");
        assert_eq!(json["effect"]["type"], "advance");
        assert_eq!(json["effect"]["value"], 2);
    }
}
