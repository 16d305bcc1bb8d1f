use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::board::{BoardSpec, BoardTile};

/// Profile fields extracted from a player's introduction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileFields {
    pub display_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub lifestyle: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    pub display_name: String,
    pub tags: Vec<String>,
    pub lifestyle: Vec<String>,
    pub attributes: Vec<String>,
    pub position: usize,
    pub score: i64,
}

impl PlayerProfile {
    fn from_fields(fields: ProfileFields) -> Self {
        PlayerProfile {
            display_name: fields.display_name,
            tags: fields.tags,
            lifestyle: fields.lifestyle,
            attributes: fields.attributes,
            position: 0,
            score: 0,
        }
    }
}

/// One party-game session: roster, board, and turn bookkeeping.
///
/// The roster is slot-indexed and may contain gaps when profiles are set out
/// of order; gaps are `None` and every per-player operation treats them as
/// absent players.
#[derive(Debug, Clone)]
pub struct GameSession {
    id: Uuid,
    players: Vec<Option<PlayerProfile>>,
    board: Option<BoardSpec>,
    current_turn: u32,
    active_player_index: usize,
    raw_transcripts: BTreeMap<usize, String>,
    background_image: Option<String>,
    decoration_images: Vec<String>,
    tile_images: BTreeMap<String, String>,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new()
    }
}

impl GameSession {
    pub fn new() -> Self {
        GameSession {
            id: Uuid::new_v4(),
            players: Vec::new(),
            board: None,
            current_turn: 1,
            active_player_index: 0,
            raw_transcripts: BTreeMap::new(),
            background_image: None,
            decoration_images: Vec::new(),
            tile_images: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    // === Roster ===

    /// Insert or overwrite a player slot; position and score start at zero.
    pub fn set_player_profile(&mut self, index: usize, fields: ProfileFields) {
        if index >= self.players.len() {
            self.players.resize(index + 1, None);
        }
        self.players[index] = Some(PlayerProfile::from_fields(fields));
    }

    pub fn players(&self) -> &[Option<PlayerProfile>] {
        &self.players
    }

    /// Number of roster slots, including gaps.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, index: usize) -> Option<&PlayerProfile> {
        self.players.get(index).and_then(Option::as_ref)
    }

    /// Profiles of every filled slot, in slot order.
    pub fn present_players(&self) -> impl Iterator<Item = &PlayerProfile> {
        self.players.iter().flatten()
    }

    pub fn add_raw_transcript(&mut self, index: usize, text: &str) {
        self.raw_transcripts.insert(index, text.to_string());
    }

    pub fn raw_transcript(&self, index: usize) -> Option<&str> {
        self.raw_transcripts.get(&index).map(String::as_str)
    }

    // === Board ===

    pub fn set_board(&mut self, board: BoardSpec) {
        let max = board.last_index();
        for player in self.players.iter_mut().flatten() {
            player.position = player.position.min(max);
        }
        self.board = Some(board);
    }

    /// Install a pre-built template board (same effect as [`GameSession::set_board`]).
    pub fn fallback_to_template(&mut self, board: BoardSpec) {
        self.set_board(board);
    }

    pub fn board(&self) -> Option<&BoardSpec> {
        self.board.as_ref()
    }

    pub fn tile_at(&self, position: usize) -> Option<&BoardTile> {
        self.board.as_ref()?.tile_at(position)
    }

    // === Movement and score ===

    /// Move a player by `steps` (negative to retreat), clamped to the track.
    ///
    /// Returns the new position, or `None` when the slot is empty.
    pub fn move_player(&mut self, index: usize, steps: i64) -> Option<usize> {
        let max = self.board.as_ref().map_or(0, BoardSpec::last_index) as i64;
        let player = self.players.get_mut(index)?.as_mut()?;
        let target = (player.position as i64).saturating_add(steps).clamp(0, max);
        player.position = target as usize;
        Some(player.position)
    }

    /// Add points to a player's score. Returns the new score, or `None` for an empty slot.
    pub fn add_score(&mut self, index: usize, points: i64) -> Option<i64> {
        let player = self.players.get_mut(index)?.as_mut()?;
        player.score = player.score.saturating_add(points);
        Some(player.score)
    }

    // === Turn order ===

    pub fn current_turn(&self) -> u32 {
        self.current_turn
    }

    pub fn active_player_index(&self) -> usize {
        self.active_player_index
    }

    pub fn active_player(&self) -> Option<&PlayerProfile> {
        self.player(self.active_player_index)
    }

    /// Pass play to the next slot; wrapping to slot 0 starts a new round.
    pub fn next_turn(&mut self) {
        let next = self.active_player_index + 1;
        if next >= self.players.len() {
            self.active_player_index = 0;
            self.current_turn += 1;
        } else {
            self.active_player_index = next;
        }
    }

    // === Art ===

    pub fn set_background_image(&mut self, image: String) {
        self.background_image = Some(image);
    }

    pub fn background_image(&self) -> Option<&str> {
        self.background_image.as_deref()
    }

    pub fn set_decoration_images(&mut self, images: Vec<String>) {
        self.decoration_images = images;
    }

    pub fn decoration_images(&self) -> &[String] {
        &self.decoration_images
    }

    /// Tile images keyed by tile type name.
    pub fn set_tile_images(&mut self, images: BTreeMap<String, String>) {
        self.tile_images = images;
    }

    pub fn tile_images(&self) -> &BTreeMap<String, String> {
        &self.tile_images
    }

    /// Clear everything back to a fresh session (the id is kept).
    pub fn reset_game(&mut self) {
        let id = self.id;
        *self = GameSession { id, ..GameSession::new() };
    }
}
