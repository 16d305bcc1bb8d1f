use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::board::{create_template_board_for, validate_board, BoardSpec, BoardTile, BoardValidation, EffectType, Language};
use crate::director::{RebalanceRequest, RebalanceSuggestion, RebalanceTrigger};
use crate::game::remote::{BoardSource, DirectorLink};
use crate::game::session::GameSession;
use crate::generation::tile_count_for_session;
use crate::tasks::BackgroundTasks;

/// Client-side abort timeout around the board request (longer than the server's own).
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

pub const DIE_FACES: u32 = 6;

/// Guards an action against duplicate submission while its request is in flight.
#[derive(Debug, Default)]
pub struct SubmitLatch {
    busy: AtomicBool,
}

pub struct LatchGuard<'a> {
    latch: &'a SubmitLatch,
}

impl SubmitLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another submission holds the latch.
    pub fn try_acquire(&self) -> Option<LatchGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LatchGuard { latch: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.latch.busy.store(false, Ordering::Release);
    }
}

/// A board ready to be installed in a session.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardLoad {
    /// Model-authored board (200).
    Generated(BoardSpec),
    /// Server-side template fallback (206).
    Degraded(BoardSpec),
    /// The request failed or returned garbage; local template board.
    Fallback { board: BoardSpec, reason: String },
}

impl BoardLoad {
    pub fn board(&self) -> &BoardSpec {
        match self {
            BoardLoad::Generated(b) | BoardLoad::Degraded(b) => b,
            BoardLoad::Fallback { board, .. } => board,
        }
    }

    pub fn apply(self, session: &mut GameSession) {
        match self {
            BoardLoad::Generated(board) | BoardLoad::Degraded(board) => session.set_board(board),
            BoardLoad::Fallback { board, .. } => session.fallback_to_template(board),
        }
    }
}

/// The "finish registering players" step: one board request at a time, never a dead end.
pub struct BoardLoader {
    source: Arc<dyn BoardSource>,
    client_timeout: Duration,
    language: Language,
    latch: SubmitLatch,
}

impl BoardLoader {
    pub fn new(source: Arc<dyn BoardSource>, client_timeout: Duration, language: Language) -> Self {
        BoardLoader {
            source,
            client_timeout,
            language,
            latch: SubmitLatch::new(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.latch.is_busy()
    }

    /// Request a board for the session's roster.
    ///
    /// Returns `None` if a request is already in flight. There is no retry:
    /// any failure resolves to the local template board.
    pub async fn load(&self, session: &GameSession, session_minutes: u32) -> Option<BoardLoad> {
        let _guard = self.latch.try_acquire()?;
        let players: Vec<_> = session.present_players().cloned().collect();

        let fetched = tokio::time::timeout(
            self.client_timeout,
            self.source.fetch_board(&players, session_minutes, self.language),
        )
        .await;

        let reason = match fetched {
            Ok(Ok(fetched)) if fetched.status == 200 || fetched.status == 206 => {
                match validate_board(&fetched.body) {
                    BoardValidation::Valid(board) if fetched.status == 200 => {
                        return Some(BoardLoad::Generated(board));
                    }
                    BoardValidation::Valid(board) => return Some(BoardLoad::Degraded(board)),
                    BoardValidation::Invalid(reason) => format!("invalid board payload: {}", reason),
                }
            }
            Ok(Ok(fetched)) => format!("board request returned status {}", fetched.status),
            Ok(Err(e)) => e.to_string(),
            Err(_) => "board request timed out".to_string(),
        };

        warn!(%reason, "Falling back to local template board");
        let tile_count = tile_count_for_session(Some(session_minutes as f64));
        Some(BoardLoad::Fallback {
            board: create_template_board_for(tile_count as i64, self.language),
            reason,
        })
    }
}

/// What happened during one player's turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReport {
    pub turn: u32,
    pub player_index: usize,
    pub display_name: String,
    pub roll: u32,
    pub from: usize,
    pub to: usize,
    pub tile: BoardTile,
    /// Points added by a `score` tile; other effects are left to the UI.
    pub score_delta: i64,
    pub reached_goal: bool,
    pub rebalance_requested: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    NoBoard,
    EmptySlot(usize),
}

impl std::fmt::Display for TurnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnError::NoBoard => write!(f, "No board has been set"),
            TurnError::EmptySlot(i) => write!(f, "Player slot {} is empty", i),
        }
    }
}

impl std::error::Error for TurnError {}

/// Drives the per-turn sequence over a [`GameSession`]:
/// roll, move, look up the tile, apply score effects, check the rebalance
/// trigger, then wait for [`TurnDriver::finish_turn`].
pub struct TurnDriver {
    session: GameSession,
    rng: ChaCha8Rng,
    trigger: RebalanceTrigger,
    director: Option<Arc<dyn DirectorLink>>,
    tasks: BackgroundTasks,
    suggestions_tx: mpsc::UnboundedSender<RebalanceSuggestion>,
    suggestions_rx: mpsc::UnboundedReceiver<RebalanceSuggestion>,
}

impl TurnDriver {
    pub fn new(session: GameSession, seed: u64) -> Self {
        let (suggestions_tx, suggestions_rx) = mpsc::unbounded_channel();
        TurnDriver {
            session,
            rng: ChaCha8Rng::seed_from_u64(seed),
            trigger: RebalanceTrigger::new(),
            director: None,
            tasks: BackgroundTasks::new(),
            suggestions_tx,
            suggestions_rx,
        }
    }

    pub fn with_director(mut self, director: Arc<dyn DirectorLink>) -> Self {
        self.director = Some(director);
        self
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut GameSession {
        &mut self.session
    }

    pub fn roll_die(&mut self) -> u32 {
        self.rng.gen_range(1..=DIE_FACES)
    }

    pub fn play_turn(&mut self) -> Result<TurnReport, TurnError> {
        let roll = self.roll_die();
        self.play_turn_with_roll(roll)
    }

    pub fn play_turn_with_roll(&mut self, roll: u32) -> Result<TurnReport, TurnError> {
        if self.session.board().is_none() {
            return Err(TurnError::NoBoard);
        }
        let index = self.session.active_player_index();
        let player = self.session.player(index).ok_or(TurnError::EmptySlot(index))?;
        let from = player.position;
        let display_name = player.display_name.clone();

        let to = self
            .session
            .move_player(index, roll as i64)
            .ok_or(TurnError::EmptySlot(index))?;
        let tile = self.session.tile_at(to).cloned().ok_or(TurnError::NoBoard)?;

        let score_delta = if tile.effect.effect_type == EffectType::Score {
            self.session.add_score(index, tile.effect.value);
            tile.effect.value
        } else {
            0
        };

        let turn = self.session.current_turn();
        let rebalance_requested = self.trigger.check(index, self.session.player_count(), turn);
        if rebalance_requested {
            self.request_rebalance(turn);
        }

        info!(
            session = %self.session.id(),
            turn,
            player = index,
            roll,
            from,
            to,
            tile = %tile.title,
            "Turn played"
        );

        Ok(TurnReport {
            turn,
            player_index: index,
            display_name,
            roll,
            from,
            to,
            reached_goal: tile.is_goal(),
            tile,
            score_delta,
            rebalance_requested,
        })
    }

    /// Acknowledge the landed tile and pass play on.
    pub fn finish_turn(&mut self) {
        self.session.next_turn();
    }

    fn request_rebalance(&mut self, turn: u32) {
        let Some(director) = self.director.clone() else {
            return;
        };
        let scores: Vec<Option<i64>> = self
            .session
            .players()
            .iter()
            .map(|p| p.as_ref().map(|p| p.score))
            .collect();
        let request = RebalanceRequest {
            turn_number: json!(turn),
            current_scores: json!(scores),
            board_state: serde_json::to_value(self.session.board()).unwrap_or_default(),
        };
        let tx = self.suggestions_tx.clone();
        self.tasks.spawn("rebalance", async move {
            let response = director.request_rebalance(request).await?;
            if let Some(suggestion) = response.suggestion() {
                let _ = tx.send(suggestion.clone());
            }
            Ok::<(), crate::generation::GenerateError>(())
        });
    }

    /// Next advisory suggestion that has arrived, if any.
    pub fn take_suggestion(&mut self) -> Option<RebalanceSuggestion> {
        self.suggestions_rx.try_recv().ok()
    }

    /// Wait for outstanding background requests.
    pub async fn wait_for_background(&mut self) -> usize {
        self.tasks.join_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{create_template_board, Effect, TileType};
    use crate::director::{RebalanceAction, RebalanceResponse};
    use crate::game::remote::{FetchedBoard, LocalBff};
    use crate::game::session::ProfileFields;
    use crate::game::session::PlayerProfile;
    use crate::generation::testing::{FakeGenerator, FakeText};
    use crate::generation::GenerateError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    fn session_with(players: usize, tiles: i64) -> GameSession {
        let mut session = GameSession::new();
        for i in 0..players {
            session.set_player_profile(
                i,
                ProfileFields {
                    display_name: format!("P{}", i + 1),
                    ..ProfileFields::default()
                },
            );
        }
        session.set_board(create_template_board(tiles));
        session
    }

    struct CountingDirector {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl DirectorLink for CountingDirector {
        async fn request_rebalance(
            &self,
            request: RebalanceRequest,
        ) -> Result<RebalanceResponse, GenerateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GenerateError::Http("offline".to_string()));
            }
            assert_eq!(request.turn_number, json!(1));
            let suggestion = serde_json::from_value(json!({
                "action": "global_buff",
                "details": { "title": "Tailwind", "description": "All +1", "targetTileId": 2 },
                "isGuaranteeTriggered": true
            }))
            .unwrap();
            Ok(RebalanceResponse::Suggestion(suggestion))
        }
    }

    #[test]
    fn latch_rejects_second_acquire_until_released() {
        let latch = SubmitLatch::new();
        let guard = latch.try_acquire();
        assert!(guard.is_some());
        assert!(latch.try_acquire().is_none());
        drop(guard);
        assert!(latch.try_acquire().is_some());
    }

    #[test]
    fn score_tile_adds_points() {
        let mut driver = TurnDriver::new(session_with(1, 10), 1);
        // template index 4 is a score tile
        let report = driver.play_turn_with_roll(4).unwrap();
        assert_eq!(report.to, 4);
        assert_eq!(report.tile.effect.effect_type, EffectType::Score);
        assert_eq!(report.score_delta, report.tile.effect.value);
        assert_eq!(driver.session().player(0).unwrap().score, report.tile.effect.value);
    }

    #[test]
    fn movement_effects_are_not_applied() {
        let mut driver = TurnDriver::new(session_with(1, 10), 1);
        // template index 1 advances, but only the roll moves the player
        let report = driver.play_turn_with_roll(1).unwrap();
        assert_eq!(report.tile.effect.effect_type, EffectType::Advance);
        assert_eq!(driver.session().player(0).unwrap().position, 1);
        assert_eq!(report.score_delta, 0);
    }

    #[test]
    fn reaching_the_end_lands_on_goal() {
        let mut driver = TurnDriver::new(session_with(1, 8), 1);
        let report = driver.play_turn_with_roll(50).unwrap();
        assert_eq!(report.to, 7);
        assert!(report.reached_goal);
        assert_eq!(report.tile.tile_type, TileType::Goal);
        assert_eq!(report.tile.effect, Effect::NEUTRAL);
    }

    #[test]
    fn errors_without_board_or_player() {
        let mut driver = TurnDriver::new(GameSession::new(), 1);
        assert_eq!(driver.play_turn(), Err(TurnError::NoBoard));

        let mut session = GameSession::new();
        session.set_player_profile(1, ProfileFields::default());
        session.set_board(create_template_board(8));
        let mut driver = TurnDriver::new(session, 1);
        assert_eq!(driver.play_turn(), Err(TurnError::EmptySlot(0)));
        driver.finish_turn();
        assert!(driver.play_turn().is_ok());
    }

    #[test]
    fn seeded_rolls_are_reproducible() {
        let mut a = TurnDriver::new(GameSession::new(), 99);
        let mut b = TurnDriver::new(GameSession::new(), 99);
        for _ in 0..20 {
            let roll = a.roll_die();
            assert!((1..=DIE_FACES).contains(&roll));
            assert_eq!(roll, b.roll_die());
        }
    }

    #[test]
    fn session_id_is_stable_across_turns() {
        let session = session_with(2, 10);
        let id = session.id();
        let mut driver = TurnDriver::new(session, 3);
        for _ in 0..4 {
            driver.play_turn().unwrap();
            driver.finish_turn();
        }
        assert_eq!(driver.session().id(), id);
        assert_ne!(id, GameSession::new().id());
    }

    #[tokio::test]
    async fn rebalance_fires_once_after_first_round() {
        let director = Arc::new(CountingDirector {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let mut driver = TurnDriver::new(session_with(3, 22), 7).with_director(director.clone());

        let mut fired = Vec::new();
        for _ in 0..9 {
            let report = driver.play_turn_with_roll(1).unwrap();
            fired.push(report.rebalance_requested);
            driver.finish_turn();
        }
        assert_eq!(fired, vec![false, false, true, false, false, false, false, false, false]);

        assert_eq!(driver.wait_for_background().await, 1);
        assert_eq!(director.calls.load(Ordering::SeqCst), 1);
        let suggestion = driver.take_suggestion().expect("suggestion delivered");
        assert_eq!(suggestion.action, RebalanceAction::GlobalBuff);
        assert!(driver.take_suggestion().is_none());
        // advisory only
        assert_eq!(driver.session().board().unwrap(), &create_template_board(22));
    }

    #[tokio::test]
    async fn rebalance_failure_does_not_block_turns() {
        let director = Arc::new(CountingDirector {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let mut driver = TurnDriver::new(session_with(1, 10), 7).with_director(director);
        let report = driver.play_turn_with_roll(2).unwrap();
        assert!(report.rebalance_requested);
        driver.finish_turn();
        assert!(driver.play_turn_with_roll(2).is_ok());
        driver.wait_for_background().await;
        assert!(driver.take_suggestion().is_none());
    }

    struct StaticSource {
        status: u16,
        body: serde_json::Value,
        delay: Duration,
    }

    #[async_trait]
    impl BoardSource for StaticSource {
        async fn fetch_board(
            &self,
            _players: &[PlayerProfile],
            _session_minutes: u32,
            _language: Language,
        ) -> Result<FetchedBoard, GenerateError> {
            tokio::time::sleep(self.delay).await;
            Ok(FetchedBoard {
                status: self.status,
                body: self.body.clone(),
            })
        }
    }

    fn source(status: u16, body: serde_json::Value, delay_ms: u64) -> Arc<dyn BoardSource> {
        Arc::new(StaticSource {
            status,
            body,
            delay: Duration::from_millis(delay_ms),
        })
    }

    #[tokio::test]
    async fn loader_accepts_generated_and_degraded_boards() {
        let board = create_template_board(10);
        let body = serde_json::to_value(&board).unwrap();
        let session = session_with(2, 10);

        let loader = BoardLoader::new(source(200, body.clone(), 0), DEFAULT_CLIENT_TIMEOUT, Language::Ja);
        assert_eq!(loader.load(&session, 10).await, Some(BoardLoad::Generated(board.clone())));

        let loader = BoardLoader::new(source(206, body, 0), DEFAULT_CLIENT_TIMEOUT, Language::Ja);
        assert_eq!(loader.load(&session, 10).await, Some(BoardLoad::Degraded(board)));
    }

    #[tokio::test]
    async fn loader_falls_back_on_bad_payload_status_or_timeout() {
        let session = session_with(2, 10);
        let cases = [
            source(200, json!({ "world": {}, "tiles": [] }), 0),
            source(500, json!({ "error": "boom" }), 0),
            source(200, serde_json::to_value(create_template_board(10)).unwrap(), 500),
        ];
        for src in cases {
            let loader = BoardLoader::new(src, Duration::from_millis(50), Language::En);
            match loader.load(&session, 10).await {
                Some(BoardLoad::Fallback { board, .. }) => {
                    assert_eq!(board, create_template_board_for(10, Language::En));
                }
                other => panic!("expected fallback, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn loader_rejects_duplicate_submission() {
        let session = session_with(2, 10);
        let body = serde_json::to_value(create_template_board(10)).unwrap();
        let loader = BoardLoader::new(source(200, body, 100), DEFAULT_CLIENT_TIMEOUT, Language::Ja);

        let (first, second) = tokio::join!(loader.load(&session, 10), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            loader.load(&session, 10).await
        });
        assert!(matches!(first, Some(BoardLoad::Generated(_))));
        assert_eq!(second, None);
        assert!(!loader.is_loading());
    }

    #[tokio::test]
    async fn loaded_board_is_installed_in_session() {
        let local = Arc::new(LocalBff::new(
            Arc::new(FakeGenerator::new(FakeText::Hang)),
            Duration::from_millis(20),
        ));
        let loader = BoardLoader::new(local, DEFAULT_CLIENT_TIMEOUT, Language::Ja);
        let mut session = session_with(2, 8);
        let load = loader.load(&session, 10).await.unwrap();
        assert!(matches!(load, BoardLoad::Degraded(_)));
        load.apply(&mut session);
        assert_eq!(session.board().unwrap().tile_count(), 10);
    }
}
