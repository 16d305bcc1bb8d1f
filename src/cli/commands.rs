use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::board::{create_template_board_for, Language};
use crate::config::server::ServerConfig;
use crate::director::RebalanceSuggestion;
use crate::game::{
    BffClient, BoardLoad, BoardLoader, BoardSource, DirectorLink, GameSession, LocalBff, ProfileFields, TurnDriver,
    TurnReport,
};
use crate::game::turn::DEFAULT_CLIENT_TIMEOUT;
use crate::generation::client::GeminiClient;
use crate::generation::{ImageGenerator, TextGenerator};
use crate::server::{self, ServerState};

/// Run the BFF until ctrl-c.
pub async fn run_server(config: &ServerConfig) -> Result<(), String> {
    let client = GeminiClient::from_env(config.gemini_settings())
        .map_err(|e| format!("Failed to build AI client: {}", e))?;
    if !client.has_api_key() {
        warn!(
            env = %config.api_key_env,
            "No API key set, every request will be served from templates"
        );
    }
    let client = Arc::new(client);
    let text: Arc<dyn TextGenerator> = client.clone();
    let images: Arc<dyn ImageGenerator> = client;

    let mut state = ServerState::new(text, images);
    state.generation_timeout = config.generation_timeout();
    state.image_timeout = config.image_timeout();
    state.request_timeout = config.request_timeout();
    state.max_body_bytes = config.max_body_bytes;
    let state = Arc::new(state);

    let addr = config.socket_addr()?;

    tokio::select! {
        result = server::start_server(state, addr) => {
            result.map_err(|e| format!("Server error: {}", e))
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    }
}

/// Pretty-printed template board JSON.
pub fn template_json(tile_count: i64, language: Language) -> Result<String, String> {
    let board = create_template_board_for(tile_count, language);
    serde_json::to_string_pretty(&board).map_err(|e| format!("Cannot serialize board: {}", e))
}

#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub players: usize,
    pub session_minutes: u32,
    pub seed: u64,
    pub rounds: u32,
    pub language: Language,
    /// Use the API key from the environment instead of playing fully offline.
    pub online: bool,
    /// Play against a running BFF at this base URL instead of in-process.
    pub server: Option<String>,
}

/// Outcome of a simulated game.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub board_source: &'static str,
    pub tile_count: usize,
    pub turns: Vec<TurnReport>,
    pub winner: Option<usize>,
    pub final_scores: Vec<Option<i64>>,
    pub suggestion: Option<RebalanceSuggestion>,
}

/// Play a game against `bff`: register players, load a board, then take turns
/// until someone reaches the goal or `rounds` full rounds have been played.
pub async fn play_game<B>(bff: Arc<B>, options: &SimulateOptions) -> Result<GameSummary, String>
where
    B: BoardSource + DirectorLink + 'static,
{
    if options.players == 0 {
        return Err("players must be > 0".to_string());
    }

    let mut session = GameSession::new();
    for index in 0..options.players {
        session.set_player_profile(
            index,
            ProfileFields {
                display_name: format!("Player {}", index + 1),
                ..ProfileFields::default()
            },
        );
    }

    let loader = BoardLoader::new(bff.clone(), DEFAULT_CLIENT_TIMEOUT, options.language);
    let load = loader
        .load(&session, options.session_minutes)
        .await
        .ok_or_else(|| "A board request is already in flight".to_string())?;
    let board_source = match &load {
        BoardLoad::Generated(_) => "generated",
        BoardLoad::Degraded(_) => "server-template",
        BoardLoad::Fallback { .. } => "local-template",
    };
    let tile_count = load.board().tile_count();
    load.apply(&mut session);
    info!(session = %session.id(), board_source, tile_count, "Board ready");

    let mut driver = TurnDriver::new(session, options.seed).with_director(bff);
    let mut turns = Vec::new();
    let mut winner = None;
    let max_turns = options.rounds as usize * options.players;

    for _ in 0..max_turns {
        let report = driver.play_turn().map_err(|e| e.to_string())?;
        let reached_goal = report.reached_goal;
        let player_index = report.player_index;
        turns.push(report);
        if reached_goal {
            winner = Some(player_index);
            break;
        }
        driver.finish_turn();
    }

    driver.wait_for_background().await;
    let suggestion = driver.take_suggestion();
    let final_scores = driver
        .session()
        .players()
        .iter()
        .map(|p| p.as_ref().map(|p| p.score))
        .collect();

    Ok(GameSummary {
        board_source,
        tile_count,
        turns,
        winner,
        final_scores,
        suggestion,
    })
}

/// Play a game, in-process or against `options.server`, and print the turn reports.
pub async fn simulate(config: &ServerConfig, options: &SimulateOptions) -> Result<(), String> {
    let summary = match &options.server {
        Some(url) => {
            let client = BffClient::new(url).map_err(|e| format!("Failed to build BFF client: {}", e))?;
            info!(%url, "Playing against remote BFF");
            play_game(Arc::new(client), options).await?
        }
        None => {
            let client = if options.online {
                GeminiClient::from_env(config.gemini_settings())
            } else {
                GeminiClient::new(config.gemini_settings(), None)
            }
            .map_err(|e| format!("Failed to build AI client: {}", e))?;

            let generator: Arc<dyn TextGenerator> = Arc::new(client);
            play_game(Arc::new(LocalBff::new(generator, config.generation_timeout())), options).await?
        }
    };

    println!("Board: {} ({} tiles)", summary.board_source, summary.tile_count);
    for turn in &summary.turns {
        println!(
            "Turn {:>2} | {:<10} rolled {} : {:>2} -> {:>2} [{}] {}{}",
            turn.turn,
            turn.display_name,
            turn.roll,
            turn.from + 1,
            turn.to + 1,
            turn.tile.tile_type.as_str(),
            turn.tile.title,
            if turn.score_delta != 0 {
                format!(" ({:+})", turn.score_delta)
            } else {
                String::new()
            }
        );
    }
    match summary.winner {
        Some(index) => println!("\nPlayer {} reached the goal!", index + 1),
        None => println!("\nNo one reached the goal after {} round(s)", options.rounds),
    }
    let scores: Vec<String> = summary
        .final_scores
        .iter()
        .map(|s| s.map_or("-".to_string(), |s| s.to_string()))
        .collect();
    println!("Scores: {}", scores.join(", "));
    if let Some(suggestion) = &summary.suggestion {
        println!(
            "Director suggests: {} ({})",
            suggestion.details.title, suggestion.details.description
        );
    }
    Ok(())
}
