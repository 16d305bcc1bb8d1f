//! How a game session reaches the BFF: over HTTP, or in-process for offline play.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::board::Language;
use crate::director::{self, RebalanceRequest, RebalanceResponse};
use crate::game::session::PlayerProfile;
use crate::generation::{self, BoardRequest, GenerateError, TextGenerator};

/// Raw board endpoint answer: status code plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBoard {
    pub status: u16,
    pub body: Value,
}

#[async_trait]
pub trait BoardSource: Send + Sync {
    async fn fetch_board(
        &self,
        players: &[PlayerProfile],
        session_minutes: u32,
        language: Language,
    ) -> Result<FetchedBoard, GenerateError>;
}

#[async_trait]
pub trait DirectorLink: Send + Sync {
    async fn request_rebalance(
        &self,
        request: RebalanceRequest,
    ) -> Result<RebalanceResponse, GenerateError>;
}

fn board_request_body(players: &[PlayerProfile], session_minutes: u32, language: Language) -> Value {
    json!({
        "players": players,
        "sessionMinutes": session_minutes,
        "language": language,
    })
}

/// HTTP client for a running BFF server.
pub struct BffClient {
    http: reqwest::Client,
    base_url: String,
}

impl BffClient {
    pub fn new(base_url: &str) -> Result<Self, GenerateError> {
        let http = reqwest::Client::builder().build()?;
        Ok(BffClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BoardSource for BffClient {
    async fn fetch_board(
        &self,
        players: &[PlayerProfile],
        session_minutes: u32,
        language: Language,
    ) -> Result<FetchedBoard, GenerateError> {
        let response = self
            .http
            .post(format!("{}/api/generate/board", self.base_url))
            .json(&board_request_body(players, session_minutes, language))
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| GenerateError::Decode(e.to_string()))?;
        Ok(FetchedBoard { status, body })
    }
}

#[async_trait]
impl DirectorLink for BffClient {
    async fn request_rebalance(
        &self,
        request: RebalanceRequest,
    ) -> Result<RebalanceResponse, GenerateError> {
        let response = self
            .http
            .post(format!("{}/api/director/rebalance", self.base_url))
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerateError::Status(status.as_u16(), text));
        }
        response
            .json::<RebalanceResponse>()
            .await
            .map_err(|e| GenerateError::Decode(e.to_string()))
    }
}

/// Runs the BFF logic in-process against a text generator.
pub struct LocalBff {
    generator: Arc<dyn TextGenerator>,
    generation_timeout: Duration,
}

impl LocalBff {
    pub fn new(generator: Arc<dyn TextGenerator>, generation_timeout: Duration) -> Self {
        LocalBff {
            generator,
            generation_timeout,
        }
    }
}

#[async_trait]
impl BoardSource for LocalBff {
    async fn fetch_board(
        &self,
        players: &[PlayerProfile],
        session_minutes: u32,
        language: Language,
    ) -> Result<FetchedBoard, GenerateError> {
        let body = board_request_body(players, session_minutes, language);
        let request = BoardRequest::from_json(&body).map_err(GenerateError::Decode)?;
        let response =
            generation::generate_board(self.generator.as_ref(), &request, self.generation_timeout).await;
        let body = serde_json::to_value(&response.board).map_err(|e| GenerateError::Decode(e.to_string()))?;
        Ok(FetchedBoard {
            status: response.status.http_code(),
            body,
        })
    }
}

#[async_trait]
impl DirectorLink for LocalBff {
    async fn request_rebalance(
        &self,
        request: RebalanceRequest,
    ) -> Result<RebalanceResponse, GenerateError> {
        director::rebalance(self.generator.as_ref(), &request)
            .await
            .map_err(|e| GenerateError::Http(e.to_string()))
    }
}
