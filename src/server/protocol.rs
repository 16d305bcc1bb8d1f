use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub const HEALTH_MESSAGE: &str = "Sugoroku BFF is running!";

/// Health endpoint response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub message: &'static str,
    pub board_requests: u64,
    pub fallback_boards: u64,
}

/// Counters updated by the board route.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HealthData {
    pub board_requests: u64,
    pub fallback_boards: u64,
}

impl HealthData {
    pub fn record_board(&mut self, fallback: bool) {
        self.board_requests += 1;
        if fallback {
            self.fallback_boards += 1;
        }
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            status: "ok",
            message: HEALTH_MESSAGE,
            board_requests: self.board_requests,
            fallback_boards: self.fallback_boards,
        }
    }
}

/// `{ "error": ... }` body used by every failing route.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        ErrorBody {
            error: message.into(),
        }
    }
}

/// A failed request: status plus an [`ErrorBody`].
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody::new(self.message))).into_response()
    }
}
