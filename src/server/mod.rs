pub mod protocol;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, FromRequest, Request, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::board::BoardSpec;
use crate::director::{self, RebalanceRequest, RebalanceResponse};
use crate::generation::{self, BoardRequest, BoardStatus, ImageGenerator, TextGenerator};
use crate::images::{self, DecorationRequest, DecorationsResponse, ImagesRequest, ImagesResponse, DEFAULT_IMAGE_TIMEOUT};
use crate::profile::{self, ProfileError, ProfileRequest, ProfileResponse};
use protocol::{ApiError, HealthData, HealthStatus};

pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Upper bound on reading and answering one request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared server state accessible from all handlers.
pub struct ServerState {
    pub text: Arc<dyn TextGenerator>,
    pub images: Arc<dyn ImageGenerator>,
    pub generation_timeout: Duration,
    pub image_timeout: Duration,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
    /// Board counters reported by `/health`.
    pub health: RwLock<HealthData>,
}

impl ServerState {
    pub fn new(text: Arc<dyn TextGenerator>, images: Arc<dyn ImageGenerator>) -> Self {
        ServerState {
            text,
            images,
            generation_timeout: generation::DEFAULT_GENERATION_TIMEOUT,
            image_timeout: DEFAULT_IMAGE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            health: RwLock::new(HealthData::default()),
        }
    }
}

/// All routes plus CORS, body limit, request timeout and tracing.
pub fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/api/generate/board", post(generate_board))
        .route("/api/director/rebalance", post(rebalance))
        .route("/api/generate/profile", post(generate_profile))
        .route("/api/generate/images", post(generate_images))
        .route("/api/generate/decorations", post(generate_decorations))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(TimeoutLayer::new(state.request_timeout))
        .layer(cors)
        .layer(middleware::from_fn(preflight_no_content))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the listener fails.
pub async fn start_server(
    state: Arc<ServerState>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Server listening on http://{}", addr);
    serve(listener, state).await
}

/// Serve on an already bound listener.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Every `OPTIONS` request is answered `204 No Content`, keeping the CORS headers.
async fn preflight_no_content(request: Request, next: Next) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }
    let (mut parts, _) = next.run(request).await.into_parts();
    parts.status = StatusCode::NO_CONTENT;
    parts.headers.remove(header::CONTENT_TYPE);
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::empty())
}

async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, format!("Cannot {} {}", method, uri.path()))
}

/// A JSON request body. An empty body reads as `{}`.
pub struct JsonBody(pub Value);

#[async_trait]
impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(request, state)
            .await
            .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonBody(Value::Object(Default::default())));
        }
        serde_json::from_slice(&bytes)
            .map(JsonBody)
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))
    }
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::bad_request(format!("Invalid request: {}", e)))
}

fn board_status_code(status: BoardStatus) -> StatusCode {
    match status {
        BoardStatus::Generated => StatusCode::OK,
        BoardStatus::Fallback => StatusCode::PARTIAL_CONTENT,
    }
}

async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthStatus> {
    Json(state.health.read().await.status())
}

async fn generate_board(
    State(state): State<Arc<ServerState>>,
    JsonBody(body): JsonBody,
) -> Result<(StatusCode, Json<BoardSpec>), ApiError> {
    let request = BoardRequest::from_json(&body).map_err(ApiError::bad_request)?;

    let generator = Arc::clone(&state.text);
    let timeout = state.generation_timeout;
    let task = tokio::spawn(async move { generation::generate_board(generator.as_ref(), &request, timeout).await });
    let response = match task.await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Board handler failed, serving emergency board");
            generation::emergency_board()
        }
    };

    state
        .health
        .write()
        .await
        .record_board(response.status == BoardStatus::Fallback);
    Ok((board_status_code(response.status), Json(response.board)))
}

async fn rebalance(
    State(state): State<Arc<ServerState>>,
    JsonBody(body): JsonBody,
) -> Result<Json<RebalanceResponse>, ApiError> {
    let request: RebalanceRequest = decode(body)?;
    director::rebalance(state.text.as_ref(), &request)
        .await
        .map(Json)
        .map_err(|e| {
            error!(error = %e, "Rebalance failed");
            ApiError::internal("Failed to generate rebalance")
        })
}

async fn generate_profile(
    State(state): State<Arc<ServerState>>,
    JsonBody(body): JsonBody,
) -> Result<Json<ProfileResponse>, ApiError> {
    let request: ProfileRequest = decode(body)?;
    match profile::generate_profile(state.text.as_ref(), &request).await {
        Ok(response) => Ok(Json(response)),
        Err(ProfileError::MissingTranscript) => {
            Err(ApiError::bad_request(ProfileError::MissingTranscript.to_string()))
        }
        Err(e) => {
            error!(error = %e, "Profile generation failed");
            Err(ApiError::internal("Failed to generate profile"))
        }
    }
}

async fn generate_images(
    State(state): State<Arc<ServerState>>,
    JsonBody(body): JsonBody,
) -> Result<Json<ImagesResponse>, ApiError> {
    let request = ImagesRequest::from_json(&body).map_err(ApiError::bad_request)?;
    Ok(Json(
        images::generate_board_images(state.images.as_ref(), &request, state.image_timeout).await,
    ))
}

async fn generate_decorations(
    State(state): State<Arc<ServerState>>,
    JsonBody(body): JsonBody,
) -> Result<Json<DecorationsResponse>, ApiError> {
    let request: DecorationRequest = decode(body)?;
    if request.theme.trim().is_empty() {
        return Err(ApiError::bad_request("theme is required"));
    }
    Ok(Json(
        images::generate_decorations(state.images.as_ref(), &request, state.image_timeout).await,
    ))
}
