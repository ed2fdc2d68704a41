//! HTTP surface: auth endpoints, image upload, static uploads, WebSocket.
//!
//! Everything except `/ws` is plain request/response JSON. Internal errors
//! never leak details to clients; the full error goes to the log.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, WebSocketUpgrade},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::assets::UploadError;
use crate::auth::AuthError;
use crate::relay::{self, RelayState};
use crate::store::MessageStore;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let status = match &self {
            Self::Auth(AuthError::MissingCredentials) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Auth(AuthError::UserExists) => StatusCode::CONFLICT,
            Self::Auth(
                AuthError::InvalidCredentials
                | AuthError::TokenExpired
                | AuthError::InvalidToken(_),
            ) => StatusCode::UNAUTHORIZED,
            Self::Auth(AuthError::Internal(_)) | Self::Upload(UploadError::Io(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Upload(UploadError::Empty) => StatusCode::BAD_REQUEST,
            Self::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        };
        let body = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %message, "internal error on http endpoint");
            "internal server error".to_string()
        } else {
            message
        };
        (status, Json(json!({ "error": body }))).into_response()
    }
}

#[derive(Deserialize)]
struct CredentialsRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    username: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    username: String,
}

#[derive(Serialize)]
struct UploadResponse {
    image_url: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Builds the full relay router over shared state.
pub fn router<S: MessageStore + 'static>(state: Arc<RelayState<S>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let uploads_dir = state.assets.dir().to_path_buf();
    // Slack over the upload cap so the multipart framing itself fits.
    let body_limit = state.assets.max_size().saturating_add(64 * 1024);

    Router::new()
        .route("/health", get(health))
        .route("/register", post(register::<S>))
        .route("/login", post(login::<S>))
        .route("/upload", post(upload::<S>))
        .route("/ws", get(ws_handler::<S>))
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn register<S: MessageStore>(
    State(state): State<Arc<RelayState<S>>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.users.register(&req.username, &req.password)?;
    tracing::info!(username = %req.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            username: req.username,
        }),
    ))
}

async fn login<S: MessageStore>(
    State(state): State<Arc<RelayState<S>>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if !state.users.verify(&req.username, &req.password)? {
        return Err(AuthError::InvalidCredentials.into());
    }
    let token = state.tokens.issue(&req.username)?;
    tracing::info!(username = %req.username, "user logged in");
    Ok(Json(LoginResponse {
        token,
        username: req.username,
    }))
}

async fn upload<S: MessageStore>(
    State(state): State<Arc<RelayState<S>>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name().unwrap_or("") != "image" {
            continue;
        }
        let original_name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;

        let image_url = state.assets.store(&original_name, &data).await?;
        tracing::info!(name = %original_name, size = data.len(), url = %image_url, "image uploaded");
        return Ok(Json(UploadResponse { image_url }));
    }
    Err(ApiError::BadRequest(
        "missing 'image' field in multipart form".to_string(),
    ))
}

async fn ws_handler<S: MessageStore + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<RelayState<S>>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay::handle_socket(socket, state))
}
