//! JSON HTTP adapter over [`CareService`].
//!
//! A UI (web page, chat widget) drives registration, login, chat and the
//! score pages through these endpoints. The adapter is thin: every handler
//! is one service call plus error mapping.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (status, version, index availability) |
//! | `POST`   | `/auth/register` | Register a user |
//! | `POST`   | `/auth/login` | Check credentials, return the profile |
//! | `GET`    | `/users/{username}/history` | Chat history |
//! | `DELETE` | `/users/{username}/history` | Clear chat history |
//! | `POST`   | `/users/{username}/messages` | Send a message, get the reply |
//! | `GET`    | `/users/{username}/scores` | Score records |
//! | `GET`    | `/users/{username}/summary` | Score statistics |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "conflict", "message": "username 'alice' already exists" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `conflict` (409), `model_error` (502), `internal` (500).
//!
//! There are no session tokens. Callers holding a username act for it, the
//! same trust model as the single-user UI this backs.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::agent::ToolInvocation;
use crate::auth::AuthError;
use crate::config::Config;
use crate::models::{ChatMessage, ScoreLabel, ScoreRecord, UserProfile};
use crate::scores::{HealthSummary, ScoreFilter};
use crate::service::{CareService, ServiceError};

#[derive(Clone)]
struct AppState {
    service: Arc<CareService>,
}

/// Open the service from `config` and serve on `[server].bind` until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(CareService::open(config).await?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, index = service.index_available(), "mindcare server listening");
    println!("mindcare server listening on http://{}", config.server.bind);
    axum::serve(listener, router(service)).await?;
    Ok(())
}

pub fn router(service: Arc<CareService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/auth/register", post(handle_register))
        .route("/auth/login", post(handle_login))
        .route(
            "/users/{username}/history",
            get(handle_history).delete(handle_clear_history),
        )
        .route("/users/{username}/messages", post(handle_send_message))
        .route("/users/{username}/scores", get(handle_scores))
        .route("/users/{username}/summary", get(handle_summary))
        .layer(cors)
        .with_state(AppState { service })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Invalid(_) | ServiceError::Auth(AuthError::MissingField(_)) => {
                bad_request(message)
            }
            ServiceError::InvalidCredentials => {
                AppError::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
            }
            ServiceError::UnknownUser(_) => AppError::new(StatusCode::NOT_FOUND, "not_found", message),
            ServiceError::Auth(AuthError::UsernameTaken(_)) => {
                AppError::new(StatusCode::CONFLICT, "conflict", message)
            }
            ServiceError::Model(_) => AppError::new(StatusCode::BAD_GATEWAY, "model_error", message),
            ServiceError::Auth(AuthError::Store(_)) | ServiceError::Internal(_) => {
                error!(error = %message, "request failed");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    index_available: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        index_available: state.service.index_available(),
    })
}

// ============ /auth ============

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    password: String,
    #[serde(flatten)]
    profile: UserProfile,
}

async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    state
        .service
        .register(&req.username, &req.password, req.profile)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "username": req.username })),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    username: String,
    profile: UserProfile,
}

async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let session = state.service.login(&req.username, &req.password)?;
    Ok(Json(LoginResponse {
        username: session.username,
        profile: session.profile,
    }))
}

// ============ /users/{username}/history ============

#[derive(Serialize)]
struct HistoryResponse {
    messages: Vec<ChatMessage>,
}

async fn handle_history(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        messages: state.service.get_history(&username),
    })
}

async fn handle_clear_history(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let removed = state.service.clear_history(&username)?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

// ============ POST /users/{username}/messages ============

#[derive(Deserialize)]
struct SendMessageRequest {
    content: String,
}

#[derive(Serialize)]
struct SendMessageResponse {
    reply: String,
    tool_calls: Vec<ToolInvocation>,
}

async fn handle_send_message(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, AppError> {
    let session = state.service.session_for(&username)?;
    let reply = state.service.send_message(&session, &req.content).await?;
    Ok(Json(SendMessageResponse {
        reply: reply.content,
        tool_calls: reply.tool_calls,
    }))
}

// ============ /users/{username}/scores ============

/// `?since=2024-05-01&until=2024-05-31&labels=tốt,kém`
#[derive(Deserialize, Default)]
struct ScoreQuery {
    since: Option<String>,
    until: Option<String>,
    labels: Option<String>,
}

impl ScoreQuery {
    fn to_filter(&self) -> Result<ScoreFilter, AppError> {
        let date = |s: &Option<String>, name: &str| -> Result<Option<NaiveDate>, AppError> {
            s.as_deref()
                .map(|v| {
                    NaiveDate::parse_from_str(v, "%Y-%m-%d")
                        .map_err(|_| bad_request(format!("{} must be YYYY-MM-DD, got '{}'", name, v)))
                })
                .transpose()
        };
        let mut labels = Vec::new();
        if let Some(raw) = &self.labels {
            for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
                let label = ScoreLabel::parse(part)
                    .ok_or_else(|| bad_request(format!("unknown score label '{}'", part.trim())))?;
                labels.push(label);
            }
        }
        Ok(ScoreFilter {
            since: date(&self.since, "since")?,
            until: date(&self.until, "until")?,
            labels,
        })
    }
}

#[derive(Serialize)]
struct ScoresResponse {
    records: Vec<ScoreRecord>,
}

async fn handle_scores(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<ScoreQuery>,
) -> Result<Json<ScoresResponse>, AppError> {
    let filter = query.to_filter()?;
    Ok(Json(ScoresResponse {
        records: state.service.list_scores_filtered(&username, &filter),
    }))
}

async fn handle_summary(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Json<HealthSummary> {
    Json(state.service.health_summary(&username))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_query_parses_dates_and_labels() {
        let q = ScoreQuery {
            since: Some("2024-05-01".to_string()),
            until: None,
            labels: Some("Tốt, kém".to_string()),
        };
        let f = q.to_filter().ok().unwrap();
        assert_eq!(f.since, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(f.labels, vec![ScoreLabel::Good, ScoreLabel::Poor]);
    }

    #[test]
    fn score_query_rejects_bad_input() {
        let bad_date = ScoreQuery {
            since: Some("05/01/2024".to_string()),
            ..Default::default()
        };
        assert!(bad_date.to_filter().is_err());
        let bad_label = ScoreQuery {
            labels: Some("great".to_string()),
            ..Default::default()
        };
        assert!(bad_label.to_filter().is_err());
    }

    #[test]
    fn service_errors_map_to_codes() {
        let conflict: AppError = ServiceError::Auth(AuthError::UsernameTaken("a".into())).into();
        assert_eq!(conflict.status, StatusCode::CONFLICT);
        let model: AppError = ServiceError::Model(crate::llm::LlmError::Disabled).into();
        assert_eq!(model.code, "model_error");
        let unauthorized: AppError = ServiceError::InvalidCredentials.into();
        assert_eq!(unauthorized.status, StatusCode::UNAUTHORIZED);
    }
}
