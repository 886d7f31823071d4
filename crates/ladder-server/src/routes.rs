use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use ladder_core::{PlayerId, Requirement};

use crate::error::LadderError;
use crate::matchmaker::{EnqueueOutcome, GraphSnapshot, RunOutcome};
use crate::model::{
    EnqueueSource, LeaderboardRow, Match, MatchId, NewQueue, Player, Queue, ReportedOutcome,
};
use crate::state::AppState;

/// A [`LadderError`] on its way to an HTTP client.
pub struct ApiError(LadderError);

impl From<LadderError> for ApiError {
    fn from(e: LadderError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LadderError::QueueNotFound { .. }
            | LadderError::PlayerNotFound { .. }
            | LadderError::MatchNotFound { .. } => StatusCode::NOT_FOUND,
            LadderError::NameTaken { .. } | LadderError::MatchAlreadyDecided { .. } => {
                StatusCode::CONFLICT
            }
            LadderError::QueueExpired { .. } | LadderError::NotAParticipant { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            LadderError::Config { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else if !self.0.is_client_error() {
            tracing::warn!(error = %self.0, "request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── Health ──────────────────────────────────────────────────────────────

pub async fn health() -> &'static str {
    "ok"
}

// ── Players and queues ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NewPlayer {
    pub name: String,
}

pub async fn create_player(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewPlayer>,
) -> Result<(StatusCode, Json<Player>), ApiError> {
    let player = state.matchmaker.store().create_player(req.name.trim()).await?;
    Ok((StatusCode::CREATED, Json(player)))
}

pub async fn create_queue(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewQueue>,
) -> Result<(StatusCode, Json<Queue>), ApiError> {
    let queue = state.matchmaker.store().create_queue(&req).await?;
    Ok((StatusCode::CREATED, Json(queue)))
}

// ── Queue membership ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PlayerRequest {
    pub player_id: PlayerId,
}

pub async fn enqueue(
    State(state): State<Arc<AppState>>,
    Path(queue): Path<String>,
    Json(req): Json<PlayerRequest>,
) -> ApiResult<EnqueueOutcome> {
    let outcome = state
        .matchmaker
        .enqueue(req.player_id, &queue, EnqueueSource::Manual)
        .await?;
    Ok(Json(outcome))
}

pub async fn toggle_autoqueue(
    State(state): State<Arc<AppState>>,
    Path(queue): Path<String>,
    Json(req): Json<PlayerRequest>,
) -> ApiResult<serde_json::Value> {
    let enabled = state
        .matchmaker
        .toggle_autoqueue(req.player_id, &queue)
        .await?;
    Ok(Json(json!({ "enabled": enabled })))
}

pub async fn matchmake(
    State(state): State<Arc<AppState>>,
    Path(queue): Path<String>,
) -> Json<RunOutcome> {
    Json(state.matchmaker.run_matchmaking(&queue).await)
}

pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Path(queue): Path<String>,
) -> ApiResult<Vec<LeaderboardRow>> {
    Ok(Json(state.matchmaker.standings(&queue).await?))
}

// ── Results ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ResultRequest {
    pub outcome: ReportedOutcome,
}

pub async fn report_result(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<MatchId>,
    Json(req): Json<ResultRequest>,
) -> ApiResult<Match> {
    Ok(Json(
        state.matchmaker.report_result(match_id, req.outcome).await?,
    ))
}

// ── Admin ───────────────────────────────────────────────────────────────

pub async fn clear_locks(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let cleared = state.matchmaker.clear_locks();
    Json(json!({ "cleared": cleared }))
}

pub async fn last_matchmake(State(state): State<Arc<AppState>>) -> Json<Option<GraphSnapshot>> {
    Json(state.matchmaker.last_graph())
}

#[derive(Debug, Deserialize)]
pub struct RequirementsRequest {
    pub requirements: Vec<Requirement>,
}

pub async fn set_requirements(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RequirementsRequest>,
) -> ApiResult<Vec<Requirement>> {
    if req.requirements.is_empty() {
        return Err(LadderError::config("at least one requirement is needed").into());
    }
    let config = state.matchmaker.set_requirements(req.requirements);
    if let Some(path) = &state.config_path {
        config.save(path)?;
    }
    Ok(Json(config.matchmaking_requirements))
}
