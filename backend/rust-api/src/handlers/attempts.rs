use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::ApiError,
    extractors::{AppJson, OptionalClaims},
    models::{Player, StartAttemptRequest, SubmitAnswerRequest},
    services::AppState,
};

/// POST /api/v1/attempts
pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    OptionalClaims(claims): OptionalClaims,
    AppJson(req): AppJson<StartAttemptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.as_ref().map(|c| c.sub.as_str());
    tracing::info!(
        "Starting attempt: difficulty={}, user={:?}",
        req.difficulty,
        user_id
    );

    let user = claims
        .as_ref()
        .map(|c| Player::user(c.sub.as_str(), c.name.as_deref()));
    let (difficulty, player) = req.into_parts(user)?;
    let snapshot = state.quiz.start(difficulty, player).await?;

    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/v1/attempts/{id}
pub async fn get_attempt(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.quiz.snapshot(&attempt_id).await?;
    Ok(Json(snapshot))
}

/// GET /api/v1/attempts/{id}/question
pub async fn current_question(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let question = state.quiz.current_question(&attempt_id).await?;
    Ok(Json(question))
}

/// POST /api/v1/attempts/{id}/answers
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
    AppJson(req): AppJson<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.quiz.submit_answer(&attempt_id, req).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/attempts/{id}/tick
pub async fn tick(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.quiz.tick(&attempt_id).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/attempts/{id}/abandon
pub async fn abandon_attempt(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.quiz.abandon(&attempt_id).await?;
    Ok(Json(snapshot))
}

/// POST /api/v1/attempts/{id}/leaderboard
pub async fn submit_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let submission = state.quiz.resubmit_leaderboard(&attempt_id).await?;
    Ok(Json(json!({
        "attempt_id": attempt_id,
        "leaderboard": submission
    })))
}
