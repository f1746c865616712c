use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::ApiError,
    models::{Difficulty, LeaderboardQuery},
    services::AppState,
};

/// GET /api/v1/leaderboard?difficulty=&limit=
pub async fn top_entries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<impl IntoResponse, ApiError> {
    query.validate()?;

    let difficulty = query
        .difficulty
        .as_deref()
        .map(str::parse::<Difficulty>)
        .transpose()?;
    let limit = query.limit();

    let entries = state.quiz.top_entries(difficulty, limit).await?;
    Ok(Json(json!({
        "difficulty": difficulty,
        "limit": limit,
        "entries": entries
    })))
}
