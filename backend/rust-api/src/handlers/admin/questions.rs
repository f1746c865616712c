use axum::{
    extract::{Extension, Path, State},
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::ApiError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::{Question, QuestionUpdate},
    services::{question_bank::UpdateOutcome, AppState},
};

/// PATCH /admin/questions/{id}
///
/// Running attempts keep the question sequence they started with; an edit only
/// affects attempts started afterwards.
pub async fn update_question(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(question_id): Path<String>,
    AppJson(update): AppJson<QuestionUpdate>,
) -> Result<Json<Question>, ApiError> {
    update.validate()?;
    if update.is_empty() {
        return Err(ApiError::bad_request("Update must name at least one field"));
    }

    tracing::info!(
        "Admin {} updating question {}: {:?}",
        claims.sub,
        question_id,
        update.fields()
    );

    match state.questions.update_question(&question_id, &update).await? {
        UpdateOutcome::Updated(question) => Ok(Json(question)),
        UpdateOutcome::NotFound => Err(ApiError::not_found(format!(
            "Question {} not found",
            question_id
        ))),
        UpdateOutcome::Rejected(reason) => Err(ApiError::bad_request(reason)),
    }
}
