use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;
use validator::ValidationErrors;

/// Errors raised by the quiz core and surfaced to the UI layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuizError {
    #[error("unknown difficulty '{0}', expected beginner, intermediate or expert")]
    InvalidDifficulty(String),

    #[error("invalid nickname: {0}")]
    InvalidNickname(String),

    #[error("operation not allowed: {0}")]
    InvalidState(String),

    #[error("choice {choice} is out of range for a question with {available} choices")]
    InvalidChoice { choice: usize, available: usize },

    #[error("no more questions in this attempt")]
    NoMoreQuestions,

    #[error("question bank unavailable: {0}")]
    QuestionBankUnavailable(String),

    #[error("leaderboard write failed: {0}")]
    LeaderboardWriteFailed(String),

    #[error("attempt {0} not found")]
    AttemptNotFound(String),

    #[error("attempt {0} has no question timer")]
    TimerNotActive(String),
}

impl QuizError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            QuizError::InvalidDifficulty(_) | QuizError::InvalidNickname(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            QuizError::InvalidChoice { .. } => StatusCode::BAD_REQUEST,
            QuizError::InvalidState(_)
            | QuizError::NoMoreQuestions
            | QuizError::TimerNotActive(_) => StatusCode::CONFLICT,
            QuizError::AttemptNotFound(_) => StatusCode::NOT_FOUND,
            QuizError::QuestionBankUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            QuizError::LeaderboardWriteFailed(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable machine-readable code for the UI.
    pub fn code(&self) -> &'static str {
        match self {
            QuizError::InvalidDifficulty(_) => "invalid_difficulty",
            QuizError::InvalidNickname(_) => "invalid_nickname",
            QuizError::InvalidState(_) => "invalid_state",
            QuizError::InvalidChoice { .. } => "invalid_choice",
            QuizError::NoMoreQuestions => "no_more_questions",
            QuizError::QuestionBankUnavailable(_) => "question_bank_unavailable",
            QuizError::LeaderboardWriteFailed(_) => "leaderboard_write_failed",
            QuizError::AttemptNotFound(_) => "attempt_not_found",
            QuizError::TimerNotActive(_) => "timer_not_active",
        }
    }

    fn field(&self) -> Option<&'static str> {
        match self {
            QuizError::InvalidDifficulty(_) => Some("difficulty"),
            QuizError::InvalidNickname(_) => Some("nickname"),
            QuizError::InvalidChoice { .. } => Some("choice"),
            _ => None,
        }
    }
}

impl IntoResponse for QuizError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();
        let mut body = json!({
            "error": self.code(),
            "message": message,
            "status": status.as_u16(),
        });
        if let Some(field) = self.field() {
            let mut fields = Map::new();
            fields.insert(field.to_string(), json!([message.clone()]));
            body["fields"] = Value::Object(fields);
        }
        (status, Json(body)).into_response()
    }
}

/// Handler-level error combining domain failures with request and plumbing errors.
#[derive(Debug)]
pub enum ApiError {
    Quiz(QuizError),
    Validation(ValidationErrors),
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }
}

impl From<QuizError> for ApiError {
    fn from(err: QuizError) -> Self {
        ApiError::Quiz(err)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(err: ValidationErrors) -> Self {
        ApiError::Validation(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, fields) = match self {
            ApiError::Quiz(err) => return err.into_response(),
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation failed".to_string(),
                Some(validation_fields(&errors)),
            ),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, None),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message, None),
            ApiError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let mut body = json!({
            "message": message,
            "status": status.as_u16(),
        });
        if let Some(fields) = fields {
            body["fields"] = Value::Object(fields);
        }
        (status, Json(body)).into_response()
    }
}

fn validation_fields(errors: &ValidationErrors) -> Map<String, Value> {
    let mut fields = Map::new();
    for (field, field_errors) in errors.field_errors() {
        let messages: Vec<String> = field_errors
            .iter()
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string())
            })
            .collect();
        fields.insert(field.to_string(), json!(messages));
    }
    fields
}
