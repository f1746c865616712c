use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::QuizError;

pub mod attempt;
pub mod leaderboard;
pub mod question;
pub mod timer;

pub use attempt::{
    AnswerOutcome, AttemptSnapshot, QuizAttempt, QuizRules, StartAttemptRequest,
    SubmitAnswerRequest, TickOutcome,
};
pub use leaderboard::{LeaderboardEntry, LeaderboardQuery, LeaderboardSubmission, SubmissionState};
pub use question::{Question, QuestionField, QuestionRecord, QuestionUpdate, QuestionView};
pub use timer::{TimerEvent, TimerState};

/// Longest guest nickname accepted, counted in characters after trimming.
pub const MAX_NICKNAME_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Expert,
}

impl Difficulty {
    pub fn all() -> [Difficulty; 3] {
        [
            Difficulty::Beginner,
            Difficulty::Intermediate,
            Difficulty::Expert,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Expert => "expert",
        }
    }

    /// Only expert attempts run a per-question countdown.
    pub fn is_timed(&self) -> bool {
        matches!(self, Difficulty::Expert)
    }
}

impl FromStr for Difficulty {
    type Err = QuizError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "expert" => Ok(Difficulty::Expert),
            _ => Err(QuizError::InvalidDifficulty(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
    Abandoned,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::NotStarted => "not_started",
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Failed => "failed",
            AttemptStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptStatus::Completed | AttemptStatus::Failed | AttemptStatus::Abandoned
        )
    }

    /// Completed and failed attempts are ranked; abandoned ones never are.
    pub fn is_ranked(&self) -> bool {
        matches!(self, AttemptStatus::Completed | AttemptStatus::Failed)
    }

    pub fn can_transition_to(&self, next: AttemptStatus) -> bool {
        matches!(
            (self, next),
            (AttemptStatus::NotStarted, AttemptStatus::InProgress)
                | (AttemptStatus::NotStarted, AttemptStatus::Abandoned)
                | (AttemptStatus::InProgress, AttemptStatus::Completed)
                | (AttemptStatus::InProgress, AttemptStatus::Failed)
                | (AttemptStatus::InProgress, AttemptStatus::Abandoned)
        )
    }
}

/// Who is playing: an authenticated account or a guest identified by nickname.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Player {
    User {
        user_id: String,
        display_name: String,
    },
    Guest {
        nickname: String,
    },
}

impl Player {
    /// An account player. The public name comes from the token's `name` claim
    /// and falls back to a masked form of the account id.
    pub fn user(user_id: impl Into<String>, name: Option<&str>) -> Self {
        let user_id = user_id.into();
        let display_name = name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| name.chars().take(MAX_NICKNAME_CHARS).collect())
            .unwrap_or_else(|| masked_user_id(&user_id));
        Player::User {
            user_id,
            display_name,
        }
    }

    pub fn guest(nickname: &str) -> Result<Self, QuizError> {
        let trimmed = nickname.trim();
        if trimmed.is_empty() {
            return Err(QuizError::InvalidNickname(
                "nickname must not be empty".to_string(),
            ));
        }
        if trimmed.chars().count() > MAX_NICKNAME_CHARS {
            return Err(QuizError::InvalidNickname(format!(
                "nickname must be at most {} characters",
                MAX_NICKNAME_CHARS
            )));
        }
        Ok(Player::Guest {
            nickname: trimmed.to_string(),
        })
    }

    pub fn display_name(&self) -> &str {
        match self {
            Player::User { display_name, .. } => display_name,
            Player::Guest { nickname } => nickname,
        }
    }
}

fn masked_user_id(user_id: &str) -> String {
    let chars: Vec<char> = user_id.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("player-{}", tail)
}
