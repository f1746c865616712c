use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{AttemptStatus, Difficulty, Player};

/// Read-only result of a finished attempt, as ranked on the leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub attempt_id: Uuid,
    pub player: Player,
    pub display_name: String,
    pub difficulty: Difficulty,
    pub score: u32,
    pub status: AttemptStatus,
    pub questions_answered: usize,
    pub lives_remaining: u32,
    pub finished_at: DateTime<Utc>,
}

/// Per-attempt gate flag.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    #[default]
    NotSubmitted,
    Recorded,
    WriteFailed,
}

/// Outcome of one pass through the submission gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardSubmission {
    Recorded,
    AlreadyRecorded,
    WriteFailed,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LeaderboardQuery {
    pub difficulty: Option<String>,

    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<usize>,
}

impl LeaderboardQuery {
    pub const DEFAULT_LIMIT: usize = 10;

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }
}

/// Orders entries best-first: higher score, then the earlier finisher.
pub fn rank_entries(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.finished_at.cmp(&b.finished_at))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(score: u32, finished_at: DateTime<Utc>) -> LeaderboardEntry {
        LeaderboardEntry {
            attempt_id: Uuid::new_v4(),
            player: Player::Guest {
                nickname: "Ava".into(),
            },
            display_name: "Ava".into(),
            difficulty: Difficulty::Beginner,
            score,
            status: AttemptStatus::Completed,
            questions_answered: 40,
            lives_remaining: 7,
            finished_at,
        }
    }

    #[test]
    fn test_rank_orders_by_score_then_time() {
        let now = Utc::now();
        let mut entries = vec![
            entry(300, now),
            entry(900, now + Duration::seconds(5)),
            entry(900, now),
        ];
        rank_entries(&mut entries);
        assert_eq!(entries[0].score, 900);
        assert_eq!(entries[0].finished_at, now);
        assert_eq!(entries[2].score, 300);
    }

    #[test]
    fn test_query_limit_defaults_and_bounds() {
        let query = LeaderboardQuery {
            difficulty: None,
            limit: None,
        };
        assert_eq!(query.limit(), 10);

        let too_many = LeaderboardQuery {
            difficulty: None,
            limit: Some(500),
        };
        assert!(too_many.validate().is_err());
    }
}
