use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::QuizError;
use crate::metrics::{track_db_operation, LEADERBOARD_WRITES_TOTAL};
use crate::models::leaderboard::rank_entries;
use crate::models::{
    AttemptStatus, Difficulty, LeaderboardEntry, LeaderboardSubmission, Player, QuizAttempt,
    SubmissionState,
};
use crate::utils::retry::{retry_async_with_config, RetryConfig};
use crate::utils::time::{bson_to_chrono, chrono_to_bson};

const LEADERBOARD_COLLECTION: &str = "leaderboard";
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    Duplicate,
}

/// Append-only leaderboard persistence keyed by attempt id.
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    async fn record_entry(&self, entry: &LeaderboardEntry) -> Result<RecordOutcome>;

    async fn find_by_attempt(&self, attempt_id: Uuid) -> Result<Option<LeaderboardEntry>>;

    async fn top_entries(
        &self,
        difficulty: Option<Difficulty>,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>>;

    async fn ping(&self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct LeaderboardDocument {
    #[serde(rename = "_id")]
    id: String,
    player: Player,
    display_name: String,
    difficulty: Difficulty,
    score: i64,
    status: AttemptStatus,
    questions_answered: i64,
    lives_remaining: i64,
    finished_at: BsonDateTime,
}

impl From<&LeaderboardEntry> for LeaderboardDocument {
    fn from(entry: &LeaderboardEntry) -> Self {
        Self {
            id: entry.attempt_id.to_string(),
            player: entry.player.clone(),
            display_name: entry.display_name.clone(),
            difficulty: entry.difficulty,
            score: i64::from(entry.score),
            status: entry.status,
            questions_answered: entry.questions_answered as i64,
            lives_remaining: i64::from(entry.lives_remaining),
            finished_at: chrono_to_bson(entry.finished_at),
        }
    }
}

impl TryFrom<LeaderboardDocument> for LeaderboardEntry {
    type Error = anyhow::Error;

    fn try_from(document: LeaderboardDocument) -> Result<Self> {
        Ok(Self {
            attempt_id: Uuid::parse_str(&document.id)
                .with_context(|| format!("Invalid attempt id {}", document.id))?,
            player: document.player,
            display_name: document.display_name,
            difficulty: document.difficulty,
            score: u32::try_from(document.score).context("Invalid stored score")?,
            status: document.status,
            questions_answered: usize::try_from(document.questions_answered)
                .context("Invalid stored question count")?,
            lives_remaining: u32::try_from(document.lives_remaining)
                .context("Invalid stored lives")?,
            finished_at: bson_to_chrono(document.finished_at),
        })
    }
}

pub struct MongoLeaderboardStore {
    mongo: Database,
}

impl MongoLeaderboardStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn collection(&self) -> Collection<LeaderboardDocument> {
        self.mongo.collection(LEADERBOARD_COLLECTION)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we))
            if we.code == DUPLICATE_KEY_CODE
    )
}

#[async_trait]
impl LeaderboardStore for MongoLeaderboardStore {
    async fn record_entry(&self, entry: &LeaderboardEntry) -> Result<RecordOutcome> {
        let collection = self.collection();
        let document = LeaderboardDocument::from(entry);

        track_db_operation("insert_one", LEADERBOARD_COLLECTION, async {
            match collection.insert_one(&document).await {
                Ok(_) => Ok(RecordOutcome::Inserted),
                Err(e) if is_duplicate_key(&e) => Ok(RecordOutcome::Duplicate),
                Err(e) => Err(anyhow!(e).context("Failed to insert leaderboard entry")),
            }
        })
        .await
    }

    async fn find_by_attempt(&self, attempt_id: Uuid) -> Result<Option<LeaderboardEntry>> {
        let document = self
            .collection()
            .find_one(doc! { "_id": attempt_id.to_string() })
            .await
            .context("Failed to look up leaderboard entry")?;
        document.map(LeaderboardEntry::try_from).transpose()
    }

    async fn top_entries(
        &self,
        difficulty: Option<Difficulty>,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>> {
        let collection = self.collection();
        let mut filter = Document::new();
        if let Some(difficulty) = difficulty {
            filter.insert("difficulty", difficulty.as_str());
        }

        track_db_operation("find", LEADERBOARD_COLLECTION, async {
            let mut cursor = collection
                .find(filter)
                .sort(doc! { "score": -1, "finished_at": 1 })
                .limit(limit as i64)
                .await
                .context("Failed to query leaderboard")?;

            let mut entries = Vec::new();
            while let Some(document) = cursor
                .try_next()
                .await
                .context("Failed to iterate leaderboard")?
            {
                entries.push(LeaderboardEntry::try_from(document)?);
            }
            Ok::<_, anyhow::Error>(entries)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }
}

/// In-process leaderboard. `fail_next_writes` simulates an unavailable store.
#[derive(Default)]
pub struct InMemoryLeaderboardStore {
    entries: RwLock<HashMap<Uuid, LeaderboardEntry>>,
    failing_writes: AtomicUsize,
}

impl InMemoryLeaderboardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl LeaderboardStore for InMemoryLeaderboardStore {
    async fn record_entry(&self, entry: &LeaderboardEntry) -> Result<RecordOutcome> {
        let should_fail = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(anyhow!("leaderboard store unavailable"));
        }

        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.attempt_id) {
            return Ok(RecordOutcome::Duplicate);
        }
        entries.insert(entry.attempt_id, entry.clone());
        Ok(RecordOutcome::Inserted)
    }

    async fn find_by_attempt(&self, attempt_id: Uuid) -> Result<Option<LeaderboardEntry>> {
        Ok(self.entries.read().await.get(&attempt_id).cloned())
    }

    async fn top_entries(
        &self,
        difficulty: Option<Difficulty>,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>> {
        let entries = self.entries.read().await;
        let mut ranked: Vec<LeaderboardEntry> = entries
            .values()
            .filter(|e| difficulty.is_none_or(|d| e.difficulty == d))
            .cloned()
            .collect();
        rank_entries(&mut ranked);
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Hands finished attempts to the store exactly once.
///
/// Callers must hold the attempt's lock across [`LeaderboardGate::submit`] so the
/// submission flag is checked and set in the same critical section as the
/// terminal transition.
#[derive(Clone)]
pub struct LeaderboardGate {
    store: Arc<dyn LeaderboardStore>,
    retry: RetryConfig,
}

impl LeaderboardGate {
    pub fn new(store: Arc<dyn LeaderboardStore>) -> Self {
        Self {
            store,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn LeaderboardStore> {
        &self.store
    }

    pub async fn submit(&self, attempt: &mut QuizAttempt) -> Result<LeaderboardSubmission, QuizError> {
        let entry = attempt.leaderboard_entry().ok_or_else(|| {
            QuizError::InvalidState(format!(
                "attempt {} is {} and has no leaderboard result",
                attempt.id(),
                attempt.status().as_str()
            ))
        })?;

        if attempt.submission() == SubmissionState::Recorded {
            return Ok(LeaderboardSubmission::AlreadyRecorded);
        }

        let existing = self.store.find_by_attempt(entry.attempt_id).await;
        match existing {
            Ok(Some(_)) => {
                attempt.set_submission(SubmissionState::Recorded);
                return Ok(LeaderboardSubmission::AlreadyRecorded);
            }
            Ok(None) => {}
            Err(e) => return Err(self.write_failed(attempt, e)),
        }

        let result = retry_async_with_config(self.retry.clone(), || async {
            self.store.record_entry(&entry).await
        })
        .await;

        match result {
            Ok(RecordOutcome::Inserted) => {
                attempt.set_submission(SubmissionState::Recorded);
                LEADERBOARD_WRITES_TOTAL.with_label_values(&["recorded"]).inc();
                tracing::info!(
                    "Leaderboard entry recorded: attempt={}, player={}, score={}",
                    entry.attempt_id,
                    entry.display_name,
                    entry.score
                );
                Ok(LeaderboardSubmission::Recorded)
            }
            Ok(RecordOutcome::Duplicate) => {
                attempt.set_submission(SubmissionState::Recorded);
                LEADERBOARD_WRITES_TOTAL.with_label_values(&["duplicate"]).inc();
                Ok(LeaderboardSubmission::AlreadyRecorded)
            }
            Err(e) => Err(self.write_failed(attempt, e)),
        }
    }

    fn write_failed(&self, attempt: &mut QuizAttempt, err: anyhow::Error) -> QuizError {
        attempt.set_submission(SubmissionState::WriteFailed);
        LEADERBOARD_WRITES_TOTAL.with_label_values(&["failed"]).inc();
        tracing::warn!(
            "Leaderboard write failed for attempt {}: {:#}",
            attempt.id(),
            err
        );
        QuizError::LeaderboardWriteFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Question, QuizRules};
    use std::time::Duration;

    fn finished_attempt(nickname: &str, correct: usize) -> QuizAttempt {
        let rules = QuizRules {
            questions_per_attempt: 3,
            starting_lives: 7,
            question_time_limit_seconds: 30,
        };
        let questions = (0..3)
            .map(|i| Question {
                id: format!("q-{}", i),
                difficulty: Difficulty::Beginner,
                prompt: "?".into(),
                choices: vec!["yes".into(), "no".into()],
                correct_choice: 0,
                points: 30,
            })
            .collect();
        let mut attempt = QuizAttempt::start(
            Difficulty::Beginner,
            Player::guest(nickname).unwrap(),
            questions,
            rules,
        )
        .unwrap();
        for i in 0..3 {
            let choice = if i < correct { 0 } else { 1 };
            attempt.submit_answer(i, choice).unwrap();
        }
        attempt
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            jitter_max: None,
        }
    }

    #[tokio::test]
    async fn gate_records_each_attempt_once() {
        let store = Arc::new(InMemoryLeaderboardStore::new());
        let gate = LeaderboardGate::new(store.clone()).with_retry(fast_retry());
        let mut attempt = finished_attempt("Ava", 3);

        assert_eq!(
            gate.submit(&mut attempt).await.unwrap(),
            LeaderboardSubmission::Recorded
        );
        assert_eq!(
            gate.submit(&mut attempt).await.unwrap(),
            LeaderboardSubmission::AlreadyRecorded
        );
        assert_eq!(store.len().await, 1);
        assert_eq!(attempt.submission(), SubmissionState::Recorded);
    }

    #[tokio::test]
    async fn gate_uses_store_as_second_line_of_dedupe() {
        let store = Arc::new(InMemoryLeaderboardStore::new());
        let gate = LeaderboardGate::new(store.clone()).with_retry(fast_retry());
        let mut attempt = finished_attempt("Ava", 2);
        let mut replay = attempt.clone();

        gate.submit(&mut attempt).await.unwrap();
        assert_eq!(
            gate.submit(&mut replay).await.unwrap(),
            LeaderboardSubmission::AlreadyRecorded
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn gate_rejects_unfinished_attempts() {
        let store = Arc::new(InMemoryLeaderboardStore::new());
        let gate = LeaderboardGate::new(store.clone());
        let mut attempt = QuizAttempt::new(
            Difficulty::Expert,
            Player::guest("Bo").unwrap(),
            QuizRules::default(),
        );
        assert!(matches!(
            gate.submit(&mut attempt).await,
            Err(QuizError::InvalidState(_))
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn failed_write_can_be_redelivered() {
        let store = Arc::new(InMemoryLeaderboardStore::new());
        let gate = LeaderboardGate::new(store.clone()).with_retry(fast_retry());
        let mut attempt = finished_attempt("Cy", 1);

        store.fail_next_writes(2);
        assert!(matches!(
            gate.submit(&mut attempt).await,
            Err(QuizError::LeaderboardWriteFailed(_))
        ));
        assert_eq!(attempt.submission(), SubmissionState::WriteFailed);
        assert!(store.is_empty().await);

        assert_eq!(
            gate.submit(&mut attempt).await.unwrap(),
            LeaderboardSubmission::Recorded
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn transient_failure_is_absorbed_by_retry() {
        let store = Arc::new(InMemoryLeaderboardStore::new());
        let gate = LeaderboardGate::new(store.clone()).with_retry(fast_retry());
        let mut attempt = finished_attempt("Dee", 3);

        store.fail_next_writes(1);
        assert_eq!(
            gate.submit(&mut attempt).await.unwrap(),
            LeaderboardSubmission::Recorded
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn top_entries_filters_and_ranks() {
        let store = InMemoryLeaderboardStore::new();
        for (nickname, correct) in [("low", 1), ("high", 3), ("mid", 2)] {
            let entry = finished_attempt(nickname, correct).leaderboard_entry().unwrap();
            store.record_entry(&entry).await.unwrap();
        }
        let top = store.top_entries(Some(Difficulty::Beginner), 2).await.unwrap();
        let names: Vec<_> = top.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["high", "mid"]);

        let expert = store.top_entries(Some(Difficulty::Expert), 10).await.unwrap();
        assert!(expert.is_empty());
    }

    #[test]
    fn document_round_trips_through_entry() {
        let entry = finished_attempt("Eve", 2).leaderboard_entry().unwrap();
        let document = LeaderboardDocument::from(&entry);
        assert_eq!(document.id, entry.attempt_id.to_string());
        let restored = LeaderboardEntry::try_from(document).unwrap();
        assert_eq!(restored.attempt_id, entry.attempt_id);
        assert_eq!(restored.score, 60);
        assert_eq!(
            restored.finished_at.timestamp_millis(),
            entry.finished_at.timestamp_millis()
        );
    }
}
