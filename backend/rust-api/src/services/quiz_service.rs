use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::leaderboard_service::LeaderboardGate;
use super::question_bank::QuestionBank;
use crate::config::{QuizSettings, TimerDriver};
use crate::error::QuizError;
use crate::metrics::{self, QUIZ_ATTEMPTS_ACTIVE, QUIZ_ATTEMPTS_TOTAL};
use crate::models::{
    AnswerOutcome, AttemptSnapshot, AttemptStatus, Difficulty, LeaderboardEntry,
    LeaderboardSubmission, Player, QuestionView, QuizAttempt, SubmitAnswerRequest, TickOutcome,
};

/// A registered attempt plus the signal its ticker waits on when an answer
/// moves the attempt to the next question.
struct AttemptSlot {
    attempt: Mutex<QuizAttempt>,
    question_advanced: Notify,
}

type AttemptHandle = Arc<AttemptSlot>;

/// Registry of live attempts. Every operation takes the attempt's own lock, so
/// answers, ticks and leaderboard submission for one attempt never interleave.
pub struct QuizService {
    bank: Arc<dyn QuestionBank>,
    gate: LeaderboardGate,
    attempts: RwLock<HashMap<Uuid, AttemptHandle>>,
    settings: QuizSettings,
}

impl QuizService {
    pub fn new(bank: Arc<dyn QuestionBank>, gate: LeaderboardGate, settings: QuizSettings) -> Self {
        Self {
            bank,
            gate,
            attempts: RwLock::new(HashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &QuizSettings {
        &self.settings
    }

    pub async fn start(
        &self,
        difficulty: Difficulty,
        player: Player,
    ) -> Result<AttemptSnapshot, QuizError> {
        let rules = self.settings.rules();
        let mut attempt = QuizAttempt::new(difficulty, player, rules);

        let questions = match self.bank.questions_for(difficulty).await {
            Ok(mut pool) => {
                if self.settings.shuffle_questions {
                    pool.shuffle(&mut rand::rng());
                }
                pool.truncate(rules.questions_per_attempt);
                pool
            }
            Err(e) => {
                tracing::error!(
                    "Question bank unavailable for {}: {:#}",
                    difficulty.as_str(),
                    e
                );
                Vec::new()
            }
        };

        if let Err(e) = attempt.begin(questions) {
            QUIZ_ATTEMPTS_TOTAL.with_label_values(&["abandoned"]).inc();
            tracing::warn!(
                "Attempt {} for {} could not start: {}",
                attempt.id(),
                attempt.player().display_name(),
                e
            );
            return Err(e);
        }

        let attempt_id = attempt.id();
        let snapshot = attempt.snapshot();
        let handle = Arc::new(AttemptSlot {
            attempt: Mutex::new(attempt),
            question_advanced: Notify::new(),
        });
        self.attempts
            .write()
            .await
            .insert(attempt_id, handle.clone());

        if difficulty.is_timed() && self.settings.timer_driver == TimerDriver::Server {
            spawn_ticker(
                attempt_id,
                handle,
                self.gate.clone(),
                self.settings.tick_interval(),
            );
        }

        QUIZ_ATTEMPTS_TOTAL.with_label_values(&["started"]).inc();
        QUIZ_ATTEMPTS_ACTIVE.inc();
        tracing::info!(
            "Attempt started: id={}, player={}, difficulty={}",
            attempt_id,
            snapshot.player.display_name(),
            difficulty.as_str()
        );

        Ok(snapshot)
    }

    pub async fn snapshot(&self, attempt_id: &str) -> Result<AttemptSnapshot, QuizError> {
        let handle = self.handle(attempt_id).await?;
        let attempt = handle.attempt.lock().await;
        Ok(attempt.snapshot())
    }

    pub async fn current_question(&self, attempt_id: &str) -> Result<QuestionView, QuizError> {
        let handle = self.handle(attempt_id).await?;
        let attempt = handle.attempt.lock().await;
        attempt.current_question_view()
    }

    pub async fn submit_answer(
        &self,
        attempt_id: &str,
        request: SubmitAnswerRequest,
    ) -> Result<AnswerOutcome, QuizError> {
        let handle = self.handle(attempt_id).await?;
        let mut attempt = handle.attempt.lock().await;

        let mut outcome = attempt
            .submit_answer(request.question_index, request.choice)
            .inspect_err(|e| tracing::warn!("Answer rejected for attempt {}: {}", attempt_id, e))?;

        metrics::record_answer(outcome.correct, false);
        tracing::debug!(
            "Answer applied: attempt={}, question={}, correct={}, lives={}",
            attempt_id,
            outcome.question_index,
            outcome.correct,
            outcome.lives_remaining
        );

        if outcome.game_over {
            settle(&self.gate, &mut attempt, &mut outcome).await;
        } else {
            handle.question_advanced.notify_one();
        }
        Ok(outcome)
    }

    /// Advances the countdown by one second on behalf of the client.
    pub async fn tick(&self, attempt_id: &str) -> Result<TickOutcome, QuizError> {
        if self.settings.timer_driver == TimerDriver::Server {
            return Err(QuizError::InvalidState(
                "the countdown is driven by the server".to_string(),
            ));
        }

        let handle = self.handle(attempt_id).await?;
        let mut attempt = handle.attempt.lock().await;
        let mut outcome = attempt.tick()?;

        if let TickOutcome::Expired(ref mut expired) = outcome {
            metrics::record_answer(false, true);
            tracing::info!(
                "Question {} timed out: attempt={}, lives={}",
                expired.question_index,
                attempt_id,
                expired.lives_remaining
            );
            if expired.game_over {
                settle(&self.gate, &mut attempt, expired).await;
            }
        }
        Ok(outcome)
    }

    pub async fn abandon(&self, attempt_id: &str) -> Result<AttemptSnapshot, QuizError> {
        let handle = self.handle(attempt_id).await?;
        let mut attempt = handle.attempt.lock().await;
        attempt.abandon()?;
        record_terminal(attempt.status());
        tracing::info!(
            "Attempt abandoned: id={}, question={}",
            attempt_id,
            attempt.current_index()
        );
        Ok(attempt.snapshot())
    }

    /// Re-delivers the leaderboard entry of a finished attempt.
    pub async fn resubmit_leaderboard(
        &self,
        attempt_id: &str,
    ) -> Result<LeaderboardSubmission, QuizError> {
        let handle = self.handle(attempt_id).await?;
        let mut attempt = handle.attempt.lock().await;
        self.gate.submit(&mut attempt).await
    }

    pub async fn top_entries(
        &self,
        difficulty: Option<Difficulty>,
        limit: usize,
    ) -> anyhow::Result<Vec<LeaderboardEntry>> {
        self.gate.store().top_entries(difficulty, limit).await
    }

    pub async fn registered_count(&self) -> usize {
        self.attempts.read().await.len()
    }

    /// Drops finished attempts past retention. Idle attempts are abandoned and
    /// then retained like any other finished attempt.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let handles: Vec<(Uuid, AttemptHandle)> = self
            .attempts
            .read()
            .await
            .iter()
            .map(|(id, handle)| (*id, handle.clone()))
            .collect();

        let mut expired = Vec::new();
        for (attempt_id, handle) in handles {
            let mut attempt = handle.attempt.lock().await;
            if attempt.status().is_terminal() {
                let finished_at = attempt.finished_at().unwrap_or(attempt.updated_at());
                if age(now, finished_at) >= self.settings.retention() {
                    expired.push(attempt_id);
                }
            } else if age(now, attempt.updated_at()) >= self.settings.idle_timeout()
                && attempt.abandon().is_ok()
            {
                record_terminal(attempt.status());
                tracing::info!("Idle attempt abandoned: id={}", attempt_id);
            }
        }

        if !expired.is_empty() {
            let mut attempts = self.attempts.write().await;
            for attempt_id in &expired {
                attempts.remove(attempt_id);
            }
            tracing::debug!("Evicted {} attempts", expired.len());
        }
        expired.len()
    }

    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.evict_expired(Utc::now()).await;
            }
        })
    }

    async fn handle(&self, attempt_id: &str) -> Result<AttemptHandle, QuizError> {
        let id = Uuid::parse_str(attempt_id)
            .map_err(|_| QuizError::AttemptNotFound(attempt_id.to_string()))?;
        self.attempts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| QuizError::AttemptNotFound(attempt_id.to_string()))
    }
}

fn age(now: DateTime<Utc>, since: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}

fn record_terminal(status: AttemptStatus) {
    QUIZ_ATTEMPTS_TOTAL.with_label_values(&[status.as_str()]).inc();
    QUIZ_ATTEMPTS_ACTIVE.dec();
}

/// Terminal bookkeeping, run under the attempt lock right after the transition.
async fn settle(gate: &LeaderboardGate, attempt: &mut QuizAttempt, outcome: &mut AnswerOutcome) {
    record_terminal(attempt.status());
    tracing::info!(
        "Attempt finished: id={}, status={}, score={}, lives={}",
        attempt.id(),
        attempt.status().as_str(),
        attempt.score(),
        attempt.lives_remaining()
    );

    if !attempt.status().is_ranked() {
        return;
    }
    outcome.leaderboard = Some(match gate.submit(attempt).await {
        Ok(submission) => submission,
        Err(_) => LeaderboardSubmission::WriteFailed,
    });
}

fn spawn_ticker(attempt_id: Uuid, handle: AttemptHandle, gate: LeaderboardGate, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        let mut question_index = handle.attempt.lock().await.current_index();

        loop {
            tokio::select! {
                biased;
                _ = handle.question_advanced.notified() => {
                    let attempt = handle.attempt.lock().await;
                    if attempt.status().is_terminal() {
                        break;
                    }
                    if attempt.current_index() != question_index {
                        question_index = attempt.current_index();
                        interval.reset();
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }

            let mut attempt = handle.attempt.lock().await;
            // An answer landed while this tick was pending; the new question
            // gets a full first second.
            if attempt.current_index() != question_index {
                question_index = attempt.current_index();
                interval.reset();
                continue;
            }

            match attempt.tick() {
                Ok(TickOutcome::Running {
                    remaining_seconds, ..
                }) => {
                    tracing::trace!("Tick: attempt={}, remaining={}", attempt_id, remaining_seconds);
                }
                Ok(TickOutcome::Expired(mut outcome)) => {
                    metrics::record_answer(false, true);
                    tracing::info!(
                        "Question {} timed out: attempt={}, lives={}",
                        outcome.question_index,
                        attempt_id,
                        outcome.lives_remaining
                    );
                    if outcome.game_over {
                        settle(&gate, &mut attempt, &mut outcome).await;
                        break;
                    }
                    question_index = attempt.current_index();
                }
                Err(_) => break,
            }
        }
        tracing::debug!("Ticker stopped: attempt={}", attempt_id);
    });
}
