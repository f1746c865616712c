use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    AttemptStatus, Difficulty, LeaderboardEntry, LeaderboardSubmission, Player, Question,
    QuestionView, SubmissionState, TimerState,
};
use crate::error::QuizError;
use crate::services::scoring_policy::score_answer;

/// Tunables for one attempt. Defaults follow the game's published rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizRules {
    pub questions_per_attempt: usize,
    pub starting_lives: u32,
    pub question_time_limit_seconds: u32,
}

impl Default for QuizRules {
    fn default() -> Self {
        Self {
            questions_per_attempt: 40,
            starting_lives: 7,
            question_time_limit_seconds: 30,
        }
    }
}

/// One play-through, from difficulty selection to a terminal status.
///
/// All mutation goes through [`QuizAttempt::submit_answer`], [`QuizAttempt::tick`]
/// and [`QuizAttempt::abandon`]; the terminal status is re-derived after each one,
/// lives first, so losing the last life on the final question is a failure.
#[derive(Debug, Clone)]
pub struct QuizAttempt {
    id: Uuid,
    player: Player,
    difficulty: Difficulty,
    rules: QuizRules,
    questions: Vec<Question>,
    current_index: usize,
    lives_remaining: u32,
    score: u32,
    timeouts: u32,
    timer: Option<TimerState>,
    status: AttemptStatus,
    submission: SubmissionState,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl QuizAttempt {
    /// Creates an attempt that has not loaded its questions yet.
    pub fn new(difficulty: Difficulty, player: Player, rules: QuizRules) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            player,
            difficulty,
            rules,
            questions: Vec::new(),
            current_index: 0,
            lives_remaining: rules.starting_lives,
            score: 0,
            timeouts: 0,
            timer: None,
            status: AttemptStatus::NotStarted,
            submission: SubmissionState::NotSubmitted,
            started_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Creates and begins an attempt in one step.
    pub fn start(
        difficulty: Difficulty,
        player: Player,
        questions: Vec<Question>,
        rules: QuizRules,
    ) -> Result<Self, QuizError> {
        let mut attempt = Self::new(difficulty, player, rules);
        attempt.begin(questions)?;
        Ok(attempt)
    }

    /// Fixes the question sequence and moves to `InProgress`.
    ///
    /// A sequence of the wrong length or difficulty abandons the attempt.
    pub fn begin(&mut self, questions: Vec<Question>) -> Result<(), QuizError> {
        if self.status != AttemptStatus::NotStarted {
            return Err(QuizError::InvalidState(format!(
                "attempt {} already started",
                self.id
            )));
        }

        let expected = self.rules.questions_per_attempt;
        if questions.len() != expected {
            self.transition(AttemptStatus::Abandoned)?;
            return Err(QuizError::QuestionBankUnavailable(format!(
                "expected {} {} questions, got {}",
                expected,
                self.difficulty.as_str(),
                questions.len()
            )));
        }
        if let Some(stray) = questions.iter().find(|q| q.difficulty != self.difficulty) {
            let message = format!(
                "question {} is {} but the attempt is {}",
                stray.id,
                stray.difficulty.as_str(),
                self.difficulty.as_str()
            );
            self.transition(AttemptStatus::Abandoned)?;
            return Err(QuizError::QuestionBankUnavailable(message));
        }

        self.questions = questions;
        self.current_index = 0;
        self.lives_remaining = self.rules.starting_lives;
        self.score = 0;
        self.timer = self
            .difficulty
            .is_timed()
            .then(|| TimerState::new(self.rules.question_time_limit_seconds));
        self.transition(AttemptStatus::InProgress)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn lives_remaining(&self) -> u32 {
        self.lives_remaining
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }

    pub fn timer_state(&self) -> Option<TimerState> {
        self.timer
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn submission(&self) -> SubmissionState {
        self.submission
    }

    pub fn set_submission(&mut self, submission: SubmissionState) {
        self.submission = submission;
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn current_question(&self) -> Result<&Question, QuizError> {
        if self.status == AttemptStatus::NotStarted {
            return Err(QuizError::InvalidState(format!(
                "attempt {} has not started",
                self.id
            )));
        }
        if self.current_index >= self.questions.len() {
            return Err(QuizError::NoMoreQuestions);
        }
        if self.status.is_terminal() {
            return Err(QuizError::InvalidState(format!(
                "attempt {} is {}",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(&self.questions[self.current_index])
    }

    pub fn current_question_view(&self) -> Result<QuestionView, QuizError> {
        let total = self.questions.len();
        self.current_question()
            .map(|q| q.view(self.current_index, total))
    }

    /// Answers the question at `question_index` with `choice`.
    ///
    /// The index must equal the current index; an answer racing a timeout, or a
    /// re-delivered answer, is stale and rejected without touching state.
    pub fn submit_answer(
        &mut self,
        question_index: usize,
        choice: usize,
    ) -> Result<AnswerOutcome, QuizError> {
        self.ensure_accepting()?;
        if question_index != self.current_index {
            return Err(QuizError::InvalidState(format!(
                "answer for question {} is stale, attempt {} is at question {}",
                question_index, self.id, self.current_index
            )));
        }

        let question = &self.questions[self.current_index];
        if choice >= question.choices.len() {
            return Err(QuizError::InvalidChoice {
                choice,
                available: question.choices.len(),
            });
        }

        let is_correct = question.is_correct(choice);
        Ok(self.resolve_question(is_correct, false))
    }

    /// Advances the expert countdown by one second; on expiry the question is
    /// scored as a wrong answer.
    pub fn tick(&mut self) -> Result<TickOutcome, QuizError> {
        self.ensure_accepting()?;
        let question_index = self.current_index;
        let timer = self
            .timer
            .as_mut()
            .ok_or_else(|| QuizError::TimerNotActive(self.id.to_string()))?;

        if !timer.tick() {
            return Ok(TickOutcome::Running {
                question_index,
                remaining_seconds: timer.remaining_seconds,
            });
        }

        self.timeouts += 1;
        Ok(TickOutcome::Expired(self.resolve_question(false, true)))
    }

    pub fn abandon(&mut self) -> Result<(), QuizError> {
        if self.status != AttemptStatus::InProgress {
            return Err(QuizError::InvalidState(format!(
                "attempt {} is {} and cannot be abandoned",
                self.id,
                self.status.as_str()
            )));
        }
        self.transition(AttemptStatus::Abandoned)
    }

    /// The ranked result, available once the attempt completed or failed.
    pub fn leaderboard_entry(&self) -> Option<LeaderboardEntry> {
        if !self.status.is_ranked() {
            return None;
        }
        Some(LeaderboardEntry {
            attempt_id: self.id,
            player: self.player.clone(),
            display_name: self.player.display_name().to_string(),
            difficulty: self.difficulty,
            score: self.score,
            status: self.status,
            questions_answered: self.current_index,
            lives_remaining: self.lives_remaining,
            finished_at: self.finished_at.unwrap_or(self.updated_at),
        })
    }

    pub fn snapshot(&self) -> AttemptSnapshot {
        AttemptSnapshot {
            attempt_id: self.id,
            player: self.player.clone(),
            difficulty: self.difficulty,
            status: self.status,
            current_index: self.current_index,
            total_questions: self.questions.len(),
            lives_remaining: self.lives_remaining,
            score: self.score,
            timeouts: self.timeouts,
            timer: self.timer,
            leaderboard: self.submission,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }

    fn ensure_accepting(&self) -> Result<(), QuizError> {
        if self.status != AttemptStatus::InProgress {
            return Err(QuizError::InvalidState(format!(
                "attempt {} is {}",
                self.id,
                self.status.as_str()
            )));
        }
        if self.current_index >= self.questions.len() {
            return Err(QuizError::InvalidState(format!(
                "attempt {} has no unanswered questions",
                self.id
            )));
        }
        Ok(())
    }

    fn resolve_question(&mut self, is_correct: bool, timed_out: bool) -> AnswerOutcome {
        let question = &self.questions[self.current_index];
        let question_index = self.current_index;
        let correct_choice = question.correct_choice;
        let (score, lives) =
            score_answer(self.score, self.lives_remaining, question.points, is_correct);
        let points_awarded = score - self.score;

        self.score = score;
        self.lives_remaining = lives;
        self.current_index += 1;
        self.updated_at = Utc::now();

        let next = if self.lives_remaining == 0 {
            AttemptStatus::Failed
        } else if self.current_index >= self.questions.len() {
            AttemptStatus::Completed
        } else {
            AttemptStatus::InProgress
        };

        if next == AttemptStatus::InProgress {
            if let Some(timer) = self.timer.as_mut() {
                timer.restart();
            }
        } else {
            self.status = next;
            self.finished_at = Some(self.updated_at);
        }

        AnswerOutcome {
            question_index,
            correct: is_correct,
            timed_out,
            correct_choice,
            points_awarded,
            score: self.score,
            lives_remaining: self.lives_remaining,
            current_index: self.current_index,
            status: self.status,
            game_over: self.status.is_terminal(),
            leaderboard: None,
        }
    }

    fn transition(&mut self, next: AttemptStatus) -> Result<(), QuizError> {
        if !self.status.can_transition_to(next) {
            return Err(QuizError::InvalidState(format!(
                "attempt {} cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.finished_at = Some(self.updated_at);
        }
        Ok(())
    }
}

/// Result of scoring one question, by answer or by timeout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub question_index: usize,
    pub correct: bool,
    pub timed_out: bool,
    pub correct_choice: usize,
    pub points_awarded: u32,
    pub score: u32,
    pub lives_remaining: u32,
    pub current_index: usize,
    pub status: AttemptStatus,
    pub game_over: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaderboard: Option<LeaderboardSubmission>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TickOutcome {
    Running {
        question_index: usize,
        remaining_seconds: u32,
    },
    Expired(AnswerOutcome),
}

impl TickOutcome {
    pub fn expired(&self) -> Option<&AnswerOutcome> {
        match self {
            TickOutcome::Expired(outcome) => Some(outcome),
            TickOutcome::Running { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSnapshot {
    pub attempt_id: Uuid,
    pub player: Player,
    pub difficulty: Difficulty,
    pub status: AttemptStatus,
    pub current_index: usize,
    pub total_questions: usize,
    pub lives_remaining: u32,
    pub score: u32,
    pub timeouts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer: Option<TimerState>,
    pub leaderboard: SubmissionState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct StartAttemptRequest {
    pub difficulty: String,
    pub nickname: Option<String>,
}

impl StartAttemptRequest {
    /// Resolves the player: an authenticated user wins over a nickname,
    /// otherwise a valid guest nickname is required.
    pub fn into_parts(self, user: Option<Player>) -> Result<(Difficulty, Player), QuizError> {
        let difficulty = self.difficulty.parse::<Difficulty>()?;
        let player = match user {
            Some(user) => user,
            None => Player::guest(self.nickname.as_deref().unwrap_or_default())?,
        };
        Ok((difficulty, player))
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub question_index: usize,
    pub choice: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn questions(difficulty: Difficulty, count: usize, points: u32) -> Vec<Question> {
        (0..count)
            .map(|i| Question {
                id: format!("{}-{}", difficulty.as_str(), i),
                difficulty,
                prompt: format!("Question {}", i),
                choices: vec!["right".into(), "wrong".into(), "also wrong".into()],
                correct_choice: 0,
                points,
            })
            .collect()
    }

    fn started(difficulty: Difficulty, nickname: &str) -> QuizAttempt {
        QuizAttempt::start(
            difficulty,
            Player::guest(nickname).unwrap(),
            questions(difficulty, 40, 30),
            QuizRules::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_start_yields_fresh_attempt() {
        for difficulty in Difficulty::all() {
            let attempt = started(difficulty, "Ava");
            assert_eq!(attempt.status(), AttemptStatus::InProgress);
            assert_eq!(attempt.lives_remaining(), 7);
            assert_eq!(attempt.current_index(), 0);
            assert_eq!(attempt.score(), 0);
            assert_eq!(attempt.total_questions(), 40);
            assert_eq!(attempt.timer_state().is_some(), difficulty.is_timed());
        }
    }

    #[test]
    fn test_start_with_short_bank_abandons() {
        let mut attempt = QuizAttempt::new(
            Difficulty::Beginner,
            Player::guest("Ava").unwrap(),
            QuizRules::default(),
        );
        let err = attempt
            .begin(questions(Difficulty::Beginner, 39, 30))
            .unwrap_err();
        assert!(matches!(err, QuizError::QuestionBankUnavailable(_)));
        assert_eq!(attempt.status(), AttemptStatus::Abandoned);
        assert!(attempt.leaderboard_entry().is_none());
    }

    #[test]
    fn test_start_rejects_mixed_difficulty() {
        let mut bank = questions(Difficulty::Beginner, 39, 30);
        bank.extend(questions(Difficulty::Expert, 1, 30));
        let err = QuizAttempt::start(
            Difficulty::Beginner,
            Player::guest("Ava").unwrap(),
            bank,
            QuizRules::default(),
        )
        .unwrap_err();
        assert!(matches!(err, QuizError::QuestionBankUnavailable(_)));
    }

    #[test]
    fn test_all_correct_beginner_run_completes() {
        let mut attempt = started(Difficulty::Beginner, "Ava");
        for i in 0..40 {
            let outcome = attempt.submit_answer(i, 0).unwrap();
            assert!(outcome.correct);
            assert_eq!(outcome.points_awarded, 30);
        }
        assert_eq!(attempt.score(), 1200);
        assert_eq!(attempt.status(), AttemptStatus::Completed);
        assert_eq!(attempt.lives_remaining(), 7);
        assert!(matches!(
            attempt.current_question(),
            Err(QuizError::NoMoreQuestions)
        ));
        assert!(matches!(
            attempt.submit_answer(40, 0),
            Err(QuizError::InvalidState(_))
        ));
    }

    #[test]
    fn test_seven_wrong_answers_fail_the_attempt() {
        let mut attempt = started(Difficulty::Intermediate, "Cy");
        for i in 0..7 {
            let outcome = attempt.submit_answer(i, 1).unwrap();
            assert_eq!(outcome.lives_remaining, 6 - i as u32);
            assert_eq!(outcome.game_over, i == 6);
        }
        assert_eq!(attempt.lives_remaining(), 0);
        assert_eq!(attempt.status(), AttemptStatus::Failed);
        assert_eq!(attempt.current_index(), 7);
        assert!(matches!(
            attempt.submit_answer(7, 0),
            Err(QuizError::InvalidState(_))
        ));
    }

    #[test]
    fn test_losing_last_life_on_final_question_is_failure() {
        let mut attempt = started(Difficulty::Beginner, "Dee");
        // Six misses early, then correct answers up to the final question.
        for i in 0..6 {
            attempt.submit_answer(i, 1).unwrap();
        }
        for i in 6..39 {
            attempt.submit_answer(i, 0).unwrap();
        }
        assert_eq!(attempt.lives_remaining(), 1);
        assert_eq!(attempt.status(), AttemptStatus::InProgress);

        let outcome = attempt.submit_answer(39, 2).unwrap();
        assert_eq!(outcome.current_index, 40);
        assert_eq!(outcome.lives_remaining, 0);
        assert_eq!(attempt.status(), AttemptStatus::Failed);
    }

    #[test]
    fn test_expert_timeout_costs_a_life_and_stales_late_answer() {
        let mut attempt = started(Difficulty::Expert, "Bo");
        for _ in 0..29 {
            assert!(matches!(
                attempt.tick().unwrap(),
                TickOutcome::Running { question_index: 0, .. }
            ));
        }
        let outcome = attempt.tick().unwrap();
        let expired = outcome.expired().expect("question should time out");
        assert!(expired.timed_out);
        assert!(!expired.correct);

        assert_eq!(attempt.lives_remaining(), 6);
        assert_eq!(attempt.current_index(), 1);
        assert_eq!(attempt.timeouts(), 1);
        assert_eq!(attempt.timer_state().unwrap().remaining_seconds, 30);

        let late = attempt.submit_answer(0, 0);
        assert!(matches!(late, Err(QuizError::InvalidState(_))));
        assert_eq!(attempt.lives_remaining(), 6);
        assert_eq!(attempt.current_index(), 1);
    }

    #[test]
    fn test_answer_restarts_the_countdown() {
        let mut attempt = started(Difficulty::Expert, "Bo");
        for _ in 0..10 {
            attempt.tick().unwrap();
        }
        assert_eq!(attempt.timer_state().unwrap().remaining_seconds, 20);
        attempt.submit_answer(0, 0).unwrap();
        assert_eq!(attempt.timer_state().unwrap().remaining_seconds, 30);
    }

    #[test]
    fn test_tick_without_timer_is_rejected() {
        let mut attempt = started(Difficulty::Beginner, "Ava");
        assert!(matches!(attempt.tick(), Err(QuizError::TimerNotActive(_))));
        assert_eq!(attempt.lives_remaining(), 7);
    }

    #[test]
    fn test_out_of_range_choice_changes_nothing() {
        let mut attempt = started(Difficulty::Beginner, "Ava");
        let err = attempt.submit_answer(0, 3).unwrap_err();
        assert_eq!(
            err,
            QuizError::InvalidChoice {
                choice: 3,
                available: 3
            }
        );
        assert_eq!(attempt.current_index(), 0);
        assert_eq!(attempt.lives_remaining(), 7);
    }

    #[test]
    fn test_abandon_is_terminal_and_unranked() {
        let mut attempt = started(Difficulty::Beginner, "Ava");
        attempt.submit_answer(0, 0).unwrap();
        attempt.abandon().unwrap();
        assert_eq!(attempt.status(), AttemptStatus::Abandoned);
        assert!(attempt.finished_at().is_some());
        assert!(attempt.leaderboard_entry().is_none());
        assert!(attempt.abandon().is_err());
        assert!(attempt.submit_answer(1, 0).is_err());
    }

    #[test]
    fn test_lives_and_score_are_monotonic() {
        let mut attempt = started(Difficulty::Expert, "Eve");
        let mut last = (attempt.score(), attempt.lives_remaining());
        let pattern = [0usize, 1, 0, 0, 2, 1, 0, 1];
        for i in 0..40 {
            if attempt.status().is_terminal() {
                break;
            }
            if i % 5 == 4 {
                while attempt.tick().unwrap().expired().is_none() {}
            } else {
                let index = attempt.current_index();
                attempt.submit_answer(index, pattern[i % pattern.len()]).unwrap();
            }
            let now = (attempt.score(), attempt.lives_remaining());
            assert!(now.0 >= last.0);
            assert!(now.1 <= last.1);
            last = now;
        }
    }

    #[test]
    fn test_leaderboard_entry_reflects_result() {
        let mut attempt = started(Difficulty::Beginner, "Ava");
        assert!(attempt.leaderboard_entry().is_none());
        for i in 0..40 {
            attempt.submit_answer(i, 0).unwrap();
        }
        let entry = attempt.leaderboard_entry().unwrap();
        assert_eq!(entry.attempt_id, attempt.id());
        assert_eq!(entry.display_name, "Ava");
        assert_eq!(entry.score, 1200);
        assert_eq!(entry.status, AttemptStatus::Completed);
        assert_eq!(entry.questions_answered, 40);
    }

    #[test]
    fn test_start_request_prefers_authenticated_user() {
        let req = StartAttemptRequest {
            difficulty: "expert".into(),
            nickname: None,
        };
        let user = Player::user("user-42", Some("Ferris"));
        let (difficulty, player) = req.into_parts(Some(user.clone())).unwrap();
        assert_eq!(difficulty, Difficulty::Expert);
        assert_eq!(player, user);

        let guest = StartAttemptRequest {
            difficulty: "beginner".into(),
            nickname: None,
        };
        assert!(matches!(
            guest.into_parts(None),
            Err(QuizError::InvalidNickname(_))
        ));
    }
}
