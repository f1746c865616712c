//! Scoring and lives rules for a single answer.

/// Maps one answer onto the running score and lives.
///
/// A correct answer adds the question's points and keeps lives; a wrong answer
/// or a timeout costs exactly one life and keeps the score. Lives never drop
/// below zero and the score never decreases.
pub fn score_answer(score: u32, lives: u32, points: u32, is_correct: bool) -> (u32, u32) {
    if is_correct {
        (score.saturating_add(points), lives)
    } else {
        (score, lives.saturating_sub(1))
    }
}
