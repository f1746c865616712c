use serde::{Deserialize, Serialize};
use validator::Validate;

use super::Difficulty;

/// A single multiple-choice question as served by the question bank.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    pub difficulty: Difficulty,
    pub prompt: String,
    pub choices: Vec<String>,
    pub correct_choice: usize,
    pub points: u32,
}

impl Question {
    pub fn is_correct(&self, choice: usize) -> bool {
        self.correct_choice == choice
    }

    pub fn view(&self, index: usize, total: usize) -> QuestionView {
        QuestionView {
            id: self.id.clone(),
            index,
            total,
            prompt: self.prompt.clone(),
            choices: self.choices.clone(),
            points: self.points,
        }
    }
}

/// What the player sees: no answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: String,
    pub index: usize,
    pub total: usize,
    pub prompt: String,
    pub choices: Vec<String>,
    pub points: u32,
}

/// Question shape used by the JSON content files and the `questions` collection.
/// `points` falls back to the configured default when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    #[serde(alias = "_id")]
    pub id: String,
    pub difficulty: Difficulty,
    pub prompt: String,
    pub choices: Vec<String>,
    pub correct_choice: usize,
    #[serde(default)]
    pub points: Option<u32>,
}

impl QuestionRecord {
    pub fn into_question(self, default_points: u32) -> Result<Question, String> {
        if self.choices.len() < 2 {
            return Err(format!("question {} needs at least two choices", self.id));
        }
        if self.correct_choice >= self.choices.len() {
            return Err(format!(
                "question {} marks choice {} correct but has only {} choices",
                self.id,
                self.correct_choice,
                self.choices.len()
            ));
        }
        Ok(Question {
            id: self.id,
            difficulty: self.difficulty,
            prompt: self.prompt,
            choices: self.choices,
            correct_choice: self.correct_choice,
            points: self.points.unwrap_or(default_points),
        })
    }
}

/// Fields an admin is allowed to change on a stored question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionField {
    Prompt,
    Choices,
    CorrectChoice,
    Points,
    Difficulty,
}

impl QuestionField {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionField::Prompt => "prompt",
            QuestionField::Choices => "choices",
            QuestionField::CorrectChoice => "correct_choice",
            QuestionField::Points => "points",
            QuestionField::Difficulty => "difficulty",
        }
    }
}

/// Typed partial update for a question. Unknown keys are rejected at parse time.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct QuestionUpdate {
    #[validate(length(
        min = 1,
        max = 2000,
        message = "Prompt must be between 1 and 2000 characters"
    ))]
    pub prompt: Option<String>,

    #[validate(length(min = 2, max = 8, message = "A question needs 2 to 8 choices"))]
    pub choices: Option<Vec<String>>,

    pub correct_choice: Option<usize>,

    #[validate(range(min = 1, max = 1000, message = "Points must be between 1 and 1000"))]
    pub points: Option<u32>,

    pub difficulty: Option<Difficulty>,
}

impl QuestionUpdate {
    pub fn fields(&self) -> Vec<QuestionField> {
        let mut fields = Vec::new();
        if self.prompt.is_some() {
            fields.push(QuestionField::Prompt);
        }
        if self.choices.is_some() {
            fields.push(QuestionField::Choices);
        }
        if self.correct_choice.is_some() {
            fields.push(QuestionField::CorrectChoice);
        }
        if self.points.is_some() {
            fields.push(QuestionField::Points);
        }
        if self.difficulty.is_some() {
            fields.push(QuestionField::Difficulty);
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Applies the update, rejecting results whose answer key points past the choices.
    pub fn apply_to(&self, question: &Question) -> Result<Question, String> {
        let mut updated = question.clone();
        if let Some(prompt) = &self.prompt {
            updated.prompt = prompt.clone();
        }
        if let Some(choices) = &self.choices {
            updated.choices = choices.clone();
        }
        if let Some(correct_choice) = self.correct_choice {
            updated.correct_choice = correct_choice;
        }
        if let Some(points) = self.points {
            updated.points = points;
        }
        if let Some(difficulty) = self.difficulty {
            updated.difficulty = difficulty;
        }

        if updated.correct_choice >= updated.choices.len() {
            return Err(format!(
                "correct_choice {} is out of range for {} choices",
                updated.correct_choice,
                updated.choices.len()
            ));
        }
        Ok(updated)
    }
}
