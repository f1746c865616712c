use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, from_document, to_bson, Bson, Document};
use mongodb::{Collection, Database};
use std::path::Path;
use tokio::sync::RwLock;

use crate::metrics::track_db_operation;
use crate::models::{Difficulty, Question, QuestionField, QuestionRecord, QuestionUpdate};

const QUESTIONS_COLLECTION: &str = "questions";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated(Question),
    NotFound,
    Rejected(String),
}

/// Read-mostly source of quiz content.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    /// Every question for a difficulty, in the bank's canonical order.
    async fn questions_for(&self, difficulty: Difficulty) -> Result<Vec<Question>>;

    async fn update_question(&self, id: &str, update: &QuestionUpdate) -> Result<UpdateOutcome>;

    async fn ping(&self) -> Result<()>;

    fn source_name(&self) -> &'static str;
}

pub struct MongoQuestionBank {
    mongo: Database,
    default_points: u32,
}

impl MongoQuestionBank {
    pub fn new(mongo: Database, default_points: u32) -> Self {
        Self {
            mongo,
            default_points,
        }
    }

    fn collection(&self) -> Collection<Document> {
        self.mongo.collection(QUESTIONS_COLLECTION)
    }

    /// Decodes one stored question. Documents are read raw so a single bad
    /// record never fails the whole query.
    fn decode(document: Document, default_points: u32) -> Result<Question, String> {
        let id = document
            .get("_id")
            .map(|id| id.to_string())
            .unwrap_or_else(|| "<no id>".to_string());
        let record: QuestionRecord = from_document(document)
            .map_err(|e| format!("question {} cannot be decoded: {}", id, e))?;
        record.into_question(default_points)
    }

    fn set_document(question: &Question, fields: &[QuestionField]) -> Result<Document> {
        let mut set = Document::new();
        for field in fields {
            let value = match field {
                QuestionField::Prompt => Bson::String(question.prompt.clone()),
                QuestionField::Choices => to_bson(&question.choices)?,
                QuestionField::CorrectChoice => Bson::Int64(question.correct_choice as i64),
                QuestionField::Points => Bson::Int64(i64::from(question.points)),
                QuestionField::Difficulty => Bson::String(question.difficulty.as_str().to_string()),
            };
            set.insert(field.as_str(), value);
        }
        Ok(set)
    }
}

#[async_trait]
impl QuestionBank for MongoQuestionBank {
    async fn questions_for(&self, difficulty: Difficulty) -> Result<Vec<Question>> {
        let collection = self.collection();
        let default_points = self.default_points;

        track_db_operation("find", QUESTIONS_COLLECTION, async {
            let mut cursor = collection
                .find(doc! { "difficulty": difficulty.as_str() })
                .sort(doc! { "order": 1, "_id": 1 })
                .await
                .context("Failed to query questions")?;

            let mut questions = Vec::new();
            while let Some(document) = cursor
                .try_next()
                .await
                .context("Failed to iterate questions")?
            {
                match Self::decode(document, default_points) {
                    Ok(question) => questions.push(question),
                    Err(reason) => tracing::warn!("Skipping malformed question: {}", reason),
                }
            }
            Ok::<_, anyhow::Error>(questions)
        })
        .await
    }

    async fn update_question(&self, id: &str, update: &QuestionUpdate) -> Result<UpdateOutcome> {
        let collection = self.collection();

        let existing = collection
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to load question")?;
        let Some(document) = existing else {
            return Ok(UpdateOutcome::NotFound);
        };
        let current = Self::decode(document, self.default_points)
            .map_err(|reason| anyhow!("Stored question is malformed: {}", reason))?;

        let updated = match update.apply_to(&current) {
            Ok(updated) => updated,
            Err(reason) => return Ok(UpdateOutcome::Rejected(reason)),
        };

        let set = Self::set_document(&updated, &update.fields())?;
        track_db_operation("update_one", QUESTIONS_COLLECTION, async {
            collection
                .update_one(doc! { "_id": id }, doc! { "$set": set })
                .await
                .context("Failed to update question")?;
            Ok::<_, anyhow::Error>(())
        })
        .await?;

        tracing::info!("Question {} updated: {:?}", id, update.fields());
        Ok(UpdateOutcome::Updated(updated))
    }

    async fn ping(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }

    fn source_name(&self) -> &'static str {
        "mongodb"
    }
}

/// Question bank held in memory, usually loaded from a JSON content file.
pub struct InMemoryQuestionBank {
    questions: RwLock<Vec<Question>>,
}

impl InMemoryQuestionBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions: RwLock::new(questions),
        }
    }

    /// Parses a JSON array of question records.
    pub fn from_json_str(json: &str, default_points: u32) -> Result<Self> {
        let records: Vec<QuestionRecord> =
            serde_json::from_str(json).context("Failed to parse question bank JSON")?;
        let questions = records
            .into_iter()
            .map(|record| record.into_question(default_points))
            .collect::<Result<Vec<_>, String>>()
            .map_err(|reason| anyhow!("Invalid question in bank: {}", reason))?;
        Ok(Self::new(questions))
    }

    pub async fn from_file(path: impl AsRef<Path>, default_points: u32) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read question bank {}", path.display()))?;
        let bank = Self::from_json_str(&json, default_points)?;
        tracing::info!(
            "Loaded {} questions from {}",
            bank.questions.read().await.len(),
            path.display()
        );
        Ok(bank)
    }
}

#[async_trait]
impl QuestionBank for InMemoryQuestionBank {
    async fn questions_for(&self, difficulty: Difficulty) -> Result<Vec<Question>> {
        let questions = self.questions.read().await;
        Ok(questions
            .iter()
            .filter(|q| q.difficulty == difficulty)
            .cloned()
            .collect())
    }

    async fn update_question(&self, id: &str, update: &QuestionUpdate) -> Result<UpdateOutcome> {
        let mut questions = self.questions.write().await;
        let Some(slot) = questions.iter_mut().find(|q| q.id == id) else {
            return Ok(UpdateOutcome::NotFound);
        };
        match update.apply_to(slot) {
            Ok(updated) => {
                *slot = updated.clone();
                Ok(UpdateOutcome::Updated(updated))
            }
            Err(reason) => Ok(UpdateOutcome::Rejected(reason)),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn source_name(&self) -> &'static str {
        "memory"
    }
}
