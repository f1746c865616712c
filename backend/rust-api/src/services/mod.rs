use anyhow::Context;
use std::sync::Arc;

use crate::config::{Config, QuestionSource};
use crate::middlewares::auth::JwtService;
use leaderboard_service::{
    InMemoryLeaderboardStore, LeaderboardGate, LeaderboardStore, MongoLeaderboardStore,
};
use question_bank::{InMemoryQuestionBank, MongoQuestionBank, QuestionBank};
use quiz_service::QuizService;

pub struct AppState {
    pub config: Config,
    pub quiz: Arc<QuizService>,
    pub questions: Arc<dyn QuestionBank>,
    pub leaderboard: Arc<dyn LeaderboardStore>,
    pub jwt: JwtService,
}

impl AppState {
    /// Wires the stores named by `quiz.question_source`.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let (questions, leaderboard): (Arc<dyn QuestionBank>, Arc<dyn LeaderboardStore>) =
            match config.quiz.question_source {
                QuestionSource::Mongo => {
                    let client = mongodb::Client::with_uri_str(&config.mongo_uri)
                        .await
                        .context("Failed to connect to MongoDB")?;
                    let mongo = client.database(&config.mongo_database);
                    tracing::info!("MongoDB connected: database={}", config.mongo_database);
                    (
                        Arc::new(MongoQuestionBank::new(
                            mongo.clone(),
                            config.quiz.default_points,
                        )),
                        Arc::new(MongoLeaderboardStore::new(mongo)),
                    )
                }
                QuestionSource::File => {
                    let bank = InMemoryQuestionBank::from_file(
                        &config.quiz.question_bank_path,
                        config.quiz.default_points,
                    )
                    .await?;
                    tracing::warn!("Using in-memory leaderboard; entries are lost on restart");
                    (Arc::new(bank), Arc::new(InMemoryLeaderboardStore::new()))
                }
            };

        Ok(Self::with_stores(config, questions, leaderboard))
    }

    pub fn with_stores(
        config: Config,
        questions: Arc<dyn QuestionBank>,
        leaderboard: Arc<dyn LeaderboardStore>,
    ) -> Self {
        let gate = LeaderboardGate::new(leaderboard.clone());
        let quiz = Arc::new(QuizService::new(
            questions.clone(),
            gate,
            config.quiz.clone(),
        ));
        let jwt = JwtService::new(&config.jwt_secret);
        Self {
            config,
            quiz,
            questions,
            leaderboard,
            jwt,
        }
    }
}

pub mod leaderboard_service;
pub mod question_bank;
pub mod quiz_service;
pub mod scoring_policy;
