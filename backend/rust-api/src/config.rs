use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::models::QuizRules;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuestionSource {
    #[default]
    Mongo,
    File,
}

/// Who advances the expert countdown.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimerDriver {
    /// A tokio ticker per attempt.
    #[default]
    Server,
    /// The browser calls the tick endpoint once per second.
    Client,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuizSettings {
    pub question_source: QuestionSource,
    pub question_bank_path: String,
    pub questions_per_attempt: usize,
    pub starting_lives: u32,
    pub default_points: u32,
    pub question_time_limit_seconds: u32,
    pub tick_interval_ms: u64,
    pub timer_driver: TimerDriver,
    pub shuffle_questions: bool,
    pub attempt_retention_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for QuizSettings {
    fn default() -> Self {
        let rules = QuizRules::default();
        Self {
            question_source: QuestionSource::Mongo,
            question_bank_path: "content/questions.json".to_string(),
            questions_per_attempt: rules.questions_per_attempt,
            starting_lives: rules.starting_lives,
            default_points: 30,
            question_time_limit_seconds: rules.question_time_limit_seconds,
            tick_interval_ms: 1000,
            timer_driver: TimerDriver::Server,
            shuffle_questions: true,
            attempt_retention_seconds: 3600,
            idle_timeout_seconds: 1800,
        }
    }
}

impl QuizSettings {
    pub fn rules(&self) -> QuizRules {
        QuizRules {
            questions_per_attempt: self.questions_per_attempt,
            starting_lives: self.starting_lives,
            question_time_limit_seconds: self.question_time_limit_seconds,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.attempt_retention_seconds)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let problem = if self.questions_per_attempt == 0 {
            Some("quiz.questions_per_attempt must be at least 1")
        } else if self.starting_lives == 0 {
            Some("quiz.starting_lives must be at least 1")
        } else if self.question_time_limit_seconds == 0 {
            Some("quiz.question_time_limit_seconds must be at least 1")
        } else if self.tick_interval_ms == 0 {
            Some("quiz.tick_interval_ms must be at least 1")
        } else if self.default_points == 0 {
            Some("quiz.default_points must be at least 1")
        } else {
            None
        };
        match problem {
            Some(message) => Err(config::ConfigError::Message(message.to_string())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub mongo_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    /// `username:password` for the metrics endpoint.
    pub metrics_auth: String,
    pub quiz: QuizSettings,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "codegaming".to_string());

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            Err(_) => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            }
        };

        let metrics_auth = settings
            .get_string("metrics.auth")
            .or_else(|_| env::var("METRICS_AUTH"))
            .unwrap_or_else(|_| "admin:changeme".to_string());

        let quiz = match settings.get::<QuizSettings>("quiz") {
            Ok(quiz) => quiz,
            Err(config::ConfigError::NotFound(_)) => QuizSettings::default(),
            Err(e) => return Err(e),
        };
        quiz.validate()?;

        Ok(Config {
            bind_addr,
            mongo_uri,
            mongo_database,
            jwt_secret,
            metrics_auth,
            quiz,
        })
    }

    /// Configuration for in-process runs without external services.
    pub fn for_tests() -> Self {
        Config {
            bind_addr: "127.0.0.1:0".to_string(),
            mongo_uri: String::new(),
            mongo_database: "codegaming_test".to_string(),
            jwt_secret: "test-secret".to_string(),
            metrics_auth: "admin:changeme".to_string(),
            quiz: QuizSettings {
                question_source: QuestionSource::File,
                shuffle_questions: false,
                timer_driver: TimerDriver::Client,
                ..QuizSettings::default()
            },
        }
    }
}
