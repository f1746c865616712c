#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use codegaming_quiz_api::{
    config::{Config, TimerDriver},
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    models::{Difficulty, Question},
    services::{
        leaderboard_service::InMemoryLeaderboardStore, question_bank::InMemoryQuestionBank,
        AppState,
    },
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const QUESTIONS_PER_DIFFICULTY: usize = 40;

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub leaderboard: Arc<InMemoryLeaderboardStore>,
}

/// Every question answers with choice 0 and is worth 30 points.
pub fn seed_questions(per_difficulty: usize) -> Vec<Question> {
    Difficulty::all()
        .into_iter()
        .flat_map(|difficulty| {
            (0..per_difficulty).map(move |i| Question {
                id: format!("{}-{:02}", difficulty.as_str(), i),
                difficulty,
                prompt: format!("{} question {}", difficulty.as_str(), i),
                choices: vec![
                    "right".to_string(),
                    "wrong".to_string(),
                    "also wrong".to_string(),
                    "still wrong".to_string(),
                ],
                correct_choice: 0,
                points: 30,
            })
        })
        .collect()
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::for_tests(), QUESTIONS_PER_DIFFICULTY)
}

pub fn create_server_timed_app() -> TestApp {
    let mut config = Config::for_tests();
    config.quiz.timer_driver = TimerDriver::Server;
    create_test_app_with(config, QUESTIONS_PER_DIFFICULTY)
}

pub fn create_test_app_with(config: Config, per_difficulty: usize) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let bank = Arc::new(InMemoryQuestionBank::new(seed_questions(per_difficulty)));
    let leaderboard = Arc::new(InMemoryLeaderboardStore::new());
    let state = Arc::new(AppState::with_stores(config, bank, leaderboard.clone()));

    TestApp {
        router: create_router(state.clone()),
        state,
        leaderboard,
    }
}

pub fn token_for(app: &TestApp, user_id: &str, role: &str) -> String {
    JwtService::new(&app.state.config.jwt_secret)
        .generate_token(&JwtClaims::new(user_id, role, 3600))
        .unwrap()
}

pub fn named_token_for(app: &TestApp, user_id: &str, name: &str) -> String {
    JwtService::new(&app.state.config.jwt_secret)
        .generate_token(&JwtClaims::new(user_id, "player", 3600).with_name(name))
        .unwrap()
}

pub async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}

/// Starts a guest attempt and returns its id.
pub async fn start_guest(app: &TestApp, difficulty: &str, nickname: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/attempts",
        Some(serde_json::json!({ "difficulty": difficulty, "nickname": nickname })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "start failed: {}", body);
    body["attempt_id"].as_str().unwrap().to_string()
}

pub async fn answer(
    app: &TestApp,
    attempt_id: &str,
    question_index: usize,
    choice: usize,
) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        &format!("/api/v1/attempts/{}/answers", attempt_id),
        Some(serde_json::json!({ "question_index": question_index, "choice": choice })),
        None,
    )
    .await
}
