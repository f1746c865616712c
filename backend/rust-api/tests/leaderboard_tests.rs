use axum::http::StatusCode;

mod common;

use common::{answer, named_token_for, send, start_guest, token_for, TestApp};

/// Plays a full attempt answering the first `correct` questions right and the
/// rest wrong until the attempt ends.
async fn play(app: &TestApp, difficulty: &str, nickname: &str, correct: usize) -> String {
    let id = start_guest(app, difficulty, nickname).await;
    for i in 0..40 {
        let choice = if i < correct { 0 } else { 1 };
        let (status, body) = answer(app, &id, i, choice).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        if body["game_over"] == true {
            break;
        }
    }
    id
}

#[tokio::test]
async fn test_leaderboard_ranks_finished_attempts() {
    let app = common::create_test_app();
    play(&app, "beginner", "low", 5).await;
    play(&app, "beginner", "high", 40).await;
    play(&app, "beginner", "mid", 36).await;
    play(&app, "intermediate", "other", 40).await;

    let (status, body) = send(
        &app,
        "GET",
        "/api/v1/leaderboard?difficulty=beginner&limit=2",
        None,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["display_name"], "high");
    assert_eq!(entries[0]["score"], 1200);
    assert_eq!(entries[0]["status"], "completed");
    assert_eq!(entries[1]["display_name"], "mid");

    let (_, all) = send(&app, "GET", "/api/v1/leaderboard", None, None).await;
    assert_eq!(all["entries"].as_array().unwrap().len(), 4);
    assert_eq!(all["limit"], 10);
}

#[tokio::test]
async fn test_leaderboard_query_is_validated() {
    let app = common::create_test_app();

    let (status, body) = send(&app, "GET", "/api/v1/leaderboard?limit=500", None, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["limit"].is_array());

    let (status, body) = send(
        &app,
        "GET",
        "/api/v1/leaderboard?difficulty=legendary",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_difficulty");
}

#[tokio::test]
async fn test_repeated_submission_stores_one_entry() {
    let app = common::create_test_app();
    let id = play(&app, "expert", "Bo", 40).await;
    let uri = format!("/api/v1/attempts/{}/leaderboard", id);

    for _ in 0..3 {
        let (status, body) = send(&app, "POST", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["leaderboard"], "already_recorded");
    }
    assert_eq!(app.leaderboard.len().await, 1);
}

#[tokio::test]
async fn test_failed_write_is_reported_and_redeliverable() {
    let app = common::create_test_app();
    app.leaderboard.fail_next_writes(usize::MAX);

    let id = start_guest(&app, "intermediate", "Cy").await;
    let mut last = serde_json::Value::Null;
    for i in 0..7 {
        last = answer(&app, &id, i, 1).await.1;
    }
    assert_eq!(last["status"], "failed");
    assert_eq!(last["leaderboard"], "write_failed");
    assert!(app.leaderboard.is_empty().await);

    let uri = format!("/api/v1/attempts/{}/leaderboard", id);
    let (status, body) = send(&app, "POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "leaderboard_write_failed");

    app.leaderboard.fail_next_writes(0);
    let (status, body) = send(&app, "POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["leaderboard"], "recorded");

    let (_, body) = send(&app, "POST", &uri, None, None).await;
    assert_eq!(body["leaderboard"], "already_recorded");
    assert_eq!(app.leaderboard.len().await, 1);
}

#[tokio::test]
async fn test_unfinished_attempt_cannot_be_submitted() {
    let app = common::create_test_app();
    let id = start_guest(&app, "beginner", "Ava").await;
    let uri = format!("/api/v1/attempts/{}/leaderboard", id);

    let (status, _) = send(&app, "POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    send(&app, "POST", &format!("/api/v1/attempts/{}/abandon", id), None, None).await;
    let (status, _) = send(&app, "POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(app.leaderboard.is_empty().await);
}

#[tokio::test]
async fn test_account_entries_show_public_names() {
    let app = common::create_test_app();
    let named = named_token_for(&app, "acct-0001-secret", "Ferris");
    let anonymous = token_for(&app, "acct-0002-secret", "player");

    for token in [&named, &anonymous] {
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/attempts",
            Some(serde_json::json!({ "difficulty": "beginner" })),
            Some(token),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let id = body["attempt_id"].as_str().unwrap().to_string();
        for i in 0..7 {
            answer(&app, &id, i, 1).await;
        }
    }

    let (_, body) = send(&app, "GET", "/api/v1/leaderboard", None, None).await;
    let names: Vec<_> = body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["display_name"].as_str().unwrap().to_string())
        .collect();
    assert!(names.contains(&"Ferris".to_string()), "{:?}", names);
    assert!(names.contains(&"player-cret".to_string()), "{:?}", names);
    assert!(names.iter().all(|name| !name.contains("acct-")));
}
