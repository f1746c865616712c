use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics;
use crate::services::AppState;

const DEPENDENCY_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut dependencies = serde_json::Map::new();

    let questions = check_dependency(state.questions.ping()).await;
    let leaderboard = check_dependency(state.leaderboard.ping()).await;
    let all_healthy = [&questions, &leaderboard]
        .iter()
        .all(|d| d.get("status").and_then(|v| v.as_str()) == Some("healthy"));
    dependencies.insert("questions".to_string(), json!(questions));
    dependencies.insert("leaderboard".to_string(), json!(leaderboard));

    let (status_code, status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "codegaming-quiz-api",
            "version": env!("CARGO_PKG_VERSION"),
            "question_source": state.questions.source_name(),
            "attempts_registered": state.quiz.registered_count().await,
            "dependencies": dependencies
        })),
    )
}

async fn check_dependency<F>(ping: F) -> serde_json::Map<String, serde_json::Value>
where
    F: Future<Output = anyhow::Result<()>>,
{
    let mut result = serde_json::Map::new();

    match tokio::time::timeout(DEPENDENCY_TIMEOUT, ping).await {
        Ok(Ok(())) => {
            result.insert("status".to_string(), json!("healthy"));
        }
        Ok(Err(e)) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(format!("{:#}", e)));
        }
        Err(_) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!("timeout after 1s"));
        }
    }

    result
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// Metrics authentication middleware - protects /metrics endpoint with HTTP Basic Auth
pub async fn metrics_auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    if credentials != state.config.metrics_auth {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

pub mod admin;
pub mod attempts;
pub mod leaderboard;
pub mod sse;
