use axum::{
    http::{header, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler).layer(middleware::from_fn_with_state(
                app_state.clone(),
                handlers::metrics_auth_middleware,
            )),
        )
        .merge(quiz_routes(app_state.clone()))
        .route(
            "/api/v1/leaderboard",
            get(handlers::leaderboard::top_entries),
        )
        .nest(
            "/admin",
            admin_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Attempt lifecycle. Guests play without a token; a bearer token, when sent,
/// must be valid.
fn quiz_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/attempts", post(handlers::attempts::start_attempt))
        .route("/api/v1/attempts/{id}", get(handlers::attempts::get_attempt))
        .route(
            "/api/v1/attempts/{id}/question",
            get(handlers::attempts::current_question),
        )
        .route(
            "/api/v1/attempts/{id}/answers",
            post(handlers::attempts::submit_answer),
        )
        .route("/api/v1/attempts/{id}/tick", post(handlers::attempts::tick))
        .route(
            "/api/v1/attempts/{id}/abandon",
            post(handlers::attempts::abandon_attempt),
        )
        .route(
            "/api/v1/attempts/{id}/leaderboard",
            post(handlers::attempts::submit_leaderboard),
        )
        .route(
            "/api/v1/attempts/{id}/stream",
            get(handlers::sse::attempt_stream),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::optional_auth_middleware,
        ))
}

fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/questions/{id}",
            patch(handlers::admin::update_question),
        )
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
}
