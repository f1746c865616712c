use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Database Metrics (MongoDB)
    pub static ref DB_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_operations_total",
        "Total number of database operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref DB_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_operation_duration_seconds",
        "Database operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Quiz Metrics
    pub static ref QUIZ_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_attempts_total",
        "Quiz attempts by lifecycle outcome",
        &["status"]
    )
    .unwrap();

    pub static ref QUIZ_ATTEMPTS_ACTIVE: IntGauge = register_int_gauge!(
        "quiz_attempts_active",
        "Number of attempts currently in progress"
    )
    .unwrap();

    pub static ref QUIZ_ANSWERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_answers_total",
        "Resolved questions by outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref QUIZ_TIMER_EXPIRATIONS_TOTAL: IntCounter = register_int_counter!(
        "quiz_timer_expirations_total",
        "Expert questions resolved by countdown expiry"
    )
    .unwrap();

    pub static ref LEADERBOARD_WRITES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "leaderboard_writes_total",
        "Leaderboard submissions by result",
        &["status"]
    )
    .unwrap();

    pub static ref SSE_CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        "sse_connections_active",
        "Number of active SSE connections"
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track database operation with metrics
pub async fn track_db_operation<F, T>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    DB_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    DB_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

/// Records how a question was resolved.
pub fn record_answer(correct: bool, timed_out: bool) {
    let outcome = match (correct, timed_out) {
        (_, true) => "timeout",
        (true, false) => "correct",
        (false, false) => "wrong",
    };
    QUIZ_ANSWERS_TOTAL.with_label_values(&[outcome]).inc();
    if timed_out {
        QUIZ_TIMER_EXPIRATIONS_TOTAL.inc();
    }
}
