use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use chrono::Utc;
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::{
    error::ApiError,
    metrics::SSE_CONNECTIONS_ACTIVE,
    models::{
        timer::{AttemptFinished, TimeExpired, TimerTick},
        AttemptSnapshot, TimerEvent,
    },
    services::AppState,
};

/// SSE endpoint for timer events
/// GET /api/v1/attempts/{id}/stream
pub async fn attempt_stream(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.quiz.snapshot(&attempt_id).await?;
    let poll_interval = state.config.quiz.tick_interval();
    tracing::info!(
        "Client connected to SSE stream: attempt={}, poll={}ms",
        attempt_id,
        poll_interval.as_millis()
    );

    let stream = create_timer_stream(state, attempt_id, snapshot.timeouts, poll_interval);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

struct ConnectionGuard;

impl ConnectionGuard {
    fn open() -> Self {
        SSE_CONNECTIONS_ACTIVE.inc();
        ConnectionGuard
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        SSE_CONNECTIONS_ACTIVE.dec();
    }
}

struct StreamState {
    app: Arc<AppState>,
    attempt_id: String,
    seen_timeouts: u32,
    wait: bool,
    finished: bool,
    _guard: ConnectionGuard,
}

/// Polls the attempt once per tick and turns state changes into events.
fn create_timer_stream(
    app: Arc<AppState>,
    attempt_id: String,
    seen_timeouts: u32,
    poll_interval: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let initial = StreamState {
        app,
        attempt_id,
        seen_timeouts,
        wait: false,
        finished: false,
        _guard: ConnectionGuard::open(),
    };

    stream::unfold(initial, move |mut st| async move {
        loop {
            if st.finished {
                return None;
            }
            if st.wait {
                sleep(poll_interval).await;
            }
            st.wait = true;

            // Evicted attempts end the stream.
            let snapshot = st.app.quiz.snapshot(&st.attempt_id).await.ok()?;

            if let Some(event) = next_event(&mut st, &snapshot) {
                let event = Event::default()
                    .event(event.event_name())
                    .data(event.to_sse_data());
                return Some((Ok(event), st));
            }
        }
    })
}

fn next_event(st: &mut StreamState, snapshot: &AttemptSnapshot) -> Option<TimerEvent> {
    let attempt_id = snapshot.attempt_id.to_string();

    if snapshot.timeouts > st.seen_timeouts {
        st.seen_timeouts = snapshot.timeouts;
        // Report the terminal state right away if this timeout ended the attempt.
        st.wait = !snapshot.status.is_terminal();
        tracing::info!("Timer expired: attempt={}", attempt_id);
        return Some(TimerEvent::TimeExpired(TimeExpired {
            attempt_id,
            question_index: snapshot.current_index.saturating_sub(1),
            lives_remaining: snapshot.lives_remaining,
            timestamp: Utc::now(),
            message: "Time limit exceeded".to_string(),
        }));
    }

    if snapshot.status.is_terminal() {
        st.finished = true;
        return Some(TimerEvent::AttemptFinished(AttemptFinished {
            attempt_id,
            status: snapshot.status,
            score: snapshot.score,
            lives_remaining: snapshot.lives_remaining,
            timestamp: Utc::now(),
        }));
    }

    snapshot.timer.map(|timer| {
        TimerEvent::TimerTick(TimerTick {
            attempt_id,
            question_index: snapshot.current_index,
            remaining_seconds: timer.remaining_seconds,
            total_seconds: timer.limit_seconds,
            timestamp: Utc::now(),
        })
    })
}
