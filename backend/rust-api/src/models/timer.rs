use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AttemptStatus;

/// Per-question countdown for expert attempts. One tick is one second.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerState {
    pub remaining_seconds: u32,
    pub limit_seconds: u32,
}

impl TimerState {
    pub fn new(limit_seconds: u32) -> Self {
        let limit_seconds = limit_seconds.max(1);
        Self {
            remaining_seconds: limit_seconds,
            limit_seconds,
        }
    }

    pub fn restart(&mut self) {
        self.remaining_seconds = self.limit_seconds;
    }

    /// Counts one second down and reports whether the question just ran out of time.
    pub fn tick(&mut self) -> bool {
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        self.remaining_seconds == 0
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.limit_seconds - self.remaining_seconds
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TimerEvent {
    TimerTick(TimerTick),
    TimeExpired(TimeExpired),
    AttemptFinished(AttemptFinished),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimerTick {
    pub attempt_id: String,
    pub question_index: usize,
    pub remaining_seconds: u32,
    pub total_seconds: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimeExpired {
    pub attempt_id: String,
    pub question_index: usize,
    pub lives_remaining: u32,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AttemptFinished {
    pub attempt_id: String,
    pub status: AttemptStatus,
    pub score: u32,
    pub lives_remaining: u32,
    pub timestamp: DateTime<Utc>,
}

impl TimerEvent {
    pub fn to_sse_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            TimerEvent::TimerTick(_) => "timer-tick",
            TimerEvent::TimeExpired(_) => "time-expired",
            TimerEvent::AttemptFinished(_) => "attempt-finished",
        }
    }
}
