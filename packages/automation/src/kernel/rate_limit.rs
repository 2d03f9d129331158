//! Sliding-window rate limiter.
//!
//! One shared primitive guarding unrelated actions through different keys:
//! the schedule engine throttles dispatch per schedule
//! (`schedule_key(id)`), and account-sensitive actions reuse it with their
//! own keys and windows (email-change: 3 per hour per user).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

pub const EMAIL_CHANGE_MAX_ATTEMPTS: u32 = 3;
pub const EMAIL_CHANGE_WINDOW_MS: i64 = 60 * 60 * 1000;

pub fn schedule_key(schedule_id: Uuid) -> String {
    format!("schedule:{schedule_id}")
}

pub fn email_change_key(user_id: Uuid) -> String {
    format!("user:{user_id}:change-email")
}

/// Tracks attempt counts per key within a sliding window. Attempts outside
/// the window are evicted lazily on the next check for that key.
#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempt for `key` unless the window is already full.
    /// Returns whether the attempt is allowed; a denied attempt is not
    /// counted.
    pub fn check_and_increment(&self, key: &str, window_ms: i64, max_attempts: u32) -> bool {
        self.check_and_increment_at(key, window_ms, max_attempts, Utc::now())
    }

    /// Same as [`check_and_increment`](Self::check_and_increment) with an
    /// explicit clock, for tests and the explicit-`now` engine API.
    pub fn check_and_increment_at(
        &self,
        key: &str,
        window_ms: i64,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> bool {
        let mut windows = self.windows.lock().unwrap();
        let attempts = windows.entry(key.to_string()).or_default();

        let cutoff = now - Duration::milliseconds(window_ms);
        while attempts.front().map(|t| *t <= cutoff).unwrap_or(false) {
            attempts.pop_front();
        }

        if attempts.len() >= max_attempts as usize {
            return false;
        }

        attempts.push_back(now);
        true
    }
}
