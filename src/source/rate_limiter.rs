//! Fixed-window request limiter, one counter per source.
//!
//! A refused call is skipped for the cycle, never queued or delayed.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::types::SourceId;

/// Limit of `max_requests` per `window_ms` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window_ms: i64,
}

impl RateLimit {
    pub fn new(max_requests: u32, window_ms: i64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }
}

/// Counter state for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub count: u32,
    /// Epoch milliseconds at which the window resets
    pub reset_at_ms: i64,
}

/// Per-source fixed-window limiter.
///
/// The mutex makes each check-and-increment atomic, so concurrent callers for
/// the same source never double count.
#[derive(Debug, Default)]
pub struct RateLimiter {
    limits: HashMap<SourceId, RateLimit>,
    windows: Mutex<HashMap<SourceId, RateLimitWindow>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the limit for a source.
    pub fn with_limit(mut self, source: SourceId, limit: RateLimit) -> Self {
        self.limits.insert(source, limit);
        self
    }

    pub fn limit_for(&self, source: SourceId) -> Option<RateLimit> {
        self.limits.get(&source).copied()
    }

    /// Consume one request slot for `source` if the window allows it.
    pub fn check_and_consume(&self, source: SourceId) -> bool {
        self.check_and_consume_at(source, Utc::now().timestamp_millis())
    }

    /// Same as [`check_and_consume`](Self::check_and_consume) at an explicit time.
    ///
    /// The window only resets once `now_ms` reaches the stored reset time, so a
    /// clock stepping backwards can never reopen a spent window early.
    pub fn check_and_consume_at(&self, source: SourceId, now_ms: i64) -> bool {
        let Some(limit) = self.limits.get(&source) else {
            return true;
        };

        let mut windows = self.windows.lock();
        let window = windows.entry(source).or_insert(RateLimitWindow {
            count: 0,
            reset_at_ms: now_ms + limit.window_ms,
        });

        if now_ms >= window.reset_at_ms {
            window.count = 0;
            window.reset_at_ms = now_ms + limit.window_ms;
            debug!(%source, "Rate limit window reset");
        }

        if window.count >= limit.max_requests {
            warn!(
                %source,
                max = limit.max_requests,
                resets_in_ms = window.reset_at_ms - now_ms,
                "Rate limit reached, skipping cycle"
            );
            return false;
        }

        window.count += 1;
        true
    }

    /// Current window for a source, if any request has been made.
    pub fn window(&self, source: SourceId) -> Option<RateLimitWindow> {
        self.windows.lock().get(&source).cloned()
    }
}
