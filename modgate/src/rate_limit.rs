//! Sliding-window throttle guarding calls to the inference endpoint.
//!
//! The limiter is purely advisory: it never raises errors, it only answers
//! whether there is room in the current window. Entries older than the
//! window are expired lazily on every read rather than eagerly swept.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Length of the rolling rate window.
const WINDOW_SECS: i64 = 60;

/// Retained-history cap, independent of the window. Prevents unbounded
/// growth if the limiter is written far more often than it is read.
const HISTORY_CAP: usize = 100;

/// Sliding-window request throttle for one rate-limited resource.
///
/// Check-and-record must be atomic when calls are issued concurrently, so
/// the timestamps live behind a single mutex and `try_acquire` performs the
/// pair under one lock. The advisory `can_make_request`/`record_request`
/// split remains available for callers that only want hints.
pub struct RateLimiter {
    ceiling: usize,
    timestamps: Mutex<Vec<DateTime<Utc>>>,
}

impl RateLimiter {
    /// Create a limiter with the given per-minute ceiling.
    pub fn new(requests_per_minute: usize) -> Self {
        Self {
            ceiling: requests_per_minute,
            timestamps: Mutex::new(Vec::new()),
        }
    }

    /// True iff there is room for another request in the current window.
    pub fn can_make_request(&self) -> bool {
        self.can_make_request_at(Utc::now())
    }

    /// Record that a request was just made.
    pub fn record_request(&self) {
        self.record_request_at(Utc::now());
    }

    /// Atomically check for room and record a request if there is any.
    ///
    /// Returns true if the request was recorded. Concurrent callers cannot
    /// all observe "room available" before any of them records itself.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Utc::now())
    }

    /// Seconds until the oldest in-window entry expires, for UI/backoff
    /// hints. Zero when there is room.
    pub fn wait_time(&self) -> Duration {
        self.wait_time_at(Utc::now())
    }

    /// Number of recorded requests inside the current window.
    pub fn requests_in_window(&self) -> usize {
        self.in_window_count(&self.timestamps.lock(), Utc::now())
    }

    fn in_window_count(&self, stamps: &[DateTime<Utc>], now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::seconds(WINDOW_SECS);
        stamps.iter().filter(|ts| **ts > cutoff).count()
    }

    fn can_make_request_at(&self, now: DateTime<Utc>) -> bool {
        let stamps = self.timestamps.lock();
        self.in_window_count(&stamps, now) < self.ceiling
    }

    fn record_request_at(&self, now: DateTime<Utc>) {
        let mut stamps = self.timestamps.lock();
        stamps.push(now);
        if stamps.len() > HISTORY_CAP {
            let excess = stamps.len() - HISTORY_CAP;
            stamps.drain(..excess);
        }
    }

    fn try_acquire_at(&self, now: DateTime<Utc>) -> bool {
        let mut stamps = self.timestamps.lock();
        if self.in_window_count(&stamps, now) >= self.ceiling {
            return false;
        }
        stamps.push(now);
        if stamps.len() > HISTORY_CAP {
            let excess = stamps.len() - HISTORY_CAP;
            stamps.drain(..excess);
        }
        true
    }

    fn wait_time_at(&self, now: DateTime<Utc>) -> Duration {
        let stamps = self.timestamps.lock();
        if self.in_window_count(&stamps, now) < self.ceiling {
            return Duration::ZERO;
        }

        let cutoff = now - chrono::Duration::seconds(WINDOW_SECS);
        let oldest_in_window = stamps.iter().filter(|ts| **ts > cutoff).min();

        match oldest_in_window {
            Some(oldest) => {
                let expires_at = *oldest + chrono::Duration::seconds(WINDOW_SECS);
                (expires_at - now).to_std().unwrap_or(Duration::ZERO)
            }
            None => Duration::ZERO,
        }
    }
}
