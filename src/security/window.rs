//! Fixed-window request counter.
//!
//! Holds the tally for one identity. Time is passed in explicitly so the
//! counter can be driven deterministically.

use std::time::{Duration, Instant};

/// Result of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit {
        limit: u64,
        remaining: u64,
        reset_after: Duration,
    },
    Reject {
        limit: u64,
        retry_after: Duration,
    },
}

/// Requests observed in the current window, plus when that window started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    count: u64,
    window_start: Instant,
}

impl WindowCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Whether `now` falls outside `[window_start, window_start + window)`.
    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now < self.window_start || now.duration_since(self.window_start) >= window
    }

    /// Count one request and decide it against `threshold`.
    ///
    /// A rejected request still counts; the tally saturates rather than wraps.
    pub fn hit(&mut self, now: Instant, window: Duration, threshold: u64) -> Decision {
        if self.is_expired(now, window) {
            self.count = 0;
            self.window_start = now;
        }

        self.count = self.count.saturating_add(1);
        let reset_after = (self.window_start + window).saturating_duration_since(now);

        if self.count > threshold {
            Decision::Reject {
                limit: threshold,
                retry_after: reset_after,
            }
        } else {
            Decision::Admit {
                limit: threshold,
                remaining: threshold - self.count,
                reset_after,
            }
        }
    }
}
