//! Retransmission deadline and worker wake-up timing.
//!
//! Reliable delivery requires that unacknowledged frames are re-sent if no
//! acknowledgement arrives within a bounded time.  This module provides:
//! - [`TimerConfig`]: the retransmission timeout and the idle poll interval.
//! - [`RetransmitTimer`]: one deadline shared by a sender's whole window.
//!
//! Unlike a per-segment RTO there is no RTT estimation and no back-off: the
//! timeout is a fixed interval from the moment the timer was last armed.

use std::time::Duration;

use tokio::time::Instant;

/// Default time a window may stay unacknowledged before it is re-sent.
pub const DEFAULT_RETRANSMIT_TIMEOUT: Duration = Duration::from_millis(90);

/// Default interval after which an idle worker wakes up on its own.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timing parameters for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Interval between arming the timer and retransmitting the window.
    pub retransmit_timeout: Duration,
    /// Longest a worker sleeps without an external wake-up.
    pub poll_interval: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            retransmit_timeout: DEFAULT_RETRANSMIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// A single retransmission deadline.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl RetransmitTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Arm (or re-arm) the timer to fire one timeout after `now`.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.timeout);
    }

    pub fn clear(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `true` once `now` has reached an armed deadline.
    pub fn expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    /// When a worker polling every `poll` should next wake up: the earlier of
    /// the poll deadline and the armed retransmission deadline.
    pub fn next_wake(&self, now: Instant, poll: Duration) -> Instant {
        let poll_at = now + poll;
        match self.deadline {
            Some(d) => d.min(poll_at),
            None => poll_at,
        }
    }
}
