//! Link-wide configuration.
//!
//! [`LinkConfig`] describes how many endpoints exist, how hostile the
//! simulated link is, and the protocol's window and timing parameters.  The
//! CLI fills one in from flags; tests build one directly.

use std::time::Duration;

use thiserror::Error;

use crate::timer::{TimerConfig, DEFAULT_POLL_INTERVAL, DEFAULT_RETRANSMIT_TIMEOUT};

/// Largest window either side may use.  Keeps every in-flight sequence number
/// within half of the 8-bit sequence space.
pub const MAX_WINDOW: u8 = 127;

/// Most bits the simulator may flip in one corrupted frame.
pub const MAX_CORRUPTION_BITS: u32 = 512;

pub const DEFAULT_SENDER_WINDOW: u8 = 4;
pub const DEFAULT_RECEIVER_WINDOW: u8 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    /// Number of sender endpoints (ids `0..senders`).
    pub senders: u16,
    /// Number of receiver endpoints (ids `0..receivers`).
    pub receivers: u16,
    /// Probability that any forwarded copy is dropped.
    pub drop_prob: f64,
    /// Probability that a copy that was not dropped is corrupted.
    pub corrupt_prob: f64,
    /// Bits flipped in a corrupted copy.
    pub corruption_bits: u32,
    /// Sender window size (SWS).
    pub sender_window: u8,
    /// Receiver window size (RWS).
    pub receiver_window: u8,
    pub retransmit_timeout: Duration,
    pub poll_interval: Duration,
    /// Seed for the simulator's RNG; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            senders: 1,
            receivers: 1,
            drop_prob: 0.0,
            corrupt_prob: 0.0,
            corruption_bits: 1,
            sender_window: DEFAULT_SENDER_WINDOW,
            receiver_window: DEFAULT_RECEIVER_WINDOW,
            retransmit_timeout: DEFAULT_RETRANSMIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            seed: None,
        }
    }
}

impl LinkConfig {
    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.senders == 0 {
            return Err(ConfigError::NoEndpoints("sender"));
        }
        if self.receivers == 0 {
            return Err(ConfigError::NoEndpoints("receiver"));
        }
        for (name, p) in [("drop", self.drop_prob), ("corrupt", self.corrupt_prob)] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Probability { name, value: p });
            }
        }
        if !(1..=MAX_CORRUPTION_BITS).contains(&self.corruption_bits) {
            return Err(ConfigError::CorruptionBits(self.corruption_bits));
        }
        for (name, w) in [("sender", self.sender_window), ("receiver", self.receiver_window)] {
            if !(1..=MAX_WINDOW).contains(&w) {
                return Err(ConfigError::Window { name, value: w });
            }
        }
        if self.retransmit_timeout.is_zero() || self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    pub fn timer(&self) -> TimerConfig {
        TimerConfig {
            retransmit_timeout: self.retransmit_timeout,
            poll_interval: self.poll_interval,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("at least one {0} is required")]
    NoEndpoints(&'static str),
    #[error("{name} probability must be within [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },
    #[error("corruption bits must be within 1..={max}, got {0}", max = MAX_CORRUPTION_BITS)]
    CorruptionBits(u32),
    #[error("{name} window must be within 1..={max}, got {value}", max = MAX_WINDOW)]
    Window { name: &'static str, value: u8 },
    #[error("timer intervals must be non-zero")]
    ZeroInterval,
}
