//! Lossy in-memory link between senders and receivers.
//!
//! Real networks drop and damage frames.  To exercise the reliability
//! mechanisms without a real network, the [`Simulator`] stands between the
//! endpoints and applies a configurable fault model to every copy it forwards:
//!
//! | Fault       | Description                                              |
//! |-------------|----------------------------------------------------------|
//! | Loss        | Drop the copy with probability `drop_prob`.              |
//! | Corruption  | Flip `corruption_bits` distinct random bits with         |
//! |             | probability `corrupt_prob` (only if not dropped).        |
//!
//! Every frame is broadcast: each endpoint of the target role gets its own
//! independently faulted copy.  Addressing is the engines' job.
//!
//! The RNG is seeded from [`LinkConfig::seed`] when set, so a failing run can
//! be replayed exactly.

use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::LinkConfig;
use crate::endpoint::Transport;
use crate::frame::{WireFrame, FRAME_LEN};
use crate::registry::Registry;

/// Fault-model parameters, copied out of [`LinkConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Faults {
    pub drop_prob: f64,
    pub corrupt_prob: f64,
    pub corruption_bits: u32,
}

impl Faults {
    pub fn from_config(cfg: &LinkConfig) -> Self {
        Self {
            drop_prob: cfg.drop_prob,
            corrupt_prob: cfg.corrupt_prob,
            corruption_bits: cfg.corruption_bits,
        }
    }

    /// A link that neither drops nor corrupts.
    pub fn lossless() -> Self {
        Self {
            drop_prob: 0.0,
            corrupt_prob: 0.0,
            corruption_bits: 1,
        }
    }
}

pub struct Simulator {
    registry: Arc<Registry>,
    faults: Faults,
    rng: Mutex<StdRng>,
}

impl Simulator {
    pub fn new(registry: Arc<Registry>, faults: Faults, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            registry,
            faults,
            rng: Mutex::new(rng),
        }
    }

    /// Apply the fault model to one copy.  `None` means the copy was lost.
    fn impair(&self, mut frame: WireFrame) -> Option<WireFrame> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);

        if rng.random_bool(self.faults.drop_prob) {
            log::trace!("[sim] dropped copy of seq={}", frame[1]);
            return None;
        }
        if rng.random_bool(self.faults.corrupt_prob) {
            let bits = (self.faults.corruption_bits as usize).min(FRAME_LEN * 8);
            for bit in rand::seq::index::sample(&mut *rng, FRAME_LEN * 8, bits) {
                frame[bit / 8] ^= 0x80 >> (bit % 8);
            }
            log::trace!("[sim] corrupted {bits} bit(s) of seq={}", frame[1]);
        }
        Some(frame)
    }
}

impl Transport for Simulator {
    fn send_to_receivers(&self, frame: WireFrame) {
        for receiver in self.registry.receivers() {
            if let Some(copy) = self.impair(frame) {
                receiver.push_frame(copy);
            }
        }
    }

    fn send_to_senders(&self, frame: WireFrame) {
        for sender in self.registry.senders() {
            if let Some(copy) = self.impair(frame) {
                sender.push_frame(copy);
            }
        }
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("faults", &self.faults)
            .finish_non_exhaustive()
    }
}
