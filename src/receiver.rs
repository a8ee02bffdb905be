//! Sliding-window receive-side state machine.
//!
//! [`ReceiverState`] implements the receiver side of the link:
//!
//! - Only frames whose sequence number lies in `(LFR, LAF]` are accepted;
//!   with the default `RWS = 1` that means strictly the next frame.
//! - Frames are broadcast to every receiver, so a receiver also slides its
//!   window over in-window frames addressed to somebody else.
//! - A per-source table of the next expected sequence number suppresses
//!   re-delivery independently of the window.
//! - Start / continuation / final fragments are reassembled into one message.
//! - **Every** frame that passes the checksum is acknowledged, accepted or
//!   not; corrupt frames are dropped without an ack so the sender times out.
//!
//! This module only manages state; sending acks and surfacing deliveries is
//! the caller's responsibility.

use std::collections::HashMap;
use std::fmt;

use crate::frame::{Frame, FrameKind, WireFrame};

/// Initial value of `LFR`; the first acceptable frame is therefore 0.
const LFR_START: u8 = u8::MAX;

/// Upper bound on the up-front reservation for a reassembled message.  Larger
/// announced lengths grow the buffer as fragments arrive.
const MAX_PREALLOC: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// A complete message surfaced to the application by receiver `receiver`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub receiver: u16,
    pub message: Vec<u8>,
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<RECV_{}>:[{}]",
            self.receiver,
            String::from_utf8_lossy(&self.message)
        )
    }
}

/// Result of feeding one inbound buffer to a [`ReceiverState`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Received {
    /// Encoded acknowledgement to send back, if the frame passed the checksum.
    pub ack: Option<WireFrame>,
    /// Message completed by this frame, if any.
    pub delivery: Option<Delivery>,
}

// ---------------------------------------------------------------------------
// Reassembly
// ---------------------------------------------------------------------------

/// An in-progress multi-frame message.
#[derive(Debug)]
struct Reassembly {
    /// Total length announced by the start frame.
    expected: usize,
    body: Vec<u8>,
}

impl Reassembly {
    fn start(expected: usize, first: &[u8]) -> Self {
        let mut body = Vec::new();
        let reserve = expected.min(MAX_PREALLOC).max(first.len());
        if body.try_reserve_exact(reserve).is_err() {
            log::error!("cannot reserve {reserve} bytes for reassembly; aborting");
            std::process::abort();
        }
        body.extend_from_slice(first);
        Self { expected, body }
    }

    fn finish(mut self, receiver: u16) -> Vec<u8> {
        if self.body.len() != self.expected {
            log::warn!(
                "[rcv:{}] reassembled {} bytes, start frame announced {}",
                receiver,
                self.body.len(),
                self.expected
            );
            if self.body.len() > self.expected {
                self.body.truncate(self.expected);
            }
        }
        self.body
    }
}

// ---------------------------------------------------------------------------
// ReceiverState
// ---------------------------------------------------------------------------

/// Receive-side protocol state for one receiver endpoint.
#[derive(Debug)]
pub struct ReceiverState {
    id: u16,

    /// Last frame received.
    pub lfr: u8,

    /// Last acceptable frame; always `LFR + RWS`.
    pub laf: u8,

    /// Receive window size (RWS).
    rws: u8,

    /// Source id → next sequence number that has not been delivered yet.
    next_expected: HashMap<u16, u8>,

    /// Message being reassembled, owned here until the final fragment.
    reassembly: Option<Reassembly>,
}

impl ReceiverState {
    pub fn new(id: u16, rws: u8) -> Self {
        assert!(rws >= 1, "receiver window must be at least 1");
        Self {
            id,
            lfr: LFR_START,
            laf: LFR_START.wrapping_add(rws),
            rws,
            next_expected: HashMap::new(),
            reassembly: None,
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    /// `true` when `seq` lies in `(LFR, LAF]`, modulo 256.
    pub fn in_window(&self, seq: u8) -> bool {
        let offset = seq.wrapping_sub(self.lfr);
        offset >= 1 && offset <= self.laf.wrapping_sub(self.lfr)
    }

    /// `true` when a multi-frame message is partially reassembled.
    pub fn reassembling(&self) -> bool {
        self.reassembly.is_some()
    }

    /// Process one inbound buffer from the transport.
    pub fn on_frame(&mut self, buf: &[u8]) -> Received {
        let frame = match Frame::decode(buf) {
            Ok(f) => f,
            Err(e) => {
                log::debug!("[rcv:{}] ← discarded buffer: {e}", self.id);
                return Received::default();
            }
        };

        let mut delivery = None;
        if self.in_window(frame.seq) {
            self.slide_to(frame.seq);
            if frame.dst == self.id {
                delivery = self.accept(&frame);
            }
        } else {
            log::trace!(
                "[rcv:{}] ← seq={} outside ({}, {}]",
                self.id,
                frame.seq,
                self.lfr,
                self.laf
            );
        }

        Received {
            ack: Some(frame.to_ack().encode()),
            delivery,
        }
    }

    fn slide_to(&mut self, seq: u8) {
        self.lfr = seq;
        self.laf = self.lfr.wrapping_add(self.rws);
    }

    /// Handle an in-window frame addressed to this receiver.
    fn accept(&mut self, frame: &Frame) -> Option<Delivery> {
        if self.is_duplicate(frame.src, frame.seq) {
            log::debug!(
                "[rcv:{}] ← seq={} from src={} already delivered",
                self.id,
                frame.seq,
                frame.src
            );
            return None;
        }
        self.next_expected.insert(frame.src, frame.seq.wrapping_add(1));

        let chunk = frame.chunk();
        log::debug!(
            "[rcv:{}] ← {:?} seq={} src={} len={}",
            self.id,
            frame.kind,
            frame.seq,
            frame.src,
            chunk.len()
        );

        let message = match frame.kind {
            FrameKind::Data => Some(chunk.to_vec()),
            FrameKind::Start => {
                if self.reassembly.is_some() {
                    log::warn!("[rcv:{}] start frame abandons unfinished message", self.id);
                }
                self.reassembly = Some(Reassembly::start(frame.msg_len as usize, chunk));
                None
            }
            FrameKind::Continuation => {
                match self.reassembly.as_mut() {
                    Some(r) => r.body.extend_from_slice(chunk),
                    None => log::warn!("[rcv:{}] continuation without start; dropped", self.id),
                }
                None
            }
            FrameKind::Final => match self.reassembly.take() {
                Some(mut r) => {
                    r.body.extend_from_slice(chunk);
                    Some(r.finish(self.id))
                }
                None => {
                    log::warn!("[rcv:{}] final fragment without start; dropped", self.id);
                    None
                }
            },
            FrameKind::Ack => None,
        };

        message.map(|message| Delivery {
            receiver: self.id,
            message,
        })
    }

    /// `true` when `seq` from `src` is one of the last `RWS` sequence numbers
    /// already delivered.  Anything further back can no longer be in the
    /// window, so a stale table entry never hides a fresh frame.
    fn is_duplicate(&self, src: u16, seq: u8) -> bool {
        match self.next_expected.get(&src) {
            Some(&next) => next.wrapping_sub(seq).wrapping_sub(1) < self.rws,
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
