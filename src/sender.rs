//! Sliding-window send-side state machine.
//!
//! [`SenderState`] owns one sender endpoint's protocol state: it fragments
//! commands into frames, admits them into a window of at most `SWS`
//! outstanding frames, consumes in-order acknowledgements, and re-sends the
//! whole window when the shared retransmission deadline passes.
//!
//! # Protocol contract
//!
//! - Sequence numbers are 8 bits and wrap at 256.  The first frame carries 0.
//! - `LAR` is the last acknowledged sequence number (exclusive lower bound of
//!   the window) and `LFS` the last frame sent; `LFS - LAR` (mod 256) is the
//!   number of frames in flight and never exceeds `SWS`.
//! - Acknowledgements are **not** cumulative: only an ack for exactly
//!   `LAR + 1` slides the window, one frame at a time.
//! - On timeout every frame in the window is re-sent in ascending order
//!   (go back N) and the deadline is re-armed.
//!
//! This module only manages state; handing encoded frames to the transport is
//! the caller's responsibility.

use tokio::time::Instant;

use crate::command::Command;
use crate::frame::{Frame, FrameKind, WireFrame, PAYLOAD_CAPACITY};
use crate::queue::OrderedQueue;
use crate::timer::RetransmitTimer;

/// Initial value of the sequence counter and both window edges.
const SEQ_START: u8 = u8::MAX;

// ---------------------------------------------------------------------------
// Fragmentation
// ---------------------------------------------------------------------------

/// Split `cmd` into frames, drawing sequence numbers from `next_seq`.
///
/// A message that fits the payload region becomes one data frame.  Anything
/// longer becomes a start frame (carrying the total length), zero or more
/// continuation frames, and a final frame holding the 1..=48 byte tail.
pub fn fragment(cmd: &Command, next_seq: &mut u8) -> Vec<Frame> {
    let mut take_seq = || {
        *next_seq = next_seq.wrapping_add(1);
        *next_seq
    };
    let msg = cmd.message.as_slice();

    if msg.len() <= PAYLOAD_CAPACITY {
        return vec![Frame::new(
            FrameKind::Data,
            take_seq(),
            cmd.src,
            cmd.dst,
            msg.len() as u32,
            msg,
        )];
    }

    let total = msg.len() as u32;
    let mut frames = Vec::with_capacity(msg.len().div_ceil(PAYLOAD_CAPACITY));
    let mut offset = 0;
    while msg.len() - offset > PAYLOAD_CAPACITY {
        let kind = if offset == 0 {
            FrameKind::Start
        } else {
            FrameKind::Continuation
        };
        let msg_len = if kind == FrameKind::Start { total } else { 0 };
        let chunk = &msg[offset..offset + PAYLOAD_CAPACITY];
        frames.push(Frame::new(kind, take_seq(), cmd.src, cmd.dst, msg_len, chunk));
        offset += PAYLOAD_CAPACITY;
    }

    let tail = &msg[offset..];
    frames.push(Frame::new(
        FrameKind::Final,
        take_seq(),
        cmd.src,
        cmd.dst,
        tail.len() as u32,
        tail,
    ));
    frames
}

// ---------------------------------------------------------------------------
// SenderState
// ---------------------------------------------------------------------------

/// Send-side protocol state for one sender endpoint.
///
/// ```text
///        LAR               LFS
///         │                 │
///  ───────┼─────────────────┼──────────────────▶ seq space (mod 256)
///         │ <── window ───▶ │ <── staged ──▶
/// ```
#[derive(Debug)]
pub struct SenderState {
    id: u16,

    /// Last sequence number handed out by fragmentation.
    next_seq: u8,

    /// Last acknowledged frame.
    pub lar: u8,

    /// Last frame sent.
    pub lfs: u8,

    /// Maximum number of frames in flight (SWS).
    sws: u8,

    /// Fragmented frames waiting for a window slot.
    staged: OrderedQueue<Frame>,

    /// Sent but unacknowledged frames, oldest (`LAR + 1`) first.
    window: OrderedQueue<Frame>,

    timer: RetransmitTimer,
}

impl SenderState {
    /// Create the state for sender `id`.
    ///
    /// `sws` is the window size (≥ 1); `timer` carries the retransmission
    /// timeout.
    pub fn new(id: u16, sws: u8, timer: RetransmitTimer) -> Self {
        assert!(sws >= 1, "sender window must be at least 1");
        Self {
            id,
            next_seq: SEQ_START,
            lar: SEQ_START,
            lfs: SEQ_START,
            sws,
            staged: OrderedQueue::new(),
            window: OrderedQueue::with_capacity(sws as usize),
            timer,
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    /// Number of frames sent but not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.window.len()
    }

    /// Number of frames waiting for a window slot.
    pub fn staged(&self) -> usize {
        self.staged.len()
    }

    /// `true` when a staged frame exists and the window has a free slot.
    pub fn can_admit(&self) -> bool {
        !self.staged.is_empty() && self.lfs.wrapping_sub(self.lar) < self.sws
    }

    pub fn timer(&self) -> &RetransmitTimer {
        &self.timer
    }

    /// Fragment `cmd` and append its frames to the staging queue.
    ///
    /// Returns the number of frames produced.  The command is consumed.
    pub fn enqueue(&mut self, cmd: Command) -> usize {
        let frames = fragment(&cmd, &mut self.next_seq);
        let n = frames.len();
        log::debug!(
            "[snd:{}] staged {} frame(s) for dst={} len={}",
            self.id,
            n,
            cmd.dst,
            cmd.message.len()
        );
        self.staged.extend(frames);
        n
    }

    /// Move the oldest staged frame into the window and return its encoding.
    ///
    /// Admits at most one frame per call; returns `None` when nothing is
    /// staged or the window is full.  Arms the retransmission timer when the
    /// window goes from empty to non-empty.
    pub fn admit_next(&mut self, now: Instant) -> Option<WireFrame> {
        if !self.can_admit() {
            return None;
        }
        let frame = self.staged.pop()?;
        self.lfs = frame.seq;
        let wire = frame.encode();
        log::debug!(
            "[snd:{}] → {:?} seq={} dst={} in_flight={}",
            self.id,
            frame.kind,
            frame.seq,
            frame.dst,
            self.window.len() + 1
        );
        if self.window.is_empty() {
            self.timer.arm(now);
        }
        self.window.push(frame);
        Some(wire)
    }

    /// Process one inbound buffer from the transport.
    ///
    /// Returns `true` if it was the acknowledgement for `LAR + 1`, in which
    /// case the window slid by one frame and the timer was cleared.  Corrupt
    /// buffers, acks for other senders, and out-of-order acks change nothing.
    pub fn on_frame(&mut self, buf: &[u8]) -> bool {
        let frame = match Frame::decode(buf) {
            Ok(f) => f,
            Err(e) => {
                log::trace!("[snd:{}] ← discarded buffer: {e}", self.id);
                return false;
            }
        };
        if frame.kind != FrameKind::Ack || frame.src != self.id || self.window.is_empty() {
            return false;
        }

        let expected = self.lar.wrapping_add(1);
        if frame.seq != expected {
            log::trace!(
                "[snd:{}] ← ACK seq={} ignored (expecting {})",
                self.id,
                frame.seq,
                expected
            );
            return false;
        }

        self.window.pop();
        self.lar = expected;
        self.timer.clear();
        log::debug!(
            "[snd:{}] ← ACK seq={} in_flight={}",
            self.id,
            frame.seq,
            self.window.len()
        );
        true
    }

    /// Drive the retransmission timer.
    ///
    /// - Empty window: the timer is cleared and nothing is sent.
    /// - Non-empty window, timer not armed (an ack just cleared it): arm.
    /// - Deadline reached: return every window frame, oldest first, and
    ///   re-arm for the next round.
    pub fn on_tick(&mut self, now: Instant) -> Vec<WireFrame> {
        if self.window.is_empty() {
            self.timer.clear();
            return Vec::new();
        }
        if !self.timer.is_armed() {
            self.timer.arm(now);
            return Vec::new();
        }
        if !self.timer.expired(now) {
            return Vec::new();
        }

        let frames: Vec<WireFrame> = self.window.iter().map(Frame::encode).collect();
        log::debug!(
            "[snd:{}] timeout, retransmitting {} frame(s) seq={}..={}",
            self.id,
            frames.len(),
            self.lar.wrapping_add(1),
            self.lfs
        );
        self.timer.arm(now);
        frames
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const RTO: Duration = Duration::from_millis(90);

    fn sender(sws: u8) -> SenderState {
        SenderState::new(0, sws, RetransmitTimer::new(RTO))
    }

    fn ack(seq: u8, src: u16) -> WireFrame {
        Frame::new(FrameKind::Ack, seq, src, 1, 0, b"").encode()
    }

    fn seqs(frames: &[WireFrame]) -> Vec<u8> {
        frames.iter().map(|w| Frame::decode(w).unwrap().seq).collect()
    }

    /// Admit as many frames as the window allows.
    fn fill(s: &mut SenderState, now: Instant) -> Vec<WireFrame> {
        std::iter::from_fn(|| s.admit_next(now)).collect()
    }

    #[test]
    fn initial_state() {
        let s = sender(4);
        assert_eq!(s.lar, 255);
        assert_eq!(s.lfs, 255);
        assert_eq!(s.in_flight(), 0);
        assert!(!s.can_admit());
        assert!(!s.timer().is_armed());
    }

    #[test]
    fn short_message_is_one_data_frame() {
        let mut seq = 255;
        let frames = fragment(&Command::new(0, 1, "hello"), &mut seq);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Data);
        assert_eq!(frames[0].seq, 0);
        assert_eq!(frames[0].chunk(), b"hello");
        assert_eq!(seq, 0);
    }

    #[test]
    fn exactly_capacity_is_one_data_frame() {
        let mut seq = 255;
        let msg = vec![b'x'; PAYLOAD_CAPACITY];
        let frames = fragment(&Command::new(0, 1, msg.clone()), &mut seq);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Data);
        assert_eq!(frames[0].chunk(), msg.as_slice());
    }

    #[test]
    fn capacity_plus_one_is_start_and_final() {
        let mut seq = 255;
        let msg: Vec<u8> = (0..PAYLOAD_CAPACITY as u8 + 1).map(|b| b'a' + b % 26).collect();
        let frames = fragment(&Command::new(0, 1, msg.clone()), &mut seq);
        let kinds: Vec<_> = frames.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FrameKind::Start, FrameKind::Final]);
        assert_eq!(frames[0].msg_len, 49);
        assert_eq!(frames[1].chunk(), &msg[48..]);
        assert_eq!(seq, 1);
    }

    #[test]
    fn long_message_fragments_in_order() {
        let mut seq = 10;
        let msg = vec![b'z'; PAYLOAD_CAPACITY * 4 + 10];
        let frames = fragment(&Command::new(2, 3, msg), &mut seq);
        let kinds: Vec<_> = frames.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FrameKind::Start,
                FrameKind::Continuation,
                FrameKind::Continuation,
                FrameKind::Continuation,
                FrameKind::Final,
            ]
        );
        let seqs: Vec<_> = frames.iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![11, 12, 13, 14, 15]);
        assert_eq!(frames[4].chunk().len(), 10);
        assert!(frames.iter().all(|f| f.src == 2 && f.dst == 3));
    }

    #[test]
    fn exact_multiple_puts_full_chunk_in_final() {
        let mut seq = 255;
        let frames = fragment(&Command::new(0, 0, vec![1u8; PAYLOAD_CAPACITY * 2]), &mut seq);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].kind, FrameKind::Final);
        assert_eq!(frames[1].chunk().len(), PAYLOAD_CAPACITY);
    }

    #[test]
    fn sequence_counter_wraps() {
        let mut seq = 254;
        let frames = fragment(&Command::new(0, 0, vec![0u8; PAYLOAD_CAPACITY * 3]), &mut seq);
        let seqs: Vec<_> = frames.iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![255, 0, 1]);
    }

    #[test]
    fn window_bound_holds_until_ack() {
        let t0 = Instant::now();
        let mut s = sender(4);
        for i in 0..5 {
            s.enqueue(Command::new(0, 1, format!("m{i}")));
        }

        let sent = fill(&mut s, t0);
        assert_eq!(seqs(&sent), vec![0, 1, 2, 3]);
        assert_eq!(s.in_flight(), 4);
        assert_eq!(s.staged(), 1);
        assert!(s.admit_next(t0).is_none());

        assert!(s.on_frame(&ack(0, 0)));
        let fifth = s.admit_next(t0).expect("slot opened");
        assert_eq!(seqs(&[fifth]), vec![4]);
        assert_eq!(s.lar, 0);
        assert_eq!(s.lfs, 4);
    }

    #[test]
    fn admits_one_frame_per_call() {
        let t0 = Instant::now();
        let mut s = sender(4);
        s.enqueue(Command::new(0, 1, "a"));
        s.enqueue(Command::new(0, 1, "b"));
        assert!(s.admit_next(t0).is_some());
        assert_eq!(s.in_flight(), 1);
        assert_eq!(s.staged(), 1);
    }

    #[test]
    fn out_of_order_ack_is_ignored() {
        let t0 = Instant::now();
        let mut s = sender(4);
        for _ in 0..3 {
            s.enqueue(Command::new(0, 1, "x"));
        }
        fill(&mut s, t0);
        let deadline = s.timer().deadline();

        assert!(!s.on_frame(&ack(1, 0)));
        assert!(!s.on_frame(&ack(2, 0)));
        assert_eq!(s.lar, 255);
        assert_eq!(s.in_flight(), 3);
        assert_eq!(s.timer().deadline(), deadline);
    }

    #[test]
    fn ack_for_other_sender_or_non_ack_is_ignored() {
        let t0 = Instant::now();
        let mut s = sender(4);
        s.enqueue(Command::new(0, 1, "x"));
        fill(&mut s, t0);

        assert!(!s.on_frame(&ack(0, 7)));
        let data = Frame::new(FrameKind::Data, 0, 0, 1, 1, b"x").encode();
        assert!(!s.on_frame(&data));
        assert_eq!(s.in_flight(), 1);
    }

    #[test]
    fn corrupt_ack_is_ignored() {
        let t0 = Instant::now();
        let mut s = sender(4);
        s.enqueue(Command::new(0, 1, "x"));
        fill(&mut s, t0);

        let mut bad = ack(0, 0);
        bad[1] ^= 0x04;
        assert!(!s.on_frame(&bad));
        assert_eq!(s.in_flight(), 1);
        assert!(s.timer().is_armed());
    }

    #[test]
    fn valid_ack_clears_timer() {
        let t0 = Instant::now();
        let mut s = sender(4);
        s.enqueue(Command::new(0, 1, "x"));
        s.enqueue(Command::new(0, 1, "y"));
        fill(&mut s, t0);
        assert!(s.timer().is_armed());

        assert!(s.on_frame(&ack(0, 0)));
        assert!(!s.timer().is_armed());

        // The next tick re-arms for the frame still outstanding.
        assert!(s.on_tick(t0 + Duration::from_millis(10)).is_empty());
        assert_eq!(s.timer().deadline(), Some(t0 + Duration::from_millis(10) + RTO));
    }

    #[test]
    fn timeout_resends_window_once_per_expiry() {
        let t0 = Instant::now();
        let mut s = sender(4);
        for _ in 0..3 {
            s.enqueue(Command::new(0, 1, "x"));
        }
        fill(&mut s, t0);

        assert!(s.on_tick(t0 + Duration::from_millis(89)).is_empty());

        let first = s.on_tick(t0 + RTO);
        assert_eq!(seqs(&first), vec![0, 1, 2]);
        assert!(s.on_tick(t0 + RTO + Duration::from_millis(1)).is_empty());

        let second = s.on_tick(t0 + RTO * 2);
        assert_eq!(seqs(&second), vec![0, 1, 2]);
    }

    #[test]
    fn timeout_after_partial_ack_resends_remaining() {
        let t0 = Instant::now();
        let mut s = sender(4);
        for _ in 0..4 {
            s.enqueue(Command::new(0, 1, "x"));
        }
        fill(&mut s, t0);
        assert!(s.on_frame(&ack(0, 0)));
        assert!(s.on_frame(&ack(1, 0)));

        let t1 = t0 + Duration::from_millis(5);
        assert!(s.on_tick(t1).is_empty());
        assert_eq!(seqs(&s.on_tick(t1 + RTO)), vec![2, 3]);
    }

    #[test]
    fn drained_window_clears_timer() {
        let t0 = Instant::now();
        let mut s = sender(4);
        s.enqueue(Command::new(0, 1, "x"));
        fill(&mut s, t0);
        assert!(s.on_frame(&ack(0, 0)));
        assert!(s.on_tick(t0 + RTO * 3).is_empty());
        assert!(!s.timer().is_armed());
    }

    #[test]
    fn window_slides_across_sequence_wrap() {
        let t0 = Instant::now();
        let mut s = sender(4);
        // Walk the counter near the wrap point one frame at a time.
        for seq in 0..=253u8 {
            s.enqueue(Command::new(0, 1, "w"));
            s.admit_next(t0).unwrap();
            assert!(s.on_frame(&ack(seq, 0)));
        }
        for _ in 0..4 {
            s.enqueue(Command::new(0, 1, "w"));
        }
        assert_eq!(seqs(&fill(&mut s, t0)), vec![254, 255, 0, 1]);
        assert!(s.on_frame(&ack(254, 0)));
        assert!(s.on_frame(&ack(255, 0)));
        assert!(s.on_frame(&ack(0, 0)));
        assert_eq!(s.lar, 0);
        assert_eq!(s.in_flight(), 1);
    }
}
