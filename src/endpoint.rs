//! Per-endpoint worker loops.
//!
//! # Architecture
//!
//! ```text
//!  command source ──push_command──┐        ┌── push_frame ◀── Transport
//!                                 ▼        ▼
//!                        ┌──────────────────────────┐
//!                        │ Mutex<SenderInner>       │  one lock per endpoint
//!                        │   commands / frames      │
//!                        │   SenderState            │
//!                        └────────────┬─────────────┘
//!                                     │ Notify / poll / retransmit deadline
//!                                     ▼
//!                              worker task (run)
//!                                     │ encoded frames, lock released
//!                                     ▼
//!                                 Transport
//! ```
//!
//! Receivers have the same shape with a single inbound frame queue and a
//! delivery channel instead of a command queue.
//!
//! Each worker pass takes the lock, drains its queues into the protocol state,
//! collects whatever frames must go out, releases the lock, and only then
//! hands the frames to the [`Transport`].  Producers never wait on transport
//! calls, and no lock is ever held across endpoints or across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, Notify};
use tokio::time::{sleep_until, Instant};

use crate::command::Command;
use crate::frame::WireFrame;
use crate::queue::OrderedQueue;
use crate::receiver::{Delivery, ReceiverState};
use crate::sender::SenderState;
use crate::timer::{RetransmitTimer, TimerConfig};

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// Moves encoded frames between endpoints.
///
/// Implementations may drop or corrupt copies; the protocol recovers through
/// checksums and retransmission.
pub trait Transport: Send + Sync {
    /// Forward a data frame produced by a sender toward the receivers.
    fn send_to_receivers(&self, frame: WireFrame);
    /// Forward an acknowledgement produced by a receiver toward the senders.
    fn send_to_senders(&self, frame: WireFrame);
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait until `wakeup` is signalled or `deadline` passes, whichever is first.
async fn wait_for_work(wakeup: &Notify, deadline: Instant) {
    tokio::select! {
        _ = wakeup.notified() => {}
        _ = sleep_until(deadline) => {}
    }
}

// ---------------------------------------------------------------------------
// SenderEndpoint
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SenderInner {
    commands: OrderedQueue<Command>,
    frames: OrderedQueue<WireFrame>,
    state: SenderState,
}

/// Shared handle to one sender endpoint.
///
/// Cloning is cheap; every clone refers to the same queues and state.
#[derive(Debug, Clone)]
pub struct SenderEndpoint {
    id: u16,
    inner: Arc<Mutex<SenderInner>>,
    wakeup: Arc<Notify>,
    timing: TimerConfig,
}

impl SenderEndpoint {
    pub fn new(id: u16, sws: u8, timing: TimerConfig) -> Self {
        let state = SenderState::new(id, sws, RetransmitTimer::new(timing.retransmit_timeout));
        Self {
            id,
            inner: Arc::new(Mutex::new(SenderInner {
                commands: OrderedQueue::new(),
                frames: OrderedQueue::new(),
                state,
            })),
            wakeup: Arc::new(Notify::new()),
            timing,
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    /// Queue an outgoing message and wake the worker.
    pub fn push_command(&self, cmd: Command) {
        lock(&self.inner).commands.push(cmd);
        self.wakeup.notify_one();
    }

    /// Queue an inbound buffer from the transport and wake the worker.
    pub fn push_frame(&self, frame: WireFrame) {
        lock(&self.inner).frames.push(frame);
        self.wakeup.notify_one();
    }

    /// Run a closure against the protocol state under the endpoint lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&SenderState) -> R) -> R {
        f(&lock(&self.inner).state)
    }

    /// One scheduling pass: acks, then commands, then at most one admission,
    /// then the retransmission timer.  Returns the frames to transmit.
    pub fn pass(&self, now: Instant) -> OrderedQueue<WireFrame> {
        let mut guard = lock(&self.inner);
        let inner = &mut *guard;
        let mut outgoing = OrderedQueue::new();

        for buf in inner.frames.take_all() {
            inner.state.on_frame(&buf);
        }
        for cmd in inner.commands.take_all() {
            inner.state.enqueue(cmd);
        }
        if let Some(frame) = inner.state.admit_next(now) {
            outgoing.push(frame);
        }
        outgoing.extend(inner.state.on_tick(now));
        outgoing
    }

    /// When the worker should next wake up on its own, or `None` when there is
    /// already work to do.
    fn idle_until(&self, now: Instant) -> Option<Instant> {
        let inner = lock(&self.inner);
        if !inner.commands.is_empty() || !inner.frames.is_empty() || inner.state.can_admit() {
            return None;
        }
        Some(inner.state.timer().next_wake(now, self.timing.poll_interval))
    }

    /// Worker loop.  Never returns; abort the task to stop it.
    pub async fn run(self, transport: Arc<dyn Transport>) {
        log::debug!("[snd:{}] worker started", self.id);
        loop {
            if let Some(wake_at) = self.idle_until(Instant::now()) {
                wait_for_work(&self.wakeup, wake_at).await;
            }

            let outgoing = self.pass(Instant::now());
            for frame in outgoing {
                transport.send_to_receivers(frame);
            }
            tokio::task::yield_now().await;
        }
    }
}

// ---------------------------------------------------------------------------
// ReceiverEndpoint
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ReceiverInner {
    frames: OrderedQueue<WireFrame>,
    state: ReceiverState,
}

/// Shared handle to one receiver endpoint.
#[derive(Debug, Clone)]
pub struct ReceiverEndpoint {
    id: u16,
    inner: Arc<Mutex<ReceiverInner>>,
    wakeup: Arc<Notify>,
    deliveries: mpsc::UnboundedSender<Delivery>,
    timing: TimerConfig,
}

impl ReceiverEndpoint {
    /// Create receiver `id`; completed messages are sent on `deliveries`.
    pub fn new(
        id: u16,
        rws: u8,
        timing: TimerConfig,
        deliveries: mpsc::UnboundedSender<Delivery>,
    ) -> Self {
        Self {
            id,
            inner: Arc::new(Mutex::new(ReceiverInner {
                frames: OrderedQueue::new(),
                state: ReceiverState::new(id, rws),
            })),
            wakeup: Arc::new(Notify::new()),
            deliveries,
            timing,
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    /// Queue an inbound buffer from the transport and wake the worker.
    pub fn push_frame(&self, frame: WireFrame) {
        lock(&self.inner).frames.push(frame);
        self.wakeup.notify_one();
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&ReceiverState) -> R) -> R {
        f(&lock(&self.inner).state)
    }

    /// One scheduling pass over every queued frame.  Deliveries are published
    /// immediately, in order; the returned acks are for the transport.
    pub fn pass(&self) -> OrderedQueue<WireFrame> {
        let mut guard = lock(&self.inner);
        let inner = &mut *guard;
        let mut acks = OrderedQueue::new();

        for buf in inner.frames.take_all() {
            let received = inner.state.on_frame(&buf);
            if let Some(delivery) = received.delivery {
                log::debug!("[rcv:{}] delivered {} byte(s)", self.id, delivery.message.len());
                if self.deliveries.send(delivery).is_err() {
                    log::trace!("[rcv:{}] delivery channel closed", self.id);
                }
            }
            if let Some(ack) = received.ack {
                acks.push(ack);
            }
        }
        acks
    }

    fn has_pending(&self) -> bool {
        !lock(&self.inner).frames.is_empty()
    }

    /// Worker loop.  Never returns; abort the task to stop it.
    pub async fn run(self, transport: Arc<dyn Transport>) {
        log::debug!("[rcv:{}] worker started", self.id);
        loop {
            if !self.has_pending() {
                let wake_at = Instant::now() + self.timing.poll_interval;
                wait_for_work(&self.wakeup, wake_at).await;
            }

            let acks = self.pass();
            for ack in acks {
                transport.send_to_senders(ack);
            }
            tokio::task::yield_now().await;
        }
    }
}
