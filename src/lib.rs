//! `sliding-window`: reliable message delivery over a simulated lossy link.
//!
//! # Architecture
//!
//! ```text
//!   Command ──▶ ┌──────────────────┐   DATA frames   ┌──────────────────┐
//!               │  SenderEndpoint  │────────────────▶│ ReceiverEndpoint │──▶ Delivery
//!               │  (SenderState)   │                 │ (ReceiverState)  │
//!               └────────▲─────────┘                 └────────┬─────────┘
//!                        │            ACK frames              │
//!                        └───────────────◀────────────────────┘
//!                               ┌────────────────┐
//!                               │   Simulator    │  drop / corrupt each copy
//!                               └────────────────┘
//! ```
//!
//! Every frame is a fixed 64-byte buffer protected by a CRC-style checksum.
//! Senders keep up to SWS frames outstanding and go back to the start of the
//! window on timeout; receivers accept frames inside their RWS window,
//! acknowledge everything that decodes, and reassemble multi-frame messages.
//!
//! Each module has a single responsibility:
//! - [`frame`]: wire format (encode / decode / checksum)
//! - [`queue`]: FIFO with indexed access
//! - [`timer`]: retransmission deadline and wake-up computation
//! - [`sender`]: outbound sliding-window state machine
//! - [`receiver`]: inbound window, duplicate suppression, reassembly
//! - [`endpoint`]: per-endpoint worker loops and the transport seam
//! - [`simulator`]: lossy broadcast link between the endpoints
//! - [`registry`]: endpoint lookup and `Link` bootstrap
//! - [`command`]: `msg <src> <dst> <text>` input lines
//! - [`config`]: link-wide parameters and validation

pub mod command;
pub mod config;
pub mod endpoint;
pub mod frame;
pub mod queue;
pub mod receiver;
pub mod registry;
pub mod sender;
pub mod simulator;
pub mod timer;

pub use command::{Command, CommandError, Input};
pub use config::{ConfigError, LinkConfig};
pub use frame::{Frame, FrameError, FrameKind, WireFrame};
pub use receiver::Delivery;
pub use registry::Link;
