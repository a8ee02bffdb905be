//! Wire-format definitions for link frames.
//!
//! Every buffer exchanged between endpoints is one encoded [`Frame`].  This
//! module is responsible for:
//! - Defining the fixed 64-byte on-wire layout.
//! - Serialising a [`Frame`] and appending the checksum trailer.
//! - Validating the trailer and deserialising a raw buffer back into a
//!   [`Frame`].
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **little-endian**.  Bytes 6–7 are reserved and
//! always written as zero; `msg_len` starts on a 4-byte boundary.
//!
//! ```text
//!  0       1       2       3       4       5       6       7
//! +-------+-------+-------+-------+-------+-------+-------+-------+
//! | kind  |  seq  |      src      |      dst      |   reserved    |
//! +-------+-------+-------+-------+-------+-------+-------+-------+
//! |            msg_len            |        payload (48 bytes) ... |
//! +-------+-------+-------+-------+-------+-------+-------+-------+
//! |                          ... payload ...                      |
//! +-------+-------+-------+-------+-------+-------+-------+-------+
//! |  ... payload  |           checksum            |
//! +-------+-------+-------+-------+-------+-------+
//! ```
//!
//! Total size: [`FRAME_LEN`] = 64 bytes, regardless of how much of the payload
//! region is in use.

use thiserror::Error;

/// Byte length of every frame on the wire.
pub const FRAME_LEN: usize = 64;

/// Capacity of the payload region in bytes.
pub const PAYLOAD_CAPACITY: usize = 48;

/// Byte length of the checksum trailer.
pub const CHECKSUM_LEN: usize = 4;

/// Generator constant for the long-division checksum.
///
/// This is the CRC-32 polynomial `0x1_04C1_1DB7` shifted left by seven bits,
/// so its leading term lines up with the top bit of a 40-bit window.
pub const CRC_GENERATOR: u64 = 0x82_608E_DB80;

// Byte offsets of each field within the serialised frame.
const OFF_KIND: usize = 0;
const OFF_SEQ: usize = 1;
const OFF_SRC: usize = 2;
const OFF_DST: usize = 4;
const OFF_MSG_LEN: usize = 8;
const OFF_PAYLOAD: usize = 12;
const OFF_CHECKSUM: usize = FRAME_LEN - CHECKSUM_LEN;

/// An encoded frame exactly as it travels over the link.
pub type WireFrame = [u8; FRAME_LEN];

// ---------------------------------------------------------------------------
// FrameKind
// ---------------------------------------------------------------------------

/// Value of the one-byte type flag.
///
/// The discriminants are the ASCII tags used on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// A self-contained message that fits in one frame.
    Data = b'd',
    /// First fragment of a multi-frame message; carries the total length.
    Start = b's',
    /// Middle fragment of a multi-frame message.
    Continuation = b'c',
    /// Last fragment of a multi-frame message.
    Final = b'f',
    /// Acknowledgement echoed back to the sender.
    Ack = b'a',
}

impl FrameKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            b'd' => FrameKind::Data,
            b's' => FrameKind::Start,
            b'c' => FrameKind::Continuation,
            b'f' => FrameKind::Final,
            b'a' => FrameKind::Ack,
            _ => return None,
        })
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One decoded link frame.
///
/// The payload is kept as the full fixed-size region so that a decode of an
/// encode reproduces every byte.  Use [`Frame::chunk`] for the logical bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Modulo-256 sequence number.
    pub seq: u8,
    /// Id of the sending endpoint.
    pub src: u16,
    /// Id of the receiving endpoint.
    pub dst: u16,
    /// Total message length on start frames; chunk length on data and final
    /// frames (zero means the chunk is NUL-terminated).
    pub msg_len: u32,
    pub payload: [u8; PAYLOAD_CAPACITY],
}

impl Frame {
    /// Build a frame, copying `chunk` into a zeroed payload region.
    ///
    /// `chunk` longer than [`PAYLOAD_CAPACITY`] is truncated; callers
    /// fragment before getting here.
    pub fn new(kind: FrameKind, seq: u8, src: u16, dst: u16, msg_len: u32, chunk: &[u8]) -> Self {
        let mut payload = [0u8; PAYLOAD_CAPACITY];
        let n = chunk.len().min(PAYLOAD_CAPACITY);
        payload[..n].copy_from_slice(&chunk[..n]);
        Self {
            kind,
            seq,
            src,
            dst,
            msg_len,
            payload,
        }
    }

    /// The acknowledgement for this frame: same addressing and sequence
    /// number, kind set to [`FrameKind::Ack`].
    pub fn to_ack(&self) -> Frame {
        Frame {
            kind: FrameKind::Ack,
            ..self.clone()
        }
    }

    /// Logical payload bytes carried by this frame.
    ///
    /// Start and continuation fragments always fill the region.  Every other
    /// kind uses `msg_len` when it is non-zero and otherwise stops at the
    /// first NUL byte; the tail of the region is never trusted.
    pub fn chunk(&self) -> &[u8] {
        match self.kind {
            FrameKind::Start | FrameKind::Continuation => &self.payload,
            FrameKind::Data | FrameKind::Final | FrameKind::Ack => {
                let len = if self.msg_len == 0 {
                    self.payload
                        .iter()
                        .position(|&b| b == 0)
                        .unwrap_or(PAYLOAD_CAPACITY)
                } else {
                    (self.msg_len as usize).min(PAYLOAD_CAPACITY)
                };
                &self.payload[..len]
            }
        }
    }

    /// Serialise this frame into its fixed-size wire form.
    ///
    /// The checksum field is zeroed, the remainder computed over the whole
    /// buffer, and the remainder written into the trailer.
    pub fn encode(&self) -> WireFrame {
        let mut buf = [0u8; FRAME_LEN];

        buf[OFF_KIND] = self.kind.to_u8();
        buf[OFF_SEQ] = self.seq;
        buf[OFF_SRC..OFF_SRC + 2].copy_from_slice(&self.src.to_le_bytes());
        buf[OFF_DST..OFF_DST + 2].copy_from_slice(&self.dst.to_le_bytes());
        buf[OFF_MSG_LEN..OFF_MSG_LEN + 4].copy_from_slice(&self.msg_len.to_le_bytes());
        buf[OFF_PAYLOAD..OFF_PAYLOAD + PAYLOAD_CAPACITY].copy_from_slice(&self.payload);

        let remainder = crc_remainder(&buf);
        for (dst, r) in buf[OFF_CHECKSUM..].iter_mut().zip(remainder) {
            *dst ^= r;
        }
        buf
    }

    /// Validate and parse a frame from a raw buffer.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is not exactly [`FRAME_LEN`] bytes,
    /// - the checksum division leaves a non-zero remainder, or
    /// - the kind byte is not one of the known tags.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        let buf: &WireFrame = buf
            .try_into()
            .map_err(|_| FrameError::Length(buf.len()))?;

        if crc_remainder(buf) != [0u8; CHECKSUM_LEN] {
            return Err(FrameError::Checksum);
        }

        let kind = FrameKind::from_u8(buf[OFF_KIND]).ok_or(FrameError::UnknownKind(buf[OFF_KIND]))?;
        let mut payload = [0u8; PAYLOAD_CAPACITY];
        payload.copy_from_slice(&buf[OFF_PAYLOAD..OFF_PAYLOAD + PAYLOAD_CAPACITY]);

        Ok(Frame {
            kind,
            seq: buf[OFF_SEQ],
            src: u16::from_le_bytes([buf[OFF_SRC], buf[OFF_SRC + 1]]),
            dst: u16::from_le_bytes([buf[OFF_DST], buf[OFF_DST + 1]]),
            msg_len: u32::from_le_bytes([
                buf[OFF_MSG_LEN],
                buf[OFF_MSG_LEN + 1],
                buf[OFF_MSG_LEN + 2],
                buf[OFF_MSG_LEN + 3],
            ]),
            payload,
        })
    }
}

/// Errors that can arise when parsing a raw frame buffer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame must be {len} bytes, got {0}", len = FRAME_LEN)]
    Length(usize),
    #[error("checksum verification failed")]
    Checksum,
    #[error("unknown frame kind {0:#04x}")]
    UnknownKind(u8),
}

/// Long-division remainder of `buf` by [`CRC_GENERATOR`].
///
/// Processes every bit of the first `FRAME_LEN - 4` bytes, most significant
/// bit first; the trailer bytes only ever receive XORs.  The returned bytes
/// are what is left in the trailer position.
fn crc_remainder(buf: &WireFrame) -> [u8; CHECKSUM_LEN] {
    let mut r = *buf;
    for i in 0..OFF_CHECKSUM {
        for j in 0..8 {
            if r[i] & (0x80 >> j) == 0 {
                continue;
            }
            r[i] ^= (CRC_GENERATOR >> (32 + j)) as u8;
            r[i + 1] ^= (CRC_GENERATOR >> (24 + j)) as u8;
            r[i + 2] ^= (CRC_GENERATOR >> (16 + j)) as u8;
            r[i + 3] ^= (CRC_GENERATOR >> (8 + j)) as u8;
            r[i + 4] ^= (CRC_GENERATOR >> j) as u8;
        }
    }
    [r[OFF_CHECKSUM], r[OFF_CHECKSUM + 1], r[OFF_CHECKSUM + 2], r[OFF_CHECKSUM + 3]]
}
