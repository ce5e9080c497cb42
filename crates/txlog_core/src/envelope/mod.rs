//! Envelope framing for segmented log files.
//!
//! Files with a V10 header are divided into segments of
//! `segment_block_size` bytes. The first segment holds only the file header
//! and zero padding. Every later segment holds envelopes:
//!
//! ```text
//! | checksum (4) | type (1) | payload length (4) | index (8) | kernel version (1) | previous checksum (4) | payload |
//! ```
//!
//! A logical entry is written as one FULL envelope, or as BEGIN, any number
//! of MIDDLE, and END envelopes sharing one index. Consecutive entries use
//! consecutive indexes. Each envelope checksum covers its header fields after
//! the checksum plus the payload, and every header names the checksum of the
//! envelope before it, so the envelopes of a file form their own chain.
//!
//! When fewer than [`MIN_ENVELOPE_SPACE`] bytes remain in a segment they are
//! zero padding. A zero type byte at the start of a segment ends the data.

mod read;
mod write;

pub use read::EnvelopeReadChannel;
pub use write::EnvelopeWriteChannel;

use crate::error::{LogError, LogResult};
use crate::types::LogPosition;
use bytes::{Buf, BufMut};
use crc32fast::Hasher;

/// Size of an envelope header.
pub const ENVELOPE_HEADER_SIZE: usize = 22;

/// Smallest space in a segment that can still hold an envelope.
pub const MIN_ENVELOPE_SPACE: u64 = ENVELOPE_HEADER_SIZE as u64 + 1;

/// Kind of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EnvelopeType {
    /// Padding up to the end of the segment.
    Zero = 0,
    /// A whole entry.
    Full = 1,
    /// First piece of a split entry.
    Begin = 2,
    /// Inner piece of a split entry.
    Middle = 3,
    /// Last piece of a split entry.
    End = 4,
}

impl EnvelopeType {
    /// Converts a byte to an envelope type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Zero),
            1 => Some(Self::Full),
            2 => Some(Self::Begin),
            3 => Some(Self::Middle),
            4 => Some(Self::End),
            _ => None,
        }
    }

    /// Converts the envelope type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether this envelope opens an entry.
    #[must_use]
    pub fn starts_entry(self) -> bool {
        matches!(self, Self::Full | Self::Begin)
    }

    /// Whether this envelope closes an entry.
    #[must_use]
    pub fn ends_entry(self) -> bool {
        matches!(self, Self::Full | Self::End)
    }
}

/// Decoded envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Stored checksum of the envelope.
    pub checksum: u32,
    /// Envelope kind.
    pub envelope_type: EnvelopeType,
    /// Payload bytes following the header.
    pub payload_length: u32,
    /// Index of the entry the payload belongs to.
    pub index: u64,
    /// Kernel version code of the entry; zero except on FULL and BEGIN.
    pub kernel_version: i8,
    /// Checksum of the previous envelope.
    pub previous_checksum: u32,
}

impl EnvelopeHeader {
    /// Serializes the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; ENVELOPE_HEADER_SIZE] {
        let mut out = [0u8; ENVELOPE_HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_u32(self.checksum);
        buf.put_u8(self.envelope_type.as_byte());
        buf.put_u32(self.payload_length);
        buf.put_u64(self.index);
        buf.put_i8(self.kernel_version);
        buf.put_u32(self.previous_checksum);
        out
    }

    /// Parses a header read at `position`.
    ///
    /// # Errors
    ///
    /// Returns an envelope corruption error for an unknown type byte.
    pub fn decode(bytes: &[u8; ENVELOPE_HEADER_SIZE], position: LogPosition) -> LogResult<Self> {
        let mut buf = &bytes[..];
        let checksum = buf.get_u32();
        let type_byte = buf.get_u8();
        let envelope_type = EnvelopeType::from_byte(type_byte).ok_or_else(|| {
            LogError::envelope_corruption(format!("unknown envelope type {type_byte}"), position)
        })?;
        Ok(Self {
            checksum,
            envelope_type,
            payload_length: buf.get_u32(),
            index: buf.get_u64(),
            kernel_version: buf.get_i8(),
            previous_checksum: buf.get_u32(),
        })
    }

    /// Checksum over the header fields after the checksum plus `payload`.
    #[must_use]
    pub fn compute_checksum(&self, payload: &[u8]) -> u32 {
        let bytes = self.to_bytes();
        let mut hasher = Hasher::new();
        hasher.update(&bytes[4..]);
        hasher.update(payload);
        hasher.finalize()
    }
}
