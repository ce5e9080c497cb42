//! In-memory channel for tests and tools.

use super::{ReadableChannel, WritableChannel};
use crate::error::{LogError, LogResult};
use crate::types::LogPosition;
use crc32fast::Hasher;
use std::fmt;

/// A channel over a growable byte vector.
///
/// Writes append at the end; reads consume from an independent cursor.
/// Both share one running checksum.
#[derive(Clone, Default)]
pub struct InMemoryChannel {
    data: Vec<u8>,
    cursor: usize,
    log_version: u64,
    hasher: Hasher,
}

impl InMemoryChannel {
    /// Creates an empty channel.
    #[must_use]
    pub fn new(log_version: u64) -> Self {
        Self {
            log_version,
            ..Self::default()
        }
    }

    /// Creates a channel holding `data`, positioned at its start.
    #[must_use]
    pub fn from_bytes(log_version: u64, data: Vec<u8>) -> Self {
        Self {
            data,
            log_version,
            ..Self::default()
        }
    }

    /// All bytes written so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the channel and returns its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }
}

impl fmt::Debug for InMemoryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryChannel")
            .field("len", &self.data.len())
            .field("cursor", &self.cursor)
            .field("log_version", &self.log_version)
            .finish_non_exhaustive()
    }
}

impl ReadableChannel for InMemoryChannel {
    fn read_exact(&mut self, dst: &mut [u8]) -> LogResult<()> {
        if self.remaining() < dst.len() {
            self.cursor = self.data.len();
            return Err(LogError::ReadPastEnd {
                position: ReadableChannel::position(self),
            });
        }
        let src = &self.data[self.cursor..self.cursor + dst.len()];
        dst.copy_from_slice(src);
        self.hasher.update(src);
        self.cursor += dst.len();
        Ok(())
    }

    fn position(&self) -> LogPosition {
        LogPosition::new(self.log_version, self.cursor as u64)
    }

    fn set_position(&mut self, byte_offset: u64) -> LogResult<()> {
        let offset = usize::try_from(byte_offset)
            .ok()
            .filter(|&offset| offset <= self.data.len())
            .ok_or_else(|| {
                LogError::invalid_argument(format!(
                    "position {byte_offset} is beyond {} bytes",
                    self.data.len()
                ))
            })?;
        self.cursor = offset;
        Ok(())
    }

    fn begin_checksum(&mut self) {
        self.hasher.reset();
    }

    fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

impl WritableChannel for InMemoryChannel {
    fn put_bytes(&mut self, data: &[u8]) -> LogResult<()> {
        self.hasher.update(data);
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn position(&self) -> LogPosition {
        LogPosition::new(self.log_version, self.data.len() as u64)
    }

    fn begin_checksum(&mut self) {
        self.hasher.reset();
    }

    fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn flush(&mut self) -> LogResult<()> {
        Ok(())
    }
}
