//! Buffered reading over a storage backend.

use super::ReadableChannel;
use crate::error::{LogError, LogResult};
use crate::types::LogPosition;
use crc32fast::Hasher;
use txlog_storage::StorageBackend;

/// Reads a log file through a read-ahead buffer.
///
/// Refills fetch `read_ahead_size` bytes at a time, so a scan issues one
/// backend read per buffer rather than one per field.
pub struct ReadAheadChannel<B: StorageBackend> {
    backend: B,
    log_version: u64,
    buffer: Vec<u8>,
    /// File offset of `buffer[0]`.
    buffer_start: u64,
    cursor: usize,
    read_ahead_size: usize,
    hasher: Hasher,
}

impl<B: StorageBackend> ReadAheadChannel<B> {
    /// Creates a channel positioned at `start_offset`.
    pub fn new(backend: B, log_version: u64, start_offset: u64, read_ahead_size: usize) -> Self {
        Self {
            backend,
            log_version,
            buffer: Vec::new(),
            buffer_start: start_offset,
            cursor: 0,
            read_ahead_size: read_ahead_size.max(1),
            hasher: Hasher::new(),
        }
    }

    /// Returns a reference to the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Consumes the channel and returns the backend.
    pub fn into_inner(self) -> B {
        self.backend
    }

    /// Current offset in the file.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.buffer_start + self.cursor as u64
    }

    fn refill(&mut self, wanted: usize) -> LogResult<bool> {
        let next = self.buffer_start + self.buffer.len() as u64;
        let chunk = self
            .backend
            .read_up_to(next, self.read_ahead_size.max(wanted))?;
        self.buffer = chunk;
        self.buffer_start = next;
        self.cursor = 0;
        Ok(!self.buffer.is_empty())
    }
}

impl<B: StorageBackend> ReadableChannel for ReadAheadChannel<B> {
    fn read_exact(&mut self, dst: &mut [u8]) -> LogResult<()> {
        let mut filled = 0;
        while filled < dst.len() {
            if self.cursor == self.buffer.len() && !self.refill(dst.len() - filled)? {
                return Err(LogError::ReadPastEnd {
                    position: self.position(),
                });
            }
            let take = (self.buffer.len() - self.cursor).min(dst.len() - filled);
            let src = &self.buffer[self.cursor..self.cursor + take];
            dst[filled..filled + take].copy_from_slice(src);
            self.hasher.update(src);
            self.cursor += take;
            filled += take;
        }
        Ok(())
    }

    fn position(&self) -> LogPosition {
        LogPosition::new(self.log_version, self.offset())
    }

    fn set_position(&mut self, byte_offset: u64) -> LogResult<()> {
        let buffer_end = self.buffer_start + self.buffer.len() as u64;
        if (self.buffer_start..=buffer_end).contains(&byte_offset) {
            self.cursor = (byte_offset - self.buffer_start) as usize;
        } else {
            self.buffer.clear();
            self.buffer_start = byte_offset;
            self.cursor = 0;
        }
        Ok(())
    }

    fn begin_checksum(&mut self) {
        self.hasher.reset();
    }

    fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}
