//! Splitting entries into envelopes on the write path.

use super::{EnvelopeHeader, EnvelopeType, ENVELOPE_HEADER_SIZE, MIN_ENVELOPE_SPACE};
use crate::channel::{PhysicalWriteChannel, WritableChannel};
use crate::error::{LogError, LogResult};
use crate::types::LogPosition;
use crate::version::KernelVersion;
use bytes::BytesMut;
use crc32fast::Hasher;
use tracing::trace;
use txlog_storage::StorageBackend;

/// Writes entries as envelopes into a segmented log file.
///
/// Bytes between `begin_entry` and `end_entry` are staged in memory and cut
/// into envelopes when the entry ends, so an entry never shares an envelope
/// with another. The running checksum covers the staged entry bytes only,
/// exactly as it would on an unframed channel.
pub struct EnvelopeWriteChannel<B: StorageBackend> {
    physical: PhysicalWriteChannel<B>,
    segment_size: u64,
    staged: BytesMut,
    entry_version: Option<KernelVersion>,
    next_index: u64,
    previous_checksum: u32,
    hasher: Hasher,
}

impl<B: StorageBackend> EnvelopeWriteChannel<B> {
    /// Wraps `physical`, padding the header segment if it is not full yet.
    ///
    /// `previous_checksum` seeds the envelope chain and `first_index` is the
    /// index of the first entry written.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error for a segment size too small to
    /// hold an envelope, or a storage error if padding fails.
    pub fn new(
        physical: PhysicalWriteChannel<B>,
        segment_size: u64,
        previous_checksum: u32,
        first_index: u64,
    ) -> LogResult<Self> {
        if segment_size < MIN_ENVELOPE_SPACE {
            return Err(LogError::invalid_argument(format!(
                "segment size {segment_size} cannot hold an envelope"
            )));
        }
        let mut channel = Self {
            physical,
            segment_size,
            staged: BytesMut::new(),
            entry_version: None,
            next_index: first_index,
            previous_checksum,
            hasher: Hasher::new(),
        };
        let offset = channel.physical.position().byte_offset;
        if offset < segment_size {
            channel.pad(segment_size - offset)?;
        }
        Ok(channel)
    }

    /// Checksum of the last envelope written.
    #[must_use]
    pub fn last_envelope_checksum(&self) -> u32 {
        self.previous_checksum
    }

    /// Index the next entry will be written with.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Returns a reference to the backend.
    pub fn backend(&self) -> &B {
        self.physical.backend()
    }

    /// Flushes and returns the backend.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error if an entry is still open, or a
    /// storage error if the final flush fails.
    pub fn into_inner(self) -> LogResult<B> {
        if self.entry_version.is_some() {
            return Err(LogError::invalid_argument(
                "cannot close an envelope channel inside an entry",
            ));
        }
        self.physical.into_inner()
    }

    fn pad(&mut self, len: u64) -> LogResult<()> {
        let zeros = vec![0u8; len as usize];
        self.physical.put_bytes(&zeros)
    }

    fn write_envelope(
        &mut self,
        envelope_type: EnvelopeType,
        kernel_version: KernelVersion,
        payload: &[u8],
    ) -> LogResult<()> {
        let mut header = EnvelopeHeader {
            checksum: 0,
            envelope_type,
            payload_length: payload.len() as u32,
            index: self.next_index,
            kernel_version: if envelope_type.starts_entry() {
                kernel_version.code()
            } else {
                0
            },
            previous_checksum: self.previous_checksum,
        };
        header.checksum = header.compute_checksum(payload);
        trace!(
            envelope = ?envelope_type,
            index = header.index,
            len = payload.len(),
            offset = self.physical.position().byte_offset,
            "writing envelope"
        );
        self.physical.put_bytes(&header.to_bytes())?;
        self.physical.put_bytes(payload)?;
        self.previous_checksum = header.checksum;
        Ok(())
    }
}

impl<B: StorageBackend> WritableChannel for EnvelopeWriteChannel<B> {
    fn put_bytes(&mut self, data: &[u8]) -> LogResult<()> {
        if self.entry_version.is_none() {
            return Err(LogError::invalid_argument(
                "envelope channel written outside an entry",
            ));
        }
        self.hasher.update(data);
        self.staged.extend_from_slice(data);
        Ok(())
    }

    /// Where the next envelope begins. Staged bytes are not counted.
    fn position(&self) -> LogPosition {
        self.physical.position()
    }

    fn begin_checksum(&mut self) {
        self.hasher.reset();
    }

    fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn flush(&mut self) -> LogResult<()> {
        self.physical.flush()
    }

    fn begin_entry(&mut self, kernel_version: KernelVersion) -> LogResult<()> {
        if self.entry_version.is_some() {
            return Err(LogError::invalid_argument(
                "entry begun while another is still open",
            ));
        }
        self.entry_version = Some(kernel_version);
        self.staged.clear();
        Ok(())
    }

    fn end_entry(&mut self) -> LogResult<()> {
        let kernel_version = self
            .entry_version
            .take()
            .ok_or_else(|| LogError::invalid_argument("no entry to end"))?;
        let payload = self.staged.split().freeze();
        if payload.is_empty() {
            return Ok(());
        }

        let mut rest = &payload[..];
        let mut first = true;
        loop {
            let offset = self.physical.position().byte_offset;
            let segment_left = self.segment_size - offset % self.segment_size;
            if segment_left < MIN_ENVELOPE_SPACE {
                self.pad(segment_left)?;
                continue;
            }
            let room = (segment_left - ENVELOPE_HEADER_SIZE as u64) as usize;
            let take = room.min(rest.len());
            let last = take == rest.len();
            let envelope_type = match (first, last) {
                (true, true) => EnvelopeType::Full,
                (true, false) => EnvelopeType::Begin,
                (false, false) => EnvelopeType::Middle,
                (false, true) => EnvelopeType::End,
            };
            let (piece, tail) = rest.split_at(take);
            self.write_envelope(envelope_type, kernel_version, piece)?;
            rest = tail;
            first = false;
            if last {
                break;
            }
        }
        self.next_index += 1;
        Ok(())
    }

    fn abort_entry(&mut self) {
        self.entry_version = None;
        self.staged.clear();
    }
}
