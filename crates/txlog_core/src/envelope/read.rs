//! Reassembling entries from envelopes on the read path.

use super::{EnvelopeHeader, EnvelopeType, ENVELOPE_HEADER_SIZE, MIN_ENVELOPE_SPACE};
use crate::channel::{ReadAheadChannel, ReadableChannel};
use crate::error::{LogError, LogResult};
use crate::types::LogPosition;
use crc32fast::Hasher;
use tracing::trace;
use txlog_storage::StorageBackend;

#[derive(Debug, Clone, Copy)]
struct ChainState {
    previous_checksum: u32,
    last_index: Option<u64>,
    in_entry: bool,
}

#[derive(Debug, Clone, Copy)]
struct CurrentEnvelope {
    header: EnvelopeHeader,
    header_offset: u64,
    /// Position reported before this envelope was loaded.
    resume_offset: u64,
    /// Chain state before this envelope was accepted.
    chain_before: ChainState,
}

/// Reads the payload stream of a segmented log file.
///
/// Every envelope is validated before any of its bytes are handed out: its
/// checksum, its link to the previous envelope, its place in the
/// BEGIN/MIDDLE/END sequence and the continuity of entry indexes. Codecs on
/// top see one contiguous stream of entry bytes.
pub struct EnvelopeReadChannel<B: StorageBackend> {
    physical: ReadAheadChannel<B>,
    segment_size: u64,
    payload: Vec<u8>,
    /// File offset of `payload[0]`.
    payload_start: u64,
    cursor: usize,
    current: Option<CurrentEnvelope>,
    chain: ChainState,
    hasher: Hasher,
}

impl<B: StorageBackend> EnvelopeReadChannel<B> {
    /// Wraps `physical`, skipping the header segment.
    ///
    /// `previous_checksum` is the checksum the first envelope must link to.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error for a segment size too small to
    /// hold an envelope.
    pub fn new(
        mut physical: ReadAheadChannel<B>,
        segment_size: u64,
        previous_checksum: u32,
    ) -> LogResult<Self> {
        if segment_size < MIN_ENVELOPE_SPACE {
            return Err(LogError::invalid_argument(format!(
                "segment size {segment_size} cannot hold an envelope"
            )));
        }
        if physical.offset() < segment_size {
            physical.set_position(segment_size)?;
        }
        Ok(Self {
            physical,
            segment_size,
            payload: Vec::new(),
            payload_start: 0,
            cursor: 0,
            current: None,
            chain: ChainState {
                previous_checksum,
                last_index: None,
                in_entry: false,
            },
            hasher: Hasher::new(),
        })
    }

    /// Checksum of the last envelope accepted.
    #[must_use]
    pub fn last_envelope_checksum(&self) -> u32 {
        self.chain.previous_checksum
    }

    /// Index of the last envelope accepted.
    #[must_use]
    pub fn last_index(&self) -> Option<u64> {
        self.chain.last_index
    }

    /// Whether the stream stopped inside a split entry.
    #[must_use]
    pub fn in_entry(&self) -> bool {
        self.chain.in_entry
    }

    /// Consumes the channel and returns the backend.
    pub fn into_inner(self) -> B {
        self.physical.into_inner()
    }

    fn at(&self, byte_offset: u64) -> LogPosition {
        LogPosition::new(self.physical.position().log_version, byte_offset)
    }

    fn read_physical(&mut self, dst: &mut [u8], envelope: LogPosition) -> LogResult<()> {
        self.physical.read_exact(dst).map_err(|e| {
            if e.is_read_past_end() {
                LogError::ReadPastEnd { position: envelope }
            } else {
                e
            }
        })
    }

    fn next_envelope(&mut self) -> LogResult<()> {
        let resume_offset = self.position().byte_offset;
        loop {
            let offset = self.physical.offset();
            let in_segment = offset % self.segment_size;
            let segment_left = self.segment_size - in_segment;
            if segment_left < MIN_ENVELOPE_SPACE {
                self.physical.set_position(offset + segment_left)?;
                continue;
            }

            let position = self.at(offset);
            let mut raw = [0u8; ENVELOPE_HEADER_SIZE];
            self.read_physical(&mut raw, position)?;
            if raw[4] == EnvelopeType::Zero.as_byte() {
                if in_segment == 0 {
                    // Nothing was ever written to this segment.
                    return Err(LogError::ReadPastEnd { position });
                }
                trace!(offset, "skipping zero padding to end of segment");
                self.physical.set_position(offset + segment_left)?;
                continue;
            }

            let header = EnvelopeHeader::decode(&raw, position)?;
            let room = segment_left - ENVELOPE_HEADER_SIZE as u64;
            if u64::from(header.payload_length) > room {
                return Err(LogError::envelope_corruption(
                    format!(
                        "payload length {} exceeds the {room} bytes left in the segment",
                        header.payload_length
                    ),
                    position,
                ));
            }
            let mut payload = vec![0u8; header.payload_length as usize];
            self.read_physical(&mut payload, position)?;

            let actual = header.compute_checksum(&payload);
            if actual != header.checksum {
                return Err(LogError::ChecksumMismatch {
                    expected: header.checksum,
                    actual,
                    position,
                });
            }
            self.check_sequence(&header, &payload, position)?;

            trace!(
                envelope = ?header.envelope_type,
                index = header.index,
                len = header.payload_length,
                offset,
                "read envelope"
            );
            let chain_before = self.chain;
            self.chain = ChainState {
                previous_checksum: header.checksum,
                last_index: Some(header.index),
                in_entry: !header.envelope_type.ends_entry(),
            };
            self.current = Some(CurrentEnvelope {
                header,
                header_offset: offset,
                resume_offset,
                chain_before,
            });
            self.payload = payload;
            self.payload_start = offset + ENVELOPE_HEADER_SIZE as u64;
            self.cursor = 0;
            return Ok(());
        }
    }

    fn check_sequence(
        &self,
        header: &EnvelopeHeader,
        payload: &[u8],
        position: LogPosition,
    ) -> LogResult<()> {
        let corrupt = |message: String| Err(LogError::envelope_corruption(message, position));
        if header.previous_checksum != self.chain.previous_checksum {
            return corrupt(format!(
                "envelope links to checksum {:#010x}, previous envelope ended with {:#010x}",
                header.previous_checksum, self.chain.previous_checksum
            ));
        }
        if self.chain.in_entry {
            if header.envelope_type.starts_entry() {
                return corrupt(format!(
                    "{:?} envelope inside an unfinished entry",
                    header.envelope_type
                ));
            }
            if Some(header.index) != self.chain.last_index {
                return corrupt(format!(
                    "continuation envelope has index {}, entry has index {:?}",
                    header.index, self.chain.last_index
                ));
            }
            return Ok(());
        }

        if !header.envelope_type.starts_entry() {
            return corrupt(format!(
                "{:?} envelope without a preceding BEGIN",
                header.envelope_type
            ));
        }
        if let Some(last) = self.chain.last_index {
            if header.index != last.wrapping_add(1) {
                return corrupt(format!(
                    "entry index {} does not follow {last}",
                    header.index
                ));
            }
        }
        if header.kernel_version == 0 || payload.first() != Some(&header.kernel_version.to_be_bytes()[0]) {
            return corrupt(format!(
                "envelope kernel version {} does not match its entry",
                header.kernel_version
            ));
        }
        Ok(())
    }
}

impl<B: StorageBackend> ReadableChannel for EnvelopeReadChannel<B> {
    fn read_exact(&mut self, dst: &mut [u8]) -> LogResult<()> {
        let mut filled = 0;
        while filled < dst.len() {
            if self.cursor == self.payload.len() {
                self.next_envelope()?;
                continue;
            }
            let take = (self.payload.len() - self.cursor).min(dst.len() - filled);
            let src = &self.payload[self.cursor..self.cursor + take];
            dst[filled..filled + take].copy_from_slice(src);
            self.hasher.update(src);
            self.cursor += take;
            filled += take;
        }
        Ok(())
    }

    /// Offset just after the last payload byte consumed.
    fn position(&self) -> LogPosition {
        match self.current {
            Some(_) => self.at(self.payload_start + self.cursor as u64),
            None => self.physical.position(),
        }
    }

    /// Repositions within the current envelope, or back to where it was
    /// entered, in which case it is read and validated again.
    fn set_position(&mut self, byte_offset: u64) -> LogResult<()> {
        let Some(current) = self.current else {
            if byte_offset == self.physical.offset() {
                return Ok(());
            }
            return Err(LogError::invalid_argument(format!(
                "cannot reposition an envelope stream to {byte_offset}"
            )));
        };
        let payload_end = self.payload_start + self.payload.len() as u64;
        if (self.payload_start..=payload_end).contains(&byte_offset) {
            self.cursor = (byte_offset - self.payload_start) as usize;
            return Ok(());
        }
        if byte_offset == current.header_offset || byte_offset == current.resume_offset {
            self.chain = current.chain_before;
            self.current = None;
            self.payload.clear();
            self.cursor = 0;
            return self.physical.set_position(byte_offset);
        }
        Err(LogError::invalid_argument(format!(
            "cannot reposition an envelope stream to {byte_offset} outside the current envelope"
        )))
    }

    fn begin_checksum(&mut self) {
        self.hasher.reset();
    }

    fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}
