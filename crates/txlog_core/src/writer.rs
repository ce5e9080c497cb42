//! Log entry writer.

use crate::channel::{ReversedByteOrderWriteChannel, WritableChannel};
use crate::codec::{serialization_set, EntryCodec};
use crate::entry::{CommandEntry, CommitEntry, LogEntry, StartEntry, StorageCommand};
use crate::error::{LogError, LogResult};
use std::sync::Arc;

/// Writes typed entries to a channel.
///
/// Each entry is framed as version byte, type byte, payload and (from 4.2)
/// a trailing checksum over all of it. The caller owns the channel's append
/// position for the lifetime of the writer; nothing here locks.
pub struct LogEntryWriter<C: WritableChannel> {
    channel: C,
    last_checksum: Option<u32>,
}

impl<C: WritableChannel> LogEntryWriter<C> {
    /// Creates a writer over `channel`.
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            last_checksum: None,
        }
    }

    /// Writes one entry with the codec its kernel version selects.
    ///
    /// Returns the entry's checksum when its version writes one.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::UnknownEntryType`] if the entry's version has no
    /// codec for its type, an invalid argument error for fields the version
    /// cannot represent, or a storage error.
    pub fn write(&mut self, entry: &LogEntry) -> LogResult<Option<u32>> {
        let kernel_version = entry.kernel_version();
        let set = serialization_set(kernel_version);
        let entry_type = entry.entry_type().as_byte();
        let codec = set.select(entry_type).map_err(|e| match e {
            LogError::UnknownEntryType { .. } => LogError::UnknownEntryType {
                kernel_version,
                entry_type,
                position: self.channel.position(),
            },
            other => other,
        })?;

        self.channel.begin_entry(kernel_version)?;
        let written = self.write_framed(entry, codec, set.legacy_byte_order());
        let checksum = match written {
            Ok(checksum) => checksum,
            Err(e) => {
                self.channel.abort_entry();
                return Err(e);
            }
        };
        self.channel.end_entry()?;

        if entry.is_closing() {
            if let Some(checksum) = checksum {
                self.last_checksum = Some(checksum);
            }
        }
        Ok(checksum)
    }

    /// Writes a start entry, one command entry per command and the commit.
    ///
    /// Returns the commit checksum.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error if the start and commit disagree on
    /// the kernel version, or any error [`Self::write`] returns.
    pub fn write_transaction(
        &mut self,
        start: &StartEntry,
        commands: &[Arc<dyn StorageCommand>],
        commit: &CommitEntry,
    ) -> LogResult<Option<u32>> {
        if start.kernel_version != commit.kernel_version {
            return Err(LogError::invalid_argument(format!(
                "transaction starts under kernel version {} but commits under {}",
                start.kernel_version, commit.kernel_version
            )));
        }
        self.write(&LogEntry::Start(start.clone()))?;
        for command in commands {
            let entry = CommandEntry::new(start.kernel_version, Arc::clone(command));
            self.write(&LogEntry::Command(entry))?;
        }
        self.write(&LogEntry::Commit(commit.clone()))
    }

    /// Checksum of the last commit, rollback or chunk end written.
    #[must_use]
    pub fn last_checksum(&self) -> Option<u32> {
        self.last_checksum
    }

    /// Pushes buffered bytes to storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot flush.
    pub fn flush(&mut self) -> LogResult<()> {
        self.channel.flush()
    }

    /// Returns a reference to the channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Consumes the writer and returns the channel.
    pub fn into_inner(self) -> C {
        self.channel
    }

    fn write_framed(
        &mut self,
        entry: &LogEntry,
        codec: &dyn EntryCodec,
        legacy_byte_order: bool,
    ) -> LogResult<Option<u32>> {
        self.channel.begin_checksum();
        self.channel.put_i8(entry.kernel_version().code())?;
        self.channel.put_u8(entry.entry_type().as_byte())?;
        if legacy_byte_order {
            codec.write(entry, &mut ReversedByteOrderWriteChannel::new(&mut self.channel))
        } else {
            codec.write(entry, &mut self.channel)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::InMemoryChannel;
    use crate::entry::{InlineCheckpointEntry, OpaqueCommand, RollbackEntry};
    use crate::reader::VersionAwareLogEntryReader;
    use crate::types::{LogPosition, TransactionId, BASE_TX_CHECKSUM};
    use crate::version::KernelVersion;

    #[test]
    fn frames_version_type_and_checksum() {
        let mut writer = LogEntryWriter::new(InMemoryChannel::new(0));
        let commit = CommitEntry::new(KernelVersion::V5_20, TransactionId::new(9), 77);
        let checksum = writer.write(&LogEntry::Commit(commit)).unwrap().unwrap();

        let bytes = writer.into_inner().into_bytes();
        assert_eq!(bytes[0], KernelVersion::V5_20.code() as u8);
        assert_eq!(bytes[1], 5);
        assert_eq!(bytes.len(), 2 + 16 + 4);
        assert_eq!(crc32fast::hash(&bytes[..18]), checksum);
        assert_eq!(&bytes[18..], &checksum.to_be_bytes());
    }

    #[test]
    fn oldest_version_writes_little_endian_fields() {
        let mut writer = LogEntryWriter::new(InMemoryChannel::new(0));
        let commit = CommitEntry::new(KernelVersion::V2_3, TransactionId::new(1), 2);
        assert_eq!(writer.write(&LogEntry::Commit(commit)).unwrap(), None);

        let bytes = writer.into_inner().into_bytes();
        assert_eq!(bytes[0] as i8, -10);
        assert_eq!(&bytes[2..10], &1u64.to_le_bytes());
        assert_eq!(&bytes[10..18], &2u64.to_le_bytes());
    }

    #[test]
    fn transaction_round_trips_and_tracks_the_chain() {
        let mut writer = LogEntryWriter::new(InMemoryChannel::new(0));
        let start = StartEntry::new(KernelVersion::V5_10, 10, TransactionId::new(1), BASE_TX_CHECKSUM)
            .with_append_index(2)
            .with_additional_header(vec![1, 2, 3]);
        let commands: Vec<Arc<dyn StorageCommand>> = vec![
            Arc::new(OpaqueCommand::new(b"node".to_vec())),
            Arc::new(OpaqueCommand::new(b"rel".to_vec())),
        ];
        let commit = CommitEntry::new(KernelVersion::V5_10, TransactionId::new(2), 11);
        let checksum = writer.write_transaction(&start, &commands, &commit).unwrap();
        assert_eq!(writer.last_checksum(), checksum);

        let mut ch = InMemoryChannel::from_bytes(0, writer.into_inner().into_bytes());
        let mut reader = VersionAwareLogEntryReader::default();
        let mut read = Vec::new();
        while let Some(entry) = reader.read_log_entry(&mut ch).unwrap() {
            read.push(entry);
        }
        assert_eq!(read.len(), 4);
        assert_eq!(read[0], LogEntry::Start(start));
        assert_eq!(read[3].checksum(), checksum);
        assert_eq!(reader.last_checksum(), checksum);
    }

    #[test]
    fn mismatched_transaction_versions_are_rejected() {
        let mut writer = LogEntryWriter::new(InMemoryChannel::new(0));
        let start = StartEntry::new(KernelVersion::V5_10, 1, TransactionId::BASE, 0);
        let commit = CommitEntry::new(KernelVersion::V5_20, TransactionId::new(2), 1);
        assert!(writer.write_transaction(&start, &[], &commit).is_err());
        assert!(writer.into_inner().as_bytes().is_empty());
    }

    #[test]
    fn entry_type_missing_from_the_version_is_rejected() {
        let mut writer = LogEntryWriter::new(InMemoryChannel::new(0));
        let inline = LogEntry::InlineCheckpoint(InlineCheckpointEntry {
            kernel_version: KernelVersion::V5_0,
            log_position: LogPosition::new(1, 16),
        });
        assert!(matches!(
            writer.write(&inline),
            Err(LogError::UnknownEntryType { entry_type: 7, .. })
        ));

        let rollback = LogEntry::Rollback(RollbackEntry {
            kernel_version: KernelVersion::V5_0,
            tx_id: TransactionId::new(3),
            append_index: 1,
            time_written: 1,
            checksum: None,
        });
        assert!(writer.write(&rollback).is_err());
        assert!(writer.channel().as_bytes().is_empty());
    }
}
