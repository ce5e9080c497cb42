//! Version-aware log entry reader.
//!
//! Every entry starts with its kernel version byte, so a single log may
//! switch versions at any entry boundary (an upgrade happened while the file
//! was open). The reader resolves the serialization set per entry and keeps
//! the last one cached, since consecutive entries almost always share it.

use crate::channel::{ReadableChannel, ReversedByteOrderChannel};
use crate::codec::{serialization_set, LogEntrySerializationSet, ParseContext};
use crate::config::ReaderConfig;
use crate::entry::{CommandReaderFactory, LogEntry, OpaqueCommandReaderFactory};
use crate::error::{LogError, LogResult};
use crate::types::LogPosition;
use crate::version::KernelVersion;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reads log entries of any supported kernel version from a channel.
///
/// One instance follows one stream: it caches the active serialization set,
/// the checksum the last transaction ended with, and the position of the
/// entry being read. Independent readers over independent channels may run
/// on separate threads.
pub struct VersionAwareLogEntryReader {
    commands: Arc<dyn CommandReaderFactory>,
    config: ReaderConfig,
    current_set: Option<&'static LogEntrySerializationSet>,
    last_position: LogPosition,
    last_checksum: Option<u32>,
}

impl VersionAwareLogEntryReader {
    /// Creates a reader that decodes commands with `commands`.
    pub fn new(commands: Arc<dyn CommandReaderFactory>, config: ReaderConfig) -> Self {
        Self {
            commands,
            config,
            current_set: None,
            last_position: LogPosition::UNSPECIFIED,
            last_checksum: None,
        }
    }

    /// Creates a reader that keeps command payloads as opaque bytes.
    pub fn with_opaque_commands(config: ReaderConfig) -> Self {
        Self::new(Arc::new(OpaqueCommandReaderFactory), config)
    }

    /// Seeds the checksum the first start entry must link to.
    ///
    /// Used when a stream continues the transactions of an earlier file.
    #[must_use]
    pub fn expect_previous_checksum(mut self, checksum: u32) -> Self {
        self.last_checksum = Some(checksum);
        self
    }

    /// Reads the next entry.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly: no bytes are left, or
    /// a zero version byte marks the start of pre-allocated space. In the
    /// latter case the channel is rewound so the zero byte can be read again.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ReadPastEnd`] if an entry was begun but its bytes
    /// run out, an unsupported version error for a version byte outside the
    /// supported range, [`LogError::UnknownEntryType`] for a type byte the
    /// version does not know, and [`LogError::ChecksumChainBroken`] when chain
    /// verification is enabled and a start entry does not link to the
    /// previous transaction. Parse failures, a [`LogError::ChecksumMismatch`]
    /// on a damaged entry included, are wrapped in [`LogError::EntryParse`]
    /// naming the entry's start, version and type.
    pub fn read_log_entry(
        &mut self,
        channel: &mut dyn ReadableChannel,
    ) -> LogResult<Option<LogEntry>> {
        let position = channel.position();
        self.last_position = position;
        channel.begin_checksum();

        let code = match channel.get_i8() {
            Ok(code) => code,
            Err(e) if e.is_read_past_end() => return Ok(None),
            Err(e) => return Err(e),
        };
        if code == 0 {
            channel.set_position(position.byte_offset)?;
            return Ok(None);
        }

        let set = self.select_set(code, position)?;
        let kernel_version = set.kernel_version();
        let entry_type = channel.get_u8()?;
        let codec = set.lookup(entry_type).ok_or(LogError::UnknownEntryType {
            kernel_version,
            entry_type,
            position,
        })?;

        let ctx = ParseContext {
            kernel_version,
            start_position: position,
            commands: self.commands.as_ref(),
        };
        let parsed = if set.legacy_byte_order() {
            codec.parse(ctx, &mut ReversedByteOrderChannel::new(channel))
        } else {
            codec.parse(ctx, channel)
        };
        let entry = parsed.map_err(|e| {
            if e.has_position() {
                e
            } else {
                LogError::EntryParse {
                    kernel_version,
                    entry_type,
                    position,
                    source: Box::new(e),
                }
            }
        })?;

        self.follow_chain(&entry, position)?;
        Ok(Some(entry))
    }

    /// Position of the entry most recently read, or where the stream ended.
    #[must_use]
    pub fn last_position(&self) -> LogPosition {
        self.last_position
    }

    /// Checksum of the last commit, rollback or chunk end read.
    #[must_use]
    pub fn last_checksum(&self) -> Option<u32> {
        self.last_checksum
    }

    /// Version of the most recent entry read.
    #[must_use]
    pub fn current_kernel_version(&self) -> Option<KernelVersion> {
        self.current_set.map(LogEntrySerializationSet::kernel_version)
    }

    fn select_set(
        &mut self,
        code: i8,
        position: LogPosition,
    ) -> LogResult<&'static LogEntrySerializationSet> {
        if let Some(set) = self.current_set {
            if set.kernel_version().code() == code {
                return Ok(set);
            }
        }
        let version = KernelVersion::from_code(code)
            .map_err(|resolution| LogError::unsupported_version(code, resolution, position))?;
        let set = serialization_set(version);
        if let Some(previous) = self.current_set {
            debug!(
                from = %previous.kernel_version(),
                to = %version,
                %position,
                "kernel version changed within log"
            );
        }
        self.current_set = Some(set);
        Ok(set)
    }

    fn follow_chain(&mut self, entry: &LogEntry, position: LogPosition) -> LogResult<()> {
        match entry {
            LogEntry::Start(start) => {
                if !self.config.verify_checksum_chain || !start.kernel_version.has_entry_checksums()
                {
                    return Ok(());
                }
                if let Some(expected) = self.last_checksum {
                    if start.previous_checksum != expected {
                        warn!(
                            expected = format_args!("{expected:#010x}"),
                            actual = format_args!("{:#010x}", start.previous_checksum),
                            %position,
                            "start entry does not link to the previous transaction"
                        );
                        return Err(LogError::ChecksumChainBroken {
                            kernel_version: start.kernel_version,
                            expected,
                            actual: start.previous_checksum,
                            position,
                        });
                    }
                }
            }
            closing if closing.is_closing() => {
                if let Some(checksum) = closing.checksum() {
                    self.last_checksum = Some(checksum);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Default for VersionAwareLogEntryReader {
    fn default() -> Self {
        Self::with_opaque_commands(ReaderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{InMemoryChannel, WritableChannel};
    use crate::entry::{
        CommandEntry, CommitEntry, DetachedCheckpointEntry, LogEntryType, OpaqueCommand,
        StartEntry, StorageCommand,
    };
    use crate::store_id::{LegacyStoreId, StoreIdentity};
    use crate::types::{TransactionId, BASE_TX_CHECKSUM};
    use crate::writer::LogEntryWriter;

    fn start(version: KernelVersion, previous_checksum: u32) -> StartEntry {
        StartEntry::new(version, 1_000, TransactionId::new(42), previous_checksum)
    }

    /// Writes one transaction per version, chaining checksums, and returns
    /// the bytes plus the entries as they should read back.
    fn log_with(versions: &[KernelVersion]) -> (Vec<u8>, Vec<LogEntry>) {
        let mut writer = LogEntryWriter::new(InMemoryChannel::new(0));
        let mut expected = Vec::new();
        let mut previous = BASE_TX_CHECKSUM;
        for (i, version) in versions.iter().enumerate() {
            let tx = TransactionId::new(43 + i as u64);
            let start = start(*version, if version.has_entry_checksums() { previous } else { 0 });
            let command: Arc<dyn StorageCommand> = Arc::new(OpaqueCommand::new(vec![i as u8; 5]));
            let commit = CommitEntry::new(*version, tx, 2_000);
            let checksum = writer
                .write_transaction(&start, &[command.clone()], &commit)
                .unwrap();
            if let Some(checksum) = checksum {
                previous = checksum;
            }
            expected.push(LogEntry::Start(start));
            expected.push(LogEntry::Command(CommandEntry::new(*version, command)));
            expected.push(LogEntry::Commit(CommitEntry {
                checksum,
                ..commit
            }));
        }
        (writer.into_inner().into_bytes(), expected)
    }

    fn read_all(
        reader: &mut VersionAwareLogEntryReader,
        ch: &mut InMemoryChannel,
    ) -> LogResult<Vec<LogEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = reader.read_log_entry(ch)? {
            entries.push(entry);
        }
        Ok(entries)
    }

    #[test]
    fn reads_across_version_changes() {
        let (bytes, expected) = log_with(&[
            KernelVersion::V2_3,
            KernelVersion::V4_2,
            KernelVersion::V5_7,
            KernelVersion::V5_20,
        ]);
        let mut reader = VersionAwareLogEntryReader::default();
        let mut ch = InMemoryChannel::from_bytes(0, bytes);
        assert_eq!(read_all(&mut reader, &mut ch).unwrap(), expected);
        assert_eq!(reader.current_kernel_version(), Some(KernelVersion::V5_20));
    }

    #[test]
    fn zero_version_byte_ends_the_stream_and_rewinds() {
        let (mut bytes, expected) = log_with(&[KernelVersion::V5_10]);
        let end = bytes.len() as u64;
        bytes.extend_from_slice(&[0u8; 16]);

        let mut reader = VersionAwareLogEntryReader::default();
        let mut ch = InMemoryChannel::from_bytes(0, bytes);
        assert_eq!(read_all(&mut reader, &mut ch).unwrap(), expected);
        assert_eq!(ReadableChannel::position(&ch), LogPosition::new(0, end));
        assert_eq!(reader.last_position(), LogPosition::new(0, end));
        // Reading again observes the same terminator.
        assert!(reader.read_log_entry(&mut ch).unwrap().is_none());
    }

    #[test]
    fn partial_entry_is_truncation() {
        let (mut bytes, expected) = log_with(&[KernelVersion::V5_10]);
        let start_of_partial = bytes.len() as u64;
        // Version and type of a commit, then half its payload.
        bytes.extend_from_slice(&[KernelVersion::V5_10.code() as u8, 5, 0, 0, 0]);

        let mut reader = VersionAwareLogEntryReader::default();
        let mut ch = InMemoryChannel::from_bytes(0, bytes);
        for entry in &expected {
            assert_eq!(reader.read_log_entry(&mut ch).unwrap().as_ref(), Some(entry));
        }
        let err = reader.read_log_entry(&mut ch).unwrap_err();
        assert!(err.is_read_past_end());
        assert_eq!(reader.last_position(), LogPosition::new(0, start_of_partial));
    }

    #[test]
    fn version_bounds_have_distinct_errors() {
        let mut reader = VersionAwareLogEntryReader::default();

        let too_new = KernelVersion::LATEST.code() + 1;
        let mut ch = InMemoryChannel::from_bytes(4, vec![too_new as u8, 1]);
        match reader.read_log_entry(&mut ch) {
            Err(LogError::KernelVersionTooNew { code, position, .. }) => {
                assert_eq!(code, too_new);
                assert_eq!(position, LogPosition::new(4, 0));
            }
            other => panic!("expected KernelVersionTooNew, got {other:?}"),
        }

        let too_old = KernelVersion::EARLIEST.code() - 1;
        let mut ch = InMemoryChannel::from_bytes(4, vec![too_old as u8, 1]);
        assert!(matches!(
            reader.read_log_entry(&mut ch),
            Err(LogError::KernelVersionTooOld { code, .. }) if code == too_old
        ));

        let mut ch = InMemoryChannel::from_bytes(4, vec![6, 1]);
        assert!(matches!(
            reader.read_log_entry(&mut ch),
            Err(LogError::UnknownKernelVersion { code: 6, .. })
        ));
    }

    #[test]
    fn unknown_type_names_version_and_type() {
        let mut reader = VersionAwareLogEntryReader::default();
        // Rollback does not exist before 5.7.
        let mut ch = InMemoryChannel::from_bytes(0, vec![KernelVersion::V5_0.code() as u8, 12]);
        match reader.read_log_entry(&mut ch) {
            Err(LogError::UnknownEntryType {
                kernel_version,
                entry_type,
                position,
            }) => {
                assert_eq!(kernel_version, KernelVersion::V5_0);
                assert_eq!(entry_type, 12);
                assert_eq!(position, LogPosition::new(0, 0));
            }
            other => panic!("expected UnknownEntryType, got {other:?}"),
        }
    }

    #[test]
    fn damaged_entry_fails_its_checksum() {
        let (mut bytes, _) = log_with(&[KernelVersion::V5_20]);
        bytes[5] ^= 0x40;
        let mut reader = VersionAwareLogEntryReader::default();
        let mut ch = InMemoryChannel::from_bytes(0, bytes);
        assert!(matches!(
            reader.read_log_entry(&mut ch),
            Err(LogError::EntryParse { .. })
        ));
    }

    #[test]
    fn checksum_mismatch_names_the_damaged_entry() {
        let (mut bytes, expected) = log_with(&[KernelVersion::V4_4, KernelVersion::V5_20]);
        // Second transaction: start, command, then the commit being damaged.
        let mut prefix = LogEntryWriter::new(InMemoryChannel::new(0));
        for entry in &expected[..5] {
            prefix.write(entry).unwrap();
        }
        let commit_at = prefix.into_inner().into_bytes().len();
        bytes[commit_at + 4] ^= 0x01;

        let mut reader = VersionAwareLogEntryReader::default();
        let mut ch = InMemoryChannel::from_bytes(7, bytes);
        for entry in &expected[..5] {
            assert_eq!(reader.read_log_entry(&mut ch).unwrap().as_ref(), Some(entry));
        }
        match reader.read_log_entry(&mut ch) {
            Err(LogError::EntryParse {
                kernel_version,
                entry_type,
                position,
                source,
            }) => {
                assert_eq!(kernel_version, KernelVersion::V5_20);
                assert_eq!(entry_type, 5);
                assert_eq!(position, LogPosition::new(7, commit_at as u64));
                match *source {
                    LogError::ChecksumMismatch {
                        position: stored_at,
                        ..
                    } => assert_eq!(stored_at, LogPosition::new(7, commit_at as u64 + 18)),
                    other => panic!("expected ChecksumMismatch, got {other:?}"),
                }
            }
            other => panic!("expected EntryParse, got {other:?}"),
        }
    }

    #[test]
    fn malformed_fields_are_wrapped_with_position() {
        let mut writer = LogEntryWriter::new(InMemoryChannel::new(2));
        writer
            .write(&LogEntry::Start(start(KernelVersion::V5_20, BASE_TX_CHECKSUM)))
            .unwrap();
        let mut bytes = writer.into_inner().into_bytes();
        // Additional header length beyond the allowed maximum.
        let len_at = 2 + 8 + 8 + 8 + 4;
        bytes[len_at..len_at + 4].copy_from_slice(&100u32.to_be_bytes());

        let mut reader = VersionAwareLogEntryReader::default();
        let mut ch = InMemoryChannel::from_bytes(2, bytes);
        match reader.read_log_entry(&mut ch) {
            Err(LogError::EntryParse {
                kernel_version,
                entry_type,
                position,
                source,
            }) => {
                assert_eq!(kernel_version, KernelVersion::V5_20);
                assert_eq!(entry_type, 1);
                assert_eq!(position, LogPosition::new(2, 0));
                assert!(matches!(*source, LogError::Corrupted { .. }));
            }
            other => panic!("expected EntryParse, got {other:?}"),
        }
    }

    #[test]
    fn broken_chain_is_only_reported_when_enabled() {
        let mut writer = LogEntryWriter::new(InMemoryChannel::new(0));
        let commit = CommitEntry::new(KernelVersion::V5_20, TransactionId::new(2), 5);
        writer
            .write_transaction(&start(KernelVersion::V5_20, BASE_TX_CHECKSUM), &[], &commit)
            .unwrap();
        // Links to a checksum that never ended a transaction.
        writer
            .write_transaction(&start(KernelVersion::V5_20, 0xBAD0_BAD0), &[], &commit)
            .unwrap();
        let bytes = writer.into_inner().into_bytes();

        let mut lenient = VersionAwareLogEntryReader::default();
        let mut ch = InMemoryChannel::from_bytes(0, bytes.clone());
        assert_eq!(read_all(&mut lenient, &mut ch).unwrap().len(), 4);

        let mut strict = VersionAwareLogEntryReader::with_opaque_commands(
            ReaderConfig::new().verify_checksum_chain(true),
        )
        .expect_previous_checksum(BASE_TX_CHECKSUM);
        let mut ch = InMemoryChannel::from_bytes(0, bytes);
        match read_all(&mut strict, &mut ch) {
            Err(LogError::ChecksumChainBroken {
                kernel_version,
                actual,
                ..
            }) => {
                assert_eq!(kernel_version, KernelVersion::V5_20);
                assert_eq!(actual, 0xBAD0_BAD0);
            }
            other => panic!("expected ChecksumChainBroken, got {other:?}"),
        }
    }

    #[test]
    fn legacy_checkpoint_under_5x_reads_and_writes_back() {
        let checkpoint = DetachedCheckpointEntry {
            kernel_version: KernelVersion::V4_4,
            transaction: None,
            log_position: LogPosition::new(3, 256),
            time: 77,
            store_id: StoreIdentity::Legacy(LegacyStoreId {
                creation_time: 1,
                random_id: 2,
                store_version: 3,
                upgrade_time: 4,
                upgrade_tx_id: 5,
            }),
            reason: "upgrade".into(),
        };
        let mut writer = LogEntryWriter::new(InMemoryChannel::new(0));
        writer
            .write(&LogEntry::DetachedCheckpoint(checkpoint.clone()))
            .unwrap();
        let written = writer.into_inner().into_bytes();
        assert_eq!(written[1], LogEntryType::DetachedCheckpoint.as_byte());

        for version in [KernelVersion::V5_0, KernelVersion::V5_20] {
            // The same entry stamped with a 5.x version byte.
            let mut bytes = written.clone();
            bytes[0] = version.code() as u8;
            let crc_at = bytes.len() - 4;
            let crc = crc32fast::hash(&bytes[..crc_at]);
            bytes[crc_at..].copy_from_slice(&crc.to_be_bytes());

            let mut reader = VersionAwareLogEntryReader::default();
            let mut ch = InMemoryChannel::from_bytes(0, bytes.clone());
            let entry = reader.read_log_entry(&mut ch).unwrap().unwrap();
            assert_eq!(entry.entry_type(), LogEntryType::DetachedCheckpoint, "{version}");
            assert_eq!(
                entry,
                LogEntry::DetachedCheckpoint(DetachedCheckpointEntry {
                    kernel_version: version,
                    ..checkpoint.clone()
                })
            );

            let mut writer = LogEntryWriter::new(InMemoryChannel::new(0));
            writer.write(&entry).unwrap();
            assert_eq!(writer.into_inner().into_bytes(), bytes, "{version}");
        }
    }

    #[test]
    fn empty_stream_ends_cleanly() {
        let mut reader = VersionAwareLogEntryReader::default();
        let mut ch = InMemoryChannel::new(0);
        assert!(reader.read_log_entry(&mut ch).unwrap().is_none());
        assert_eq!(reader.last_position(), LogPosition::new(0, 0));
        assert_eq!(WritableChannel::position(&ch).byte_offset, 0);
    }
}
