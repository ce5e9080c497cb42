//! Command and commit codecs, shared by every version.

use super::{
    read_trailing_checksum, wrong_entry, write_trailing_checksum, EntryCodec, ParseContext,
};
use crate::channel::{ReadableChannel, WritableChannel};
use crate::entry::{CommandEntry, CommitEntry, LogEntry, LogEntryType};
use crate::error::LogResult;
use crate::types::TransactionId;

/// Command entry: the storage engine's payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandCodec;

impl EntryCodec for CommandCodec {
    fn entry_type(&self) -> LogEntryType {
        LogEntryType::Command
    }

    fn parse(
        &self,
        ctx: ParseContext<'_>,
        channel: &mut dyn ReadableChannel,
    ) -> LogResult<LogEntry> {
        let command = ctx.commands.reader(ctx.kernel_version)?.read(channel)?;
        read_trailing_checksum(ctx.kernel_version, channel)?;
        Ok(LogEntry::Command(CommandEntry::new(
            ctx.kernel_version,
            command,
        )))
    }

    fn write(
        &self,
        entry: &LogEntry,
        channel: &mut dyn WritableChannel,
    ) -> LogResult<Option<u32>> {
        let LogEntry::Command(command) = entry else {
            return Err(wrong_entry(LogEntryType::Command, entry));
        };
        command.command.serialize(channel)?;
        write_trailing_checksum(command.kernel_version, channel)
    }
}

/// Commit entry: transaction id and commit time.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitCodec;

impl EntryCodec for CommitCodec {
    fn entry_type(&self) -> LogEntryType {
        LogEntryType::Commit
    }

    fn parse(
        &self,
        ctx: ParseContext<'_>,
        channel: &mut dyn ReadableChannel,
    ) -> LogResult<LogEntry> {
        let tx_id = channel.get_u64()?;
        let time_written = channel.get_u64()?;
        let checksum = read_trailing_checksum(ctx.kernel_version, channel)?;
        Ok(LogEntry::Commit(CommitEntry {
            kernel_version: ctx.kernel_version,
            tx_id: TransactionId::new(tx_id),
            time_written,
            checksum,
        }))
    }

    fn write(
        &self,
        entry: &LogEntry,
        channel: &mut dyn WritableChannel,
    ) -> LogResult<Option<u32>> {
        let LogEntry::Commit(commit) = entry else {
            return Err(wrong_entry(LogEntryType::Commit, entry));
        };
        channel.put_u64(commit.tx_id.as_u64())?;
        channel.put_u64(commit.time_written)?;
        write_trailing_checksum(commit.kernel_version, channel)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{parse_framed, round_trip};
    use super::*;
    use crate::entry::OpaqueCommand;
    use crate::error::LogError;
    use crate::version::KernelVersion;
    use std::sync::Arc;

    #[test]
    fn commit_exposes_its_checksum() {
        let entry = LogEntry::Commit(CommitEntry::new(
            KernelVersion::V5_0,
            TransactionId::new(17),
            123,
        ));
        let (parsed, bytes) = round_trip(&CommitCodec, &entry);
        let stored = u32::from_be_bytes(bytes[bytes.len() - 4..].try_into().unwrap());
        assert_eq!(stored, crc32fast::hash(&bytes[..bytes.len() - 4]));
        assert_eq!(parsed.checksum(), Some(stored));
        assert_eq!(parsed, entry.with_checksum(Some(stored)));
    }

    #[test]
    fn commit_before_checksums() {
        let entry = LogEntry::Commit(CommitEntry::new(
            KernelVersion::V4_0,
            TransactionId::new(2),
            3,
        ));
        let (parsed, bytes) = round_trip(&CommitCodec, &entry);
        assert_eq!(bytes.len(), 18);
        assert_eq!(parsed, entry);
    }

    #[test]
    fn command_payload_round_trips() {
        let entry = LogEntry::Command(CommandEntry::new(
            KernelVersion::V4_2,
            Arc::new(OpaqueCommand::new(b"node 1 created".to_vec())),
        ));
        let (parsed, _) = round_trip(&CommandCodec, &entry);
        assert_eq!(parsed, entry);
    }

    #[test]
    fn every_byte_of_a_commit_is_covered() {
        let entry = LogEntry::Commit(CommitEntry::new(
            KernelVersion::V5_20,
            TransactionId::new(99),
            456,
        ));
        let (_, bytes) = round_trip(&CommitCodec, &entry);
        // The version byte is covered too, but flipping it changes the
        // version rather than the payload.
        for i in 1..bytes.len() {
            let mut corrupted = bytes.clone();
            corrupted[i] ^= 0x01;
            assert!(
                matches!(
                    parse_framed(&CommitCodec, &corrupted),
                    Err(LogError::ChecksumMismatch { .. })
                ),
                "flip at {i} went unnoticed"
            );
        }
    }

    #[test]
    fn codec_rejects_other_entries() {
        let entry = LogEntry::Commit(CommitEntry::new(
            KernelVersion::V5_0,
            TransactionId::new(1),
            1,
        ));
        let mut ch = crate::channel::InMemoryChannel::new(0);
        assert!(matches!(
            CommandCodec.write(&entry, &mut ch),
            Err(LogError::InvalidArgument { .. })
        ));
    }
}
