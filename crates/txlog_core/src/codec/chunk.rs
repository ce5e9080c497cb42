//! Chunked transaction codecs (5.7+).

use super::{
    read_trailing_checksum, wrong_entry, write_trailing_checksum, EntryCodec, ParseContext,
};
use crate::channel::{ReadableChannel, WritableChannel};
use crate::entry::{ChunkEndEntry, ChunkStartEntry, LogEntry, LogEntryType, RollbackEntry};
use crate::error::LogResult;
use crate::types::TransactionId;

/// Chunk start: time, chunk id, append index, previous batch append index.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkStartCodec;

impl EntryCodec for ChunkStartCodec {
    fn entry_type(&self) -> LogEntryType {
        LogEntryType::ChunkStart
    }

    fn parse(
        &self,
        ctx: ParseContext<'_>,
        channel: &mut dyn ReadableChannel,
    ) -> LogResult<LogEntry> {
        let time_written = channel.get_u64()?;
        let chunk_id = channel.get_u64()?;
        let append_index = channel.get_u64()?;
        let previous_batch_append_index = channel.get_u64()?;
        read_trailing_checksum(ctx.kernel_version, channel)?;
        Ok(LogEntry::ChunkStart(ChunkStartEntry {
            kernel_version: ctx.kernel_version,
            time_written,
            chunk_id,
            append_index,
            previous_batch_append_index,
        }))
    }

    fn write(
        &self,
        entry: &LogEntry,
        channel: &mut dyn WritableChannel,
    ) -> LogResult<Option<u32>> {
        let LogEntry::ChunkStart(chunk) = entry else {
            return Err(wrong_entry(LogEntryType::ChunkStart, entry));
        };
        channel.put_u64(chunk.time_written)?;
        channel.put_u64(chunk.chunk_id)?;
        channel.put_u64(chunk.append_index)?;
        channel.put_u64(chunk.previous_batch_append_index)?;
        write_trailing_checksum(chunk.kernel_version, channel)
    }
}

/// Chunk end: transaction id and chunk id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkEndCodec;

impl EntryCodec for ChunkEndCodec {
    fn entry_type(&self) -> LogEntryType {
        LogEntryType::ChunkEnd
    }

    fn parse(
        &self,
        ctx: ParseContext<'_>,
        channel: &mut dyn ReadableChannel,
    ) -> LogResult<LogEntry> {
        let tx_id = channel.get_u64()?;
        let chunk_id = channel.get_u64()?;
        let checksum = read_trailing_checksum(ctx.kernel_version, channel)?;
        Ok(LogEntry::ChunkEnd(ChunkEndEntry {
            kernel_version: ctx.kernel_version,
            tx_id: TransactionId::new(tx_id),
            chunk_id,
            checksum,
        }))
    }

    fn write(
        &self,
        entry: &LogEntry,
        channel: &mut dyn WritableChannel,
    ) -> LogResult<Option<u32>> {
        let LogEntry::ChunkEnd(chunk) = entry else {
            return Err(wrong_entry(LogEntryType::ChunkEnd, entry));
        };
        channel.put_u64(chunk.tx_id.as_u64())?;
        channel.put_u64(chunk.chunk_id)?;
        write_trailing_checksum(chunk.kernel_version, channel)
    }
}

/// Rollback: transaction id, append index, time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollbackCodec;

impl EntryCodec for RollbackCodec {
    fn entry_type(&self) -> LogEntryType {
        LogEntryType::Rollback
    }

    fn parse(
        &self,
        ctx: ParseContext<'_>,
        channel: &mut dyn ReadableChannel,
    ) -> LogResult<LogEntry> {
        let tx_id = channel.get_u64()?;
        let append_index = channel.get_u64()?;
        let time_written = channel.get_u64()?;
        let checksum = read_trailing_checksum(ctx.kernel_version, channel)?;
        Ok(LogEntry::Rollback(RollbackEntry {
            kernel_version: ctx.kernel_version,
            tx_id: TransactionId::new(tx_id),
            append_index,
            time_written,
            checksum,
        }))
    }

    fn write(
        &self,
        entry: &LogEntry,
        channel: &mut dyn WritableChannel,
    ) -> LogResult<Option<u32>> {
        let LogEntry::Rollback(rollback) = entry else {
            return Err(wrong_entry(LogEntryType::Rollback, entry));
        };
        channel.put_u64(rollback.tx_id.as_u64())?;
        channel.put_u64(rollback.append_index)?;
        channel.put_u64(rollback.time_written)?;
        write_trailing_checksum(rollback.kernel_version, channel)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::round_trip;
    use super::*;
    use crate::version::KernelVersion;

    #[test]
    fn chunk_start_round_trips() {
        let entry = LogEntry::ChunkStart(ChunkStartEntry {
            kernel_version: KernelVersion::V5_7,
            time_written: 10,
            chunk_id: 2,
            append_index: 31,
            previous_batch_append_index: 30,
        });
        let (parsed, bytes) = round_trip(&ChunkStartCodec, &entry);
        assert_eq!(parsed, entry);
        assert_eq!(bytes.len(), 2 + 32 + 4);
    }

    #[test]
    fn chunk_end_and_rollback_carry_checksums() {
        let end = LogEntry::ChunkEnd(ChunkEndEntry {
            kernel_version: KernelVersion::V5_10,
            tx_id: TransactionId::new(8),
            chunk_id: 2,
            checksum: None,
        });
        let (parsed, bytes) = round_trip(&ChunkEndCodec, &end);
        let stored = crc32fast::hash(&bytes[..bytes.len() - 4]);
        assert_eq!(parsed, end.with_checksum(Some(stored)));

        let rollback = LogEntry::Rollback(RollbackEntry {
            kernel_version: KernelVersion::V5_20,
            tx_id: TransactionId::new(8),
            append_index: 33,
            time_written: 99,
            checksum: None,
        });
        let (parsed, bytes) = round_trip(&RollbackCodec, &rollback);
        let stored = crc32fast::hash(&bytes[..bytes.len() - 4]);
        assert_eq!(parsed.checksum(), Some(stored));
        assert_eq!(parsed.tx_id(), Some(TransactionId::new(8)));
    }
}
