//! Checkpoint codecs.
//!
//! Detached checkpoint layouts by version:
//!
//! | codec | type | fields |
//! |-------|------|--------|
//! | [`DetachedCheckpointV4_2`] | 8 | position, time, legacy store id, reason (120) |
//! | [`DetachedCheckpointV5_0`] | 9 | tx id, tx version, tx checksum, tx commit time, position, time, store id, reason (512) |
//! | [`DetachedCheckpointV5_10`] | 9 | as 5.0 with the tx append index after the tx checksum |
//!
//! 5.x sets keep type 8 registered, so a 4.2 layout read under 5.x is
//! written back as type 8.

use super::{
    read_position, read_trailing_checksum, unrepresentable, wrong_entry,
    write_position, write_trailing_checksum, EntryCodec, ParseContext,
};
use crate::channel::{ReadableChannel, WritableChannel};
use crate::entry::{
    truncate_reason, CheckpointTransaction, DetachedCheckpointEntry, InlineCheckpointEntry,
    LogEntry, LogEntryType, MAX_REASON_LENGTH_V4, MAX_REASON_LENGTH_V5,
};
use crate::error::{LogError, LogResult};
use crate::store_id::{
    LegacyStoreId, StoreId, StoreIdentity, LEGACY_STORE_ID_SIZE, STORE_ID_SIZE,
};
use crate::types::TransactionId;
use crate::version::KernelVersion;

/// Checkpoint written inline in the transaction stream before 4.2.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineCheckpoint;

impl EntryCodec for InlineCheckpoint {
    fn entry_type(&self) -> LogEntryType {
        LogEntryType::InlineCheckpoint
    }

    fn parse(
        &self,
        ctx: ParseContext<'_>,
        channel: &mut dyn ReadableChannel,
    ) -> LogResult<LogEntry> {
        let log_position = read_position(channel)?;
        read_trailing_checksum(ctx.kernel_version, channel)?;
        Ok(LogEntry::InlineCheckpoint(InlineCheckpointEntry {
            kernel_version: ctx.kernel_version,
            log_position,
        }))
    }

    fn write(
        &self,
        entry: &LogEntry,
        channel: &mut dyn WritableChannel,
    ) -> LogResult<Option<u32>> {
        let LogEntry::InlineCheckpoint(checkpoint) = entry else {
            return Err(wrong_entry(LogEntryType::InlineCheckpoint, entry));
        };
        write_position(channel, checkpoint.log_position)?;
        write_trailing_checksum(checkpoint.kernel_version, channel)
    }
}

/// Which optional parts a detached checkpoint layout has.
#[derive(Clone, Copy)]
struct Layout {
    entry_type: LogEntryType,
    transaction: bool,
    append_index: bool,
    reason_length: usize,
}

const LAYOUT_V4_2: Layout = Layout {
    entry_type: LogEntryType::DetachedCheckpoint,
    transaction: false,
    append_index: false,
    reason_length: MAX_REASON_LENGTH_V4,
};

const LAYOUT_V5_0: Layout = Layout {
    entry_type: LogEntryType::DetachedCheckpointV5,
    transaction: true,
    append_index: false,
    reason_length: MAX_REASON_LENGTH_V5,
};

const LAYOUT_V5_10: Layout = Layout {
    entry_type: LogEntryType::DetachedCheckpointV5,
    transaction: true,
    append_index: true,
    reason_length: MAX_REASON_LENGTH_V5,
};

fn parse_detached(
    layout: Layout,
    ctx: ParseContext<'_>,
    channel: &mut dyn ReadableChannel,
) -> LogResult<LogEntry> {
    let transaction = if layout.transaction {
        let tx_id = TransactionId::new(channel.get_u64()?);
        let code = channel.get_i8()?;
        let kernel_version = KernelVersion::from_code(code).map_err(|_| {
            LogError::corrupted(format!(
                "checkpoint names unknown transaction kernel version {code}"
            ))
        })?;
        let checksum = channel.get_u32()?;
        let append_index = if layout.append_index {
            channel.get_u64()?
        } else {
            0
        };
        let commit_timestamp = channel.get_u64()?;
        Some(CheckpointTransaction {
            tx_id,
            kernel_version,
            checksum,
            commit_timestamp,
            append_index,
        })
    } else {
        None
    };

    let log_position = read_position(channel)?;
    let time = channel.get_u64()?;
    let store_id = if layout.transaction {
        let slot = channel.get_bytes(STORE_ID_SIZE)?;
        StoreIdentity::Modern(StoreId::decode(&mut &slot[..])?)
    } else {
        let slot = channel.get_bytes(LEGACY_STORE_ID_SIZE)?;
        StoreIdentity::Legacy(LegacyStoreId::decode(&mut &slot[..])?)
    };
    let reason = read_reason(channel, layout.reason_length)?;
    read_trailing_checksum(ctx.kernel_version, channel)?;

    Ok(LogEntry::DetachedCheckpoint(DetachedCheckpointEntry {
        kernel_version: ctx.kernel_version,
        transaction,
        log_position,
        time,
        store_id,
        reason,
    }))
}

fn write_detached(
    layout: Layout,
    entry: &LogEntry,
    channel: &mut dyn WritableChannel,
) -> LogResult<Option<u32>> {
    let LogEntry::DetachedCheckpoint(checkpoint) = entry else {
        return Err(wrong_entry(layout.entry_type, entry));
    };
    let version = checkpoint.kernel_version;

    match (layout.transaction, &checkpoint.transaction) {
        (true, Some(tx)) => {
            if !layout.append_index && tx.append_index != 0 {
                return Err(unrepresentable("checkpoint transaction append index", version));
            }
            channel.put_u64(tx.tx_id.as_u64())?;
            channel.put_i8(tx.kernel_version.code())?;
            channel.put_u32(tx.checksum)?;
            if layout.append_index {
                channel.put_u64(tx.append_index)?;
            }
            channel.put_u64(tx.commit_timestamp)?;
        }
        (true, None) => {
            return Err(LogError::invalid_argument(format!(
                "detached checkpoints under kernel version {version} need transaction info"
            )));
        }
        (false, Some(_)) => {
            return Err(unrepresentable("checkpoint transaction info", version));
        }
        (false, None) => {}
    }

    write_position(channel, checkpoint.log_position)?;
    channel.put_u64(checkpoint.time)?;
    match (&checkpoint.store_id, layout.transaction) {
        (StoreIdentity::Modern(id), true) => channel.put_bytes(&id.to_bytes()?)?,
        (StoreIdentity::Legacy(id), false) => channel.put_bytes(&id.to_bytes())?,
        (other, _) => {
            return Err(LogError::invalid_argument(format!(
                "store identity {other:?} cannot be written in a kernel version {version} checkpoint"
            )));
        }
    }
    write_reason(channel, &checkpoint.reason, layout.reason_length)?;
    write_trailing_checksum(version, channel)
}

/// Reads `[len: u16][reason][zero padding]`, always consuming `2 + max` bytes.
fn read_reason(channel: &mut dyn ReadableChannel, max: usize) -> LogResult<String> {
    let len = usize::from(channel.get_u16()?);
    let padded = channel.get_bytes(max)?;
    if len > max {
        return Err(LogError::corrupted(format!(
            "checkpoint reason length {len} exceeds {max}"
        )));
    }
    String::from_utf8(padded[..len].to_vec())
        .map_err(|_| LogError::corrupted("checkpoint reason is not UTF-8"))
}

/// Writes the reason truncated to `max` bytes and padded to `max`.
fn write_reason(channel: &mut dyn WritableChannel, reason: &str, max: usize) -> LogResult<()> {
    let reason = truncate_reason(reason, max);
    let mut padded = vec![0u8; max];
    padded[..reason.len()].copy_from_slice(reason.as_bytes());
    // `max` never exceeds u16.
    channel.put_u16(reason.len() as u16)?;
    channel.put_bytes(&padded)
}

/// Detached checkpoint, 4.2 layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedCheckpointV4_2;

impl EntryCodec for DetachedCheckpointV4_2 {
    fn entry_type(&self) -> LogEntryType {
        LAYOUT_V4_2.entry_type
    }

    fn parse(
        &self,
        ctx: ParseContext<'_>,
        channel: &mut dyn ReadableChannel,
    ) -> LogResult<LogEntry> {
        parse_detached(LAYOUT_V4_2, ctx, channel)
    }

    fn write(
        &self,
        entry: &LogEntry,
        channel: &mut dyn WritableChannel,
    ) -> LogResult<Option<u32>> {
        write_detached(LAYOUT_V4_2, entry, channel)
    }
}

/// Detached checkpoint, 5.0 layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedCheckpointV5_0;

impl EntryCodec for DetachedCheckpointV5_0 {
    fn entry_type(&self) -> LogEntryType {
        LAYOUT_V5_0.entry_type
    }

    fn parse(
        &self,
        ctx: ParseContext<'_>,
        channel: &mut dyn ReadableChannel,
    ) -> LogResult<LogEntry> {
        parse_detached(LAYOUT_V5_0, ctx, channel)
    }

    fn write(
        &self,
        entry: &LogEntry,
        channel: &mut dyn WritableChannel,
    ) -> LogResult<Option<u32>> {
        write_detached(LAYOUT_V5_0, entry, channel)
    }
}

/// Detached checkpoint, 5.10 layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedCheckpointV5_10;

impl EntryCodec for DetachedCheckpointV5_10 {
    fn entry_type(&self) -> LogEntryType {
        LAYOUT_V5_10.entry_type
    }

    fn parse(
        &self,
        ctx: ParseContext<'_>,
        channel: &mut dyn ReadableChannel,
    ) -> LogResult<LogEntry> {
        parse_detached(LAYOUT_V5_10, ctx, channel)
    }

    fn write(
        &self,
        entry: &LogEntry,
        channel: &mut dyn WritableChannel,
    ) -> LogResult<Option<u32>> {
        write_detached(LAYOUT_V5_10, entry, channel)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::round_trip;
    use super::*;
    use crate::channel::InMemoryChannel;
    use crate::types::LogPosition;

    fn tx(append_index: u64) -> CheckpointTransaction {
        CheckpointTransaction {
            tx_id: TransactionId::new(300),
            kernel_version: KernelVersion::V5_0,
            checksum: 0xABCD_0123,
            commit_timestamp: 1_650_000_000_000,
            append_index,
        }
    }

    fn v5_checkpoint(kernel_version: KernelVersion, append_index: u64, reason: &str) -> LogEntry {
        LogEntry::DetachedCheckpoint(DetachedCheckpointEntry {
            kernel_version,
            transaction: Some(tx(append_index)),
            log_position: LogPosition::new(4, 1024),
            time: 1_650_000_000_500,
            store_id: StoreIdentity::Modern(StoreId::new(1, 2, "record", "standard", 5, 0)),
            reason: reason.to_string(),
        })
    }

    #[test]
    fn inline_checkpoint_round_trips() {
        let entry = LogEntry::InlineCheckpoint(InlineCheckpointEntry {
            kernel_version: KernelVersion::V2_3,
            log_position: LogPosition::new(1, 16),
        });
        let (parsed, bytes) = round_trip(&InlineCheckpoint, &entry);
        assert_eq!(parsed, entry);
        assert_eq!(bytes.len(), 18);
    }

    #[test]
    fn v4_2_checkpoint_round_trips() {
        let entry = LogEntry::DetachedCheckpoint(DetachedCheckpointEntry {
            kernel_version: KernelVersion::V4_2,
            transaction: None,
            log_position: LogPosition::new(2, 128),
            time: 55,
            store_id: StoreIdentity::Legacy(LegacyStoreId {
                creation_time: 1,
                random_id: 2,
                store_version: 3,
                upgrade_time: 4,
                upgrade_tx_id: 5,
            }),
            reason: "scheduled".into(),
        });
        let (parsed, bytes) = round_trip(&DetachedCheckpointV4_2, &entry);
        assert_eq!(parsed, entry);
        assert_eq!(bytes.len(), 2 + 16 + 8 + 40 + 2 + MAX_REASON_LENGTH_V4 + 4);
    }

    #[test]
    fn v5_checkpoints_round_trip() {
        let entry = v5_checkpoint(KernelVersion::V5_0, 0, "store copy");
        let (parsed, bytes) = round_trip(&DetachedCheckpointV5_0, &entry);
        assert_eq!(parsed, entry);
        assert_eq!(
            bytes.len(),
            2 + 8 + 1 + 4 + 8 + 16 + 8 + 64 + 2 + MAX_REASON_LENGTH_V5 + 4
        );

        let entry = v5_checkpoint(KernelVersion::V5_10, 808, "shutdown");
        let (parsed, v510) = round_trip(&DetachedCheckpointV5_10, &entry);
        assert_eq!(parsed, entry);
        assert_eq!(v510.len(), bytes.len() + 8);
    }

    #[test]
    fn long_reason_is_truncated() {
        let long = "x".repeat(MAX_REASON_LENGTH_V5 + 40);
        let entry = v5_checkpoint(KernelVersion::V5_10, 1, &long);
        let (parsed, _) = round_trip(&DetachedCheckpointV5_10, &entry);
        match parsed {
            LogEntry::DetachedCheckpoint(checkpoint) => {
                assert_eq!(checkpoint.reason.len(), MAX_REASON_LENGTH_V5);
            }
            other => panic!("expected checkpoint, got {other:?}"),
        }
    }

    #[test]
    fn layouts_reject_fields_they_lack() {
        let mut ch = InMemoryChannel::new(0);
        let entry = v5_checkpoint(KernelVersion::V5_0, 9, "");
        assert!(DetachedCheckpointV5_0.write(&entry, &mut ch).is_err());

        let mut entry = v5_checkpoint(KernelVersion::V5_0, 0, "");
        if let LogEntry::DetachedCheckpoint(checkpoint) = &mut entry {
            checkpoint.transaction = None;
        }
        assert!(DetachedCheckpointV5_0.write(&entry, &mut ch).is_err());

        let entry = v5_checkpoint(KernelVersion::V4_2, 0, "");
        assert!(DetachedCheckpointV4_2.write(&entry, &mut ch).is_err());
    }

    #[test]
    fn reason_length_overrun_is_corruption() {
        let entry = v5_checkpoint(KernelVersion::V5_0, 0, "ok");
        let (_, mut bytes) = round_trip(&DetachedCheckpointV5_0, &entry);
        let reason_at = 2 + 8 + 1 + 4 + 8 + 16 + 8 + 64;
        bytes[reason_at..reason_at + 2].copy_from_slice(&600u16.to_be_bytes());
        let result = super::super::test_support::parse_framed(&DetachedCheckpointV5_0, &bytes);
        assert!(matches!(result, Err(LogError::Corrupted { .. })));
    }
}
