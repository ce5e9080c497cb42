//! Start entry codecs.

use super::{
    get_sized_bytes, put_sized_bytes, read_trailing_checksum, unrepresentable, wrong_entry,
    write_trailing_checksum, EntryCodec, ParseContext,
};
use crate::channel::{ReadableChannel, WritableChannel};
use crate::entry::{
    LogEntry, LogEntryType, StartEntry, MAX_ADDITIONAL_HEADER_SIZE,
    MAX_LEGACY_ADDITIONAL_HEADER_SIZE,
};
use crate::error::LogResult;
use crate::types::TransactionId;

fn start_entry(entry: &LogEntry) -> LogResult<&StartEntry> {
    match entry {
        LogEntry::Start(start) => Ok(start),
        other => Err(wrong_entry(LogEntryType::Start, other)),
    }
}

/// Start entry before 4.2: time, last committed tx, additional header.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartV2_3;

impl EntryCodec for StartV2_3 {
    fn entry_type(&self) -> LogEntryType {
        LogEntryType::Start
    }

    fn parse(
        &self,
        ctx: ParseContext<'_>,
        channel: &mut dyn ReadableChannel,
    ) -> LogResult<LogEntry> {
        let time_written = channel.get_u64()?;
        let last_committed = channel.get_u64()?;
        let additional_header = get_sized_bytes(
            channel,
            MAX_LEGACY_ADDITIONAL_HEADER_SIZE,
            "additional header",
        )?;
        read_trailing_checksum(ctx.kernel_version, channel)?;

        let mut start = StartEntry::new(
            ctx.kernel_version,
            time_written,
            TransactionId::new(last_committed),
            0,
        )
        .with_additional_header(additional_header);
        start.start_position = ctx.start_position;
        Ok(LogEntry::Start(start))
    }

    fn write(
        &self,
        entry: &LogEntry,
        channel: &mut dyn WritableChannel,
    ) -> LogResult<Option<u32>> {
        let start = start_entry(entry)?;
        if start.append_index != 0 {
            return Err(unrepresentable("start append index", start.kernel_version));
        }
        if start.previous_checksum != 0 {
            return Err(unrepresentable("start previous checksum", start.kernel_version));
        }
        channel.put_u64(start.time_written)?;
        channel.put_u64(start.last_committed_tx_when_started.as_u64())?;
        put_sized_bytes(
            channel,
            &start.additional_header,
            MAX_LEGACY_ADDITIONAL_HEADER_SIZE,
            "additional header",
        )?;
        write_trailing_checksum(start.kernel_version, channel)
    }
}

/// Start entry from 4.2: adds the previous transaction's checksum.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartV4_2;

impl EntryCodec for StartV4_2 {
    fn entry_type(&self) -> LogEntryType {
        LogEntryType::Start
    }

    fn parse(
        &self,
        ctx: ParseContext<'_>,
        channel: &mut dyn ReadableChannel,
    ) -> LogResult<LogEntry> {
        let time_written = channel.get_u64()?;
        let last_committed = channel.get_u64()?;
        let previous_checksum = channel.get_u32()?;
        let additional_header = get_sized_bytes(
            channel,
            MAX_LEGACY_ADDITIONAL_HEADER_SIZE,
            "additional header",
        )?;
        read_trailing_checksum(ctx.kernel_version, channel)?;

        let mut start = StartEntry::new(
            ctx.kernel_version,
            time_written,
            TransactionId::new(last_committed),
            previous_checksum,
        )
        .with_additional_header(additional_header);
        start.start_position = ctx.start_position;
        Ok(LogEntry::Start(start))
    }

    fn write(
        &self,
        entry: &LogEntry,
        channel: &mut dyn WritableChannel,
    ) -> LogResult<Option<u32>> {
        let start = start_entry(entry)?;
        if start.append_index != 0 {
            return Err(unrepresentable("start append index", start.kernel_version));
        }
        channel.put_u64(start.time_written)?;
        channel.put_u64(start.last_committed_tx_when_started.as_u64())?;
        channel.put_u32(start.previous_checksum)?;
        put_sized_bytes(
            channel,
            &start.additional_header,
            MAX_LEGACY_ADDITIONAL_HEADER_SIZE,
            "additional header",
        )?;
        write_trailing_checksum(start.kernel_version, channel)
    }
}

/// Start entry from 5.10: adds the append index and bounds the additional
/// header to 8 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartV5_10;

impl EntryCodec for StartV5_10 {
    fn entry_type(&self) -> LogEntryType {
        LogEntryType::Start
    }

    fn parse(
        &self,
        ctx: ParseContext<'_>,
        channel: &mut dyn ReadableChannel,
    ) -> LogResult<LogEntry> {
        let time_written = channel.get_u64()?;
        let last_committed = channel.get_u64()?;
        let append_index = channel.get_u64()?;
        let previous_checksum = channel.get_u32()?;
        let additional_header =
            get_sized_bytes(channel, MAX_ADDITIONAL_HEADER_SIZE, "additional header")?;
        read_trailing_checksum(ctx.kernel_version, channel)?;

        let mut start = StartEntry::new(
            ctx.kernel_version,
            time_written,
            TransactionId::new(last_committed),
            previous_checksum,
        )
        .with_append_index(append_index)
        .with_additional_header(additional_header);
        start.start_position = ctx.start_position;
        Ok(LogEntry::Start(start))
    }

    fn write(
        &self,
        entry: &LogEntry,
        channel: &mut dyn WritableChannel,
    ) -> LogResult<Option<u32>> {
        let start = start_entry(entry)?;
        channel.put_u64(start.time_written)?;
        channel.put_u64(start.last_committed_tx_when_started.as_u64())?;
        channel.put_u64(start.append_index)?;
        channel.put_u32(start.previous_checksum)?;
        put_sized_bytes(
            channel,
            &start.additional_header,
            MAX_ADDITIONAL_HEADER_SIZE,
            "additional header",
        )?;
        write_trailing_checksum(start.kernel_version, channel)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{parse_framed, round_trip};
    use super::*;
    use crate::error::LogError;
    use crate::types::LogPosition;
    use crate::version::KernelVersion;

    #[test]
    fn start_scenario_round_trips() {
        let entry = LogEntry::Start(StartEntry::new(
            KernelVersion::V5_10,
            1000,
            TransactionId::new(42),
            0x1234_5678,
        ));
        let (parsed, bytes) = round_trip(&StartV5_10, &entry);
        assert_eq!(parsed, entry);
        match parsed {
            LogEntry::Start(start) => {
                assert_eq!(start.time_written, 1000);
                assert_eq!(start.last_committed_tx_when_started, TransactionId::new(42));
                assert!(start.additional_header.is_empty());
                assert_eq!(start.start_position, LogPosition::new(0, 0));
            }
            other => panic!("expected start, got {other:?}"),
        }
        // version, type, 3 x u64, u32, u32 length, u32 checksum
        assert_eq!(bytes.len(), 2 + 24 + 4 + 4 + 4);
    }

    #[test]
    fn legacy_start_has_no_checksum() {
        let entry = LogEntry::Start(
            StartEntry::new(KernelVersion::V4_0, 5, TransactionId::new(1), 0)
                .with_additional_header(vec![1, 2, 3]),
        );
        let (parsed, bytes) = round_trip(&StartV2_3, &entry);
        assert_eq!(parsed, entry);
        assert_eq!(bytes.len(), 2 + 16 + 4 + 3);
    }

    #[test]
    fn v4_2_start_keeps_previous_checksum() {
        let entry = LogEntry::Start(StartEntry::new(
            KernelVersion::V4_4,
            77,
            TransactionId::new(9),
            0xDEAD_BEEF,
        ));
        let (parsed, _) = round_trip(&StartV4_2, &entry);
        assert_eq!(parsed, entry);
    }

    #[test]
    fn additional_header_is_bounded() {
        let entry = LogEntry::Start(
            StartEntry::new(KernelVersion::V5_10, 1, TransactionId::BASE, 0)
                .with_additional_header(vec![0; 9]),
        );
        let mut ch = crate::channel::InMemoryChannel::new(0);
        assert!(matches!(
            StartV5_10.write(&entry, &mut ch),
            Err(LogError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn older_layouts_reject_newer_fields() {
        let mut ch = crate::channel::InMemoryChannel::new(0);
        let with_index = LogEntry::Start(
            StartEntry::new(KernelVersion::V4_2, 1, TransactionId::BASE, 0).with_append_index(3),
        );
        assert!(StartV4_2.write(&with_index, &mut ch).is_err());

        let with_checksum =
            LogEntry::Start(StartEntry::new(KernelVersion::V4_0, 1, TransactionId::BASE, 5));
        assert!(StartV2_3.write(&with_checksum, &mut ch).is_err());
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let entry = LogEntry::Start(StartEntry::new(
            KernelVersion::V5_10,
            1000,
            TransactionId::new(42),
            0,
        ));
        let (_, bytes) = round_trip(&StartV5_10, &entry);
        // Flip inside the time field; the length field stays intact.
        let mut corrupted = bytes.clone();
        corrupted[5] ^= 0x40;
        assert!(matches!(
            parse_framed(&StartV5_10, &corrupted),
            Err(LogError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn truncated_start_is_read_past_end() {
        let entry = LogEntry::Start(StartEntry::new(
            KernelVersion::V4_2,
            1,
            TransactionId::BASE,
            0,
        ));
        let (_, bytes) = round_trip(&StartV4_2, &entry);
        let result = parse_framed(&StartV4_2, &bytes[..bytes.len() - 6]);
        assert!(result.unwrap_err().is_read_past_end());
    }
}
