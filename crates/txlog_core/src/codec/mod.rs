//! Entry codecs and the per-version sets that select them.
//!
//! A codec reads and writes the payload of one entry type. The version and
//! type bytes in front of the payload are handled by the reader and writer;
//! the trailing checksum is handled by the codec, because only the codec
//! knows where its payload ends.
//!
//! Codecs are grouped into one [`LogEntrySerializationSet`] per kernel
//! version. The sets are built once from the overlay table in [`registry`]
//! and looked up with [`serialization_set`].

mod checkpoint;
mod chunk;
mod command;
mod registry;
mod set;
mod start;

pub use checkpoint::{
    DetachedCheckpointV4_2, DetachedCheckpointV5_0, DetachedCheckpointV5_10, InlineCheckpoint,
};
pub use chunk::{ChunkEndCodec, ChunkStartCodec, RollbackCodec};
pub use command::{CommandCodec, CommitCodec};
pub use registry::{build_serialization_sets, serialization_set, CodecRegistration, SetLayer};
pub use set::LogEntrySerializationSet;
pub use start::{StartV2_3, StartV4_2, StartV5_10};

use crate::channel::{ReadableChannel, WritableChannel};
use crate::entry::{CommandReaderFactory, LogEntry, LogEntryType};
use crate::error::{LogError, LogResult};
use crate::types::LogPosition;
use crate::version::KernelVersion;

/// What a codec knows about the entry it is parsing.
#[derive(Clone, Copy)]
pub struct ParseContext<'a> {
    /// Version byte the entry was written with.
    pub kernel_version: KernelVersion,
    /// Position of the version byte.
    pub start_position: LogPosition,
    /// Decoder for command payloads.
    pub commands: &'a dyn CommandReaderFactory,
}

/// Reads and writes the payload of one entry type.
///
/// Codecs are stateless and shared by every set that registers them.
pub trait EntryCodec: Send + Sync {
    /// Type byte this codec handles.
    fn entry_type(&self) -> LogEntryType;

    /// Codec name for diagnostics.
    fn name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Parses the payload that follows the version and type bytes.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ReadPastEnd`] if the payload is truncated,
    /// [`LogError::ChecksumMismatch`] if the trailing checksum is wrong, or a
    /// corruption error for malformed fields.
    fn parse(&self, ctx: ParseContext<'_>, channel: &mut dyn ReadableChannel)
        -> LogResult<LogEntry>;

    /// Writes the payload of `entry` and its trailing checksum.
    ///
    /// Returns the checksum when the entry's version has one.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error if `entry` is not this codec's type
    /// or has fields its version cannot represent.
    fn write(&self, entry: &LogEntry, channel: &mut dyn WritableChannel)
        -> LogResult<Option<u32>>;
}

/// Validates the trailing checksum when `version` writes one.
fn read_trailing_checksum(
    version: KernelVersion,
    channel: &mut dyn ReadableChannel,
) -> LogResult<Option<u32>> {
    if version.has_entry_checksums() {
        channel.end_checksum_and_validate().map(Some)
    } else {
        Ok(None)
    }
}

/// Appends the trailing checksum when `version` writes one.
fn write_trailing_checksum(
    version: KernelVersion,
    channel: &mut dyn WritableChannel,
) -> LogResult<Option<u32>> {
    if version.has_entry_checksums() {
        channel.put_checksum().map(Some)
    } else {
        Ok(None)
    }
}

/// Reads `[len: u32][bytes]`, rejecting lengths above `max`.
fn get_sized_bytes(
    channel: &mut dyn ReadableChannel,
    max: usize,
    what: &str,
) -> LogResult<Vec<u8>> {
    let len = channel.get_u32()? as usize;
    if len > max {
        return Err(LogError::corrupted(format!(
            "{what} length {len} exceeds {max}"
        )));
    }
    channel.get_bytes(len)
}

/// Writes `[len: u32][bytes]`, rejecting lengths above `max`.
fn put_sized_bytes(
    channel: &mut dyn WritableChannel,
    bytes: &[u8],
    max: usize,
    what: &str,
) -> LogResult<()> {
    if bytes.len() > max {
        return Err(LogError::invalid_argument(format!(
            "{what} of {} bytes exceeds {max}",
            bytes.len()
        )));
    }
    channel.put_u32(bytes.len() as u32)?;
    channel.put_bytes(bytes)
}

fn read_position(
    channel: &mut dyn ReadableChannel,
) -> LogResult<LogPosition> {
    let log_version = channel.get_u64()?;
    let byte_offset = channel.get_u64()?;
    Ok(LogPosition::new(log_version, byte_offset))
}

fn write_position(channel: &mut dyn WritableChannel, position: LogPosition) -> LogResult<()> {
    channel.put_u64(position.log_version)?;
    channel.put_u64(position.byte_offset)
}

fn wrong_entry(expected: LogEntryType, entry: &LogEntry) -> LogError {
    LogError::invalid_argument(format!(
        "{expected:?} codec cannot write a {:?} entry",
        entry.entry_type()
    ))
}

fn unrepresentable(what: &str, version: KernelVersion) -> LogError {
    LogError::invalid_argument(format!("{what} cannot be written under kernel version {version}"))
}
