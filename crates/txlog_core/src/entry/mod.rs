//! Log entries.
//!
//! One [`LogEntry`] is one logical record in the transaction stream. On disk
//! every entry is framed as:
//!
//! ```text
//! | version (i8) | type (u8) | payload | checksum (u32, from 4.2 on) |
//! ```
//!
//! The type byte selects the codec inside the parser set of the version.
//! Type codes are reserved forever; see [`LogEntryType`].

mod command;

pub use command::{
    CommandReader, CommandReaderFactory, OpaqueCommand, OpaqueCommandReader,
    OpaqueCommandReaderFactory, StorageCommand, MAX_OPAQUE_COMMAND_SIZE,
};

use crate::store_id::StoreIdentity;
use crate::types::{LogPosition, TransactionId};
use crate::version::KernelVersion;
use std::sync::Arc;

/// Type byte of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LogEntryType {
    /// Start of a transaction.
    Start = 1,
    /// One storage command.
    Command = 3,
    /// Commit of a transaction.
    Commit = 5,
    /// Checkpoint written inline in the transaction stream (before 4.2).
    InlineCheckpoint = 7,
    /// Detached checkpoint, 4.x layout.
    DetachedCheckpoint = 8,
    /// Detached checkpoint with transaction info, 5.x layout.
    DetachedCheckpointV5 = 9,
    /// Start of one chunk of a chunked transaction.
    ChunkStart = 10,
    /// End of one chunk of a chunked transaction.
    ChunkEnd = 11,
    /// Rollback of a chunked transaction.
    Rollback = 12,
}

impl LogEntryType {
    /// Every reserved type.
    pub const ALL: [Self; 9] = [
        Self::Start,
        Self::Command,
        Self::Commit,
        Self::InlineCheckpoint,
        Self::DetachedCheckpoint,
        Self::DetachedCheckpointV5,
        Self::ChunkStart,
        Self::ChunkEnd,
        Self::Rollback,
    ];

    /// Converts a byte to an entry type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_byte() == b)
    }

    /// Converts the entry type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Longest additional header a start entry may carry from 5.10 on.
pub const MAX_ADDITIONAL_HEADER_SIZE: usize = 8;

/// Largest additional header accepted from older logs.
pub const MAX_LEGACY_ADDITIONAL_HEADER_SIZE: usize = 64 * 1024;

/// Start of a transaction.
#[derive(Debug, Clone)]
pub struct StartEntry {
    /// Version the entry is written with.
    pub kernel_version: KernelVersion,
    /// Wall-clock time the transaction started, milliseconds.
    pub time_written: u64,
    /// Last transaction committed when this one started.
    pub last_committed_tx_when_started: TransactionId,
    /// Append index of the transaction (5.10+).
    pub append_index: u64,
    /// Checksum the previous transaction ended with (4.2+).
    pub previous_checksum: u32,
    /// Opaque bytes for the storage engine.
    pub additional_header: Vec<u8>,
    /// Where the entry was read from; not part of the encoding.
    pub start_position: LogPosition,
}

impl StartEntry {
    /// Creates a start entry with no append index or additional header.
    #[must_use]
    pub fn new(
        kernel_version: KernelVersion,
        time_written: u64,
        last_committed_tx_when_started: TransactionId,
        previous_checksum: u32,
    ) -> Self {
        Self {
            kernel_version,
            time_written,
            last_committed_tx_when_started,
            append_index: 0,
            previous_checksum,
            additional_header: Vec::new(),
            start_position: LogPosition::UNSPECIFIED,
        }
    }

    /// Sets the append index.
    #[must_use]
    pub fn with_append_index(mut self, append_index: u64) -> Self {
        self.append_index = append_index;
        self
    }

    /// Sets the additional header bytes.
    #[must_use]
    pub fn with_additional_header(mut self, additional_header: impl Into<Vec<u8>>) -> Self {
        self.additional_header = additional_header.into();
        self
    }
}

// `start_position` records where the entry was found, not what it says.
impl PartialEq for StartEntry {
    fn eq(&self, other: &Self) -> bool {
        self.kernel_version == other.kernel_version
            && self.time_written == other.time_written
            && self.last_committed_tx_when_started == other.last_committed_tx_when_started
            && self.append_index == other.append_index
            && self.previous_checksum == other.previous_checksum
            && self.additional_header == other.additional_header
    }
}

impl Eq for StartEntry {}

/// One storage command.
#[derive(Debug, Clone)]
pub struct CommandEntry {
    /// Version the entry is written with.
    pub kernel_version: KernelVersion,
    /// The command.
    pub command: Arc<dyn StorageCommand>,
}

impl CommandEntry {
    /// Creates a command entry.
    #[must_use]
    pub fn new(kernel_version: KernelVersion, command: Arc<dyn StorageCommand>) -> Self {
        Self {
            kernel_version,
            command,
        }
    }
}

impl PartialEq for CommandEntry {
    fn eq(&self, other: &Self) -> bool {
        self.kernel_version == other.kernel_version
            && self.command.command_eq(other.command.as_ref())
    }
}

impl Eq for CommandEntry {}

/// Commit of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    /// Version the entry is written with.
    pub kernel_version: KernelVersion,
    /// Id of the committed transaction.
    pub tx_id: TransactionId,
    /// Commit time, milliseconds.
    pub time_written: u64,
    /// Trailing checksum; filled in on read, computed on write (4.2+).
    pub checksum: Option<u32>,
}

impl CommitEntry {
    /// Creates a commit entry.
    #[must_use]
    pub fn new(kernel_version: KernelVersion, tx_id: TransactionId, time_written: u64) -> Self {
        Self {
            kernel_version,
            tx_id,
            time_written,
            checksum: None,
        }
    }
}

/// Rollback of a chunked transaction (5.7+).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackEntry {
    /// Version the entry is written with.
    pub kernel_version: KernelVersion,
    /// Id of the rolled-back transaction.
    pub tx_id: TransactionId,
    /// Append index of the rollback.
    pub append_index: u64,
    /// Rollback time, milliseconds.
    pub time_written: u64,
    /// Trailing checksum; filled in on read.
    pub checksum: Option<u32>,
}

/// Start of one chunk of a chunked transaction (5.7+).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkStartEntry {
    /// Version the entry is written with.
    pub kernel_version: KernelVersion,
    /// Time the chunk was written, milliseconds.
    pub time_written: u64,
    /// Sequence number of the chunk within its transaction, from 1.
    pub chunk_id: u64,
    /// Append index of this chunk.
    pub append_index: u64,
    /// Append index of the previous chunk of the same transaction.
    pub previous_batch_append_index: u64,
}

/// End of one chunk of a chunked transaction (5.7+).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEndEntry {
    /// Version the entry is written with.
    pub kernel_version: KernelVersion,
    /// Transaction the chunk belongs to.
    pub tx_id: TransactionId,
    /// Sequence number of the chunk.
    pub chunk_id: u64,
    /// Trailing checksum; filled in on read.
    pub checksum: Option<u32>,
}

/// Transaction a detached checkpoint was taken after (5.0+).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointTransaction {
    /// Id of the last closed transaction.
    pub tx_id: TransactionId,
    /// Kernel version that transaction was written with.
    pub kernel_version: KernelVersion,
    /// Checksum the transaction ended with.
    pub checksum: u32,
    /// Commit time of the transaction, milliseconds.
    pub commit_timestamp: u64,
    /// Append index of the transaction (5.10+).
    pub append_index: u64,
}

/// Longest checkpoint reason in 4.x detached checkpoints.
pub const MAX_REASON_LENGTH_V4: usize = 120;

/// Longest checkpoint reason from 5.0 on.
pub const MAX_REASON_LENGTH_V5: usize = 512;

/// A checkpoint recorded outside the transaction stream (4.2+).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedCheckpointEntry {
    /// Version the entry is written with.
    pub kernel_version: KernelVersion,
    /// Last closed transaction (5.0+).
    pub transaction: Option<CheckpointTransaction>,
    /// Log position the checkpoint covers.
    pub log_position: LogPosition,
    /// Checkpoint time, milliseconds.
    pub time: u64,
    /// Store identity: legacy in 4.x, current from 5.0 on.
    pub store_id: StoreIdentity,
    /// Free-text reason, truncated to the version's maximum on write.
    pub reason: String,
}

impl DetachedCheckpointEntry {
    /// Type byte of the layout the fields describe.
    ///
    /// Transaction info or a current store id need the 5.0 layout; anything
    /// else is the 4.2 layout, which 5.x sets still read and write.
    #[must_use]
    pub fn entry_type(&self) -> LogEntryType {
        if self.transaction.is_some() || matches!(self.store_id, StoreIdentity::Modern(_)) {
            LogEntryType::DetachedCheckpointV5
        } else {
            LogEntryType::DetachedCheckpoint
        }
    }

    /// Longest reason, in bytes, the entry's layout stores.
    #[must_use]
    pub fn max_reason_length(&self) -> usize {
        match self.entry_type() {
            LogEntryType::DetachedCheckpointV5 => MAX_REASON_LENGTH_V5,
            _ => MAX_REASON_LENGTH_V4,
        }
    }
}

/// Longest checkpoint reason `version` stores.
#[must_use]
pub fn max_reason_length(version: KernelVersion) -> usize {
    if version >= KernelVersion::V5_0 {
        MAX_REASON_LENGTH_V5
    } else {
        MAX_REASON_LENGTH_V4
    }
}

/// Truncates `reason` to at most `max` bytes at a character boundary.
#[must_use]
pub fn truncate_reason(reason: &str, max: usize) -> &str {
    if reason.len() <= max {
        return reason;
    }
    let mut end = max;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

/// A checkpoint written inline in the transaction stream (before 4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineCheckpointEntry {
    /// Version the entry is written with.
    pub kernel_version: KernelVersion,
    /// Log position the checkpoint covers.
    pub log_position: LogPosition,
}

/// One logical log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// Start of a transaction.
    Start(StartEntry),
    /// One storage command.
    Command(CommandEntry),
    /// Commit of a transaction.
    Commit(CommitEntry),
    /// Rollback of a chunked transaction.
    Rollback(RollbackEntry),
    /// Start of a chunk.
    ChunkStart(ChunkStartEntry),
    /// End of a chunk.
    ChunkEnd(ChunkEndEntry),
    /// Detached checkpoint.
    DetachedCheckpoint(DetachedCheckpointEntry),
    /// Inline checkpoint.
    InlineCheckpoint(InlineCheckpointEntry),
}

impl LogEntry {
    /// Version the entry is written with.
    #[must_use]
    pub fn kernel_version(&self) -> KernelVersion {
        match self {
            Self::Start(e) => e.kernel_version,
            Self::Command(e) => e.kernel_version,
            Self::Commit(e) => e.kernel_version,
            Self::Rollback(e) => e.kernel_version,
            Self::ChunkStart(e) => e.kernel_version,
            Self::ChunkEnd(e) => e.kernel_version,
            Self::DetachedCheckpoint(e) => e.kernel_version,
            Self::InlineCheckpoint(e) => e.kernel_version,
        }
    }

    /// Type byte the entry is written with.
    #[must_use]
    pub fn entry_type(&self) -> LogEntryType {
        match self {
            Self::Start(_) => LogEntryType::Start,
            Self::Command(_) => LogEntryType::Command,
            Self::Commit(_) => LogEntryType::Commit,
            Self::Rollback(_) => LogEntryType::Rollback,
            Self::ChunkStart(_) => LogEntryType::ChunkStart,
            Self::ChunkEnd(_) => LogEntryType::ChunkEnd,
            Self::DetachedCheckpoint(e) => e.entry_type(),
            Self::InlineCheckpoint(_) => LogEntryType::InlineCheckpoint,
        }
    }

    /// Checksum closing a transaction or chunk, if this entry carries one.
    #[must_use]
    pub fn checksum(&self) -> Option<u32> {
        match self {
            Self::Commit(e) => e.checksum,
            Self::Rollback(e) => e.checksum,
            Self::ChunkEnd(e) => e.checksum,
            _ => None,
        }
    }

    /// Returns the entry with its closing checksum set.
    ///
    /// Entries without a checksum field are returned unchanged.
    #[must_use]
    pub fn with_checksum(mut self, checksum: Option<u32>) -> Self {
        match &mut self {
            Self::Commit(e) => e.checksum = checksum,
            Self::Rollback(e) => e.checksum = checksum,
            Self::ChunkEnd(e) => e.checksum = checksum,
            _ => {}
        }
        self
    }

    /// Transaction id named by the entry, if any.
    #[must_use]
    pub fn tx_id(&self) -> Option<TransactionId> {
        match self {
            Self::Commit(e) => Some(e.tx_id),
            Self::Rollback(e) => Some(e.tx_id),
            Self::ChunkEnd(e) => Some(e.tx_id),
            _ => None,
        }
    }

    /// Whether the entry closes a transaction or a chunk.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        matches!(self, Self::Commit(_) | Self::Rollback(_) | Self::ChunkEnd(_))
    }
}
