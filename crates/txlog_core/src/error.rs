//! Error types for the transaction log format.

use crate::types::LogPosition;
use crate::version::{KernelVersion, VersionResolution};
use std::io;
use thiserror::Error;

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors raised while reading or writing transaction logs.
///
/// Every fatal read error carries the position (file sequence number and
/// byte offset) of the entry it was raised for.
#[derive(Debug, Error)]
pub enum LogError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] txlog_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Data ended inside an entry that had already started.
    ///
    /// A log that simply has no more entries is reported as `Ok(None)` by the
    /// reader; this variant means an entry was begun but is incomplete.
    #[error("read past end of log data at {position}")]
    ReadPastEnd {
        /// Position of the read that ran out of data.
        position: LogPosition,
    },

    /// Stored checksum does not match the bytes it covers.
    #[error("checksum mismatch at {position}: stored {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum stored in the log.
        expected: u32,
        /// Checksum computed over the data.
        actual: u32,
        /// Position of the stored checksum.
        position: LogPosition,
    },

    /// A start entry does not link to the checksum of the previous transaction.
    #[error(
        "checksum chain broken at {position} (kernel version {kernel_version}): previous \
         transaction ended with {expected:#010x}, start entry declares {actual:#010x}"
    )]
    ChecksumChainBroken {
        /// Version of the start entry.
        kernel_version: KernelVersion,
        /// Checksum of the last transaction read.
        expected: u32,
        /// Previous checksum declared by the start entry.
        actual: u32,
        /// Position of the start entry.
        position: LogPosition,
    },

    /// The log was written by a newer build than this one.
    #[error(
        "log entry at {position} has kernel version code {code}, newer than the latest \
         supported {latest}; the log is from a newer build, possibly a downgrade attempt"
    )]
    KernelVersionTooNew {
        /// Version byte found in the log.
        code: i8,
        /// Latest supported version.
        latest: KernelVersion,
        /// Position of the entry.
        position: LogPosition,
    },

    /// The log predates the oldest supported migration path.
    #[error(
        "log entry at {position} has kernel version code {code}, older than the earliest \
         supported {oldest}; the log predates what this build can migrate"
    )]
    KernelVersionTooOld {
        /// Version byte found in the log.
        code: i8,
        /// Earliest supported version.
        oldest: KernelVersion,
        /// Position of the entry.
        position: LogPosition,
    },

    /// The version byte lies inside the supported range but was never assigned.
    #[error("log entry at {position} has unassigned kernel version code {code}")]
    UnknownKernelVersion {
        /// Version byte found in the log.
        code: i8,
        /// Position of the entry.
        position: LogPosition,
    },

    /// No codec is registered for the type byte under this version.
    #[error("unknown log entry type {entry_type} for kernel version {kernel_version} at {position}")]
    UnknownEntryType {
        /// Version the entry was written with.
        kernel_version: KernelVersion,
        /// Type byte found in the log.
        entry_type: u8,
        /// Position of the entry.
        position: LogPosition,
    },

    /// The header names a format version this build does not know.
    #[error("unrecognized log header format version {format_version}")]
    UnrecognizedHeaderFormat {
        /// Format version byte from the header word.
        format_version: u8,
    },

    /// Fewer bytes are available than the declared header format requires.
    #[error("incomplete log header in {file}: {bytes_read} bytes available, {required} required")]
    IncompleteLogHeader {
        /// File (or buffer) the header was read from.
        file: String,
        /// Bytes available.
        bytes_read: usize,
        /// Bytes required by the declared format.
        required: usize,
    },

    /// A segment envelope is malformed or out of sequence.
    #[error("envelope corruption at {position}: {message}")]
    EnvelopeCorruption {
        /// Description of the corruption.
        message: String,
        /// Position of the envelope header.
        position: LogPosition,
    },

    /// Parsing an entry failed; wraps the cause with positional context.
    #[error("failed to parse log entry of type {entry_type} (kernel version {kernel_version}) at {position}: {source}")]
    EntryParse {
        /// Version the entry was written with.
        kernel_version: KernelVersion,
        /// Type byte of the entry.
        entry_type: u8,
        /// Position of the entry.
        position: LogPosition,
        /// Underlying failure.
        #[source]
        source: Box<LogError>,
    },

    /// Log data is structurally invalid.
    #[error("log corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// An entry or header cannot be written in the requested form.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// Two codecs were registered for the same type byte in one set.
    #[error("entry type {entry_type} registered twice for kernel version {kernel_version}")]
    DuplicateEntryType {
        /// Version of the set under construction.
        kernel_version: KernelVersion,
        /// Type byte registered twice.
        entry_type: u8,
    },

    /// An override was registered for a type byte with nothing to override.
    #[error("override of entry type {entry_type} for kernel version {kernel_version} has no earlier codec")]
    OverrideWithoutBase {
        /// Version of the set under construction.
        kernel_version: KernelVersion,
        /// Type byte of the override.
        entry_type: u8,
    },
}

impl LogError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an envelope corruption error.
    pub fn envelope_corruption(message: impl Into<String>, position: LogPosition) -> Self {
        Self::EnvelopeCorruption {
            message: message.into(),
            position,
        }
    }

    /// Maps a failed version resolution to its error variant.
    #[must_use]
    pub fn unsupported_version(
        code: i8,
        resolution: VersionResolution,
        position: LogPosition,
    ) -> Self {
        match resolution {
            VersionResolution::TooNew => Self::KernelVersionTooNew {
                code,
                latest: KernelVersion::LATEST,
                position,
            },
            VersionResolution::TooOld => Self::KernelVersionTooOld {
                code,
                oldest: KernelVersion::EARLIEST,
                position,
            },
            VersionResolution::Unknown => Self::UnknownKernelVersion { code, position },
        }
    }

    /// Whether this is an incomplete-entry signal.
    #[must_use]
    pub fn is_read_past_end(&self) -> bool {
        matches!(self, Self::ReadPastEnd { .. })
    }

    /// Whether this error already names the offending entry.
    ///
    /// Such errors pass through the reader unwrapped. A checksum mismatch
    /// only names where its checksum was stored, so the reader wraps it with
    /// the entry's start, version and type.
    #[must_use]
    pub fn has_position(&self) -> bool {
        matches!(
            self,
            Self::ReadPastEnd { .. }
                | Self::ChecksumChainBroken { .. }
                | Self::KernelVersionTooNew { .. }
                | Self::KernelVersionTooOld { .. }
                | Self::UnknownKernelVersion { .. }
                | Self::UnknownEntryType { .. }
                | Self::EnvelopeCorruption { .. }
                | Self::EntryParse { .. }
        )
    }

    /// Returns the innermost error of an [`LogError::EntryParse`] chain.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::EntryParse { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
