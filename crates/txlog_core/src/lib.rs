//! # txlog core
//!
//! Versioned, checksummed transaction log format.
//!
//! This crate provides:
//! - Kernel versions and the entry codec set each one selects
//! - Log file headers for every header format
//! - Typed entries and their binary codecs
//! - Envelope framing for segmented log files
//! - A version-aware reader and a matching writer
//! - A tail scanner for recovery
//!
//! ## Entry Framing
//!
//! Every entry starts with its kernel version byte and entry type byte.
//! From 4.2 on the entry ends with a CRC32 over everything before it.
//! Logs written by 2.3 use little-endian fields; all later versions are
//! big-endian.
//!
//! ## Usage
//!
//! ```
//! use txlog_core::{
//!     CommitEntry, KernelVersion, LogFileReader, LogFileWriter, ReaderConfig,
//!     StartEntry, TransactionId, WriterConfig, BASE_TX_CHECKSUM,
//! };
//! use txlog_storage::InMemoryBackend;
//!
//! let config = WriterConfig::new()
//!     .kernel_version(KernelVersion::V5_0)
//!     .segment_block_size(256);
//! let mut writer =
//!     LogFileWriter::create_with_config(InMemoryBackend::new(), 0, 1, &config).unwrap();
//!
//! let start = StartEntry::new(KernelVersion::V5_0, 10, TransactionId::BASE, BASE_TX_CHECKSUM);
//! let commit = CommitEntry::new(KernelVersion::V5_0, TransactionId::new(2), 11);
//! writer.append_transaction(&start, &[], &commit).unwrap();
//!
//! let backend = writer.into_inner().unwrap();
//! let reader = LogFileReader::open(backend, "log.0", ReaderConfig::new())
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(reader.count(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod codec;
mod config;
pub mod entry;
pub mod envelope;
mod error;
pub mod header;
mod log_file;
mod log_tail;
mod reader;
mod store_id;
mod types;
mod version;
mod writer;

pub use config::{ReaderConfig, WriterConfig, DEFAULT_SEGMENT_BLOCK_SIZE, MIN_SEGMENT_BLOCK_SIZE};
pub use entry::{
    CheckpointTransaction, ChunkEndEntry, ChunkStartEntry, CommandEntry, CommitEntry,
    DetachedCheckpointEntry, InlineCheckpointEntry, LogEntry, LogEntryType, OpaqueCommand,
    RollbackEntry, StartEntry, StorageCommand,
};
pub use error::{LogError, LogResult};
pub use header::{HeaderFormat, LogHeader};
pub use log_file::{LogFileReader, LogFileWriter, SharedLogFileWriter};
pub use log_tail::{LastCheckpoint, LogTail, LogTailScanner};
pub use reader::VersionAwareLogEntryReader;
pub use store_id::{LegacyStoreId, StoreId, StoreIdentity};
pub use types::{LogPosition, TransactionId, BASE_TX_CHECKSUM};
pub use version::{KernelVersion, VersionResolution};
pub use writer::LogEntryWriter;

/// Crate version, as recorded in tool output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
