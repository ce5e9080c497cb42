//! Log fixtures.
//!
//! Helpers that write entries or whole log files and read them back, so
//! tests can focus on the bytes in between.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use txlog_core::channel::InMemoryChannel;
use txlog_core::{
    CommitEntry, KernelVersion, LogEntry, LogEntryWriter, LogFileWriter, LogResult, OpaqueCommand,
    StartEntry, StorageCommand, TransactionId, VersionAwareLogEntryReader, WriterConfig,
    BASE_TX_CHECKSUM, MIN_SEGMENT_BLOCK_SIZE,
};
use txlog_storage::{FileBackend, InMemoryBackend, StorageBackend};

/// Unframed entry bytes together with the entries as a reader returns them.
#[derive(Debug, Clone)]
pub struct EncodedEntries {
    /// Bytes written.
    pub bytes: Vec<u8>,
    /// Input entries with the checksums the writer produced filled in.
    pub expected: Vec<LogEntry>,
    /// Offset of each entry in `bytes`.
    pub offsets: Vec<usize>,
}

/// Writes `entries` back to back without a header or envelopes.
///
/// # Errors
///
/// Returns the first write error.
pub fn encode_entries(entries: &[LogEntry]) -> LogResult<EncodedEntries> {
    let mut writer = LogEntryWriter::new(InMemoryChannel::new(0));
    let mut expected = Vec::with_capacity(entries.len());
    let mut offsets = Vec::with_capacity(entries.len());
    for entry in entries {
        offsets.push(writer.channel().as_bytes().len());
        let checksum = writer.write(entry)?;
        expected.push(entry.clone().with_checksum(checksum));
    }
    Ok(EncodedEntries {
        bytes: writer.into_inner().into_bytes(),
        expected,
        offsets,
    })
}

/// Reads unframed entries until the data ends.
///
/// # Errors
///
/// Returns the first read error.
pub fn decode_entries(bytes: &[u8]) -> LogResult<Vec<LogEntry>> {
    let mut channel = InMemoryChannel::from_bytes(0, bytes.to_vec());
    let mut reader = VersionAwareLogEntryReader::default();
    let mut entries = Vec::new();
    while let Some(entry) = reader.read_log_entry(&mut channel)? {
        entries.push(entry);
    }
    Ok(entries)
}

/// Writer config for small test files: tiny segments, so envelope framed
/// versions split entries often.
#[must_use]
pub fn small_segment_config(version: KernelVersion) -> WriterConfig {
    WriterConfig::new()
        .kernel_version(version)
        .segment_block_size(MIN_SEGMENT_BLOCK_SIZE)
}

/// Appends `count` committed transactions with `commands` opaque commands
/// each, chaining checksums the way a database would.
///
/// Transaction ids continue from the header's last committed id.
///
/// # Errors
///
/// Returns the first append error.
pub fn append_committed<B: StorageBackend>(
    writer: &mut LogFileWriter<B>,
    count: u64,
    commands: usize,
) -> LogResult<()> {
    let version = writer.kernel_version();
    let first = writer.header().last_committed_tx_id + 1;
    for tx in first..first + count {
        let previous = if version.has_entry_checksums() {
            writer.last_checksum().unwrap_or(BASE_TX_CHECKSUM)
        } else {
            0
        };
        let start = StartEntry::new(version, tx, TransactionId::new(tx - 1), previous);
        let payloads: Vec<Arc<dyn StorageCommand>> = (0..commands)
            .map(|i| {
                Arc::new(OpaqueCommand::new(vec![(tx as u8).wrapping_add(i as u8); 24 + i]))
                    as Arc<dyn StorageCommand>
            })
            .collect();
        let commit = CommitEntry::new(version, TransactionId::new(tx), tx);
        writer.append_transaction(&start, &payloads, &commit)?;
    }
    Ok(())
}

/// Builds an in-memory log file of `transactions` committed transactions.
///
/// # Errors
///
/// Returns any error from creating or appending to the file.
pub fn committed_log(version: KernelVersion, transactions: u64) -> LogResult<InMemoryBackend> {
    let config = small_segment_config(version);
    let mut writer = LogFileWriter::create_with_config(InMemoryBackend::new(), 0, 1, &config)?;
    append_committed(&mut writer, transactions, 2)?;
    writer.into_inner()
}

/// A log file on disk, removed when dropped.
pub struct TestLogFile {
    /// Path to the file.
    pub path: PathBuf,
    _temp_dir: TempDir,
}

impl TestLogFile {
    /// Writes a file of `transactions` committed transactions.
    pub fn committed(version: KernelVersion, transactions: u64) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("txlog.0");
        let backend = FileBackend::open(&path).expect("Failed to create log file");
        let config = small_segment_config(version);
        let mut writer = LogFileWriter::create_with_config(backend, 0, 1, &config)
            .expect("Failed to create log writer");
        append_committed(&mut writer, transactions, 2).expect("Failed to append transactions");
        writer.into_inner().expect("Failed to close log writer");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Path to the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file contents.
    pub fn bytes(&self) -> Vec<u8> {
        std::fs::read(&self.path).expect("Failed to read log file")
    }

    /// Replaces the file contents.
    pub fn overwrite(&self, bytes: &[u8]) {
        std::fs::write(&self.path, bytes).expect("Failed to write log file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlog_core::{LogFileReader, LogTailScanner, ReaderConfig};

    #[test]
    fn encode_records_offsets() {
        let commit = |tx| {
            LogEntry::Commit(CommitEntry::new(KernelVersion::V4_2, TransactionId::new(tx), 0))
        };
        let encoded = encode_entries(&[commit(1), commit(2)]).unwrap();
        assert_eq!(encoded.offsets, vec![0, 22]);
        assert_eq!(decode_entries(&encoded.bytes).unwrap(), encoded.expected);
    }

    #[test]
    fn committed_log_reads_back_for_every_version() {
        for version in KernelVersion::ALL {
            let backend = committed_log(version, 5).unwrap();
            let config = ReaderConfig::new().verify_checksum_chain(true);
            let reader = LogFileReader::open(backend, "fixture", config)
                .unwrap()
                .unwrap();
            let tail = LogTailScanner::scan_file(reader).unwrap();
            assert_eq!(tail.entries, 20, "{version}");
            assert_eq!(tail.last_committed_tx_id, Some(TransactionId::new(6)));
            assert!(!tail.has_incomplete_tail());
        }
    }

    #[test]
    fn file_fixture_is_on_disk() {
        let file = TestLogFile::committed(KernelVersion::V5_20, 3);
        assert!(file.path().exists());
        let bytes = file.bytes();
        assert!(bytes.len() > MIN_SEGMENT_BLOCK_SIZE as usize);
    }
}
