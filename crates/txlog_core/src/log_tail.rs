//! One-pass scan of a log for what recovery needs to know about its tail.

use crate::entry::LogEntry;
use crate::error::{LogError, LogResult};
use crate::log_file::LogFileReader;
use crate::types::{LogPosition, TransactionId};
use crate::version::KernelVersion;
use std::collections::BTreeSet;
use tracing::{debug, warn};
use txlog_storage::StorageBackend;

/// The newest checkpoint found in a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastCheckpoint {
    /// Where the checkpoint entry itself starts.
    pub entry_position: LogPosition,
    /// Position the checkpoint says recovery may start from.
    pub checkpointed_position: LogPosition,
    /// Last transaction the checkpoint covers, when the entry records it.
    pub tx_id: Option<TransactionId>,
    /// Why the checkpoint was taken; empty for inline checkpoints.
    pub reason: String,
}

/// What a scan learned about a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTail {
    /// Highest transaction id committed in the log, or given as the
    /// starting point of the scan.
    pub last_committed_tx_id: Option<TransactionId>,
    /// Checksum of the last commit, rollback or chunk end.
    pub last_tx_checksum: Option<u32>,
    /// Newest checkpoint.
    pub last_checkpoint: Option<LastCheckpoint>,
    /// Committed transactions, in id order.
    pub committed: BTreeSet<TransactionId>,
    /// Rolled back transactions, in id order.
    pub rolled_back: BTreeSet<TransactionId>,
    /// Start of the transaction still open at the end of the log.
    pub incomplete_transaction: Option<LogPosition>,
    /// Chunked transactions whose last chunk never arrived.
    pub unfinished_chunked: BTreeSet<TransactionId>,
    /// Where a truncated final entry begins.
    pub truncated_at: Option<LogPosition>,
    /// Complete entries read.
    pub entries: u64,
    /// Kernel version of the last entry.
    pub kernel_version: Option<KernelVersion>,
}

impl LogTail {
    /// Whether the log ends in the middle of something.
    #[must_use]
    pub fn has_incomplete_tail(&self) -> bool {
        self.incomplete_transaction.is_some()
            || !self.unfinished_chunked.is_empty()
            || self.truncated_at.is_some()
    }
}

/// Accumulates a [`LogTail`] over one or more entry streams.
#[derive(Debug, Default)]
pub struct LogTailScanner {
    last_committed: Option<TransactionId>,
    last_tx_checksum: Option<u32>,
    last_checkpoint: Option<LastCheckpoint>,
    committed: BTreeSet<TransactionId>,
    rolled_back: BTreeSet<TransactionId>,
    open_since: Option<LogPosition>,
    chunked: BTreeSet<TransactionId>,
    truncated_at: Option<LogPosition>,
    entries: u64,
    kernel_version: Option<KernelVersion>,
}

impl LogTailScanner {
    /// Creates a scanner that starts from the last transaction committed
    /// before the scanned log, usually taken from its header.
    #[must_use]
    pub fn new(last_committed_before: Option<TransactionId>) -> Self {
        Self {
            last_committed: last_committed_before,
            ..Self::default()
        }
    }

    /// Consumes an entry stream.
    ///
    /// A truncated final entry ends the scan and is recorded rather than
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns any other read error.
    pub fn scan<I>(&mut self, entries: I) -> LogResult<()>
    where
        I: IntoIterator<Item = LogResult<(LogPosition, LogEntry)>>,
    {
        for result in entries {
            match result {
                Ok((position, entry)) => self.observe(position, &entry),
                Err(LogError::ReadPastEnd { position }) => {
                    warn!(%position, "log ends inside an entry");
                    self.truncated_at = Some(position);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Records one entry read at `position`.
    pub fn observe(&mut self, position: LogPosition, entry: &LogEntry) {
        self.entries += 1;
        self.kernel_version = Some(entry.kernel_version());
        match entry {
            LogEntry::Start(_) | LogEntry::ChunkStart(_) => {
                if self.open_since.is_none() {
                    self.open_since = Some(position);
                }
            }
            LogEntry::Command(_) => {}
            LogEntry::Commit(commit) => {
                self.open_since = None;
                self.chunked.remove(&commit.tx_id);
                self.committed.insert(commit.tx_id);
                self.last_committed = self.last_committed.max(Some(commit.tx_id));
            }
            LogEntry::Rollback(rollback) => {
                self.open_since = None;
                self.chunked.remove(&rollback.tx_id);
                self.rolled_back.insert(rollback.tx_id);
            }
            LogEntry::ChunkEnd(chunk) => {
                self.open_since = None;
                self.chunked.insert(chunk.tx_id);
            }
            LogEntry::DetachedCheckpoint(checkpoint) => {
                self.last_checkpoint = Some(LastCheckpoint {
                    entry_position: position,
                    checkpointed_position: checkpoint.log_position,
                    tx_id: checkpoint.transaction.map(|tx| tx.tx_id),
                    reason: checkpoint.reason.clone(),
                });
            }
            LogEntry::InlineCheckpoint(checkpoint) => {
                self.last_checkpoint = Some(LastCheckpoint {
                    entry_position: position,
                    checkpointed_position: checkpoint.log_position,
                    tx_id: None,
                    reason: String::new(),
                });
            }
        }
        if entry.is_closing() {
            if let Some(checksum) = entry.checksum() {
                self.last_tx_checksum = Some(checksum);
            }
        }
    }

    /// Scans every entry of `reader`.
    ///
    /// # Errors
    ///
    /// Returns any read error other than a truncated final entry.
    pub fn scan_file<B: StorageBackend>(reader: LogFileReader<B>) -> LogResult<LogTail> {
        let last_committed = reader.header().last_committed_tx_id;
        let mut scanner = Self::new(Some(TransactionId::new(last_committed)));
        scanner.scan(reader)?;
        Ok(scanner.finish())
    }

    /// Returns what the scan found.
    #[must_use]
    pub fn finish(self) -> LogTail {
        debug!(
            entries = self.entries,
            committed = self.committed.len(),
            incomplete = self.open_since.is_some(),
            "log tail scan finished"
        );
        LogTail {
            last_committed_tx_id: self.last_committed,
            last_tx_checksum: self.last_tx_checksum,
            last_checkpoint: self.last_checkpoint,
            committed: self.committed,
            rolled_back: self.rolled_back,
            incomplete_transaction: self.open_since,
            unfinished_chunked: self.chunked,
            truncated_at: self.truncated_at,
            entries: self.entries,
            kernel_version: self.kernel_version,
        }
    }
}
