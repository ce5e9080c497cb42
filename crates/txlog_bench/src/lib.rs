//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use rand::Rng;
use std::sync::Arc;
use txlog_core::{
    CommitEntry, KernelVersion, LogFileWriter, LogResult, OpaqueCommand, StartEntry,
    StorageCommand, TransactionId, WriterConfig, BASE_TX_CHECKSUM,
};
use txlog_storage::{InMemoryBackend, StorageBackend};

/// Versions worth comparing: legacy unchecksummed, checksummed, envelope framed.
pub const BENCH_VERSIONS: [KernelVersion; 3] =
    [KernelVersion::V4_0, KernelVersion::V5_10, KernelVersion::V5_20];

/// Generate random command payload of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` opaque commands with random payloads.
pub fn generate_commands(count: usize, payload_size: usize) -> Vec<Arc<dyn StorageCommand>> {
    (0..count)
        .map(|_| Arc::new(OpaqueCommand::new(random_data(payload_size))) as Arc<dyn StorageCommand>)
        .collect()
}

/// Writer config used by every benchmark.
pub fn bench_config(version: KernelVersion) -> WriterConfig {
    WriterConfig::new().kernel_version(version)
}

/// Appends `count` transactions carrying `commands`, chaining checksums.
pub fn append_transactions<B: StorageBackend>(
    writer: &mut LogFileWriter<B>,
    count: u64,
    commands: &[Arc<dyn StorageCommand>],
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
        let commit = CommitEntry::new(version, TransactionId::new(tx), tx);
        writer.append_transaction(&start, commands, &commit)?;
    }
    Ok(())
}

/// Builds an in-memory log of `transactions` transactions.
pub fn prepared_log(
    version: KernelVersion,
    transactions: u64,
    commands: &[Arc<dyn StorageCommand>],
) -> LogResult<InMemoryBackend> {
    let config = bench_config(version);
    let mut writer = LogFileWriter::create_with_config(InMemoryBackend::new(), 0, 1, &config)?;
    append_transactions(&mut writer, transactions, commands)?;
    writer.into_inner()
}
