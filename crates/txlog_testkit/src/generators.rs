//! Property-based test generators using proptest.
//!
//! Every strategy that takes a kernel version only produces values that
//! version can represent, so whatever it generates must survive a write and
//! read back unchanged.

use proptest::prelude::*;
use proptest::strategy::Union;
use std::sync::Arc;
use txlog_core::entry::{MAX_ADDITIONAL_HEADER_SIZE, MAX_REASON_LENGTH_V4, MAX_REASON_LENGTH_V5};
use txlog_core::header::LOG_VERSION_MASK;
use txlog_core::{
    CheckpointTransaction, ChunkEndEntry, ChunkStartEntry, CommandEntry, CommitEntry,
    DetachedCheckpointEntry, HeaderFormat, InlineCheckpointEntry, KernelVersion, LegacyStoreId,
    LogEntry, LogHeader, LogPosition, OpaqueCommand, RollbackEntry, StartEntry, StoreId,
    StoreIdentity, TransactionId,
};

/// Strategy for any supported kernel version.
pub fn kernel_version_strategy() -> impl Strategy<Value = KernelVersion> {
    prop::sample::select(KernelVersion::ALL.to_vec())
}

/// Strategy for any header format.
pub fn header_format_strategy() -> impl Strategy<Value = HeaderFormat> {
    prop::sample::select(HeaderFormat::ALL.to_vec())
}

/// Strategy for log positions.
pub fn log_position_strategy() -> impl Strategy<Value = LogPosition> {
    (any::<u64>(), any::<u64>()).prop_map(|(v, o)| LogPosition::new(v, o))
}

/// Strategy for store ids whose names fit the 64-byte slot.
pub fn store_id_strategy() -> impl Strategy<Value = StoreId> {
    (
        any::<u64>(),
        any::<u64>(),
        prop::string::string_regex("[a-z]{0,16}").expect("Invalid regex"),
        prop::string::string_regex("[a-z]{0,16}").expect("Invalid regex"),
        any::<u8>(),
        any::<u8>(),
    )
        .prop_map(|(created, random, engine, format, major, minor)| {
            StoreId::new(created, random, engine, format, major, minor)
        })
}

/// Strategy for legacy store ids.
pub fn legacy_store_id_strategy() -> impl Strategy<Value = LegacyStoreId> {
    any::<[u64; 5]>().prop_map(|f| LegacyStoreId {
        creation_time: f[0],
        random_id: f[1],
        store_version: f[2],
        upgrade_time: f[3],
        upgrade_tx_id: f[4],
    })
}

/// Strategy for headers whose fields all fit their format.
pub fn header_strategy() -> impl Strategy<Value = LogHeader> {
    header_format_strategy().prop_flat_map(|format| {
        let store_id = match format {
            HeaderFormat::V6 => Just(StoreIdentity::None).boxed(),
            HeaderFormat::V7 => legacy_store_id_strategy()
                .prop_map(StoreIdentity::Legacy)
                .boxed(),
            _ => store_id_strategy().prop_map(StoreIdentity::Modern).boxed(),
        };
        (
            0..=LOG_VERSION_MASK,
            any::<u64>(),
            any::<u64>(),
            store_id,
            any::<u32>(),
            any::<u32>(),
            kernel_version_strategy(),
        )
            .prop_map(
                move |(log_version, last_tx, append, store_id, segment, previous, version)| {
                    let mut header =
                        LogHeader::new(format, log_version, last_tx).with_store_id(store_id);
                    if matches!(format, HeaderFormat::V9 | HeaderFormat::V10) {
                        header = header.with_last_append_index(append);
                    }
                    if format == HeaderFormat::V10 {
                        header = header
                            .with_segment_block_size(segment)
                            .with_previous_log_file_checksum(previous)
                            .with_kernel_version(version);
                    }
                    header
                },
            )
    })
}

fn start_strategy(version: KernelVersion) -> BoxedStrategy<LogEntry> {
    let checksums = version.has_entry_checksums();
    let appends = version >= KernelVersion::V5_10;
    let header_len = if appends {
        MAX_ADDITIONAL_HEADER_SIZE
    } else {
        16
    };
    (
        any::<u64>(),
        any::<u64>(),
        any::<u64>(),
        any::<u32>(),
        prop::collection::vec(any::<u8>(), 0..=header_len),
    )
        .prop_map(move |(time, last_tx, append, previous, additional)| {
            let previous = if checksums { previous } else { 0 };
            let mut start = StartEntry::new(version, time, TransactionId::new(last_tx), previous)
                .with_additional_header(additional);
            if appends {
                start = start.with_append_index(append);
            }
            LogEntry::Start(start)
        })
        .boxed()
}

fn command_strategy(version: KernelVersion) -> BoxedStrategy<LogEntry> {
    prop::collection::vec(any::<u8>(), 0..256)
        .prop_map(move |bytes| {
            LogEntry::Command(CommandEntry::new(version, Arc::new(OpaqueCommand::new(bytes))))
        })
        .boxed()
}

fn commit_strategy(version: KernelVersion) -> BoxedStrategy<LogEntry> {
    (any::<u64>(), any::<u64>())
        .prop_map(move |(tx, time)| {
            LogEntry::Commit(CommitEntry::new(version, TransactionId::new(tx), time))
        })
        .boxed()
}

fn inline_checkpoint_strategy(version: KernelVersion) -> BoxedStrategy<LogEntry> {
    log_position_strategy()
        .prop_map(move |log_position| {
            LogEntry::InlineCheckpoint(InlineCheckpointEntry {
                kernel_version: version,
                log_position,
            })
        })
        .boxed()
}

fn checkpoint_transaction_strategy(
    version: KernelVersion,
) -> impl Strategy<Value = CheckpointTransaction> {
    let appends = version >= KernelVersion::V5_10;
    (
        any::<u64>(),
        kernel_version_strategy(),
        any::<u32>(),
        any::<u64>(),
        any::<u64>(),
    )
        .prop_map(move |(tx, tx_version, checksum, timestamp, append)| CheckpointTransaction {
            tx_id: TransactionId::new(tx),
            kernel_version: tx_version,
            checksum,
            commit_timestamp: timestamp,
            append_index: if appends { append } else { 0 },
        })
}

/// Detached checkpoint in the 4.2 layout, or the 5.0 layout when `modern`.
fn detached_checkpoint_strategy(version: KernelVersion, modern: bool) -> BoxedStrategy<LogEntry> {
    let (transaction, store_id, max_reason) = if modern {
        (
            checkpoint_transaction_strategy(version).prop_map(Some).boxed(),
            store_id_strategy().prop_map(StoreIdentity::Modern).boxed(),
            MAX_REASON_LENGTH_V5,
        )
    } else {
        (
            Just(None).boxed(),
            legacy_store_id_strategy()
                .prop_map(StoreIdentity::Legacy)
                .boxed(),
            MAX_REASON_LENGTH_V4,
        )
    };
    let reason = prop::string::string_regex(&format!("[a-zA-Z0-9 ]{{0,{max_reason}}}"))
        .expect("Invalid regex");
    (
        transaction,
        log_position_strategy(),
        any::<u64>(),
        store_id,
        reason,
    )
        .prop_map(move |(transaction, log_position, time, store_id, reason)| {
            LogEntry::DetachedCheckpoint(DetachedCheckpointEntry {
                kernel_version: version,
                transaction,
                log_position,
                time,
                store_id,
                reason,
            })
        })
        .boxed()
}

fn chunk_strategies(version: KernelVersion) -> Vec<BoxedStrategy<LogEntry>> {
    vec![
        any::<[u64; 4]>()
            .prop_map(move |f| {
                LogEntry::ChunkStart(ChunkStartEntry {
                    kernel_version: version,
                    time_written: f[0],
                    chunk_id: f[1],
                    append_index: f[2],
                    previous_batch_append_index: f[3],
                })
            })
            .boxed(),
        (any::<u64>(), any::<u64>())
            .prop_map(move |(tx, chunk_id)| {
                LogEntry::ChunkEnd(ChunkEndEntry {
                    kernel_version: version,
                    tx_id: TransactionId::new(tx),
                    chunk_id,
                    checksum: None,
                })
            })
            .boxed(),
        any::<[u64; 3]>()
            .prop_map(move |f| {
                LogEntry::Rollback(RollbackEntry {
                    kernel_version: version,
                    tx_id: TransactionId::new(f[0]),
                    append_index: f[1],
                    time_written: f[2],
                    checksum: None,
                })
            })
            .boxed(),
    ]
}

/// Strategy for any entry `version` can write.
pub fn entry_strategy(version: KernelVersion) -> BoxedStrategy<LogEntry> {
    let mut choices = vec![
        start_strategy(version),
        command_strategy(version),
        commit_strategy(version),
    ];
    if version.has_inline_checkpoints() {
        choices.push(inline_checkpoint_strategy(version));
    }
    if version >= KernelVersion::V4_2 {
        // 5.x sets keep the 4.2 layout alongside their own.
        choices.push(detached_checkpoint_strategy(version, false));
    }
    if version >= KernelVersion::V5_0 {
        choices.push(detached_checkpoint_strategy(version, true));
    }
    if version >= KernelVersion::V5_7 {
        choices.extend(chunk_strategies(version));
    }
    Union::new(choices).boxed()
}

/// Strategy for a version together with a run of entries it can write.
pub fn versioned_entries_strategy(
    max_entries: usize,
) -> impl Strategy<Value = (KernelVersion, Vec<LogEntry>)> {
    kernel_version_strategy().prop_flat_map(move |version| {
        (
            Just(version),
            prop::collection::vec(entry_strategy(version), 1..=max_entries),
        )
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlog_core::codec::serialization_set;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn entries_have_a_codec_in_their_version((version, entries) in versioned_entries_strategy(8)) {
            let set = serialization_set(version);
            for entry in entries {
                prop_assert_eq!(entry.kernel_version(), version);
                prop_assert!(set.select(entry.entry_type().as_byte()).is_ok());
            }
        }

        #[test]
        fn headers_encode(header in header_strategy()) {
            let bytes = header.to_bytes().unwrap();
            prop_assert_eq!(bytes.len(), header.header_size());
        }
    }
}
