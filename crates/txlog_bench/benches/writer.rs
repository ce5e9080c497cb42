//! Log writer benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;
use txlog_bench::{append_transactions, bench_config, generate_commands, BENCH_VERSIONS};
use txlog_core::channel::InMemoryChannel;
use txlog_core::{CommitEntry, LogEntry, LogEntryWriter, LogFileWriter, TransactionId};
use txlog_storage::{FileBackend, InMemoryBackend};

/// Benchmark framing a single commit entry.
fn bench_write_entry(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_entry");

    for version in BENCH_VERSIONS {
        let entry = LogEntry::Commit(CommitEntry::new(version, TransactionId::new(42), 1));
        group.bench_function(BenchmarkId::from_parameter(version), |b| {
            let mut writer = LogEntryWriter::new(InMemoryChannel::new(0));
            b.iter(|| {
                let checksum = writer.write(black_box(&entry)).unwrap();
                black_box(checksum);
            });
        });
    }

    group.finish();
}

/// Benchmark appending whole transactions to an in-memory log.
fn bench_append_transaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_transaction");

    for payload in [64usize, 1024, 16 * 1024] {
        let commands = generate_commands(4, payload);
        group.throughput(Throughput::Bytes((4 * payload) as u64));
        for version in BENCH_VERSIONS {
            group.bench_with_input(
                BenchmarkId::new(version.to_string(), payload),
                &commands,
                |b, commands| {
                    let config = bench_config(version);
                    let mut writer =
                        LogFileWriter::create_with_config(InMemoryBackend::new(), 0, 1, &config)
                            .unwrap();
                    b.iter(|| {
                        append_transactions(&mut writer, 1, black_box(commands)).unwrap();
                    });
                },
            );
        }
    }

    group.finish();
}

/// Benchmark appending to a file, flushing after every transaction.
fn bench_file_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_append");
    let commands = generate_commands(4, 256);

    for version in BENCH_VERSIONS {
        group.bench_function(BenchmarkId::from_parameter(version), |b| {
            let dir = TempDir::new().unwrap();
            let backend = FileBackend::open(&dir.path().join("bench.log")).unwrap();
            let mut writer =
                LogFileWriter::create_with_config(backend, 0, 1, &bench_config(version)).unwrap();
            b.iter(|| {
                append_transactions(&mut writer, 1, &commands).unwrap();
                writer.flush().unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_write_entry,
    bench_append_transaction,
    bench_file_append,
);

criterion_main!(benches);
