//! Dump command implementation.

use super::open_reader;
use crate::OutputFormat;
use serde::Serialize;
use std::path::Path;
use txlog_core::{LogEntry, LogError, LogPosition, OpaqueCommand};

/// Log entry representation for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Sequence number of the file holding the entry.
    pub log_version: u64,
    /// Offset of the entry in the file.
    pub offset: u64,
    /// Kernel version the entry was written with.
    pub kernel_version: String,
    /// Entry type.
    pub entry_type: String,
    /// Transaction ID (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<u64>,
    /// Entry checksum, hex-encoded (if exposed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Type specific fields.
    pub detail: String,
}

impl EntryInfo {
    /// Builds the output form of `entry` read at `position`.
    pub fn new(position: LogPosition, entry: &LogEntry) -> Self {
        Self {
            log_version: position.log_version,
            offset: position.byte_offset,
            kernel_version: entry.kernel_version().to_string(),
            entry_type: format!("{:?}", entry.entry_type()),
            tx_id: entry.tx_id().map(|tx| tx.as_u64()),
            checksum: entry.checksum().map(|c| format!("{c:08x}")),
            detail: describe(entry),
        }
    }
}

/// Entries read from a file, and the error that stopped the read early.
pub struct Dump {
    /// Entries read, in log order.
    pub entries: Vec<EntryInfo>,
    /// Error that ended the read before the end of the file.
    pub error: Option<LogError>,
}

/// Reads up to `limit` entries from `path`.
pub fn read_entries(
    path: &Path,
    limit: Option<usize>,
    verify_chain: bool,
) -> Result<Dump, Box<dyn std::error::Error>> {
    let mut dump = Dump {
        entries: Vec::new(),
        error: None,
    };
    let Some(reader) = open_reader(path, verify_chain)? else {
        return Ok(dump);
    };
    for result in reader.take(limit.unwrap_or(usize::MAX)) {
        match result {
            Ok((position, entry)) => dump.entries.push(EntryInfo::new(position, &entry)),
            Err(e) => {
                dump.error = Some(e);
                break;
            }
        }
    }
    Ok(dump)
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    format: OutputFormat,
    verify_chain: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let dump = read_entries(path, limit, verify_chain)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&dump.entries)?),
        OutputFormat::Text => print_text_output(&dump.entries),
    }

    match dump.error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn print_text_output(entries: &[EntryInfo]) {
    println!("Log entries ({} total)", entries.len());
    println!("================");
    println!();

    for entry in entries {
        print!(
            "[{}:{:08}] {:20} v{}",
            entry.log_version, entry.offset, entry.entry_type, entry.kernel_version
        );
        if let Some(tx_id) = entry.tx_id {
            print!(" tx={}", tx_id);
        }
        if let Some(ref checksum) = entry.checksum {
            print!(" checksum={}", checksum);
        }
        if !entry.detail.is_empty() {
            print!(" {}", entry.detail);
        }
        println!();
    }
}

fn describe(entry: &LogEntry) -> String {
    match entry {
        LogEntry::Start(start) => format!(
            "time={} last_committed={} previous_checksum={:08x} append_index={} additional_header={}B",
            start.time_written,
            start.last_committed_tx_when_started.as_u64(),
            start.previous_checksum,
            start.append_index,
            start.additional_header.len()
        ),
        LogEntry::Command(command) => match command.command.as_any().downcast_ref::<OpaqueCommand>() {
            Some(opaque) => format!("payload={}B", opaque.bytes.len()),
            None => format!("{:?}", command.command),
        },
        LogEntry::Commit(commit) => format!("time={}", commit.time_written),
        LogEntry::Rollback(rollback) => format!(
            "time={} append_index={}",
            rollback.time_written, rollback.append_index
        ),
        LogEntry::ChunkStart(chunk) => format!(
            "chunk={} append_index={} previous_batch={}",
            chunk.chunk_id, chunk.append_index, chunk.previous_batch_append_index
        ),
        LogEntry::ChunkEnd(chunk) => format!("chunk={}", chunk.chunk_id),
        LogEntry::DetachedCheckpoint(checkpoint) => {
            let mut detail = format!(
                "position={}:{} reason={:?}",
                checkpoint.log_position.log_version,
                checkpoint.log_position.byte_offset,
                checkpoint.reason
            );
            if let Some(tx) = checkpoint.transaction {
                detail.push_str(&format!(" after_tx={}", tx.tx_id.as_u64()));
            }
            detail
        }
        LogEntry::InlineCheckpoint(checkpoint) => format!(
            "position={}:{}",
            checkpoint.log_position.log_version, checkpoint.log_position.byte_offset
        ),
    }
}
