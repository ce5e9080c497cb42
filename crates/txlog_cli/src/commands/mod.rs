//! CLI command implementations.

pub mod dump;
pub mod header;
pub mod verify;

use std::path::Path;
use txlog_core::{LogFileReader, ReaderConfig};
use txlog_storage::FileBackend;

/// Opens `path` for reading entries.
///
/// Returns `None` for an empty or pre-allocated file.
pub fn open_reader(
    path: &Path,
    verify_chain: bool,
) -> Result<Option<LogFileReader<FileBackend>>, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("log file {} not found", path.display()).into());
    }
    let backend = FileBackend::open_read_only(path)?;
    let config = ReaderConfig::new().verify_checksum_chain(verify_chain);
    Ok(LogFileReader::open(
        backend,
        &path.display().to_string(),
        config,
    )?)
}
