//! Header command implementation.

use crate::OutputFormat;
use serde::Serialize;
use std::path::Path;
use txlog_core::header::read_log_header;
use txlog_core::{HeaderFormat, LogHeader, StoreIdentity};

/// Log header representation for output.
#[derive(Debug, Serialize)]
pub struct HeaderInfo {
    /// File the header was read from.
    pub file: String,
    /// Header format version.
    pub format: u8,
    /// Bytes the header occupies.
    pub header_size: usize,
    /// Sequence number of the file.
    pub log_version: u64,
    /// Last transaction committed before the file was started.
    pub last_committed_tx_id: u64,
    /// Last append index before the file was started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_append_index: Option<u64>,
    /// Store the file belongs to.
    pub store_id: String,
    /// Envelope segment size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_block_size: Option<u32>,
    /// Checksum the previous file ended with, hex-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_log_file_checksum: Option<String>,
    /// Kernel version that created the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel_version: Option<String>,
}

impl HeaderInfo {
    /// Builds the output form of `header`.
    pub fn new(file: &Path, header: &LogHeader) -> Self {
        let has_append_index = matches!(header.format, HeaderFormat::V9 | HeaderFormat::V10);
        let framed = header.uses_envelopes();
        Self {
            file: file.display().to_string(),
            format: header.format.as_byte(),
            header_size: header.header_size(),
            log_version: header.log_version,
            last_committed_tx_id: header.last_committed_tx_id,
            last_append_index: has_append_index.then_some(header.last_append_index),
            store_id: describe_store_id(&header.store_id),
            segment_block_size: framed.then_some(header.segment_block_size),
            previous_log_file_checksum: framed
                .then(|| format!("{:08x}", header.previous_log_file_checksum)),
            kernel_version: header.kernel_version.map(|v| v.to_string()),
        }
    }
}

/// Runs the header command.
pub fn run(path: &Path, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("log file {} not found", path.display()).into());
    }
    let Some(header) = read_log_header(path)? else {
        println!("{}: no header (empty or pre-allocated file)", path.display());
        return Ok(());
    };
    let info = HeaderInfo::new(path, &header);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        OutputFormat::Text => print_text_output(&info),
    }
    Ok(())
}

fn print_text_output(info: &HeaderInfo) {
    println!("Log header of {}", info.file);
    println!("================");
    println!("  format:               V{} ({} bytes)", info.format, info.header_size);
    println!("  log version:          {}", info.log_version);
    println!("  last committed tx:    {}", info.last_committed_tx_id);
    if let Some(index) = info.last_append_index {
        println!("  last append index:    {}", index);
    }
    println!("  store id:             {}", info.store_id);
    if let Some(size) = info.segment_block_size {
        println!("  segment block size:   {}", size);
    }
    if let Some(ref checksum) = info.previous_log_file_checksum {
        println!("  previous checksum:    {}", checksum);
    }
    if let Some(ref version) = info.kernel_version {
        println!("  kernel version:       {}", version);
    }
}

fn describe_store_id(store_id: &StoreIdentity) -> String {
    match store_id {
        StoreIdentity::None => "none".to_string(),
        StoreIdentity::Legacy(id) => format!(
            "legacy creation={} random={:x} store_version={}",
            id.creation_time, id.random_id, id.store_version
        ),
        StoreIdentity::Modern(id) if id.is_unknown() => "unknown".to_string(),
        StoreIdentity::Modern(id) => format!(
            "{}/{} {}.{} creation={} random={:x}",
            id.engine_name,
            id.format_name,
            id.major_version,
            id.minor_version,
            id.creation_time,
            id.random_id
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::write_log;
    use tempfile::tempdir;
    use txlog_core::KernelVersion;

    #[test]
    fn envelope_fields_only_for_framed_files() {
        let dir = tempdir().unwrap();
        let framed = dir.path().join("framed.log");
        let plain = dir.path().join("plain.log");
        write_log(&framed, KernelVersion::V5_20, 1);
        write_log(&plain, KernelVersion::V5_0, 1);

        let header = read_log_header(&framed).unwrap().unwrap();
        let info = HeaderInfo::new(&framed, &header);
        assert_eq!(info.format, 10);
        assert_eq!(info.segment_block_size, Some(1024));
        assert_eq!(info.kernel_version.as_deref(), Some("5.20 (code 20)"));

        let header = read_log_header(&plain).unwrap().unwrap();
        let info = HeaderInfo::new(&plain, &header);
        assert_eq!(info.format, 8);
        assert_eq!(info.last_append_index, None);
        assert_eq!(info.segment_block_size, None);
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("segment_block_size").is_none());
        assert_eq!(json["last_committed_tx_id"], 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(run(&dir.path().join("nope.log"), OutputFormat::Text).is_err());
    }
}
