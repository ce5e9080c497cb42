//! Verify command implementation.

use super::open_reader;
use std::path::Path;
use txlog_core::{LogTail, LogTailScanner, TransactionId};

/// Verification result.
#[derive(Debug)]
pub struct VerifyResult {
    /// What the scan learned about the log, up to the first error.
    pub tail: LogTail,
    /// Error that stopped the scan.
    pub error: Option<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Scans `path` and reports what was found.
///
/// A truncated final entry is part of the tail report, not an error.
pub fn verify_log(
    path: &Path,
    verify_chain: bool,
) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let Some(mut reader) = open_reader(path, verify_chain)? else {
        return Ok(VerifyResult {
            tail: LogTailScanner::new(None).finish(),
            error: None,
        });
    };
    let last_committed = TransactionId::new(reader.header().last_committed_tx_id);
    let mut scanner = LogTailScanner::new(Some(last_committed));
    let error = scanner.scan(&mut reader).err().map(|e| e.to_string());
    Ok(VerifyResult {
        tail: scanner.finish(),
        error,
    })
}

/// Runs the verify command.
pub fn run(path: &Path, verify_chain: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying log file {}", path.display());
    println!();

    let result = verify_log(path, verify_chain)?;
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Log verification passed");
        Ok(())
    } else {
        println!("✗ Log verification failed");
        Err("Verification failed".into())
    }
}

fn print_result(result: &VerifyResult) {
    let tail = &result.tail;
    println!("  entries checked:      {}", tail.entries);
    println!(
        "  committed:            {} (rolled back: {})",
        tail.committed.len(),
        tail.rolled_back.len()
    );
    if let Some(tx) = tail.last_committed_tx_id {
        println!("  last committed tx:    {}", tx.as_u64());
    }
    if let Some(checksum) = tail.last_tx_checksum {
        println!("  last tx checksum:     {:08x}", checksum);
    }
    if let Some(ref checkpoint) = tail.last_checkpoint {
        println!(
            "  last checkpoint:      at {} -> {}",
            checkpoint.entry_position, checkpoint.checkpointed_position
        );
    }
    if let Some(position) = tail.incomplete_transaction {
        println!("  WARNING: transaction started at {} never closed", position);
    }
    for tx in &tail.unfinished_chunked {
        println!("  WARNING: chunked transaction {} has no final chunk", tx.as_u64());
    }
    if let Some(position) = tail.truncated_at {
        println!("  WARNING: log ends inside an entry at {}", position);
    }
    if let Some(ref error) = result.error {
        println!("    ERROR: {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::write_log;
    use tempfile::tempdir;
    use txlog_core::KernelVersion;

    #[test]
    fn clean_log_passes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.0");
        write_log(&path, KernelVersion::V5_20, 4);

        let result = verify_log(&path, true).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.tail.entries, 8);
        assert_eq!(result.tail.last_committed_tx_id, Some(TransactionId::new(5)));
        assert!(!result.tail.has_incomplete_tail());
    }

    #[test]
    fn flipped_byte_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.0");
        write_log(&path, KernelVersion::V4_4, 2);
        let mut bytes = std::fs::read(&path).unwrap();
        // Time field of the first start entry.
        bytes[128 + 4] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let result = verify_log(&path, false).unwrap();
        assert!(!result.is_ok());
        assert_eq!(result.tail.entries, 0);
    }

    #[test]
    fn truncation_is_not_a_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.0");
        write_log(&path, KernelVersion::V5_0, 2);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 5);
        std::fs::write(&path, bytes).unwrap();

        let result = verify_log(&path, false).unwrap();
        assert!(result.is_ok());
        assert!(result.tail.truncated_at.is_some());
        assert!(result.tail.incomplete_transaction.is_some());
    }
}
