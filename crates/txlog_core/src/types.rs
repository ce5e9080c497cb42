//! Core value types shared across the log format.

use std::fmt;

/// Identifier of a committed transaction.
///
/// Transaction ids are monotonically increasing and never reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Id reported before any transaction has been committed.
    pub const BASE: Self = Self(1);

    /// Creates a new transaction id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx:{}", self.0)
    }
}

/// A byte location inside the sequence of log files.
///
/// `log_version` is the file sequence number, `byte_offset` the offset
/// inside that file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition {
    /// Sequence number of the log file.
    pub log_version: u64,
    /// Offset from the start of the file.
    pub byte_offset: u64,
}

impl LogPosition {
    /// Placeholder for positions that are not known.
    pub const UNSPECIFIED: Self = Self {
        log_version: u64::MAX,
        byte_offset: u64::MAX,
    };

    /// Creates a position.
    #[must_use]
    pub const fn new(log_version: u64, byte_offset: u64) -> Self {
        Self {
            log_version,
            byte_offset,
        }
    }

    /// Returns the same file position advanced by `bytes`.
    #[must_use]
    pub const fn advance(self, bytes: u64) -> Self {
        Self {
            log_version: self.log_version,
            byte_offset: self.byte_offset + bytes,
        }
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LogPosition{{logVersion={}, byteOffset={}}}",
            self.log_version, self.byte_offset
        )
    }
}

/// Checksum value used before any transaction has been written.
pub const BASE_TX_CHECKSUM: u32 = 0x1234_5678;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_ordering() {
        assert!(TransactionId::new(1) < TransactionId::new(2));
        assert_eq!(TransactionId::BASE.as_u64(), 1);
    }

    #[test]
    fn log_position_ordering_is_file_then_offset() {
        assert!(LogPosition::new(1, 900) < LogPosition::new(2, 16));
        assert!(LogPosition::new(2, 16) < LogPosition::new(2, 17));
    }

    #[test]
    fn log_position_advance_and_display() {
        let position = LogPosition::new(3, 128).advance(22);
        assert_eq!(position, LogPosition::new(3, 150));
        assert_eq!(
            position.to_string(),
            "LogPosition{logVersion=3, byteOffset=150}"
        );
    }
}
