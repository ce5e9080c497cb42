//! Reader and writer configuration.

use crate::version::KernelVersion;

/// Default size of a segment in envelope-framed log files.
pub const DEFAULT_SEGMENT_BLOCK_SIZE: u32 = 256 * 1024;

/// Smallest segment size accepted for envelope-framed log files.
pub const MIN_SEGMENT_BLOCK_SIZE: u32 = 256;

/// Configuration for reading log entries.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Whether each start entry must link to the checksum of the transaction
    /// before it.
    ///
    /// Off by default. Per-entry checksums still catch corruption inside an
    /// entry; this flag additionally catches whole entries that went missing.
    pub verify_checksum_chain: bool,

    /// Bytes fetched from storage per read-ahead refill.
    pub read_ahead_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            verify_checksum_chain: false,
            read_ahead_size: 64 * 1024, // 64 KB
        }
    }
}

impl ReaderConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the checksum chain between transactions is verified.
    #[must_use]
    pub const fn verify_checksum_chain(mut self, value: bool) -> Self {
        self.verify_checksum_chain = value;
        self
    }

    /// Sets the read-ahead buffer size.
    #[must_use]
    pub const fn read_ahead_size(mut self, size: usize) -> Self {
        self.read_ahead_size = size;
        self
    }
}

/// Configuration for creating and appending to log files.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Kernel version entries are written with.
    pub kernel_version: KernelVersion,

    /// Segment size for envelope-framed files.
    ///
    /// Ignored for kernel versions that predate envelopes.
    pub segment_block_size: u32,

    /// Bytes buffered before they are appended to storage.
    pub write_buffer_size: usize,

    /// Whether `flush` also syncs to durable storage.
    pub sync_on_flush: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            kernel_version: KernelVersion::LATEST,
            segment_block_size: DEFAULT_SEGMENT_BLOCK_SIZE,
            write_buffer_size: 64 * 1024, // 64 KB
            sync_on_flush: true,
        }
    }
}

impl WriterConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the kernel version entries are written with.
    #[must_use]
    pub const fn kernel_version(mut self, version: KernelVersion) -> Self {
        self.kernel_version = version;
        self
    }

    /// Sets the segment size for envelope-framed files.
    #[must_use]
    pub const fn segment_block_size(mut self, size: u32) -> Self {
        self.segment_block_size = size;
        self
    }

    /// Sets the write buffer size.
    #[must_use]
    pub const fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Sets whether `flush` syncs to durable storage.
    #[must_use]
    pub const fn sync_on_flush(mut self, value: bool) -> Self {
        self.sync_on_flush = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reader_config() {
        let config = ReaderConfig::default();
        assert!(!config.verify_checksum_chain);
        assert!(config.read_ahead_size > 0);
    }

    #[test]
    fn default_writer_config() {
        let config = WriterConfig::default();
        assert_eq!(config.kernel_version, KernelVersion::LATEST);
        assert_eq!(config.segment_block_size, DEFAULT_SEGMENT_BLOCK_SIZE);
        assert!(config.sync_on_flush);
    }

    #[test]
    fn builder_pattern() {
        let reader = ReaderConfig::new()
            .verify_checksum_chain(true)
            .read_ahead_size(512);
        assert!(reader.verify_checksum_chain);
        assert_eq!(reader.read_ahead_size, 512);

        let writer = WriterConfig::new()
            .kernel_version(KernelVersion::V4_2)
            .segment_block_size(MIN_SEGMENT_BLOCK_SIZE)
            .sync_on_flush(false);
        assert_eq!(writer.kernel_version, KernelVersion::V4_2);
        assert_eq!(writer.segment_block_size, 256);
        assert!(!writer.sync_on_flush);
    }
}
