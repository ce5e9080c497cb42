//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level byte store holding one transaction log file.
///
/// Backends are **opaque**. Log headers, entries and envelope framing are
/// interpreted by the channels layered on top of them.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `read_up_to` never fails because the range runs past the end; it returns
///   the bytes that exist
/// - `flush` ensures all appended data has reached the OS
/// - Backends must be `Send + Sync` so independent logs can be scanned in parallel
pub trait StorageBackend: Send + Sync {
    /// Reads exactly `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range extends
    /// beyond the current size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Reads at most `max_len` bytes starting at `offset`.
    ///
    /// Returns an empty vector when `offset` is at or beyond the end.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_up_to(&self, offset: u64, max_len: usize) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        if offset >= size {
            return Ok(Vec::new());
        }
        let available = usize::try_from(size - offset).unwrap_or(usize::MAX);
        self.read_at(offset, max_len.min(available))
    }

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Flushes all pending writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to `new_size` bytes.
    ///
    /// Used to cut an incomplete tail entry off a log after crash recovery.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is greater than the current size or
    /// the truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Appends `len` zero bytes, the way filesystems pre-allocate log files.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn preallocate(&mut self, len: usize) -> StorageResult<u64> {
        self.append(&vec![0u8; len])
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for Box<B> {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        (**self).read_at(offset, len)
    }

    fn read_up_to(&self, offset: u64, max_len: usize) -> StorageResult<Vec<u8>> {
        (**self).read_up_to(offset, max_len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        (**self).append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        (**self).flush()
    }

    fn size(&self) -> StorageResult<u64> {
        (**self).size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        (**self).sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        (**self).truncate(new_size)
    }

    fn preallocate(&mut self, len: usize) -> StorageResult<u64> {
        (**self).preallocate(len)
    }
}
