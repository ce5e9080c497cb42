//! Buffered appending to a storage backend.

use super::WritableChannel;
use crate::error::LogResult;
use crate::types::LogPosition;
use crc32fast::Hasher;
use txlog_storage::StorageBackend;

/// Appends to a log file through a write buffer.
///
/// The caller owns the append position exclusively; nothing here locks.
pub struct PhysicalWriteChannel<B: StorageBackend> {
    backend: B,
    log_version: u64,
    buffer: Vec<u8>,
    buffer_size: usize,
    /// File offset of `buffer[0]`.
    flushed: u64,
    sync_on_flush: bool,
    hasher: Hasher,
}

impl<B: StorageBackend> PhysicalWriteChannel<B> {
    /// Creates a channel appending after the backend's current end.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be determined.
    pub fn new(backend: B, log_version: u64, buffer_size: usize) -> LogResult<Self> {
        let flushed = backend.size()?;
        Ok(Self {
            backend,
            log_version,
            buffer: Vec::with_capacity(buffer_size),
            buffer_size: buffer_size.max(1),
            flushed,
            sync_on_flush: false,
            hasher: Hasher::new(),
        })
    }

    /// Sets whether `flush` also syncs the backend.
    #[must_use]
    pub fn with_sync_on_flush(mut self, value: bool) -> Self {
        self.sync_on_flush = value;
        self
    }

    /// Returns a reference to the backend.
    ///
    /// Bytes still buffered are not visible through it.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Flushes and returns the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn into_inner(mut self) -> LogResult<B> {
        self.flush()?;
        Ok(self.backend)
    }

    fn drain(&mut self) -> LogResult<()> {
        if !self.buffer.is_empty() {
            self.backend.append(&self.buffer)?;
            self.flushed += self.buffer.len() as u64;
            self.buffer.clear();
        }
        Ok(())
    }
}

impl<B: StorageBackend> WritableChannel for PhysicalWriteChannel<B> {
    fn put_bytes(&mut self, data: &[u8]) -> LogResult<()> {
        self.hasher.update(data);
        self.buffer.extend_from_slice(data);
        if self.buffer.len() >= self.buffer_size {
            self.drain()?;
        }
        Ok(())
    }

    fn position(&self) -> LogPosition {
        LogPosition::new(self.log_version, self.flushed + self.buffer.len() as u64)
    }

    fn begin_checksum(&mut self) {
        self.hasher.reset();
    }

    fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn flush(&mut self) -> LogResult<()> {
        self.drain()?;
        self.backend.flush()?;
        if self.sync_on_flush {
            self.backend.sync()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlog_storage::InMemoryBackend;

    #[test]
    fn buffers_until_flush() {
        let mut ch = PhysicalWriteChannel::new(InMemoryBackend::new(), 0, 1024).unwrap();
        ch.put_u64(42).unwrap();
        assert_eq!(ch.backend().size().unwrap(), 0);
        assert_eq!(ch.position(), LogPosition::new(0, 8));

        ch.flush().unwrap();
        assert_eq!(ch.backend().data(), 42u64.to_be_bytes().to_vec());
    }

    #[test]
    fn drains_when_buffer_fills() {
        let mut ch = PhysicalWriteChannel::new(InMemoryBackend::new(), 0, 4).unwrap();
        ch.put_bytes(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(ch.backend().size().unwrap(), 5);
        ch.put_u8(6).unwrap();
        assert_eq!(ch.into_inner().unwrap().data(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn appends_after_existing_data() {
        let backend = InMemoryBackend::with_data(vec![9; 16]);
        let mut ch = PhysicalWriteChannel::new(backend, 2, 64).unwrap();
        assert_eq!(ch.position(), LogPosition::new(2, 16));
        ch.put_u16(0x0102).unwrap();
        let data = ch.into_inner().unwrap().data();
        assert_eq!(&data[16..], &[1, 2]);
    }

    #[test]
    fn put_checksum_covers_bytes_since_begin() {
        let mut ch = PhysicalWriteChannel::new(InMemoryBackend::new(), 0, 64).unwrap();
        ch.put_bytes(b"skip").unwrap();
        ch.begin_checksum();
        ch.put_bytes(b"entry").unwrap();
        let checksum = ch.put_checksum().unwrap();
        assert_eq!(checksum, crc32fast::hash(b"entry"));
        let data = ch.into_inner().unwrap().data();
        assert_eq!(&data[9..], &checksum.to_be_bytes());
    }
}
