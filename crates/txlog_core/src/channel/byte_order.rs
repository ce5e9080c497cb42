//! The legacy byte-order adapter.
//!
//! The oldest logs stored multi-byte fields little-endian. Wrapping a channel
//! in these adapters lets every codec read and write big-endian as usual.
//! Raw byte runs and stored checksums pass through untouched.

use super::{ReadableChannel, WritableChannel};
use crate::error::LogResult;
use crate::types::LogPosition;
use crate::version::KernelVersion;

/// Reads through `inner`, reversing multi-byte fields.
pub struct ReversedByteOrderChannel<'a> {
    inner: &'a mut dyn ReadableChannel,
}

impl<'a> ReversedByteOrderChannel<'a> {
    /// Wraps a channel.
    pub fn new(inner: &'a mut dyn ReadableChannel) -> Self {
        Self { inner }
    }
}

impl ReadableChannel for ReversedByteOrderChannel<'_> {
    fn read_exact(&mut self, dst: &mut [u8]) -> LogResult<()> {
        self.inner.read_exact(dst)
    }

    fn position(&self) -> LogPosition {
        self.inner.position()
    }

    fn set_position(&mut self, byte_offset: u64) -> LogResult<()> {
        self.inner.set_position(byte_offset)
    }

    fn begin_checksum(&mut self) {
        self.inner.begin_checksum();
    }

    fn checksum(&self) -> u32 {
        self.inner.checksum()
    }

    fn get_u16(&mut self) -> LogResult<u16> {
        self.inner.get_u16().map(u16::swap_bytes)
    }

    fn get_u32(&mut self) -> LogResult<u32> {
        self.inner.get_u32().map(u32::swap_bytes)
    }

    fn get_u64(&mut self) -> LogResult<u64> {
        self.inner.get_u64().map(u64::swap_bytes)
    }

    fn end_checksum_and_validate(&mut self) -> LogResult<u32> {
        self.inner.end_checksum_and_validate()
    }
}

/// Writes through `inner`, reversing multi-byte fields.
pub struct ReversedByteOrderWriteChannel<'a> {
    inner: &'a mut dyn WritableChannel,
}

impl<'a> ReversedByteOrderWriteChannel<'a> {
    /// Wraps a channel.
    pub fn new(inner: &'a mut dyn WritableChannel) -> Self {
        Self { inner }
    }
}

impl WritableChannel for ReversedByteOrderWriteChannel<'_> {
    fn put_bytes(&mut self, data: &[u8]) -> LogResult<()> {
        self.inner.put_bytes(data)
    }

    fn position(&self) -> LogPosition {
        self.inner.position()
    }

    fn begin_checksum(&mut self) {
        self.inner.begin_checksum();
    }

    fn checksum(&self) -> u32 {
        self.inner.checksum()
    }

    fn flush(&mut self) -> LogResult<()> {
        self.inner.flush()
    }

    fn put_u16(&mut self, value: u16) -> LogResult<()> {
        self.inner.put_u16(value.swap_bytes())
    }

    fn put_u32(&mut self, value: u32) -> LogResult<()> {
        self.inner.put_u32(value.swap_bytes())
    }

    fn put_u64(&mut self, value: u64) -> LogResult<()> {
        self.inner.put_u64(value.swap_bytes())
    }

    fn put_checksum(&mut self) -> LogResult<u32> {
        self.inner.put_checksum()
    }

    fn begin_entry(&mut self, kernel_version: KernelVersion) -> LogResult<()> {
        self.inner.begin_entry(kernel_version)
    }

    fn end_entry(&mut self) -> LogResult<()> {
        self.inner.end_entry()
    }
}
