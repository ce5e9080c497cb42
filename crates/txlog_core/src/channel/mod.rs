//! Positionable, checksum-aware byte channels.
//!
//! Codecs read and write entries exclusively through these traits so the
//! same codec works over a plain file, an envelope-framed file, an in-memory
//! buffer, or the reversed byte order of the oldest logs.
//!
//! Every byte consumed or produced updates the channel's running CRC-32.
//! `begin_checksum` restarts it; checksummed codecs finish with
//! [`ReadableChannel::end_checksum_and_validate`] or
//! [`WritableChannel::put_checksum`].

mod byte_order;
mod memory;
mod physical;
mod read_ahead;

pub use byte_order::{ReversedByteOrderChannel, ReversedByteOrderWriteChannel};
pub use memory::InMemoryChannel;
pub use physical::PhysicalWriteChannel;
pub use read_ahead::ReadAheadChannel;

use crate::error::{LogError, LogResult};
use crate::types::LogPosition;
use crate::version::KernelVersion;

/// A channel entries are read from.
pub trait ReadableChannel {
    /// Fills `dst` with the next bytes.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ReadPastEnd`] if the data ends first.
    fn read_exact(&mut self, dst: &mut [u8]) -> LogResult<()>;

    /// Current position.
    fn position(&self) -> LogPosition;

    /// Moves the cursor to `byte_offset` in the current file.
    ///
    /// The running checksum is not adjusted.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot reposition there.
    fn set_position(&mut self, byte_offset: u64) -> LogResult<()>;

    /// Restarts the running checksum.
    fn begin_checksum(&mut self);

    /// Checksum of the bytes read since the last `begin_checksum`.
    fn checksum(&self) -> u32;

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ReadPastEnd`] if the data ends.
    fn get_u8(&mut self) -> LogResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads one signed byte.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ReadPastEnd`] if the data ends.
    fn get_i8(&mut self) -> LogResult<i8> {
        Ok(i8::from_be_bytes([self.get_u8()?]))
    }

    /// Reads a big-endian u16.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ReadPastEnd`] if the data ends.
    fn get_u16(&mut self) -> LogResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Reads a big-endian u32.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ReadPastEnd`] if the data ends.
    fn get_u32(&mut self) -> LogResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Reads a big-endian u64.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ReadPastEnd`] if the data ends.
    fn get_u64(&mut self) -> LogResult<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Reads `len` raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ReadPastEnd`] if the data ends.
    fn get_bytes(&mut self, len: usize) -> LogResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a stored checksum and compares it with the running one.
    ///
    /// Returns the stored checksum.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ChecksumMismatch`] if they differ.
    fn end_checksum_and_validate(&mut self) -> LogResult<u32> {
        let actual = self.checksum();
        let position = self.position();
        let expected = self.get_u32()?;
        if expected != actual {
            return Err(LogError::ChecksumMismatch {
                expected,
                actual,
                position,
            });
        }
        Ok(expected)
    }
}

/// A channel entries are written to.
pub trait WritableChannel {
    /// Writes raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn put_bytes(&mut self, data: &[u8]) -> LogResult<()>;

    /// Position the next byte lands at.
    fn position(&self) -> LogPosition;

    /// Restarts the running checksum.
    fn begin_checksum(&mut self);

    /// Checksum of the bytes written since the last `begin_checksum`.
    fn checksum(&self) -> u32;

    /// Pushes buffered bytes to storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn flush(&mut self) -> LogResult<()>;

    /// Writes one byte.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn put_u8(&mut self, value: u8) -> LogResult<()> {
        self.put_bytes(&[value])
    }

    /// Writes one signed byte.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn put_i8(&mut self, value: i8) -> LogResult<()> {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Writes a big-endian u16.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn put_u16(&mut self, value: u16) -> LogResult<()> {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Writes a big-endian u32.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn put_u32(&mut self, value: u32) -> LogResult<()> {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Writes a big-endian u64.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn put_u64(&mut self, value: u64) -> LogResult<()> {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Appends the running checksum and returns it.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn put_checksum(&mut self) -> LogResult<u32> {
        let checksum = self.checksum();
        self.put_bytes(&checksum.to_be_bytes())?;
        Ok(checksum)
    }

    /// Marks the start of one logical entry.
    ///
    /// Framing channels group everything up to [`Self::end_entry`] into one
    /// unit; plain channels ignore it.
    ///
    /// # Errors
    ///
    /// Returns an error if the framing state is invalid.
    fn begin_entry(&mut self, _kernel_version: KernelVersion) -> LogResult<()> {
        Ok(())
    }

    /// Marks the end of the current logical entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the framed entry cannot be written.
    fn end_entry(&mut self) -> LogResult<()> {
        Ok(())
    }

    /// Drops whatever the current logical entry has produced so far.
    ///
    /// Only framing channels can take bytes back; plain channels have
    /// already passed them on.
    fn abort_entry(&mut self) {}
}

impl<C: ReadableChannel + ?Sized> ReadableChannel for &mut C {
    fn read_exact(&mut self, dst: &mut [u8]) -> LogResult<()> {
        (**self).read_exact(dst)
    }

    fn position(&self) -> LogPosition {
        (**self).position()
    }

    fn set_position(&mut self, byte_offset: u64) -> LogResult<()> {
        (**self).set_position(byte_offset)
    }

    fn begin_checksum(&mut self) {
        (**self).begin_checksum();
    }

    fn checksum(&self) -> u32 {
        (**self).checksum()
    }

    fn get_u16(&mut self) -> LogResult<u16> {
        (**self).get_u16()
    }

    fn get_u32(&mut self) -> LogResult<u32> {
        (**self).get_u32()
    }

    fn get_u64(&mut self) -> LogResult<u64> {
        (**self).get_u64()
    }

    fn end_checksum_and_validate(&mut self) -> LogResult<u32> {
        (**self).end_checksum_and_validate()
    }
}

impl<C: WritableChannel + ?Sized> WritableChannel for &mut C {
    fn put_bytes(&mut self, data: &[u8]) -> LogResult<()> {
        (**self).put_bytes(data)
    }

    fn position(&self) -> LogPosition {
        (**self).position()
    }

    fn begin_checksum(&mut self) {
        (**self).begin_checksum();
    }

    fn checksum(&self) -> u32 {
        (**self).checksum()
    }

    fn flush(&mut self) -> LogResult<()> {
        (**self).flush()
    }

    fn put_u16(&mut self, value: u16) -> LogResult<()> {
        (**self).put_u16(value)
    }

    fn put_u32(&mut self, value: u32) -> LogResult<()> {
        (**self).put_u32(value)
    }

    fn put_u64(&mut self, value: u64) -> LogResult<()> {
        (**self).put_u64(value)
    }

    fn put_checksum(&mut self) -> LogResult<u32> {
        (**self).put_checksum()
    }

    fn begin_entry(&mut self, kernel_version: KernelVersion) -> LogResult<()> {
        (**self).begin_entry(kernel_version)
    }

    fn end_entry(&mut self) -> LogResult<()> {
        (**self).end_entry()
    }

    fn abort_entry(&mut self) {
        (**self).abort_entry();
    }
}
