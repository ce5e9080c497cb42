//! Storage commands carried by command entries.
//!
//! The log format treats a command as an opaque payload. Decoding one is up
//! to the storage engine, which plugs in through [`CommandReaderFactory`].

use crate::channel::{ReadableChannel, WritableChannel};
use crate::error::{LogError, LogResult};
use crate::version::KernelVersion;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Largest payload [`OpaqueCommand`] accepts.
pub const MAX_OPAQUE_COMMAND_SIZE: usize = 16 * 1024 * 1024;

/// One storage-engine command.
pub trait StorageCommand: fmt::Debug + Send + Sync {
    /// Writes the command payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be written.
    fn serialize(&self, channel: &mut dyn WritableChannel) -> LogResult<()>;

    /// Upcast for equality checks.
    fn as_any(&self) -> &dyn Any;

    /// Whether `other` is the same command.
    fn command_eq(&self, other: &dyn StorageCommand) -> bool;
}

/// Decodes commands written under one kernel version.
pub trait CommandReader: Send + Sync {
    /// Reads one command payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is truncated or malformed.
    fn read(&self, channel: &mut dyn ReadableChannel) -> LogResult<Arc<dyn StorageCommand>>;
}

/// Hands out the command reader for a kernel version.
pub trait CommandReaderFactory: Send + Sync {
    /// Reader for commands written under `kernel_version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine has no reader for that version.
    fn reader(&self, kernel_version: KernelVersion) -> LogResult<&dyn CommandReader>;
}

/// A command kept as raw bytes: `[len: u32][bytes]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueCommand {
    /// Payload bytes.
    pub bytes: Vec<u8>,
}

impl OpaqueCommand {
    /// Creates a command from payload bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl StorageCommand for OpaqueCommand {
    fn serialize(&self, channel: &mut dyn WritableChannel) -> LogResult<()> {
        if self.bytes.len() > MAX_OPAQUE_COMMAND_SIZE {
            return Err(LogError::invalid_argument(format!(
                "command of {} bytes exceeds {MAX_OPAQUE_COMMAND_SIZE}",
                self.bytes.len()
            )));
        }
        channel.put_u32(self.bytes.len() as u32)?;
        channel.put_bytes(&self.bytes)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn command_eq(&self, other: &dyn StorageCommand) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| other == self)
    }
}

/// Reads [`OpaqueCommand`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueCommandReader;

impl CommandReader for OpaqueCommandReader {
    fn read(&self, channel: &mut dyn ReadableChannel) -> LogResult<Arc<dyn StorageCommand>> {
        let len = channel.get_u32()? as usize;
        if len > MAX_OPAQUE_COMMAND_SIZE {
            return Err(LogError::corrupted(format!(
                "command length {len} exceeds {MAX_OPAQUE_COMMAND_SIZE}"
            )));
        }
        Ok(Arc::new(OpaqueCommand::new(channel.get_bytes(len)?)))
    }
}

/// Factory returning [`OpaqueCommandReader`] for every version.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueCommandReaderFactory;

impl CommandReaderFactory for OpaqueCommandReaderFactory {
    fn reader(&self, _kernel_version: KernelVersion) -> LogResult<&dyn CommandReader> {
        Ok(&OpaqueCommandReader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::InMemoryChannel;

    #[test]
    fn opaque_command_layout() {
        let mut ch = InMemoryChannel::new(0);
        OpaqueCommand::new(vec![7, 8, 9]).serialize(&mut ch).unwrap();
        assert_eq!(ch.as_bytes(), &[0, 0, 0, 3, 7, 8, 9]);

        let command = OpaqueCommandReaderFactory
            .reader(KernelVersion::LATEST)
            .unwrap()
            .read(&mut ch)
            .unwrap();
        assert!(command.command_eq(&OpaqueCommand::new(vec![7, 8, 9])));
        assert!(!command.command_eq(&OpaqueCommand::new(vec![7])));
    }

    #[test]
    fn oversized_length_is_corruption() {
        let mut ch = InMemoryChannel::from_bytes(0, u32::MAX.to_be_bytes().to_vec());
        assert!(matches!(
            OpaqueCommandReader.read(&mut ch),
            Err(LogError::Corrupted { .. })
        ));
    }
}
