//! The codec set of one kernel version.

use super::EntryCodec;
use crate::entry::LogEntryType;
use crate::error::{LogError, LogResult};
use crate::types::LogPosition;
use crate::version::KernelVersion;
use std::fmt;

/// Codecs for every entry type one kernel version can read and write.
///
/// Indexed directly by type byte. Immutable once published by the registry,
/// so any number of readers may share one.
#[derive(Clone)]
pub struct LogEntrySerializationSet {
    kernel_version: KernelVersion,
    codecs: [Option<&'static dyn EntryCodec>; 256],
}

impl LogEntrySerializationSet {
    /// Creates a set with no codecs.
    #[must_use]
    pub fn empty(kernel_version: KernelVersion) -> Self {
        Self {
            kernel_version,
            codecs: [None; 256],
        }
    }

    /// Creates a set for `kernel_version` starting from the codecs of `base`.
    #[must_use]
    pub fn extending(kernel_version: KernelVersion, base: &Self) -> Self {
        Self {
            kernel_version,
            codecs: base.codecs,
        }
    }

    /// Adds a codec for a type byte that has none yet.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::DuplicateEntryType`] if the type byte is taken.
    pub fn register(&mut self, codec: &'static dyn EntryCodec) -> LogResult<()> {
        let slot = &mut self.codecs[usize::from(codec.entry_type().as_byte())];
        if slot.is_some() {
            return Err(LogError::DuplicateEntryType {
                kernel_version: self.kernel_version,
                entry_type: codec.entry_type().as_byte(),
            });
        }
        *slot = Some(codec);
        Ok(())
    }

    /// Replaces the codec of a type byte inherited from an earlier version.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::OverrideWithoutBase`] if the type byte has no codec.
    pub fn register_override(&mut self, codec: &'static dyn EntryCodec) -> LogResult<()> {
        let slot = &mut self.codecs[usize::from(codec.entry_type().as_byte())];
        if slot.is_none() {
            return Err(LogError::OverrideWithoutBase {
                kernel_version: self.kernel_version,
                entry_type: codec.entry_type().as_byte(),
            });
        }
        *slot = Some(codec);
        Ok(())
    }

    /// Codec for `entry_type`, if this version has one.
    #[must_use]
    pub fn lookup(&self, entry_type: u8) -> Option<&'static dyn EntryCodec> {
        self.codecs[usize::from(entry_type)]
    }

    /// Codec for `entry_type`.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::UnknownEntryType`] if this version has none. The
    /// error carries no position; the reader reports one.
    pub fn select(&self, entry_type: u8) -> LogResult<&'static dyn EntryCodec> {
        self.lookup(entry_type)
            .ok_or(LogError::UnknownEntryType {
                kernel_version: self.kernel_version,
                entry_type,
                position: LogPosition::UNSPECIFIED,
            })
    }

    /// Version this set belongs to.
    #[must_use]
    pub fn kernel_version(&self) -> KernelVersion {
        self.kernel_version
    }

    /// Whether entries of this version are read through the byte-order adapter.
    #[must_use]
    pub fn legacy_byte_order(&self) -> bool {
        self.kernel_version.is_legacy_byte_order()
    }

    /// Registered entry types, in type byte order.
    #[must_use]
    pub fn entry_types(&self) -> Vec<LogEntryType> {
        self.codecs
            .iter()
            .flatten()
            .map(|codec| codec.entry_type())
            .collect()
    }
}

impl fmt::Debug for LogEntrySerializationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codecs: Vec<(u8, &str)> = self
            .codecs
            .iter()
            .flatten()
            .map(|codec| (codec.entry_type().as_byte(), codec.name()))
            .collect();
        f.debug_struct("LogEntrySerializationSet")
            .field("kernel_version", &self.kernel_version)
            .field("codecs", &codecs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CommandCodec, CommitCodec, StartV2_3, StartV4_2};

    #[test]
    fn duplicate_type_is_rejected() {
        let mut set = LogEntrySerializationSet::empty(KernelVersion::V4_0);
        set.register(&CommandCodec).unwrap();
        assert!(matches!(
            set.register(&CommandCodec),
            Err(LogError::DuplicateEntryType { entry_type: 3, .. })
        ));
    }

    #[test]
    fn override_needs_a_base() {
        let mut set = LogEntrySerializationSet::empty(KernelVersion::V4_2);
        assert!(matches!(
            set.register_override(&StartV4_2),
            Err(LogError::OverrideWithoutBase { entry_type: 1, .. })
        ));
        set.register(&StartV2_3).unwrap();
        set.register_override(&StartV4_2).unwrap();
        assert_eq!(set.select(1).unwrap().name(), "StartV4_2");
    }

    #[test]
    fn extending_copies_without_sharing() {
        let mut base = LogEntrySerializationSet::empty(KernelVersion::V4_0);
        base.register(&CommitCodec).unwrap();
        let mut next = LogEntrySerializationSet::extending(KernelVersion::V4_2, &base);
        next.register(&CommandCodec).unwrap();

        assert_eq!(base.entry_types(), vec![LogEntryType::Commit]);
        assert_eq!(
            next.entry_types(),
            vec![LogEntryType::Command, LogEntryType::Commit]
        );
        assert_eq!(next.kernel_version(), KernelVersion::V4_2);
    }

    #[test]
    fn unknown_type_names_version_and_type() {
        let set = LogEntrySerializationSet::empty(KernelVersion::V5_0);
        match set.select(42).err() {
            Some(LogError::UnknownEntryType {
                kernel_version,
                entry_type,
                ..
            }) => {
                assert_eq!(kernel_version, KernelVersion::V5_0);
                assert_eq!(entry_type, 42);
            }
            other => panic!("expected UnknownEntryType, got {other:?}"),
        }
    }
}
