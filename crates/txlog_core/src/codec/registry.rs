//! Process-wide table of serialization sets.
//!
//! The sets are described as data: one [`SetLayer`] per kernel version,
//! oldest first. A layer either starts a fresh set or extends the set of the
//! version before it, then adds or overrides codecs. The table is folded into
//! sets once, on first use, and never changes afterwards.

use super::{
    ChunkEndCodec, ChunkStartCodec, CommandCodec, CommitCodec, DetachedCheckpointV4_2,
    DetachedCheckpointV5_0, DetachedCheckpointV5_10, EntryCodec, InlineCheckpoint,
    LogEntrySerializationSet, RollbackCodec, StartV2_3, StartV4_2, StartV5_10,
};
use crate::error::{LogError, LogResult};
use crate::version::KernelVersion;
use once_cell::sync::Lazy;

/// One codec registration inside a layer.
#[derive(Clone, Copy)]
pub enum CodecRegistration {
    /// The type byte must not have a codec yet.
    Add(&'static dyn EntryCodec),
    /// The type byte must already have a codec, which is replaced.
    Override(&'static dyn EntryCodec),
}

/// How one kernel version's set is derived.
#[derive(Clone, Copy)]
pub struct SetLayer {
    /// Version the resulting set belongs to.
    pub kernel_version: KernelVersion,
    /// Whether the set starts from the previous layer's codecs.
    pub extends_previous: bool,
    /// Codecs added or overridden on top.
    pub registrations: &'static [CodecRegistration],
}

use CodecRegistration::{Add, Override};

const BASE_CODECS: &[CodecRegistration] = &[
    Add(&StartV2_3),
    Add(&CommandCodec),
    Add(&CommitCodec),
    Add(&InlineCheckpoint),
];

const CHECKSUMMED_CODECS: &[CodecRegistration] = &[
    Add(&StartV4_2),
    Add(&CommandCodec),
    Add(&CommitCodec),
    Add(&DetachedCheckpointV4_2),
];

/// The compatibility matrix, oldest version first.
static LAYERS: [SetLayer; 9] = [
    SetLayer {
        kernel_version: KernelVersion::V2_3,
        extends_previous: false,
        registrations: BASE_CODECS,
    },
    SetLayer {
        kernel_version: KernelVersion::V4_0,
        extends_previous: false,
        registrations: BASE_CODECS,
    },
    SetLayer {
        kernel_version: KernelVersion::V4_2,
        extends_previous: false,
        registrations: CHECKSUMMED_CODECS,
    },
    SetLayer {
        kernel_version: KernelVersion::V4_3D4,
        extends_previous: true,
        registrations: &[],
    },
    SetLayer {
        kernel_version: KernelVersion::V4_4,
        extends_previous: true,
        registrations: &[],
    },
    SetLayer {
        kernel_version: KernelVersion::V5_0,
        extends_previous: true,
        registrations: &[Add(&DetachedCheckpointV5_0)],
    },
    SetLayer {
        kernel_version: KernelVersion::V5_7,
        extends_previous: true,
        registrations: &[
            Add(&ChunkStartCodec),
            Add(&ChunkEndCodec),
            Add(&RollbackCodec),
        ],
    },
    SetLayer {
        kernel_version: KernelVersion::V5_10,
        extends_previous: true,
        registrations: &[
            Override(&StartV5_10),
            Override(&DetachedCheckpointV5_10),
        ],
    },
    SetLayer {
        kernel_version: KernelVersion::V5_20,
        extends_previous: true,
        registrations: &[],
    },
];

/// Folds `layers` into one set per layer.
///
/// # Errors
///
/// Returns [`LogError::DuplicateEntryType`] or [`LogError::OverrideWithoutBase`]
/// for a bad registration, or an invalid argument error if the first layer
/// extends nothing.
pub fn build_serialization_sets(layers: &[SetLayer]) -> LogResult<Vec<LogEntrySerializationSet>> {
    let mut sets: Vec<LogEntrySerializationSet> = Vec::with_capacity(layers.len());
    for layer in layers {
        let mut set = if layer.extends_previous {
            let base = sets.last().ok_or_else(|| {
                LogError::invalid_argument(format!(
                    "kernel version {} extends a previous set but is the first layer",
                    layer.kernel_version
                ))
            })?;
            LogEntrySerializationSet::extending(layer.kernel_version, base)
        } else {
            LogEntrySerializationSet::empty(layer.kernel_version)
        };
        for registration in layer.registrations {
            match *registration {
                Add(codec) => set.register(codec)?,
                Override(codec) => set.register_override(codec)?,
            }
        }
        sets.push(set);
    }
    Ok(sets)
}

static SETS: Lazy<Vec<LogEntrySerializationSet>> = Lazy::new(|| {
    let sets = build_serialization_sets(&LAYERS)
        .unwrap_or_else(|e| panic!("invalid serialization set table: {e}"));
    for (ordinal, version) in KernelVersion::ALL.iter().enumerate() {
        let found = sets.get(ordinal).map(LogEntrySerializationSet::kernel_version);
        assert_eq!(
            found,
            Some(*version),
            "serialization set table must list every kernel version in order"
        );
    }
    sets
});

/// The serialization set of `version`.
#[must_use]
pub fn serialization_set(version: KernelVersion) -> &'static LogEntrySerializationSet {
    &SETS[version.ordinal()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::LogEntryType;

    fn types(version: KernelVersion) -> Vec<u8> {
        serialization_set(version)
            .entry_types()
            .into_iter()
            .map(LogEntryType::as_byte)
            .collect()
    }

    fn codec_name(version: KernelVersion, entry_type: LogEntryType) -> &'static str {
        serialization_set(version)
            .select(entry_type.as_byte())
            .map(|codec| codec.name())
            .unwrap_or("<none>")
    }

    #[test]
    fn every_version_has_a_set() {
        for version in KernelVersion::ALL {
            assert_eq!(serialization_set(version).kernel_version(), version);
        }
    }

    #[test]
    fn compatibility_matrix() {
        assert_eq!(types(KernelVersion::V2_3), vec![1, 3, 5, 7]);
        assert_eq!(types(KernelVersion::V4_0), vec![1, 3, 5, 7]);
        assert_eq!(types(KernelVersion::V4_2), vec![1, 3, 5, 8]);
        assert_eq!(types(KernelVersion::V4_4), vec![1, 3, 5, 8]);
        assert_eq!(types(KernelVersion::V5_0), vec![1, 3, 5, 8, 9]);
        assert_eq!(types(KernelVersion::V5_7), vec![1, 3, 5, 8, 9, 10, 11, 12]);
        assert_eq!(types(KernelVersion::V5_20), types(KernelVersion::V5_10));
    }

    #[test]
    fn overrides_take_effect_from_their_version() {
        assert_eq!(codec_name(KernelVersion::V2_3, LogEntryType::Start), "StartV2_3");
        assert_eq!(codec_name(KernelVersion::V5_7, LogEntryType::Start), "StartV4_2");
        assert_eq!(codec_name(KernelVersion::V5_10, LogEntryType::Start), "StartV5_10");
        assert_eq!(
            codec_name(KernelVersion::V5_7, LogEntryType::DetachedCheckpointV5),
            "DetachedCheckpointV5_0"
        );
        assert_eq!(
            codec_name(KernelVersion::V5_20, LogEntryType::DetachedCheckpointV5),
            "DetachedCheckpointV5_10"
        );
    }

    #[test]
    fn only_the_oldest_set_reverses_byte_order() {
        let legacy: Vec<KernelVersion> = KernelVersion::ALL
            .into_iter()
            .filter(|v| serialization_set(*v).legacy_byte_order())
            .collect();
        assert_eq!(legacy, vec![KernelVersion::V2_3]);
    }

    #[test]
    fn duplicate_registration_fails_the_build() {
        let layers = [SetLayer {
            kernel_version: KernelVersion::V4_0,
            extends_previous: false,
            registrations: &[Add(&CommandCodec), Add(&CommandCodec)],
        }];
        assert!(matches!(
            build_serialization_sets(&layers),
            Err(LogError::DuplicateEntryType { entry_type: 3, .. })
        ));
    }

    #[test]
    fn override_without_base_fails_the_build() {
        let layers = [
            SetLayer {
                kernel_version: KernelVersion::V4_2,
                extends_previous: false,
                registrations: &[Add(&CommitCodec)],
            },
            SetLayer {
                kernel_version: KernelVersion::V5_7,
                extends_previous: true,
                registrations: &[Override(&RollbackCodec)],
            },
        ];
        assert!(matches!(
            build_serialization_sets(&layers),
            Err(LogError::OverrideWithoutBase { entry_type: 12, .. })
        ));
    }

    #[test]
    fn first_layer_cannot_extend() {
        let layers = [SetLayer {
            kernel_version: KernelVersion::V4_0,
            extends_previous: true,
            registrations: &[],
        }];
        assert!(build_serialization_sets(&layers).is_err());
    }
}
