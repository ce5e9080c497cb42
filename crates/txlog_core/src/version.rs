//! Kernel versions: the format/feature generations a log region can be written in.
//!
//! Every entry starts with the signed version byte of the kernel that wrote it.
//! The byte drives codec selection on read, so codes are never reassigned.

use std::fmt;

/// Why a version code could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionResolution {
    /// The code is newer than anything this build understands.
    TooNew,
    /// The code predates the oldest supported migration path.
    TooOld,
    /// The code lies inside the supported range but was never assigned.
    Unknown,
}

/// A kernel version that has a log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KernelVersion {
    /// 2.3-era logs, written with little-endian multi-byte fields.
    V2_3,
    /// 4.0: big-endian fields, no checksums.
    V4_0,
    /// 4.2: per-entry checksums and detached checkpoints.
    V4_2,
    /// 4.3 drop 4.
    V4_3D4,
    /// 4.4.
    V4_4,
    /// 5.0: checkpoints carry transaction id information.
    V5_0,
    /// 5.7: chunked transactions and rollbacks.
    V5_7,
    /// 5.10: append indexes on start entries and checkpoints.
    V5_10,
    /// 5.20: envelope-framed log files.
    V5_20,
}

impl KernelVersion {
    /// All supported versions, oldest first.
    pub const ALL: [Self; 9] = [
        Self::V2_3,
        Self::V4_0,
        Self::V4_2,
        Self::V4_3D4,
        Self::V4_4,
        Self::V5_0,
        Self::V5_7,
        Self::V5_10,
        Self::V5_20,
    ];

    /// The oldest version this build can read.
    pub const EARLIEST: Self = Self::V2_3;

    /// The newest version this build can read and write.
    pub const LATEST: Self = Self::V5_20;

    /// The byte written at the start of every entry.
    #[must_use]
    pub const fn code(self) -> i8 {
        match self {
            Self::V2_3 => -10,
            Self::V4_0 => 1,
            Self::V4_2 => 2,
            Self::V4_3D4 => 3,
            Self::V4_4 => 4,
            Self::V5_0 => 5,
            Self::V5_7 => 7,
            Self::V5_10 => 10,
            Self::V5_20 => 20,
        }
    }

    /// Resolves a version byte read from a log.
    ///
    /// # Errors
    ///
    /// Returns how the code failed to resolve: too new, too old, or unassigned.
    pub const fn from_code(code: i8) -> Result<Self, VersionResolution> {
        match code {
            -10 => Ok(Self::V2_3),
            1 => Ok(Self::V4_0),
            2 => Ok(Self::V4_2),
            3 => Ok(Self::V4_3D4),
            4 => Ok(Self::V4_4),
            5 => Ok(Self::V5_0),
            7 => Ok(Self::V5_7),
            10 => Ok(Self::V5_10),
            20 => Ok(Self::V5_20),
            c if c > Self::LATEST.code() => Err(VersionResolution::TooNew),
            c if c < Self::EARLIEST.code() => Err(VersionResolution::TooOld),
            _ => Err(VersionResolution::Unknown),
        }
    }

    /// Position of this version in [`Self::ALL`].
    #[must_use]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// Whether entries of this version were written with reversed byte order.
    #[must_use]
    pub const fn is_legacy_byte_order(self) -> bool {
        matches!(self, Self::V2_3)
    }

    /// Whether every entry of this version ends with a 4-byte checksum.
    #[must_use]
    pub fn has_entry_checksums(self) -> bool {
        self >= Self::V4_2
    }

    /// Whether log files created for this version use envelope framing.
    #[must_use]
    pub fn uses_envelopes(self) -> bool {
        self >= Self::V5_20
    }

    /// Whether this version can write the legacy inline checkpoint entry.
    #[must_use]
    pub fn has_inline_checkpoints(self) -> bool {
        self < Self::V4_2
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::V2_3 => "2.3",
            Self::V4_0 => "4.0",
            Self::V4_2 => "4.2",
            Self::V4_3D4 => "4.3.0-drop04",
            Self::V4_4 => "4.4",
            Self::V5_0 => "5.0",
            Self::V5_7 => "5.7",
            Self::V5_10 => "5.10",
            Self::V5_20 => "5.20",
        };
        write!(f, "{name} (code {})", self.code())
    }
}
