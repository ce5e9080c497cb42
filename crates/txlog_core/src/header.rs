//! Log file headers.
//!
//! Every log file starts with a fixed-size header whose first 8 bytes pack
//! the header format and the file's log version into one big-endian word:
//!
//! ```text
//! | format (8 bits) | log version (56 bits) |
//! ```
//!
//! The remaining layout depends on the format:
//!
//! | format | size | fields after the word |
//! |--------|------|------------------------|
//! | V6     | 16   | last committed tx |
//! | V7     | 64   | last committed tx, legacy store id |
//! | V8     | 128  | last committed tx, store id |
//! | V9     | 128  | last committed tx, last append index, store id |
//! | V10    | 128  | V9 fields, segment block size, previous file checksum, kernel version |
//!
//! Bytes after the last field are zero on write and ignored on read.

use crate::channel::WritableChannel;
use crate::error::{LogError, LogResult};
use crate::store_id::{LegacyStoreId, StoreId, StoreIdentity};
use crate::types::{LogPosition, BASE_TX_CHECKSUM};
use crate::version::KernelVersion;
use bytes::{Buf, BufMut};
use std::fmt;
use std::path::Path;
use txlog_storage::{FileBackend, StorageBackend};

/// Mask for the log version part of the combined word.
pub const LOG_VERSION_MASK: u64 = 0x00FF_FFFF_FFFF_FFFF;

/// Bits the format byte is shifted by in the combined word.
const FORMAT_SHIFT: u32 = 56;

/// Size of the largest header format.
pub const MAX_HEADER_SIZE: usize = 128;

/// Name used in errors for headers parsed from memory.
const BUFFER_SOURCE: &str = "<buffer>";

/// Header layout generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeaderFormat {
    /// 16 bytes, no store identity.
    V6,
    /// 64 bytes, legacy store identity.
    V7,
    /// 128 bytes, store identity.
    V8,
    /// 128 bytes, adds the last append index.
    V9,
    /// 128 bytes, adds segment framing fields.
    V10,
}

impl HeaderFormat {
    /// All formats, oldest first.
    pub const ALL: [Self; 5] = [Self::V6, Self::V7, Self::V8, Self::V9, Self::V10];

    /// Byte stored in the top of the combined word.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::V6 => 6,
            Self::V7 => 7,
            Self::V8 => 8,
            Self::V9 => 9,
            Self::V10 => 10,
        }
    }

    /// Resolves a format byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            6 => Some(Self::V6),
            7 => Some(Self::V7),
            8 => Some(Self::V8),
            9 => Some(Self::V9),
            10 => Some(Self::V10),
            _ => None,
        }
    }

    /// Declared size of the header, padding included.
    #[must_use]
    pub const fn header_size(self) -> usize {
        match self {
            Self::V6 => 16,
            Self::V7 => 64,
            Self::V8 | Self::V9 | Self::V10 => 128,
        }
    }

    /// Format used for files created by `version`.
    #[must_use]
    pub fn for_kernel_version(version: KernelVersion) -> Self {
        match version {
            KernelVersion::V2_3 => Self::V6,
            KernelVersion::V4_0 => Self::V7,
            KernelVersion::V5_10 => Self::V9,
            KernelVersion::V5_20 => Self::V10,
            _ => Self::V8,
        }
    }

    fn has_append_index(self) -> bool {
        self >= Self::V9
    }

    fn has_segment_fields(self) -> bool {
        self == Self::V10
    }
}

impl fmt::Display for HeaderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.as_byte())
    }
}

/// Header of one physical log file.
///
/// Created once with the file and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogHeader {
    /// Layout generation.
    pub format: HeaderFormat,
    /// Sequence number of this file.
    pub log_version: u64,
    /// Last transaction committed before this file was started.
    pub last_committed_tx_id: u64,
    /// Last append index before this file was started (V9+).
    pub last_append_index: u64,
    /// Store the file belongs to.
    pub store_id: StoreIdentity,
    /// Segment size for envelope framing (V10).
    pub segment_block_size: u32,
    /// Checksum the previous file ended with (V10).
    pub previous_log_file_checksum: u32,
    /// Kernel version that created the file (V10).
    pub kernel_version: Option<KernelVersion>,
}

impl LogHeader {
    /// Creates a header with default identity and no framing fields.
    #[must_use]
    pub fn new(format: HeaderFormat, log_version: u64, last_committed_tx_id: u64) -> Self {
        Self {
            format,
            log_version,
            last_committed_tx_id,
            last_append_index: 0,
            store_id: default_store_identity(format),
            segment_block_size: 0,
            previous_log_file_checksum: 0,
            kernel_version: None,
        }
    }

    /// Creates the header a file written by `kernel_version` starts with.
    ///
    /// Envelope-framed formats get the kernel version and the base checksum
    /// as the previous file checksum; the caller sets the segment size.
    #[must_use]
    pub fn for_kernel_version(
        kernel_version: KernelVersion,
        log_version: u64,
        last_committed_tx_id: u64,
    ) -> Self {
        let format = HeaderFormat::for_kernel_version(kernel_version);
        let mut header = Self::new(format, log_version, last_committed_tx_id);
        if format.has_segment_fields() {
            header.kernel_version = Some(kernel_version);
            header.previous_log_file_checksum = BASE_TX_CHECKSUM;
        }
        header
    }

    /// Sets the store identity.
    #[must_use]
    pub fn with_store_id(mut self, store_id: StoreIdentity) -> Self {
        self.store_id = store_id;
        self
    }

    /// Sets the last append index.
    #[must_use]
    pub fn with_last_append_index(mut self, index: u64) -> Self {
        self.last_append_index = index;
        self
    }

    /// Sets the segment block size.
    #[must_use]
    pub fn with_segment_block_size(mut self, size: u32) -> Self {
        self.segment_block_size = size;
        self
    }

    /// Sets the checksum the previous file ended with.
    #[must_use]
    pub fn with_previous_log_file_checksum(mut self, checksum: u32) -> Self {
        self.previous_log_file_checksum = checksum;
        self
    }

    /// Sets the kernel version that created the file.
    #[must_use]
    pub fn with_kernel_version(mut self, version: KernelVersion) -> Self {
        self.kernel_version = Some(version);
        self
    }

    /// Declared size of this header on disk.
    #[must_use]
    pub const fn header_size(&self) -> usize {
        self.format.header_size()
    }

    /// Whether entries after this header are envelope framed.
    #[must_use]
    pub fn uses_envelopes(&self) -> bool {
        self.format.has_segment_fields()
    }

    /// Serializes the header, padding included.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error if a field cannot be represented in
    /// this header's format.
    pub fn to_bytes(&self) -> LogResult<Vec<u8>> {
        self.validate()?;
        let size = self.header_size();
        let mut buf = Vec::with_capacity(size);

        buf.put_u64(encode_log_version_word(self.log_version, self.format));
        buf.put_u64(self.last_committed_tx_id);
        if self.format.has_append_index() {
            buf.put_u64(self.last_append_index);
        }
        match &self.store_id {
            StoreIdentity::None => {}
            StoreIdentity::Legacy(id) => id.encode(&mut buf),
            StoreIdentity::Modern(id) => id.encode(&mut buf)?,
        }
        if self.format.has_segment_fields() {
            buf.put_u32(self.segment_block_size);
            buf.put_u32(self.previous_log_file_checksum);
            buf.put_i8(self.kernel_version.map_or(0, KernelVersion::code));
        }

        // Reserved
        buf.put_bytes(0, size - buf.len());
        Ok(buf)
    }

    fn validate(&self) -> LogResult<()> {
        if self.log_version > LOG_VERSION_MASK {
            return Err(LogError::invalid_argument(format!(
                "log version {} does not fit in 56 bits",
                self.log_version
            )));
        }
        if !store_identity_fits(&self.store_id, self.format) {
            return Err(LogError::invalid_argument(format!(
                "store identity {:?} cannot be written in header format {}",
                self.store_id, self.format
            )));
        }
        if !self.format.has_append_index() && self.last_append_index != 0 {
            return Err(LogError::invalid_argument(format!(
                "header format {} has no append index",
                self.format
            )));
        }
        if self.format.has_segment_fields() {
            if self.kernel_version.is_none() {
                return Err(LogError::invalid_argument(
                    "header format V10 requires a kernel version",
                ));
            }
        } else if self.segment_block_size != 0
            || self.previous_log_file_checksum != 0
            || self.kernel_version.is_some()
        {
            return Err(LogError::invalid_argument(format!(
                "header format {} has no segment framing fields",
                self.format
            )));
        }
        Ok(())
    }
}

fn default_store_identity(format: HeaderFormat) -> StoreIdentity {
    match format {
        HeaderFormat::V6 => StoreIdentity::None,
        HeaderFormat::V7 => StoreIdentity::Legacy(LegacyStoreId::default()),
        _ => StoreIdentity::Modern(StoreId::unknown()),
    }
}

fn store_identity_fits(store_id: &StoreIdentity, format: HeaderFormat) -> bool {
    matches!(
        (store_id, format),
        (StoreIdentity::None, HeaderFormat::V6)
            | (StoreIdentity::Legacy(_), HeaderFormat::V7)
            | (
                StoreIdentity::Modern(_),
                HeaderFormat::V8 | HeaderFormat::V9 | HeaderFormat::V10
            )
    )
}

/// Packs a log version and header format into the leading header word.
#[must_use]
pub const fn encode_log_version_word(log_version: u64, format: HeaderFormat) -> u64 {
    (log_version & LOG_VERSION_MASK) | ((format.as_byte() as u64) << FORMAT_SHIFT)
}

/// Splits the leading header word into log version and format byte.
#[must_use]
pub const fn decode_log_version_word(word: u64) -> (u64, u8) {
    (word & LOG_VERSION_MASK, (word >> FORMAT_SHIFT) as u8)
}

/// Parses a header from the front of `buf`.
///
/// Returns `None` when the leading word is all zeroes: an empty or
/// pre-allocated file. On success the cursor sits exactly at the declared
/// header size, padding skipped.
///
/// # Errors
///
/// - [`LogError::UnrecognizedHeaderFormat`] for an unknown format byte
/// - [`LogError::IncompleteLogHeader`] if `buf` is shorter than the format requires
pub fn parse_header(buf: &mut impl Buf) -> LogResult<Option<LogHeader>> {
    parse_header_from(BUFFER_SOURCE, buf)
}

/// Like [`parse_header`], naming `source` in errors.
///
/// # Errors
///
/// See [`parse_header`].
pub fn parse_header_from(source: &str, buf: &mut impl Buf) -> LogResult<Option<LogHeader>> {
    let available = buf.remaining();
    if available < 8 {
        let rest = buf.copy_to_bytes(available);
        if rest.iter().all(|&b| b == 0) {
            return Ok(None);
        }
        return Err(LogError::IncompleteLogHeader {
            file: source.to_string(),
            bytes_read: available,
            required: 8,
        });
    }

    let word = buf.get_u64();
    if word == 0 {
        return Ok(None);
    }
    let (log_version, format_byte) = decode_log_version_word(word);
    let format = HeaderFormat::from_byte(format_byte).ok_or(LogError::UnrecognizedHeaderFormat {
        format_version: format_byte,
    })?;

    let size = format.header_size();
    if available < size {
        return Err(LogError::IncompleteLogHeader {
            file: source.to_string(),
            bytes_read: available,
            required: size,
        });
    }

    let mut consumed = 8;
    let last_committed_tx_id = buf.get_u64();
    consumed += 8;

    let mut header = LogHeader::new(format, log_version, last_committed_tx_id);
    if format.has_append_index() {
        header.last_append_index = buf.get_u64();
        consumed += 8;
    }
    header.store_id = match format {
        HeaderFormat::V6 => StoreIdentity::None,
        HeaderFormat::V7 => {
            consumed += crate::store_id::LEGACY_STORE_ID_SIZE;
            StoreIdentity::Legacy(LegacyStoreId::decode(buf)?)
        }
        _ => {
            consumed += crate::store_id::STORE_ID_SIZE;
            StoreIdentity::Modern(StoreId::decode(buf)?)
        }
    };
    if format.has_segment_fields() {
        header.segment_block_size = buf.get_u32();
        header.previous_log_file_checksum = buf.get_u32();
        let code = buf.get_i8();
        consumed += 9;
        let version = KernelVersion::from_code(code).map_err(|resolution| {
            LogError::unsupported_version(
                code,
                resolution,
                LogPosition::new(log_version, (consumed - 1) as u64),
            )
        })?;
        header.kernel_version = Some(version);
    }

    buf.advance(size - consumed);
    Ok(Some(header))
}

/// Writes `header` to `channel`.
///
/// # Errors
///
/// Returns an error if the header cannot be encoded or written.
pub fn write_log_header(channel: &mut dyn WritableChannel, header: &LogHeader) -> LogResult<()> {
    channel.put_bytes(&header.to_bytes()?)
}

/// Reads the header of the log file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the header is malformed.
pub fn read_log_header(path: &Path) -> LogResult<Option<LogHeader>> {
    let backend = FileBackend::open_read_only(path)?;
    let bytes = backend.read_up_to(0, MAX_HEADER_SIZE)?;
    parse_header_from(&path.display().to_string(), &mut &bytes[..])
}
