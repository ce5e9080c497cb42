//! Store identity records embedded in log headers and checkpoints.

use crate::error::{LogError, LogResult};
use bytes::{Buf, BufMut};

/// Bytes reserved for a [`StoreId`] wherever one is serialized.
pub const STORE_ID_SIZE: usize = 64;

/// Bytes occupied by a [`LegacyStoreId`].
pub const LEGACY_STORE_ID_SIZE: usize = 40;

/// Fixed bytes of a [`StoreId`] slot: two u64s, two length bytes and the
/// major/minor pair.
const STORE_ID_FIXED: usize = 8 + 8 + 1 + 1 + 1 + 1;

/// Identity of the store a log belongs to.
///
/// Serialized into a fixed 64-byte slot; unused bytes are zero padding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StoreId {
    /// Creation time of the store, milliseconds since the epoch.
    pub creation_time: u64,
    /// Random component chosen when the store was created.
    pub random_id: u64,
    /// Storage engine that owns the store.
    pub engine_name: String,
    /// Store format family.
    pub format_name: String,
    /// Store format major version.
    pub major_version: u8,
    /// Store format minor version.
    pub minor_version: u8,
}

impl StoreId {
    /// Creates a store id.
    #[must_use]
    pub fn new(
        creation_time: u64,
        random_id: u64,
        engine_name: impl Into<String>,
        format_name: impl Into<String>,
        major_version: u8,
        minor_version: u8,
    ) -> Self {
        Self {
            creation_time,
            random_id,
            engine_name: engine_name.into(),
            format_name: format_name.into(),
            major_version,
            minor_version,
        }
    }

    /// The id of a store that has not been identified; all zeroes on disk.
    #[must_use]
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Whether this is the all-zero id.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        *self == Self::unknown()
    }

    /// Writes the 64-byte slot.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error if the names do not fit the slot.
    pub fn encode(&self, buf: &mut impl BufMut) -> LogResult<()> {
        let names = self.engine_name.len() + self.format_name.len();
        if self.engine_name.len() > usize::from(u8::MAX)
            || self.format_name.len() > usize::from(u8::MAX)
            || STORE_ID_FIXED + names > STORE_ID_SIZE
        {
            return Err(LogError::invalid_argument(format!(
                "store id names '{}'/'{}' do not fit in {STORE_ID_SIZE} bytes",
                self.engine_name, self.format_name
            )));
        }

        buf.put_u64(self.creation_time);
        buf.put_u64(self.random_id);
        put_name(buf, &self.engine_name);
        put_name(buf, &self.format_name);
        buf.put_u8(self.major_version);
        buf.put_u8(self.minor_version);
        buf.put_bytes(0, STORE_ID_SIZE - STORE_ID_FIXED - names);
        Ok(())
    }

    /// Reads a 64-byte slot, skipping its padding.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if the slot is short or its names are
    /// malformed.
    pub fn decode(buf: &mut impl Buf) -> LogResult<Self> {
        if buf.remaining() < STORE_ID_SIZE {
            return Err(LogError::corrupted(format!(
                "store id needs {STORE_ID_SIZE} bytes, {} available",
                buf.remaining()
            )));
        }
        let mut slot = buf.copy_to_bytes(STORE_ID_SIZE);

        let creation_time = slot.get_u64();
        let random_id = slot.get_u64();
        let engine_name = get_name(&mut slot, "engine")?;
        let format_name = get_name(&mut slot, "format")?;
        if slot.remaining() < 2 {
            return Err(LogError::corrupted("store id names overrun the slot"));
        }
        let major_version = slot.get_u8();
        let minor_version = slot.get_u8();

        Ok(Self {
            creation_time,
            random_id,
            engine_name,
            format_name,
            major_version,
            minor_version,
        })
    }

    /// Serializes the slot into a fresh buffer.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error if the names do not fit.
    pub fn to_bytes(&self) -> LogResult<Vec<u8>> {
        let mut out = Vec::with_capacity(STORE_ID_SIZE);
        self.encode(&mut out)?;
        Ok(out)
    }
}

fn put_name(buf: &mut impl BufMut, name: &str) {
    // Length checked by the caller.
    buf.put_u8(name.len() as u8);
    buf.put_slice(name.as_bytes());
}

fn get_name(slot: &mut impl Buf, what: &str) -> LogResult<String> {
    if !slot.has_remaining() {
        return Err(LogError::corrupted(format!("store id {what} name missing")));
    }
    let len = usize::from(slot.get_u8());
    if slot.remaining() < len {
        return Err(LogError::corrupted(format!(
            "store id {what} name length {len} overruns the slot"
        )));
    }
    let raw = slot.copy_to_bytes(len);
    String::from_utf8(raw.to_vec())
        .map_err(|_| LogError::corrupted(format!("store id {what} name is not UTF-8")))
}

/// The older store identity: five 64-bit fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LegacyStoreId {
    /// Creation time of the store.
    pub creation_time: u64,
    /// Random component chosen when the store was created.
    pub random_id: u64,
    /// Encoded store version.
    pub store_version: u64,
    /// Time of the last upgrade.
    pub upgrade_time: u64,
    /// Transaction id of the last upgrade.
    pub upgrade_tx_id: u64,
}

impl LegacyStoreId {
    /// Writes the five fields.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.creation_time);
        buf.put_u64(self.random_id);
        buf.put_u64(self.store_version);
        buf.put_u64(self.upgrade_time);
        buf.put_u64(self.upgrade_tx_id);
    }

    /// Reads the five fields.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if fewer than 40 bytes remain.
    pub fn decode(buf: &mut impl Buf) -> LogResult<Self> {
        if buf.remaining() < LEGACY_STORE_ID_SIZE {
            return Err(LogError::corrupted(format!(
                "legacy store id needs {LEGACY_STORE_ID_SIZE} bytes, {} available",
                buf.remaining()
            )));
        }
        Ok(Self {
            creation_time: buf.get_u64(),
            random_id: buf.get_u64(),
            store_version: buf.get_u64(),
            upgrade_time: buf.get_u64(),
            upgrade_tx_id: buf.get_u64(),
        })
    }

    /// Serializes the fields into a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LEGACY_STORE_ID_SIZE);
        self.encode(&mut out);
        out
    }
}

/// A store identity in whichever form a record carries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreIdentity {
    /// No identity recorded.
    None,
    /// Five-field identity of older formats.
    Legacy(LegacyStoreId),
    /// Current identity.
    Modern(StoreId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoreId {
        StoreId::new(1_700_000_000_000, 0xABCD, "record", "aligned", 1, 3)
    }

    #[test]
    fn slot_is_fixed_size() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(bytes.len(), STORE_ID_SIZE);
        assert_eq!(StoreId::decode(&mut &bytes[..]).unwrap(), sample());
    }

    #[test]
    fn unknown_is_all_zero() {
        let bytes = StoreId::unknown().to_bytes().unwrap();
        assert!(bytes.iter().all(|&b| b == 0));
        assert!(StoreId::decode(&mut &bytes[..]).unwrap().is_unknown());
    }

    #[test]
    fn padding_noise_is_ignored() {
        let mut bytes = sample().to_bytes().unwrap();
        let used = STORE_ID_FIXED + "record".len() + "aligned".len();
        for byte in &mut bytes[used..] {
            *byte = 0x5A;
        }
        let mut cursor = &bytes[..];
        assert_eq!(StoreId::decode(&mut cursor).unwrap(), sample());
        assert!(cursor.is_empty());
    }

    #[test]
    fn oversized_names_are_rejected() {
        let id = StoreId::new(0, 0, "e".repeat(30), "f".repeat(15), 0, 0);
        assert!(matches!(
            id.to_bytes(),
            Err(LogError::InvalidArgument { .. })
        ));
        let fits = StoreId::new(0, 0, "e".repeat(30), "f".repeat(14), 0, 0);
        assert_eq!(fits.to_bytes().unwrap().len(), STORE_ID_SIZE);
    }

    #[test]
    fn overrunning_name_length_is_corruption() {
        let mut bytes = vec![0u8; STORE_ID_SIZE];
        bytes[16] = 200;
        assert!(matches!(
            StoreId::decode(&mut &bytes[..]),
            Err(LogError::Corrupted { .. })
        ));
    }

    #[test]
    fn short_buffer_is_corruption() {
        let bytes = [0u8; 10];
        assert!(StoreId::decode(&mut &bytes[..]).is_err());
        assert!(LegacyStoreId::decode(&mut &bytes[..]).is_err());
    }

    #[test]
    fn legacy_id_layout() {
        let id = LegacyStoreId {
            creation_time: 1,
            random_id: 2,
            store_version: 3,
            upgrade_time: 4,
            upgrade_tx_id: 5,
        };
        let bytes = id.to_bytes();
        assert_eq!(bytes.len(), LEGACY_STORE_ID_SIZE);
        assert_eq!(&bytes[..8], &1u64.to_be_bytes());
        assert_eq!(&bytes[32..], &5u64.to_be_bytes());
        assert_eq!(LegacyStoreId::decode(&mut &bytes[..]).unwrap(), id);
    }
}
