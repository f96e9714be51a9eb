use std::fmt;

use crate::coding::decode_fixed64;
use crate::error::{Error, Result};

/// Monotonically increasing counter assigned to each write operation.
/// Only the low 56 bits are usable: the tag packs it with the value type.
pub type SequenceNumber = u64;

pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

/// Length of the (sequence, type) trailer of every internal key.
pub const TAG_SIZE: usize = 8;

/// Distinguishes puts from deletes in the storage engine.
/// A delete writes a tombstone: the key isn't removed, it's marked as deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    /// A delete (tombstone marker).
    Deletion = 0x00,
    /// A normal put operation.
    Value = 0x01,
}

/// Seeks build keys with the highest type so that, for equal (user key,
/// sequence), they sort before every real entry.
pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::Value;

impl ValueType {
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(ValueType::Deletion),
            0x01 => Ok(ValueType::Value),
            _ => Err(Error::Corruption(format!("invalid value type: {}", byte))),
        }
    }
}

pub fn pack_tag(sequence: SequenceNumber, value_type: ValueType) -> u64 {
    debug_assert!(sequence <= MAX_SEQUENCE_NUMBER);
    (sequence << 8) | value_type as u64
}

/// Tag of an encoded internal key. Malformed (too short) keys read as 0.
pub fn unpack_tag(internal_key: &[u8]) -> u64 {
    if internal_key.len() < TAG_SIZE {
        return 0;
    }
    decode_fixed64(&internal_key[internal_key.len() - TAG_SIZE..])
}

pub fn extract_user_key(internal_key: &[u8]) -> &[u8] {
    &internal_key[..internal_key.len().saturating_sub(TAG_SIZE)]
}

/// Append the internal-key encoding of (user_key, sequence, type) to `dst`.
pub fn append_internal_key(
    dst: &mut Vec<u8>,
    user_key: &[u8],
    sequence: SequenceNumber,
    value_type: ValueType,
) {
    dst.extend_from_slice(user_key);
    dst.extend_from_slice(&pack_tag(sequence, value_type).to_le_bytes());
}

/// Borrowed, decoded view of an internal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: SequenceNumber,
    pub value_type: ValueType,
}

impl<'a> ParsedInternalKey<'a> {
    pub fn parse(internal_key: &'a [u8]) -> Result<Self> {
        if internal_key.len() < TAG_SIZE {
            return Err(Error::Corruption("internal key too short".into()));
        }
        let tag = unpack_tag(internal_key);
        Ok(ParsedInternalKey {
            user_key: extract_user_key(internal_key),
            sequence: tag >> 8,
            value_type: ValueType::from_u8((tag & 0xff) as u8)?,
        })
    }
}

/// Internal key format: user key + sequence number + value type.
///
/// Ordering (under `InternalKeyComparator`): (user_key ASC, sequence DESC,
/// type DESC). This ensures the newest version of a key always comes first
/// during merging.
///
/// Stored in its encoded form so it can be handed to tables and the
/// manifest without re-encoding.
#[derive(Clone, PartialEq, Eq, Default, Hash)]
pub struct InternalKey {
    rep: Vec<u8>,
}

impl InternalKey {
    pub fn new(user_key: &[u8], sequence: SequenceNumber, value_type: ValueType) -> Self {
        let mut rep = Vec::with_capacity(user_key.len() + TAG_SIZE);
        append_internal_key(&mut rep, user_key, sequence, value_type);
        InternalKey { rep }
    }

    /// Wrap already-encoded bytes (from a table, a memtable or the manifest).
    pub fn decode_from(encoded: &[u8]) -> Self {
        InternalKey {
            rep: encoded.to_vec(),
        }
    }

    pub fn encode(&self) -> &[u8] {
        &self.rep
    }

    pub fn user_key(&self) -> &[u8] {
        extract_user_key(&self.rep)
    }

    pub fn sequence(&self) -> SequenceNumber {
        unpack_tag(&self.rep) >> 8
    }

    pub fn is_empty(&self) -> bool {
        self.rep.is_empty()
    }

    pub fn parse(&self) -> Result<ParsedInternalKey<'_>> {
        ParsedInternalKey::parse(&self.rep)
    }
}

impl fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parse() {
            Ok(p) => write!(
                f,
                "'{}' @ {} : {:?}",
                String::from_utf8_lossy(p.user_key),
                p.sequence,
                p.value_type
            ),
            Err(_) => write!(f, "(bad){:?}", self.rep),
        }
    }
}

/// The key a point lookup seeks with: `(user_key, snapshot, VALUE_TYPE_FOR_SEEK)`.
/// The first entry at or after it with the same user key is the newest
/// version visible at `snapshot`.
pub struct LookupKey {
    rep: Vec<u8>,
}

impl LookupKey {
    pub fn new(user_key: &[u8], snapshot: SequenceNumber) -> Self {
        let mut rep = Vec::with_capacity(user_key.len() + TAG_SIZE);
        append_internal_key(&mut rep, user_key, snapshot, VALUE_TYPE_FOR_SEEK);
        LookupKey { rep }
    }

    pub fn internal_key(&self) -> &[u8] {
        &self.rep
    }

    pub fn user_key(&self) -> &[u8] {
        extract_user_key(&self.rep)
    }
}

/// Outcome of a lookup that hit an entry for the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Value(Vec<u8>),
    /// The newest visible entry is a tombstone.
    Deleted,
}
