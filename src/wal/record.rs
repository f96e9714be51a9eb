use crate::error::{Error, Result};
use crate::wal::HEADER_SIZE;

/// Fragment type stored in every physical record header.
///
/// A logical record that fits in the remainder of a block is written as one
/// `Full` fragment; otherwise it becomes `First`, zero or more `Middle`, and
/// a `Last` fragment, each in its own block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// Preallocated / zero-filled space.
    Zero = 0,
    Full = 1,
    First = 2,
    Middle = 3,
    Last = 4,
}

impl RecordType {
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(RecordType::Zero),
            1 => Ok(RecordType::Full),
            2 => Ok(RecordType::First),
            3 => Ok(RecordType::Middle),
            4 => Ok(RecordType::Last),
            _ => Err(Error::Corruption(format!("invalid record type: {}", byte))),
        }
    }
}

/// Physical fragment header.
///
/// On-disk format:
/// ```text
/// ┌──────────┬──────────┬──────────┬─────────────────┐
/// │ CRC (4B) │ Len (2B) │ Type (1B)│ Payload (Len B) │
/// └──────────┴──────────┴──────────┴─────────────────┘
/// ```
///
/// CRC covers the type byte and the payload, so a torn header and a torn
/// payload are both detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub crc: u32,
    pub length: u16,
    pub record_type: u8,
}

impl FragmentHeader {
    pub fn for_payload(record_type: RecordType, payload: &[u8]) -> Self {
        debug_assert!(payload.len() <= u16::MAX as usize);
        FragmentHeader {
            crc: fragment_crc(record_type as u8, payload),
            length: payload.len() as u16,
            record_type: record_type as u8,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.crc.to_le_bytes());
        buf[4..6].copy_from_slice(&self.length.to_le_bytes());
        buf[6] = self.record_type;
        buf
    }

    /// Decode a header from the first `HEADER_SIZE` bytes of `data`.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_SIZE {
            return None;
        }
        Some(FragmentHeader {
            crc: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            length: u16::from_le_bytes([data[4], data[5]]),
            record_type: data[6],
        })
    }

    pub fn matches(&self, payload: &[u8]) -> bool {
        self.crc == fragment_crc(self.record_type, payload)
    }
}

pub fn fragment_crc(record_type: u8, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[record_type]);
    hasher.update(payload);
    hasher.finalize()
}
