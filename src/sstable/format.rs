use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};

use bytes::BufMut;
use parking_lot::Mutex;

use crate::coding::{Decoder, decode_fixed32, decode_fixed64, put_varint64};
use crate::error::{Error, Result};

/// Identifies table files. Last 8 bytes of every table.
pub const TABLE_MAGIC: u64 = 0x7261_7665_6c5f_7462;

/// `[compression:1][crc32:4]` after every block.
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// The only compression type written or accepted.
pub const NO_COMPRESSION: u8 = 0;

/// Location of a block inside a table file. `size` excludes the trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    /// Two varint64s, at most 10 bytes each.
    pub const MAX_ENCODED_LENGTH: usize = 20;

    pub fn new(offset: u64, size: u64) -> Self {
        BlockHandle { offset, size }
    }

    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        put_varint64(dst, self.offset);
        put_varint64(dst, self.size);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::MAX_ENCODED_LENGTH);
        self.encode_to(&mut buf);
        buf
    }

    pub fn decode_from(d: &mut Decoder<'_>) -> Result<Self> {
        let offset = d.get_varint64()?;
        let size = d.get_varint64()?;
        Ok(BlockHandle { offset, size })
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Self::decode_from(&mut Decoder::new(data))
    }
}

/// The footer sits at the end of the table file.
/// It tells the reader where to find the metaindex and index blocks.
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │ Metaindex handle (varints)           │
/// │ Index handle (varints)               │
/// │ Zero padding up to 40 bytes          │
/// │ Magic number (8B)                    │
/// └──────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub metaindex_handle: BlockHandle,
    pub index_handle: BlockHandle,
}

impl Footer {
    pub const ENCODED_LENGTH: usize = 2 * BlockHandle::MAX_ENCODED_LENGTH + 8;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LENGTH);
        self.metaindex_handle.encode_to(&mut buf);
        self.index_handle.encode_to(&mut buf);
        buf.resize(2 * BlockHandle::MAX_ENCODED_LENGTH, 0);
        buf.put_u64_le(TABLE_MAGIC);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::ENCODED_LENGTH {
            return Err(Error::Corruption("footer too short".into()));
        }
        let magic = decode_fixed64(&data[Self::ENCODED_LENGTH - 8..]);
        if magic != TABLE_MAGIC {
            return Err(Error::Corruption(format!(
                "bad table magic: expected {:#x}, got {:#x}",
                TABLE_MAGIC, magic
            )));
        }
        let mut d = Decoder::new(&data[..Self::ENCODED_LENGTH - 8]);
        let metaindex_handle = BlockHandle::decode_from(&mut d)?;
        let index_handle = BlockHandle::decode_from(&mut d)?;
        Ok(Footer {
            metaindex_handle,
            index_handle,
        })
    }
}

/// CRC of block contents plus the compression byte that follows them.
pub fn block_crc(contents: &[u8], compression: u8) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(contents);
    hasher.update(&[compression]);
    hasher.finalize()
}

/// Read `len` bytes at `offset`. Running off the end of the file is
/// corruption: handles always point inside the table.
pub fn read_at(file: &Mutex<File>, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut file = file.lock();
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => Error::Corruption(format!(
            "truncated read of {} bytes at offset {}",
            len, offset
        )),
        _ => Error::from(e),
    })?;
    Ok(buf)
}

/// Read the block identified by `handle`, checking its trailer. The CRC is
/// only verified when asked; the compression byte always is. A handle whose
/// block and trailer do not fit inside `file_size` is corruption.
pub fn read_block(
    file: &Mutex<File>,
    file_size: u64,
    handle: &BlockHandle,
    verify_checksums: bool,
) -> Result<Vec<u8>> {
    let end = handle
        .offset
        .checked_add(handle.size)
        .and_then(|end| end.checked_add(BLOCK_TRAILER_SIZE as u64));
    if end.is_none_or(|end| end > file_size) {
        return Err(Error::Corruption(format!(
            "block handle ({}, {}) runs past the end of a {} byte table",
            handle.offset, handle.size, file_size
        )));
    }
    let n = handle.size as usize;
    let mut buf = read_at(file, handle.offset, n + BLOCK_TRAILER_SIZE)?;

    let compression = buf[n];
    if verify_checksums {
        let expected = decode_fixed32(&buf[n + 1..]);
        let actual = block_crc(&buf[..n], compression);
        if expected != actual {
            return Err(Error::Corruption(format!(
                "block checksum mismatch at offset {}",
                handle.offset
            )));
        }
    }
    if compression != NO_COMPRESSION {
        return Err(Error::Corruption(format!(
            "unsupported block compression type {}",
            compression
        )));
    }

    buf.truncate(n);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_is_fixed_size() {
        let footer = Footer {
            metaindex_handle: BlockHandle::new(u64::MAX, u64::MAX),
            index_handle: BlockHandle::new(12, 34),
        };
        let encoded = footer.encode();
        assert_eq!(encoded.len(), Footer::ENCODED_LENGTH);
        assert_eq!(Footer::decode(&encoded).unwrap(), footer);
    }

    #[test]
    fn footer_bad_magic() {
        let mut encoded = Footer {
            metaindex_handle: BlockHandle::new(0, 0),
            index_handle: BlockHandle::new(0, 0),
        }
        .encode();
        encoded[Footer::ENCODED_LENGTH - 1] ^= 0xff;
        assert!(Footer::decode(&encoded).unwrap_err().is_corruption());
    }

    #[test]
    fn block_handle_past_end_of_file() {
        let mut tmp = tempfile::tempfile().unwrap();
        std::io::Write::write_all(&mut tmp, &[0u8; 64]).unwrap();
        let file = Mutex::new(tmp);

        let huge = BlockHandle::new(0, u64::MAX);
        assert!(read_block(&file, 64, &huge, false).unwrap_err().is_corruption());
        let overflow = BlockHandle::new(u64::MAX - 2, 1);
        assert!(read_block(&file, 64, &overflow, false).unwrap_err().is_corruption());
        let tail = BlockHandle::new(60, 0);
        assert!(read_block(&file, 64, &tail, false).unwrap_err().is_corruption());
        // Exactly fits: 59 content bytes plus the trailer.
        assert_eq!(read_block(&file, 64, &BlockHandle::new(0, 59), false).unwrap().len(), 59);
    }

    #[test]
    fn footer_too_short() {
        assert!(Footer::decode(&[0u8; 10]).is_err());
    }
}
