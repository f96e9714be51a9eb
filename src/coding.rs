//! Varint and fixed-width helpers shared by the block, handle, edit and
//! batch encodings. Fixed-width integers are little-endian everywhere.

use bytes::BufMut;

use crate::error::{Error, Result};

/// Longest possible varint64 encoding.
pub const MAX_VARINT64_LEN: usize = 10;

pub fn put_varint32(dst: &mut Vec<u8>, v: u32) {
    put_varint64(dst, v as u64);
}

pub fn put_varint64(dst: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        dst.put_u8((v as u8) | 0x80);
        v >>= 7;
    }
    dst.put_u8(v as u8);
}

/// Append a varint length followed by the bytes themselves.
pub fn put_length_prefixed(dst: &mut Vec<u8>, data: &[u8]) {
    put_varint32(dst, data.len() as u32);
    dst.put_slice(data);
}

pub fn varint_length(mut v: u64) -> usize {
    let mut len = 1;
    while v >= 0x80 {
        v >>= 7;
        len += 1;
    }
    len
}

/// Decode a varint64 from the front of `src`, returning (value, bytes consumed).
pub fn decode_varint64(src: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    for (i, &byte) in src.iter().enumerate().take(MAX_VARINT64_LEN) {
        result |= ((byte & 0x7f) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }
    Err(Error::Corruption("bad varint".into()))
}

pub fn decode_varint32(src: &[u8]) -> Result<(u32, usize)> {
    let (v, n) = decode_varint64(src)?;
    if v > u32::MAX as u64 {
        return Err(Error::Corruption("varint32 overflow".into()));
    }
    Ok((v as u32, n))
}

/// Cursor-style decoding over a byte slice. Every getter advances past what
/// it consumed and reports truncation as corruption.
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Decoder { data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> &'a [u8] {
        self.data
    }

    pub fn get_varint32(&mut self) -> Result<u32> {
        let (v, n) = decode_varint32(self.data)?;
        self.data = &self.data[n..];
        Ok(v)
    }

    pub fn get_varint64(&mut self) -> Result<u64> {
        let (v, n) = decode_varint64(self.data)?;
        self.data = &self.data[n..];
        Ok(v)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.get_bytes(1)?[0])
    }

    pub fn get_fixed32(&mut self) -> Result<u32> {
        let b = self.get_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_fixed64(&mut self) -> Result<u64> {
        let b = self.get_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() < n {
            return Err(Error::Corruption(format!(
                "truncated input: wanted {} bytes, have {}",
                n,
                self.data.len()
            )));
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    pub fn get_length_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.get_varint32()? as usize;
        self.get_bytes(len)
    }
}

pub fn decode_fixed32(src: &[u8]) -> u32 {
    u32::from_le_bytes([src[0], src[1], src[2], src[3]])
}

pub fn decode_fixed64(src: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&src[..8]);
    u64::from_le_bytes(buf)
}
