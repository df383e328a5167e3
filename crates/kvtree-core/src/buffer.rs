//! Byte buffers with explicit length and sequential cursors.
//!
//! All reads are bounds-checked against the supplied slice; a short read is
//! a decode error reporting the offset where it happened.
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn eof(&self, wanted: usize) -> Error {
        Error::decode(
            self.pos,
            format!("need {wanted} bytes, {} left", self.remaining()),
        )
    }

    pub fn peek_u8(&self) -> Result<u8> {
        self.data.get(self.pos).copied().ok_or_else(|| self.eof(1))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.eof(len));
        }
        let s = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(s)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_slice(N)?);
        Ok(out)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_usize(&mut self) -> Result<usize> {
        Ok(usize::from_le_bytes(self.read_array()?))
    }

    /// 7-bit variable-length integer, low groups first.
    pub fn read_7bit_len(&mut self) -> Result<usize> {
        let start = self.pos;
        let mut result: usize = 0;
        let mut shift = 0u32;
        loop {
            let b = self.read_u8()? as usize;
            result |= (b & 0x7F) << shift;
            if (b & 0x80) == 0 {
                break;
            }
            shift += 7;
            if shift > 28 {
                return Err(Error::decode(start, "7bit length too large"));
            }
        }
        Ok(result)
    }

    pub fn read_lp_string(&mut self) -> Result<&'a str> {
        let start = self.pos;
        let len = self.read_7bit_len()?;
        let s = self.read_slice(len)?;
        std::str::from_utf8(s).map_err(|_| Error::decode(start, "invalid utf8 in string"))
    }

    /// Bytes up to the next NUL; the NUL is consumed.
    pub fn read_cstr(&mut self) -> Result<&'a str> {
        let start = self.pos;
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::decode(start, "unterminated string"))?;
        self.pos += len + 1;
        std::str::from_utf8(&rest[..len])
            .map_err(|_| Error::decode(start, "invalid utf8 in string"))
    }

    /// UTF-16LE code units up to a zero unit; the terminator is consumed.
    pub fn read_wstr(&mut self) -> Result<String> {
        let start = self.pos;
        let mut units = Vec::new();
        loop {
            let u = self.read_u16()?;
            if u == 0 {
                break;
            }
            units.push(u);
        }
        String::from_utf16(&units).map_err(|_| Error::decode(start, "invalid utf16 in wide string"))
    }
}

#[derive(Debug, Default)]
pub struct ByteWriter {
    out: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self {
            out: Vec::with_capacity(1024),
        }
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.out
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.out
    }

    pub fn push(&mut self, b: u8) {
        self.out.push(b);
    }

    pub fn write_bytes(&mut self, b: &[u8]) {
        self.out.extend_from_slice(b);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.out.push(v as u8);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.out.extend_from_slice(&v.to_bits().to_le_bytes());
    }

    pub fn write_usize(&mut self, v: usize) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_7(&mut self, mut v: usize) {
        while v >= 0x80 {
            self.push(((v as u8) & 0x7F) | 0x80);
            v >>= 7;
        }
        self.push(v as u8);
    }

    pub fn write_lp_str(&mut self, s: &str) {
        self.write_7(s.len());
        self.out.extend_from_slice(s.as_bytes());
    }

    /// Writes `s` followed by NUL. Interior NULs would truncate on read and
    /// are cut here instead.
    pub fn write_cstr(&mut self, s: &str) {
        let bytes = s.as_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.out.extend_from_slice(&bytes[..end]);
        self.out.push(0);
    }

    pub fn write_wstr(&mut self, s: &str) {
        for u in s.encode_utf16().take_while(|&u| u != 0) {
            self.write_u16(u);
        }
        self.write_u16(0);
    }
}
