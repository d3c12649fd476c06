// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Little-endian primitives shared by all tile sections:
//! LEB128 varints, zig-zag signed values and length-prefixed strings.

use super::TileError;

/// Cursor over a borrowed byte slice with checked, little-endian reads.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TileError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(TileError::UnexpectedEof)?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, TileError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, TileError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, TileError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, TileError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads an unsigned LEB128 varint, at most 10 bytes.
    pub fn read_varint(&mut self) -> Result<u64, TileError> {
        let mut value: u64 = 0;
        let mut shift: u32 = 0;

        loop {
            let byte = self.read_u8()?;
            if shift >= 64 {
                return Err(TileError::VarintOverflow);
            }
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Reads a zig-zag encoded signed varint.
    pub fn read_signed_varint(&mut self) -> Result<i64, TileError> {
        self.read_varint().map(zigzag_decode)
    }

    /// Reads a varint-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, TileError> {
        let len = self.read_varint()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| TileError::InvalidString)
    }
}

pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Writes an unsigned LEB128 varint.
pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Writes a zig-zag encoded signed varint.
pub fn write_signed_varint(out: &mut Vec<u8>, value: i64) {
    write_varint(out, zigzag_encode(value));
}

/// Writes a varint-length-prefixed UTF-8 string.
pub fn write_string(out: &mut Vec<u8>, value: &str) {
    write_varint(out, value.len() as u64);
    out.extend_from_slice(value.as_bytes());
}

fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trip() {
        let mut buf = Vec::new();
        for value in [0u64, 1, 127, 128, 300, 16_383, 16_384, u64::MAX] {
            buf.clear();
            write_varint(&mut buf, value);
            let mut r = Reader::new(&buf);
            assert_eq!(r.read_varint().unwrap(), value);
            assert!(r.is_empty());
        }
    }

    #[test]
    fn signed_varint_round_trip() {
        let mut buf = Vec::new();
        for value in [0i64, 1, -1, 63, -64, 1_000_000, -1_000_000, i64::MIN, i64::MAX] {
            buf.clear();
            write_signed_varint(&mut buf, value);
            let mut r = Reader::new(&buf);
            assert_eq!(r.read_signed_varint().unwrap(), value);
        }
    }

    #[test]
    fn small_values_stay_small() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 127);
        assert_eq!(buf.len(), 1);
        buf.clear();
        write_varint(&mut buf, 128);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn string_round_trip() {
        let mut buf = Vec::new();
        write_string(&mut buf, "ulica Marszałkowska");
        let mut r = Reader::new(&buf);
        assert_eq!(r.read_string().unwrap(), "ulica Marszałkowska");
    }

    #[test]
    fn truncated_input_errors() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 0xDEAD_BEEF);
        let mut r = Reader::new(&buf[..3]);
        assert!(matches!(r.read_u32(), Err(TileError::UnexpectedEof)));
    }

    #[test]
    fn unterminated_varint_errors() {
        let buf = [0x80u8; 11];
        let mut r = Reader::new(&buf);
        assert!(matches!(r.read_varint(), Err(TileError::VarintOverflow)));
    }
}
