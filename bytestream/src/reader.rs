//! Bounded little-endian byte reader.

use crate::error::{StreamError, StreamResult};

/// A byte reader for decoding untrusted message data.
///
/// All read operations are bounds-checked and return errors on failure.
/// The reader never panics on malformed input.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a new `ByteReader` from a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the number of bytes remaining to read.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Returns `true` if there are no more bytes to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns the current byte offset.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Returns the unread tail without consuming it.
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    pub fn read_u8(&mut self) -> StreamResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a boolean byte; any value other than 0 or 1 is rejected.
    pub fn read_bool(&mut self) -> StreamResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StreamError::ValueOutOfRange {
                field: "bool",
                value: u64::from(other),
            }),
        }
    }

    pub fn read_u16(&mut self) -> StreamResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> StreamResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> StreamResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> StreamResult<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Reads a varint `u32`.
    pub fn read_varu32(&mut self) -> StreamResult<u32> {
        let mut result = 0u32;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8()?;
            let bits = u32::from(byte & 0x7F);
            if shift == 28 && bits > 0x0F {
                return Err(StreamError::InvalidVarint);
            }
            result |= bits << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(StreamError::InvalidVarint)
    }

    /// Reads a zigzag varint `i32`.
    pub fn read_vars32(&mut self) -> StreamResult<i32> {
        let value = self.read_varu32()?;
        Ok(((value >> 1) as i32) ^ (-((value & 1) as i32)))
    }

    /// Reads exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> StreamResult<&'a [u8]> {
        self.ensure(len)?;
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..self.pos])
    }

    /// Reads a varint length prefix (at most `max`) and then that many bytes.
    pub fn read_len_prefixed(&mut self, max: usize) -> StreamResult<&'a [u8]> {
        let length = self.read_varu32()? as usize;
        if length > max {
            return Err(StreamError::LengthOutOfBounds { length, max });
        }
        self.read_bytes(length)
    }

    /// Reads a length-prefixed UTF-8 string of at most `max` bytes.
    pub fn read_str(&mut self, max: usize) -> StreamResult<&'a str> {
        let bytes = self.read_len_prefixed(max)?;
        std::str::from_utf8(bytes).map_err(|_| StreamError::InvalidUtf8)
    }

    /// Skips a length-prefixed field without inspecting it.
    pub fn skip_len_prefixed(&mut self) -> StreamResult<()> {
        let length = self.read_varu32()? as usize;
        self.read_bytes(length).map(|_| ())
    }

    /// Fails if any bytes are left unread.
    pub fn finish(&self) -> StreamResult<()> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(StreamError::TrailingBytes { remaining }),
        }
    }

    fn ensure(&self, len: usize) -> StreamResult<()> {
        let available = self.remaining();
        if len > available {
            return Err(StreamError::UnexpectedEof {
                requested: len,
                available,
            });
        }
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> StreamResult<[u8; N]> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reader() {
        let reader = ByteReader::new(&[]);
        assert!(reader.is_empty());
        assert_eq!(reader.remaining(), 0);
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn read_from_empty_fails() {
        let mut reader = ByteReader::new(&[]);
        let result = reader.read_u8();
        assert!(matches!(result, Err(StreamError::UnexpectedEof { .. })));
    }

    #[test]
    fn read_u32_little_endian() {
        let mut reader = ByteReader::new(&[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(reader.read_u32().unwrap(), 0x1234_5678);
        assert!(reader.is_empty());
    }

    #[test]
    fn short_read_reports_available() {
        let mut reader = ByteReader::new(&[1, 2]);
        let err = reader.read_u32().unwrap_err();
        assert_eq!(
            err,
            StreamError::UnexpectedEof {
                requested: 4,
                available: 2
            }
        );
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn read_varu32() {
        let mut reader = ByteReader::new(&[0xAC, 0x02]);
        assert_eq!(reader.read_varu32().unwrap(), 300);
    }

    #[test]
    fn read_vars32() {
        let mut reader = ByteReader::new(&[0x01]);
        assert_eq!(reader.read_vars32().unwrap(), -1);
    }

    #[test]
    fn read_varu32_invalid() {
        let mut reader = ByteReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        assert_eq!(reader.read_varu32().unwrap_err(), StreamError::InvalidVarint);
    }

    #[test]
    fn read_varu32_overflowing_fifth_byte() {
        let mut reader = ByteReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
        assert_eq!(reader.read_varu32().unwrap_err(), StreamError::InvalidVarint);
    }

    #[test]
    fn len_prefixed_bound() {
        let mut reader = ByteReader::new(&[5, 1, 2, 3, 4, 5]);
        let err = reader.read_len_prefixed(4).unwrap_err();
        assert!(matches!(err, StreamError::LengthOutOfBounds { length: 5, max: 4 }));
    }

    #[test]
    fn skip_len_prefixed_then_read() {
        let mut reader = ByteReader::new(&[2, 0xAA, 0xBB, 7]);
        reader.skip_len_prefixed().unwrap();
        assert_eq!(reader.read_u8().unwrap(), 7);
    }

    #[test]
    fn finish_reports_trailing_bytes() {
        let mut reader = ByteReader::new(&[1, 2, 3]);
        reader.read_u8().unwrap();
        assert_eq!(
            reader.finish().unwrap_err(),
            StreamError::TrailingBytes { remaining: 2 }
        );
    }

    #[test]
    fn invalid_bool_rejected() {
        let mut reader = ByteReader::new(&[2]);
        assert!(matches!(
            reader.read_bool(),
            Err(StreamError::ValueOutOfRange { field: "bool", .. })
        ));
    }

    #[test]
    fn invalid_utf8_rejected() {
        let mut reader = ByteReader::new(&[2, 0xC3, 0x28]);
        assert_eq!(reader.read_str(16).unwrap_err(), StreamError::InvalidUtf8);
    }
}
