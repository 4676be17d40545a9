//! Byte reader over a binary module with LEB128 decoding.

use crate::error::{Result, WispParseError};
use crate::types::WispValueType;

/// A cursor over a borrowed byte slice.
///
/// Offsets reported in errors are relative to the start of the slice the
/// reader was created from, plus the `base` it was given.
#[derive(Debug, Clone)]
pub struct WispReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> WispReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::with_base(bytes, 0)
    }

    /// A reader whose error offsets start at `base`.
    pub fn with_base(bytes: &'a [u8], base: usize) -> Self {
        Self { bytes, pos: 0, base }
    }

    /// Absolute offset of the next byte.
    #[inline]
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn eof(&self) -> WispParseError {
        WispParseError::UnexpectedEof { offset: self.offset() }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self.bytes.get(self.pos).ok_or_else(|| self.eof())?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.eof());
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Unsigned LEB128, at most 5 bytes, unused bits of the last byte zero.
    pub fn read_u32(&mut self) -> Result<u32> {
        let start = self.offset();
        let mut result: u32 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift == 28 && byte & 0xf0 != 0 {
                return Err(WispParseError::IntegerOverflow { offset: start });
            }
            result |= ((byte & 0x7f) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_signed(32).map(|v| v as i32)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_signed(64)
    }

    /// Signed LEB128 of at most `bits` bits.
    ///
    /// The unused bits of a maximal-length final byte must repeat the sign bit.
    fn read_signed(&mut self, bits: u32) -> Result<i64> {
        let start = self.offset();
        let mut result: i64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            result |= ((byte & 0x7f) as i64) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < bits {
                    if byte & 0x40 != 0 {
                        result |= -1i64 << shift;
                    }
                } else {
                    let used = bits - (shift - 7);
                    let mask = (0x7fu8 << (used - 1)) & 0x7f;
                    let sign_bits = byte & mask;
                    if sign_bits != 0 && sign_bits != mask {
                        return Err(WispParseError::IntegerOverflow { offset: start });
                    }
                }
                return Ok(result);
            }
            if shift >= bits {
                return Err(WispParseError::IntegerOverflow { offset: start });
            }
        }
    }

    /// Raw little-endian bits of an `f32`.
    pub fn read_f32_bits(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Raw little-endian bits of an `f64`.
    pub fn read_f64_bits(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_value_type(&mut self) -> Result<WispValueType> {
        let byte = self.read_u8()?;
        WispValueType::from_byte(byte).ok_or(WispParseError::InvalidValueType(byte))
    }

    /// A length-prefixed UTF-8 name.
    pub fn read_name(&mut self) -> Result<String> {
        let offset = self.offset();
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        core::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| WispParseError::InvalidUtf8 { offset })
    }

    /// Read a vector length and check it can plausibly fit in the input,
    /// given each element takes at least `min_elem_size` bytes.
    pub fn read_vec_len(&mut self, min_elem_size: usize) -> Result<u32> {
        let offset = self.offset();
        let len = self.read_u32()?;
        if (len as usize).saturating_mul(min_elem_size) > self.remaining() {
            return Err(WispParseError::UnexpectedEof { offset });
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u32() {
        assert_eq!(WispReader::new(&[0x03]).read_u32().unwrap(), 3);
        assert_eq!(WispReader::new(&[0x83, 0x00]).read_u32().unwrap(), 3);
        assert_eq!(WispReader::new(&[0xe5, 0x8e, 0x26]).read_u32().unwrap(), 624485);
        assert_eq!(
            WispReader::new(&[0xff, 0xff, 0xff, 0xff, 0x0f]).read_u32().unwrap(),
            u32::MAX
        );
    }

    #[test]
    fn test_read_u32_overflow() {
        // Unused bits set in the fifth byte.
        assert!(matches!(
            WispReader::new(&[0xff, 0xff, 0xff, 0xff, 0x1f]).read_u32(),
            Err(WispParseError::IntegerOverflow { offset: 0 })
        ));
        // Too many bytes.
        assert!(WispReader::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00]).read_u32().is_err());
        // Truncated.
        assert!(matches!(
            WispReader::new(&[0x80]).read_u32(),
            Err(WispParseError::UnexpectedEof { offset: 1 })
        ));
    }

    #[test]
    fn test_read_i32() {
        assert_eq!(WispReader::new(&[0x7f]).read_i32().unwrap(), -1);
        assert_eq!(WispReader::new(&[0x3f]).read_i32().unwrap(), 63);
        assert_eq!(WispReader::new(&[0x40]).read_i32().unwrap(), -64);
        assert_eq!(WispReader::new(&[0xc0, 0xbb, 0x78]).read_i32().unwrap(), -123456);
        assert_eq!(
            WispReader::new(&[0x80, 0x80, 0x80, 0x80, 0x78]).read_i32().unwrap(),
            i32::MIN
        );
        assert_eq!(
            WispReader::new(&[0xff, 0xff, 0xff, 0xff, 0x07]).read_i32().unwrap(),
            i32::MAX
        );
    }

    #[test]
    fn test_read_i32_bad_sign_bits() {
        assert!(WispReader::new(&[0xff, 0xff, 0xff, 0xff, 0x4f]).read_i32().is_err());
        assert!(WispReader::new(&[0x80, 0x80, 0x80, 0x80, 0x70]).read_i32().is_err());
    }

    #[test]
    fn test_read_i64() {
        assert_eq!(WispReader::new(&[0x7f]).read_i64().unwrap(), -1);
        let min = [0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x7f];
        assert_eq!(WispReader::new(&min).read_i64().unwrap(), i64::MIN);
        let max = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00];
        assert_eq!(WispReader::new(&max).read_i64().unwrap(), i64::MAX);
        let bad = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        assert!(WispReader::new(&bad).read_i64().is_err());
    }

    #[test]
    fn test_read_name() {
        let mut r = WispReader::new(&[0x03, b'a', b'd', b'd']);
        assert_eq!(r.read_name().unwrap(), "add");
        assert!(r.is_finished());

        assert!(matches!(
            WispReader::new(&[0x01, 0xff]).read_name(),
            Err(WispParseError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn test_offset_with_base() {
        let mut r = WispReader::with_base(&[0x01], 100);
        r.read_u8().unwrap();
        assert!(matches!(r.read_u8(), Err(WispParseError::UnexpectedEof { offset: 101 })));
    }
}
