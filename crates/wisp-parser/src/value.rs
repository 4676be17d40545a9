//! The runtime value cell.
//!
//! A `WispValue` is a fixed 8-byte slot that holds any of the four scalar
//! WebAssembly types. Integers and floats of the same width alias the same
//! bits; reading through an accessor reinterprets the stored bits and never
//! performs an arithmetic conversion.

use crate::types::WispValueType;

/// A 64-bit storage cell for `i32`, `i64`, `f32` and `f64` values.
///
/// 32-bit values occupy the low 4 bytes and are zero-extended into the cell,
/// so storing `-2i32` and reading [`WispValue::as_u64`] yields `0xFFFF_FFFE`,
/// while [`WispValue::as_i32`] yields `-2` again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct WispValue(u64);

impl WispValue {
    /// The all-zero value, which is the default for every value type.
    pub const ZERO: WispValue = WispValue(0);

    /// Build a value from its raw 64-bit pattern.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        WispValue(bits)
    }

    /// The raw 64-bit pattern of this cell.
    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// The 8-byte little-endian slot layout.
    #[inline]
    pub const fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub const fn from_le_bytes(bytes: [u8; 8]) -> Self {
        WispValue(u64::from_le_bytes(bytes))
    }

    /// The default (zero) value of a given type.
    #[inline]
    pub const fn default_for_type(_value_type: WispValueType) -> Self {
        // Zero bits are +0.0 for both float widths.
        WispValue::ZERO
    }

    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0 as u32 as i32
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub const fn as_i64(self) -> i64 {
        self.0 as i64
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_f32(self) -> f32 {
        f32::from_bits(self.0 as u32)
    }

    #[inline]
    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl From<i32> for WispValue {
    #[inline]
    fn from(v: i32) -> Self {
        WispValue(v as u32 as u64)
    }
}

impl From<u32> for WispValue {
    #[inline]
    fn from(v: u32) -> Self {
        WispValue(v as u64)
    }
}

impl From<i64> for WispValue {
    #[inline]
    fn from(v: i64) -> Self {
        WispValue(v as u64)
    }
}

impl From<u64> for WispValue {
    #[inline]
    fn from(v: u64) -> Self {
        WispValue(v)
    }
}

impl From<f32> for WispValue {
    #[inline]
    fn from(v: f32) -> Self {
        WispValue(v.to_bits() as u64)
    }
}

impl From<f64> for WispValue {
    #[inline]
    fn from(v: f64) -> Self {
        WispValue(v.to_bits())
    }
}

impl From<bool> for WispValue {
    #[inline]
    fn from(v: bool) -> Self {
        WispValue(v as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zero() {
        assert_eq!(WispValue::default().as_u64(), 0);
        assert_eq!(WispValue::default_for_type(WispValueType::F64).as_f64(), 0.0);
        assert!(WispValue::default_for_type(WispValueType::F32).as_f32().is_sign_positive());
    }

    #[test]
    fn test_signed_32bit_is_zero_extended() {
        let v = WispValue::from(-3i32);
        assert_eq!(v.as_u64(), 0xffff_fffd);
        assert_eq!(v.as_i64(), 0xffff_fffd);
        assert_eq!(v.as_u32(), 0xffff_fffd);
        assert_eq!(v.as_i32(), -3);

        let v = WispValue::from(-2i32);
        assert_eq!(v.as_u64(), 0xffff_fffe);
        assert_eq!(v.as_i32(), -2);
    }

    #[test]
    fn test_64bit_reinterpretation() {
        let v = WispValue::from(0xffff_ffff_ffff_fffeu64);
        assert_eq!(v.as_u64(), 0xffff_ffff_ffff_fffe);
        assert_eq!(v.as_i64(), -2);

        let v = WispValue::from(-3i64);
        assert_eq!(v.as_u64(), 0xffff_ffff_ffff_fffd);
    }

    #[test]
    fn test_unsigned_32bit() {
        let v = WispValue::from(0xdede_defeu32);
        assert_eq!(v.as_u64(), 0xdede_defe);
        assert_eq!(v.as_u32(), 0xdede_defe);
    }

    #[test]
    fn test_float_special_values_round_trip() {
        let floats = [
            f32::INFINITY,
            f32::NEG_INFINITY,
            f32::MIN_POSITIVE,
            f32::MAX,
            f32::MIN,
            f32::from_bits(1), // smallest denormal
            123.456f32,
            -0.0f32,
        ];
        for f in floats {
            assert_eq!(WispValue::from(f).as_f32().to_bits(), f.to_bits());
        }

        let doubles = [
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::MIN_POSITIVE,
            f64::MAX,
            f64::MIN,
            f64::from_bits(1),
            123.456789001f64,
            -0.0f64,
        ];
        for d in doubles {
            assert_eq!(WispValue::from(d).as_f64().to_bits(), d.to_bits());
        }
    }

    #[test]
    fn test_nan_payload_preserved() {
        let nan32 = f32::from_bits(0x7fa0_0001);
        assert_eq!(WispValue::from(nan32).as_f32().to_bits(), 0x7fa0_0001);
        assert_eq!(WispValue::from(nan32).as_u64(), 0x7fa0_0001);

        let nan64 = f64::from_bits(0xfff4_0000_0000_0abc);
        assert_eq!(WispValue::from(nan64).as_f64().to_bits(), 0xfff4_0000_0000_0abc);
    }

    #[test]
    fn test_slot_layout() {
        assert_eq!(core::mem::size_of::<WispValue>(), 8);
        let v = WispValue::from(0x0102_0304u32);
        assert_eq!(v.to_le_bytes(), [4, 3, 2, 1, 0, 0, 0, 0]);
        assert_eq!(WispValue::from_le_bytes(v.to_le_bytes()), v);
    }
}
