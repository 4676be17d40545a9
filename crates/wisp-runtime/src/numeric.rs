//! Numeric instruction semantics.
//!
//! Integer arithmetic wraps; division and remainder trap on zero divisors and
//! signed division traps on `MIN / -1`. Float operations follow IEEE-754 with
//! the WebAssembly rules for `min`, `max` and `nearest`.

use wisp_parser::{WispNumOp, WispValue};

use crate::error::WispTrap;

macro_rules! float_min_max {
    ($min:ident, $max:ident, $t:ty) => {
        fn $min(a: $t, b: $t) -> $t {
            if a.is_nan() || b.is_nan() {
                return <$t>::NAN;
            }
            if a == 0.0 && b == 0.0 {
                return if a.is_sign_negative() { a } else { b };
            }
            if a < b { a } else { b }
        }

        fn $max(a: $t, b: $t) -> $t {
            if a.is_nan() || b.is_nan() {
                return <$t>::NAN;
            }
            if a == 0.0 && b == 0.0 {
                return if a.is_sign_positive() { a } else { b };
            }
            if a > b { a } else { b }
        }
    };
}

float_min_max!(f32_min, f32_max, f32);
float_min_max!(f64_min, f64_max, f64);

// Range checks are done in f64, which holds every f32 exactly. The bounds are
// the first values that truncate outside the target range.

fn trunc_i32(x: f64) -> Result<i32, WispTrap> {
    if x.is_nan() {
        return Err(WispTrap::InvalidConversionToInteger);
    }
    if !(x > -2147483649.0 && x < 2147483648.0) {
        return Err(WispTrap::IntegerOverflow);
    }
    Ok(x as i32)
}

fn trunc_u32(x: f64) -> Result<u32, WispTrap> {
    if x.is_nan() {
        return Err(WispTrap::InvalidConversionToInteger);
    }
    if !(x > -1.0 && x < 4294967296.0) {
        return Err(WispTrap::IntegerOverflow);
    }
    Ok(x as u32)
}

fn trunc_i64(x: f64) -> Result<i64, WispTrap> {
    if x.is_nan() {
        return Err(WispTrap::InvalidConversionToInteger);
    }
    if !(x >= -9223372036854775808.0 && x < 9223372036854775808.0) {
        return Err(WispTrap::IntegerOverflow);
    }
    Ok(x as i64)
}

fn trunc_u64(x: f64) -> Result<u64, WispTrap> {
    if x.is_nan() {
        return Err(WispTrap::InvalidConversionToInteger);
    }
    if !(x > -1.0 && x < 18446744073709551616.0) {
        return Err(WispTrap::IntegerOverflow);
    }
    Ok(x as u64)
}

fn pop(stack: &mut Vec<WispValue>) -> WispValue {
    stack.pop().unwrap_or(WispValue::ZERO)
}

/// Evaluate `op` on the top of `stack`, consuming its operands.
///
/// For two-operand instructions `a` is the deeper operand and `b` the top.
/// A one-operand instruction sees its operand as `a`.
pub(crate) fn eval(op: WispNumOp, stack: &mut Vec<WispValue>) -> Result<WispValue, WispTrap> {
    use WispNumOp::*;
    let b = pop(stack);
    let a = if op.signature().0.len() == 2 { pop(stack) } else { b };
    Ok(match op {
        I32Eqz => (a.as_i32() == 0).into(),
        I64Eqz => (a.as_i64() == 0).into(),

        I32Clz => a.as_u32().leading_zeros().into(),
        I32Ctz => a.as_u32().trailing_zeros().into(),
        I32Popcnt => a.as_u32().count_ones().into(),
        I64Clz => u64::from(a.as_u64().leading_zeros()).into(),
        I64Ctz => u64::from(a.as_u64().trailing_zeros()).into(),
        I64Popcnt => u64::from(a.as_u64().count_ones()).into(),

        // abs, neg and copysign only touch the sign bit, NaN payloads included.
        F32Abs => (a.as_u32() & 0x7fff_ffff).into(),
        F32Neg => (a.as_u32() ^ 0x8000_0000).into(),
        F32Ceil => a.as_f32().ceil().into(),
        F32Floor => a.as_f32().floor().into(),
        F32Trunc => a.as_f32().trunc().into(),
        F32Nearest => a.as_f32().round_ties_even().into(),
        F32Sqrt => a.as_f32().sqrt().into(),
        F64Abs => (a.as_u64() & 0x7fff_ffff_ffff_ffff).into(),
        F64Neg => (a.as_u64() ^ 0x8000_0000_0000_0000).into(),
        F64Ceil => a.as_f64().ceil().into(),
        F64Floor => a.as_f64().floor().into(),
        F64Trunc => a.as_f64().trunc().into(),
        F64Nearest => a.as_f64().round_ties_even().into(),
        F64Sqrt => a.as_f64().sqrt().into(),

        I32WrapI64 => (a.as_u64() as u32).into(),
        I32TruncF32S => trunc_i32(f64::from(a.as_f32()))?.into(),
        I32TruncF32U => trunc_u32(f64::from(a.as_f32()))?.into(),
        I32TruncF64S => trunc_i32(a.as_f64())?.into(),
        I32TruncF64U => trunc_u32(a.as_f64())?.into(),
        I64ExtendI32S => i64::from(a.as_i32()).into(),
        I64ExtendI32U => u64::from(a.as_u32()).into(),
        I64TruncF32S => trunc_i64(f64::from(a.as_f32()))?.into(),
        I64TruncF32U => trunc_u64(f64::from(a.as_f32()))?.into(),
        I64TruncF64S => trunc_i64(a.as_f64())?.into(),
        I64TruncF64U => trunc_u64(a.as_f64())?.into(),
        F32ConvertI32S => (a.as_i32() as f32).into(),
        F32ConvertI32U => (a.as_u32() as f32).into(),
        F32ConvertI64S => (a.as_i64() as f32).into(),
        F32ConvertI64U => (a.as_u64() as f32).into(),
        F32DemoteF64 => (a.as_f64() as f32).into(),
        F64ConvertI32S => f64::from(a.as_i32()).into(),
        F64ConvertI32U => f64::from(a.as_u32()).into(),
        F64ConvertI64S => (a.as_i64() as f64).into(),
        F64ConvertI64U => (a.as_u64() as f64).into(),
        F64PromoteF32 => f64::from(a.as_f32()).into(),

        // Same-width reinterpretation keeps the cell's bits.
        I32ReinterpretF32 | I64ReinterpretF64 | F32ReinterpretI32 | F64ReinterpretI64 => a,

        I32Eq => (a.as_i32() == b.as_i32()).into(),
        I32Ne => (a.as_i32() != b.as_i32()).into(),
        I32LtS => (a.as_i32() < b.as_i32()).into(),
        I32LtU => (a.as_u32() < b.as_u32()).into(),
        I32GtS => (a.as_i32() > b.as_i32()).into(),
        I32GtU => (a.as_u32() > b.as_u32()).into(),
        I32LeS => (a.as_i32() <= b.as_i32()).into(),
        I32LeU => (a.as_u32() <= b.as_u32()).into(),
        I32GeS => (a.as_i32() >= b.as_i32()).into(),
        I32GeU => (a.as_u32() >= b.as_u32()).into(),

        I64Eq => (a.as_i64() == b.as_i64()).into(),
        I64Ne => (a.as_i64() != b.as_i64()).into(),
        I64LtS => (a.as_i64() < b.as_i64()).into(),
        I64LtU => (a.as_u64() < b.as_u64()).into(),
        I64GtS => (a.as_i64() > b.as_i64()).into(),
        I64GtU => (a.as_u64() > b.as_u64()).into(),
        I64LeS => (a.as_i64() <= b.as_i64()).into(),
        I64LeU => (a.as_u64() <= b.as_u64()).into(),
        I64GeS => (a.as_i64() >= b.as_i64()).into(),
        I64GeU => (a.as_u64() >= b.as_u64()).into(),

        F32Eq => (a.as_f32() == b.as_f32()).into(),
        F32Ne => (a.as_f32() != b.as_f32()).into(),
        F32Lt => (a.as_f32() < b.as_f32()).into(),
        F32Gt => (a.as_f32() > b.as_f32()).into(),
        F32Le => (a.as_f32() <= b.as_f32()).into(),
        F32Ge => (a.as_f32() >= b.as_f32()).into(),

        F64Eq => (a.as_f64() == b.as_f64()).into(),
        F64Ne => (a.as_f64() != b.as_f64()).into(),
        F64Lt => (a.as_f64() < b.as_f64()).into(),
        F64Gt => (a.as_f64() > b.as_f64()).into(),
        F64Le => (a.as_f64() <= b.as_f64()).into(),
        F64Ge => (a.as_f64() >= b.as_f64()).into(),

        I32Add => a.as_i32().wrapping_add(b.as_i32()).into(),
        I32Sub => a.as_i32().wrapping_sub(b.as_i32()).into(),
        I32Mul => a.as_i32().wrapping_mul(b.as_i32()).into(),
        I32DivS => {
            let (a, b) = (a.as_i32(), b.as_i32());
            if b == 0 {
                return Err(WispTrap::DivisionByZero);
            }
            a.checked_div(b).ok_or(WispTrap::IntegerOverflow)?.into()
        }
        I32DivU => a
            .as_u32()
            .checked_div(b.as_u32())
            .ok_or(WispTrap::DivisionByZero)?
            .into(),
        I32RemS => {
            let (a, b) = (a.as_i32(), b.as_i32());
            if b == 0 {
                return Err(WispTrap::DivisionByZero);
            }
            a.wrapping_rem(b).into()
        }
        I32RemU => a
            .as_u32()
            .checked_rem(b.as_u32())
            .ok_or(WispTrap::DivisionByZero)?
            .into(),
        I32And => (a.as_u32() & b.as_u32()).into(),
        I32Or => (a.as_u32() | b.as_u32()).into(),
        I32Xor => (a.as_u32() ^ b.as_u32()).into(),
        I32Shl => a.as_u32().wrapping_shl(b.as_u32()).into(),
        I32ShrS => a.as_i32().wrapping_shr(b.as_u32()).into(),
        I32ShrU => a.as_u32().wrapping_shr(b.as_u32()).into(),
        I32Rotl => a.as_u32().rotate_left(b.as_u32() % 32).into(),
        I32Rotr => a.as_u32().rotate_right(b.as_u32() % 32).into(),

        I64Add => a.as_i64().wrapping_add(b.as_i64()).into(),
        I64Sub => a.as_i64().wrapping_sub(b.as_i64()).into(),
        I64Mul => a.as_i64().wrapping_mul(b.as_i64()).into(),
        I64DivS => {
            let (a, b) = (a.as_i64(), b.as_i64());
            if b == 0 {
                return Err(WispTrap::DivisionByZero);
            }
            a.checked_div(b).ok_or(WispTrap::IntegerOverflow)?.into()
        }
        I64DivU => a
            .as_u64()
            .checked_div(b.as_u64())
            .ok_or(WispTrap::DivisionByZero)?
            .into(),
        I64RemS => {
            let (a, b) = (a.as_i64(), b.as_i64());
            if b == 0 {
                return Err(WispTrap::DivisionByZero);
            }
            a.wrapping_rem(b).into()
        }
        I64RemU => a
            .as_u64()
            .checked_rem(b.as_u64())
            .ok_or(WispTrap::DivisionByZero)?
            .into(),
        I64And => (a.as_u64() & b.as_u64()).into(),
        I64Or => (a.as_u64() | b.as_u64()).into(),
        I64Xor => (a.as_u64() ^ b.as_u64()).into(),
        I64Shl => a.as_u64().wrapping_shl(b.as_u64() as u32).into(),
        I64ShrS => a.as_i64().wrapping_shr(b.as_u64() as u32).into(),
        I64ShrU => a.as_u64().wrapping_shr(b.as_u64() as u32).into(),
        I64Rotl => a.as_u64().rotate_left((b.as_u64() % 64) as u32).into(),
        I64Rotr => a.as_u64().rotate_right((b.as_u64() % 64) as u32).into(),

        F32Add => (a.as_f32() + b.as_f32()).into(),
        F32Sub => (a.as_f32() - b.as_f32()).into(),
        F32Mul => (a.as_f32() * b.as_f32()).into(),
        F32Div => (a.as_f32() / b.as_f32()).into(),
        F32Min => f32_min(a.as_f32(), b.as_f32()).into(),
        F32Max => f32_max(a.as_f32(), b.as_f32()).into(),
        F32Copysign => ((a.as_u32() & 0x7fff_ffff) | (b.as_u32() & 0x8000_0000)).into(),

        F64Add => (a.as_f64() + b.as_f64()).into(),
        F64Sub => (a.as_f64() - b.as_f64()).into(),
        F64Mul => (a.as_f64() * b.as_f64()).into(),
        F64Div => (a.as_f64() / b.as_f64()).into(),
        F64Min => f64_min(a.as_f64(), b.as_f64()).into(),
        F64Max => f64_max(a.as_f64(), b.as_f64()).into(),
        F64Copysign => ((a.as_u64() & 0x7fff_ffff_ffff_ffff)
            | (b.as_u64() & 0x8000_0000_0000_0000))
            .into(),

    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(
        op: WispNumOp,
        a: impl Into<WispValue>,
        b: impl Into<WispValue>,
    ) -> Result<WispValue, WispTrap> {
        eval(op, &mut vec![a.into(), b.into()])
    }

    fn unary(op: WispNumOp, a: WispValue) -> Result<WispValue, WispTrap> {
        eval(op, &mut vec![a])
    }

    #[test]
    fn test_eval_consumes_only_its_operands() {
        let mut stack = vec![WispValue::from(9i32), WispValue::from(4i32), WispValue::from(3i32)];
        assert_eq!(eval(WispNumOp::I32Sub, &mut stack).unwrap().as_i32(), 1);
        assert_eq!(stack, vec![WispValue::from(9i32)]);

        let mut stack = vec![WispValue::from(9i32), WispValue::from(0i32)];
        assert_eq!(eval(WispNumOp::I32Eqz, &mut stack).unwrap().as_i32(), 1);
        assert_eq!(stack, vec![WispValue::from(9i32)]);
    }

    #[test]
    fn test_integer_wraparound() {
        assert_eq!(bin(WispNumOp::I32Add, i32::MAX, 1i32).unwrap().as_i32(), i32::MIN);
        assert_eq!(bin(WispNumOp::I64Mul, i64::MAX, 2i64).unwrap().as_i64(), -2);
        assert_eq!(bin(WispNumOp::I32Sub, 0i32, 1i32).unwrap().as_u64(), 0xffff_ffff);
    }

    #[test]
    fn test_division_traps() {
        assert_eq!(bin(WispNumOp::I32DivS, 1i32, 0i32), Err(WispTrap::DivisionByZero));
        assert_eq!(bin(WispNumOp::I32DivU, 1i32, 0i32), Err(WispTrap::DivisionByZero));
        assert_eq!(bin(WispNumOp::I64RemU, 1i64, 0i64), Err(WispTrap::DivisionByZero));
        assert_eq!(bin(WispNumOp::I32DivS, i32::MIN, -1i32), Err(WispTrap::IntegerOverflow));
        assert_eq!(bin(WispNumOp::I64DivS, i64::MIN, -1i64), Err(WispTrap::IntegerOverflow));
        // The remainder of MIN / -1 is defined.
        assert_eq!(bin(WispNumOp::I32RemS, i32::MIN, -1i32).unwrap().as_i32(), 0);
        assert_eq!(bin(WispNumOp::I32RemS, -7i32, 2i32).unwrap().as_i32(), -1);
        assert_eq!(bin(WispNumOp::I32DivU, -1i32, 2i32).unwrap().as_u32(), 0x7fff_ffff);
    }

    #[test]
    fn test_shifts_and_rotates_mask_count() {
        assert_eq!(bin(WispNumOp::I32Shl, 1i32, 33i32).unwrap().as_i32(), 2);
        assert_eq!(bin(WispNumOp::I32ShrS, -8i32, 1i32).unwrap().as_i32(), -4);
        assert_eq!(bin(WispNumOp::I32ShrU, -8i32, 1i32).unwrap().as_u32(), 0x7fff_fffc);
        assert_eq!(bin(WispNumOp::I64Shl, 1i64, 65i64).unwrap().as_i64(), 2);
        assert_eq!(bin(WispNumOp::I32Rotl, 0x8000_0001u32, 1i32).unwrap().as_u32(), 3);
        assert_eq!(bin(WispNumOp::I64Rotr, 1i64, 1i64).unwrap().as_u64(), 1 << 63);
    }

    #[test]
    fn test_bit_counts() {
        assert_eq!(unary(WispNumOp::I32Clz, 1i32.into()).unwrap().as_i32(), 31);
        assert_eq!(unary(WispNumOp::I32Ctz, 0i32.into()).unwrap().as_i32(), 32);
        assert_eq!(unary(WispNumOp::I64Popcnt, (-1i64).into()).unwrap().as_i64(), 64);
    }

    #[test]
    fn test_float_min_max() {
        let min = bin(WispNumOp::F32Min, 0.0f32, -0.0f32).unwrap().as_f32();
        assert!(min == 0.0 && min.is_sign_negative());
        let max = bin(WispNumOp::F64Max, -0.0f64, 0.0f64).unwrap().as_f64();
        assert!(max == 0.0 && max.is_sign_positive());
        assert!(bin(WispNumOp::F32Max, f32::NAN, 1.0f32).unwrap().as_f32().is_nan());
        assert!(bin(WispNumOp::F64Min, 1.0f64, f64::NAN).unwrap().as_f64().is_nan());
        assert_eq!(bin(WispNumOp::F64Min, 1.0f64, 2.0f64).unwrap().as_f64(), 1.0);
    }

    #[test]
    fn test_nearest_rounds_half_to_even() {
        assert_eq!(unary(WispNumOp::F32Nearest, 2.5f32.into()).unwrap().as_f32(), 2.0);
        assert_eq!(unary(WispNumOp::F64Nearest, 3.5f64.into()).unwrap().as_f64(), 4.0);
        assert_eq!(unary(WispNumOp::F64Nearest, (-0.5f64).into()).unwrap().as_f64(), -0.0);
    }

    #[test]
    fn test_sign_ops_preserve_nan_payload() {
        let nan = WispValue::from(0x7fc0_1234u32);
        assert_eq!(unary(WispNumOp::F32Neg, nan).unwrap().as_u32(), 0xffc0_1234);
        let negative_nan = WispValue::from(0xffc0_1234u32);
        assert_eq!(unary(WispNumOp::F32Abs, negative_nan).unwrap().as_u32(), 0x7fc0_1234);
        assert_eq!(bin(WispNumOp::F64Copysign, 2.0f64, -1.0f64).unwrap().as_f64(), -2.0);
    }

    #[test]
    fn test_truncation() {
        assert_eq!(unary(WispNumOp::I32TruncF32S, (-1.9f32).into()).unwrap().as_i32(), -1);
        let v = unary(WispNumOp::I32TruncF64U, 4294967295.9f64.into()).unwrap();
        assert_eq!(v.as_u32(), u32::MAX);
        let v = unary(WispNumOp::I32TruncF64S, (-2147483648.9f64).into()).unwrap();
        assert_eq!(v.as_i32(), i32::MIN);
        assert_eq!(unary(WispNumOp::I32TruncF64U, (-0.9f64).into()).unwrap().as_u32(), 0);
        assert_eq!(
            unary(WispNumOp::I32TruncF32S, f32::NAN.into()),
            Err(WispTrap::InvalidConversionToInteger)
        );
        let overflow = Err(WispTrap::IntegerOverflow);
        assert_eq!(unary(WispNumOp::I32TruncF64S, 2147483648.0f64.into()), overflow);
        assert_eq!(unary(WispNumOp::I32TruncF32U, (-1.0f32).into()), overflow);
        assert_eq!(unary(WispNumOp::I64TruncF64S, 9223372036854775808.0f64.into()), overflow);
        assert_eq!(
            unary(WispNumOp::I64TruncF64S, (-9223372036854775808.0f64).into()).unwrap().as_i64(),
            i64::MIN
        );
        assert_eq!(unary(WispNumOp::I64TruncF32U, f32::INFINITY.into()), overflow);
    }

    #[test]
    fn test_conversions_keep_32bit_values_zero_extended() {
        let v = unary(WispNumOp::I32WrapI64, (-1i64).into()).unwrap();
        assert_eq!(v.as_u64(), 0xffff_ffff);
        assert_eq!(unary(WispNumOp::I64ExtendI32S, (-1i32).into()).unwrap().as_i64(), -1);
        assert_eq!(unary(WispNumOp::I64ExtendI32U, (-1i32).into()).unwrap().as_i64(), 0xffff_ffff);
        let v = unary(WispNumOp::F64ConvertI64U, u64::MAX.into()).unwrap();
        assert_eq!(v.as_f64(), 18446744073709551616.0);
        let bits = unary(WispNumOp::I32ReinterpretF32, 1.0f32.into()).unwrap().as_u32();
        assert_eq!(bits, 0x3f80_0000);
    }
}
