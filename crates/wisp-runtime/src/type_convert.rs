//! Conversion utilities: parsed module data → runtime values.

use wisp_parser::{WispConstExpr, WispLimits, WispValue};

use crate::error::WispInstantiationError;
use crate::global::WispGlobalInst;

/// Evaluate a constant initializer expression.
///
/// `globals` holds the globals initialized so far; the parser only admits
/// `global.get` of imported globals, which precede every local one.
pub fn eval_const_expr(
    expr: &WispConstExpr,
    globals: &[WispGlobalInst],
) -> Result<WispValue, WispInstantiationError> {
    Ok(match *expr {
        WispConstExpr::I32(v) => WispValue::from(v),
        WispConstExpr::I64(v) => WispValue::from(v),
        WispConstExpr::F32(bits) => WispValue::from(bits),
        WispConstExpr::F64(bits) => WispValue::from(bits),
        WispConstExpr::GlobalGet(idx) => globals
            .get(idx as usize)
            .map(WispGlobalInst::get)
            .ok_or_else(|| WispInstantiationError::InvalidConstExpr {
                description: format!("global.get {idx} reads an uninitialized global"),
            })?,
    })
}

/// Whether a provided memory or table with `provided` limits may satisfy an
/// import declared with `declared` limits.
pub fn limits_match(declared: &WispLimits, provided: &WispLimits) -> bool {
    if provided.min < declared.min {
        return false;
    }
    match (declared.max, provided.max) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(declared_max), Some(provided_max)) => provided_max <= declared_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wisp_parser::{WispGlobalType, WispValueType};

    #[test]
    fn test_eval_const_expr_numbers() {
        assert_eq!(eval_const_expr(&WispConstExpr::I32(-1), &[]).unwrap().as_u64(), 0xffff_ffff);
        assert_eq!(eval_const_expr(&WispConstExpr::I64(-1), &[]).unwrap().as_i64(), -1);
        let bits = 1.5f32.to_bits();
        assert_eq!(eval_const_expr(&WispConstExpr::F32(bits), &[]).unwrap().as_f32(), 1.5);
        let bits = (-2.25f64).to_bits();
        assert_eq!(eval_const_expr(&WispConstExpr::F64(bits), &[]).unwrap().as_f64(), -2.25);
    }

    #[test]
    fn test_eval_const_expr_global_get() {
        let globals = [WispGlobalInst::new(
            WispGlobalType::immutable(WispValueType::I32),
            WispValue::from(9i32),
        )];
        assert_eq!(eval_const_expr(&WispConstExpr::GlobalGet(0), &globals).unwrap().as_i32(), 9);
        assert!(eval_const_expr(&WispConstExpr::GlobalGet(1), &globals).is_err());
    }

    #[test]
    fn test_limits_match() {
        let declared = WispLimits::new(1, Some(4));
        assert!(limits_match(&declared, &WispLimits::new(2, Some(3))));
        assert!(!limits_match(&declared, &WispLimits::new(0, Some(3))));
        assert!(!limits_match(&declared, &WispLimits::new(1, None)));
        assert!(!limits_match(&declared, &WispLimits::new(1, Some(5))));
        assert!(limits_match(&WispLimits::new(1, None), &WispLimits::new(1, None)));
    }
}
