//! Numeric keyword checks.

use serde_json::Number;

use super::equal::{as_integer, compare_numbers};
use crate::codegen::CmpOp;

/// `value <op> limit`. Incomparable values (NaN cannot occur in JSON) fail.
pub fn compare(value: &Number, op: CmpOp, limit: &Number) -> bool {
    let Some(ordering) = compare_numbers(value, limit) else {
        return false;
    };
    match op {
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
    }
}

/// Length keywords: `len <op> limit`.
pub fn compare_len(len: u64, op: CmpOp, limit: u64) -> bool {
    match op {
        CmpOp::Lt => len < limit,
        CmpOp::Le => len <= limit,
        CmpOp::Gt => len > limit,
        CmpOp::Ge => len >= limit,
    }
}

/// Whether `value` is a multiple of `divisor`.
///
/// Integers are checked exactly. Otherwise the quotient must lie within a
/// relative epsilon of an integer, or within `10^-precision` when a
/// precision is configured. A quotient that overflows to infinity fails.
pub fn is_multiple_of(value: &Number, divisor: &Number, precision: Option<u32>) -> bool {
    if let (Some(v), Some(d)) = (as_integer(value), as_integer(divisor)) {
        return d != 0 && v % d == 0;
    }
    let (Some(v), Some(d)) = (value.as_f64(), divisor.as_f64()) else {
        return false;
    };
    if d == 0.0 {
        return false;
    }
    let quotient = v / d;
    if !quotient.is_finite() {
        return false;
    }
    let distance = (quotient - quotient.round()).abs();
    match precision {
        Some(digits) => distance < 10f64.powi(-(digits as i32)),
        None => distance <= 4.0 * f64::EPSILON * quotient.abs().max(1.0),
    }
}
