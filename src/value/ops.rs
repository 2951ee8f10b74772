//! Infallible operator implementations.
//!
//! Expression evaluation cannot raise runtime errors (only unknown filters
//! can), so operators follow the coercion rules of the source dialect:
//! numeric contexts coerce through a float (`null` → 0, `true` → 1, numeric
//! strings parse, everything else is `NaN`), `+` concatenates when either
//! side is a string, and comparisons on mixed types go through numbers.

use std::cmp::Ordering;

use crate::compiler::ast::BinOp;
use crate::value::{Value, ValueKind, ValueRepr};

/// Coerces a value to a float for arithmetic and comparison.
fn as_f64(value: &Value) -> f64 {
    match value.0 {
        ValueRepr::Null => 0.0,
        ValueRepr::Bool(val) => val as i64 as f64,
        ValueRepr::I64(val) => val as f64,
        ValueRepr::F64(val) => val,
        ValueRepr::String(ref val) => {
            let trimmed = val.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        _ => f64::NAN,
    }
}

/// Wraps a float back into a value, folding whole results into integers.
fn num(val: f64) -> Value {
    if val.fract() == 0.0 && val >= i64::MIN as f64 && val <= i64::MAX as f64 {
        Value::from(val as i64)
    } else {
        Value::from(val)
    }
}

fn is_numeric(value: &Value) -> bool {
    !as_f64(value).is_nan() || matches!(value.0, ValueRepr::F64(f) if f.is_nan())
}

pub fn neg(value: &Value) -> Value {
    match value.0 {
        ValueRepr::I64(val) => Value::from(-val),
        _ => num(-as_f64(value)),
    }
}

fn add(left: &Value, right: &Value) -> Value {
    if left.kind() == ValueKind::String || right.kind() == ValueKind::String {
        return Value::from(format!("{left}{right}"));
    }
    if let (ValueRepr::I64(a), ValueRepr::I64(b)) = (&left.0, &right.0) {
        if let Some(rv) = a.checked_add(*b) {
            return Value::from(rv);
        }
    }
    num(as_f64(left) + as_f64(right))
}

fn sub(left: &Value, right: &Value) -> Value {
    if let (ValueRepr::I64(a), ValueRepr::I64(b)) = (&left.0, &right.0) {
        if let Some(rv) = a.checked_sub(*b) {
            return Value::from(rv);
        }
    }
    num(as_f64(left) - as_f64(right))
}

fn mul(left: &Value, right: &Value) -> Value {
    if let (ValueRepr::I64(a), ValueRepr::I64(b)) = (&left.0, &right.0) {
        if let Some(rv) = a.checked_mul(*b) {
            return Value::from(rv);
        }
    }
    num(as_f64(left) * as_f64(right))
}

fn div(left: &Value, right: &Value) -> Value {
    // true division like the source dialect: 3 / 2 is 1.5
    num(as_f64(left) / as_f64(right))
}

fn rem(left: &Value, right: &Value) -> Value {
    num(as_f64(left) % as_f64(right))
}

/// Loose equality: structural for same kinds, numeric across
/// number/bool/numeric-string operands.
fn loose_eq(left: &Value, right: &Value) -> bool {
    if left.kind() == right.kind() {
        return left == right;
    }
    if left.is_null() || right.is_null() {
        return false;
    }
    if is_numeric(left) && is_numeric(right) {
        return as_f64(left) == as_f64(right);
    }
    false
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
        return Some(a.cmp(b));
    }
    as_f64(left).partial_cmp(&as_f64(right))
}

/// Applies a binary operator.  `and`/`or` short-circuit in the vm and never
/// reach this function.
pub fn bin_op(op: BinOp, left: &Value, right: &Value) -> Value {
    match op {
        BinOp::Eq => Value::from(loose_eq(left, right)),
        BinOp::Ne => Value::from(!loose_eq(left, right)),
        BinOp::Lt => Value::from(compare(left, right) == Some(Ordering::Less)),
        BinOp::Lte => Value::from(matches!(
            compare(left, right),
            Some(Ordering::Less) | Some(Ordering::Equal)
        )),
        BinOp::Gt => Value::from(compare(left, right) == Some(Ordering::Greater)),
        BinOp::Gte => Value::from(matches!(
            compare(left, right),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        )),
        BinOp::Add => add(left, right),
        BinOp::Sub => sub(left, right),
        BinOp::Mul => mul(left, right),
        BinOp::Div => div(left, right),
        BinOp::Rem => rem(left, right),
        BinOp::And | BinOp::Or => unreachable!("short-circuited in the vm"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_arithmetic() {
        assert_eq!(bin_op(BinOp::Add, &Value::from(1), &Value::from(2)), Value::from(3));
        assert_eq!(
            bin_op(BinOp::Div, &Value::from(3), &Value::from(2)),
            Value::from(1.5)
        );
        assert_eq!(bin_op(BinOp::Div, &Value::from(4), &Value::from(2)), Value::from(2));
        assert_eq!(
            bin_op(BinOp::Mul, &Value::from("3"), &Value::from(2)),
            Value::from(6)
        );
        assert_eq!(bin_op(BinOp::Rem, &Value::from(5), &Value::from(3)), Value::from(2));
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(
            bin_op(BinOp::Add, &Value::from("a"), &Value::from(1)),
            Value::from("a1")
        );
    }

    #[test]
    fn test_loose_equality() {
        assert!(bin_op(BinOp::Eq, &Value::from("1"), &Value::from(1)).is_true());
        assert!(bin_op(BinOp::Eq, &Value::from(true), &Value::from(1)).is_true());
        assert!(bin_op(BinOp::Ne, &Value::NULL, &Value::from(0)).is_true());
        assert!(bin_op(BinOp::Eq, &Value::NULL, &Value::NULL).is_true());
    }

    #[test]
    fn test_comparisons() {
        assert!(bin_op(BinOp::Lt, &Value::from("10"), &Value::from(9)).is_true() == false);
        assert!(bin_op(BinOp::Gt, &Value::from(10), &Value::from("9")).is_true());
        assert!(bin_op(BinOp::Lt, &Value::from("a"), &Value::from("b")).is_true());
    }
}
