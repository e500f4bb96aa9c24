//! Operator kernels: binary arithmetic, comparisons, boolean logic,
//! membership, and the cross-kind equality used by `in` and map equality.

use std::sync::Arc;

use strum::{Display, EnumString};

use crate::error::{RunResult, ScriptError};
use crate::value::{ContainerKind, DataType, Value};

/// Binary operators, named exactly as in Python ast dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum BinOpKind {
    Add,
    Sub,
    Mult,
    Div,
    Pow,
    Mod,
}

/// Comparison operators, named exactly as in Python ast dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum CmpOpKind {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
}

/// Boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum BoolOpKind {
    And,
    Or,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum UnaryOpKind {
    Not,
    USub,
}

/// The numeric promotion ladder. Arithmetic on two bools is carried out in
/// Int32, so `true + true == 2`.
fn promoted_dtype(a: DataType, b: DataType) -> DataType {
    fn rank(d: DataType) -> u8 {
        match d {
            DataType::Bool => 0,
            DataType::Int32 => 1,
            DataType::Int64 => 2,
            DataType::Float => 3,
            DataType::Double => 4,
            _ => 0,
        }
    }
    let winner = if rank(a) >= rank(b) { a } else { b };
    if winner == DataType::Bool {
        DataType::Int32
    } else {
        winner
    }
}

/// Floored modulo: the result lands in `[0, b)` for a positive divisor.
fn floored_mod_i64(a: i64, b: i64) -> i64 {
    let mut r = a % b;
    if r < 0 && b > 0 {
        r += b;
    }
    r
}

fn floored_mod_f64(a: f64, b: f64) -> f64 {
    let mut r = a % b;
    if r < 0.0 && b > 0.0 {
        r += b;
    }
    r
}

macro_rules! numeric_binop {
    ($op:expr, $a:expr, $b:expr, $ty:ty, $wrap:path, $to_f64:expr) => {{
        let a = $a;
        let b = $b;
        let to_f64 = $to_f64;
        match $op {
            BinOpKind::Add => Ok(Some($wrap(a + b))),
            BinOpKind::Sub => Ok(Some($wrap(a - b))),
            BinOpKind::Mult => Ok(Some($wrap(a * b))),
            BinOpKind::Div => {
                if b == (0 as $ty) {
                    Err(ScriptError::argument(
                        "Division by zero will result in undefined behaviour.",
                    ))
                } else {
                    Ok(Some($wrap(a / b)))
                }
            }
            BinOpKind::Pow => {
                let result = to_f64(a).powf(to_f64(b));
                Ok(Some($wrap(result as $ty)))
            }
            BinOpKind::Mod => {
                if b == (0 as $ty) {
                    Err(ScriptError::argument("Modulo by zero error."))
                } else {
                    Ok(Some($wrap(floored(a, b))))
                }
            }
        }
    }};
}

/// Applies a binary operator. `Ok(None)` means the operand kinds do not
/// support the operator; the caller renders the kind-tagged error.
pub fn binary_operate(op: BinOpKind, a: &Value, b: &Value) -> RunResult<Option<Value>> {
    // Lists first: concat and repetition.
    if a.container_kind() == ContainerKind::List || b.container_kind() == ContainerKind::List {
        return list_binop(op, a, b);
    }
    if matches!(a, Value::Tensor(_)) && matches!(b, Value::Tensor(_)) {
        return Err(ScriptError::type_error("tensor ops not supported"));
    }
    if a.is_numeric_scalar() && b.is_numeric_scalar() {
        return match promoted_dtype(a.data_type(), b.data_type()) {
            DataType::Int32 => {
                fn floored(a: i32, b: i32) -> i32 {
                    floored_mod_i64(i64::from(a), i64::from(b)) as i32
                }
                numeric_binop!(op, a.cast_i32()?, b.cast_i32()?, i32, Value::Int32, |x| {
                    f64::from(x)
                })
            }
            DataType::Int64 => {
                fn floored(a: i64, b: i64) -> i64 {
                    floored_mod_i64(a, b)
                }
                numeric_binop!(op, a.cast_i64()?, b.cast_i64()?, i64, Value::Int64, |x| {
                    x as f64
                })
            }
            DataType::Float => {
                fn floored(a: f32, b: f32) -> f32 {
                    floored_mod_f64(f64::from(a), f64::from(b)) as f32
                }
                numeric_binop!(op, a.cast_f32()?, b.cast_f32()?, f32, Value::Float, |x| {
                    f64::from(x)
                })
            }
            DataType::Double => {
                fn floored(a: f64, b: f64) -> f64 {
                    floored_mod_f64(a, b)
                }
                numeric_binop!(op, a.cast_f64()?, b.cast_f64()?, f64, Value::Double, |x| x)
            }
            _ => Ok(None),
        };
    }
    if a.is_string() && b.is_string() {
        if op == BinOpKind::Add {
            let mut joined = a.as_str_value()?;
            joined.push_str(&b.as_str_value()?);
            return Ok(Some(Value::string(joined)));
        }
        return Ok(None);
    }
    Ok(None)
}

fn list_binop(op: BinOpKind, a: &Value, b: &Value) -> RunResult<Option<Value>> {
    match op {
        BinOpKind::Add => {
            if let (Value::List(left), Value::List(right)) = (a, b) {
                return Ok(Some(Value::List(Arc::new(left.concat(right)))));
            }
            Ok(None)
        }
        BinOpKind::Mult => {
            let (list, count) = match (a, b) {
                (Value::List(list), other) if other.is_integer() => (list, other.cast_i64()?),
                (other, Value::List(list)) if other.is_integer() => (list, other.cast_i64()?),
                _ => return Ok(None),
            };
            Ok(Some(Value::List(Arc::new(list.repeat(count)))))
        }
        _ => Ok(None),
    }
}

/// Applies a comparison operator. `Ok(None)` means unsupported operand kinds.
pub fn compare_operate(op: CmpOpKind, a: &Value, b: &Value) -> RunResult<Option<Value>> {
    match op {
        CmpOpKind::In => return Ok(Some(Value::Bool(b.contains(a)?))),
        CmpOpKind::NotIn => return Ok(Some(Value::Bool(!b.contains(a)?))),
        _ => {}
    }
    if a.is_numeric_scalar() && b.is_numeric_scalar() {
        let (x, y) = (a.cast_f64()?, b.cast_f64()?);
        return Ok(Some(Value::Bool(match op {
            CmpOpKind::Eq => x == y,
            CmpOpKind::NotEq => x != y,
            CmpOpKind::Lt => x < y,
            CmpOpKind::LtE => x <= y,
            CmpOpKind::Gt => x > y,
            CmpOpKind::GtE => x >= y,
            CmpOpKind::In | CmpOpKind::NotIn => unreachable!("handled above"),
        })));
    }
    if a.is_string() && b.is_string() {
        let (x, y) = (a.as_str_value()?, b.as_str_value()?);
        return Ok(Some(Value::Bool(match op {
            CmpOpKind::Eq => x == y,
            CmpOpKind::NotEq => x != y,
            CmpOpKind::Lt => x < y,
            CmpOpKind::LtE => x <= y,
            CmpOpKind::Gt => x > y,
            CmpOpKind::GtE => x >= y,
            CmpOpKind::In | CmpOpKind::NotIn => unreachable!("handled above"),
        })));
    }
    Ok(None)
}

/// Applies a unary operator; `Ok(None)` means unsupported.
pub fn unary_operate(op: UnaryOpKind, operand: &Value) -> RunResult<Option<Value>> {
    match op {
        UnaryOpKind::Not => Ok(Some(Value::Bool(!operand.truthy()))),
        UnaryOpKind::USub => Ok(match operand {
            Value::Bool(b) => Some(Value::Int32(-i32::from(*b))),
            Value::Int32(v) => Some(Value::Int32(-v)),
            Value::Int64(v) => Some(Value::Int64(-v)),
            Value::Float(v) => Some(Value::Float(-v)),
            Value::Double(v) => Some(Value::Double(-v)),
            _ => None,
        }),
    }
}

/// Equality across kinds, used by membership tests and map equality.
///
/// Scalars compare by promoted numeric value or string bytes; lists compare
/// element-wise; maps compare order-insensitively; everything else falls
/// back to print-equality only when the container kinds match.
pub fn value_equal(a: &Value, b: &Value) -> bool {
    if a.container_kind() != b.container_kind() {
        return false;
    }
    if a.container_kind() == ContainerKind::Scalar {
        if a.is_numeric_scalar() && b.is_numeric_scalar() {
            return match (a.cast_f64(), b.cast_f64()) {
                (Ok(x), Ok(y)) => x == y,
                _ => false,
            };
        }
        if a.is_string() && b.is_string() {
            return match (a.as_str_value(), b.as_str_value()) {
                (Ok(x), Ok(y)) => x == y,
                _ => false,
            };
        }
        if a.is_none() || b.is_none() {
            return a.is_none() && b.is_none();
        }
        // Mixed scalar families (a number against a string, an exception
        // against a future) never compare equal; within one family the
        // printable form decides.
        if a.data_type() != b.data_type() {
            return false;
        }
        return a.print_string() == b.print_string();
    }
    match (a, b) {
        (Value::List(x), Value::List(y)) => {
            if x.len() != y.len() {
                return false;
            }
            let xs = x.snapshot();
            let ys = y.snapshot();
            xs.iter().zip(ys.iter()).all(|(l, r)| value_equal(l, r))
        }
        (Value::Map(x), Value::Map(y)) => x.equals(y),
        _ => a.print_string() == b.print_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binop(op: BinOpKind, a: Value, b: Value) -> Value {
        binary_operate(op, &a, &b).unwrap().unwrap()
    }

    #[test]
    fn promotion_picks_the_wider_type() {
        assert_eq!(
            binop(BinOpKind::Add, Value::Int32(1), Value::Int64(2)),
            Value::Int64(3)
        );
        assert_eq!(
            binop(BinOpKind::Add, Value::Int64(1), Value::Double(0.5)),
            Value::Double(1.5)
        );
        assert_eq!(
            binop(BinOpKind::Add, Value::Bool(true), Value::Bool(true)),
            Value::Int32(2)
        );
    }

    #[test]
    fn division_by_zero_is_fatal() {
        assert!(binary_operate(BinOpKind::Div, &Value::Int64(1), &Value::Int64(0)).is_err());
        assert!(binary_operate(BinOpKind::Mod, &Value::Int64(1), &Value::Int64(0)).is_err());
    }

    #[test]
    fn modulo_is_floored_for_positive_divisors() {
        assert_eq!(
            binop(BinOpKind::Mod, Value::Int64(-3), Value::Int64(5)),
            Value::Int64(2)
        );
        assert_eq!(
            binop(BinOpKind::Mod, Value::Double(-0.5), Value::Double(2.0)),
            Value::Double(1.5)
        );
    }

    #[test]
    fn string_concat_only() {
        assert_eq!(
            binop(BinOpKind::Add, Value::string("ab"), Value::string("cd")),
            Value::string("abcd")
        );
        assert!(binary_operate(BinOpKind::Sub, &Value::string("ab"), &Value::string("cd"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn cross_width_scalar_equality() {
        assert!(value_equal(&Value::Int32(3), &Value::Int64(3)));
        assert!(value_equal(&Value::Bool(true), &Value::Int64(1)));
        assert!(!value_equal(&Value::Int64(3), &Value::string("3")));
    }

    #[test]
    fn unary_minus_numeric_only() {
        assert_eq!(
            unary_operate(UnaryOpKind::USub, &Value::Int64(4)).unwrap(),
            Some(Value::Int64(-4))
        );
        assert_eq!(unary_operate(UnaryOpKind::USub, &Value::string("x")).unwrap(), None);
    }
}
