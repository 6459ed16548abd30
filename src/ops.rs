//! Operator dispatch over the scalar type lattice.
//!
//! Both dispatchers share the same prelude: `Undef` on any side passes
//! through unchanged (the compilation phase uses it as "not yet known"),
//! and a transient operand routes the whole application to its meta-type.
//! After the prelude each operator matches the concrete type pairs it has
//! overloads for; everything else raises [`Error::InvalidOperands`] naming
//! the operand types.

use crate::ast::{BinOp, CastTarget, UnaryOp};
use crate::error::Error;
use crate::model::Node;
use crate::transient::{Re, Transient};
use crate::value::{Value, ValueKind};

fn invalid(operator: &'static str, operands: &[&Value<'_>]) -> Error {
    let names: Vec<&str> = operands.iter().map(|v| v.type_name()).collect();
    Error::InvalidOperands {
        operator,
        operands: names.join(" and "),
    }
}

/// Numeric operand pair after promotion.
enum NumPair {
    Int(i64, i64),
    Float(f64, f64),
}

fn num_pair(l: &Value<'_>, r: &Value<'_>) -> Option<NumPair> {
    match (l.kind(), r.kind()) {
        (ValueKind::Int(a), ValueKind::Int(b)) => Some(NumPair::Int(*a, *b)),
        (ValueKind::Int(a), ValueKind::Float(b)) => Some(NumPair::Float(*a as f64, *b)),
        (ValueKind::Float(a), ValueKind::Int(b)) => Some(NumPair::Float(*a, *b as f64)),
        (ValueKind::Float(a), ValueKind::Float(b)) => Some(NumPair::Float(*a, *b)),
        _ => None,
    }
}

/// Strips the `sum()` overlay so operators see the wrapped element.
fn deref<'a, 'p>(v: &'a Value<'p>) -> &'a Value<'p> {
    match v.kind() {
        ValueKind::Overlay(ov) => &ov.val,
        _ => v,
    }
}

/// Applies a binary operator to one `(left, right)` pair.
pub fn apply_binary<'p>(
    op: BinOp,
    left: &Value<'p>,
    right: &Value<'p>,
) -> Result<Value<'p>, Error> {
    let l = deref(left);
    let r = deref(right);

    if l.is_undef() || r.is_undef() {
        return Ok(Value::undef());
    }
    if let Some(t) = l.as_transient() {
        return t.binary_op(op.name(), r, true);
    }
    if let Some(t) = r.as_transient() {
        return t.binary_op(op.name(), l, false);
    }

    match op {
        BinOp::Add => {
            if l.is_null() || r.is_null() {
                return Ok(Value::null());
            }
            if let Some(pair) = num_pair(l, r) {
                return Ok(match pair {
                    NumPair::Int(a, b) => Value::int(a.wrapping_add(b)),
                    NumPair::Float(a, b) => Value::float(a + b),
                });
            }
            // String concatenation; a scalar on the other side coerces to
            // its string form.
            match (l.kind(), r.kind()) {
                (ValueKind::Str(a), ValueKind::Str(b)) => Ok(Value::str(format!("{}{}", a, b))),
                (ValueKind::Str(a), _) => match r.to_text() {
                    Some(b) => Ok(Value::str(format!("{}{}", a, b))),
                    None => Err(invalid("+", &[l, r])),
                },
                (_, ValueKind::Str(b)) => match l.to_text() {
                    Some(a) => Ok(Value::str(format!("{}{}", a, b))),
                    None => Err(invalid("+", &[l, r])),
                },
                _ => Err(invalid("+", &[l, r])),
            }
        }
        BinOp::Sub | BinOp::Mul => {
            if l.is_null() || r.is_null() {
                return Ok(Value::null());
            }
            match num_pair(l, r) {
                Some(NumPair::Int(a, b)) => Ok(Value::int(if op == BinOp::Sub {
                    a.wrapping_sub(b)
                } else {
                    a.wrapping_mul(b)
                })),
                Some(NumPair::Float(a, b)) => Ok(Value::float(if op == BinOp::Sub {
                    a - b
                } else {
                    a * b
                })),
                None => Err(invalid(op.name(), &[l, r])),
            }
        }
        BinOp::Div => {
            if l.is_null() || r.is_null() {
                return Ok(Value::null());
            }
            match num_pair(l, r) {
                Some(NumPair::Int(_, 0)) => Err(Error::DivisionByZero),
                Some(NumPair::Int(a, b)) => Ok(Value::int(a.wrapping_div(b))),
                Some(NumPair::Float(_, b)) if b == 0.0 => Err(Error::DivisionByZero),
                Some(NumPair::Float(a, b)) => Ok(Value::float(a / b)),
                None => Err(invalid("/", &[l, r])),
            }
        }
        BinOp::Mod => {
            if l.is_null() || r.is_null() {
                return Ok(Value::null());
            }
            match (l.kind(), r.kind()) {
                (ValueKind::Int(_), ValueKind::Int(0)) => Err(Error::DivisionByZero),
                (ValueKind::Int(a), ValueKind::Int(b)) => Ok(Value::int(a.wrapping_rem(*b))),
                _ => Err(invalid("%", &[l, r])),
            }
        }
        BinOp::Eq => Ok(Value::bool(values_equal(l, r))),
        BinOp::Ne => Ok(Value::bool(!values_equal(l, r))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => compare(op, l, r),
        BinOp::Match | BinOp::NotMatch => {
            // Right side carries the pattern; a string pattern compiles on
            // the fly, a transient `Re` was routed through the prelude.
            let pattern = match r.as_str() {
                Some(p) => p,
                None => return Err(invalid(op.name(), &[l, r])),
            };
            let re = Re::compile(pattern)?;
            re.binary_op(op.name(), l, false)
        }
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => {
            match (l.kind(), r.kind()) {
                (ValueKind::Int(a), ValueKind::Int(b)) => {
                    // Reinterpret signed to unsigned for the computation
                    // and back.
                    let (ua, ub) = (*a as u64, *b as u64);
                    let out = match op {
                        BinOp::BitAnd => ua & ub,
                        BinOp::BitOr => ua | ub,
                        BinOp::BitXor => ua ^ ub,
                        BinOp::Shl => ua.checked_shl(ub as u32).unwrap_or(0),
                        BinOp::Shr => ua.checked_shr(ub as u32).unwrap_or(0),
                        _ => unreachable!(),
                    };
                    Ok(Value::int(out as i64))
                }
                _ => Err(invalid(op.name(), &[l, r])),
            }
        }
    }
}

/// Language equality: total over all type pairs.
fn values_equal(l: &Value<'_>, r: &Value<'_>) -> bool {
    match (l.kind(), r.kind()) {
        (ValueKind::Null, ValueKind::Null) => true,
        (ValueKind::Null, _) | (_, ValueKind::Null) => false,
        (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
        (ValueKind::Str(a), ValueKind::Str(b)) => a == b,
        (ValueKind::Node(a), ValueKind::Node(b)) => {
            a.addr == b.addr && std::ptr::eq(a.pool, b.pool)
        }
        _ => match num_pair(l, r) {
            Some(NumPair::Int(a, b)) => a == b,
            Some(NumPair::Float(a, b)) => a == b,
            None => false,
        },
    }
}

fn compare<'p>(op: BinOp, l: &Value<'p>, r: &Value<'p>) -> Result<Value<'p>, Error> {
    if l.is_null() || r.is_null() {
        // Ordering involving null is false; the inclusive comparisons keep
        // their equality component for null/null.
        let both_null = l.is_null() && r.is_null();
        return Ok(Value::bool(
            both_null && matches!(op, BinOp::Le | BinOp::Ge),
        ));
    }
    let ord = match (l.kind(), r.kind()) {
        (ValueKind::Str(a), ValueKind::Str(b)) => a.cmp(b),
        _ => match num_pair(l, r) {
            Some(NumPair::Int(a, b)) => a.cmp(&b),
            Some(NumPair::Float(a, b)) => match a.partial_cmp(&b) {
                Some(ord) => ord,
                None => return Ok(Value::bool(false)),
            },
            None => return Err(invalid(op.name(), &[l, r])),
        },
    };
    let out = match op {
        BinOp::Lt => ord.is_lt(),
        BinOp::Le => ord.is_le(),
        BinOp::Gt => ord.is_gt(),
        BinOp::Ge => ord.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::bool(out))
}

/// Applies a unary operator.
pub fn apply_unary<'p>(op: UnaryOp, value: &Value<'p>) -> Result<Value<'p>, Error> {
    let v = deref(value);

    if v.is_undef() {
        return Ok(Value::undef());
    }

    // Truthiness and typeof are defined over every arm, transients
    // included, so they dispatch before the meta-type routing.
    match op {
        UnaryOp::Truthy => return Ok(Value::bool(v.is_truthy())),
        UnaryOp::Not => return Ok(Value::bool(!v.is_truthy())),
        UnaryOp::TypeOf => return Ok(Value::str(v.type_name())),
        _ => {}
    }

    if let Some(t) = v.as_transient() {
        if op == UnaryOp::Len {
            return t.length().map(Value::int);
        }
        return Ok(t.unary_op(op.name())?);
    }

    match op {
        UnaryOp::Neg => match v.kind() {
            ValueKind::Null => Ok(Value::null()),
            ValueKind::Int(a) => Ok(Value::int(a.wrapping_neg())),
            ValueKind::Float(a) => Ok(Value::float(-a)),
            _ => Err(invalid("-", &[v])),
        },
        UnaryOp::BitNot => match v.kind() {
            ValueKind::Int(a) => Ok(Value::int(!(*a as u64) as i64)),
            _ => Err(invalid("~", &[v])),
        },
        UnaryOp::Len => match v.kind() {
            ValueKind::Null => match v.container() {
                // A model-backed null is a container surfaced through
                // field access; its length is the child count.
                Some(nref) => match nref.resolve() {
                    Node::Object(o) => Ok(Value::int(o.len() as i64)),
                    Node::Array(a) => Ok(Value::int(a.len() as i64)),
                    _ => Ok(Value::null()),
                },
                None => Ok(Value::null()),
            },
            ValueKind::Str(s) => Ok(Value::int(s.len() as i64)),
            ValueKind::Node(nref) => match nref.resolve() {
                Node::Object(o) => Ok(Value::int(o.len() as i64)),
                Node::Array(a) => Ok(Value::int(a.len() as i64)),
                _ => Err(invalid("#", &[v])),
            },
            _ => Err(invalid("#", &[v])),
        },
        UnaryOp::Not | UnaryOp::TypeOf | UnaryOp::Truthy => unreachable!(),
    }
}

/// The `[]` operator for values that are not model nodes: strings index to
/// a 1-character substring, transients route to their meta-type.
pub fn apply_subscript<'p>(left: &Value<'p>, index: &Value<'p>) -> Result<Value<'p>, Error> {
    let l = deref(left);
    let i = deref(index);

    if l.is_undef() || i.is_undef() {
        return Ok(Value::undef());
    }
    if let Some(t) = l.as_transient() {
        return t.binary_op("[]", i, true);
    }

    match (l.kind(), i.kind()) {
        (ValueKind::Str(s), ValueKind::Int(n)) => {
            let ch = if *n < 0 {
                None
            } else {
                s.chars().nth(*n as usize)
            };
            Ok(match ch {
                Some(c) => Value::str(c.to_string()),
                None => Value::null(),
            })
        }
        _ => Err(invalid("[]", &[l, i])),
    }
}

/// Applies an `as` cast.
pub fn apply_cast<'p>(target: CastTarget, value: &Value<'p>) -> Result<Value<'p>, Error> {
    let v = deref(value);

    if v.is_undef() {
        return Ok(Value::undef());
    }

    match target {
        CastTarget::Null => Ok(Value::null()),
        CastTarget::Bool => Ok(Value::bool(v.is_truthy())),
        CastTarget::Int => match v.kind() {
            ValueKind::Null => Ok(Value::null()),
            ValueKind::Int(a) => Ok(Value::int(*a)),
            ValueKind::Float(a) => Ok(Value::int(*a as i64)),
            ValueKind::Bool(b) => Ok(Value::int(*b as i64)),
            ValueKind::Str(s) => {
                let t = s.trim();
                if let Ok(i) = t.parse::<i64>() {
                    Ok(Value::int(i))
                } else if let Ok(f) = t.parse::<f64>() {
                    Ok(Value::int(f as i64))
                } else {
                    Err(Error::InvalidType(format!("cannot cast '{}' as int", s)))
                }
            }
            _ => Err(Error::InvalidType(format!(
                "cannot cast {} as int",
                v.type_name()
            ))),
        },
        CastTarget::Float => match v.kind() {
            ValueKind::Null => Ok(Value::null()),
            ValueKind::Int(a) => Ok(Value::float(*a as f64)),
            ValueKind::Float(a) => Ok(Value::float(*a)),
            ValueKind::Bool(b) => Ok(Value::float(*b as i64 as f64)),
            ValueKind::Str(s) => match s.trim().parse::<f64>() {
                Ok(f) => Ok(Value::float(f)),
                Err(_) => Err(Error::InvalidType(format!("cannot cast '{}' as float", s))),
            },
            _ => Err(Error::InvalidType(format!(
                "cannot cast {} as float",
                v.type_name()
            ))),
        },
        CastTarget::Str => match v.to_text() {
            Some(s) => Ok(Value::str(s)),
            None => Err(Error::InvalidType(format!(
                "cannot cast {} as string",
                v.type_name()
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_promotes_to_float() {
        let v = apply_binary(BinOp::Add, &Value::int(1), &Value::float(2.5)).unwrap();
        assert_eq!(v.as_float(), Some(3.5));
        let v = apply_binary(BinOp::Mul, &Value::int(3), &Value::int(4)).unwrap();
        assert_eq!(v.as_int(), Some(12));
    }

    #[test]
    fn arithmetic_with_null_is_null() {
        let v = apply_binary(BinOp::Add, &Value::null(), &Value::int(1)).unwrap();
        assert!(v.is_null());
        let v = apply_binary(BinOp::Sub, &Value::float(1.0), &Value::null()).unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn string_plus_coerces_scalars() {
        let v = apply_binary(BinOp::Add, &Value::str("n="), &Value::int(5)).unwrap();
        assert_eq!(v.as_str(), Some("n=5"));
        let v = apply_binary(BinOp::Add, &Value::str("a"), &Value::str("b")).unwrap();
        assert_eq!(v.as_str(), Some("ab"));
        let v = apply_binary(BinOp::Add, &Value::str("x"), &Value::null()).unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn division_by_zero_fails() {
        assert!(matches!(
            apply_binary(BinOp::Div, &Value::int(1), &Value::int(0)),
            Err(Error::DivisionByZero)
        ));
        assert!(matches!(
            apply_binary(BinOp::Mod, &Value::int(1), &Value::int(0)),
            Err(Error::DivisionByZero)
        ));
    }

    #[test]
    fn modulo_is_int_only() {
        assert!(apply_binary(BinOp::Mod, &Value::float(1.0), &Value::int(2)).is_err());
    }

    #[test]
    fn equality_follows_null_rules() {
        assert!(apply_binary(BinOp::Eq, &Value::null(), &Value::null())
            .unwrap()
            .is_truthy());
        assert!(!apply_binary(BinOp::Eq, &Value::null(), &Value::int(0))
            .unwrap()
            .is_truthy());
        assert!(apply_binary(BinOp::Eq, &Value::int(2), &Value::float(2.0))
            .unwrap()
            .is_truthy());
    }

    #[test]
    fn ordering_with_null() {
        assert!(!apply_binary(BinOp::Lt, &Value::null(), &Value::int(1))
            .unwrap()
            .is_truthy());
        assert!(apply_binary(BinOp::Le, &Value::null(), &Value::null())
            .unwrap()
            .is_truthy());
        assert!(!apply_binary(BinOp::Lt, &Value::null(), &Value::null())
            .unwrap()
            .is_truthy());
    }

    #[test]
    fn match_returns_subject() {
        let v = apply_binary(BinOp::Match, &Value::str("hello"), &Value::str("^h")).unwrap();
        assert_eq!(v.as_str(), Some("hello"));
        let v = apply_binary(BinOp::Match, &Value::str("hello"), &Value::str("^x")).unwrap();
        assert!(!v.is_truthy());
        let v = apply_binary(BinOp::NotMatch, &Value::str("hello"), &Value::str("^x")).unwrap();
        assert!(v.is_truthy());
    }

    #[test]
    fn bitwise_uses_twos_complement() {
        let v = apply_binary(BinOp::Shr, &Value::int(-1), &Value::int(60)).unwrap();
        assert_eq!(v.as_int(), Some(15));
        let v = apply_binary(BinOp::BitAnd, &Value::int(0b1100), &Value::int(0b1010)).unwrap();
        assert_eq!(v.as_int(), Some(0b1000));
        let v = apply_unary(UnaryOp::BitNot, &Value::int(0)).unwrap();
        assert_eq!(v.as_int(), Some(-1));
    }

    #[test]
    fn undef_passes_through() {
        assert!(apply_binary(BinOp::Add, &Value::undef(), &Value::int(1))
            .unwrap()
            .is_undef());
        assert!(apply_unary(UnaryOp::Neg, &Value::undef()).unwrap().is_undef());
    }

    #[test]
    fn typeof_names_arms() {
        let v = apply_unary(UnaryOp::TypeOf, &Value::int(1)).unwrap();
        assert_eq!(v.as_str(), Some("int"));
        let v = apply_unary(UnaryOp::TypeOf, &Value::null()).unwrap();
        assert_eq!(v.as_str(), Some("null"));
    }

    #[test]
    fn string_subscript_is_one_char() {
        let v = apply_subscript(&Value::str("héllo"), &Value::int(1)).unwrap();
        assert_eq!(v.as_str(), Some("é"));
        let v = apply_subscript(&Value::str("hi"), &Value::int(9)).unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn casts() {
        let v = apply_cast(CastTarget::Int, &Value::str(" 42 ")).unwrap();
        assert_eq!(v.as_int(), Some(42));
        let v = apply_cast(CastTarget::Str, &Value::float(1.5)).unwrap();
        assert_eq!(v.as_str(), Some("1.5"));
        let v = apply_cast(CastTarget::Bool, &Value::int(0)).unwrap();
        assert!(v.is_truthy());
        let v = apply_cast(CastTarget::Null, &Value::int(7)).unwrap();
        assert!(v.is_null());
    }
}
