//! Operator and cast semantics shared by the dispatch loop.
//!
//! Integer arithmetic wraps. Operands of the wrong type are a compiler bug and
//! surface as [`VmPanic::TypeMismatch`].

use std::sync::Arc;

use super::VmPanic;
use crate::bytecode::{CastKind, Operator};
use crate::value::Value;

fn mismatch(op: Operator, lhs: &Value, rhs: &Value) -> VmPanic {
    VmPanic::TypeMismatch {
        op: op.mnemonic(),
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    }
}

fn int_op(op: Operator, a: i64, b: i64) -> Result<Value, VmPanic> {
    Ok(match op {
        Operator::AddI => Value::Int(a.wrapping_add(b)),
        Operator::SubI => Value::Int(a.wrapping_sub(b)),
        Operator::MulI => Value::Int(a.wrapping_mul(b)),
        Operator::DivI | Operator::ModI if b == 0 => {
            return Err(VmPanic::DivisionByZero { op: op.mnemonic() });
        }
        Operator::DivI => Value::Int(a.wrapping_div(b)),
        Operator::ModI => Value::Int(a.wrapping_rem(b)),
        Operator::LtI => Value::Bool(a < b),
        Operator::GtI => Value::Bool(a > b),
        Operator::EltI => Value::Bool(a <= b),
        Operator::EgtI => Value::Bool(a >= b),
        Operator::EqI => Value::Bool(a == b),
        Operator::NeqI => Value::Bool(a != b),
        _ => unreachable!("{op:?} is not an integer operator"),
    })
}

fn real_op(op: Operator, a: f64, b: f64) -> Value {
    match op {
        Operator::AddR => Value::Real(a + b),
        Operator::SubR => Value::Real(a - b),
        Operator::MulR => Value::Real(a * b),
        Operator::DivR => Value::Real(a / b),
        Operator::ModR => Value::Real(a % b),
        Operator::LtR => Value::Bool(a < b),
        Operator::GtR => Value::Bool(a > b),
        Operator::EltR => Value::Bool(a <= b),
        Operator::EgtR => Value::Bool(a >= b),
        Operator::EqR => Value::Bool(a == b),
        Operator::NeqR => Value::Bool(a != b),
        _ => unreachable!("{op:?} is not a real operator"),
    }
}

fn str_op(op: Operator, a: &str, b: &str) -> Value {
    match op {
        Operator::AddS => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Value::Str(Arc::from(joined))
        }
        Operator::LtS => Value::Bool(a < b),
        Operator::GtS => Value::Bool(a > b),
        Operator::EltS => Value::Bool(a <= b),
        Operator::EgtS => Value::Bool(a >= b),
        Operator::EqS => Value::Bool(a == b),
        Operator::NeqS => Value::Bool(a != b),
        _ => unreachable!("{op:?} is not a string operator"),
    }
}

pub(crate) fn binary(op: Operator, lhs: &Value, rhs: &Value) -> Result<Value, VmPanic> {
    use Operator::*;
    match op {
        AddI | SubI | MulI | DivI | ModI | LtI | GtI | EltI | EgtI | EqI | NeqI => match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => int_op(op, *a, *b),
            _ => Err(mismatch(op, lhs, rhs)),
        },
        AddR | SubR | MulR | DivR | ModR | LtR | GtR | EltR | EgtR | EqR | NeqR => match (lhs, rhs) {
            (Value::Real(a), Value::Real(b)) => Ok(real_op(op, *a, *b)),
            _ => Err(mismatch(op, lhs, rhs)),
        },
        AddS | LtS | GtS | EltS | EgtS | EqS | NeqS => match (lhs, rhs) {
            (Value::Str(a), Value::Str(b)) => Ok(str_op(op, a, b)),
            _ => Err(mismatch(op, lhs, rhs)),
        },
        And => Ok(Value::Bool(lhs.is_truthy() && rhs.is_truthy())),
        Or => Ok(Value::Bool(lhs.is_truthy() || rhs.is_truthy())),
        NegI | NegR | Not => unary(op, lhs),
    }
}

pub(crate) fn unary(op: Operator, src: &Value) -> Result<Value, VmPanic> {
    match (op, src) {
        (Operator::NegI, Value::Int(a)) => Ok(Value::Int(a.wrapping_neg())),
        (Operator::NegR, Value::Real(a)) => Ok(Value::Real(-a)),
        (Operator::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        _ => Err(mismatch(op, src, &Value::Nil)),
    }
}

pub(crate) fn cast(kind: CastKind, src: &Value) -> Result<Value, VmPanic> {
    match (kind, src) {
        (CastKind::IntToReal, Value::Int(i)) => Ok(Value::Real(*i as f64)),
        (CastKind::IntToStr, Value::Int(i)) => Ok(Value::str(itoa::Buffer::new().format(*i))),
        (CastKind::RealToInt, Value::Real(r)) => Ok(Value::Int(*r as i64)),
        (CastKind::RealToStr, Value::Real(r)) => Ok(Value::str(ryu::Buffer::new().format(*r))),
        _ => Err(VmPanic::TypeMismatch {
            op: kind.mnemonic(),
            lhs: src.type_name(),
            rhs: "nil",
        }),
    }
}
