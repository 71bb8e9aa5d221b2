use std::fmt;
use std::sync::Arc;

use crate::codeenv::CodeAddress;
use crate::vm::{FrameLink, NativeArgs, Runtime};

/// Status returned by natives, JIT functions and the embedding entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallStatus {
    /// Finished, execution continues.
    Normal,
    /// Unrecoverable; the runtime rolls back to the state before `invoke`.
    Aborted,
    /// Cooperative pause, resumable with `Runtime::resume`.
    Yield,
    /// The callee changed shared runtime state; the interpreter must reload it.
    Resync,
}

/// Signature of natives and JIT-compiled functions.
pub type NativeFunction = fn(&mut Runtime, NativeArgs) -> CallStatus;

#[derive(Clone, Copy)]
pub enum FunctionRef {
    Script(CodeAddress),
    Native(NativeFunction),
    Jit(NativeFunction),
}

impl PartialEq for FunctionRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FunctionRef::Script(a), FunctionRef::Script(b)) => a == b,
            (FunctionRef::Native(a), FunctionRef::Native(b)) | (FunctionRef::Jit(a), FunctionRef::Jit(b)) => {
                std::ptr::fn_addr_eq(*a, *b)
            }
            _ => false,
        }
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionRef::Script(addr) => write!(f, "Script({addr})"),
            FunctionRef::Native(func) => write!(f, "Native({:p})", *func as *const ()),
            FunctionRef::Jit(func) => write!(f, "Jit({:p})", *func as *const ()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub function: FunctionRef,
    pub captures: Box<[Value]>,
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Int(i64),
    Real(f64),
    Bool(bool),
    Str(Arc<str>),
    Function(FunctionRef),
    Array(Arc<[Value]>),
    /// Association list in construction order.
    Map(Arc<[(Value, Value)]>),
    Struct(Arc<[Value]>),
    Closure(Arc<Closure>),
    /// Frame link slot written by the call protocol.
    Frame(FrameLink),
    /// Return/trace address slot written by the call protocol.
    ReturnAddress(Option<CodeAddress>),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Real(r) => *r != 0.0,
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Int(_) => "int",
            Value::Real(_) => "real",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Struct(_) => "struct",
            Value::Closure(_) => "closure",
            Value::Frame(_) => "frame",
            Value::ReturnAddress(_) => "return-address",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Array(a), Value::Array(b)) | (Value::Struct(a), Value::Struct(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => a == b,
            (Value::Frame(a), Value::Frame(b)) => a == b,
            (Value::ReturnAddress(a), Value::ReturnAddress(b)) => a == b,
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}

fn write_seq<'a>(f: &mut fmt::Formatter<'_>, open: &str, items: impl Iterator<Item = &'a Value>, close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(close)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Int(i) => f.write_str(itoa::Buffer::new().format(*i)),
            Value::Real(r) => f.write_str(ryu::Buffer::new().format(*r)),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => f.write_str(s),
            Value::Function(func) => write!(f, "<function {func:?}>"),
            Value::Array(items) => write_seq(f, "[", items.iter(), "]"),
            Value::Struct(fields) => write_seq(f, "struct {", fields.iter(), "}"),
            Value::Map(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Value::Closure(c) => write!(f, "<closure {:?}/{}>", c.function, c.captures.len()),
            Value::Frame(link) => write!(f, "<frame {link:?}>"),
            Value::ReturnAddress(Some(addr)) => write!(f, "<return {addr}>"),
            Value::ReturnAddress(None) => f.write_str("<return native>"),
        }
    }
}
