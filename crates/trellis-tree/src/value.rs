//! Value types for configuration trees.

use std::fmt;

use trellis_format::{format_float, quote};

use crate::expression::Expression;
use crate::mapping::Mapping;
use crate::reference::Reference;
use crate::sequence::{Lazy, Sequence};

/// A value held by a mapping entry or a sequence item.
///
/// Containers are handles: cloning a `Value::Mapping` shares the mapping.
/// `Reference` and `Expression` are placeholders that are evaluated when
/// read through [`Mapping::get`] or [`Sequence::get`].
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Mapping(Mapping),
    Sequence(Sequence),
    Reference(Reference),
    Expression(Expression),
}

impl Value {
    /// Short name of this value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Mapping(_) => "mapping",
            Value::Sequence(_) => "sequence",
            Value::Reference(_) => "reference",
            Value::Expression(_) => "expression",
        }
    }

    /// Whether this is a scalar (not a container and not a placeholder).
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)
        )
    }

    /// Whether this is a mapping or a sequence.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Mapping(_) | Value::Sequence(_))
    }

    /// Whether this is an unevaluated reference or expression.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Value::Reference(_) | Value::Expression(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The value as a float; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Mapping> for Value {
    fn from(v: Mapping) -> Self {
        Value::Mapping(v)
    }
}

impl From<Sequence> for Value {
    fn from(v: Sequence) -> Self {
        Value::Sequence(v)
    }
}

/// Structural equality: containers compare by content, placeholders by
/// their unevaluated form. Nothing is evaluated.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Mapping(a), Value::Mapping(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) => a == b,
            (Value::Reference(a), Value::Reference(b)) => a == b,
            (Value::Expression(a), Value::Expression(b)) => a == b,
            _ => false,
        }
    }
}

/// Single-line source notation. Nothing is evaluated: placeholders and lazy
/// sequences are written the way they would be typed.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{}", format_float(*v)),
            Value::Str(s) => write!(f, "{}", quote(s)),
            Value::Mapping(m) => {
                write!(f, "{{")?;
                for (i, entry) in m.entries().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if trellis_format::can_be_bare(&entry.key) {
                        write!(f, "{}: {}", entry.key, entry.value)?;
                    } else {
                        write!(f, "{}: {}", quote(&entry.key), entry.value)?;
                    }
                }
                write!(f, "}}")
            }
            Value::Sequence(s) => match s.lazy() {
                Some(lazy) => write!(f, "{lazy}"),
                None => {
                    write!(f, "[")?;
                    for (i, item) in s.raw_items().iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", item.value)?;
                    }
                    write!(f, "]")
                }
            },
            Value::Reference(r) => write!(f, "{r}"),
            Value::Expression(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for Lazy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lazy::Range { begin, end } => write!(f, "[{begin}..{end}]"),
            Lazy::Comprehension { template, driver } => {
                write!(f, "[{template} | ")?;
                for entry in driver.entries() {
                    if trellis_format::can_be_bare(&entry.key) {
                        write!(f, "{}: {}", entry.key, entry.value)?;
                    } else {
                        write!(f, "{}: {}", quote(&entry.key), entry.value)?;
                    }
                }
                write!(f, "]")
            }
        }
    }
}
