//! Arithmetic expressions and their operators.

use std::fmt;

use crate::error::{ResolutionErrorKind, Result};
use crate::value::Value;

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 2,
        }
    }
}

/// A deferred computation over scalars, references and nested expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Binary {
        op: BinaryOp,
        lhs: Box<Value>,
        rhs: Box<Value>,
    },
    Negate(Box<Value>),
    /// `${name(argument)}`: a function looked up in the namespaces.
    Call { function: String, argument: Box<Value> },
}

impl Expression {
    pub fn binary(op: BinaryOp, lhs: impl Into<Value>, rhs: impl Into<Value>) -> Self {
        Expression::Binary {
            op,
            lhs: Box::new(lhs.into()),
            rhs: Box::new(rhs.into()),
        }
    }

    /// Rebuild this expression with every operand passed through `f`.
    pub(crate) fn try_map(&self, f: &mut impl FnMut(&Value) -> Result<Value>) -> Result<Expression> {
        Ok(match self {
            Expression::Binary { op, lhs, rhs } => Expression::Binary {
                op: *op,
                lhs: Box::new(f(lhs)?),
                rhs: Box::new(f(rhs)?),
            },
            Expression::Negate(operand) => Expression::Negate(Box::new(f(operand)?)),
            Expression::Call { function, argument } => Expression::Call {
                function: function.clone(),
                argument: Box::new(f(argument)?),
            },
        })
    }

    fn precedence(&self) -> u8 {
        match self {
            Expression::Binary { op, .. } => op.precedence(),
            Expression::Negate(_) => 3,
            Expression::Call { .. } => 4,
        }
    }
}

fn operand_precedence(value: &Value) -> u8 {
    match value {
        Value::Expression(e) => e.precedence(),
        _ => 4,
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, value: &Value, parenthesize: bool) -> fmt::Result {
    if parenthesize {
        write!(f, "({value})")
    } else {
        write!(f, "{value}")
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Binary { op, lhs, rhs } => {
                let p = op.precedence();
                write_operand(f, lhs, operand_precedence(lhs) < p)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, rhs, operand_precedence(rhs) <= p)
            }
            Expression::Negate(operand) => {
                write!(f, "-")?;
                write_operand(f, operand, operand_precedence(operand) < 3)
            }
            Expression::Call { function, argument } => write!(f, "${{{function}({argument})}}"),
        }
    }
}

fn type_error(op: BinaryOp, lhs: &Value, rhs: &Value) -> ResolutionErrorKind {
    ResolutionErrorKind::Type(format!(
        "unsupported operand types for {}: {} and {}",
        op.symbol(),
        lhs.type_name(),
        rhs.type_name()
    ))
}

/// Apply a binary operator to two evaluated operands.
///
/// Integers stay integers except under `/`, which always yields a float.
/// `%` takes the sign of the divisor. Strings concatenate with `+` and
/// repeat with `*`.
pub(crate) fn apply(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, ResolutionErrorKind> {
    use BinaryOp::*;
    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            match op {
                Add => a.checked_add(b).map(Value::Int).ok_or(ResolutionErrorKind::Overflow),
                Sub => a.checked_sub(b).map(Value::Int).ok_or(ResolutionErrorKind::Overflow),
                Mul => a.checked_mul(b).map(Value::Int).ok_or(ResolutionErrorKind::Overflow),
                Div if b == 0 => Err(ResolutionErrorKind::DivisionByZero),
                Div => Ok(Value::Float(a as f64 / b as f64)),
                Mod if b == 0 => Err(ResolutionErrorKind::DivisionByZero),
                Mod => {
                    let r = a.checked_rem(b).ok_or(ResolutionErrorKind::Overflow)?;
                    Ok(Value::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
                }
            }
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (Some(a), Some(b)) = (lhs.as_float(), rhs.as_float()) else {
                return Err(type_error(op, &lhs, &rhs));
            };
            match op {
                Add => Ok(Value::Float(a + b)),
                Sub => Ok(Value::Float(a - b)),
                Mul => Ok(Value::Float(a * b)),
                Div | Mod if b == 0.0 => Err(ResolutionErrorKind::DivisionByZero),
                Div => Ok(Value::Float(a / b)),
                Mod => Ok(Value::Float(a - b * (a / b).floor())),
            }
        }
        (Value::Str(a), Value::Str(b)) if op == Add => Ok(Value::Str(format!("{a}{b}"))),
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) if op == Mul => {
            Ok(Value::Str(s.repeat(usize::try_from(*n).unwrap_or(0))))
        }
        _ => Err(type_error(op, &lhs, &rhs)),
    }
}

/// Negate an evaluated operand.
pub(crate) fn negate(value: Value) -> Result<Value, ResolutionErrorKind> {
    match value {
        Value::Int(i) => i.checked_neg().map(Value::Int).ok_or(ResolutionErrorKind::Overflow),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(ResolutionErrorKind::Type(format!(
            "bad operand type for unary -: {}",
            other.type_name()
        ))),
    }
}
