//! Namespaces for backtick references and `${fn(value)}` calls.
//!
//! Backtick references are evaluated by a small interpreter over
//! [`Namespace`] objects: attribute access, item access and function calls.
//! Namespaces are registered on a config; lookups walk the configs from the
//! nearest one upward, trying each registered namespace in order.

use std::collections::HashMap;
use std::rc::Rc;

use crate::container::Container;
use crate::error::{Error, ResolutionError, ResolutionErrorKind, Result};
use crate::expression::Expression;
use crate::reference::{Index, Reference, Suffix};
use crate::sequence::normalize_index;
use crate::value::Value;

/// A function callable from configuration text.
#[derive(Clone)]
pub struct Function(Rc<dyn Fn(&[Value]) -> Result<Value, String>>);

impl Function {
    pub fn new(f: impl Fn(&[Value]) -> Result<Value, String> + 'static) -> Self {
        Function(Rc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, String> {
        (self.0)(args)
    }
}

/// What a name resolves to inside a namespace.
#[derive(Clone)]
pub enum Binding {
    Value(Value),
    Object(Rc<dyn Namespace>),
    Function(Function),
}

/// An object that backtick references can navigate.
pub trait Namespace {
    /// `ns.name`
    fn attribute(&self, name: &str) -> Option<Binding>;

    /// `ns[key]`
    fn item(&self, key: &Value) -> Option<Binding> {
        let _ = key;
        None
    }
}

/// A namespace built from named bindings.
#[derive(Clone, Default)]
pub struct ObjectNamespace {
    bindings: HashMap<String, Binding>,
}

impl ObjectNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bind(name, Binding::Value(value.into()));
        self
    }

    pub fn with_object(mut self, name: impl Into<String>, object: impl Namespace + 'static) -> Self {
        self.bind(name, Binding::Object(Rc::new(object)));
        self
    }

    pub fn with_function(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) -> Self {
        self.bind(name, Binding::Function(Function::new(f)));
        self
    }

    pub fn bind(&mut self, name: impl Into<String>, binding: Binding) {
        self.bindings.insert(name.into(), binding);
    }
}

impl Namespace for ObjectNamespace {
    fn attribute(&self, name: &str) -> Option<Binding> {
        self.bindings.get(name).cloned()
    }

    fn item(&self, key: &Value) -> Option<Binding> {
        key.as_str().and_then(|name| self.attribute(name))
    }
}

/// Environment variables: `` `env.HOME` `` or `` `env["HOME"]` ``.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvNamespace;

impl Namespace for EnvNamespace {
    fn attribute(&self, name: &str) -> Option<Binding> {
        std::env::var(name).ok().map(|v| Binding::Value(Value::Str(v)))
    }

    fn item(&self, key: &Value) -> Option<Binding> {
        key.as_str().and_then(|name| self.attribute(name))
    }
}

/// The first namespace of every config: the default namespace plus the
/// namespaces registered under a name.
pub(crate) struct DefaultLayer {
    pub(crate) named: Vec<(String, Rc<dyn Namespace>)>,
    pub(crate) base: Option<Rc<dyn Namespace>>,
}

impl Namespace for DefaultLayer {
    fn attribute(&self, name: &str) -> Option<Binding> {
        self.named
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, ns)| Binding::Object(ns.clone()))
            .or_else(|| self.base.as_ref().and_then(|b| b.attribute(name)))
    }

    fn item(&self, key: &Value) -> Option<Binding> {
        self.base.as_ref().and_then(|b| b.item(key))
    }
}

fn one_argument<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, String> {
    match args {
        [arg] => Ok(arg),
        _ => Err(format!("{name}() takes exactly one argument ({} given)", args.len())),
    }
}

fn builtin_str(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Str(match one_argument("str", args)? {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }))
}

fn builtin_int(args: &[Value]) -> Result<Value, String> {
    match one_argument("int", args)? {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) if f.is_finite() && f.abs() < 9.2e18 => Ok(Value::Int(f.trunc() as i64)),
        Value::Float(f) => Err(format!("cannot convert {f} to an integer")),
        Value::Str(s) => s
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| format!("invalid literal for int(): {s:?}")),
        other => Err(format!("int() argument must be a number or string, not {}", other.type_name())),
    }
}

fn builtin_float(args: &[Value]) -> Result<Value, String> {
    match one_argument("float", args)? {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Str(s) => s
            .trim()
            .parse()
            .map(Value::Float)
            .map_err(|_| format!("could not convert string to float: {s:?}")),
        other => Err(format!(
            "float() argument must be a number or string, not {}",
            other.type_name()
        )),
    }
}

fn builtin_len(args: &[Value]) -> Result<Value, String> {
    let len = match one_argument("len", args)? {
        Value::Str(s) => s.chars().count(),
        Value::Mapping(m) => m.len(),
        Value::Sequence(s) => s.len().map_err(|e| e.to_string())?,
        other => return Err(format!("object of type {} has no len()", other.type_name())),
    };
    Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
}

fn builtin_abs(args: &[Value]) -> Result<Value, String> {
    match one_argument("abs", args)? {
        Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(|| "integer overflow".to_string()),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(format!("bad operand type for abs(): {}", other.type_name())),
    }
}

/// The namespace every new config starts with: `env`, `os` and the
/// conversion functions `str`, `int`, `float`, `len` and `abs`.
pub fn default_namespace() -> ObjectNamespace {
    let os = ObjectNamespace::new()
        .with_value("sep", std::path::MAIN_SEPARATOR_STR)
        .with_value("name", if cfg!(windows) { "nt" } else { "posix" })
        .with_function("cwd", |args| {
            if !args.is_empty() {
                return Err("cwd() takes no arguments".into());
            }
            std::env::current_dir()
                .map(|p| Value::Str(p.display().to_string()))
                .map_err(|e| e.to_string())
        });
    ObjectNamespace::new()
        .with_object("env", EnvNamespace)
        .with_object("os", os)
        .with_function("str", builtin_str)
        .with_function("int", builtin_int)
        .with_function("float", builtin_float)
        .with_function("len", builtin_len)
        .with_function("abs", builtin_abs)
}

fn step_attribute(binding: &Binding, name: &str) -> Result<Option<Binding>> {
    Ok(match binding {
        Binding::Object(ns) => ns.attribute(name),
        Binding::Value(Value::Mapping(m)) => m.lookup(name)?.map(Binding::Value),
        Binding::Value(Value::Sequence(s)) if name == "length" => {
            Some(Binding::Value(Value::Int(i64::try_from(s.len()?).unwrap_or(i64::MAX))))
        }
        _ => None,
    })
}

fn step_item(binding: &Binding, key: &Value) -> Result<Option<Binding>> {
    Ok(match (binding, key) {
        (Binding::Object(ns), key) => ns.item(key),
        (Binding::Value(Value::Mapping(m)), Value::Str(name)) => m.lookup(name)?.map(Binding::Value),
        (Binding::Value(Value::Mapping(m)), Value::Int(i)) => {
            m.lookup(&i.to_string())?.map(Binding::Value)
        }
        (Binding::Value(Value::Sequence(s)), Value::Int(i)) => match normalize_index(*i, s.len()?) {
            Some(position) => Some(Binding::Value(s.value_at(position)?)),
            None => None,
        },
        (Binding::Value(Value::Str(s)), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            normalize_index(*i, chars.len()).map(|p| Binding::Value(Value::Str(chars[p].to_string())))
        }
        _ => None,
    })
}

impl Container {
    /// Namespaces visible from here, in lookup order.
    fn namespace_layers(&self) -> Vec<Rc<dyn Namespace>> {
        self.ancestors()
            .filter_map(|c| c.0.config.as_ref().map(|state| state.layers()))
            .flatten()
            .collect()
    }

    /// Evaluate a backtick reference. Index and call arguments are
    /// evaluated relative to `requester`.
    pub(crate) fn resolve_namespace(
        &self,
        reference: &Reference,
        requester: &Container,
        location: &str,
    ) -> Result<Value> {
        for layer in self.namespace_layers() {
            if let Some(value) = evaluate_in(layer.as_ref(), reference, requester, location)? {
                return Ok(value);
            }
        }
        Err(ResolutionError::new(ResolutionErrorKind::NoNamespace, reference.to_string(), location).into())
    }

    /// Evaluate `${function(argument)}`.
    pub(crate) fn call_function(
        &self,
        function: &str,
        argument: Value,
        expression: &Expression,
        location: &str,
    ) -> Result<Value> {
        let found = self
            .namespace_layers()
            .into_iter()
            .find_map(|layer| match layer.attribute(function) {
                Some(Binding::Function(f)) => Some(f),
                _ => None,
            });
        let Some(f) = found else {
            return Err(ResolutionError::new(
                ResolutionErrorKind::NoNamespace,
                expression.to_string(),
                location,
            )
            .into());
        };
        f.call(&[argument]).map_err(|message| {
            ResolutionError::new(
                ResolutionErrorKind::Function {
                    name: function.to_string(),
                    message,
                },
                expression.to_string(),
                location,
            )
            .into()
        })
    }
}

/// Evaluate `reference` in one namespace. `Ok(None)` lets the next
/// namespace try.
fn evaluate_in(
    namespace: &dyn Namespace,
    reference: &Reference,
    requester: &Container,
    location: &str,
) -> Result<Option<Value>> {
    let fail = |kind| -> Error { ResolutionError::new(kind, reference.to_string(), location).into() };
    let Some(mut binding) = namespace.attribute(&reference.head) else {
        return Ok(None);
    };
    let mut name = reference.head.clone();
    for suffix in &reference.suffix {
        let next = match suffix {
            Suffix::Attr(attr) => {
                name = attr.clone();
                step_attribute(&binding, attr)?
            }
            Suffix::Index(index) => {
                let key = match index {
                    Index::Int(i) => Value::Int(*i),
                    Index::Str(s) => Value::Str(s.clone()),
                    Index::Ref(inner) => requester.resolve_reference(inner, location)?,
                };
                step_item(&binding, &key)?
            }
            Suffix::Call(args) => {
                let Binding::Function(f) = &binding else {
                    return Err(fail(ResolutionErrorKind::Type(format!("`{name}` is not callable"))));
                };
                let args = args
                    .iter()
                    .map(|arg| requester.evaluate(arg.clone(), location))
                    .collect::<Result<Vec<_>>>()?;
                let value = f.call(&args).map_err(|message| {
                    fail(ResolutionErrorKind::Function {
                        name: name.clone(),
                        message,
                    })
                })?;
                Some(Binding::Value(value))
            }
        };
        match next {
            Some(next) => binding = next,
            None => return Ok(None),
        }
    }
    match binding {
        Binding::Value(value) => Ok(Some(value)),
        Binding::Object(_) | Binding::Function(_) => Err(fail(ResolutionErrorKind::Type(format!(
            "`{name}` is not a value"
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_conversions() {
        assert_eq!(builtin_int(&[Value::from(" 42 ")]), Ok(Value::Int(42)));
        assert_eq!(builtin_int(&[Value::Float(-2.7)]), Ok(Value::Int(-2)));
        assert_eq!(builtin_float(&[Value::Int(3)]), Ok(Value::Float(3.0)));
        assert_eq!(builtin_str(&[Value::Int(7)]), Ok(Value::from("7")));
        assert_eq!(builtin_str(&[Value::from("s")]), Ok(Value::from("s")));
        assert_eq!(builtin_abs(&[Value::Int(-5)]), Ok(Value::Int(5)));
        assert_eq!(builtin_len(&[Value::from("héllo")]), Ok(Value::Int(5)));
        assert!(builtin_int(&[Value::from("x")]).is_err());
        assert!(builtin_len(&[]).is_err());
    }

    #[test]
    fn test_default_namespace_bindings() {
        let ns = default_namespace();
        assert!(matches!(ns.attribute("os"), Some(Binding::Object(_))));
        assert!(matches!(ns.attribute("len"), Some(Binding::Function(_))));
        assert!(ns.attribute("nothing").is_none());
    }

    #[test]
    fn test_named_layer_shadows_base() {
        let base: Rc<dyn Namespace> = Rc::new(ObjectNamespace::new().with_value("x", 1i64));
        let named: Rc<dyn Namespace> = Rc::new(ObjectNamespace::new().with_value("y", 2i64));
        let layer = DefaultLayer {
            named: vec![("x".into(), named)],
            base: Some(base),
        };
        assert!(matches!(layer.attribute("x"), Some(Binding::Object(_))));
    }
}
