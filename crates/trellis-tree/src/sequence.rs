//! Sequences, including lazy ranges and comprehensions.
//!
//! A lazy sequence keeps its specification until first access, then
//! computes its items once. The specification is kept afterwards so that
//! saving writes `[1..$n]` rather than the expanded items.

use std::fmt;

use tracing::debug;

use crate::container::{Body, Container, PathKey, SequenceBody};
use crate::error::{ConfigError, ResolutionError, ResolutionErrorKind, Result};
use crate::instantiate::copy_value;
use crate::mapping::Mapping;
use crate::value::Value;

/// A sequence item and the comment written above it.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub value: Value,
    pub comment: Option<String>,
}

impl Item {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            comment: None,
        }
    }
}

/// How a lazy sequence computes its items.
#[derive(Debug, Clone, PartialEq)]
pub enum Lazy {
    /// `[begin..end]`, both ends included. Either end may be a reference
    /// or expression; both must evaluate to integers.
    Range { begin: Value, end: Value },
    /// `[template | var: values]`: one item per element of `values`, with
    /// `var` bound to that element.
    Comprehension { template: Value, driver: Mapping },
}

/// An ordered list of values.
///
/// Items are read through [`Sequence::get`], which evaluates references
/// relative to the sequence's parent: sequences are transparent to relative
/// lookups.
#[derive(Clone)]
pub struct Sequence(pub(crate) Container);

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a possibly negative index onto `0..len`.
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

impl Sequence {
    /// Create a detached, empty sequence.
    pub fn new() -> Self {
        Sequence(Container::new_sequence(None))
    }

    /// A lazy range from `begin` to `end`, inclusive.
    pub fn range(begin: impl Into<Value>, end: impl Into<Value>) -> Self {
        Sequence(Container::new_sequence(Some(Lazy::Range {
            begin: begin.into(),
            end: end.into(),
        })))
    }

    /// A lazy comprehension repeating `template` once per element of the
    /// single entry in `driver`.
    pub fn comprehension(template: impl Into<Value>, driver: Mapping) -> Self {
        let seq = Sequence(Container::new_sequence(None));
        driver.0.link(Some(&seq.0), None);
        seq.set_lazy(Some(Lazy::Comprehension {
            template: template.into(),
            driver,
        }));
        seq
    }

    pub(crate) fn set_lazy(&self, lazy: Option<Lazy>) {
        self.with_body_mut(|body| body.lazy = lazy);
    }

    /// The underlying tree node.
    pub fn container(&self) -> &Container {
        &self.0
    }

    pub fn path(&self) -> String {
        self.0.path()
    }

    pub fn parent(&self) -> Option<Container> {
        self.0.parent()
    }

    fn with_body<R>(&self, f: impl FnOnce(&SequenceBody) -> R) -> Option<R> {
        match &*self.0.0.body.borrow() {
            Body::Sequence(body) => Some(f(body)),
            Body::Mapping(_) => None,
        }
    }

    fn with_body_mut<R>(&self, f: impl FnOnce(&mut SequenceBody) -> R) -> Option<R> {
        match &mut *self.0.0.body.borrow_mut() {
            Body::Sequence(body) => Some(f(body)),
            Body::Mapping(_) => None,
        }
    }

    /// The lazy specification, if this sequence was written as a range or
    /// comprehension and has not been mutated since.
    pub fn lazy(&self) -> Option<Lazy> {
        self.with_body(|b| b.lazy.clone()).flatten()
    }

    /// Whether this is a range or comprehension.
    pub fn is_lazy(&self) -> bool {
        self.with_body(|b| b.lazy.is_some()).unwrap_or(false)
    }

    /// Items as currently stored, without expanding a lazy sequence.
    pub fn raw_items(&self) -> Vec<Item> {
        self.with_body(|b| b.items.clone()).unwrap_or_default()
    }

    /// Items with their raw values, expanding a lazy sequence first.
    pub fn items(&self) -> Result<Vec<Item>> {
        self.determine()?;
        Ok(self.raw_items())
    }

    /// Number of items.
    pub fn len(&self) -> Result<usize> {
        self.determine()?;
        Ok(self.with_body(|b| b.items.len()).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The raw value at `index`, without evaluating it.
    pub fn get_raw(&self, index: usize) -> Result<Option<Value>> {
        self.determine()?;
        Ok(self
            .with_body(|b| b.items.get(index).map(|i| i.value.clone()))
            .flatten())
    }

    /// The comment attached to the item at `index`.
    pub fn comment(&self, index: usize) -> Option<String> {
        self.with_body(|b| b.items.get(index).and_then(|i| i.comment.clone()))
            .flatten()
    }

    /// The evaluated value at `index`. Negative indices count from the end.
    pub fn get(&self, index: i64) -> Result<Value> {
        let len = self.len()?;
        let Some(position) = normalize_index(index, len) else {
            return Err(ResolutionError::new(
                ResolutionErrorKind::InvalidIndex { index, len },
                format!("[{index}]"),
                self.path(),
            )
            .into());
        };
        self.value_at(position)
    }

    /// Evaluate the item at an in-range position.
    pub(crate) fn value_at(&self, position: usize) -> Result<Value> {
        let raw = self.get_raw(position)?.unwrap_or(Value::None);
        if raw.is_placeholder() {
            let location = self.0.child_path(&PathKey::Index(position));
            self.0.evaluate(raw, &location)
        } else {
            Ok(raw)
        }
    }

    /// All items, evaluated.
    pub fn values(&self) -> Result<Vec<Value>> {
        (0..self.len()?).map(|i| self.value_at(i)).collect()
    }

    /// Append a value. A lazy sequence is expanded first and stops being
    /// lazy.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        self.push_with_comment(value, None)
    }

    pub fn push_with_comment(&self, value: impl Into<Value>, comment: Option<String>) -> Result<()> {
        self.materialize()?;
        self.push_item(Item {
            value: value.into(),
            comment,
        });
        Ok(())
    }

    /// Append without expanding: for sequences that are being built.
    pub(crate) fn push_item(&self, item: Item) {
        let index = self.with_body(|b| b.items.len()).unwrap_or(0);
        let item = Item {
            value: self.0.adopt(item.value, PathKey::Index(index)),
            comment: item.comment,
        };
        self.with_body_mut(|b| b.items.push(item));
    }

    /// Expand a lazy sequence and drop its specification, turning it into
    /// a plain sequence.
    pub fn materialize(&self) -> Result<()> {
        self.determine()?;
        self.set_lazy(None);
        Ok(())
    }

    /// Compute the items of a lazy sequence, once.
    pub fn determine(&self) -> Result<()> {
        let Some((lazy, determined)) = self.with_body(|b| (b.lazy.clone(), b.determined)) else {
            return Ok(());
        };
        let Some(lazy) = lazy else {
            return Ok(());
        };
        if determined {
            return Ok(());
        }
        if self.0.0.determining.replace(true) {
            return Err(ResolutionError::new(
                ResolutionErrorKind::Circular,
                lazy.to_string(),
                self.path(),
            )
            .into());
        }
        let expanded = match &lazy {
            Lazy::Range { begin, end } => self.expand_range(begin, end),
            Lazy::Comprehension { template, driver } => self.expand_comprehension(template, driver),
        };
        self.0.0.determining.set(false);
        let (items, contexts) = expanded?;
        debug!(path = %self.path(), len = items.len(), "expanded lazy sequence");
        self.with_body_mut(|b| {
            b.items = items;
            b.contexts = contexts;
            b.determined = true;
        });
        Ok(())
    }

    fn expand_range(&self, begin: &Value, end: &Value) -> Result<(Vec<Item>, Vec<Mapping>)> {
        let location = self.path();
        let bound = |value: &Value, which: &str| -> Result<i64> {
            match self.0.evaluate(value.clone(), &location)? {
                Value::Int(bound) => Ok(bound),
                other => Err(ResolutionError::new(
                    ResolutionErrorKind::Type(format!(
                        "range {which} must be an integer, not {}",
                        other.type_name()
                    )),
                    format!("[{begin}..{end}]"),
                    location.clone(),
                )
                .into()),
            }
        };
        let begin = bound(begin, "start")?;
        let end = bound(end, "end")?;
        let items = (begin..=end).map(Item::new).collect();
        Ok((items, Vec::new()))
    }

    fn expand_comprehension(
        &self,
        template: &Value,
        driver: &Mapping,
    ) -> Result<(Vec<Item>, Vec<Mapping>)> {
        let keys = driver.keys();
        let [var] = keys.as_slice() else {
            return Err(ConfigError::Shape {
                path: self.path(),
                reason: format!(
                    "a comprehension needs exactly one loop variable, found {}",
                    keys.len()
                ),
            }
            .into());
        };
        let values = match driver.get(var)? {
            Value::Sequence(values) => values.values()?,
            other => {
                return Err(ConfigError::Shape {
                    path: self.path(),
                    reason: format!("`{var}` must range over a sequence, not {}", other.type_name()),
                }
                .into());
            }
        };

        let mut items = Vec::with_capacity(values.len());
        let mut contexts = Vec::with_capacity(values.len());
        for (n, value) in values.into_iter().enumerate() {
            let context = Mapping::new();
            context.0.link(self.parent().as_ref(), self.0.key());
            context.bind(var, value);
            let item = match template {
                Value::Reference(_) | Value::Expression(_) => context.0.bind_template(template, var)?,
                Value::Mapping(_) | Value::Sequence(_) => {
                    copy_value(template, &context.0, PathKey::Index(n))?
                }
                scalar => scalar.clone(),
            };
            items.push(Item::new(item));
            contexts.push(context);
        }
        Ok((items, contexts))
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        if self.0.ptr_eq(&other.0) {
            return true;
        }
        match (self.lazy(), other.lazy()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.raw_items() == other.raw_items(),
            _ => false,
        }
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lazy() {
            Some(lazy) => write!(f, "Sequence({lazy})"),
            None => f
                .debug_list()
                .entries(self.raw_items().into_iter().map(|i| i.value))
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(0, 3), Some(0));
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(normalize_index(-4, 3), None);
        assert_eq!(normalize_index(0, 0), None);
    }

    #[test]
    fn test_plain_sequence() {
        let s = Sequence::new();
        s.push(1i64).unwrap();
        s.push_with_comment("two", Some("second".into())).unwrap();
        assert_eq!(s.len().unwrap(), 2);
        assert_eq!(s.get(-1).unwrap(), Value::from("two"));
        assert_eq!(s.comment(1).as_deref(), Some("second"));
        let err = s.get(5).unwrap_err();
        assert_eq!(
            err.resolution_kind(),
            Some(&ResolutionErrorKind::InvalidIndex { index: 5, len: 2 })
        );
    }

    #[test]
    fn test_range_expands_once() {
        let s = Sequence::range(1i64, 3i64);
        assert!(s.raw_items().is_empty());
        assert_eq!(
            s.values().unwrap(),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
        assert!(s.lazy().is_some());
        assert_eq!(Sequence::range(1i64, 1i64).values().unwrap(), vec![Value::Int(1)]);
    }

    #[test]
    fn test_range_start_must_be_an_integer() {
        let s = Sequence::range(Value::from("a"), 3i64);
        let err = s.values().unwrap_err();
        assert_eq!(
            err.resolution_kind(),
            Some(&ResolutionErrorKind::Type("range start must be an integer, not string".into()))
        );
    }

    #[test]
    fn test_reversed_range_is_empty() {
        assert!(Sequence::range(3i64, 1i64).is_empty().unwrap());
    }

    #[test]
    fn test_push_materializes_lazy_sequence() {
        let s = Sequence::range(0i64, 1i64);
        s.push(9i64).unwrap();
        assert!(s.lazy().is_none());
        assert_eq!(
            s.values().unwrap(),
            vec![Value::Int(0), Value::Int(1), Value::Int(9)]
        );
    }

    #[test]
    fn test_comprehension_needs_one_variable() {
        let driver = Mapping::new();
        driver.insert("i", Sequence::range(0i64, 1i64));
        driver.insert("j", Sequence::range(0i64, 1i64));
        let s = Sequence::comprehension(0i64, driver);
        assert!(matches!(
            s.len().unwrap_err(),
            crate::Error::Config(ConfigError::Shape { .. })
        ));
    }
}
