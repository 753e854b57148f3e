//! Ordered key/value mappings.

use std::fmt;

use crate::container::{Body, Container, PathKey, container_id};
use crate::error::{ConfigError, Result};
use crate::value::Value;

/// A mapping entry: key, raw value and the comment written above it.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: String,
    pub value: Value,
    pub comment: Option<String>,
}

/// An ordered set of unique keys, each bound to a value.
///
/// Reads through [`Mapping::get`] evaluate references and expressions;
/// [`Mapping::get_raw`] returns what was written.
#[derive(Clone)]
pub struct Mapping(pub(crate) Container);

impl Default for Mapping {
    fn default() -> Self {
        Self::new()
    }
}

impl Mapping {
    /// Create a detached, empty mapping.
    pub fn new() -> Self {
        Mapping(Container::new_mapping(None))
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

    fn with_entries<R>(&self, f: impl FnOnce(&Vec<Entry>) -> R) -> R {
        match &*self.0.0.body.borrow() {
            Body::Mapping(entries) => f(entries),
            Body::Sequence(_) => f(&Vec::new()),
        }
    }

    fn with_entries_mut<R>(&self, f: impl FnOnce(&mut Vec<Entry>) -> R) -> Option<R> {
        match &mut *self.0.0.body.borrow_mut() {
            Body::Mapping(entries) => Some(f(entries)),
            Body::Sequence(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.with_entries(|e| e.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.with_entries(|e| e.iter().map(|e| e.key.clone()).collect())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.with_entries(|e| e.iter().any(|e| e.key == key))
    }

    /// All entries with their raw values.
    pub fn entries(&self) -> Vec<Entry> {
        self.with_entries(|e| e.clone())
    }

    /// The value bound to `key`, without evaluating it.
    pub fn get_raw(&self, key: &str) -> Option<Value> {
        self.with_entries(|e| e.iter().find(|e| e.key == key).map(|e| e.value.clone()))
    }

    /// The comment attached to `key`.
    pub fn comment(&self, key: &str) -> Option<String> {
        self.with_entries(|e| {
            e.iter()
                .find(|e| e.key == key)
                .and_then(|e| e.comment.clone())
        })
    }

    /// The value bound to `key`, evaluated if it is a reference or
    /// expression.
    pub fn get(&self, key: &str) -> Result<Value> {
        match self.lookup(key)? {
            Some(value) => Ok(value),
            None => Err(ConfigError::NotFound {
                path: self.0.child_path(&PathKey::Key(key.to_string())),
            }
            .into()),
        }
    }

    /// Like [`Mapping::get`], but a missing key is `Ok(None)`.
    pub fn lookup(&self, key: &str) -> Result<Option<Value>> {
        let Some(raw) = self.get_raw(key) else {
            return Ok(None);
        };
        if raw.is_placeholder() {
            let location = self.0.child_path(&PathKey::Key(key.to_string()));
            self.0.evaluate(raw, &location).map(Some)
        } else {
            Ok(Some(raw))
        }
    }

    /// Bind `key` to `value`. An existing binding is replaced in place,
    /// keeping its position and comment.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let comment = self.comment(&key);
        self.insert_with_comment(key, value, comment);
    }

    /// Bind `key` to `value` with the given comment.
    pub fn insert_with_comment(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
        comment: Option<String>,
    ) {
        let key = key.into();
        let value = self.0.adopt(value.into(), PathKey::Key(key.clone()));
        let incoming = container_id(&value);
        let old = self.with_entries_mut(|entries| {
            match entries.iter_mut().find(|e| e.key == key) {
                Some(entry) => {
                    entry.comment = comment;
                    Some(std::mem::replace(&mut entry.value, value))
                }
                None => {
                    entries.push(Entry {
                        key,
                        value,
                        comment,
                    });
                    None
                }
            }
        });
        if let Some(Some(old)) = old
            && container_id(&old) != incoming
        {
            self.0.release(&old);
        }
    }

    /// Bind without adopting: containers keep their current parent.
    pub(crate) fn bind(&self, key: &str, value: Value) {
        self.with_entries_mut(|entries| {
            entries.retain(|e| e.key != key);
            entries.push(Entry {
                key: key.to_string(),
                value,
                comment: None,
            });
        });
    }

    /// Remove `key`, returning its raw value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self
            .with_entries_mut(|entries| {
                let pos = entries.iter().position(|e| e.key == key)?;
                Some(entries.remove(pos).value)
            })
            .flatten();
        if let Some(value) = &removed {
            self.0.release(value);
        }
        removed
    }
}

impl PartialEq for Mapping {
    fn eq(&self, other: &Self) -> bool {
        self.0.ptr_eq(&other.0) || self.entries() == other.entries()
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries().into_iter().map(|e| (e.key, e.value)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_preserves_order_and_replaces() {
        let m = Mapping::new();
        m.insert("b", 1i64);
        m.insert("a", 2i64);
        m.insert_with_comment("c", 3i64, Some("third".into()));
        m.insert("b", 10i64);
        assert_eq!(m.keys(), vec!["b", "a", "c"]);
        assert_eq!(m.get("b").unwrap(), Value::Int(10));
        assert_eq!(m.comment("c").as_deref(), Some("third"));
        m.insert("c", 4i64);
        assert_eq!(m.comment("c").as_deref(), Some("third"));
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let m = Mapping::new();
        let err = m.get("nope").unwrap_err();
        assert_eq!(err.to_string(), "no value at `nope`");
        assert_eq!(m.lookup("nope").unwrap(), None);
    }

    #[test]
    fn test_remove() {
        let m = Mapping::new();
        m.insert("a", "x");
        assert_eq!(m.remove("a"), Some(Value::from("x")));
        assert!(m.is_empty());
        assert_eq!(m.remove("a"), None);
    }
}
