//! Tree nodes shared by mappings and sequences.
//!
//! Every node is owned by the mapping entry or sequence item that holds it
//! and keeps a weak link to its parent for upward lookups. A node's path is
//! computed from that link on demand, so it is always consistent with where
//! the node is attached.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_format::{can_be_bare, quote};

use crate::config::ConfigState;
use crate::mapping::{Entry, Mapping};
use crate::sequence::{Item, Lazy, Sequence};
use crate::value::Value;

/// Where a node sits in its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKey {
    Key(String),
    Index(usize),
}

pub(crate) enum Body {
    Mapping(Vec<Entry>),
    Sequence(SequenceBody),
}

#[derive(Default)]
pub(crate) struct SequenceBody {
    pub(crate) items: Vec<Item>,
    pub(crate) lazy: Option<Lazy>,
    pub(crate) determined: bool,
    /// Per-iteration scopes of a comprehension; its expanded items link to them.
    pub(crate) contexts: Vec<Mapping>,
}

pub(crate) struct Node {
    parent: RefCell<Weak<Node>>,
    key: RefCell<Option<PathKey>>,
    pub(crate) body: RefCell<Body>,
    /// Cycle bookkeeping, used when this node is a scope root.
    resolving: RefCell<HashSet<String>>,
    /// Set while a lazy sequence computes its items.
    pub(crate) determining: Cell<bool>,
    pub(crate) config: Option<ConfigState>,
}

/// A handle on a mapping or sequence node.
#[derive(Clone)]
pub struct Container(pub(crate) Rc<Node>);

impl Container {
    fn with_body(body: Body, config: Option<ConfigState>) -> Self {
        Container(Rc::new(Node {
            parent: RefCell::new(Weak::new()),
            key: RefCell::new(None),
            body: RefCell::new(body),
            resolving: RefCell::new(HashSet::new()),
            determining: Cell::new(false),
            config,
        }))
    }

    pub(crate) fn new_mapping(config: Option<ConfigState>) -> Self {
        Self::with_body(Body::Mapping(Vec::new()), config)
    }

    pub(crate) fn new_sequence(lazy: Option<Lazy>) -> Self {
        Self::with_body(
            Body::Sequence(SequenceBody {
                lazy,
                ..SequenceBody::default()
            }),
            None,
        )
    }

    /// The parent container, if attached.
    pub fn parent(&self) -> Option<Container> {
        self.0.parent.borrow().upgrade().map(Container)
    }

    /// This node's key in its parent.
    pub fn key(&self) -> Option<PathKey> {
        self.0.key.borrow().clone()
    }

    /// Link this node under `parent` at `key` without inserting it.
    pub(crate) fn link(&self, parent: Option<&Container>, key: Option<PathKey>) {
        *self.0.parent.borrow_mut() = parent.map(|p| Rc::downgrade(&p.0)).unwrap_or_default();
        *self.0.key.borrow_mut() = key;
    }

    /// Dotted/bracketed location of this node, e.g. `a.b[2]["c d"]`.
    pub fn path(&self) -> String {
        let base = self.parent().map(|p| p.path()).unwrap_or_default();
        match self.key() {
            Some(key) => join_path(&base, &key),
            None => base,
        }
    }

    /// Path of a child at `key`.
    pub(crate) fn child_path(&self, key: &PathKey) -> String {
        join_path(&self.path(), key)
    }

    pub fn is_mapping(&self) -> bool {
        matches!(&*self.0.body.borrow(), Body::Mapping(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(&*self.0.body.borrow(), Body::Sequence(_))
    }

    pub fn is_config(&self) -> bool {
        self.0.config.is_some()
    }

    pub fn as_mapping(&self) -> Option<Mapping> {
        self.is_mapping().then(|| Mapping(self.clone()))
    }

    pub fn as_sequence(&self) -> Option<Sequence> {
        self.is_sequence().then(|| Sequence(self.clone()))
    }

    pub(crate) fn to_value(&self) -> Value {
        if self.is_mapping() {
            Value::Mapping(Mapping(self.clone()))
        } else {
            Value::Sequence(Sequence(self.clone()))
        }
    }

    /// Whether two handles refer to the same node.
    pub fn ptr_eq(&self, other: &Container) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Iterate over this node and its ancestors, nearest first.
    pub(crate) fn ancestors(&self) -> impl Iterator<Item = Container> {
        std::iter::successors(Some(self.clone()), |c| c.parent())
    }

    /// Record `mark` as being resolved. Returns false if it already was.
    pub(crate) fn mark(&self, mark: &str) -> bool {
        self.0.resolving.borrow_mut().insert(mark.to_string())
    }

    pub(crate) fn unmark(&self, mark: &str) {
        self.0.resolving.borrow_mut().remove(mark);
    }

    /// Number of marks currently held by this node.
    pub(crate) fn marks(&self) -> usize {
        self.0.resolving.borrow().len()
    }

    /// The value to store in this node at `key`.
    ///
    /// A detached container is linked here and stored as is, as is one
    /// already linked here at `key`. A container attached elsewhere, or one
    /// that would become its own ancestor, is stored as a deep copy.
    pub(crate) fn adopt(&self, value: Value, key: PathKey) -> Value {
        let child = match &value {
            Value::Mapping(m) => &m.0,
            Value::Sequence(s) => &s.0,
            _ => return value,
        };
        let keep = match child.parent() {
            Some(parent) => parent.ptr_eq(self) && child.key().as_ref() == Some(&key),
            None => !self.ancestors().any(|a| a.ptr_eq(child)),
        };
        let child = if keep { child.clone() } else { child.duplicate() };
        child.link(Some(self), Some(key));
        child.to_value()
    }

    /// A detached deep copy of this node. References and lazy sequences are
    /// copied as they are; nothing is evaluated.
    pub(crate) fn duplicate(&self) -> Container {
        let config = self.0.config.as_ref().map(ConfigState::derive);
        match &*self.0.body.borrow() {
            Body::Mapping(entries) => {
                let copy = Container::new_mapping(config);
                let entries = entries
                    .iter()
                    .map(|e| Entry {
                        key: e.key.clone(),
                        value: copy.adopt(e.value.clone(), PathKey::Key(e.key.clone())),
                        comment: e.comment.clone(),
                    })
                    .collect();
                *copy.0.body.borrow_mut() = Body::Mapping(entries);
                copy
            }
            Body::Sequence(body) => {
                let copy = Container::new_sequence(None);
                let lazy = body.lazy.as_ref().map(|lazy| match lazy {
                    Lazy::Range { begin, end } => Lazy::Range {
                        begin: begin.clone(),
                        end: end.clone(),
                    },
                    Lazy::Comprehension { template, driver } => {
                        let driver = Mapping(driver.0.duplicate());
                        driver.0.link(Some(&copy), None);
                        Lazy::Comprehension {
                            template: detached_copy(template),
                            driver,
                        }
                    }
                });
                // An unexpanded lazy sequence has no items of its own.
                let items = match lazy {
                    Some(_) => Vec::new(),
                    None => body
                        .items
                        .iter()
                        .enumerate()
                        .map(|(n, item)| Item {
                            value: copy.adopt(item.value.clone(), PathKey::Index(n)),
                            comment: item.comment.clone(),
                        })
                        .collect(),
                };
                *copy.0.body.borrow_mut() = Body::Sequence(SequenceBody {
                    items,
                    lazy,
                    ..SequenceBody::default()
                });
                copy
            }
        }
    }

    /// Detach a container value that this node is giving up.
    pub(crate) fn release(&self, value: &Value) {
        let child = match value {
            Value::Mapping(m) => &m.0,
            Value::Sequence(s) => &s.0,
            _ => return,
        };
        if child.parent().is_some_and(|p| p.ptr_eq(self)) {
            child.link(None, None);
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_mapping() { "Mapping" } else { "Sequence" };
        write!(f, "{kind}({:?})", self.path())
    }
}

/// A container value copied without a parent; other values are cloned.
fn detached_copy(value: &Value) -> Value {
    match value {
        Value::Mapping(m) => m.0.duplicate().to_value(),
        Value::Sequence(s) => s.0.duplicate().to_value(),
        other => other.clone(),
    }
}

/// Identity of the node behind a container value.
pub(crate) fn container_id(value: &Value) -> Option<usize> {
    match value {
        Value::Mapping(m) => Some(m.0.identity()),
        Value::Sequence(s) => Some(s.0.identity()),
        _ => None,
    }
}

/// Append `key` to `base` in path notation.
pub(crate) fn join_path(base: &str, key: &PathKey) -> String {
    match key {
        PathKey::Index(i) => format!("{base}[{i}]"),
        PathKey::Key(k) if k.starts_with(|c: char| c.is_ascii_digit()) && can_be_bare(k) => {
            format!("{base}[{k}]")
        }
        PathKey::Key(k) if can_be_bare(k) => {
            if base.is_empty() {
                k.clone()
            } else {
                format!("{base}.{k}")
            }
        }
        PathKey::Key(k) => format!("{base}[{}]", quote(k)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", &PathKey::Key("a".into())), "a");
        assert_eq!(join_path("a", &PathKey::Key("b".into())), "a.b");
        assert_eq!(join_path("a", &PathKey::Index(2)), "a[2]");
        assert_eq!(join_path("a", &PathKey::Key("c d".into())), "a[\"c d\"]");
        assert_eq!(join_path("a", &PathKey::Key("7".into())), "a[7]");
        assert_eq!(join_path("", &PathKey::Key("None".into())), "[\"None\"]");
    }

    #[test]
    fn test_paths_follow_attachment() {
        let root = Mapping::new();
        let inner = Mapping::new();
        let list = Sequence::new();
        let leaf = Mapping::new();
        list.push(leaf.clone()).unwrap();
        inner.insert("list", list);
        root.insert("inner", inner.clone());
        assert_eq!(leaf.path(), "inner.list[0]");

        root.remove("inner");
        assert_eq!(leaf.path(), "list[0]");
        assert!(inner.parent().is_none());
    }

    #[test]
    fn test_attached_containers_are_copied_not_shared() {
        let a = Mapping::new();
        let b = Mapping::new();
        let shared = Mapping::new();
        let list = Sequence::new();
        list.push(1i64).unwrap();
        shared.insert("list", list);
        a.insert("x", shared.clone());
        b.insert("y", shared.clone());
        assert_eq!(shared.path(), "x");

        let Some(Value::Mapping(copy)) = b.get_raw("y") else {
            panic!("expected a mapping");
        };
        assert!(!copy.0.ptr_eq(&shared.0));
        assert_eq!(copy.path(), "y");
        assert_eq!(copy.get_by_path("list").unwrap().to_string(), "[1]");

        copy.insert("z", 2i64);
        let Some(Value::Sequence(copied_list)) = copy.get_raw("list") else {
            panic!("expected a sequence");
        };
        copied_list.push(2i64).unwrap();
        assert!(shared.get_raw("z").is_none());
        assert_eq!(a.get_by_path("x.list").unwrap().to_string(), "[1]");
        assert_eq!(b.get_by_path("y.list").unwrap().to_string(), "[1, 2]");
    }

    #[test]
    fn test_container_inserted_below_itself_is_copied() {
        let outer = Mapping::new();
        let inner = Mapping::new();
        outer.insert("n", 1i64);
        outer.insert("inner", inner.clone());
        inner.insert("loop", outer.clone());
        assert!(outer.parent().is_none());
        assert_eq!(outer.get_by_path("inner.loop.n").unwrap(), Value::Int(1));
        assert_eq!(outer.get_by_path("inner.loop.inner").unwrap().to_string(), "{}");
    }

    #[test]
    fn test_reinserting_at_the_same_key_keeps_the_container() {
        let root = Mapping::new();
        let child = Mapping::new();
        root.insert("c", child.clone());
        root.insert("c", child.clone());
        let Some(Value::Mapping(stored)) = root.get_raw("c") else {
            panic!("expected a mapping");
        };
        assert!(stored.0.ptr_eq(&child.0));
        assert_eq!(child.path(), "c");
    }
}
