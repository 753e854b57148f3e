//! References: deferred lookups into the tree or into namespaces.

use std::fmt;

use trellis_format::quote;

use crate::value::Value;

/// How a reference is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `$a.b[0]`: a lookup in the configuration tree.
    Dollar,
    /// `` `os.sep` ``: a lookup in the registered namespaces.
    Backtick,
}

/// An index inside `[...]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Index {
    Int(i64),
    Str(String),
    /// `[$i]`: replaced by its value when the reference is resolved.
    Ref(Box<Reference>),
}

/// One step after the head of a reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Suffix {
    /// `.name`
    Attr(String),
    /// `[index]`
    Index(Index),
    /// `(args)`, only in backtick references.
    Call(Vec<Value>),
}

/// A navigation path such as `$_.settings.hosts[$i]`.
///
/// Leading `_` elements are normalized into `ups`: each one moves the
/// starting point to the parent container before the head is looked up.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub ups: usize,
    pub head: String,
    pub suffix: Vec<Suffix>,
}

impl Reference {
    /// A tree reference to a single key.
    pub fn new(head: impl Into<String>) -> Self {
        Self {
            kind: ReferenceKind::Dollar,
            ups: 0,
            head: head.into(),
            suffix: Vec::new(),
        }
    }

    /// Append `.name`.
    pub fn attr(mut self, name: impl Into<String>) -> Self {
        self.suffix.push(Suffix::Attr(name.into()));
        self
    }

    /// Append `[index]`.
    pub fn index(mut self, index: Index) -> Self {
        self.suffix.push(Suffix::Index(index));
        self
    }

    /// Whether an index of this reference is itself a reference.
    pub fn is_recursive(&self) -> bool {
        self.suffix
            .iter()
            .any(|s| matches!(s, Suffix::Index(Index::Ref(_))))
    }

    /// Whether this tree reference starts at `name` in the requesting
    /// container itself.
    pub(crate) fn is_headed_by(&self, name: &str) -> bool {
        self.kind == ReferenceKind::Dollar && self.ups == 0 && self.head == name
    }

    fn fmt_path(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.ups {
            write!(f, "_.")?;
        }
        write!(f, "{}", self.head)?;
        for suffix in &self.suffix {
            match suffix {
                Suffix::Attr(name) => write!(f, ".{name}")?,
                Suffix::Index(Index::Int(i)) => write!(f, "[{i}]")?,
                Suffix::Index(Index::Str(s)) => write!(f, "[{}]", quote(s))?,
                Suffix::Index(Index::Ref(r)) => write!(f, "[{r}]")?,
                Suffix::Call(args) => {
                    write!(f, "(")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ")")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ReferenceKind::Dollar => {
                write!(f, "$")?;
                self.fmt_path(f)
            }
            ReferenceKind::Backtick => {
                write!(f, "`")?;
                self.fmt_path(f)?;
                write!(f, "`")
            }
        }
    }
}
