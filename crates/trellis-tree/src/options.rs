//! Options for loading and evaluating configs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::include::{IncludeResolver, NoIncludes};
use crate::mapping::Mapping;

/// Decides which mappings bound the cycle bookkeeping of references
/// resolved below them. Configs always do.
#[derive(Clone)]
pub struct ScopePredicate(Rc<dyn Fn(&Mapping) -> bool>);

impl ScopePredicate {
    /// Only configs (the root and included files) are scope roots.
    pub fn config_only() -> Self {
        ScopePredicate(Rc::new(|_| false))
    }

    /// Mappings shaped like a composable unit are scope roots too: those
    /// with both `input` and `output` keys, or with an `extends` key.
    pub fn composable_unit() -> Self {
        ScopePredicate(Rc::new(|m| {
            (m.contains_key("input") && m.contains_key("output")) || m.contains_key("extends")
        }))
    }

    pub fn custom(predicate: impl Fn(&Mapping) -> bool + 'static) -> Self {
        ScopePredicate(Rc::new(predicate))
    }

    pub fn matches(&self, mapping: &Mapping) -> bool {
        (self.0)(mapping)
    }
}

impl Default for ScopePredicate {
    fn default() -> Self {
        Self::config_only()
    }
}

impl fmt::Debug for ScopePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScopePredicate(..)")
    }
}

/// Key names of the templated repetition convention used by
/// [`Mapping::instantiate`](crate::Mapping::instantiate).
///
/// A unit with `unit_key: [{...}]` and `index_key: [...]` expands its single
/// template once per index, binding `index_key` in each copy. A sequence
/// `[$parts[$i]...]` inside its `output_key` mapping expands the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repetition {
    pub unit_key: String,
    pub index_key: String,
    pub output_key: String,
}

impl Default for Repetition {
    fn default() -> Self {
        Self {
            unit_key: "parts".into(),
            index_key: "i".into(),
            output_key: "output".into(),
        }
    }
}

/// Options for [`Config::load`](crate::Config::load) and friends.
#[derive(Clone)]
pub struct LoadOptions {
    /// The file being read: named in diagnostics and used to resolve
    /// relative includes.
    pub path: Option<PathBuf>,
    pub resolver: Rc<dyn IncludeResolver>,
    /// Let a stream redefine top-level keys of streams loaded before it.
    pub allow_overrides: bool,
    pub scope: ScopePredicate,
    /// `None` disables templated repetition.
    pub repetition: Option<Repetition>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            path: None,
            resolver: Rc::new(NoIncludes),
            allow_overrides: false,
            scope: ScopePredicate::default(),
            repetition: Some(Repetition::default()),
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn resolver(mut self, resolver: impl IncludeResolver + 'static) -> Self {
        self.resolver = Rc::new(resolver);
        self
    }

    pub fn allow_overrides(mut self, allow: bool) -> Self {
        self.allow_overrides = allow;
        self
    }

    pub fn scope(mut self, scope: ScopePredicate) -> Self {
        self.scope = scope;
        self
    }

    pub fn repetition(mut self, repetition: Option<Repetition>) -> Self {
        self.repetition = repetition;
        self
    }

    /// Name used in diagnostics, `?` when reading an unnamed stream.
    pub fn display_name(&self) -> String {
        self.path
            .as_deref()
            .map(Path::display)
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    #[test]
    fn test_composable_unit_predicate() {
        let config = Config::parse("a: {input: 1, output: 2}\nb: {extends: $a}\nc: {input: 1}").unwrap();
        let unit = ScopePredicate::composable_unit();
        let mapping = |key: &str| config.get(key).unwrap().as_mapping().cloned().unwrap();
        assert!(unit.matches(&mapping("a")));
        assert!(unit.matches(&mapping("b")));
        assert!(!unit.matches(&mapping("c")));
        assert!(!ScopePredicate::default().matches(&mapping("a")));
        assert!(ScopePredicate::custom(|m| m.len() == 1).matches(&mapping("c")));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(LoadOptions::new().display_name(), "?");
        assert_eq!(LoadOptions::new().path("conf/app.cfg").display_name(), "conf/app.cfg");
    }
}
