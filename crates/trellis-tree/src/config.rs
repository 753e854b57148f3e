//! Configs: root mappings that own namespaces and engine options.

use std::cell::RefCell;
use std::io::Read;
use std::ops::Deref;
use std::path::Path;
use std::rc::Rc;

use tracing::debug;

use crate::container::Container;
use crate::error::{ConfigError, Result};
use crate::mapping::Mapping;
use crate::namespace::{DefaultLayer, Namespace, default_namespace};
use crate::options::{LoadOptions, Repetition, ScopePredicate};
use crate::parser;
use crate::value::Value;

/// State carried by a config node.
pub(crate) struct ConfigState {
    namespaces: RefCell<Vec<Rc<dyn Namespace>>>,
    named: RefCell<Vec<(String, Rc<dyn Namespace>)>>,
    pub(crate) scope: ScopePredicate,
    pub(crate) repetition: Option<Repetition>,
}

impl ConfigState {
    /// State for an included config: engine options but no namespaces of
    /// its own, so lookups reach the including config's namespaces.
    pub(crate) fn new(scope: ScopePredicate, repetition: Option<Repetition>) -> Self {
        Self {
            namespaces: RefCell::new(Vec::new()),
            named: RefCell::new(Vec::new()),
            scope,
            repetition,
        }
    }

    /// Same engine options and namespaces.
    pub(crate) fn derive(&self) -> Self {
        Self {
            namespaces: RefCell::new(self.namespaces.borrow().clone()),
            named: RefCell::new(self.named.borrow().clone()),
            scope: self.scope.clone(),
            repetition: self.repetition.clone(),
        }
    }

    /// Namespaces in lookup order: named ones and the default namespace
    /// first, then the rest in registration order.
    pub(crate) fn layers(&self) -> Vec<Rc<dyn Namespace>> {
        let namespaces = self.namespaces.borrow();
        let named = self.named.borrow();
        let mut layers: Vec<Rc<dyn Namespace>> = Vec::with_capacity(namespaces.len() + 1);
        if !named.is_empty() || !namespaces.is_empty() {
            layers.push(Rc::new(DefaultLayer {
                named: named.clone(),
                base: namespaces.first().cloned(),
            }));
        }
        layers.extend(namespaces.iter().skip(1).cloned());
        layers
    }
}

/// A configuration: the root mapping of one or more loaded streams.
///
/// Dereferences to [`Mapping`] for reading and writing.
#[derive(Clone, PartialEq)]
pub struct Config(Mapping);

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Config").field(&self.0).finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Config {
    type Target = Mapping;

    fn deref(&self) -> &Mapping {
        &self.0
    }
}

impl Config {
    /// An empty config with the default namespace.
    pub fn new() -> Self {
        Self::with_options(&LoadOptions::default())
    }

    /// An empty config using the engine options of `options`.
    pub fn with_options(options: &LoadOptions) -> Self {
        let state = ConfigState::new(options.scope.clone(), options.repetition.clone());
        state
            .namespaces
            .borrow_mut()
            .push(Rc::new(default_namespace()));
        Config(Mapping(Container::new_mapping(Some(state))))
    }

    pub(crate) fn from_container(container: Container) -> Self {
        Config(Mapping(container))
    }

    /// Parse a config from text with default options.
    pub fn parse(source: &str) -> Result<Config> {
        Self::parse_with(source, &LoadOptions::default())
    }

    pub fn parse_with(source: &str, options: &LoadOptions) -> Result<Config> {
        let config = Self::with_options(options);
        config.load(source, options)?;
        Ok(config)
    }

    pub fn from_reader(reader: impl Read, options: &LoadOptions) -> Result<Config> {
        let config = Self::with_options(options);
        config.load_reader(reader, options)?;
        Ok(config)
    }

    /// Read and parse a file. Relative includes are resolved against it.
    pub fn open(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Config> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        Self::parse_with(&source, &options.clone().path(path))
    }

    /// Load another stream into this config.
    ///
    /// A top-level key that is already defined is a [`ConfigError::KeyClash`]
    /// unless `options.allow_overrides` is set. Nothing is changed when
    /// loading fails.
    pub fn load(&self, source: &str, options: &LoadOptions) -> Result<()> {
        let loaded = Mapping::new();
        parser::parse_into(&loaded, source, options, &[])?;
        if !options.allow_overrides
            && let Some(key) = loaded.keys().into_iter().find(|k| self.contains_key(k))
        {
            return Err(ConfigError::KeyClash { key }.into());
        }
        debug!(file = %options.display_name(), keys = loaded.len(), "loaded stream");
        for entry in loaded.entries() {
            let value = loaded.remove(&entry.key).unwrap_or(Value::None);
            self.insert_with_comment(entry.key, value, entry.comment);
        }
        Ok(())
    }

    pub fn load_reader(&self, mut reader: impl Read, options: &LoadOptions) -> Result<()> {
        let mut source = String::new();
        reader.read_to_string(&mut source)?;
        self.load(&source, options)
    }

    fn state(&self) -> Option<&ConfigState> {
        self.0.0.0.config.as_ref()
    }

    /// Register a namespace for backtick references.
    ///
    /// Without a name the namespace is tried after those registered before
    /// it. With a name it becomes an attribute of the default namespace:
    /// `` `name.attr` ``.
    pub fn add_namespace(&self, namespace: Rc<dyn Namespace>, name: Option<&str>) {
        let Some(state) = self.state() else {
            return;
        };
        match name {
            Some(name) => state.named.borrow_mut().push((name.to_string(), namespace)),
            None => state.namespaces.borrow_mut().push(namespace),
        }
    }

    /// Unregister a namespace added with the same name. Returns whether it
    /// was registered.
    pub fn remove_namespace(&self, namespace: &Rc<dyn Namespace>, name: Option<&str>) -> bool {
        let Some(state) = self.state() else {
            return false;
        };
        match name {
            Some(name) => {
                let mut named = state.named.borrow_mut();
                let before = named.len();
                named.retain(|(n, ns)| !(n == name && Rc::ptr_eq(ns, namespace)));
                named.len() != before
            }
            None => {
                let mut namespaces = state.namespaces.borrow_mut();
                let before = namespaces.len();
                namespaces.retain(|ns| !Rc::ptr_eq(ns, namespace));
                namespaces.len() != before
            }
        }
    }

    /// The root mapping.
    pub fn mapping(&self) -> &Mapping {
        &self.0
    }

    /// A flattened copy: `extends` and templated repetition resolved,
    /// references left unevaluated.
    pub fn instantiate(&self) -> Result<Config> {
        self.0.instantiate().map(Config)
    }
}

/// Several configs searched in order.
#[derive(Debug, Clone, Default)]
pub struct ConfigList(Vec<Config>);

impl ConfigList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, config: Config) {
        self.0.push(config);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Config> {
        self.0.iter()
    }

    /// The value at `path` in the first config that has one.
    pub fn get_by_path(&self, path: &str) -> Result<Value> {
        for config in &self.0 {
            match config.get_by_path(path) {
                Err(crate::Error::Config(ConfigError::NotFound { .. })) => continue,
                other => return other,
            }
        }
        Err(ConfigError::NotFound {
            path: path.to_string(),
        }
        .into())
    }
}

impl From<Vec<Config>> for ConfigList {
    fn from(configs: Vec<Config>) -> Self {
        ConfigList(configs)
    }
}
