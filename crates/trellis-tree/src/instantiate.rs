//! Flattened copies: `extends` inheritance and templated repetition.
//!
//! Copies are structural. References and expressions are carried over in
//! their unevaluated form, and lazy sequences stay lazy, so a copy reads the
//! same values as the source would at the copy's position in its new tree.

use tracing::debug;

use crate::config::ConfigState;
use crate::container::{Container, PathKey};
use crate::error::{ConfigError, Error, Result};
use crate::mapping::Mapping;
use crate::options::Repetition;
use crate::reference::Reference;
use crate::sequence::{Item, Lazy, Sequence};
use crate::value::Value;

const EXTENDS: &str = "extends";
/// Held on a mapping while it is being instantiated.
const INSTANTIATING: &str = "instantiating";

/// Copy `value` for storage in `parent` at `key`.
///
/// Containers are instantiated and linked there; other values are cloned.
pub(crate) fn copy_value(value: &Value, parent: &Container, key: PathKey) -> Result<Value> {
    instantiate_value(value, Some(parent), Some(key))
}

fn instantiate_value(value: &Value, parent: Option<&Container>, key: Option<PathKey>) -> Result<Value> {
    match value {
        Value::Mapping(m) => m.instantiate_into(parent, key).map(Value::Mapping),
        Value::Sequence(s) => s.instantiate_into(parent, key).map(Value::Sequence),
        other => Ok(other.clone()),
    }
}

/// The repetition convention in effect for `source`.
fn repetition_for(source: &Container) -> Option<Repetition> {
    match source.nearest_config() {
        Some(config) => config.0.config.as_ref().and_then(|s| s.repetition.clone()),
        None => Some(Repetition::default()),
    }
}

fn shape(path: String, reason: impl Into<String>) -> Error {
    ConfigError::Shape {
        path,
        reason: reason.into(),
    }
    .into()
}

impl Mapping {
    /// A detached copy with `extends` resolved and templated repetition
    /// expanded. References are copied, not evaluated.
    pub fn instantiate(&self) -> Result<Mapping> {
        self.instantiate_into(None, None)
    }

    /// A mapping met again while it is being instantiated extends itself,
    /// directly or through its bases or children.
    pub(crate) fn instantiate_into(&self, parent: Option<&Container>, key: Option<PathKey>) -> Result<Mapping> {
        if !self.0.mark(INSTANTIATING) {
            debug!(path = %self.path(), "circular extends");
            return Err(ConfigError::CircularExtends { path: self.path() }.into());
        }
        let result = self.instantiate_marked(parent, key);
        self.0.unmark(INSTANTIATING);
        result
    }

    fn instantiate_marked(&self, parent: Option<&Container>, key: Option<PathKey>) -> Result<Mapping> {
        let result = match self.0.0.config.as_ref() {
            Some(state) => Mapping(Container::new_mapping(Some(ConfigState::derive(state)))),
            None => Mapping::new(),
        };
        result.0.link(parent, key.clone());

        if self.contains_key(EXTENDS) {
            let base = match self.get(EXTENDS)? {
                Value::Mapping(base) => base,
                other => {
                    return Err(ConfigError::InvalidExtends {
                        path: self.0.child_path(&PathKey::Key(EXTENDS.into())),
                        found: other.to_string(),
                    }
                    .into());
                }
            };
            debug!(path = %self.path(), base = %base.path(), "instantiating base");
            let inherited = base.instantiate_into(parent, key)?;
            for entry in inherited.entries() {
                let value = inherited.remove(&entry.key).unwrap_or(Value::None);
                result.insert_with_comment(entry.key, value, entry.comment);
            }
        }

        for entry in self.entries() {
            if entry.key == EXTENDS {
                continue;
            }
            let value = copy_value(&entry.value, &result.0, PathKey::Key(entry.key.clone()))?;
            result.insert_with_comment(entry.key, value, entry.comment);
        }
        Ok(result)
    }
}

impl Sequence {
    /// A detached copy. Lazy sequences stay lazy.
    pub fn instantiate(&self) -> Result<Sequence> {
        self.instantiate_into(None, None)
    }

    pub(crate) fn instantiate_into(&self, parent: Option<&Container>, key: Option<PathKey>) -> Result<Sequence> {
        let result = Sequence::new();
        result.0.link(parent, key.clone());

        match self.lazy() {
            Some(Lazy::Range { begin, end }) => {
                result.set_lazy(Some(Lazy::Range { begin, end }));
                return Ok(result);
            }
            Some(Lazy::Comprehension { template, driver }) => {
                let template = instantiate_value(&template, None, None)?;
                let driver = driver.instantiate_into(Some(&result.0), None)?;
                result.set_lazy(Some(Lazy::Comprehension { template, driver }));
                return Ok(result);
            }
            None => {}
        }

        if let Some(repetition) = repetition_for(&self.0) {
            if let Some(parent) = parent
                && key == Some(PathKey::Key(repetition.unit_key.clone()))
            {
                self.expand_units(&result, parent, &repetition)?;
                return Ok(result);
            }
            if let Some((reference, indices)) = self.output_template(&repetition)? {
                expand_outputs(&result, parent, &reference, indices, &repetition)?;
                return Ok(result);
            }
        }

        for (n, item) in self.raw_items().into_iter().enumerate() {
            let value = copy_value(&item.value, &result.0, PathKey::Index(n))?;
            result.push_item(Item {
                value,
                comment: item.comment,
            });
        }
        Ok(result)
    }

    /// `parts: [{...}]`: one copy of the single template per element of the
    /// new parent's `i`, each holding its own `i`.
    fn expand_units(&self, result: &Sequence, parent: &Container, repetition: &Repetition) -> Result<()> {
        let Repetition {
            unit_key, index_key, ..
        } = repetition;
        let items = self.raw_items();
        let [template] = items.as_slice() else {
            return Err(shape(
                self.path(),
                format!("`{unit_key}` must hold exactly one template, found {}", items.len()),
            ));
        };
        let Some(unit) = parent.as_mapping() else {
            return Err(shape(self.path(), format!("`{unit_key}` must sit in a mapping")));
        };
        let indices = match unit.lookup(index_key)? {
            Some(Value::Sequence(indices)) => indices.values()?,
            Some(other) => {
                return Err(shape(
                    unit.path(),
                    format!("`{index_key}` must be a sequence, not {}", other.type_name()),
                ));
            }
            None => {
                return Err(shape(
                    unit.path(),
                    format!("`{index_key}` must be defined before `{unit_key}`"),
                ));
            }
        };
        debug!(path = %self.path(), count = indices.len(), "expanding repeated unit");
        for (n, index) in indices.into_iter().enumerate() {
            let copy = copy_value(&template.value, &result.0, PathKey::Index(n))?;
            let Value::Mapping(copy) = copy else {
                return Err(shape(
                    self.path(),
                    format!("the `{unit_key}` template must be a mapping"),
                ));
            };
            copy.insert(index_key.clone(), index);
            result.push_item(Item {
                value: Value::Mapping(copy),
                comment: template.comment.clone(),
            });
        }
        Ok(())
    }

    /// Recognize `output: { name: [$parts[$i]...] }` inside a repeated unit.
    /// Returns the templated reference and the unit's indices.
    fn output_template(&self, repetition: &Repetition) -> Result<Option<(Reference, Vec<Value>)>> {
        let items = self.raw_items();
        let [Item {
            value: Value::Reference(reference),
            ..
        }] = items.as_slice()
        else {
            return Ok(None);
        };
        if !reference.is_recursive() {
            return Ok(None);
        }
        let Some(output) = self.0.parent().filter(|p| p.is_mapping()) else {
            return Ok(None);
        };
        if output.key() != Some(PathKey::Key(repetition.output_key.clone())) {
            return Ok(None);
        }
        let Some(unit) = output.parent().and_then(|p| p.as_mapping()) else {
            return Ok(None);
        };
        if !matches!(unit.get_raw(&repetition.unit_key), Some(Value::Sequence(s)) if !s.is_lazy()) {
            return Ok(None);
        }
        match unit.lookup(&repetition.index_key)? {
            Some(Value::Sequence(indices)) => Ok(Some((reference.clone(), indices.values()?))),
            _ => Err(shape(
                unit.path(),
                format!(
                    "`{}` must be a sequence of indices for `{}`",
                    repetition.index_key, repetition.unit_key
                ),
            )),
        }
    }
}

/// One reference per index, with `[$i]` replaced by the index.
fn expand_outputs(
    result: &Sequence,
    parent: Option<&Container>,
    reference: &Reference,
    indices: Vec<Value>,
    repetition: &Repetition,
) -> Result<()> {
    for (n, index) in indices.into_iter().enumerate() {
        let context = Mapping::new();
        context.0.link(parent, None);
        context.bind(&repetition.index_key, index);
        let location = result.0.child_path(&PathKey::Index(n));
        let resolved = reference.resolve_recursions(&context.0, &location)?;
        result.push_item(Item::new(Value::Reference(resolved)));
    }
    Ok(())
}
