//! Lazy evaluation: reference resolution and expression evaluation.
//!
//! A placeholder is evaluated relative to the container that holds it. A
//! tree reference is tried against that container first; if any step of
//! the chain misses, the whole chain is retried from the parent, up to the
//! root. Cycles are caught with marks kept on the nearest scope root, and
//! every mark is released on every exit path.

use tracing::debug;
use trellis_tokenizer::{is_word_char, is_word_start};

use crate::container::Container;
use crate::error::{Error, ResolutionError, ResolutionErrorKind, Result};
use crate::expression::{self, Expression};
use crate::mapping::Mapping;
use crate::reference::{Index, Reference, ReferenceKind, Suffix};
use crate::sequence::normalize_index;
use crate::value::Value;

/// One navigation step after the head of a reference.
pub(crate) enum Step {
    Name(String),
    Index(i64),
}

fn resolution_error(kind: ResolutionErrorKind, target: &impl ToString, location: &str) -> Error {
    ResolutionError::new(kind, target.to_string(), location).into()
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(is_word_start) && chars.all(is_word_char)
}

impl Container {
    /// The container placeholders held here are evaluated against.
    /// Sequences defer to their parent.
    pub(crate) fn anchor(&self) -> Container {
        if self.is_sequence() {
            self.scope_parent().unwrap_or_else(|| self.clone())
        } else {
            self.clone()
        }
    }

    /// The nearest ancestor that is not a sequence.
    pub(crate) fn scope_parent(&self) -> Option<Container> {
        self.ancestors().skip(1).find(|c| !c.is_sequence())
    }

    /// The nearest enclosing config, including this node.
    pub(crate) fn nearest_config(&self) -> Option<Container> {
        self.ancestors().find(|c| c.is_config())
    }

    /// Where cycle marks for lookups starting here are kept: the nearest
    /// config, or a mapping accepted by the engine's scope predicate.
    fn scope_root(&self) -> Container {
        let scope = self
            .nearest_config()
            .and_then(|c| c.0.config.as_ref().map(|state| state.scope.clone()))
            .unwrap_or_default();
        let mut last = self.clone();
        for level in self.ancestors() {
            if level.is_config() || level.as_mapping().is_some_and(|m| scope.matches(&m)) {
                return level;
            }
            last = level;
        }
        last
    }

    /// Evaluate a raw value held by this container.
    pub(crate) fn evaluate(&self, raw: Value, location: &str) -> Result<Value> {
        match raw {
            Value::Reference(r) => self.anchor().resolve_reference(&r, location),
            Value::Expression(e) => self.anchor().evaluate_expression(&e, location),
            other => Ok(other),
        }
    }

    /// Resolve `reference` as requested from this container.
    pub(crate) fn resolve_reference(&self, reference: &Reference, location: &str) -> Result<Value> {
        let mut start = self.clone();
        for _ in 0..reference.ups {
            start = start.scope_parent().ok_or_else(|| {
                resolution_error(ResolutionErrorKind::Unresolved, reference, location)
            })?;
        }
        match reference.kind {
            ReferenceKind::Backtick => start.resolve_namespace(reference, self, location),
            ReferenceKind::Dollar => self.resolve_chain(&start, reference, location),
        }
    }

    fn resolve_chain(&self, start: &Container, reference: &Reference, location: &str) -> Result<Value> {
        let root = start.scope_root();
        let mark = format!("{:x}:{reference}", start.identity());
        if !root.mark(&mark) {
            debug!(%reference, location, "circular reference");
            return Err(resolution_error(ResolutionErrorKind::Circular, reference, location));
        }
        let result = start.walk_up(reference, self, location);
        root.unmark(&mark);
        result
    }

    /// Try the whole chain at this level, then at each ancestor. A cycle
    /// met at any level fails the whole lookup.
    fn walk_up(&self, reference: &Reference, requester: &Container, location: &str) -> Result<Value> {
        for level in self.ancestors().filter(|c| !c.is_sequence()) {
            if let Some(value) = level.follow(reference, requester, location)? {
                return Ok(value);
            }
            debug!(%reference, level = %level.path(), "not found, trying parent");
        }
        Err(resolution_error(ResolutionErrorKind::Unresolved, reference, location))
    }

    /// Follow `reference` starting at this container, without walking up.
    /// `Ok(None)` means some step found nothing.
    pub(crate) fn follow(
        &self,
        reference: &Reference,
        requester: &Container,
        location: &str,
    ) -> Result<Option<Value>> {
        let Some(mapping) = self.as_mapping() else {
            return Ok(None);
        };
        let Some(mut current) = mapping.lookup(&reference.head)? else {
            return Ok(None);
        };
        for suffix in &reference.suffix {
            let step = requester.step_for(suffix, reference, location)?;
            match step_into(&current, &step, reference, location)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn step_for(&self, suffix: &Suffix, reference: &Reference, location: &str) -> Result<Step> {
        Ok(match suffix {
            Suffix::Attr(name) => Step::Name(name.clone()),
            Suffix::Index(Index::Int(i)) => Step::Index(*i),
            Suffix::Index(Index::Str(s)) => Step::Name(s.clone()),
            Suffix::Index(Index::Ref(inner)) => match self.resolve_reference(inner, location)? {
                Value::Int(i) => Step::Index(i),
                Value::Str(s) => Step::Name(s),
                other => {
                    return Err(resolution_error(
                        ResolutionErrorKind::Type(format!(
                            "index {inner} must be an integer or string, not {}",
                            other.type_name()
                        )),
                        reference,
                        location,
                    ));
                }
            },
            Suffix::Call(_) => {
                return Err(resolution_error(
                    ResolutionErrorKind::Type("tree values cannot be called".into()),
                    reference,
                    location,
                ));
            }
        })
    }

    fn evaluate_expression(&self, expression: &Expression, location: &str) -> Result<Value> {
        let fail = |kind| resolution_error(kind, expression, location);
        match expression {
            Expression::Binary { op, lhs, rhs } => {
                let lhs = self.evaluate(lhs.as_ref().clone(), location)?;
                let rhs = self.evaluate(rhs.as_ref().clone(), location)?;
                expression::apply(*op, lhs, rhs).map_err(fail)
            }
            Expression::Negate(operand) => {
                let operand = self.evaluate(operand.as_ref().clone(), location)?;
                expression::negate(operand).map_err(fail)
            }
            Expression::Call { function, argument } => {
                let argument = self.evaluate(argument.as_ref().clone(), location)?;
                self.call_function(function, argument, expression, location)
            }
        }
    }

    /// Bind a comprehension template to one iteration. This container is
    /// the iteration's context, holding the loop variable `var`.
    pub(crate) fn bind_template(&self, template: &Value, var: &str) -> Result<Value> {
        let location = self.path();
        match template {
            Value::Reference(r) if r.is_headed_by(var) => self.resolve_reference(r, &location),
            Value::Reference(r) => Ok(Value::Reference(r.resolve_recursions(self, &location)?)),
            Value::Expression(e) => Ok(Value::Expression(
                e.try_map(&mut |operand| self.bind_template(operand, var))?,
            )),
            other => Ok(other.clone()),
        }
    }
}

/// Take one step from an already evaluated value.
fn step_into(value: &Value, step: &Step, reference: &Reference, location: &str) -> Result<Option<Value>> {
    match (value, step) {
        (Value::Mapping(m), Step::Name(name)) => m.lookup(name),
        (Value::Mapping(m), Step::Index(i)) => m.lookup(&i.to_string()),
        (Value::Sequence(s), Step::Name(name)) if name == "length" => {
            let len = s.len()?;
            Ok(Some(Value::Int(i64::try_from(len).unwrap_or(i64::MAX))))
        }
        (Value::Sequence(s), Step::Index(index)) => {
            let len = s.len()?;
            match normalize_index(*index, len) {
                Some(position) => s.value_at(position).map(Some),
                None => Err(resolution_error(
                    ResolutionErrorKind::InvalidIndex { index: *index, len },
                    reference,
                    location,
                )),
            }
        }
        _ => Ok(None),
    }
}

impl Reference {
    /// A copy of this reference with every `[$ref]` index replaced by its
    /// value, resolved against `context`.
    pub(crate) fn resolve_recursions(&self, context: &Container, location: &str) -> Result<Reference> {
        let suffix = self
            .suffix
            .iter()
            .map(|suffix| match suffix {
                Suffix::Index(Index::Ref(inner)) => match context.resolve_reference(inner, location)? {
                    Value::Int(i) => Ok(Suffix::Index(Index::Int(i))),
                    Value::Str(s) if is_identifier(&s) => Ok(Suffix::Attr(s)),
                    Value::Str(s) => Ok(Suffix::Index(Index::Str(s))),
                    other => Err(resolution_error(
                        ResolutionErrorKind::Type(format!(
                            "index {inner} must be an integer or string, not {}",
                            other.type_name()
                        )),
                        self,
                        location,
                    )),
                },
                other => Ok(other.clone()),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Reference {
            suffix,
            ..self.clone()
        })
    }
}

impl Mapping {
    /// Resolve a dotted path such as `a.b[0]["c d"]` from this mapping.
    ///
    /// Unlike a `$` reference the path is not retried from the parents: it
    /// must exist below this mapping.
    pub fn get_by_path(&self, path: &str) -> Result<Value> {
        let reference = crate::parser::parse_path(path)?;
        match self.0.follow(&reference, &self.0, path)? {
            Some(value) => Ok(value),
            None => Err(crate::error::ConfigError::NotFound {
                path: path.to_string(),
            }
            .into()),
        }
    }
}
