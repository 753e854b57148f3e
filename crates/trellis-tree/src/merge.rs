//! Merging one mapping into another under a conflict policy.

use tracing::debug;

use crate::container::PathKey;
use crate::error::{ConfigError, Result};
use crate::instantiate::copy_value;
use crate::mapping::Mapping;
use crate::sequence::{Item, Sequence};
use crate::value::Value;

/// What to do with a key present in both mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// Both values are mappings: merge them recursively.
    Merge,
    /// Both values are sequences: append the source items to the target.
    Append,
    /// Replace the target value with a copy of the source value.
    Overwrite,
    /// Fail with [`ConfigError::MergeMismatch`].
    Mismatch,
}

/// Decides how to reconcile `key`, which both `target` and `source` define.
pub type MergePolicy = dyn Fn(&Mapping, &Mapping, &str) -> Result<MergeAction>;

fn structural(target: &Mapping, source: &Mapping, key: &str) -> Result<MergeAction> {
    Ok(match (target.get(key)?, source.get(key)?) {
        (Value::Mapping(_), Value::Mapping(_)) => MergeAction::Merge,
        (Value::Sequence(_), Value::Sequence(_)) => MergeAction::Append,
        (a, b) if !a.is_container() && !b.is_container() => MergeAction::Overwrite,
        _ => MergeAction::Mismatch,
    })
}

/// Merge mappings, append sequences, let a source scalar replace a target
/// scalar, and reject anything else.
///
/// Both values are evaluated to find their types.
pub fn default_merge_resolve(target: &Mapping, source: &Mapping, key: &str) -> Result<MergeAction> {
    structural(target, source, key)
}

/// Like [`default_merge_resolve`], but the source also wins where a
/// container meets a value of another type.
pub fn overwrite_merge_resolve(target: &Mapping, source: &Mapping, key: &str) -> Result<MergeAction> {
    Ok(match structural(target, source, key)? {
        MergeAction::Mismatch => MergeAction::Overwrite,
        action => action,
    })
}

/// Always overwrite. Nothing is evaluated, so trees holding references
/// that cannot be resolved yet can be merged.
pub fn overwrite_resolve(_target: &Mapping, _source: &Mapping, _key: &str) -> Result<MergeAction> {
    Ok(MergeAction::Overwrite)
}

impl Mapping {
    /// Merge `source` into this mapping. `source` is left unchanged.
    ///
    /// Keys missing here are copied in. Keys defined by both are handled as
    /// `policy` decides.
    pub fn merge(&self, source: &Mapping, policy: &MergePolicy) -> Result<()> {
        for entry in source.entries() {
            let key = entry.key.as_str();
            if !self.contains_key(key) {
                let value = copy_value(&entry.value, &self.0, PathKey::Key(entry.key.clone()))?;
                self.insert_with_comment(key, value, entry.comment);
                continue;
            }

            let action = policy(self, source, key)?;
            debug!(path = %self.0.child_path(&PathKey::Key(entry.key.clone())), ?action, "merging key");
            match action {
                MergeAction::Merge => match (self.get(key)?, source.get(key)?) {
                    (Value::Mapping(target), Value::Mapping(source)) => target.merge(&source, policy)?,
                    (target, source) => return Err(mismatch(key, &target, &source)),
                },
                MergeAction::Append => match (self.get(key)?, source.get(key)?) {
                    (Value::Sequence(target), Value::Sequence(source)) => append(&target, &source)?,
                    (target, source) => return Err(mismatch(key, &target, &source)),
                },
                MergeAction::Overwrite => {
                    let value = copy_value(&entry.value, &self.0, PathKey::Key(entry.key.clone()))?;
                    let comment = entry.comment.or_else(|| self.comment(key));
                    self.insert_with_comment(key, value, comment);
                }
                MergeAction::Mismatch => {
                    return Err(mismatch(key, &self.get(key)?, &source.get(key)?));
                }
            }
        }
        Ok(())
    }
}

fn mismatch(key: &str, target: &Value, source: &Value) -> crate::Error {
    ConfigError::MergeMismatch {
        key: key.to_string(),
        target: target.to_string(),
        source: source.to_string(),
    }
    .into()
}

/// Append copies of the items of `source`, with their comments.
fn append(target: &Sequence, source: &Sequence) -> Result<()> {
    target.materialize()?;
    let offset = target.len()?;
    for (n, item) in source.items()?.into_iter().enumerate() {
        let value = copy_value(&item.value, &target.0, PathKey::Index(offset + n))?;
        target.push_item(Item {
            value,
            comment: item.comment,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn config(source: &str) -> Config {
        Config::parse(source).unwrap()
    }

    #[test]
    fn test_default_policy_merges_mappings() {
        let target = config("a: {x: 1}");
        target.merge(&config("a: {x: 2, y: 3}"), &default_merge_resolve).unwrap();
        assert_eq!(target.get_by_path("a").unwrap().to_string(), "{x: 2, y: 3}");

        let target = config("a: {x: 1, z: 0}");
        let source = config("a: {y: 3}\nb: 'new'");
        target.merge(&source, &default_merge_resolve).unwrap();
        assert_eq!(target.get_by_path("a").unwrap().to_string(), "{x: 1, z: 0, y: 3}");
        assert_eq!(target.get("b").unwrap(), Value::from("new"));
    }

    #[test]
    fn test_overwrite_merge_replaces_mismatched_containers() {
        let target = config("a: {x: 1}\nb: [1]");
        target
            .merge(&config("a: [2]\nb: [2]"), &overwrite_merge_resolve)
            .unwrap();
        assert_eq!(target.get("a").unwrap().to_string(), "[2]");
        assert_eq!(target.get("b").unwrap().to_string(), "[1, 2]");
    }

    #[test]
    fn test_sequences_append_with_comments() {
        let target = config("s: [1, 2]");
        let source = config("s: [\n  # three\n  3\n]");
        target.merge(&source, &default_merge_resolve).unwrap();
        let Value::Sequence(s) = target.get("s").unwrap() else {
            panic!("expected a sequence");
        };
        assert_eq!(s.values().unwrap(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(s.comment(2).as_deref(), Some("three"));
        assert_eq!(source.get_by_path("s.length").unwrap(), Value::Int(1));
    }

    #[test]
    fn test_mapping_with_sequence_is_a_mismatch() {
        let target = config("a: {x: 1}");
        let err = target
            .merge(&config("a: [1]"), &default_merge_resolve)
            .unwrap_err();
        assert_eq!(err.to_string(), "unable to merge {x: 1} with [1] at `a`");
    }

    #[test]
    fn test_overwrite_does_not_evaluate() {
        let target = config("a: $missing\nb: 1");
        let source = config("a: $elsewhere.x\nb: $a");
        target.merge(&source, &overwrite_resolve).unwrap();
        assert_eq!(target.get_raw("a").unwrap().to_string(), "$elsewhere.x");
        assert_eq!(target.get_raw("b").unwrap().to_string(), "$a");
    }

    #[test]
    fn test_copied_references_resolve_in_target() {
        let target = config("n: 10");
        let source = config("n: 1\nm: $n * 2");
        target.merge(&source, &overwrite_resolve).unwrap();
        assert_eq!(target.get("m").unwrap(), Value::Int(2));

        let target = config("n: 10");
        target.merge(&config("m: $n * 2"), &default_merge_resolve).unwrap();
        assert_eq!(target.get("m").unwrap(), Value::Int(20));
    }
}
