#![doc = include_str!("../README.md")]
//! Lazy configuration trees for the Trellis configuration language.
//!
//! This crate parses Trellis text into a tree of mappings and sequences
//! whose references and expressions are evaluated when read, and provides
//! inheritance flattening, merging and serialization.

mod config;
mod container;
mod diagnostic;
mod error;
mod eval;
mod expression;
mod include;
mod instantiate;
mod mapping;
mod merge;
mod namespace;
mod options;
mod parser;
mod reference;
mod sequence;
mod serialize;
mod value;

pub use config::{Config, ConfigList};
pub use container::{Container, PathKey};
pub use error::{
    ConfigError, Error, FormatError, FormatErrorKind, ResolutionError, ResolutionErrorKind, Result,
};
pub use expression::{BinaryOp, Expression};
pub use include::{IncludeKind, IncludeResolver, Included, NoIncludes, SearchPath};
pub use mapping::{Entry, Mapping};
pub use merge::{
    MergeAction, MergePolicy, default_merge_resolve, overwrite_merge_resolve, overwrite_resolve,
};
pub use namespace::{Binding, EnvNamespace, Function, Namespace, ObjectNamespace, default_namespace};
pub use options::{LoadOptions, Repetition, ScopePredicate};
pub use reference::{Index, Reference, ReferenceKind, Suffix};
pub use sequence::{Item, Lazy, Sequence};
pub use serialize::{format_mapping, format_mapping_default, write_mapping};
pub use trellis_format::FormatOptions;
pub use trellis_tokenizer::Span;
pub use value::Value;

#[cfg(test)]
mod tests;
