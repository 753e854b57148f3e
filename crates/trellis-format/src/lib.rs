//! Core formatting utilities for Trellis.
//!
//! This crate provides the low-level building blocks for writing Trellis
//! text: scalar quoting and escaping, and a structured writer that handles
//! indentation, comments and separators. It knows nothing about the
//! configuration tree itself; `trellis-tree` drives it when saving.

mod options;
mod scalar;
mod writer;

pub use options::FormatOptions;
pub use scalar::{can_be_bare, escape_quoted, format_float, quote, unescape_quoted};
pub use writer::{TrellisWriter, WriterError};
