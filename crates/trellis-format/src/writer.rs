//! Low-level Trellis output writer.
//!
//! Provides a structured way to build Trellis output with proper formatting,
//! independent of the configuration tree.

use crate::options::FormatOptions;
use crate::scalar::{can_be_bare, format_float, quote};

/// Context for tracking serialization state.
#[derive(Debug, Clone)]
enum Context {
    /// Inside a mapping - tracks if we've written any entries
    Mapping { first: bool, is_root: bool },
    /// Inside a sequence - tracks if we've written any items
    Seq { first: bool },
}

/// Misuse of the writer's begin/end protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterError {
    /// `field_key` outside of a mapping.
    KeyOutsideMapping,
    /// `end_mapping` without a matching `begin_mapping`.
    UnbalancedMapping,
    /// `end_seq` without a matching `begin_seq`.
    UnbalancedSequence,
}

impl std::fmt::Display for WriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterError::KeyOutsideMapping => write!(f, "field key written outside of a mapping"),
            WriterError::UnbalancedMapping => write!(f, "end of mapping without a matching begin"),
            WriterError::UnbalancedSequence => {
                write!(f, "end of sequence without a matching begin")
            }
        }
    }
}

impl std::error::Error for WriterError {}

/// Low-level Trellis output writer.
///
/// Nested mappings and sequences are written one entry per line and
/// indented one level, unless [`FormatOptions::force_inline`] is set.
/// The root mapping has no braces.
pub struct TrellisWriter {
    out: String,
    stack: Vec<Context>,
    options: FormatOptions,
    /// Comment to emit before the next entry or item.
    pending_comment: Option<String>,
}

impl Default for TrellisWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl TrellisWriter {
    /// Create a new writer with default options.
    pub fn new() -> Self {
        Self::with_options(FormatOptions::default())
    }

    /// Create a new writer with the given options.
    pub fn with_options(options: FormatOptions) -> Self {
        Self {
            out: String::new(),
            stack: Vec::new(),
            options,
            pending_comment: None,
        }
    }

    /// Consume the writer and return the output.
    pub fn finish_string(self) -> String {
        self.out
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Effective indentation depth (the root mapping doesn't indent).
    fn indent_depth(&self) -> usize {
        self.stack
            .iter()
            .filter(|ctx| !matches!(ctx, Context::Mapping { is_root: true, .. }))
            .count()
    }

    fn inline(&self) -> bool {
        self.options.force_inline
            && !matches!(self.stack.last(), Some(Context::Mapping { is_root: true, .. }))
    }

    /// Write indentation for the current depth.
    fn write_indent(&mut self) {
        for _ in 0..self.indent_depth() {
            self.out.push_str(self.options.indent);
        }
    }

    /// Write a newline and indentation.
    fn write_newline_indent(&mut self) {
        self.out.push('\n');
        self.write_indent();
    }

    /// Attach a comment to the next entry or sequence item.
    pub fn comment(&mut self, text: &str) {
        if self.options.comments {
            self.pending_comment = Some(text.to_string());
        }
    }

    /// Start a new line for the next element of the current container and
    /// flush the pending comment.
    fn start_element(&mut self) {
        let (first, is_root) = match self.stack.last_mut() {
            Some(Context::Mapping { first, is_root }) => {
                let was_first = *first;
                *first = false;
                (was_first, *is_root)
            }
            Some(Context::Seq { first }) => {
                let was_first = *first;
                *first = false;
                (was_first, false)
            }
            None => return,
        };

        let comment = self.pending_comment.take();
        if self.inline() {
            if !first {
                self.out.push_str(", ");
            }
            return;
        }

        if !(first && is_root) {
            if is_root {
                self.out.push('\n');
            } else {
                self.write_newline_indent();
            }
        }
        if let Some(comment) = comment {
            for line in comment.lines() {
                if line.is_empty() {
                    self.out.push('#');
                } else {
                    self.out.push_str("# ");
                    self.out.push_str(line);
                }
                self.write_newline_indent();
            }
        }
    }

    /// Called before every value: positions sequence items on their own line.
    fn before_value(&mut self) {
        if let Some(Context::Seq { .. }) = self.stack.last() {
            self.start_element();
        }
    }

    /// Begin a mapping.
    ///
    /// If `is_root` is true, no braces are written (implicit root mapping).
    pub fn begin_mapping(&mut self, is_root: bool) {
        if !is_root {
            self.before_value();
            self.out.push('{');
        }
        self.stack.push(Context::Mapping {
            first: true,
            is_root,
        });
    }

    /// Write a mapping key, quoting it when it cannot be bare.
    pub fn field_key(&mut self, key: &str) -> Result<(), WriterError> {
        if !matches!(self.stack.last(), Some(Context::Mapping { .. })) {
            return Err(WriterError::KeyOutsideMapping);
        }
        self.start_element();
        if can_be_bare(key) {
            self.out.push_str(key);
        } else {
            self.out.push_str(&quote(key));
        }
        self.out.push_str(": ");
        Ok(())
    }

    /// End a mapping.
    pub fn end_mapping(&mut self) -> Result<(), WriterError> {
        let inline = self.inline();
        match self.stack.pop() {
            Some(Context::Mapping { first, is_root }) => {
                if is_root {
                    if !first {
                        self.out.push('\n');
                    }
                } else {
                    if !first && !inline {
                        self.write_newline_indent();
                    }
                    self.out.push('}');
                }
                Ok(())
            }
            _ => Err(WriterError::UnbalancedMapping),
        }
    }

    /// Begin a sequence.
    pub fn begin_seq(&mut self) {
        self.before_value();
        self.out.push('[');
        self.stack.push(Context::Seq { first: true });
    }

    /// End a sequence.
    pub fn end_seq(&mut self) -> Result<(), WriterError> {
        let inline = self.inline();
        match self.stack.pop() {
            Some(Context::Seq { first }) => {
                if !first && !inline {
                    self.write_newline_indent();
                }
                self.out.push(']');
                Ok(())
            }
            _ => Err(WriterError::UnbalancedSequence),
        }
    }

    /// Write `None`.
    pub fn write_none(&mut self) {
        self.before_value();
        self.out.push_str("None");
    }

    /// Write a boolean value.
    pub fn write_bool(&mut self, v: bool) {
        self.before_value();
        self.out.push_str(if v { "True" } else { "False" });
    }

    /// Write an i64 value.
    pub fn write_i64(&mut self, v: i64) {
        self.before_value();
        self.out.push_str(&v.to_string());
    }

    /// Write an f64 value.
    pub fn write_f64(&mut self, v: f64) {
        self.before_value();
        self.out.push_str(&format_float(v));
    }

    /// Write a string value, always quoted.
    pub fn write_string(&mut self, s: &str) {
        self.before_value();
        self.out.push_str(&quote(s));
    }

    /// Write a value already rendered in source notation, such as a
    /// reference, an expression or a lazy sequence.
    pub fn write_source(&mut self, text: &str) {
        self.before_value();
        self.out.push_str(text);
    }
}
