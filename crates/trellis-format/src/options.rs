//! Formatting options for Trellis serialization.

/// Options for Trellis serialization.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// Indentation string (default: "  " - 2 spaces)
    pub indent: &'static str,

    /// Re-emit `#` comments ahead of their entries (default: true)
    pub comments: bool,

    /// Write nested mappings and sequences on a single line (default: false)
    pub force_inline: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            indent: "  ",
            comments: true,
            force_inline: false,
        }
    }
}

impl FormatOptions {
    /// Create new default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write nested containers inline, comma separated.
    ///
    /// Comments cannot be represented inline and are dropped.
    pub fn inline(mut self) -> Self {
        self.force_inline = true;
        self
    }

    /// Set a custom indentation string.
    pub fn indent(mut self, indent: &'static str) -> Self {
        self.indent = indent;
        self
    }

    /// Drop comments from the output.
    pub fn without_comments(mut self) -> Self {
        self.comments = false;
        self
    }
}
