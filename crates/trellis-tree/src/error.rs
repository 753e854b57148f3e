//! Error types.
//!
//! Every failure is an [`Error`], which is one of three kinds: a general
//! configuration error, a format error raised while reading text, or a
//! resolution error raised while evaluating a lazy value.

use std::fmt;

use trellis_tokenizer::Span;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Any configuration error.
#[derive(Debug)]
pub enum Error {
    /// Path lookup failure, merge mismatch, invalid API usage and the like.
    Config(ConfigError),
    /// Lexical or syntactic failure while loading.
    Format(FormatError),
    /// Semantic failure while evaluating a reference or expression.
    Resolution(ResolutionError),
}

impl Error {
    /// Whether this is a format error.
    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format(_))
    }

    /// Whether this is a resolution error.
    pub fn is_resolution(&self) -> bool {
        matches!(self, Error::Resolution(_))
    }

    /// The resolution error kind, if this is a resolution error.
    pub fn resolution_kind(&self) -> Option<&ResolutionErrorKind> {
        match self {
            Error::Resolution(e) => Some(&e.kind),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => e.fmt(f),
            Error::Format(e) => e.fmt(f),
            Error::Resolution(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => Some(e),
            Error::Format(e) => Some(e),
            Error::Resolution(e) => Some(e),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        Error::Format(e)
    }
}

impl From<ResolutionError> for Error {
    fn from(e: ResolutionError) -> Self {
        Error::Resolution(e)
    }
}

/// General configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Nothing lives at this path.
    NotFound { path: String },
    /// The merge policy could not reconcile two values.
    MergeMismatch {
        key: String,
        target: String,
        source: String,
    },
    /// Two loaded streams define the same top-level key.
    KeyClash { key: String },
    /// An `@` include could not be opened or is recursive.
    Include { name: String, reason: String },
    /// Reading a stream failed.
    Io(std::io::Error),
    /// An `extends` entry does not name a mapping. `path` is the entry's path.
    InvalidExtends { path: String, found: String },
    /// A mapping inherits from itself through `extends`.
    CircularExtends { path: String },
    /// A templated repetition or comprehension is not shaped as required.
    Shape { path: String, reason: String },
    /// A path string is not a valid reference path.
    InvalidPath { path: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotFound { path } => write!(f, "no value at `{path}`"),
            ConfigError::MergeMismatch {
                key,
                target,
                source,
            } => write!(f, "unable to merge {target} with {source} at `{key}`"),
            ConfigError::KeyClash { key } => {
                write!(f, "key `{key}` is defined by more than one stream")
            }
            ConfigError::Include { name, reason } => {
                write!(f, "cannot include {name:?}: {reason}")
            }
            ConfigError::Io(e) => write!(f, "i/o error: {e}"),
            ConfigError::InvalidExtends { path, found } => write!(
                f,
                "`{path}` must refer to a mapping, found {found} (missing `$`?)"
            ),
            ConfigError::CircularExtends { path } => write!(f, "`extends` cycle through `{path}`"),
            ConfigError::Shape { path, reason } => write!(f, "at `{path}`: {reason}"),
            ConfigError::InvalidPath { path, reason } => {
                write!(f, "invalid path `{path}`: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Config(ConfigError::Io(e))
    }
}

/// The kind of a format error.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatErrorKind {
    /// A token other than the one the grammar allows here.
    UnexpectedToken { expected: String, found: String },
    /// A quoted string runs to the end of input.
    UnterminatedString,
    /// A character that starts no token.
    InvalidCharacter(String),
    /// A key appears twice in the same mapping.
    DuplicateKey { key: String, original: Span },
    /// A numeric literal that does not fit.
    InvalidNumber(String),
    /// The start of a `[a..b]` range is not an integer literal.
    InvalidRangeStart(String),
}

/// A lexical or syntactic error, with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatError {
    pub kind: FormatErrorKind,
    /// Name of the file being read, `?` when unnamed.
    pub file: String,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
    pub span: Span,
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: ", self.file, self.line, self.column)?;
        match &self.kind {
            FormatErrorKind::UnexpectedToken { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            FormatErrorKind::UnterminatedString => write!(f, "unterminated quoted string"),
            FormatErrorKind::InvalidCharacter(c) => write!(f, "unexpected character {c:?}"),
            FormatErrorKind::DuplicateKey { key, .. } => write!(f, "duplicate key `{key}`"),
            FormatErrorKind::InvalidNumber(text) => write!(f, "invalid number `{text}`"),
            FormatErrorKind::InvalidRangeStart(text) => {
                write!(f, "range must start with an integer or reference, found `{text}`")
            }
        }
    }
}

impl std::error::Error for FormatError {}

/// The kind of a resolution error.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionErrorKind {
    /// No container on the way to the root resolves the reference.
    Unresolved,
    /// The reference is already being resolved.
    Circular,
    /// A sequence index is out of range.
    InvalidIndex { index: i64, len: usize },
    /// No registered namespace resolves the expression.
    NoNamespace,
    /// Operands of the wrong type.
    Type(String),
    /// Division or modulo by zero.
    DivisionByZero,
    /// Integer arithmetic overflowed.
    Overflow,
    /// A namespace function reported a failure.
    Function { name: String, message: String },
}

/// An error raised while evaluating a lazy value.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionError {
    pub kind: ResolutionErrorKind,
    /// The reference or expression being evaluated, in source notation.
    pub target: String,
    /// Path of the value that holds it.
    pub location: String,
}

impl ResolutionError {
    pub fn new(
        kind: ResolutionErrorKind,
        target: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            target: target.into(),
            location: location.into(),
        }
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ResolutionErrorKind::Unresolved => write!(f, "unable to resolve {}", self.target),
            ResolutionErrorKind::Circular => {
                write!(f, "circular reference {}", self.target)
            }
            ResolutionErrorKind::InvalidIndex { index, len } => write!(
                f,
                "index {index} out of range for sequence of length {len} in {}",
                self.target
            ),
            ResolutionErrorKind::NoNamespace => {
                write!(f, "no namespace resolves {}", self.target)
            }
            ResolutionErrorKind::Type(message) => write!(f, "{message} in {}", self.target),
            ResolutionErrorKind::DivisionByZero => {
                write!(f, "division by zero in {}", self.target)
            }
            ResolutionErrorKind::Overflow => write!(f, "integer overflow in {}", self.target),
            ResolutionErrorKind::Function { name, message } => {
                write!(f, "{name}() failed in {}: {message}", self.target)
            }
        }?;
        if !self.location.is_empty() {
            write!(f, " (evaluating `{}`)", self.location)?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolutionError {}
