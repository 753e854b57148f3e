//! Token types for the Trellis lexer.

use crate::Span;

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Structural tokens
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[` after whitespace or punctuation: starts a sequence
    LBracket,
    /// `[` directly after an identifier or `]`: indexes the previous value
    IndexBracket,
    /// `]`
    RBracket,
    /// `(` after whitespace or punctuation: grouping
    LParen,
    /// `(` directly after an identifier or `]`: a call
    CallParen,
    /// `)`
    RParen,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `|`
    Pipe,
    /// `@`
    At,
    /// `$`
    Dollar,
    /// `` ` ``
    Backtick,

    // Operators
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,

    // Scalar tokens
    /// Identifier: `name`, `_private`, `x2`
    Word,
    /// Numeric literal: `42`, `3.5`, `1e-3`
    Number,
    /// Quoted string: `"..."`, `'...'`, `<...>`, or a triple-quoted form
    String,
    /// `True`
    True,
    /// `False`
    False,
    /// `None`
    None,

    // Trivia
    /// Line comment: `# ...`
    Comment,
    /// Horizontal whitespace: spaces, tabs and carriage returns
    Whitespace,
    /// `\n`
    Newline,

    // Special tokens
    /// End of file
    Eof,
    /// Quoted string with no closing delimiter
    UnterminatedString,
    /// Lexer error (unrecognized input)
    Error,
}

impl TokenKind {
    /// Whether this token is trivia (whitespace or comments).
    pub fn is_trivia(&self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::Newline | TokenKind::Comment
        )
    }

    /// Whether this token is a literal scalar.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::Number
                | TokenKind::String
                | TokenKind::True
                | TokenKind::False
                | TokenKind::None
        )
    }

    /// Whether this token is a lexical error.
    pub fn is_error(&self) -> bool {
        matches!(self, TokenKind::Error | TokenKind::UnterminatedString)
    }

    /// Human-readable description used in diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LBracket | TokenKind::IndexBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LParen | TokenKind::CallParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::Colon => "':'",
            TokenKind::Comma => "','",
            TokenKind::Dot => "'.'",
            TokenKind::Pipe => "'|'",
            TokenKind::At => "'@'",
            TokenKind::Dollar => "'$'",
            TokenKind::Backtick => "'`'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Word => "identifier",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::True => "'True'",
            TokenKind::False => "'False'",
            TokenKind::None => "'None'",
            TokenKind::Comment => "comment",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Newline => "newline",
            TokenKind::Eof => "end of input",
            TokenKind::UnterminatedString => "unterminated string",
            TokenKind::Error => "invalid character",
        }
    }
}

/// A token with its kind, span, and source text slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'src> {
    /// The kind of token.
    pub kind: TokenKind,
    /// The span in the source text.
    pub span: Span,
    /// The source text of this token.
    pub text: &'src str,
}

impl<'src> Token<'src> {
    /// Create a new token.
    pub fn new(kind: TokenKind, span: Span, text: &'src str) -> Self {
        Self { kind, span, text }
    }
}
