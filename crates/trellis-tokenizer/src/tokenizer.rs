//! Tokenizer for the Trellis configuration language.

use crate::{Span, Token, TokenKind};
use tracing::trace;

/// A tokenizer that produces tokens from Trellis source text.
///
/// Tokenizing never fails: unrecognized characters and unterminated strings
/// come out as [`TokenKind::Error`] and [`TokenKind::UnterminatedString`]
/// tokens, and it is up to the parser to report them.
#[derive(Clone)]
pub struct Tokenizer<'src> {
    /// The source text being tokenized.
    source: &'src str,
    /// The remaining source text (suffix of `source`).
    remaining: &'src str,
    /// Current byte position in `source`.
    pos: u32,
}

impl<'src> Tokenizer<'src> {
    /// Create a new tokenizer for the given source text.
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            remaining: source,
            pos: 0,
        }
    }

    /// Get the current byte position.
    #[inline]
    pub fn position(&self) -> u32 {
        self.pos
    }

    /// Check if we're at the end of input.
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Peek at the next character without consuming it.
    #[inline]
    fn peek(&self) -> Option<char> {
        self.remaining.chars().next()
    }

    /// Peek at the nth character (0-indexed) without consuming.
    #[inline]
    fn peek_nth(&self, n: usize) -> Option<char> {
        self.remaining.chars().nth(n)
    }

    /// The character just before the current position, if any.
    #[inline]
    fn previous(&self) -> Option<char> {
        self.source[..self.pos as usize].chars().next_back()
    }

    /// Advance by one character and return it.
    #[inline]
    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8() as u32;
        self.remaining = &self.remaining[c.len_utf8()..];
        Some(c)
    }

    /// Advance by n bytes.
    #[inline]
    fn advance_by(&mut self, n: usize) {
        self.pos += n as u32;
        self.remaining = &self.remaining[n..];
    }

    /// Check if the remaining text starts with the given prefix.
    #[inline]
    fn starts_with(&self, prefix: &str) -> bool {
        self.remaining.starts_with(prefix)
    }

    /// Create a token from the given start position to current position.
    fn token(&self, kind: TokenKind, start: u32) -> Token<'src> {
        let span = Span::new(start, self.pos);
        let text = &self.source[start as usize..self.pos as usize];
        trace!("Token {:?} at {:?}: {:?}", kind, span, text);
        Token::new(kind, span, text)
    }

    /// Consume one character and produce a token of the given kind.
    fn single(&mut self, kind: TokenKind) -> Token<'src> {
        let start = self.pos;
        self.advance();
        self.token(kind, start)
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Token<'src> {
        let Some(c) = self.peek() else {
            return self.token(TokenKind::Eof, self.pos);
        };

        match c {
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            ']' => self.single(TokenKind::RBracket),
            ')' => self.single(TokenKind::RParen),
            '[' if self.follows_value() => self.single(TokenKind::IndexBracket),
            '[' => self.single(TokenKind::LBracket),
            '(' if self.follows_value() => self.single(TokenKind::CallParen),
            '(' => self.single(TokenKind::LParen),
            ':' => self.single(TokenKind::Colon),
            ',' => self.single(TokenKind::Comma),
            '.' => self.single(TokenKind::Dot),
            '|' => self.single(TokenKind::Pipe),
            '@' => self.single(TokenKind::At),
            '$' => self.single(TokenKind::Dollar),
            '`' => self.single(TokenKind::Backtick),
            '+' => self.single(TokenKind::Plus),
            '-' => self.single(TokenKind::Minus),
            '*' => self.single(TokenKind::Star),
            '/' => self.single(TokenKind::Slash),
            '%' => self.single(TokenKind::Percent),

            '"' | '\'' | '<' => self.tokenize_string(c),

            '#' => self.tokenize_comment(),

            ' ' | '\t' | '\r' => self.tokenize_whitespace(),
            '\n' => self.single(TokenKind::Newline),

            _ if c.is_ascii_digit() => self.tokenize_number(),
            _ if is_word_start(c) => self.tokenize_word(),

            // Error: unrecognized character
            _ => self.single(TokenKind::Error),
        }
    }

    /// Whether a bracket at the current position indexes the preceding value.
    fn follows_value(&self) -> bool {
        matches!(self.previous(), Some(c) if c == ']' || is_word_char(c))
    }

    /// Tokenize horizontal whitespace.
    fn tokenize_whitespace(&mut self) -> Token<'src> {
        let start = self.pos;
        while let Some(' ' | '\t' | '\r') = self.peek() {
            self.advance();
        }
        self.token(TokenKind::Whitespace, start)
    }

    /// Tokenize a line comment: `# ...`.
    fn tokenize_comment(&mut self) -> Token<'src> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
        self.token(TokenKind::Comment, start)
    }

    /// Tokenize an identifier, recognizing `True`, `False` and `None`.
    fn tokenize_word(&mut self) -> Token<'src> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_word_char(c) {
                self.advance();
            } else {
                break;
            }
        }
        let kind = match &self.source[start as usize..self.pos as usize] {
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            _ => TokenKind::Word,
        };
        self.token(kind, start)
    }

    /// Tokenize a number: digits, an optional fraction and an optional
    /// signed exponent.
    ///
    /// A `.` only belongs to the number when a digit follows it, so `1..3`
    /// lexes as a number, two dots and a number.
    fn tokenize_number(&mut self) -> Token<'src> {
        let start = self.pos;
        self.consume_digits();

        if self.peek() == Some('.') && matches!(self.peek_nth(1), Some(c) if c.is_ascii_digit()) {
            self.advance();
            self.consume_digits();
        }

        if let Some('e' | 'E') = self.peek() {
            let exponent_len = match (self.peek_nth(1), self.peek_nth(2)) {
                (Some(d), _) if d.is_ascii_digit() => Some(1),
                (Some('+' | '-'), Some(d)) if d.is_ascii_digit() => Some(2),
                _ => None,
            };
            if let Some(len) = exponent_len {
                self.advance_by(len);
                self.consume_digits();
            }
        }

        self.token(TokenKind::Number, start)
    }

    fn consume_digits(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Tokenize a quoted string.
    ///
    /// `'` and `"` close with themselves, `<` closes with `>`. Tripling the
    /// opening delimiter starts a multiline string that ends at the matching
    /// unescaped triple. Backslash escapes the next character in both forms.
    fn tokenize_string(&mut self, open: char) -> Token<'src> {
        let start = self.pos;
        let close = if open == '<' { '>' } else { open };
        let triple_open: String = std::iter::repeat_n(open, 3).collect();
        let triple = self.starts_with(&triple_open);

        if triple {
            self.advance_by(3);
        } else {
            self.advance();
        }

        loop {
            match self.peek() {
                None => return self.token(TokenKind::UnterminatedString, start),
                Some('\\') => {
                    self.advance();
                    self.advance();
                }
                Some(c) if c == close => {
                    if !triple {
                        self.advance();
                        break;
                    }
                    if self.peek_nth(1) == Some(close) && self.peek_nth(2) == Some(close) {
                        self.advance_by(3);
                        break;
                    }
                    self.advance();
                }
                Some(_) => {
                    self.advance();
                }
            }
        }

        self.token(TokenKind::String, start)
    }
}

impl<'src> Iterator for Tokenizer<'src> {
    type Item = Token<'src>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            None
        } else {
            Some(token)
        }
    }
}

/// Check if a character can start an identifier.
pub fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

/// Check if a character can continue an identifier.
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(source: &str) -> Vec<(TokenKind, &str)> {
        Tokenizer::new(source).map(|t| (t.kind, t.text)).collect()
    }

    fn significant(source: &str) -> Vec<(TokenKind, &str)> {
        Tokenizer::new(source)
            .filter(|t| !t.kind.is_trivia())
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_punctuation_tokens() {
        assert_eq!(tokenize("{"), vec![(TokenKind::LBrace, "{")]);
        assert_eq!(tokenize("}"), vec![(TokenKind::RBrace, "}")]);
        assert_eq!(tokenize("["), vec![(TokenKind::LBracket, "[")]);
        assert_eq!(tokenize("]"), vec![(TokenKind::RBracket, "]")]);
        assert_eq!(tokenize("("), vec![(TokenKind::LParen, "(")]);
        assert_eq!(tokenize(":"), vec![(TokenKind::Colon, ":")]);
        assert_eq!(tokenize("|"), vec![(TokenKind::Pipe, "|")]);
        assert_eq!(tokenize("@"), vec![(TokenKind::At, "@")]);
        assert_eq!(tokenize("$"), vec![(TokenKind::Dollar, "$")]);
        assert_eq!(tokenize("`"), vec![(TokenKind::Backtick, "`")]);
        assert_eq!(tokenize("%"), vec![(TokenKind::Percent, "%")]);
    }

    #[test]
    fn test_words_and_keywords() {
        assert_eq!(tokenize("hello"), vec![(TokenKind::Word, "hello")]);
        assert_eq!(tokenize("_x9"), vec![(TokenKind::Word, "_x9")]);
        assert_eq!(tokenize("True"), vec![(TokenKind::True, "True")]);
        assert_eq!(tokenize("False"), vec![(TokenKind::False, "False")]);
        assert_eq!(tokenize("None"), vec![(TokenKind::None, "None")]);
        assert_eq!(tokenize("true"), vec![(TokenKind::Word, "true")]);
        assert_eq!(tokenize("Nonesuch"), vec![(TokenKind::Word, "Nonesuch")]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(tokenize("42"), vec![(TokenKind::Number, "42")]);
        assert_eq!(tokenize("3.25"), vec![(TokenKind::Number, "3.25")]);
        assert_eq!(tokenize("1e10"), vec![(TokenKind::Number, "1e10")]);
        assert_eq!(tokenize("2.5E-3"), vec![(TokenKind::Number, "2.5E-3")]);
        assert_eq!(tokenize("7e+2"), vec![(TokenKind::Number, "7e+2")]);
    }

    #[test]
    fn test_range_dots_are_not_fractions() {
        assert_eq!(
            tokenize("1..3"),
            vec![
                (TokenKind::Number, "1"),
                (TokenKind::Dot, "."),
                (TokenKind::Dot, "."),
                (TokenKind::Number, "3"),
            ]
        );
    }

    #[test]
    fn test_exponent_needs_digits() {
        assert_eq!(
            tokenize("3e"),
            vec![(TokenKind::Number, "3"), (TokenKind::Word, "e")]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            tokenize(r#""hello world""#),
            vec![(TokenKind::String, r#""hello world""#)]
        );
        assert_eq!(tokenize("'single'"), vec![(TokenKind::String, "'single'")]);
        assert_eq!(tokenize("<angle>"), vec![(TokenKind::String, "<angle>")]);
        assert_eq!(
            tokenize(r#""with \"escapes\"""#),
            vec![(TokenKind::String, r#""with \"escapes\"""#)]
        );
    }

    #[test]
    fn test_triple_quoted_strings() {
        assert_eq!(
            tokenize("'''line one\nline 'two'\n'''"),
            vec![(TokenKind::String, "'''line one\nline 'two'\n'''")]
        );
        assert_eq!(
            tokenize("<<<a > b>>>"),
            vec![(TokenKind::String, "<<<a > b>>>")]
        );
        assert_eq!(
            tokenize("'''it''s'''"),
            vec![(TokenKind::String, "'''it''s'''")]
        );
        // An escaped quote cannot start the closing triple.
        assert_eq!(
            tokenize(r"'''a\''''' b'"),
            vec![
                (TokenKind::String, r"'''a\''''"),
                (TokenKind::String, "' b'"),
            ]
        );
    }

    #[test]
    fn test_empty_string_is_not_triple() {
        assert_eq!(
            tokenize("'' x"),
            vec![
                (TokenKind::String, "''"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Word, "x"),
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = tokenize("\"hello");
        assert_eq!(tokens, vec![(TokenKind::UnterminatedString, "\"hello")]);
        let tokens = tokenize("'''open\nstill open''");
        assert_eq!(tokens[0].0, TokenKind::UnterminatedString);
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            tokenize("# comment\nx"),
            vec![
                (TokenKind::Comment, "# comment"),
                (TokenKind::Newline, "\n"),
                (TokenKind::Word, "x"),
            ]
        );
    }

    #[test]
    fn test_whitespace() {
        assert_eq!(tokenize("  \t"), vec![(TokenKind::Whitespace, "  \t")]);
        assert_eq!(
            tokenize("\r\n"),
            vec![(TokenKind::Whitespace, "\r"), (TokenKind::Newline, "\n")]
        );
    }

    #[test]
    fn test_index_brackets_follow_values() {
        assert_eq!(
            significant("$a[0][1]"),
            vec![
                (TokenKind::Dollar, "$"),
                (TokenKind::Word, "a"),
                (TokenKind::IndexBracket, "["),
                (TokenKind::Number, "0"),
                (TokenKind::RBracket, "]"),
                (TokenKind::IndexBracket, "["),
                (TokenKind::Number, "1"),
                (TokenKind::RBracket, "]"),
            ]
        );
        assert_eq!(
            significant("a: [1]"),
            vec![
                (TokenKind::Word, "a"),
                (TokenKind::Colon, ":"),
                (TokenKind::LBracket, "["),
                (TokenKind::Number, "1"),
                (TokenKind::RBracket, "]"),
            ]
        );
    }

    #[test]
    fn test_call_paren_follows_identifier() {
        assert_eq!(
            significant("${len($x)}"),
            vec![
                (TokenKind::Dollar, "$"),
                (TokenKind::LBrace, "{"),
                (TokenKind::Word, "len"),
                (TokenKind::CallParen, "("),
                (TokenKind::Dollar, "$"),
                (TokenKind::Word, "x"),
                (TokenKind::RParen, ")"),
                (TokenKind::RBrace, "}"),
            ]
        );
        assert_eq!(significant("x * (1)")[2], (TokenKind::LParen, "("));
    }

    #[test]
    fn test_unrecognized_character() {
        assert_eq!(tokenize("?"), vec![(TokenKind::Error, "?")]);
        assert!(tokenize("a ; b").iter().any(|t| t.0 == TokenKind::Error));
    }
}
