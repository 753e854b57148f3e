//! Recursive-descent parser from tokens to a configuration tree.
//!
//! The parser reads one token ahead. References and expressions are stored
//! unevaluated; nothing is resolved while parsing.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;
use trellis_format::unescape_quoted;
use trellis_tokenizer::{Position, Span, Token, TokenKind, Tokenizer};

use crate::config::{Config, ConfigState};
use crate::container::Container;
use crate::error::{ConfigError, Error, FormatError, FormatErrorKind, Result};
use crate::expression::{BinaryOp, Expression};
use crate::include::IncludeKind;
use crate::mapping::Mapping;
use crate::options::LoadOptions;
use crate::reference::{Index, Reference, ReferenceKind, Suffix};
use crate::sequence::{Item, Sequence};
use crate::value::Value;

/// Parse `source` and insert its entries into `target`.
///
/// `stack` lists the files currently being included, outermost first.
pub(crate) fn parse_into(
    target: &Mapping,
    source: &str,
    options: &LoadOptions,
    stack: &[PathBuf],
) -> Result<()> {
    let mut parser = Parser::new(source, options, stack);
    parser.parse_mapping_body(target, TokenKind::Eof)?;
    parser.expect(TokenKind::Eof, "key")?;
    Ok(())
}

/// Parse a path such as `a.b[0]["c d"]` into a reference.
pub(crate) fn parse_path(path: &str) -> Result<Reference> {
    let invalid = |reason: String| -> Error {
        ConfigError::InvalidPath {
            path: path.to_string(),
            reason,
        }
        .into()
    };
    let options = LoadOptions::default();
    let mut parser = Parser::new(path, &options, &[]);
    let reference = parser
        .parse_reference(ReferenceKind::Dollar)
        .map_err(|e| invalid(e.to_string()))?;
    if parser.peek() != TokenKind::Eof {
        return Err(invalid(format!("unexpected {}", parser.describe_current())));
    }
    if reference.ups > 0 {
        return Err(invalid("a path cannot start with `_`".into()));
    }
    Ok(reference)
}

/// Strip the delimiters of a string token and unescape its content.
fn string_content(text: &str) -> String {
    let open = text.chars().next().unwrap_or('"');
    let close = if open == '<' { '>' } else { open };
    let tripled: String = std::iter::repeat_n(open, 3).collect();
    let closing: String = std::iter::repeat_n(close, 3).collect();
    let inner = if text.len() >= 6 && text.starts_with(&tripled) && text.ends_with(&closing) {
        &text[3..text.len() - 3]
    } else {
        let start = open.len_utf8().min(text.len());
        let end = text.len().saturating_sub(close.len_utf8()).max(start);
        &text[start..end]
    };
    unescape_quoted(inner).into_owned()
}

fn comment_text(text: &str) -> String {
    let text = text.strip_prefix('#').unwrap_or(text);
    text.strip_prefix(' ').unwrap_or(text).trim_end().to_string()
}

struct Parser<'src, 'opt> {
    source: &'src str,
    tokens: Tokenizer<'src>,
    current: Token<'src>,
    /// Most recent comment seen before `current`.
    comment: Option<String>,
    /// `current` is the first token on its line.
    line_start: bool,
    /// Parsing the elements of a sequence, outside any nested braces or
    /// parentheses.
    in_sequence: bool,
    options: &'opt LoadOptions,
    stack: &'opt [PathBuf],
}

impl<'src, 'opt> Parser<'src, 'opt> {
    fn new(source: &'src str, options: &'opt LoadOptions, stack: &'opt [PathBuf]) -> Self {
        let mut parser = Self {
            source,
            tokens: Tokenizer::new(source),
            current: Token::new(TokenKind::Eof, Span::empty(0), ""),
            comment: None,
            line_start: true,
            in_sequence: false,
            options,
            stack,
        };
        parser.advance();
        parser
    }

    fn peek(&self) -> TokenKind {
        self.current.kind
    }

    /// Move to the next significant token and return the one left behind.
    fn advance(&mut self) -> Token<'src> {
        self.line_start = false;
        loop {
            let token = self.tokens.next_token();
            match token.kind {
                TokenKind::Comment => self.comment = Some(comment_text(token.text)),
                TokenKind::Newline => self.line_start = true,
                kind if kind.is_trivia() => {}
                _ => return std::mem::replace(&mut self.current, token),
            }
        }
    }

    /// The kind of the token after `current`.
    fn peek_second(&self) -> TokenKind {
        let mut tokens = self.tokens.clone();
        loop {
            let kind = tokens.next_token().kind;
            if !kind.is_trivia() {
                return kind;
            }
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token<'src>> {
        if self.peek() == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn error(&self, kind: FormatErrorKind, span: Span) -> Error {
        let Position { line, column } = span.position(self.source);
        FormatError {
            kind,
            file: self.options.display_name(),
            line,
            column,
            span,
        }
        .into()
    }

    fn describe_current(&self) -> String {
        match self.peek() {
            TokenKind::Word | TokenKind::Number | TokenKind::String => {
                format!("{} `{}`", self.peek().describe(), self.current.text)
            }
            kind => kind.describe().to_string(),
        }
    }

    /// The error for the current token when `expected` was wanted.
    fn unexpected(&self, expected: &str) -> Error {
        let kind = match self.peek() {
            TokenKind::UnterminatedString => FormatErrorKind::UnterminatedString,
            TokenKind::Error => FormatErrorKind::InvalidCharacter(self.current.text.to_string()),
            _ => FormatErrorKind::UnexpectedToken {
                expected: expected.to_string(),
                found: self.describe_current(),
            },
        };
        self.error(kind, self.current.span)
    }

    /// Run `parse` with `in_sequence` set, restoring it afterwards.
    fn nested<T>(&mut self, in_sequence: bool, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let outer = std::mem::replace(&mut self.in_sequence, in_sequence);
        let result = parse(self);
        self.in_sequence = outer;
        result
    }

    fn parse_mapping_body(&mut self, target: &Mapping, closer: TokenKind) -> Result<()> {
        let expected = if closer == TokenKind::Eof {
            "key"
        } else {
            "key or '}'"
        };
        let mut seen: HashMap<String, Span> = HashMap::new();
        while self.peek() != closer {
            let comment = self.comment.take();
            let (key, span) = self.parse_key(expected)?;
            if let Some(original) = seen.get(&key) {
                return Err(self.error(
                    FormatErrorKind::DuplicateKey {
                        key,
                        original: *original,
                    },
                    span,
                ));
            }
            seen.insert(key.clone(), span);
            let value = if self.eat(TokenKind::Colon) {
                self.parse_value()?
            } else {
                Value::Bool(true)
            };
            target.insert_with_comment(key, value, comment);
            self.eat(TokenKind::Comma);
        }
        Ok(())
    }

    fn parse_key(&mut self, expected: &str) -> Result<(String, Span)> {
        let token = &self.current;
        let key = match token.kind {
            TokenKind::Word => token.text.to_string(),
            TokenKind::String => string_content(token.text),
            TokenKind::Number if token.text.bytes().all(|b| b.is_ascii_digit()) => {
                token.text.to_string()
            }
            _ => return Err(self.unexpected(expected)),
        };
        let span = token.span;
        self.advance();
        Ok((key, span))
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.peek() {
            TokenKind::LBracket => self.parse_sequence(),
            TokenKind::LBrace => {
                self.advance();
                let mapping = Mapping::new();
                self.nested(false, |p| p.parse_mapping_body(&mapping, TokenKind::RBrace))?;
                self.expect(TokenKind::RBrace, "key or '}'")?;
                self.comment = None;
                Ok(Value::Mapping(mapping))
            }
            TokenKind::At => self.parse_include(),
            _ => self.parse_expr(),
        }
    }

    fn parse_sequence(&mut self) -> Result<Value> {
        self.advance();
        self.nested(true, Self::parse_sequence_items)
    }

    /// The rest of a sequence after its `[`.
    fn parse_sequence_items(&mut self) -> Result<Value> {
        let sequence = Sequence::new();
        if self.eat(TokenKind::RBracket) {
            return Ok(Value::Sequence(sequence));
        }

        let comment = self.comment.take();
        let first_span = self.current.span;
        let first = self.parse_value()?;

        if self.peek() == TokenKind::Dot {
            self.advance();
            self.expect(TokenKind::Dot, "'..'")?;
            if !matches!(first, Value::Int(_) | Value::Reference(_) | Value::Expression(_)) {
                return Err(self.error(FormatErrorKind::InvalidRangeStart(first.to_string()), first_span));
            }
            let end = self.parse_expr()?;
            self.expect(TokenKind::RBracket, "']'")?;
            return Ok(Value::Sequence(Sequence::range(first, end)));
        }

        if self.eat(TokenKind::Pipe) {
            let driver = Mapping::new();
            let (key, _) = self.parse_key("variable name")?;
            self.expect(TokenKind::Colon, "':'")?;
            let values = self.parse_value()?;
            driver.insert(key, values);
            self.expect(TokenKind::RBracket, "']'")?;
            return Ok(Value::Sequence(Sequence::comprehension(first, driver)));
        }

        sequence.push_item(Item {
            value: first,
            comment,
        });
        self.eat(TokenKind::Comma);
        while self.peek() != TokenKind::RBracket {
            if self.peek() == TokenKind::Eof {
                return Err(self.unexpected("value or ']'"));
            }
            let comment = self.comment.take();
            let value = self.parse_value()?;
            sequence.push_item(Item { value, comment });
            self.eat(TokenKind::Comma);
        }
        self.advance();
        self.comment = None;
        Ok(Value::Sequence(sequence))
    }

    fn parse_include(&mut self) -> Result<Value> {
        self.advance();
        let token = self.expect(TokenKind::String, "quoted file name")?;
        let name = string_content(token.text);
        let kind = if token.text.starts_with('<') {
            IncludeKind::Global
        } else {
            IncludeKind::Relative
        };
        let include_error = |reason: String| -> Error {
            ConfigError::Include {
                name: name.clone(),
                reason,
            }
            .into()
        };

        let current = self.options.path.as_deref();
        let mut included = self
            .options
            .resolver
            .resolve(kind, &name, current)
            .map_err(|e| include_error(e.to_string()))?;
        let recursive = included.path.as_deref().is_some_and(|path| {
            self.stack
                .iter()
                .map(PathBuf::as_path)
                .chain(current)
                .any(|p| same_file(p, path))
        });
        if recursive {
            return Err(include_error("recursive include".into()));
        }
        let mut text = String::new();
        included
            .reader
            .read_to_string(&mut text)
            .map_err(|e| include_error(e.to_string()))?;
        debug!(%name, ?kind, path = ?included.path, "including");

        let mut stack = self.stack.to_vec();
        stack.extend(current.map(Path::to_path_buf));
        let mut options = self.options.clone();
        options.path = included.path.clone();

        let state = ConfigState::new(options.scope.clone(), options.repetition.clone());
        let nested = Config::from_container(Container::new_mapping(Some(state)));
        parse_into(&nested, &text, &options, &stack)?;
        Ok(Value::Mapping(nested.mapping().clone()))
    }

    fn parse_expr(&mut self) -> Result<Value> {
        let mut lhs = self.parse_term()?;
        loop {
            // In a sequence, a line starting with `-` is a new negative value.
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus if !(self.line_start && self.in_sequence) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Value::Expression(Expression::binary(op, lhs, rhs));
        }
    }

    fn parse_term(&mut self) -> Result<Value> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_factor()?;
            lhs = Value::Expression(Expression::binary(op, lhs, rhs));
        }
    }

    fn parse_factor(&mut self) -> Result<Value> {
        match self.peek() {
            TokenKind::Number => {
                let token = self.advance();
                self.parse_number(&token)
            }
            TokenKind::String => Ok(Value::Str(string_content(self.advance().text))),
            TokenKind::True => {
                self.advance();
                Ok(Value::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Value::Bool(false))
            }
            TokenKind::None => {
                self.advance();
                Ok(Value::None)
            }
            TokenKind::LParen | TokenKind::CallParen => {
                self.advance();
                let inner = self.nested(false, Self::parse_expr)?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Minus => {
                self.advance();
                Ok(match self.parse_factor()? {
                    Value::Int(i) => Value::Int(-i),
                    Value::Float(f) => Value::Float(-f),
                    operand => Value::Expression(Expression::Negate(Box::new(operand))),
                })
            }
            TokenKind::Dollar => {
                self.advance();
                if self.eat(TokenKind::LBrace) {
                    self.parse_call()
                } else {
                    Ok(Value::Reference(self.parse_reference(ReferenceKind::Dollar)?))
                }
            }
            TokenKind::Backtick => {
                self.advance();
                let reference = self.parse_reference(ReferenceKind::Backtick)?;
                self.expect(TokenKind::Backtick, "'`'")?;
                Ok(Value::Reference(reference))
            }
            _ => Err(self.unexpected("value")),
        }
    }

    fn parse_number(&self, token: &Token<'src>) -> Result<Value> {
        let text = token.text;
        let invalid = || self.error(FormatErrorKind::InvalidNumber(text.to_string()), token.span);
        if text.contains(['.', 'e', 'E']) {
            text.parse().map(Value::Float).map_err(|_| invalid())
        } else {
            text.parse().map(Value::Int).map_err(|_| invalid())
        }
    }

    /// `${name(value)}`, after the `{`.
    fn parse_call(&mut self) -> Result<Value> {
        let function = self.expect(TokenKind::Word, "function name")?.text.to_string();
        if !self.eat(TokenKind::CallParen) {
            self.expect(TokenKind::LParen, "'('")?;
        }
        let argument = self.nested(false, Self::parse_value)?;
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Value::Expression(Expression::Call {
            function,
            argument: Box::new(argument),
        }))
    }

    fn parse_reference(&mut self, kind: ReferenceKind) -> Result<Reference> {
        let mut head = self.expect(TokenKind::Word, "identifier")?.text.to_string();
        let mut ups = 0;
        while head == "_" && self.eat(TokenKind::Dot) {
            ups += 1;
            head = self.expect(TokenKind::Word, "identifier")?.text.to_string();
        }
        let mut reference = Reference {
            kind,
            ups,
            head,
            suffix: Vec::new(),
        };
        loop {
            match self.peek() {
                TokenKind::Dot if self.peek_second() == TokenKind::Word => {
                    self.advance();
                    let name = self.expect(TokenKind::Word, "identifier")?;
                    reference.suffix.push(Suffix::Attr(name.text.to_string()));
                }
                TokenKind::IndexBracket => {
                    self.advance();
                    let index = self.parse_index()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    reference.suffix.push(Suffix::Index(index));
                }
                TokenKind::CallParen if kind == ReferenceKind::Backtick => {
                    self.advance();
                    let mut args = Vec::new();
                    while self.peek() != TokenKind::RParen {
                        args.push(self.nested(false, Self::parse_value)?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen, "')'")?;
                    reference.suffix.push(Suffix::Call(args));
                }
                _ => return Ok(reference),
            }
        }
    }

    fn parse_index(&mut self) -> Result<Index> {
        match self.peek() {
            TokenKind::Minus | TokenKind::Number => {
                let negative = self.eat(TokenKind::Minus);
                let token = self.expect(TokenKind::Number, "integer index")?;
                match self.parse_number(&token)? {
                    Value::Int(i) => Ok(Index::Int(if negative { -i } else { i })),
                    _ => Err(self.error(FormatErrorKind::InvalidNumber(token.text.to_string()), token.span)),
                }
            }
            TokenKind::String => Ok(Index::Str(string_content(self.advance().text))),
            TokenKind::Dollar => {
                self.advance();
                Ok(Index::Ref(Box::new(self.parse_reference(ReferenceKind::Dollar)?)))
            }
            _ => Err(self.unexpected("index")),
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<Mapping> {
        let m = Mapping::new();
        parse_into(&m, source, &LoadOptions::default(), &[])?;
        Ok(m)
    }

    fn format_error(source: &str) -> FormatError {
        match parse(source) {
            Err(Error::Format(e)) => e,
            other => panic!("expected a format error, got {other:?}"),
        }
    }

    #[test]
    fn test_scalars() {
        let m = parse("a: 1, b: -2.5, c: 'x', d: True, e: None, f: 1e3, g").unwrap();
        assert_eq!(m.get_raw("a"), Some(Value::Int(1)));
        assert_eq!(m.get_raw("b"), Some(Value::Float(-2.5)));
        assert_eq!(m.get_raw("c"), Some(Value::from("x")));
        assert_eq!(m.get_raw("d"), Some(Value::Bool(true)));
        assert_eq!(m.get_raw("e"), Some(Value::None));
        assert_eq!(m.get_raw("f"), Some(Value::Float(1000.0)));
        assert_eq!(m.get_raw("g"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_string_forms() {
        let m = parse("a: <x y>\nb: \"tab\\there\"\nc: '''multi\nline'''\n\"key with space\": 1\n7: 'seven'")
            .unwrap();
        assert_eq!(m.get_raw("a"), Some(Value::from("x y")));
        assert_eq!(m.get_raw("b"), Some(Value::from("tab\there")));
        assert_eq!(m.get_raw("c"), Some(Value::from("multi\nline")));
        assert_eq!(m.get_raw("key with space"), Some(Value::Int(1)));
        assert_eq!(m.get_raw("7"), Some(Value::from("seven")));
    }

    #[test]
    fn test_references_and_expressions_are_unevaluated() {
        let m = parse("r: $_.a.b[0][\"k\"][$i]\ne: $a + $b * 2\nn: -$x\nt: `os.sep`\nf: ${len($xs)}")
            .unwrap();
        assert_eq!(m.get_raw("r").unwrap().to_string(), "$_.a.b[0][\"k\"][$i]");
        assert_eq!(m.get_raw("e").unwrap().to_string(), "$a + $b * 2");
        assert_eq!(m.get_raw("n").unwrap().to_string(), "-$x");
        assert_eq!(m.get_raw("t").unwrap().to_string(), "`os.sep`");
        assert_eq!(m.get_raw("f").unwrap().to_string(), "${len($xs)}");
        let Some(Value::Reference(r)) = m.get_raw("r") else {
            panic!("expected a reference");
        };
        assert_eq!(r.ups, 1);
        assert_eq!(r.head, "a");
    }

    #[test]
    fn test_grouping_overrides_precedence() {
        let m = parse("e: ($a + $b) * 2").unwrap();
        let Some(Value::Expression(Expression::Binary { op, .. })) = m.get_raw("e") else {
            panic!("expected an expression");
        };
        assert_eq!(op, BinaryOp::Mul);
    }

    #[test]
    fn test_sequences_ranges_and_comprehensions() {
        let m = parse("s: [1, 2 3]\nr: [0..$n]\nv: [$n - 1..$n * 2]\nc: [$i * 2 | i: [0..2]]\ne: []").unwrap();
        let s = m.get_raw("s").unwrap();
        assert_eq!(s.to_string(), "[1, 2, 3]");
        assert_eq!(m.get_raw("r").unwrap().to_string(), "[0..$n]");
        assert_eq!(m.get_raw("v").unwrap().to_string(), "[$n - 1..$n * 2]");
        assert_eq!(m.get_raw("c").unwrap().to_string(), "[$i * 2 | i: [0..2]]");
        assert_eq!(m.get_raw("e").unwrap().to_string(), "[]");
    }

    #[test]
    fn test_minus_at_line_start_begins_a_value() {
        let m = parse("s: [\n  1\n  -5\n]\nd: [1 -\n  5]").unwrap();
        assert_eq!(m.get_raw("s").unwrap().to_string(), "[1, -5]");
        assert_eq!(m.get_raw("d").unwrap().to_string(), "[1 - 5]");
    }

    #[test]
    fn test_minus_continues_outside_sequences() {
        let m = parse("x: $a\n  - $b\np: [(1\n  - 2)]\nq: [{v: 3\n  - 1}]\nf: [${abs(1\n  - 4)}]").unwrap();
        assert_eq!(m.get_raw("x").unwrap().to_string(), "$a - $b");
        assert_eq!(m.get_raw("p").unwrap().to_string(), "[1 - 2]");
        assert_eq!(m.get_raw("q").unwrap().to_string(), "[{v: 3 - 1}]");
        assert_eq!(m.get_raw("f").unwrap().to_string(), "[${abs(1 - 4)}]");
        // Back inside the sequence after the nested value.
        let m = parse("s: [(1)\n  -2]").unwrap();
        assert_eq!(m.get_raw("s").unwrap().to_string(), "[1, -2]");
    }

    #[test]
    fn test_comments_attach_to_next_entry() {
        let m = parse("# first\na: 1\n# ignored\n# second\nb: [\n  # item\n  1\n]").unwrap();
        assert_eq!(m.comment("a").as_deref(), Some("first"));
        assert_eq!(m.comment("b").as_deref(), Some("second"));
        let Some(Value::Sequence(s)) = m.get_raw("b") else {
            panic!("expected a sequence");
        };
        assert_eq!(s.comment(0).as_deref(), Some("item"));
    }

    #[test]
    fn test_duplicate_key() {
        let e = format_error("a: 1\nb: 2\na: 3");
        assert!(matches!(e.kind, FormatErrorKind::DuplicateKey { ref key, .. } if key == "a"));
        assert_eq!((e.line, e.column), (3, 1));
    }

    #[test]
    fn test_errors_carry_position() {
        let e = format_error("a: {\n  b: 1\n");
        assert_eq!(e.to_string(), "?:3:1: expected key or '}', found end of input");

        let e = format_error("a: 'open");
        assert_eq!(e.kind, FormatErrorKind::UnterminatedString);
        assert_eq!((e.line, e.column), (1, 4));

        let e = format_error("a: 1 ; b: 2");
        assert_eq!(e.kind, FormatErrorKind::InvalidCharacter(";".into()));

        let e = format_error("a: bare");
        assert_eq!(e.to_string(), "?:1:4: expected value, found identifier `bare`");

        let e = format_error("a: ['x'..3]");
        assert_eq!(e.kind, FormatErrorKind::InvalidRangeStart("\"x\"".into()));
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(parse_path("a.b[0][\"c d\"]").unwrap().to_string(), "$a.b[0][\"c d\"]");
        assert!(parse_path("a.").is_err());
        assert!(parse_path("a b").is_err());
        assert!(parse_path("").is_err());
    }

    #[test]
    fn test_includes_fail_without_resolver() {
        let err = parse("a: @\"other.cfg\"").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Include { ref name, .. }) if name == "other.cfg"));
    }
}
