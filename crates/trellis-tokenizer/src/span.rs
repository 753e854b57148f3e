//! Span tracking for source locations.

/// A span representing a range in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Byte offset of the start (inclusive)
    pub start: u32,
    /// Byte offset of the end (exclusive)
    pub end: u32,
}

impl Span {
    /// Create a new span from start and end byte offsets.
    #[inline]
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Create an empty span at a position.
    #[inline]
    pub fn empty(pos: u32) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    /// Length of this span in bytes.
    #[inline]
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Whether this span is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Extend this span to include another span.
    #[inline]
    pub fn extend(&self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Get the source text for this span.
    #[inline]
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start as usize..self.end as usize]
    }

    /// Line and column of the start of this span.
    pub fn position(&self, source: &str) -> Position {
        Position::of(source, self.start)
    }
}

impl From<std::ops::Range<u32>> for Span {
    fn from(range: std::ops::Range<u32>) -> Self {
        Span::new(range.start, range.end)
    }
}

impl From<Span> for std::ops::Range<usize> {
    fn from(span: Span) -> Self {
        span.start as usize..span.end as usize
    }
}

/// A 1-based line/column location.
///
/// Only `\n` starts a new line; columns count characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    /// Compute the position of a byte offset in `source`.
    ///
    /// Offsets past the end are clamped to the end of the source.
    pub fn of(source: &str, offset: u32) -> Position {
        let offset = (offset as usize).min(source.len());
        let mut line = 1;
        let mut column = 1;
        for (idx, c) in source.char_indices() {
            if idx >= offset {
                break;
            }
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Position { line, column }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_of_offsets() {
        let source = "a: 1\nbb: 2\n";
        assert_eq!(Position::of(source, 0), Position { line: 1, column: 1 });
        assert_eq!(Position::of(source, 3), Position { line: 1, column: 4 });
        assert_eq!(Position::of(source, 5), Position { line: 2, column: 1 });
        assert_eq!(Position::of(source, 9), Position { line: 2, column: 5 });
    }

    #[test]
    fn test_position_clamps_past_end() {
        assert_eq!(Position::of("ab", 100), Position { line: 1, column: 3 });
    }

    #[test]
    fn test_span_slice_and_extend() {
        let source = "hello world";
        let a = Span::new(0, 5);
        let b = Span::new(6, 11);
        assert_eq!(a.slice(source), "hello");
        assert_eq!(a.extend(b).slice(source), "hello world");
        assert_eq!(a.len(), 5);
        assert!(Span::empty(3).is_empty());
    }
}
