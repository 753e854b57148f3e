//! A tokenizer for trellis

mod span;
pub use span::{Position, Span};

mod token;
pub use token::{Token, TokenKind};

mod tokenizer;
pub use tokenizer::{Tokenizer, is_word_char, is_word_start};
