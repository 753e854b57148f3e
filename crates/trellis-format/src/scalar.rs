//! Scalar handling utilities for Trellis.
//!
//! Provides functions for deciding whether a key can be written bare, for
//! escaping and unescaping string content, and for writing floats so that
//! they read back as floats.

use std::borrow::Cow;

use trellis_tokenizer::{is_word_char, is_word_start};

/// Check if a mapping key can be written without quotes.
///
/// A bare key is either an identifier that is not one of the literal words
/// `True`, `False` or `None`, or a non-negative integer literal.
pub fn can_be_bare(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if first.is_ascii_digit() {
        return s.chars().all(|c| c.is_ascii_digit());
    }
    is_word_start(first) && chars.all(is_word_char) && !matches!(s, "True" | "False" | "None")
}

/// Escape a string for double-quoted output.
///
/// Returns the escaped content (without surrounding quotes).
pub fn escape_quoted(s: &str) -> Cow<'_, str> {
    // Check if any escapes needed
    if !s
        .chars()
        .any(|c| matches!(c, '"' | '\\') || c.is_control())
    {
        return Cow::Borrowed(s);
    }

    let mut result = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                let code = c as u32;
                result.push_str(&format!("\\u{{{code:04x}}}"));
            }
            c => result.push(c),
        }
    }
    Cow::Owned(result)
}

/// Quote a string with double quotes, escaping as needed.
pub fn quote(s: &str) -> String {
    format!("\"{}\"", escape_quoted(s))
}

/// Unescape the content of a quoted string.
///
/// The input should be the content between the delimiters. Unknown escapes
/// are kept as written, backslash included; a backslash before a newline
/// joins the two lines.
pub fn unescape_quoted(s: &str) -> Cow<'_, str> {
    if !s.contains('\\') {
        return Cow::Borrowed(s);
    }

    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('0') => result.push('\0'),
            Some('a') => result.push('\u{7}'),
            Some('b') => result.push('\u{8}'),
            Some('f') => result.push('\u{c}'),
            Some('v') => result.push('\u{b}'),
            Some('\n') => {}
            Some(c @ ('\\' | '"' | '\'' | '<' | '>')) => result.push(c),
            Some('x') => {
                let hex: String = take_hex(&mut chars, 2);
                push_code(&mut result, &hex, 'x');
            }
            Some('u') => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    let mut hex = String::new();
                    while let Some(c) = chars.next() {
                        if c == '}' {
                            break;
                        }
                        hex.push(c);
                    }
                    push_code(&mut result, &hex, 'u');
                } else {
                    let hex = take_hex(&mut chars, 4);
                    push_code(&mut result, &hex, 'u');
                }
            }
            Some(c) => {
                result.push('\\');
                result.push(c);
            }
            None => result.push('\\'),
        }
    }

    Cow::Owned(result)
}

fn take_hex(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, max: usize) -> String {
    let mut hex = String::new();
    while hex.len() < max {
        match chars.peek() {
            Some(c) if c.is_ascii_hexdigit() => {
                hex.push(*c);
                chars.next();
            }
            _ => break,
        }
    }
    hex
}

fn push_code(result: &mut String, hex: &str, escape: char) {
    match u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
        Some(ch) => result.push(ch),
        None => {
            result.push('\\');
            result.push(escape);
            result.push_str(hex);
        }
    }
}

/// Format a float so that it reads back as a float literal.
///
/// Non-finite values have no literal form and are written as a call to the
/// `float` function.
pub fn format_float(v: f64) -> String {
    if v.is_finite() {
        format!("{v:?}")
    } else {
        format!("${{float(\"{v}\")}}")
    }
}
