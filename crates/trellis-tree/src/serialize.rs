//! Format configuration trees as Trellis text.
//!
//! Nothing is evaluated while saving: references, expressions and lazy
//! sequences are written in source notation, so the text reads back into
//! an equivalent tree.

use std::io;

use trellis_format::{FormatOptions, TrellisWriter};

use crate::mapping::Mapping;
use crate::sequence::Sequence;
use crate::value::Value;

/// Format a mapping as a Trellis document. The mapping is the root, so it
/// is written without braces.
pub fn format_mapping(mapping: &Mapping, options: FormatOptions) -> String {
    let mut formatter = TreeFormatter::new(options);
    formatter.format_root(mapping);
    formatter.finish()
}

/// Format a mapping as a Trellis document with default options.
pub fn format_mapping_default(mapping: &Mapping) -> String {
    format_mapping(mapping, FormatOptions::default())
}

/// Write a mapping as a Trellis document to `out`.
pub fn write_mapping(mapping: &Mapping, options: FormatOptions, mut out: impl io::Write) -> io::Result<()> {
    out.write_all(format_mapping(mapping, options).as_bytes())
}

struct TreeFormatter {
    writer: TrellisWriter,
}

impl TreeFormatter {
    fn new(options: FormatOptions) -> Self {
        Self {
            writer: TrellisWriter::with_options(options),
        }
    }

    fn finish(self) -> String {
        self.writer.finish_string()
    }

    fn format_root(&mut self, mapping: &Mapping) {
        self.writer.begin_mapping(true);
        self.format_entries(mapping);
        self.writer.end_mapping().ok();
    }

    fn format_entries(&mut self, mapping: &Mapping) {
        for entry in mapping.entries() {
            if let Some(comment) = &entry.comment {
                self.writer.comment(comment);
            }
            // Keys come from a mapping, so the writer is always inside one.
            self.writer.field_key(&entry.key).ok();
            self.format_value(&entry.value);
        }
    }

    fn format_value(&mut self, value: &Value) {
        match value {
            Value::None => self.writer.write_none(),
            Value::Bool(b) => self.writer.write_bool(*b),
            Value::Int(i) => self.writer.write_i64(*i),
            Value::Float(f) => self.writer.write_f64(*f),
            Value::Str(s) => self.writer.write_string(s),
            Value::Mapping(m) => {
                self.writer.begin_mapping(false);
                self.format_entries(m);
                self.writer.end_mapping().ok();
            }
            Value::Sequence(s) => self.format_sequence(s),
            Value::Reference(r) => self.writer.write_source(&r.to_string()),
            Value::Expression(e) => self.writer.write_source(&e.to_string()),
        }
    }

    fn format_sequence(&mut self, sequence: &Sequence) {
        if let Some(lazy) = sequence.lazy() {
            self.writer.write_source(&lazy.to_string());
            return;
        }
        self.writer.begin_seq();
        for item in sequence.raw_items() {
            if let Some(comment) = &item.comment {
                self.writer.comment(comment);
            }
            self.format_value(&item.value);
        }
        self.writer.end_seq().ok();
    }
}

impl Mapping {
    /// This mapping as a Trellis document, with default options.
    pub fn to_document(&self) -> String {
        format_mapping_default(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    #[test]
    fn test_document_layout() {
        let config = Config::parse(
            "# where to listen\nserver: {host: 'localhost', ports: [80, 443]}\nscale: 1.5\nflags: {}",
        )
        .unwrap();
        insta::assert_snapshot!(config.to_document(), @r#"
        # where to listen
        server: {
          host: "localhost"
          ports: [
            80
            443
          ]
        }
        scale: 1.5
        flags: {}
        "#);
    }

    #[test]
    fn test_placeholders_in_source_notation() {
        let config = Config::parse(
            "n: 3\ntotal: ($n + 1) * 2\nr: [1..$n]\nc: [$v * 2 | v: $r]\nhome: `env.HOME`\n\"odd key\": $_.n",
        )
        .unwrap();
        let Value::Sequence(r) = config.get("r").unwrap() else {
            panic!("expected a sequence");
        };
        assert_eq!(r.len().unwrap(), 3);
        insta::assert_snapshot!(config.to_document(), @r#"
        n: 3
        total: ($n + 1) * 2
        r: [1..$n]
        c: [$v * 2 | v: $r]
        home: `env.HOME`
        "odd key": $_.n
        "#);
    }

    #[test]
    fn test_sequence_comments_and_inline_options() {
        let config = Config::parse("s: [\n  # one\n  1\n  2\n]\nm: {a: None, b: False}").unwrap();
        insta::assert_snapshot!(config.to_document(), @r"
        s: [
          # one
          1
          2
        ]
        m: {
          a: None
          b: False
        }
        ");
        assert_eq!(
            format_mapping(&config, FormatOptions::new().inline()),
            "s: [1, 2]\nm: {a: None, b: False}\n"
        );
    }

    #[test]
    fn test_write_mapping() {
        let config = Config::parse("a: 'x'").unwrap();
        let mut out = Vec::new();
        write_mapping(&config, FormatOptions::default(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a: \"x\"\n");
    }
}
