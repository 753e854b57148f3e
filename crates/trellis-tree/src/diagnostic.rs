//! Diagnostic rendering for format errors.

use ariadne::{Color, Label, Report, ReportKind, Source};

use crate::error::{FormatError, FormatErrorKind};

impl FormatError {
    /// Render this error with ariadne, quoting `source`, the text that was
    /// being read.
    pub fn render(&self, source: &str) -> String {
        let mut output = Vec::new();
        self.write_report(source, &mut output);
        String::from_utf8(output).unwrap_or_else(|_| self.to_string())
    }

    /// Write the error report to a writer.
    pub fn write_report<W: std::io::Write>(&self, source: &str, writer: W) {
        let filename = self.file.as_str();
        let report = self.build_report(filename);
        let _ = report
            .finish()
            .write((filename, Source::from(source)), writer);
    }

    fn build_report<'a>(
        &self,
        filename: &'a str,
    ) -> ariadne::ReportBuilder<'static, (&'a str, std::ops::Range<usize>)> {
        let range: std::ops::Range<usize> = self.span.into();

        match &self.kind {
            FormatErrorKind::DuplicateKey { key, original } => {
                let original_range: std::ops::Range<usize> = (*original).into();
                Report::build(ReportKind::Error, (filename, range.clone()))
                    .with_message(format!("duplicate key `{key}`"))
                    .with_label(
                        Label::new((filename, original_range))
                            .with_message("first defined here")
                            .with_color(Color::Blue),
                    )
                    .with_label(
                        Label::new((filename, range))
                            .with_message("defined again here")
                            .with_color(Color::Red),
                    )
                    .with_help("each key may appear only once in a mapping")
            }

            FormatErrorKind::UnexpectedToken { expected, found } => {
                Report::build(ReportKind::Error, (filename, range.clone()))
                    .with_message(format!("expected {expected}, found {found}"))
                    .with_label(
                        Label::new((filename, range))
                            .with_message(format!("expected {expected}"))
                            .with_color(Color::Red),
                    )
            }

            FormatErrorKind::UnterminatedString => Report::build(ReportKind::Error, (filename, range.clone()))
                .with_message("unterminated quoted string")
                .with_label(
                    Label::new((filename, range))
                        .with_message("string starts here")
                        .with_color(Color::Red),
                )
                .with_help("close the string with the quote it was opened with"),

            FormatErrorKind::InvalidCharacter(c) => Report::build(ReportKind::Error, (filename, range.clone()))
                .with_message(format!("unexpected character {c:?}"))
                .with_label(
                    Label::new((filename, range))
                        .with_message("not valid here")
                        .with_color(Color::Red),
                ),

            FormatErrorKind::InvalidNumber(text) => Report::build(ReportKind::Error, (filename, range.clone()))
                .with_message(format!("invalid number `{text}`"))
                .with_label(
                    Label::new((filename, range))
                        .with_message("does not fit in a 64-bit integer or float")
                        .with_color(Color::Red),
                ),

            FormatErrorKind::InvalidRangeStart(text) => Report::build(ReportKind::Error, (filename, range.clone()))
                .with_message(format!("range must start with an integer or reference, found `{text}`"))
                .with_label(
                    Label::new((filename, range))
                        .with_message("range start")
                        .with_color(Color::Red),
                )
                .with_help("start the range with an integer or a `$` reference"),
        }
    }
}
