use crate::position::{Position, Span};
use crate::scope::Context;
use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    IllegalCharacter,
    InvalidSyntax,
    Runtime,
}

impl ErrorKind {
    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::IllegalCharacter => "Illegal Character",
            ErrorKind::InvalidSyntax => "Invalid Syntax",
            ErrorKind::Runtime => "Runtime Error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PebbleError {
    pub kind: ErrorKind,
    pub span: Span,
    pub message: String,
    pub help: Option<String>,
    /// The frame that was executing when a runtime error was raised.
    pub context: Option<Rc<Context>>,
}

impl PebbleError {
    pub fn new(kind: ErrorKind, span: Span, message: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: None,
            context: None,
        }
    }

    pub fn illegal_character(span: Span, message: String) -> Self {
        Self::new(ErrorKind::IllegalCharacter, span, message)
    }

    pub fn syntax_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::InvalidSyntax, span, message)
    }

    pub fn syntax_error_with_help(span: Span, message: String, help: String) -> Self {
        Self {
            help: Some(help),
            ..Self::syntax_error(span, message)
        }
    }

    pub fn runtime_error(span: Span, message: String, context: Option<Rc<Context>>) -> Self {
        Self {
            context,
            ..Self::new(ErrorKind::Runtime, span, message)
        }
    }

    pub fn runtime_error_with_help(
        span: Span,
        message: String,
        help: String,
        context: Option<Rc<Context>>,
    ) -> Self {
        Self {
            help: Some(help),
            ..Self::runtime_error(span, message, context)
        }
    }

    pub fn is_runtime(&self) -> bool {
        self.kind == ErrorKind::Runtime
    }

    /// Plain-text rendering: header, blank line, offending source line(s) with carets.
    pub fn as_string(&self) -> String {
        let start = &self.span.start;
        let mut result = String::new();

        if self.is_runtime() {
            result.push_str(&self.traceback());
            result.push_str(&format!("{}: {}", self.kind.title(), self.message));
        } else {
            result.push_str(&format!(
                "{}: {} in File \"{}\", line {}",
                self.kind.title(),
                self.message,
                start.file_name,
                start.line
            ));
        }

        result.push_str("\n\n");
        result.push_str(&render_arrows(&self.span.start, &self.span.end));
        result
    }

    /// One ` File <path>, line <n>, in <frame>` line per active frame, outermost first.
    pub fn traceback(&self) -> String {
        let mut lines = Vec::new();
        let mut position = Some(self.span.start.clone());
        let mut context = self.context.clone();

        while let Some(ctx) = context {
            if let Some(pos) = &position {
                lines.push(format!(
                    " File {}, line {}, in {}",
                    pos.file_name, pos.line, ctx.display_name
                ));
            }
            position = ctx.parent_entry_position.clone();
            context = ctx.parent.clone();
        }

        lines.reverse();
        let mut result = String::from("Traceback (Most Recent Call Last):\n");
        for line in lines {
            result.push_str(&line);
            result.push('\n');
        }
        result
    }

    /// Colored report on stderr.
    pub fn report(&self) -> std::io::Result<()> {
        let filename: &str = &self.span.start.file_name;
        let source = self.span.start.file_text.to_string();

        let color = match self.kind {
            ErrorKind::IllegalCharacter => Color::Red,
            ErrorKind::InvalidSyntax => Color::Yellow,
            ErrorKind::Runtime => Color::Magenta,
        };

        let mut report_builder = Report::build(ReportKind::Error, filename, self.span.start.index)
            .with_message(format!("{}: {}", self.kind.title().fg(color), self.message))
            .with_label(
                Label::new((filename, self.span.range()))
                    .with_message(&self.message)
                    .with_color(color),
            );

        if self.is_runtime() {
            let traceback = self.traceback();
            report_builder = report_builder.with_note(traceback.trim_end());
        }

        if let Some(ref help_text) = self.help {
            report_builder =
                report_builder.with_help(format!("{}", help_text.as_str().fg(Color::Cyan)));
        }

        report_builder
            .finish()
            .eprint((filename, Source::from(source)))
    }
}

impl fmt::Display for PebbleError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PebbleError {}

/// Prints every source line touched by `start..end` with a row of `^` under the covered columns.
pub fn render_arrows(start: &Position, end: &Position) -> String {
    let lines: Vec<&str> = start.file_text.split('\n').collect();
    let last_line = end.line.max(start.line);
    let mut result = String::new();

    for line_no in start.line..=last_line {
        let line = match lines.get(line_no - 1) {
            Some(line) => line.trim_end_matches('\r'),
            None => break,
        };
        let width = line.chars().count();
        let col_start = if line_no == start.line { start.column } else { 0 };
        let col_end = if line_no == last_line && end.line == last_line {
            end.column
        } else {
            width
        };
        let carets = col_end.saturating_sub(col_start).max(1);

        result.push_str(&line.replace('\t', " "));
        result.push('\n');
        result.push_str(&" ".repeat(col_start));
        result.push_str(&"^".repeat(carets));
        if line_no != last_line {
            result.push('\n');
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position_at(text: &str, index: usize) -> Position {
        let mut pos = Position::new("test.pb", text);
        for c in text.chars().take(index) {
            pos.advance(c);
        }
        pos
    }

    #[test]
    fn arrows_point_at_the_span() {
        let text = "let x = 1;\nputs(1 / 0);";
        let start = position_at(text, 20);
        let end = position_at(text, 21);
        assert_eq!(render_arrows(&start, &end), "puts(1 / 0);\n         ^");
    }

    #[test]
    fn empty_span_still_gets_one_caret() {
        let text = "abc";
        let start = position_at(text, 3);
        assert_eq!(render_arrows(&start, &start), "abc\n   ^");
    }

    #[test]
    fn syntax_error_header_names_file_and_line() {
        let text = "let = 3;";
        let error = PebbleError::syntax_error(
            Span::new(position_at(text, 4), position_at(text, 5)),
            "Expected identifier".to_string(),
        );
        assert_eq!(
            error.as_string(),
            "Invalid Syntax: Expected identifier in File \"test.pb\", line 1\n\nlet = 3;\n    ^"
        );
    }
}
