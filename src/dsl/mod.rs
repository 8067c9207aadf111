//! The metrics DSL: lexer, parser, AST, and completion hints.

pub mod ast;
pub mod completion;
pub mod lexer;
pub mod parser;
pub mod span;

use chumsky::input::Input;
use chumsky::Parser;

use ast::Program;

/// Severity of a [`ParseError`]. The parser itself only ever produces
/// `Error`; `Warning`/`Info` are available for future diagnostics
/// (e.g. deprecated syntax) without widening the error type again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        write!(f, "{s}")
    }
}

/// A single parse error: a human-readable message, severity, and the
/// 1-based line/column (plus raw byte span) of the cursor at the failure
/// point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub severity: Severity,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
    pub end: usize,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}: {}", self.line, self.column, self.severity, self.message)
    }
}

/// The result of parsing a DSL source file: a (possibly partial) AST
/// together with any errors encountered. A parse never panics; callers
/// should check `errors.is_empty()` to decide whether `program` is usable.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    pub program: Program,
    pub errors: Vec<ParseError>,
}

impl ParseResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Convert a byte offset into a 1-based (line, column) pair.
fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let mut line = 1;
    let mut col = 1;
    for ch in source[..offset].chars() {
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Parse a metrics DSL source file.
///
/// A parse is successful only when the parser consumes the input up to
/// trailing whitespace; any unconsumed suffix is reported as a single
/// error anchored at the residual offset, per the lexical/grammar layer's
/// error-reporting contract.
pub fn parse(source: &str) -> ParseResult {
    let (tokens, lex_errs) = lexer::lexer().parse(source).into_output_errors();

    let mut errors: Vec<ParseError> = lex_errs
        .iter()
        .map(|e| {
            let offset = e.span().start;
            let (line, column) = line_col(source, offset);
            ParseError {
                message: e.to_string(),
                severity: Severity::Error,
                line,
                column,
                offset,
                end: e.span().end,
            }
        })
        .collect();

    let tokens = match tokens {
        Some(t) => t,
        None => {
            return ParseResult {
                program: Program::default(),
                errors,
            }
        }
    };

    let eoi_span = chumsky::span::SimpleSpan::from(source.len()..source.len());
    let stream = tokens.as_slice().map(eoi_span, |(t, s)| (t, s));

    let (program, parse_errs) = parser::parser().parse(stream).into_output_errors();

    errors.extend(parse_errs.iter().map(|e| {
        let offset = e.span().start;
        let (line, column) = line_col(source, offset);
        ParseError {
            message: e.to_string(),
            severity: Severity::Error,
            line,
            column,
            offset,
            end: e.span().end,
        }
    }));

    ParseResult {
        program: program.unwrap_or_default(),
        errors,
    }
}

/// Parse a DSL source file, alias kept for call sites that read more
/// naturally as "parse this file's contents".
pub fn parse_file(source: &str) -> ParseResult {
    parse(source)
}

/// Render a batch of parse errors as `ariadne` source-annotated reports
/// (one per error), for display to a human at a terminal.
pub fn render_errors(source: &str, errors: &[ParseError]) -> String {
    use ariadne::{Label, Report, ReportKind, Source};

    let mut out = String::new();
    for error in errors {
        let end = error.end.max(error.offset + 1).min(source.len().max(1));
        let start = error.offset.min(end.saturating_sub(1));
        let kind = match error.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
            Severity::Info => ReportKind::Advice,
        };

        let mut buf = Vec::new();
        let report = Report::build(kind, (), start)
            .with_message(&error.message)
            .with_label(Label::new(start..end).with_message(&error.message))
            .finish();
        if report.write(Source::from(source), &mut buf).is_ok() {
            out.push_str(&String::from_utf8_lossy(&buf));
        } else {
            out.push_str(&error.to_string());
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        let result = parse("metric total_sales on sales = sum(amount)");
        assert!(result.is_ok());
        assert_eq!(result.program.items.len(), 1);
    }

    #[test]
    fn test_parse_reports_trailing_garbage() {
        let result = parse("metric m on f = sum(x) $$$");
        assert!(!result.is_ok());
    }

    #[test]
    fn test_parse_reports_malformed_decl() {
        let result = parse("metric on f = sum(x)");
        assert!(!result.is_ok());
        assert!(result.errors[0].line >= 1);
    }

    #[test]
    fn test_line_col_multiline() {
        let source = "metric m\non f = sum(x)";
        let (line, col) = line_col(source, 9);
        assert_eq!((line, col), (2, 1));
    }

    #[test]
    fn test_empty_source_parses_empty_program() {
        let result = parse("");
        assert!(result.is_ok());
        assert!(result.program.items.is_empty());
    }

    #[test]
    fn test_render_errors_includes_the_message_and_a_source_snippet() {
        let source = "metric on f = sum(x)";
        let result = parse(source);
        assert!(!result.is_ok());
        let rendered = render_errors(source, &result.errors);
        assert!(rendered.contains(&result.errors[0].message));
        assert!(rendered.contains(source.lines().next().unwrap()));
    }
}
