use std::fmt;
use std::io::Write;

use crate::common::span::Span;

/// A static error found while scanning, parsing, or resolving.
///
/// Carries a single reason/location/lexeme-context triple, since a static
/// error never needs more than one location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub span: Span,
    /// `""`, `"at end"`, or `"at '<lexeme>'"`.
    pub at: String,
    pub message: String,
}

impl SyntaxError {
    pub fn new(span: Span, at: impl Into<String>, message: impl Into<String>) -> SyntaxError {
        SyntaxError { span, at: at.into(), message: message.into() }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line \"{}\"] Error {}: {}", self.span.line, self.at, self.message)
    }
}

/// A runtime error, raised while evaluating. Carries the line the offending
/// expression or statement came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub span: Span,
    pub message: String,
}

impl RuntimeError {
    pub fn new(span: Span, message: impl Into<String>) -> RuntimeError {
        RuntimeError { span, message: message.into() }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [line \"{}\"]", self.message, self.span.line)
    }
}

/// Carries the had-error and had-runtime-error flags, plus the host output
/// sink every stage writes diagnostics and `print` output to.
///
/// Rather than true global mutable statics, the flags and sink live on this
/// struct and are threaded through the scanner, parser, resolver, and
/// interpreter by `&mut` reference.
pub struct Reporter<W: Write> {
    pub sink: W,
    had_error: bool,
    had_runtime_error: bool,
}

impl<W: Write> Reporter<W> {
    pub fn new(sink: W) -> Reporter<W> {
        Reporter { sink, had_error: false, had_runtime_error: false }
    }

    pub fn had_error(&self) -> bool { self.had_error }

    pub fn had_runtime_error(&self) -> bool { self.had_runtime_error }

    /// Resets the static-error flag; used by the prompt loop, which treats
    /// each submitted line as a fresh program.
    pub fn reset(&mut self) { self.had_error = false; }

    pub fn report_syntax(&mut self, error: &SyntaxError) {
        let _ = writeln!(self.sink, "{}", error);
        self.had_error = true;
    }

    pub fn report_runtime(&mut self, error: &RuntimeError) {
        let _ = writeln!(self.sink, "{}", error);
        self.had_runtime_error = true;
    }

    pub fn print(&mut self, value: &str) {
        let _ = writeln!(self.sink, "{}", value);
    }
}
