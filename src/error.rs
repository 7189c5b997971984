//! Centralised error hierarchy and diagnostics plumbing for **rox**.
//!
//! All subsystems (scanner, parser, resolver, runtime, CLI) convert their
//! internal failure modes into one of the [`LoxError`] variants defined here,
//! and every stage delivers its diagnostics through the [`ErrorReporter`]
//! collaborator. The engine never prints on its own: a host picks a reporter
//! ([`ConsoleReporter`], [`SilentReporter`], [`DiagnosticCollector`]) and
//! decides what to do with each report.
//!
//! Control transfer (`return`, `break`, `continue`) is deliberately absent
//! from this module; see [`crate::interpreter::Completion`].

use std::io;

use log::{debug, info};
use serde::Serialize;
use thiserror::Error;

/// Source location of a token or diagnostic.
///
/// `start`/`end` are byte offsets into the source text, `line` is 1‑based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Position {
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

impl Position {
    pub fn new(line: usize, start: usize, end: usize) -> Self {
        Self { line, start, end }
    }

    /// Does the byte `offset` fall inside this span (both ends inclusive)?
    #[inline]
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }
}

/// Every failure the engine can produce, one variant per stage.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoxError {
    #[error("[line {}] Error: {message}", .position.line)]
    Lex { message: String, position: Position },

    #[error("[line {}] Error: {message}", .position.line)]
    Parse { message: String, position: Position },

    /// Static rule broken: illegal `return`, redeclaration, …
    #[error("[line {}] Error: {message}", .position.line)]
    Resolve { message: String, position: Position },

    /// Displays as `message` then `[line N]` on its own line.
    #[error("{message}\n[line {}]", .position.line)]
    Runtime { message: String, position: Position },

    /// `print` could not write its output.
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl LoxError {
    pub fn lex<S: Into<String>>(position: Position, msg: S) -> Self {
        let message: String = msg.into();

        debug!("Creating Lex error: line={}, msg={}", position.line, message);

        LoxError::Lex { message, position }
    }

    pub fn parse<S: Into<String>>(position: Position, msg: S) -> Self {
        let message: String = msg.into();

        debug!("Creating Parse error: line={}, msg={}", position.line, message);

        LoxError::Parse { message, position }
    }

    pub fn resolve<S: Into<String>>(position: Position, msg: S) -> Self {
        let message: String = msg.into();

        debug!("Creating Resolve error: line={}, msg={}", position.line, message);

        LoxError::Resolve { message, position }
    }

    pub fn runtime<S: Into<String>>(position: Position, msg: S) -> Self {
        let message: String = msg.into();

        debug!("Creating Runtime error: line={}, msg={}", position.line, message);

        LoxError::Runtime { message, position }
    }

    /// Location of the error, if it originates from source text.
    pub fn position(&self) -> Option<Position> {
        match self {
            LoxError::Lex { position, .. }
            | LoxError::Parse { position, .. }
            | LoxError::Resolve { position, .. }
            | LoxError::Runtime { position, .. } => Some(*position),
            LoxError::Io(_) | LoxError::Utf8(_) => None,
        }
    }

    /// Bare message without the line decoration added by `Display`.
    pub fn message(&self) -> String {
        match self {
            LoxError::Lex { message, .. }
            | LoxError::Parse { message, .. }
            | LoxError::Resolve { message, .. }
            | LoxError::Runtime { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LoxError>;

// ─────────────────────────────────────────────────────────────────────────────
// Reporting collaborator
// ─────────────────────────────────────────────────────────────────────────────

/// Sink for every diagnostic the engine produces.
///
/// Lexical, syntactic and static‑semantic problems arrive through
/// [`error`](ErrorReporter::error) / [`warn`](ErrorReporter::warn); a failed
/// evaluation unit arrives exactly once through
/// [`runtime_error`](ErrorReporter::runtime_error).
pub trait ErrorReporter {
    fn error(&mut self, position: Position, message: &str);

    fn warn(&mut self, position: Position, message: &str);

    fn runtime_error(&mut self, error: &LoxError);

    /// Report a static error that was already built as a [`LoxError`].
    fn report(&mut self, error: &LoxError) {
        self.error(error.position().unwrap_or_default(), &error.message());
    }
}

impl<R: ErrorReporter + ?Sized> ErrorReporter for &mut R {
    fn error(&mut self, position: Position, message: &str) {
        (**self).error(position, message);
    }

    fn warn(&mut self, position: Position, message: &str) {
        (**self).warn(position, message);
    }

    fn runtime_error(&mut self, error: &LoxError) {
        (**self).runtime_error(error);
    }
}

/// Writes diagnostics to stderr in the classic `[line N] Error: …` layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl ErrorReporter for ConsoleReporter {
    fn error(&mut self, position: Position, message: &str) {
        eprintln!("[line {}] Error: {}", position.line, message);
    }

    fn warn(&mut self, position: Position, message: &str) {
        eprintln!("[line {}] Warning: {}", position.line, message);
    }

    fn runtime_error(&mut self, error: &LoxError) {
        eprintln!("{}", error);
    }
}

/// Swallows everything. Used for speculative parses.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ErrorReporter for SilentReporter {
    fn error(&mut self, _position: Position, _message: &str) {}

    fn warn(&mut self, _position: Position, _message: &str) {}

    fn runtime_error(&mut self, _error: &LoxError) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One recorded report, as handed to editor tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub position: Position,
    pub message: String,
}

/// Records every report as a [`Diagnostic`].
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl ErrorReporter for DiagnosticCollector {
    fn error(&mut self, position: Position, message: &str) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            position,
            message: message.to_owned(),
        });
    }

    fn warn(&mut self, position: Position, message: &str) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            position,
            message: message.to_owned(),
        });
    }

    fn runtime_error(&mut self, error: &LoxError) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            position: error.position().unwrap_or_default(),
            message: error.message(),
        });
    }
}

/// Forwards to an inner reporter while counting what passes through.
///
/// Hosts thread one of these per evaluation unit instead of keeping
/// process‑wide "had error" flags.
pub struct Tally<'r> {
    inner: &'r mut dyn ErrorReporter,
    pub errors: usize,
    pub warnings: usize,
    pub runtime_errors: usize,
}

impl<'r> Tally<'r> {
    pub fn new(inner: &'r mut dyn ErrorReporter) -> Self {
        Self {
            inner,
            errors: 0,
            warnings: 0,
            runtime_errors: 0,
        }
    }

    pub fn had_error(&self) -> bool {
        self.errors > 0
    }

    pub fn had_runtime_error(&self) -> bool {
        self.runtime_errors > 0
    }
}

impl ErrorReporter for Tally<'_> {
    fn error(&mut self, position: Position, message: &str) {
        self.errors += 1;
        self.inner.error(position, message);
    }

    fn warn(&mut self, position: Position, message: &str) {
        self.warnings += 1;
        self.inner.warn(position, message);
    }

    fn runtime_error(&mut self, error: &LoxError) {
        info!("Runtime error reported: {}", error.message());

        self.runtime_errors += 1;
        self.inner.runtime_error(error);
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_invalid_utf8_has_no_position() {
        let bad = String::from_utf8(vec![b'p', 0xff]).unwrap_err();
        let error = LoxError::from(bad);

        assert!(matches!(error, LoxError::Utf8(_)));
        assert_eq!(error.position(), None);
        assert_eq!(error.message(), error.to_string());
    }

    #[test]
    fn test_report_forwards_a_built_error() {
        let mut collector = DiagnosticCollector::new();
        let mut tally = Tally::new(&mut collector);

        let error = LoxError::resolve(Position::new(2, 7, 8), "Can't break outside of a loop.");
        tally.report(&error);

        assert!(tally.had_error());
        assert_eq!(tally.errors, 1);
        assert!(!tally.had_runtime_error());
        drop(tally);

        assert_eq!(
            collector.diagnostics,
            vec![Diagnostic {
                severity: Severity::Error,
                position: Position::new(2, 7, 8),
                message: "Can't break outside of a loop.".to_owned(),
            }]
        );
    }
}
