//! A Lox session: scanner → parser → resolver → interpreter, with one
//! interpreter (and therefore one global environment) kept alive across
//! calls so a REPL can build on earlier submissions.

use std::io::Write;

use log::info;

use crate::ast::Stmt;
use crate::error::{ErrorReporter, SilentReporter, Tally};
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::Scanner;
use crate::value::Value;

/// How far one `run` got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Lexical, syntactic or resolution errors; nothing was executed.
    StaticError,
    /// Execution started and stopped at a runtime error.
    RuntimeError,
}

pub struct Lox<R: ErrorReporter> {
    reporter: R,
    interpreter: Interpreter,
    next_expr_id: usize,
}

impl<R: ErrorReporter> Lox<R> {
    pub fn new(reporter: R) -> Self {
        info!("Lox session started");

        Self {
            reporter,
            interpreter: Interpreter::new(),
            next_expr_id: 0,
        }
    }

    /// Send `print` output to `output` instead of stdout.
    pub fn with_output(mut self, output: Box<dyn Write>) -> Self {
        self.interpreter = self.interpreter.with_output(output);
        self
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Run a whole program. Static errors stop it before execution;
    /// warnings do not.
    pub fn run(&mut self, source: &str) -> RunOutcome {
        let mut tally = Tally::new(&mut self.reporter);

        let mut parser = Parser::new(Scanner::new(source), &mut tally)
            .with_first_expr_id(self.next_expr_id);
        let statements = parser.parse();
        self.next_expr_id = parser.next_expr_id();

        if tally.had_error() {
            return RunOutcome::StaticError;
        }

        let resolution = Resolver::new(&mut tally).resolve(&statements);

        if tally.had_error() {
            return RunOutcome::StaticError;
        }

        self.interpreter.add_locals(resolution.locals);

        if self.interpreter.interpret(&statements, &mut tally) {
            RunOutcome::Completed
        } else {
            RunOutcome::RuntimeError
        }
    }

    /// Evaluate `source` as a single expression. Any error is reported and
    /// yields `None`.
    pub fn evaluate_expression(&mut self, source: &str) -> Option<Value> {
        let mut tally = Tally::new(&mut self.reporter);

        let mut parser = Parser::new(Scanner::new(source), &mut tally)
            .with_first_expr_id(self.next_expr_id);
        let expr = parser.parse_expression();
        self.next_expr_id = parser.next_expr_id();

        let expr = expr.filter(|_| !tally.had_error())?;

        let statements = [Stmt::Expression(expr.clone())];
        let resolution = Resolver::new(&mut tally).resolve(&statements);

        if tally.had_error() {
            return None;
        }

        self.interpreter.add_locals(resolution.locals);

        match self.interpreter.evaluate(&expr) {
            Ok(value) => Some(value),
            Err(error) => {
                tally.runtime_error(&error);
                None
            }
        }
    }
}

/// Does `source` parse as exactly one expression? Reports nothing.
pub fn is_expression(source: &str) -> bool {
    let mut silent = SilentReporter;
    let mut tally = Tally::new(&mut silent);

    let parsed = Parser::new(Scanner::new(source), &mut tally)
        .parse_expression()
        .is_some();

    parsed && !tally.had_error()
}
