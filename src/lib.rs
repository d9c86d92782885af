//! # Lox
//!
//! A tree-walking interpreter for Lox, a small dynamically-typed
//! object-oriented scripting language with closures and single
//! inheritance.
//!
//! Source text flows through four stages before it produces output:
//!
//! 1. [`compiler::scanner::Scanner`] turns it into a flat token stream.
//! 2. [`compiler::parser::Parser`] turns the tokens into an AST
//!    ([`construct::stmt::Stmt`] / [`construct::expr::Expr`]).
//! 3. [`compiler::resolver::Resolver`] walks the AST once to record how many
//!    enclosing scopes separate each variable use from its declaration.
//! 4. [`vm::interpreter::Interpreter`] walks the AST again, this time to
//!    actually produce values, using the resolver's hop counts to find
//!    variables without re-deriving scope at every lookup.
//!
//! [`run_source`] and [`run_file`] drive all four stages for a whole
//! program; the CLI prompt loop drives them per line, reusing one
//! [`vm::interpreter::Interpreter`] so that declarations from one line stay
//! visible to the next.

pub mod common;
pub mod compiler;
pub mod construct;
pub mod vm;

use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

pub use common::{Reporter, RuntimeError, Source, Span, SyntaxError};
pub use vm::Interpreter;

/// Runs one unit of source against a fresh interpreter, the way a
/// standalone script runs. Static errors are reported and the program
/// never reaches the evaluator; a runtime error aborts evaluation but is
/// still reported rather than panicking.
pub fn run_source<W: Write>(source: Rc<Source>, reporter: &mut Reporter<W>) {
    let mut interpreter = Interpreter::new();
    run_with(&mut interpreter, source, reporter);
}

/// Runs one unit of source against an existing interpreter, so callers
/// that want state to persist across multiple runs (the REPL) can reuse
/// the same globals and closures.
pub fn run_with<W: Write>(interpreter: &mut Interpreter, source: Rc<Source>, reporter: &mut Reporter<W>) {
    if let Some((statements, locals)) = compiler::compile(source, reporter) {
        interpreter.interpret(&statements, locals, reporter);
    }
}

/// Reads and runs a file from disk. Returns the `io::Error` from a failed
/// read; static/runtime errors are reported through `reporter` instead of
/// being surfaced as a `Result`, matching `run_source`.
pub fn run_file<W: Write>(path: &PathBuf, reporter: &mut Reporter<W>) -> std::io::Result<()> {
    let source = Source::path(path)?;
    run_source(source, reporter);
    Ok(())
}
