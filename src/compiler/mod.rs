//! The front end: turns source text into a resolved AST ready for
//! evaluation, by chaining a scanner, parser, and resolver.

pub mod parser;
pub mod resolver;
pub mod scanner;

use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use crate::common::{Reporter, Source};
use crate::construct::{NodeId, Stmt};

pub use parser::Parser;
pub use resolver::Resolver;
pub use scanner::Scanner;

/// Runs the scan → parse → resolve pipeline over a `Source`, so callers
/// don't have to wire `Scanner`/`Parser`/`Resolver` together by hand.
///
/// Returns `None` if scanning, parsing, or resolving reported any static
/// error; callers should check `reporter.had_error()` either way, since a
/// `Some` compile can still be one half of a program that already printed
/// diagnostics for a sibling REPL line — this crate always returns the
/// freshest result.
pub fn compile<W: Write>(
    source: Rc<Source>,
    reporter: &mut Reporter<W>,
) -> Option<(Vec<Stmt>, HashMap<NodeId, usize>)> {
    let tokens = Scanner::new(source, reporter).scan_tokens();
    let statements = Parser::new(tokens, reporter).parse();

    if reporter.had_error() {
        return None;
    }

    let locals = Resolver::new(reporter).resolve(&statements);

    if reporter.had_error() {
        return None;
    }

    Some((statements, locals))
}
