//! Datastructures shared by the scanner, parser, resolver, and evaluator:
//! source text, source locations, and diagnostic reporting.

pub mod reporter;
pub mod source;
pub mod span;

pub use reporter::{Reporter, RuntimeError, SyntaxError};
pub use source::Source;
pub use span::Span;
