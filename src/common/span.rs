/// A source location, trimmed down to what Lox's line-oriented diagnostics
/// need: the 1-based line a token or error occurred on.
///
/// Diagnostics only ever print `[line N]`, never a source excerpt, so this
/// is deliberately just the line number rather than a byte offset and
/// length into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub line: usize,
}

impl Span {
    pub fn new(line: usize) -> Span { Span { line } }
}
