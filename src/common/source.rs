use std::{fs, io, path::PathBuf, rc::Rc};

/// Some literal Lox source text, along with a name for where it came from.
///
/// Every token, AST node, and diagnostic produced downstream carries an
/// `Rc<Source>` back to the text it was produced from rather than copying
/// substrings around, so scanning, parsing, and error reporting never pay to
/// clone the program twice over.
#[derive(Debug, PartialEq, Eq)]
pub struct Source {
    pub contents: String,
    pub name: String,
}

impl Source {
    /// Wraps a raw string as a `Source`, naming it for diagnostics.
    pub fn new(contents: &str, name: &str) -> Rc<Source> {
        Rc::new(Source { contents: contents.to_string(), name: name.to_string() })
    }

    /// Reads a `Source` from a file on disk.
    pub fn path(path: &PathBuf) -> io::Result<Rc<Source>> {
        let contents = fs::read_to_string(path)?;
        Ok(Source::new(&contents, &path.display().to_string()))
    }

    /// Wraps a single REPL line as an anonymous `Source`.
    pub fn line(contents: &str) -> Rc<Source> { Source::new(contents, "<stdin>") }
}
