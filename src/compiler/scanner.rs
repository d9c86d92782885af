use std::io::Write;
use std::rc::Rc;

use crate::common::{Reporter, Source, Span, SyntaxError};
use crate::construct::{Literal, Token, TokenKind};

/// Turns source text into a flat token stream, terminated by an `Eof`
/// sentinel.
///
/// An index-addressed cursor over the source with a `start`/`current` pair
/// and a running line counter, repeatedly re-set to scan one lexeme at a
/// time. A bad character is reported and scanning continues, so a single
/// run can surface more than one problem — `scan_tokens` never fails; it
/// reports through `reporter` instead.
pub struct Scanner<'r, W: Write> {
    source: Rc<Source>,
    chars: Vec<char>,
    start: usize,
    current: usize,
    line: usize,
    reporter: &'r mut Reporter<W>,
}

impl<'r, W: Write> Scanner<'r, W> {
    pub fn new(source: Rc<Source>, reporter: &'r mut Reporter<W>) -> Scanner<'r, W> {
        let chars = source.contents.chars().collect();
        Scanner { source, chars, start: 0, current: 0, line: 1, reporter }
    }

    pub fn scan_tokens(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while !self.is_at_end() {
            self.start = self.current;
            if let Some(token) = self.scan_token() {
                tokens.push(token);
            }
        }
        tokens.push(Token::eof(self.line));
        tokens
    }

    fn is_at_end(&self) -> bool { self.current >= self.chars.len() }

    fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        c
    }

    fn peek(&self) -> char { self.chars.get(self.current).copied().unwrap_or('\0') }

    fn peek_next(&self) -> char { self.chars.get(self.current + 1).copied().unwrap_or('\0') }

    fn matches(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.chars[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn lexeme(&self) -> String { self.chars[self.start..self.current].iter().collect() }

    fn make(&self, kind: TokenKind) -> Option<Token> {
        Some(Token::new(kind, self.lexeme(), None, self.line))
    }

    fn error(&mut self, message: impl Into<String>) {
        let err = SyntaxError::new(Span::new(self.line), "", message);
        self.reporter.report_syntax(&err);
    }

    fn scan_token(&mut self) -> Option<Token> {
        use TokenKind::*;
        let c = self.advance();
        match c {
            '(' => self.make(LeftParen),
            ')' => self.make(RightParen),
            '{' => self.make(LeftBrace),
            '}' => self.make(RightBrace),
            ',' => self.make(Comma),
            '.' => self.make(Dot),
            '-' => self.make(Minus),
            '+' => self.make(Plus),
            ';' => self.make(Semicolon),
            '*' => self.make(Star),
            '?' => self.make(Question),
            ':' => self.make(Colon),

            '!' => {
                let k = if self.matches('=') { BangEqual } else { Bang };
                self.make(k)
            }
            '=' => {
                let k = if self.matches('=') { EqualEqual } else { Equal };
                self.make(k)
            }
            '<' => {
                let k = if self.matches('=') { LessEqual } else { Less };
                self.make(k)
            }
            '>' => {
                let k = if self.matches('=') { GreaterEqual } else { Greater };
                self.make(k)
            }

            '/' => {
                if self.matches('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                    None
                } else if self.matches('*') {
                    self.block_comment();
                    None
                } else {
                    self.make(Slash)
                }
            }

            ' ' | '\r' | '\t' => None,
            '\n' => {
                self.line += 1;
                None
            }

            '"' => self.string(),

            c if c.is_ascii_digit() => self.number(),
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier(),

            _ => {
                self.error("Unexpected character.");
                None
            }
        }
    }

    /// Already consumed the opening `/*`. Maintains a depth counter so
    /// `/* /* */ */` lexes as one comment.
    fn block_comment(&mut self) {
        let mut depth = 1usize;
        while depth > 0 {
            if self.is_at_end() {
                self.error("Unterminated block comment.");
                return;
            }
            let c = self.advance();
            match c {
                '\n' => self.line += 1,
                '/' if self.peek() == '*' => {
                    self.advance();
                    depth += 1;
                }
                '*' if self.peek() == '/' => {
                    self.advance();
                    depth -= 1;
                }
                _ => {}
            }
        }
    }

    fn string(&mut self) -> Option<Token> {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            self.error("Unterminated string.");
            return None;
        }

        // the closing quote.
        self.advance();

        let value: String = self.chars[self.start + 1..self.current - 1].iter().collect();
        Some(Token::new(TokenKind::String, self.lexeme(), Some(Literal::Str(value)), self.line))
    }

    fn number(&mut self) -> Option<Token> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text = self.lexeme();
        let value: f64 = text.parse().expect("scanner only admits digit/`.` characters");
        Some(Token::new(TokenKind::Number, text, Some(Literal::Number(value)), self.line))
    }

    fn identifier(&mut self) -> Option<Token> {
        while self.peek().is_ascii_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text = self.lexeme();
        let kind = TokenKind::keyword(&text).unwrap_or(TokenKind::Identifier);
        self.make(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Reporter;

    fn scan(source: &str) -> (Vec<Token>, bool) {
        let mut reporter = Reporter::new(Vec::new());
        let tokens = Scanner::new(Source::line(source), &mut reporter).scan_tokens();
        (tokens, reporter.had_error())
    }

    #[test]
    fn single_char_tokens() {
        let (tokens, had_error) = scan("(){},.-+;*?:");
        assert!(!had_error);
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        use TokenKind::*;
        assert_eq!(
            kinds,
            vec![
                LeftParen, RightParen, LeftBrace, RightBrace, Comma, Dot, Minus, Plus,
                Semicolon, Star, Question, Colon, Eof,
            ]
        );
    }

    #[test]
    fn two_char_operators_prefer_longest_match() {
        let (tokens, _) = scan("!= == <= >= ! = < >");
        use TokenKind::*;
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![BangEqual, EqualEqual, LessEqual, GreaterEqual, Bang, Equal, Less, Greater, Eof]
        );
    }

    #[test]
    fn line_counter_tracks_newlines() {
        let (tokens, _) = scan("1\n2\n\n3");
        let lines: Vec<_> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 2, 4, 4]);
    }

    #[test]
    fn nested_block_comment_is_a_single_comment() {
        let (tokens, had_error) = scan("/* a /* b */ c */ print 1;");
        assert!(!had_error);
        use TokenKind::*;
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![Print, Number, Semicolon, Eof]);
    }

    #[test]
    fn unterminated_block_comment_reports_error() {
        let (_, had_error) = scan("/* never closes");
        assert!(had_error);
    }

    #[test]
    fn string_literal_allows_embedded_newlines() {
        let (tokens, had_error) = scan("\"a\nb\"");
        assert!(!had_error);
        assert_eq!(tokens[0].literal, Some(Literal::Str("a\nb".to_string())));
        // the string's closing quote lands on line 2.
        assert_eq!(tokens[0].line, 2);
    }

    #[test]
    fn unterminated_string_reports_error_once() {
        let (_, had_error) = scan("\"unterminated");
        assert!(had_error);
    }

    #[test]
    fn number_literal_with_fraction() {
        let (tokens, _) = scan("123.456");
        assert_eq!(tokens[0].literal, Some(Literal::Number(123.456)));
    }

    #[test]
    fn trailing_dot_without_digit_is_not_consumed() {
        let (tokens, _) = scan("123.");
        use TokenKind::*;
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![Number, Dot, Eof]);
    }

    #[test]
    fn keywords_vs_identifiers() {
        let (tokens, _) = scan("and classy or_else");
        use TokenKind::*;
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![And, Identifier, Identifier, Eof]);
    }

    #[test]
    fn unexpected_character_is_reported_and_scanning_continues() {
        let (tokens, had_error) = scan("1 @ 2");
        assert!(had_error);
        use TokenKind::*;
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![Number, Number, Eof]);
    }

    proptest::proptest! {
        #[test]
        fn every_token_lexeme_is_a_verbatim_substring(s in "[a-zA-Z0-9_ \t]{0,40}") {
            let (tokens, _) = scan(&s);
            for token in &tokens {
                if token.kind == TokenKind::Eof { continue; }
                proptest::prop_assert!(s.contains(&token.lexeme));
            }
        }

        #[test]
        fn scanner_never_panics_on_arbitrary_input(s in "\\PC*") {
            let _ = scan(&s);
        }
    }
}
