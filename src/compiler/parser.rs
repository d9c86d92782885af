use std::io::Write;

use crate::common::{Reporter, Span, SyntaxError};
use crate::construct::{
    ClassDecl, Expr, ExprKind, FunctionDecl, LiteralValue, LogicalOp, Stmt, Token, TokenKind,
};

const MAX_ARGS: usize = 255;

/// Recursive-descent parser with one token of lookahead.
///
/// A flat token buffer plus a `current` cursor, with errors threaded
/// through as `Result<_, SyntaxError>` and panic-mode synchronization to
/// recover after a malformed statement.
pub struct Parser<'r, W: Write> {
    tokens: Vec<Token>,
    current: usize,
    reporter: &'r mut Reporter<W>,
}

type PResult<T> = Result<T, SyntaxError>;

impl<'r, W: Write> Parser<'r, W> {
    pub fn new(tokens: Vec<Token>, reporter: &'r mut Reporter<W>) -> Parser<'r, W> {
        Parser { tokens, current: 0, reporter }
    }

    pub fn parse(mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        statements
    }

    // -- token stream primitives --------------------------------------

    fn peek(&self) -> &Token { &self.tokens[self.current] }

    fn previous(&self) -> &Token { &self.tokens[self.current - 1] }

    fn is_at_end(&self) -> bool { self.peek().kind == TokenKind::Eof }

    fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous().clone()
    }

    fn matches(&mut self, kinds: &[TokenKind]) -> bool {
        for &kind in kinds {
            if self.check(kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(message))
        }
    }

    fn error_at_current(&mut self, message: &str) -> SyntaxError {
        self.error_at(&self.peek().clone(), message)
    }

    fn error_at(&mut self, token: &Token, message: &str) -> SyntaxError {
        let at = if token.kind == TokenKind::Eof {
            "at end".to_string()
        } else {
            format!("at '{}'", token.lexeme)
        };
        let err = SyntaxError::new(Span::new(token.line), at, message.to_string());
        self.reporter.report_syntax(&err);
        err
    }

    /// Panic-mode recovery: discard tokens until the previous one was a
    /// `;`, or the next one starts a new statement.
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            use TokenKind::*;
            if matches!(
                self.peek().kind,
                Class | Fun | Var | For | If | While | Print | Return
            ) {
                return;
            }
            self.advance();
        }
    }

    // -- declarations ----------------------------------------------------

    fn declaration(&mut self) -> Option<Stmt> {
        let result = if self.matches(&[TokenKind::Class]) {
            self.class_declaration()
        } else if self.matches(&[TokenKind::Fun]) {
            self.function("function").map(Stmt::Function)
        } else if self.matches(&[TokenKind::Var]) {
            self.var_declaration()
        } else {
            self.statement()
        };

        match result {
            Ok(stmt) => Some(stmt),
            Err(_) => {
                self.synchronize();
                None
            }
        }
    }

    fn class_declaration(&mut self) -> PResult<Stmt> {
        let name = self.consume(TokenKind::Identifier, "Expect class name.")?;

        let superclass = if self.matches(&[TokenKind::Less]) {
            let super_name = self.consume(TokenKind::Identifier, "Expect superclass name.")?;
            Some(Expr::new(ExprKind::Variable(super_name)))
        } else {
            None
        };

        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.")?;
        let mut methods = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            methods.push(self.function("method")?);
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.")?;

        Ok(Stmt::Class(ClassDecl { name, superclass, methods }))
    }

    fn function(&mut self, kind: &str) -> PResult<FunctionDecl> {
        let name = self.consume(TokenKind::Identifier, &format!("Expect {} name.", kind))?;
        self.consume(TokenKind::LeftParen, &format!("Expect '(' after {} name.", kind))?;
        let params = self.parameters()?;
        self.consume(TokenKind::LeftBrace, &format!("Expect '{{' before {} body.", kind))?;
        let body = self.block()?;
        Ok(FunctionDecl { name, params, body })
    }

    fn parameters(&mut self) -> PResult<Vec<Token>> {
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if params.len() >= MAX_ARGS {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                params.push(self.consume(TokenKind::Identifier, "Expect parameter name.")?);
                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.")?;
        Ok(params)
    }

    fn var_declaration(&mut self) -> PResult<Stmt> {
        let name = self.consume(TokenKind::Identifier, "Expect variable name.")?;
        let initializer = if self.matches(&[TokenKind::Equal]) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.")?;
        Ok(Stmt::Var(name, initializer))
    }

    // -- statements --------------------------------------------------------

    fn statement(&mut self) -> PResult<Stmt> {
        if self.matches(&[TokenKind::For]) {
            self.for_statement()
        } else if self.matches(&[TokenKind::If]) {
            self.if_statement()
        } else if self.matches(&[TokenKind::Print]) {
            self.print_statement()
        } else if self.matches(&[TokenKind::Return]) {
            self.return_statement()
        } else if self.matches(&[TokenKind::While]) {
            self.while_statement()
        } else if self.matches(&[TokenKind::LeftBrace]) {
            Ok(Stmt::Block(self.block()?))
        } else {
            self.expression_statement()
        }
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.")?;
        Ok(statements)
    }

    /// Desugars `for (init; cond; incr) body` into
    /// `{ init; while (cond) { body; incr; } }`, so the evaluator never
    /// needs a dedicated for-node.
    fn for_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if self.matches(&[TokenKind::Semicolon]) {
            None
        } else if self.matches(&[TokenKind::Var]) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(TokenKind::Semicolon) {
            self.expression()?
        } else {
            Expr::new(ExprKind::Literal(LiteralValue::Bool(true)))
        };
        self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if !self.check(TokenKind::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::RightParen, "Expect ')' after for clauses.")?;

        let mut body = self.statement()?;

        if let Some(increment) = increment {
            body = Stmt::Block(vec![body, Stmt::Expression(increment)]);
        }

        body = Stmt::While(condition, Box::new(body));

        if let Some(initializer) = initializer {
            body = Stmt::Block(vec![initializer, body]);
        }

        Ok(body)
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "Expect ')' after if condition.")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.matches(&[TokenKind::Else]) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If(condition, then_branch, else_branch))
    }

    fn print_statement(&mut self) -> PResult<Stmt> {
        let value = self.expression()?;
        self.consume(TokenKind::Semicolon, "Expect ';' after value.")?;
        Ok(Stmt::Print(value))
    }

    fn return_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();
        let value = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expect ';' after return value.")?;
        Ok(Stmt::Return(keyword, value))
    }

    fn while_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "Expect ')' after condition.")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While(condition, body))
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.expression()?;
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.")?;
        Ok(Stmt::Expression(expr))
    }

    // -- expressions, precedence low to high ------------------------------

    fn expression(&mut self) -> PResult<Expr> { self.assignment() }

    fn assignment(&mut self) -> PResult<Expr> {
        let expr = self.ternary()?;

        if self.matches(&[TokenKind::Equal]) {
            let equals = self.previous().clone();
            let value = self.assignment()?;

            return Ok(match expr.kind {
                ExprKind::Variable(name) => Expr::new(ExprKind::Assign(name, Box::new(value))),
                ExprKind::Get(object, name) => {
                    Expr::new(ExprKind::Set(object, name, Box::new(value)))
                }
                _ => {
                    self.error_at(&equals, "Invalid assignment target");
                    expr
                }
            });
        }

        Ok(expr)
    }

    fn ternary(&mut self) -> PResult<Expr> {
        let cond = self.logic_or()?;

        if self.matches(&[TokenKind::Question]) {
            let then_branch = self.expression()?;
            self.consume(TokenKind::Colon, "Expect ':' after '?' branch of ternary.")?;
            let else_branch = self.expression()?;
            return Ok(Expr::new(ExprKind::Ternary(
                Box::new(cond),
                Box::new(then_branch),
                Box::new(else_branch),
            )));
        }

        Ok(cond)
    }

    fn logic_or(&mut self) -> PResult<Expr> {
        let mut expr = self.logic_and()?;
        while self.matches(&[TokenKind::Or]) {
            let right = self.logic_and()?;
            expr = Expr::new(ExprKind::Logical(Box::new(expr), LogicalOp::Or, Box::new(right)));
        }
        Ok(expr)
    }

    fn logic_and(&mut self) -> PResult<Expr> {
        let mut expr = self.equality()?;
        while self.matches(&[TokenKind::And]) {
            let right = self.equality()?;
            expr = Expr::new(ExprKind::Logical(Box::new(expr), LogicalOp::And, Box::new(right)));
        }
        Ok(expr)
    }

    fn equality(&mut self) -> PResult<Expr> {
        self.left_assoc_binary(Self::comparison, &[TokenKind::BangEqual, TokenKind::EqualEqual])
    }

    fn comparison(&mut self) -> PResult<Expr> {
        self.left_assoc_binary(
            Self::term,
            &[TokenKind::Greater, TokenKind::GreaterEqual, TokenKind::Less, TokenKind::LessEqual],
        )
    }

    fn term(&mut self) -> PResult<Expr> {
        self.left_assoc_binary(Self::factor, &[TokenKind::Minus, TokenKind::Plus])
    }

    fn factor(&mut self) -> PResult<Expr> {
        self.left_assoc_binary(Self::unary, &[TokenKind::Slash, TokenKind::Star])
    }

    /// Builds a left-deep tree: parse one operand, then fold in
    /// `operator operand` pairs for as long as the operator matches.
    fn left_assoc_binary(
        &mut self,
        mut operand: impl FnMut(&mut Self) -> PResult<Expr>,
        operators: &[TokenKind],
    ) -> PResult<Expr> {
        let mut expr = operand(self)?;
        while self.matches(operators) {
            let op = self.previous().clone();
            let right = operand(self)?;
            expr = Expr::new(ExprKind::Binary(Box::new(expr), op, Box::new(right)));
        }
        Ok(expr)
    }

    fn unary(&mut self) -> PResult<Expr> {
        if self.matches(&[TokenKind::Bang, TokenKind::Minus]) {
            let op = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::new(ExprKind::Unary(op, Box::new(right))));
        }
        self.call()
    }

    fn call(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.matches(&[TokenKind::LeftParen]) {
                expr = self.finish_call(expr)?;
            } else if self.matches(&[TokenKind::Dot]) {
                let name = self.consume(TokenKind::Identifier, "Expect property name after '.'.")?;
                expr = Expr::new(ExprKind::Get(Box::new(expr), name));
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> PResult<Expr> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if args.len() >= MAX_ARGS {
                    self.error_at_current("Can't have more than 255 arguments.");
                }
                args.push(self.expression()?);
                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        let paren = self.consume(TokenKind::RightParen, "Expect ')' after arguments.")?;
        Ok(Expr::new(ExprKind::Call(Box::new(callee), paren, args)))
    }

    fn primary(&mut self) -> PResult<Expr> {
        use TokenKind::*;

        if self.matches(&[False]) {
            return Ok(Expr::new(ExprKind::Literal(LiteralValue::Bool(false))));
        }
        if self.matches(&[True]) {
            return Ok(Expr::new(ExprKind::Literal(LiteralValue::Bool(true))));
        }
        if self.matches(&[Nil]) {
            return Ok(Expr::new(ExprKind::Literal(LiteralValue::Nil)));
        }
        if self.matches(&[Number, String]) {
            let literal = self.previous().literal.clone().expect("scanner always attaches a literal");
            let value = match literal {
                crate::construct::Literal::Number(n) => LiteralValue::Number(n),
                crate::construct::Literal::Str(s) => LiteralValue::Str(s),
            };
            return Ok(Expr::new(ExprKind::Literal(value)));
        }
        if self.matches(&[This]) {
            return Ok(Expr::new(ExprKind::This(self.previous().clone())));
        }
        if self.matches(&[Super]) {
            let keyword = self.previous().clone();
            self.consume(Dot, "Expect '.' after 'super'.")?;
            let method = self.consume(Identifier, "Expect superclass method name.")?;
            return Ok(Expr::new(ExprKind::Super(keyword, method)));
        }
        if self.matches(&[Identifier]) {
            return Ok(Expr::new(ExprKind::Variable(self.previous().clone())));
        }
        if self.matches(&[LeftParen]) {
            let expr = self.expression()?;
            self.consume(RightParen, "Expect ')' after expression.")?;
            return Ok(Expr::new(ExprKind::Grouping(Box::new(expr))));
        }
        if self.matches(&[Fun]) {
            let keyword = self.previous().clone();
            self.consume(LeftParen, "Expect '(' after 'fun'.")?;
            let params = self.parameters()?;
            self.consume(LeftBrace, "Expect '{' before lambda body.")?;
            let body = self.block()?;
            return Ok(Expr::new(ExprKind::Lambda(keyword, params, body)));
        }

        Err(self.error_at_current("Expect expression."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Reporter, Source};
    use crate::compiler::scanner::Scanner;

    fn parse(source: &str) -> (Vec<Stmt>, bool) {
        let mut reporter = Reporter::new(Vec::new());
        let tokens = Scanner::new(Source::line(source), &mut reporter).scan_tokens();
        let stmts = Parser::new(tokens, &mut reporter).parse();
        (stmts, reporter.had_error())
    }

    #[test]
    fn binary_operators_are_left_associative() {
        let (stmts, had_error) = parse("1 - 2 - 3;");
        assert!(!had_error);
        match &stmts[0] {
            Stmt::Expression(Expr { kind: ExprKind::Binary(left, _, _), .. }) => {
                assert!(matches!(left.kind, ExprKind::Binary(..)));
            }
            other => panic!("expected binary expression statement, got {:?}", other),
        }
    }

    #[test]
    fn assignment_is_right_associative_and_unary_recurses() {
        let (stmts, had_error) = parse("a = b = - - 1;");
        assert!(!had_error);
        assert!(matches!(
            &stmts[0],
            Stmt::Expression(Expr { kind: ExprKind::Assign(_, _), .. })
        ));
    }

    #[test]
    fn ternary_parses_between_assignment_and_or() {
        let (stmts, had_error) = parse("x = true ? 1 : 2;");
        assert!(!had_error);
        if let Stmt::Expression(Expr { kind: ExprKind::Assign(_, value), .. }) = &stmts[0] {
            assert!(matches!(value.kind, ExprKind::Ternary(..)));
        } else {
            panic!("expected assignment");
        }
    }

    #[test]
    fn for_desugars_to_block_with_while() {
        let (stmts, had_error) = parse("for (var i = 0; i < 3; i = i + 1) print i;");
        assert!(!had_error);
        match &stmts[0] {
            Stmt::Block(inner) => {
                assert_eq!(inner.len(), 2);
                assert!(matches!(inner[0], Stmt::Var(..)));
                assert!(matches!(inner[1], Stmt::While(..)));
            }
            other => panic!("expected desugared block, got {:?}", other),
        }
    }

    #[test]
    fn for_with_missing_clauses() {
        let (stmts, had_error) = parse("for (;;) print 1;");
        assert!(!had_error);
        // No initializer means no wrapping block, just the while loop.
        assert!(matches!(stmts[0], Stmt::While(..)));
    }

    #[test]
    fn call_chaining_handles_calls_and_properties() {
        let (stmts, had_error) = parse("a.b.c();");
        assert!(!had_error);
        if let Stmt::Expression(Expr { kind: ExprKind::Call(callee, ..), .. }) = &stmts[0] {
            assert!(matches!(callee.kind, ExprKind::Get(..)));
        } else {
            panic!("expected call expression");
        }
    }

    #[test]
    fn invalid_assignment_target_reports_but_does_not_abort() {
        let (stmts, had_error) = parse("1 = 2;");
        assert!(had_error);
        // the left-hand expression (1) is still returned as-is.
        assert!(matches!(
            &stmts[0],
            Stmt::Expression(Expr { kind: ExprKind::Literal(LiteralValue::Number(n)), .. }) if *n == 1.0
        ));
    }

    #[test]
    fn synchronize_recovers_after_a_bad_statement() {
        let (stmts, had_error) = parse("var = ; print 1;");
        assert!(had_error);
        // The bad `var` declaration is dropped, but `print 1;` still parses.
        assert_eq!(stmts.len(), 1);
        assert!(matches!(stmts[0], Stmt::Print(..)));
    }

    #[test]
    fn class_with_superclass_and_methods() {
        let (stmts, had_error) = parse("class B < A { greet() { print 1; } }");
        assert!(!had_error);
        match &stmts[0] {
            Stmt::Class(decl) => {
                assert!(decl.superclass.is_some());
                assert_eq!(decl.methods.len(), 1);
            }
            other => panic!("expected class decl, got {:?}", other),
        }
    }

    #[test]
    fn lambda_expression_parses() {
        let (stmts, had_error) = parse("var f = fun (a, b) { return a + b; };");
        assert!(!had_error);
        if let Stmt::Var(_, Some(Expr { kind: ExprKind::Lambda(_, params, _), .. })) = &stmts[0] {
            assert_eq!(params.len(), 2);
        } else {
            panic!("expected lambda initializer");
        }
    }
}
