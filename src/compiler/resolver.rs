use std::collections::HashMap;
use std::io::Write;

use crate::common::{Reporter, Span, SyntaxError};
use crate::construct::{ClassDecl, Expr, ExprKind, FunctionDecl, NodeId, Stmt, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    None,
    Function,
    Lambda,
    Initializer,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassKind {
    None,
    Class,
    Subclass,
}

/// The static resolver pass: walks the parsed AST once, before evaluation,
/// and for every variable-use expression records how many enclosing scopes
/// separate it from the scope that declares it.
///
/// A stack of scope maps, with `declare`/`define` split into two steps so a
/// name is visible but not yet usable while its own initializer runs.
/// Results are keyed by [`NodeId`] rather than node address, and
/// `this`/`super`/class nesting is tracked alongside lexical scope.
pub struct Resolver<'r, W: Write> {
    scopes: Vec<HashMap<String, bool>>,
    locals: HashMap<NodeId, usize>,
    current_function: FunctionKind,
    current_class: ClassKind,
    reporter: &'r mut Reporter<W>,
}

impl<'r, W: Write> Resolver<'r, W> {
    pub fn new(reporter: &'r mut Reporter<W>) -> Resolver<'r, W> {
        Resolver {
            scopes: Vec::new(),
            locals: HashMap::new(),
            current_function: FunctionKind::None,
            current_class: ClassKind::None,
            reporter,
        }
    }

    pub fn resolve(mut self, statements: &[Stmt]) -> HashMap<NodeId, usize> {
        self.resolve_stmts(statements);
        self.locals
    }

    fn resolve_stmts(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            self.resolve_stmt(stmt);
        }
    }

    fn begin_scope(&mut self) { self.scopes.push(HashMap::new()); }

    fn end_scope(&mut self) { self.scopes.pop(); }

    fn error(&mut self, token: &Token, message: &str) {
        let at = format!("at '{}'", token.lexeme);
        let err = SyntaxError::new(Span::new(token.line), at, message.to_string());
        self.reporter.report_syntax(&err);
    }

    /// Adds `name` to the innermost scope, marked not-yet-ready, so a
    /// variable can't refer to itself inside its own initializer.
    fn declare(&mut self, name: &Token) {
        let already_declared = self
            .scopes
            .last()
            .is_some_and(|scope| scope.contains_key(&name.lexeme));
        if already_declared {
            self.error(name, "Already a variable with this name in this scope.");
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), false);
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    /// Walks outward from the innermost scope; the first scope that binds
    /// `name` fixes the hop count. No entry in any scope means global, and
    /// the evaluator's environment chain encodes that the same way: absent
    /// from the map means "look it up in globals".
    fn resolve_local(&mut self, id: NodeId, name: &Token) {
        for (i, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                self.locals.insert(id, i);
                return;
            }
        }
    }

    fn resolve_function(&mut self, decl: &FunctionDecl, kind: FunctionKind) {
        let enclosing = self.current_function;
        self.current_function = kind;

        self.begin_scope();
        for param in &decl.params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_stmts(&decl.body);
        self.end_scope();

        self.current_function = enclosing;
    }

    fn resolve_class(&mut self, decl: &ClassDecl) {
        let enclosing_class = self.current_class;
        self.current_class = ClassKind::Class;

        self.declare(&decl.name);
        self.define(&decl.name);

        if let Some(superclass) = &decl.superclass {
            if let ExprKind::Variable(super_name) = &superclass.kind {
                if super_name.lexeme == decl.name.lexeme {
                    self.error(super_name, "A class can't inherit from itself.");
                }
            }
            self.current_class = ClassKind::Subclass;
            self.resolve_expr(superclass);

            self.begin_scope();
            self.scopes.last_mut().expect("begin_scope was just called").insert("super".to_string(), true);
        }

        self.begin_scope();
        self.scopes.last_mut().expect("begin_scope was just called").insert("this".to_string(), true);

        for method in &decl.methods {
            let kind = if method.name.lexeme == "init" {
                FunctionKind::Initializer
            } else {
                FunctionKind::Method
            };
            self.resolve_function(method, kind);
        }

        self.end_scope();

        if decl.superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression(expr) => self.resolve_expr(expr),
            Stmt::Print(expr) => self.resolve_expr(expr),
            Stmt::Var(name, initializer) => {
                self.declare(name);
                if let Some(init) = initializer {
                    self.resolve_expr(init);
                }
                self.define(name);
            }
            Stmt::Block(statements) => {
                self.begin_scope();
                self.resolve_stmts(statements);
                self.end_scope();
            }
            Stmt::If(condition, then_branch, else_branch) => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            Stmt::While(condition, body) => {
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }
            Stmt::Function(decl) => {
                self.declare(&decl.name);
                self.define(&decl.name);
                self.resolve_function(decl, FunctionKind::Function);
            }
            Stmt::Return(keyword, value) => {
                if self.current_function == FunctionKind::None {
                    self.error(keyword, "Can't return from top-level code.");
                }
                if let Some(value) = value {
                    if self.current_function == FunctionKind::Initializer {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(value);
                }
            }
            Stmt::Class(decl) => self.resolve_class(decl),
        }
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Grouping(inner) => self.resolve_expr(inner),
            ExprKind::Unary(_, right) => self.resolve_expr(right),
            ExprKind::Binary(left, _, right) => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            ExprKind::Logical(left, _, right) => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            ExprKind::Ternary(cond, then_branch, else_branch) => {
                self.resolve_expr(cond);
                self.resolve_expr(then_branch);
                self.resolve_expr(else_branch);
            }
            ExprKind::Variable(name) => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme) == Some(&false) {
                        self.error(name, "Can't read local variable in its own initializer.");
                    }
                }
                self.resolve_local(expr.id, name);
            }
            ExprKind::Assign(name, value) => {
                self.resolve_expr(value);
                self.resolve_local(expr.id, name);
            }
            ExprKind::Call(callee, _, args) => {
                self.resolve_expr(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::Get(object, _) => self.resolve_expr(object),
            ExprKind::Set(object, _, value) => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            ExprKind::This(keyword) => {
                if self.current_class == ClassKind::None {
                    self.error(keyword, "Can't use 'this' outside of a class.");
                    return;
                }
                self.resolve_local(expr.id, keyword);
            }
            ExprKind::Super(keyword, _) => {
                if self.current_class == ClassKind::None {
                    self.error(keyword, "Can't use 'super' outside of a class.");
                } else if self.current_class != ClassKind::Subclass {
                    self.error(keyword, "Can't use 'super' keyword in a class with no superclass");
                }
                self.resolve_local(expr.id, keyword);
            }
            ExprKind::Lambda(_, params, body) => {
                let enclosing = self.current_function;
                self.current_function = FunctionKind::Lambda;
                self.begin_scope();
                for param in params {
                    self.declare(param);
                    self.define(param);
                }
                self.resolve_stmts(body);
                self.end_scope();
                self.current_function = enclosing;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Reporter, Source};
    use crate::compiler::parser::Parser;
    use crate::compiler::scanner::Scanner;

    fn resolve(source: &str) -> (HashMap<NodeId, usize>, bool) {
        let mut reporter = Reporter::new(Vec::new());
        let tokens = Scanner::new(Source::line(source), &mut reporter).scan_tokens();
        let stmts = Parser::new(tokens, &mut reporter).parse();
        let locals = Resolver::new(&mut reporter).resolve(&stmts);
        (locals, reporter.had_error())
    }

    #[test]
    fn global_variable_has_no_hop_count() {
        let (locals, had_error) = resolve("var a = 1; print a;");
        assert!(!had_error);
        assert!(locals.is_empty());
    }

    #[test]
    fn block_local_resolves_to_zero_hops() {
        let (locals, had_error) = resolve("{ var a = 1; print a; }");
        assert!(!had_error);
        assert_eq!(locals.len(), 1);
        assert_eq!(*locals.values().next().unwrap(), 0);
    }

    #[test]
    fn nested_block_resolves_correct_hop_count() {
        let (locals, had_error) = resolve("{ var a = 1; { var b = 2; print a; } }");
        assert!(!had_error);
        // `a` is read from one block deeper than it's declared.
        assert!(locals.values().any(|&hops| hops == 1));
    }

    #[test]
    fn self_referential_initializer_is_an_error() {
        let (_, had_error) = resolve("{ var a = a; }");
        assert!(had_error);
    }

    #[test]
    fn redeclaring_in_same_scope_is_an_error() {
        let (_, had_error) = resolve("{ var a = 1; var a = 2; }");
        assert!(had_error);
    }

    #[test]
    fn shadowing_across_scopes_is_fine() {
        let (_, had_error) = resolve("var a = 1; { var a = 2; }");
        assert!(!had_error);
    }

    #[test]
    fn top_level_return_is_an_error() {
        let (_, had_error) = resolve("return 1;");
        assert!(had_error);
    }

    #[test]
    fn this_outside_class_is_an_error() {
        let (_, had_error) = resolve("print this;");
        assert!(had_error);
    }

    #[test]
    fn this_inside_method_resolves() {
        let (_, had_error) = resolve("class A { greet() { print this; } }");
        assert!(!had_error);
    }

    #[test]
    fn class_inheriting_from_itself_is_an_error() {
        let (_, had_error) = resolve("class A < A {}");
        assert!(had_error);
    }

    #[test]
    fn super_without_superclass_is_an_error() {
        let (_, had_error) = resolve("class A { greet() { super.greet(); } }");
        assert!(had_error);
    }

    #[test]
    fn super_with_superclass_resolves() {
        let (_, had_error) =
            resolve("class A { greet() {} } class B < A { greet() { super.greet(); } }");
        assert!(!had_error);
    }

    #[test]
    fn returning_a_value_from_init_is_an_error() {
        let (_, had_error) = resolve("class A { init() { return 1; } }");
        assert!(had_error);
    }

    #[test]
    fn lambda_params_are_scoped_to_its_own_body() {
        let (_, had_error) = resolve("var f = fun (a) { return a; };");
        assert!(!had_error);
    }
}
