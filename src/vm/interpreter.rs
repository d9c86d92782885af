use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use crate::common::{Reporter, RuntimeError, Span};
use crate::construct::{Expr, ExprKind, FunctionDecl, LiteralValue, LogicalOp, NodeId, Stmt, Token, TokenKind};
use crate::vm::environment::Environment;
use crate::vm::natives::define_natives;
use crate::vm::value::{Callable, LoxClass, LoxFunction, LoxInstance, Value};

/// How a statement's execution can fail to simply fall through: either a
/// genuine runtime error, or a `return` unwinding back to the call that
/// invoked the current function. These are deliberately distinct channels,
/// since a `return` is control flow, not a failure. `?` converts a bare
/// `RuntimeError` into `Unwind::Error` automatically via the `From` impl
/// below.
pub enum Unwind {
    Error(RuntimeError),
    Return(Value),
}

impl From<RuntimeError> for Unwind {
    fn from(error: RuntimeError) -> Unwind { Unwind::Error(error) }
}

type EvalResult = Result<Value, RuntimeError>;
type ExecResult = Result<(), Unwind>;

/// Walks a resolved AST and produces values. Holds the global scope and
/// the current scope separately, so natives and top-level declarations
/// always land in `globals` regardless of how deep `environment` is
/// currently nested.
pub struct Interpreter {
    pub globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    locals: HashMap<NodeId, usize>,
}

impl Interpreter {
    pub fn new() -> Interpreter {
        let globals = Environment::new();
        define_natives(&globals);
        Interpreter { globals: globals.clone(), environment: globals, locals: HashMap::new() }
    }

    /// Runs one resolved program (or REPL line) to completion, reporting
    /// the first runtime error it hits through `reporter` and stopping
    /// there — later top-level statements in the same run don't execute,
    /// but the process itself keeps running.
    ///
    /// `locals` from successive calls accumulate rather than replace: each
    /// parse assigns its expressions fresh [`NodeId`]s, so entries from an
    /// earlier REPL line can never collide with a later one.
    pub fn interpret<W: Write>(
        &mut self,
        statements: &[Stmt],
        locals: HashMap<NodeId, usize>,
        reporter: &mut Reporter<W>,
    ) {
        self.locals.extend(locals);
        for stmt in statements {
            match self.execute_stmt(stmt, &mut reporter.sink) {
                Ok(()) => {}
                Err(Unwind::Error(error)) => {
                    reporter.report_runtime(&error);
                    break;
                }
                Err(Unwind::Return(_)) => break,
            }
        }
    }

    fn execute_stmt(&mut self, stmt: &Stmt, out: &mut dyn Write) -> ExecResult {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr, out)?;
                Ok(())
            }
            Stmt::Print(expr) => {
                let value = self.evaluate(expr, out)?;
                let _ = writeln!(out, "{}", value);
                Ok(())
            }
            Stmt::Var(name, initializer) => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr, out)?,
                    None => Value::Nil,
                };
                self.environment.borrow_mut().define(name.lexeme.clone(), value);
                Ok(())
            }
            Stmt::Block(statements) => {
                let scope = Environment::with_enclosing(self.environment.clone());
                self.execute_block(statements, scope, out)
            }
            Stmt::If(condition, then_branch, else_branch) => {
                if self.evaluate(condition, out)?.is_truthy() {
                    self.execute_stmt(then_branch, out)
                } else if let Some(else_branch) = else_branch {
                    self.execute_stmt(else_branch, out)
                } else {
                    Ok(())
                }
            }
            Stmt::While(condition, body) => {
                while self.evaluate(condition, out)?.is_truthy() {
                    self.execute_stmt(body, out)?;
                }
                Ok(())
            }
            Stmt::Function(decl) => {
                let function = LoxFunction::new(Rc::new(decl.clone()), self.environment.clone(), false);
                self.environment
                    .borrow_mut()
                    .define(decl.name.lexeme.clone(), Value::Callable(Rc::new(function)));
                Ok(())
            }
            Stmt::Return(_, value) => {
                let value = match value {
                    Some(expr) => self.evaluate(expr, out)?,
                    None => Value::Nil,
                };
                Err(Unwind::Return(value))
            }
            Stmt::Class(decl) => self.execute_class(decl, out),
        }
    }

    /// Runs `statements` with `environment` swapped in, restoring the
    /// caller's environment afterward on every path — including an error
    /// or a return unwinding through — so a failed call can never leak a
    /// callee's scope into its caller.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
        out: &mut dyn Write,
    ) -> ExecResult {
        let previous = std::mem::replace(&mut self.environment, environment);
        let mut result = Ok(());
        for stmt in statements {
            result = self.execute_stmt(stmt, out);
            if result.is_err() {
                break;
            }
        }
        self.environment = previous;
        result
    }

    fn execute_class(&mut self, decl: &crate::construct::ClassDecl, out: &mut dyn Write) -> ExecResult {
        let superclass = match &decl.superclass {
            Some(expr) => {
                let value = self.evaluate(expr, out)?;
                match value {
                    Value::Class(class) => Some(class),
                    _ => {
                        let line = match &expr.kind {
                            ExprKind::Variable(token) => token.line,
                            _ => decl.name.line,
                        };
                        return Err(Unwind::Error(RuntimeError::new(
                            Span::new(line),
                            "Superclass must be a class.".to_string(),
                        )));
                    }
                }
            }
            None => None,
        };

        self.environment.borrow_mut().define(decl.name.lexeme.clone(), Value::Nil);

        let previous = if let Some(superclass) = &superclass {
            let enclosing = Environment::with_enclosing(self.environment.clone());
            enclosing.borrow_mut().define("super".to_string(), Value::Class(superclass.clone()));
            Some(std::mem::replace(&mut self.environment, enclosing))
        } else {
            None
        };

        let mut methods = HashMap::new();
        for method in &decl.methods {
            let is_initializer = method.name.lexeme == "init";
            let function = LoxFunction::new(Rc::new(method.clone()), self.environment.clone(), is_initializer);
            methods.insert(method.name.lexeme.clone(), Rc::new(function));
        }

        if let Some(previous) = previous {
            self.environment = previous;
        }

        let class = LoxClass::new(decl.name.lexeme.clone(), superclass, methods);
        self.environment
            .borrow_mut()
            .assign(&decl.name, Value::Class(Rc::new(class)))
            .expect("class name was just defined in this scope");

        Ok(())
    }

    fn evaluate(&mut self, expr: &Expr, out: &mut dyn Write) -> EvalResult {
        match &expr.kind {
            ExprKind::Literal(value) => Ok(literal_value(value)),
            ExprKind::Grouping(inner) => self.evaluate(inner, out),
            ExprKind::Unary(op, right) => self.evaluate_unary(op, right, out),
            ExprKind::Binary(left, op, right) => self.evaluate_binary(left, op, right, out),
            ExprKind::Logical(left, op, right) => self.evaluate_logical(left, *op, right, out),
            ExprKind::Ternary(cond, then_branch, else_branch) => {
                if self.evaluate(cond, out)?.is_truthy() {
                    self.evaluate(then_branch, out)
                } else {
                    self.evaluate(else_branch, out)
                }
            }
            ExprKind::Variable(name) => self.look_up_variable(name, expr.id),
            ExprKind::Assign(name, value) => {
                let value = self.evaluate(value, out)?;
                match self.locals.get(&expr.id) {
                    Some(&distance) => Environment::assign_at(&self.environment, distance, name, value.clone()),
                    None => self.globals.borrow_mut().assign(name, value.clone())?,
                }
                Ok(value)
            }
            ExprKind::Call(callee, paren, args) => {
                let callee = self.evaluate(callee, out)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg, out)?);
                }
                self.call_value(callee, values, paren, out)
            }
            ExprKind::Get(object, name) => {
                let object = self.evaluate(object, out)?;
                match object {
                    Value::Instance(instance) => LoxInstance::get(&instance, name),
                    _ => Err(RuntimeError::new(Span::new(name.line), "Only instances have properties.".to_string())),
                }
            }
            ExprKind::Set(object, name, value) => {
                let object = self.evaluate(object, out)?;
                let instance = match object {
                    Value::Instance(instance) => instance,
                    _ => return Err(RuntimeError::new(Span::new(name.line), "Only instances have fields.".to_string())),
                };
                let value = self.evaluate(value, out)?;
                LoxInstance::set(&instance, name, value.clone());
                Ok(value)
            }
            ExprKind::This(keyword) => self.look_up_variable(keyword, expr.id),
            ExprKind::Super(keyword, method) => self.evaluate_super(keyword, method, expr.id),
            ExprKind::Lambda(keyword, params, body) => {
                let declaration = FunctionDecl {
                    name: Token::new(TokenKind::Identifier, "lambda", None, keyword.line),
                    params: params.clone(),
                    body: body.clone(),
                };
                let function = LoxFunction::new(Rc::new(declaration), self.environment.clone(), false);
                Ok(Value::Callable(Rc::new(function)))
            }
        }
    }

    fn look_up_variable(&self, name: &Token, id: NodeId) -> EvalResult {
        match self.locals.get(&id) {
            Some(&distance) => Ok(Environment::get_at(&self.environment, distance, &name.lexeme)),
            None => self.globals.borrow().get(name),
        }
    }

    fn evaluate_super(&mut self, keyword: &Token, method: &Token, id: NodeId) -> EvalResult {
        let distance = *self
            .locals
            .get(&id)
            .expect("resolver always assigns `super` a hop count inside a subclass method");
        let superclass = match Environment::get_at(&self.environment, distance, "super") {
            Value::Class(class) => class,
            _ => unreachable!("resolver only ever binds `super` to a class value"),
        };
        let instance = match Environment::get_at(&self.environment, distance - 1, "this") {
            Value::Instance(instance) => instance,
            _ => unreachable!("`this` sits exactly one scope inside `super`"),
        };

        superclass
            .find_method(&method.lexeme)
            .map(|m| Value::Callable(Rc::new(m.bind(instance))))
            .ok_or_else(|| {
                RuntimeError::new(Span::new(keyword.line), format!("Undefined property '{}'.", method.lexeme))
            })
    }

    fn call_value(&mut self, callee: Value, args: Vec<Value>, paren: &Token, out: &mut dyn Write) -> EvalResult {
        match callee {
            Value::Callable(callable) => {
                check_arity(callable.arity(), args.len(), paren)?;
                callable.call(self, out, args)
            }
            Value::Class(class) => {
                check_arity(class.arity(), args.len(), paren)?;
                let instance = Rc::new(RefCell::new(LoxInstance::new(class.clone())));
                if let Some(init) = class.find_method("init") {
                    init.bind(instance.clone()).call(self, out, args)?;
                }
                Ok(Value::Instance(instance))
            }
            _ => Err(RuntimeError::new(Span::new(paren.line), "Can only call functions and classes".to_string())),
        }
    }

    fn evaluate_logical(&mut self, left: &Expr, op: LogicalOp, right: &Expr, out: &mut dyn Write) -> EvalResult {
        let left = self.evaluate(left, out)?;
        match op {
            LogicalOp::Or if left.is_truthy() => Ok(left),
            LogicalOp::And if !left.is_truthy() => Ok(left),
            _ => self.evaluate(right, out),
        }
    }

    fn evaluate_unary(&mut self, op: &Token, right: &Expr, out: &mut dyn Write) -> EvalResult {
        let right = self.evaluate(right, out)?;
        match op.kind {
            TokenKind::Bang => Ok(Value::Bool(!right.is_truthy())),
            TokenKind::Minus => Ok(Value::Number(-number_operand(op, &right)?)),
            _ => unreachable!("parser only builds Unary with `!` or `-`"),
        }
    }

    fn evaluate_binary(&mut self, left: &Expr, op: &Token, right: &Expr, out: &mut dyn Write) -> EvalResult {
        let left = self.evaluate(left, out)?;
        let right = self.evaluate(right, out)?;

        match op.kind {
            // Classical Lox only overloads `+` for number+number and
            // string+string; this dialect additionally coerces the other
            // operand to its display form whenever either side is already
            // a string.
            TokenKind::Plus => match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::Str(_), _) | (_, Value::Str(_)) => Ok(Value::str(format!("{}{}", left, right))),
                _ => Err(RuntimeError::new(
                    Span::new(op.line),
                    "Operands must be two numbers or two strings.".to_string(),
                )),
            },
            TokenKind::Minus => Ok(Value::Number(number_operand(op, &left)? - number_operand(op, &right)?)),
            TokenKind::Star => Ok(Value::Number(number_operand(op, &left)? * number_operand(op, &right)?)),
            TokenKind::Slash => {
                let divisor = number_operand(op, &right)?;
                if divisor == 0.0 {
                    return Err(RuntimeError::new(Span::new(op.line), "Cannot divide by 0".to_string()));
                }
                Ok(Value::Number(number_operand(op, &left)? / divisor))
            }
            TokenKind::Greater => Ok(Value::Bool(number_operand(op, &left)? > number_operand(op, &right)?)),
            TokenKind::GreaterEqual => Ok(Value::Bool(number_operand(op, &left)? >= number_operand(op, &right)?)),
            TokenKind::Less => Ok(Value::Bool(number_operand(op, &left)? < number_operand(op, &right)?)),
            TokenKind::LessEqual => Ok(Value::Bool(number_operand(op, &left)? <= number_operand(op, &right)?)),
            TokenKind::BangEqual => Ok(Value::Bool(!left.is_equal(&right))),
            TokenKind::EqualEqual => Ok(Value::Bool(left.is_equal(&right))),
            _ => unreachable!("parser only builds Binary with arithmetic/comparison/equality operators"),
        }
    }
}

fn literal_value(value: &LiteralValue) -> Value {
    match value {
        LiteralValue::Nil => Value::Nil,
        LiteralValue::Bool(b) => Value::Bool(*b),
        LiteralValue::Number(n) => Value::Number(*n),
        LiteralValue::Str(s) => Value::str(s.clone()),
    }
}

fn number_operand(op: &Token, value: &Value) -> Result<f64, RuntimeError> {
    match value {
        Value::Number(n) => Ok(*n),
        _ => Err(RuntimeError::new(Span::new(op.line), "Operand must be a number.".to_string())),
    }
}

fn check_arity(expected: usize, got: usize, paren: &Token) -> Result<(), RuntimeError> {
    if expected != got {
        Err(RuntimeError::new(
            Span::new(paren.line),
            format!("Expected {} arguments, but got {}", expected, got),
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Source;
    use crate::compiler::compile;

    fn run(source: &str) -> (String, bool, bool) {
        let mut reporter = Reporter::new(Vec::new());
        let mut interpreter = Interpreter::new();
        if let Some((statements, locals)) = compile(Source::line(source), &mut reporter) {
            interpreter.interpret(&statements, locals, &mut reporter);
        }
        let output = String::from_utf8(reporter.sink.clone()).expect("interpreter only ever writes UTF-8 text");
        (output, reporter.had_error(), reporter.had_runtime_error())
    }

    #[test]
    fn arithmetic_and_print() {
        let (out, had_error, had_runtime) = run("print 1 + 2 * 3;");
        assert!(!had_error && !had_runtime);
        assert_eq!(out, "7\n");
    }

    #[test]
    fn string_concatenation_via_plus() {
        let (out, ..) = run(r#"print "foo" + "bar";"#);
        assert_eq!(out, "foobar\n");
    }

    #[test]
    fn string_plus_number_coerces_the_number_to_its_display_form() {
        let (out, had_error, had_runtime) = run(r#"var x = "hi "; x = x + 42; print x;"#);
        assert!(!had_error && !had_runtime);
        assert_eq!(out, "hi 42\n");
    }

    #[test]
    fn adding_two_non_string_non_number_values_is_a_runtime_error() {
        let (_, _, had_runtime) = run("print true + nil;");
        assert!(had_runtime);
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let (_, _, had_runtime) = run("print 1 / 0;");
        assert!(had_runtime);
    }

    #[test]
    fn integral_numbers_print_without_trailing_zero() {
        let (out, ..) = run("print 6 / 2;");
        assert_eq!(out, "3\n");
    }

    #[test]
    fn closures_capture_their_defining_environment() {
        let (out, had_error, had_runtime) = run(
            "fun makeCounter() { var i = 0; fun inc() { i = i + 1; return i; } return inc; } \
             var counter = makeCounter(); print counter(); print counter();",
        );
        assert!(!had_error && !had_runtime);
        assert_eq!(out, "1\n2\n");
    }

    #[test]
    fn classes_methods_and_this() {
        let (out, had_error, had_runtime) = run(
            "class Greeter { greet() { return \"hi, \" + this.name; } } \
             var g = Greeter(); g.name = \"ada\"; print g.greet();",
        );
        assert!(!had_error && !had_runtime);
        assert_eq!(out, "hi, ada\n");
    }

    #[test]
    fn init_always_returns_the_instance() {
        let (out, had_error, had_runtime) = run(
            "class Box { init(v) { this.v = v; return; } } \
             var b = Box(7); print b.v;",
        );
        assert!(!had_error && !had_runtime);
        assert_eq!(out, "7\n");
    }

    #[test]
    fn single_inheritance_and_super() {
        let (out, had_error, had_runtime) = run(
            "class A { greet() { return \"A\"; } } \
             class B < A { greet() { return super.greet() + \"B\"; } } \
             print B().greet();",
        );
        assert!(!had_error && !had_runtime);
        assert_eq!(out, "AB\n");
    }

    #[test]
    fn ternary_short_circuits_the_untaken_branch() {
        let (out, had_error, had_runtime) = run(
            "fun boom() { print \"boom\"; return 1; } \
             print true ? 1 : boom();",
        );
        assert!(!had_error && !had_runtime);
        assert_eq!(out, "1\n");
    }

    #[test]
    fn calling_with_wrong_arity_is_a_runtime_error() {
        let (_, _, had_runtime) = run("fun f(a) { return a; } f(1, 2);");
        assert!(had_runtime);
    }

    #[test]
    fn lambda_expressions_are_callable_closures() {
        let (out, had_error, had_runtime) = run("var square = fun (x) { return x * x; }; print square(4);");
        assert!(!had_error && !had_runtime);
        assert_eq!(out, "16\n");
    }

    #[test]
    fn undefined_variable_is_a_runtime_error() {
        let (_, _, had_runtime) = run("print doesNotExist;");
        assert!(had_runtime);
    }
}
