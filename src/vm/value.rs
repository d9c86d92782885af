use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use crate::common::RuntimeError;
use crate::construct::{FunctionDecl, Token};
use crate::vm::environment::Environment;
use crate::vm::interpreter::{Interpreter, Unwind};

/// A value the evaluator can produce or bind a name to: nil, booleans,
/// numbers, strings, plus the callables and objects classes introduce.
///
/// One flat enum covering every runtime value, `Clone` and cheap to pass
/// around — functions and natives unify behind the `Callable` trait
/// object, while classes dispatch through their own `Value::Class` arm
/// since instantiating one produces an instance, not whatever a method
/// body returns.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Callable(Rc<dyn Callable>),
    Class(Rc<LoxClass>),
    Instance(Rc<RefCell<LoxInstance>>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value { Value::Str(Rc::from(s.into())) }

    /// `nil` and `false` are the only falsy values.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Lox equality never coerces between types, unlike `==` in the scanner's
    /// host language.
    pub fn is_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    /// Integral floats print without a trailing `.0`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                let text = format!("{}", n);
                write!(f, "{}", text.strip_suffix(".0").unwrap_or(&text))
            }
            Value::Str(s) => write!(f, "{}", s),
            Value::Callable(c) => write!(f, "<fn {}>", c.name()),
            Value::Class(c) => write!(f, "{}", c.name),
            Value::Instance(i) => write!(f, "{} instance", i.borrow().class.name),
        }
    }
}

/// Anything that can appear on the left of a call expression: user-defined
/// functions/lambdas/methods, and natives like `clock`.
pub trait Callable {
    fn arity(&self) -> usize;
    fn name(&self) -> &str;
    fn call(
        &self,
        interpreter: &mut Interpreter,
        out: &mut dyn Write,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError>;
}

/// A user-defined function, method, or lambda, paired with the environment
/// it closed over at the point it was declared.
pub struct LoxFunction {
    pub declaration: Rc<FunctionDecl>,
    pub closure: Rc<RefCell<Environment>>,
    pub is_initializer: bool,
}

impl LoxFunction {
    pub fn new(
        declaration: Rc<FunctionDecl>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    ) -> LoxFunction {
        LoxFunction { declaration, closure, is_initializer }
    }

    /// Produces a copy of this method with `this` bound to `instance` in a
    /// fresh environment one level inside the method's original closure:
    /// each access to a bound method gets its own `this` scope, but they
    /// all still see the method's original lexical closure beyond that.
    pub fn bind(&self, instance: Rc<RefCell<LoxInstance>>) -> LoxFunction {
        let env = Environment::with_enclosing(self.closure.clone());
        env.borrow_mut().define("this".to_string(), Value::Instance(instance));
        LoxFunction { declaration: self.declaration.clone(), closure: env, is_initializer: self.is_initializer }
    }
}

impl Callable for LoxFunction {
    fn arity(&self) -> usize { self.declaration.params.len() }

    fn name(&self) -> &str { &self.declaration.name.lexeme }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        out: &mut dyn Write,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let env = Environment::with_enclosing(self.closure.clone());
        for (param, arg) in self.declaration.params.iter().zip(args) {
            env.borrow_mut().define(param.lexeme.clone(), arg);
        }

        // `init` always returns the instance it built, even given an
        // explicit bare `return;`, so initializers look `this` up fresh
        // rather than trusting whatever the body returned.
        match interpreter.execute_block(&self.declaration.body, env, out) {
            Ok(()) => {
                if self.is_initializer {
                    Ok(Environment::get_at(&self.closure, 0, "this"))
                } else {
                    Ok(Value::Nil)
                }
            }
            Err(Unwind::Return(value)) => {
                if self.is_initializer {
                    Ok(Environment::get_at(&self.closure, 0, "this"))
                } else {
                    Ok(value)
                }
            }
            Err(Unwind::Error(e)) => Err(e),
        }
    }
}

type NativeFn = fn(&[Value]) -> Result<Value, RuntimeError>;

/// A host-provided callable, the way `clock` is. Holds a plain function
/// pointer rather than a boxed closure since none of this crate's natives
/// need to capture state.
pub struct NativeFunction {
    pub name: String,
    pub arity: usize,
    pub func: NativeFn,
}

impl Callable for NativeFunction {
    fn arity(&self) -> usize { self.arity }

    fn name(&self) -> &str { &self.name }

    fn call(&self, _interpreter: &mut Interpreter, _out: &mut dyn Write, args: Vec<Value>) -> Result<Value, RuntimeError> {
        (self.func)(&args)
    }
}

/// A class: a name, an optional superclass, and its own (non-inherited)
/// methods. Lookup walks the superclass chain lazily rather than flattening
/// it at declaration time, so redefining a superclass's method later would
/// still be visible — though Lox has no way to redefine a class after the
/// fact, so this only matters for how `find_method` is written.
pub struct LoxClass {
    pub name: String,
    pub superclass: Option<Rc<LoxClass>>,
    pub methods: HashMap<String, Rc<LoxFunction>>,
}

impl LoxClass {
    pub fn new(
        name: String,
        superclass: Option<Rc<LoxClass>>,
        methods: HashMap<String, Rc<LoxFunction>>,
    ) -> LoxClass {
        LoxClass { name, superclass, methods }
    }

    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        if let Some(method) = self.methods.get(name) {
            return Some(method.clone());
        }
        self.superclass.as_ref().and_then(|sup| sup.find_method(name))
    }

    pub fn arity(&self) -> usize {
        self.find_method("init").map(|init| init.arity()).unwrap_or(0)
    }
}

/// An instantiated object: a reference back to its class plus its own
/// mutable field map. Wrapped in `Rc<RefCell<_>>` since
/// methods need to mutate fields through a shared, aliased handle (e.g. a
/// method storing `this` away in a closure that outlives the call).
pub struct LoxInstance {
    pub class: Rc<LoxClass>,
    pub fields: HashMap<String, Value>,
}

impl LoxInstance {
    pub fn new(class: Rc<LoxClass>) -> LoxInstance {
        LoxInstance { class, fields: HashMap::new() }
    }

    pub fn get(instance: &Rc<RefCell<LoxInstance>>, name: &Token) -> Result<Value, RuntimeError> {
        let this = instance.borrow();
        if let Some(value) = this.fields.get(&name.lexeme) {
            return Ok(value.clone());
        }
        if let Some(method) = this.class.find_method(&name.lexeme) {
            return Ok(Value::Callable(Rc::new(method.bind(instance.clone()))));
        }
        Err(RuntimeError::new(
            crate::common::Span::new(name.line),
            format!("Undefined property '{}'.", name.lexeme),
        ))
    }

    pub fn set(instance: &Rc<RefCell<LoxInstance>>, name: &Token, value: Value) {
        instance.borrow_mut().fields.insert(name.lexeme.clone(), value);
    }
}
