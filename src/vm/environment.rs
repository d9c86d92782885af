use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::common::{RuntimeError, Span};
use crate::construct::Token;
use crate::vm::value::Value;

/// One lexical scope frame: a name→value map plus an optional link to the
/// scope it's nested inside. A chain of these mirrors the block/function
/// nesting the resolver already walked, so the hop counts it computed line
/// up exactly with the number of `enclosing` links to follow.
///
/// Shared via `Rc<RefCell<_>>` rather than owned by value, since closures
/// capture a handle to the environment that was live at declaration time
/// and that environment can keep being mutated by code that runs later.
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment { values: HashMap::new(), enclosing: None }))
    }

    pub fn with_enclosing(enclosing: Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment { values: HashMap::new(), enclosing: Some(enclosing) }))
    }

    pub fn define(&mut self, name: String, value: Value) {
        self.values.insert(name, value);
    }

    /// Global lookup, used only when the resolver found no local binding
    /// for a name — it walks the chain itself rather than trusting a hop
    /// count of "infinity".
    pub fn get(&self, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(value) = self.values.get(&name.lexeme) {
            return Ok(value.clone());
        }
        if let Some(enclosing) = &self.enclosing {
            return enclosing.borrow().get(name);
        }
        Err(RuntimeError::new(Span::new(name.line), format!("Undefined variable '{}'.", name.lexeme)))
    }

    pub fn assign(&mut self, name: &Token, value: Value) -> Result<(), RuntimeError> {
        if self.values.contains_key(&name.lexeme) {
            self.values.insert(name.lexeme.clone(), value);
            return Ok(());
        }
        if let Some(enclosing) = &self.enclosing {
            return enclosing.borrow_mut().assign(name, value);
        }
        Err(RuntimeError::new(Span::new(name.line), format!("Undefined variable '{}'.", name.lexeme)))
    }

    fn ancestor(env: &Rc<RefCell<Environment>>, distance: usize) -> Rc<RefCell<Environment>> {
        let mut current = env.clone();
        for _ in 0..distance {
            let next = current
                .borrow()
                .enclosing
                .clone()
                .expect("resolver-computed hop count outran the environment chain");
            current = next;
        }
        current
    }

    /// Reads a name at a hop count the resolver already computed, skipping
    /// the linear walk `get` does for unresolved (global) names.
    pub fn get_at(env: &Rc<RefCell<Environment>>, distance: usize, name: &str) -> Value {
        Environment::ancestor(env, distance)
            .borrow()
            .values
            .get(name)
            .cloned()
            .expect("resolver guarantees a binding exists at this hop count")
    }

    pub fn assign_at(env: &Rc<RefCell<Environment>>, distance: usize, name: &Token, value: Value) {
        Environment::ancestor(env, distance).borrow_mut().values.insert(name.lexeme.clone(), value);
    }
}
