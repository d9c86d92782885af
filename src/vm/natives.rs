use std::time::{SystemTime, UNIX_EPOCH};

use crate::common::RuntimeError;
use crate::vm::environment::Environment;
use crate::vm::value::{NativeFunction, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Seconds since the Unix epoch, as a float.
fn clock(_args: &[Value]) -> Result<Value, RuntimeError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is set after the Unix epoch");
    Ok(Value::Number(now.as_secs_f64()))
}

/// Populates the global scope with every native Lox can call directly,
/// before a program runs.
pub fn define_natives(globals: &Rc<RefCell<Environment>>) {
    globals.borrow_mut().define(
        "clock".to_string(),
        Value::Callable(Rc::new(NativeFunction { name: "clock".to_string(), arity: 0, func: clock })),
    );
}
