//! Host bindings (§13): the small set of native functions and permanent
//! prototypes a script can observe without any further host integration.
//! Grounded on `cjsruntime.h`'s `_permanents_t` for the shape (a handful of
//! named singletons installed once at engine construction) and on the
//! `print`-based testable scenarios for the one native function this
//! interpreter actually needs.

use crate::engine::Engine;
use crate::error::RuntimeError;
use crate::value::{Callable, JsFunction, JsObject, Value, ValueId};
use crate::Position;

/// Every native function name this module answers to, wired into the
/// global object at engine construction. [`call`] dispatches back here by
/// name rather than by a function pointer, since [`Callable::Native`] is
/// just a `&'static str` (§3).
const NATIVE_NAMES: &[&str] = &["print"];

pub fn install(engine: &mut Engine) {
    for name in NATIVE_NAMES {
        let f = Value::Function(JsFunction {
            object: JsObject::new(Some(engine.function_proto)),
            callable: Callable::Native(name),
            name: name.to_string(),
        });
        let id = engine.heap.alloc(f);
        engine.global_set(name, id);
    }
}

/// Dispatch a native call by name (§13). `this_val` is intentionally
/// unused by every binding registered here — none of them are methods.
pub fn call(engine: &mut Engine, name: &'static str, args: &[ValueId], position: Position) -> Result<ValueId, RuntimeError> {
    match name {
        "print" => {
            let line = args
                .iter()
                .map(|&a| engine.to_display_string(a))
                .collect::<Vec<_>>()
                .join(" ");
            engine.output.push(line);
            Ok(engine.undefined_id())
        }
        _ => Err(RuntimeError::new(position, format!("native function '{name}' is not implemented"))),
    }
}
