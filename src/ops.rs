//! Value-level operations (§3, §4.4 "C6"). Everything the interpreter needs
//! to turn a pair of [`ValueId`]s into a result — coercion, comparison,
//! property access, calls — lives here as `impl Engine` methods rather than
//! on [`Value`] itself, since most of them need to allocate into the heap
//! or resolve a prototype chain.
//!
//! The coercion matrix is grounded on `cjsrt_undefined.cpp`'s `binary_op`
//! for `jsv_undefined`, generalized to a uniform rule applied to every
//! operand type rather than special-cased per type pair: string/object
//! presence on either side of `+` forces concatenation, everything numeric
//! goes through [`Engine::to_number`], and `NaN`'s absorbing behavior in
//! IEEE 754 arithmetic reproduces the matrix's per-type special cases
//! (`0 ** x == 1`, `undefined | 0 == 0`, ...) without restating them.

use crate::bytecode::Opcode;
use crate::error::RuntimeError;
use crate::value::{Callable, JsFunction, JsObject, Value, ValueId};
use crate::Position;

impl crate::engine::Engine {
    pub fn type_of(&self, v: ValueId) -> &'static str {
        self.heap.get(v).map(Value::type_of).unwrap_or("undefined")
    }

    fn is_nullish(&self, v: ValueId) -> bool {
        matches!(self.heap.get(v), None | Some(Value::Null) | Some(Value::Undefined))
    }

    fn is_stringy(&self, v: ValueId) -> bool {
        matches!(
            self.heap.get(v),
            Some(Value::String(_)) | Some(Value::Object(_)) | Some(Value::Function(_))
        )
    }

    pub fn to_boolean(&self, v: ValueId) -> bool {
        match self.heap.get(v) {
            Some(Value::Number(n)) => *n != 0.0 && !n.is_nan(),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Boolean(b)) => *b,
            Some(Value::Null) | Some(Value::Undefined) | None => false,
            Some(Value::Object(_)) | Some(Value::Function(_)) => true,
        }
    }

    pub fn to_number(&self, v: ValueId) -> f64 {
        match self.heap.get(v) {
            Some(Value::Number(n)) => *n,
            Some(Value::String(s)) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Some(Value::Boolean(b)) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Some(Value::Null) => 0.0,
            Some(Value::Undefined) | None => f64::NAN,
            Some(Value::Object(_)) | Some(Value::Function(_)) => f64::NAN,
        }
    }

    /// Canonical string form used by `print`, string concatenation and
    /// property-key coercion alike (§8 property 6: number literals round-trip
    /// through this formatting).
    pub fn to_display_string(&self, v: ValueId) -> String {
        match self.heap.get(v) {
            Some(Value::Number(n)) => format_number(*n),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Boolean(b)) => b.to_string(),
            Some(Value::Null) => "null".to_string(),
            Some(Value::Undefined) | None => "undefined".to_string(),
            Some(Value::Object(o)) => {
                if o.class_name == "Array" {
                    self.array_display(o)
                } else {
                    "[object Object]".to_string()
                }
            }
            Some(Value::Function(f)) => format!("function {}() {{ [native code] }}", f.name),
        }
    }

    pub fn to_property_key(&self, v: ValueId) -> String {
        self.to_display_string(v)
    }

    fn array_display(&self, o: &JsObject) -> String {
        let len = o
            .special
            .get("length")
            .and_then(|id| self.heap.get(*id))
            .and_then(|v| if let Value::Number(n) = v { Some(*n as usize) } else { None })
            .unwrap_or(0);
        (0..len)
            .map(|i| match o.slots.get(&i.to_string()) {
                Some(id) => self.to_display_string(*id),
                None => String::new(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn type_tag(&self, v: ValueId) -> crate::value::TypeTag {
        self.heap.get(v).map(Value::type_tag).unwrap_or(crate::value::TypeTag::Undefined)
    }

    fn strict_eq(&self, lhs: ValueId, rhs: ValueId) -> bool {
        match (self.heap.get(lhs), self.heap.get(rhs)) {
            (Some(Value::Number(a)), Some(Value::Number(b))) => a == b,
            (Some(Value::String(a)), Some(Value::String(b))) => a == b,
            (Some(Value::Boolean(a)), Some(Value::Boolean(b))) => a == b,
            (Some(Value::Null), Some(Value::Null)) => true,
            (Some(Value::Undefined), Some(Value::Undefined)) => true,
            (Some(Value::Object(_)), Some(Value::Object(_)))
            | (Some(Value::Function(_)), Some(Value::Function(_))) => lhs == rhs,
            _ => false,
        }
    }

    fn loose_eq(&self, lhs: ValueId, rhs: ValueId) -> bool {
        if self.is_nullish(lhs) && self.is_nullish(rhs) {
            return true;
        }
        if self.is_nullish(lhs) || self.is_nullish(rhs) {
            return false;
        }
        if self.type_tag(lhs) == self.type_tag(rhs) {
            return self.strict_eq(lhs, rhs);
        }
        self.to_number(lhs) == self.to_number(rhs)
    }

    fn has_property(&self, obj: ValueId, name: &str) -> bool {
        match self.heap.get(obj) {
            Some(Value::Object(o)) => {
                o.slots.contains_key(name)
                    || o.special.contains_key(name)
                    || o.proto.map(|p| self.has_property(p, name)).unwrap_or(false)
            }
            Some(Value::Function(f)) => {
                f.object.slots.contains_key(name)
                    || f.object.special.contains_key(name)
                    || f.object.proto.map(|p| self.has_property(p, name)).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// `compare` selects its comparator the way `CompareOp`'s single operand
    /// does: 0=`<` 1=`<=` 2=`==` 3=`!=` 4=`>` 5=`>=` 6=`===` 7=`!==`,
    /// plus 8=`instanceof` 9=`in` (added by this expansion to reuse one
    /// opcode rather than introduce two more for the relational keywords).
    pub fn compare(&mut self, selector: i32, lhs: ValueId, rhs: ValueId) -> bool {
        match selector {
            0 => self.relational(lhs, rhs, |a, b| a < b),
            1 => self.relational(lhs, rhs, |a, b| a <= b),
            2 => self.loose_eq(lhs, rhs),
            3 => !self.loose_eq(lhs, rhs),
            4 => self.relational(lhs, rhs, |a, b| a > b),
            5 => self.relational(lhs, rhs, |a, b| a >= b),
            6 => self.strict_eq(lhs, rhs),
            7 => !self.strict_eq(lhs, rhs),
            8 => self.instanceof(lhs, rhs),
            9 => {
                let key = self.to_property_key(lhs);
                self.has_property(rhs, &key)
            }
            _ => false,
        }
    }

    fn relational(&self, lhs: ValueId, rhs: ValueId, cmp: impl Fn(f64, f64) -> bool) -> bool {
        if let (Some(Value::String(a)), Some(Value::String(b))) = (self.heap.get(lhs), self.heap.get(rhs)) {
            return cmp(
                if a < b { -1.0 } else if a > b { 1.0 } else { 0.0 },
                0.0,
            );
        }
        cmp(self.to_number(lhs), self.to_number(rhs))
    }

    /// No distinct per-function prototype object is modeled (every function
    /// shares one `function_proto`), so this always reports `false` unless
    /// `rhs` is literally the object whose proto chain is walked — a
    /// deliberate simplification of full constructor semantics (§1
    /// Non-goals: "Full ECMAScript conformance").
    fn instanceof(&self, lhs: ValueId, rhs: ValueId) -> bool {
        let Some(Value::Function(f)) = self.heap.get(rhs) else {
            return false;
        };
        let Some(target) = f.object.special.get("prototype").copied() else {
            return false;
        };
        let mut proto = self.heap.get(lhs).and_then(Value::proto);
        while let Some(p) = proto {
            if p == target {
                return true;
            }
            proto = self.heap.get(p).and_then(Value::proto);
        }
        false
    }

    fn add(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        if self.is_stringy(lhs) || self.is_stringy(rhs) {
            let s = format!("{}{}", self.to_display_string(lhs), self.to_display_string(rhs));
            self.heap.alloc(Value::String(s))
        } else {
            let n = self.to_number(lhs) + self.to_number(rhs);
            self.heap.alloc(Value::Number(n))
        }
    }

    pub fn binary_op(&mut self, op: Opcode, lhs: ValueId, rhs: ValueId) -> ValueId {
        use Opcode::*;
        match op {
            BinaryAdd => return self.add(lhs, rhs),
            _ => {}
        }
        let n = match op {
            BinarySubtract => self.to_number(lhs) - self.to_number(rhs),
            BinaryMultiply => self.to_number(lhs) * self.to_number(rhs),
            BinaryTrueDivide => self.to_number(lhs) / self.to_number(rhs),
            BinaryModulo => self.to_number(lhs) % self.to_number(rhs),
            BinaryPower => self.to_number(lhs).powf(self.to_number(rhs)),
            BinaryLShift => {
                let l = to_int32(self.to_number(lhs));
                let r = to_uint32(self.to_number(rhs)) & 31;
                (l << r) as f64
            }
            BinaryRShift => {
                let l = to_int32(self.to_number(lhs));
                let r = to_uint32(self.to_number(rhs)) & 31;
                (l >> r) as f64
            }
            BinaryURShift => {
                let l = to_uint32(self.to_number(lhs));
                let r = to_uint32(self.to_number(rhs)) & 31;
                (l >> r) as f64
            }
            BinaryAnd => (to_int32(self.to_number(lhs)) & to_int32(self.to_number(rhs))) as f64,
            BinaryOr => (to_int32(self.to_number(lhs)) | to_int32(self.to_number(rhs))) as f64,
            BinaryXor => (to_int32(self.to_number(lhs)) ^ to_int32(self.to_number(rhs))) as f64,
            _ => unreachable!("non-arithmetic opcode routed through binary_op"),
        };
        self.heap.alloc(Value::Number(n))
    }

    pub fn unary_op(&mut self, op: Opcode, v: ValueId) -> ValueId {
        use Opcode::*;
        let result = match op {
            UnaryPositive => Value::Number(self.to_number(v)),
            UnaryNegative => Value::Number(-self.to_number(v)),
            UnaryNot => Value::Boolean(!self.to_boolean(v)),
            UnaryInvert => Value::Number(!to_int32(self.to_number(v)) as f64),
            _ => unreachable!("non-unary opcode routed through unary_op"),
        };
        self.heap.alloc(result)
    }

    pub fn build_array(&mut self, items: Vec<ValueId>) -> ValueId {
        let mut obj = JsObject::new(Some(self.array_proto));
        obj.class_name = "Array";
        let len = items.len();
        for (i, v) in items.into_iter().enumerate() {
            obj.slots.insert(i.to_string(), v);
        }
        let len_id = self.heap.alloc(Value::Number(len as f64));
        obj.special.insert("length".to_string(), len_id);
        self.heap.alloc(Value::Object(obj))
    }

    pub fn build_object(&mut self, pairs: Vec<(String, ValueId)>) -> ValueId {
        let mut obj = JsObject::new(Some(self.object_proto));
        for (k, v) in pairs {
            obj.slots.insert(k, v);
        }
        self.heap.alloc(Value::Object(obj))
    }

    fn array_length(&self, obj: ValueId) -> f64 {
        match self.heap.get(obj) {
            Some(Value::Object(o)) => o
                .special
                .get("length")
                .and_then(|id| self.heap.get(*id))
                .and_then(|v| if let Value::Number(n) = v { Some(*n) } else { None })
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }

    fn get_from_object(&self, o: &JsObject, name: &str) -> Option<ValueId> {
        if let Some(v) = o.special.get(name) {
            return Some(*v);
        }
        if let Some(v) = o.slots.get(name) {
            return Some(*v);
        }
        match o.proto.map(|p| self.heap.get(p)) {
            Some(Some(Value::Object(p))) => self.get_from_object(p, name),
            _ => None,
        }
    }

    pub fn get_property(&mut self, obj: ValueId, name: &str) -> ValueId {
        match self.heap.get(obj) {
            Some(Value::String(s)) => {
                if name == "length" {
                    return self.heap.alloc(Value::Number(s.chars().count() as f64));
                }
                if let Ok(idx) = name.parse::<usize>() {
                    if let Some(c) = s.chars().nth(idx) {
                        return self.heap.alloc(Value::String(c.to_string()));
                    }
                }
                self.undefined_id()
            }
            Some(Value::Object(o)) => self.get_from_object(o, name).unwrap_or_else(|| self.undefined_id()),
            Some(Value::Function(f)) => {
                if name == "name" {
                    let n = f.name.clone();
                    return self.heap.alloc(Value::String(n));
                }
                if name == "length" {
                    return self.heap.alloc(Value::Number(self.function_arity(f) as f64));
                }
                self.get_from_object(&f.object, name).unwrap_or_else(|| self.undefined_id())
            }
            _ => self.undefined_id(),
        }
    }

    fn function_arity(&self, f: &JsFunction) -> usize {
        match &f.callable {
            Callable::Compiled { func_index, .. } => self
                .program
                .as_ref()
                .map(|p| p.functions[*func_index].params.len())
                .unwrap_or(0),
            Callable::Native(_) => 0,
        }
    }

    pub fn set_property(&mut self, obj: ValueId, name: &str, v: ValueId) {
        let idx = name.parse::<usize>().ok();
        let mut is_array = false;
        if let Some(Value::Object(o)) = self.heap.get_mut(obj) {
            o.slots.insert(name.to_string(), v);
            is_array = o.class_name == "Array";
        }
        if is_array {
            if let Some(idx) = idx {
                let cur_len = self.array_length(obj);
                if idx as f64 + 1.0 > cur_len {
                    let new_len = self.heap.alloc(Value::Number(idx as f64 + 1.0));
                    if let Some(Value::Object(o)) = self.heap.get_mut(obj) {
                        o.special.insert("length".to_string(), new_len);
                    }
                }
            }
        }
    }

    pub fn delete_property(&mut self, obj: ValueId, name: &str) -> bool {
        if let Some(Value::Object(o)) = self.heap.get_mut(obj) {
            o.slots.remove(name);
            return true;
        }
        false
    }

    /// Runs `callee` in a fresh frame bound to its own instruction budget
    /// (§14) rather than threading the caller's budget through — a call
    /// nested arbitrarily deep each gets the same non-terminating-script
    /// guard, at the cost of not sharing one global counter across a call
    /// chain.
    pub fn call_value(
        &mut self,
        callee: ValueId,
        this_val: ValueId,
        args: &[ValueId],
        position: Position,
    ) -> Result<ValueId, RuntimeError> {
        match self.heap.get(callee).cloned() {
            Some(Value::Function(f)) => match f.callable {
                Callable::Native(name) => self.call_native(name, this_val, args, position),
                Callable::Compiled { func_index, closure } => {
                    self.call_compiled(func_index, closure, this_val, args)
                }
            },
            _ => Err(RuntimeError::new(position, "value is not callable")),
        }
    }

    fn call_compiled(
        &mut self,
        func_index: usize,
        closure: crate::interp::EnvHandle,
        this_val: ValueId,
        args: &[ValueId],
    ) -> Result<ValueId, RuntimeError> {
        let params = self
            .program
            .as_ref()
            .expect("program loaded")
            .functions[func_index]
            .params
            .clone();
        let env = crate::interp::new_env(Some(closure));
        {
            let mut e = env.borrow_mut();
            e.bindings.insert("this".to_string(), this_val);
            for (i, name) in params.iter().enumerate() {
                let v = args.get(i).copied().unwrap_or(self.undefined_id());
                e.bindings.insert(name.clone(), v);
            }
        }
        let mut budget = self.config.instruction_budget;
        self.run_frame(func_index + 1, env, &mut budget)
    }

    fn call_native(
        &mut self,
        name: &'static str,
        this_val: ValueId,
        args: &[ValueId],
        position: Position,
    ) -> Result<ValueId, RuntimeError> {
        let _ = this_val;
        crate::builtins::call(self, name, args, position)
    }

    /// `new Callee(...)`: allocate a fresh object whose prototype is the
    /// callee's `prototype` slot (falling back to `object_proto` — no
    /// function carries a distinct one yet, see [`Engine::instanceof`]),
    /// bind it as `this`, and keep it unless the callee explicitly returns
    /// an object or function of its own.
    pub fn construct(&mut self, callee: ValueId, args: &[ValueId], position: Position) -> Result<ValueId, RuntimeError> {
        let proto = match self.heap.get(callee) {
            Some(Value::Function(f)) => f.object.special.get("prototype").copied().unwrap_or(self.object_proto),
            _ => return Err(RuntimeError::new(position, "value is not a constructor")),
        };
        let obj = self.heap.alloc(Value::Object(JsObject::new(Some(proto))));
        let result = self.call_value(callee, obj, args, position)?;
        match self.heap.get(result) {
            Some(Value::Object(_)) | Some(Value::Function(_)) => Ok(result),
            _ => Ok(obj),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    let n = n.trunc();
    n.rem_euclid(4_294_967_296.0) as u32
}

fn to_int32(n: f64) -> i32 {
    let m = to_uint32(n);
    m as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineConfig};
    use crate::value::Value;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default())
    }

    #[test]
    fn undefined_plus_number_is_nan() {
        let mut e = engine();
        let u = e.permanents.undefined;
        let one = e.heap.alloc(Value::Number(1.0));
        let r = e.binary_op(Opcode::BinaryAdd, u, one);
        assert!(matches!(e.heap.get(r), Some(Value::Number(n)) if n.is_nan()));
    }

    #[test]
    fn undefined_plus_string_concatenates() {
        let mut e = engine();
        let u = e.permanents.undefined;
        let s = e.heap.alloc(Value::String("x".to_string()));
        let r = e.binary_op(Opcode::BinaryAdd, u, s);
        assert!(matches!(e.heap.get(r), Some(Value::String(s)) if s == "undefinedx"));
    }

    #[test]
    fn null_loosely_equals_undefined_but_not_strictly() {
        let mut e = engine();
        let null = e.permanents.null;
        let undef = e.permanents.undefined;
        assert!(e.compare(2, null, undef));
        assert!(!e.compare(6, null, undef));
    }

    #[test]
    fn bitwise_or_coerces_empty_string_to_zero() {
        let mut e = engine();
        let empty = e.permanents.empty_string;
        let zero = e.heap.alloc(Value::Number(0.0));
        let r = e.binary_op(Opcode::BinaryOr, empty, zero);
        assert!(matches!(e.heap.get(r), Some(Value::Number(n)) if *n == 0.0));
    }

    #[test]
    fn string_multiplication_coerces_both_sides() {
        let mut e = engine();
        let a = e.heap.alloc(Value::String("3".to_string()));
        let b = e.heap.alloc(Value::String("4".to_string()));
        let r = e.binary_op(Opcode::BinaryMultiply, a, b);
        assert!(matches!(e.heap.get(r), Some(Value::Number(n)) if *n == 12.0));
    }
}
