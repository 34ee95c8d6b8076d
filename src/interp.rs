//! Stack-machine interpreter (§4.3, §7 "C7"). A [`Frame`] owns an operand
//! stack, a chain of lexical [`Env`]s (closure capture falls out of sharing
//! the defining frame's innermost `Env` rather than copying bindings), and a
//! stack of try-regions used to implement `try`/`catch`/`finally` unwind.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::{Chunk, Opcode};
use crate::engine::Engine;
use crate::error::RuntimeError;
use crate::value::{Callable, JsFunction, JsObject, Value, ValueId};
use crate::Position;

/// A lexical environment: a map of bindings plus an optional parent, which
/// for a function's top frame is the closure captured at `MAKE_FUNCTION`
/// time and for the program's outermost frame is `None` (globals live in
/// the engine's global object instead, see [`Engine::globals`]).
#[derive(Debug, Default)]
pub struct Env {
    pub bindings: HashMap<String, ValueId>,
    pub parent: Option<EnvHandle>,
}

pub type EnvHandle = Rc<RefCell<Env>>;

pub fn new_env(parent: Option<EnvHandle>) -> EnvHandle {
    Rc::new(RefCell::new(Env {
        bindings: HashMap::new(),
        parent,
    }))
}

/// One entry of a frame's try-region stack (§4.3 unwind protocol). `range`
/// is the logical-address span the region protects; a `Throw` walks frames
/// looking for the innermost region whose range contains the faulting
/// instruction.
#[derive(Debug, Clone, Copy)]
struct TryRegion {
    catch_pc: Option<usize>,
    finally_pc: Option<usize>,
}

pub struct Frame {
    pub chunk_id: usize,
    pub env: EnvHandle,
    pub stack: Vec<ValueId>,
    pub pc: usize,
    try_stack: Vec<TryRegion>,
    /// Set while unwinding toward a `finally`, so the finally block can
    /// resume the original control transfer once it completes (§4.3).
    pending_unwind: Option<Unwind>,
}

impl Frame {
    pub fn new(chunk_id: usize, env: EnvHandle) -> Self {
        Self {
            chunk_id,
            env,
            stack: Vec::new(),
            pc: 0,
            try_stack: Vec::new(),
            pending_unwind: None,
        }
    }

    fn push(&mut self, v: ValueId) {
        self.stack.push(v);
    }

    fn pop(&mut self) -> Result<ValueId, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::new(Position::new(0, 0), "operand stack underflow"))
    }
}

/// What a frame is doing besides straight-line execution: returning,
/// breaking/continuing a loop, or propagating a thrown value. Control
/// constructs are compiled to plain jumps, so only `Return` and `Throw`
/// need this — `break`/`continue` are already jump targets by the time
/// codegen is done with them.
#[derive(Debug, Clone)]
enum Unwind {
    Return(ValueId),
    Throw(ValueId),
}

pub enum StepOutcome {
    Continue,
    Return(ValueId),
}

impl Engine {
    /// Run `chunk` in a fresh frame against `env`, driving it to
    /// completion. `max_instructions` enforces the instruction budget from
    /// [`crate::engine::EngineConfig`] (§14 — a non-terminating script
    /// should fail loudly rather than hang the host).
    pub fn run_frame(
        &mut self,
        chunk_id: usize,
        env: EnvHandle,
        budget: &mut u64,
    ) -> Result<ValueId, RuntimeError> {
        let mut frame = Frame::new(chunk_id, env);
        self.call_depth += 1;
        let result = loop {
            // A safe point for GC (§4.5): only at the outermost call (no
            // nested Rust-recursive `run_frame` in progress) and only
            // between statements, so no other frame has live temporaries
            // and this frame's own operand stack is empty.
            if self.call_depth == 1 && frame.stack.is_empty() {
                self.maybe_collect_for_frame(&frame);
            }
            if *budget == 0 {
                break Err(RuntimeError::new(
                    Position::new(0, 0),
                    "instruction budget exhausted",
                ));
            }
            *budget -= 1;
            match self.step(&mut frame) {
                Ok(StepOutcome::Continue) => continue,
                Ok(StepOutcome::Return(v)) => break Ok(v),
                Err(err) => {
                    let thrown = self.heap.alloc(Value::String(err.to_string()));
                    match self.unwind_throw(&mut frame, thrown) {
                        Some(Unwind::Return(v)) => break Ok(v),
                        Some(Unwind::Throw(v)) => break Err(self.describe_thrown(v)),
                        None => continue,
                    }
                }
            }
        };
        self.call_depth -= 1;
        result
    }

    fn describe_thrown(&self, v: ValueId) -> RuntimeError {
        let msg = self.to_display_string(v);
        RuntimeError::new(Position::new(0, 0), format!("uncaught exception: {msg}"))
    }

    fn chunk(&self, chunk_id: usize) -> &Chunk {
        if chunk_id == 0 {
            &self.program.as_ref().expect("program loaded").main
        } else {
            &self.program.as_ref().expect("program loaded").functions[chunk_id - 1].chunk
        }
    }

    fn instr_at(&self, chunk_id: usize, logical_pc: usize) -> Option<usize> {
        self.addr_index(chunk_id).get(&logical_pc).copied()
    }

    fn addr_index(&self, chunk_id: usize) -> &HashMap<usize, usize> {
        &self.addr_indices[chunk_id]
    }

    /// Execute one instruction. `Ok(Continue)` means keep looping;
    /// `Ok(Return(v))` means the frame completed; `Err` is a runtime fault
    /// that `run_frame` routes through the try/catch/finally machinery
    /// before surfacing it to the caller.
    fn step(&mut self, frame: &mut Frame) -> Result<StepOutcome, RuntimeError> {
        let chunk_id = frame.chunk_id;
        let Some(index) = self.instr_at(chunk_id, frame.pc) else {
            return Ok(StepOutcome::Return(self.undefined_id()));
        };
        let instr = self.chunk(chunk_id).code[index];
        let next_pc = instr.addr + 1 + instr.op.operand_count();

        use Opcode::*;
        match instr.op {
            LoadConst => {
                let v = self.const_value(instr.operands[0] as u32);
                frame.push(v);
            }
            LoadUndefined => frame.push(self.undefined_id()),
            LoadNull => frame.push(self.permanents.null),
            LoadTrue => frame.push(self.permanents.true_),
            LoadFalse => frame.push(self.permanents.false_),
            LoadName => {
                let name = self.const_name(instr.operands[0] as u32);
                let v = self.lookup_name(frame, &name)?;
                frame.push(v);
            }
            LoadFast => {
                let name = self.const_name(instr.operands[0] as u32);
                let v = frame
                    .env
                    .borrow()
                    .bindings
                    .get(&name)
                    .copied()
                    .ok_or_else(|| RuntimeError::new(instr.position, format!("{name} is not defined")))?;
                frame.push(v);
            }
            LoadGlobal => {
                let name = self.const_name(instr.operands[0] as u32);
                let v = self
                    .global_get(&name)
                    .ok_or_else(|| RuntimeError::new(instr.position, format!("{name} is not defined")))?;
                frame.push(v);
            }
            LoadDeref => {
                let name = self.const_name(instr.operands[0] as u32);
                let v = self.lookup_in_chain(frame.env.borrow().parent.clone(), &name).ok_or_else(|| {
                    RuntimeError::new(instr.position, format!("{name} is not defined"))
                })?;
                frame.push(v);
            }
            LoadAttr => {
                let name = self.const_name(instr.operands[0] as u32);
                let obj = frame.pop()?;
                let v = self.get_property(obj, &name);
                frame.push(v);
            }
            LoadMethod => {
                let name = self.const_name(instr.operands[0] as u32);
                let obj = frame.pop()?;
                let v = self.get_property(obj, &name);
                frame.push(obj);
                frame.push(v);
            }
            StoreName => {
                let name = self.const_name(instr.operands[0] as u32);
                let v = frame.pop()?;
                self.store_name(frame, &name, v);
            }
            StoreFast => {
                let name = self.const_name(instr.operands[0] as u32);
                let v = frame.pop()?;
                frame.env.borrow_mut().bindings.insert(name, v);
            }
            StoreAttr => {
                let name = self.const_name(instr.operands[0] as u32);
                let obj = frame.pop()?;
                let v = frame.pop()?;
                self.set_property(obj, &name, v);
            }
            StoreSubscr => {
                let key = frame.pop()?;
                let obj = frame.pop()?;
                let v = frame.pop()?;
                let key = self.to_property_key(key);
                self.set_property(obj, &key, v);
            }
            BinarySubscr => {
                let key = frame.pop()?;
                let obj = frame.pop()?;
                let key = self.to_property_key(key);
                frame.push(self.get_property(obj, &key));
            }
            DupTop => {
                let v = *frame.stack.last().ok_or_else(|| {
                    RuntimeError::new(instr.position, "operand stack underflow")
                })?;
                frame.push(v);
            }
            PopTop => {
                frame.pop()?;
            }
            UnaryPositive | UnaryNegative | UnaryNot | UnaryInvert => {
                let v = frame.pop()?;
                frame.push(self.unary_op(instr.op, v));
            }
            BinaryAdd | BinarySubtract | BinaryMultiply | BinaryTrueDivide | BinaryModulo
            | BinaryPower | BinaryLShift | BinaryRShift | BinaryURShift | BinaryAnd
            | BinaryOr | BinaryXor => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                frame.push(self.binary_op(instr.op, lhs, rhs));
            }
            Inc | Dec => {
                let v = frame.pop()?;
                let n = self.to_number(v);
                let n = if matches!(instr.op, Inc) { n + 1.0 } else { n - 1.0 };
                frame.push(self.heap.alloc(Value::Number(n)));
            }
            CompareOp => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                let result = self.compare(instr.operands[0], lhs, rhs);
                frame.push(self.bool_id(result));
            }
            JumpIfTrueOrPop => {
                let top = *frame.stack.last().ok_or_else(|| {
                    RuntimeError::new(instr.position, "operand stack underflow")
                })?;
                if self.to_boolean(top) {
                    frame.pc = instr.operands[0] as usize;
                    return Ok(StepOutcome::Continue);
                }
                frame.pop()?;
            }
            JumpIfFalseOrPop => {
                let top = *frame.stack.last().ok_or_else(|| {
                    RuntimeError::new(instr.position, "operand stack underflow")
                })?;
                if !self.to_boolean(top) {
                    frame.pc = instr.operands[0] as usize;
                    return Ok(StepOutcome::Continue);
                }
                frame.pop()?;
            }
            PopJumpIfFalse => {
                let v = frame.pop()?;
                if !self.to_boolean(v) {
                    frame.pc = instr.operands[0] as usize;
                    return Ok(StepOutcome::Continue);
                }
            }
            JumpAbsolute => {
                frame.pc = instr.operands[0] as usize;
                return Ok(StepOutcome::Continue);
            }
            JumpForward => {
                frame.pc = next_pc + instr.operands[0] as usize;
                return Ok(StepOutcome::Continue);
            }
            MakeFunction => {
                let func_index = instr.operands[0] as usize;
                let mut object = JsObject::new(Some(self.function_proto));
                // Every function is a potential constructor (§4.4 "prototype
                // chain"): give it its own fresh `.prototype` object up
                // front rather than lazily on first `new`, mirroring how a
                // real engine vends a distinct `prototype` per function.
                let proto_obj = self.heap.alloc(Value::Object(JsObject::new(Some(self.object_proto))));
                object.special.insert("prototype".to_string(), proto_obj);
                let f = Value::Function(JsFunction {
                    object,
                    callable: Callable::Compiled {
                        func_index,
                        closure: frame.env.clone(),
                    },
                    name: self
                        .program
                        .as_ref()
                        .unwrap()
                        .functions[func_index]
                        .name
                        .clone()
                        .unwrap_or_default(),
                });
                let func_id = self.heap.alloc(f);
                if let Some(Value::Object(p)) = self.heap.get_mut(proto_obj) {
                    p.slots.insert("constructor".to_string(), func_id);
                }
                frame.push(func_id);
            }
            CallFunction => {
                let argc = instr.operands[0] as usize;
                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(frame.pop()?);
                }
                args.reverse();
                let callee = frame.pop()?;
                let result = self.call_value(callee, self.undefined_id(), &args, instr.position)?;
                frame.push(result);
            }
            CallMethod => {
                let argc = instr.operands[0] as usize;
                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(frame.pop()?);
                }
                args.reverse();
                let method = frame.pop()?;
                let this_val = frame.pop()?;
                let result = self.call_value(method, this_val, &args, instr.position)?;
                frame.push(result);
            }
            CallNew => {
                let argc = instr.operands[0] as usize;
                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(frame.pop()?);
                }
                args.reverse();
                let callee = frame.pop()?;
                let result = self.construct(callee, &args, instr.position)?;
                frame.push(result);
            }
            TypeOf => {
                let v = frame.pop()?;
                let t = self.type_of(v);
                frame.push(self.heap.alloc(Value::String(t.to_string())));
            }
            DeleteAttr => {
                let name = self.const_name(instr.operands[0] as u32);
                let obj = frame.pop()?;
                frame.push(self.bool_id(self.delete_property(obj, &name)));
            }
            DeleteSubscr => {
                let key = frame.pop()?;
                let obj = frame.pop()?;
                let key = self.to_property_key(key);
                frame.push(self.bool_id(self.delete_property(obj, &key)));
            }
            BuildList => {
                let n = instr.operands[0] as usize;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(frame.pop()?);
                }
                items.reverse();
                frame.push(self.build_array(items));
            }
            BuildMap => {
                let n = instr.operands[0] as usize;
                let mut pairs = Vec::with_capacity(n);
                for _ in 0..n {
                    let value = frame.pop()?;
                    let key = frame.pop()?;
                    let key = self.to_property_key(key);
                    pairs.push((key, value));
                }
                pairs.reverse();
                frame.push(self.build_object(pairs));
            }
            Ret => {
                let v = frame.pop().unwrap_or(self.undefined_id());
                return Ok(StepOutcome::Return(v));
            }
            SetupTry => {
                let catch_pc = instr.operands[0];
                let finally_pc = instr.operands[1];
                frame.try_stack.push(TryRegion {
                    catch_pc: if catch_pc < 0 { None } else { Some(catch_pc as usize) },
                    finally_pc: if finally_pc < 0 { None } else { Some(finally_pc as usize) },
                });
            }
            PopTry => {
                frame.try_stack.pop();
            }
            EndFinally => {
                if let Some(Unwind::Throw(v)) = frame.pending_unwind.take() {
                    return match self.unwind_throw(frame, v) {
                        Some(Unwind::Throw(v2)) => Err(self.describe_thrown(v2)),
                        Some(Unwind::Return(v2)) => Ok(StepOutcome::Return(v2)),
                        None => Ok(StepOutcome::Continue),
                    };
                }
            }
            Throw => {
                let v = frame.pop()?;
                return Err(self.describe_thrown(v));
            }
        }
        frame.pc = next_pc;
        Ok(StepOutcome::Continue)
    }

    /// Route a thrown value through `frame`'s try-region stack (§4.3). A
    /// region with a `catch_pc` resumes execution there with the thrown
    /// value bound; a region with only a `finally_pc` resumes there and
    /// remembers to re-throw once the finally completes. Returns `None`
    /// once control has been handed back into the frame; `Some(Unwind)`
    /// once the frame has no more regions and the effect must propagate to
    /// the caller.
    fn unwind_throw(&mut self, frame: &mut Frame, thrown: ValueId) -> Option<Unwind> {
        while let Some(region) = frame.try_stack.pop() {
            if let Some(catch_pc) = region.catch_pc {
                frame.stack.clear();
                frame.push(thrown);
                frame.pc = catch_pc;
                return None;
            }
            if let Some(finally_pc) = region.finally_pc {
                frame.pending_unwind = Some(Unwind::Throw(thrown));
                frame.pc = finally_pc;
                return None;
            }
        }
        Some(Unwind::Throw(thrown))
    }

    fn lookup_name(&self, frame: &Frame, name: &str) -> Result<ValueId, RuntimeError> {
        if let Some(v) = frame.env.borrow().bindings.get(name).copied() {
            return Ok(v);
        }
        if let Some(v) = self.lookup_in_chain(frame.env.borrow().parent.clone(), name) {
            return Ok(v);
        }
        self.global_get(name)
            .ok_or_else(|| RuntimeError::new(Position::new(0, 0), format!("{name} is not defined")))
    }

    fn lookup_in_chain(&self, mut env: Option<EnvHandle>, name: &str) -> Option<ValueId> {
        while let Some(e) = env {
            if let Some(v) = e.borrow().bindings.get(name).copied() {
                return Some(v);
            }
            env = e.borrow().parent.clone();
        }
        None
    }

    /// `STORE_NAME` writes the nearest existing binding in the env chain,
    /// or creates one in the local frame if absent — the mechanism var
    /// hoisting rides on (§11 of the expanded spec).
    fn store_name(&mut self, frame: &mut Frame, name: &str, v: ValueId) {
        if frame.env.borrow().bindings.contains_key(name) {
            frame.env.borrow_mut().bindings.insert(name.to_string(), v);
            return;
        }
        let mut cur = frame.env.borrow().parent.clone();
        while let Some(e) = cur {
            if e.borrow().bindings.contains_key(name) {
                e.borrow_mut().bindings.insert(name.to_string(), v);
                return;
            }
            cur = e.borrow().parent.clone();
        }
        if self.global_get(name).is_some() {
            self.global_set(name, v);
            return;
        }
        frame.env.borrow_mut().bindings.insert(name.to_string(), v);
    }
}
