//! The engine glue (§6, §14): owns the heap, the constants pool, the
//! compiled program and the permanent singletons, and exposes the
//! toolchain boundary — `parse`, `generate`, `eval` — as methods on
//! [`Engine`].

use std::collections::HashMap;

use crate::ast::Ast;
use crate::bytecode::Chunk;
use crate::code::Code;
use crate::codegen::Generator;
use crate::constants::{ConstIdx, Constant, ConstPool, NameIdx};
use crate::error::EngineError;
use crate::pda::{grammar, Driver};
use crate::value::{FunctionInfo, Heap, JsObject, Value, ValueId};
use crate::Position;

/// Tunables a host can adjust before running a script (§14). All three
/// exist to bound the cost of a misbehaving or merely large script rather
/// than to change its observable semantics.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Trigger a mark-sweep pass once this many allocations have happened
    /// since the last one.
    pub gc_allocation_threshold: usize,
    /// Hard cap on interpreted instructions for one `eval` call, guarding
    /// against non-terminating scripts.
    pub instruction_budget: u64,
    /// Hard cap on the parser's backtrack frame stack depth, guarding
    /// against pathological grammars/inputs.
    pub max_backtrack_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gc_allocation_threshold: 4096,
            instruction_budget: 10_000_000,
            max_backtrack_depth: 4096,
        }
    }
}

/// A fully compiled unit: a main chunk plus every nested function body,
/// sharing one constants pool (§6).
#[derive(Debug)]
pub struct Program {
    pub main: Chunk,
    pub functions: Vec<FunctionInfo>,
    pub consts: ConstPool,
}

#[derive(Debug, Clone, Copy)]
pub struct Permanents {
    pub true_: ValueId,
    pub false_: ValueId,
    pub null: ValueId,
    pub undefined: ValueId,
    pub nan: ValueId,
    pub pos_inf: ValueId,
    pub neg_inf: ValueId,
    pub pos_zero: ValueId,
    pub neg_zero: ValueId,
    pub pos_one: ValueId,
    pub neg_one: ValueId,
    pub empty_string: ValueId,
}

impl Permanents {
    pub fn all(&self) -> Vec<ValueId> {
        vec![
            self.true_,
            self.false_,
            self.null,
            self.undefined,
            self.nan,
            self.pos_inf,
            self.neg_inf,
            self.pos_zero,
            self.neg_zero,
            self.pos_one,
            self.neg_one,
            self.empty_string,
        ]
    }
}

pub struct Engine {
    pub heap: Heap,
    pub config: EngineConfig,
    pub program: Option<Program>,
    pub(crate) addr_indices: Vec<HashMap<usize, usize>>,
    pub permanents: Permanents,
    pub global_object: ValueId,
    pub object_proto: ValueId,
    pub function_proto: ValueId,
    pub array_proto: ValueId,
    pub(crate) const_cache: Vec<Option<ValueId>>,
    pub(crate) output: Vec<String>,
    /// Depth of nested `run_frame` calls currently on the Rust call stack
    /// (§4.5): GC only runs when this is 1, so no other frame can be
    /// holding a live temporary outside of the one being rooted.
    pub(crate) call_depth: u32,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let mut heap = Heap::new();
        let object_proto = heap.alloc(Value::Object(JsObject::new(None)));
        let function_proto = heap.alloc(Value::Object(JsObject::new(Some(object_proto))));
        let array_proto = heap.alloc(Value::Object(JsObject::new(Some(object_proto))));
        let global_object = heap.alloc(Value::Object(JsObject::new(Some(object_proto))));

        let permanents = Permanents {
            true_: heap.alloc(Value::Boolean(true)),
            false_: heap.alloc(Value::Boolean(false)),
            null: heap.alloc(Value::Null),
            undefined: heap.alloc(Value::Undefined),
            nan: heap.alloc(Value::Number(f64::NAN)),
            pos_inf: heap.alloc(Value::Number(f64::INFINITY)),
            neg_inf: heap.alloc(Value::Number(f64::NEG_INFINITY)),
            pos_zero: heap.alloc(Value::Number(0.0)),
            neg_zero: heap.alloc(Value::Number(-0.0)),
            pos_one: heap.alloc(Value::Number(1.0)),
            neg_one: heap.alloc(Value::Number(-1.0)),
            empty_string: heap.alloc(Value::String(String::new())),
        };

        let mut engine = Self {
            heap,
            config,
            program: None,
            addr_indices: Vec::new(),
            permanents,
            global_object,
            object_proto,
            function_proto,
            array_proto,
            const_cache: Vec::new(),
            output: Vec::new(),
            call_depth: 0,
        };
        crate::builtins::install(&mut engine);
        engine
    }

    /// §6 toolchain boundary, stage 1: lex + parse into an [`Ast`].
    pub fn parse<'c>(&self, code: &'c Code<'c>) -> Result<(Ast, crate::ast::AstId), EngineError> {
        let tokens = crate::lexer::Lexer::new(code).tokenize()?;
        let table = grammar::build_table();
        let mut driver = Driver::new(&table, &tokens, code);
        let (ast, root) = driver.run(table.root)?;
        Ok((ast, root))
    }

    /// §6 toolchain boundary, stage 2: lower the AST and emit bytecode.
    pub fn generate(&self, ast: &Ast, root: crate::ast::AstId, code: &Code) -> Result<Program, EngineError> {
        let mut gen = Generator::new(code);
        let main = gen.generate_program(ast, root)?;
        Ok(Program {
            main,
            functions: gen.into_functions(),
            consts: gen.into_consts(),
        })
    }

    /// §6 toolchain boundary, stage 3: run a compiled [`Program`] to
    /// completion, returning the value of its last expression statement
    /// (or `undefined`).
    pub fn eval(&mut self, program: Program) -> Result<ValueId, EngineError> {
        self.program = Some(program);
        self.rebuild_addr_indices();
        self.const_cache = vec![None; self.program.as_ref().unwrap().consts.len_consts()];
        let env = crate::interp::new_env(None);
        // The program's outermost frame binds `this` to the global object,
        // mirroring how a call frame binds it to the receiver (§4.3); every
        // other frame's `this` comes from `call_compiled` instead.
        env.borrow_mut().bindings.insert("this".to_string(), self.global_object);
        let mut budget = self.config.instruction_budget;
        let result = self.run_frame(0, env, &mut budget)?;
        Ok(result)
    }

    /// Convenience entry point combining all three stages (§6, §8 "the
    /// full pipeline behaves as the composition of its stages").
    pub fn run_source<'c>(&mut self, code: &'c Code<'c>) -> Result<ValueId, EngineError> {
        let (ast, root) = self.parse(code)?;
        let program = self.generate(&ast, root, code)?;
        self.eval(program)
    }

    /// Everything written by `print` during the most recent `eval`.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    fn rebuild_addr_indices(&mut self) {
        let program = self.program.as_ref().unwrap();
        let mut indices = Vec::with_capacity(1 + program.functions.len());
        indices.push(program.main.build_addr_index());
        for f in &program.functions {
            indices.push(f.chunk.build_addr_index());
        }
        self.addr_indices = indices;
    }

    pub(crate) fn undefined_id(&self) -> ValueId {
        self.permanents.undefined
    }

    pub(crate) fn bool_id(&self, b: bool) -> ValueId {
        if b {
            self.permanents.true_
        } else {
            self.permanents.false_
        }
    }

    pub(crate) fn const_name(&self, idx: u32) -> String {
        self.program
            .as_ref()
            .unwrap()
            .consts
            .name(NameIdx(idx))
            .to_string()
    }

    pub(crate) fn const_value(&mut self, idx: u32) -> ValueId {
        if let Some(Some(v)) = self.const_cache.get(idx as usize) {
            return *v;
        }
        let constant = self.program.as_ref().unwrap().consts.get(ConstIdx(idx)).clone();
        let v = match constant {
            Constant::String(s) => self.heap.alloc(Value::String(s)),
            Constant::Number(n) => self.heap.alloc(Value::Number(n)),
        };
        if self.const_cache.len() <= idx as usize {
            self.const_cache.resize(idx as usize + 1, None);
        }
        self.const_cache[idx as usize] = Some(v);
        v
    }

    pub(crate) fn global_get(&self, name: &str) -> Option<ValueId> {
        match self.heap.get(self.global_object) {
            Some(Value::Object(o)) => o.slots.get(name).copied(),
            _ => None,
        }
    }

    pub(crate) fn global_set(&mut self, name: &str, v: ValueId) {
        if let Some(Value::Object(o)) = self.heap.get_mut(self.global_object) {
            o.slots.insert(name.to_string(), v);
        }
    }

    pub(crate) fn runtime_error(&self, message: impl Into<String>) -> crate::error::RuntimeError {
        crate::error::RuntimeError::new(Position::new(0, 0), message)
    }
}
