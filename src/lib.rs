//! A small ECMAScript-flavored scripting engine: lex, parse with a
//! backtracking pushdown automaton, lower to a typed symbol tree, emit
//! stack-machine bytecode and interpret it.
//!
//! # Overview
//!
//! The pipeline mirrors a conventional four-stage toolchain:
//!
//! 1. [`lexer`] turns source text into a token stream.
//! 2. [`pda`] drives a table-based parser over the tokens into an [`ast::Ast`].
//! 3. [`codegen`] lowers the AST into a [`sym`] tree and emits [`bytecode`].
//! 4. [`interp`] (together with [`ops`]) runs the bytecode against a
//!    [`value`] heap managed by [`gc`].
//!
//! [`engine::Engine`] is the single entry point gluing the four stages
//! together; see [`engine::Engine::run_source`].
//!
//! # Example
//!
//! ```
//! use jsvm::engine::{Engine, EngineConfig};
//! use jsvm::code::Code;
//!
//! let mut engine = Engine::new(EngineConfig::default());
//! let code = Code::from("var x = 1 + 2; print(x);");
//! engine.run_source(&code).unwrap();
//! assert_eq!(engine.take_output(), vec!["3".to_string()]);
//! ```

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod code;
pub mod codegen;
pub mod constants;
pub mod engine;
pub mod error;
pub mod gc;
pub mod interp;
pub mod lexer;
pub mod ops;
pub mod pda;
mod position;
pub mod sym;
pub mod token;
pub mod value;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
/// Line/column location of a code point, produced on demand from a byte
/// offset by [`code::Code::obtain_position`].
pub struct Position {
    pub line: usize,
    pub column: usize,
}

pub use code::Code;
pub use engine::{Engine, EngineConfig};
pub use error::EngineError;
