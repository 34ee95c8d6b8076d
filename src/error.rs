use crate::Position;
use thiserror::Error;

/// Failure raised by the scanner (§10). Always fatal.
#[derive(Debug, Error, Clone)]
#[error("LexError at {position}: {message}")]
pub struct LexError {
    pub position: Position,
    pub message: String,
}

/// Failure raised while driving the PDA (§4.1). Carries the nearest state label
/// the driver was in when every backtrack branch was exhausted.
#[derive(Debug, Error, Clone)]
#[error("SyntaxError at {position} (near state `{near_state}`): {message}")]
pub struct ParseError {
    pub position: Position,
    pub near_state: String,
    pub message: String,
}

/// A semantic-compile failure raised while lowering the AST into the symbol
/// tree or emitting bytecode (§4.2, §7): invalid lvalues, duplicate
/// declarations, unresolved labels.
#[derive(Debug, Error, Clone)]
#[error("CompileError at {position}: {message}\n  {source_excerpt}")]
pub struct CompileError {
    pub position: Position,
    pub message: String,
    pub source_excerpt: String,
}

/// A failure surfaced while executing bytecode that was not handled by any
/// in-program try/catch (§4.3, §7).
#[derive(Debug, Error, Clone)]
#[error("RuntimeError at {position}: {message}")]
pub struct RuntimeError {
    pub position: Position,
    pub message: String,
}

/// The union of every error kind an [`Engine`](crate::engine::Engine) can return.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl CompileError {
    pub fn new(position: Position, message: impl Into<String>, source_excerpt: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
            source_excerpt: source_excerpt.into(),
        }
    }
}

impl RuntimeError {
    pub fn new(position: Position, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

impl ParseError {
    pub fn new(position: Position, near_state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            position,
            near_state: near_state.into(),
            message: message.into(),
        }
    }
}

impl LexError {
    pub fn new(position: Position, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// An error returned from validating a hand-authored grammar or bytecode
/// shape that should be impossible to construct if the engine itself is
/// correct. Kept distinct from the four phase errors above because it
/// indicates a bug in this crate, not in the user's program.
#[derive(Debug, Error)]
#[error("ImplementationError: {what} - {message}")]
pub struct ImplementationError {
    pub what: String,
    pub message: String,
}

impl ImplementationError {
    pub fn new(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            message: message.into(),
        }
    }
}
