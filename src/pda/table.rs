//! PDA table data model (§4.1). States and transitions are authored
//! directly as Rust data by [`super::grammar::build_table`] rather than
//! compiled from a separate grammar DSL (§6) — the table itself is the
//! grammar.

use crate::ast::CollTag;
use crate::token::TokenKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProdId(pub u32);

/// A grammar nonterminal: its AST collection tag, whether it is
/// transparent when singleton (`a_exp` in the original), and its entry
/// state.
#[derive(Debug, Clone, Copy)]
pub struct Production {
    pub coll: CollTag,
    pub exp: bool,
    pub entry: StateId,
}

#[derive(Debug, Clone)]
pub enum TransitionKind {
    /// Consume one token and attach it as a leaf child of the AST node
    /// currently open, then move to `target`.
    Move(TokenKind, StateId),
    /// Consume one token without attaching it (punctuation with no
    /// semantic payload: `;`, `(`, `)`, `{`, `}`, `,`, `:`), then move to
    /// `target`.
    Pass(TokenKind, StateId),
    /// Begin a nested collection: push a return address, create its AST
    /// node, and jump to its entry state.
    Shift { next: ProdId, resume: StateId },
    /// Consume a binary operator and shift another occurrence of `next`,
    /// looping back to this same state — the left-recursive repetition
    /// pattern shared by every binary-operator precedence level (§9).
    LeftRecursion { op: TokenKind, next: ProdId },
    /// Same as `LeftRecursion` but tried only if no other transition at
    /// this state matches — used to break ties in favor of a sibling
    /// alternative when both are lookahead-admissible.
    LeftRecursionNotGreedy { op: TokenKind, next: ProdId },
    /// Close the current collection: pop its AST node, pop the return
    /// address, attach the node to the new top, resume at the popped
    /// state. (`reduce_exp` is encoded by the production's own `exp` flag,
    /// not by a separate transition kind.)
    Finish,
}

impl TransitionKind {
    /// Fixed priority used to order candidate transitions at a decision
    /// point before a backtrack frame considers branching (§4.1: "Sort by
    /// a fixed priority on transition type"). Lower value is tried first.
    pub fn priority(&self) -> u8 {
        match self {
            TransitionKind::Move(..) | TransitionKind::Pass(..) => 0,
            TransitionKind::Shift { .. } => 1,
            TransitionKind::LeftRecursion { .. } => 2,
            TransitionKind::Finish => 3,
            TransitionKind::LeftRecursionNotGreedy { .. } => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub kind: TransitionKind,
    /// Restricts when this transition is even considered. `None` means
    /// "always a candidate" (only legal for `Finish`, or a single
    /// unconditional alternative).
    pub lookahead: Option<Vec<TokenKind>>,
    /// Whether taking this transition should advance the progress guard
    /// (§4.1): true for any transition that actually consumes a token.
    pub marked: bool,
}

impl Transition {
    pub fn admits(&self, tok: TokenKind) -> bool {
        match &self.lookahead {
            None => true,
            Some(set) => set.iter().any(|k| *k == tok),
        }
    }
}

#[derive(Debug, Clone)]
pub struct State {
    pub label: &'static str,
    pub is_final: bool,
    pub transitions: Vec<Transition>,
}

/// The full PDA: every state and production reachable from `root`.
pub struct Table {
    pub states: Vec<State>,
    pub productions: Vec<Production>,
    pub root: ProdId,
}

impl Table {
    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0 as usize]
    }
    pub fn production(&self, id: ProdId) -> &Production {
        &self.productions[id.0 as usize]
    }
}

/// Incrementally constructs a [`Table`]. Kept separate from `Table` itself
/// so [`super::grammar::build_table`] reads as a sequence of declarative
/// production definitions rather than raw index arithmetic.
#[derive(Default)]
pub struct TableBuilder {
    states: Vec<State>,
    productions: Vec<Production>,
}

impl TableBuilder {
    pub fn new_state(&mut self, label: &'static str) -> StateId {
        let id = StateId(self.states.len() as u32);
        self.states.push(State {
            label,
            is_final: false,
            transitions: Vec::new(),
        });
        id
    }

    pub fn mark_final(&mut self, id: StateId) {
        self.states[id.0 as usize].is_final = true;
    }

    pub fn add_transition(&mut self, from: StateId, t: Transition) {
        self.states[from.0 as usize].transitions.push(t);
    }

    pub fn new_production(&mut self, coll: CollTag, exp: bool, entry: StateId) -> ProdId {
        let id = ProdId(self.productions.len() as u32);
        self.productions.push(Production { coll, exp, entry });
        id
    }

    pub fn build(self, root: ProdId) -> Table {
        Table {
            states: self.states,
            productions: self.productions,
            root,
        }
    }
}
