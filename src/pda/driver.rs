//! The PDA driver (§4.1): executes a [`Table`] against a token stream,
//! maintaining a stack of backtrack frames for speculative branching and
//! a monotonic progress guard to cut off unproductive retries.

use super::table::{ProdId, StateId, Table, Transition, TransitionKind};
use crate::ast::{Ast, AstAttrs, AstId, AstKind};
use crate::error::ParseError;
use crate::token::{Token, TokenKind};
use crate::Code;

/// A speculative branch point: everything needed to undo every side effect
/// performed since it was pushed and try the next untried transition.
struct Frame {
    cursor: usize,
    ast_len: usize,
    ast_stack: Vec<AstId>,
    return_stack: Vec<Option<StateId>>,
    state: StateId,
    state_label: &'static str,
    candidates: Vec<Transition>,
    next_idx: usize,
}

/// Returned internally when every candidate at a decision point, and every
/// enclosing backtrack frame's remaining candidates, have been exhausted.
struct ExhaustedBranches;

pub struct Driver<'t, 'c> {
    table: &'t Table,
    tokens: &'t [Token],
    code: &'c Code<'c>,
    ast: Ast,
    cursor: usize,
    ast_stack: Vec<AstId>,
    return_stack: Vec<Option<StateId>>,
    frames: Vec<Frame>,
    /// Furthest token position reached via any `marked` move/pass (§4.1
    /// progress guard): a backtrack to a frame whose entry cursor sits
    /// behind this is pointless and is skipped.
    farthest: usize,
}

impl<'t, 'c> Driver<'t, 'c> {
    pub fn new(table: &'t Table, tokens: &'t [Token], code: &'c Code<'c>) -> Self {
        Self {
            table,
            tokens,
            code,
            ast: Ast::new(),
            cursor: 0,
            ast_stack: Vec::new(),
            return_stack: Vec::new(),
            frames: Vec::new(),
            farthest: 0,
        }
    }

    fn current(&self) -> Token {
        self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn shift_into(&mut self, prod: ProdId, resume: Option<StateId>) -> StateId {
        let production = self.table.production(prod);
        let tok = self.current();
        let node = self.ast.alloc(
            AstKind::Collection(production.coll),
            AstAttrs { exp: production.exp },
            tok.start,
            tok.start,
            tok.position,
        );
        self.ast_stack.push(node);
        self.return_stack.push(resume);
        production.entry
    }

    fn leaf_kind(&self, tok: Token) -> AstKind {
        match tok.kind {
            TokenKind::Keyword(k) => AstKind::Keyword(k),
            TokenKind::Operator(o) => AstKind::Operator(o),
            TokenKind::Ident => AstKind::Ident(self.code.slice(tok.start, tok.end).to_string()),
            TokenKind::Number => {
                let text = self.code.slice(tok.start, tok.end);
                AstKind::Number(parse_number(text))
            }
            TokenKind::String => {
                let raw = self.code.slice(tok.start, tok.end);
                AstKind::Str(unescape(raw))
            }
            TokenKind::Regex => AstKind::Regex(self.code.slice(tok.start, tok.end).to_string()),
            TokenKind::Eof => AstKind::Ident(String::new()),
        }
    }

    /// Run the driver to completion, returning the root [`AstId`] and the
    /// underlying arena on success.
    pub fn run(mut self, root: ProdId) -> Result<(Ast, AstId), ParseError> {
        let root_id = {
            let tok = self.current();
            self.ast
                .alloc(AstKind::Root, AstAttrs::default(), 0, 0, tok.position)
        };
        self.ast_stack.push(root_id);
        self.return_stack.push(None);

        let mut cur = self.shift_into(root, None);

        loop {
            let tok = self.current();
            let state = self.table.state(cur);
            let mut candidates: Vec<Transition> = state
                .transitions
                .iter()
                .filter(|t| t.admits(tok.kind))
                .cloned()
                .collect();
            candidates.sort_by_key(|t| t.kind.priority());

            if candidates.is_empty() {
                match self.backtrack() {
                    Ok(resumed) => {
                        cur = resumed;
                        continue;
                    }
                    Err(ExhaustedBranches) => {
                        return Err(ParseError::new(
                            tok.position,
                            state.label,
                            "no production could consume the remaining input",
                        ));
                    }
                }
            }

            let taken_from = cur;
            let take = if candidates.len() > 1 {
                let rest = candidates.split_off(1);
                self.frames.push(Frame {
                    cursor: self.cursor,
                    ast_len: self.ast.len(),
                    ast_stack: self.ast_stack.clone(),
                    return_stack: self.return_stack.clone(),
                    state: cur,
                    state_label: state.label,
                    candidates: rest,
                    next_idx: 0,
                });
                candidates.into_iter().next().unwrap()
            } else {
                candidates.into_iter().next().unwrap()
            };

            match self.apply(take, taken_from) {
                Ok(Some(next)) => cur = next,
                Ok(None) => {
                    // `Finish` popped the outermost production.
                    if self.cursor + 1 >= self.tokens.len()
                        || self.tokens[self.cursor].kind == TokenKind::Eof
                    {
                        let program = self.ast_stack.pop().expect("program node");
                        return Ok((self.ast, program));
                    } else {
                        match self.backtrack() {
                            Ok(resumed) => {
                                cur = resumed;
                                continue;
                            }
                            Err(ExhaustedBranches) => {
                                let at = self.current();
                                return Err(ParseError::new(
                                    at.position,
                                    "program",
                                    "unexpected trailing input after a complete program",
                                ));
                            }
                        }
                    }
                }
                Err(()) => match self.backtrack() {
                    Ok(resumed) => {
                        cur = resumed;
                        continue;
                    }
                    Err(ExhaustedBranches) => {
                        let at = self.current();
                        return Err(ParseError::new(
                            at.position,
                            "?",
                            "parse failed with no remaining alternative",
                        ));
                    }
                },
            }
        }
    }

    /// Apply one transition taken from state `from`. Returns `Ok(Some(next))`
    /// to continue, `Ok(None)` when a `Finish` popped the very last frame
    /// (the whole program), or `Err(())` on a precondition failure.
    fn apply(&mut self, t: Transition, from: StateId) -> Result<Option<StateId>, ()> {
        match t.kind {
            TransitionKind::Move(_, target) => {
                let tok = self.current();
                let leaf = self.leaf_kind(tok);
                let node = self
                    .ast
                    .alloc(leaf, AstAttrs::default(), tok.start, tok.end, tok.position);
                let parent = *self.ast_stack.last().unwrap();
                self.ast.attach(parent, node);
                self.cursor += 1;
                if t.marked {
                    self.farthest = self.farthest.max(self.cursor);
                }
                Ok(Some(target))
            }
            TransitionKind::Pass(_, target) => {
                self.cursor += 1;
                if t.marked {
                    self.farthest = self.farthest.max(self.cursor);
                }
                Ok(Some(target))
            }
            TransitionKind::Shift { next, resume } => Ok(Some(self.shift_into(next, Some(resume)))),
            TransitionKind::LeftRecursion { op: _, next }
            | TransitionKind::LeftRecursionNotGreedy { op: _, next } => {
                let tok = self.current();
                let leaf = self.leaf_kind(tok);
                let node = self
                    .ast
                    .alloc(leaf, AstAttrs::default(), tok.start, tok.end, tok.position);
                let parent = *self.ast_stack.last().unwrap();
                self.ast.attach(parent, node);
                self.cursor += 1;
                self.farthest = self.farthest.max(self.cursor);
                // Loop back to the very state this transition was taken
                // from once `next` finishes (§4.1: "looping back to this
                // same state").
                Ok(Some(self.shift_into(next, Some(from))))
            }
            TransitionKind::Finish => {
                let finished = self.ast_stack.pop().expect("finish with empty ast stack");
                let resume = self.return_stack.pop().expect("finish with empty return stack");
                let parent = *self.ast_stack.last().unwrap();
                self.ast.attach(parent, finished);
                match resume {
                    Some(state) => Ok(Some(state)),
                    None => Ok(None),
                }
            }
        }
    }

    fn backtrack(&mut self) -> Result<StateId, ExhaustedBranches> {
        while let Some(mut frame) = self.frames.pop() {
            if frame.cursor < self.farthest {
                // Progress guard (§4.1): a sibling branch already proved the
                // parse can get further than this frame's entry point, so
                // retrying this frame cannot yield a valid overall parse.
                continue;
            }
            if frame.next_idx >= frame.candidates.len() {
                continue;
            }
            let take = frame.candidates[frame.next_idx].clone();
            frame.next_idx += 1;

            self.cursor = frame.cursor;
            self.ast.truncate(frame.ast_len);
            self.ast_stack = frame.ast_stack.clone();
            self.return_stack = frame.return_stack.clone();

            let has_more = frame.next_idx < frame.candidates.len();
            let from = frame.state;
            let label = frame.state_label;
            if has_more {
                self.frames.push(frame);
            }
            let _ = label;
            match self.apply(take, from) {
                Ok(Some(s)) => return Ok(s),
                Ok(None) | Err(()) => continue,
            }
        }
        Err(ExhaustedBranches)
    }
}

fn parse_number(text: &str) -> f64 {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map(|v| v as f64).unwrap_or(f64::NAN);
    }
    text.parse::<f64>().unwrap_or(f64::NAN)
}

fn unescape(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some('\'') => out.push('\''),
                Some('"') => out.push('"'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pda::grammar::build_table;

    fn parse(src: &str) -> Ast {
        let code = Code::new(src.as_bytes());
        let tokens = crate::lexer::Lexer::new(&code).tokenize().unwrap();
        let table = build_table();
        let driver = Driver::new(&table, &tokens, &code);
        let (ast, root) = driver.run(table.root).unwrap();
        let _ = root;
        ast
    }

    #[test]
    fn parses_simple_var_statement() {
        let ast = parse("var a = 1 + 2;");
        assert!(ast.check_structural_integrity());
    }

    #[test]
    fn parses_function_and_call() {
        let ast = parse("function f(x){ return x*x; } f(6);");
        assert!(ast.check_structural_integrity());
    }

    #[test]
    fn backtrack_purity_on_labelled_vs_expression_statement() {
        // `a: 1;` forces the driver to try LabelledStatement first, fail
        // to find a Statement body shape it likes, and fall back to
        // ExpressionStatement — exercising rollback.
        let ast = parse("a: for(var i=0;i<1;i=i+1) i;");
        assert!(ast.check_structural_integrity());
    }
}
