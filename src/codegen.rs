//! Code generation (§4.2, §6): lowers an [`Ast`] into the typed [`sym`]
//! tree, then emits [`bytecode`] from it. Two passes over the program:
//!
//! 1. [`Generator::generate_program`] walks the AST once, producing the
//!    top-level statement list and, as a side effect, a [`FuncDef`] per
//!    function expression/declaration encountered anywhere in the tree
//!    (including inside other functions) — discovery order fixes each
//!    function's `func_index` before any bytecode is emitted.
//! 2. Each statement list (the program's and every discovered function's)
//!    is then emitted into its own [`Chunk`] by the free functions at the
//!    bottom of this module, which `SymNode::gen_rvalue`/`gen_lvalue` also
//!    call into so a single emitter serves both passes.
//!
//! Grounded on `cjsgen.cpp`/`cjsgen_ast.cpp`'s AST-to-bytecode walk, with
//! the AST's own C3/C6 three-address-ish shape replaced by lowering first
//! into `sym::SymNode` (§3) so the emitter below never inspects raw AST
//! nodes.

use crate::ast::{Ast, AstId, AstKind, CollTag};
use crate::bytecode::{Chunk, Opcode};
use crate::code::Code;
use crate::constants::ConstPool;
use crate::error::CompileError;
use crate::sym::{BinOperator, Literal, SymKind, SymNode, UnOperator};
use crate::token::{Keyword, Operator};
use crate::value::FunctionInfo;
use crate::Position;

/// A function discovered during lowering, queued for its own emission pass.
/// `func_index` in [`SymKind::FunctionExpr`]/[`SymKind::FunctionDecl`] is
/// this struct's position in [`Generator::compiled`] once emission is done.
struct FuncDef {
    name: Option<String>,
    params: Vec<String>,
    body: Vec<Box<SymNode>>,
}

/// Per-chunk emission state: the chunk being written, the constants pool
/// shared across the whole program, and the stack of enclosing
/// loops/labels `break`/`continue` resolve against.
pub struct CodegenCtx<'a> {
    chunk: &'a mut Chunk,
    consts: &'a mut ConstPool,
    loop_stack: Vec<LoopFrame>,
}

/// One entry per enclosing loop or label (§4.2 "break/continue
/// back-patching"). Plain labels that don't wrap a loop only ever collect
/// `break_patches` — `continue` can't legally target them.
struct LoopFrame {
    label: Option<String>,
    is_loop: bool,
    continue_patches: Vec<usize>,
    break_patches: Vec<usize>,
}

impl<'a> CodegenCtx<'a> {
    fn emit(&mut self, node: &SymNode, op: Opcode, operands: [i32; 2]) -> usize {
        self.chunk.emit(node.position, node.start, node.end, op, operands)
    }

    fn name_idx(&mut self, s: &str) -> i32 {
        self.consts.intern_name(s).0 as i32
    }

    fn string_idx(&mut self, s: &str) -> i32 {
        self.consts.intern_string(s).0 as i32
    }

    fn number_idx(&mut self, n: f64) -> i32 {
        self.consts.intern_number(n).0 as i32
    }

    /// Back-patch a previously emitted jump's operand `slot` to the chunk's
    /// current logical address.
    fn patch_jump_here(&mut self, index: usize, slot: usize) {
        let target = self.chunk.current() as i32;
        self.chunk.edit(index, slot, target);
    }
}

pub struct Generator<'c> {
    code: &'c Code<'c>,
    consts: ConstPool,
    func_defs: Vec<FuncDef>,
    compiled: Vec<FunctionInfo>,
}

impl<'c> Generator<'c> {
    pub fn new(code: &'c Code<'c>) -> Self {
        Self {
            code,
            consts: ConstPool::new(),
            func_defs: Vec::new(),
            compiled: Vec::new(),
        }
    }

    /// Lower the whole program and emit every chunk it needs (the main
    /// chunk plus one per discovered function), returning the main chunk.
    /// Nested functions are fully lowered (and so queued in `func_defs`)
    /// before any emission starts, so function indices assigned during
    /// lowering always match the final position in [`Generator::compiled`].
    pub fn generate_program(&mut self, ast: &Ast, root: AstId) -> Result<Chunk, CompileError> {
        let stmts: Vec<Box<SymNode>> = ast
            .children(root)
            .iter()
            .map(|&c| self.lower_stmt(ast, c))
            .collect::<Result<_, _>>()?;
        let main = self.emit_stmt_sequence(&stmts, true)?;
        let defs = std::mem::take(&mut self.func_defs);
        for def in defs {
            let chunk = self.emit_stmt_sequence(&def.body, false)?;
            self.compiled.push(FunctionInfo {
                name: def.name,
                params: def.params,
                chunk,
            });
        }
        Ok(main)
    }

    pub fn into_functions(mut self) -> Vec<FunctionInfo> {
        std::mem::take(&mut self.compiled)
    }

    pub fn into_consts(self) -> ConstPool {
        self.consts
    }

    fn emit_stmt_sequence(&mut self, stmts: &[Box<SymNode>], tail_allowed: bool) -> Result<Chunk, CompileError> {
        let mut chunk = Chunk::new();
        {
            let mut ctx = CodegenCtx {
                chunk: &mut chunk,
                consts: &mut self.consts,
                loop_stack: Vec::new(),
            };
            let last = stmts.len().saturating_sub(1);
            for (i, s) in stmts.iter().enumerate() {
                let tail = tail_allowed && i == last && matches!(s.kind, SymKind::StmtExp(_));
                emit_stmt(s, &mut ctx, tail)?;
            }
        }
        Ok(chunk)
    }

    fn ident_text(&self, ast: &Ast, id: AstId) -> String {
        match &ast.get(id).kind {
            AstKind::Ident(s) => s.clone(),
            _ => String::new(),
        }
    }

    // ---- statements -----------------------------------------------------

    fn lower_stmt(&mut self, ast: &Ast, id: AstId) -> Result<Box<SymNode>, CompileError> {
        let node = ast.get(id);
        let (position, start, end) = (node.position, node.start, node.end);
        let Some(tag) = node.as_collection() else {
            return Err(CompileError::new(position, "expected a statement", self.code.slice(start, end).to_string()));
        };
        use CollTag::*;
        match tag {
            Block => {
                let se = ast.get(node.children[0]);
                let mut stmts = Vec::with_capacity(se.children.len());
                for &c in &se.children {
                    stmts.push(self.lower_stmt(ast, c)?);
                }
                Ok(SymNode::new(SymKind::Block(stmts), position, start, end))
            }
            VariableStatement => {
                let ids = self.lower_var_decl_list(ast, node.children[0])?;
                Ok(SymNode::new(SymKind::StmtVar(ids), position, start, end))
            }
            ExpressionStatement => {
                let expr = self.lower_expr(ast, node.children[0])?;
                Ok(SymNode::new(SymKind::StmtExp(expr), position, start, end))
            }
            EmptyStatement => Ok(SymNode::new(SymKind::Empty, position, start, end)),
            IfStatement => {
                let cond = self.lower_expr(ast, node.children[0])?;
                let then_branch = self.lower_stmt(ast, node.children[1])?;
                let else_branch = if node.children.len() > 2 {
                    Some(self.lower_stmt(ast, node.children[2])?)
                } else {
                    None
                };
                Ok(SymNode::new(SymKind::If { cond, then_branch, else_branch }, position, start, end))
            }
            WhileStatement => {
                let cond = self.lower_expr(ast, node.children[0])?;
                let body = self.lower_stmt(ast, node.children[1])?;
                Ok(SymNode::new(SymKind::While { label: None, cond, body }, position, start, end))
            }
            DoStatement => {
                let body = self.lower_stmt(ast, node.children[0])?;
                let cond = self.lower_expr(ast, node.children[1])?;
                Ok(SymNode::new(SymKind::DoWhile { label: None, body, cond }, position, start, end))
            }
            ForStatement => self.lower_for(ast, id, position, start, end),
            BreakStatement => {
                let label = node.children.first().map(|&c| self.ident_text(ast, c));
                Ok(SymNode::new(SymKind::Break(label), position, start, end))
            }
            ContinueStatement => {
                let label = node.children.first().map(|&c| self.ident_text(ast, c));
                Ok(SymNode::new(SymKind::Continue(label), position, start, end))
            }
            ReturnStatement => {
                let value = match node.children.first() {
                    Some(&c) => Some(self.lower_expr(ast, c)?),
                    None => None,
                };
                Ok(SymNode::new(SymKind::Return(value), position, start, end))
            }
            ThrowStatement => {
                let value = self.lower_expr(ast, node.children[0])?;
                Ok(SymNode::new(SymKind::Throw(value), position, start, end))
            }
            LabelledStatement => {
                let label = self.ident_text(ast, node.children[0]);
                let mut body = self.lower_stmt(ast, node.children[1])?;
                match &mut body.kind {
                    SymKind::While { label: l, .. } | SymKind::DoWhile { label: l, .. } | SymKind::For { label: l, .. } => {
                        *l = Some(label);
                        Ok(body)
                    }
                    _ => Ok(SymNode::new(SymKind::Labelled { label, body }, position, start, end)),
                }
            }
            TryStatement => self.lower_try(ast, id, position, start, end),
            FunctionDeclaration => {
                let (name, func_index) = self.lower_function(ast, id)?;
                Ok(SymNode::new(
                    SymKind::FunctionDecl { name: name.unwrap_or_default(), func_index },
                    position,
                    start,
                    end,
                ))
            }
            other => Err(CompileError::new(position, format!("{other:?} is not a statement"), self.code.slice(start, end).to_string())),
        }
    }

    fn lower_var_decl_list(&mut self, ast: &Ast, list_id: AstId) -> Result<Vec<Box<SymNode>>, CompileError> {
        let list = ast.get(list_id);
        let mut out = Vec::new();
        let mut i = 0;
        while i < list.children.len() {
            out.push(self.lower_var_decl(ast, list.children[i])?);
            i += 2;
        }
        Ok(out)
    }

    fn lower_var_decl(&mut self, ast: &Ast, id: AstId) -> Result<Box<SymNode>, CompileError> {
        let node = ast.get(id);
        let (position, start, end) = (node.position, node.start, node.end);
        let name = self.ident_text(ast, node.children[0]);
        let init = match node.children.get(1) {
            Some(&c) => Some(self.lower_expr(ast, c)?),
            None => None,
        };
        Ok(SymNode::new(SymKind::Id { name, init }, position, start, end))
    }

    /// `for` clauses are three siblings of variable arity with no tag that
    /// distinguishes "this is the test" from "this is the update" — both
    /// can be an `ExpressionSequence` node. Disambiguated by counting the
    /// `;` characters in the source-text gap before each clause (§4.2
    /// "ForStatement clause disambiguation").
    fn lower_for(&mut self, ast: &Ast, id: AstId, position: Position, start: usize, end: usize) -> Result<Box<SymNode>, CompileError> {
        let node = ast.get(id);
        let children = node.children.clone();
        let for_start = node.start;
        let (body_id, parts) = children.split_last().expect("for-statement always has a body");
        let mut init = None;
        let mut cond = None;
        let mut update = None;
        let mut clause = 0usize;
        let mut cursor = for_start;
        for &part in parts {
            let part_node = ast.get(part);
            let gap = self.code.slice(cursor, part_node.start);
            clause += gap.matches(';').count();
            match clause {
                0 => init = Some(self.lower_for_clause(ast, part)?),
                1 => cond = Some(self.lower_expr(ast, part)?),
                _ => update = Some(self.lower_for_clause(ast, part)?),
            }
            cursor = part_node.end;
        }
        let body = self.lower_stmt(ast, *body_id)?;
        Ok(SymNode::new(SymKind::For { label: None, init, cond, update, body }, position, start, end))
    }

    fn lower_for_clause(&mut self, ast: &Ast, id: AstId) -> Result<Box<SymNode>, CompileError> {
        let node = ast.get(id);
        if node.as_collection() == Some(CollTag::VariableDeclarationList) {
            let ids = self.lower_var_decl_list(ast, id)?;
            return Ok(SymNode::new(SymKind::StmtVar(ids), node.position, node.start, node.end));
        }
        let (position, start, end) = (node.position, node.start, node.end);
        let expr = self.lower_expr(ast, id)?;
        Ok(SymNode::new(SymKind::StmtExp(expr), position, start, end))
    }

    fn lower_try(&mut self, ast: &Ast, id: AstId, position: Position, start: usize, end: usize) -> Result<Box<SymNode>, CompileError> {
        let node = ast.get(id);
        let block = self.lower_stmt(ast, node.children[0])?;
        let mut catch = None;
        let mut finally = None;
        for &c in &node.children[1..] {
            let cn = ast.get(c);
            match cn.as_collection() {
                Some(CollTag::CatchProduction) => {
                    let param = self.ident_text(ast, cn.children[0]);
                    let catch_block = self.lower_stmt(ast, cn.children[1])?;
                    catch = Some((param, catch_block));
                }
                Some(CollTag::FinallyProduction) => {
                    finally = Some(self.lower_stmt(ast, cn.children[0])?);
                }
                _ => {}
            }
        }
        Ok(SymNode::new(SymKind::Try { block, catch, finally }, position, start, end))
    }

    fn lower_function(&mut self, ast: &Ast, id: AstId) -> Result<(Option<String>, usize), CompileError> {
        let node = ast.get(id);
        let mut name = None;
        let mut params = Vec::new();
        let mut body_stmts = Vec::new();
        for &c in &node.children {
            let cn = ast.get(c);
            match cn.as_collection() {
                Some(CollTag::FormalParameterList) => {
                    for &p in &cn.children {
                        if let AstKind::Ident(s) = &ast.get(p).kind {
                            params.push(s.clone());
                        }
                    }
                }
                Some(CollTag::FunctionBody) => {
                    let se = ast.get(cn.children[0]);
                    for &stmt in &se.children {
                        body_stmts.push(self.lower_stmt(ast, stmt)?);
                    }
                }
                None => {
                    if let AstKind::Ident(s) = &cn.kind {
                        name = Some(s.clone());
                    }
                }
                _ => {}
            }
        }
        let func_index = self.func_defs.len();
        self.func_defs.push(FuncDef { name: name.clone(), params, body: body_stmts });
        Ok((name, func_index))
    }

    // ---- expressions ------------------------------------------------------

    fn lower_expr(&mut self, ast: &Ast, id: AstId) -> Result<Box<SymNode>, CompileError> {
        let node = ast.get(id);
        if node.is_transparent() {
            return self.lower_expr(ast, node.children[0]);
        }
        let (position, start, end) = (node.position, node.start, node.end);
        let Some(tag) = node.as_collection() else {
            return self.lower_leaf(ast, id, position, start, end);
        };
        use CollTag::*;
        match tag {
            IdentifierExpression => {
                let name = self.ident_text(ast, node.children[0]);
                Ok(SymNode::new(SymKind::VarId(name), position, start, end))
            }
            ThisExpression => Ok(SymNode::new(SymKind::This, position, start, end)),
            LiteralExpression => self.lower_literal(ast, node.children[0], position, start, end),
            ArrayLiteralExpression => self.lower_array(ast, id),
            ObjectLiteralExpression => self.lower_object(ast, id),
            FunctionExpression => {
                let (name, func_index) = self.lower_function(ast, id)?;
                Ok(SymNode::new(SymKind::FunctionExpr { name, func_index }, position, start, end))
            }
            NewExpression => self.lower_new_expr(ast, id),
            PowerExpression => self.lower_power(ast, id),
            TypeofExpression => self.lower_unary(ast, id, UnOperator::Typeof),
            VoidExpression => self.lower_unary(ast, id, UnOperator::Void),
            DeleteExpression => self.lower_unary(ast, id, UnOperator::Delete),
            PreIncrementExpression => self.lower_unary(ast, id, UnOperator::Op(Operator::Inc)),
            PreDecreaseExpression => self.lower_unary(ast, id, UnOperator::Op(Operator::Dec)),
            UnaryPlusExpression => self.lower_unary(ast, id, UnOperator::Op(Operator::Add)),
            UnaryMinusExpression => self.lower_unary(ast, id, UnOperator::Op(Operator::Sub)),
            BitNotExpression => self.lower_unary(ast, id, UnOperator::Op(Operator::BitNot)),
            NotExpression => self.lower_unary(ast, id, UnOperator::Op(Operator::LogNot)),
            MultiplicativeExpression | AdditiveExpression | BitShiftExpression | RelationalExpression
            | EqualityExpression | BitAndExpression | BitXOrExpression | BitOrExpression | LogicalAndExpression
            | LogicalOrExpression | InstanceofExpression | InExpression => self.fold_left_chain(ast, id),
            TernaryExpression => {
                let cond = self.lower_expr(ast, node.children[0])?;
                let then_branch = self.lower_expr(ast, node.children[1])?;
                let else_branch = self.lower_expr(ast, node.children[2])?;
                Ok(SymNode::new(SymKind::TriOp { cond, then_branch, else_branch }, position, start, end))
            }
            AssignmentExpression => self.lower_assignment(ast, id),
            ExpressionSequence => {
                let mut items = Vec::new();
                let mut i = 0;
                while i < node.children.len() {
                    items.push(self.lower_expr(ast, node.children[i])?);
                    i += 2;
                }
                Ok(SymNode::new(SymKind::ExpSeq(items), position, start, end))
            }
            other => Err(CompileError::new(position, format!("{other:?} is not a valid expression"), self.code.slice(start, end).to_string())),
        }
    }

    fn lower_leaf(&mut self, ast: &Ast, id: AstId, position: Position, start: usize, end: usize) -> Result<Box<SymNode>, CompileError> {
        self.lower_literal(ast, id, position, start, end)
    }

    fn bin_operator_at(&self, ast: &Ast, leaf_id: AstId) -> BinOperator {
        match &ast.get(leaf_id).kind {
            AstKind::Operator(op) => BinOperator::Op(*op),
            AstKind::Keyword(Keyword::Instanceof) => BinOperator::Instanceof,
            AstKind::Keyword(Keyword::In) => BinOperator::In,
            _ => unreachable!("chain operator leaf must be an operator or instanceof/in keyword"),
        }
    }

    fn fold_left_chain(&mut self, ast: &Ast, id: AstId) -> Result<Box<SymNode>, CompileError> {
        let node = ast.get(id);
        let (position, start, end) = (node.position, node.start, node.end);
        let mut acc = self.lower_expr(ast, node.children[0])?;
        let mut i = 1;
        while i + 1 < node.children.len() {
            let op = self.bin_operator_at(ast, node.children[i]);
            let rhs = self.lower_expr(ast, node.children[i + 1])?;
            acc = SymNode::new(SymKind::BinOp { op, lhs: acc, rhs }, position, start, end);
            i += 2;
        }
        Ok(acc)
    }

    fn lower_assignment(&mut self, ast: &Ast, id: AstId) -> Result<Box<SymNode>, CompileError> {
        let node = ast.get(id);
        let (position, start, end) = (node.position, node.start, node.end);
        let target = self.lower_expr(ast, node.children[0])?;
        let op = match &ast.get(node.children[1]).kind {
            AstKind::Operator(op) => *op,
            _ => unreachable!("assignment operator leaf must be an Operator token"),
        };
        let value = self.lower_expr(ast, node.children[2])?;
        Ok(SymNode::new(SymKind::Assign { op, target, value }, position, start, end))
    }

    fn lower_power(&mut self, ast: &Ast, id: AstId) -> Result<Box<SymNode>, CompileError> {
        let node = ast.get(id);
        let (position, start, end) = (node.position, node.start, node.end);
        let lhs = self.lower_expr(ast, node.children[0])?;
        let rhs = self.lower_expr(ast, node.children[2])?;
        Ok(SymNode::new(SymKind::BinOp { op: BinOperator::Op(Operator::Power), lhs, rhs }, position, start, end))
    }

    fn lower_unary(&mut self, ast: &Ast, id: AstId, op: UnOperator) -> Result<Box<SymNode>, CompileError> {
        let node = ast.get(id);
        let (position, start, end) = (node.position, node.start, node.end);
        let operand = self.lower_expr(ast, node.children[1])?;
        Ok(SymNode::new(SymKind::UnOp { op, operand }, position, start, end))
    }

    fn lower_literal(&mut self, ast: &Ast, leaf_id: AstId, position: Position, start: usize, end: usize) -> Result<Box<SymNode>, CompileError> {
        let lit = match &ast.get(leaf_id).kind {
            AstKind::Number(n) => Literal::Number(*n),
            AstKind::Str(s) => Literal::String(s.clone()),
            AstKind::Regex(s) => Literal::Regex(s.clone()),
            AstKind::Keyword(Keyword::True) => Literal::Bool(true),
            AstKind::Keyword(Keyword::False) => Literal::Bool(false),
            AstKind::Keyword(Keyword::Null) => Literal::Null,
            _ => return Err(CompileError::new(position, "invalid literal", self.code.slice(start, end).to_string())),
        };
        Ok(SymNode::new(SymKind::Var(lit), position, start, end))
    }

    fn lower_array(&mut self, ast: &Ast, id: AstId) -> Result<Box<SymNode>, CompileError> {
        let node = ast.get(id);
        let (position, start, end) = (node.position, node.start, node.end);
        let items = match node.children.first() {
            None => Vec::new(),
            Some(&list_id) => {
                let list = ast.get(list_id);
                let mut out = Vec::new();
                let mut i = 0;
                while i < list.children.len() {
                    out.push(self.lower_expr(ast, list.children[i])?);
                    i += 2;
                }
                out
            }
        };
        Ok(SymNode::new(SymKind::Array(items), position, start, end))
    }

    fn property_key_text(&self, ast: &Ast, leaf_id: AstId) -> String {
        match &ast.get(leaf_id).kind {
            AstKind::Ident(s) => s.clone(),
            AstKind::Str(s) => s.clone(),
            AstKind::Number(n) => n.to_string(),
            _ => String::new(),
        }
    }

    fn lower_object(&mut self, ast: &Ast, id: AstId) -> Result<Box<SymNode>, CompileError> {
        let node = ast.get(id);
        let (position, start, end) = (node.position, node.start, node.end);
        let pairs = match node.children.first() {
            None => Vec::new(),
            Some(&list_id) => {
                let list = ast.get(list_id);
                let mut out = Vec::new();
                let mut i = 0;
                while i < list.children.len() {
                    let pa = ast.get(list.children[i]);
                    let pname = ast.get(pa.children[0]);
                    let key = self.property_key_text(ast, pname.children[0]);
                    let value = self.lower_expr(ast, pa.children[1])?;
                    out.push(SymNode::new(SymKind::ObjectPair { key, value }, pa.position, pa.start, pa.end));
                    i += 2;
                }
                out
            }
        };
        Ok(SymNode::new(SymKind::Object(pairs), position, start, end))
    }

    fn lower_arguments(&mut self, ast: &Ast, args_expr_id: AstId) -> Result<Vec<Box<SymNode>>, CompileError> {
        let args_expr = ast.get(args_expr_id);
        let arguments_node = ast.get(args_expr.children[0]);
        let Some(&list_id) = arguments_node.children.first() else {
            return Ok(Vec::new());
        };
        let list = ast.get(list_id);
        let mut out = Vec::new();
        let mut i = 0;
        while i < list.children.len() {
            out.push(self.lower_expr(ast, list.children[i])?);
            i += 2;
        }
        Ok(out)
    }

    /// `NewExpression` stitches `new` markers, a primary, and a run of
    /// postfix member/call/increment operators into one left-to-right
    /// chain (§4.2 "NewExpression postfix stitching"). A `new` only ever
    /// consumes the *next* parenthesized argument list it meets, so nested
    /// `new Outer(new Inner())` is one level of `new` each — a
    /// simplification from the grammar's fully general "any number of
    /// unmatched `new`s before a call" shape, adequate for this language
    /// subset since every `new` expression in practice is immediately
    /// followed by its own argument list.
    fn lower_new_expr(&mut self, ast: &Ast, id: AstId) -> Result<Box<SymNode>, CompileError> {
        let node = ast.get(id);
        let (position, start, end) = (node.position, node.start, node.end);
        let children = node.children.clone();
        let mut idx = 0;
        let mut pending_news = 0usize;
        while idx < children.len() {
            if let AstKind::Keyword(Keyword::New) = ast.get(children[idx]).kind {
                pending_news += 1;
                idx += 1;
            } else {
                break;
            }
        }
        let mut current = self.lower_expr(ast, children[idx])?;
        idx += 1;
        while idx < children.len() {
            let leaf = ast.get(children[idx]);
            match &leaf.kind {
                AstKind::Operator(Operator::Dot) => {
                    idx += 1;
                    let member = ast.get(children[idx]);
                    let name = self.ident_text(ast, member.children[0]);
                    current = SymNode::new(SymKind::MemberDot { object: current, name }, member.position, member.start, member.end);
                    idx += 1;
                }
                AstKind::Operator(Operator::LSquare) => {
                    idx += 1;
                    let member = ast.get(children[idx]);
                    let index = self.lower_expr(ast, member.children[0])?;
                    current = SymNode::new(SymKind::MemberIndex { object: current, index }, member.position, member.start, member.end);
                    idx += 1;
                }
                AstKind::Operator(Operator::LParen) => {
                    idx += 1;
                    let args_expr = ast.get(children[idx]);
                    let args = self.lower_arguments(ast, children[idx])?;
                    let (ap, astart, aend) = (args_expr.position, args_expr.start, args_expr.end);
                    current = if pending_news > 0 {
                        pending_news -= 1;
                        SymNode::new(SymKind::New { callee: current, args }, ap, astart, aend)
                    } else {
                        match *current {
                            SymNode { kind: SymKind::MemberDot { object, name }, .. } => {
                                SymNode::new(SymKind::CallMethod { object, method: name, args }, ap, astart, aend)
                            }
                            other => SymNode::new(SymKind::CallFunction { callee: Box::new(other), args }, ap, astart, aend),
                        }
                    };
                    idx += 1;
                }
                AstKind::Operator(Operator::Inc) => {
                    current = SymNode::new(SymKind::SinOp { op: Operator::Inc, operand: current }, leaf.position, leaf.start, leaf.end);
                    idx += 1;
                }
                AstKind::Operator(Operator::Dec) => {
                    current = SymNode::new(SymKind::SinOp { op: Operator::Dec, operand: current }, leaf.position, leaf.start, leaf.end);
                    idx += 1;
                }
                other => {
                    return Err(CompileError::new(
                        leaf.position,
                        format!("unexpected token in postfix chain: {other:?}"),
                        self.code.slice(leaf.start, leaf.end).to_string(),
                    ))
                }
            }
        }
        while pending_news > 0 {
            current = SymNode::new(SymKind::New { callee: current, args: Vec::new() }, position, start, end);
            pending_news -= 1;
        }
        Ok(current)
    }
}

// ---- bytecode emission -----------------------------------------------------
//
// These free functions are the target of `SymNode::gen_rvalue`/`gen_lvalue`/
// `gen_invoke` (§3) so a caller holding only a `&SymNode` — the interpreter's
// debug tooling, or a future optimizer pass — can re-emit without reaching
// back into `Generator`.

pub fn emit_rvalue(sym: &SymNode, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    match &sym.kind {
        SymKind::Var(lit) => emit_literal(sym, lit, ctx),
        SymKind::VarId(name) => {
            let idx = ctx.name_idx(name);
            ctx.emit(sym, Opcode::LoadName, [idx, 0]);
            Ok(())
        }
        SymKind::This => {
            let idx = ctx.name_idx("this");
            ctx.emit(sym, Opcode::LoadName, [idx, 0]);
            Ok(())
        }
        SymKind::UnOp { op, operand } => emit_unop(sym, *op, operand, ctx),
        SymKind::SinOp { op, operand } => emit_postfix(sym, *op, operand, ctx),
        SymKind::BinOp { op, lhs, rhs } => emit_binop(sym, *op, lhs, rhs, ctx),
        SymKind::TriOp { cond, then_branch, else_branch } => {
            emit_rvalue(cond, ctx)?;
            let else_jump = ctx.emit(sym, Opcode::PopJumpIfFalse, [-1, 0]);
            emit_rvalue(then_branch, ctx)?;
            let end_jump = ctx.emit(sym, Opcode::JumpAbsolute, [-1, 0]);
            ctx.patch_jump_here(else_jump, 0);
            emit_rvalue(else_branch, ctx)?;
            ctx.patch_jump_here(end_jump, 0);
            Ok(())
        }
        SymKind::Assign { op, target, value } => emit_assign(sym, *op, target, value, ctx),
        SymKind::MemberDot { object, name } => {
            emit_rvalue(object, ctx)?;
            let idx = ctx.name_idx(name);
            ctx.emit(sym, Opcode::LoadAttr, [idx, 0]);
            Ok(())
        }
        SymKind::MemberIndex { object, index } => {
            emit_rvalue(object, ctx)?;
            emit_rvalue(index, ctx)?;
            ctx.emit(sym, Opcode::BinarySubscr, [0, 0]);
            Ok(())
        }
        SymKind::Array(items) => {
            for item in items {
                emit_rvalue(item, ctx)?;
            }
            ctx.emit(sym, Opcode::BuildList, [items.len() as i32, 0]);
            Ok(())
        }
        SymKind::Object(pairs) => {
            for pair in pairs {
                let SymKind::ObjectPair { key, value } = &pair.kind else {
                    return Err(CompileError::new(pair.position, "malformed object literal entry", String::new()));
                };
                let idx = ctx.string_idx(key);
                ctx.emit(pair, Opcode::LoadConst, [idx, 0]);
                emit_rvalue(value, ctx)?;
            }
            ctx.emit(sym, Opcode::BuildMap, [pairs.len() as i32, 0]);
            Ok(())
        }
        SymKind::ObjectPair { .. } => Err(CompileError::new(sym.position, "object property is not a standalone expression", String::new())),
        SymKind::CallFunction { .. } | SymKind::CallMethod { .. } | SymKind::New { .. } => emit_invoke(sym, ctx),
        SymKind::ExpSeq(items) => {
            if items.is_empty() {
                ctx.emit(sym, Opcode::LoadUndefined, [0, 0]);
                return Ok(());
            }
            for item in &items[..items.len() - 1] {
                emit_rvalue(item, ctx)?;
                ctx.emit(sym, Opcode::PopTop, [0, 0]);
            }
            emit_rvalue(items.last().expect("checked non-empty above"), ctx)
        }
        SymKind::FunctionExpr { func_index, .. } => {
            ctx.emit(sym, Opcode::MakeFunction, [*func_index as i32, 0]);
            Ok(())
        }
        _ => Err(CompileError::new(sym.position, "expected an expression", String::new())),
    }
}

fn emit_literal(sym: &SymNode, lit: &Literal, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    match lit {
        Literal::Number(n) => {
            let idx = ctx.number_idx(*n);
            ctx.emit(sym, Opcode::LoadConst, [idx, 0]);
        }
        // A regex literal carries no runtime type of its own in this value
        // model (§4.4 lists none); it survives as its literal source text.
        Literal::String(s) | Literal::Regex(s) => {
            let idx = ctx.string_idx(s);
            ctx.emit(sym, Opcode::LoadConst, [idx, 0]);
        }
        Literal::Bool(true) => {
            ctx.emit(sym, Opcode::LoadTrue, [0, 0]);
        }
        Literal::Bool(false) => {
            ctx.emit(sym, Opcode::LoadFalse, [0, 0]);
        }
        Literal::Null => {
            ctx.emit(sym, Opcode::LoadNull, [0, 0]);
        }
        Literal::Undefined => {
            ctx.emit(sym, Opcode::LoadUndefined, [0, 0]);
        }
    }
    Ok(())
}

fn emit_unop(sym: &SymNode, op: UnOperator, operand: &SymNode, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    match op {
        UnOperator::Typeof => {
            emit_rvalue(operand, ctx)?;
            ctx.emit(sym, Opcode::TypeOf, [0, 0]);
            Ok(())
        }
        UnOperator::Void => {
            emit_rvalue(operand, ctx)?;
            ctx.emit(sym, Opcode::PopTop, [0, 0]);
            ctx.emit(sym, Opcode::LoadUndefined, [0, 0]);
            Ok(())
        }
        UnOperator::Delete => emit_delete(sym, operand, ctx),
        UnOperator::Op(Operator::Inc) => emit_incdec_prefix(sym, Opcode::Inc, operand, ctx),
        UnOperator::Op(Operator::Dec) => emit_incdec_prefix(sym, Opcode::Dec, operand, ctx),
        UnOperator::Op(Operator::Add) => {
            emit_rvalue(operand, ctx)?;
            ctx.emit(sym, Opcode::UnaryPositive, [0, 0]);
            Ok(())
        }
        UnOperator::Op(Operator::Sub) => {
            emit_rvalue(operand, ctx)?;
            ctx.emit(sym, Opcode::UnaryNegative, [0, 0]);
            Ok(())
        }
        UnOperator::Op(Operator::BitNot) => {
            emit_rvalue(operand, ctx)?;
            ctx.emit(sym, Opcode::UnaryInvert, [0, 0]);
            Ok(())
        }
        UnOperator::Op(Operator::LogNot) => {
            emit_rvalue(operand, ctx)?;
            ctx.emit(sym, Opcode::UnaryNot, [0, 0]);
            Ok(())
        }
        UnOperator::Op(other) => Err(CompileError::new(sym.position, format!("{other:?} is not a valid unary operator"), String::new())),
    }
}

fn emit_incdec_prefix(sym: &SymNode, op: Opcode, operand: &SymNode, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    emit_rvalue(operand, ctx)?;
    ctx.emit(sym, op, [0, 0]);
    ctx.emit(sym, Opcode::DupTop, [0, 0]);
    emit_lvalue(operand, ctx)
}

fn emit_postfix(sym: &SymNode, op: Operator, operand: &SymNode, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    emit_rvalue(operand, ctx)?;
    ctx.emit(sym, Opcode::DupTop, [0, 0]);
    let code_op = match op {
        Operator::Inc => Opcode::Inc,
        Operator::Dec => Opcode::Dec,
        other => return Err(CompileError::new(sym.position, format!("{other:?} is not a valid postfix operator"), String::new())),
    };
    ctx.emit(sym, code_op, [0, 0]);
    emit_lvalue(operand, ctx)
}

fn emit_delete(sym: &SymNode, operand: &SymNode, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    match &operand.kind {
        SymKind::MemberDot { object, name } => {
            emit_rvalue(object, ctx)?;
            let idx = ctx.name_idx(name);
            ctx.emit(sym, Opcode::DeleteAttr, [idx, 0]);
        }
        SymKind::MemberIndex { object, index } => {
            emit_rvalue(object, ctx)?;
            emit_rvalue(index, ctx)?;
            ctx.emit(sym, Opcode::DeleteSubscr, [0, 0]);
        }
        // `delete` on anything that isn't a property reference is a no-op
        // that reports success, matching ordinary JS semantics.
        _ => {
            ctx.emit(sym, Opcode::LoadTrue, [0, 0]);
        }
    }
    Ok(())
}

fn emit_binop(sym: &SymNode, op: BinOperator, lhs: &SymNode, rhs: &SymNode, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    if let BinOperator::Op(Operator::LogAnd) = op {
        emit_rvalue(lhs, ctx)?;
        let jump = ctx.emit(sym, Opcode::JumpIfFalseOrPop, [-1, 0]);
        emit_rvalue(rhs, ctx)?;
        ctx.patch_jump_here(jump, 0);
        return Ok(());
    }
    if let BinOperator::Op(Operator::LogOr) = op {
        emit_rvalue(lhs, ctx)?;
        let jump = ctx.emit(sym, Opcode::JumpIfTrueOrPop, [-1, 0]);
        emit_rvalue(rhs, ctx)?;
        ctx.patch_jump_here(jump, 0);
        return Ok(());
    }
    emit_rvalue(lhs, ctx)?;
    emit_rvalue(rhs, ctx)?;
    match op {
        BinOperator::Instanceof => {
            ctx.emit(sym, Opcode::CompareOp, [8, 0]);
            Ok(())
        }
        BinOperator::In => {
            ctx.emit(sym, Opcode::CompareOp, [9, 0]);
            Ok(())
        }
        BinOperator::Op(o) => emit_binary_operator(sym, o, ctx),
    }
}

fn emit_binary_operator(sym: &SymNode, op: Operator, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    use Operator::*;
    let (opcode, selector) = match op {
        Add => (Opcode::BinaryAdd, None),
        Sub => (Opcode::BinarySubtract, None),
        Mul => (Opcode::BinaryMultiply, None),
        Div => (Opcode::BinaryTrueDivide, None),
        Mod => (Opcode::BinaryModulo, None),
        Power => (Opcode::BinaryPower, None),
        LShift => (Opcode::BinaryLShift, None),
        RShift => (Opcode::BinaryRShift, None),
        URShift => (Opcode::BinaryURShift, None),
        BitAnd => (Opcode::BinaryAnd, None),
        BitOr => (Opcode::BinaryOr, None),
        BitXor => (Opcode::BinaryXor, None),
        Less => (Opcode::CompareOp, Some(0)),
        LessEqual => (Opcode::CompareOp, Some(1)),
        Equal => (Opcode::CompareOp, Some(2)),
        NotEqual => (Opcode::CompareOp, Some(3)),
        Greater => (Opcode::CompareOp, Some(4)),
        GreaterEqual => (Opcode::CompareOp, Some(5)),
        FEqual => (Opcode::CompareOp, Some(6)),
        FNotEqual => (Opcode::CompareOp, Some(7)),
        other => return Err(CompileError::new(sym.position, format!("{other:?} is not a valid binary operator"), String::new())),
    };
    ctx.emit(sym, opcode, [selector.unwrap_or(0), 0]);
    Ok(())
}

fn emit_assign(sym: &SymNode, op: Operator, target: &SymNode, value: &SymNode, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    if matches!(op, Operator::Assign) {
        emit_rvalue(value, ctx)?;
        ctx.emit(sym, Opcode::DupTop, [0, 0]);
        return emit_lvalue(target, ctx);
    }
    let base_op = compound_base_operator(sym.position, op)?;
    emit_rvalue(target, ctx)?;
    emit_rvalue(value, ctx)?;
    emit_binary_operator(sym, base_op, ctx)?;
    ctx.emit(sym, Opcode::DupTop, [0, 0]);
    emit_lvalue(target, ctx)
}

fn compound_base_operator(position: Position, op: Operator) -> Result<Operator, CompileError> {
    use Operator::*;
    Ok(match op {
        AssignAdd => Add,
        AssignSub => Sub,
        AssignMul => Mul,
        AssignDiv => Div,
        AssignMod => Mod,
        AssignLShift => LShift,
        AssignRShift => RShift,
        AssignURShift => URShift,
        AssignAnd => BitAnd,
        AssignOr => BitOr,
        AssignXor => BitXor,
        AssignPower => Power,
        other => return Err(CompileError::new(position, format!("{other:?} is not a compound assignment operator"), String::new())),
    })
}

pub fn emit_lvalue(sym: &SymNode, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    match &sym.kind {
        SymKind::VarId(name) => {
            let idx = ctx.name_idx(name);
            ctx.emit(sym, Opcode::StoreName, [idx, 0]);
            Ok(())
        }
        SymKind::MemberDot { object, name } => {
            emit_rvalue(object, ctx)?;
            let idx = ctx.name_idx(name);
            ctx.emit(sym, Opcode::StoreAttr, [idx, 0]);
            Ok(())
        }
        SymKind::MemberIndex { object, index } => {
            emit_rvalue(object, ctx)?;
            emit_rvalue(index, ctx)?;
            ctx.emit(sym, Opcode::StoreSubscr, [0, 0]);
            Ok(())
        }
        _ => Err(CompileError::new(sym.position, "invalid assignment target", String::new())),
    }
}

pub fn emit_invoke(sym: &SymNode, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    match &sym.kind {
        SymKind::CallFunction { callee, args } => {
            emit_rvalue(callee, ctx)?;
            for a in args {
                emit_rvalue(a, ctx)?;
            }
            ctx.emit(sym, Opcode::CallFunction, [args.len() as i32, 0]);
            Ok(())
        }
        SymKind::CallMethod { object, method, args } => {
            emit_rvalue(object, ctx)?;
            let idx = ctx.name_idx(method);
            ctx.emit(sym, Opcode::LoadMethod, [idx, 0]);
            for a in args {
                emit_rvalue(a, ctx)?;
            }
            ctx.emit(sym, Opcode::CallMethod, [args.len() as i32, 0]);
            Ok(())
        }
        SymKind::New { callee, args } => {
            emit_rvalue(callee, ctx)?;
            for a in args {
                emit_rvalue(a, ctx)?;
            }
            ctx.emit(sym, Opcode::CallNew, [args.len() as i32, 0]);
            Ok(())
        }
        _ => Err(CompileError::new(sym.position, "not a callable expression", String::new())),
    }
}

// ---- statement emission ----------------------------------------------------

/// `tail` is only ever `true` for the final `StmtExp` of the *program's*
/// top-level statement list — its value becomes `eval`'s result instead of
/// being discarded (§4.2 "tail value is a program-level-only concern").
fn emit_stmt(sym: &SymNode, ctx: &mut CodegenCtx<'_>, tail: bool) -> Result<(), CompileError> {
    match &sym.kind {
        SymKind::Empty => Ok(()),
        SymKind::StmtExp(expr) => {
            emit_rvalue(expr, ctx)?;
            if !tail {
                ctx.emit(sym, Opcode::PopTop, [0, 0]);
            }
            Ok(())
        }
        SymKind::StmtVar(ids) => {
            for id_node in ids {
                let SymKind::Id { name, init } = &id_node.kind else {
                    return Err(CompileError::new(id_node.position, "malformed variable declaration", String::new()));
                };
                match init {
                    Some(expr) => emit_rvalue(expr, ctx)?,
                    None => {
                        ctx.emit(id_node, Opcode::LoadUndefined, [0, 0]);
                    }
                }
                let idx = ctx.name_idx(name);
                ctx.emit(id_node, Opcode::StoreName, [idx, 0]);
            }
            Ok(())
        }
        SymKind::Block(stmts) => {
            for s in stmts {
                emit_stmt(s, ctx, false)?;
            }
            Ok(())
        }
        SymKind::If { cond, then_branch, else_branch } => emit_if(sym, cond, then_branch, else_branch, ctx),
        SymKind::While { label, cond, body } => emit_while(sym, label.clone(), cond, body, ctx),
        SymKind::DoWhile { label, body, cond } => emit_do_while(sym, label.clone(), body, cond, ctx),
        SymKind::For { label, init, cond, update, body } => emit_for(sym, label.clone(), init, cond, update, body, ctx),
        SymKind::Break(label) => emit_break(sym, label.clone(), ctx),
        SymKind::Continue(label) => emit_continue(sym, label.clone(), ctx),
        SymKind::Return(value) => {
            if let Some(v) = value {
                emit_rvalue(v, ctx)?;
            } else {
                ctx.emit(sym, Opcode::LoadUndefined, [0, 0]);
            }
            ctx.emit(sym, Opcode::Ret, [0, 0]);
            Ok(())
        }
        SymKind::Throw(value) => {
            emit_rvalue(value, ctx)?;
            ctx.emit(sym, Opcode::Throw, [0, 0]);
            Ok(())
        }
        SymKind::Try { block, catch, finally } => emit_try(sym, block, catch, finally, ctx),
        SymKind::Labelled { label, body } => {
            ctx.loop_stack.push(LoopFrame { label: Some(label.clone()), is_loop: false, continue_patches: Vec::new(), break_patches: Vec::new() });
            emit_stmt(body, ctx, false)?;
            let frame = ctx.loop_stack.pop().expect("just pushed");
            let here = ctx.chunk.current() as i32;
            for idx in frame.break_patches {
                ctx.chunk.edit(idx, 0, here);
            }
            Ok(())
        }
        SymKind::FunctionDecl { name, func_index } => {
            ctx.emit(sym, Opcode::MakeFunction, [*func_index as i32, 0]);
            let idx = ctx.name_idx(name);
            ctx.emit(sym, Opcode::StoreName, [idx, 0]);
            Ok(())
        }
        _ => Err(CompileError::new(sym.position, "expected a statement", String::new())),
    }
}

fn emit_if(sym: &SymNode, cond: &SymNode, then_branch: &SymNode, else_branch: &Option<Box<SymNode>>, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    emit_rvalue(cond, ctx)?;
    let else_jump = ctx.emit(sym, Opcode::PopJumpIfFalse, [-1, 0]);
    emit_stmt(then_branch, ctx, false)?;
    match else_branch {
        Some(else_stmt) => {
            let end_jump = ctx.emit(sym, Opcode::JumpAbsolute, [-1, 0]);
            ctx.patch_jump_here(else_jump, 0);
            emit_stmt(else_stmt, ctx, false)?;
            ctx.patch_jump_here(end_jump, 0);
        }
        None => ctx.patch_jump_here(else_jump, 0),
    }
    Ok(())
}

fn emit_while(sym: &SymNode, label: Option<String>, cond: &SymNode, body: &SymNode, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    let loop_start = ctx.chunk.current();
    emit_rvalue(cond, ctx)?;
    let exit_jump = ctx.emit(sym, Opcode::PopJumpIfFalse, [-1, 0]);
    ctx.loop_stack.push(LoopFrame { label, is_loop: true, continue_patches: Vec::new(), break_patches: Vec::new() });
    emit_stmt(body, ctx, false)?;
    ctx.emit(sym, Opcode::JumpAbsolute, [loop_start as i32, 0]);
    let end = ctx.chunk.current() as i32;
    ctx.chunk.edit(exit_jump, 0, end);
    let frame = ctx.loop_stack.pop().expect("just pushed");
    for idx in frame.continue_patches {
        ctx.chunk.edit(idx, 0, loop_start as i32);
    }
    for idx in frame.break_patches {
        ctx.chunk.edit(idx, 0, end);
    }
    Ok(())
}

fn emit_do_while(sym: &SymNode, label: Option<String>, body: &SymNode, cond: &SymNode, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    let loop_start = ctx.chunk.current();
    ctx.loop_stack.push(LoopFrame { label, is_loop: true, continue_patches: Vec::new(), break_patches: Vec::new() });
    emit_stmt(body, ctx, false)?;
    // `continue` in a do-while jumps to the condition check, not the top of
    // the loop — the target isn't known until the body's been emitted, so
    // unlike `while`/`for` this has to be back-patched too.
    let continue_target = ctx.chunk.current();
    emit_rvalue(cond, ctx)?;
    let exit_jump = ctx.emit(sym, Opcode::PopJumpIfFalse, [-1, 0]);
    ctx.emit(sym, Opcode::JumpAbsolute, [loop_start as i32, 0]);
    let end = ctx.chunk.current() as i32;
    ctx.chunk.edit(exit_jump, 0, end);
    let frame = ctx.loop_stack.pop().expect("just pushed");
    for idx in frame.continue_patches {
        ctx.chunk.edit(idx, 0, continue_target as i32);
    }
    for idx in frame.break_patches {
        ctx.chunk.edit(idx, 0, end);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_for(
    sym: &SymNode,
    label: Option<String>,
    init: &Option<Box<SymNode>>,
    cond: &Option<Box<SymNode>>,
    update: &Option<Box<SymNode>>,
    body: &SymNode,
    ctx: &mut CodegenCtx<'_>,
) -> Result<(), CompileError> {
    if let Some(i) = init {
        emit_stmt(i, ctx, false)?;
    }
    let cond_check = ctx.chunk.current();
    let exit_jump = match cond {
        Some(c) => {
            emit_rvalue(c, ctx)?;
            Some(ctx.emit(sym, Opcode::PopJumpIfFalse, [-1, 0]))
        }
        None => None,
    };
    ctx.loop_stack.push(LoopFrame { label, is_loop: true, continue_patches: Vec::new(), break_patches: Vec::new() });
    emit_stmt(body, ctx, false)?;
    let continue_target = ctx.chunk.current();
    if let Some(u) = update {
        emit_stmt(u, ctx, false)?;
    }
    ctx.emit(sym, Opcode::JumpAbsolute, [cond_check as i32, 0]);
    let end = ctx.chunk.current() as i32;
    if let Some(idx) = exit_jump {
        ctx.chunk.edit(idx, 0, end);
    }
    let frame = ctx.loop_stack.pop().expect("just pushed");
    for idx in frame.continue_patches {
        ctx.chunk.edit(idx, 0, continue_target as i32);
    }
    for idx in frame.break_patches {
        ctx.chunk.edit(idx, 0, end);
    }
    Ok(())
}

fn find_break_frame(ctx: &CodegenCtx<'_>, label: &Option<String>) -> Option<usize> {
    match label {
        None => ctx.loop_stack.iter().rposition(|f| f.is_loop),
        Some(l) => ctx.loop_stack.iter().rposition(|f| f.label.as_deref() == Some(l.as_str())),
    }
}

fn find_continue_frame(ctx: &CodegenCtx<'_>, label: &Option<String>) -> Option<usize> {
    match label {
        None => ctx.loop_stack.iter().rposition(|f| f.is_loop),
        Some(l) => ctx.loop_stack.iter().rposition(|f| f.is_loop && f.label.as_deref() == Some(l.as_str())),
    }
}

fn emit_break(sym: &SymNode, label: Option<String>, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    let pos = find_break_frame(ctx, &label).ok_or_else(|| {
        CompileError::new(
            sym.position,
            match &label {
                Some(l) => format!("undefined label '{l}'"),
                None => "'break' outside of a loop or labelled statement".to_string(),
            },
            String::new(),
        )
    })?;
    let idx = ctx.emit(sym, Opcode::JumpAbsolute, [-1, 0]);
    ctx.loop_stack[pos].break_patches.push(idx);
    Ok(())
}

fn emit_continue(sym: &SymNode, label: Option<String>, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    let pos = find_continue_frame(ctx, &label).ok_or_else(|| {
        CompileError::new(
            sym.position,
            match &label {
                Some(l) => format!("undefined label '{l}', or it does not label a loop"),
                None => "'continue' outside of a loop".to_string(),
            },
            String::new(),
        )
    })?;
    let idx = ctx.emit(sym, Opcode::JumpAbsolute, [-1, 0]);
    ctx.loop_stack[pos].continue_patches.push(idx);
    Ok(())
}

/// `try`/`catch`/`finally` (§4.3 unwind protocol). `SetupTry`'s two operands
/// are the catch and finally entry points (-1 when absent); both the
/// protected block's fall-through and the catch block's fall-through route
/// to the finally block when there is one, otherwise straight past it.
fn emit_try(sym: &SymNode, block: &SymNode, catch: &Option<(String, Box<SymNode>)>, finally: &Option<Box<SymNode>>, ctx: &mut CodegenCtx<'_>) -> Result<(), CompileError> {
    let setup_idx = ctx.emit(sym, Opcode::SetupTry, [-1, -1]);
    emit_stmt(block, ctx, false)?;
    ctx.emit(sym, Opcode::PopTry, [0, 0]);
    let to_after_try = ctx.emit(sym, Opcode::JumpAbsolute, [-1, 0]);

    let catch_addr = match catch {
        Some((name, catch_body)) => {
            let addr = ctx.chunk.current();
            let idx = ctx.name_idx(name);
            ctx.emit(sym, Opcode::StoreName, [idx, 0]);
            emit_stmt(catch_body, ctx, false)?;
            let jump = ctx.emit(sym, Opcode::JumpAbsolute, [-1, 0]);
            Some((addr, jump))
        }
        None => None,
    };

    let finally_addr = match finally {
        Some(finally_body) => {
            let addr = ctx.chunk.current();
            emit_stmt(finally_body, ctx, false)?;
            ctx.emit(sym, Opcode::EndFinally, [0, 0]);
            Some(addr)
        }
        None => None,
    };

    let end = ctx.chunk.current() as i32;
    let after_protected = finally_addr.map(|a| a as i32).unwrap_or(end);
    ctx.chunk.edit(to_after_try, 0, after_protected);
    if let Some((_, jump)) = catch_addr {
        ctx.chunk.edit(jump, 0, after_protected);
    }
    ctx.chunk.edit(setup_idx, 0, catch_addr.map(|(a, _)| a as i32).unwrap_or(-1));
    ctx.chunk.edit(setup_idx, 1, finally_addr.map(|a| a as i32).unwrap_or(-1));
    Ok(())
}
