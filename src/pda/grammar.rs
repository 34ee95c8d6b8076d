//! Grammar-construction front-end (§6: "our PDA tables are authored
//! directly as Rust data, not generated"). [`build_table`] assembles every
//! [`Production`] and [`State`](super::table::State) for the language
//! subset named by [`CollTag`](crate::ast::CollTag).
//!
//! The table is built in two passes: first every production's entry state
//! is allocated (so mutually- and self-recursive productions — e.g.
//! `AssignmentExpression` referencing itself for right-associative chains —
//! have a stable [`ProdId`] to close over before their transitions exist),
//! then every state's transitions are wired up.

use super::table::{ProdId, StateId, Table, TableBuilder, Transition, TransitionKind};
use crate::ast::CollTag;
use crate::token::{Keyword, Operator, TokenKind};

fn mv(b: &mut TableBuilder, from: StateId, tok: TokenKind, to: StateId) {
    b.add_transition(
        from,
        Transition {
            kind: TransitionKind::Move(tok, to),
            lookahead: Some(vec![tok]),
            marked: true,
        },
    );
}

fn ps(b: &mut TableBuilder, from: StateId, tok: TokenKind, to: StateId) {
    b.add_transition(
        from,
        Transition {
            kind: TransitionKind::Pass(tok, to),
            lookahead: Some(vec![tok]),
            marked: true,
        },
    );
}

fn shift(b: &mut TableBuilder, from: StateId, next: ProdId, resume: StateId) {
    b.add_transition(
        from,
        Transition {
            kind: TransitionKind::Shift { next, resume },
            lookahead: None,
            marked: false,
        },
    );
}

fn shift_la(b: &mut TableBuilder, from: StateId, next: ProdId, resume: StateId, la: Vec<TokenKind>) {
    b.add_transition(
        from,
        Transition {
            kind: TransitionKind::Shift { next, resume },
            lookahead: Some(la),
            marked: false,
        },
    );
}

fn finish(b: &mut TableBuilder, from: StateId) {
    b.add_transition(
        from,
        Transition {
            kind: TransitionKind::Finish,
            lookahead: None,
            marked: false,
        },
    );
}

fn finish_la(b: &mut TableBuilder, from: StateId, la: Vec<TokenKind>) {
    b.add_transition(
        from,
        Transition {
            kind: TransitionKind::Finish,
            lookahead: Some(la),
            marked: false,
        },
    );
}

/// Wires the classic left-fold precedence-chain shape shared by every
/// binary-operator level (§4.1 "left_recursion", §9): parse one `first`,
/// then for as long as the lookahead is one of `ops`, consume the operator
/// and fold in another `loop_into`. For standard left-associative levels
/// `loop_into == first`; for right-associative ones (assignment, power)
/// `loop_into` is the production's own id, recursing into a fresh instance
/// of itself for the right-hand side.
fn wire_chain(
    b: &mut TableBuilder,
    s0: StateId,
    s1: StateId,
    first: ProdId,
    ops: &[TokenKind],
    loop_into: ProdId,
) {
    shift(b, s0, first, s1);
    for &op in ops {
        b.add_transition(
            s1,
            Transition {
                kind: TransitionKind::LeftRecursion { op, next: loop_into },
                lookahead: Some(vec![op]),
                marked: true,
            },
        );
    }
    finish(b, s1);
}

struct StmtProds {
    block: ProdId,
    var_stmt: ProdId,
    empty_stmt: ProdId,
    if_stmt: ProdId,
    for_stmt: ProdId,
    while_stmt: ProdId,
    do_stmt: ProdId,
    break_stmt: ProdId,
    continue_stmt: ProdId,
    return_stmt: ProdId,
    throw_stmt: ProdId,
    try_stmt: ProdId,
    func_decl: ProdId,
    labelled_stmt: ProdId,
    expr_stmt: ProdId,
}

/// `Statement` has no [`CollTag`] of its own (it is a pure dispatch point,
/// same treatment as the unary-prefix and primary-expression levels below):
/// every calling context that needs "parse one statement here" wires this
/// same set of transitions directly into its own state.
fn wire_statement(b: &mut TableBuilder, from: StateId, resume: StateId, p: &StmtProds) {
    use Keyword::*;
    use Operator::*;
    shift_la(b, from, p.block, resume, vec![TokenKind::Operator(LBrace)]);
    shift_la(b, from, p.var_stmt, resume, vec![TokenKind::Keyword(Var)]);
    shift_la(b, from, p.empty_stmt, resume, vec![TokenKind::Operator(Semi)]);
    shift_la(b, from, p.if_stmt, resume, vec![TokenKind::Keyword(If)]);
    shift_la(b, from, p.for_stmt, resume, vec![TokenKind::Keyword(For)]);
    shift_la(b, from, p.while_stmt, resume, vec![TokenKind::Keyword(While)]);
    shift_la(b, from, p.do_stmt, resume, vec![TokenKind::Keyword(Do)]);
    shift_la(b, from, p.break_stmt, resume, vec![TokenKind::Keyword(Break)]);
    shift_la(b, from, p.continue_stmt, resume, vec![TokenKind::Keyword(Continue)]);
    shift_la(b, from, p.return_stmt, resume, vec![TokenKind::Keyword(Return)]);
    shift_la(b, from, p.throw_stmt, resume, vec![TokenKind::Keyword(Throw)]);
    shift_la(b, from, p.try_stmt, resume, vec![TokenKind::Keyword(Try)]);
    shift_la(b, from, p.func_decl, resume, vec![TokenKind::Keyword(Function)]);
    // Ambiguous: an identifier may open a LabelledStatement or an
    // ExpressionStatement. Try the label reading first; if no `:` follows,
    // the backtrack machinery (§4.1) rolls back and falls through to the
    // expression-statement branch below.
    shift_la(b, from, p.labelled_stmt, resume, vec![TokenKind::Ident]);
    shift(b, from, p.expr_stmt, resume);
}

fn stmt_list(b: &mut TableBuilder, coll: CollTag, stop: Vec<TokenKind>, p: &StmtProds, label: &'static str) -> ProdId {
    let s0 = b.new_state(label);
    let prod = b.new_production(coll, false, s0);
    wire_statement(b, s0, s0, p);
    finish_la(b, s0, stop);
    prod
}

/// Assembles the full PDA table for the language subset named by
/// [`CollTag`]. See the module doc for the two-pass allocate/wire strategy.
pub fn build_table() -> Table {
    use CollTag::*;
    use Keyword::*;
    use Operator::*;
    use TokenKind::{Eof, Ident, Number, Regex, String as Str};

    let mut b = TableBuilder::default();

    // ---- Phase 1: allocate every production's entry state up front, so ----
    // mutually- and self-recursive productions have a stable id to close
    // over before their own transitions are wired in phase 2.
    macro_rules! new_prod {
        ($coll:expr, $exp:expr) => {{
            let s0 = b.new_state(stringify!($coll));
            (b.new_production($coll, $exp, s0), s0)
        }};
    }

    let (ident_expr, ident_expr_s0) = new_prod!(IdentifierExpression, false);
    let (this_expr, this_expr_s0) = new_prod!(ThisExpression, false);
    let (literal_expr, literal_expr_s0) = new_prod!(LiteralExpression, false);
    let (paren_expr, paren_expr_s0) = new_prod!(ParenthesizedExpression, true);
    let (array_lit, array_lit_s0) = new_prod!(ArrayLiteralExpression, false);
    let (element_list, element_list_s0) = new_prod!(ElementList, false);
    let (object_lit, object_lit_s0) = new_prod!(ObjectLiteralExpression, false);
    let (property_assignments, property_assignments_s0) = new_prod!(PropertyAssignments, false);
    let (property_assignment, property_assignment_s0) = new_prod!(PropertyAssignment, false);
    let (property_name, property_name_s0) = new_prod!(PropertyName, false);
    let (func_expr, func_expr_s0) = new_prod!(FunctionExpression, false);
    let (func_decl, func_decl_s0) = new_prod!(FunctionDeclaration, false);
    let (formal_params, formal_params_s0) = new_prod!(FormalParameterList, false);
    let (func_body, func_body_s0) = new_prod!(FunctionBody, false);

    let (member_dot, member_dot_s0) = new_prod!(MemberDotExpression, false);
    let (member_index, member_index_s0) = new_prod!(MemberIndexExpression, false);
    let (arguments_expr, arguments_expr_s0) = new_prod!(ArgumentsExpression, false);
    let (arguments, arguments_s0) = new_prod!(Arguments, false);
    let (argument_list, argument_list_s0) = new_prod!(ArgumentList, false);
    let (post_inc, post_inc_s0) = new_prod!(PostIncrementExpression, false);
    let (post_dec, post_dec_s0) = new_prod!(PostDecreaseExpression, false);
    let (new_expr, new_expr_s0) = new_prod!(NewExpression, true);

    let (typeof_expr, typeof_expr_s0) = new_prod!(TypeofExpression, false);
    let (void_expr, void_expr_s0) = new_prod!(VoidExpression, false);
    let (delete_expr, delete_expr_s0) = new_prod!(DeleteExpression, false);
    let (pre_inc, pre_inc_s0) = new_prod!(PreIncrementExpression, false);
    let (pre_dec, pre_dec_s0) = new_prod!(PreDecreaseExpression, false);
    let (unary_plus, unary_plus_s0) = new_prod!(UnaryPlusExpression, false);
    let (unary_minus, unary_minus_s0) = new_prod!(UnaryMinusExpression, false);
    let (bit_not_expr, bit_not_expr_s0) = new_prod!(BitNotExpression, false);
    let (not_expr, not_expr_s0) = new_prod!(NotExpression, false);
    let (power_expr, power_expr_s0) = new_prod!(PowerExpression, true);

    let (multiplicative, multiplicative_s0) = new_prod!(MultiplicativeExpression, true);
    let (additive, additive_s0) = new_prod!(AdditiveExpression, true);
    let (bit_shift, bit_shift_s0) = new_prod!(BitShiftExpression, true);
    let (relational, relational_s0) = new_prod!(RelationalExpression, true);
    let (instanceof_expr, instanceof_expr_s0) = new_prod!(InstanceofExpression, true);
    let (in_expr, in_expr_s0) = new_prod!(InExpression, true);
    let (equality, equality_s0) = new_prod!(EqualityExpression, true);
    let (bit_and, bit_and_s0) = new_prod!(BitAndExpression, true);
    let (bit_xor, bit_xor_s0) = new_prod!(BitXOrExpression, true);
    let (bit_or, bit_or_s0) = new_prod!(BitOrExpression, true);
    let (logical_and, logical_and_s0) = new_prod!(LogicalAndExpression, true);
    let (logical_or, logical_or_s0) = new_prod!(LogicalOrExpression, true);
    let (ternary_expr, ternary_expr_s0) = new_prod!(TernaryExpression, true);
    let (assign_expr, assign_expr_s0) = new_prod!(AssignmentExpression, true);
    let (expr_seq, expr_seq_s0) = new_prod!(ExpressionSequence, true);

    let (var_decl, var_decl_s0) = new_prod!(VariableDeclaration, false);
    let (var_decl_list, var_decl_list_s0) = new_prod!(VariableDeclarationList, false);
    let (var_stmt, var_stmt_s0) = new_prod!(VariableStatement, false);
    let (expr_stmt, expr_stmt_s0) = new_prod!(ExpressionStatement, false);
    let (if_stmt, if_stmt_s0) = new_prod!(IfStatement, false);
    let (for_stmt, for_stmt_s0) = new_prod!(ForStatement, false);
    let (while_stmt, while_stmt_s0) = new_prod!(WhileStatement, false);
    let (do_stmt, do_stmt_s0) = new_prod!(DoStatement, false);
    let (break_stmt, break_stmt_s0) = new_prod!(BreakStatement, false);
    let (continue_stmt, continue_stmt_s0) = new_prod!(ContinueStatement, false);
    let (return_stmt, return_stmt_s0) = new_prod!(ReturnStatement, false);
    let (labelled_stmt, labelled_stmt_s0) = new_prod!(LabelledStatement, false);
    let (throw_stmt, throw_stmt_s0) = new_prod!(ThrowStatement, false);
    let (try_stmt, try_stmt_s0) = new_prod!(TryStatement, false);
    let (catch_prod, catch_prod_s0) = new_prod!(CatchProduction, false);
    let (finally_prod, finally_prod_s0) = new_prod!(FinallyProduction, false);
    let (empty_stmt, empty_stmt_s0) = new_prod!(EmptyStatement, false);
    let (block, block_s0) = new_prod!(Block, false);
    let (source_elements, source_elements_s0) = new_prod!(SourceElements, false);
    let (program, program_s0) = new_prod!(Program, false);

    let stmt_prods = StmtProds {
        block,
        var_stmt,
        empty_stmt,
        if_stmt,
        for_stmt,
        while_stmt,
        do_stmt,
        break_stmt,
        continue_stmt,
        return_stmt,
        throw_stmt,
        try_stmt,
        func_decl,
        labelled_stmt,
        expr_stmt,
    };

    // ---- Phase 2: wire every state's transitions. ----

    // Leaf primaries.
    {
        let s1 = b.new_state("Ident.done");
        mv(&mut b, ident_expr_s0, Ident, s1);
        finish(&mut b, s1);
    }
    {
        let s1 = b.new_state("This.done");
        mv(&mut b, this_expr_s0, TokenKind::Keyword(This), s1);
        finish(&mut b, s1);
    }
    {
        let s1 = b.new_state("Literal.done");
        for tok in [
            Number,
            Str,
            Regex,
            TokenKind::Keyword(True),
            TokenKind::Keyword(False),
            TokenKind::Keyword(Null),
        ] {
            mv(&mut b, literal_expr_s0, tok, s1);
        }
        finish(&mut b, s1);
    }

    // `( ExpressionSequence )` — always transparent, a pure grouping node.
    {
        let s1 = b.new_state("Paren.body");
        let s2 = b.new_state("Paren.close");
        let s3 = b.new_state("Paren.done");
        ps(&mut b, paren_expr_s0, TokenKind::Operator(LParen), s1);
        shift(&mut b, s1, expr_seq, s2);
        ps(&mut b, s2, TokenKind::Operator(RParen), s3);
        finish(&mut b, s3);
    }

    // `[ ElementList? ]`
    {
        let s1 = b.new_state("Array.body");
        let s_empty = b.new_state("Array.empty");
        let s_close = b.new_state("Array.close");
        let s_done = b.new_state("Array.done");
        ps(&mut b, array_lit_s0, TokenKind::Operator(LSquare), s1);
        ps(&mut b, s1, TokenKind::Operator(RSquare), s_empty);
        shift(&mut b, s1, element_list, s_close);
        finish(&mut b, s_empty);
        ps(&mut b, s_close, TokenKind::Operator(RSquare), s_done);
        finish(&mut b, s_done);
    }
    wire_chain(
        &mut b,
        element_list_s0,
        b.new_state("ElementList.loop"),
        assign_expr,
        &[TokenKind::Operator(Comma)],
        assign_expr,
    );

    // `{ PropertyAssignments? }`
    {
        let s1 = b.new_state("Object.body");
        let s_empty = b.new_state("Object.empty");
        let s_close = b.new_state("Object.close");
        let s_done = b.new_state("Object.done");
        ps(&mut b, object_lit_s0, TokenKind::Operator(LBrace), s1);
        ps(&mut b, s1, TokenKind::Operator(RBrace), s_empty);
        shift(&mut b, s1, property_assignments, s_close);
        finish(&mut b, s_empty);
        ps(&mut b, s_close, TokenKind::Operator(RBrace), s_done);
        finish(&mut b, s_done);
    }
    wire_chain(
        &mut b,
        property_assignments_s0,
        b.new_state("PropertyAssignments.loop"),
        property_assignment,
        &[TokenKind::Operator(Comma)],
        property_assignment,
    );
    {
        let s1 = b.new_state("PropertyAssignment.colon");
        let s2 = b.new_state("PropertyAssignment.value");
        let s3 = b.new_state("PropertyAssignment.done");
        shift(&mut b, property_assignment_s0, property_name, s1);
        ps(&mut b, s1, TokenKind::Operator(Colon), s2);
        shift(&mut b, s2, assign_expr, s3);
        finish(&mut b, s3);
    }
    {
        let done = b.new_state("PropertyName.done");
        mv(&mut b, property_name_s0, Ident, done);
        mv(&mut b, property_name_s0, Str, done);
        mv(&mut b, property_name_s0, Number, done);
        finish(&mut b, done);
    }

    // Function expression: `function` Identifier? `(` FormalParameterList? `)` FunctionBody
    {
        let after_lparen = b.new_state("FuncExpr.afterLParen");
        let after_params = b.new_state("FuncExpr.afterParams");
        let body_entry = b.new_state("FuncExpr.body");
        let done = b.new_state("FuncExpr.done");
        let after_name = b.new_state("FuncExpr.afterName");
        ps(&mut b, func_expr_s0, TokenKind::Keyword(Function), after_name);
        mv(&mut b, after_name, Ident, after_lparen);
        ps(&mut b, after_name, TokenKind::Operator(LParen), after_lparen);
        ps(&mut b, after_lparen, TokenKind::Operator(RParen), body_entry);
        shift(&mut b, after_lparen, formal_params, after_params);
        ps(&mut b, after_params, TokenKind::Operator(RParen), body_entry);
        shift(&mut b, body_entry, func_body, done);
        finish(&mut b, done);
    }
    // Function declaration: identifier is mandatory.
    {
        let after_kw = b.new_state("FuncDecl.afterKw");
        let after_name = b.new_state("FuncDecl.afterName");
        let after_open = b.new_state("FuncDecl.afterOpen");
        let after_params = b.new_state("FuncDecl.afterParams");
        let body_entry = b.new_state("FuncDecl.body");
        let done = b.new_state("FuncDecl.done");
        ps(&mut b, func_decl_s0, TokenKind::Keyword(Function), after_kw);
        mv(&mut b, after_kw, Ident, after_name);
        ps(&mut b, after_name, TokenKind::Operator(LParen), after_open);
        ps(&mut b, after_open, TokenKind::Operator(RParen), body_entry);
        shift(&mut b, after_open, formal_params, after_params);
        ps(&mut b, after_params, TokenKind::Operator(RParen), body_entry);
        shift(&mut b, body_entry, func_body, done);
        finish(&mut b, done);
    }
    {
        let loop_state = b.new_state("FormalParams.loop");
        let after_comma = b.new_state("FormalParams.afterComma");
        mv(&mut b, formal_params_s0, Ident, loop_state);
        mv(&mut b, loop_state, TokenKind::Operator(Comma), after_comma);
        mv(&mut b, after_comma, Ident, loop_state);
        finish(&mut b, loop_state);
    }
    {
        let after_open = b.new_state("FunctionBody.afterOpen");
        let after_body = b.new_state("FunctionBody.afterBody");
        let done = b.new_state("FunctionBody.done");
        ps(&mut b, func_body_s0, TokenKind::Operator(LBrace), after_open);
        shift(&mut b, after_open, source_elements, after_body);
        ps(&mut b, after_body, TokenKind::Operator(RBrace), done);
        finish(&mut b, done);
    }

    // Postfix member/call/new chain, rooted at NewExpression (§4.2, §9).
    {
        let postfix_loop = b.new_state("New.postfixLoop");
        // Attached (not discarded) so the generator can tell a `new Foo()`
        // call apart from a plain `Foo()` call sharing this same chain.
        mv(&mut b, new_expr_s0, TokenKind::Keyword(New), new_expr_s0);
        shift_la(&mut b, new_expr_s0, ident_expr, postfix_loop, vec![Ident]);
        shift_la(&mut b, new_expr_s0, this_expr, postfix_loop, vec![TokenKind::Keyword(This)]);
        for tok in [
            Number,
            Str,
            Regex,
            TokenKind::Keyword(True),
            TokenKind::Keyword(False),
            TokenKind::Keyword(Null),
        ] {
            shift_la(&mut b, new_expr_s0, literal_expr, postfix_loop, vec![tok]);
        }
        shift_la(&mut b, new_expr_s0, paren_expr, postfix_loop, vec![TokenKind::Operator(LParen)]);
        shift_la(&mut b, new_expr_s0, array_lit, postfix_loop, vec![TokenKind::Operator(LSquare)]);
        shift_la(&mut b, new_expr_s0, object_lit, postfix_loop, vec![TokenKind::Operator(LBrace)]);
        shift_la(&mut b, new_expr_s0, func_expr, postfix_loop, vec![TokenKind::Keyword(Function)]);

        b.add_transition(
            postfix_loop,
            Transition {
                kind: TransitionKind::LeftRecursion { op: TokenKind::Operator(Dot), next: member_dot },
                lookahead: Some(vec![TokenKind::Operator(Dot)]),
                marked: true,
            },
        );
        b.add_transition(
            postfix_loop,
            Transition {
                kind: TransitionKind::LeftRecursion { op: TokenKind::Operator(LSquare), next: member_index },
                lookahead: Some(vec![TokenKind::Operator(LSquare)]),
                marked: true,
            },
        );
        b.add_transition(
            postfix_loop,
            Transition {
                kind: TransitionKind::LeftRecursion { op: TokenKind::Operator(LParen), next: arguments_expr },
                lookahead: Some(vec![TokenKind::Operator(LParen)]),
                marked: true,
            },
        );
        b.add_transition(
            postfix_loop,
            Transition {
                kind: TransitionKind::LeftRecursion { op: TokenKind::Operator(Inc), next: post_inc },
                lookahead: Some(vec![TokenKind::Operator(Inc)]),
                marked: true,
            },
        );
        b.add_transition(
            postfix_loop,
            Transition {
                kind: TransitionKind::LeftRecursion { op: TokenKind::Operator(Dec), next: post_dec },
                lookahead: Some(vec![TokenKind::Operator(Dec)]),
                marked: true,
            },
        );
        finish(&mut b, postfix_loop);
    }
    {
        let done = b.new_state("MemberDot.done");
        mv(&mut b, member_dot_s0, Ident, done);
        finish(&mut b, done);
    }
    {
        let after_expr = b.new_state("MemberIndex.afterExpr");
        let done = b.new_state("MemberIndex.done");
        shift(&mut b, member_index_s0, assign_expr, after_expr);
        ps(&mut b, after_expr, TokenKind::Operator(RSquare), done);
        finish(&mut b, done);
    }
    finish(&mut b, post_inc_s0);
    finish(&mut b, post_dec_s0);

    // Call arguments: `( ArgumentList? )`, nested as Arguments under
    // ArgumentsExpression (the '(' itself was already consumed by the
    // LeftRecursion transition above that chose this production).
    {
        let done = b.new_state("ArgumentsExpr.done");
        shift(&mut b, arguments_expr_s0, arguments, done);
        finish(&mut b, done);
    }
    {
        let after_list = b.new_state("Arguments.afterList");
        let empty_done = b.new_state("Arguments.emptyDone");
        let done = b.new_state("Arguments.done");
        ps(&mut b, arguments_s0, TokenKind::Operator(RParen), empty_done);
        shift(&mut b, arguments_s0, argument_list, after_list);
        finish(&mut b, empty_done);
        ps(&mut b, after_list, TokenKind::Operator(RParen), done);
        finish(&mut b, done);
    }
    wire_chain(
        &mut b,
        argument_list_s0,
        b.new_state("ArgumentList.loop"),
        assign_expr,
        &[TokenKind::Operator(Comma)],
        assign_expr,
    );

    // Unary prefix operators, each re-entering PowerExpression for its
    // operand so `typeof typeof x` / `- -x` nest naturally (§4.2 "Unary
    // prefix").
    for (entry, kw_or_op) in [
        (typeof_expr_s0, TokenKind::Keyword(Typeof)),
        (void_expr_s0, TokenKind::Keyword(Void)),
        (delete_expr_s0, TokenKind::Keyword(Delete)),
        (pre_inc_s0, TokenKind::Operator(Inc)),
        (pre_dec_s0, TokenKind::Operator(Dec)),
        (unary_plus_s0, TokenKind::Operator(Add)),
        (unary_minus_s0, TokenKind::Operator(Sub)),
        (bit_not_expr_s0, TokenKind::Operator(BitNot)),
        (not_expr_s0, TokenKind::Operator(LogNot)),
    ] {
        let after_op = b.new_state("UnaryPrefix.afterOp");
        let done = b.new_state("UnaryPrefix.done");
        mv(&mut b, entry, kw_or_op, after_op);
        shift(&mut b, after_op, power_expr, done);
        finish(&mut b, done);
    }

    // PowerExpression: the unary dispatch (above) plus optional right-assoc `**`.
    {
        let after_operand = b.new_state("Power.afterOperand");
        shift_la(&mut b, power_expr_s0, typeof_expr, after_operand, vec![TokenKind::Keyword(Typeof)]);
        shift_la(&mut b, power_expr_s0, void_expr, after_operand, vec![TokenKind::Keyword(Void)]);
        shift_la(&mut b, power_expr_s0, delete_expr, after_operand, vec![TokenKind::Keyword(Delete)]);
        shift_la(&mut b, power_expr_s0, pre_inc, after_operand, vec![TokenKind::Operator(Inc)]);
        shift_la(&mut b, power_expr_s0, pre_dec, after_operand, vec![TokenKind::Operator(Dec)]);
        shift_la(&mut b, power_expr_s0, unary_plus, after_operand, vec![TokenKind::Operator(Add)]);
        shift_la(&mut b, power_expr_s0, unary_minus, after_operand, vec![TokenKind::Operator(Sub)]);
        shift_la(&mut b, power_expr_s0, bit_not_expr, after_operand, vec![TokenKind::Operator(BitNot)]);
        shift_la(&mut b, power_expr_s0, not_expr, after_operand, vec![TokenKind::Operator(LogNot)]);
        shift(&mut b, power_expr_s0, new_expr, after_operand);

        b.add_transition(
            after_operand,
            Transition {
                kind: TransitionKind::LeftRecursion { op: TokenKind::Operator(Power), next: power_expr },
                lookahead: Some(vec![TokenKind::Operator(Power)]),
                marked: true,
            },
        );
        finish(&mut b, after_operand);
    }

    // Left-associative binary precedence chain, high to low (§4.2).
    wire_chain(&mut b, multiplicative_s0, b.new_state("Mul.loop"), power_expr, &[TokenKind::Operator(Mul), TokenKind::Operator(Div), TokenKind::Operator(Mod)], power_expr);
    wire_chain(&mut b, additive_s0, b.new_state("Add.loop"), multiplicative, &[TokenKind::Operator(Add), TokenKind::Operator(Sub)], multiplicative);
    wire_chain(&mut b, bit_shift_s0, b.new_state("Shift.loop"), additive, &[TokenKind::Operator(LShift), TokenKind::Operator(RShift), TokenKind::Operator(URShift)], additive);
    wire_chain(&mut b, relational_s0, b.new_state("Rel.loop"), bit_shift, &[TokenKind::Operator(Less), TokenKind::Operator(LessEqual), TokenKind::Operator(Greater), TokenKind::Operator(GreaterEqual)], bit_shift);
    wire_chain(&mut b, instanceof_expr_s0, b.new_state("Instanceof.loop"), relational, &[TokenKind::Keyword(Instanceof)], relational);
    wire_chain(&mut b, in_expr_s0, b.new_state("In.loop"), instanceof_expr, &[TokenKind::Keyword(In)], instanceof_expr);
    wire_chain(&mut b, equality_s0, b.new_state("Eq.loop"), in_expr, &[TokenKind::Operator(Equal), TokenKind::Operator(NotEqual), TokenKind::Operator(FEqual), TokenKind::Operator(FNotEqual)], in_expr);
    wire_chain(&mut b, bit_and_s0, b.new_state("BitAnd.loop"), equality, &[TokenKind::Operator(BitAnd)], equality);
    wire_chain(&mut b, bit_xor_s0, b.new_state("BitXor.loop"), bit_and, &[TokenKind::Operator(BitXor)], bit_and);
    wire_chain(&mut b, bit_or_s0, b.new_state("BitOr.loop"), bit_xor, &[TokenKind::Operator(BitOr)], bit_xor);
    wire_chain(&mut b, logical_and_s0, b.new_state("And.loop"), bit_or, &[TokenKind::Operator(LogAnd)], bit_or);
    wire_chain(&mut b, logical_or_s0, b.new_state("Or.loop"), logical_and, &[TokenKind::Operator(LogOr)], logical_and);

    // Ternary.
    {
        let after_test = b.new_state("Ternary.afterTest");
        let after_query = b.new_state("Ternary.afterQuery");
        let after_then = b.new_state("Ternary.afterThen");
        let after_colon = b.new_state("Ternary.afterColon");
        let done = b.new_state("Ternary.done");
        shift(&mut b, ternary_expr_s0, logical_or, after_test);
        mv(&mut b, after_test, TokenKind::Operator(Query), after_query);
        shift(&mut b, after_query, assign_expr, after_then);
        mv(&mut b, after_then, TokenKind::Operator(Colon), after_colon);
        shift(&mut b, after_colon, assign_expr, done);
        finish(&mut b, done);
        finish(&mut b, after_test);
    }

    // Assignment: right-associative via direct self-recursion (§4.2).
    wire_chain(
        &mut b,
        assign_expr_s0,
        b.new_state("Assign.loop"),
        ternary_expr,
        &[
            TokenKind::Operator(Assign),
            TokenKind::Operator(AssignAdd),
            TokenKind::Operator(AssignSub),
            TokenKind::Operator(AssignMul),
            TokenKind::Operator(AssignDiv),
            TokenKind::Operator(AssignMod),
            TokenKind::Operator(AssignLShift),
            TokenKind::Operator(AssignRShift),
            TokenKind::Operator(AssignURShift),
            TokenKind::Operator(AssignAnd),
            TokenKind::Operator(AssignOr),
            TokenKind::Operator(AssignXor),
            TokenKind::Operator(AssignPower),
        ],
        assign_expr,
    );

    wire_chain(&mut b, expr_seq_s0, b.new_state("ExprSeq.loop"), assign_expr, &[TokenKind::Operator(Comma)], assign_expr);

    // Statements.
    {
        let after_name = b.new_state("VarDecl.afterName");
        let after_eq = b.new_state("VarDecl.afterEq");
        let done = b.new_state("VarDecl.done");
        mv(&mut b, var_decl_s0, Ident, after_name);
        ps(&mut b, after_name, TokenKind::Operator(Assign), after_eq);
        shift(&mut b, after_eq, assign_expr, done);
        finish(&mut b, done);
        finish(&mut b, after_name);
    }

    wire_chain(&mut b, var_decl_list_s0, b.new_state("VarDeclList.loop"), var_decl, &[TokenKind::Operator(Comma)], var_decl);

    {
        let after_var = b.new_state("VarStmt.afterVar");
        let after_list = b.new_state("VarStmt.afterList");
        let done = b.new_state("VarStmt.done");
        ps(&mut b, var_stmt_s0, TokenKind::Keyword(Var), after_var);
        shift(&mut b, after_var, var_decl_list, after_list);
        ps(&mut b, after_list, TokenKind::Operator(Semi), done);
        finish(&mut b, done);
    }

    {
        let after_expr = b.new_state("ExprStmt.afterExpr");
        let done = b.new_state("ExprStmt.done");
        shift(&mut b, expr_stmt_s0, expr_seq, after_expr);
        ps(&mut b, after_expr, TokenKind::Operator(Semi), done);
        finish(&mut b, done);
    }

    {
        let after_if = b.new_state("If.afterIf");
        let after_lparen = b.new_state("If.afterLParen");
        let after_test = b.new_state("If.afterTest");
        let after_rparen = b.new_state("If.afterRParen");
        let after_then = b.new_state("If.afterThen");
        let after_else_kw = b.new_state("If.afterElseKw");
        let done = b.new_state("If.done");
        ps(&mut b, if_stmt_s0, TokenKind::Keyword(If), after_if);
        ps(&mut b, after_if, TokenKind::Operator(LParen), after_lparen);
        shift(&mut b, after_lparen, expr_seq, after_test);
        ps(&mut b, after_test, TokenKind::Operator(RParen), after_rparen);
        wire_statement(&mut b, after_rparen, after_then, &stmt_prods);
        mv(&mut b, after_then, TokenKind::Keyword(Else), after_else_kw);
        wire_statement(&mut b, after_else_kw, done, &stmt_prods);
        finish(&mut b, done);
        finish(&mut b, after_then);
    }

    {
        let after_for = b.new_state("For.afterFor");
        let after_lparen = b.new_state("For.afterLParen");
        let after_var_kw = b.new_state("For.afterVarKw");
        let after_init = b.new_state("For.afterInit");
        let test_entry = b.new_state("For.testEntry");
        let after_test = b.new_state("For.afterTest");
        let update_entry = b.new_state("For.updateEntry");
        let after_update = b.new_state("For.afterUpdate");
        let body_entry = b.new_state("For.bodyEntry");
        let done = b.new_state("For.done");

        ps(&mut b, for_stmt_s0, TokenKind::Keyword(For), after_for);
        ps(&mut b, after_for, TokenKind::Operator(LParen), after_lparen);

        ps(&mut b, after_lparen, TokenKind::Operator(Semi), test_entry); // empty init, separator only
        ps(&mut b, after_lparen, TokenKind::Keyword(Var), after_var_kw);
        shift(&mut b, after_lparen, expr_seq, after_init);
        shift(&mut b, after_var_kw, var_decl_list, after_init);
        ps(&mut b, after_init, TokenKind::Operator(Semi), test_entry);

        ps(&mut b, test_entry, TokenKind::Operator(Semi), update_entry); // empty test, separator only
        shift(&mut b, test_entry, expr_seq, after_test);
        ps(&mut b, after_test, TokenKind::Operator(Semi), update_entry);

        ps(&mut b, update_entry, TokenKind::Operator(RParen), body_entry); // empty update, separator only
        shift(&mut b, update_entry, expr_seq, after_update);
        ps(&mut b, after_update, TokenKind::Operator(RParen), body_entry);

        wire_statement(&mut b, body_entry, done, &stmt_prods);
        finish(&mut b, done);
    }

    {
        let after_while = b.new_state("While.afterWhile");
        let after_lparen = b.new_state("While.afterLParen");
        let after_test = b.new_state("While.afterTest");
        let after_rparen = b.new_state("While.afterRParen");
        let done = b.new_state("While.done");
        ps(&mut b, while_stmt_s0, TokenKind::Keyword(While), after_while);
        ps(&mut b, after_while, TokenKind::Operator(LParen), after_lparen);
        shift(&mut b, after_lparen, expr_seq, after_test);
        ps(&mut b, after_test, TokenKind::Operator(RParen), after_rparen);
        wire_statement(&mut b, after_rparen, done, &stmt_prods);
        finish(&mut b, done);
    }

    {
        let after_do = b.new_state("Do.afterDo");
        let after_body = b.new_state("Do.afterBody");
        let after_while_kw = b.new_state("Do.afterWhileKw");
        let after_lparen = b.new_state("Do.afterLParen");
        let after_test = b.new_state("Do.afterTest");
        let after_rparen = b.new_state("Do.afterRParen");
        let done = b.new_state("Do.done");
        ps(&mut b, do_stmt_s0, TokenKind::Keyword(Do), after_do);
        wire_statement(&mut b, after_do, after_body, &stmt_prods);
        ps(&mut b, after_body, TokenKind::Keyword(While), after_while_kw);
        ps(&mut b, after_while_kw, TokenKind::Operator(LParen), after_lparen);
        shift(&mut b, after_lparen, expr_seq, after_test);
        ps(&mut b, after_test, TokenKind::Operator(RParen), after_rparen);
        ps(&mut b, after_rparen, TokenKind::Operator(Semi), done);
        finish(&mut b, done);
    }

    {
        let after_kw = b.new_state("Break.afterKw");
        let after_label = b.new_state("Break.afterLabel");
        let done = b.new_state("Break.done");
        ps(&mut b, break_stmt_s0, TokenKind::Keyword(Break), after_kw);
        mv(&mut b, after_kw, Ident, after_label);
        ps(&mut b, after_label, TokenKind::Operator(Semi), done);
        ps(&mut b, after_kw, TokenKind::Operator(Semi), done);
        finish(&mut b, done);
    }
    {
        let after_kw = b.new_state("Continue.afterKw");
        let after_label = b.new_state("Continue.afterLabel");
        let done = b.new_state("Continue.done");
        ps(&mut b, continue_stmt_s0, TokenKind::Keyword(Continue), after_kw);
        mv(&mut b, after_kw, Ident, after_label);
        ps(&mut b, after_label, TokenKind::Operator(Semi), done);
        ps(&mut b, after_kw, TokenKind::Operator(Semi), done);
        finish(&mut b, done);
    }

    {
        let after_kw = b.new_state("Return.afterKw");
        let after_expr = b.new_state("Return.afterExpr");
        let done = b.new_state("Return.done");
        ps(&mut b, return_stmt_s0, TokenKind::Keyword(Return), after_kw);
        ps(&mut b, after_kw, TokenKind::Operator(Semi), done);
        shift(&mut b, after_kw, expr_seq, after_expr);
        ps(&mut b, after_expr, TokenKind::Operator(Semi), done);
        finish(&mut b, done);
    }

    {
        let after_label = b.new_state("Labelled.afterLabel");
        let after_colon = b.new_state("Labelled.afterColon");
        let done = b.new_state("Labelled.done");
        mv(&mut b, labelled_stmt_s0, Ident, after_label);
        ps(&mut b, after_label, TokenKind::Operator(Colon), after_colon);
        wire_statement(&mut b, after_colon, done, &stmt_prods);
        finish(&mut b, done);
    }

    {
        let after_kw = b.new_state("Throw.afterKw");
        let after_expr = b.new_state("Throw.afterExpr");
        let done = b.new_state("Throw.done");
        ps(&mut b, throw_stmt_s0, TokenKind::Keyword(Throw), after_kw);
        shift(&mut b, after_kw, expr_seq, after_expr);
        ps(&mut b, after_expr, TokenKind::Operator(Semi), done);
        finish(&mut b, done);
    }

    {
        let after_try = b.new_state("Try.afterTry");
        let after_block = b.new_state("Try.afterBlock");
        let after_catch = b.new_state("Try.afterCatch");
        let done = b.new_state("Try.done");
        ps(&mut b, try_stmt_s0, TokenKind::Keyword(Try), after_try);
        shift(&mut b, after_try, block, after_block);
        shift_la(&mut b, after_block, catch_prod, after_catch, vec![TokenKind::Keyword(Catch)]);
        shift_la(&mut b, after_block, finally_prod, done, vec![TokenKind::Keyword(Finally)]);
        shift_la(&mut b, after_catch, finally_prod, done, vec![TokenKind::Keyword(Finally)]);
        finish(&mut b, after_catch);
        finish(&mut b, done);
    }
    {
        let after_catch_kw = b.new_state("Catch.afterKw");
        let after_lparen = b.new_state("Catch.afterLParen");
        let after_ident = b.new_state("Catch.afterIdent");
        let after_rparen = b.new_state("Catch.afterRParen");
        let done = b.new_state("Catch.done");
        ps(&mut b, catch_prod_s0, TokenKind::Keyword(Catch), after_catch_kw);
        ps(&mut b, after_catch_kw, TokenKind::Operator(LParen), after_lparen);
        mv(&mut b, after_lparen, Ident, after_ident);
        ps(&mut b, after_ident, TokenKind::Operator(RParen), after_rparen);
        shift(&mut b, after_rparen, block, done);
        finish(&mut b, done);
    }
    {
        let after_kw = b.new_state("Finally.afterKw");
        let done = b.new_state("Finally.done");
        ps(&mut b, finally_prod_s0, TokenKind::Keyword(Finally), after_kw);
        shift(&mut b, after_kw, block, done);
        finish(&mut b, done);
    }

    {
        let done = b.new_state("EmptyStmt.done");
        ps(&mut b, empty_stmt_s0, TokenKind::Operator(Semi), done);
        finish(&mut b, done);
    }

    {
        let after_open = b.new_state("Block.afterOpen");
        let after_body = b.new_state("Block.afterBody");
        let done = b.new_state("Block.done");
        ps(&mut b, block_s0, TokenKind::Operator(LBrace), after_open);
        shift(&mut b, after_open, source_elements, after_body);
        ps(&mut b, after_body, TokenKind::Operator(RBrace), done);
        finish(&mut b, done);
    }

    // `source_elements`/`program` reuse the shared statement-list shape.
    wire_statement(&mut b, source_elements_s0, source_elements_s0, &stmt_prods);
    finish_la(&mut b, source_elements_s0, vec![TokenKind::Operator(RBrace), Eof]);
    wire_statement(&mut b, program_s0, program_s0, &stmt_prods);
    finish_la(&mut b, program_s0, vec![Eof]);

    b.build(program)
}
