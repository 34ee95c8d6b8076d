//! Bytecode data model (§3, §6). A [`Chunk`] is a linear sequence of
//! [`Instruction`]s emitted by the code generator (§4.2). Jump operands
//! address a *logical* offset — the position the instruction would occupy
//! if the stream were flattened to one opcode slot followed by its operand
//! slots — rather than the index into `Chunk::code`, matching the source
//! system's `codes_idx` bookkeeping.

use crate::Position;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    LoadConst,
    LoadName,
    LoadFast,
    LoadGlobal,
    LoadDeref,
    LoadAttr,
    LoadMethod,
    LoadUndefined,
    /// The three nullary literal loads; split out from `LoadConst` because
    /// `true`/`false`/`null` are permanents in the value model, not entries
    /// in the constants pool (added by this expansion, alongside `TypeOf`
    /// below, to cover grammar productions the base opcode set didn't name).
    LoadNull,
    LoadTrue,
    LoadFalse,
    StoreName,
    StoreFast,
    StoreAttr,
    StoreSubscr,
    BinarySubscr,
    DupTop,
    PopTop,
    UnaryPositive,
    UnaryNegative,
    UnaryNot,
    UnaryInvert,
    BinaryAdd,
    BinarySubtract,
    BinaryMultiply,
    BinaryTrueDivide,
    BinaryModulo,
    BinaryPower,
    BinaryLShift,
    BinaryRShift,
    BinaryURShift,
    BinaryAnd,
    BinaryOr,
    BinaryXor,
    Inc,
    Dec,
    /// Operand 0 selects the comparator: 0=`<` 1=`<=` 2=`==` 3=`!=` 4=`>` 5=`>=` 6=`===` 7=`!==`.
    CompareOp,
    JumpIfTrueOrPop,
    JumpIfFalseOrPop,
    PopJumpIfFalse,
    JumpAbsolute,
    JumpForward,
    MakeFunction,
    CallFunction,
    CallMethod,
    /// Like `CallFunction`, but the callee is constructed: a fresh object is
    /// allocated (prototype taken from the callee's `prototype` property)
    /// and bound as `this`; an explicit object return from the callee wins,
    /// otherwise the fresh object is the result (added by this expansion to
    /// cover `NewExpression`).
    CallNew,
    BuildList,
    BuildMap,
    /// Unary `typeof` (added by this expansion; the base opcode set only
    /// named the four operator-token unary ops).
    TypeOf,
    /// `delete obj.name` / `delete obj[key]` (added by this expansion).
    DeleteAttr,
    DeleteSubscr,
    Ret,
    /// Push a try-region onto the frame's try stack (§4.3 unwind protocol,
    /// added by this expansion). Operands: `catch_pc` (-1 if absent),
    /// `finally_pc` (-1 if absent).
    SetupTry,
    /// Pop the innermost try-region on normal (non-throwing) exit from its
    /// protected range.
    PopTry,
    /// Marks the end of a `finally` block's bytecode: if the frame carries a
    /// pending re-throw from a `finally`-only unwind, resume propagating it
    /// (against an outer try-region, or to the caller); otherwise a no-op
    /// (added by this expansion — `finally` needs somewhere to resume the
    /// control transfer it interrupted once its own body has run).
    EndFinally,
    Throw,
}

impl Opcode {
    /// Number of 32-bit operands this opcode carries (0, 1 or 2), used to
    /// compute the logical address advance (§3: "advances by `1 +
    /// operand_count`").
    pub fn operand_count(self) -> usize {
        use Opcode::*;
        match self {
            LoadConst | LoadName | LoadFast | LoadGlobal | LoadDeref | LoadAttr | LoadMethod
            | StoreName | StoreFast | StoreAttr | CompareOp | JumpIfTrueOrPop
            | JumpIfFalseOrPop | PopJumpIfFalse | JumpAbsolute | JumpForward | MakeFunction
            | CallFunction | CallMethod | CallNew | BuildList | BuildMap | Throw | DeleteAttr => 1,
            SetupTry => 2,
            LoadUndefined | LoadNull | LoadTrue | LoadFalse | StoreSubscr | BinarySubscr
            | DupTop | PopTop | UnaryPositive | UnaryNegative | UnaryNot | UnaryInvert
            | BinaryAdd | BinarySubtract | BinaryMultiply | BinaryTrueDivide | BinaryModulo
            | BinaryPower | BinaryLShift | BinaryRShift | BinaryURShift | BinaryAnd | BinaryOr
            | BinaryXor | Inc | Dec | TypeOf | DeleteSubscr | Ret | PopTry | EndFinally => 0,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Instruction {
    pub position: Position,
    pub start: usize,
    pub end: usize,
    pub op: Opcode,
    pub operands: [i32; 2],
    /// This instruction's logical start address (§3 `codes_idx`).
    pub addr: usize,
}

/// A function's emitted bytecode. Indices returned by [`Chunk::emit`] are
/// positions in `code` (not logical addresses) so [`Chunk::edit`] can patch
/// an already-emitted instruction's operand in place; [`Chunk::addr_of`]
/// converts an index to the logical address a jump should target.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<Instruction>,
    logical_len: usize,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// The logical offset the *next* emitted instruction will receive
    /// (`current()` in §4.2's emission notes).
    pub fn current(&self) -> usize {
        self.logical_len
    }

    pub fn emit(
        &mut self,
        position: Position,
        start: usize,
        end: usize,
        op: Opcode,
        operands: [i32; 2],
    ) -> usize {
        let addr = self.logical_len;
        let index = self.code.len();
        self.logical_len += 1 + op.operand_count();
        self.code.push(Instruction {
            position,
            start,
            end,
            op,
            operands,
            addr,
        });
        index
    }

    /// Back-patch operand `slot` (0 or 1) of the instruction at array
    /// position `index` — used to fill in jump targets once the target is
    /// known (§4.2).
    pub fn edit(&mut self, index: usize, slot: usize, value: i32) {
        self.code[index].operands[slot] = value;
    }

    pub fn addr_of(&self, index: usize) -> usize {
        self.code[index].addr
    }

    /// Build the logical-address-to-array-index table a finished chunk
    /// needs so the interpreter can resolve jump targets (§8 property 4:
    /// "jump targets in range").
    pub fn build_addr_index(&self) -> HashMap<usize, usize> {
        self.code
            .iter()
            .enumerate()
            .map(|(i, instr)| (instr.addr, i))
            .collect()
    }

    /// Every jump target referenced by this chunk's own instructions
    /// resolves to a real instruction start (§8 property 4).
    pub fn jump_targets_in_range(&self) -> bool {
        let table = self.build_addr_index();
        self.code.iter().all(|instr| match instr.op {
            Opcode::JumpIfTrueOrPop
            | Opcode::JumpIfFalseOrPop
            | Opcode::PopJumpIfFalse
            | Opcode::JumpAbsolute => table.contains_key(&(instr.operands[0] as usize)),
            Opcode::JumpForward => {
                let target = instr.addr + 1 + (instr.operands[0] as usize);
                table.contains_key(&target) || target == self.logical_len
            }
            _ => true,
        })
    }
}

/// Debug-only, line-oriented bytecode dump (§6): `C [LLLL:CCC]  (JM) IDX
/// OPCODE          OP1      OP2  (source_slice)`.
pub fn dump(chunk: &Chunk, source: &str) -> String {
    let jump_targets: std::collections::HashSet<usize> = chunk
        .code
        .iter()
        .filter_map(|instr| match instr.op {
            Opcode::JumpIfTrueOrPop
            | Opcode::JumpIfFalseOrPop
            | Opcode::PopJumpIfFalse
            | Opcode::JumpAbsolute => Some(instr.operands[0] as usize),
            Opcode::JumpForward => Some(instr.addr + 1 + instr.operands[0] as usize),
            _ => None,
        })
        .collect();

    let mut out = String::new();
    for instr in &chunk.code {
        let jm = if jump_targets.contains(&instr.addr) {
            ">>"
        } else {
            "  "
        };
        let slice = source
            .get(instr.start..instr.end)
            .unwrap_or("")
            .replace('\n', "\\n");
        let op1 = if instr.op.operand_count() >= 1 {
            instr.operands[0].to_string()
        } else {
            String::new()
        };
        let op2 = if instr.op.operand_count() >= 2 {
            instr.operands[1].to_string()
        } else {
            String::new()
        };
        out.push_str(&format!(
            "C [{:>4}:{:>3}]  ({}) {:<4} {:<15} {:<8} {:<4} ({})\n",
            instr.position.line, instr.position.column, jm, instr.addr, instr.op, op1, op2, slice
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_addresses_skip_by_operand_count() {
        let mut c = Chunk::new();
        let pos = Position::new(1, 1);
        let i0 = c.emit(pos, 0, 0, Opcode::LoadUndefined, [0, 0]); // addr 0, width 1
        let i1 = c.emit(pos, 0, 0, Opcode::LoadConst, [0, 0]); // addr 1, width 2
        let i2 = c.emit(pos, 0, 0, Opcode::CompareOp, [2, 0]); // addr 3, width 2
        assert_eq!(c.addr_of(i0), 0);
        assert_eq!(c.addr_of(i1), 1);
        assert_eq!(c.addr_of(i2), 3);
        assert_eq!(c.current(), 5);
    }

    #[test]
    fn edit_back_patches_jump_operand() {
        let mut c = Chunk::new();
        let pos = Position::new(1, 1);
        let jump_idx = c.emit(pos, 0, 0, Opcode::PopJumpIfFalse, [-1, 0]);
        c.emit(pos, 0, 0, Opcode::LoadUndefined, [0, 0]);
        let target = c.current();
        c.edit(jump_idx, 0, target as i32);
        assert!(c.jump_targets_in_range());
    }
}
