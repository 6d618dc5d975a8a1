/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! The interface between the allocator and the client's IR.

use crate::{Block, Inst, Literal};

/// An operand: either the result of an instruction or a literal
/// constant. Literals never occupy a register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Value {
    Inst(Inst),
    Literal(Literal),
}

impl Value {
    #[inline(always)]
    pub fn as_inst(self) -> Option<Inst> {
        match self {
            Value::Inst(i) => Some(i),
            Value::Literal(_) => None,
        }
    }
}

impl From<Inst> for Value {
    fn from(inst: Inst) -> Self {
        Value::Inst(inst)
    }
}

impl From<Literal> for Value {
    fn from(lit: Literal) -> Self {
        Value::Literal(lit)
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Value::Inst(i) => write!(f, "{}", i),
            Value::Literal(l) => write!(f, "{}", l),
        }
    }
}

/// A JavaScript value type: a bitmask of the primitive kinds a value
/// may have at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Type(u16);

impl Type {
    pub const EMPTY: Type = Type(1 << 0);
    pub const UNDEFINED: Type = Type(1 << 1);
    pub const NULL: Type = Type(1 << 2);
    pub const BOOLEAN: Type = Type(1 << 3);
    pub const STRING: Type = Type(1 << 4);
    pub const NUMBER: Type = Type(1 << 5);
    pub const BIGINT: Type = Type(1 << 6);
    pub const OBJECT: Type = Type(1 << 7);
    pub const ENVIRONMENT: Type = Type(1 << 8);
    pub const NO_TYPE: Type = Type(0);
    pub const ANY: Type = Type((1 << 9) - 1);

    /// Kinds that never hold a heap pointer.
    const NON_PTR_MASK: u16 = Self::EMPTY.0
        | Self::UNDEFINED.0
        | Self::NULL.0
        | Self::BOOLEAN.0
        | Self::NUMBER.0;

    #[inline(always)]
    pub const fn union(self, other: Type) -> Type {
        Type(self.0 | other.0)
    }

    #[inline(always)]
    pub fn is_no_type(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every value of this type is a number.
    #[inline(always)]
    pub fn is_number_type(self) -> bool {
        !self.is_no_type() && self.0 & !Self::NUMBER.0 == 0
    }

    /// Returns `true` if no value of this type is a heap pointer.
    #[inline(always)]
    pub fn is_non_ptr(self) -> bool {
        !self.is_no_type() && self.0 & !Self::NON_PTR_MASK == 0
    }

    #[inline(always)]
    pub fn bits(self) -> u16 {
        self.0
    }
}

/// The coarse instruction categories the allocator distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum InstKind {
    /// An SSA join. Its operands are parallel to `phi_blocks()`.
    Phi,
    /// A copy of its single operand.
    Mov,
    /// A call; its operands are the arguments.
    Call,
    /// The last instruction of a block.
    Terminator,
    Other,
}

/// A trait defined by the client to describe its IR to the
/// allocator, and to let phi lowering edit it.
///
/// Instruction indices are dense but need not be in block order;
/// instructions inserted by the allocator get fresh indices.
pub trait Function {
    // -------------
    // CFG traversal
    // -------------

    /// How many instruction indices have been handed out, including
    /// removed instructions?
    fn num_insts(&self) -> usize;

    /// How many blocks are there?
    fn num_blocks(&self) -> usize;

    /// Get the index of the entry block.
    fn entry_block(&self) -> Block;

    /// The instructions of `block`, in execution order. The last one is
    /// the terminator.
    fn block_insts(&self, block: Block) -> &[Inst];

    /// Get CFG successors for a given block.
    fn block_succs(&self, block: Block) -> &[Block];

    /// Get the CFG predecessors for a given block.
    fn block_preds(&self, block: Block) -> &[Block];

    /// The block containing `inst`.
    fn inst_block(&self, inst: Inst) -> Block;

    // ------------------
    // Instruction details
    // ------------------

    fn inst_kind(&self, inst: Inst) -> InstKind;

    fn inst_operands(&self, inst: Inst) -> &[Value];

    /// For a phi, the predecessor block of each operand. Empty for
    /// every other instruction.
    fn phi_blocks(&self, inst: Inst) -> &[Block];

    /// Instructions that read the result of `inst`. Each user appears
    /// once.
    fn inst_users(&self, inst: Inst) -> &[Inst];

    /// The static type of the result of `inst`.
    fn inst_type(&self, inst: Inst) -> Type;

    /// The static type of a literal.
    fn literal_type(&self, lit: Literal) -> Type;

    /// Does `inst` produce a value?
    fn has_output(&self, inst: Inst) -> bool;

    fn value_type(&self, value: Value) -> Type {
        match value {
            Value::Inst(i) => self.inst_type(i),
            Value::Literal(l) => self.literal_type(l),
        }
    }

    /// The terminator of `block`.
    fn block_terminator(&self, block: Block) -> Option<Inst> {
        self.block_insts(block).last().copied()
    }

    // ---------
    // Mutation
    // ---------

    /// Create `mov src` in the block of `before`, placed right before
    /// it, and return it.
    fn insert_mov_before(&mut self, before: Inst, src: Value) -> Inst;

    /// Replace operand `idx` of `inst`, keeping user lists in sync.
    fn set_operand(&mut self, inst: Inst, idx: usize, value: Value);

    /// Move `inst` (within its block) so it sits right before
    /// `before`.
    fn move_before(&mut self, inst: Inst, before: Inst);

    /// Unlink `inst` from its block. Its index stays reserved.
    fn remove_inst(&mut self, inst: Inst);
}
