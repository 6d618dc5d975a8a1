/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! A small in-memory IR implementing [`Function`].
//!
//! This is what the unit tests, the fuzzer and the benchmark feed to
//! the allocator. Clients with their own IR implement [`Function`]
//! directly instead.

use crate::{Block, Function, Inst, InstKind, Literal, Type, Value};
use alloc::vec;
use alloc::vec::Vec;
use smallvec::SmallVec;

#[derive(Clone, Debug)]
pub struct InstData {
    kind: InstKind,
    operands: SmallVec<[Value; 4]>,
    phi_blocks: SmallVec<[Block; 4]>,
    users: Vec<Inst>,
    ty: Type,
    has_output: bool,
    block: Block,
    removed: bool,
}

#[derive(Clone, Debug, Default)]
struct BlockData {
    insts: Vec<Inst>,
    preds: Vec<Block>,
    succs: Vec<Block>,
}

#[derive(Clone)]
pub struct Func {
    insts: Vec<InstData>,
    blocks: Vec<BlockData>,
    literals: Vec<Type>,
}

impl Func {
    /// Returns `true` if `inst` was unlinked by [`Function::remove_inst`].
    pub fn is_removed(&self, inst: Inst) -> bool {
        self.insts[inst.index()].removed
    }

    /// Number of instructions still linked into some block.
    pub fn num_live_insts(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len()).sum()
    }

    fn add_user(&mut self, value: Value, user: Inst) {
        if let Value::Inst(def) = value {
            let users = &mut self.insts[def.index()].users;
            if !users.contains(&user) {
                users.push(user);
            }
        }
    }

    fn drop_user(&mut self, value: Value, user: Inst) {
        if let Value::Inst(def) = value {
            if self.insts[user.index()].operands.contains(&value) {
                return;
            }
            self.insts[def.index()].users.retain(|&u| u != user);
        }
    }

    fn position(&self, inst: Inst) -> usize {
        let block = self.insts[inst.index()].block;
        self.blocks[block.index()]
            .insts
            .iter()
            .position(|&i| i == inst)
            .unwrap_or_else(|| panic!("{} is not linked into {}", inst, block))
    }
}

impl Function for Func {
    fn num_insts(&self) -> usize {
        self.insts.len()
    }

    fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn entry_block(&self) -> Block {
        debug_assert!(!self.blocks.is_empty());
        Block::new(0)
    }

    fn block_insts(&self, block: Block) -> &[Inst] {
        &self.blocks[block.index()].insts[..]
    }

    fn block_succs(&self, block: Block) -> &[Block] {
        &self.blocks[block.index()].succs[..]
    }

    fn block_preds(&self, block: Block) -> &[Block] {
        &self.blocks[block.index()].preds[..]
    }

    fn inst_block(&self, inst: Inst) -> Block {
        self.insts[inst.index()].block
    }

    fn inst_kind(&self, inst: Inst) -> InstKind {
        self.insts[inst.index()].kind
    }

    fn inst_operands(&self, inst: Inst) -> &[Value] {
        &self.insts[inst.index()].operands[..]
    }

    fn phi_blocks(&self, inst: Inst) -> &[Block] {
        &self.insts[inst.index()].phi_blocks[..]
    }

    fn inst_users(&self, inst: Inst) -> &[Inst] {
        &self.insts[inst.index()].users[..]
    }

    fn inst_type(&self, inst: Inst) -> Type {
        self.insts[inst.index()].ty
    }

    fn literal_type(&self, lit: Literal) -> Type {
        self.literals[lit.index()]
    }

    fn has_output(&self, inst: Inst) -> bool {
        self.insts[inst.index()].has_output
    }

    fn insert_mov_before(&mut self, before: Inst, src: Value) -> Inst {
        let block = self.insts[before.index()].block;
        let mov = Inst::new(self.insts.len());
        self.insts.push(InstData {
            kind: InstKind::Mov,
            operands: smallvec::smallvec![src],
            phi_blocks: SmallVec::new(),
            users: vec![],
            ty: self.value_type(src),
            has_output: true,
            block,
            removed: false,
        });
        let pos = self.position(before);
        self.blocks[block.index()].insts.insert(pos, mov);
        self.add_user(src, mov);
        mov
    }

    fn set_operand(&mut self, inst: Inst, idx: usize, value: Value) {
        let old = core::mem::replace(&mut self.insts[inst.index()].operands[idx], value);
        self.drop_user(old, inst);
        self.add_user(value, inst);
    }

    fn move_before(&mut self, inst: Inst, before: Inst) {
        debug_assert_eq!(self.inst_block(inst), self.inst_block(before));
        let block = self.inst_block(inst);
        let from = self.position(inst);
        self.blocks[block.index()].insts.remove(from);
        let to = self.position(before);
        self.blocks[block.index()].insts.insert(to, inst);
    }

    fn remove_inst(&mut self, inst: Inst) {
        let pos = self.position(inst);
        let block = self.inst_block(inst);
        self.blocks[block.index()].insts.remove(pos);
        self.insts[inst.index()].removed = true;
        let operands = core::mem::take(&mut self.insts[inst.index()].operands);
        for &op in operands.iter() {
            self.drop_user(op, inst);
        }
        self.insts[inst.index()].operands = operands;
    }
}

/// Builds a [`Func`] block by block. Operands may refer to
/// instructions created later (loop-carried phi entries); user lists
/// are computed by [`FuncBuilder::finalize`].
pub struct FuncBuilder {
    f: Func,
}

impl Default for FuncBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FuncBuilder {
    pub fn new() -> Self {
        FuncBuilder {
            f: Func {
                insts: vec![],
                blocks: vec![],
                literals: vec![],
            },
        }
    }

    pub fn add_block(&mut self) -> Block {
        let b = Block::new(self.f.blocks.len());
        self.f.blocks.push(BlockData::default());
        b
    }

    pub fn add_edge(&mut self, from: Block, to: Block) {
        self.f.blocks[from.index()].succs.push(to);
        self.f.blocks[to.index()].preds.push(from);
    }

    pub fn literal(&mut self, ty: Type) -> Value {
        let lit = Literal::new(self.f.literals.len());
        self.f.literals.push(ty);
        Value::Literal(lit)
    }

    pub fn num_blocks(&self) -> usize {
        self.f.blocks.len()
    }

    pub fn block_succs(&self, block: Block) -> &[Block] {
        &self.f.blocks[block.index()].succs[..]
    }

    pub fn block_preds(&self, block: Block) -> &[Block] {
        &self.f.blocks[block.index()].preds[..]
    }

    fn push(
        &mut self,
        block: Block,
        kind: InstKind,
        operands: &[Value],
        ty: Type,
        has_output: bool,
    ) -> Inst {
        let inst = Inst::new(self.f.insts.len());
        self.f.insts.push(InstData {
            kind,
            operands: operands.iter().cloned().collect(),
            phi_blocks: SmallVec::new(),
            users: vec![],
            ty,
            has_output,
            block,
            removed: false,
        });
        self.f.blocks[block.index()].insts.push(inst);
        inst
    }

    /// A generic value-producing instruction.
    pub fn op(&mut self, block: Block, operands: &[Value], ty: Type) -> Inst {
        self.push(block, InstKind::Other, operands, ty, true)
    }

    /// An instruction executed only for its effect.
    pub fn effect(&mut self, block: Block, operands: &[Value]) -> Inst {
        self.push(block, InstKind::Other, operands, Type::NO_TYPE, false)
    }

    pub fn mov(&mut self, block: Block, src: Value) -> Inst {
        let ty = self.value_type(src);
        self.push(block, InstKind::Mov, &[src], ty, true)
    }

    pub fn call(&mut self, block: Block, args: &[Value], ty: Type) -> Inst {
        self.push(block, InstKind::Call, args, ty, true)
    }

    /// A phi with no entries yet; see [`FuncBuilder::add_phi_entry`].
    pub fn phi(&mut self, block: Block, ty: Type) -> Inst {
        self.push(block, InstKind::Phi, &[], ty, true)
    }

    pub fn add_phi_entry(&mut self, phi: Inst, value: Value, pred: Block) {
        let data = &mut self.f.insts[phi.index()];
        debug_assert_eq!(data.kind, InstKind::Phi);
        data.operands.push(value);
        data.phi_blocks.push(pred);
    }

    /// A block terminator reading `operands` (a return value or a
    /// branch condition).
    pub fn terminator(&mut self, block: Block, operands: &[Value]) -> Inst {
        self.push(block, InstKind::Terminator, operands, Type::NO_TYPE, false)
    }

    fn value_type(&self, value: Value) -> Type {
        match value {
            Value::Inst(i) => self.f.insts[i.index()].ty,
            Value::Literal(l) => self.f.literals[l.index()],
        }
    }

    pub fn finalize(mut self) -> Func {
        for i in 0..self.f.insts.len() {
            let user = Inst::new(i);
            let operands = self.f.insts[i].operands.clone();
            for op in operands {
                self.f.add_user(op, user);
            }
        }
        self.f
    }
}

impl core::fmt::Debug for Func {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "{{")?;
        for (i, block) in self.blocks.iter().enumerate() {
            let succs = block.succs.iter().map(|b| b.index()).collect::<Vec<_>>();
            let preds = block.preds.iter().map(|b| b.index()).collect::<Vec<_>>();
            writeln!(f, "  block{}: # succs:{:?} preds:{:?}", i, succs, preds)?;
            for &inst in &block.insts {
                let data = &self.insts[inst.index()];
                write!(f, "    {}: {:?}", inst, data.kind)?;
                for (j, op) in data.operands.iter().enumerate() {
                    match data.phi_blocks.get(j) {
                        Some(pred) => write!(f, " {}<-{}", op, pred)?,
                        None => write!(f, " {}", op)?,
                    }
                }
                writeln!(f, " : {:#x}", data.ty.bits())?;
            }
        }
        writeln!(f, "}}")?;
        Ok(())
    }
}
