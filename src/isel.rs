/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Lowering of an allocated function to flat VM registers.
//!
//! This is the boundary to the bytecode emitter: every value becomes a
//! flat register of the [`HvmRegisterAllocator`] frame, call arguments
//! are placed in the outgoing parameter area, and moves the allocator
//! made redundant disappear.

use crate::hvm::{HvmRegisterAllocator, CALLEE_EXTRA_REGISTERS_AT_START};
use crate::{Block, Function, Inst, InstKind, Literal, Value};
use alloc::vec::Vec;
use smallvec::SmallVec;

/// A lowered operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Reg(u32),
    Literal(Literal),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoweredInst {
    Mov {
        dst: u32,
        src: Operand,
    },
    Op {
        inst: Inst,
        dst: Option<u32>,
        args: SmallVec<[Operand; 4]>,
    },
    /// Place argument `index` of the next call.
    LoadArg {
        index: u32,
        dst: u32,
        src: Operand,
    },
    Call {
        inst: Inst,
        dst: u32,
        argc: u32,
    },
    Terminator {
        inst: Inst,
        args: SmallVec<[Operand; 2]>,
    },
}

#[derive(Clone, Debug)]
pub struct LoweredBlock {
    pub block: Block,
    pub insts: Vec<LoweredInst>,
}

#[derive(Clone, Debug, Default)]
pub struct LoweredFunction {
    pub blocks: Vec<LoweredBlock>,
    /// Registers the emitter's stack check must make room for.
    pub frame_size: u32,
    /// Moves dropped because source and destination coincide.
    pub elided_moves: usize,
}

fn operand(ra: &HvmRegisterAllocator, value: Value) -> Operand {
    match value {
        Value::Inst(_) => Operand::Reg(ra.hvm_register_index(ra.register(value))),
        Value::Literal(lit) => Operand::Literal(lit),
    }
}

/// Lower the blocks of `order`. Expects phis to have been removed by
/// [`crate::RegisterAllocator::lower_phis`].
pub fn lower_function<F: Function>(
    func: &F,
    ra: &HvmRegisterAllocator,
    order: &[Block],
) -> LoweredFunction {
    let mut lowered = LoweredFunction {
        blocks: Vec::with_capacity(order.len()),
        frame_size: ra.total_register_usage() + CALLEE_EXTRA_REGISTERS_AT_START,
        elided_moves: 0,
    };

    for &block in order {
        let mut insts = Vec::with_capacity(func.block_insts(block).len());
        for &inst in func.block_insts(block) {
            match func.inst_kind(inst) {
                InstKind::Phi => {
                    debug_assert!(false, "phi {} survived lowering", inst);
                }
                InstKind::Mov => {
                    let dst = ra.hvm_register_index(ra.register(Value::Inst(inst)));
                    let src = operand(ra, func.inst_operands(inst)[0]);
                    if src == Operand::Reg(dst) {
                        lowered.elided_moves += 1;
                        continue;
                    }
                    insts.push(LoweredInst::Mov { dst, src });
                }
                InstKind::Call => {
                    let args = func.inst_operands(inst);
                    for (i, &arg) in args.iter().enumerate() {
                        insts.push(LoweredInst::LoadArg {
                            index: i as u32,
                            dst: ra.call_argument_register(i as u32),
                            src: operand(ra, arg),
                        });
                    }
                    insts.push(LoweredInst::Call {
                        inst,
                        dst: ra.hvm_register_index(ra.register(Value::Inst(inst))),
                        argc: args.len() as u32,
                    });
                }
                InstKind::Terminator => {
                    let args = func
                        .inst_operands(inst)
                        .iter()
                        .map(|&v| operand(ra, v))
                        .collect();
                    insts.push(LoweredInst::Terminator { inst, args });
                }
                InstKind::Other => {
                    let dst = if func.has_output(inst) {
                        Some(ra.hvm_register_index(ra.register(Value::Inst(inst))))
                    } else {
                        None
                    };
                    let args = func
                        .inst_operands(inst)
                        .iter()
                        .map(|&v| operand(ra, v))
                        .collect();
                    insts.push(LoweredInst::Op { inst, dst, args });
                }
            }
        }
        lowered.blocks.push(LoweredBlock { block, insts });
    }

    trace!(
        "Lowered {} blocks, frame size {}, {} moves elided",
        lowered.blocks.len(),
        lowered.frame_size,
        lowered.elided_moves
    );
    lowered
}
