/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Structural checks on the input, run when
//! [`crate::RegallocOptions::validate_input`] is set.

use crate::bitvec::BitVec;
use crate::{Block, Function, InstKind, RegAllocError, Value};

pub(crate) fn validate<F: Function>(func: &F, order: &[Block]) -> Result<(), RegAllocError> {
    let Some(&first) = order.first() else {
        return Err(RegAllocError::EmptyOrder);
    };
    if first != func.entry_block() {
        return Err(RegAllocError::EntryNotFirst(first));
    }

    let mut in_order = BitVec::with_len(func.num_blocks(), false);
    for &block in order {
        if in_order.test(block.index()) {
            return Err(RegAllocError::DuplicateBlock(block));
        }
        in_order.set(block.index());
    }

    for &block in order {
        let insts = func.block_insts(block);
        match insts.last() {
            Some(&last) if func.inst_kind(last) == InstKind::Terminator => {}
            _ => return Err(RegAllocError::NoTerminator(block)),
        }

        let mut seen_non_phi = false;
        for (i, &inst) in insts.iter().enumerate() {
            match func.inst_kind(inst) {
                InstKind::Terminator if i + 1 != insts.len() => {
                    return Err(RegAllocError::TerminatorNotLast(inst));
                }
                InstKind::Phi => {
                    if seen_non_phi {
                        return Err(RegAllocError::PhiNotAtStart(inst));
                    }
                    let preds = func.block_preds(block);
                    let entries = func.phi_blocks(inst);
                    if entries.len() != func.inst_operands(inst).len()
                        || entries.iter().any(|pred| !preds.contains(pred))
                    {
                        return Err(RegAllocError::PhiArity(inst));
                    }
                    // Phi entries may come from blocks outside the order.
                    continue;
                }
                _ => seen_non_phi = true,
            }

            for &op in func.inst_operands(inst) {
                let Value::Inst(operand) = op else {
                    continue;
                };
                if !in_order.test(func.inst_block(operand).index()) {
                    return Err(RegAllocError::OperandNotNumbered { inst, operand });
                }
            }
        }
    }

    Ok(())
}
