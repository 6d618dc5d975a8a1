/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Phi isolation before allocation, and phi removal after it.
//!
//! Before allocation every phi entry is replaced by a fresh `mov`
//! placed right before the terminator of the incoming block. The
//! allocator then gives each entry `mov` the phi's register, so the
//! moves *are* the lowered phi: once registers are assigned the phi
//! itself can simply be dropped.

use super::data_structures::{AllocState, Stats};
use crate::bitvec::BitVec;
use crate::{Block, Function, Inst, InstKind, Value};
use crate::{FxHashMap, RegisterAllocator, Target};
use alloc::vec::Vec;

/// Returns `true` if `phi` is read somewhere its register may already
/// hold the value for the next iteration: by a terminator, by another
/// phi of its own block, or from another block.
fn phi_read_write<F: Function>(func: &F, phi: Inst) -> bool {
    let parent = func.inst_block(phi);
    func.inst_users(phi).iter().any(|&user| {
        let kind = func.inst_kind(user);
        kind == InstKind::Terminator
            || (kind == InstKind::Phi && user != phi && func.inst_block(user) == parent)
            || func.inst_block(user) != parent
    })
}

fn replace_uses<F: Function>(func: &mut F, user: Inst, from: Inst, to: Inst) {
    for idx in 0..func.inst_operands(user).len() {
        if func.inst_operands(user)[idx] == Value::Inst(from) {
            func.set_operand(user, idx, Value::Inst(to));
        }
    }
}

/// Rewrite the phis of `order` so that every entry is a `mov` at the
/// end of its incoming block.
pub(crate) fn isolate_phis<F: Function>(func: &mut F, order: &[Block], stats: &mut Stats) {
    let phis: Vec<Inst> = order
        .iter()
        .flat_map(|&b| func.block_insts(b).iter().cloned())
        .filter(|&i| func.inst_kind(i) == InstKind::Phi)
        .collect();

    // The entry moves at the end of a block write the registers of the
    // successor's phis. A phi that is still read after such a write
    // (typically around a loop) is copied first, and the late readers
    // read the copy.
    for &phi in &phis {
        if !phi_read_write(func, phi) {
            continue;
        }
        let Some(term) = func.block_terminator(func.inst_block(phi)) else {
            continue;
        };
        let copy = func.insert_mov_before(term, Value::Inst(phi));
        stats.phi_copies += 1;
        trace!("Copying {} into {} before {}", phi, copy, term);

        let parent = func.inst_block(phi);
        let users: Vec<Inst> = func.inst_users(phi).to_vec();
        for user in users {
            if user == copy {
                continue;
            }
            let kind = func.inst_kind(user);
            if kind != InstKind::Phi
                && kind != InstKind::Terminator
                && func.inst_block(user) == parent
            {
                continue;
            }
            replace_uses(func, user, phi, copy);
        }
    }

    // Values copied into a phi register in a given block.
    let mut copied: FxHashMap<Value, Inst> = FxHashMap::default();

    for &phi in &phis {
        for i in 0..func.inst_operands(phi).len() {
            let value = func.inst_operands(phi)[i];
            let pred = func.phi_blocks(phi)[i];
            let Some(term) = func.block_terminator(pred) else {
                continue;
            };
            let mov = func.insert_mov_before(term, value);
            func.set_operand(phi, i, Value::Inst(mov));
            copied.insert(value, mov);
            stats.moves_inserted += 1;
            trace!("Lowering entry {} of {} into {} in {}", value, phi, mov, pred);
        }
    }

    // A terminator that reads a value just copied into a phi register
    // can read the copy instead; this ends the original value's live
    // range before the moves.
    for &block in order {
        let Some(term) = func.block_terminator(block) else {
            continue;
        };
        for i in 0..func.inst_operands(term).len() {
            let op = func.inst_operands(term)[i];
            if let Value::Literal(_) = op {
                continue;
            }
            if let Some(&mov) = copied.get(&op) {
                if func.inst_block(mov) == block {
                    func.set_operand(term, i, Value::Inst(mov));
                    func.move_before(mov, term);
                }
            }
        }
    }
}

impl<T: Target> RegisterAllocator<T> {
    /// Remove every phi in `order`, leaving the entry moves inserted by
    /// [`RegisterAllocator::allocate`] as the lowered form. Must run
    /// after allocation.
    pub fn lower_phis<F: Function>(&mut self, func: &mut F, order: &[Block]) {
        debug_assert!(
            self.state >= AllocState::Allocated,
            "Lowering phis before allocation"
        );
        let mut in_order = BitVec::with_len(func.num_blocks(), false);
        for &block in order {
            in_order.set(block.index());
        }
        for &block in order {
            let phis: Vec<Inst> = func
                .block_insts(block)
                .iter()
                .cloned()
                .filter(|&i| func.inst_kind(i) == InstKind::Phi)
                .collect();
            for phi in phis {
                if cfg!(debug_assertions) {
                    self.verify_phi_moves(func, phi, &in_order);
                }
                func.remove_inst(phi);
                self.stats.phis_lowered += 1;
            }
        }
        self.state = AllocState::PhisLowered;
    }

    fn verify_phi_moves<F: Function>(&self, func: &F, phi: Inst, in_order: &BitVec) {
        let phi_reg = self.optional_register(Value::Inst(phi));
        debug_assert!(phi_reg.is_some(), "phi {} has no register", phi);
        for (&value, &pred) in func
            .inst_operands(phi)
            .iter()
            .zip(func.phi_blocks(phi).iter())
        {
            if !in_order.test(pred.index()) {
                continue;
            }
            debug_assert!(
                value.as_inst().map_or(false, |m| {
                    func.inst_kind(m) == InstKind::Mov && func.inst_block(m) == pred
                }),
                "phi {} entry {} is not a move in {}",
                phi,
                value,
                pred
            );
            debug_assert_eq!(
                self.optional_register(value),
                phi_reg,
                "phi {} entry {} is not in the phi register",
                phi,
                value
            );
        }
    }
}
