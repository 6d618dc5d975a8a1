/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Sequential allocation without liveness, for functions too large
//! for the linear scan.

use super::data_structures::AllocState;
use crate::{Block, Function, Inst, InstKind, Register, RegisterAllocator, Target, Value};
use smallvec::SmallVec;

/// Returns `true` if every user of `inst` lives in its block.
fn is_block_local<F: Function>(func: &F, inst: Inst) -> bool {
    let parent = func.inst_block(inst);
    func.inst_users(inst)
        .iter()
        .all(|&user| func.inst_block(user) == parent)
}

impl<T: Target> RegisterAllocator<T> {
    pub(crate) fn fast_pass<F: Function>(&mut self, func: &F, order: &[Block]) {
        self.stats.fast_path = true;

        // A phi and its entry moves share one register, in the class
        // that fits all of them.
        for &block in order {
            for &inst in func.block_insts(block) {
                self.target.handle_instruction(func, inst);
                if func.inst_kind(inst) != InstKind::Phi {
                    continue;
                }
                let reg = match self.optional_register(Value::Inst(inst)) {
                    Some(reg) => reg,
                    None => {
                        let class = func
                            .inst_operands(inst)
                            .iter()
                            .filter_map(|v| v.as_inst())
                            .fold(self.target.classify(func, inst), |class, entry| {
                                class.join(self.target.classify(func, entry))
                            });
                        self.assign(inst, class)
                    }
                };
                for &entry in func.inst_operands(inst) {
                    if let Value::Inst(mov) = entry {
                        self.update_register(Value::Inst(mov), reg);
                    }
                }
            }
        }

        // Everything else is allocated in order. A value only used in
        // its own block gives its register back at the end of the
        // block; a value nobody reads gives it back immediately.
        let mut block_locals: SmallVec<[Register; 16]> = SmallVec::new();
        for &block in order {
            for &inst in func.block_insts(block) {
                if self.is_allocated(Value::Inst(inst)) {
                    continue;
                }
                let class = self.target.classify(func, inst);
                let reg = self.assign(inst, class);
                if func.inst_users(inst).is_empty() {
                    self.release(reg);
                } else if is_block_local(func, inst) {
                    block_locals.push(reg);
                }
            }
            for reg in block_locals.drain(..) {
                self.release(reg);
            }
        }

        self.file.verify();
        self.state = AllocState::Allocated;
    }
}
