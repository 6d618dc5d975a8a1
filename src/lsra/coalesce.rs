/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Copy forwarding and interval coalescing.

use super::data_structures::{AllocState, Stats};
use crate::{Block, Function, Inst, InstKind, RegClass, RegisterAllocator, Target, Value};
use crate::FxHashMap;

/// Shorten the lifetime of copied values: when a block copies the same
/// value twice, the second copy reads the first.
///
/// ```text
///   %1 = mov %0            %1 = mov %0
///   %2 = mov %0     =>     %2 = mov %1
/// ```
///
/// Runs before numbering so that liveness sees the rewritten operands.
pub(crate) fn forward_copies<F: Function>(func: &mut F, order: &[Block], stats: &mut Stats) {
    let mut last_copy: FxHashMap<Inst, Inst> = FxHashMap::default();
    for &block in order {
        last_copy.clear();
        for i in 0..func.block_insts(block).len() {
            let mov = func.block_insts(block)[i];
            if func.inst_kind(mov) != InstKind::Mov {
                continue;
            }
            let Some(&Value::Inst(op)) = func.inst_operands(mov).first() else {
                continue;
            };
            if let Some(&copy) = last_copy.get(&op) {
                trace!("Forwarding {} into {} instead of {}", copy, mov, op);
                func.set_operand(mov, 0, Value::Inst(copy));
                stats.copies_forwarded += 1;
            }
            last_copy.insert(op, mov);
        }
    }
}

impl<T: Target> RegisterAllocator<T> {
    /// Follow the coalescing map from `inst` to its representative.
    fn representative(&self, mut inst: Inst) -> Inst {
        while let Some(&next) = self.coalesced.get(&inst) {
            inst = next;
        }
        inst
    }

    /// Merge live intervals that can share a register. Phi entry moves
    /// always join their phi; other moves join their source when the
    /// two live ranges are disjoint.
    pub(crate) fn coalesce<F: Function>(&mut self, func: &F, order: &[Block]) {
        debug_assert_eq!(self.state, AllocState::IntervalsComputed);

        // The entry moves and their phi must end up in one register, or
        // the lowered phis would be wrong.
        for &block in order {
            for &phi in func.block_insts(block) {
                if func.inst_kind(phi) != InstKind::Phi {
                    continue;
                }
                let Some(phi_num) = self.numbering.get(phi) else {
                    continue;
                };
                for &entry in func.inst_operands(phi) {
                    let Value::Inst(mov) = entry else {
                        continue;
                    };
                    // Self edges can list the same move twice.
                    if self.coalesced.contains_key(&mov) {
                        continue;
                    }
                    let Some(mov_num) = self.numbering.get(mov) else {
                        continue;
                    };
                    debug_assert_eq!(func.inst_kind(mov), InstKind::Mov);
                    let mov_ivl = self.intervals[mov_num].clone();
                    self.intervals[phi_num].add_interval(&mov_ivl);
                    self.classes[phi_num] = self.classes[phi_num].join(self.classes[mov_num]);
                    self.coalesced.insert(mov, phi);
                    self.stats.coalesced_phi_moves += 1;
                }
            }
        }

        for &block in order {
            for &mov in func.block_insts(block) {
                if func.inst_kind(mov) != InstKind::Mov {
                    continue;
                }
                let Some(&Value::Inst(op)) = func.inst_operands(mov).first() else {
                    continue;
                };
                if self.coalesced.contains_key(&op)
                    || self.is_allocated(Value::Inst(op))
                    || self.is_allocated(Value::Inst(mov))
                    || self.is_manually_allocated_interval(func, op)
                {
                    continue;
                }
                let (Some(op_num), Some(_)) = (self.numbering.get(op), self.numbering.get(mov))
                else {
                    continue;
                };

                let dest = self.representative(mov);
                if dest == op {
                    continue;
                }
                let Some(dest_num) = self.numbering.get(dest) else {
                    continue;
                };

                let (dest_class, op_class) = (self.classes[dest_num], self.classes[op_num]);
                if dest_class == RegClass::NoOutput
                    || op_class == RegClass::NoOutput
                    || dest_class.join(op_class) != dest_class
                {
                    self.stats.coalesce_rejected += 1;
                    continue;
                }
                if self.intervals[dest_num].intersects(&self.intervals[op_num]) {
                    self.stats.coalesce_rejected += 1;
                    continue;
                }

                trace!(
                    "Coalescing {} {} -> {} {}",
                    op,
                    self.intervals[op_num],
                    dest,
                    self.intervals[dest_num]
                );
                for target in self.coalesced.values_mut() {
                    if *target == op {
                        trace!("Remapping from {} to {}", op, dest);
                        *target = dest;
                    }
                }
                let op_ivl = self.intervals[op_num].clone();
                self.intervals[dest_num].add_interval(&op_ivl);
                self.coalesced.insert(op, dest);
                self.stats.coalesced_moves += 1;
            }
        }

        self.state = AllocState::Coalesced;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::FuncBuilder;
    use crate::Type;

    #[test]
    fn test_forward_copies_in_block() {
        let mut b = FuncBuilder::new();
        let entry = b.add_block();
        let v0 = b.op(entry, &[], Type::ANY);
        let m1 = b.mov(entry, v0.into());
        let m2 = b.mov(entry, v0.into());
        let m3 = b.mov(entry, v0.into());
        b.terminator(entry, &[m2.into(), m3.into(), m1.into()]);
        let mut f = b.finalize();
        let mut stats = Stats::default();
        forward_copies(&mut f, &[entry], &mut stats);
        assert_eq!(f.inst_operands(m1), &[Value::Inst(v0)]);
        assert_eq!(f.inst_operands(m2), &[Value::Inst(m1)]);
        assert_eq!(f.inst_operands(m3), &[Value::Inst(m2)]);
        assert_eq!(f.inst_users(v0), &[m1]);
        assert_eq!(stats.copies_forwarded, 2);
    }

    #[test]
    fn test_forwarding_is_block_local() {
        let mut b = FuncBuilder::new();
        let entry = b.add_block();
        let next = b.add_block();
        b.add_edge(entry, next);
        let v0 = b.op(entry, &[], Type::ANY);
        let m1 = b.mov(entry, v0.into());
        b.terminator(entry, &[m1.into()]);
        let m2 = b.mov(next, v0.into());
        b.terminator(next, &[m2.into()]);
        let mut f = b.finalize();
        let mut stats = Stats::default();
        forward_copies(&mut f, &[entry, next], &mut stats);
        assert_eq!(f.inst_operands(m2), &[Value::Inst(v0)]);
        assert_eq!(stats.copies_forwarded, 0);
    }
}
