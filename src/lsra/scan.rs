/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! The linear scan over live intervals.

use super::data_structures::AllocState;
use crate::{Function, RegisterAllocator, Target, Value};
use alloc::collections::BinaryHeap;
use alloc::vec::Vec;
use core::cmp::Reverse;

impl<T: Target> RegisterAllocator<T> {
    /// Walk the intervals by increasing start, expiring every active
    /// interval that ends at or before the current start and giving
    /// the current interval the lowest free register of its class.
    pub(crate) fn scan<F: Function>(&mut self, func: &F) {
        debug_assert_eq!(self.state, AllocState::Coalesced);

        let mut pending: Vec<usize> = (0..self.numbering.len())
            .filter(|&n| !self.coalesced.contains_key(&self.numbering.inst(n)))
            .collect();
        pending.sort_unstable_by_key(|&n| (self.intervals[n].start(), n));

        // Min-heap of (end, number).
        let mut active: BinaryHeap<Reverse<(usize, usize)>> = BinaryHeap::new();

        for n in pending {
            let start = self.intervals[n].start();
            while let Some(&Reverse((end, expired))) = active.peek() {
                if end > start {
                    break;
                }
                active.pop();
                self.expire(func, expired);
            }

            let inst = self.numbering.inst(n);
            if self.is_allocated(Value::Inst(inst)) {
                // Reserved up front; the register is not ours to free.
                trace!("{} is pre-allocated to {}", inst, self.register(Value::Inst(inst)));
                self.target.handle_instruction(func, inst);
                continue;
            }

            let reg = self.assign(inst, self.classes[n]);
            trace!(
                "Allocated {} to {} for {} (start {})",
                reg,
                inst,
                self.intervals[n],
                start
            );
            active.push(Reverse((self.intervals[n].end(), n)));
        }

        while let Some(Reverse((_, n))) = active.pop() {
            self.expire(func, n);
        }

        // Coalesced instructions share their representative's register.
        for n in 0..self.numbering.len() {
            let inst = self.numbering.inst(n);
            let Some(&dest) = self.coalesced.get(&inst) else {
                continue;
            };
            debug_assert!(
                !self.is_allocated(Value::Inst(inst)),
                "Register should not be allocated"
            );
            let reg = self.register(Value::Inst(dest));
            self.update_register(Value::Inst(inst), reg);
            self.target.handle_instruction(func, inst);
        }

        self.file.verify();
        self.state = AllocState::Allocated;
    }

    fn expire<F: Function>(&mut self, func: &F, n: usize) {
        let inst = self.numbering.inst(n);
        let reg = self.register(Value::Inst(inst));
        trace!("Expiring {} {} in {}", inst, self.intervals[n], reg);
        self.release(reg);
        self.target.handle_instruction(func, inst);
    }
}
