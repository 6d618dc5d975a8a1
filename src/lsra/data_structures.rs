/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Data structures shared by the allocator passes.

use crate::bitvec::BitVec;
use crate::Inst;
use alloc::vec;
use alloc::vec::Vec;

/// A dense numbering of the instructions reachable in the block
/// order. Positions in [`crate::Interval`]s are expressed in these
/// numbers.
#[derive(Clone, Debug, Default)]
pub struct Numbering {
    /// Indexed by `Inst::index()`; `u32::MAX` if unnumbered.
    numbers: Vec<u32>,
    by_number: Vec<Inst>,
}

impl Numbering {
    pub fn new(num_insts: usize) -> Self {
        Numbering {
            numbers: vec![u32::MAX; num_insts],
            by_number: vec![],
        }
    }

    /// Number `inst` if it has no number yet, and return its number.
    pub fn number(&mut self, inst: Inst) -> usize {
        if inst.index() >= self.numbers.len() {
            self.numbers.resize(inst.index() + 1, u32::MAX);
        }
        let slot = &mut self.numbers[inst.index()];
        if *slot == u32::MAX {
            *slot = self.by_number.len() as u32;
            self.by_number.push(inst);
        }
        *slot as usize
    }

    #[inline(always)]
    pub fn get(&self, inst: Inst) -> Option<usize> {
        match self.numbers.get(inst.index()) {
            Some(&n) if n != u32::MAX => Some(n as usize),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn inst(&self, number: usize) -> Inst {
        self.by_number[number]
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }
}

/// Liveness facts for one block, as bit vectors over instruction
/// numbers.
#[derive(Clone, Debug, Default)]
pub struct BlockLifetimeInfo {
    /// Values used in this block.
    pub gen: BitVec,
    /// Values defined in this block.
    pub kill: BitVec,
    /// Values live on entry to this block.
    pub live_in: BitVec,
    /// Values live on exit from this block.
    pub live_out: BitVec,
    /// Values that must not become live-in to this block whatever the
    /// dataflow says. Used to make phi operands live only along their
    /// own incoming edge.
    pub mask_in: BitVec,
}

impl BlockLifetimeInfo {
    pub fn new(size: usize) -> Self {
        BlockLifetimeInfo {
            gen: BitVec::with_len(size, false),
            kill: BitVec::with_len(size, false),
            live_in: BitVec::with_len(size, false),
            live_out: BitVec::with_len(size, false),
            mask_in: BitVec::with_len(size, false),
        }
    }

    /// `(live_out | gen) - kill - mask_in`.
    pub fn transfer(&self) -> BitVec {
        let mut live_in = self.live_out.clone();
        live_in.union_with(&self.gen);
        live_in.subtract(&self.kill);
        live_in.subtract(&self.mask_in);
        live_in
    }
}

/// Counters describing what the allocator did.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stats {
    pub insts: usize,
    pub blocks: usize,
    pub fast_path: bool,
    pub liveness_iterations: usize,
    pub phis_lowered: usize,
    pub phi_copies: usize,
    pub moves_inserted: usize,
    pub copies_forwarded: usize,
    pub coalesced_phi_moves: usize,
    pub coalesced_moves: usize,
    pub coalesce_rejected: usize,
    pub registers_allocated: usize,
    pub registers_killed: usize,
}

/// How far `RegisterAllocator::allocate` has progressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AllocState {
    Uninitialized,
    Numbered,
    LivenessComputed,
    IntervalsComputed,
    Coalesced,
    Allocated,
    PhisLowered,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_numbering_is_dense_and_stable() {
        let mut n = Numbering::new(4);
        assert_eq!(n.number(Inst::new(3)), 0);
        assert_eq!(n.number(Inst::new(1)), 1);
        assert_eq!(n.number(Inst::new(3)), 0);
        // Instructions created after the numbering was sized.
        assert_eq!(n.number(Inst::new(9)), 2);
        assert_eq!(n.get(Inst::new(1)), Some(1));
        assert_eq!(n.get(Inst::new(2)), None);
        assert_eq!(n.get(Inst::new(50)), None);
        assert_eq!(n.inst(2), Inst::new(9));
        assert_eq!(n.len(), 3);
    }

    #[test]
    fn test_transfer_applies_mask() {
        let mut info = BlockLifetimeInfo::new(6);
        info.live_out.set(0);
        info.live_out.set(1);
        info.gen.set(2);
        info.gen.set(3);
        info.kill.set(1);
        info.mask_in.set(3);
        let live_in = info.transfer();
        assert_eq!(live_in.iter().collect::<Vec<_>>(), [0, 2]);
    }
}
