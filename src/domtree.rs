/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

// Iterative dominator computation, after
//
//   A Simple, Fast Dominance Algorithm
//   Keith D. Cooper, Timothy J. Harvey, and Ken Kennedy
//   Department of Computer Science, Rice University, Houston, Texas, USA
//   TR-06-33870
//   https://www.cs.rice.edu/~keith/EMBED/dom.pdf

use alloc::vec;
use alloc::vec::Vec;

use crate::{Block, Function};

/// Immediate dominators of the blocks reachable in a given block
/// order.
#[derive(Clone, Debug)]
pub struct DomTree {
    idom: Vec<Block>,
    rpo_number: Vec<Option<u32>>,
}

impl DomTree {
    /// Compute the tree for `func`. `rpo` must be a reverse postorder
    /// of the reachable blocks starting at the entry.
    pub fn new<F: Function>(func: &F, rpo: &[Block]) -> DomTree {
        let num_blocks = func.num_blocks();
        let mut rpo_number = vec![None; num_blocks];
        for (i, &block) in rpo.iter().enumerate() {
            rpo_number[block.index()] = Some(i as u32);
        }

        let mut idom = vec![Block::invalid(); num_blocks];
        let Some(&start) = rpo.first() else {
            return DomTree { idom, rpo_number };
        };
        // The start node is its own parent while iterating.
        idom[start.index()] = start;

        let mut changed = true;
        while changed {
            changed = false;
            for &node in rpo.iter().skip(1) {
                let mut parent = Block::invalid();
                for &pred in func.block_preds(node) {
                    // Unreachable, or not processed yet.
                    if rpo_number[pred.index()].is_none() || idom[pred.index()].is_invalid() {
                        continue;
                    }
                    parent = if parent.is_invalid() {
                        pred
                    } else {
                        intersect(&idom, &rpo_number, parent, pred)
                    };
                }
                if parent.is_valid() && parent != idom[node.index()] {
                    idom[node.index()] = parent;
                    changed = true;
                }
            }
        }

        // Give the start node an invalid parent so that walks up the
        // tree terminate.
        idom[start.index()] = Block::invalid();
        DomTree { idom, rpo_number }
    }

    pub fn idom(&self, block: Block) -> Block {
        self.idom[block.index()]
    }

    pub fn is_reachable(&self, block: Block) -> bool {
        self.rpo_number[block.index()].is_some()
    }

    /// Returns `true` if `a` dominates `b`. Every block dominates
    /// itself.
    pub fn dominates(&self, a: Block, mut b: Block) -> bool {
        loop {
            if a == b {
                return true;
            }
            if b.is_invalid() {
                return false;
            }
            b = self.idom[b.index()];
        }
    }
}

fn intersect(
    idom: &[Block],
    rpo_number: &[Option<u32>],
    mut node1: Block,
    mut node2: Block,
) -> Block {
    let rpo = |b: Block| rpo_number[b.index()].unwrap_or(u32::MAX);
    while node1 != node2 {
        if node1.is_invalid() || node2.is_invalid() {
            return Block::invalid();
        }
        if rpo(node1) > rpo(node2) {
            node1 = idom[node1.index()];
        } else {
            node2 = idom[node2.index()];
        }
    }
    node1
}
