/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Fast postorder computation.

use crate::{Block, Function};
use alloc::vec;
use alloc::vec::Vec;
use smallvec::{smallvec, SmallVec};

/// Blocks reachable from `entry`, in postorder.
pub fn calculate<'a, SuccFn: Fn(Block) -> &'a [Block]>(
    num_blocks: usize,
    entry: Block,
    succ_blocks: SuccFn,
) -> Vec<Block> {
    let mut ret = vec![];

    // State: visited-block map, and explicit DFS stack.
    let mut visited = vec![false; num_blocks];

    struct State<'a> {
        block: Block,
        succs: core::slice::Iter<'a, Block>,
    }
    let mut stack: SmallVec<[State; 64]> = smallvec![];

    visited[entry.index()] = true;
    stack.push(State {
        block: entry,
        succs: succ_blocks(entry).iter(),
    });

    while let Some(ref mut state) = stack.last_mut() {
        // Perform one action: push to new succ, skip an already-visited succ, or pop.
        if let Some(&succ) = state.succs.next() {
            if !visited[succ.index()] {
                visited[succ.index()] = true;
                stack.push(State {
                    block: succ,
                    succs: succ_blocks(succ).iter(),
                });
            }
        } else {
            ret.push(state.block);
            stack.pop();
        }
    }

    ret
}

/// The reachable blocks of `func` in reverse postorder, which is the
/// block order the allocator and code generation expect.
pub fn reverse_postorder<F: Function>(func: &F) -> Vec<Block> {
    let mut order = calculate(func.num_blocks(), func.entry_block(), |b| {
        func.block_succs(b)
    });
    order.reverse();
    order
}
