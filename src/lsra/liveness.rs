/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Block liveness and per-instruction live intervals.
//!
//! Positions: the value defined by instruction number `i` becomes live
//! at `i + 1`, and a use by instruction number `u` keeps its operand
//! live up to `u + 1` (exclusive). An instruction may therefore take
//! the register of an operand whose last use it is.

use super::data_structures::{BlockLifetimeInfo, Numbering, Stats};
use crate::bitvec::BitVec;
use crate::{Block, Function, InstKind, Interval, Segment, Value};
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use smallvec::SmallVec;

/// Compute `gen`, `kill` and the phi masks contributed by `block`.
fn calculate_local_liveness<F: Function>(
    func: &F,
    block: Block,
    numbering: &Numbering,
    in_order: &BitVec,
    infos: &mut [BlockLifetimeInfo],
) {
    for &inst in func.block_insts(block) {
        let Some(idx) = numbering.get(inst) else {
            continue;
        };
        infos[block.index()].kill.set(idx);

        // A phi operand is only live along the edge it arrives on:
        // mask every incoming value out of every incoming block, then
        // unmask each value in its own block.
        if func.inst_kind(inst) == InstKind::Phi {
            let entries = func
                .inst_operands(inst)
                .iter()
                .zip(func.phi_blocks(inst).iter())
                .filter(|(_, pred)| in_order.test(pred.index()));
            let incoming: SmallVec<[(usize, Block); 4]> = entries
                .clone()
                .filter_map(|(value, &pred)| {
                    value.as_inst().and_then(|i| numbering.get(i)).map(|n| (n, pred))
                })
                .collect();
            for (_, &pred) in entries.clone() {
                for &(n, _) in &incoming {
                    infos[pred.index()].mask_in.set(n);
                }
            }
            for &(n, pred) in &incoming {
                infos[pred.index()].mask_in.reset(n);
            }
        }

        for &op in func.inst_operands(inst) {
            let Value::Inst(op) = op else {
                continue;
            };
            if !in_order.test(func.inst_block(op).index()) {
                continue;
            }
            if let Some(n) = numbering.get(op) {
                infos[block.index()].gen.set(n);
            }
        }
    }
}

/// Compute block liveness for every block in `order`. The result is
/// indexed by block; blocks outside the order get empty vectors.
pub(crate) fn compute_liveness<F: Function>(
    func: &F,
    order: &[Block],
    numbering: &Numbering,
    in_order: &BitVec,
    stats: &mut Stats,
) -> Vec<BlockLifetimeInfo> {
    let num_values = numbering.len();
    let mut infos: Vec<BlockLifetimeInfo> = (0..func.num_blocks())
        .map(|b| {
            if in_order.test(b) {
                BlockLifetimeInfo::new(num_values)
            } else {
                BlockLifetimeInfo::default()
            }
        })
        .collect();

    for &block in order {
        calculate_local_liveness(func, block, numbering, in_order, &mut infos);
    }

    for &block in order {
        let info = &mut infos[block.index()];
        info.live_in = info.transfer();
    }

    // Backward dataflow to a fixed point. Every block is visited at
    // least once; a block whose live-in set grows requeues its
    // predecessors.
    let mut workqueue: VecDeque<Block> = order.iter().rev().cloned().collect();
    let mut queued = BitVec::with_len(func.num_blocks(), false);
    for &block in order {
        queued.set(block.index());
    }
    let mut iterations = 0;
    while let Some(block) = workqueue.pop_front() {
        queued.reset(block.index());
        iterations += 1;

        let mut live_out = core::mem::take(&mut infos[block.index()].live_out);
        for &succ in func.block_succs(block) {
            if in_order.test(succ.index()) {
                live_out.union_with(&infos[succ.index()].live_in);
            }
        }
        let info = &mut infos[block.index()];
        info.live_out = live_out;
        let live_in = info.transfer();
        if !live_in.has_bits_not_in(&info.live_in) {
            continue;
        }
        info.live_in = live_in;

        for &pred in func.block_preds(block) {
            if in_order.test(pred.index()) && !queued.test(pred.index()) {
                queued.set(pred.index());
                workqueue.push_back(pred);
            }
        }
    }
    stats.liveness_iterations = iterations;
    trace!("Completed liveness in {} iterations", iterations);

    if trace_enabled!() {
        for &block in order {
            let info = &infos[block.index()];
            trace!("Block {}", block);
            trace!("gen     {:?}", info.gen);
            trace!("kill    {:?}", info.kill);
            trace!("liveIn  {:?}", info.live_in);
            trace!("liveOut {:?}", info.live_out);
            trace!("maskIn  {:?}", info.mask_in);
        }
    }

    infos
}

/// Build the live interval of every numbered instruction from block
/// liveness. The result is indexed by instruction number.
pub(crate) fn calculate_live_intervals<F: Function>(
    func: &F,
    order: &[Block],
    numbering: &Numbering,
    infos: &[BlockLifetimeInfo],
) -> Vec<Interval> {
    // Every value gets an empty interval at its definition point so
    // that dead values still have a position.
    let mut intervals: Vec<Interval> = (0..numbering.len())
        .map(|i| Interval::from_range(i + 1, i + 1))
        .collect();

    for &block in order {
        let info = &infos[block.index()];
        let insts = func.block_insts(block);
        let (Some(&first), Some(&last)) = (insts.first(), insts.last()) else {
            continue;
        };
        let (Some(start_offset), Some(end_offset)) = (numbering.get(first), numbering.get(last))
        else {
            continue;
        };

        // Values that flow through the block without being defined or
        // last used here.
        for i in info.live_out.iter() {
            if info.live_in.test(i) {
                intervals[i].add(Segment::new(start_offset, end_offset + 1));
            }
        }

        for &inst in insts {
            let Some(inst_offset) = numbering.get(inst) else {
                continue;
            };

            // Defined here and live out: live to the end of the block.
            if info.live_out.test(inst_offset) {
                debug_assert!(
                    !info.live_in.test(inst_offset),
                    "Livein but also killed in this block?"
                );
                intervals[inst_offset].add(Segment::new(inst_offset + 1, end_offset + 1));
            }

            for &op in func.inst_operands(inst) {
                let Some(op_offset) = op.as_inst().and_then(|i| numbering.get(i)) else {
                    continue;
                };
                if op_offset + 1 < inst_offset + 1 {
                    intervals[op_offset].add(Segment::new(op_offset + 1, inst_offset + 1));
                }
            }

            // A phi occupies its register at the end of each incoming
            // block, where the incoming value is written into it.
            if func.inst_kind(inst) == InstKind::Phi {
                for (&value, &pred) in func
                    .inst_operands(inst)
                    .iter()
                    .zip(func.phi_blocks(inst).iter())
                {
                    let Some(term_offset) = func
                        .block_terminator(pred)
                        .and_then(|t| numbering.get(t))
                    else {
                        continue;
                    };
                    intervals[inst_offset].add(Segment::new(term_offset, term_offset + 1));

                    if let Some(value_offset) = value.as_inst().and_then(|i| numbering.get(i)) {
                        if value_offset + 1 < term_offset {
                            intervals[value_offset]
                                .add(Segment::new(value_offset + 1, term_offset));
                        }
                    }
                }
            }
        }
    }

    intervals
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::FuncBuilder;
    use crate::Type;

    fn number<F: Function>(func: &F, order: &[Block]) -> (Numbering, BitVec) {
        let mut numbering = Numbering::new(func.num_insts());
        let mut in_order = BitVec::with_len(func.num_blocks(), false);
        for &block in order {
            in_order.set(block.index());
            for &inst in func.block_insts(block) {
                numbering.number(inst);
            }
        }
        (numbering, in_order)
    }

    #[test]
    fn test_straight_line_intervals() {
        let mut b = FuncBuilder::new();
        let entry = b.add_block();
        let v0 = b.op(entry, &[], Type::NUMBER);
        let v1 = b.op(entry, &[], Type::NUMBER);
        let v2 = b.op(entry, &[v0.into(), v1.into()], Type::NUMBER);
        b.terminator(entry, &[v2.into()]);
        let f = b.finalize();
        let order = [entry];
        let (numbering, in_order) = number(&f, &order);
        let infos = compute_liveness(&f, &order, &numbering, &in_order, &mut Stats::default());
        assert!(infos[0].live_in.none());
        assert!(infos[0].live_out.none());
        let ivls = calculate_live_intervals(&f, &order, &numbering, &infos);
        assert_eq!(ivls[0], Interval::from_range(1, 3));
        assert_eq!(ivls[1], Interval::from_range(2, 3));
        assert_eq!(ivls[2], Interval::from_range(3, 4));
        assert_eq!(ivls[3], Interval::from_range(4, 4));
        assert!(ivls[0].intersects(&ivls[1]));
        assert!(!ivls[0].intersects(&ivls[2]));
    }

    #[test]
    fn test_loop_liveness_reaches_fixed_point() {
        // entry -> header -> body -> header; header -> exit.
        // `x` is defined in entry and used in exit, so it must stay
        // live around the whole loop.
        let mut b = FuncBuilder::new();
        let entry = b.add_block();
        let header = b.add_block();
        let body = b.add_block();
        let exit = b.add_block();
        b.add_edge(entry, header);
        b.add_edge(header, body);
        b.add_edge(header, exit);
        b.add_edge(body, header);
        let x = b.op(entry, &[], Type::ANY);
        b.terminator(entry, &[]);
        let cond = b.op(header, &[], Type::BOOLEAN);
        b.terminator(header, &[cond.into()]);
        let t = b.op(body, &[], Type::ANY);
        b.terminator(body, &[]);
        b.terminator(exit, &[x.into()]);
        let f = b.finalize();
        let order = [entry, header, body, exit];
        let (numbering, in_order) = number(&f, &order);
        let mut stats = Stats::default();
        let infos = compute_liveness(&f, &order, &numbering, &in_order, &mut stats);
        let xn = numbering.get(x).unwrap();
        for block in [header, body] {
            assert!(infos[block.index()].live_in.test(xn));
            assert!(infos[block.index()].live_out.test(xn));
        }
        assert!(infos[exit.index()].live_in.test(xn));
        assert!(!infos[exit.index()].live_out.test(xn));
        assert!(stats.liveness_iterations >= order.len());

        let ivls = calculate_live_intervals(&f, &order, &numbering, &infos);
        let body_t = numbering.get(t).unwrap();
        let last = numbering.get(*f.block_insts(exit).last().unwrap()).unwrap();
        assert!(ivls[xn].contains(body_t));
        assert_eq!(ivls[xn].end(), last + 1);
    }

    #[test]
    fn test_phi_operands_are_edge_local() {
        // entry -> left, right -> join(phi(a <- left, c <- right)).
        let mut b = FuncBuilder::new();
        let entry = b.add_block();
        let left = b.add_block();
        let right = b.add_block();
        let join = b.add_block();
        b.add_edge(entry, left);
        b.add_edge(entry, right);
        b.add_edge(left, join);
        b.add_edge(right, join);
        b.terminator(entry, &[]);
        let a = b.op(left, &[], Type::NUMBER);
        b.terminator(left, &[]);
        let c = b.op(right, &[], Type::NUMBER);
        b.terminator(right, &[]);
        let phi = b.phi(join, Type::NUMBER);
        b.add_phi_entry(phi, a.into(), left);
        b.add_phi_entry(phi, c.into(), right);
        b.terminator(join, &[phi.into()]);
        let f = b.finalize();
        let order = [entry, left, right, join];
        let (numbering, in_order) = number(&f, &order);
        let infos = compute_liveness(&f, &order, &numbering, &in_order, &mut Stats::default());
        let an = numbering.get(a).unwrap();
        let cn = numbering.get(c).unwrap();
        assert!(infos[left.index()].mask_in.test(cn));
        assert!(!infos[left.index()].mask_in.test(an));
        assert!(!infos[right.index()].live_in.test(an));
        assert!(!infos[entry.index()].live_out.test(an));
        assert!(!infos[entry.index()].live_out.test(cn));

        let ivls = calculate_live_intervals(&f, &order, &numbering, &infos);
        let phin = numbering.get(phi).unwrap();
        let left_term = numbering.get(f.block_terminator(left).unwrap()).unwrap();
        let right_term = numbering.get(f.block_terminator(right).unwrap()).unwrap();
        assert!(ivls[phin].contains(left_term));
        assert!(ivls[phin].contains(right_term));
    }
}
