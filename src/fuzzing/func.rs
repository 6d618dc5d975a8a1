/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Arbitrary well-formed functions for the fuzz targets and the
//! benchmark.

pub use crate::ir::Func;

use crate::domtree::DomTree;
use crate::ir::FuncBuilder;
use crate::{postorder, Block, Function, Inst, InstKind, Type, Value};
use alloc::vec;
use alloc::vec::Vec;
use libfuzzer_sys::arbitrary::{Arbitrary, Result, Unstructured};

const TYPES: [Type; 6] = [
    Type::NUMBER,
    Type::NUMBER,
    Type::BOOLEAN.union(Type::UNDEFINED),
    Type::STRING,
    Type::OBJECT,
    Type::ANY,
];

fn arbitrary_type(u: &mut Unstructured) -> Result<Type> {
    Ok(*u.choose(&TYPES[..])?)
}

#[derive(Clone, Copy, Debug)]
pub struct Options {
    pub control_flow: bool,
    pub phis: bool,
    pub calls: bool,
    pub literals: bool,
    pub max_blocks: usize,
    pub max_insts_per_block: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            control_flow: true,
            phis: true,
            calls: false,
            literals: true,
            max_blocks: 64,
            max_insts_per_block: 12,
        }
    }
}

impl<'a> Arbitrary<'a> for Func {
    fn arbitrary(u: &mut Unstructured<'a>) -> Result<Func> {
        Func::arbitrary_with_options(u, &Options::default())
    }
}

/// Successor lists of an arbitrary CFG in which every block is
/// reachable from block 0 and nothing branches back to it.
fn arbitrary_cfg(u: &mut Unstructured, num_blocks: usize, opts: &Options) -> Result<Vec<Vec<usize>>> {
    // A spine of single blocks or forks. The left arm of a fork gets
    // a successor chosen below, which may be a back edge.
    let mut succs = vec![vec![]; num_blocks];
    let mut from = 0;
    let mut out_blocks = vec![];
    let mut in_blocks = vec![];
    while from < num_blocks {
        in_blocks.push(from);
        if opts.control_flow && num_blocks > 3 && from < num_blocks - 3 && bool::arbitrary(u)? {
            succs[from].push(from + 1);
            succs[from].push(from + 2);
            succs[from + 2].push(from + 3);
            out_blocks.push(from + 1);
            from += 2;
        } else if from < num_blocks - 1 {
            succs[from].push(from + 1);
        }
        from += 1;
    }
    for pred in out_blocks {
        let mut succ = *u.choose(&in_blocks[..])?;
        if succ == 0 {
            // Close the diamond instead.
            succ = pred + 2;
        }
        succs[pred].push(succ);
    }
    Ok(succs)
}

/// Values defined in `block` and the blocks dominating it.
fn available(domtree: &DomTree, defs: &[Vec<Value>], mut block: Block) -> Vec<Value> {
    let mut avail = vec![];
    while block.is_valid() {
        avail.extend_from_slice(&defs[block.index()]);
        block = domtree.idom(block);
    }
    avail
}

fn choose_value(
    u: &mut Unstructured,
    builder: &mut FuncBuilder,
    opts: &Options,
    avail: &[Value],
) -> Result<Value> {
    if avail.is_empty() || (opts.literals && u.int_in_range(0..=7)? == 0) {
        return Ok(builder.literal(arbitrary_type(u)?));
    }
    Ok(*u.choose(avail)?)
}

fn choose_values(
    u: &mut Unstructured,
    builder: &mut FuncBuilder,
    opts: &Options,
    avail: &[Value],
    count: usize,
) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(choose_value(u, builder, opts, avail)?);
    }
    Ok(values)
}

impl Func {
    pub fn arbitrary_with_options(u: &mut Unstructured, opts: &Options) -> Result<Func> {
        // General strategy:
        // 1. Create an arbitrary CFG.
        // 2. Compute dominators on an empty copy of it.
        // 3. Fill blocks in reverse postorder. Operands are chosen from
        //    values defined earlier in the block or in a dominating
        //    block, so every use is dominated by its definition.
        // 4. Give every phi one entry per predecessor, chosen among the
        //    values available at the end of that predecessor.
        let num_blocks = u.int_in_range(1..=opts.max_blocks.max(1))?;
        let succs = arbitrary_cfg(u, num_blocks, opts)?;

        let mut skeleton = FuncBuilder::new();
        let mut builder = FuncBuilder::new();
        for _ in 0..num_blocks {
            skeleton.add_block();
            builder.add_block();
        }
        for (from, block_succs) in succs.iter().enumerate() {
            for &to in block_succs {
                skeleton.add_edge(Block::new(from), Block::new(to));
                builder.add_edge(Block::new(from), Block::new(to));
            }
        }
        let skeleton = skeleton.finalize();
        let rpo = postorder::reverse_postorder(&skeleton);
        let domtree = DomTree::new(&skeleton, &rpo);

        let mut defs: Vec<Vec<Value>> = vec![vec![]; num_blocks];
        let mut phis: Vec<(Inst, Block)> = vec![];
        for &block in &rpo {
            let mut avail = available(&domtree, &defs, domtree.idom(block));
            let mut local = vec![];

            if opts.phis && block != skeleton.entry_block() {
                for _ in 0..u.int_in_range(0..=2)? {
                    let phi = builder.phi(block, arbitrary_type(u)?);
                    phis.push((phi, block));
                    local.push(Value::Inst(phi));
                    avail.push(Value::Inst(phi));
                }
            }

            for _ in 0..u.int_in_range(0..=opts.max_insts_per_block)? {
                let inst = match u.int_in_range(0..=9)? {
                    6 => {
                        let src = choose_value(u, &mut builder, opts, &avail)?;
                        builder.mov(block, src)
                    }
                    7 => {
                        let count = u.int_in_range(1..=2)?;
                        let operands = choose_values(u, &mut builder, opts, &avail, count)?;
                        builder.effect(block, &operands);
                        continue;
                    }
                    8 | 9 if opts.calls => {
                        let count = u.int_in_range(1..=3)?;
                        let args = choose_values(u, &mut builder, opts, &avail, count)?;
                        let ty = arbitrary_type(u)?;
                        builder.call(block, &args, ty)
                    }
                    _ => {
                        let count = u.int_in_range(0..=3)?;
                        let operands = choose_values(u, &mut builder, opts, &avail, count)?;
                        let ty = arbitrary_type(u)?;
                        builder.op(block, &operands, ty)
                    }
                };
                local.push(Value::Inst(inst));
                avail.push(Value::Inst(inst));
            }

            let count = if succs[block.index()].len() > 1 {
                1
            } else {
                u.int_in_range(0..=1)?
            };
            let operands = choose_values(u, &mut builder, opts, &avail, count)?;
            builder.terminator(block, &operands);
            defs[block.index()] = local;
        }

        // Blocks the spine cannot reach still need a terminator.
        for block in 0..num_blocks {
            if !domtree.is_reachable(Block::new(block)) {
                builder.terminator(Block::new(block), &[]);
            }
        }

        for (phi, block) in phis {
            for &pred in skeleton.block_preds(block) {
                let avail = available(&domtree, &defs, pred);
                let value = choose_value(u, &mut builder, opts, &avail)?;
                builder.add_phi_entry(phi, value, pred);
            }
        }

        let func = builder.finalize();
        if cfg!(debug_assertions) {
            check_dominance(&func, &domtree);
        }
        Ok(func)
    }
}

/// Every operand is defined in a block dominating its use; a phi
/// entry is dominated at the end of its predecessor.
fn check_dominance(func: &Func, domtree: &DomTree) {
    for block in 0..func.num_blocks() {
        let block = Block::new(block);
        if !domtree.is_reachable(block) {
            continue;
        }
        for &inst in func.block_insts(block) {
            let is_phi = func.inst_kind(inst) == InstKind::Phi;
            for (i, &value) in func.inst_operands(inst).iter().enumerate() {
                if let Value::Inst(def) = value {
                    let at = if is_phi { func.phi_blocks(inst)[i] } else { block };
                    if !domtree.is_reachable(at) {
                        continue;
                    }
                    debug_assert!(
                        domtree.dominates(func.inst_block(def), at),
                        "{} does not dominate its use in {}",
                        def,
                        inst
                    );
                }
            }
        }
    }
}
