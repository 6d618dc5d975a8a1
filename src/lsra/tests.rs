/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

use super::*;
use crate::checker::Checker;
use crate::ir::{Func, FuncBuilder};
use crate::{InstKind, Type};
use alloc::vec;

fn check<T: Target>(f: &Func, ra: &RegisterAllocator<T>, order: &[Block]) {
    if let Err(e) = Checker::new(f, ra, order).run() {
        panic!("checker failed: {:?}\n{:?}", e.errors, f);
    }
}

fn all_insts(f: &Func, order: &[Block]) -> Vec<Inst> {
    order
        .iter()
        .flat_map(|&b| f.block_insts(b).iter().copied())
        .collect()
}

fn representative<T: Target>(ra: &RegisterAllocator<T>, inst: Inst) -> Inst {
    ra.coalesced_with(inst).unwrap_or(inst)
}

/// `v0 = op; v1 = op v0; v2 = op v0, v1; ret v2`
fn straight_line() -> (Func, Vec<Block>, [Inst; 4]) {
    let mut b = FuncBuilder::new();
    let entry = b.add_block();
    let v0 = b.op(entry, &[], Type::NUMBER);
    let v1 = b.op(entry, &[v0.into()], Type::NUMBER);
    let v2 = b.op(entry, &[v0.into(), v1.into()], Type::NUMBER);
    let ret = b.terminator(entry, &[v2.into()]);
    (b.finalize(), vec![entry], [v0, v1, v2, ret])
}

/// A counting loop: `i = phi(init, next)` in the header, `next = op i`
/// in the body.
fn counting_loop() -> (Func, Vec<Block>, Inst) {
    let mut b = FuncBuilder::new();
    let entry = b.add_block();
    let header = b.add_block();
    let body = b.add_block();
    let exit = b.add_block();
    b.add_edge(entry, header);
    b.add_edge(header, body);
    b.add_edge(header, exit);
    b.add_edge(body, header);
    let init = b.op(entry, &[], Type::NUMBER);
    b.terminator(entry, &[]);
    let i = b.phi(header, Type::NUMBER);
    b.terminator(header, &[i.into()]);
    let next = b.op(body, &[i.into()], Type::NUMBER);
    b.terminator(body, &[]);
    b.add_phi_entry(i, init.into(), entry);
    b.add_phi_entry(i, next.into(), body);
    b.terminator(exit, &[]);
    (b.finalize(), vec![entry, header, body, exit], i)
}

/// `entry -> left | right -> join`, with `p = phi(a, b)` in the join.
fn diamond() -> (Func, Vec<Block>, [Inst; 4]) {
    let mut b = FuncBuilder::new();
    let entry = b.add_block();
    let left = b.add_block();
    let right = b.add_block();
    let join = b.add_block();
    b.add_edge(entry, left);
    b.add_edge(entry, right);
    b.add_edge(left, join);
    b.add_edge(right, join);
    let a0 = b.op(entry, &[], Type::NUMBER);
    b.terminator(entry, &[]);
    let a = b.op(left, &[a0.into()], Type::NUMBER);
    b.terminator(left, &[]);
    let bv = b.op(right, &[], Type::NUMBER);
    b.terminator(right, &[]);
    let p = b.phi(join, Type::NUMBER);
    b.add_phi_entry(p, a.into(), left);
    b.add_phi_entry(p, bv.into(), right);
    b.terminator(join, &[p.into()]);
    (b.finalize(), vec![entry, left, right, join], [a0, a, bv, p])
}

#[derive(Default)]
struct RecordingTarget {
    seen: Vec<Inst>,
}

impl Target for RecordingTarget {
    fn handle_instruction<F: Function>(&mut self, _func: &F, inst: Inst) {
        self.seen.push(inst);
    }
}

#[test]
fn test_straight_line() {
    let (mut f, order, [v0, v1, v2, ret]) = straight_line();
    let mut ra = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
    ra.allocate(&mut f, &order).unwrap();
    check(&f, &ra, &order);

    assert!(!ra.used_fast_path());
    assert_eq!(ra.state(), AllocState::Allocated);
    assert_eq!(ra.num_instructions(), 4);
    assert_eq!(ra.register(v0.into()), Register::new(RegClass::Number, 0));
    assert_eq!(ra.register(v1.into()), Register::new(RegClass::Number, 1));
    // v0 and v1 die at v2, which takes the lowest free register.
    assert_eq!(ra.register(v2.into()), Register::new(RegClass::Number, 0));
    assert_eq!(ra.register(ret.into()).class(), RegClass::NoOutput);
    assert_eq!(ra.max_register_usage(RegClass::Number), 2);
    assert_eq!(ra.instruction_interval(v0), &Interval::from_range(1, 3));
    assert_eq!(ra.file().num_live_registers(RegClass::Number), 0);
}

#[test]
fn test_constants_feeding_an_add() {
    // v0 = const 1; v1 = const 2; v2 = v0 + v1; ret v2
    let mut b = FuncBuilder::new();
    let entry = b.add_block();
    let one = b.literal(Type::NUMBER);
    let two = b.literal(Type::NUMBER);
    let v0 = b.op(entry, &[one], Type::NUMBER);
    let v1 = b.op(entry, &[two], Type::NUMBER);
    let v2 = b.op(entry, &[v0.into(), v1.into()], Type::NUMBER);
    b.terminator(entry, &[v2.into()]);
    let mut f = b.finalize();
    let order = [entry];

    let mut ra = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
    ra.allocate(&mut f, &order).unwrap();
    check(&f, &ra, &order);
    assert_ne!(ra.register(v0.into()), ra.register(v1.into()));
    assert_eq!(ra.register(v2.into()), ra.register(v0.into()));
    assert!(!ra.is_allocated(one));
}

#[test]
fn test_intersecting_intervals_get_distinct_registers() {
    for (mut f, order) in [
        {
            let (f, order, _) = straight_line();
            (f, order)
        },
        {
            let (f, order, _) = counting_loop();
            (f, order)
        },
        {
            let (f, order, _) = diamond();
            (f, order)
        },
    ] {
        let mut ra = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
        ra.allocate(&mut f, &order).unwrap();
        check(&f, &ra, &order);

        let insts = all_insts(&f, &order);
        for &a in &insts {
            for &b in &insts {
                if a == b || representative(&ra, a) == representative(&ra, b) {
                    continue;
                }
                if ra.register(a.into()).class() == RegClass::NoOutput {
                    continue;
                }
                if ra
                    .instruction_interval(a)
                    .intersects(ra.instruction_interval(b))
                {
                    assert_ne!(
                        ra.register(a.into()),
                        ra.register(b.into()),
                        "{} and {} are live together",
                        a,
                        b
                    );
                }
            }
        }
    }
}

#[test]
fn test_loop_phi_shares_register_with_entries() {
    let (mut f, order, i) = counting_loop();
    let mut ra = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
    ra.allocate(&mut f, &order).unwrap();
    check(&f, &ra, &order);

    let phi_reg = ra.register(i.into());
    for &entry in f.inst_operands(i) {
        let Value::Inst(mov) = entry else {
            panic!("phi entry is not a move");
        };
        assert_eq!(f.inst_kind(mov), InstKind::Mov);
        assert_eq!(ra.register(entry), phi_reg);
    }
    assert_eq!(ra.stats().phis_lowered, 0);
    assert_eq!(ra.stats().coalesced_phi_moves, 2);
    assert!(ra.stats().liveness_iterations > 0);
}

#[test]
fn test_diamond() {
    let (mut f, order, [a0, a, bv, p]) = diamond();
    let mut ra = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
    ra.allocate(&mut f, &order).unwrap();
    check(&f, &ra, &order);

    // The right entry is still live where the left one is written.
    assert_eq!(ra.register(a.into()), ra.register(p.into()));
    assert_ne!(ra.register(bv.into()), ra.register(p.into()));
    assert_eq!(ra.register(a0.into()), ra.register(p.into()));
    assert!(ra.stats().coalesce_rejected >= 1);
}

#[test]
fn test_fast_path_passes_checker() {
    for (mut f, order) in [
        {
            let (f, order, _) = straight_line();
            (f, order)
        },
        {
            let (f, order, _) = counting_loop();
            (f, order)
        },
        {
            let (f, order, _) = diamond();
            (f, order)
        },
    ] {
        let mut ra = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
        ra.allocate_fast_pass(&mut f, &order).unwrap();
        assert!(ra.used_fast_path());
        assert_eq!(ra.state(), AllocState::Allocated);
        assert_eq!(ra.num_instructions(), 0);
        check(&f, &ra, &order);
    }
}

#[test]
fn test_fast_path_phi_class_is_joined() {
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
    let n = b.op(left, &[], Type::NUMBER);
    b.terminator(left, &[]);
    let o = b.op(right, &[], Type::OBJECT);
    b.terminator(right, &[]);
    let p = b.phi(join, Type::NUMBER);
    b.add_phi_entry(p, n.into(), left);
    b.add_phi_entry(p, o.into(), right);
    b.terminator(join, &[p.into()]);
    let mut f = b.finalize();
    let order = [entry, left, right, join];

    let mut ra = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
    ra.allocate_fast_pass(&mut f, &order).unwrap();
    check(&f, &ra, &order);
    assert_eq!(ra.register(p.into()).class(), RegClass::Other);
}

#[test]
fn test_allocation_is_deterministic() {
    let (f, order, _) = counting_loop();
    let mut f1 = f.clone();
    let mut f2 = f.clone();
    let mut ra1 = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
    let mut ra2 = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
    ra1.allocate(&mut f1, &order).unwrap();
    ra2.allocate(&mut f2, &order).unwrap();

    let insts = all_insts(&f1, &order);
    assert_eq!(insts, all_insts(&f2, &order));
    for inst in insts {
        assert_eq!(ra1.register(inst.into()), ra2.register(inst.into()));
    }
    assert_eq!(ra1.dump(&f1, &order), ra2.dump(&f2, &order));
}

#[test]
fn test_lower_phis() {
    for fast in [false, true] {
        let (mut f, order, i) = counting_loop();
        let mut ra = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
        if fast {
            ra.allocate_fast_pass(&mut f, &order).unwrap();
        } else {
            ra.allocate(&mut f, &order).unwrap();
        }
        ra.lower_phis(&mut f, &order);

        assert!(f.is_removed(i));
        for inst in all_insts(&f, &order) {
            assert_ne!(f.inst_kind(inst), InstKind::Phi);
        }
        assert_eq!(ra.stats().phis_lowered, 1);
        assert_eq!(ra.state(), AllocState::PhisLowered);
    }
}

/// Allocate on either path, check the result, then lower `phis`.
/// Before lowering, each phi entry must be a move at the end of its
/// predecessor sharing the phi register.
fn allocate_and_lower_phis(f: &mut Func, order: &[Block], phis: &[Inst], fast: bool) {
    let mut ra = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
    if fast {
        ra.allocate_fast_pass(f, order).unwrap();
    } else {
        ra.allocate(f, order).unwrap();
    }
    check(f, &ra, order);

    for &phi in phis {
        let phi_reg = ra.register(phi.into());
        for (&value, &pred) in f.inst_operands(phi).iter().zip(f.phi_blocks(phi)) {
            let mov = value.as_inst().unwrap();
            assert_eq!(f.inst_kind(mov), InstKind::Mov);
            assert_eq!(f.inst_block(mov), pred);
            assert_eq!(ra.register(value), phi_reg);
        }
    }

    ra.lower_phis(f, order);
    for &phi in phis {
        assert!(f.is_removed(phi));
    }
    for inst in all_insts(f, order) {
        assert_ne!(f.inst_kind(inst), InstKind::Phi);
    }
    assert_eq!(ra.stats().phis_lowered, phis.len());
}

#[test]
fn test_swapping_loop_phis() {
    // header: a = phi(a0, b); b = phi(b0, a). Every iteration exchanges
    // the two values, so the back edge needs a parallel copy.
    for fast in [false, true] {
        let mut b = FuncBuilder::new();
        let entry = b.add_block();
        let header = b.add_block();
        let body = b.add_block();
        let exit = b.add_block();
        b.add_edge(entry, header);
        b.add_edge(header, body);
        b.add_edge(header, exit);
        b.add_edge(body, header);
        let a0 = b.op(entry, &[], Type::NUMBER);
        let b0 = b.op(entry, &[], Type::NUMBER);
        b.terminator(entry, &[]);
        let pa = b.phi(header, Type::NUMBER);
        let pb = b.phi(header, Type::NUMBER);
        let cond = b.op(header, &[pa.into(), pb.into()], Type::BOOLEAN);
        b.terminator(header, &[cond.into()]);
        b.terminator(body, &[]);
        b.add_phi_entry(pa, a0.into(), entry);
        b.add_phi_entry(pa, pb.into(), body);
        b.add_phi_entry(pb, b0.into(), entry);
        b.add_phi_entry(pb, pa.into(), body);
        b.terminator(exit, &[pa.into()]);
        let mut f = b.finalize();
        let order = [entry, header, body, exit];

        allocate_and_lower_phis(&mut f, &order, &[pa, pb], fast);
    }
}

#[test]
fn test_phi_read_in_exit_block() {
    // The loop variable stays live out of the header into the exit.
    for fast in [false, true] {
        let mut b = FuncBuilder::new();
        let entry = b.add_block();
        let header = b.add_block();
        let body = b.add_block();
        let exit = b.add_block();
        b.add_edge(entry, header);
        b.add_edge(header, body);
        b.add_edge(header, exit);
        b.add_edge(body, header);
        let init = b.op(entry, &[], Type::NUMBER);
        b.terminator(entry, &[]);
        let i = b.phi(header, Type::NUMBER);
        let cond = b.op(header, &[i.into()], Type::BOOLEAN);
        b.terminator(header, &[cond.into()]);
        let next = b.op(body, &[i.into()], Type::NUMBER);
        b.terminator(body, &[]);
        b.add_phi_entry(i, init.into(), entry);
        b.add_phi_entry(i, next.into(), body);
        let result = b.op(exit, &[i.into(), init.into()], Type::NUMBER);
        b.terminator(exit, &[result.into()]);
        let mut f = b.finalize();
        let order = [entry, header, body, exit];

        allocate_and_lower_phis(&mut f, &order, &[i], fast);
    }
}

#[test]
fn test_branch_feeding_two_phi_successors() {
    // left and right each branch to both `a` and `b`, and both of those
    // start with a phi. None of the four edges is split.
    for fast in [false, true] {
        let mut b = FuncBuilder::new();
        let entry = b.add_block();
        let left = b.add_block();
        let right = b.add_block();
        let ba = b.add_block();
        let bb = b.add_block();
        let exit = b.add_block();
        b.add_edge(entry, left);
        b.add_edge(entry, right);
        b.add_edge(left, ba);
        b.add_edge(left, bb);
        b.add_edge(right, ba);
        b.add_edge(right, bb);
        b.add_edge(ba, exit);
        b.add_edge(bb, exit);
        let c = b.op(entry, &[], Type::NUMBER);
        b.terminator(entry, &[c.into()]);
        let xl = b.op(left, &[c.into()], Type::NUMBER);
        b.terminator(left, &[xl.into()]);
        let xr = b.op(right, &[c.into()], Type::NUMBER);
        b.terminator(right, &[xr.into()]);
        let pa = b.phi(ba, Type::NUMBER);
        b.terminator(ba, &[]);
        let pb = b.phi(bb, Type::NUMBER);
        b.terminator(bb, &[]);
        let q = b.phi(exit, Type::NUMBER);
        b.terminator(exit, &[q.into()]);
        b.add_phi_entry(pa, xl.into(), left);
        b.add_phi_entry(pa, c.into(), right);
        b.add_phi_entry(pb, c.into(), left);
        b.add_phi_entry(pb, xr.into(), right);
        b.add_phi_entry(q, pa.into(), ba);
        b.add_phi_entry(q, pb.into(), bb);
        let mut f = b.finalize();
        let order = [entry, left, right, ba, bb, exit];

        allocate_and_lower_phis(&mut f, &order, &[pa, pb, q], fast);
    }
}

#[test]
fn test_reserved_registers() {
    let mut ra = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
    let r0 = ra.reserve(RegClass::Number, 1);
    let r1 = ra.reserve(RegClass::Number, 3);
    assert_eq!(r0, Register::new(RegClass::Number, 0));
    assert!(r0.is_consecutive(r1));
    assert_eq!(ra.max_register_usage(RegClass::Number), 4);
    ra.free(r1);
    // Only the tail counts; the hole at 1 is skipped.
    assert_eq!(
        ra.reserve(RegClass::Number, 2),
        Register::new(RegClass::Number, 4)
    );
    assert_eq!(ra.max_register_usage(RegClass::Number), 6);
}

#[test]
fn test_pre_allocated_values_keep_their_register() {
    let (mut f, order, [v0, v1, v2, _]) = straight_line();
    let mut ra = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
    let first = ra.reserve_values(RegClass::Number, &[Some(v0.into()), None]);
    assert_eq!(first, Register::new(RegClass::Number, 0));
    ra.allocate(&mut f, &order).unwrap();
    check(&f, &ra, &order);

    assert_eq!(ra.register(v0.into()), first);
    assert_eq!(ra.register(v1.into()), Register::new(RegClass::Number, 2));
    assert_eq!(ra.register(v2.into()), Register::new(RegClass::Number, 2));
    // The reserved pair is never released by the scan.
    assert_eq!(ra.file().num_live_registers(RegClass::Number), 2);
}

#[test]
fn test_convert_type_specific_regs_to_other() {
    let mut b = FuncBuilder::new();
    let entry = b.add_block();
    let n = b.op(entry, &[], Type::NUMBER);
    let p = b.op(entry, &[], Type::BOOLEAN);
    let o = b.op(entry, &[], Type::OBJECT);
    let ret = b.terminator(entry, &[n.into(), p.into(), o.into()]);
    let mut f = b.finalize();
    let order = [entry];

    let mut ra = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
    ra.allocate(&mut f, &order).unwrap();
    assert_eq!(ra.register(n.into()), Register::new(RegClass::Number, 0));
    assert_eq!(ra.register(p.into()), Register::new(RegClass::NonPtr, 0));
    assert_eq!(ra.register(o.into()), Register::new(RegClass::Other, 0));

    ra.convert_type_specific_regs_to_other();
    assert_eq!(ra.register(n.into()), Register::new(RegClass::Other, 0));
    assert_eq!(ra.register(p.into()), Register::new(RegClass::Other, 1));
    assert_eq!(ra.register(o.into()), Register::new(RegClass::Other, 2));
    assert_eq!(ra.register(ret.into()).class(), RegClass::NoOutput);
    assert_eq!(ra.max_register_usage(RegClass::Other), 3);
    assert_eq!(ra.max_register_usage(RegClass::Number), 0);
    assert_eq!(ra.max_register_usage(RegClass::NonPtr), 0);
    check(&f, &ra, &order);
}

#[test]
fn test_invalid_input_is_reported() {
    let (mut f, _, _) = straight_line();
    let options = RegallocOptions {
        validate_input: true,
        ..RegallocOptions::default()
    };
    let mut ra = RegisterAllocator::new(GenericTarget, options);
    assert_eq!(ra.allocate(&mut f, &[]), Err(RegAllocError::EmptyOrder));
    assert_eq!(ra.state(), AllocState::Uninitialized);
}

#[test]
fn test_fast_path_triggers() {
    // Four instructions in one block: an estimate of 4 * 5 / 8 = 2
    // bytes of liveness.
    let cases = [
        (Some(3), u64::MAX, true),
        (Some(4), u64::MAX, false),
        (None, 1, true),
        (None, 2, false),
        (None, u64::MAX, false),
    ];
    for (threshold, limit, fast) in cases {
        let (mut f, order, _) = straight_line();
        let mut ra = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
        ra.set_fast_pass_threshold(threshold);
        ra.set_memory_limit(limit);
        ra.allocate(&mut f, &order).unwrap();
        assert_eq!(ra.used_fast_path(), fast, "{:?} {}", threshold, limit);
        check(&f, &ra, &order);
    }
}

#[test]
fn test_every_instruction_is_handled_once() {
    for fast in [false, true] {
        let (mut f, order, _) = counting_loop();
        let mut ra = RegisterAllocator::new(RecordingTarget::default(), RegallocOptions::default());
        if fast {
            ra.allocate_fast_pass(&mut f, &order).unwrap();
        } else {
            ra.allocate(&mut f, &order).unwrap();
        }
        let mut seen = ra.target().seen.clone();
        seen.sort();
        let mut expected = all_insts(&f, &order);
        expected.sort();
        assert_eq!(seen, expected);
    }
}
