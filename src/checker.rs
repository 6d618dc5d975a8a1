/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Checker: verifies that an allocation preserves the dataflow of the
//! function it was computed for.
//!
//! The checker runs after [`RegisterAllocator::allocate`] and before
//! [`RegisterAllocator::lower_phis`], while the phis still describe
//! what the entry moves are meant to do.
//!
//! Each register is mapped to the set of instructions whose value it
//! currently holds. The lattice is the powerset of instructions with
//! the universe as top; the meet at CFG joins is intersection. The
//! transfer functions are:
//!
//!   - `d := mov s`:         R' = R[reg(d) -> R[reg(s)] + {d}]
//!   - `d := op ...`:        R' = { r -> R[r] - {d} } [reg(d) -> {d}]
//!   - phis on edge `B->S`:  for every phi `p` of `S` with entry `e`
//!                           from `B`, in parallel:
//!                           R' = { r -> R[r] - {p} } [reg(p) -> R[reg(p)] + {p}]
//!
//! A def removes itself from every other register, since those now
//! hold a stale copy. At each instruction the register of each operand
//! must contain the operand, and on each edge the register of each
//! phi must already contain its entry: lowered phis emit no code.

use crate::bitvec::BitVec;
use crate::{Block, Function, Inst, InstKind, Register, RegisterAllocator, Target, Value};
use crate::{FxHashMap, FxHashSet};
use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;
use smallvec::SmallVec;

/// A set of errors detected by the checker.
#[derive(Clone, Debug)]
pub struct CheckerErrors {
    pub errors: Vec<CheckerError>,
}

/// A single error detected by the checker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckerError {
    /// An operand was never given a register.
    MissingAllocation { inst: Inst, value: Inst },
    /// Nothing is known about the register of an operand.
    UnknownValueInRegister { inst: Inst, value: Inst, reg: Register },
    /// The register of an operand holds other values.
    IncorrectValuesInRegister {
        inst: Inst,
        value: Inst,
        reg: Register,
        actual: Vec<Inst>,
    },
    /// On the edge from `pred`, the phi's register does not hold the
    /// phi entry.
    PhiEntryMismatch {
        phi: Inst,
        pred: Block,
        value: Inst,
        reg: Register,
    },
}

/// Abstract state of one register.
#[derive(Clone, Debug, PartialEq, Eq)]
struct CheckerValue {
    /// This value is the "universe set".
    universe: bool,
    values: FxHashSet<Inst>,
}

impl Default for CheckerValue {
    fn default() -> CheckerValue {
        CheckerValue {
            universe: true,
            values: FxHashSet::default(),
        }
    }
}

impl CheckerValue {
    /// Meet function of the value lattice. Returns `true` if `self`
    /// changed.
    fn meet_with(&mut self, other: &CheckerValue) -> bool {
        if self.universe {
            *self = other.clone();
            !other.universe
        } else if other.universe {
            false
        } else {
            let before = self.values.len();
            self.values.retain(|v| other.values.contains(v));
            before != self.values.len()
        }
    }

    fn from_inst(inst: Inst) -> CheckerValue {
        CheckerValue {
            universe: false,
            values: core::iter::once(inst).collect(),
        }
    }

    fn sorted(&self) -> Vec<Inst> {
        let mut values: Vec<Inst> = self.values.iter().cloned().collect();
        values.sort_unstable();
        values
    }
}

/// The abstract state at one program point.
#[derive(Clone, Debug, PartialEq, Eq)]
struct CheckerState {
    top: bool,
    registers: FxHashMap<Register, CheckerValue>,
}

impl Default for CheckerState {
    fn default() -> CheckerState {
        CheckerState {
            top: true,
            registers: FxHashMap::default(),
        }
    }
}

impl CheckerState {
    /// Nothing known about any register.
    fn empty() -> CheckerState {
        CheckerState {
            top: false,
            registers: FxHashMap::default(),
        }
    }

    /// Merge with the state of another predecessor. Registers known on
    /// one side only are dropped.
    fn meet_with(&mut self, other: &CheckerState) -> bool {
        if self.top {
            *self = other.clone();
            return !other.top;
        }
        if other.top {
            return false;
        }
        let mut changed = false;
        let mut remove_keys: SmallVec<[Register; 4]> = SmallVec::new();
        for (reg, value) in self.registers.iter_mut() {
            match other.registers.get(reg) {
                Some(other_value) => changed |= value.meet_with(other_value),
                None => remove_keys.push(*reg),
            }
        }
        for reg in &remove_keys {
            self.registers.remove(reg);
        }
        changed || !remove_keys.is_empty()
    }

    fn remove_value(&mut self, inst: Inst) {
        for value in self.registers.values_mut() {
            value.values.remove(&inst);
        }
    }

    fn define(&mut self, reg: Register, value: CheckerValue) {
        self.registers.insert(reg, value);
    }

    fn check_operand(
        &self,
        inst: Inst,
        value: Inst,
        reg: Option<Register>,
    ) -> Result<(), CheckerError> {
        let Some(reg) = reg else {
            return Err(CheckerError::MissingAllocation { inst, value });
        };
        let contents = match self.registers.get(&reg) {
            Some(v) if !v.universe => v,
            _ => return Err(CheckerError::UnknownValueInRegister { inst, value, reg }),
        };
        if !contents.values.contains(&value) {
            return Err(CheckerError::IncorrectValuesInRegister {
                inst,
                value,
                reg,
                actual: contents.sorted(),
            });
        }
        Ok(())
    }
}

pub struct Checker<'a, F: Function, T: Target> {
    f: &'a F,
    ra: &'a RegisterAllocator<T>,
    order: &'a [Block],
    in_order: BitVec,
    bb_in: FxHashMap<Block, CheckerState>,
}

impl<'a, F: Function, T: Target> Checker<'a, F, T> {
    pub fn new(f: &'a F, ra: &'a RegisterAllocator<T>, order: &'a [Block]) -> Self {
        let mut in_order = BitVec::with_len(f.num_blocks(), false);
        let mut bb_in = FxHashMap::default();
        for &block in order {
            in_order.set(block.index());
            bb_in.insert(block, CheckerState::default());
        }
        if let Some(&entry) = order.first() {
            bb_in.insert(entry, CheckerState::empty());
        }
        Checker {
            f,
            ra,
            order,
            in_order,
            bb_in,
        }
    }

    fn is_checked(&self, value: Value) -> Option<Inst> {
        let inst = value.as_inst()?;
        if self.in_order.test(self.f.inst_block(inst).index()) {
            Some(inst)
        } else {
            None
        }
    }

    fn reg(&self, inst: Inst) -> Option<Register> {
        self.ra.optional_register(Value::Inst(inst))
    }

    /// Check the operands of `inst` against `state`.
    fn check_inst(&self, state: &CheckerState, inst: Inst, errors: &mut Vec<CheckerError>) {
        for &op in self.f.inst_operands(inst) {
            let Some(value) = self.is_checked(op) else {
                continue;
            };
            if let Err(e) = state.check_operand(inst, value, self.reg(value)) {
                trace!("Checker error: {:?}", e);
                errors.push(e);
            }
        }
    }

    fn update(&self, state: &mut CheckerState, inst: Inst) {
        if !self.f.has_output(inst) {
            return;
        }
        let Some(reg) = self.reg(inst) else {
            return;
        };
        let mut value = CheckerValue::from_inst(inst);
        if self.f.inst_kind(inst) == InstKind::Mov {
            if let Some(src) = self.f.inst_operands(inst).first().and_then(|&v| self.is_checked(v)) {
                if let Some(known) = self.reg(src).and_then(|r| state.registers.get(&r)) {
                    if !known.universe {
                        value.values.extend(known.values.iter().cloned());
                    }
                }
            }
        }
        state.remove_value(inst);
        state.define(reg, value);
    }

    /// Apply the phis of `succ` for the edge from `block`, recording
    /// entry mismatches in `errors` if given. Lowered phis emit no
    /// code, so each entry must already sit in its phi's register.
    fn apply_phis(
        &self,
        state: &mut CheckerState,
        block: Block,
        succ: Block,
        mut errors: Option<&mut Vec<CheckerError>>,
    ) {
        let mut writes: SmallVec<[(Inst, Register, CheckerValue); 4]> = SmallVec::new();
        for &phi in self.f.block_insts(succ) {
            if self.f.inst_kind(phi) != InstKind::Phi {
                break;
            }
            let Some(phi_reg) = self.reg(phi) else {
                continue;
            };
            let known = state.registers.get(&phi_reg).filter(|v| !v.universe);
            for (&entry, &pred) in self
                .f
                .inst_operands(phi)
                .iter()
                .zip(self.f.phi_blocks(phi).iter())
            {
                if pred != block {
                    continue;
                }
                let mut value = CheckerValue::from_inst(phi);
                if let Some(entry) = self.is_checked(entry) {
                    match known {
                        Some(known) if known.values.contains(&entry) => {
                            value.values.extend(known.values.iter().cloned());
                        }
                        _ => {
                            if let Some(errors) = errors.as_deref_mut() {
                                let e = CheckerError::PhiEntryMismatch {
                                    phi,
                                    pred,
                                    value: entry,
                                    reg: phi_reg,
                                };
                                trace!("Checker error: {:?}", e);
                                errors.push(e);
                            }
                        }
                    }
                }
                writes.push((phi, phi_reg, value));
            }
        }
        for &(phi, _, _) in &writes {
            state.remove_value(phi);
        }
        for (_, reg, value) in writes {
            state.define(reg, value);
        }
    }

    /// Compute the state at the start of every block in the order.
    fn analyze(&mut self) {
        let mut queue: VecDeque<Block> = self.order.iter().cloned().collect();
        let mut queued = self.in_order.clone();
        let mut updates = vec![];

        while let Some(block) = queue.pop_front() {
            queued.reset(block.index());
            let mut state = match self.bb_in.get(&block) {
                Some(state) if !state.top => state.clone(),
                _ => continue,
            };
            for &inst in self.f.block_insts(block) {
                if self.f.inst_kind(inst) != InstKind::Phi {
                    self.update(&mut state, inst);
                }
            }

            for &succ in self.f.block_succs(block) {
                if !self.in_order.test(succ.index()) {
                    continue;
                }
                let mut new_state = state.clone();
                self.apply_phis(&mut new_state, block, succ, None);
                updates.push((succ, new_state));
            }

            for (succ, new_state) in updates.drain(..) {
                let Some(succ_in) = self.bb_in.get_mut(&succ) else {
                    continue;
                };
                if succ_in.meet_with(&new_state) && !queued.test(succ.index()) {
                    trace!("checker: state of {} changed", succ);
                    queued.set(succ.index());
                    queue.push_back(succ);
                }
            }
        }
    }

    /// Step through each block from its computed entry state and check
    /// every operand and phi entry.
    fn find_errors(&self) -> Result<(), CheckerErrors> {
        let mut errors = vec![];
        for &block in self.order {
            let mut state = match self.bb_in.get(&block) {
                Some(state) if !state.top => state.clone(),
                _ => continue,
            };
            for &inst in self.f.block_insts(block) {
                if self.f.inst_kind(inst) == InstKind::Phi {
                    continue;
                }
                self.check_inst(&state, inst, &mut errors);
                self.update(&mut state, inst);
            }
            for &succ in self.f.block_succs(block) {
                if self.in_order.test(succ.index()) {
                    let mut edge_state = state.clone();
                    self.apply_phis(&mut edge_state, block, succ, Some(&mut errors));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CheckerErrors { errors })
        }
    }

    /// Find any errors, returning `Err(CheckerErrors)` with all errors
    /// found or `Ok(())` otherwise.
    pub fn run(mut self) -> Result<(), CheckerErrors> {
        self.analyze();
        let result = self.find_errors();
        trace!("=== CHECKER RESULT === {:?}", result.as_ref().map_err(|e| e.errors.len()));
        result
    }
}
