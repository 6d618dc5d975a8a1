/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Linear-scan register allocator.
//!
//! [`RegisterAllocator::allocate`] runs the whole pipeline on one
//! function: phi isolation, instruction numbering, block liveness, live
//! intervals, coalescing and the linear scan itself. Functions that are
//! too large for liveness are handed to a sequential fast path instead.
//! Once registers are known the caller removes the phis with
//! [`RegisterAllocator::lower_phis`].

use crate::bitvec::BitVec;
use crate::{Block, Function, Inst, Interval, Value};
use crate::{FxHashMap, RegAllocError, RegClass, RegIndex, RegallocOptions};
use crate::{Register, RegisterFile};
use alloc::vec::Vec;

pub(crate) mod coalesce;
pub(crate) mod data_structures;
pub(crate) mod dump;
pub(crate) mod fastpass;
pub(crate) mod liveness;
pub(crate) mod phis;
pub(crate) mod scan;
pub(crate) mod validate;

pub use data_structures::{AllocState, Stats};
use data_structures::Numbering;

#[cfg(test)]
mod tests;

/// The register class a value of `inst` needs, derived from its type.
pub fn default_class<F: Function>(func: &F, inst: Inst) -> RegClass {
    if !func.has_output(inst) {
        return RegClass::NoOutput;
    }
    let ty = func.inst_type(inst);
    if ty.is_number_type() {
        RegClass::Number
    } else if ty.is_non_ptr() {
        RegClass::NonPtr
    } else {
        RegClass::Other
    }
}

/// Target-specific hooks consulted by the allocator.
pub trait Target {
    /// The register class `inst` is allocated in.
    fn classify<F: Function>(&self, func: &F, inst: Inst) -> RegClass {
        default_class(func, inst)
    }

    /// Returns `true` if the target lowers `inst` itself. Such
    /// instructions, and the values they read, are never coalesced.
    fn has_target_specific_lowering<F: Function>(&self, _func: &F, _inst: Inst) -> bool {
        false
    }

    /// Called exactly once for every allocated instruction.
    fn handle_instruction<F: Function>(&mut self, _func: &F, _inst: Inst) {}
}

/// A target with no special requirements.
#[derive(Clone, Copy, Debug, Default)]
pub struct GenericTarget;

impl Target for GenericTarget {}

/// Assigns a [`Register`] to every instruction of one function.
pub struct RegisterAllocator<T: Target> {
    pub(crate) target: T,
    pub(crate) file: RegisterFile,
    pub(crate) allocated: FxHashMap<Value, Register>,
    pub(crate) numbering: Numbering,
    /// Indexed by instruction number.
    pub(crate) intervals: Vec<Interval>,
    /// Indexed by instruction number. The class of a coalescing group
    /// is kept on its representative.
    pub(crate) classes: Vec<RegClass>,
    /// Coalesced instruction to the representative whose register it
    /// shares.
    pub(crate) coalesced: FxHashMap<Inst, Inst>,
    pub(crate) options: RegallocOptions,
    pub(crate) stats: Stats,
    pub(crate) state: AllocState,
}

impl<T: Target> RegisterAllocator<T> {
    pub fn new(target: T, options: RegallocOptions) -> Self {
        RegisterAllocator {
            target,
            file: RegisterFile::new(),
            allocated: FxHashMap::default(),
            numbering: Numbering::default(),
            intervals: Vec::new(),
            classes: Vec::new(),
            coalesced: FxHashMap::default(),
            options,
            stats: Stats::default(),
            state: AllocState::Uninitialized,
        }
    }

    /// Allocate registers for every instruction in the blocks of
    /// `order`, which must be a valid execution order starting at the
    /// entry block and must match the order code generation uses.
    ///
    /// Phi entries are rewritten into moves before allocation; call
    /// [`RegisterAllocator::lower_phis`] afterwards to drop the phis.
    pub fn allocate<F: Function>(
        &mut self,
        func: &mut F,
        order: &[Block],
    ) -> Result<(), RegAllocError> {
        self.prepare(func, order)?;

        let num_insts = self.stats.insts;
        // Five bits of liveness per instruction per block.
        let estimated_memory = (order.len() as u64) * (num_insts as u64) * 5 / 8;
        let too_large = self
            .options
            .fast_pass_threshold
            .map_or(false, |threshold| num_insts > threshold);
        if too_large || estimated_memory > self.options.memory_limit {
            trace!(
                "Using the fast path for {} instructions in {} blocks (~{} bytes)",
                num_insts,
                order.len(),
                estimated_memory
            );
            self.fast_pass(func, order);
            return Ok(());
        }

        coalesce::forward_copies(func, order, &mut self.stats);

        let in_order = self.number(func, order);
        let infos =
            liveness::compute_liveness(func, order, &self.numbering, &in_order, &mut self.stats);
        self.state = AllocState::LivenessComputed;

        self.intervals =
            liveness::calculate_live_intervals(func, order, &self.numbering, &infos);
        drop(infos);
        self.state = AllocState::IntervalsComputed;

        self.coalesce(func, order);
        self.scan(func);
        if trace_enabled!() {
            trace!("Allocation result:\n{}", self.dump(func, order));
        }
        Ok(())
    }

    /// Allocate with the fast path regardless of the function's size.
    pub fn allocate_fast_pass<F: Function>(
        &mut self,
        func: &mut F,
        order: &[Block],
    ) -> Result<(), RegAllocError> {
        self.prepare(func, order)?;
        self.fast_pass(func, order);
        Ok(())
    }

    fn prepare<F: Function>(&mut self, func: &mut F, order: &[Block]) -> Result<(), RegAllocError> {
        debug_assert_eq!(
            self.state,
            AllocState::Uninitialized,
            "Allocator reused for a second function"
        );
        if self.options.validate_input {
            validate::validate(func, order)?;
        }
        phis::isolate_phis(func, order, &mut self.stats);
        self.stats.blocks = order.len();
        self.stats.insts = order.iter().map(|&b| func.block_insts(b).len()).sum();
        Ok(())
    }

    /// Number every instruction of `order` and return the set of
    /// blocks in the order.
    fn number<F: Function>(&mut self, func: &F, order: &[Block]) -> BitVec {
        self.numbering = Numbering::new(func.num_insts());
        let mut in_order = BitVec::with_len(func.num_blocks(), false);
        for &block in order {
            in_order.set(block.index());
            for &inst in func.block_insts(block) {
                self.numbering.number(inst);
            }
        }
        self.classes = (0..self.numbering.len())
            .map(|n| self.target.classify(func, self.numbering.inst(n)))
            .collect();
        self.state = AllocState::Numbered;
        in_order
    }

    /// Reserve `count` consecutive registers of `class` past the last
    /// used one, outside of liveness, and return the first.
    pub fn reserve(&mut self, class: RegClass, count: u32) -> Register {
        self.file.tail_allocate_consecutive(class, count)
    }

    /// Reserve one consecutive register per entry of `values` and bind
    /// each `Some` value to its register. Returns the first register.
    pub fn reserve_values(&mut self, class: RegClass, values: &[Option<Value>]) -> Register {
        let first = self.reserve(class, values.len() as u32);
        for (i, value) in values.iter().enumerate() {
            if let Some(value) = value {
                self.update_register(*value, first.consecutive(i as u32));
            }
        }
        first
    }

    /// Release a register obtained through [`RegisterAllocator::reserve`].
    pub fn free(&mut self, reg: Register) {
        self.file.kill_register(reg);
    }

    /// The register assigned to `value`. The value must be allocated.
    pub fn register(&self, value: Value) -> Register {
        let reg = self.allocated.get(&value).copied();
        debug_assert!(reg.is_some(), "Value {} not allocated", value);
        reg.unwrap_or_else(Register::invalid)
    }

    pub fn optional_register(&self, value: Value) -> Option<Register> {
        self.allocated.get(&value).copied()
    }

    /// Bind `value` to `reg`, overriding any previous assignment.
    pub fn update_register(&mut self, value: Value, reg: Register) {
        self.allocated.insert(value, reg);
    }

    pub fn is_allocated(&self, value: Value) -> bool {
        self.allocated.contains_key(&value)
    }

    pub fn has_instruction_number(&self, inst: Inst) -> bool {
        self.numbering.get(inst).is_some()
    }

    /// The position of `inst` in the allocation order. Only meaningful
    /// on the slow path.
    pub fn instruction_number(&self, inst: Inst) -> usize {
        let n = self.numbering.get(inst);
        debug_assert!(n.is_some(), "{} has no instruction number", inst);
        n.unwrap_or(usize::MAX)
    }

    pub fn num_instructions(&self) -> usize {
        self.numbering.len()
    }

    /// The live interval of `inst`. For a coalescing representative
    /// this covers the whole group.
    pub fn instruction_interval(&self, inst: Inst) -> &Interval {
        &self.intervals[self.instruction_number(inst)]
    }

    /// Returns `true` if the target lowers `inst`, or one of its users,
    /// itself.
    pub fn is_manually_allocated_interval<F: Function>(&self, func: &F, inst: Inst) -> bool {
        self.target.has_target_specific_lowering(func, inst)
            || func
                .inst_users(inst)
                .iter()
                .any(|&user| self.target.has_target_specific_lowering(func, user))
    }

    /// The representative `inst` was coalesced into, if any.
    pub fn coalesced_with(&self, inst: Inst) -> Option<Inst> {
        self.coalesced.get(&inst).copied()
    }

    pub fn max_register_usage(&self, class: RegClass) -> usize {
        self.file.max_register_usage(class)
    }

    /// Move every `Number` and `NonPtr` register into `Other`: the
    /// `Number` registers come first, then the `NonPtr` ones, then the
    /// previous `Other` registers.
    pub fn convert_type_specific_regs_to_other(&mut self) {
        let num_number = self.file.max_register_usage(RegClass::Number) as RegIndex;
        let num_non_ptr = self.file.max_register_usage(RegClass::NonPtr) as RegIndex;
        for reg in self.allocated.values_mut() {
            let offset = match reg.class() {
                RegClass::Number => 0,
                RegClass::NonPtr => num_number,
                RegClass::Other => num_number + num_non_ptr,
                RegClass::NoOutput => continue,
            };
            *reg = Register::new(RegClass::Other, reg.index() + offset);
        }
        self.file.convert_type_specific_regs_to_other();
    }

    pub fn set_fast_pass_threshold(&mut self, threshold: Option<usize>) {
        self.options.fast_pass_threshold = threshold;
    }

    pub fn set_memory_limit(&mut self, limit: u64) {
        self.options.memory_limit = limit;
    }

    pub fn options(&self) -> &RegallocOptions {
        &self.options
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn state(&self) -> AllocState {
        self.state
    }

    pub fn used_fast_path(&self) -> bool {
        self.stats.fast_path
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn file(&self) -> &RegisterFile {
        &self.file
    }

    /// Allocate one register of `class` for `value`.
    pub(crate) fn assign(&mut self, value: Inst, class: RegClass) -> Register {
        let reg = self.file.allocate_register(class);
        self.update_register(Value::Inst(value), reg);
        self.stats.registers_allocated += 1;
        reg
    }

    pub(crate) fn release(&mut self, reg: Register) {
        self.file.kill_register(reg);
        self.stats.registers_killed += 1;
    }
}
