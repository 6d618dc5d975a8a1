/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! The allocator as configured for the Hermes VM.
//!
//! The VM sees one flat register frame. Allocated registers are laid
//! out class by class (`Number`, then `NonPtr`, then `Other`),
//! followed by the spill temporaries and finally the outgoing
//! parameter area used by calls:
//!
//! ```text
//!   | Number | NonPtr | Other | spill temps | parameters ... extra |
//!   0                                                      last_register
//! ```

use crate::{Function, Inst, InstKind, RegClass, Register, RegisterAllocator, Target};
use crate::RegallocOptions;

/// Registers a call needs past its arguments for the VM's call frame
/// bookkeeping: `this`, `new.target`, the callee closure and the
/// argument count.
pub const CALL_EXTRA_REGISTERS: u32 = 4;

/// Registers the callee frame needs below its own registers. Added to
/// the register usage when sizing the stack check.
pub const CALLEE_EXTRA_REGISTERS_AT_START: u32 = 0;

/// Hooks for the Hermes VM: calls are lowered by the target, and each
/// call grows the outgoing parameter area.
#[derive(Clone, Debug, Default)]
pub struct HvmTarget {
    max_parameter_count: u32,
    spill_temp_count: u32,
}

impl Target for HvmTarget {
    fn has_target_specific_lowering<F: Function>(&self, func: &F, inst: Inst) -> bool {
        func.inst_kind(inst) == InstKind::Call
    }

    fn handle_instruction<F: Function>(&mut self, func: &F, inst: Inst) {
        if func.inst_kind(inst) == InstKind::Call {
            let args = func.inst_operands(inst).len() as u32;
            self.allocate_parameter_count(args + CALL_EXTRA_REGISTERS);
        }
    }
}

impl HvmTarget {
    /// Make the parameter area at least `count` registers wide.
    pub fn allocate_parameter_count(&mut self, count: u32) {
        self.max_parameter_count = self.max_parameter_count.max(count);
    }

    /// Make room for at least `count` spill temporaries.
    pub fn allocate_spill_temp_count(&mut self, count: u32) {
        self.spill_temp_count = self.spill_temp_count.max(count);
    }

    pub fn max_parameter_count(&self) -> u32 {
        self.max_parameter_count
    }

    pub fn spill_temp_count(&self) -> u32 {
        self.spill_temp_count
    }
}

pub type HvmRegisterAllocator = RegisterAllocator<HvmTarget>;

impl RegisterAllocator<HvmTarget> {
    pub fn with_options(options: RegallocOptions) -> Self {
        RegisterAllocator::new(HvmTarget::default(), options)
    }

    fn class_base(&self, class: RegClass) -> u32 {
        let usage = |c| self.max_register_usage(c) as u32;
        match class {
            RegClass::NoOutput | RegClass::Number => 0,
            RegClass::NonPtr => usage(RegClass::Number),
            RegClass::Other => usage(RegClass::Number) + usage(RegClass::NonPtr),
        }
    }

    fn allocated_register_count(&self) -> u32 {
        self.class_base(RegClass::Other) + self.max_register_usage(RegClass::Other) as u32
    }

    /// The flat VM register of `reg`.
    pub fn hvm_register_index(&self, reg: Register) -> u32 {
        debug_assert!(reg.is_valid(), "No VM register for {}", reg);
        debug_assert_ne!(reg.class(), RegClass::NoOutput);
        self.class_base(reg.class()) + reg.index()
    }

    /// The flat VM register of spill temporary `i`.
    pub fn spill_temp_register(&self, i: u32) -> u32 {
        debug_assert!(i < self.target.spill_temp_count(), "Spill temp out of range");
        self.allocated_register_count() + i
    }

    /// Size of the register frame: allocated registers, spill
    /// temporaries and the parameter area.
    pub fn total_register_usage(&self) -> u32 {
        self.allocated_register_count()
            + self.target.spill_temp_count()
            + self.target.max_parameter_count()
    }

    /// The highest flat register of the frame.
    pub fn last_register(&self) -> u32 {
        debug_assert!(self.total_register_usage() > 0, "Empty register frame");
        self.total_register_usage().saturating_sub(1)
    }

    pub fn allocate_parameter_count(&mut self, count: u32) {
        self.target.allocate_parameter_count(count);
    }

    pub fn allocate_spill_temp_count(&mut self, count: u32) {
        self.target.allocate_spill_temp_count(count);
    }

    pub fn max_parameter_count(&self) -> u32 {
        self.target.max_parameter_count()
    }

    pub fn spill_temp_count(&self) -> u32 {
        self.target.spill_temp_count()
    }

    /// The flat register holding argument `i` of a call. Arguments
    /// are laid out downwards from just below the call's extra
    /// registers at the top of the frame.
    pub fn call_argument_register(&self, i: u32) -> u32 {
        debug_assert!(
            i + CALL_EXTRA_REGISTERS < self.max_parameter_count(),
            "Argument {} outside of the parameter area",
            i
        );
        self.last_register() - CALL_EXTRA_REGISTERS - i
    }
}
