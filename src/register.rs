/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Typed bytecode registers and the register file that hands them out.

use crate::bitvec::BitVec;
use alloc::string::String;
use core::fmt::Write;

/// A register class identifies a set of registers with similar
/// properties. Each class is numbered independently from zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum RegClass {
    /// A dummy class used for instructions that produce no value.
    NoOutput = 0,
    /// A value that is known to be a number.
    Number = 1,
    /// A value that is known not to be a pointer.
    NonPtr = 2,
    /// A value that can be anything.
    Other = 3,
}

impl RegClass {
    /// Number of register classes.
    pub const COUNT: usize = 4;

    pub const ALL: [RegClass; RegClass::COUNT] = [
        RegClass::NoOutput,
        RegClass::Number,
        RegClass::NonPtr,
        RegClass::Other,
    ];

    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline(always)]
    pub fn from_index(index: usize) -> RegClass {
        match index {
            0 => RegClass::NoOutput,
            1 => RegClass::Number,
            2 => RegClass::NonPtr,
            3 => RegClass::Other,
            _ => panic!("Invalid register class {}", index),
        }
    }

    /// The smallest class able to hold values of both `self` and
    /// `other`. `NoOutput` is the identity; otherwise
    /// `Number < NonPtr < Other`.
    pub fn join(self, other: RegClass) -> RegClass {
        match (self, other) {
            (RegClass::NoOutput, c) | (c, RegClass::NoOutput) => c,
            (a, b) => a.max(b),
        }
    }

    fn letter(self) -> char {
        match self {
            RegClass::NoOutput => 'x',
            RegClass::Number => 'n',
            RegClass::NonPtr => 'p',
            RegClass::Other => 'o',
        }
    }
}

/// An index within a register class.
pub type RegIndex = u32;

/// A bytecode register: a class and an index within that class,
/// packed into one 32-bit word. The class occupies the low bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Register {
    bits: u32,
}

impl Register {
    const CLASS_WIDTH: u32 = 4;
    const CLASS_MASK: u32 = (1 << Self::CLASS_WIDTH) - 1;
    /// Number of bits left for the index.
    pub const INDEX_WIDTH: u32 = 32 - Self::CLASS_WIDTH;
    pub const MAX_INDEX: RegIndex = (1 << Self::INDEX_WIDTH) - 1;

    const INVALID: u32 = !0;
    const TOMBSTONE: u32 = !0 - 1;

    #[inline(always)]
    pub fn new(class: RegClass, index: RegIndex) -> Self {
        debug_assert!(index <= Self::MAX_INDEX, "register index too large");
        Register {
            bits: (index << Self::CLASS_WIDTH) | class as u32,
        }
    }

    /// The "no register" value.
    #[inline(always)]
    pub const fn invalid() -> Self {
        Register {
            bits: Self::INVALID,
        }
    }

    /// A second reserved pattern, used as a deleted-entry marker by
    /// open-addressing maps. Never a real register.
    #[inline(always)]
    pub const fn tombstone() -> Self {
        Register {
            bits: Self::TOMBSTONE,
        }
    }

    #[inline(always)]
    pub fn is_valid(self) -> bool {
        self.bits != Self::INVALID && self.bits != Self::TOMBSTONE
    }

    #[inline(always)]
    pub fn class(self) -> RegClass {
        debug_assert!(self.is_valid());
        RegClass::from_index((self.bits & Self::CLASS_MASK) as usize)
    }

    /// The index within the register class. This is not a VM register
    /// number; targets map it to one.
    #[inline(always)]
    pub fn index(self) -> RegIndex {
        debug_assert!(self.is_valid());
        self.bits >> Self::CLASS_WIDTH
    }

    /// Returns `true` if `next` directly follows `self` in the same
    /// class.
    pub fn is_consecutive(self, next: Register) -> bool {
        self.class() == next.class() && self.index() + 1 == next.index()
    }

    /// The register `count` slots after this one, in the same class.
    pub fn consecutive(self, count: u32) -> Register {
        Register::new(self.class(), self.index() + count)
    }

    /// The raw packed value. Only meant for hashing and ordering.
    #[inline(always)]
    pub fn opaque_value(self) -> u32 {
        self.bits
    }

    /// Global allocation order: compares the packed values.
    #[inline(always)]
    pub fn less(a: Register, b: Register) -> bool {
        a.bits < b.bits
    }
}

impl Default for Register {
    fn default() -> Self {
        Register::invalid()
    }
}

impl PartialOrd for Register {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Register {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.bits.cmp(&other.bits)
    }
}

impl core::fmt::Debug for Register {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self)
    }
}

impl core::fmt::Display for Register {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if !self.is_valid() {
            write!(f, "null")
        } else {
            write!(f, "r{}{}", self.index(), self.class().letter())
        }
    }
}

/// The register file: one growable bit vector per class, where a set
/// bit marks a free register.
///
/// The file never shrinks. The size of each vector is therefore the
/// high-water mark of registers ever used in that class.
#[derive(Clone, Debug, Default)]
pub struct RegisterFile {
    registers: [BitVec; RegClass::COUNT],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    fn class_bits(&self, class: RegClass) -> &BitVec {
        &self.registers[class.index()]
    }

    #[inline(always)]
    fn class_bits_mut(&mut self, class: RegClass) -> &mut BitVec {
        &mut self.registers[class.index()]
    }

    /// Returns `true` if `reg` is currently handed out.
    pub fn is_used(&self, reg: Register) -> bool {
        let bits = self.class_bits(reg.class());
        (reg.index() as usize) < bits.len() && !bits.test(reg.index() as usize)
    }

    pub fn is_free(&self, reg: Register) -> bool {
        !self.is_used(reg)
    }

    /// Hand out the lowest free register of `class`, growing the class
    /// by one register if none is free.
    pub fn allocate_register(&mut self, class: RegClass) -> Register {
        let bits = self.class_bits_mut(class);
        match bits.find_first() {
            Some(i) => {
                bits.reset(i);
                let reg = Register::new(class, i as RegIndex);
                trace!("-- Assigning the free register {}", reg);
                reg
            }
            None => {
                let n = bits.len();
                bits.resize(n + 1, false);
                let reg = Register::new(class, n as RegIndex);
                trace!("-- Creating the new register {}", reg);
                debug_assert!(self.is_used(reg));
                reg
            }
        }
    }

    /// Reserve `n` consecutive registers past the last used register
    /// of `class` and return the first one. Free registers in the
    /// middle of the file are never considered.
    pub fn tail_allocate_consecutive(&mut self, class: RegClass, n: u32) -> Register {
        debug_assert!(n > 0, "Can't request zero registers");
        let bits = self.class_bits_mut(class);
        let first_clear = bits.find_last_unset().map_or(0, |last_used| last_used + 1);
        trace!(
            "-- Tail-allocating {} registers of class {:?} at {}",
            n,
            class,
            first_clear
        );
        let needed = first_clear + n as usize;
        if needed > bits.len() {
            bits.resize(needed, true);
        }
        bits.reset_range(first_clear, needed);
        Register::new(class, first_clear as RegIndex)
    }

    /// Release `reg` for future reuse.
    pub fn kill_register(&mut self, reg: Register) {
        trace!("-- Releasing the register {}", reg);
        debug_assert!(self.is_used(reg), "Killing an unused register!");
        self.class_bits_mut(reg.class()).set(reg.index() as usize);
    }

    /// Registers of `class` currently in use.
    pub fn num_live_registers(&self, class: RegClass) -> usize {
        let bits = self.class_bits(class);
        bits.len() - bits.count()
    }

    /// Registers of `class` ever created.
    pub fn max_register_usage(&self, class: RegClass) -> usize {
        self.class_bits(class).len()
    }

    /// Fold the `Number` and `NonPtr` files into `Other`. The `Other`
    /// file becomes `Number ++ NonPtr ++ Other`; the two typed files
    /// are left empty.
    pub fn convert_type_specific_regs_to_other(&mut self) {
        let mut merged = core::mem::take(self.class_bits_mut(RegClass::Number));
        merged.append(&core::mem::take(self.class_bits_mut(RegClass::NonPtr)));
        merged.append(self.class_bits(RegClass::Other));
        *self.class_bits_mut(RegClass::Other) = merged;
    }

    /// Check the structural invariants of the file.
    pub fn verify(&self) {
        for class in RegClass::ALL {
            let bits = self.class_bits(class);
            debug_assert!(bits.count() <= bits.len());
            debug_assert!(bits.len() <= Register::MAX_INDEX as usize);
        }
    }

    /// Render the file, one line per non-empty class, `1` for a used
    /// register.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for class in RegClass::ALL {
            let bits = self.class_bits(class);
            if bits.is_empty() {
                continue;
            }
            let line: String = (0..bits.len())
                .map(|i| if bits.test(i) { '0' } else { '1' })
                .collect();
            let _ = writeln!(out, "{:?}: {}", class, line);
        }
        out
    }
}
