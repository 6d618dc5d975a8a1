/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! A linear-scan register allocator for a register-based JavaScript
//! bytecode VM.
//!
//! The allocator works on an SSA-like IR with phis, described to it
//! through the [`Function`] trait. It numbers instructions in a
//! caller-supplied block order, computes block liveness and per-value
//! live [`Interval`]s, coalesces moves, and assigns typed
//! [`Register`]s from a growable [`RegisterFile`]. Phis are lowered to
//! moves in predecessor blocks. Large functions take a fast path that
//! skips liveness entirely.
//!
//! Target-specific behaviour is supplied through the [`Target`]
//! trait; [`HvmRegisterAllocator`] maps registers onto the VM's flat
//! register frame.

#![allow(dead_code)]
#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

// Even when trace logging is disabled, the trace macro has a significant
// performance cost so we disable it in release builds.
macro_rules! trace {
    ($($tt:tt)*) => {
        if cfg!(feature = "trace-log") {
            ::log::trace!($($tt)*);
        }
    };
}

macro_rules! trace_enabled {
    () => {
        cfg!(feature = "trace-log") && ::log::log_enabled!(::log::Level::Trace)
    };
}

use core::hash::BuildHasherDefault;
use rustc_hash::FxHasher;
type FxHashMap<K, V> = hashbrown::HashMap<K, V, BuildHasherDefault<FxHasher>>;
type FxHashSet<V> = hashbrown::HashSet<V, BuildHasherDefault<FxHasher>>;

pub mod bitvec;
pub mod checker;
pub mod domtree;
mod func;
pub mod hvm;
#[macro_use]
mod index;
mod interval;
pub mod ir;
pub mod isel;
pub mod lsra;
pub mod postorder;
mod register;

#[cfg(feature = "fuzzing")]
pub mod fuzzing;

pub use func::{Function, InstKind, Type, Value};
pub use hvm::{HvmRegisterAllocator, HvmTarget};
pub use index::{Block, Inst, Literal};
pub use interval::{Interval, Segment};
pub use lsra::{GenericTarget, RegisterAllocator, Stats, Target};
pub use register::{RegClass, RegIndex, Register, RegisterFile};

/// An error that prevents allocation from starting.
///
/// Allocation itself cannot fail; these are only reported when
/// [`RegallocOptions::validate_input`] is set and the input IR or block
/// order is malformed.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum RegAllocError {
    /// The block order is empty.
    EmptyOrder,
    /// The block order does not start with the entry block.
    EntryNotFirst(Block),
    /// A block appears twice in the block order.
    DuplicateBlock(Block),
    /// A block is empty or does not end in a terminator.
    NoTerminator(Block),
    /// A terminator appears before the end of its block.
    TerminatorNotLast(Inst),
    /// A phi follows a non-phi instruction in its block.
    PhiNotAtStart(Inst),
    /// A phi's entries do not match its block's predecessors.
    PhiArity(Inst),
    /// An operand refers to an instruction in a block outside the
    /// order. Phi entries are exempt.
    OperandNotNumbered { inst: Inst, operand: Inst },
}

impl core::fmt::Display for RegAllocError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RegAllocError::EmptyOrder => write!(f, "empty block order"),
            RegAllocError::EntryNotFirst(b) => {
                write!(f, "block order starts with {} instead of the entry", b)
            }
            RegAllocError::DuplicateBlock(b) => write!(f, "{} appears twice in the order", b),
            RegAllocError::NoTerminator(b) => write!(f, "{} does not end in a terminator", b),
            RegAllocError::TerminatorNotLast(i) => {
                write!(f, "terminator {} is not last in its block", i)
            }
            RegAllocError::PhiNotAtStart(i) => write!(f, "phi {} follows a non-phi", i),
            RegAllocError::PhiArity(i) => {
                write!(f, "phi {} entries do not match the predecessors", i)
            }
            RegAllocError::OperandNotNumbered { inst, operand } => {
                write!(f, "{} uses {} from a block outside the order", inst, operand)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RegAllocError {}

/// Options for allocation.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct RegallocOptions {
    /// Functions with more instructions than this are allocated with
    /// the fast path. `None` disables the size trigger.
    pub fast_pass_threshold: Option<usize>,

    /// Estimated liveness memory, in bytes, above which the fast path
    /// is used regardless of function size.
    pub memory_limit: u64,

    /// Check the IR and block order before allocating.
    pub validate_input: bool,

    /// Add extra verbosity to debug logs.
    pub verbose_log: bool,
}

impl Default for RegallocOptions {
    fn default() -> Self {
        RegallocOptions {
            fast_pass_threshold: None,
            memory_limit: u64::MAX,
            validate_input: false,
            verbose_log: false,
        }
    }
}
