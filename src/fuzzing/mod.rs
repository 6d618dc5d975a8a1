/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Utilities for fuzzing.

pub mod func;

// Re-exports for fuzz targets.
pub use libfuzzer_sys::{arbitrary, fuzz_target};
