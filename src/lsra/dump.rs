/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Debugging output.

use crate::{Block, Function, RegisterAllocator, Target, Value};
use alloc::string::String;
use core::fmt::Write;

impl<T: Target> RegisterAllocator<T> {
    /// Render the allocation of every instruction in `order`: its
    /// register, and on the slow path its number and live interval.
    pub fn dump<F: Function>(&self, func: &F, order: &[Block]) -> String {
        let mut out = String::new();
        for &block in order {
            let _ = writeln!(out, "{}", block);
            for &inst in func.block_insts(block) {
                let _ = write!(out, "  {}\t", inst);
                match self.optional_register(Value::Inst(inst)) {
                    Some(reg) => {
                        let _ = write!(out, "{}", reg);
                    }
                    None => out.push('-'),
                }
                if let Some(n) = self.numbering.get(inst) {
                    let _ = write!(out, "\t@{}", n);
                    if let Some(ivl) = self.intervals.get(n) {
                        let _ = write!(out, " {}", ivl);
                    }
                }
                if let Some(dest) = self.coalesced_with(inst) {
                    let _ = write!(out, " -> {}", dest);
                }
                let _ = writeln!(out);
            }
        }
        out.push_str(&self.file.dump());
        out
    }
}
