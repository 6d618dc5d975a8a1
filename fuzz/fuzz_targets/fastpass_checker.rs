/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

#![no_main]
use hbc_regalloc::checker::Checker;
use hbc_regalloc::fuzzing::func::Func;
use hbc_regalloc::fuzzing::fuzz_target;
use hbc_regalloc::{postorder, GenericTarget, RegallocOptions, RegisterAllocator};

fuzz_target!(|func: Func| {
    let mut func = func;
    let _ = env_logger::try_init();
    log::trace!("func:\n{:?}", func);

    let order = postorder::reverse_postorder(&func);
    let options = RegallocOptions {
        validate_input: true,
        ..RegallocOptions::default()
    };
    let mut ra = RegisterAllocator::new(GenericTarget, options);
    ra.allocate_fast_pass(&mut func, &order)
        .expect("regalloc did not succeed");
    assert!(ra.used_fast_path());

    Checker::new(&func, &ra, &order)
        .run()
        .expect("checker failed");

    ra.lower_phis(&mut func, &order);
});
