/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

#![no_main]
use hbc_regalloc::checker::Checker;
use hbc_regalloc::fuzzing::arbitrary::{Arbitrary, Result, Unstructured};
use hbc_regalloc::fuzzing::func::{Func, Options};
use hbc_regalloc::fuzzing::fuzz_target;
use hbc_regalloc::{isel, postorder, HvmRegisterAllocator, RegallocOptions};

#[derive(Clone, Debug)]
struct TestCase {
    func: Func,
}

impl<'a> Arbitrary<'a> for TestCase {
    fn arbitrary(u: &mut Unstructured<'a>) -> Result<TestCase> {
        Ok(TestCase {
            func: Func::arbitrary_with_options(
                u,
                &Options {
                    calls: true,
                    ..Options::default()
                },
            )?,
        })
    }
}

fuzz_target!(|testcase: TestCase| {
    let mut func = testcase.func;
    let _ = env_logger::try_init();
    log::trace!("func:\n{:?}", func);

    let order = postorder::reverse_postorder(&func);
    let options = RegallocOptions {
        validate_input: true,
        ..RegallocOptions::default()
    };
    let mut ra = HvmRegisterAllocator::with_options(options);
    ra.allocate(&mut func, &order)
        .expect("regalloc did not succeed");
    assert!(!ra.used_fast_path());

    Checker::new(&func, &ra, &order)
        .run()
        .expect("checker failed");

    ra.lower_phis(&mut func, &order);
    let lowered = isel::lower_function(&func, &ra, &order);
    assert_eq!(lowered.blocks.len(), order.len());
});
