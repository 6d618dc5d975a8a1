//! Criterion-based benchmark target that computes insts/second for
//! arbitrary inputs, on both allocation paths.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hbc_regalloc::fuzzing::arbitrary::{self, Unstructured};
use hbc_regalloc::fuzzing::func::{Func, Options};
use hbc_regalloc::{postorder, Function, GenericTarget, RegallocOptions, RegisterAllocator};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn create_random_func(seed: u64, size: usize) -> Func {
    let mut bytes: Vec<u8> = vec![];
    bytes.resize(size, 0);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.fill(&mut bytes[..]);
    let options = Options {
        max_blocks: 1000,
        max_insts_per_block: 40,
        ..Options::default()
    };
    loop {
        let mut u = Unstructured::new(&bytes[..]);
        match Func::arbitrary_with_options(&mut u, &options) {
            Ok(f) => {
                return f;
            }
            Err(arbitrary::Error::NotEnoughData) => {
                let len = bytes.len();
                bytes.resize(len + 1024, 0);
                rng.fill(&mut bytes[len..]);
            }
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }
}

fn run_regalloc(c: &mut Criterion) {
    const SIZE: usize = 1000 * 1000;
    env_logger::init();
    let mut group = c.benchmark_group("benches");
    for iter in 0..3 {
        let func = create_random_func(iter, SIZE);
        let order = postorder::reverse_postorder(&func);
        eprintln!("==== {} instructions", func.num_insts());
        group.throughput(Throughput::Elements(func.num_insts() as u64));
        for fast in [false, true] {
            let name = if fast { "fast" } else { "scan" };
            group.bench_with_input(BenchmarkId::new(name, iter), &iter, |b, _| {
                b.iter(|| {
                    // Allocation rewrites the function.
                    let mut func = func.clone();
                    let mut ra = RegisterAllocator::new(GenericTarget, RegallocOptions::default());
                    let result = if fast {
                        ra.allocate_fast_pass(&mut func, &order)
                    } else {
                        ra.allocate(&mut func, &order)
                    };
                    result.expect("regalloc did not succeed");
                    ra.lower_phis(&mut func, &order);
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, run_regalloc);
criterion_main!(benches);
