//! Criterion microbenches for the face-lattice search loop.
//!
//! Results live under `target/criterion`. Use `scripts/rust-bench.sh` to sync
//! curated JSON into `data/bench/criterion` (Git LFS) when needed.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use flux_envelope::cfg::Config;
use flux_envelope::lp::{DenseSimplex, LpModel};
use flux_envelope::lattice::LatticeGraph;

fn box_model(dims: usize, bound: f64) -> (DenseSimplex, Vec<flux_envelope::VarId>) {
    let mut model = DenseSimplex::new();
    let vars = (0..dims).map(|_| model.add_variable(-bound, bound)).collect();
    (model, vars)
}

fn bench_box_projection(c: &mut Criterion) {
    let mut group = c.benchmark_group("lattice_box");
    for dims in [2usize, 3, 4] {
        group.bench_function(BenchmarkId::new("solve", dims), |b| {
            b.iter_batched(
                || {
                    let (model, vars) = box_model(dims, 10.0);
                    LatticeGraph::new(model, &vars, Config::default(), 42)
                },
                |mut graph| {
                    graph.solve();
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_pyramid_projection(c: &mut Criterion) {
    let mut group = c.benchmark_group("lattice_pyramid");
    group.bench_function(BenchmarkId::new("solve", "3d"), |b| {
        b.iter_batched(
            || {
                let mut model = DenseSimplex::new();
                let x = model.add_variable(0.0, 1.0);
                let y = model.add_variable(0.0, 1.0);
                let z = model.add_variable(0.0, 1.0);
                model.add_equality(&[(x, 1.0), (y, 1.0), (z, 1.0)], f64::NEG_INFINITY, 1.0);
                LatticeGraph::new(model, &[x, y, z], Config::default(), 7)
            },
            |mut graph| {
                graph.solve();
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_box_projection, bench_pyramid_projection);
criterion_main!(benches);
