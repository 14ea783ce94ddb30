use criterion::{black_box, criterion_group, criterion_main, Criterion};
use snlike::prelude::*;
use snlike::routines::initialization::sobol;

/// Benchmark the Sobol design using 4096 points in a w0wa parameter space
fn benchmark_sobol(c: &mut Criterion) {
    let parameters = Parameters::new()
        .add(OMEGA_M, 0.0, 1.0)
        .add(OMEGA_K, -0.5, 0.5)
        .add(W0, -3.0, 1.0)
        .add(WA, -3.0, 3.0);
    c.bench_function("sobol", |b| {
        b.iter(|| sobol::generate(black_box(&parameters), black_box(4096), black_box(22)));
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(std::time::Duration::from_secs(10)) // Measure for 10 seconds
        .noise_threshold(0.10); // Performance changes less than 10% will be ignored
    targets = benchmark_sobol
}
criterion_main!(benches);
