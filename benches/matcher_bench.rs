use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use halotrack::matcher::{SearchStrategy, resolve};
use halotrack::rank::rank;

const MULTIPLIER: i64 = 1_000_000_000_000;

/// Sorted temporal IDs for one snapshot, with gaps so some queries miss.
fn snapshot_ids(snap: i64, count: usize) -> Vec<i64> {
    (0..count as i64).map(|i| snap * MULTIPLIER + 1 + 3 * i).collect()
}

/// Pseudo-random queries in the ID range, deterministic across runs.
fn queries(snap: i64, count: usize, span: usize) -> Vec<i64> {
    let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
    (0..count)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            snap * MULTIPLIER + (state % (3 * span as u64)) as i64
        })
        .collect()
}

fn bench_strategies(c: &mut Criterion) {
    let keys = snapshot_ids(42, 200_000);
    let mut group = c.benchmark_group("matcher_resolve");
    for &n in &[100usize, 250, 1_000, 50_000] {
        let q = queries(42, n, keys.len());
        for (name, strategy) in [("scalar", SearchStrategy::Scalar), ("batch", SearchStrategy::Batch)] {
            group.bench_with_input(BenchmarkId::new(name, n), &q, |b, q| {
                b.iter(|| resolve(black_box(q), black_box(&keys), true, strategy))
            });
        }
    }
    group.finish();
}

fn bench_rank(c: &mut Criterion) {
    let masses: Vec<f64> = (0..500).map(|i| ((i * 7919) % 1000) as f64 * 1.0e9).collect();
    c.bench_function("rank_500_peers", |b| b.iter(|| rank(black_box(&masses))));
}

criterion_group!(benches, bench_strategies, bench_rank);
criterion_main!(benches);
