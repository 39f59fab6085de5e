use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use flashbox::admission::{AdmissionConfig, AdmissionPolicy};
use flashbox::builder::EngineBuilder;
use flashbox::ds::GhostCache;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const REQUESTS: usize = 50_000;
const UNIVERSE: u64 = 20_000;
const MAX_OBJECT: u64 = 1 << 16;

/// Zipf-like trace: inverse-CDF sampling over a precomputed popularity table,
/// with a fixed size per object id.
fn zipf_trace(seed: u64, theta: f64) -> Vec<(String, u64)> {
    let weights: Vec<f64> = (1..=UNIVERSE).map(|rank| 1.0 / (rank as f64).powf(theta)).collect();
    let total: f64 = weights.iter().sum();
    let mut cdf = Vec::with_capacity(weights.len());
    let mut acc = 0.0;
    for w in weights {
        acc += w / total;
        cdf.push(acc);
    }

    let mut rng = SmallRng::seed_from_u64(seed);
    (0..REQUESTS)
        .map(|_| {
            let u: f64 = rng.random();
            let key = cdf.partition_point(|&p| p < u) as u64;
            let size = 1 + (key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 48) % MAX_OBJECT;
            (format!("obj{key}"), size)
        })
        .collect()
}

fn bench_replay_policies(c: &mut Criterion) {
    let trace = zipf_trace(42, 0.9);
    let mut group = c.benchmark_group("replay");
    group.throughput(Throughput::Elements(REQUESTS as u64));

    for policy in [
        AdmissionPolicy::AdmitAll,
        AdmissionPolicy::Linear,
        AdmissionPolicy::Logarithmic,
        AdmissionPolicy::FixedProbability,
        AdmissionPolicy::FrequencyThreshold,
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(policy), &trace, |b, trace| {
            b.iter_batched(
                || {
                    EngineBuilder::new(64 << 20)
                        .max_box_size(1 << 20)
                        .equal_log_classes(4, MAX_OBJECT)
                        .admission(
                            AdmissionConfig::new(policy, 16 << 20)
                                .epoch(5_000)
                                .k(3)
                                .seed(7),
                        )
                        .build()
                },
                |mut engine| {
                    for (id, size) in trace {
                        std::hint::black_box(engine.request(id, *size));
                    }
                    engine
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_ghost_record_access(c: &mut Criterion) {
    let trace = zipf_trace(7, 0.99);
    c.bench_function("ghost_record_access", |b| {
        b.iter_batched(
            || GhostCache::new(4_096),
            |mut ghost| {
                for (id, _) in &trace {
                    std::hint::black_box(ghost.record_access(id.clone()));
                }
                ghost
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_replay_policies, bench_ghost_record_access);
criterion_main!(benches);
