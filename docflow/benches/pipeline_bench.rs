//! Benchmarks for resolver and splitter throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use docflow::core::StageSpec;
use docflow::registry::StageRegistry;
use docflow::split::plan_split;

fn wide_registry(stages: usize) -> StageRegistry {
    let mut registry = StageRegistry::new();
    registry
        .register(StageSpec::new("root").with_output("seed"))
        .unwrap();
    for i in 0..stages {
        registry
            .register(
                StageSpec::new(format!("stage-{i}"))
                    .with_input("seed")
                    .with_output(format!("kind-{i}")),
            )
            .unwrap();
    }
    registry
}

fn resolver_benchmark(c: &mut Criterion) {
    let registry = wide_registry(100);
    c.bench_function("resolve_100_stages", |b| {
        b.iter(|| black_box(&registry).resolve().unwrap())
    });
}

fn splitter_benchmark(c: &mut Criterion) {
    let mut lines = Vec::new();
    for section in 0..40 {
        lines.push(format!("# Section {section}"));
        for i in 0..99 {
            lines.push(format!("content line {i}"));
        }
    }
    let content = lines.join("\n");

    c.bench_function("plan_split_4000_lines", |b| {
        b.iter(|| plan_split(black_box(&content), 1500, 0.10))
    });
}

criterion_group!(benches, resolver_benchmark, splitter_benchmark);
criterion_main!(benches);
