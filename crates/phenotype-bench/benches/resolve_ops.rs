//! Criterion micro-benchmarks for resolution, composition and live refresh.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use phenotype_bench::{layered_profile, wide_profile};
use phenotype_compose::{compose_with, ComposeOptions, Definition, ObjectMeta};
use phenotype_core::{refresh, Value};

/// Benchmark: Resolve a 4-level binary tree (31 traits) from scratch.
fn bench_resolve_layered(c: &mut Criterion) {
    let root = layered_profile(4, 2);
    c.bench_function("resolve_layered_4x2", |b| {
        b.iter(|| {
            let table = root.resolve().unwrap();
            black_box(table.members().len());
        });
    });
}

/// Benchmark: Resolve one trait with 256 own members.
fn bench_resolve_wide(c: &mut Criterion) {
    let wide = wide_profile(256);
    c.bench_function("resolve_wide_256", |b| {
        b.iter(|| black_box(wide.resolve().unwrap()));
    });
}

/// Benchmark: Instantiate with and without a materialized prototype.
fn bench_instantiate(c: &mut Criterion) {
    let root = layered_profile(3, 2);
    c.bench_function("instantiate_layered_3x2", |b| {
        b.iter(|| black_box(root.instantiate().unwrap()));
    });

    root.materialize().unwrap();
    c.bench_function("instantiate_materialized_3x2", |b| {
        b.iter(|| black_box(root.instantiate().unwrap()));
    });
    root.dematerialize();
}

/// Benchmark: Compose with an object-level definition overriding one member.
fn bench_compose_with_definition(c: &mut Criterion) {
    let root = layered_profile(3, 2);
    let options = ComposeOptions::new();
    c.bench_function("compose_with_definition", |b| {
        b.iter(|| {
            let definition = Definition::new().with("tag", "object");
            let obj = compose_with(std::slice::from_ref(&root), Some(definition), &options)
                .unwrap();
            black_box(obj.get("tag"));
        });
    });
}

/// Benchmark: Edit a leaf trait, then refresh 100 frozen objects.
fn bench_refresh_frozen(c: &mut Criterion) {
    let leaf = wide_profile(16);
    let objects: Vec<_> = (0..100).map(|_| leaf.instantiate().unwrap()).collect();
    let mut n = 0i64;
    c.bench_function("refresh_frozen_100", |b| {
        b.iter(|| {
            n += 1;
            leaf.define("counter", n);
            refresh(&objects).unwrap();
            black_box(objects[0].get("counter"));
        });
    });
}

/// Benchmark: Member lookup on a live object after an upstream edit.
fn bench_live_lookup(c: &mut Criterion) {
    let leaf = wide_profile(16);
    let obj = compose_with(std::slice::from_ref(&leaf), None, &ComposeOptions::live()).unwrap();
    let mut n = 0i64;
    c.bench_function("live_lookup_after_edit", |b| {
        b.iter(|| {
            n += 1;
            leaf.define("counter", n);
            black_box(obj.get("counter"));
        });
    });
    assert_eq!(obj.get("counter"), Some(Value::from(n)));
    assert!(ObjectMeta::of(&obj).is_some());
}

criterion_group!(
    benches,
    bench_resolve_layered,
    bench_resolve_wide,
    bench_instantiate,
    bench_compose_with_definition,
    bench_refresh_frozen,
    bench_live_lookup
);
criterion_main!(benches);
