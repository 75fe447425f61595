use cacher_core::{lock_name_for_member, sanitize, KeyNamespace, QueryFingerprint};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn bench_key_building(c: &mut Criterion) {
    let ns = KeyNamespace::new("shop", "production");

    c.bench_function("keys/object_by_id", |b| {
        b.iter(|| black_box(ns.object_by_id("product", black_box(42u64))))
    });

    c.bench_function("keys/token_with_rewrites", |b| {
        let token = "eyJhbGciOi=J&IUzI1NiJ9.e30=&sig==";
        b.iter(|| black_box(ns.token("access", black_box(token))))
    });

    c.bench_function("keys/bucket_member_lock", |b| {
        b.iter(|| {
            let filter = QueryFingerprint::new()
                .with("query", black_box("desk lamp"))
                .with_opt("category", Some(7));
            let bucket = ns.bucket("product", &filter);
            let page = QueryFingerprint::new().with("page", 3).with("size", 20);
            black_box(lock_name_for_member(&bucket, &page.to_string()))
        })
    });
}

fn bench_sanitize(c: &mut Criterion) {
    let clean = "a".repeat(256);
    let dirty = "a=b&".repeat(64);

    c.bench_function("keys/sanitize_clean", |b| {
        b.iter(|| black_box(sanitize(black_box(&clean))))
    });
    c.bench_function("keys/sanitize_dirty", |b| {
        b.iter(|| black_box(sanitize(black_box(&dirty))))
    });
}

criterion_group!(benches, bench_key_building, bench_sanitize);
criterion_main!(benches);
