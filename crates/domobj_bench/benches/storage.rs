//! Storage provider benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use domobj_bench::utils::{customer_ids, generate_records, seeded_storage};
use domobj_codec::ClassId;
use domobj_storage::{FileStorage, RecordQuery, RecordWrite, StorageProvider};
use std::collections::BTreeMap;
use tempfile::TempDir;

/// Benchmark batched record loads.
fn bench_load_many(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_many");

    for count in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let storage = seeded_storage(count, 0);
            let ids = customer_ids(count);
            b.iter(|| black_box(storage.load_many(black_box(&ids)).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark filtered queries.
fn bench_query(c: &mut Criterion) {
    let storage = seeded_storage(1000, 3);
    let query = RecordQuery::by_property(
        vec![ClassId::new("Order")],
        "Customer",
        customer_ids(500).pop().unwrap(),
    );

    c.bench_function("storage_query", |b| {
        b.iter(|| black_box(storage.query(black_box(&query)).unwrap()));
    });
}

/// Benchmark file storage commits, which rewrite the whole snapshot.
fn bench_file_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_commit");
    group.sample_size(20);

    for existing in [100usize, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(existing), existing, |b, &existing| {
            let temp_dir = TempDir::new().unwrap();
            let storage = FileStorage::open(&temp_dir.path().join("bench.cbor")).unwrap();
            let mut session = storage.begin().unwrap();
            let writes: Vec<RecordWrite> = generate_records(existing, 0)
                .into_iter()
                .map(|record| RecordWrite::Insert {
                    id: record.id,
                    properties: record.properties,
                })
                .collect();
            session.save(&writes).unwrap();
            session.commit().unwrap();
            drop(session);

            b.iter(|| {
                let id = storage.new_object_id(&ClassId::new("Official")).unwrap();
                let mut session = storage.begin().unwrap();
                session
                    .save(&[RecordWrite::Insert {
                        id,
                        properties: BTreeMap::new(),
                    }])
                    .unwrap();
                session.commit().unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_load_many, bench_query, bench_file_commit);
criterion_main!(benches);
