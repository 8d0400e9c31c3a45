//! Sub-transaction and snapshot benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use domobj_bench::utils::{customer_ids, random_name, root_transaction, seeded_storage};
use domobj_core::{ClientTransaction, Config};
use domobj_testkit::sales_mapping;

/// Benchmark creating and discarding an empty sub-transaction.
fn bench_sub_transaction_lifecycle(c: &mut Criterion) {
    let storage = seeded_storage(1, 0);
    let tx = root_transaction(&storage, Config::default());

    c.bench_function("sub_transaction_lifecycle", |b| {
        b.iter(|| {
            let sub = tx.create_sub_transaction().unwrap();
            black_box(sub.discard().unwrap());
        });
    });
}

/// Benchmark committing changes from a sub-transaction into its parent.
fn bench_sub_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("sub_commit");

    for changed in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*changed as u64));
        group.bench_with_input(BenchmarkId::from_parameter(changed), changed, |b, &changed| {
            let storage = seeded_storage(changed, 0);
            let tx = root_transaction(&storage, Config::default());
            let ids = customer_ids(changed);
            tx.get_objects(&ids).unwrap();

            b.iter(|| {
                let sub = tx.create_sub_transaction().unwrap();
                for customer in sub.get_objects(&ids).unwrap() {
                    sub.set_property(&customer, "Name", random_name(8)).unwrap();
                }
                sub.commit().unwrap();
                sub.discard().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark reading through a chain of nested sub-transactions.
fn bench_nested_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_read");

    for depth in [1usize, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let storage = seeded_storage(100, 0);
            let ids = customer_ids(100);
            b.iter(|| {
                let mut tx = root_transaction(&storage, Config::default());
                for _ in 0..depth {
                    tx = tx.create_sub_transaction().unwrap();
                }
                let objects = tx.get_objects(black_box(&ids)).unwrap();
                black_box(objects);
            });
        });
    }
    group.finish();
}

/// Benchmark writing and restoring snapshots.
fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    let storage = seeded_storage(200, 2);
    let tx = root_transaction(&storage, Config::default());
    for customer in tx.get_objects(&customer_ids(200)).unwrap() {
        tx.get_related_objects(&customer, "Orders").unwrap();
        tx.set_property(&customer, "Rating", 5_i64).unwrap();
    }
    let bytes = tx.to_snapshot_bytes().unwrap();
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("write", |b| {
        b.iter(|| black_box(tx.to_snapshot_bytes().unwrap()));
    });
    group.bench_function("restore", |b| {
        b.iter(|| {
            let restored =
                ClientTransaction::from_snapshot_bytes(black_box(&bytes), sales_mapping(), storage.clone())
                    .unwrap();
            black_box(restored);
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_sub_transaction_lifecycle,
    bench_sub_commit,
    bench_nested_read,
    bench_snapshot,
);

criterion_main!(benches);
