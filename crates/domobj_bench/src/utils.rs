//! Benchmark utilities.

use domobj_codec::ObjectId;
use domobj_core::{ClientTransaction, Config};
use domobj_storage::{InMemoryStorage, StoredRecord};
use domobj_testkit::{object_id, sales_mapping};
use rand::Rng;
use std::sync::Arc;

/// Generate a random name of the given length.
pub fn random_name(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

/// Generate `customers` customer records with `orders_per_customer`
/// orders each. Customer keys start at 1, order keys follow on.
pub fn generate_records(customers: usize, orders_per_customer: usize) -> Vec<StoredRecord> {
    let mut rng = rand::thread_rng();
    let mut records = Vec::with_capacity(customers * (orders_per_customer + 1));
    let mut next_order = 1_i64;
    for key in 1..=customers as i64 {
        let customer = object_id("Customer", key);
        records.push(
            StoredRecord::new(customer.clone(), Default::default())
                .with("Name", random_name(12))
                .with("Rating", rng.gen_range(0..10_i64)),
        );
        for _ in 0..orders_per_customer {
            records.push(
                StoredRecord::new(object_id("Order", next_order), Default::default())
                    .with("OrderNumber", next_order)
                    .with("Customer", customer.clone()),
            );
            next_order += 1;
        }
    }
    records
}

/// Customer ids of a store filled by [`generate_records`].
pub fn customer_ids(customers: usize) -> Vec<ObjectId> {
    (1..=customers as i64).map(|key| object_id("Customer", key)).collect()
}

/// In-memory storage seeded with [`generate_records`].
pub fn seeded_storage(customers: usize, orders_per_customer: usize) -> Arc<InMemoryStorage> {
    let storage = Arc::new(InMemoryStorage::new());
    storage.seed(generate_records(customers, orders_per_customer));
    storage
}

/// A root transaction over `storage` with the sales mapping.
pub fn root_transaction(storage: &Arc<InMemoryStorage>, config: Config) -> ClientTransaction {
    ClientTransaction::create_root_transaction_with_config(sales_mapping(), storage.clone(), config)
        .expect("Failed to create root transaction")
}
