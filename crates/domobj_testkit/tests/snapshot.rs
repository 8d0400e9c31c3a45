//! Snapshots of transaction hierarchies over seeded storage.

use domobj_core::{ClientTransaction, CoreError, Value};
use domobj_storage::{StorageError, StorageProvider};
use domobj_testkit::prelude::*;
use std::sync::Arc;

fn restore(fixture: &SalesFixture, bytes: &[u8]) -> ClientTransaction {
    ClientTransaction::from_snapshot_bytes(bytes, Arc::clone(&fixture.mapping), fixture.provider())
        .unwrap()
}

#[test]
fn restored_changes_can_be_committed() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let acme = tx.get_object(&fixture.acme).unwrap();
    let order2 = tx.get_object(&fixture.order2).unwrap();
    let globex = tx.get_object(&fixture.globex).unwrap();
    tx.set_property(&acme, "Rating", 4_i64).unwrap();
    tx.set_related_object(&order2, "Customer", Some(&globex)).unwrap();

    let restored = restore(&fixture, &tx.to_snapshot_bytes().unwrap());
    drop(tx);

    let acme = restored.get_object(&fixture.acme).unwrap();
    assert_eq!(restored.get_property(&acme, "Rating").unwrap(), Value::from(4_i64));
    assert_eq!(restored.get_original_property(&acme, "Rating").unwrap(), Value::from(3_i64));
    let globex = restored.get_object(&fixture.globex).unwrap();
    assert_eq!(restored.get_related_objects(&globex, "Orders").unwrap().len(), 1);

    restored.commit().unwrap();
    let stored_order2 = fixture.storage.load(&fixture.order2).unwrap().unwrap();
    assert_eq!(*stored_order2.get("Customer"), Value::from(fixture.globex.clone()));
}

#[test]
fn restored_timestamps_still_detect_conflicts() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let acme = tx.get_object(&fixture.acme).unwrap();
    tx.set_property(&acme, "Name", "Snapshot").unwrap();
    let bytes = tx.to_snapshot_bytes().unwrap();

    let writer = fixture.root_transaction();
    let other = writer.get_object(&fixture.acme).unwrap();
    writer.set_property(&other, "Name", "Writer").unwrap();
    writer.commit().unwrap();

    let restored = restore(&fixture, &bytes);
    assert!(matches!(
        restored.commit(),
        Err(CoreError::Storage(StorageError::ConcurrencyViolation { .. }))
    ));
}

#[test]
fn a_sub_transaction_snapshot_keeps_its_parent() {
    let fixture = SalesFixture::new();
    let root = fixture.root_transaction();
    let acme = root.get_object(&fixture.acme).unwrap();
    root.set_property(&acme, "Name", "Parent").unwrap();
    root.application_data().insert("user", "miller");
    let sub = root.create_sub_transaction().unwrap();
    let sub_acme = sub.get_object(&fixture.acme).unwrap();
    sub.set_property(&sub_acme, "Rating", 5_i64).unwrap();
    let order = sub.new_object("Order").unwrap();

    let restored = restore(&fixture, &sub.to_snapshot_bytes().unwrap());
    let parent = restored.parent_transaction().cloned().unwrap();

    let acme = restored.get_object(&fixture.acme).unwrap();
    assert_eq!(restored.get_property(&acme, "Rating").unwrap(), Value::from(5_i64));
    assert_eq!(restored.get_original_property(&acme, "Name").unwrap(), Value::from("Parent"));
    assert!(restored.object_state(&restored.get_object(order.id()).unwrap()).unwrap().is_new());
    assert!(parent.invalid_objects().is_invalid(order.id()));
    assert_eq!(restored.application_data().get("user"), Some(Value::from("miller")));

    let order = restored.get_object(order.id()).unwrap();
    restored.set_related_object(&order, "Customer", Some(&acme)).unwrap();
    restored.commit().unwrap();
    restored.discard().unwrap();
    parent.commit().unwrap();
    assert!(fixture.storage.load(order.id()).unwrap().is_some());
}

#[test]
fn objects_created_in_a_sub_transaction_survive_a_round_trip() {
    let fixture = SalesFixture::new();
    let root = fixture.root_transaction();
    let sub = root.create_sub_transaction().unwrap();
    let order = sub.new_object("Order").unwrap();
    sub.set_property(&order, "OrderNumber", 42_i64).unwrap();

    let restored = restore(&fixture, &sub.to_snapshot_bytes().unwrap());
    let parent = restored.parent_transaction().cloned().unwrap();

    assert!(!restored.invalid_objects().is_invalid(order.id()));
    assert!(parent.invalid_objects().is_invalid(order.id()));
    let order = restored.get_object(order.id()).unwrap();
    assert!(restored.object_state(&order).unwrap().is_new());
    assert_eq!(restored.get_property(&order, "OrderNumber").unwrap(), Value::from(42_i64));
}
