//! Commit and rollback of root transactions.

use domobj_core::{
    ClientTransaction, ClientTransactionExtension, CommittingEventRegistrar, Config, CoreError,
    CoreResult, DomainObject, Value,
};
use domobj_storage::{StorageError, StorageProvider};
use domobj_testkit::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn stored(fixture: &SalesFixture, id: &domobj_core::ObjectId, name: &str) -> Value {
    fixture
        .storage
        .load(id)
        .unwrap()
        .expect("record exists")
        .get(name)
        .clone()
}

#[test]
fn committing_a_new_object_inserts_it() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction_with(Config::new().commit_validation(false));
    let log = EventLog::new();
    tx.extensions()
        .add(RecordingExtension::new("ext", &log).into_arc())
        .unwrap();

    let official = tx.new_object("Official").unwrap();
    tx.set_property(&official, "Name", "Baker").unwrap();
    tx.commit().unwrap();

    let entry = short_id(official.id());
    assert_eq!(log.entries_starting_with("ext.commit"), vec![
        format!("ext.committing({entry})"),
        format!("ext.commit_validate({entry})"),
        format!("ext.committed({entry})"),
    ]);
    let state = tx.object_state(&official).unwrap();
    assert!(state.is_unchanged());
    assert!(!tx.has_changed());
    assert_eq!(stored(&fixture, official.id(), "Name"), Value::from("Baker"));
}

#[test]
fn committing_a_change_updates_storage_and_resets_state() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let acme = tx.get_object(&fixture.acme).unwrap();

    tx.set_property(&acme, "Rating", 5_i64).unwrap();
    assert!(tx.has_changed());
    tx.commit().unwrap();

    assert!(tx.object_state(&acme).unwrap().is_unchanged());
    assert_eq!(tx.get_original_property(&acme, "Rating").unwrap(), Value::from(5_i64));
    assert_eq!(stored(&fixture, &fixture.acme, "Rating"), Value::from(5_i64));

    // The container carries the new timestamp, so a second commit passes.
    tx.set_property(&acme, "Rating", 6_i64).unwrap();
    tx.commit().unwrap();
    assert_eq!(stored(&fixture, &fixture.acme, "Rating"), Value::from(6_i64));
}

#[test]
fn transaction_only_properties_are_not_stored() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let acme = tx.get_object(&fixture.acme).unwrap();

    tx.set_property(&acme, "Visits", 4_i64).unwrap();
    tx.commit().unwrap();

    let record = fixture.storage.load(&fixture.acme).unwrap().unwrap();
    assert_eq!(*record.get("Visits"), Value::Null);
    assert_eq!(tx.get_property(&acme, "Visits").unwrap(), Value::from(4_i64));
}

#[test]
fn committing_a_deletion_removes_the_record() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let acme = tx.get_object(&fixture.acme).unwrap();
    let order2 = tx.get_object(&fixture.order2).unwrap();

    tx.delete(&order2).unwrap();
    assert_eq!(tx.get_related_objects(&acme, "Orders").unwrap().len(), 1);
    tx.commit().unwrap();

    assert!(fixture.storage.load(&fixture.order2).unwrap().is_none());
    assert!(tx.invalid_objects().is_invalid(&fixture.order2));
    assert!(tx.object_state(&order2).unwrap().is_invalid());
    assert!(matches!(
        tx.get_property(&order2, "OrderNumber"),
        Err(CoreError::ObjectInvalid { .. })
    ));
}

#[test]
fn rollback_restores_a_deleted_object() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let acme = tx.get_object(&fixture.acme).unwrap();
    let order2 = tx.get_object(&fixture.order2).unwrap();

    tx.delete(&order2).unwrap();
    assert!(tx.object_state(&order2).unwrap().is_deleted());
    tx.rollback().unwrap();

    assert!(tx.object_state(&order2).unwrap().is_unchanged());
    assert_eq!(
        tx.get_property(&order2, "OrderNumber").unwrap(),
        tx.get_original_property(&order2, "OrderNumber").unwrap()
    );
    assert_eq!(tx.get_related_objects(&acme, "Orders").unwrap().len(), 2);
    assert!(!tx.has_changed());
}

#[test]
fn rollback_invalidates_new_objects() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let log = EventLog::new();
    RecordingListener::new("listener", &log).install(&tx);

    let official = tx.new_object("Official").unwrap();
    tx.rollback().unwrap();

    assert!(tx.object_state(&official).unwrap().is_invalid());
    assert!(log.contains(&format!("listener.object_marked_invalid({})", short_id(official.id()))));
    assert!(matches!(
        tx.get_property(&official, "Name"),
        Err(CoreError::ObjectInvalid { .. })
    ));
}

#[test]
fn rollback_events_exclude_discarded_objects() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let log = EventLog::new();
    tx.extensions()
        .add(RecordingExtension::new("ext", &log).into_arc())
        .unwrap();
    let acme = tx.get_object(&fixture.acme).unwrap();
    tx.set_property(&acme, "Rating", 9_i64).unwrap();
    let official = tx.new_object("Official").unwrap();

    tx.rollback().unwrap();

    let rolling = log.entries_starting_with("ext.rolling_back");
    assert_eq!(rolling.len(), 1);
    assert!(rolling[0].contains("Customer/1"));
    assert!(rolling[0].contains(&short_id(official.id())));
    assert_eq!(log.entries_starting_with("ext.rolled_back"), vec![
        "ext.rolled_back(Customer/1)".to_owned()
    ]);
}

#[test]
fn stale_data_causes_a_concurrency_violation() {
    let fixture = SalesFixture::new();
    let first = fixture.root_transaction();
    let second = fixture.root_transaction();
    let acme_first = first.get_object(&fixture.acme).unwrap();
    let acme_second = second.get_object(&fixture.acme).unwrap();

    first.set_property(&acme_first, "Name", "First").unwrap();
    second.set_property(&acme_second, "Name", "Second").unwrap();
    first.commit().unwrap();

    let result = second.commit();
    match result {
        Err(CoreError::Storage(StorageError::ConcurrencyViolation { ids })) => {
            assert_eq!(ids, vec![fixture.acme.clone()]);
        }
        other => panic!("expected a concurrency violation, got {other:?}"),
    }
    assert!(second.object_state(&acme_second).unwrap().is_changed());
    assert_eq!(stored(&fixture, &fixture.acme, "Name"), Value::from("First"));
}

#[test]
fn mandatory_relations_are_validated() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let order = tx.new_object("Order").unwrap();
    tx.set_property(&order, "OrderNumber", 3_i64).unwrap();

    match tx.commit() {
        Err(CoreError::MandatoryRelationNotSet { id, property }) => {
            assert_eq!(&id, order.id());
            assert_eq!(property, "Customer");
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
    assert!(tx.object_state(&order).unwrap().is_new());
    assert!(fixture.storage.load(order.id()).unwrap().is_none());

    let globex = tx.get_object(&fixture.globex).unwrap();
    tx.set_related_object(&order, "Customer", Some(&globex)).unwrap();
    tx.commit().unwrap();
    assert_eq!(stored(&fixture, order.id(), "Customer"), Value::from(fixture.globex.clone()));
}

#[test]
fn validation_can_be_disabled() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction_with(Config::new().commit_validation(false));
    let order = tx.new_object("Order").unwrap();
    tx.commit().unwrap();
    assert!(tx.object_state(&order).unwrap().is_unchanged());
}

#[test]
fn a_vetoed_commit_changes_nothing() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let log = EventLog::new();
    tx.extensions()
        .add(RecordingExtension::new("ext", &log).vetoing("committing").into_arc())
        .unwrap();
    let acme = tx.get_object(&fixture.acme).unwrap();
    tx.set_property(&acme, "Rating", 7_i64).unwrap();

    assert!(matches!(tx.commit(), Err(CoreError::ExtensionVeto { .. })));
    assert!(tx.object_state(&acme).unwrap().is_changed());
    assert_eq!(stored(&fixture, &fixture.acme, "Rating"), Value::from(3_i64));
    assert!(log.entries_starting_with("ext.committed").is_empty());
}

/// Touches Globex the first time Acme is committed.
struct Cascade {
    globex: domobj_core::ObjectId,
}

impl ClientTransactionExtension for Cascade {
    fn key(&self) -> &str {
        "cascade"
    }

    fn committing(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
        _registrar: &CommittingEventRegistrar,
    ) -> CoreResult<()> {
        if objects.iter().any(|o| o.id().class_id().as_str() == "Customer" && o.id() != &self.globex) {
            let globex = tx.get_object(&self.globex)?;
            tx.set_property(&globex, "Rating", 2_i64)?;
        }
        Ok(())
    }
}

#[test]
fn objects_changed_while_committing_get_their_own_round() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let log = EventLog::new();
    tx.extensions()
        .add(Arc::new(Cascade {
            globex: fixture.globex.clone(),
        }))
        .unwrap();
    tx.extensions()
        .add(RecordingExtension::new("ext", &log).into_arc())
        .unwrap();
    let acme = tx.get_object(&fixture.acme).unwrap();
    tx.set_property(&acme, "Rating", 4_i64).unwrap();

    tx.commit().unwrap();

    assert_eq!(log.entries_starting_with("ext.committing"), vec![
        "ext.committing(Customer/1)".to_owned(),
        "ext.committing(Customer/2)".to_owned(),
    ]);
    assert_eq!(stored(&fixture, &fixture.globex, "Rating"), Value::from(2_i64));
}

/// Asks for one more `committing` round for everything it sees.
#[derive(Default)]
struct AskAgain {
    rounds: AtomicUsize,
}

impl ClientTransactionExtension for AskAgain {
    fn key(&self) -> &str {
        "ask-again"
    }

    fn committing(
        &self,
        _tx: &ClientTransaction,
        objects: &[DomainObject],
        registrar: &CommittingEventRegistrar,
    ) -> CoreResult<()> {
        if self.rounds.fetch_add(1, Ordering::SeqCst) == 0 {
            registrar.register_for_additional_committing_events(objects)?;
        }
        Ok(())
    }
}

#[test]
fn registered_objects_are_notified_again() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let extension = Arc::new(AskAgain::default());
    tx.extensions().add(extension.clone()).unwrap();
    let acme = tx.get_object(&fixture.acme).unwrap();
    tx.set_property(&acme, "Name", "Acme Corp").unwrap();

    tx.commit().unwrap();

    assert_eq!(extension.rounds.load(Ordering::SeqCst), 2);
}

#[test]
fn read_only_collections_reject_changes() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let official = tx.get_object(&fixture.official).unwrap();
    let order2 = tx.get_object(&fixture.order2).unwrap();

    assert!(matches!(
        tx.add_related_object(&official, "Orders", &order2),
        Err(CoreError::InvalidOperation { .. })
    ));

    tx.set_related_object(&order2, "Official", Some(&official)).unwrap();
    assert_eq!(tx.get_related_objects(&official, "Orders").unwrap().len(), 2);
    tx.commit().unwrap();
    assert_eq!(stored(&fixture, &fixture.order2, "Official"), Value::from(fixture.official.clone()));
}

#[test]
fn committed_events_reach_listeners() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let log = EventLog::new();
    RecordingListener::new("listener", &log).install(&tx);
    let acme = tx.get_object(&fixture.acme).unwrap();
    tx.set_property(&acme, "Name", "Acme Ltd").unwrap();

    tx.commit().unwrap();

    assert!(log.contains("listener.committing(Customer/1)"));
    assert!(log.contains("listener.committed(Customer/1)"));
}
