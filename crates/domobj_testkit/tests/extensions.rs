//! Extension collection behavior and event ordering.

use domobj_core::{
    try_install, ClientTransaction, ClientTransactionExtension,
    ClientTransactionExtensionCollection, CommitValidationExtension, Config, CoreError,
    CoreResult, Query, QueryResult, Value,
};
use domobj_testkit::prelude::*;
use std::sync::Arc;

/// Keeps the first `keep` objects of a query result.
struct Truncate {
    key: &'static str,
    keep: usize,
}

impl ClientTransactionExtension for Truncate {
    fn key(&self) -> &str {
        self.key
    }

    fn filter_query_result(
        &self,
        _tx: &ClientTransaction,
        result: QueryResult,
    ) -> CoreResult<QueryResult> {
        let query = result.query().clone();
        let objects = result.into_objects().into_iter().take(self.keep).collect();
        Ok(QueryResult::new(query, objects))
    }
}

#[test]
fn duplicate_keys_fail_every_time() {
    let log = EventLog::new();
    let collection = ClientTransactionExtensionCollection::new();
    collection
        .add(RecordingExtension::new("Name1", &log).into_arc())
        .unwrap();

    for _ in 0..3 {
        let error = collection
            .add(RecordingExtension::new("Name1", &log).into_arc())
            .unwrap_err();
        assert!(matches!(error, CoreError::DuplicateExtension { ref key } if key == "Name1"));
        assert_eq!(
            error.to_string(),
            "An extension with key 'Name1' is already part of the collection."
        );
    }
    assert_eq!(collection.len(), 1);
}

#[test]
fn try_install_keeps_the_installed_extension() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let first: Arc<dyn ClientTransactionExtension> =
        RecordingExtension::new("audit", &EventLog::new()).into_arc();
    assert!(try_install(Arc::clone(&first), &tx));
    assert!(!try_install(
        RecordingExtension::new("audit", &EventLog::new()).into_arc(),
        &tx
    ));

    let installed = tx.extensions().get("audit").unwrap();
    assert!(Arc::ptr_eq(&installed, &first));
}

#[test]
fn property_changing_reaches_extensions_in_insertion_order() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction_with(Config::new().commit_validation(false));
    let log = EventLog::new();
    tx.extensions()
        .add(RecordingExtension::new("Name1", &log).into_arc())
        .unwrap();
    tx.extensions()
        .add(RecordingExtension::new("Name2", &log).into_arc())
        .unwrap();

    let acme = tx.get_object(&fixture.acme).unwrap();
    log.clear();
    tx.set_property(&acme, "Name", "Acme Corp").unwrap();

    assert_eq!(
        log.entries(),
        vec![
            r#"Name1.property_value_changing(Name:"Acme"->"Acme Corp")"#,
            r#"Name2.property_value_changing(Name:"Acme"->"Acme Corp")"#,
            r#"Name1.property_value_changed(Name:"Acme"->"Acme Corp")"#,
            r#"Name2.property_value_changed(Name:"Acme"->"Acme Corp")"#,
        ]
    );
}

#[test]
fn insert_places_an_extension_before_others() {
    let log = EventLog::new();
    let collection = ClientTransactionExtensionCollection::new();
    collection
        .add(RecordingExtension::new("b", &log).into_arc())
        .unwrap();
    collection
        .insert(0, RecordingExtension::new("a", &log).into_arc())
        .unwrap();
    assert_eq!(collection.keys(), vec!["a", "b"]);
    assert!(collection.remove("a").is_some());
    assert!(collection.remove("a").is_none());
    assert_eq!(collection.keys(), vec!["b"]);
}

#[test]
fn filter_query_result_is_a_pipeline() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let collection = ClientTransactionExtensionCollection::new();
    collection
        .add(Arc::new(Truncate { key: "first", keep: 2 }))
        .unwrap();
    collection
        .add(Arc::new(Truncate { key: "second", keep: 1 }))
        .unwrap();

    let a = tx.get_collection(&Query::all("Company")).unwrap();
    assert_eq!(a.len(), 2);
    let order_a = tx.get_collection(&Query::all("OrderItem")).unwrap();
    let objects = [a.objects(), order_a.objects()].concat();
    let input = QueryResult::new(Query::all("Company"), objects.clone());

    let c = collection.filter_query_result(&tx, input).unwrap();
    assert_eq!(c.len(), 1);
    assert!(c.objects()[0].ptr_eq(&objects[0]));
}

#[test]
fn installed_filters_shape_query_results() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    tx.extensions()
        .add(Arc::new(Truncate { key: "top", keep: 1 }))
        .unwrap();
    assert_eq!(tx.get_collection(&Query::all("Order")).unwrap().len(), 1);
}

#[test]
fn listeners_run_before_extensions() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let log = EventLog::new();
    tx.extensions()
        .add(RecordingExtension::new("ext", &log).into_arc())
        .unwrap();
    RecordingListener::new("listener", &log).install(&tx);

    tx.new_object("Official").unwrap();
    assert_eq!(
        log.entries()[..2],
        [
            "listener.new_object_creating(Official)".to_owned(),
            "ext.new_object_creating(Official)".to_owned(),
        ]
    );
}

#[test]
fn vetoing_changing_event_leaves_value_untouched() {
    with_sales_transaction(|fixture, tx| {
        let log = EventLog::new();
        tx.extensions()
            .add(
                RecordingExtension::new("guard", &log)
                    .vetoing("property_value_changing")
                    .into_arc(),
            )
            .unwrap();
        let acme = tx.get_object(&fixture.acme).unwrap();

        let error = tx.set_property(&acme, "Name", "Other").unwrap_err();
        assert!(matches!(error, CoreError::ExtensionVeto { ref key, .. } if key == "guard"));
        assert_eq!(tx.get_property(&acme, "Name").unwrap(), Value::from("Acme"));
        assert!(!log.contains(r#"guard.property_value_changed(Name:"Acme"->"Other")"#));
    });
}

#[test]
fn vetoing_new_object_creation() {
    with_sales_transaction(|_fixture, tx| {
        tx.extensions()
            .add(
                RecordingExtension::new("no-new", &EventLog::new())
                    .vetoing("new_object_creating")
                    .into_arc(),
            )
            .unwrap();
        assert!(matches!(
            tx.new_object("Order"),
            Err(CoreError::ExtensionVeto { .. })
        ));
        assert!(!tx.has_changed());
    });
}

#[test]
fn root_transactions_carry_commit_validation() {
    let fixture = SalesFixture::new();
    let validated = fixture.root_transaction();
    assert_eq!(validated.extensions().keys(), vec![CommitValidationExtension::KEY]);

    let bare = fixture.root_transaction_with(Config::new().commit_validation(false));
    assert!(bare.extensions().is_empty());
}

#[test]
fn sub_transactions_do_not_inherit_extensions() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let log = EventLog::new();
    tx.extensions()
        .add(RecordingExtension::new("parent", &log).into_arc())
        .unwrap();

    let sub = tx.create_sub_transaction().unwrap();
    assert!(sub.extensions().is_empty());
    assert_eq!(
        log.entries(),
        vec![
            "parent.sub_transaction_creating",
            "parent.sub_transaction_initialize",
            "parent.sub_transaction_created",
        ]
    );
}

/// Installs a recording extension on every sub-transaction it sees.
struct Propagating {
    log: EventLog,
}

impl ClientTransactionExtension for Propagating {
    fn key(&self) -> &str {
        "propagating"
    }

    fn sub_transaction_initialize(
        &self,
        _tx: &ClientTransaction,
        sub: &ClientTransaction,
    ) -> CoreResult<()> {
        sub.extensions()
            .add(RecordingExtension::new("child", &self.log).into_arc())
    }
}

#[test]
fn sub_transaction_initialize_can_install_extensions() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let log = EventLog::new();
    tx.extensions()
        .add(Arc::new(Propagating { log: log.clone() }))
        .unwrap();

    let sub = tx.create_sub_transaction().unwrap();
    assert_eq!(sub.extensions().keys(), vec!["child"]);
    sub.new_object("Official").unwrap();
    assert!(log.contains("child.new_object_creating(Official)"));
}
