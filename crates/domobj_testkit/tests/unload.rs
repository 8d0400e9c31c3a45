//! Unloading data and end-points.

use domobj_core::{CoreError, EndPointLoadState, RelationEndPointId, Value};
use domobj_testkit::prelude::*;

#[test]
fn unloaded_data_is_reloaded_from_storage() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let log = EventLog::new();
    tx.extensions()
        .add(RecordingExtension::new("ext", &log).into_arc())
        .unwrap();
    let acme = tx.get_object(&fixture.acme).unwrap();
    log.clear();

    assert!(tx.unload_data(&fixture.acme).unwrap());
    assert_eq!(log.entries(), vec![
        "ext.objects_unloading(Customer/1)",
        "ext.objects_unloaded(Customer/1)",
    ]);
    assert!(!tx.data_manager().is_loaded(&fixture.acme));
    assert!(tx.object_state(&acme).unwrap().is_not_loaded_yet());

    let writer = fixture.root_transaction();
    let other = writer.get_object(&fixture.acme).unwrap();
    writer.set_property(&other, "Name", "Acme AG").unwrap();
    writer.commit().unwrap();

    assert_eq!(tx.get_property(&acme, "Name").unwrap(), Value::from("Acme AG"));
    assert!(tx.get_object(&fixture.acme).unwrap().ptr_eq(&acme));
}

#[test]
fn unloading_nothing_returns_false() {
    with_sales_transaction(|fixture, tx| {
        assert!(!tx.unload_data(&fixture.globex).unwrap());
        let end_point = RelationEndPointId::new(fixture.globex.clone(), "Orders");
        assert!(!tx.unload_virtual_end_point(&end_point).unwrap());
    });
}

#[test]
fn changed_data_cannot_be_unloaded() {
    with_sales_transaction(|fixture, tx| {
        let acme = tx.get_object(&fixture.acme).unwrap();
        tx.set_property(&acme, "Rating", 1_i64).unwrap();
        assert!(matches!(
            tx.unload_data(&fixture.acme),
            Err(CoreError::InvalidOperation { .. })
        ));

        let official = tx.new_object("Official").unwrap();
        assert!(matches!(
            tx.unload_data(official.id()),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(tx.data_manager().is_loaded(&fixture.acme));
    });
}

#[test]
fn a_vetoed_unload_keeps_the_data() {
    with_sales_transaction(|fixture, tx| {
        let log = EventLog::new();
        tx.extensions()
            .add(RecordingExtension::new("ext", &log).vetoing("objects_unloading").into_arc())
            .unwrap();
        tx.get_object(&fixture.acme).unwrap();

        assert!(matches!(
            tx.unload_data(&fixture.acme),
            Err(CoreError::ExtensionVeto { .. })
        ));
        assert!(tx.data_manager().is_loaded(&fixture.acme));
    });
}

#[test]
fn unchanged_end_points_can_be_unloaded() {
    with_sales_transaction(|fixture, tx| {
        let acme = tx.get_object(&fixture.acme).unwrap();
        let end_point = RelationEndPointId::new(fixture.acme.clone(), "Orders");
        assert_eq!(tx.get_related_objects(&acme, "Orders").unwrap().len(), 2);

        assert!(tx.unload_virtual_end_point(&end_point).unwrap());
        assert_eq!(tx.data_manager().end_point_load_state(&end_point), EndPointLoadState::NotLoaded);
        assert_eq!(tx.get_related_objects(&acme, "Orders").unwrap().len(), 2);
    });
}

#[test]
fn changed_and_real_end_points_stay() {
    with_sales_transaction(|fixture, tx| {
        let acme = tx.get_object(&fixture.acme).unwrap();
        let order2 = tx.get_object(&fixture.order2).unwrap();
        tx.remove_related_object(&acme, "Orders", &order2).unwrap();

        let orders = RelationEndPointId::new(fixture.acme.clone(), "Orders");
        assert!(matches!(
            tx.unload_virtual_end_point(&orders),
            Err(CoreError::InvalidOperation { .. })
        ));
        let customer = RelationEndPointId::new(fixture.order1.clone(), "Customer");
        assert!(matches!(
            tx.unload_virtual_end_point(&customer),
            Err(CoreError::InvalidArgument { .. })
        ));

        let official = tx.new_object("Official").unwrap();
        tx.get_related_objects(&official, "Orders").unwrap();
        let new_orders = RelationEndPointId::new(official.id().clone(), "Orders");
        assert!(matches!(
            tx.unload_virtual_end_point(&new_orders),
            Err(CoreError::InvalidOperation { .. })
        ));
    });
}

#[test]
fn unloading_needs_an_active_transaction() {
    with_sales_transaction(|fixture, tx| {
        tx.get_object(&fixture.acme).unwrap();
        let _sub = tx.create_sub_transaction().unwrap();
        assert!(matches!(
            tx.unload_data(&fixture.acme),
            Err(CoreError::TransactionInactive { .. })
        ));
    });
}
