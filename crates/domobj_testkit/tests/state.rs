//! Object state invariants, and the states objects report in transactions.

use domobj_codec::{from_cbor, to_cbor};
use domobj_core::{is_commit_relevant, DomainObjectState};
use domobj_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #[test]
    fn unchanged_iff_no_primary_facet(flags in state_flags_strategy()) {
        let state = flags.build();
        let any_primary = flags.new || flags.changed || flags.deleted || flags.invalid || flags.not_loaded_yet;
        prop_assert_eq!(state.is_unchanged(), !any_primary);
    }

    #[test]
    fn data_sub_flags_never_imply_changed(flags in state_flags_strategy()) {
        let state = StateFlags { changed: false, ..flags }.build();
        prop_assert!(!state.is_changed());
        prop_assert_eq!(
            state.is_data_changed(),
            flags.persistent_data_changed || flags.non_persistent_data_changed
        );
    }

    #[test]
    fn cbor_round_trip_keeps_every_facet(flags in state_flags_strategy()) {
        let state = flags.build();
        let bytes = to_cbor(&state).unwrap();
        let decoded: DomainObjectState = from_cbor(&bytes).unwrap();
        prop_assert_eq!(decoded, state);
        prop_assert_eq!(decoded.is_relation_changed(), flags.relation_changed);
        prop_assert_eq!(decoded.is_new_in_hierarchy(), flags.new_in_hierarchy);
    }
}

#[test]
fn has_changed_truth_table() {
    let b = DomainObjectState::builder;
    let cases = [
        (b().set_new().build(), true),
        (b().set_changed().build(), true),
        (b().set_deleted().build(), true),
        (b().set_changed().set_deleted().build(), true),
        (b().set_changed().set_not_loaded_yet().build(), true),
        (b().build(), false),
        (b().set_invalid().build(), false),
        (b().set_not_loaded_yet().build(), false),
    ];
    for (state, expected) in cases {
        assert_eq!(is_commit_relevant(state), expected, "{state}");
    }
}

#[test]
fn states_follow_the_object_lifecycle() {
    with_sales_transaction(|fixture, tx| {
        let reference = tx.get_object_reference(&fixture.globex).unwrap();
        assert!(tx.object_state(&reference).unwrap().is_not_loaded_yet());

        let globex = tx.get_object(&fixture.globex).unwrap();
        assert!(globex.ptr_eq(&reference));
        assert!(tx.object_state(&globex).unwrap().is_unchanged());

        tx.set_property(&globex, "Rating", 5_i64).unwrap();
        let state = tx.object_state(&globex).unwrap();
        assert!(state.is_changed());
        assert!(state.is_persistent_data_changed());
        assert!(!state.is_relation_changed());

        tx.set_property(&globex, "Rating", 1_i64).unwrap();
        assert!(tx.object_state(&globex).unwrap().is_unchanged());

        tx.delete(&globex).unwrap();
        assert!(tx.object_state(&globex).unwrap().is_deleted());
    });
}

#[test]
fn transaction_only_properties_are_non_persistent_changes() {
    with_sales_transaction(|fixture, tx| {
        let acme = tx.get_object(&fixture.acme).unwrap();
        tx.set_property(&acme, "Visits", 4_i64).unwrap();
        let state = tx.object_state(&acme).unwrap();
        assert!(state.is_changed());
        assert!(state.is_non_persistent_data_changed());
        assert!(!state.is_persistent_data_changed());
    });
}

#[test]
fn relation_changes_mark_both_sides() {
    with_sales_transaction(|fixture, tx| {
        let globex = tx.get_object(&fixture.globex).unwrap();
        let order = tx.get_object(&fixture.order2).unwrap();
        tx.set_related_object(&order, "Customer", Some(&globex)).unwrap();

        let order_state = tx.object_state(&order).unwrap();
        assert!(order_state.is_changed());
        assert!(order_state.is_relation_changed());
        assert!(!order_state.is_data_changed());
        assert!(tx.object_state(&globex).unwrap().is_relation_changed());
    });
}

#[test]
fn register_for_commit_marks_unchanged_objects() {
    with_sales_transaction(|fixture, tx| {
        let acme = tx.get_object(&fixture.acme).unwrap();
        tx.register_for_commit(&acme).unwrap();
        let state = tx.object_state(&acme).unwrap();
        assert!(state.is_changed());
        assert!(!state.is_data_changed());

        let created = tx.new_object("Supplier").unwrap();
        tx.register_for_commit(&created).unwrap();
        assert!(tx.object_state(&created).unwrap().is_new());

        let globex = tx.get_object(&fixture.globex).unwrap();
        tx.delete(&globex).unwrap();
        assert!(matches!(
            tx.register_for_commit(&globex),
            Err(domobj_core::CoreError::ObjectDeleted { .. })
        ));
    });
}
