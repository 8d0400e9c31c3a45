//! Ambient transaction scopes.

use domobj_core::{ambient, ClientTransactionScope, CoreError, ScopeLeaveBehavior, Value};
use domobj_testkit::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};

#[test]
fn leaving_restores_the_previous_current_transaction() {
    let fixture = SalesFixture::new();
    let outer = fixture.root_transaction();
    let inner = fixture.root_transaction();

    let mut outer_scope = outer.enter_non_discarding_scope().unwrap();
    assert_eq!(ambient::current_transaction().unwrap(), outer);

    let mut inner_scope = inner.enter_non_discarding_scope().unwrap();
    assert_eq!(ambient::current_transaction().unwrap(), inner);
    inner_scope.leave().unwrap();

    assert_eq!(ambient::current_transaction().unwrap(), outer);
    outer_scope.leave().unwrap();
    assert!(matches!(
        ambient::current_transaction(),
        Err(CoreError::NoCurrentTransaction)
    ));
}

#[test]
fn scope_is_left_when_the_action_fails() {
    let fixture = SalesFixture::new();
    let outer = fixture.root_transaction();
    let tx = fixture.root_transaction();
    let mut outer_scope = outer.enter_non_discarding_scope().unwrap();

    let result = tx.execute_in_scope(|tx| {
        assert_eq!(ambient::current_transaction().unwrap(), *tx);
        tx.get_object(&object_id("Customer", 99))
    });
    assert!(matches!(result, Err(CoreError::ObjectsNotFound { .. })));
    assert_eq!(ambient::current_transaction().unwrap(), outer);
    outer_scope.leave().unwrap();
}

#[test]
fn scope_is_left_when_the_action_panics() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    assert!(ClientTransactionScope::current_transaction().is_none());

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _scope = tx.enter_non_discarding_scope().unwrap();
        panic!("boom");
    }));
    assert!(outcome.is_err());
    assert!(ClientTransactionScope::current_transaction().is_none());
}

#[test]
fn ambient_helpers_use_the_current_transaction() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    assert!(matches!(
        ambient::get_object(None, &fixture.acme),
        Err(CoreError::NoCurrentTransaction)
    ));

    let mut scope = tx.enter_non_discarding_scope().unwrap();
    let acme = ambient::get_object(None, &fixture.acme).unwrap();
    assert_eq!(tx.get_property(&acme, "Name").unwrap(), Value::from("Acme"));
    let official = ambient::new_object(None, "Official").unwrap();
    assert!(tx.object_state(&official).unwrap().is_new());
    assert!(ambient::try_get_object(None, &object_id("Order", 42))
        .unwrap()
        .is_none());
    scope.leave().unwrap();

    let other = fixture.root_transaction();
    let explicit = ambient::get_object(Some(&other), &fixture.acme).unwrap();
    assert!(!explicit.ptr_eq(&acme));
}

#[test]
fn null_scope_hides_the_outer_transaction() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let mut scope = tx.enter_non_discarding_scope().unwrap();
    {
        let mut null = ClientTransactionScope::enter_null_scope();
        assert!(!ClientTransactionScope::has_current_transaction());
        null.leave().unwrap();
    }
    assert!(ClientTransactionScope::has_current_transaction());
    scope.leave().unwrap();
}

#[test]
fn rollback_scope_undoes_changes() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let acme = tx.get_object(&fixture.acme).unwrap();
    let mut scope = tx.enter_scope(ScopeLeaveBehavior::Rollback).unwrap();
    assert_eq!(scope.leave_behavior(), ScopeLeaveBehavior::Rollback);
    tx.set_property(&acme, "Name", "Changed").unwrap();
    scope.leave().unwrap();

    assert_eq!(tx.get_property(&acme, "Name").unwrap(), Value::from("Acme"));
    assert!(!tx.has_changed());
}

#[test]
fn leave_behavior_can_be_changed_before_leaving() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let mut scope = tx.enter_discarding_scope().unwrap();
    scope.set_leave_behavior(ScopeLeaveBehavior::None);
    scope.leave().unwrap();
    assert!(!tx.is_discarded());
}

#[test]
fn dropping_a_discarding_scope_discards() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    {
        let _scope = tx.enter_discarding_scope().unwrap();
    }
    assert!(tx.is_discarded());
    assert!(matches!(
        tx.enter_non_discarding_scope(),
        Err(CoreError::TransactionDiscarded)
    ));
}

#[test]
fn scopes_are_left_innermost_first() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let mut outer = tx.enter_non_discarding_scope().unwrap();
    let mut inner = tx.enter_non_discarding_scope().unwrap();
    assert!(matches!(outer.leave(), Err(CoreError::InvalidOperation { .. })));
    inner.leave().unwrap();
    outer.leave().unwrap();
    assert!(matches!(inner.leave(), Err(CoreError::InvalidOperation { .. })));
}

#[test]
fn scopes_are_thread_local() {
    let fixture = SalesFixture::new();
    let tx = fixture.root_transaction();
    let mut scope = tx.enter_non_discarding_scope().unwrap();
    let seen = std::thread::spawn(ClientTransactionScope::has_current_transaction)
        .join()
        .unwrap();
    assert!(!seen);
    scope.leave().unwrap();
}

#[test]
fn dropping_an_outer_scope_first_keeps_the_inner_one_current() {
    let fixture = SalesFixture::new();
    let outer = fixture.root_transaction();
    let inner = fixture.root_transaction();

    let outer_scope = outer.enter_non_discarding_scope().unwrap();
    let mut inner_scope = inner.enter_non_discarding_scope().unwrap();
    drop(outer_scope);
    assert_eq!(ambient::current_transaction().unwrap(), inner);

    inner_scope.leave().unwrap();
    assert!(matches!(
        ambient::current_transaction(),
        Err(CoreError::NoCurrentTransaction)
    ));
}
