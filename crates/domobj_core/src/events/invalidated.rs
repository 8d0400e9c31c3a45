//! The listener installed on discarded transactions.

use super::ClientTransactionListener;
use crate::commit::CommittingEventRegistrar;
use crate::domain_object::DomainObject;
use crate::end_point::RelatedObjects;
use crate::error::{CoreError, CoreResult};
use crate::persistence::PersistableData;
use crate::query::QueryResult;
use crate::transaction::ClientTransaction;
use crate::types::ValueAccess;
use domobj_codec::{ClassId, ObjectId, Value};

/// Fails every lifecycle event with [`CoreError::TransactionDiscarded`].
///
/// A discarded transaction has all its listeners replaced by this one, so
/// any further use surfaces immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvalidatedTransactionListener;

fn discarded<T>() -> CoreResult<T> {
    Err(CoreError::TransactionDiscarded)
}

impl ClientTransactionListener for InvalidatedTransactionListener {
    fn transaction_initialize(&self, _tx: &ClientTransaction) -> CoreResult<()> {
        discarded()
    }

    fn transaction_discard(&self, _tx: &ClientTransaction) -> CoreResult<()> {
        discarded()
    }

    fn sub_transaction_creating(&self, _tx: &ClientTransaction) -> CoreResult<()> {
        discarded()
    }

    fn sub_transaction_initialize(
        &self,
        _tx: &ClientTransaction,
        _sub: &ClientTransaction,
    ) -> CoreResult<()> {
        discarded()
    }

    fn sub_transaction_created(
        &self,
        _tx: &ClientTransaction,
        _sub: &ClientTransaction,
    ) -> CoreResult<()> {
        discarded()
    }

    fn new_object_creating(&self, _tx: &ClientTransaction, _class_id: &ClassId) -> CoreResult<()> {
        discarded()
    }

    fn objects_loading(&self, _tx: &ClientTransaction, _ids: &[ObjectId]) -> CoreResult<()> {
        discarded()
    }

    fn objects_loaded(&self, _tx: &ClientTransaction, _objects: &[DomainObject]) -> CoreResult<()> {
        discarded()
    }

    fn objects_not_found(&self, _tx: &ClientTransaction, _ids: &[ObjectId]) -> CoreResult<()> {
        discarded()
    }

    fn objects_unloading(
        &self,
        _tx: &ClientTransaction,
        _objects: &[DomainObject],
    ) -> CoreResult<()> {
        discarded()
    }

    fn objects_unloaded(
        &self,
        _tx: &ClientTransaction,
        _objects: &[DomainObject],
    ) -> CoreResult<()> {
        discarded()
    }

    fn object_deleting(&self, _tx: &ClientTransaction, _object: &DomainObject) -> CoreResult<()> {
        discarded()
    }

    fn object_deleted(&self, _tx: &ClientTransaction, _object: &DomainObject) -> CoreResult<()> {
        discarded()
    }

    fn property_value_reading(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
        _property: &str,
        _access: ValueAccess,
    ) -> CoreResult<()> {
        discarded()
    }

    fn property_value_read(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
        _property: &str,
        _value: &Value,
        _access: ValueAccess,
    ) -> CoreResult<()> {
        discarded()
    }

    fn property_value_changing(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
        _property: &str,
        _old_value: &Value,
        _new_value: &Value,
    ) -> CoreResult<()> {
        discarded()
    }

    fn property_value_changed(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
        _property: &str,
        _old_value: &Value,
        _new_value: &Value,
    ) -> CoreResult<()> {
        discarded()
    }

    fn relation_reading(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
        _property: &str,
        _access: ValueAccess,
    ) -> CoreResult<()> {
        discarded()
    }

    fn relation_read(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
        _property: &str,
        _related: &RelatedObjects,
        _access: ValueAccess,
    ) -> CoreResult<()> {
        discarded()
    }

    fn relation_changing(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
        _property: &str,
        _old_related: Option<&DomainObject>,
        _new_related: Option<&DomainObject>,
    ) -> CoreResult<()> {
        discarded()
    }

    fn relation_changed(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
        _property: &str,
        _old_related: Option<&DomainObject>,
        _new_related: Option<&DomainObject>,
    ) -> CoreResult<()> {
        discarded()
    }

    fn committing(
        &self,
        _tx: &ClientTransaction,
        _objects: &[DomainObject],
        _registrar: &CommittingEventRegistrar,
    ) -> CoreResult<()> {
        discarded()
    }

    fn commit_validate(&self, _tx: &ClientTransaction, _data: &[PersistableData]) -> CoreResult<()> {
        discarded()
    }

    fn committed(&self, _tx: &ClientTransaction, _objects: &[DomainObject]) -> CoreResult<()> {
        discarded()
    }

    fn rolling_back(&self, _tx: &ClientTransaction, _objects: &[DomainObject]) -> CoreResult<()> {
        discarded()
    }

    fn rolled_back(&self, _tx: &ClientTransaction, _objects: &[DomainObject]) -> CoreResult<()> {
        discarded()
    }

    fn filter_query_result(
        &self,
        _tx: &ClientTransaction,
        _result: QueryResult,
    ) -> CoreResult<QueryResult> {
        discarded()
    }

    fn object_marked_invalid(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
    ) -> CoreResult<()> {
        discarded()
    }

    fn object_marked_not_invalid(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
    ) -> CoreResult<()> {
        discarded()
    }
}
