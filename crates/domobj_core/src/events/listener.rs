//! The transaction listener interface.

use crate::commit::CommittingEventRegistrar;
use crate::domain_object::DomainObject;
use crate::end_point::RelatedObjects;
use crate::error::CoreResult;
use crate::persistence::PersistableData;
use crate::query::QueryResult;
use crate::transaction::ClientTransaction;
use crate::types::ValueAccess;
use domobj_codec::{ClassId, ObjectId, Value};

/// Infrastructure observer of every lifecycle event of one transaction.
///
/// Listeners are installed by the transaction itself (read-only guards,
/// tracing, the post-discard guard) and run before extensions. Returning
/// an error from a "-ing" event cancels the operation; errors from "-ed"
/// events propagate to the caller after the change has been applied.
///
/// Every method defaults to doing nothing.
#[allow(unused_variables)]
pub trait ClientTransactionListener: Send + Sync {
    /// The transaction has been constructed.
    fn transaction_initialize(&self, tx: &ClientTransaction) -> CoreResult<()> {
        Ok(())
    }

    /// The transaction is being discarded.
    fn transaction_discard(&self, tx: &ClientTransaction) -> CoreResult<()> {
        Ok(())
    }

    /// A sub-transaction is about to be created.
    fn sub_transaction_creating(&self, tx: &ClientTransaction) -> CoreResult<()> {
        Ok(())
    }

    /// A sub-transaction has been constructed but is not yet active.
    fn sub_transaction_initialize(
        &self,
        tx: &ClientTransaction,
        sub: &ClientTransaction,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// A sub-transaction has been created and activated.
    fn sub_transaction_created(
        &self,
        tx: &ClientTransaction,
        sub: &ClientTransaction,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// An object of `class_id` is about to be created.
    fn new_object_creating(&self, tx: &ClientTransaction, class_id: &ClassId) -> CoreResult<()> {
        Ok(())
    }

    /// Objects are about to be loaded.
    fn objects_loading(&self, tx: &ClientTransaction, ids: &[ObjectId]) -> CoreResult<()> {
        Ok(())
    }

    /// Objects have been loaded and registered.
    fn objects_loaded(&self, tx: &ClientTransaction, objects: &[DomainObject]) -> CoreResult<()> {
        Ok(())
    }

    /// Some requested objects do not exist.
    fn objects_not_found(&self, tx: &ClientTransaction, ids: &[ObjectId]) -> CoreResult<()> {
        Ok(())
    }

    /// Objects are about to be unloaded.
    fn objects_unloading(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
    ) -> CoreResult<()> {
        Ok(())
    }

    /// Objects have been unloaded.
    fn objects_unloaded(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
    ) -> CoreResult<()> {
        Ok(())
    }

    /// An object is about to be deleted.
    fn object_deleting(&self, tx: &ClientTransaction, object: &DomainObject) -> CoreResult<()> {
        Ok(())
    }

    /// An object has been deleted.
    fn object_deleted(&self, tx: &ClientTransaction, object: &DomainObject) -> CoreResult<()> {
        Ok(())
    }

    /// A property is about to be read.
    fn property_value_reading(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        access: ValueAccess,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// A property has been read.
    fn property_value_read(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        value: &Value,
        access: ValueAccess,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// A property is about to change.
    fn property_value_changing(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_value: &Value,
        new_value: &Value,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// A property has changed.
    fn property_value_changed(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_value: &Value,
        new_value: &Value,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// A relation is about to be read.
    fn relation_reading(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        access: ValueAccess,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// A relation has been read.
    fn relation_read(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        related: &RelatedObjects,
        access: ValueAccess,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// A relation end-point is about to change.
    fn relation_changing(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_related: Option<&DomainObject>,
        new_related: Option<&DomainObject>,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// A relation end-point has changed.
    fn relation_changed(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_related: Option<&DomainObject>,
        new_related: Option<&DomainObject>,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// Objects are about to be committed.
    fn committing(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
        registrar: &CommittingEventRegistrar,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// The final commit set is about to be persisted.
    fn commit_validate(&self, tx: &ClientTransaction, data: &[PersistableData]) -> CoreResult<()> {
        Ok(())
    }

    /// Objects have been committed.
    fn committed(&self, tx: &ClientTransaction, objects: &[DomainObject]) -> CoreResult<()> {
        Ok(())
    }

    /// Objects are about to be rolled back.
    fn rolling_back(&self, tx: &ClientTransaction, objects: &[DomainObject]) -> CoreResult<()> {
        Ok(())
    }

    /// Objects have been rolled back.
    fn rolled_back(&self, tx: &ClientTransaction, objects: &[DomainObject]) -> CoreResult<()> {
        Ok(())
    }

    /// Filters a query result. Results flow through listeners and then
    /// extensions as a pipeline.
    fn filter_query_result(
        &self,
        tx: &ClientTransaction,
        result: QueryResult,
    ) -> CoreResult<QueryResult> {
        Ok(result)
    }

    /// An object has been marked invalid in the transaction.
    fn object_marked_invalid(&self, tx: &ClientTransaction, object: &DomainObject) -> CoreResult<()> {
        Ok(())
    }

    /// An object is no longer invalid in the transaction.
    fn object_marked_not_invalid(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
    ) -> CoreResult<()> {
        Ok(())
    }
}
