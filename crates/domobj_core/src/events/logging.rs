//! Event tracing.

use super::ClientTransactionListener;
use crate::commit::CommittingEventRegistrar;
use crate::domain_object::DomainObject;
use crate::end_point::RelatedObjects;
use crate::error::CoreResult;
use crate::persistence::PersistableData;
use crate::transaction::ClientTransaction;
use crate::types::ValueAccess;
use domobj_codec::{ClassId, ObjectId, Value};
use tracing::trace;

/// Emits one `trace!` record per lifecycle event.
///
/// Installed on every transaction of a hierarchy when
/// [`crate::Config::trace_events`] is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl ClientTransactionListener for LoggingListener {
    fn transaction_initialize(&self, tx: &ClientTransaction) -> CoreResult<()> {
        trace!(transaction = %tx.id(), "transaction initialize");
        Ok(())
    }

    fn transaction_discard(&self, tx: &ClientTransaction) -> CoreResult<()> {
        trace!(transaction = %tx.id(), "transaction discard");
        Ok(())
    }

    fn sub_transaction_creating(&self, tx: &ClientTransaction) -> CoreResult<()> {
        trace!(transaction = %tx.id(), "sub-transaction creating");
        Ok(())
    }

    fn sub_transaction_initialize(
        &self,
        tx: &ClientTransaction,
        sub: &ClientTransaction,
    ) -> CoreResult<()> {
        trace!(transaction = %tx.id(), sub = %sub.id(), "sub-transaction initialize");
        Ok(())
    }

    fn sub_transaction_created(
        &self,
        tx: &ClientTransaction,
        sub: &ClientTransaction,
    ) -> CoreResult<()> {
        trace!(transaction = %tx.id(), sub = %sub.id(), "sub-transaction created");
        Ok(())
    }

    fn new_object_creating(&self, tx: &ClientTransaction, class_id: &ClassId) -> CoreResult<()> {
        trace!(transaction = %tx.id(), class = %class_id, "new object creating");
        Ok(())
    }

    fn objects_loading(&self, tx: &ClientTransaction, ids: &[ObjectId]) -> CoreResult<()> {
        trace!(transaction = %tx.id(), count = ids.len(), "objects loading");
        Ok(())
    }

    fn objects_loaded(&self, tx: &ClientTransaction, objects: &[DomainObject]) -> CoreResult<()> {
        trace!(transaction = %tx.id(), count = objects.len(), "objects loaded");
        Ok(())
    }

    fn objects_not_found(&self, tx: &ClientTransaction, ids: &[ObjectId]) -> CoreResult<()> {
        trace!(transaction = %tx.id(), count = ids.len(), "objects not found");
        Ok(())
    }

    fn objects_unloading(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
    ) -> CoreResult<()> {
        trace!(transaction = %tx.id(), count = objects.len(), "objects unloading");
        Ok(())
    }

    fn objects_unloaded(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
    ) -> CoreResult<()> {
        trace!(transaction = %tx.id(), count = objects.len(), "objects unloaded");
        Ok(())
    }

    fn object_deleting(&self, tx: &ClientTransaction, object: &DomainObject) -> CoreResult<()> {
        trace!(transaction = %tx.id(), object = %object, "object deleting");
        Ok(())
    }

    fn object_deleted(&self, tx: &ClientTransaction, object: &DomainObject) -> CoreResult<()> {
        trace!(transaction = %tx.id(), object = %object, "object deleted");
        Ok(())
    }

    fn property_value_reading(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        access: ValueAccess,
    ) -> CoreResult<()> {
        trace!(transaction = %tx.id(), object = %object, property, ?access, "property reading");
        Ok(())
    }

    fn property_value_read(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        value: &Value,
        access: ValueAccess,
    ) -> CoreResult<()> {
        trace!(transaction = %tx.id(), object = %object, property, %value, ?access, "property read");
        Ok(())
    }

    fn property_value_changing(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_value: &Value,
        new_value: &Value,
    ) -> CoreResult<()> {
        trace!(
            transaction = %tx.id(),
            object = %object,
            property,
            old = %old_value,
            new = %new_value,
            "property changing"
        );
        Ok(())
    }

    fn property_value_changed(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_value: &Value,
        new_value: &Value,
    ) -> CoreResult<()> {
        trace!(
            transaction = %tx.id(),
            object = %object,
            property,
            old = %old_value,
            new = %new_value,
            "property changed"
        );
        Ok(())
    }

    fn relation_reading(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        access: ValueAccess,
    ) -> CoreResult<()> {
        trace!(transaction = %tx.id(), object = %object, property, ?access, "relation reading");
        Ok(())
    }

    fn relation_read(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        related: &RelatedObjects,
        access: ValueAccess,
    ) -> CoreResult<()> {
        trace!(transaction = %tx.id(), object = %object, property, ?related, ?access, "relation read");
        Ok(())
    }

    fn relation_changing(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_related: Option<&DomainObject>,
        new_related: Option<&DomainObject>,
    ) -> CoreResult<()> {
        trace!(
            transaction = %tx.id(),
            object = %object,
            property,
            old = ?old_related,
            new = ?new_related,
            "relation changing"
        );
        Ok(())
    }

    fn relation_changed(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_related: Option<&DomainObject>,
        new_related: Option<&DomainObject>,
    ) -> CoreResult<()> {
        trace!(
            transaction = %tx.id(),
            object = %object,
            property,
            old = ?old_related,
            new = ?new_related,
            "relation changed"
        );
        Ok(())
    }

    fn committing(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
        _registrar: &CommittingEventRegistrar,
    ) -> CoreResult<()> {
        trace!(transaction = %tx.id(), count = objects.len(), "committing");
        Ok(())
    }

    fn commit_validate(&self, tx: &ClientTransaction, data: &[PersistableData]) -> CoreResult<()> {
        trace!(transaction = %tx.id(), count = data.len(), "commit validate");
        Ok(())
    }

    fn committed(&self, tx: &ClientTransaction, objects: &[DomainObject]) -> CoreResult<()> {
        trace!(transaction = %tx.id(), count = objects.len(), "committed");
        Ok(())
    }

    fn rolling_back(&self, tx: &ClientTransaction, objects: &[DomainObject]) -> CoreResult<()> {
        trace!(transaction = %tx.id(), count = objects.len(), "rolling back");
        Ok(())
    }

    fn rolled_back(&self, tx: &ClientTransaction, objects: &[DomainObject]) -> CoreResult<()> {
        trace!(transaction = %tx.id(), count = objects.len(), "rolled back");
        Ok(())
    }

    fn object_marked_invalid(&self, tx: &ClientTransaction, object: &DomainObject) -> CoreResult<()> {
        trace!(transaction = %tx.id(), object = %object, "object marked invalid");
        Ok(())
    }

    fn object_marked_not_invalid(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
    ) -> CoreResult<()> {
        trace!(transaction = %tx.id(), object = %object, "object marked not invalid");
        Ok(())
    }
}
