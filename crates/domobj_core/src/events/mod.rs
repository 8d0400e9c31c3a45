//! Lifecycle event dispatch.
//!
//! Every transaction owns one [`EventBroker`]. Raising an event calls the
//! broker's listeners first and then the transaction's extension
//! collection; the first error stops dispatch and is returned to the
//! operation that raised the event. No lock is held while listeners or
//! extensions run, so they may call back into the transaction.

mod invalidated;
mod listener;
mod logging;

pub use invalidated::InvalidatedTransactionListener;
pub use listener::ClientTransactionListener;
pub use logging::LoggingListener;

use crate::commit::CommittingEventRegistrar;
use crate::domain_object::DomainObject;
use crate::end_point::RelatedObjects;
use crate::error::CoreResult;
use crate::extension::{ClientTransactionExtension, ClientTransactionExtensionCollection};
use crate::persistence::PersistableData;
use crate::query::QueryResult;
use crate::transaction::ClientTransaction;
use crate::types::ValueAccess;
use domobj_codec::{ClassId, ObjectId, Value};
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};

/// Dispatches lifecycle events to listeners and extensions.
#[derive(Default)]
pub struct EventBroker {
    listeners: RwLock<Vec<Arc<dyn ClientTransactionListener>>>,
    extensions: OnceLock<Arc<ClientTransactionExtensionCollection>>,
}

impl EventBroker {
    /// Creates a broker without listeners or extensions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener.
    pub fn add_listener(&self, listener: Arc<dyn ClientTransactionListener>) {
        self.listeners.write().push(listener);
    }

    /// Returns the number of installed listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Replaces every listener with one that fails all further events.
    pub(crate) fn invalidate(&self) {
        *self.listeners.write() = vec![Arc::new(InvalidatedTransactionListener)];
    }

    /// Connects the extension collection. Only the first call has an
    /// effect.
    pub(crate) fn install_extensions(&self, extensions: Arc<ClientTransactionExtensionCollection>) {
        if self.extensions.set(extensions).is_err() {
            tracing::warn!("extensions already installed on event broker");
        }
    }

    fn dispatch(
        &self,
        event: &'static str,
        tx: &ClientTransaction,
        listener_call: impl Fn(&dyn ClientTransactionListener) -> CoreResult<()>,
        extension_call: impl Fn(&dyn ClientTransactionExtension) -> CoreResult<()>,
    ) -> CoreResult<()> {
        tracing::trace!(event, transaction = %tx.id(), "raising event");
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener_call(listener.as_ref())?;
        }
        if let Some(extensions) = self.extensions.get() {
            extension_call(extensions.as_ref())?;
        }
        Ok(())
    }

    fn dispatch_listeners(
        &self,
        event: &'static str,
        tx: &ClientTransaction,
        listener_call: impl Fn(&dyn ClientTransactionListener) -> CoreResult<()>,
    ) -> CoreResult<()> {
        self.dispatch(event, tx, listener_call, |_| Ok(()))
    }

    pub(crate) fn raise_transaction_initialize(&self, tx: &ClientTransaction) -> CoreResult<()> {
        self.dispatch(
            "transaction_initialize",
            tx,
            |l| l.transaction_initialize(tx),
            |e| e.transaction_initialize(tx),
        )
    }

    pub(crate) fn raise_transaction_discard(&self, tx: &ClientTransaction) -> CoreResult<()> {
        self.dispatch(
            "transaction_discard",
            tx,
            |l| l.transaction_discard(tx),
            |e| e.transaction_discard(tx),
        )
    }

    pub(crate) fn raise_sub_transaction_creating(&self, tx: &ClientTransaction) -> CoreResult<()> {
        self.dispatch(
            "sub_transaction_creating",
            tx,
            |l| l.sub_transaction_creating(tx),
            |e| e.sub_transaction_creating(tx),
        )
    }

    pub(crate) fn raise_sub_transaction_initialize(
        &self,
        tx: &ClientTransaction,
        sub: &ClientTransaction,
    ) -> CoreResult<()> {
        self.dispatch(
            "sub_transaction_initialize",
            tx,
            |l| l.sub_transaction_initialize(tx, sub),
            |e| e.sub_transaction_initialize(tx, sub),
        )
    }

    pub(crate) fn raise_sub_transaction_created(
        &self,
        tx: &ClientTransaction,
        sub: &ClientTransaction,
    ) -> CoreResult<()> {
        self.dispatch(
            "sub_transaction_created",
            tx,
            |l| l.sub_transaction_created(tx, sub),
            |e| e.sub_transaction_created(tx, sub),
        )
    }

    pub(crate) fn raise_new_object_creating(
        &self,
        tx: &ClientTransaction,
        class_id: &ClassId,
    ) -> CoreResult<()> {
        self.dispatch(
            "new_object_creating",
            tx,
            |l| l.new_object_creating(tx, class_id),
            |e| e.new_object_creating(tx, class_id),
        )
    }

    pub(crate) fn raise_objects_loading(
        &self,
        tx: &ClientTransaction,
        ids: &[ObjectId],
    ) -> CoreResult<()> {
        self.dispatch(
            "objects_loading",
            tx,
            |l| l.objects_loading(tx, ids),
            |e| e.objects_loading(tx, ids),
        )
    }

    pub(crate) fn raise_objects_loaded(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
    ) -> CoreResult<()> {
        self.dispatch(
            "objects_loaded",
            tx,
            |l| l.objects_loaded(tx, objects),
            |e| e.objects_loaded(tx, objects),
        )
    }

    pub(crate) fn raise_objects_not_found(
        &self,
        tx: &ClientTransaction,
        ids: &[ObjectId],
    ) -> CoreResult<()> {
        self.dispatch(
            "objects_not_found",
            tx,
            |l| l.objects_not_found(tx, ids),
            |e| e.objects_not_found(tx, ids),
        )
    }

    pub(crate) fn raise_objects_unloading(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
    ) -> CoreResult<()> {
        self.dispatch(
            "objects_unloading",
            tx,
            |l| l.objects_unloading(tx, objects),
            |e| e.objects_unloading(tx, objects),
        )
    }

    pub(crate) fn raise_objects_unloaded(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
    ) -> CoreResult<()> {
        self.dispatch(
            "objects_unloaded",
            tx,
            |l| l.objects_unloaded(tx, objects),
            |e| e.objects_unloaded(tx, objects),
        )
    }

    pub(crate) fn raise_object_deleting(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
    ) -> CoreResult<()> {
        self.dispatch(
            "object_deleting",
            tx,
            |l| l.object_deleting(tx, object),
            |e| e.object_deleting(tx, object),
        )
    }

    pub(crate) fn raise_object_deleted(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
    ) -> CoreResult<()> {
        self.dispatch(
            "object_deleted",
            tx,
            |l| l.object_deleted(tx, object),
            |e| e.object_deleted(tx, object),
        )
    }

    pub(crate) fn raise_property_value_reading(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        access: ValueAccess,
    ) -> CoreResult<()> {
        self.dispatch(
            "property_value_reading",
            tx,
            |l| l.property_value_reading(tx, object, property, access),
            |e| e.property_value_reading(tx, object, property, access),
        )
    }

    pub(crate) fn raise_property_value_read(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        value: &Value,
        access: ValueAccess,
    ) -> CoreResult<()> {
        self.dispatch(
            "property_value_read",
            tx,
            |l| l.property_value_read(tx, object, property, value, access),
            |e| e.property_value_read(tx, object, property, value, access),
        )
    }

    pub(crate) fn raise_property_value_changing(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_value: &Value,
        new_value: &Value,
    ) -> CoreResult<()> {
        self.dispatch(
            "property_value_changing",
            tx,
            |l| l.property_value_changing(tx, object, property, old_value, new_value),
            |e| e.property_value_changing(tx, object, property, old_value, new_value),
        )
    }

    pub(crate) fn raise_property_value_changed(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_value: &Value,
        new_value: &Value,
    ) -> CoreResult<()> {
        self.dispatch(
            "property_value_changed",
            tx,
            |l| l.property_value_changed(tx, object, property, old_value, new_value),
            |e| e.property_value_changed(tx, object, property, old_value, new_value),
        )
    }

    pub(crate) fn raise_relation_reading(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        access: ValueAccess,
    ) -> CoreResult<()> {
        self.dispatch(
            "relation_reading",
            tx,
            |l| l.relation_reading(tx, object, property, access),
            |e| e.relation_reading(tx, object, property, access),
        )
    }

    pub(crate) fn raise_relation_read(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        related: &RelatedObjects,
        access: ValueAccess,
    ) -> CoreResult<()> {
        self.dispatch(
            "relation_read",
            tx,
            |l| l.relation_read(tx, object, property, related, access),
            |e| e.relation_read(tx, object, property, related, access),
        )
    }

    pub(crate) fn raise_relation_changing(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_related: Option<&DomainObject>,
        new_related: Option<&DomainObject>,
    ) -> CoreResult<()> {
        self.dispatch(
            "relation_changing",
            tx,
            |l| l.relation_changing(tx, object, property, old_related, new_related),
            |e| e.relation_changing(tx, object, property, old_related, new_related),
        )
    }

    pub(crate) fn raise_relation_changed(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_related: Option<&DomainObject>,
        new_related: Option<&DomainObject>,
    ) -> CoreResult<()> {
        self.dispatch(
            "relation_changed",
            tx,
            |l| l.relation_changed(tx, object, property, old_related, new_related),
            |e| e.relation_changed(tx, object, property, old_related, new_related),
        )
    }

    pub(crate) fn raise_committing(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
        registrar: &CommittingEventRegistrar,
    ) -> CoreResult<()> {
        self.dispatch(
            "committing",
            tx,
            |l| l.committing(tx, objects, registrar),
            |e| e.committing(tx, objects, registrar),
        )
    }

    pub(crate) fn raise_commit_validate(
        &self,
        tx: &ClientTransaction,
        data: &[PersistableData],
    ) -> CoreResult<()> {
        self.dispatch(
            "commit_validate",
            tx,
            |l| l.commit_validate(tx, data),
            |e| e.commit_validate(tx, data),
        )
    }

    pub(crate) fn raise_committed(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
    ) -> CoreResult<()> {
        self.dispatch(
            "committed",
            tx,
            |l| l.committed(tx, objects),
            |e| e.committed(tx, objects),
        )
    }

    pub(crate) fn raise_rolling_back(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
    ) -> CoreResult<()> {
        self.dispatch(
            "rolling_back",
            tx,
            |l| l.rolling_back(tx, objects),
            |e| e.rolling_back(tx, objects),
        )
    }

    pub(crate) fn raise_rolled_back(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
    ) -> CoreResult<()> {
        self.dispatch(
            "rolled_back",
            tx,
            |l| l.rolled_back(tx, objects),
            |e| e.rolled_back(tx, objects),
        )
    }

    /// Runs a query result through the listener and extension pipeline.
    pub(crate) fn filter_query_result(
        &self,
        tx: &ClientTransaction,
        result: QueryResult,
    ) -> CoreResult<QueryResult> {
        tracing::trace!(event = "filter_query_result", transaction = %tx.id(), "raising event");
        let listeners = self.listeners.read().clone();
        let result = listeners
            .iter()
            .try_fold(result, |result, l| l.filter_query_result(tx, result))?;
        match self.extensions.get() {
            Some(extensions) => extensions.filter_query_result(tx, result),
            None => Ok(result),
        }
    }

    pub(crate) fn raise_object_marked_invalid(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
    ) -> CoreResult<()> {
        self.dispatch_listeners("object_marked_invalid", tx, |l| {
            l.object_marked_invalid(tx, object)
        })
    }

    pub(crate) fn raise_object_marked_not_invalid(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
    ) -> CoreResult<()> {
        self.dispatch_listeners("object_marked_not_invalid", tx, |l| {
            l.object_marked_not_invalid(tx, object)
        })
    }
}

impl std::fmt::Debug for EventBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroker")
            .field("listeners", &self.listener_count())
            .field("extensions", &self.extensions.get())
            .finish()
    }
}
