//! Client transaction extensions.
//!
//! Extensions are user-supplied observers of a single transaction. They are
//! keyed by a unique string and invoked in collection order for every
//! lifecycle event. `filter_query_result` is a pipeline: each extension
//! receives the result produced by the previous one.

mod validation;

pub use validation::CommitValidationExtension;

use crate::commit::CommittingEventRegistrar;
use crate::domain_object::DomainObject;
use crate::end_point::RelatedObjects;
use crate::error::{CoreError, CoreResult};
use crate::persistence::PersistableData;
use crate::query::QueryResult;
use crate::transaction::ClientTransaction;
use crate::types::ValueAccess;
use domobj_codec::{ClassId, ObjectId, Value};
use parking_lot::RwLock;
use std::sync::Arc;

/// A pluggable observer of transaction lifecycle events.
///
/// Every method except [`key`](Self::key) defaults to doing nothing.
/// Returning an error from a "-ing" event vetoes the operation.
#[allow(unused_variables)]
pub trait ClientTransactionExtension: Send + Sync {
    /// The unique key of the extension within a collection.
    fn key(&self) -> &str;

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

    /// A sub-transaction has been constructed. Extensions do not cascade;
    /// this is the place to install extensions on `sub`.
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

    /// Objects have been loaded.
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

    /// Objects are about to be committed. Further objects can be pulled
    /// into the commit through `registrar`.
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

    /// Filters a query result.
    fn filter_query_result(
        &self,
        tx: &ClientTransaction,
        result: QueryResult,
    ) -> CoreResult<QueryResult> {
        Ok(result)
    }
}

/// Key under which the collection itself reports.
const COLLECTION_KEY: &str = "domobj.ExtensionCollection";

/// The ordered, uniquely keyed extensions of one transaction.
///
/// The collection is itself an extension that broadcasts every event to its
/// members in order, stopping at the first error.
#[derive(Default)]
pub struct ClientTransactionExtensionCollection {
    extensions: RwLock<Vec<Arc<dyn ClientTransactionExtension>>>,
}

impl ClientTransactionExtensionCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an extension.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateExtension`] if the key is taken.
    pub fn add(&self, extension: Arc<dyn ClientTransactionExtension>) -> CoreResult<()> {
        let mut extensions = self.extensions.write();
        let index = extensions.len();
        Self::insert_locked(&mut extensions, index, extension)
    }

    /// Inserts an extension at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateExtension`] if the key is taken and
    /// [`CoreError::InvalidArgument`] if `index` is out of range.
    pub fn insert(
        &self,
        index: usize,
        extension: Arc<dyn ClientTransactionExtension>,
    ) -> CoreResult<()> {
        let mut extensions = self.extensions.write();
        Self::insert_locked(&mut extensions, index, extension)
    }

    fn insert_locked(
        extensions: &mut Vec<Arc<dyn ClientTransactionExtension>>,
        index: usize,
        extension: Arc<dyn ClientTransactionExtension>,
    ) -> CoreResult<()> {
        if extensions.iter().any(|e| e.key() == extension.key()) {
            return Err(CoreError::DuplicateExtension {
                key: extension.key().to_string(),
            });
        }
        if index > extensions.len() {
            return Err(CoreError::invalid_argument(format!(
                "extension index {index} is out of range"
            )));
        }
        tracing::debug!(key = extension.key(), index, "extension added");
        extensions.insert(index, extension);
        Ok(())
    }

    /// Removes the extension with `key`.
    pub fn remove(&self, key: &str) -> Option<Arc<dyn ClientTransactionExtension>> {
        let mut extensions = self.extensions.write();
        let index = extensions.iter().position(|e| e.key() == key)?;
        Some(extensions.remove(index))
    }

    /// Returns the extension with `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<dyn ClientTransactionExtension>> {
        self.extensions
            .read()
            .iter()
            .find(|e| e.key() == key)
            .map(Arc::clone)
    }

    /// Returns the keys in order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.extensions
            .read()
            .iter()
            .map(|e| e.key().to_string())
            .collect()
    }

    /// Returns the number of extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions.read().len()
    }

    /// Returns `true` if there are no extensions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.read().is_empty()
    }

    /// Copies the member list so no lock is held while extensions run.
    fn snapshot(&self) -> Vec<Arc<dyn ClientTransactionExtension>> {
        self.extensions.read().clone()
    }

    fn broadcast(
        &self,
        call: impl Fn(&dyn ClientTransactionExtension) -> CoreResult<()>,
    ) -> CoreResult<()> {
        for extension in self.snapshot() {
            call(extension.as_ref())?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ClientTransactionExtensionCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTransactionExtensionCollection")
            .field("keys", &self.keys())
            .finish()
    }
}

/// Adds `extension` to the transaction unless an extension with the same
/// key is already installed.
///
/// Returns `false` and leaves the installed extension untouched in that
/// case.
pub fn try_install(
    extension: Arc<dyn ClientTransactionExtension>,
    tx: &ClientTransaction,
) -> bool {
    let extensions = tx.extensions();
    if extensions.get(extension.key()).is_some() {
        return false;
    }
    extensions.add(extension).is_ok()
}

impl ClientTransactionExtension for ClientTransactionExtensionCollection {
    fn key(&self) -> &str {
        COLLECTION_KEY
    }

    fn transaction_initialize(&self, tx: &ClientTransaction) -> CoreResult<()> {
        self.broadcast(|e| e.transaction_initialize(tx))
    }

    fn transaction_discard(&self, tx: &ClientTransaction) -> CoreResult<()> {
        self.broadcast(|e| e.transaction_discard(tx))
    }

    fn sub_transaction_creating(&self, tx: &ClientTransaction) -> CoreResult<()> {
        self.broadcast(|e| e.sub_transaction_creating(tx))
    }

    fn sub_transaction_initialize(
        &self,
        tx: &ClientTransaction,
        sub: &ClientTransaction,
    ) -> CoreResult<()> {
        self.broadcast(|e| e.sub_transaction_initialize(tx, sub))
    }

    fn sub_transaction_created(
        &self,
        tx: &ClientTransaction,
        sub: &ClientTransaction,
    ) -> CoreResult<()> {
        self.broadcast(|e| e.sub_transaction_created(tx, sub))
    }

    fn new_object_creating(&self, tx: &ClientTransaction, class_id: &ClassId) -> CoreResult<()> {
        self.broadcast(|e| e.new_object_creating(tx, class_id))
    }

    fn objects_loading(&self, tx: &ClientTransaction, ids: &[ObjectId]) -> CoreResult<()> {
        self.broadcast(|e| e.objects_loading(tx, ids))
    }

    fn objects_loaded(&self, tx: &ClientTransaction, objects: &[DomainObject]) -> CoreResult<()> {
        self.broadcast(|e| e.objects_loaded(tx, objects))
    }

    fn objects_not_found(&self, tx: &ClientTransaction, ids: &[ObjectId]) -> CoreResult<()> {
        self.broadcast(|e| e.objects_not_found(tx, ids))
    }

    fn objects_unloading(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
    ) -> CoreResult<()> {
        self.broadcast(|e| e.objects_unloading(tx, objects))
    }

    fn objects_unloaded(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
    ) -> CoreResult<()> {
        self.broadcast(|e| e.objects_unloaded(tx, objects))
    }

    fn object_deleting(&self, tx: &ClientTransaction, object: &DomainObject) -> CoreResult<()> {
        self.broadcast(|e| e.object_deleting(tx, object))
    }

    fn object_deleted(&self, tx: &ClientTransaction, object: &DomainObject) -> CoreResult<()> {
        self.broadcast(|e| e.object_deleted(tx, object))
    }

    fn property_value_reading(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        access: ValueAccess,
    ) -> CoreResult<()> {
        self.broadcast(|e| e.property_value_reading(tx, object, property, access))
    }

    fn property_value_read(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        value: &Value,
        access: ValueAccess,
    ) -> CoreResult<()> {
        self.broadcast(|e| e.property_value_read(tx, object, property, value, access))
    }

    fn property_value_changing(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_value: &Value,
        new_value: &Value,
    ) -> CoreResult<()> {
        self.broadcast(|e| e.property_value_changing(tx, object, property, old_value, new_value))
    }

    fn property_value_changed(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_value: &Value,
        new_value: &Value,
    ) -> CoreResult<()> {
        self.broadcast(|e| e.property_value_changed(tx, object, property, old_value, new_value))
    }

    fn relation_reading(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        access: ValueAccess,
    ) -> CoreResult<()> {
        self.broadcast(|e| e.relation_reading(tx, object, property, access))
    }

    fn relation_read(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        related: &RelatedObjects,
        access: ValueAccess,
    ) -> CoreResult<()> {
        self.broadcast(|e| e.relation_read(tx, object, property, related, access))
    }

    fn relation_changing(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_related: Option<&DomainObject>,
        new_related: Option<&DomainObject>,
    ) -> CoreResult<()> {
        self.broadcast(|e| e.relation_changing(tx, object, property, old_related, new_related))
    }

    fn relation_changed(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_related: Option<&DomainObject>,
        new_related: Option<&DomainObject>,
    ) -> CoreResult<()> {
        self.broadcast(|e| e.relation_changed(tx, object, property, old_related, new_related))
    }

    fn committing(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
        registrar: &CommittingEventRegistrar,
    ) -> CoreResult<()> {
        self.broadcast(|e| e.committing(tx, objects, registrar))
    }

    fn commit_validate(&self, tx: &ClientTransaction, data: &[PersistableData]) -> CoreResult<()> {
        self.broadcast(|e| e.commit_validate(tx, data))
    }

    fn committed(&self, tx: &ClientTransaction, objects: &[DomainObject]) -> CoreResult<()> {
        self.broadcast(|e| e.committed(tx, objects))
    }

    fn rolling_back(&self, tx: &ClientTransaction, objects: &[DomainObject]) -> CoreResult<()> {
        self.broadcast(|e| e.rolling_back(tx, objects))
    }

    fn rolled_back(&self, tx: &ClientTransaction, objects: &[DomainObject]) -> CoreResult<()> {
        self.broadcast(|e| e.rolled_back(tx, objects))
    }

    fn filter_query_result(
        &self,
        tx: &ClientTransaction,
        result: QueryResult,
    ) -> CoreResult<QueryResult> {
        self.snapshot()
            .iter()
            .try_fold(result, |result, e| e.filter_query_result(tx, result))
    }
}
