//! The client transaction façade.

mod factory;
mod properties;
mod relations;
mod snapshot;

pub use factory::{ClientTransactionComponentFactory, RootComponentFactory, SubComponentFactory};

use crate::application_data::ApplicationData;
use crate::commit::CommitRollbackAgent;
use crate::config::Config;
use crate::data_manager::DataManager;
use crate::domain_object::{DomainObject, DomainObjectType};
use crate::end_point::RelationEndPointId;
use crate::enlisted::EnlistedDomainObjectManager;
use crate::error::{CoreError, CoreResult};
use crate::events::EventBroker;
use crate::extension::ClientTransactionExtensionCollection;
use crate::hierarchy::TransactionHierarchyManager;
use crate::invalid::InvalidDomainObjectManager;
use crate::lifetime::ObjectLifetimeAgent;
use crate::mapping::MappingConfiguration;
use crate::persistence::PersistenceStrategy;
use crate::query::{Query, QueryManager, QueryResult};
use crate::scope::{ClientTransactionScope, ScopeLeaveBehavior};
use crate::state::DomainObjectState;
use crate::types::TransactionId;
use crate::unload;
use domobj_codec::{ClassId, ObjectId};
use domobj_storage::StorageProvider;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// The components of one transaction, wired by a component factory.
pub(crate) struct TransactionInner {
    id: TransactionId,
    mapping: Arc<MappingConfiguration>,
    config: Config,
    application_data: ApplicationData,
    event_broker: Arc<EventBroker>,
    hierarchy_manager: TransactionHierarchyManager,
    enlisted: Arc<EnlistedDomainObjectManager>,
    invalid: Arc<InvalidDomainObjectManager>,
    persistence: Arc<dyn PersistenceStrategy>,
    data_manager: Arc<DataManager>,
    lifetime: ObjectLifetimeAgent,
    query_manager: QueryManager,
    commit_agent: CommitRollbackAgent,
    extensions: Arc<ClientTransactionExtensionCollection>,
    discarded: AtomicBool,
}

/// A unit of work over domain objects.
///
/// A transaction tracks every object it loads or creates, records changes
/// against the loaded state, and writes them in one step on
/// [`commit`](Self::commit). Sub-transactions read through their parent
/// and commit into it, so work can be tried out and thrown away without
/// touching the parent.
///
/// `ClientTransaction` is a cheap handle; clones refer to the same
/// transaction.
///
/// # Example
///
/// ```rust,ignore
/// let tx = ClientTransaction::create_root_transaction(mapping, storage)?;
/// let order = tx.new_object("Order")?;
/// tx.set_property(&order, "OrderNumber", 1_i64)?;
/// tx.commit()?;
/// ```
#[derive(Clone)]
pub struct ClientTransaction {
    inner: Arc<TransactionInner>,
}

/// A non-owning reference to a transaction.
#[derive(Clone)]
pub(crate) struct WeakTransaction(Weak<TransactionInner>);

impl WeakTransaction {
    pub(crate) fn upgrade(&self) -> Option<ClientTransaction> {
        self.0.upgrade().map(|inner| ClientTransaction { inner })
    }

    pub(crate) fn refers_to(&self, tx: &ClientTransaction) -> bool {
        std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(&tx.inner))
    }
}

impl fmt::Debug for WeakTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(tx) => write!(f, "WeakTransaction({})", tx.id()),
            None => f.write_str("WeakTransaction(dropped)"),
        }
    }
}

impl ClientTransaction {
    /// Creates a root transaction over `storage` with the default
    /// configuration.
    ///
    /// # Errors
    ///
    /// Propagates errors raised by `transaction_initialize` handlers.
    pub fn create_root_transaction(
        mapping: Arc<MappingConfiguration>,
        storage: Arc<dyn StorageProvider>,
    ) -> CoreResult<Self> {
        Self::create_root_transaction_with_config(mapping, storage, Config::default())
    }

    /// Creates a root transaction with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Propagates errors raised by `transaction_initialize` handlers.
    pub fn create_root_transaction_with_config(
        mapping: Arc<MappingConfiguration>,
        storage: Arc<dyn StorageProvider>,
        config: Config,
    ) -> CoreResult<Self> {
        let tx = Self::from_factory(&RootComponentFactory::new(mapping, storage, config))?;
        tracing::debug!(transaction = %tx.id(), "root transaction created");
        Ok(tx)
    }

    // ========================================================================
    // Components
    // ========================================================================

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.inner.id
    }

    /// Returns the mapping.
    #[must_use]
    pub fn mapping(&self) -> &Arc<MappingConfiguration> {
        &self.inner.mapping
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the application data shared by the hierarchy.
    #[must_use]
    pub fn application_data(&self) -> &ApplicationData {
        &self.inner.application_data
    }

    /// Returns the event broker.
    #[must_use]
    pub fn event_broker(&self) -> &Arc<EventBroker> {
        &self.inner.event_broker
    }

    /// Returns the hierarchy manager.
    #[must_use]
    pub fn hierarchy_manager(&self) -> &TransactionHierarchyManager {
        &self.inner.hierarchy_manager
    }

    /// Returns the extensions of this transaction.
    #[must_use]
    pub fn extensions(&self) -> &Arc<ClientTransactionExtensionCollection> {
        &self.inner.extensions
    }

    /// Returns the data manager.
    #[must_use]
    pub fn data_manager(&self) -> &Arc<DataManager> {
        &self.inner.data_manager
    }

    /// Returns the objects that are invalid in this transaction.
    #[must_use]
    pub fn invalid_objects(&self) -> &Arc<InvalidDomainObjectManager> {
        &self.inner.invalid
    }

    /// Returns the identity map shared by the hierarchy.
    #[must_use]
    pub fn enlisted_objects(&self) -> &Arc<EnlistedDomainObjectManager> {
        &self.inner.enlisted
    }

    pub(crate) fn persistence(&self) -> &Arc<dyn PersistenceStrategy> {
        &self.inner.persistence
    }

    pub(crate) fn downgrade(&self) -> WeakTransaction {
        WeakTransaction(Arc::downgrade(&self.inner))
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Returns the parent transaction, `None` for a root transaction.
    #[must_use]
    pub fn parent_transaction(&self) -> Option<&ClientTransaction> {
        self.inner.hierarchy_manager.parent_transaction()
    }

    /// Returns the live sub-transaction, if any.
    #[must_use]
    pub fn sub_transaction(&self) -> Option<ClientTransaction> {
        self.inner.hierarchy_manager.sub_transaction()
    }

    /// Returns the root transaction of the hierarchy.
    #[must_use]
    pub fn root_transaction(&self) -> ClientTransaction {
        let mut root = self;
        while let Some(parent) = root.parent_transaction() {
            root = parent;
        }
        root.clone()
    }

    /// Returns `true` while the transaction has no sub-transaction.
    #[must_use]
    pub fn is_writeable(&self) -> bool {
        self.inner.hierarchy_manager.is_writeable()
    }

    /// Returns `true` if the transaction handles calls for its hierarchy.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.hierarchy_manager.hierarchy().is_active(self)
    }

    /// Returns `true` once the transaction has been discarded.
    #[must_use]
    pub fn is_discarded(&self) -> bool {
        self.inner.discarded.load(Ordering::Acquire)
    }

    /// Creates a sub-transaction and makes it the active transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the transaction already has
    /// a sub-transaction, [`CoreError::TransactionDiscarded`] after
    /// [`discard`](Self::discard), and errors raised by event handlers.
    pub fn create_sub_transaction(&self) -> CoreResult<ClientTransaction> {
        self.ensure_not_discarded()?;
        self.inner.hierarchy_manager.create_sub_transaction(self, |parent| {
            Self::from_factory(&SubComponentFactory::new(parent.clone()))
        })
    }

    /// Discards the transaction and, first, its sub-transaction.
    ///
    /// Returns `false` if the transaction was already discarded; nothing
    /// happens in that case. Afterwards every operation on the transaction
    /// fails with [`CoreError::TransactionDiscarded`] and the parent is
    /// writeable again.
    ///
    /// # Errors
    ///
    /// Returns errors raised by `transaction_discard` handlers; the
    /// transaction is not discarded then.
    pub fn discard(&self) -> CoreResult<bool> {
        if self.is_discarded() {
            return Ok(false);
        }
        if let Some(sub) = self.sub_transaction() {
            sub.discard()?;
        }
        self.inner.event_broker.raise_transaction_discard(self)?;
        if self.inner.discarded.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        self.inner.hierarchy_manager.on_transaction_discard(self);
        self.inner.event_broker.invalidate();
        tracing::debug!(transaction = %self.id(), "transaction discarded");
        Ok(true)
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Loads an object.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectsNotFound`] if it does not exist,
    /// [`CoreError::ObjectDeleted`] if it is deleted in this transaction and
    /// [`CoreError::ObjectInvalid`] if it is invalid here.
    pub fn get_object(&self, id: &ObjectId) -> CoreResult<DomainObject> {
        self.ensure_active()?;
        self.inner.lifetime.get_object(self, id, false)
    }

    /// Loads an object, returning it even if it is deleted.
    ///
    /// # Errors
    ///
    /// Same as [`get_object`](Self::get_object) without the deleted check.
    pub fn get_object_including_deleted(&self, id: &ObjectId) -> CoreResult<DomainObject> {
        self.ensure_active()?;
        self.inner.lifetime.get_object(self, id, true)
    }

    /// Loads an object, returning `None` if it does not exist.
    ///
    /// Invalid and deleted objects are returned as they are.
    ///
    /// # Errors
    ///
    /// Returns storage errors and errors raised by event handlers.
    pub fn try_get_object(&self, id: &ObjectId) -> CoreResult<Option<DomainObject>> {
        self.ensure_active()?;
        self.inner.lifetime.try_get_object(self, id)
    }

    /// Returns the object for `id` without loading it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Mapping`] if the class is unknown.
    pub fn get_object_reference(&self, id: &ObjectId) -> CoreResult<DomainObject> {
        self.ensure_active()?;
        self.inner.lifetime.get_object_reference(id)
    }

    /// Loads several objects in as few round-trips as possible. Deleted
    /// objects are included.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectsNotFound`] naming every missing object.
    pub fn get_objects(&self, ids: &[ObjectId]) -> CoreResult<Vec<DomainObject>> {
        self.ensure_active()?;
        self.inner.lifetime.get_objects(self, ids)
    }

    /// Loads several objects, with `None` for missing ones.
    ///
    /// # Errors
    ///
    /// Returns storage errors and errors raised by event handlers.
    pub fn try_get_objects(&self, ids: &[ObjectId]) -> CoreResult<Vec<Option<DomainObject>>> {
        self.ensure_active()?;
        self.inner.lifetime.try_get_objects(self, ids)
    }

    /// Creates a new object of `class_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionReadOnly`] while a sub-transaction
    /// exists, [`CoreError::Mapping`] for unknown classes and
    /// [`CoreError::InvalidArgument`] for abstract ones.
    pub fn new_object(&self, class_id: impl Into<ClassId>) -> CoreResult<DomainObject> {
        self.ensure_active()?;
        self.inner.lifetime.new_object(self, &class_id.into())
    }

    /// Deletes an object and removes it from all of its relations.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionReadOnly`] while a sub-transaction
    /// exists and [`CoreError::ObjectInvalid`] for invalid objects.
    pub fn delete(&self, object: &DomainObject) -> CoreResult<()> {
        self.ensure_active()?;
        self.ensure_enlisted(object)?;
        self.inner.lifetime.delete(self, object)
    }

    /// Returns the state of an object in this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectNotEnlisted`] for objects of another
    /// hierarchy.
    pub fn object_state(&self, object: &DomainObject) -> CoreResult<DomainObjectState> {
        self.ensure_not_discarded()?;
        self.ensure_enlisted(object)?;
        Ok(self.inner.data_manager.state_of(object.id()))
    }

    /// Marks an unchanged object as changed so that it is part of the
    /// next commit. New objects are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectDeleted`] for deleted objects and
    /// [`CoreError::TransactionReadOnly`] while a sub-transaction exists.
    pub fn register_for_commit(&self, object: &DomainObject) -> CoreResult<()> {
        self.ensure_active()?;
        self.ensure_writeable("register_for_commit")?;
        self.ensure_valid(object)?;
        let (is_new, is_deleted) = self
            .inner
            .data_manager
            .with_data_container(self, object.id(), |c| (c.is_new(), c.is_deleted()))?;
        if is_deleted {
            return Err(CoreError::ObjectDeleted {
                id: object.id().clone(),
            });
        }
        if !is_new {
            self.inner.data_manager.mark_changed(object.id())?;
        }
        Ok(())
    }

    /// Returns `true` if the transaction holds unsaved work.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.inner.commit_agent.has_changed()
    }

    // ========================================================================
    // Typed access
    // ========================================================================

    /// Loads an object as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectTypeMismatch`] if `id` does not belong to
    /// `T`'s class or a class derived from it, and the errors of
    /// [`get_object`](Self::get_object).
    pub fn get_object_as<T: DomainObjectType>(&self, id: &ObjectId) -> CoreResult<T> {
        self.check_type::<T>(id)?;
        self.get_object(id).map(T::from_domain_object)
    }

    /// Loads an object as `T`, returning `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Same as [`get_object_as`](Self::get_object_as) for the type check.
    pub fn try_get_object_as<T: DomainObjectType>(&self, id: &ObjectId) -> CoreResult<Option<T>> {
        self.check_type::<T>(id)?;
        Ok(self.try_get_object(id)?.map(T::from_domain_object))
    }

    /// Creates a new object of `T`'s class.
    ///
    /// # Errors
    ///
    /// Same as [`new_object`](Self::new_object).
    pub fn new_object_as<T: DomainObjectType>(&self) -> CoreResult<T> {
        self.new_object(T::CLASS_ID).map(T::from_domain_object)
    }

    fn check_type<T: DomainObjectType>(&self, id: &ObjectId) -> CoreResult<()> {
        let requested = ClassId::new(T::CLASS_ID);
        self.inner.mapping.class(&requested)?;
        if self.inner.mapping.is_same_or_base_of(&requested, id.class_id()) {
            Ok(())
        } else {
            Err(CoreError::ObjectTypeMismatch {
                id: id.clone(),
                requested,
            })
        }
    }

    // ========================================================================
    // Commit, rollback, queries, unloading
    // ========================================================================

    /// Writes every change to the parent transaction or the storage.
    ///
    /// Either all changes are written or none; on error the in-memory state
    /// is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionReadOnly`] while a sub-transaction
    /// exists, vetoes raised by `committing` or `commit_validate` handlers
    /// and storage errors such as concurrency violations.
    pub fn commit(&self) -> CoreResult<()> {
        self.ensure_active()?;
        self.ensure_writeable("commit")?;
        self.inner.commit_agent.commit_data(self)
    }

    /// Restores the state of the last commit. New objects become invalid.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionReadOnly`] while a sub-transaction
    /// exists and errors raised by `rolling_back` handlers.
    pub fn rollback(&self) -> CoreResult<()> {
        self.ensure_active()?;
        self.ensure_writeable("rollback")?;
        self.inner.commit_agent.rollback_data(self)
    }

    /// Runs a collection query.
    ///
    /// # Errors
    ///
    /// Returns mapping errors for unknown classes or properties, storage
    /// errors, and errors raised by `filter_query_result` handlers.
    pub fn get_collection(&self, query: &Query) -> CoreResult<QueryResult> {
        self.ensure_active()?;
        self.inner.query_manager.get_collection(self, query)
    }

    /// Unloads the data of an unchanged object. See
    /// [`unload::unload_data`].
    ///
    /// # Errors
    ///
    /// See [`unload::unload_data`].
    pub fn unload_data(&self, id: &ObjectId) -> CoreResult<bool> {
        unload::unload_data(self, id)
    }

    /// Unloads an unchanged virtual end-point. See
    /// [`unload::unload_virtual_end_point`].
    ///
    /// # Errors
    ///
    /// See [`unload::unload_virtual_end_point`].
    pub fn unload_virtual_end_point(&self, end_point: &RelationEndPointId) -> CoreResult<bool> {
        unload::unload_virtual_end_point(self, end_point)
    }

    // ========================================================================
    // Scopes
    // ========================================================================

    /// Makes the transaction current and active until the scope is left.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionDiscarded`] after
    /// [`discard`](Self::discard).
    pub fn enter_scope(&self, behavior: ScopeLeaveBehavior) -> CoreResult<ClientTransactionScope> {
        ClientTransactionScope::enter(Some(self), behavior)
    }

    /// Enters a scope that discards the transaction when left.
    ///
    /// # Errors
    ///
    /// See [`enter_scope`](Self::enter_scope).
    pub fn enter_discarding_scope(&self) -> CoreResult<ClientTransactionScope> {
        self.enter_scope(ScopeLeaveBehavior::Discard)
    }

    /// Enters a scope that leaves the transaction as it is when left.
    ///
    /// # Errors
    ///
    /// See [`enter_scope`](Self::enter_scope).
    pub fn enter_non_discarding_scope(&self) -> CoreResult<ClientTransactionScope> {
        self.enter_scope(ScopeLeaveBehavior::None)
    }

    /// Runs `action` in a non-discarding scope.
    ///
    /// The scope is left on every exit path; an error from `action` takes
    /// precedence over an error from leaving.
    ///
    /// # Errors
    ///
    /// Returns the error of `action` or of leaving the scope.
    pub fn execute_in_scope<T>(
        &self,
        action: impl FnOnce(&ClientTransaction) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut scope = self.enter_non_discarding_scope()?;
        let result = action(self);
        let left = scope.leave();
        let value = result?;
        left?;
        Ok(value)
    }

    // ========================================================================
    // Guards
    // ========================================================================

    fn ensure_not_discarded(&self) -> CoreResult<()> {
        if self.is_discarded() {
            Err(CoreError::TransactionDiscarded)
        } else {
            Ok(())
        }
    }

    /// Fails unless the transaction may handle calls.
    pub(crate) fn ensure_active(&self) -> CoreResult<()> {
        self.ensure_not_discarded()?;
        if self.is_active() || self.sub_transaction().is_none() {
            Ok(())
        } else {
            Err(CoreError::TransactionInactive {
                transaction: self.id(),
            })
        }
    }

    pub(crate) fn ensure_writeable(&self, operation: &str) -> CoreResult<()> {
        if self.is_writeable() {
            Ok(())
        } else {
            Err(CoreError::read_only(self.id(), operation))
        }
    }

    fn ensure_enlisted(&self, object: &DomainObject) -> CoreResult<()> {
        if object.belongs_to(self.inner.hierarchy_manager.hierarchy())
            && self.inner.enlisted.is_enlisted(object)
        {
            Ok(())
        } else {
            Err(CoreError::ObjectNotEnlisted {
                id: object.id().clone(),
                transaction: self.id(),
            })
        }
    }

    /// Fails for objects of another hierarchy and for invalid objects.
    pub(crate) fn ensure_valid(&self, object: &DomainObject) -> CoreResult<()> {
        self.ensure_enlisted(object)?;
        if self.inner.invalid.is_invalid(object.id()) {
            return Err(CoreError::ObjectInvalid {
                id: object.id().clone(),
            });
        }
        Ok(())
    }
}

impl PartialEq for ClientTransaction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ClientTransaction {}

impl fmt::Debug for ClientTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTransaction")
            .field("id", &self.inner.id)
            .field("parent", &self.parent_transaction().map(ClientTransaction::id))
            .field("discarded", &self.is_discarded())
            .finish_non_exhaustive()
    }
}
