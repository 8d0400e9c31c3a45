//! Transaction hierarchies: parent/sub links, writeability and activity.

use crate::error::{CoreError, CoreResult};
use crate::events::{ClientTransactionListener, EventBroker};
use crate::domain_object::DomainObject;
use crate::transaction::{ClientTransaction, WeakTransaction};
use crate::types::TransactionId;
use domobj_codec::ClassId;
use parking_lot::RwLock;
use std::sync::Arc;

/// State shared by every transaction of one root hierarchy.
///
/// Holds weak links only; transactions keep the hierarchy alive, not the
/// other way round.
#[derive(Default)]
pub(crate) struct TransactionHierarchy {
    root: RwLock<Option<WeakTransaction>>,
    active: RwLock<Option<WeakTransaction>>,
}

impl TransactionHierarchy {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn root_transaction(&self) -> Option<ClientTransaction> {
        self.root.read().as_ref()?.upgrade()
    }

    pub(crate) fn set_root(&self, tx: &ClientTransaction) {
        *self.root.write() = Some(tx.downgrade());
    }

    /// The transaction that handles inbound calls for objects of the
    /// hierarchy.
    pub(crate) fn active_transaction(&self) -> Option<ClientTransaction> {
        self.active.read().as_ref()?.upgrade()
    }

    pub(crate) fn set_active(&self, tx: &ClientTransaction) {
        *self.active.write() = Some(tx.downgrade());
    }

    pub(crate) fn active_weak(&self) -> Option<WeakTransaction> {
        self.active.read().clone()
    }

    pub(crate) fn restore_active(&self, previous: Option<WeakTransaction>) {
        *self.active.write() = previous;
    }

    pub(crate) fn is_active(&self, tx: &ClientTransaction) -> bool {
        self.active
            .read()
            .as_ref()
            .is_some_and(|active| active.refers_to(tx))
    }
}

/// Maintains the position of one transaction in its hierarchy.
///
/// A transaction holds its parent strongly and its sub-transaction weakly:
/// dropping or discarding the sub-transaction makes the parent writeable
/// again.
pub struct TransactionHierarchyManager {
    transaction_id: TransactionId,
    parent: Option<ClientTransaction>,
    sub: RwLock<Option<WeakTransaction>>,
    hierarchy: Arc<TransactionHierarchy>,
}

impl TransactionHierarchyManager {
    /// Creates the manager of a root transaction.
    #[must_use]
    pub fn new_root(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            parent: None,
            sub: RwLock::new(None),
            hierarchy: TransactionHierarchy::new(),
        }
    }

    /// Creates the manager of a sub-transaction of `parent`.
    #[must_use]
    pub fn new_sub(transaction_id: TransactionId, parent: ClientTransaction) -> Self {
        let hierarchy = Arc::clone(parent.hierarchy_manager().hierarchy());
        Self {
            transaction_id,
            parent: Some(parent),
            sub: RwLock::new(None),
            hierarchy,
        }
    }

    /// Returns the parent transaction.
    #[must_use]
    pub fn parent_transaction(&self) -> Option<&ClientTransaction> {
        self.parent.as_ref()
    }

    /// Returns the live sub-transaction, if any.
    #[must_use]
    pub fn sub_transaction(&self) -> Option<ClientTransaction> {
        self.sub
            .read()
            .as_ref()?
            .upgrade()
            .filter(|sub| !sub.is_discarded())
    }

    /// Returns the root transaction of the hierarchy.
    #[must_use]
    pub fn root_transaction(&self) -> Option<ClientTransaction> {
        self.hierarchy.root_transaction()
    }

    /// A transaction is writeable while it has no live sub-transaction.
    #[must_use]
    pub fn is_writeable(&self) -> bool {
        self.sub_transaction().is_none()
    }

    pub(crate) fn hierarchy(&self) -> &Arc<TransactionHierarchy> {
        &self.hierarchy
    }

    /// Installs the read-only guard on the transaction's broker.
    pub fn install_listeners(&self, broker: &EventBroker) {
        broker.add_listener(Arc::new(ReadOnlyTransactionListener));
    }

    /// Links a freshly allocated transaction into the hierarchy.
    pub(crate) fn on_transaction_created(&self, tx: &ClientTransaction) {
        if self.parent.is_none() {
            self.hierarchy.set_root(tx);
            self.hierarchy.set_active(tx);
        }
    }

    /// Runs after the transaction is wired and before it is initialized.
    /// For sub-transactions this raises the parent's
    /// `sub_transaction_initialize` event.
    pub(crate) fn on_before_transaction_initialize(&self, tx: &ClientTransaction) -> CoreResult<()> {
        match &self.parent {
            Some(parent) => parent
                .event_broker()
                .raise_sub_transaction_initialize(parent, tx),
            None => Ok(()),
        }
    }

    /// Detaches a discarded transaction: the parent becomes writeable and,
    /// if the transaction was active, the parent becomes active.
    pub(crate) fn on_transaction_discard(&self, tx: &ClientTransaction) {
        if let Some(parent) = &self.parent {
            parent.hierarchy_manager().remove_sub_transaction(tx);
            if self.hierarchy.is_active(tx) {
                self.hierarchy.set_active(parent);
            }
        }
        tracing::debug!(transaction = %self.transaction_id, "transaction detached from hierarchy");
    }

    fn remove_sub_transaction(&self, sub: &ClientTransaction) {
        let mut slot = self.sub.write();
        if slot.as_ref().is_some_and(|current| current.refers_to(sub)) {
            *slot = None;
        }
    }

    /// Creates a sub-transaction through `factory` and activates it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the transaction is not
    /// writeable, and propagates event and construction errors.
    pub(crate) fn create_sub_transaction(
        &self,
        tx: &ClientTransaction,
        factory: impl FnOnce(&ClientTransaction) -> CoreResult<ClientTransaction>,
    ) -> CoreResult<ClientTransaction> {
        if !self.is_writeable() {
            return Err(CoreError::invalid_operation(format!(
                "transaction {} already has an active sub-transaction",
                self.transaction_id
            )));
        }
        tx.event_broker().raise_sub_transaction_creating(tx)?;
        let sub = factory(tx)?;
        if !sub.parent_transaction().is_some_and(|parent| parent == tx) {
            return Err(CoreError::invalid_operation(
                "the sub-transaction factory returned a transaction with a different parent",
            ));
        }
        *self.sub.write() = Some(sub.downgrade());
        self.hierarchy.set_active(&sub);
        tracing::debug!(transaction = %self.transaction_id, sub = %sub.id(), "sub-transaction created");
        tx.event_broker().raise_sub_transaction_created(tx, &sub)?;
        Ok(sub)
    }
}

impl std::fmt::Debug for TransactionHierarchyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHierarchyManager")
            .field("transaction", &self.transaction_id)
            .field("parent", &self.parent.as_ref().map(ClientTransaction::id))
            .field("writeable", &self.is_writeable())
            .finish()
    }
}

/// Rejects modifications of a transaction that has a live sub-transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyTransactionListener;

impl ReadOnlyTransactionListener {
    fn ensure_writeable(tx: &ClientTransaction, operation: &str) -> CoreResult<()> {
        if tx.is_writeable() {
            Ok(())
        } else {
            Err(CoreError::read_only(tx.id(), operation))
        }
    }
}

impl ClientTransactionListener for ReadOnlyTransactionListener {
    fn new_object_creating(&self, tx: &ClientTransaction, class_id: &ClassId) -> CoreResult<()> {
        Self::ensure_writeable(tx, &format!("create a new '{class_id}'"))
    }

    fn object_deleting(&self, tx: &ClientTransaction, object: &DomainObject) -> CoreResult<()> {
        Self::ensure_writeable(tx, &format!("delete '{object}'"))
    }

    fn objects_unloading(
        &self,
        tx: &ClientTransaction,
        _objects: &[DomainObject],
    ) -> CoreResult<()> {
        Self::ensure_writeable(tx, "unload objects")
    }

    fn property_value_changing(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        _old_value: &domobj_codec::Value,
        _new_value: &domobj_codec::Value,
    ) -> CoreResult<()> {
        Self::ensure_writeable(tx, &format!("set property '{property}' of '{object}'"))
    }

    fn relation_changing(
        &self,
        tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        _old_related: Option<&DomainObject>,
        _new_related: Option<&DomainObject>,
    ) -> CoreResult<()> {
        Self::ensure_writeable(tx, &format!("change relation '{property}' of '{object}'"))
    }
}
