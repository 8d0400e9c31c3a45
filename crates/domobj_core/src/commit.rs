//! Commit and rollback of a transaction's changes.

use crate::data_manager::DataManager;
use crate::domain_object::DomainObject;
use crate::error::{CoreError, CoreResult};
use crate::events::EventBroker;
use crate::invalid::InvalidDomainObjectManager;
use crate::persistence::{PersistableData, PersistenceStrategy};
use crate::state::DomainObjectState;
use crate::transaction::ClientTransaction;
use domobj_codec::ObjectId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Returns `true` if an object in `state` represents unsaved work.
///
/// New, changed and deleted objects are part of a commit; invalid objects
/// and objects that are merely not loaded are not.
#[must_use]
pub const fn is_commit_relevant(state: DomainObjectState) -> bool {
    !state.is_invalid() && (state.is_new() || state.is_changed() || state.is_deleted())
}

/// Lets `committing` handlers ask for another `committing` notification.
///
/// Handlers that change objects while committing register them here so
/// that every handler sees the final state of the commit set. Only objects
/// that are part of the current commit set can be registered.
#[derive(Debug)]
pub struct CommittingEventRegistrar {
    commit_set: HashSet<ObjectId>,
    registered: Mutex<Vec<DomainObject>>,
}

impl CommittingEventRegistrar {
    fn new(data: &[PersistableData]) -> Self {
        Self {
            commit_set: data.iter().map(|d| d.domain_object.id().clone()).collect(),
            registered: Mutex::new(Vec::new()),
        }
    }

    /// Requests another `committing` event for `objects`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if an object is not part of
    /// the commit set.
    pub fn register_for_additional_committing_events(
        &self,
        objects: &[DomainObject],
    ) -> CoreResult<()> {
        if let Some(object) = objects
            .iter()
            .find(|o| !self.commit_set.contains(o.id()))
        {
            return Err(CoreError::invalid_argument(format!(
                "'{}' cannot be registered for committing events because it is not part of the commit set",
                object.id()
            )));
        }
        self.registered.lock().extend(objects.iter().cloned());
        Ok(())
    }

    fn into_registered(self) -> HashSet<ObjectId> {
        self.registered
            .into_inner()
            .iter()
            .map(|o| o.id().clone())
            .collect()
    }
}

/// Drives the commit and rollback protocol of one transaction.
pub struct CommitRollbackAgent {
    broker: Arc<EventBroker>,
    persistence: Arc<dyn PersistenceStrategy>,
    data_manager: Arc<DataManager>,
    invalid: Arc<InvalidDomainObjectManager>,
}

impl CommitRollbackAgent {
    /// Creates an agent.
    #[must_use]
    pub fn new(
        broker: Arc<EventBroker>,
        persistence: Arc<dyn PersistenceStrategy>,
        data_manager: Arc<DataManager>,
        invalid: Arc<InvalidDomainObjectManager>,
    ) -> Self {
        Self {
            broker,
            persistence,
            data_manager,
            invalid,
        }
    }

    /// Returns `true` if the transaction holds unsaved work.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.data_manager.has_changed()
    }

    /// Commits the transaction's changes.
    ///
    /// Nothing in memory changes unless persisting succeeds.
    pub(crate) fn commit_data(&self, tx: &ClientTransaction) -> CoreResult<()> {
        let data = self.raise_committing_events(tx)?;
        self.broker.raise_commit_validate(tx, &data)?;

        let timestamps = self.persistence.persist_data(&data)?;
        let deleted = self.data_manager.commit_all(&timestamps);
        for object in &deleted {
            self.invalid.mark_invalid(tx, object)?;
        }

        let committed: Vec<DomainObject> = data
            .iter()
            .filter(|d| !d.state.is_deleted())
            .map(|d| d.domain_object.clone())
            .collect();
        tracing::debug!(
            transaction = %tx.id(),
            committed = committed.len(),
            deleted = deleted.len(),
            "transaction committed"
        );
        self.broker.raise_committed(tx, &committed)
    }

    /// Raises `committing` until no handler asks for another round, and
    /// returns the final commit set.
    fn raise_committing_events(&self, tx: &ClientTransaction) -> CoreResult<Vec<PersistableData>> {
        let mut data = self.data_manager.get_new_changed_deleted_data();
        let mut notified: HashSet<ObjectId> = HashSet::new();
        let mut pending: Vec<DomainObject> = data.iter().map(|d| d.domain_object.clone()).collect();

        while !pending.is_empty() {
            notified.extend(pending.iter().map(|o| o.id().clone()));
            let registrar = CommittingEventRegistrar::new(&data);
            self.broker.raise_committing(tx, &pending, &registrar)?;

            let registered = registrar.into_registered();
            data = self.data_manager.get_new_changed_deleted_data();
            pending = data
                .iter()
                .map(|d| &d.domain_object)
                .filter(|o| registered.contains(o.id()) || !notified.contains(o.id()))
                .cloned()
                .collect();
        }
        Ok(data)
    }

    /// Restores the state of the last commit.
    pub(crate) fn rollback_data(&self, tx: &ClientTransaction) -> CoreResult<()> {
        let objects: Vec<DomainObject> = self
            .data_manager
            .get_new_changed_deleted_data()
            .into_iter()
            .map(|d| d.domain_object)
            .collect();
        self.broker.raise_rolling_back(tx, &objects)?;

        let discarded = self.data_manager.rollback_all();
        for object in &discarded {
            self.invalid.mark_invalid(tx, object)?;
        }
        let rolled_back: Vec<DomainObject> = objects
            .into_iter()
            .filter(|o| !discarded.iter().any(|d| d.ptr_eq(o)))
            .collect();
        tracing::debug!(
            transaction = %tx.id(),
            rolled_back = rolled_back.len(),
            discarded = discarded.len(),
            "transaction rolled back"
        );
        self.broker.raise_rolled_back(tx, &rolled_back)
    }
}

impl std::fmt::Debug for CommitRollbackAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitRollbackAgent").finish_non_exhaustive()
    }
}
