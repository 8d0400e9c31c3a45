//! Batched loading of object data.

use crate::config::Config;
use crate::data_container::DataContainer;
use crate::domain_object::DomainObject;
use crate::enlisted::EnlistedDomainObjectManager;
use crate::error::{CoreError, CoreResult};
use crate::events::EventBroker;
use crate::hierarchy::TransactionHierarchy;
use crate::persistence::PersistenceStrategy;
use crate::transaction::ClientTransaction;
use domobj_codec::ObjectId;
use std::sync::Arc;

/// The result of fetching object data.
#[derive(Debug, Default)]
pub(crate) struct FetchedObjects {
    pub(crate) found: Vec<DataContainer>,
    pub(crate) not_found: Vec<ObjectId>,
}

/// Fetches data through the persistence strategy and connects it to the
/// hierarchy's domain objects.
///
/// The loader does not register anything; the data manager decides which
/// fetched data wins over data it already holds.
pub struct ObjectLoader {
    persistence: Arc<dyn PersistenceStrategy>,
    enlisted: Arc<EnlistedDomainObjectManager>,
    hierarchy: Arc<TransactionHierarchy>,
    broker: Arc<EventBroker>,
    config: Config,
}

impl ObjectLoader {
    pub(crate) fn new(
        persistence: Arc<dyn PersistenceStrategy>,
        enlisted: Arc<EnlistedDomainObjectManager>,
        hierarchy: Arc<TransactionHierarchy>,
        broker: Arc<EventBroker>,
        config: Config,
    ) -> Self {
        Self {
            persistence,
            enlisted,
            hierarchy,
            broker,
            config,
        }
    }

    /// Fetches the data of `ids` in batches of at most `load_batch_size`.
    pub(crate) fn fetch(&self, ids: &[ObjectId]) -> CoreResult<FetchedObjects> {
        let mut fetched = FetchedObjects::default();
        if ids.is_empty() {
            return Ok(fetched);
        }
        for batch in ids.chunks(self.config.batch_len(ids.len())) {
            let results = self.persistence.load_object_data(batch)?;
            if results.len() != batch.len() {
                return Err(CoreError::invalid_operation(format!(
                    "persistence returned {} results for {} ids",
                    results.len(),
                    batch.len()
                )));
            }
            for (id, result) in batch.iter().zip(results) {
                match result {
                    Some(container) if container.id() == id => fetched.found.push(container),
                    Some(container) => {
                        return Err(CoreError::invalid_operation(format!(
                            "persistence returned '{}' when '{id}' was requested",
                            container.id()
                        )));
                    }
                    None => fetched.not_found.push(id.clone()),
                }
            }
        }
        Ok(fetched)
    }

    pub(crate) fn persistence(&self) -> &Arc<dyn PersistenceStrategy> {
        &self.persistence
    }

    /// Connects a container to the enlisted object for its id.
    pub(crate) fn attach(&self, container: &mut DataContainer) -> CoreResult<DomainObject> {
        let object = self.enlisted.get_or_create(container.id(), &self.hierarchy);
        container.set_domain_object(object.clone())?;
        Ok(object)
    }

    /// Returns the enlisted object for `id`, creating the reference if
    /// needed.
    pub(crate) fn object_reference(&self, id: &ObjectId) -> DomainObject {
        self.enlisted.get_or_create(id, &self.hierarchy)
    }

    pub(crate) fn enlisted_object(&self, id: &ObjectId) -> Option<DomainObject> {
        self.enlisted.get_enlisted(id)
    }

    pub(crate) fn raise_loading(&self, tx: &ClientTransaction, ids: &[ObjectId]) -> CoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.broker.raise_objects_loading(tx, ids)
    }

    /// Raises `objects_loaded` and marks the objects initialized.
    pub(crate) fn raise_loaded(
        &self,
        tx: &ClientTransaction,
        objects: &[DomainObject],
    ) -> CoreResult<()> {
        if objects.is_empty() {
            return Ok(());
        }
        self.broker.raise_objects_loaded(tx, objects)?;
        for object in objects {
            object.mark_loaded();
        }
        tracing::debug!(transaction = %tx.id(), count = objects.len(), "objects loaded");
        Ok(())
    }
}

impl std::fmt::Debug for ObjectLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectLoader")
            .field("load_batch_size", &self.config.load_batch_size)
            .finish_non_exhaustive()
    }
}
