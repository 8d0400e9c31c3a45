//! Creation, retrieval and deletion of domain objects.

use crate::data_container::DataContainer;
use crate::data_manager::DataManager;
use crate::domain_object::DomainObject;
use crate::end_point::RelationEndPointCommand;
use crate::enlisted::EnlistedDomainObjectManager;
use crate::error::{CoreError, CoreResult};
use crate::events::EventBroker;
use crate::hierarchy::{TransactionHierarchy, TransactionHierarchyManager};
use crate::invalid::InvalidDomainObjectManager;
use crate::mapping::MappingConfiguration;
use crate::persistence::PersistenceStrategy;
use crate::transaction::ClientTransaction;
use domobj_codec::{ClassId, ObjectId};
use std::sync::Arc;

/// Implements the object access operations of a transaction.
pub struct ObjectLifetimeAgent {
    mapping: Arc<MappingConfiguration>,
    broker: Arc<EventBroker>,
    enlisted: Arc<EnlistedDomainObjectManager>,
    invalid: Arc<InvalidDomainObjectManager>,
    persistence: Arc<dyn PersistenceStrategy>,
    data_manager: Arc<DataManager>,
    hierarchy: Arc<TransactionHierarchy>,
}

impl ObjectLifetimeAgent {
    /// Creates an agent.
    #[must_use]
    pub fn new(
        mapping: Arc<MappingConfiguration>,
        broker: Arc<EventBroker>,
        enlisted: Arc<EnlistedDomainObjectManager>,
        invalid: Arc<InvalidDomainObjectManager>,
        persistence: Arc<dyn PersistenceStrategy>,
        data_manager: Arc<DataManager>,
        hierarchy_manager: &TransactionHierarchyManager,
    ) -> Self {
        Self {
            mapping,
            broker,
            enlisted,
            invalid,
            persistence,
            data_manager,
            hierarchy: Arc::clone(hierarchy_manager.hierarchy()),
        }
    }

    /// Creates a new object of `class_id`.
    ///
    /// The object is invalid in every ancestor transaction until a commit
    /// brings it there.
    pub(crate) fn new_object(
        &self,
        tx: &ClientTransaction,
        class_id: &ClassId,
    ) -> CoreResult<DomainObject> {
        let class = self.mapping.class(class_id)?;
        if class.is_abstract() {
            return Err(CoreError::invalid_argument(format!(
                "cannot create an instance of abstract class '{class_id}'"
            )));
        }
        self.broker.raise_new_object_creating(tx, class_id)?;

        let id = self.persistence.create_new_object_id(class)?;
        let object = DomainObject::new(id.clone(), &self.hierarchy);
        self.enlisted.enlist(&object)?;
        object.mark_loaded();
        self.data_manager.register_new_object(
            DataContainer::new_for_new_object(Arc::clone(class), id),
            &object,
        )?;

        let mut ancestor = tx.parent_transaction().cloned();
        while let Some(parent) = ancestor {
            parent.invalid_objects().mark_invalid(&parent, &object)?;
            ancestor = parent.parent_transaction().cloned();
        }
        tracing::debug!(transaction = %tx.id(), object = %object, "object created");
        Ok(object)
    }

    /// Returns the object for `id` without loading its data.
    pub(crate) fn get_object_reference(&self, id: &ObjectId) -> CoreResult<DomainObject> {
        if let Some(object) = self.invalid.invalid_object(id) {
            return Ok(object);
        }
        self.mapping.class(id.class_id())?;
        Ok(self.enlisted.get_or_create(id, &self.hierarchy))
    }

    /// Returns the loaded object for `id`.
    pub(crate) fn get_object(
        &self,
        tx: &ClientTransaction,
        id: &ObjectId,
        include_deleted: bool,
    ) -> CoreResult<DomainObject> {
        if self.invalid.is_invalid(id) {
            return Err(CoreError::ObjectInvalid { id: id.clone() });
        }
        self.mapping.class(id.class_id())?;
        let (object, deleted) = self.data_manager.with_data_container(tx, id, |container| {
            (container.domain_object().cloned(), container.is_deleted())
        })?;
        if deleted && !include_deleted {
            return Err(CoreError::ObjectDeleted { id: id.clone() });
        }
        object.ok_or_else(|| CoreError::invalid_operation(format!("'{id}' has no domain object")))
    }

    /// Returns the object for `id`, or `None` if it does not exist.
    ///
    /// Invalid objects are returned as they are, and so are deleted ones.
    pub(crate) fn try_get_object(
        &self,
        tx: &ClientTransaction,
        id: &ObjectId,
    ) -> CoreResult<Option<DomainObject>> {
        if let Some(object) = self.invalid.invalid_object(id) {
            return Ok(Some(object));
        }
        self.mapping.class(id.class_id())?;
        let container = self.data_manager.get_data_container_with_lazy_load(tx, id, false)?;
        Ok(match container {
            Some(container) => container.domain_object().cloned(),
            None => self.invalid.invalid_object(id),
        })
    }

    /// Returns the loaded objects for `ids`, in order. Deleted objects are
    /// included.
    pub(crate) fn get_objects(
        &self,
        tx: &ClientTransaction,
        ids: &[ObjectId],
    ) -> CoreResult<Vec<DomainObject>> {
        if let Some(id) = ids.iter().find(|id| self.invalid.is_invalid(id)) {
            return Err(CoreError::ObjectInvalid { id: id.clone() });
        }
        self.data_manager
            .get_data_containers_with_lazy_load(tx, ids, true)?
            .into_iter()
            .zip(ids)
            .map(|(container, id)| {
                container
                    .and_then(|c| c.domain_object().cloned())
                    .ok_or_else(|| CoreError::ObjectsNotFound {
                        ids: vec![id.clone()],
                    })
            })
            .collect()
    }

    /// Like [`get_objects`](Self::get_objects), with `None` for objects
    /// that do not exist.
    pub(crate) fn try_get_objects(
        &self,
        tx: &ClientTransaction,
        ids: &[ObjectId],
    ) -> CoreResult<Vec<Option<DomainObject>>> {
        let loadable: Vec<ObjectId> = ids
            .iter()
            .filter(|id| !self.invalid.is_invalid(id))
            .cloned()
            .collect();
        self.data_manager
            .get_data_containers_with_lazy_load(tx, &loadable, false)?;
        ids.iter()
            .map(|id| {
                if let Some(object) = self.invalid.invalid_object(id) {
                    return Ok(Some(object));
                }
                Ok(self
                    .data_manager
                    .get_data_container_without_loading(id)
                    .and_then(|c| c.domain_object().cloned()))
            })
            .collect()
    }

    /// Deletes an object and removes it from every relation.
    ///
    /// Deleting a deleted object does nothing. A new object is discarded
    /// and becomes invalid.
    pub(crate) fn delete(&self, tx: &ClientTransaction, object: &DomainObject) -> CoreResult<()> {
        let id = object.id();
        if self.invalid.is_invalid(id) {
            return Err(CoreError::ObjectInvalid { id: id.clone() });
        }
        let deleted = self
            .data_manager
            .with_data_container(tx, id, DataContainer::is_deleted)?;
        if deleted {
            return Ok(());
        }

        self.broker.raise_object_deleting(tx, object)?;
        let expanded = self.data_manager.prepare(
            tx,
            &RelationEndPointCommand::Delete { object: id.clone() },
        )?;
        let changes = self.data_manager.relation_changes(&expanded);
        for change in &changes {
            change.raise_changing(&self.broker, tx)?;
        }

        self.data_manager.perform(&expanded)?;
        if self.data_manager.delete_object(id)? {
            self.invalid.mark_invalid(tx, object)?;
        }
        tracing::debug!(transaction = %tx.id(), object = %object, "object deleted");

        for change in changes.iter().rev() {
            change.raise_changed(&self.broker, tx)?;
        }
        self.broker.raise_object_deleted(tx, object)
    }
}

impl std::fmt::Debug for ObjectLifetimeAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectLifetimeAgent").finish_non_exhaustive()
    }
}
