//! Persistence of sub-transactions.

use super::{PersistableData, PersistenceStrategy};
use crate::data_container::DataContainer;
use crate::end_point::RelationEndPointId;
use crate::error::{CoreError, CoreResult};
use crate::mapping::{ClassDefinition, RelationEndPointDefinition};
use crate::query::Query;
use crate::transaction::ClientTransaction;
use crate::types::ValueAccess;
use domobj_codec::ObjectId;
use domobj_storage::Timestamp;

/// Reads through and commits into the parent transaction.
///
/// Loaded data is the parent's current data: a sub-transaction sees every
/// uncommitted change of its ancestors as its original state.
#[derive(Debug)]
pub struct SubPersistenceStrategy {
    parent: ClientTransaction,
}

impl SubPersistenceStrategy {
    /// Creates a strategy delegating to `parent`.
    #[must_use]
    pub fn new(parent: ClientTransaction) -> Self {
        Self { parent }
    }

    /// Drops ids that are invalid or deleted in the parent.
    fn valid_in_parent(&self, ids: Vec<ObjectId>) -> Vec<ObjectId> {
        let invalid = self.parent.invalid_objects();
        let data = self.parent.data_manager();
        ids.into_iter()
            .filter(|id| !invalid.is_invalid(id) && !data.is_deleted(id))
            .collect()
    }

    fn load_existing(&self, ids: &[ObjectId]) -> CoreResult<Vec<DataContainer>> {
        Ok(self.load_object_data(ids)?.into_iter().flatten().collect())
    }
}

impl PersistenceStrategy for SubPersistenceStrategy {
    fn parent_transaction(&self) -> Option<ClientTransaction> {
        Some(self.parent.clone())
    }

    fn create_new_object_id(&self, class: &ClassDefinition) -> CoreResult<ObjectId> {
        self.parent.persistence().create_new_object_id(class)
    }

    fn load_object_data(&self, ids: &[ObjectId]) -> CoreResult<Vec<Option<DataContainer>>> {
        if let Some(id) = ids
            .iter()
            .find(|id| self.parent.invalid_objects().is_invalid(id))
        {
            return Err(CoreError::ObjectInvalid { id: id.clone() });
        }
        self.parent
            .data_manager()
            .get_data_containers_with_lazy_load(&self.parent, ids, false)?
            .into_iter()
            .map(|container| match container {
                Some(parent) if parent.is_deleted() => Err(CoreError::ObjectInvalid {
                    id: parent.id().clone(),
                }),
                Some(parent) => Ok(Some(DataContainer::new_from_parent(&parent))),
                None => Ok(None),
            })
            .collect()
    }

    fn load_related_object_data(
        &self,
        end_point: &RelationEndPointId,
        definition: &RelationEndPointDefinition,
    ) -> CoreResult<Vec<DataContainer>> {
        let ids = self.parent.data_manager().related_ids(
            &self.parent,
            end_point,
            definition,
            ValueAccess::Current,
        )?;
        self.load_existing(&self.valid_in_parent(ids))
    }

    fn execute_collection_query(&self, query: &Query) -> CoreResult<Vec<DataContainer>> {
        let containers = self.parent.persistence().execute_collection_query(query)?;
        let objects = self
            .parent
            .data_manager()
            .register_loaded(&self.parent, containers)?;
        let ids = objects.iter().map(|o| o.id().clone()).collect();
        self.load_existing(&self.valid_in_parent(ids))
    }

    fn persist_data(
        &self,
        data: &[PersistableData],
    ) -> CoreResult<Vec<(ObjectId, Option<Timestamp>)>> {
        self.parent
            .data_manager()
            .apply_sub_transaction_data(&self.parent, data)?;
        tracing::debug!(parent = %self.parent.id(), objects = data.len(), "sub-transaction data committed into parent");
        Ok(Vec::new())
    }
}
