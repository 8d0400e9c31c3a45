//! Persistence of root transactions.

use super::{PersistableData, PersistenceStrategy};
use crate::data_container::{DataContainer, PersistenceState};
use crate::end_point::RelationEndPointId;
use crate::error::{CoreError, CoreResult};
use crate::mapping::{ClassDefinition, MappingConfiguration, RelationEndPointDefinition};
use crate::query::Query;
use crate::transaction::ClientTransaction;
use domobj_codec::{ObjectId, Value};
use domobj_storage::{RecordQuery, RecordWrite, StorageProvider, StoredRecord, Timestamp};
use std::sync::Arc;

/// Loads from and commits to a storage provider.
pub struct RootPersistenceStrategy {
    mapping: Arc<MappingConfiguration>,
    storage: Arc<dyn StorageProvider>,
}

impl RootPersistenceStrategy {
    /// Creates a strategy over `storage`.
    #[must_use]
    pub fn new(mapping: Arc<MappingConfiguration>, storage: Arc<dyn StorageProvider>) -> Self {
        Self { mapping, storage }
    }

    /// Returns the storage provider.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.storage
    }

    fn container_for(&self, record: &StoredRecord) -> CoreResult<DataContainer> {
        let class = self.mapping.class(record.id.class_id())?;
        Ok(DataContainer::new_for_existing(Arc::clone(class), record))
    }

    fn record_query(&self, class: &ClassDefinition, filter: Option<(String, Value)>) -> RecordQuery {
        RecordQuery {
            class_ids: class.self_and_derived().to_vec(),
            filter,
        }
    }
}

/// Translates the commit set into storage writes. Unchanged data and
/// end-point-only entries produce no write.
fn record_writes(data: &[PersistableData]) -> CoreResult<Vec<RecordWrite>> {
    let mut writes = Vec::new();
    for container in data.iter().filter_map(|d| d.data_container.as_ref()) {
        let id = container.id().clone();
        let expected = || {
            container.timestamp().ok_or_else(|| {
                CoreError::invalid_operation(format!("object '{id}' has no concurrency timestamp"))
            })
        };
        match container.persistence_state() {
            PersistenceState::New => writes.push(RecordWrite::Insert {
                id: id.clone(),
                properties: container.persistent_values(),
            }),
            PersistenceState::Deleted => writes.push(RecordWrite::Delete {
                id: id.clone(),
                expected: expected()?,
            }),
            PersistenceState::Existing if container.needs_write() => {
                writes.push(RecordWrite::Update {
                    id: id.clone(),
                    expected: expected()?,
                    properties: container.persistent_values(),
                });
            }
            PersistenceState::Existing => {}
        }
    }
    Ok(writes)
}

impl PersistenceStrategy for RootPersistenceStrategy {
    fn parent_transaction(&self) -> Option<ClientTransaction> {
        None
    }

    fn create_new_object_id(&self, class: &ClassDefinition) -> CoreResult<ObjectId> {
        if class.is_abstract() {
            return Err(CoreError::invalid_argument(format!(
                "cannot create an instance of the abstract class '{}'",
                class.id()
            )));
        }
        Ok(self.storage.new_object_id(class.id())?)
    }

    fn load_object_data(&self, ids: &[ObjectId]) -> CoreResult<Vec<Option<DataContainer>>> {
        for id in ids {
            self.mapping.class(id.class_id())?;
        }
        self.storage
            .load_many(ids)?
            .iter()
            .map(|record| record.as_ref().map(|r| self.container_for(r)).transpose())
            .collect()
    }

    fn load_related_object_data(
        &self,
        end_point: &RelationEndPointId,
        definition: &RelationEndPointDefinition,
    ) -> CoreResult<Vec<DataContainer>> {
        let opposite = self.mapping.opposite_end_point(definition)?;
        let class = self.mapping.class(&opposite.class_id)?;
        let query = self.record_query(
            class,
            Some((
                opposite.property_name.clone(),
                Value::ObjectId(end_point.object_id().clone()),
            )),
        );
        self.storage
            .query(&query)?
            .iter()
            .map(|record| self.container_for(record))
            .collect()
    }

    fn execute_collection_query(&self, query: &Query) -> CoreResult<Vec<DataContainer>> {
        let class = self.mapping.class(&query.class_id)?;
        let query = self.record_query(class, query.filter.clone());
        self.storage
            .query(&query)?
            .iter()
            .map(|record| self.container_for(record))
            .collect()
    }

    fn persist_data(
        &self,
        data: &[PersistableData],
    ) -> CoreResult<Vec<(ObjectId, Option<Timestamp>)>> {
        let writes = record_writes(data)?;
        if writes.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<ObjectId> = writes.iter().map(|w| w.id().clone()).collect();

        let mut session = self.storage.begin()?;
        let staged = session
            .save(&writes)
            .and_then(|()| session.update_timestamps(&ids));
        let timestamps = match staged {
            Ok(timestamps) => timestamps,
            Err(error) => {
                if let Err(rollback_error) = session.rollback() {
                    tracing::warn!(error = %rollback_error, "storage rollback failed");
                }
                return Err(error.into());
            }
        };
        session.commit()?;

        tracing::debug!(writes = writes.len(), "root commit persisted");
        Ok(ids.into_iter().zip(timestamps).collect())
    }
}

impl std::fmt::Debug for RootPersistenceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootPersistenceStrategy").finish_non_exhaustive()
    }
}
