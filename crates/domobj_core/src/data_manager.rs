//! The per-transaction store of data containers and relation end-points.
//!
//! The data manager is the single authority for what a transaction has
//! loaded. Data is loaded lazily through the [`ObjectLoader`]; relation
//! changes are expanded against the store, loading whatever the expansion
//! reports missing, and then performed in one step under the store lock.
//! Events are never raised while the lock is held.

use crate::commit::is_commit_relevant;
use crate::config::Config;
use crate::data_container::{DataContainer, PersistenceState, PropertyValue};
use crate::domain_object::DomainObject;
use crate::end_point::{
    CollectionEndPoint, EndPointLoadState, ExpandError, ExpandedCommand, MissingData,
    RelationEndPointCommand, RelationEndPointId, VirtualEndPoint, VirtualObjectEndPoint,
};
use crate::enlisted::EnlistedDomainObjectManager;
use crate::error::{CoreError, CoreResult};
use crate::events::EventBroker;
use crate::hierarchy::TransactionHierarchyManager;
use crate::invalid::InvalidDomainObjectManager;
use crate::loader::ObjectLoader;
use crate::mapping::{Cardinality, MappingConfiguration, RelationEndPointDefinition};
use crate::persistence::{PersistableData, PersistenceStrategy};
use crate::state::DomainObjectState;
use crate::transaction::ClientTransaction;
use crate::types::ValueAccess;
use domobj_codec::{ObjectId, Value};
use domobj_storage::Timestamp;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The mutable state behind a data manager's lock.
#[derive(Debug, Default)]
pub(crate) struct DataStore {
    pub(crate) containers: HashMap<ObjectId, DataContainer>,
    pub(crate) end_points: HashMap<RelationEndPointId, VirtualEndPoint>,
    registrations: HashMap<ObjectId, u64>,
    next_registration: u64,
    loading: HashSet<RelationEndPointId>,
}

impl DataStore {
    pub(crate) fn container(&self, id: &ObjectId) -> Result<&DataContainer, ExpandError> {
        self.containers
            .get(id)
            .ok_or_else(|| ExpandError::Missing(MissingData::Container(id.clone())))
    }

    /// Returns the current value of a one-valued end-point, real or
    /// virtual.
    pub(crate) fn current_one(
        &self,
        end_point: &RelationEndPointId,
        definition: &RelationEndPointDefinition,
    ) -> Result<Option<ObjectId>, ExpandError> {
        if !definition.is_virtual {
            let container = self.container(end_point.object_id())?;
            return Ok(container.foreign_key(end_point.property_name(), ValueAccess::Current));
        }
        match self.end_points.get(end_point) {
            Some(VirtualEndPoint::Object(loaded)) => Ok(loaded.current().cloned()),
            Some(VirtualEndPoint::Collection(_)) => Err(CoreError::invalid_argument(format!(
                "'{end_point}' is a collection end-point"
            ))
            .into()),
            None => Err(ExpandError::Missing(MissingData::EndPoint(end_point.clone()))),
        }
    }

    pub(crate) fn collection(
        &self,
        end_point: &RelationEndPointId,
    ) -> Result<&CollectionEndPoint, ExpandError> {
        match self.end_points.get(end_point) {
            Some(VirtualEndPoint::Collection(loaded)) => Ok(loaded),
            Some(VirtualEndPoint::Object(_)) => Err(CoreError::invalid_argument(format!(
                "'{end_point}' is not a collection end-point"
            ))
            .into()),
            None => Err(ExpandError::Missing(MissingData::EndPoint(end_point.clone()))),
        }
    }

    fn register(&mut self, container: DataContainer) {
        let id = container.id().clone();
        if !self.registrations.contains_key(&id) {
            self.registrations.insert(id.clone(), self.next_registration);
            self.next_registration += 1;
        }
        self.containers.insert(id, container);
    }

    fn unregister(&mut self, id: &ObjectId) -> Option<DataContainer> {
        self.registrations.remove(id);
        self.containers.remove(id)
    }

    /// Forgets a container together with the end-points its object owns.
    fn discard(&mut self, id: &ObjectId) -> Option<DataContainer> {
        self.end_points
            .retain(|end_point, _| end_point.object_id() != id);
        self.unregister(id)
    }

    /// Registered ids in registration order.
    fn ordered_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<(u64, &ObjectId)> = self
            .registrations
            .iter()
            .map(|(id, order)| (*order, id))
            .collect();
        ids.sort_unstable_by_key(|(order, _)| *order);
        ids.into_iter().map(|(_, id)| id.clone()).collect()
    }
}

/// One relation event derived from an expanded command.
#[derive(Debug, Clone)]
pub(crate) struct RelationChange {
    pub(crate) object: DomainObject,
    pub(crate) property: String,
    pub(crate) old: Option<DomainObject>,
    pub(crate) new: Option<DomainObject>,
}

impl RelationChange {
    pub(crate) fn raise_changing(&self, broker: &EventBroker, tx: &ClientTransaction) -> CoreResult<()> {
        broker.raise_relation_changing(tx, &self.object, &self.property, self.old.as_ref(), self.new.as_ref())
    }

    pub(crate) fn raise_changed(&self, broker: &EventBroker, tx: &ClientTransaction) -> CoreResult<()> {
        broker.raise_relation_changed(tx, &self.object, &self.property, self.old.as_ref(), self.new.as_ref())
    }
}

/// Holds the data containers and virtual end-points of one transaction.
pub struct DataManager {
    mapping: Arc<MappingConfiguration>,
    broker: Arc<EventBroker>,
    invalid: Arc<InvalidDomainObjectManager>,
    loader: ObjectLoader,
    is_root: bool,
    store: Mutex<DataStore>,
}

impl DataManager {
    /// Creates an empty data manager.
    #[must_use]
    pub fn new(
        mapping: Arc<MappingConfiguration>,
        config: Config,
        broker: Arc<EventBroker>,
        invalid: Arc<InvalidDomainObjectManager>,
        enlisted: Arc<EnlistedDomainObjectManager>,
        persistence: Arc<dyn PersistenceStrategy>,
        hierarchy_manager: &TransactionHierarchyManager,
    ) -> Self {
        let loader = ObjectLoader::new(
            persistence,
            enlisted,
            Arc::clone(hierarchy_manager.hierarchy()),
            Arc::clone(&broker),
            config,
        );
        Self {
            mapping,
            broker,
            invalid,
            loader,
            is_root: hierarchy_manager.parent_transaction().is_none(),
            store: Mutex::new(DataStore::default()),
        }
    }

    /// Returns the number of registered data containers.
    #[must_use]
    pub fn data_container_count(&self) -> usize {
        self.store.lock().containers.len()
    }

    /// Returns the number of loaded virtual end-points.
    #[must_use]
    pub fn end_point_count(&self) -> usize {
        self.store.lock().end_points.len()
    }

    /// Returns `true` if data for `id` is registered.
    #[must_use]
    pub fn is_loaded(&self, id: &ObjectId) -> bool {
        self.store.lock().containers.contains_key(id)
    }

    /// Returns a copy of the registered container for `id` without loading.
    #[must_use]
    pub fn get_data_container_without_loading(&self, id: &ObjectId) -> Option<DataContainer> {
        self.store.lock().containers.get(id).cloned()
    }

    /// Returns a copy of the container for `id`, loading it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectsNotFound`] if the object does not exist
    /// and `throw_on_not_found` is set, [`CoreError::ObjectInvalid`] for
    /// invalid objects, and persistence errors.
    pub fn get_data_container_with_lazy_load(
        &self,
        tx: &ClientTransaction,
        id: &ObjectId,
        throw_on_not_found: bool,
    ) -> CoreResult<Option<DataContainer>> {
        self.ensure_loaded(tx, std::slice::from_ref(id), throw_on_not_found)?;
        Ok(self.get_data_container_without_loading(id))
    }

    /// Batched form of [`get_data_container_with_lazy_load`]. Missing data
    /// is fetched in as few round-trips as the batch size allows; the
    /// result preserves input order.
    ///
    /// [`get_data_container_with_lazy_load`]: Self::get_data_container_with_lazy_load
    ///
    /// # Errors
    ///
    /// Same as [`get_data_container_with_lazy_load`](Self::get_data_container_with_lazy_load).
    pub fn get_data_containers_with_lazy_load(
        &self,
        tx: &ClientTransaction,
        ids: &[ObjectId],
        throw_on_not_found: bool,
    ) -> CoreResult<Vec<Option<DataContainer>>> {
        self.ensure_loaded(tx, ids, throw_on_not_found)?;
        let store = self.store.lock();
        Ok(ids.iter().map(|id| store.containers.get(id).cloned()).collect())
    }

    /// Loads every id in `ids` that is not registered yet.
    pub(crate) fn ensure_loaded(
        &self,
        tx: &ClientTransaction,
        ids: &[ObjectId],
        throw_on_not_found: bool,
    ) -> CoreResult<()> {
        let missing: Vec<ObjectId> = {
            let store = self.store.lock();
            let mut seen = HashSet::new();
            ids.iter()
                .filter(|id| !store.containers.contains_key(*id) && seen.insert(*id))
                .cloned()
                .collect()
        };
        if missing.is_empty() {
            return Ok(());
        }
        if let Some(id) = missing.iter().find(|id| self.invalid.is_invalid(id)) {
            return Err(CoreError::ObjectInvalid { id: id.clone() });
        }

        self.loader.raise_loading(tx, &missing)?;
        let fetched = self.loader.fetch(&missing)?;
        let loaded = self.register_fetched(fetched.found)?;
        self.loader.raise_loaded(tx, &loaded)?;

        if fetched.not_found.is_empty() {
            return Ok(());
        }
        self.broker.raise_objects_not_found(tx, &fetched.not_found)?;
        for id in &fetched.not_found {
            if let Some(object) = self.loader.enlisted_object(id) {
                self.invalid.mark_invalid(tx, &object)?;
            }
        }
        if throw_on_not_found {
            return Err(CoreError::ObjectsNotFound {
                ids: fetched.not_found,
            });
        }
        Ok(())
    }

    /// Registers fetched data; data that is already registered wins.
    fn register_fetched(&self, containers: Vec<DataContainer>) -> CoreResult<Vec<DomainObject>> {
        let mut store = self.store.lock();
        let mut loaded = Vec::new();
        for mut container in containers {
            if store.containers.contains_key(container.id()) || self.invalid.is_invalid(container.id()) {
                continue;
            }
            let object = self.loader.attach(&mut container)?;
            store.register(container);
            loaded.push(object);
        }
        Ok(loaded)
    }

    /// Registers data fetched outside of an id lookup (queries, related
    /// objects) and returns the objects in input order. Objects invalid in
    /// this transaction are left out.
    pub(crate) fn register_loaded(
        &self,
        tx: &ClientTransaction,
        containers: Vec<DataContainer>,
    ) -> CoreResult<Vec<DomainObject>> {
        let ids: Vec<ObjectId> = containers.iter().map(|c| c.id().clone()).collect();
        let fresh: Vec<DataContainer> = {
            let store = self.store.lock();
            containers
                .into_iter()
                .filter(|c| !store.containers.contains_key(c.id()))
                .collect()
        };
        let fresh_ids: Vec<ObjectId> = fresh.iter().map(|c| c.id().clone()).collect();
        self.loader.raise_loading(tx, &fresh_ids)?;
        let loaded = self.register_fetched(fresh)?;
        self.loader.raise_loaded(tx, &loaded)?;

        let store = self.store.lock();
        Ok(ids
            .iter()
            .filter_map(|id| store.containers.get(id))
            .filter_map(|c| c.domain_object().cloned())
            .collect())
    }

    /// Runs `f` on the container of `id`, loading it first.
    pub(crate) fn with_data_container<R>(
        &self,
        tx: &ClientTransaction,
        id: &ObjectId,
        f: impl FnOnce(&DataContainer) -> R,
    ) -> CoreResult<R> {
        self.ensure_loaded(tx, std::slice::from_ref(id), true)?;
        let store = self.store.lock();
        store
            .containers
            .get(id)
            .map(f)
            .ok_or_else(|| not_registered(id))
    }

    /// Returns the load state of a virtual end-point.
    #[must_use]
    pub fn end_point_load_state(&self, end_point: &RelationEndPointId) -> EndPointLoadState {
        let store = self.store.lock();
        if store.end_points.contains_key(end_point) {
            EndPointLoadState::Complete
        } else if store.loading.contains(end_point) {
            EndPointLoadState::Loading
        } else {
            EndPointLoadState::NotLoaded
        }
    }

    /// Returns a copy of a virtual end-point if it is complete. Never
    /// loads.
    #[must_use]
    pub fn get_relation_end_point_without_loading(
        &self,
        end_point: &RelationEndPointId,
    ) -> Option<VirtualEndPoint> {
        self.store.lock().end_points.get(end_point).cloned()
    }

    /// Returns a copy of a virtual end-point, loading it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Mapping`] for unknown end-points,
    /// [`CoreError::InvalidArgument`] for real end-points, and load errors.
    pub fn get_relation_end_point_with_lazy_load(
        &self,
        tx: &ClientTransaction,
        end_point: &RelationEndPointId,
    ) -> CoreResult<VirtualEndPoint> {
        let definition = self
            .mapping
            .end_point(end_point.object_id().class_id(), end_point.property_name())?;
        self.ensure_end_point_loaded(tx, end_point, definition)?;
        self.get_relation_end_point_without_loading(end_point)
            .ok_or_else(|| CoreError::invalid_operation(format!("end-point '{end_point}' is not loaded")))
    }

    /// Makes a virtual end-point complete.
    pub(crate) fn ensure_end_point_loaded(
        &self,
        tx: &ClientTransaction,
        end_point: &RelationEndPointId,
        definition: &RelationEndPointDefinition,
    ) -> CoreResult<()> {
        if !definition.is_virtual {
            return Err(CoreError::invalid_argument(format!(
                "'{end_point}' is not a virtual end-point"
            )));
        }
        {
            let mut store = self.store.lock();
            if store.end_points.contains_key(end_point) {
                return Ok(());
            }
            if !store.loading.insert(end_point.clone()) {
                return Err(CoreError::invalid_operation(format!(
                    "end-point '{end_point}' is already being loaded"
                )));
            }
        }
        let result = self.load_end_point(tx, end_point, definition);
        self.store.lock().loading.remove(end_point);
        result
    }

    fn load_end_point(
        &self,
        tx: &ClientTransaction,
        end_point: &RelationEndPointId,
        definition: &RelationEndPointDefinition,
    ) -> CoreResult<()> {
        let owner_is_new = self
            .store
            .lock()
            .containers
            .get(end_point.object_id())
            .is_some_and(DataContainer::is_new);
        let related = if owner_is_new {
            Vec::new()
        } else {
            self.loader
                .persistence()
                .load_related_object_data(end_point, definition)?
        };
        let fetched: Vec<ObjectId> = related.iter().map(|c| c.id().clone()).collect();
        self.register_loaded(tx, related)?;

        let opposite = self.mapping.opposite_end_point(definition)?;
        let mut store = self.store.lock();
        let built = build_end_point(&store, &self.mapping, end_point, definition, opposite, &fetched);
        store.end_points.insert(end_point.clone(), built);
        tracing::trace!(transaction = %tx.id(), end_point = %end_point, "end-point loaded");
        Ok(())
    }

    /// Returns the ids related through an end-point, loading as needed.
    pub(crate) fn related_ids(
        &self,
        tx: &ClientTransaction,
        end_point: &RelationEndPointId,
        definition: &RelationEndPointDefinition,
        access: ValueAccess,
    ) -> CoreResult<Vec<ObjectId>> {
        if !definition.is_virtual {
            return self.with_data_container(tx, end_point.object_id(), |container| {
                container
                    .foreign_key(end_point.property_name(), access)
                    .into_iter()
                    .collect()
            });
        }
        self.ensure_end_point_loaded(tx, end_point, definition)?;
        let store = self.store.lock();
        let loaded = store.end_points.get(end_point).ok_or_else(|| {
            CoreError::invalid_operation(format!("end-point '{end_point}' is not loaded"))
        })?;
        Ok(match access {
            ValueAccess::Current => loaded.current_ids(),
            ValueAccess::Original => loaded.original_ids(),
        })
    }

    /// Registers the container of a newly created object together with
    /// empty virtual end-points.
    pub(crate) fn register_new_object(
        &self,
        mut container: DataContainer,
        object: &DomainObject,
    ) -> CoreResult<()> {
        container.set_domain_object(object.clone())?;
        let mut store = self.store.lock();
        for definition in container.class().virtual_end_points() {
            let id = RelationEndPointId::new(container.id().clone(), &definition.property_name);
            store
                .end_points
                .insert(id.clone(), empty_end_point(id, definition));
        }
        store.register(container);
        Ok(())
    }

    /// Expands a relation command, loading whatever the expansion needs.
    pub(crate) fn prepare(
        &self,
        tx: &ClientTransaction,
        command: &RelationEndPointCommand,
    ) -> CoreResult<ExpandedCommand> {
        let mut attempted: Vec<MissingData> = Vec::new();
        loop {
            let expanded = {
                let store = self.store.lock();
                command.expand_to_all_related_objects(&store, &self.mapping)
            };
            let missing = match expanded {
                Ok(expanded) => return Ok(expanded),
                Err(ExpandError::Failed(error)) => return Err(error),
                Err(ExpandError::Missing(missing)) => missing,
            };
            if attempted.contains(&missing) {
                return Err(CoreError::invalid_operation(format!(
                    "relation data {missing:?} could not be loaded"
                )));
            }
            match &missing {
                MissingData::Container(id) => {
                    self.ensure_loaded(tx, std::slice::from_ref(id), true)?;
                }
                MissingData::EndPoint(end_point) => {
                    let definition = self.mapping.end_point(
                        end_point.object_id().class_id(),
                        end_point.property_name(),
                    )?;
                    self.ensure_end_point_loaded(tx, end_point, definition)?;
                }
            }
            attempted.push(missing);
        }
    }

    /// Applies an expanded command to every affected end-point.
    pub(crate) fn perform(&self, expanded: &ExpandedCommand) -> CoreResult<()> {
        expanded.perform(&mut self.store.lock())
    }

    /// Describes the relation events of an expanded command.
    pub(crate) fn relation_changes(&self, expanded: &ExpandedCommand) -> Vec<RelationChange> {
        let mut changes = Vec::new();
        for modification in expanded.modifications() {
            let end_point = modification.end_point();
            let object = self.loader.object_reference(end_point.object_id());
            for (old, new) in modification.changes() {
                changes.push(RelationChange {
                    object: object.clone(),
                    property: end_point.property_name().to_string(),
                    old: old.map(|id| self.loader.object_reference(&id)),
                    new: new.map(|id| self.loader.object_reference(&id)),
                });
            }
        }
        changes
    }

    /// Sets the current value of a property of a registered object.
    pub(crate) fn set_property_value(
        &self,
        id: &ObjectId,
        name: &str,
        value: Value,
    ) -> CoreResult<Value> {
        let mut store = self.store.lock();
        let container = store.containers.get_mut(id).ok_or_else(|| not_registered(id))?;
        if container.is_deleted() {
            return Err(CoreError::ObjectDeleted { id: id.clone() });
        }
        container.set_value(name, value)
    }

    pub(crate) fn mark_changed(&self, id: &ObjectId) -> CoreResult<()> {
        let mut store = self.store.lock();
        store
            .containers
            .get_mut(id)
            .ok_or_else(|| not_registered(id))?
            .mark_changed()
    }

    /// Marks a registered object deleted. New objects are discarded
    /// instead; returns `true` in that case.
    pub(crate) fn delete_object(&self, id: &ObjectId) -> CoreResult<bool> {
        let mut store = self.store.lock();
        let container = store.containers.get_mut(id).ok_or_else(|| not_registered(id))?;
        if container.is_new() {
            store.discard(id);
            return Ok(true);
        }
        container.delete();
        Ok(false)
    }

    /// Returns `true` if the registered data of `id` is marked deleted.
    #[must_use]
    pub fn is_deleted(&self, id: &ObjectId) -> bool {
        self.store
            .lock()
            .containers
            .get(id)
            .is_some_and(DataContainer::is_deleted)
    }

    /// Computes the state of an object in this transaction.
    #[must_use]
    pub fn state_of(&self, id: &ObjectId) -> DomainObjectState {
        if self.invalid.is_invalid(id) {
            return DomainObjectState::builder().set_invalid().build();
        }
        let store = self.store.lock();
        self.compute_state(&store, id)
    }

    fn compute_state(&self, store: &DataStore, id: &ObjectId) -> DomainObjectState {
        let relation_changed = !self.changed_end_points(store, id).is_empty();
        let mut state = DomainObjectState::builder();
        let Some(container) = store.containers.get(id) else {
            state = state.set_not_loaded_yet();
            if relation_changed {
                state = state.set_changed().set_relation_changed();
            }
            return state.build();
        };
        if container.is_new_in_hierarchy() {
            state = state.set_new_in_hierarchy();
        }
        match container.persistence_state() {
            PersistenceState::New => state.set_new().build(),
            PersistenceState::Deleted => state.set_deleted().build(),
            PersistenceState::Existing => {
                if relation_changed || container.has_foreign_key_changed() {
                    state = state.set_changed().set_relation_changed();
                }
                if container.has_persistent_data_changed() {
                    state = state.set_changed().set_persistent_data_changed();
                }
                if container.has_non_persistent_data_changed() {
                    state = state.set_changed().set_non_persistent_data_changed();
                }
                if container.is_marked_changed() {
                    state = state.set_changed();
                }
                state.build()
            }
        }
    }

    fn changed_end_points(&self, store: &DataStore, id: &ObjectId) -> Vec<VirtualEndPoint> {
        let Ok(class) = self.mapping.class(id.class_id()) else {
            return Vec::new();
        };
        class
            .virtual_end_points()
            .filter_map(|definition| {
                store
                    .end_points
                    .get(&RelationEndPointId::new(id.clone(), &definition.property_name))
            })
            .filter(|end_point| end_point.has_changed())
            .cloned()
            .collect()
    }

    /// Returns the commit set: every new, changed or deleted object in
    /// registration order, followed by unloaded objects whose virtual
    /// end-points changed.
    #[must_use]
    pub fn get_new_changed_deleted_data(&self) -> Vec<PersistableData> {
        let store = self.store.lock();
        let mut data = Vec::new();
        for id in store.ordered_ids() {
            let state = self.compute_state(&store, &id);
            if !is_commit_relevant(state) {
                continue;
            }
            let Some(container) = store.containers.get(&id) else {
                continue;
            };
            let Some(object) = container.domain_object().cloned() else {
                continue;
            };
            data.push(PersistableData {
                domain_object: object,
                state,
                data_container: Some(container.clone()),
                end_points: self.changed_end_points(&store, &id),
            });
        }

        let mut owners: Vec<&ObjectId> = store
            .end_points
            .iter()
            .filter(|(id, end_point)| {
                end_point.has_changed() && !store.containers.contains_key(id.object_id())
            })
            .map(|(id, _)| id.object_id())
            .collect();
        owners.sort_unstable();
        owners.dedup();
        for owner in owners {
            data.push(PersistableData {
                domain_object: self.loader.object_reference(owner),
                state: self.compute_state(&store, owner),
                data_container: None,
                end_points: self.changed_end_points(&store, owner),
            });
        }
        data
    }

    /// Returns `true` if any object in this transaction has unsaved
    /// changes.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        let store = self.store.lock();
        store
            .containers
            .keys()
            .any(|id| is_commit_relevant(self.compute_state(&store, id)))
            || store.end_points.values().any(VirtualEndPoint::has_changed)
    }

    /// Returns the objects whose registered data is marked deleted.
    #[must_use]
    pub fn deleted_objects(&self) -> Vec<DomainObject> {
        let store = self.store.lock();
        store
            .containers
            .values()
            .filter(|c| c.is_deleted())
            .filter_map(|c| c.domain_object().cloned())
            .collect()
    }

    /// Returns the objects with registered data, in registration order.
    #[must_use]
    pub fn loaded_objects(&self) -> Vec<DomainObject> {
        let store = self.store.lock();
        store
            .ordered_ids()
            .iter()
            .filter_map(|id| store.containers.get(id))
            .filter_map(|c| c.domain_object().cloned())
            .collect()
    }

    /// Makes the current state the original state after a successful
    /// commit. Deleted data is dropped; the dropped objects are returned.
    pub(crate) fn commit_all(
        &self,
        timestamps: &[(ObjectId, Option<Timestamp>)],
    ) -> Vec<DomainObject> {
        let mut store = self.store.lock();
        let mut deleted = Vec::new();
        for id in store.ordered_ids() {
            let is_deleted = store.containers.get(&id).is_some_and(DataContainer::is_deleted);
            if is_deleted {
                if let Some(container) = store.discard(&id) {
                    deleted.extend(container.domain_object().cloned());
                }
                continue;
            }
            if let Some(container) = store.containers.get_mut(&id) {
                container.commit_state();
                if self.is_root {
                    container.set_new_in_hierarchy(false);
                }
            }
        }
        for (id, timestamp) in timestamps {
            if let (Some(container), Some(timestamp)) = (store.containers.get_mut(id), timestamp) {
                container.set_timestamp(Some(*timestamp));
            }
        }
        for end_point in store.end_points.values_mut() {
            end_point.commit();
        }
        deleted
    }

    /// Restores the original state. New data is dropped; the dropped
    /// objects are returned.
    pub(crate) fn rollback_all(&self) -> Vec<DomainObject> {
        let mut store = self.store.lock();
        let mut discarded = Vec::new();
        for id in store.ordered_ids() {
            let is_new = store.containers.get(&id).is_some_and(DataContainer::is_new);
            if is_new {
                if let Some(container) = store.discard(&id) {
                    discarded.extend(container.domain_object().cloned());
                }
            } else if let Some(container) = store.containers.get_mut(&id) {
                container.rollback_state();
            }
        }
        for end_point in store.end_points.values_mut() {
            end_point.rollback();
        }
        discarded
    }

    /// Returns the object whose data may be unloaded, `None` if nothing
    /// is registered for `id`.
    pub(crate) fn unloadable_object(&self, id: &ObjectId) -> CoreResult<Option<DomainObject>> {
        let store = self.store.lock();
        let Some(container) = store.containers.get(id) else {
            return Ok(None);
        };
        let state = self.compute_state(&store, id);
        if !state.is_unchanged() {
            return Err(CoreError::invalid_operation(format!(
                "the data of '{id}' cannot be unloaded because its state is {state}"
            )));
        }
        Ok(container.domain_object().cloned())
    }

    pub(crate) fn unload_container(&self, id: &ObjectId) -> CoreResult<()> {
        self.unloadable_object(id)?;
        self.store.lock().unregister(id);
        Ok(())
    }

    /// Returns a complete, unchanged virtual end-point to `NotLoaded`.
    pub(crate) fn unload_end_point(&self, end_point: &RelationEndPointId) -> CoreResult<bool> {
        let mut store = self.store.lock();
        let Some(loaded) = store.end_points.get(end_point) else {
            return Ok(false);
        };
        if loaded.has_changed() {
            return Err(CoreError::invalid_operation(format!(
                "end-point '{end_point}' cannot be unloaded because it has been changed"
            )));
        }
        if store
            .containers
            .get(end_point.object_id())
            .is_some_and(DataContainer::is_new)
        {
            return Err(CoreError::invalid_operation(format!(
                "end-point '{end_point}' cannot be unloaded because its object is new"
            )));
        }
        store.end_points.remove(end_point);
        Ok(true)
    }

    /// Merges the commit set of a sub-transaction into this transaction.
    ///
    /// Every target is checked and every new container built before the
    /// first write, so a failure leaves this transaction untouched.
    pub(crate) fn apply_sub_transaction_data(
        &self,
        tx: &ClientTransaction,
        data: &[PersistableData],
    ) -> CoreResult<()> {
        let mut now_valid = Vec::new();
        let mut now_invalid = Vec::new();
        {
            let mut store = self.store.lock();
            let mut created = Vec::new();
            for item in data {
                let Some(source) = &item.data_container else {
                    continue;
                };
                let id = source.id();
                if source.persistence_state() == PersistenceState::New {
                    created.push(new_from_sub_transaction(source, &item.domain_object)?);
                } else if !store.containers.contains_key(id) {
                    return Err(not_registered(id));
                }
            }

            let mut created = created.into_iter();
            for item in data {
                let Some(source) = &item.data_container else {
                    continue;
                };
                let id = source.id().clone();
                match source.persistence_state() {
                    PersistenceState::New => {
                        let Some(container) = created.next() else {
                            continue;
                        };
                        for definition in source.class().virtual_end_points() {
                            let end_point =
                                RelationEndPointId::new(id.clone(), &definition.property_name);
                            store
                                .end_points
                                .insert(end_point.clone(), empty_end_point(end_point, definition));
                        }
                        store.register(container);
                        now_valid.push(id);
                    }
                    PersistenceState::Deleted => {
                        let Some(target) = store.containers.get_mut(&id) else {
                            continue;
                        };
                        if target.is_new() {
                            store.discard(&id);
                            now_invalid.push(item.domain_object.clone());
                        } else {
                            target.set_values_from(source);
                            target.delete();
                        }
                    }
                    PersistenceState::Existing => {
                        if let Some(target) = store.containers.get_mut(&id) {
                            target.set_values_from(source);
                        }
                    }
                }
            }
            for end_point in data.iter().flat_map(|item| &item.end_points) {
                match store.end_points.get_mut(end_point.id()) {
                    Some(target) => target.set_current_from(end_point),
                    None => tracing::warn!(
                        end_point = %end_point.id(),
                        "sub-transaction end-point has no counterpart in the parent"
                    ),
                }
            }
        }
        for id in &now_valid {
            self.invalid.mark_not_invalid(tx, id)?;
        }
        for object in &now_invalid {
            self.invalid.mark_invalid(tx, object)?;
        }
        Ok(())
    }

    /// Copies the registered data for serialization.
    pub(crate) fn export(&self) -> (Vec<DataContainer>, Vec<VirtualEndPoint>) {
        let store = self.store.lock();
        let containers = store
            .ordered_ids()
            .iter()
            .filter_map(|id| store.containers.get(id).cloned())
            .collect();
        let mut end_points: Vec<VirtualEndPoint> = store.end_points.values().cloned().collect();
        end_points.sort_by(|a, b| a.id().cmp(b.id()));
        (containers, end_points)
    }

    /// Registers deserialized data.
    pub(crate) fn restore(
        &self,
        containers: Vec<DataContainer>,
        end_points: Vec<VirtualEndPoint>,
    ) -> CoreResult<()> {
        let mut store = self.store.lock();
        for mut container in containers {
            let object = self.loader.attach(&mut container)?;
            object.mark_loaded();
            store.register(container);
        }
        for end_point in end_points {
            store.end_points.insert(end_point.id().clone(), end_point);
        }
        Ok(())
    }
}

impl std::fmt::Debug for DataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.lock();
        f.debug_struct("DataManager")
            .field("containers", &store.containers.len())
            .field("end_points", &store.end_points.len())
            .finish()
    }
}

fn not_registered(id: &ObjectId) -> CoreError {
    CoreError::invalid_operation(format!("no data is registered for '{id}'"))
}

/// Builds the parent's container for an object created in a sub-transaction.
fn new_from_sub_transaction(source: &DataContainer, object: &DomainObject) -> CoreResult<DataContainer> {
    let values = source
        .values()
        .iter()
        .map(|(name, value)| {
            let value = PropertyValue {
                current: value.current.clone(),
                original: value.current.clone(),
            };
            (name.clone(), value)
        })
        .collect();
    let mut container = DataContainer::restore(
        Arc::clone(source.class()),
        source.id().clone(),
        values,
        PersistenceState::New,
        None,
        false,
        true,
    );
    container.set_domain_object(object.clone())?;
    Ok(container)
}

fn empty_end_point(id: RelationEndPointId, definition: &RelationEndPointDefinition) -> VirtualEndPoint {
    match definition.cardinality {
        Cardinality::Many => VirtualEndPoint::Collection(CollectionEndPoint::new(id, Vec::new(), Vec::new())),
        Cardinality::One => VirtualEndPoint::Object(VirtualObjectEndPoint::new(id, None, None)),
    }
}

/// Computes a virtual end-point from the foreign keys of registered data.
///
/// `fetched` lists the related objects reported by the persistence
/// strategy, in the order to keep. Registered data wins: an object is only
/// part of the original value if its registered original foreign key
/// points at the owner, and part of the current value if its current
/// foreign key does.
fn build_end_point(
    store: &DataStore,
    mapping: &MappingConfiguration,
    end_point: &RelationEndPointId,
    definition: &RelationEndPointDefinition,
    opposite: &RelationEndPointDefinition,
    fetched: &[ObjectId],
) -> VirtualEndPoint {
    let owner = end_point.object_id();
    let points_at_owner = |id: &ObjectId, access: ValueAccess| {
        store
            .containers
            .get(id)
            .and_then(|c| c.foreign_key(&opposite.property_name, access))
            .as_ref()
            == Some(owner)
    };
    let registered: Vec<ObjectId> = store
        .ordered_ids()
        .into_iter()
        .filter(|id| mapping.is_same_or_base_of(&opposite.class_id, id.class_id()))
        .collect();

    let mut seen = HashSet::new();
    let original: Vec<ObjectId> = fetched
        .iter()
        .chain(&registered)
        .filter(|id| points_at_owner(id, ValueAccess::Original) && seen.insert(*id))
        .cloned()
        .collect();
    let mut seen = HashSet::new();
    let current: Vec<ObjectId> = original
        .iter()
        .chain(&registered)
        .filter(|id| points_at_owner(id, ValueAccess::Current) && seen.insert(*id))
        .cloned()
        .collect();

    match definition.cardinality {
        Cardinality::Many => {
            VirtualEndPoint::Collection(CollectionEndPoint::new(end_point.clone(), original, current))
        }
        Cardinality::One => VirtualEndPoint::Object(VirtualObjectEndPoint::new(
            end_point.clone(),
            original.into_iter().next(),
            current.into_iter().next(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::test_support::order_mapping;
    use domobj_codec::StorageKey;
    use domobj_storage::StoredRecord;

    fn id(class: &str, key: i64) -> ObjectId {
        ObjectId::new(class, StorageKey::Integer(key))
    }

    fn order(mapping: &MappingConfiguration, key: i64, customer: i64) -> DataContainer {
        let class = Arc::clone(mapping.class(&"Order".into()).unwrap());
        let record = StoredRecord::new(id("Order", key), Default::default())
            .with("OrderNumber", key)
            .with("Customer", id("Customer", customer));
        DataContainer::new_for_existing(class, &record)
    }

    #[test]
    fn registration_order_is_kept() {
        let mapping = order_mapping();
        let mut store = DataStore::default();
        store.register(order(&mapping, 3, 1));
        store.register(order(&mapping, 1, 1));
        store.register(order(&mapping, 2, 1));
        assert_eq!(
            store.ordered_ids(),
            vec![id("Order", 3), id("Order", 1), id("Order", 2)]
        );

        store.unregister(&id("Order", 1));
        store.register(order(&mapping, 1, 1));
        assert_eq!(
            store.ordered_ids(),
            vec![id("Order", 3), id("Order", 2), id("Order", 1)]
        );
    }

    #[test]
    fn missing_data_is_reported() {
        let mapping = order_mapping();
        let mut store = DataStore::default();
        let definition = mapping.end_point(&"Customer".into(), "Orders").unwrap();
        let end_point = RelationEndPointId::new(id("Customer", 1), "Orders");

        assert!(matches!(
            store.collection(&end_point),
            Err(ExpandError::Missing(MissingData::EndPoint(_)))
        ));
        assert!(matches!(
            store.container(&id("Order", 1)),
            Err(ExpandError::Missing(MissingData::Container(_)))
        ));

        store
            .end_points
            .insert(end_point.clone(), empty_end_point(end_point.clone(), definition));
        assert!(store.collection(&end_point).is_ok());
        assert!(matches!(
            store.current_one(&end_point, definition),
            Err(ExpandError::Failed(CoreError::InvalidArgument { .. }))
        ));
    }

    #[test]
    fn built_collection_follows_registered_foreign_keys() {
        let mapping = order_mapping();
        let mut store = DataStore::default();
        store.register(order(&mapping, 1, 1));
        let mut moved = order(&mapping, 2, 1);
        moved
            .set_value("Customer", Value::ObjectId(id("Customer", 2)))
            .unwrap();
        store.register(moved);
        let mut arrived = order(&mapping, 3, 2);
        arrived
            .set_value("Customer", Value::ObjectId(id("Customer", 1)))
            .unwrap();
        store.register(arrived);

        let definition = mapping.end_point(&"Customer".into(), "Orders").unwrap();
        let opposite = mapping.opposite_end_point(definition).unwrap();
        let end_point = RelationEndPointId::new(id("Customer", 1), "Orders");
        let built = build_end_point(
            &store,
            &mapping,
            &end_point,
            definition,
            opposite,
            &[id("Order", 2), id("Order", 1)],
        );

        assert_eq!(built.original_ids(), vec![id("Order", 2), id("Order", 1)]);
        assert_eq!(built.current_ids(), vec![id("Order", 1), id("Order", 3)]);
        assert!(built.has_changed());
    }

    #[test]
    fn empty_end_points_match_cardinality() {
        let mapping = order_mapping();
        let orders = mapping.end_point(&"Customer".into(), "Orders").unwrap();
        let ticket = mapping.end_point(&"Order".into(), "OrderTicket").unwrap();
        assert!(matches!(
            empty_end_point(RelationEndPointId::new(id("Customer", 1), "Orders"), orders),
            VirtualEndPoint::Collection(_)
        ));
        assert!(matches!(
            empty_end_point(RelationEndPointId::new(id("Order", 1), "OrderTicket"), ticket),
            VirtualEndPoint::Object(_)
        ));
    }

    #[test]
    fn sub_transaction_data_is_merged_all_or_nothing() {
        let mapping = order_mapping();
        let storage: Arc<dyn domobj_storage::StorageProvider> =
            Arc::new(domobj_storage::InMemoryStorage::new());
        let tx = ClientTransaction::create_root_transaction(Arc::clone(&mapping), storage).unwrap();
        let class = Arc::clone(mapping.class(&"Order".into()).unwrap());
        let data = vec![
            PersistableData {
                domain_object: tx.get_object_reference(&id("Order", 10)).unwrap(),
                state: DomainObjectState::builder().set_new().build(),
                data_container: Some(DataContainer::new_for_new_object(class, id("Order", 10))),
                end_points: Vec::new(),
            },
            PersistableData {
                domain_object: tx.get_object_reference(&id("Order", 11)).unwrap(),
                state: DomainObjectState::builder().set_changed().build(),
                data_container: Some(order(&mapping, 11, 1)),
                end_points: Vec::new(),
            },
        ];

        let result = tx.data_manager().apply_sub_transaction_data(&tx, &data);
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
        assert!(!tx.data_manager().is_loaded(&id("Order", 10)));
        assert_eq!(tx.data_manager().data_container_count(), 0);
    }
}
