//! Data containers: the per-transaction property values of one object.

use crate::domain_object::DomainObject;
use crate::error::{CoreError, CoreResult};
use crate::mapping::{ClassDefinition, PropertyDefinition};
use crate::types::ValueAccess;
use domobj_codec::{ObjectId, Value};
use domobj_storage::{StoredRecord, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Persistence-level state of a data container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersistenceState {
    /// Created in this transaction.
    New,
    /// Loaded from storage or from the parent transaction.
    Existing,
    /// Deleted in this transaction.
    Deleted,
}

/// The observable state of a data container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataContainerState {
    /// Created in this transaction.
    New,
    /// Loaded and not modified.
    Unchanged,
    /// Loaded and modified, or explicitly marked changed.
    Changed,
    /// Deleted in this transaction.
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PropertyValue {
    pub(crate) current: Value,
    pub(crate) original: Value,
}

impl PropertyValue {
    fn unchanged(value: Value) -> Self {
        Self {
            current: value.clone(),
            original: value,
        }
    }

    fn has_changed(&self) -> bool {
        self.current != self.original
    }
}

/// Current and original property values of one object in one transaction.
///
/// A data container is never shared between transactions. Foreign keys are
/// ordinary properties here; relation bookkeeping lives in the data manager.
#[derive(Debug, Clone)]
pub struct DataContainer {
    id: ObjectId,
    class: Arc<ClassDefinition>,
    values: BTreeMap<String, PropertyValue>,
    persistence_state: PersistenceState,
    timestamp: Option<Timestamp>,
    marked_changed: bool,
    new_in_hierarchy: bool,
    domain_object: Option<DomainObject>,
}

impl DataContainer {
    /// Creates the container of a newly created object. Every property
    /// starts at its default value.
    #[must_use]
    pub fn new_for_new_object(class: Arc<ClassDefinition>, id: ObjectId) -> Self {
        let values = class
            .properties()
            .iter()
            .map(|p| (p.name.clone(), PropertyValue::unchanged(p.default.clone())))
            .collect();
        Self {
            id,
            class,
            values,
            persistence_state: PersistenceState::New,
            timestamp: None,
            marked_changed: false,
            new_in_hierarchy: true,
            domain_object: None,
        }
    }

    /// Creates the container of an object loaded from storage.
    ///
    /// Persistent properties missing from the record and transaction-only
    /// properties start at their default value.
    #[must_use]
    pub fn new_for_existing(class: Arc<ClassDefinition>, record: &StoredRecord) -> Self {
        let values = class
            .properties()
            .iter()
            .map(|p| {
                let value = if p.is_persistent() {
                    record
                        .properties
                        .get(&p.name)
                        .cloned()
                        .unwrap_or_else(|| p.default.clone())
                } else {
                    p.default.clone()
                };
                (p.name.clone(), PropertyValue::unchanged(value))
            })
            .collect();
        Self {
            id: record.id.clone(),
            class,
            values,
            persistence_state: PersistenceState::Existing,
            timestamp: Some(record.timestamp),
            marked_changed: false,
            new_in_hierarchy: false,
            domain_object: None,
        }
    }

    /// Creates a sub-transaction container from the parent's container.
    ///
    /// The parent's current values become both current and original values.
    #[must_use]
    pub fn new_from_parent(parent: &DataContainer) -> Self {
        let values = parent
            .values
            .iter()
            .map(|(name, value)| (name.clone(), PropertyValue::unchanged(value.current.clone())))
            .collect();
        Self {
            id: parent.id.clone(),
            class: Arc::clone(&parent.class),
            values,
            persistence_state: PersistenceState::Existing,
            timestamp: parent.timestamp,
            marked_changed: false,
            new_in_hierarchy: parent.is_new() || parent.new_in_hierarchy,
            domain_object: None,
        }
    }

    pub(crate) fn restore(
        class: Arc<ClassDefinition>,
        id: ObjectId,
        values: BTreeMap<String, PropertyValue>,
        persistence_state: PersistenceState,
        timestamp: Option<Timestamp>,
        marked_changed: bool,
        new_in_hierarchy: bool,
    ) -> Self {
        Self {
            id,
            class,
            values,
            persistence_state,
            timestamp,
            marked_changed,
            new_in_hierarchy,
            domain_object: None,
        }
    }

    /// Returns the object id.
    #[must_use]
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Returns the class definition.
    #[must_use]
    pub fn class(&self) -> &Arc<ClassDefinition> {
        &self.class
    }

    /// Returns the persistence-level state.
    #[must_use]
    pub fn persistence_state(&self) -> PersistenceState {
        self.persistence_state
    }

    /// Returns the observable state.
    #[must_use]
    pub fn state(&self) -> DataContainerState {
        match self.persistence_state {
            PersistenceState::New => DataContainerState::New,
            PersistenceState::Deleted => DataContainerState::Deleted,
            PersistenceState::Existing
                if self.marked_changed || self.values.values().any(PropertyValue::has_changed) =>
            {
                DataContainerState::Changed
            }
            PersistenceState::Existing => DataContainerState::Unchanged,
        }
    }

    /// Returns `true` for a container created in this transaction.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.persistence_state == PersistenceState::New
    }

    /// Returns `true` for a deleted container.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.persistence_state == PersistenceState::Deleted
    }

    /// Returns `true` if the object is new here or in an ancestor.
    #[must_use]
    pub fn is_new_in_hierarchy(&self) -> bool {
        self.new_in_hierarchy
    }

    /// Returns `true` if the container was explicitly marked changed.
    #[must_use]
    pub fn is_marked_changed(&self) -> bool {
        self.marked_changed
    }

    /// Returns the concurrency token, `None` for new objects.
    #[must_use]
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    pub(crate) fn set_new_in_hierarchy(&mut self, value: bool) {
        self.new_in_hierarchy = value;
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: Option<Timestamp>) {
        self.timestamp = timestamp;
    }

    /// Returns the domain object this container backs.
    #[must_use]
    pub fn domain_object(&self) -> Option<&DomainObject> {
        self.domain_object.as_ref()
    }

    /// Associates the domain object. Allowed exactly once.
    pub(crate) fn set_domain_object(&mut self, object: DomainObject) -> CoreResult<()> {
        if object.id() != &self.id {
            return Err(CoreError::invalid_argument(format!(
                "domain object '{}' cannot back the data of '{}'",
                object.id(),
                self.id
            )));
        }
        match &self.domain_object {
            Some(existing) if existing == &object => Ok(()),
            Some(_) => Err(CoreError::invalid_operation(format!(
                "data container '{}' already has a domain object",
                self.id
            ))),
            None => {
                self.domain_object = Some(object);
                Ok(())
            }
        }
    }

    /// Returns a property value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Mapping`] if the class has no such property.
    pub fn value(&self, name: &str, access: ValueAccess) -> CoreResult<&Value> {
        let value = self.values.get(name).ok_or_else(|| {
            CoreError::mapping(format!("class '{}' has no property '{name}'", self.class.id()))
        })?;
        Ok(match access {
            ValueAccess::Current => &value.current,
            ValueAccess::Original => &value.original,
        })
    }

    /// Returns a foreign key as an object id.
    pub(crate) fn foreign_key(&self, name: &str, access: ValueAccess) -> Option<ObjectId> {
        self.value(name, access).ok()?.as_object_id().cloned()
    }

    /// Sets the current value of a property, returning the previous value.
    pub(crate) fn set_value(&mut self, name: &str, value: Value) -> CoreResult<Value> {
        let class_id = self.class.id().clone();
        let entry = self.values.get_mut(name).ok_or_else(|| {
            CoreError::mapping(format!("class '{class_id}' has no property '{name}'"))
        })?;
        Ok(std::mem::replace(&mut entry.current, value))
    }

    /// Returns `true` if the property's current value differs from the
    /// original.
    #[must_use]
    pub fn has_property_changed(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(PropertyValue::has_changed)
    }

    fn any_changed(&self, filter: impl Fn(&PropertyDefinition) -> bool) -> bool {
        self.class
            .properties()
            .iter()
            .filter(|p| filter(p))
            .any(|p| self.has_property_changed(&p.name))
    }

    /// A persistent, non-foreign-key property has changed.
    #[must_use]
    pub fn has_persistent_data_changed(&self) -> bool {
        self.any_changed(|p| p.is_persistent() && !p.is_foreign_key)
    }

    /// A transaction-only property has changed.
    #[must_use]
    pub fn has_non_persistent_data_changed(&self) -> bool {
        self.any_changed(|p| !p.is_persistent())
    }

    /// A foreign key has changed.
    #[must_use]
    pub fn has_foreign_key_changed(&self) -> bool {
        self.any_changed(|p| p.is_foreign_key)
    }

    /// Returns whether the container must be written by a root commit.
    pub(crate) fn needs_write(&self) -> bool {
        match self.persistence_state {
            PersistenceState::New | PersistenceState::Deleted => true,
            PersistenceState::Existing => {
                self.marked_changed
                    || self.any_changed(PropertyDefinition::is_persistent)
            }
        }
    }

    /// Marks an existing container changed.
    pub(crate) fn mark_changed(&mut self) -> CoreResult<()> {
        match self.persistence_state {
            PersistenceState::New => Ok(()),
            PersistenceState::Deleted => Err(CoreError::ObjectDeleted {
                id: self.id.clone(),
            }),
            PersistenceState::Existing => {
                self.marked_changed = true;
                Ok(())
            }
        }
    }

    pub(crate) fn delete(&mut self) {
        self.persistence_state = PersistenceState::Deleted;
    }

    /// Makes the current values the original values.
    pub(crate) fn commit_state(&mut self) {
        for value in self.values.values_mut() {
            value.original = value.current.clone();
        }
        self.marked_changed = false;
        if self.persistence_state == PersistenceState::New {
            self.persistence_state = PersistenceState::Existing;
        }
    }

    /// Restores the original values and undeletes the container.
    pub(crate) fn rollback_state(&mut self) {
        for value in self.values.values_mut() {
            value.current = value.original.clone();
        }
        self.marked_changed = false;
        if self.persistence_state == PersistenceState::Deleted {
            self.persistence_state = PersistenceState::Existing;
        }
    }

    /// Copies the current values of a sub-transaction's container.
    pub(crate) fn set_values_from(&mut self, source: &DataContainer) {
        for (name, value) in &source.values {
            if let Some(target) = self.values.get_mut(name) {
                target.current = value.current.clone();
            }
        }
        if source.marked_changed && self.persistence_state == PersistenceState::Existing {
            self.marked_changed = true;
        }
    }

    /// Returns the persistent property values for storage.
    #[must_use]
    pub fn persistent_values(&self) -> BTreeMap<String, Value> {
        self.class
            .properties()
            .iter()
            .filter(|p| p.is_persistent())
            .filter_map(|p| {
                self.values
                    .get(&p.name)
                    .map(|v| (p.name.clone(), v.current.clone()))
            })
            .collect()
    }

    pub(crate) fn values(&self) -> &BTreeMap<String, PropertyValue> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::test_support::order_mapping;
    use domobj_codec::StorageKey;

    fn customer() -> DataContainer {
        let mapping = order_mapping();
        let class = Arc::clone(mapping.class(&"Customer".into()).unwrap());
        let record = StoredRecord::new(
            ObjectId::new("Customer", StorageKey::Integer(1)),
            BTreeMap::new(),
        )
        .with("Name", "Kunde 1");
        DataContainer::new_for_existing(class, &record)
    }

    #[test]
    fn loaded_container_is_unchanged() {
        let container = customer();
        assert_eq!(container.state(), DataContainerState::Unchanged);
        assert_eq!(container.timestamp(), Some(1));
        assert_eq!(
            container.value("Visits", ValueAccess::Current).unwrap(),
            &Value::Integer(0)
        );
    }

    #[test]
    fn change_tracking_by_storage_class() {
        let mut container = customer();
        container.set_value("Visits", Value::Integer(3)).unwrap();
        assert_eq!(container.state(), DataContainerState::Changed);
        assert!(container.has_non_persistent_data_changed());
        assert!(!container.has_persistent_data_changed());
        assert!(!container.needs_write());

        container.set_value("Name", Value::from("Kunde 2")).unwrap();
        assert!(container.has_persistent_data_changed());
        assert!(container.needs_write());
    }

    #[test]
    fn setting_back_to_original_is_unchanged() {
        let mut container = customer();
        let old = container.set_value("Name", Value::from("X")).unwrap();
        container.set_value("Name", old).unwrap();
        assert_eq!(container.state(), DataContainerState::Unchanged);
    }

    #[test]
    fn rollback_restores_and_undeletes() {
        let mut container = customer();
        container.set_value("Name", Value::from("X")).unwrap();
        container.delete();
        assert_eq!(container.state(), DataContainerState::Deleted);
        container.rollback_state();
        assert_eq!(container.state(), DataContainerState::Unchanged);
        assert_eq!(
            container.value("Name", ValueAccess::Current).unwrap(),
            container.value("Name", ValueAccess::Original).unwrap()
        );
    }

    #[test]
    fn mark_changed_rules() {
        let mut container = customer();
        container.mark_changed().unwrap();
        assert_eq!(container.state(), DataContainerState::Changed);
        container.commit_state();
        assert_eq!(container.state(), DataContainerState::Unchanged);
        container.delete();
        assert!(matches!(
            container.mark_changed(),
            Err(CoreError::ObjectDeleted { .. })
        ));
    }

    #[test]
    fn sub_container_copies_current_values() {
        let mut parent = customer();
        parent.set_value("Name", Value::from("Neu")).unwrap();
        let child = DataContainer::new_from_parent(&parent);
        assert_eq!(child.state(), DataContainerState::Unchanged);
        assert_eq!(
            child.value("Name", ValueAccess::Original).unwrap(),
            &Value::from("Neu")
        );
        assert!(!child.is_new_in_hierarchy());
    }

    #[test]
    fn unknown_property_is_mapping_error() {
        let container = customer();
        assert!(matches!(
            container.value("Nope", ValueAccess::Current),
            Err(CoreError::Mapping { .. })
        ));
    }
}
