//! Read-only mapping metadata.
//!
//! The transaction core never reflects over types. Everything it needs to
//! know about classes, properties and relations is resolved once by a
//! [`MappingBuilder`] into a [`MappingConfiguration`], which is shared by all
//! transactions as an `Arc` and never mutated afterwards.

mod builder;

pub use builder::{ClassBuilder, MappingBuilder, Relation};

use crate::error::{CoreError, CoreResult};
use domobj_codec::{ClassId, Value, ValueType};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Where a property value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    /// Loaded from and saved to the storage provider.
    Persistent,
    /// Only held in memory; starts at the default value in every
    /// transaction that loads the object.
    Transaction,
}

/// Definition of a single property of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    /// Property name, unique within the class and its bases.
    pub name: String,
    /// Type of non-null values.
    pub value_type: ValueType,
    /// Whether `Null` is an acceptable value.
    pub nullable: bool,
    /// The value of the property in a new object.
    pub default: Value,
    /// Persistent or transaction-only.
    pub storage_class: StorageClass,
    /// Whether the property holds the foreign key of a relation.
    pub is_foreign_key: bool,
}

impl PropertyDefinition {
    /// Creates a non-nullable persistent property.
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            nullable: false,
            default: default_value(value_type),
            storage_class: StorageClass::Persistent,
            is_foreign_key: false,
        }
    }

    /// Makes the property nullable with a `Null` default.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self.default = Value::Null;
        self
    }

    /// Overrides the default value.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Makes the property transaction-only (not persisted).
    #[must_use]
    pub fn transaction_only(mut self) -> Self {
        self.storage_class = StorageClass::Transaction;
        self
    }

    pub(crate) fn foreign_key(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: ValueType::ObjectId,
            nullable: true,
            default: Value::Null,
            storage_class: StorageClass::Persistent,
            is_foreign_key: true,
        }
    }

    /// Returns `true` for persistent properties.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.storage_class == StorageClass::Persistent
    }

    /// Returns whether `value` may be stored in this property.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match value.value_type() {
            None => self.nullable,
            Some(value_type) => value_type == self.value_type,
        }
    }
}

fn default_value(value_type: ValueType) -> Value {
    match value_type {
        ValueType::Bool => Value::Bool(false),
        ValueType::Integer => Value::Integer(0),
        ValueType::Text => Value::Text(String::new()),
        ValueType::Bytes => Value::Bytes(Vec::new()),
        ValueType::Uuid => Value::Uuid(Uuid::nil()),
        ValueType::ObjectId => Value::Null,
    }
}

/// How many objects an end-point relates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// At most one related object.
    One,
    /// An ordered collection of related objects.
    Many,
}

/// One side of a bidirectional relation.
///
/// The real side stores the foreign key in a property of the same name; the
/// virtual side has no storage and is computed from the opposite foreign
/// keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEndPointDefinition {
    /// The class declaring the end-point.
    pub class_id: ClassId,
    /// The relation property name.
    pub property_name: String,
    /// One or many.
    pub cardinality: Cardinality,
    /// Whether this side has no foreign key.
    pub is_virtual: bool,
    /// Whether a related object is required at commit time.
    pub is_mandatory: bool,
    /// Whether the relation may only be changed from the opposite side.
    pub is_read_only: bool,
    /// The class on the opposite side.
    pub opposite_class_id: ClassId,
    /// The property name of the opposite end-point.
    pub opposite_property_name: String,
}

impl RelationEndPointDefinition {
    /// Returns `true` for a collection end-point.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.cardinality == Cardinality::Many
    }
}

/// A resolved class definition.
///
/// Properties and end-points include everything inherited from base
/// classes, base members first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDefinition {
    id: ClassId,
    base_class: Option<ClassId>,
    is_abstract: bool,
    properties: Vec<PropertyDefinition>,
    end_points: Vec<RelationEndPointDefinition>,
    self_and_derived: Vec<ClassId>,
}

impl ClassDefinition {
    /// Returns the class id.
    #[must_use]
    pub fn id(&self) -> &ClassId {
        &self.id
    }

    /// Returns the direct base class.
    #[must_use]
    pub fn base_class(&self) -> Option<&ClassId> {
        self.base_class.as_ref()
    }

    /// Returns `true` if instances cannot be created.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Returns all properties, including foreign keys.
    #[must_use]
    pub fn properties(&self) -> &[PropertyDefinition] {
        &self.properties
    }

    /// Returns all relation end-points.
    #[must_use]
    pub fn end_points(&self) -> &[RelationEndPointDefinition] {
        &self.end_points
    }

    /// Returns this class and every class derived from it.
    #[must_use]
    pub fn self_and_derived(&self) -> &[ClassId] {
        &self.self_and_derived
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Looks up a relation end-point by property name.
    #[must_use]
    pub fn end_point(&self, name: &str) -> Option<&RelationEndPointDefinition> {
        self.end_points.iter().find(|e| e.property_name == name)
    }

    /// Returns the virtual end-points of this class.
    pub fn virtual_end_points(&self) -> impl Iterator<Item = &RelationEndPointDefinition> {
        self.end_points.iter().filter(|e| e.is_virtual)
    }
}

/// The complete, immutable mapping of a domain.
#[derive(Debug, Clone, Default)]
pub struct MappingConfiguration {
    classes: HashMap<ClassId, Arc<ClassDefinition>>,
}

impl MappingConfiguration {
    /// Starts building a mapping.
    #[must_use]
    pub fn builder() -> MappingBuilder {
        MappingBuilder::new()
    }

    /// Looks up a class.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Mapping`] if the class is not mapped.
    pub fn class(&self, id: &ClassId) -> CoreResult<&Arc<ClassDefinition>> {
        self.classes
            .get(id)
            .ok_or_else(|| CoreError::mapping(format!("class '{id}' is not part of the mapping")))
    }

    /// Returns `true` if the class is mapped.
    #[must_use]
    pub fn contains_class(&self, id: &ClassId) -> bool {
        self.classes.contains_key(id)
    }

    /// Iterates over all classes.
    pub fn classes(&self) -> impl Iterator<Item = &Arc<ClassDefinition>> {
        self.classes.values()
    }

    /// Returns whether `derived` is `base` or inherits from it.
    #[must_use]
    pub fn is_same_or_base_of(&self, base: &ClassId, derived: &ClassId) -> bool {
        self.classes
            .get(base)
            .is_some_and(|class| class.self_and_derived.contains(derived))
    }

    /// Looks up a property of a class.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Mapping`] if the class or property is unknown.
    pub fn property(&self, class_id: &ClassId, name: &str) -> CoreResult<&PropertyDefinition> {
        self.class(class_id)?.property(name).ok_or_else(|| {
            CoreError::mapping(format!("class '{class_id}' has no property '{name}'"))
        })
    }

    /// Looks up a relation end-point of a class.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Mapping`] if the class or end-point is unknown.
    pub fn end_point(
        &self,
        class_id: &ClassId,
        name: &str,
    ) -> CoreResult<&RelationEndPointDefinition> {
        self.class(class_id)?.end_point(name).ok_or_else(|| {
            CoreError::mapping(format!(
                "class '{class_id}' has no relation property '{name}'"
            ))
        })
    }

    /// Returns the opposite side of a relation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Mapping`] if the mapping is inconsistent.
    pub fn opposite_end_point(
        &self,
        definition: &RelationEndPointDefinition,
    ) -> CoreResult<&RelationEndPointDefinition> {
        self.end_point(
            &definition.opposite_class_id,
            &definition.opposite_property_name,
        )
    }
}
