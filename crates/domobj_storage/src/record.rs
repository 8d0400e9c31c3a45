//! Stored record types.

use domobj_codec::{ClassId, ObjectId, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Concurrency token of a stored record.
///
/// Timestamps start at 1 when a record is inserted and grow by one with
/// every successful update.
pub type Timestamp = u64;

/// The persisted form of one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Object id.
    pub id: ObjectId,
    /// Concurrency token.
    pub timestamp: Timestamp,
    /// Persistent property values by property name.
    pub properties: BTreeMap<String, Value>,
}

impl StoredRecord {
    /// Creates a record with the initial timestamp.
    #[must_use]
    pub fn new(id: ObjectId, properties: BTreeMap<String, Value>) -> Self {
        Self {
            id,
            timestamp: 1,
            properties,
        }
    }

    /// Builder-style helper to set a property.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Returns a property value, or `Null` when absent.
    #[must_use]
    pub fn get(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.properties.get(name).unwrap_or(&NULL)
    }
}

/// A write staged in a storage session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordWrite {
    /// Insert a record that must not exist yet.
    Insert {
        /// The id of the new record.
        id: ObjectId,
        /// Its persistent properties.
        properties: BTreeMap<String, Value>,
    },
    /// Replace the properties of an existing record.
    Update {
        /// The id of the record.
        id: ObjectId,
        /// The timestamp observed when the record was read.
        expected: Timestamp,
        /// The new persistent properties.
        properties: BTreeMap<String, Value>,
    },
    /// Delete an existing record.
    Delete {
        /// The id of the record.
        id: ObjectId,
        /// The timestamp observed when the record was read.
        expected: Timestamp,
    },
}

impl RecordWrite {
    /// Returns the id the write targets.
    #[must_use]
    pub fn id(&self) -> &ObjectId {
        match self {
            Self::Insert { id, .. } | Self::Update { id, .. } | Self::Delete { id, .. } => id,
        }
    }
}

/// A simple record selection: all records of the given classes, optionally
/// restricted to those whose property equals a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    /// Classes to select from (a class and its derived classes).
    pub class_ids: Vec<ClassId>,
    /// Optional `(property, value)` equality filter.
    pub filter: Option<(String, Value)>,
}

impl RecordQuery {
    /// Selects all records of the given classes.
    #[must_use]
    pub fn all(class_ids: Vec<ClassId>) -> Self {
        Self {
            class_ids,
            filter: None,
        }
    }

    /// Selects records whose `property` equals `value`.
    #[must_use]
    pub fn by_property(
        class_ids: Vec<ClassId>,
        property: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            class_ids,
            filter: Some((property.into(), value.into())),
        }
    }

    /// Returns whether a record satisfies this query.
    #[must_use]
    pub fn matches(&self, record: &StoredRecord) -> bool {
        self.class_ids.contains(record.id.class_id())
            && self
                .filter
                .as_ref()
                .map_or(true, |(name, value)| record.get(name) == value)
    }
}
