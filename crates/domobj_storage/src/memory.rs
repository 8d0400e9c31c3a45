//! In-memory storage provider.

use crate::error::{StorageError, StorageResult};
use crate::provider::{StorageProvider, StorageSession};
use crate::record::{RecordQuery, RecordWrite, StoredRecord, Timestamp};
use domobj_codec::{ClassId, ObjectId, StorageKey};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// How a provider generates keys for new objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyGeneration {
    /// Random GUID keys.
    #[default]
    Guid,
    /// Sequential integer keys starting at 1.
    Sequential,
}

/// The record table shared by the in-memory and file providers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Table {
    pub(crate) records: BTreeMap<ObjectId, StoredRecord>,
    pub(crate) next_key: i64,
}

impl Table {
    /// Checks writes against the current records without applying them.
    fn validate(&self, writes: &[RecordWrite]) -> StorageResult<()> {
        let mut stale = Vec::new();
        for write in writes {
            match write {
                RecordWrite::Insert { id, .. } => {
                    if self.records.contains_key(id) {
                        return Err(StorageError::DuplicateObject { id: id.clone() });
                    }
                }
                RecordWrite::Update { id, expected, .. } | RecordWrite::Delete { id, expected } => {
                    match self.records.get(id) {
                        None => return Err(StorageError::ObjectMissing { id: id.clone() }),
                        Some(record) if record.timestamp != *expected => stale.push(id.clone()),
                        Some(_) => {}
                    }
                }
            }
        }
        if stale.is_empty() {
            Ok(())
        } else {
            Err(StorageError::ConcurrencyViolation { ids: stale })
        }
    }

    fn apply(&mut self, writes: &[RecordWrite]) {
        for write in writes {
            match write {
                RecordWrite::Insert { id, properties } => {
                    self.records
                        .insert(id.clone(), StoredRecord::new(id.clone(), properties.clone()));
                }
                RecordWrite::Update {
                    id,
                    expected,
                    properties,
                } => {
                    self.records.insert(
                        id.clone(),
                        StoredRecord {
                            id: id.clone(),
                            timestamp: expected + 1,
                            properties: properties.clone(),
                        },
                    );
                }
                RecordWrite::Delete { id, .. } => {
                    self.records.remove(id);
                }
            }
        }
    }
}

/// An in-memory storage provider.
///
/// Suitable for tests and for transactions that never need to survive the
/// process. Thread-safe; sessions validate optimistically on `save` and
/// again under the write lock on `commit`.
///
/// # Example
///
/// ```rust
/// use domobj_codec::{ClassId, ObjectId, StorageKey};
/// use domobj_storage::{InMemoryStorage, RecordWrite, StorageProvider};
/// use std::collections::BTreeMap;
///
/// let storage = InMemoryStorage::new();
/// let id = ObjectId::new("Order", StorageKey::Integer(1));
///
/// let mut session = storage.begin().unwrap();
/// session
///     .save(&[RecordWrite::Insert { id: id.clone(), properties: BTreeMap::new() }])
///     .unwrap();
/// session.commit().unwrap();
///
/// assert!(storage.load(&id).unwrap().is_some());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    table: RwLock<Table>,
    key_generation: KeyGeneration,
    next_key: AtomicI64,
}

impl InMemoryStorage {
    /// Creates an empty provider generating GUID keys.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty provider with the given key generation.
    #[must_use]
    pub fn with_key_generation(key_generation: KeyGeneration) -> Self {
        Self {
            key_generation,
            ..Self::default()
        }
    }

    pub(crate) fn from_table(table: Table, key_generation: KeyGeneration) -> Self {
        let next_key = AtomicI64::new(table.next_key);
        Self {
            table: RwLock::new(table),
            key_generation,
            next_key,
        }
    }

    /// Inserts or replaces records directly, bypassing sessions.
    ///
    /// Intended for seeding test data.
    pub fn seed(&self, records: impl IntoIterator<Item = StoredRecord>) {
        let mut table = self.table.write();
        for record in records {
            table.records.insert(record.id.clone(), record);
        }
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().records.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().records.is_empty()
    }

    /// Returns a copy of all stored records.
    #[must_use]
    pub fn records(&self) -> Vec<StoredRecord> {
        self.table.read().records.values().cloned().collect()
    }

    /// Validates and applies writes under the write lock.
    ///
    /// `before_publish` sees the table as it will look after the commit and
    /// may veto it; on veto nothing changes.
    pub(crate) fn apply_writes(
        &self,
        writes: &[RecordWrite],
        before_publish: impl FnOnce(&Table) -> StorageResult<()>,
    ) -> StorageResult<()> {
        let mut table = self.table.write();
        table.validate(writes)?;
        let mut next = table.clone();
        next.apply(writes);
        next.next_key = self.next_key.load(Ordering::SeqCst);
        before_publish(&next)?;
        *table = next;
        Ok(())
    }

    pub(crate) fn validate_writes(&self, writes: &[RecordWrite]) -> StorageResult<()> {
        self.table.read().validate(writes)
    }

    pub(crate) fn current_timestamp(&self, id: &ObjectId) -> Option<Timestamp> {
        self.table.read().records.get(id).map(|r| r.timestamp)
    }
}

impl StorageProvider for InMemoryStorage {
    fn load(&self, id: &ObjectId) -> StorageResult<Option<StoredRecord>> {
        Ok(self.table.read().records.get(id).cloned())
    }

    fn load_many(&self, ids: &[ObjectId]) -> StorageResult<Vec<Option<StoredRecord>>> {
        let table = self.table.read();
        Ok(ids.iter().map(|id| table.records.get(id).cloned()).collect())
    }

    fn query(&self, query: &RecordQuery) -> StorageResult<Vec<StoredRecord>> {
        if query.class_ids.is_empty() {
            return Err(StorageError::EmptyQuery);
        }
        let table = self.table.read();
        Ok(table
            .records
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect())
    }

    fn new_object_id(&self, class_id: &ClassId) -> StorageResult<ObjectId> {
        let key = match self.key_generation {
            KeyGeneration::Guid => StorageKey::new_guid(),
            KeyGeneration::Sequential => {
                StorageKey::Integer(self.next_key.fetch_add(1, Ordering::SeqCst) + 1)
            }
        };
        Ok(ObjectId::new(class_id.clone(), key))
    }

    fn begin(&self) -> StorageResult<Box<dyn StorageSession + '_>> {
        Ok(Box::new(MemorySession::new(self)))
    }
}

/// Session over an [`InMemoryStorage`].
pub(crate) struct MemorySession<'a> {
    storage: &'a InMemoryStorage,
    staged: Vec<RecordWrite>,
    finished: bool,
}

impl<'a> MemorySession<'a> {
    pub(crate) fn new(storage: &'a InMemoryStorage) -> Self {
        Self {
            storage,
            staged: Vec::new(),
            finished: false,
        }
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.finished {
            Err(StorageError::SessionFinished)
        } else {
            Ok(())
        }
    }

    /// Commits, letting `before_publish` make the new table durable first.
    pub(crate) fn commit_with(
        &mut self,
        before_publish: impl FnOnce(&Table) -> StorageResult<()>,
    ) -> StorageResult<()> {
        self.ensure_open()?;
        self.storage.apply_writes(&self.staged, before_publish)?;
        self.finished = true;
        tracing::debug!(writes = self.staged.len(), "storage session committed");
        Ok(())
    }
}

impl StorageSession for MemorySession<'_> {
    fn save(&mut self, writes: &[RecordWrite]) -> StorageResult<()> {
        self.ensure_open()?;
        self.storage.validate_writes(writes)?;
        self.staged.extend_from_slice(writes);
        Ok(())
    }

    fn update_timestamps(&self, ids: &[ObjectId]) -> StorageResult<Vec<Option<Timestamp>>> {
        self.ensure_open()?;
        Ok(ids
            .iter()
            .map(|id| {
                match self.staged.iter().rev().find(|w| w.id() == id) {
                    Some(RecordWrite::Insert { .. }) => Some(1),
                    Some(RecordWrite::Update { expected, .. }) => Some(expected + 1),
                    Some(RecordWrite::Delete { .. }) => None,
                    None => self.storage.current_timestamp(id),
                }
            })
            .collect())
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.commit_with(|_| Ok(()))
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.ensure_open()?;
        self.staged.clear();
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domobj_codec::Value;

    fn order_id(key: i64) -> ObjectId {
        ObjectId::new("Order", StorageKey::Integer(key))
    }

    fn seeded() -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        storage.seed([StoredRecord::new(order_id(1), BTreeMap::new()).with("OrderNumber", 1)]);
        storage
    }

    #[test]
    fn load_missing_is_none() {
        let storage = InMemoryStorage::new();
        assert!(storage.load(&order_id(1)).unwrap().is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn load_many_preserves_order() {
        let storage = seeded();
        let result = storage.load_many(&[order_id(2), order_id(1)]).unwrap();
        assert!(result[0].is_none());
        assert_eq!(result[1].as_ref().unwrap().id, order_id(1));
    }

    #[test]
    fn writes_invisible_until_commit() {
        let storage = InMemoryStorage::new();
        let mut session = storage.begin().unwrap();
        session
            .save(&[RecordWrite::Insert {
                id: order_id(5),
                properties: BTreeMap::new(),
            }])
            .unwrap();
        assert!(storage.load(&order_id(5)).unwrap().is_none());
        session.commit().unwrap();
        assert_eq!(storage.load(&order_id(5)).unwrap().unwrap().timestamp, 1);
    }

    #[test]
    fn update_bumps_timestamp() {
        let storage = seeded();
        let mut session = storage.begin().unwrap();
        let mut properties = BTreeMap::new();
        properties.insert("OrderNumber".to_string(), Value::Integer(2));
        session
            .save(&[RecordWrite::Update {
                id: order_id(1),
                expected: 1,
                properties,
            }])
            .unwrap();
        assert_eq!(
            session.update_timestamps(&[order_id(1)]).unwrap(),
            vec![Some(2)]
        );
        session.commit().unwrap();

        let record = storage.load(&order_id(1)).unwrap().unwrap();
        assert_eq!(record.timestamp, 2);
        assert_eq!(record.get("OrderNumber"), &Value::Integer(2));
    }

    #[test]
    fn stale_update_is_a_concurrency_violation() {
        let storage = seeded();
        let mut session = storage.begin().unwrap();
        let err = session
            .save(&[RecordWrite::Delete {
                id: order_id(1),
                expected: 7,
            }])
            .unwrap_err();
        assert!(matches!(err, StorageError::ConcurrencyViolation { ids } if ids == vec![order_id(1)]));
    }

    #[test]
    fn duplicate_insert_fails() {
        let storage = seeded();
        let mut session = storage.begin().unwrap();
        let err = session
            .save(&[RecordWrite::Insert {
                id: order_id(1),
                properties: BTreeMap::new(),
            }])
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateObject { .. }));
    }

    #[test]
    fn commit_revalidates() {
        let storage = seeded();
        let mut first = storage.begin().unwrap();
        let mut second = storage.begin().unwrap();
        let delete = [RecordWrite::Delete {
            id: order_id(1),
            expected: 1,
        }];
        first.save(&delete).unwrap();
        second.save(&delete).unwrap();
        first.commit().unwrap();
        assert!(second.commit().is_err());
    }

    #[test]
    fn rollback_discards_and_finishes() {
        let storage = InMemoryStorage::new();
        let mut session = storage.begin().unwrap();
        session
            .save(&[RecordWrite::Insert {
                id: order_id(9),
                properties: BTreeMap::new(),
            }])
            .unwrap();
        session.rollback().unwrap();
        assert!(matches!(session.commit(), Err(StorageError::SessionFinished)));
        assert!(storage.is_empty());
    }

    #[test]
    fn sequential_ids() {
        let storage = InMemoryStorage::with_key_generation(KeyGeneration::Sequential);
        let class = ClassId::new("Order");
        assert_eq!(storage.new_object_id(&class).unwrap(), order_id(1));
        assert_eq!(storage.new_object_id(&class).unwrap(), order_id(2));
    }

    #[test]
    fn query_requires_a_class() {
        let storage = seeded();
        assert!(matches!(
            storage.query(&RecordQuery::all(Vec::new())),
            Err(StorageError::EmptyQuery)
        ));
        assert_eq!(
            storage
                .query(&RecordQuery::all(vec![ClassId::new("Order")]))
                .unwrap()
                .len(),
            1
        );
    }
}
