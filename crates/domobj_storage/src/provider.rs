//! Storage provider trait definitions.

use crate::error::StorageResult;
use crate::record::{RecordQuery, RecordWrite, StoredRecord, Timestamp};
use domobj_codec::{ClassId, ObjectId};

/// The backing store of a root transaction.
///
/// A storage provider knows nothing about transactions, relation end-points
/// or domain objects; it stores flat records keyed by [`ObjectId`].
///
/// # Invariants
///
/// - `load` returns exactly the last committed version of a record
/// - writes only become visible through [`StorageSession::commit`]
/// - a session commit is all-or-nothing
/// - providers must be `Send + Sync` so transactions can share them
pub trait StorageProvider: Send + Sync {
    /// Loads a single record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read. A missing record is
    /// `Ok(None)`, not an error.
    fn load(&self, id: &ObjectId) -> StorageResult<Option<StoredRecord>>;

    /// Loads several records in one round-trip, preserving input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load_many(&self, ids: &[ObjectId]) -> StorageResult<Vec<Option<StoredRecord>>> {
        ids.iter().map(|id| self.load(id)).collect()
    }

    /// Returns all records matching a query.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::EmptyQuery`] when no class is named.
    fn query(&self, query: &RecordQuery) -> StorageResult<Vec<StoredRecord>>;

    /// Creates a fresh id for a new object of the given class.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot allocate ids.
    fn new_object_id(&self, class_id: &ClassId) -> StorageResult<ObjectId>;

    /// Begins a write session.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot accept writes.
    fn begin(&self) -> StorageResult<Box<dyn StorageSession + '_>>;
}

/// A write session on a storage provider.
///
/// The expected protocol is `save` → `update_timestamps` → `commit`, with
/// `rollback` at any point before `commit`.
pub trait StorageSession {
    /// Validates and stages writes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ConcurrencyViolation`] for stale
    /// updates or deletes, [`crate::StorageError::DuplicateObject`] and
    /// [`crate::StorageError::ObjectMissing`] for inconsistent writes.
    fn save(&mut self, writes: &[RecordWrite]) -> StorageResult<()>;

    /// Returns the timestamps the given records will carry after commit.
    ///
    /// Deleted records yield `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is finished.
    fn update_timestamps(&self, ids: &[ObjectId]) -> StorageResult<Vec<Option<Timestamp>>>;

    /// Publishes all staged writes atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the writes no longer apply or cannot be made
    /// durable; nothing is published in that case.
    fn commit(&mut self) -> StorageResult<()>;

    /// Discards all staged writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is already finished.
    fn rollback(&mut self) -> StorageResult<()>;
}
