//! File-based storage provider.

use crate::error::{StorageError, StorageResult};
use crate::memory::{InMemoryStorage, KeyGeneration, MemorySession, Table};
use crate::provider::{StorageProvider, StorageSession};
use crate::record::{RecordQuery, RecordWrite, StoredRecord, Timestamp};
use domobj_codec::{from_cbor, to_cbor, ClassId, ObjectId};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Magic bytes at the start of a snapshot file.
const SNAPSHOT_MAGIC: [u8; 4] = *b"DOBS";

/// A file-backed storage provider.
///
/// All records are kept in memory and the complete table is rewritten on
/// every commit using the write-then-rename pattern:
/// 1. Write to a temporary file next to the target
/// 2. Sync the temporary file to disk
/// 3. Rename it over the target
///
/// A commit either publishes a new durable snapshot or leaves both the
/// file and the in-memory table untouched.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    inner: InMemoryStorage,
}

impl FileStorage {
    /// Opens or creates a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with_key_generation(path, KeyGeneration::default())
    }

    /// Opens or creates a snapshot file with the given key generation.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn open_with_key_generation(
        path: &Path,
        key_generation: KeyGeneration,
    ) -> StorageResult<Self> {
        let table = if path.exists() {
            let data = fs::read(path)?;
            decode_snapshot(&data)?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            Table::default()
        };
        tracing::debug!(path = %path.display(), records = table.records.len(), "opened file storage");
        Ok(Self {
            path: path.to_path_buf(),
            inner: InMemoryStorage::from_table(table, key_generation),
        })
    }

    /// Returns the snapshot path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn write_snapshot(&self, table: &Table) -> StorageResult<()> {
        let mut data = SNAPSHOT_MAGIC.to_vec();
        data.extend(to_cbor(table)?);

        let temp_path = self.path.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

fn decode_snapshot(data: &[u8]) -> StorageResult<Table> {
    match data.strip_prefix(&SNAPSHOT_MAGIC) {
        Some(body) => Ok(from_cbor(body)?),
        None => Err(StorageError::Corrupted(
            "snapshot does not start with the expected magic bytes".to_string(),
        )),
    }
}

impl StorageProvider for FileStorage {
    fn load(&self, id: &ObjectId) -> StorageResult<Option<StoredRecord>> {
        self.inner.load(id)
    }

    fn load_many(&self, ids: &[ObjectId]) -> StorageResult<Vec<Option<StoredRecord>>> {
        self.inner.load_many(ids)
    }

    fn query(&self, query: &RecordQuery) -> StorageResult<Vec<StoredRecord>> {
        self.inner.query(query)
    }

    fn new_object_id(&self, class_id: &ClassId) -> StorageResult<ObjectId> {
        self.inner.new_object_id(class_id)
    }

    fn begin(&self) -> StorageResult<Box<dyn StorageSession + '_>> {
        Ok(Box::new(FileSession {
            storage: self,
            inner: MemorySession::new(&self.inner),
        }))
    }
}

struct FileSession<'a> {
    storage: &'a FileStorage,
    inner: MemorySession<'a>,
}

impl StorageSession for FileSession<'_> {
    fn save(&mut self, writes: &[RecordWrite]) -> StorageResult<()> {
        self.inner.save(writes)
    }

    fn update_timestamps(&self, ids: &[ObjectId]) -> StorageResult<Vec<Option<Timestamp>>> {
        self.inner.update_timestamps(ids)
    }

    fn commit(&mut self) -> StorageResult<()> {
        let storage = self.storage;
        self.inner.commit_with(|table| storage.write_snapshot(table))
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.inner.rollback()
    }
}
