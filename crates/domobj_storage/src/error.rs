//! Error types for storage operations.

use domobj_codec::{CodecError, ObjectId};
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A snapshot could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// One or more records were changed by someone else since they were read.
    #[error("concurrency violation: {} record(s) were modified concurrently: {ids:?}", ids.len())]
    ConcurrencyViolation {
        /// Ids of the stale records.
        ids: Vec<ObjectId>,
    },

    /// An insert targeted an id that already exists.
    #[error("object {id} already exists")]
    DuplicateObject {
        /// The duplicated id.
        id: ObjectId,
    },

    /// An update or delete targeted an id that does not exist.
    #[error("object {id} does not exist")]
    ObjectMissing {
        /// The missing id.
        id: ObjectId,
    },

    /// A query referred to no class.
    #[error("query does not name any class")]
    EmptyQuery,

    /// The storage session has already been committed or rolled back.
    #[error("storage session already finished")]
    SessionFinished,

    /// The storage file is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}
