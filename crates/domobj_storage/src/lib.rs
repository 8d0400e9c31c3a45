//! # domobj storage
//!
//! Storage provider abstraction for domobj.
//!
//! The transaction core never talks to a database directly. Root
//! transactions persist through a [`StorageProvider`], which stores flat
//! [`StoredRecord`]s keyed by object id and knows nothing about relations,
//! domain objects or sub-transactions.
//!
//! ## Design Principles
//!
//! - Providers are simple record stores (load, query, staged writes)
//! - Writes are staged in a [`StorageSession`] and published atomically
//! - Every record carries a [`Timestamp`]; stale writes are rejected
//! - Providers must be `Send + Sync`
//!
//! ## Available Providers
//!
//! - [`InMemoryStorage`] - For testing and ephemeral data
//! - [`FileStorage`] - A CBOR snapshot file rewritten atomically on commit

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod provider;
mod record;

pub use error::{StorageError, StorageResult};
pub use file::FileStorage;
pub use memory::{InMemoryStorage, KeyGeneration};
pub use provider::{StorageProvider, StorageSession};
pub use record::{RecordQuery, RecordWrite, StoredRecord, Timestamp};
