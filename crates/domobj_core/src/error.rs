//! Error types for the transaction core.

use crate::types::TransactionId;
use domobj_codec::{ClassId, ObjectId};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in transaction core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage provider error.
    #[error("storage error: {0}")]
    Storage(#[from] domobj_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] domobj_codec::CodecError),

    /// One or more objects have no backing data.
    #[error("object(s) could not be found: {}", join_ids(.ids))]
    ObjectsNotFound {
        /// The ids that could not be loaded.
        ids: Vec<ObjectId>,
    },

    /// The object is deleted in the transaction it was accessed through.
    #[error("object '{id}' is already deleted")]
    ObjectDeleted {
        /// The deleted object.
        id: ObjectId,
    },

    /// The object is invalid in the transaction it was accessed through.
    #[error("object '{id}' is invalid in this transaction")]
    ObjectInvalid {
        /// The invalid object.
        id: ObjectId,
    },

    /// The object reference does not belong to the transaction hierarchy.
    #[error("domain object '{id}' cannot be used in transaction {transaction}")]
    ObjectNotEnlisted {
        /// The object.
        id: ObjectId,
        /// The transaction it was used with.
        transaction: TransactionId,
    },

    /// An object was requested as an unrelated type.
    #[error("object '{id}' is not of type '{requested}'")]
    ObjectTypeMismatch {
        /// The object.
        id: ObjectId,
        /// The requested class.
        requested: ClassId,
    },

    /// An extension key is already in use.
    #[error("An extension with key '{key}' is already part of the collection.")]
    DuplicateExtension {
        /// The duplicated key.
        key: String,
    },

    /// No transaction was supplied and none is current.
    #[error("No ClientTransaction has been associated with the current thread.")]
    NoCurrentTransaction,

    /// The transaction has been discarded.
    #[error("The transaction can no longer be used because it has been discarded.")]
    TransactionDiscarded,

    /// The transaction has a sub-transaction and cannot be modified.
    #[error("the operation '{operation}' cannot be executed because transaction {transaction} is read-only")]
    TransactionReadOnly {
        /// The read-only transaction.
        transaction: TransactionId,
        /// The rejected operation.
        operation: String,
    },

    /// The transaction has a sub-transaction and has not been activated.
    #[error("transaction {transaction} cannot be used while it is inactive; use its active sub-transaction or enter a scope for it")]
    TransactionInactive {
        /// The inactive transaction.
        transaction: TransactionId,
    },

    /// An argument is not acceptable.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// The operation is not valid in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of the problem.
        message: String,
    },

    /// A class, property or relation is not part of the mapping.
    #[error("mapping error: {message}")]
    Mapping {
        /// Description of the problem.
        message: String,
    },

    /// A mandatory relation has no related object at commit time.
    #[error("mandatory relation property '{property}' of object '{id}' contains no item")]
    MandatoryRelationNotSet {
        /// The object.
        id: ObjectId,
        /// The relation property.
        property: String,
    },

    /// An extension cancelled the operation.
    #[error("extension '{key}' cancelled the operation: {reason}")]
    ExtensionVeto {
        /// Key of the vetoing extension.
        key: String,
        /// Reason given by the extension.
        reason: String,
    },
}

fn join_ids(ids: &[ObjectId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl CoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a mapping error.
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping {
            message: message.into(),
        }
    }

    /// Creates a read-only error for the given operation.
    pub fn read_only(transaction: TransactionId, operation: impl Into<String>) -> Self {
        Self::TransactionReadOnly {
            transaction,
            operation: operation.into(),
        }
    }

    /// Creates an extension veto error.
    pub fn veto(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExtensionVeto {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if this is a not-found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectsNotFound { .. })
    }
}
