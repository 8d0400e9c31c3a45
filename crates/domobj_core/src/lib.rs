//! # domobj core
//!
//! Client-side unit of work for domain objects.
//!
//! A [`ClientTransaction`] loads objects through a storage provider, keeps
//! exactly one [`DomainObject`] per id, tracks property and relation
//! changes against the loaded state and writes them back in one step.
//!
//! This crate provides:
//! - Mapping metadata ([`MappingConfiguration`]) built once and shared
//! - Identity map and per-transaction data containers
//! - Bidirectional relation management with lazily loaded end-points
//! - Nested sub-transactions that read through and commit into their parent
//! - Lifecycle events for listeners and extensions, with veto support
//! - Thread-bound ambient transaction scopes
//! - CBOR snapshots of a transaction hierarchy
//!
//! ## Example
//!
//! ```rust,ignore
//! use domobj_core::{ClientTransaction, MappingConfiguration};
//!
//! let tx = ClientTransaction::create_root_transaction(mapping, storage)?;
//! let customer = tx.new_object("Customer")?;
//! tx.set_property(&customer, "Name", "Ada")?;
//!
//! let sub = tx.create_sub_transaction()?;
//! let order = sub.new_object("Order")?;
//! sub.add_related_object(&customer, "Orders", &order)?;
//! sub.commit()?;
//! sub.discard()?;
//!
//! tx.commit()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ambient;
mod application_data;
mod commit;
mod config;
mod data_container;
mod data_manager;
mod domain_object;
mod end_point;
mod enlisted;
mod error;
mod events;
mod extension;
mod hierarchy;
mod invalid;
mod lifetime;
mod loader;
mod mapping;
mod persistence;
mod query;
mod scope;
mod state;
mod transaction;
mod types;
pub mod unload;

pub use application_data::ApplicationData;
pub use commit::{is_commit_relevant, CommitRollbackAgent, CommittingEventRegistrar};
pub use config::Config;
pub use data_container::{DataContainer, DataContainerState, PersistenceState};
pub use data_manager::DataManager;
pub use domain_object::{DomainObject, DomainObjectType};
pub use end_point::{
    CollectionEndPoint, EndPointLoadState, ExpandedCommand, RelatedObjects,
    RelationEndPointCommand, RelationEndPointId, RelationModification, VirtualEndPoint,
    VirtualObjectEndPoint,
};
pub use enlisted::EnlistedDomainObjectManager;
pub use error::{CoreError, CoreResult};
pub use events::{
    ClientTransactionListener, EventBroker, InvalidatedTransactionListener, LoggingListener,
};
pub use extension::{
    try_install, ClientTransactionExtension, ClientTransactionExtensionCollection,
    CommitValidationExtension,
};
pub use hierarchy::{ReadOnlyTransactionListener, TransactionHierarchyManager};
pub use invalid::InvalidDomainObjectManager;
pub use lifetime::ObjectLifetimeAgent;
pub use mapping::{
    Cardinality, ClassBuilder, ClassDefinition, MappingBuilder, MappingConfiguration,
    PropertyDefinition, Relation, RelationEndPointDefinition, StorageClass,
};
pub use persistence::{
    PersistableData, PersistenceStrategy, RootPersistenceStrategy, SubPersistenceStrategy,
};
pub use query::{Query, QueryManager, QueryResult};
pub use scope::{ClientTransactionScope, ScopeLeaveBehavior};
pub use state::{DomainObjectState, DomainObjectStateBuilder};
pub use transaction::{
    ClientTransaction, ClientTransactionComponentFactory, RootComponentFactory,
    SubComponentFactory,
};
pub use types::{TransactionId, ValueAccess};

pub use domobj_codec::{ClassId, ObjectId, StorageKey, Value, ValueType};
