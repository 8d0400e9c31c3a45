//! Persistence strategies.
//!
//! A transaction never loads or saves data itself. Root transactions go to
//! a [`domobj_storage::StorageProvider`] through [`RootPersistenceStrategy`];
//! sub-transactions go to their parent through [`SubPersistenceStrategy`],
//! which reads the parent's current data and commits into the parent's
//! data manager.

mod root;
mod sub;

pub use root::RootPersistenceStrategy;
pub use sub::SubPersistenceStrategy;

use crate::data_container::DataContainer;
use crate::domain_object::DomainObject;
use crate::end_point::{RelationEndPointId, VirtualEndPoint};
use crate::error::CoreResult;
use crate::mapping::{ClassDefinition, RelationEndPointDefinition};
use crate::query::Query;
use crate::state::DomainObjectState;
use crate::transaction::ClientTransaction;
use domobj_codec::ObjectId;
use domobj_storage::Timestamp;

/// The data of one object handed to a commit.
#[derive(Debug, Clone)]
pub struct PersistableData {
    /// The object.
    pub domain_object: DomainObject,
    /// The object's state before the commit.
    pub state: DomainObjectState,
    /// The object's data, `None` if only its virtual end-points changed.
    pub data_container: Option<DataContainer>,
    /// The object's changed virtual end-points.
    pub end_points: Vec<VirtualEndPoint>,
}

/// The source and sink of a transaction's data.
pub trait PersistenceStrategy: Send + Sync {
    /// Returns the transaction this strategy delegates to, `None` for a
    /// root strategy.
    fn parent_transaction(&self) -> Option<ClientTransaction>;

    /// Allocates an id for a new object.
    ///
    /// # Errors
    ///
    /// Returns an error for abstract classes or when no id can be
    /// allocated.
    fn create_new_object_id(&self, class: &ClassDefinition) -> CoreResult<ObjectId>;

    /// Loads the data of several objects, preserving input order. Missing
    /// objects yield `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    fn load_object_data(&self, ids: &[ObjectId]) -> CoreResult<Vec<Option<DataContainer>>>;

    /// Loads the objects related to a virtual end-point through their
    /// foreign keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    fn load_related_object_data(
        &self,
        end_point: &RelationEndPointId,
        definition: &RelationEndPointDefinition,
    ) -> CoreResult<Vec<DataContainer>>;

    /// Executes a collection query.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    fn execute_collection_query(&self, query: &Query) -> CoreResult<Vec<DataContainer>>;

    /// Writes the commit set and returns the new timestamps of the written
    /// objects.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing could be written; no data is written in
    /// that case.
    fn persist_data(
        &self,
        data: &[PersistableData],
    ) -> CoreResult<Vec<(ObjectId, Option<Timestamp>)>>;
}
