//! Collection queries.

use crate::data_manager::DataManager;
use crate::domain_object::{DomainObject, DomainObjectType};
use crate::error::{CoreError, CoreResult};
use crate::events::EventBroker;
use crate::invalid::InvalidDomainObjectManager;
use crate::mapping::MappingConfiguration;
use crate::persistence::PersistenceStrategy;
use crate::transaction::ClientTransaction;
use domobj_codec::{ClassId, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Selects the objects of a class, optionally by one property value.
///
/// Instances of derived classes are part of the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// The queried class.
    pub class_id: ClassId,
    /// Property name and the value it must have.
    pub filter: Option<(String, Value)>,
}

impl Query {
    /// Selects every object of `class_id`.
    #[must_use]
    pub fn all(class_id: impl Into<ClassId>) -> Self {
        Self {
            class_id: class_id.into(),
            filter: None,
        }
    }

    /// Selects the objects of `class_id` whose `property` equals `value`.
    #[must_use]
    pub fn by_property(
        class_id: impl Into<ClassId>,
        property: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            class_id: class_id.into(),
            filter: Some((property.into(), value.into())),
        }
    }
}

/// The objects returned by a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult<T = DomainObject> {
    query: Query,
    objects: Vec<T>,
}

impl<T> QueryResult<T> {
    /// Creates a result.
    #[must_use]
    pub fn new(query: Query, objects: Vec<T>) -> Self {
        Self { query, objects }
    }

    /// Returns the query that produced this result.
    #[must_use]
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Returns the objects.
    #[must_use]
    pub fn objects(&self) -> &[T] {
        &self.objects
    }

    /// Consumes the result and returns the objects.
    #[must_use]
    pub fn into_objects(self) -> Vec<T> {
        self.objects
    }

    /// Returns the number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if the query found nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl QueryResult {
    /// Converts the objects to a typed wrapper.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectTypeMismatch`] if an object is not of
    /// class `T::CLASS_ID` or a class derived from it.
    pub fn into_typed<T: DomainObjectType>(
        self,
        mapping: &MappingConfiguration,
    ) -> CoreResult<QueryResult<T>> {
        let requested = ClassId::new(T::CLASS_ID);
        let objects = self
            .objects
            .into_iter()
            .map(|object| {
                if mapping.is_same_or_base_of(&requested, object.class_id()) {
                    Ok(T::from_domain_object(object))
                } else {
                    Err(CoreError::ObjectTypeMismatch {
                        id: object.id().clone(),
                        requested: requested.clone(),
                    })
                }
            })
            .collect::<CoreResult<Vec<T>>>()?;
        Ok(QueryResult::new(self.query, objects))
    }
}

/// Executes queries for one transaction.
pub struct QueryManager {
    mapping: Arc<MappingConfiguration>,
    persistence: Arc<dyn PersistenceStrategy>,
    data_manager: Arc<DataManager>,
    invalid: Arc<InvalidDomainObjectManager>,
    broker: Arc<EventBroker>,
}

impl QueryManager {
    /// Creates a query manager.
    #[must_use]
    pub fn new(
        mapping: Arc<MappingConfiguration>,
        persistence: Arc<dyn PersistenceStrategy>,
        data_manager: Arc<DataManager>,
        invalid: Arc<InvalidDomainObjectManager>,
        broker: Arc<EventBroker>,
    ) -> Self {
        Self {
            mapping,
            persistence,
            data_manager,
            invalid,
            broker,
        }
    }

    /// Runs a collection query.
    ///
    /// Data already registered in the transaction wins over the data the
    /// query returns. Objects invalid in this transaction are dropped,
    /// then the result runs through the `filter_query_result` pipeline.
    pub(crate) fn get_collection(
        &self,
        tx: &ClientTransaction,
        query: &Query,
    ) -> CoreResult<QueryResult> {
        let class = self.mapping.class(&query.class_id)?;
        if let Some((name, value)) = &query.filter {
            let property = class.property(name).ok_or_else(|| {
                CoreError::mapping(format!("class '{}' has no property '{name}'", query.class_id))
            })?;
            if !property.accepts(value) {
                return Err(CoreError::invalid_argument(format!(
                    "value {value:?} cannot be compared with property '{name}'"
                )));
            }
        }

        let containers = self.persistence.execute_collection_query(query)?;
        let objects: Vec<DomainObject> = self
            .data_manager
            .register_loaded(tx, containers)?
            .into_iter()
            .filter(|object| !self.invalid.is_invalid(object.id()))
            .collect();
        tracing::debug!(
            transaction = %tx.id(),
            class = %query.class_id,
            count = objects.len(),
            "query executed"
        );
        self.broker
            .filter_query_result(tx, QueryResult::new(query.clone(), objects))
    }
}

impl std::fmt::Debug for QueryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryManager").finish_non_exhaustive()
    }
}
