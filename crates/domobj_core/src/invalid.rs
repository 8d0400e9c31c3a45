//! Invalid object bookkeeping.

use crate::domain_object::DomainObject;
use crate::error::CoreResult;
use crate::events::EventBroker;
use crate::transaction::ClientTransaction;
use domobj_codec::ObjectId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Tracks the objects that cannot be used in one transaction.
///
/// An object is invalid when it was deleted and committed, discarded as a
/// new object, created in a sub-transaction not yet committed, or found
/// to have no backing data.
pub struct InvalidDomainObjectManager {
    objects: Mutex<HashMap<ObjectId, DomainObject>>,
    broker: Arc<EventBroker>,
}

impl InvalidDomainObjectManager {
    /// Creates an empty manager raising its events on `broker`.
    #[must_use]
    pub fn new(broker: Arc<EventBroker>) -> Self {
        Self::with_objects(broker, Vec::new())
    }

    /// Creates a manager with objects already marked invalid.
    #[must_use]
    pub fn with_objects(broker: Arc<EventBroker>, objects: Vec<DomainObject>) -> Self {
        Self {
            objects: Mutex::new(
                objects
                    .into_iter()
                    .map(|object| (object.id().clone(), object))
                    .collect(),
            ),
            broker,
        }
    }

    /// Returns `true` if the object with `id` is invalid.
    #[must_use]
    pub fn is_invalid(&self, id: &ObjectId) -> bool {
        self.objects.lock().contains_key(id)
    }

    /// Returns the invalid object with `id`.
    #[must_use]
    pub fn invalid_object(&self, id: &ObjectId) -> Option<DomainObject> {
        self.objects.lock().get(id).cloned()
    }

    /// Returns all invalid objects.
    #[must_use]
    pub fn invalid_objects(&self) -> Vec<DomainObject> {
        self.objects.lock().values().cloned().collect()
    }

    /// Returns the number of invalid objects.
    #[must_use]
    pub fn count(&self) -> usize {
        self.objects.lock().len()
    }

    /// Marks an object invalid, returning whether it was valid before.
    ///
    /// # Errors
    ///
    /// Propagates listener errors from `object_marked_invalid`.
    pub fn mark_invalid(&self, tx: &ClientTransaction, object: &DomainObject) -> CoreResult<bool> {
        if !self.insert(object) {
            return Ok(false);
        }
        tracing::debug!(transaction = %tx.id(), object = %object, "object marked invalid");
        self.broker.raise_object_marked_invalid(tx, object)?;
        Ok(true)
    }

    /// Makes an object valid again, returning whether it was invalid.
    ///
    /// # Errors
    ///
    /// Propagates listener errors from `object_marked_not_invalid`.
    pub fn mark_not_invalid(&self, tx: &ClientTransaction, id: &ObjectId) -> CoreResult<bool> {
        let removed = self.objects.lock().remove(id);
        match removed {
            Some(object) => {
                self.broker.raise_object_marked_not_invalid(tx, &object)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replaces the invalid set with exactly `objects`, without raising events.
    pub(crate) fn reset(&self, objects: Vec<DomainObject>) {
        *self.objects.lock() = objects
            .into_iter()
            .map(|object| (object.id().clone(), object))
            .collect();
    }

    /// Marks an object invalid without raising events.
    pub(crate) fn insert(&self, object: &DomainObject) -> bool {
        let mut objects = self.objects.lock();
        if objects.contains_key(object.id()) {
            return false;
        }
        objects.insert(object.id().clone(), object.clone());
        true
    }
}

impl std::fmt::Debug for InvalidDomainObjectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidDomainObjectManager")
            .field("count", &self.count())
            .finish()
    }
}
