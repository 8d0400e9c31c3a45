//! The identity map of a transaction hierarchy.

use crate::domain_object::DomainObject;
use crate::error::{CoreError, CoreResult};
use crate::hierarchy::TransactionHierarchy;
use domobj_codec::ObjectId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps object ids to the single [`DomainObject`] instance of a hierarchy.
///
/// One manager is shared by a root transaction and all of its
/// sub-transactions, which is what makes object references usable across
/// the whole hierarchy.
#[derive(Debug, Default)]
pub struct EnlistedDomainObjectManager {
    objects: RwLock<HashMap<ObjectId, DomainObject>>,
}

impl EnlistedDomainObjectManager {
    /// Creates an empty identity map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the enlisted instance for `id`.
    #[must_use]
    pub fn get_enlisted(&self, id: &ObjectId) -> Option<DomainObject> {
        self.objects.read().get(id).cloned()
    }

    /// Returns `true` if this exact instance is enlisted.
    #[must_use]
    pub fn is_enlisted(&self, object: &DomainObject) -> bool {
        self.objects
            .read()
            .get(object.id())
            .is_some_and(|enlisted| enlisted == object)
    }

    /// Enlists an object.
    ///
    /// Enlisting the same instance twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if a different instance is
    /// already enlisted for the same id.
    pub fn enlist(&self, object: &DomainObject) -> CoreResult<()> {
        let mut objects = self.objects.write();
        match objects.get(object.id()) {
            Some(existing) if existing == object => Ok(()),
            Some(_) => Err(CoreError::invalid_operation(format!(
                "a different domain object instance is already enlisted for '{}'",
                object.id()
            ))),
            None => {
                objects.insert(object.id().clone(), object.clone());
                Ok(())
            }
        }
    }

    /// Returns the enlisted instance for `id`, enlisting a new reference
    /// if there is none.
    pub(crate) fn get_or_create(
        &self,
        id: &ObjectId,
        hierarchy: &Arc<TransactionHierarchy>,
    ) -> DomainObject {
        if let Some(object) = self.get_enlisted(id) {
            return object;
        }
        self.objects
            .write()
            .entry(id.clone())
            .or_insert_with(|| DomainObject::new(id.clone(), hierarchy))
            .clone()
    }

    /// Returns the number of enlisted objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns `true` if nothing is enlisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Returns all enlisted objects.
    #[must_use]
    pub fn enlisted_objects(&self) -> Vec<DomainObject> {
        self.objects.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domobj_codec::StorageKey;

    #[test]
    fn one_instance_per_id() {
        let hierarchy = TransactionHierarchy::new();
        let manager = EnlistedDomainObjectManager::new();
        let id = ObjectId::new("Order", StorageKey::Integer(1));

        let first = manager.get_or_create(&id, &hierarchy);
        let second = manager.get_or_create(&id, &hierarchy);
        assert_eq!(first, second);
        assert!(manager.is_enlisted(&first));
        assert_eq!(manager.len(), 1);

        let impostor = DomainObject::new(id, &hierarchy);
        assert!(!manager.is_enlisted(&impostor));
        assert!(matches!(
            manager.enlist(&impostor),
            Err(CoreError::InvalidOperation { .. })
        ));
        manager.enlist(&first).unwrap();
    }
}
