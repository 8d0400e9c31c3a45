//! Collection end-points.

use super::RelationEndPointId;
use crate::error::{CoreError, CoreResult};
use domobj_codec::ObjectId;
use std::collections::HashSet;

/// The collection side of a one-to-many relation.
///
/// Items keep insertion order. Change detection ignores order: a
/// collection holding the original items in a different order is
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEndPoint {
    id: RelationEndPointId,
    current: Vec<ObjectId>,
    original: Vec<ObjectId>,
    touched: bool,
}

impl CollectionEndPoint {
    /// Creates a complete end-point.
    #[must_use]
    pub fn new(id: RelationEndPointId, original: Vec<ObjectId>, current: Vec<ObjectId>) -> Self {
        Self {
            id,
            current,
            original,
            touched: false,
        }
    }

    pub(crate) fn restore(
        id: RelationEndPointId,
        original: Vec<ObjectId>,
        current: Vec<ObjectId>,
        touched: bool,
    ) -> Self {
        Self {
            touched,
            ..Self::new(id, original, current)
        }
    }

    /// Returns the end-point id.
    #[must_use]
    pub fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    /// Returns the current items.
    #[must_use]
    pub fn current(&self) -> &[ObjectId] {
        &self.current
    }

    /// Returns the original items.
    #[must_use]
    pub fn original(&self) -> &[ObjectId] {
        &self.original
    }

    /// Returns the number of current items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// Returns `true` if there are no current items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Returns `true` if `id` is a current item.
    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.current.contains(id)
    }

    /// Returns `true` if the current items differ from the original ones,
    /// ignoring order.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        if self.current.len() != self.original.len() {
            return true;
        }
        let original: HashSet<&ObjectId> = self.original.iter().collect();
        !self.current.iter().all(|id| original.contains(id))
    }

    /// Returns `true` if the end-point was written.
    #[must_use]
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// Inserts an item at `index`, or appends it.
    pub(crate) fn insert(&mut self, index: Option<usize>, id: ObjectId) -> CoreResult<()> {
        if self.contains(&id) {
            return Err(CoreError::invalid_argument(format!(
                "object '{id}' is already part of the collection '{}'",
                self.id
            )));
        }
        match index {
            Some(index) if index > self.current.len() => {
                return Err(CoreError::invalid_argument(format!(
                    "index {index} is out of range for the collection '{}' with {} items",
                    self.id,
                    self.current.len()
                )));
            }
            Some(index) => self.current.insert(index, id),
            None => self.current.push(id),
        }
        self.touched = true;
        Ok(())
    }

    /// Removes an item, returning its index.
    pub(crate) fn remove(&mut self, id: &ObjectId) -> CoreResult<usize> {
        let index = self.current.iter().position(|item| item == id).ok_or_else(|| {
            CoreError::invalid_argument(format!(
                "object '{id}' is not part of the collection '{}'",
                self.id
            ))
        })?;
        self.current.remove(index);
        self.touched = true;
        Ok(index)
    }

    pub(crate) fn replace(&mut self, items: Vec<ObjectId>) {
        self.current = items;
        self.touched = true;
    }

    pub(crate) fn commit(&mut self) {
        self.original = self.current.clone();
        self.touched = false;
    }

    pub(crate) fn rollback(&mut self) {
        self.current = self.original.clone();
        self.touched = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domobj_codec::StorageKey;

    fn order(key: i64) -> ObjectId {
        ObjectId::new("Order", StorageKey::Integer(key))
    }

    fn orders() -> CollectionEndPoint {
        let owner = ObjectId::new("Customer", StorageKey::Integer(1));
        CollectionEndPoint::new(
            RelationEndPointId::new(owner, "Orders"),
            vec![order(1), order(2)],
            vec![order(1), order(2)],
        )
    }

    #[test]
    fn duplicate_add_and_missing_remove_fail() {
        let mut end_point = orders();
        assert!(end_point.insert(None, order(1)).is_err());
        assert!(end_point.remove(&order(9)).is_err());
        assert!(!end_point.is_touched());
    }

    #[test]
    fn insert_respects_index_and_bounds() {
        let mut end_point = orders();
        end_point.insert(Some(0), order(3)).unwrap();
        assert_eq!(end_point.current(), &[order(3), order(1), order(2)]);
        assert!(end_point.insert(Some(9), order(4)).is_err());
        assert!(end_point.has_changed());
    }

    #[test]
    fn reordering_is_not_a_change() {
        let mut end_point = orders();
        end_point.replace(vec![order(2), order(1)]);
        assert!(!end_point.has_changed());
        assert!(end_point.is_touched());
    }

    #[test]
    fn rollback_restores_original() {
        let mut end_point = orders();
        end_point.remove(&order(1)).unwrap();
        end_point.rollback();
        assert_eq!(end_point.current(), end_point.original());
        assert!(!end_point.has_changed());
    }
}
