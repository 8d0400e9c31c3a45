//! Relation end-points.
//!
//! Every relation has two end-points. The real end-point is the foreign-key
//! property in the data container of the referencing object; it needs no
//! bookkeeping of its own. The virtual end-point (a single related object or
//! a collection) holds no storage and is computed from the opposite foreign
//! keys when it is first accessed.

mod collection;
mod command;
mod virtual_object;

pub use collection::CollectionEndPoint;
pub use command::{ExpandedCommand, RelationEndPointCommand, RelationModification};
pub use virtual_object::VirtualObjectEndPoint;

pub(crate) use command::{ExpandError, MissingData};

use crate::domain_object::DomainObject;
use domobj_codec::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one end-point: the owning object and the relation property.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationEndPointId {
    object_id: ObjectId,
    property_name: String,
}

impl RelationEndPointId {
    /// Creates an end-point id.
    #[must_use]
    pub fn new(object_id: ObjectId, property_name: impl Into<String>) -> Self {
        Self {
            object_id,
            property_name: property_name.into(),
        }
    }

    /// Returns the owning object.
    #[must_use]
    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    /// Returns the relation property name.
    #[must_use]
    pub fn property_name(&self) -> &str {
        &self.property_name
    }
}

impl fmt::Display for RelationEndPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object_id, self.property_name)
    }
}

/// Load state of a virtual end-point.
///
/// `NotLoaded → Loading → Complete`; unloading returns a complete
/// end-point to `NotLoaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndPointLoadState {
    /// Not materialized in this transaction.
    NotLoaded,
    /// Being loaded.
    Loading,
    /// Fully materialized.
    Complete,
}

/// A materialized virtual end-point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualEndPoint {
    /// The virtual side of a one-to-one relation.
    Object(VirtualObjectEndPoint),
    /// The collection side of a one-to-many relation.
    Collection(CollectionEndPoint),
}

impl VirtualEndPoint {
    /// Returns the end-point id.
    #[must_use]
    pub fn id(&self) -> &RelationEndPointId {
        match self {
            Self::Object(end_point) => end_point.id(),
            Self::Collection(end_point) => end_point.id(),
        }
    }

    /// Returns `true` if the current value differs from the original.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        match self {
            Self::Object(end_point) => end_point.has_changed(),
            Self::Collection(end_point) => end_point.has_changed(),
        }
    }

    /// Returns `true` if the end-point was written in this transaction.
    #[must_use]
    pub fn is_touched(&self) -> bool {
        match self {
            Self::Object(end_point) => end_point.is_touched(),
            Self::Collection(end_point) => end_point.is_touched(),
        }
    }

    /// Returns the currently related ids.
    #[must_use]
    pub fn current_ids(&self) -> Vec<ObjectId> {
        match self {
            Self::Object(end_point) => end_point.current().cloned().into_iter().collect(),
            Self::Collection(end_point) => end_point.current().to_vec(),
        }
    }

    /// Returns the originally related ids.
    #[must_use]
    pub fn original_ids(&self) -> Vec<ObjectId> {
        match self {
            Self::Object(end_point) => end_point.original().cloned().into_iter().collect(),
            Self::Collection(end_point) => end_point.original().to_vec(),
        }
    }

    pub(crate) fn commit(&mut self) {
        match self {
            Self::Object(end_point) => end_point.commit(),
            Self::Collection(end_point) => end_point.commit(),
        }
    }

    pub(crate) fn rollback(&mut self) {
        match self {
            Self::Object(end_point) => end_point.rollback(),
            Self::Collection(end_point) => end_point.rollback(),
        }
    }

    /// Replaces the current value with the current value of `source`.
    pub(crate) fn set_current_from(&mut self, source: &VirtualEndPoint) {
        match (self, source) {
            (Self::Object(target), Self::Object(source)) => target.set(source.current().cloned()),
            (Self::Collection(target), Self::Collection(source)) => {
                target.replace(source.current().to_vec());
            }
            _ => {}
        }
    }
}

/// The value of a relation as seen by relation events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelatedObjects {
    /// A one-valued relation.
    Single(Option<DomainObject>),
    /// A collection relation.
    Collection(Vec<DomainObject>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use domobj_codec::StorageKey;

    #[test]
    fn object_end_point_ids_hold_at_most_one_item() {
        let ticket = ObjectId::new("OrderTicket", StorageKey::Integer(1));
        let id = RelationEndPointId::new(ObjectId::new("Order", StorageKey::Integer(1)), "OrderTicket");
        let end_point = VirtualEndPoint::Object(VirtualObjectEndPoint::new(id, Some(ticket.clone()), None));
        assert_eq!(end_point.original_ids(), vec![ticket]);
        assert!(end_point.current_ids().is_empty());
    }
}
