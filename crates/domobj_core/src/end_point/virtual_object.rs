//! Virtual object end-points.

use super::RelationEndPointId;
use domobj_codec::ObjectId;

/// The virtual side of a one-to-one relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualObjectEndPoint {
    id: RelationEndPointId,
    current: Option<ObjectId>,
    original: Option<ObjectId>,
    touched: bool,
}

impl VirtualObjectEndPoint {
    /// Creates a complete end-point.
    #[must_use]
    pub fn new(id: RelationEndPointId, original: Option<ObjectId>, current: Option<ObjectId>) -> Self {
        Self {
            id,
            current,
            original,
            touched: false,
        }
    }

    pub(crate) fn restore(
        id: RelationEndPointId,
        original: Option<ObjectId>,
        current: Option<ObjectId>,
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

    /// Returns the currently related object.
    #[must_use]
    pub fn current(&self) -> Option<&ObjectId> {
        self.current.as_ref()
    }

    /// Returns the originally related object.
    #[must_use]
    pub fn original(&self) -> Option<&ObjectId> {
        self.original.as_ref()
    }

    /// Returns `true` if current and original differ.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.current != self.original
    }

    /// Returns `true` if the end-point was written.
    #[must_use]
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub(crate) fn set(&mut self, related: Option<ObjectId>) {
        self.current = related;
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
