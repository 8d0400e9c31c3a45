//! Domain object lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

const NEW: u16 = 1 << 0;
const CHANGED: u16 = 1 << 1;
const DELETED: u16 = 1 << 2;
const INVALID: u16 = 1 << 3;
const NOT_LOADED_YET: u16 = 1 << 4;
const NEW_IN_HIERARCHY: u16 = 1 << 5;
const PERSISTENT_DATA_CHANGED: u16 = 1 << 6;
const NON_PERSISTENT_DATA_CHANGED: u16 = 1 << 7;
const RELATION_CHANGED: u16 = 1 << 8;

const FACET_NAMES: [(u16, &str); 9] = [
    (NEW, "New"),
    (CHANGED, "Changed"),
    (DELETED, "Deleted"),
    (INVALID, "Invalid"),
    (NOT_LOADED_YET, "NotLoadedYet"),
    (NEW_IN_HIERARCHY, "NewInHierarchy"),
    (PERSISTENT_DATA_CHANGED, "PersistentDataChanged"),
    (NON_PERSISTENT_DATA_CHANGED, "NonPersistentDataChanged"),
    (RELATION_CHANGED, "RelationChanged"),
];

/// The lifecycle state of a domain object in one transaction.
///
/// A state is an immutable combination of orthogonal facets. It is computed
/// on demand from the data container and relation end-points; it is never
/// stored authoritatively.
///
/// `is_unchanged` is derived: it holds iff none of New, Changed, Deleted,
/// Invalid and NotLoadedYet is set. The data-changed and relation-changed
/// sub-flags never imply `is_changed` on their own.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DomainObjectState {
    flags: u16,
}

impl DomainObjectState {
    /// Starts building a state.
    #[must_use]
    pub const fn builder() -> DomainObjectStateBuilder {
        DomainObjectStateBuilder { flags: 0 }
    }

    const fn has(self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    /// The object was created in this transaction.
    #[must_use]
    pub const fn is_new(self) -> bool {
        self.has(NEW)
    }

    /// The object has unsaved modifications or was explicitly marked.
    #[must_use]
    pub const fn is_changed(self) -> bool {
        self.has(CHANGED)
    }

    /// The object was deleted in this transaction.
    #[must_use]
    pub const fn is_deleted(self) -> bool {
        self.has(DELETED)
    }

    /// The object cannot be used in this transaction.
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.has(INVALID)
    }

    /// The object is enlisted but its data has not been loaded.
    #[must_use]
    pub const fn is_not_loaded_yet(self) -> bool {
        self.has(NOT_LOADED_YET)
    }

    /// None of New, Changed, Deleted, Invalid and NotLoadedYet is set.
    #[must_use]
    pub const fn is_unchanged(self) -> bool {
        self.flags & (NEW | CHANGED | DELETED | INVALID | NOT_LOADED_YET) == 0
    }

    /// The object is new in this transaction or in one of its ancestors.
    #[must_use]
    pub const fn is_new_in_hierarchy(self) -> bool {
        self.has(NEW_IN_HIERARCHY)
    }

    /// A persistent property differs from its original value.
    #[must_use]
    pub const fn is_persistent_data_changed(self) -> bool {
        self.has(PERSISTENT_DATA_CHANGED)
    }

    /// A transaction-only property differs from its original value.
    #[must_use]
    pub const fn is_non_persistent_data_changed(self) -> bool {
        self.has(NON_PERSISTENT_DATA_CHANGED)
    }

    /// Any property differs from its original value.
    #[must_use]
    pub const fn is_data_changed(self) -> bool {
        self.has(PERSISTENT_DATA_CHANGED | NON_PERSISTENT_DATA_CHANGED)
    }

    /// A relation of the object differs from its original value.
    #[must_use]
    pub const fn is_relation_changed(self) -> bool {
        self.has(RELATION_CHANGED)
    }
}

impl fmt::Debug for DomainObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DomainObjectState({self})")
    }
}

impl fmt::Display for DomainObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = Vec::new();
        if self.is_unchanged() {
            names.push("Unchanged");
        }
        names.extend(
            FACET_NAMES
                .iter()
                .filter(|(flag, _)| self.has(*flag))
                .map(|(_, name)| *name),
        );
        f.write_str(&names.join(", "))
    }
}

/// Builder for [`DomainObjectState`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainObjectStateBuilder {
    flags: u16,
}

impl DomainObjectStateBuilder {
    const fn with(mut self, flag: u16) -> Self {
        self.flags |= flag;
        self
    }

    /// Sets the New facet.
    #[must_use]
    pub const fn set_new(self) -> Self {
        self.with(NEW)
    }

    /// Sets the Changed facet.
    #[must_use]
    pub const fn set_changed(self) -> Self {
        self.with(CHANGED)
    }

    /// Sets the Deleted facet.
    #[must_use]
    pub const fn set_deleted(self) -> Self {
        self.with(DELETED)
    }

    /// Sets the Invalid facet.
    #[must_use]
    pub const fn set_invalid(self) -> Self {
        self.with(INVALID)
    }

    /// Sets the NotLoadedYet facet.
    #[must_use]
    pub const fn set_not_loaded_yet(self) -> Self {
        self.with(NOT_LOADED_YET)
    }

    /// Sets the NewInHierarchy facet.
    #[must_use]
    pub const fn set_new_in_hierarchy(self) -> Self {
        self.with(NEW_IN_HIERARCHY)
    }

    /// Sets the persistent data-changed sub-flag.
    #[must_use]
    pub const fn set_persistent_data_changed(self) -> Self {
        self.with(PERSISTENT_DATA_CHANGED)
    }

    /// Sets the non-persistent data-changed sub-flag.
    #[must_use]
    pub const fn set_non_persistent_data_changed(self) -> Self {
        self.with(NON_PERSISTENT_DATA_CHANGED)
    }

    /// Sets the relation-changed sub-flag.
    #[must_use]
    pub const fn set_relation_changed(self) -> Self {
        self.with(RELATION_CHANGED)
    }

    /// Finishes the state.
    #[must_use]
    pub const fn build(self) -> DomainObjectState {
        DomainObjectState { flags: self.flags }
    }
}
