//! Domain object references.

use crate::hierarchy::TransactionHierarchy;
use crate::transaction::ClientTransaction;
use domobj_codec::{ClassId, ObjectId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// An identity-bearing reference to a persistent object.
///
/// A `DomainObject` carries no data: property values live in the data
/// container of the transaction it is accessed through. Exactly one
/// instance exists per [`ObjectId`] in a transaction hierarchy, so equality
/// is reference equality. Cloning is cheap and yields the same instance.
#[derive(Clone)]
pub struct DomainObject {
    inner: Arc<DomainObjectInner>,
}

struct DomainObjectInner {
    id: ObjectId,
    hierarchy: Weak<TransactionHierarchy>,
    loaded: AtomicBool,
}

impl DomainObject {
    pub(crate) fn new(id: ObjectId, hierarchy: &Arc<TransactionHierarchy>) -> Self {
        Self {
            inner: Arc::new(DomainObjectInner {
                id,
                hierarchy: Arc::downgrade(hierarchy),
                loaded: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the object id.
    #[must_use]
    pub fn id(&self) -> &ObjectId {
        &self.inner.id
    }

    /// Returns the class id.
    #[must_use]
    pub fn class_id(&self) -> &ClassId {
        self.inner.id.class_id()
    }

    /// Returns `true` once the object has been fully initialized.
    ///
    /// New objects are initialized at creation; loaded objects when the
    /// first `objects_loaded` event for them has been raised. Before that
    /// only the data container exists.
    #[must_use]
    pub fn needs_load_mode_data_container_only(&self) -> bool {
        self.inner.loaded.load(Ordering::Acquire)
    }

    /// Marks the object initialized, returning whether it already was.
    pub(crate) fn mark_loaded(&self) -> bool {
        self.inner.loaded.swap(true, Ordering::AcqRel)
    }

    /// Returns the root transaction of the hierarchy the object is
    /// enlisted in, if it is still alive.
    #[must_use]
    pub fn root_transaction(&self) -> Option<ClientTransaction> {
        self.inner.hierarchy.upgrade()?.root_transaction()
    }

    /// Returns the active transaction of the object's hierarchy.
    #[must_use]
    pub fn default_transaction(&self) -> Option<ClientTransaction> {
        self.inner.hierarchy.upgrade()?.active_transaction()
    }

    pub(crate) fn belongs_to(&self, hierarchy: &Arc<TransactionHierarchy>) -> bool {
        std::ptr::eq(self.inner.hierarchy.as_ptr(), Arc::as_ptr(hierarchy))
    }

    /// Returns `true` if both references are the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for DomainObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for DomainObject {}

impl Hash for DomainObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}

impl fmt::Debug for DomainObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DomainObject({})", self.inner.id)
    }
}

impl fmt::Display for DomainObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner.id, f)
    }
}

/// A typed wrapper around a [`DomainObject`] of one mapped class.
///
/// Implemented by application types to get checked access through
/// [`ClientTransaction::get_object_as`] and friends.
///
/// ```
/// use domobj_core::{DomainObject, DomainObjectType};
///
/// struct Order(DomainObject);
///
/// impl DomainObjectType for Order {
///     const CLASS_ID: &'static str = "Order";
///     fn from_domain_object(object: DomainObject) -> Self {
///         Self(object)
///     }
///     fn domain_object(&self) -> &DomainObject {
///         &self.0
///     }
/// }
/// ```
pub trait DomainObjectType: Sized {
    /// The mapped class this type stands for. Objects of derived classes
    /// are accepted as well.
    const CLASS_ID: &'static str;

    /// Wraps an object already checked to be of a compatible class.
    fn from_domain_object(object: DomainObject) -> Self;

    /// Returns the wrapped object.
    fn domain_object(&self) -> &DomainObject;

    /// Returns the object id.
    fn id(&self) -> &ObjectId {
        self.domain_object().id()
    }
}
