//! Object access through the current transaction of the thread.
//!
//! Every function takes an optional explicit transaction; `None` resolves
//! to the transaction of the innermost [`ClientTransactionScope`].

use crate::domain_object::DomainObject;
use crate::error::{CoreError, CoreResult};
use crate::scope::ClientTransactionScope;
use crate::transaction::ClientTransaction;
use domobj_codec::{ClassId, ObjectId};

/// Returns the current transaction of this thread.
///
/// # Errors
///
/// Returns [`CoreError::NoCurrentTransaction`] if no scope with a
/// transaction has been entered.
pub fn current_transaction() -> CoreResult<ClientTransaction> {
    ClientTransactionScope::current_transaction().ok_or(CoreError::NoCurrentTransaction)
}

/// Returns `tx`, or the current transaction if `tx` is `None`.
///
/// # Errors
///
/// Returns [`CoreError::NoCurrentTransaction`] if `tx` is `None` and no
/// transaction is current.
pub fn resolve(tx: Option<&ClientTransaction>) -> CoreResult<ClientTransaction> {
    match tx {
        Some(tx) => Ok(tx.clone()),
        None => current_transaction(),
    }
}

/// Loads an object through `tx` or the current transaction.
///
/// # Errors
///
/// See [`ClientTransaction::get_object`].
pub fn get_object(tx: Option<&ClientTransaction>, id: &ObjectId) -> CoreResult<DomainObject> {
    resolve(tx)?.get_object(id)
}

/// Loads an object through `tx` or the current transaction, returning
/// `None` if it does not exist.
///
/// # Errors
///
/// See [`ClientTransaction::try_get_object`].
pub fn try_get_object(
    tx: Option<&ClientTransaction>,
    id: &ObjectId,
) -> CoreResult<Option<DomainObject>> {
    resolve(tx)?.try_get_object(id)
}

/// Returns an object reference through `tx` or the current transaction.
///
/// # Errors
///
/// See [`ClientTransaction::get_object_reference`].
pub fn get_object_reference(
    tx: Option<&ClientTransaction>,
    id: &ObjectId,
) -> CoreResult<DomainObject> {
    resolve(tx)?.get_object_reference(id)
}

/// Creates an object in `tx` or the current transaction.
///
/// # Errors
///
/// See [`ClientTransaction::new_object`].
pub fn new_object(
    tx: Option<&ClientTransaction>,
    class_id: impl Into<ClassId>,
) -> CoreResult<DomainObject> {
    resolve(tx)?.new_object(class_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_current_transaction_has_fixed_message() {
        let error = current_transaction().unwrap_err();
        assert!(matches!(error, CoreError::NoCurrentTransaction));
        assert_eq!(
            error.to_string(),
            "No ClientTransaction has been associated with the current thread."
        );
    }

    #[test]
    fn null_scope_hides_nothing_to_resolve() {
        let mut scope = ClientTransactionScope::enter_null_scope();
        assert!(matches!(resolve(None), Err(CoreError::NoCurrentTransaction)));
        scope.leave().unwrap();
    }
}
