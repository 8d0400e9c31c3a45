//! Ambient transaction scopes.
//!
//! Scopes form a per-thread stack. Entering a scope for a transaction makes
//! it the current transaction of the thread and the active transaction of
//! its hierarchy; leaving the scope restores both. Scopes must be left in
//! reverse order of entering. A scope that is dropped without being left
//! leaves itself.

use crate::error::{CoreError, CoreResult};
use crate::transaction::{ClientTransaction, WeakTransaction};
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::rc::Rc;

/// What leaving a scope does to its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeLeaveBehavior {
    /// Leave the transaction as it is.
    #[default]
    None,
    /// Roll back the transaction's changes.
    Rollback,
    /// Discard the transaction.
    Discard,
}

struct ScopeFrame {
    id: u64,
    transaction: Option<ClientTransaction>,
}

thread_local! {
    static SCOPES: RefCell<Vec<ScopeFrame>> = const { RefCell::new(Vec::new()) };
    static NEXT_SCOPE_ID: Cell<u64> = const { Cell::new(0) };
}

fn push_frame(transaction: Option<ClientTransaction>) -> u64 {
    let id = NEXT_SCOPE_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    });
    SCOPES.with(|scopes| scopes.borrow_mut().push(ScopeFrame { id, transaction }));
    id
}

/// A scope that makes a transaction current on this thread.
///
/// Scopes are bound to the thread that entered them.
#[must_use = "a scope is left as soon as it is dropped"]
pub struct ClientTransactionScope {
    id: u64,
    transaction: Option<ClientTransaction>,
    previous_active: Option<WeakTransaction>,
    behavior: ScopeLeaveBehavior,
    left: bool,
    _thread_bound: PhantomData<Rc<()>>,
}

impl ClientTransactionScope {
    /// Enters a scope for `transaction`; `None` enters a scope without a
    /// current transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionDiscarded`] if the transaction has
    /// been discarded.
    pub(crate) fn enter(
        transaction: Option<&ClientTransaction>,
        behavior: ScopeLeaveBehavior,
    ) -> CoreResult<Self> {
        let mut previous_active = None;
        if let Some(tx) = transaction {
            if tx.is_discarded() {
                return Err(CoreError::TransactionDiscarded);
            }
            let hierarchy = tx.hierarchy_manager().hierarchy();
            previous_active = hierarchy.active_weak();
            hierarchy.set_active(tx);
        }

        let id = push_frame(transaction.cloned());
        tracing::trace!(scope = id, transaction = ?transaction.map(ClientTransaction::id), "scope entered");
        Ok(Self {
            id,
            transaction: transaction.cloned(),
            previous_active,
            behavior,
            left: false,
            _thread_bound: PhantomData,
        })
    }

    /// Enters a scope in which no transaction is current.
    pub fn enter_null_scope() -> Self {
        let id = push_frame(None);
        Self {
            id,
            transaction: None,
            previous_active: None,
            behavior: ScopeLeaveBehavior::None,
            left: false,
            _thread_bound: PhantomData,
        }
    }

    /// Returns the current transaction of this thread, if any.
    #[must_use]
    pub fn current_transaction() -> Option<ClientTransaction> {
        SCOPES.with(|scopes| scopes.borrow().last()?.transaction.clone())
    }

    /// Returns `true` if a transaction is current on this thread.
    #[must_use]
    pub fn has_current_transaction() -> bool {
        Self::current_transaction().is_some()
    }

    /// Returns the scope's transaction.
    #[must_use]
    pub fn transaction(&self) -> Option<&ClientTransaction> {
        self.transaction.as_ref()
    }

    /// Returns what leaving does to the transaction.
    #[must_use]
    pub fn leave_behavior(&self) -> ScopeLeaveBehavior {
        self.behavior
    }

    /// Changes what leaving does to the transaction.
    pub fn set_leave_behavior(&mut self, behavior: ScopeLeaveBehavior) {
        self.behavior = behavior;
    }

    /// Leaves the scope.
    ///
    /// The previous current and active transactions are restored even if
    /// the leave behavior fails; its error is returned afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the scope has already been
    /// left or is not the innermost scope of this thread, and the error of
    /// the rollback or discard.
    pub fn leave(&mut self) -> CoreResult<()> {
        if self.left {
            return Err(CoreError::invalid_operation(
                "the transaction scope has already been left",
            ));
        }
        let innermost = SCOPES.with(|scopes| scopes.borrow().last().map(|frame| frame.id));
        if innermost != Some(self.id) {
            return Err(CoreError::invalid_operation(
                "this transaction scope is not the active scope; leave the inner scopes first",
            ));
        }

        let result = match (&self.transaction, self.behavior) {
            (Some(tx), ScopeLeaveBehavior::Rollback) => tx.rollback(),
            (Some(tx), ScopeLeaveBehavior::Discard) => tx.discard().map(|_| ()),
            _ => Ok(()),
        };

        self.left = true;
        SCOPES.with(|scopes| {
            scopes.borrow_mut().pop();
        });
        self.restore_previous_active();
        tracing::trace!(scope = self.id, "scope left");
        result
    }

    fn restore_previous_active(&mut self) {
        if let Some(tx) = &self.transaction {
            let previous = self
                .previous_active
                .take()
                .filter(|weak| weak.upgrade().is_some_and(|previous| !previous.is_discarded()));
            if previous.is_some() {
                tx.hierarchy_manager().hierarchy().restore_active(previous);
            }
        }
    }
}

impl Drop for ClientTransactionScope {
    fn drop(&mut self) {
        if self.left {
            return;
        }
        if let Err(error) = self.leave() {
            tracing::warn!(scope = self.id, %error, "dropped transaction scope could not be left");
            // Out of order: drop only this scope's frame, inner scopes stay current.
            let id = self.id;
            SCOPES.with(|scopes| scopes.borrow_mut().retain(|frame| frame.id != id));
            if !self.left {
                self.left = true;
                self.restore_previous_active();
            }
        }
    }
}

impl std::fmt::Debug for ClientTransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTransactionScope")
            .field("id", &self.id)
            .field("transaction", &self.transaction.as_ref().map(ClientTransaction::id))
            .field("behavior", &self.behavior)
            .field("left", &self.left)
            .finish()
    }
}
