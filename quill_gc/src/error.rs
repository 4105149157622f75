//! Ledger errors
//!
//! Every variant is an invariant violation: the calling interpreter broke the counting
//! contract. The current execution must be aborted and the counter dropped.

use thiserror::Error;

use crate::ItemId;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// `remove_stack_reference` on a value no stack or slot holds.
    #[error("stack reference count of {0:?} is already zero")]
    StackReferenceUnderflow(ItemId),

    /// `remove_owner_reference` for an edge that was never added.
    #[error("{item:?} has no owner edge from {owner:?}")]
    MissingOwnerEdge { item: ItemId, owner: ItemId },

    /// `remove_owner_reference` from an owner the ledger does not track.
    #[error("owner {0:?} is not tracked")]
    UntrackedOwner(ItemId),

    /// A value that cannot hold children was passed as an owner.
    #[error("a {0} cannot own child values")]
    NotAContainer(&'static str),

    /// The total reference count would drop below zero.
    #[error("total reference count underflow")]
    CountUnderflow,

    /// Internal state no longer matches the object graph.
    #[error("ledger state is inconsistent: {0}")]
    Inconsistent(&'static str),
}
