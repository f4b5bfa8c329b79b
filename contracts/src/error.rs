//! Errors raised by custody entities.
//!
//! Every variant except [`CustodyError::Reverted`] is a precondition or
//! delivery failure the entity detected itself. `Reverted` carries a failure
//! raised below the entity, by the host or by a nested call, that the entity
//! had no more specific name for.

use custody_protocol::{Amount, Identity, Revert, Selector, TokenId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodyError {
    /// The caller is not the owner of the entity.
    #[error("unauthorized: {caller} is not the owner")]
    Unauthorized { caller: Identity },

    /// Only the pending owner may accept an ownership transfer.
    #[error("{caller} is not the pending owner")]
    NotPendingOwner { caller: Identity },

    /// A required identity argument was null.
    #[error("invalid identity: {0} must not be null")]
    InvalidIdentity(&'static str),

    /// A guarded operation is already in progress on this entity.
    #[error("reentrant call")]
    ReentrantCall,

    /// The vault does not hold enough native currency.
    #[error("insufficient balance: vault holds {available}, needs {requested}")]
    InsufficientBalance { available: Amount, requested: Amount },

    /// A native currency transfer was rejected by the recipient.
    #[error("native transfer to {to} failed: {reason}")]
    TransferFailed { to: Identity, reason: String },

    /// A fungible token transfer reverted or returned false.
    #[error("fungible transfer of token {token} to {to} failed: {reason}")]
    FungibleTransferFailed {
        token: Identity,
        to: Identity,
        reason: String,
    },

    /// A non-fungible token transfer reverted.
    #[error("non-fungible transfer of token {token} #{token_id} failed: {reason}")]
    NonFungibleTransferFailed {
        token: Identity,
        token_id: TokenId,
        reason: String,
    },

    /// An arbitrary call reverted.
    #[error("call to {target} ({selector}) failed: {reason}")]
    ContractCallFailed {
        target: Identity,
        selector: Selector,
        reason: String,
    },

    /// The batch has no elements.
    #[error("empty batch")]
    EmptyArray,

    /// The batch exceeds the element cap.
    #[error("batch of {len} elements exceeds the cap of {max}")]
    ArrayTooLarge { len: usize, max: usize },

    /// Targets and per-element parameters have different lengths.
    #[error("array length mismatch: {targets} targets, {params} parameters")]
    ArrayLengthMismatch { targets: usize, params: usize },

    /// Monetary arithmetic left the representable range.
    #[error("arithmetic overflow: {0}")]
    Overflow(&'static str),

    /// The attached value or an amount argument is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A failure raised by the host or a nested call.
    #[error(transparent)]
    Reverted(#[from] Revert),
}

impl From<CustodyError> for Revert {
    fn from(err: CustodyError) -> Self {
        match err {
            CustodyError::Reverted(revert) => revert,
            other => Revert::new(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverted_passes_the_original_revert_through() {
        let original = Revert::silent();
        let err = CustodyError::from(original.clone());
        assert_eq!(Revert::from(err), original);
    }

    #[test]
    fn custody_error_becomes_revert_reason() {
        let revert = Revert::from(CustodyError::InsufficientBalance {
            available: 0,
            requested: 50,
        });
        assert_eq!(revert.reason(), Some("insufficient balance: vault holds 0, needs 50"));
    }
}
