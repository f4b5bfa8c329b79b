//! # Tokens
//!
//! Reference token contracts and the typed clients custody code uses to talk
//! to them.
//!
//! - [`FungibleToken`] / [`NonFungibleToken`] are deployable contracts with
//!   the usual balance, allowance and approval semantics. The simulator and
//!   the test suites deploy them; nothing in the custody layer depends on
//!   their internals.
//! - [`FungibleTokenRef`] / [`NonFungibleTokenRef`] wrap an address and turn
//!   typed method calls into [`Message`](crate::abi::Message)s. They work
//!   against any contract that speaks the interface, including hostile ones.

mod fungible;
mod interface;
mod non_fungible;

pub use fungible::FungibleToken;
pub use interface::{FungibleTokenRef, NonFungibleTokenRef};
pub use non_fungible::NonFungibleToken;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::abi::{Amount, Revert, TokenId};
use crate::host::LogEvent;
use crate::identity::Identity;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the reference token contracts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The holder does not have enough tokens.
    #[error("insufficient balance: account has {balance}, needs {amount}")]
    InsufficientBalance { balance: Amount, amount: Amount },

    /// The spender's allowance is too small.
    #[error("insufficient allowance: {allowance} approved, {amount} requested")]
    InsufficientAllowance { allowance: Amount, amount: Amount },

    /// Minting or crediting would overflow.
    #[error("supply overflow: adding {amount} would exceed u128::MAX")]
    SupplyOverflow { amount: Amount },

    /// Only the minter may create new supply.
    #[error("unauthorized: only the minter can mint")]
    UnauthorizedMint,

    /// Tokens cannot be sent to the null identity.
    #[error("invalid recipient: null identity")]
    InvalidRecipient,

    /// The token id has never been minted.
    #[error("token {0} does not exist")]
    TokenNotFound(TokenId),

    /// The token id is already taken.
    #[error("token {0} already minted")]
    AlreadyMinted(TokenId),

    /// `from` does not own the token.
    #[error("token {token_id} is not owned by {from}")]
    NotOwner { token_id: TokenId, from: Identity },

    /// The caller is neither owner, approved, nor operator.
    #[error("caller is not owner nor approved for token {0}")]
    NotApproved(TokenId),

    /// A receiving contract did not acknowledge a safe transfer.
    #[error("receiver {0} did not accept the token")]
    ReceiverRejected(Identity),

    /// The message is not part of this token's interface.
    #[error("unsupported message: {0}")]
    Unsupported(&'static str),
}

impl From<TokenError> for Revert {
    fn from(err: TokenError) -> Self {
        Revert::new(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events emitted by the reference tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TokenEvent {
    Transfer {
        from: Identity,
        to: Identity,
        amount: Amount,
    },
    Approval {
        owner: Identity,
        spender: Identity,
        amount: Amount,
    },
    TokenTransfer {
        from: Identity,
        to: Identity,
        token_id: TokenId,
    },
    TokenApproval {
        owner: Identity,
        spender: Identity,
        token_id: TokenId,
    },
    ApprovalForAll {
        owner: Identity,
        operator: Identity,
        approved: bool,
    },
}

impl LogEvent for TokenEvent {
    fn topic(&self) -> &'static str {
        match self {
            TokenEvent::Transfer { .. } => "Transfer",
            TokenEvent::Approval { .. } => "Approval",
            TokenEvent::TokenTransfer { .. } => "TokenTransfer",
            TokenEvent::TokenApproval { .. } => "TokenApproval",
            TokenEvent::ApprovalForAll { .. } => "ApprovalForAll",
        }
    }
}
