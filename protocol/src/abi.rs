//! # Call ABI
//!
//! Everything that crosses a contract boundary is one of the types in this
//! module. A call delivers a [`Message`] to an address and gets back either
//! an [`Output`] or a [`Revert`].
//!
//! The message set is deliberately closed. Token interfaces get typed
//! variants ([`FungibleCall`], [`NonFungibleCall`]) so that transfer code
//! cannot accidentally build a malformed call, while [`Message::Call`]
//! carries an opaque `selector ++ data` payload for the one operation that
//! is allowed to invoke arbitrary functions on arbitrary targets. That
//! operation takes its arguments as a [`CallRequest`], which keeps the
//! capability visibly separate from the typed transfer paths.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::config::UNKNOWN_ERROR_REASON;
use crate::identity::Identity;

/// Native currency and fungible token amounts, in the smallest unit.
pub type Amount = u128;

/// Identifier of a single non-fungible token within its contract.
pub type TokenId = u128;

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Four-byte function selector.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Selector([u8; 4]);

impl Selector {
    /// Wraps raw selector bytes.
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// First four bytes of SHA-256 over a function signature such as
    /// `"rebalance(uint256)"`.
    pub fn from_signature(signature: &str) -> Self {
        let digest = Sha256::digest(signature.as_bytes());
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&digest[..4]);
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({self})")
    }
}

impl FromStr for Selector {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 4];
        hex::decode_to_slice(s.strip_prefix("0x").unwrap_or(s), &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Selector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Calls understood by a fungible token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FungibleCall {
    /// Move `amount` from the caller to `to`. Returns `Output::Bool`.
    Transfer { to: Identity, amount: Amount },
    /// Move `amount` from `from` to `to` against the caller's allowance.
    /// Returns `Output::Bool`.
    TransferFrom {
        from: Identity,
        to: Identity,
        amount: Amount,
    },
    /// Set the caller's allowance for `spender`. Returns `Output::Bool`.
    Approve { spender: Identity, amount: Amount },
    /// Balance of `account`. Returns `Output::Amount`.
    BalanceOf { account: Identity },
    /// Remaining allowance. Returns `Output::Amount`.
    Allowance { owner: Identity, spender: Identity },
}

/// Calls understood by a non-fungible token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonFungibleCall {
    /// Move `token_id` from `from` to `to`, notifying `to` if it is a
    /// contract. Returns `Output::Unit`.
    SafeTransferFrom {
        from: Identity,
        to: Identity,
        token_id: TokenId,
        data: Bytes,
    },
    /// Approve `spender` for a single token. Returns `Output::Unit`.
    Approve { spender: Identity, token_id: TokenId },
    /// Grant or revoke blanket approval. Returns `Output::Unit`.
    SetApprovalForAll { operator: Identity, approved: bool },
    /// Current owner. Returns `Output::Identity`.
    OwnerOf { token_id: TokenId },
}

/// A message delivered to a contract address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Bare native-currency transfer with no payload.
    Receive,
    /// Opaque invocation: a selector plus encoded arguments.
    Call { selector: Selector, data: Bytes },
    /// Fungible token interface.
    Fungible(FungibleCall),
    /// Non-fungible token interface.
    NonFungible(NonFungibleCall),
    /// Receipt callback sent by a non-fungible token during a safe transfer.
    /// The receiver must answer with
    /// [`NON_FUNGIBLE_RECEIVED`](crate::config::NON_FUNGIBLE_RECEIVED).
    NonFungibleReceived {
        operator: Identity,
        from: Identity,
        token_id: TokenId,
        data: Bytes,
    },
}

impl Message {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Receive => "receive",
            Message::Call { .. } => "call",
            Message::Fungible(_) => "fungible",
            Message::NonFungible(_) => "non_fungible",
            Message::NonFungibleReceived { .. } => "non_fungible_received",
        }
    }
}

/// Return data of a successful call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Output {
    Unit,
    Bool(bool),
    Amount(Amount),
    Identity(Identity),
    Selector(Selector),
    Bytes(Bytes),
}

// ---------------------------------------------------------------------------
// CallRequest
// ---------------------------------------------------------------------------

/// An arbitrary invocation: call `selector` on `target` with `data`,
/// attaching `value` of native currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    pub target: Identity,
    pub selector: Selector,
    pub data: Bytes,
    pub value: Amount,
}

impl CallRequest {
    pub fn new(target: Identity, selector: Selector, data: impl Into<Bytes>, value: Amount) -> Self {
        Self {
            target,
            selector,
            data: data.into(),
            value,
        }
    }

    /// Wire payload: `selector ++ data`.
    pub fn payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.data.len());
        buf.put_slice(self.selector.as_bytes());
        buf.put_slice(&self.data);
        buf.freeze()
    }

    /// The message delivered to `target`.
    pub fn message(&self) -> Message {
        Message::Call {
            selector: self.selector,
            data: self.data.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Revert
// ---------------------------------------------------------------------------

/// A failed call. Carries the callee's reason when it gave one.
///
/// Reverts are values: a caller that makes a recoverable call receives the
/// revert and decides what to do with it. The host has already rolled back
/// the failed call's journaled effects by then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revert {
    reason: Option<String>,
}

impl Revert {
    /// A revert with a reason string.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }

    /// A revert with no reason at all.
    pub fn silent() -> Self {
        Self { reason: None }
    }

    /// The callee's reason, if any.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// The callee's reason, or [`UNKNOWN_ERROR_REASON`].
    pub fn reason_or_unknown(&self) -> &str {
        self.reason.as_deref().unwrap_or(UNKNOWN_ERROR_REASON)
    }
}

impl fmt::Display for Revert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason_or_unknown())
    }
}

impl std::error::Error for Revert {}
