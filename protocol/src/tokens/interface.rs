//! Typed token clients.
//!
//! A client is just an address. Each method builds the message, forwards
//! the caller's full remaining budget, and checks the shape of what comes
//! back. Reverts from the token are returned unchanged so callers can
//! surface the token's own reason.

use bytes::Bytes;

use crate::abi::{Amount, FungibleCall, Message, NonFungibleCall, Output, Revert, TokenId};
use crate::host::{CallBudget, Frame};
use crate::identity::Identity;

fn ensure_contract(frame: &Frame<'_>, address: Identity) -> Result<(), Revert> {
    if frame.is_contract(&address) {
        Ok(())
    } else {
        Err(Revert::new(format!("call to non-contract address {address}")))
    }
}

fn malformed(expected: &str, got: &Output) -> Revert {
    Revert::new(format!("malformed return data: expected {expected}, got {got:?}"))
}

/// Client for a fungible token contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FungibleTokenRef {
    address: Identity,
}

impl FungibleTokenRef {
    pub fn at(address: Identity) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Identity {
        self.address
    }

    fn call(&self, frame: &Frame<'_>, call: FungibleCall) -> Result<Output, Revert> {
        ensure_contract(frame, self.address)?;
        frame.invoke(self.address, 0, &Message::Fungible(call), CallBudget::Forward)
    }

    fn call_bool(&self, frame: &Frame<'_>, call: FungibleCall) -> Result<bool, Revert> {
        match self.call(frame, call)? {
            Output::Bool(ok) => Ok(ok),
            other => Err(malformed("bool", &other)),
        }
    }

    fn call_amount(&self, frame: &Frame<'_>, call: FungibleCall) -> Result<Amount, Revert> {
        match self.call(frame, call)? {
            Output::Amount(amount) => Ok(amount),
            other => Err(malformed("amount", &other)),
        }
    }

    /// Sends `amount` from the calling frame's address to `to`.
    ///
    /// `Ok(false)` means the token declined without reverting.
    pub fn transfer(&self, frame: &Frame<'_>, to: Identity, amount: Amount) -> Result<bool, Revert> {
        self.call_bool(frame, FungibleCall::Transfer { to, amount })
    }

    /// Moves `amount` from `from` to `to` using the calling frame's
    /// allowance.
    pub fn transfer_from(
        &self,
        frame: &Frame<'_>,
        from: Identity,
        to: Identity,
        amount: Amount,
    ) -> Result<bool, Revert> {
        self.call_bool(frame, FungibleCall::TransferFrom { from, to, amount })
    }

    pub fn approve(&self, frame: &Frame<'_>, spender: Identity, amount: Amount) -> Result<bool, Revert> {
        self.call_bool(frame, FungibleCall::Approve { spender, amount })
    }

    pub fn balance_of(&self, frame: &Frame<'_>, account: Identity) -> Result<Amount, Revert> {
        self.call_amount(frame, FungibleCall::BalanceOf { account })
    }

    pub fn allowance(&self, frame: &Frame<'_>, owner: Identity, spender: Identity) -> Result<Amount, Revert> {
        self.call_amount(frame, FungibleCall::Allowance { owner, spender })
    }
}

/// Client for a non-fungible token contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NonFungibleTokenRef {
    address: Identity,
}

impl NonFungibleTokenRef {
    pub fn at(address: Identity) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Identity {
        self.address
    }

    fn call(&self, frame: &Frame<'_>, call: NonFungibleCall) -> Result<Output, Revert> {
        ensure_contract(frame, self.address)?;
        frame.invoke(self.address, 0, &Message::NonFungible(call), CallBudget::Forward)
    }

    /// Moves `token_id` from `from` to `to`. If `to` is a contract it must
    /// acknowledge receipt or the token reverts.
    pub fn safe_transfer_from(
        &self,
        frame: &Frame<'_>,
        from: Identity,
        to: Identity,
        token_id: TokenId,
        data: Bytes,
    ) -> Result<(), Revert> {
        self.call(
            frame,
            NonFungibleCall::SafeTransferFrom {
                from,
                to,
                token_id,
                data,
            },
        )
        .map(|_| ())
    }

    pub fn owner_of(&self, frame: &Frame<'_>, token_id: TokenId) -> Result<Identity, Revert> {
        match self.call(frame, NonFungibleCall::OwnerOf { token_id })? {
            Output::Identity(owner) => Ok(owner),
            other => Err(malformed("identity", &other)),
        }
    }

    pub fn approve(&self, frame: &Frame<'_>, spender: Identity, token_id: TokenId) -> Result<(), Revert> {
        self.call(frame, NonFungibleCall::Approve { spender, token_id })
            .map(|_| ())
    }

    pub fn set_approval_for_all(
        &self,
        frame: &Frame<'_>,
        operator: Identity,
        approved: bool,
    ) -> Result<(), Revert> {
        self.call(frame, NonFungibleCall::SetApprovalForAll { operator, approved })
            .map(|_| ())
    }
}
