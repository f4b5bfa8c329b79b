//! # Vault
//!
//! A custody unit. Its native balance lives in the host ledger under the
//! vault's identity; its token balances live in the token contracts under
//! the same identity. The vault itself stores only its access guard and its
//! reentrancy lock.
//!
//! ## Guarding
//!
//! Every mutating operation follows the same prologue:
//!
//! 1. take the reentrancy lock (a re-entry fails here with `ReentrantCall`),
//! 2. check the frame is executing as this vault and the caller is owner,
//! 3. validate arguments,
//! 4. make exactly one external call,
//! 5. emit the success event.
//!
//! The lock is held across the external call and released by the guard on
//! every exit path.
//!
//! ## `call_any`
//!
//! [`Vault::call_any`] invokes any selector on any target with any value. It
//! is the most dangerous operation in the system and is deliberately kept
//! apart from the typed transfers: it takes a [`CallRequest`] rather than
//! loose arguments, and the orchestrator exposes it as its own batch
//! operation.

use bytes::Bytes;

use custody_protocol::config::NON_FUNGIBLE_RECEIVED;
use custody_protocol::tokens::{FungibleTokenRef, NonFungibleTokenRef};
use custody_protocol::{
    Amount, CallBudget, CallRequest, Contract, Frame, Host, Identity, Message, Output, Revert,
    TokenId,
};

use crate::access::{AccessGuard, Owned};
use crate::batch::check_not_null;
use crate::error::CustodyError;
use crate::events::CustodyEvent;
use crate::reentrancy::{LockGuard, ReentrancyLock};

#[derive(Debug)]
pub struct Vault {
    address: Identity,
    access: AccessGuard,
    lock: ReentrancyLock,
}

impl Vault {
    /// A vault at `address` owned by `owner`.
    pub fn new(address: Identity, owner: Identity) -> Self {
        Self {
            address,
            access: AccessGuard::new(owner),
            lock: ReentrancyLock::new(),
        }
    }

    pub fn address(&self) -> Identity {
        self.address
    }

    /// Whether a guarded operation is in progress.
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Native balance. Reads the host ledger.
    pub fn balance(&self, host: &Host) -> Amount {
        host.balance_of(&self.address)
    }

    /// This vault's balance of a fungible token.
    pub fn fungible_balance(&self, frame: &Frame<'_>, token: Identity) -> Result<Amount, CustodyError> {
        check_not_null(token, "token")?;
        Ok(FungibleTokenRef::at(token).balance_of(frame, self.address)?)
    }

    fn enter(&self, frame: &Frame<'_>) -> Result<LockGuard<'_>, CustodyError> {
        let guard = self.lock.enter()?;
        if frame.address() != self.address {
            return Err(CustodyError::Unauthorized {
                caller: frame.caller(),
            });
        }
        self.access.require_owner(frame.caller())?;
        Ok(guard)
    }

    /// Sends `amount` of native currency to `to`, forwarding the full
    /// remaining budget.
    pub fn transfer_native(&self, frame: &Frame<'_>, to: Identity, amount: Amount) -> Result<(), CustodyError> {
        let _guard = self.enter(frame)?;
        check_not_null(to, "recipient")?;
        let available = frame.balance();
        if available < amount {
            return Err(CustodyError::InsufficientBalance {
                available,
                requested: amount,
            });
        }

        frame
            .send(to, amount, CallBudget::Forward)
            .map_err(|revert| CustodyError::TransferFailed {
                to,
                reason: revert.reason_or_unknown().to_string(),
            })?;

        tracing::info!(vault = %self.address, %to, amount, "native transferred");
        frame.emit(&CustodyEvent::NativeTransferred { to, amount });
        Ok(())
    }

    /// Transfers `amount` of `token` to `to`. The token enforces the
    /// balance.
    pub fn transfer_fungible(
        &self,
        frame: &Frame<'_>,
        token: Identity,
        to: Identity,
        amount: Amount,
    ) -> Result<(), CustodyError> {
        let _guard = self.enter(frame)?;
        check_not_null(token, "token")?;
        check_not_null(to, "recipient")?;

        let reason = match FungibleTokenRef::at(token).transfer(frame, to, amount) {
            Ok(true) => None,
            Ok(false) => Some("transfer returned false".to_string()),
            Err(revert) => Some(revert.reason_or_unknown().to_string()),
        };
        if let Some(reason) = reason {
            return Err(CustodyError::FungibleTransferFailed { token, to, reason });
        }

        tracing::info!(vault = %self.address, %token, %to, amount, "fungible transferred");
        frame.emit(&CustodyEvent::FungibleTransferred { token, to, amount });
        Ok(())
    }

    /// Safe-transfers `token_id` of `token` from this vault to `to`.
    pub fn transfer_non_fungible(
        &self,
        frame: &Frame<'_>,
        token: Identity,
        token_id: TokenId,
        to: Identity,
    ) -> Result<(), CustodyError> {
        let _guard = self.enter(frame)?;
        check_not_null(token, "token")?;
        check_not_null(to, "recipient")?;

        NonFungibleTokenRef::at(token)
            .safe_transfer_from(frame, self.address, to, token_id, Bytes::new())
            .map_err(|revert| CustodyError::NonFungibleTransferFailed {
                token,
                token_id,
                reason: revert.reason_or_unknown().to_string(),
            })?;

        tracing::info!(vault = %self.address, %token, token_id, %to, "non-fungible transferred");
        frame.emit(&CustodyEvent::NonFungibleTransferred { token, to, token_id });
        Ok(())
    }

    /// Invokes `request.selector` on `request.target` with
    /// `request.value` attached.
    pub fn call_any(&self, frame: &Frame<'_>, request: &CallRequest) -> Result<Output, CustodyError> {
        let _guard = self.enter(frame)?;
        check_not_null(request.target, "target")?;
        let available = frame.balance();
        if available < request.value {
            return Err(CustodyError::InsufficientBalance {
                available,
                requested: request.value,
            });
        }

        tracing::debug!(
            vault = %self.address,
            target = %request.target,
            selector = %request.selector,
            payload_len = request.payload().len(),
            "arbitrary call"
        );
        let output = frame
            .invoke(request.target, request.value, &request.message(), CallBudget::Forward)
            .map_err(|revert| CustodyError::ContractCallFailed {
                target: request.target,
                selector: request.selector,
                reason: revert.reason_or_unknown().to_string(),
            })?;

        tracing::info!(
            vault = %self.address,
            target = %request.target,
            selector = %request.selector,
            amount = request.value,
            "contract called"
        );
        frame.emit(&CustodyEvent::ContractCalled {
            target: request.target,
            selector: request.selector,
            amount: request.value,
        });
        Ok(output)
    }
}

impl Owned for Vault {
    fn access(&self) -> &AccessGuard {
        &self.access
    }
}

impl Contract for Vault {
    fn handle(&self, frame: &Frame<'_>, message: &Message) -> Result<Output, Revert> {
        match message {
            Message::Receive => {
                if frame.value() > 0 {
                    frame.emit(&CustodyEvent::NativeReceived {
                        from: frame.caller(),
                        amount: frame.value(),
                    });
                }
                Ok(Output::Unit)
            }
            Message::NonFungibleReceived { .. } => Ok(Output::Selector(NON_FUNGIBLE_RECEIVED)),
            other => Err(Revert::new(format!("vault does not handle {} messages", other.kind()))),
        }
    }
}
