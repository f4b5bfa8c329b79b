//! # Batch Orchestrator
//!
//! Creates vaults and fans administrative operations out across them.
//!
//! ## Control relation
//!
//! ```text
//!   administrator ──owns──▶ orchestrator ──owns──▶ vault₁ … vaultₙ
//! ```
//!
//! The orchestrator records every vault it creates, in creation order. It
//! only dispatches into vaults in that record; an identity it did not create
//! is reported as an unknown vault rather than called.
//!
//! ## Fan-out
//!
//! A batch call validates the whole request first (authorization, lengths,
//! cap, null recipient/target/token). After that nothing aborts it: each
//! vault is called as a recoverable nested call, and a failure, whether
//! raised by the vault or by the token or target behind it, is recorded and
//! the loop moves on. Effects of elements that succeeded are never rolled
//! back by a later failure.
//!
//! ## Locks
//!
//! The orchestrator's lock and each vault's lock are independent. A callee
//! reached through a vault that tries to re-enter the orchestrator fails on
//! the orchestrator's lock; one that calls another vault directly fails on
//! that vault's owner check.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use custody_protocol::tokens::FungibleTokenRef;
use custody_protocol::{
    Amount, CallBudget, CallRequest, Contract, Frame, Host, Identity, Message, Output, Revert,
    Selector, TokenId,
};

use crate::access::{AccessGuard, Owned};
use crate::batch::{check_batch_len, check_not_null, check_paired, BatchOutcome, BatchRecorder};
use crate::error::CustodyError;
use crate::events::{BatchOperation, CustodyEvent};
use crate::reentrancy::{LockGuard, ReentrancyLock};
use crate::vault::Vault;

const INVALID_VAULT: &str = "invalid vault: null identity";
const UNKNOWN_VAULT: &str = "unknown vault: not created by this orchestrator";

#[derive(Debug, Default)]
struct VaultRegistry {
    ordered: Vec<Identity>,
    by_id: HashMap<Identity, Arc<Vault>>,
}

#[derive(Debug)]
pub struct BatchOrchestrator {
    address: Identity,
    access: AccessGuard,
    lock: ReentrancyLock,
    vaults: Mutex<VaultRegistry>,
}

impl BatchOrchestrator {
    /// An orchestrator at `address` administered by `admin`.
    pub fn new(address: Identity, admin: Identity) -> Self {
        Self {
            address,
            access: AccessGuard::new(admin),
            lock: ReentrancyLock::new(),
            vaults: Mutex::new(VaultRegistry::default()),
        }
    }

    pub fn address(&self) -> Identity {
        self.address
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    // -- queries -----------------------------------------------------------

    /// Every vault created so far, in creation order.
    pub fn vaults(&self) -> Vec<Identity> {
        self.vaults.lock().ordered.clone()
    }

    pub fn vault(&self, id: &Identity) -> Option<Arc<Vault>> {
        self.vaults.lock().by_id.get(id).cloned()
    }

    /// Whether this orchestrator created `id`.
    pub fn controls(&self, id: &Identity) -> bool {
        self.vaults.lock().by_id.contains_key(id)
    }

    pub fn vault_count(&self) -> usize {
        self.vaults.lock().ordered.len()
    }

    /// Native balances of `vaults`, in order.
    pub fn native_balances(&self, host: &Host, vaults: &[Identity]) -> Result<Vec<Amount>, CustodyError> {
        check_batch_len(vaults.len())?;
        Ok(vaults.iter().map(|v| host.balance_of(v)).collect())
    }

    /// Balances of `token` held by `vaults`, in order.
    pub fn fungible_balances(
        &self,
        frame: &Frame<'_>,
        vaults: &[Identity],
        token: Identity,
    ) -> Result<Vec<Amount>, CustodyError> {
        check_batch_len(vaults.len())?;
        check_not_null(token, "token")?;
        let token = FungibleTokenRef::at(token);
        vaults
            .iter()
            .map(|vault| token.balance_of(frame, *vault).map_err(CustodyError::from))
            .collect()
    }

    // -- guarded -----------------------------------------------------------

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

    /// Deploys one vault owned by this orchestrator.
    pub fn create_account(&self, frame: &Frame<'_>) -> Result<Identity, CustodyError> {
        let _guard = self.enter(frame)?;
        self.spawn_vault(frame)
    }

    /// Deploys `count` vaults, in order.
    pub fn create_accounts(&self, frame: &Frame<'_>, count: usize) -> Result<Vec<Identity>, CustodyError> {
        let _guard = self.enter(frame)?;
        check_batch_len(count)?;

        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            match self.spawn_vault(frame) {
                Ok(id) => created.push(id),
                Err(err) => {
                    self.forget(&created);
                    return Err(err);
                }
            }
        }
        Ok(created)
    }

    fn spawn_vault(&self, frame: &Frame<'_>) -> Result<Identity, CustodyError> {
        let owner = self.address;
        let vault = frame.deploy(|address| Ok::<_, CustodyError>(Vault::new(address, owner)))?;
        let account = vault.address();
        {
            let mut registry = self.vaults.lock();
            registry.ordered.push(account);
            registry.by_id.insert(account, vault);
        }
        tracing::info!(orchestrator = %self.address, %account, "account created");
        frame.emit(&CustodyEvent::AccountCreated { account, owner });
        Ok(account)
    }

    fn forget(&self, vaults: &[Identity]) {
        let mut registry = self.vaults.lock();
        registry.ordered.retain(|v| !vaults.contains(v));
        for vault in vaults {
            registry.by_id.remove(vault);
        }
    }

    fn resolve(&self, id: Identity) -> Result<Arc<Vault>, &'static str> {
        if id.is_null() {
            return Err(INVALID_VAULT);
        }
        self.vault(&id).ok_or(UNKNOWN_VAULT)
    }

    /// Runs `element` against each vault as a recoverable nested call.
    /// `element` returns the amount to credit to the batch total.
    fn fan_out<F>(
        &self,
        frame: &Frame<'_>,
        operation: BatchOperation,
        vaults: &[Identity],
        mut element: F,
    ) -> Result<BatchOutcome, CustodyError>
    where
        F: FnMut(&Frame<'_>, &Vault, usize) -> Result<Amount, CustodyError>,
    {
        let mut batch = BatchRecorder::new(operation, vaults.len());
        for (index, &id) in vaults.iter().enumerate() {
            let vault = match self.resolve(id) {
                Ok(vault) => vault,
                Err(reason) => {
                    batch.fail(frame, id, reason);
                    continue;
                }
            };
            match frame.call(id, 0, CallBudget::Forward, |child| element(child, &vault, index)) {
                Ok(amount) => batch.succeed(amount)?,
                Err(err) => batch.fail(frame, id, err.to_string()),
            }
        }
        Ok(batch.finish(frame))
    }

    /// Sends `amounts[i]` of native currency from `vaults[i]` to `to`.
    pub fn transfer(
        &self,
        frame: &Frame<'_>,
        vaults: &[Identity],
        amounts: &[Amount],
        to: Identity,
    ) -> Result<BatchOutcome, CustodyError> {
        let _guard = self.enter(frame)?;
        check_paired(vaults.len(), amounts.len())?;
        check_batch_len(vaults.len())?;
        check_not_null(to, "recipient")?;

        self.fan_out(frame, BatchOperation::NativeTransfer, vaults, |child, vault, i| {
            vault.transfer_native(child, to, amounts[i])?;
            Ok(amounts[i])
        })
    }

    /// Sends `amounts[i]` of `token` from `vaults[i]` to `to`.
    pub fn transfer_fungible(
        &self,
        frame: &Frame<'_>,
        vaults: &[Identity],
        token: Identity,
        amounts: &[Amount],
        to: Identity,
    ) -> Result<BatchOutcome, CustodyError> {
        let _guard = self.enter(frame)?;
        check_paired(vaults.len(), amounts.len())?;
        check_batch_len(vaults.len())?;
        check_not_null(token, "token")?;
        check_not_null(to, "recipient")?;

        self.fan_out(frame, BatchOperation::FungibleTransfer, vaults, |child, vault, i| {
            vault.transfer_fungible(child, token, to, amounts[i])?;
            Ok(amounts[i])
        })
    }

    /// Sends `token_ids[i]` of `token` from `vaults[i]` to `to`. Each
    /// success counts as 1 towards the batch total.
    pub fn transfer_non_fungible(
        &self,
        frame: &Frame<'_>,
        vaults: &[Identity],
        token: Identity,
        token_ids: &[TokenId],
        to: Identity,
    ) -> Result<BatchOutcome, CustodyError> {
        let _guard = self.enter(frame)?;
        check_paired(vaults.len(), token_ids.len())?;
        check_batch_len(vaults.len())?;
        check_not_null(token, "token")?;
        check_not_null(to, "recipient")?;

        self.fan_out(frame, BatchOperation::NonFungibleTransfer, vaults, |child, vault, i| {
            vault.transfer_non_fungible(child, token, token_ids[i], to)?;
            Ok(1)
        })
    }

    /// Has every vault in `vaults` call `selector` on `target` with `data`,
    /// attaching `amount` each.
    pub fn call_any(
        &self,
        frame: &Frame<'_>,
        vaults: &[Identity],
        target: Identity,
        selector: Selector,
        data: Bytes,
        amount: Amount,
    ) -> Result<BatchOutcome, CustodyError> {
        let _guard = self.enter(frame)?;
        check_batch_len(vaults.len())?;
        check_not_null(target, "target")?;

        let request = CallRequest::new(target, selector, data, amount);
        self.fan_out(frame, BatchOperation::ContractCall, vaults, |child, vault, _| {
            vault.call_any(child, &request)?;
            Ok(amount)
        })
    }
}

impl Owned for BatchOrchestrator {
    fn access(&self) -> &AccessGuard {
        &self.access
    }
}

impl Contract for BatchOrchestrator {
    fn handle(&self, _frame: &Frame<'_>, message: &Message) -> Result<Output, Revert> {
        Err(Revert::new(format!(
            "orchestrator does not handle {} messages",
            message.kind()
        )))
    }
}
