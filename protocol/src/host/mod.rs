//! # Execution Host
//!
//! The host is the environment the custody contracts run in. It tracks
//! native currency balances, keeps a registry of deployed contracts, routes
//! calls between addresses, and records events. It is deliberately small:
//! just enough of a ledger to make external calls, reentrancy, call budgets
//! and partial reverts real rather than hypothetical.
//!
//! ## Architecture
//!
//! ```text
//! mod.rs      — Host, Contract trait, HostFault
//! frame.rs    — Frame: per-call context, nested calls, budgets, deploys
//! journal.rs  — WorldState and its revert journal
//! log.rs      — LogEntry, LogEvent, TxId
//! ```
//!
//! ## Revert semantics
//!
//! Host-owned state (balances, registry, nonces, logs) is journaled: a call
//! that fails leaves no trace in it. Contract-internal state is owned by the
//! contract. A contract that needs it rolled back with the call journals an
//! undo step through [`Frame::on_revert`]; the reference tokens do.
//!
//! ## Locking
//!
//! The world state sits behind a single mutex that is never held while
//! contract code runs. Contract code can therefore call back into the host,
//! and into other contracts, at any depth.
//!
//! Root transactions are serialized. Each one holds the host's transaction
//! lock from its first value move until it commits or reverts, so the
//! revert journal only ever contains entries of the running transaction.
//! The lock is reentrant: code already inside a transaction may open a
//! query or another root transaction on the same thread.

mod frame;
mod journal;
mod log;

pub use frame::{CallBudget, Frame};
pub use log::{LogEntry, LogEvent, TxId};

use parking_lot::{Mutex, ReentrantMutex};
use std::sync::Arc;
use thiserror::Error;

use crate::abi::{Amount, Message, Output, Revert};
use crate::config::HostConfig;
use crate::identity::Identity;
use journal::WorldState;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures raised by the host itself rather than by contract code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostFault {
    /// The payer does not hold enough native currency.
    #[error("insufficient native balance: {account} holds {available}, needs {requested}")]
    InsufficientFunds {
        account: Identity,
        available: Amount,
        requested: Amount,
    },

    /// Crediting would overflow the recipient's balance.
    #[error("native balance overflow crediting {amount} to {account}")]
    BalanceOverflow { account: Identity, amount: Amount },

    /// The frame ran out of budget.
    #[error("call budget exhausted: {requested} units requested, {remaining} remaining")]
    BudgetExhausted { requested: u64, remaining: u64 },

    /// The call stack is too deep.
    #[error("maximum call depth of {max} exceeded")]
    CallDepthExceeded { max: usize },

    /// A contract already exists at the derived address.
    #[error("a contract already exists at {0}")]
    AddressCollision(Identity),
}

impl From<HostFault> for Revert {
    fn from(fault: HostFault) -> Self {
        Revert::new(fault.to_string())
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Code deployed at an address.
///
/// `handle` receives every [`Message`] delivered to the contract. The frame
/// identifies the caller and carries the attached value, which the host has
/// already credited to the contract by the time `handle` runs. Returning an
/// error reverts the call.
pub trait Contract: Send + Sync {
    fn handle(&self, frame: &Frame<'_>, message: &Message) -> Result<Output, Revert>;
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// In-memory execution host.
pub struct Host {
    config: HostConfig,
    state: Mutex<WorldState>,
    transactions: ReentrantMutex<()>,
}

impl Host {
    pub fn new() -> Self {
        Self::with_config(HostConfig::default())
    }

    pub fn with_config(config: HostConfig) -> Self {
        Self {
            config,
            state: Mutex::new(WorldState::default()),
            transactions: ReentrantMutex::new(()),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Credits native currency to `account` from outside the system.
    ///
    /// This is how accounts get funded in the first place. It is not part
    /// of any transaction and cannot be reverted.
    pub fn fund(&self, account: Identity, amount: Amount) -> Result<Amount, HostFault> {
        let _serial = self.transactions.lock();
        let balance = self.state.lock().credit_unjournaled(account, amount)?;
        tracing::debug!(%account, amount, balance, "account funded");
        Ok(balance)
    }

    pub fn balance_of(&self, account: &Identity) -> Amount {
        self.state.lock().balance(account)
    }

    pub fn is_contract(&self, account: &Identity) -> bool {
        self.state.lock().is_contract(account)
    }

    /// The contract deployed at `address`, if any.
    pub fn contract(&self, address: &Identity) -> Option<Arc<dyn Contract>> {
        self.state.lock().contract(address)
    }

    /// Snapshot of every event recorded so far, oldest first.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.state.lock().logs().to_vec()
    }

    /// Events recorded at or after position `cursor`.
    pub fn logs_since(&self, cursor: usize) -> Vec<LogEntry> {
        let state = self.state.lock();
        state.logs().get(cursor..).map(<[LogEntry]>::to_vec).unwrap_or_default()
    }

    pub fn log_count(&self) -> usize {
        self.state.lock().logs().len()
    }

    /// Runs a transaction from the external account `origin` into `to`,
    /// attaching `value`.
    ///
    /// `f` executes as `to`, with `origin` as caller and an unrestricted
    /// budget. If `f` fails, every journaled effect is rolled back,
    /// including the value transfer.
    pub fn transact<'h, T, E, F>(&'h self, origin: Identity, to: Identity, value: Amount, f: F) -> Result<T, E>
    where
        E: From<Revert>,
        F: FnOnce(&Frame<'h>) -> Result<T, E>,
    {
        let _serial = self.transactions.lock();
        let frame = Frame::root(self, TxId::new(), origin, to, value);
        tracing::debug!(tx = %frame.tx(), %origin, %to, value, "transaction started");
        let result = self.run_frame(&frame, f);
        tracing::debug!(
            tx = %frame.tx(),
            committed = result.is_ok(),
            consumed = frame.consumed(),
            "transaction finished"
        );
        result
    }

    /// Delivers `message` from `origin` to `to` as a transaction.
    pub fn invoke(
        &self,
        origin: Identity,
        to: Identity,
        value: Amount,
        message: &Message,
    ) -> Result<Output, Revert> {
        self.transact(origin, to, value, |frame| frame.dispatch(message))
    }

    /// Sends bare native currency from `origin` to `to` as a transaction.
    pub fn send(&self, origin: Identity, to: Identity, value: Amount) -> Result<(), Revert> {
        self.invoke(origin, to, value, &Message::Receive).map(|_| ())
    }

    /// Deploys a contract from the external account `creator`.
    pub fn deploy<C, E, F>(&self, creator: Identity, factory: F) -> Result<Arc<C>, E>
    where
        C: Contract + 'static,
        E: From<Revert>,
        F: FnOnce(Identity) -> Result<C, E>,
    {
        self.transact(creator, creator, 0, |frame| frame.deploy(factory))
    }

    /// Runs a read-only frame. Whatever `f` does to host state is discarded.
    pub fn query<'h, T, E, F>(&'h self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Frame<'h>) -> Result<T, E>,
    {
        let _serial = self.transactions.lock();
        let frame = Frame::root(self, TxId::new(), Identity::NULL, Identity::NULL, 0);
        let checkpoint = self.state.lock().checkpoint();
        let result = f(&frame);
        let mut state = self.state.lock();
        state.revert_to(checkpoint);
        state.commit(checkpoint);
        result
    }

    /// Moves the frame's value in, runs `f`, and reverts on failure.
    fn run_frame<'h, T, E, F>(&'h self, frame: &Frame<'h>, f: F) -> Result<T, E>
    where
        E: From<Revert>,
        F: FnOnce(&Frame<'h>) -> Result<T, E>,
    {
        let checkpoint = {
            let mut state = self.state.lock();
            let checkpoint = state.checkpoint();
            if let Err(fault) = state.move_value(frame.caller(), frame.address(), frame.value()) {
                tracing::debug!(
                    caller = %frame.caller(),
                    to = %frame.address(),
                    error = %fault,
                    "value transfer rejected"
                );
                return Err(E::from(Revert::from(fault)));
            }
            checkpoint
        };

        let result = f(frame);

        let mut state = self.state.lock();
        match &result {
            Ok(_) => state.commit(checkpoint),
            Err(_) => {
                state.revert_to(checkpoint);
                tracing::debug!(
                    caller = %frame.caller(),
                    to = %frame.address(),
                    depth = frame.depth(),
                    "call reverted"
                );
            }
        }
        result
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}
