//! # Call Frames
//!
//! A [`Frame`] is the execution context of a single call: who called, which
//! address is executing, how much value came along, how deep the call stack
//! is, and how much budget is left. Contract code receives a frame and uses
//! it for everything that touches the outside world: reading balances,
//! emitting events, deploying contracts, and calling other addresses.
//!
//! ## Nested calls
//!
//! [`Frame::call`] is the primitive. It charges the call overhead to this
//! frame, moves the attached value, runs a closure in a child frame, and, if
//! the closure fails, rolls back everything the child did to host state.
//! The failure comes back as a value; the caller decides whether to
//! propagate it or record it and carry on.
//!
//! [`Frame::invoke`] and [`Frame::send`] are message-level wrappers for
//! calling a registered contract (or an external account, which accepts
//! anything and returns [`Output::Unit`]).
//!
//! ## Budgets
//!
//! The root frame is unrestricted. A child either inherits everything the
//! parent has left ([`CallBudget::Forward`]) or is capped by a stipend
//! ([`CallBudget::Stipend`]). Whatever the child consumes is charged to
//! the parent when it returns.

use std::cell::Cell;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::log::{LogEntry, LogEvent, TxId};
use super::{Contract, Host, HostFault};
use crate::abi::{Amount, Message, Output, Revert};
use crate::identity::Identity;

/// Budget handed to a nested call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallBudget {
    /// Everything the caller has left.
    Forward,
    /// At most this many units.
    Stipend(u64),
}

/// Execution context of one call.
pub struct Frame<'h> {
    host: &'h Host,
    tx: TxId,
    caller: Identity,
    address: Identity,
    value: Amount,
    depth: usize,
    /// `None` means unrestricted.
    remaining: Cell<Option<u64>>,
    consumed: Cell<u64>,
}

impl<'h> Frame<'h> {
    pub(crate) fn root(
        host: &'h Host,
        tx: TxId,
        caller: Identity,
        address: Identity,
        value: Amount,
    ) -> Self {
        Self {
            host,
            tx,
            caller,
            address,
            value,
            depth: 0,
            remaining: Cell::new(None),
            consumed: Cell::new(0),
        }
    }

    /// The host this frame runs on.
    pub fn host(&self) -> &'h Host {
        self.host
    }

    /// The transaction this frame belongs to.
    pub fn tx(&self) -> TxId {
        self.tx
    }

    /// The immediate caller.
    pub fn caller(&self) -> Identity {
        self.caller
    }

    /// The address whose code is executing.
    pub fn address(&self) -> Identity {
        self.address
    }

    /// Native currency attached to this call. Already credited to
    /// [`address`](Self::address) when the frame starts.
    pub fn value(&self) -> Amount {
        self.value
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Units left, or `None` when unrestricted.
    pub fn remaining_budget(&self) -> Option<u64> {
        self.remaining.get()
    }

    /// Units consumed by this frame and its children so far.
    pub fn consumed(&self) -> u64 {
        self.consumed.get()
    }

    /// Native balance of the executing address.
    pub fn balance(&self) -> Amount {
        self.host.balance_of(&self.address)
    }

    pub fn balance_of(&self, account: &Identity) -> Amount {
        self.host.balance_of(account)
    }

    pub fn is_contract(&self, account: &Identity) -> bool {
        self.host.is_contract(account)
    }

    /// Spends `units` of this frame's budget.
    ///
    /// # Errors
    ///
    /// Returns [`HostFault::BudgetExhausted`] when the frame cannot afford
    /// it. The remaining budget is drained either way.
    pub fn consume(&self, units: u64) -> Result<(), HostFault> {
        self.consumed.set(self.consumed.get().saturating_add(units));
        match self.remaining.get() {
            None => Ok(()),
            Some(remaining) if units <= remaining => {
                self.remaining.set(Some(remaining - units));
                Ok(())
            }
            Some(remaining) => {
                self.remaining.set(Some(0));
                tracing::warn!(
                    address = %self.address,
                    requested = units,
                    remaining,
                    "call budget exhausted"
                );
                Err(HostFault::BudgetExhausted {
                    requested: units,
                    remaining,
                })
            }
        }
    }

    /// Journals `undo` with the host. It runs if this frame, or any frame
    /// enclosing it, reverts.
    ///
    /// Contracts use this for their own storage. `undo` runs while the host
    /// state is locked and must not call back into the host.
    pub fn on_revert(&self, undo: impl FnOnce() + Send + 'static) {
        self.host.state.lock().push_undo(Box::new(undo));
    }

    /// Appends an event to the host log, attributed to this frame's address.
    pub fn emit<E: LogEvent>(&self, event: &E) {
        let topic = event.topic();
        let data = serde_json::to_value(event).unwrap_or_else(|err| {
            tracing::warn!(topic, error = %err, "event body could not be serialized");
            serde_json::Value::Null
        });
        tracing::debug!(tx = %self.tx, emitter = %self.address, topic, "event emitted");
        self.host.state.lock().push_log(LogEntry {
            tx: self.tx,
            emitter: self.address,
            topic: topic.to_string(),
            data,
            recorded_at: chrono::Utc::now(),
        });
    }

    /// Deploys a contract created by this frame's address.
    ///
    /// `factory` receives the new address and builds the contract. If it
    /// fails, the nonce bump is rolled back and nothing is registered.
    pub fn deploy<C, E, F>(&self, factory: F) -> Result<Arc<C>, E>
    where
        C: Contract + 'static,
        E: From<Revert>,
        F: FnOnce(Identity) -> Result<C, E>,
    {
        let (checkpoint, address) = {
            let mut state = self.host.state.lock();
            let checkpoint = state.checkpoint();
            let nonce = state.bump_nonce(self.address);
            (checkpoint, Identity::derive_contract(self.address, nonce))
        };

        let contract = match factory(address) {
            Ok(contract) => Arc::new(contract),
            Err(err) => {
                self.host.state.lock().revert_to(checkpoint);
                return Err(err);
            }
        };

        let registered: Arc<dyn Contract> = contract.clone();
        {
            let mut state = self.host.state.lock();
            if let Err(fault) = state.register(address, registered) {
                state.revert_to(checkpoint);
                return Err(E::from(Revert::from(fault)));
            }
        }

        tracing::debug!(creator = %self.address, %address, "contract deployed");
        Ok(contract)
    }

    /// Runs `f` as a nested call from this frame into `to`, attaching
    /// `value`.
    ///
    /// On failure every journaled effect of the call is rolled back and the
    /// error is returned to this frame.
    pub fn call<T, E, F>(&self, to: Identity, value: Amount, budget: CallBudget, f: F) -> Result<T, E>
    where
        E: From<Revert>,
        F: FnOnce(&Frame<'h>) -> Result<T, E>,
    {
        let config = self.host.config();
        self.consume(config.call_overhead)
            .map_err(|fault| E::from(Revert::from(fault)))?;
        if self.depth + 1 > config.max_call_depth {
            return Err(E::from(Revert::from(HostFault::CallDepthExceeded {
                max: config.max_call_depth,
            })));
        }

        let child_budget = match budget {
            CallBudget::Forward => self.remaining.get(),
            CallBudget::Stipend(stipend) => {
                Some(self.remaining.get().map_or(stipend, |left| left.min(stipend)))
            }
        };
        let child = Frame {
            host: self.host,
            tx: self.tx,
            caller: self.address,
            address: to,
            value,
            depth: self.depth + 1,
            remaining: Cell::new(child_budget),
            consumed: Cell::new(0),
        };

        let result = self.host.run_frame(&child, f);

        let used = child.consumed.get();
        self.consumed.set(self.consumed.get().saturating_add(used));
        if let Some(left) = self.remaining.get() {
            self.remaining.set(Some(left.saturating_sub(used)));
        }
        result
    }

    /// Delivers `message` to `to`. Addresses without a contract accept any
    /// message and return [`Output::Unit`].
    pub fn invoke(
        &self,
        to: Identity,
        value: Amount,
        message: &Message,
        budget: CallBudget,
    ) -> Result<Output, Revert> {
        self.call(to, value, budget, |frame| frame.dispatch(message))
    }

    /// Sends bare native currency to `to`.
    pub fn send(&self, to: Identity, value: Amount, budget: CallBudget) -> Result<(), Revert> {
        self.invoke(to, value, &Message::Receive, budget).map(|_| ())
    }

    /// Hands `message` to the contract at this frame's address.
    pub(crate) fn dispatch(&self, message: &Message) -> Result<Output, Revert> {
        match self.host.contract(&self.address) {
            Some(contract) => {
                tracing::trace!(address = %self.address, kind = message.kind(), "dispatching message");
                contract.handle(self, message)
            }
            None => Ok(Output::Unit),
        }
    }
}
