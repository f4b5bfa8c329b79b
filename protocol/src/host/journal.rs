//! Revert journal for host-owned state.
//!
//! Every mutation of the world state inside a transaction appends an entry
//! recording what it overwrote. A checkpoint is just the journal length;
//! reverting to it pops entries in reverse order and restores each one.
//! Once the outermost frame commits, the journal is cleared.

use std::collections::HashMap;
use std::sync::Arc;

use super::log::LogEntry;
use super::{Contract, HostFault};
use crate::abi::Amount;
use crate::identity::Identity;

/// One undoable mutation.
pub(crate) enum JournalEntry {
    Balance {
        account: Identity,
        previous: Amount,
    },
    Nonce {
        account: Identity,
        previous: u64,
    },
    Deployed {
        address: Identity,
    },
    Logged,
    /// Restores contract storage the host does not own.
    Undo(Box<dyn FnOnce() + Send>),
}

/// Everything the host owns. Contract-internal state lives in the
/// contracts themselves and is not journaled.
#[derive(Default)]
pub(crate) struct WorldState {
    balances: HashMap<Identity, Amount>,
    contracts: HashMap<Identity, Arc<dyn Contract>>,
    nonces: HashMap<Identity, u64>,
    logs: Vec<LogEntry>,
    journal: Vec<JournalEntry>,
}

impl WorldState {
    pub(crate) fn balance(&self, account: &Identity) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Credits without journaling. Only for funding from outside any
    /// transaction.
    pub(crate) fn credit_unjournaled(
        &mut self,
        account: Identity,
        amount: Amount,
    ) -> Result<Amount, HostFault> {
        let current = self.balance(&account);
        let updated = current
            .checked_add(amount)
            .ok_or(HostFault::BalanceOverflow { account, amount })?;
        self.balances.insert(account, updated);
        Ok(updated)
    }

    fn set_balance(&mut self, account: Identity, amount: Amount) {
        let previous = self.balances.insert(account, amount).unwrap_or(0);
        self.journal.push(JournalEntry::Balance { account, previous });
    }

    /// Moves native currency. Checks everything before mutating anything.
    pub(crate) fn move_value(
        &mut self,
        from: Identity,
        to: Identity,
        amount: Amount,
    ) -> Result<(), HostFault> {
        if amount == 0 {
            return Ok(());
        }
        let available = self.balance(&from);
        if available < amount {
            return Err(HostFault::InsufficientFunds {
                account: from,
                available,
                requested: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance(&to)
            .checked_add(amount)
            .ok_or(HostFault::BalanceOverflow { account: to, amount })?;

        self.set_balance(from, available - amount);
        self.set_balance(to, credited);
        Ok(())
    }

    /// Returns the current creation nonce of `account` and advances it.
    pub(crate) fn bump_nonce(&mut self, account: Identity) -> u64 {
        let previous = self.nonces.get(&account).copied().unwrap_or(0);
        self.nonces.insert(account, previous.saturating_add(1));
        self.journal.push(JournalEntry::Nonce { account, previous });
        previous
    }

    pub(crate) fn contract(&self, address: &Identity) -> Option<Arc<dyn Contract>> {
        self.contracts.get(address).cloned()
    }

    pub(crate) fn is_contract(&self, address: &Identity) -> bool {
        self.contracts.contains_key(address)
    }

    pub(crate) fn register(
        &mut self,
        address: Identity,
        contract: Arc<dyn Contract>,
    ) -> Result<(), HostFault> {
        if self.contracts.contains_key(&address) {
            return Err(HostFault::AddressCollision(address));
        }
        self.contracts.insert(address, contract);
        self.journal.push(JournalEntry::Deployed { address });
        Ok(())
    }

    pub(crate) fn push_log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
        self.journal.push(JournalEntry::Logged);
    }

    pub(crate) fn push_undo(&mut self, undo: Box<dyn FnOnce() + Send>) {
        self.journal.push(JournalEntry::Undo(undo));
    }

    pub(crate) fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub(crate) fn checkpoint(&self) -> usize {
        self.journal.len()
    }

    /// Undoes every mutation recorded after `checkpoint`.
    pub(crate) fn revert_to(&mut self, checkpoint: usize) {
        while self.journal.len() > checkpoint {
            let Some(entry) = self.journal.pop() else {
                break;
            };
            match entry {
                JournalEntry::Balance { account, previous } => {
                    self.balances.insert(account, previous);
                }
                JournalEntry::Nonce { account, previous } => {
                    self.nonces.insert(account, previous);
                }
                JournalEntry::Deployed { address } => {
                    self.contracts.remove(&address);
                }
                JournalEntry::Logged => {
                    self.logs.pop();
                }
                JournalEntry::Undo(undo) => undo(),
            }
        }
    }

    /// Keeps the effects since `checkpoint`. The journal is only dropped
    /// when the outermost frame commits.
    pub(crate) fn commit(&mut self, checkpoint: usize) {
        if checkpoint == 0 {
            self.journal.clear();
        }
    }
}
