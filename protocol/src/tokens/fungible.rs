//! Reference fungible token.
//!
//! Balances, allowances and total supply live behind one mutex. Every
//! operation checks before it writes, and journals the values it overwrites
//! with the host, so a revert of the calling frame or any frame above it
//! restores the ledger. Overflow is checked on every credit.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::{TokenError, TokenEvent};
use crate::abi::{Amount, FungibleCall, Message, Output, Revert};
use crate::host::{Contract, Frame};
use crate::identity::Identity;

#[derive(Debug, Default)]
struct Ledger {
    balances: HashMap<Identity, Amount>,
    allowances: HashMap<(Identity, Identity), Amount>,
    total_supply: Amount,
}

/// Ledger values a write is about to overwrite.
#[derive(Debug, Default)]
struct Saved {
    balances: Vec<(Identity, Amount)>,
    allowances: Vec<((Identity, Identity), Amount)>,
    total_supply: Option<Amount>,
}

impl Ledger {
    fn save_balances(&self, accounts: &[Identity]) -> Saved {
        Saved {
            balances: accounts.iter().map(|a| (*a, self.balance(a))).collect(),
            ..Saved::default()
        }
    }

    fn restore(&mut self, saved: Saved) {
        for (account, balance) in saved.balances.into_iter().rev() {
            self.balances.insert(account, balance);
        }
        for (pair, allowance) in saved.allowances.into_iter().rev() {
            self.allowances.insert(pair, allowance);
        }
        if let Some(supply) = saved.total_supply {
            self.total_supply = supply;
        }
    }

    fn balance(&self, account: &Identity) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: Identity, spender: Identity) -> Amount {
        self.allowances.get(&(owner, spender)).copied().unwrap_or(0)
    }

    /// Moves `amount` from `from` to `to` after checking both sides.
    fn move_tokens(&mut self, from: Identity, to: Identity, amount: Amount) -> Result<(), TokenError> {
        if to.is_null() {
            return Err(TokenError::InvalidRecipient);
        }
        let balance = self.balance(&from);
        if balance < amount {
            return Err(TokenError::InsufficientBalance { balance, amount });
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance(&to)
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;
        self.balances.insert(from, balance - amount);
        self.balances.insert(to, credited);
        Ok(())
    }
}

/// A fungible token contract.
#[derive(Debug)]
pub struct FungibleToken {
    address: Identity,
    minter: Identity,
    name: String,
    symbol: String,
    ledger: Arc<Mutex<Ledger>>,
}

impl FungibleToken {
    /// Creates an empty token at `address`. Only `minter` may mint.
    pub fn new(address: Identity, minter: Identity, name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            address,
            minter,
            name: name.into(),
            symbol: symbol.into().to_uppercase(),
            ledger: Arc::new(Mutex::new(Ledger::default())),
        }
    }

    pub fn address(&self) -> Identity {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn total_supply(&self) -> Amount {
        self.ledger.lock().total_supply
    }

    pub fn balance_of(&self, account: &Identity) -> Amount {
        self.ledger.lock().balance(account)
    }

    pub fn allowance(&self, owner: &Identity, spender: &Identity) -> Amount {
        self.ledger.lock().allowance(*owner, *spender)
    }

    /// Mints `amount` new tokens to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::UnauthorizedMint`] unless the frame's caller is
    /// the minter, and [`TokenError::SupplyOverflow`] if supply would wrap.
    pub fn mint(&self, frame: &Frame<'_>, to: Identity, amount: Amount) -> Result<(), TokenError> {
        if frame.caller() != self.minter {
            return Err(TokenError::UnauthorizedMint);
        }
        if to.is_null() {
            return Err(TokenError::InvalidRecipient);
        }
        let saved = {
            let mut ledger = self.ledger.lock();
            let supply = ledger
                .total_supply
                .checked_add(amount)
                .ok_or(TokenError::SupplyOverflow { amount })?;
            let balance = ledger
                .balance(&to)
                .checked_add(amount)
                .ok_or(TokenError::SupplyOverflow { amount })?;
            let mut saved = ledger.save_balances(&[to]);
            saved.total_supply = Some(ledger.total_supply);
            ledger.total_supply = supply;
            ledger.balances.insert(to, balance);
            saved
        };
        self.journal(frame, saved);
        tracing::debug!(token = %self.symbol, %to, amount, "tokens minted");
        frame.emit(&TokenEvent::Transfer {
            from: Identity::NULL,
            to,
            amount,
        });
        Ok(())
    }

    fn transfer(&self, frame: &Frame<'_>, to: Identity, amount: Amount) -> Result<Output, TokenError> {
        let from = frame.caller();
        let saved = {
            let mut ledger = self.ledger.lock();
            let saved = ledger.save_balances(&[from, to]);
            ledger.move_tokens(from, to, amount)?;
            saved
        };
        self.journal(frame, saved);
        frame.emit(&TokenEvent::Transfer { from, to, amount });
        Ok(Output::Bool(true))
    }

    fn transfer_from(
        &self,
        frame: &Frame<'_>,
        from: Identity,
        to: Identity,
        amount: Amount,
    ) -> Result<Output, TokenError> {
        let spender = frame.caller();
        let saved = {
            let mut ledger = self.ledger.lock();
            let allowance = ledger.allowance(from, spender);
            if allowance < amount {
                return Err(TokenError::InsufficientAllowance { allowance, amount });
            }
            let mut saved = ledger.save_balances(&[from, to]);
            saved.allowances.push(((from, spender), allowance));
            ledger.move_tokens(from, to, amount)?;
            ledger.allowances.insert((from, spender), allowance - amount);
            saved
        };
        self.journal(frame, saved);
        frame.emit(&TokenEvent::Transfer { from, to, amount });
        Ok(Output::Bool(true))
    }

    fn approve(&self, frame: &Frame<'_>, spender: Identity, amount: Amount) -> Result<Output, TokenError> {
        let owner = frame.caller();
        if spender.is_null() {
            return Err(TokenError::InvalidRecipient);
        }
        let previous = self
            .ledger
            .lock()
            .allowances
            .insert((owner, spender), amount)
            .unwrap_or(0);
        self.journal(
            frame,
            Saved {
                allowances: vec![((owner, spender), previous)],
                ..Saved::default()
            },
        );
        frame.emit(&TokenEvent::Approval {
            owner,
            spender,
            amount,
        });
        Ok(Output::Bool(true))
    }
}

impl FungibleToken {
    /// Hands `saved` to the host so a revert puts it back.
    fn journal(&self, frame: &Frame<'_>, saved: Saved) {
        let ledger = Arc::clone(&self.ledger);
        frame.on_revert(move || ledger.lock().restore(saved));
    }
}

impl Contract for FungibleToken {
    fn handle(&self, frame: &Frame<'_>, message: &Message) -> Result<Output, Revert> {
        let call = match message {
            Message::Fungible(call) => call,
            other => return Err(TokenError::Unsupported(other.kind()).into()),
        };
        let output = match call {
            FungibleCall::Transfer { to, amount } => self.transfer(frame, *to, *amount)?,
            FungibleCall::TransferFrom { from, to, amount } => {
                self.transfer_from(frame, *from, *to, *amount)?
            }
            FungibleCall::Approve { spender, amount } => self.approve(frame, *spender, *amount)?,
            FungibleCall::BalanceOf { account } => Output::Amount(self.balance_of(account)),
            FungibleCall::Allowance { owner, spender } => {
                Output::Amount(self.allowance(owner, spender))
            }
        };
        Ok(output)
    }
}
