//! Shared fixtures for the custody integration tests.
//!
//! [`World`] wires up a host with an administrator, an orchestrator, a
//! payment processor and helpers for deploying tokens. The rest of the file
//! is a zoo of misbehaving contracts: recipients that reject, burn budget,
//! or re-enter, and tokens that lie about success.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;

use custody_contracts::{BatchOrchestrator, BatchPaymentProcessor, CustodyError, CustodyEvent};
use custody_protocol::tokens::{FungibleToken, NonFungibleToken};
use custody_protocol::{
    Amount, Contract, Frame, Host, Identity, Message, Output, Revert, Selector, TokenId,
};
use custody_protocol::abi::FungibleCall;

pub fn id(label: &str) -> Identity {
    Identity::from_label(label)
}

pub struct World {
    pub host: Host,
    pub admin: Identity,
    pub orchestrator: Arc<BatchOrchestrator>,
    pub processor: Arc<BatchPaymentProcessor>,
}

impl World {
    pub fn new() -> Self {
        let host = Host::new();
        let admin = id("admin");
        let orchestrator = host
            .deploy::<_, Revert, _>(admin, |address| Ok(BatchOrchestrator::new(address, admin)))
            .expect("deploy orchestrator");
        let processor = host
            .deploy::<_, Revert, _>(id("deployer"), |address| Ok(BatchPaymentProcessor::new(address)))
            .expect("deploy processor");
        Self {
            host,
            admin,
            orchestrator,
            processor,
        }
    }

    /// Runs `f` as the administrator, executing at the orchestrator.
    pub fn as_admin<T>(
        &self,
        f: impl FnOnce(&Frame<'_>) -> Result<T, CustodyError>,
    ) -> Result<T, CustodyError> {
        self.host.transact(self.admin, self.orchestrator.address(), 0, f)
    }

    /// Runs `f` as `payer` executing at the processor, attaching `value`.
    pub fn as_payer<T>(
        &self,
        payer: Identity,
        value: Amount,
        f: impl FnOnce(&Frame<'_>) -> Result<T, CustodyError>,
    ) -> Result<T, CustodyError> {
        self.host.transact(payer, self.processor.address(), value, f)
    }

    pub fn create_vaults(&self, count: usize) -> Vec<Identity> {
        self.as_admin(|f| self.orchestrator.create_accounts(f, count))
            .expect("create vaults")
    }

    /// Deploys any contract from a throwaway deployer account.
    pub fn deploy<C: Contract + 'static>(&self, build: impl FnOnce(Identity) -> C) -> (Identity, Arc<C>) {
        let mut deployed_at = Identity::NULL;
        let contract = self
            .host
            .deploy::<_, Revert, _>(id("fixtures"), |address| {
                deployed_at = address;
                Ok(build(address))
            })
            .expect("deploy fixture");
        (deployed_at, contract)
    }

    pub fn fungible_token(&self, symbol: &str) -> Arc<FungibleToken> {
        let minter = id("minter");
        self.host
            .deploy::<_, Revert, _>(minter, |address| {
                Ok(FungibleToken::new(address, minter, symbol, symbol))
            })
            .expect("deploy token")
    }

    pub fn non_fungible_token(&self, name: &str) -> Arc<NonFungibleToken> {
        let minter = id("minter");
        self.host
            .deploy::<_, Revert, _>(minter, |address| Ok(NonFungibleToken::new(address, minter, name)))
            .expect("deploy nft")
    }

    pub fn mint(&self, token: &FungibleToken, to: Identity, amount: Amount) {
        self.host
            .transact::<_, Revert, _>(id("minter"), token.address(), 0, |f| {
                Ok(token.mint(f, to, amount)?)
            })
            .expect("mint");
    }

    pub fn mint_nft(&self, token: &NonFungibleToken, to: Identity, token_id: TokenId) {
        self.host
            .transact::<_, Revert, _>(id("minter"), token.address(), 0, |f| {
                Ok(token.mint(f, to, token_id)?)
            })
            .expect("mint nft");
    }

    pub fn approve(&self, token: &FungibleToken, owner: Identity, spender: Identity, amount: Amount) {
        self.host
            .invoke(
                owner,
                token.address(),
                0,
                &Message::Fungible(FungibleCall::Approve { spender, amount }),
            )
            .expect("approve");
    }

    /// Every custody event logged so far.
    pub fn events(&self) -> Vec<CustodyEvent> {
        self.host.logs().iter().filter_map(CustodyEvent::from_log).collect()
    }

    /// Custody events logged at or after `cursor`.
    pub fn events_since(&self, cursor: usize) -> Vec<CustodyEvent> {
        self.host
            .logs_since(cursor)
            .iter()
            .filter_map(CustodyEvent::from_log)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Recipients
// ---------------------------------------------------------------------------

/// Reverts on every native deposit.
pub struct RejectingRecipient {
    pub reason: Option<&'static str>,
}

impl Contract for RejectingRecipient {
    fn handle(&self, _frame: &Frame<'_>, _message: &Message) -> Result<Output, Revert> {
        Err(match self.reason {
            Some(reason) => Revert::new(reason),
            None => Revert::silent(),
        })
    }
}

/// Burns `units` of budget on every message.
pub struct GasGuzzler {
    pub units: u64,
}

impl Contract for GasGuzzler {
    fn handle(&self, frame: &Frame<'_>, _message: &Message) -> Result<Output, Revert> {
        frame.consume(self.units)?;
        Ok(Output::Unit)
    }
}

type Attack = Box<dyn Fn(&Frame<'_>) -> Result<(), CustodyError> + Send + Sync>;

/// Accepts deposits, but first runs `attack` and records how it failed.
pub struct ReentrantRecipient {
    attack: Attack,
    pub observed: Mutex<Vec<CustodyError>>,
}

impl ReentrantRecipient {
    pub fn new(attack: impl Fn(&Frame<'_>) -> Result<(), CustodyError> + Send + Sync + 'static) -> Self {
        Self {
            attack: Box::new(attack),
            observed: Mutex::new(Vec::new()),
        }
    }

    pub fn observed(&self) -> Vec<CustodyError> {
        self.observed.lock().clone()
    }
}

impl Contract for ReentrantRecipient {
    fn handle(&self, frame: &Frame<'_>, message: &Message) -> Result<Output, Revert> {
        if matches!(message, Message::Receive) {
            if let Err(err) = (self.attack)(frame) {
                self.observed.lock().push(err);
            }
        }
        Ok(Output::Unit)
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// How a [`ScriptedToken`] answers transfers.
pub enum TokenBehavior {
    ReturnFalse,
    ReturnTrue,
    RevertSilently,
    RevertWith(&'static str),
}

/// A fungible token that never actually transfers.
pub struct ScriptedToken {
    pub behavior: TokenBehavior,
}

impl Contract for ScriptedToken {
    fn handle(&self, _frame: &Frame<'_>, message: &Message) -> Result<Output, Revert> {
        match message {
            Message::Fungible(FungibleCall::BalanceOf { .. }) => Ok(Output::Amount(0)),
            Message::Fungible(_) => match self.behavior {
                TokenBehavior::ReturnFalse => Ok(Output::Bool(false)),
                TokenBehavior::ReturnTrue => Ok(Output::Bool(true)),
                TokenBehavior::RevertSilently => Err(Revert::silent()),
                TokenBehavior::RevertWith(reason) => Err(Revert::new(reason)),
            },
            _ => Err(Revert::silent()),
        }
    }
}

// ---------------------------------------------------------------------------
// Call targets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub caller: Identity,
    pub selector: Selector,
    pub data: Vec<u8>,
    pub value: Amount,
}

/// Records every call it receives. Reverts on `fail()`.
#[derive(Default)]
pub struct RecordingTarget {
    pub calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingTarget {
    pub fn fail_selector() -> Selector {
        Selector::from_signature("fail()")
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

impl Contract for RecordingTarget {
    fn handle(&self, frame: &Frame<'_>, message: &Message) -> Result<Output, Revert> {
        match message {
            Message::Call { selector, .. } if *selector == Self::fail_selector() => {
                Err(Revert::new("target refused"))
            }
            Message::Call { selector, data } => {
                self.calls.lock().push(RecordedCall {
                    caller: frame.caller(),
                    selector: *selector,
                    data: data.to_vec(),
                    value: frame.value(),
                });
                Ok(Output::Bytes(data.clone()))
            }
            Message::Receive => Ok(Output::Unit),
            _ => Err(Revert::silent()),
        }
    }
}
