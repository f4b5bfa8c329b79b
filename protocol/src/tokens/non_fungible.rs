//! Reference non-fungible token.
//!
//! A safe transfer into a contract notifies the receiver with
//! [`Message::NonFungibleReceived`] and requires
//! [`NON_FUNGIBLE_RECEIVED`] back. Anything else reverts the transfer. The
//! ownership record is written before the callback, so a receiver that
//! looks the token up during the callback sees itself as owner.
//!
//! Every registry write is journaled with the host. Reverting the transfer
//! therefore also discards whatever the receiver did with the token during
//! the callback, and a caller further up that reverts takes the move back
//! with it.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{TokenError, TokenEvent};
use crate::abi::{Message, NonFungibleCall, Output, Revert, TokenId};
use crate::config::NON_FUNGIBLE_RECEIVED;
use crate::host::{CallBudget, Contract, Frame};
use crate::identity::Identity;

#[derive(Debug, Default)]
struct Registry {
    owners: HashMap<TokenId, Identity>,
    approvals: HashMap<TokenId, Identity>,
    operators: HashSet<(Identity, Identity)>,
}

/// A registry entry as it was before a write.
#[derive(Debug)]
enum Saved {
    Token {
        token_id: TokenId,
        owner: Option<Identity>,
        approval: Option<Identity>,
    },
    Approval {
        token_id: TokenId,
        approval: Option<Identity>,
    },
    Operator {
        pair: (Identity, Identity),
        was_set: bool,
    },
}

fn put<K: std::hash::Hash + Eq, V>(map: &mut HashMap<K, V>, key: K, value: Option<V>) {
    match value {
        Some(value) => map.insert(key, value),
        None => map.remove(&key),
    };
}

impl Registry {
    fn restore(&mut self, saved: Saved) {
        match saved {
            Saved::Token {
                token_id,
                owner,
                approval,
            } => {
                put(&mut self.owners, token_id, owner);
                put(&mut self.approvals, token_id, approval);
            }
            Saved::Approval { token_id, approval } => put(&mut self.approvals, token_id, approval),
            Saved::Operator { pair, was_set } => {
                if was_set {
                    self.operators.insert(pair);
                } else {
                    self.operators.remove(&pair);
                }
            }
        }
    }

    fn owner(&self, token_id: TokenId) -> Result<Identity, TokenError> {
        self.owners
            .get(&token_id)
            .copied()
            .ok_or(TokenError::TokenNotFound(token_id))
    }

    fn may_move(&self, spender: Identity, owner: Identity, token_id: TokenId) -> bool {
        spender == owner
            || self.approvals.get(&token_id) == Some(&spender)
            || self.operators.contains(&(owner, spender))
    }
}

/// A non-fungible token contract.
#[derive(Debug)]
pub struct NonFungibleToken {
    address: Identity,
    minter: Identity,
    name: String,
    registry: Arc<Mutex<Registry>>,
}

impl NonFungibleToken {
    pub fn new(address: Identity, minter: Identity, name: impl Into<String>) -> Self {
        Self {
            address,
            minter,
            name: name.into(),
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    pub fn address(&self) -> Identity {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current owner of `token_id`, or `None` if it was never minted.
    pub fn owner_of(&self, token_id: TokenId) -> Option<Identity> {
        self.registry.lock().owners.get(&token_id).copied()
    }

    /// Number of tokens held by `account`.
    pub fn balance_of(&self, account: &Identity) -> usize {
        self.registry
            .lock()
            .owners
            .values()
            .filter(|owner| *owner == account)
            .count()
    }

    /// Mints `token_id` to `to`. Minting does not notify the receiver.
    pub fn mint(&self, frame: &Frame<'_>, to: Identity, token_id: TokenId) -> Result<(), TokenError> {
        if frame.caller() != self.minter {
            return Err(TokenError::UnauthorizedMint);
        }
        if to.is_null() {
            return Err(TokenError::InvalidRecipient);
        }
        {
            let mut registry = self.registry.lock();
            if registry.owners.contains_key(&token_id) {
                return Err(TokenError::AlreadyMinted(token_id));
            }
            registry.owners.insert(token_id, to);
        }
        self.journal(
            frame,
            Saved::Token {
                token_id,
                owner: None,
                approval: None,
            },
        );
        frame.emit(&TokenEvent::TokenTransfer {
            from: Identity::NULL,
            to,
            token_id,
        });
        Ok(())
    }

    fn safe_transfer_from(
        &self,
        frame: &Frame<'_>,
        from: Identity,
        to: Identity,
        token_id: TokenId,
        data: &Bytes,
    ) -> Result<Output, Revert> {
        let operator = frame.caller();
        if to.is_null() {
            return Err(TokenError::InvalidRecipient.into());
        }

        let cleared_approval = {
            let mut registry = self.registry.lock();
            let owner = registry.owner(token_id)?;
            if owner != from {
                return Err(TokenError::NotOwner { token_id, from }.into());
            }
            if !registry.may_move(operator, owner, token_id) {
                return Err(TokenError::NotApproved(token_id).into());
            }
            registry.owners.insert(token_id, to);
            registry.approvals.remove(&token_id)
        };
        self.journal(
            frame,
            Saved::Token {
                token_id,
                owner: Some(from),
                approval: cleared_approval,
            },
        );
        frame.emit(&TokenEvent::TokenTransfer { from, to, token_id });

        if frame.is_contract(&to) {
            let notice = Message::NonFungibleReceived {
                operator,
                from,
                token_id,
                data: data.clone(),
            };
            let accepted = matches!(
                frame.invoke(to, 0, &notice, CallBudget::Forward),
                Ok(Output::Selector(selector)) if selector == NON_FUNGIBLE_RECEIVED
            );
            if !accepted {
                tracing::debug!(%to, token_id, "receiver rejected token");
                return Err(TokenError::ReceiverRejected(to).into());
            }
        }
        Ok(Output::Unit)
    }

    fn approve(&self, frame: &Frame<'_>, spender: Identity, token_id: TokenId) -> Result<Output, TokenError> {
        let caller = frame.caller();
        let (owner, previous) = {
            let mut registry = self.registry.lock();
            let owner = registry.owner(token_id)?;
            if caller != owner && !registry.operators.contains(&(owner, caller)) {
                return Err(TokenError::NotApproved(token_id));
            }
            let previous = registry.approvals.insert(token_id, spender);
            (owner, previous)
        };
        self.journal(
            frame,
            Saved::Approval {
                token_id,
                approval: previous,
            },
        );
        frame.emit(&TokenEvent::TokenApproval {
            owner,
            spender,
            token_id,
        });
        Ok(Output::Unit)
    }

    fn set_approval_for_all(
        &self,
        frame: &Frame<'_>,
        operator: Identity,
        approved: bool,
    ) -> Result<Output, TokenError> {
        let owner = frame.caller();
        let was_set = {
            let mut registry = self.registry.lock();
            if approved {
                !registry.operators.insert((owner, operator))
            } else {
                registry.operators.remove(&(owner, operator))
            }
        };
        self.journal(
            frame,
            Saved::Operator {
                pair: (owner, operator),
                was_set,
            },
        );
        frame.emit(&TokenEvent::ApprovalForAll {
            owner,
            operator,
            approved,
        });
        Ok(Output::Unit)
    }
}

impl NonFungibleToken {
    fn journal(&self, frame: &Frame<'_>, saved: Saved) {
        let registry = Arc::clone(&self.registry);
        frame.on_revert(move || registry.lock().restore(saved));
    }
}

impl Contract for NonFungibleToken {
    fn handle(&self, frame: &Frame<'_>, message: &Message) -> Result<Output, Revert> {
        let call = match message {
            Message::NonFungible(call) => call,
            other => return Err(TokenError::Unsupported(other.kind()).into()),
        };
        match call {
            NonFungibleCall::SafeTransferFrom {
                from,
                to,
                token_id,
                data,
            } => self.safe_transfer_from(frame, *from, *to, *token_id, data),
            NonFungibleCall::Approve { spender, token_id } => {
                Ok(self.approve(frame, *spender, *token_id)?)
            }
            NonFungibleCall::SetApprovalForAll { operator, approved } => {
                Ok(self.set_approval_for_all(frame, *operator, *approved)?)
            }
            NonFungibleCall::OwnerOf { token_id } => {
                let owner = self.registry.lock().owner(*token_id)?;
                Ok(Output::Identity(owner))
            }
        }
    }
}
