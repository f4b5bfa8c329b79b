//! Custody events.
//!
//! Every entity in this crate reports through [`CustodyEvent`]. Events are
//! written to the host log as JSON objects tagged with their name, so an
//! indexer (or a test) can read them back with [`CustodyEvent::from_log`].

use serde::{Deserialize, Serialize};
use std::fmt;

use custody_protocol::{Amount, Identity, LogEntry, LogEvent, Selector, TokenId};

/// The kind of batch an outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperation {
    NativeTransfer,
    FungibleTransfer,
    NonFungibleTransfer,
    ContractCall,
    EqualNativePayment,
    VariableNativePayment,
    EqualFungiblePayment,
    VariableFungiblePayment,
}

impl fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchOperation::NativeTransfer => "native_transfer",
            BatchOperation::FungibleTransfer => "fungible_transfer",
            BatchOperation::NonFungibleTransfer => "non_fungible_transfer",
            BatchOperation::ContractCall => "contract_call",
            BatchOperation::EqualNativePayment => "equal_native_payment",
            BatchOperation::VariableNativePayment => "variable_native_payment",
            BatchOperation::EqualFungiblePayment => "equal_fungible_payment",
            BatchOperation::VariableFungiblePayment => "variable_fungible_payment",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum CustodyEvent {
    AccountCreated {
        account: Identity,
        owner: Identity,
    },
    OwnershipTransferStarted {
        previous_owner: Identity,
        new_owner: Identity,
    },
    OwnershipTransferred {
        previous_owner: Identity,
        new_owner: Identity,
    },
    NativeReceived {
        from: Identity,
        amount: Amount,
    },
    NativeTransferred {
        to: Identity,
        amount: Amount,
    },
    FungibleTransferred {
        token: Identity,
        to: Identity,
        amount: Amount,
    },
    NonFungibleTransferred {
        token: Identity,
        to: Identity,
        token_id: TokenId,
    },
    ContractCalled {
        target: Identity,
        selector: Selector,
        amount: Amount,
    },
    /// A payment processor element went through. `token` is `None` for
    /// native currency.
    PaymentSent {
        token: Option<Identity>,
        recipient: Identity,
        amount: Amount,
    },
    ElementFailed {
        operation: BatchOperation,
        index: usize,
        target: Identity,
        reason: String,
    },
    Refunded {
        to: Identity,
        amount: Amount,
    },
    BatchCompleted {
        operation: BatchOperation,
        success_count: usize,
        total_count: usize,
        total_amount: Amount,
    },
}

impl CustodyEvent {
    /// Decodes a custody event from a host log entry. Returns `None` for
    /// entries emitted by other contracts' event types.
    pub fn from_log(entry: &LogEntry) -> Option<Self> {
        let event: Self = serde_json::from_value(entry.data.clone()).ok()?;
        (event.topic() == entry.topic).then_some(event)
    }
}

impl LogEvent for CustodyEvent {
    fn topic(&self) -> &'static str {
        match self {
            CustodyEvent::AccountCreated { .. } => "AccountCreated",
            CustodyEvent::OwnershipTransferStarted { .. } => "OwnershipTransferStarted",
            CustodyEvent::OwnershipTransferred { .. } => "OwnershipTransferred",
            CustodyEvent::NativeReceived { .. } => "NativeReceived",
            CustodyEvent::NativeTransferred { .. } => "NativeTransferred",
            CustodyEvent::FungibleTransferred { .. } => "FungibleTransferred",
            CustodyEvent::NonFungibleTransferred { .. } => "NonFungibleTransferred",
            CustodyEvent::ContractCalled { .. } => "ContractCalled",
            CustodyEvent::PaymentSent { .. } => "PaymentSent",
            CustodyEvent::ElementFailed { .. } => "ElementFailed",
            CustodyEvent::Refunded { .. } => "Refunded",
            CustodyEvent::BatchCompleted { .. } => "BatchCompleted",
        }
    }
}
