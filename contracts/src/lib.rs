//! # Custody Contracts
//!
//! The custody layer proper. One administrator controls many vaults through
//! a batch orchestrator; anyone can pay many recipients at once through the
//! batch payment processor.
//!
//! - **Vault** — holds native currency and tokens; transfers them, or calls
//!   anything, on its owner's instruction.
//! - **Batch Orchestrator** — creates vaults and fans transfers and calls
//!   out across them, one recoverable call per vault.
//! - **Batch Payment Processor** — pays recipients directly from the
//!   caller's attached value or token allowance, refunding what it could
//!   not deliver.
//! - **Access Guard / Reentrancy Lock** — the two-phase owner record and the
//!   per-entity lock every privileged entity embeds.
//!
//! ## Design Principles
//!
//! 1. Validate the whole request, then act. Precondition failures abort
//!    before any side effect.
//! 2. Inside a batch, one element's failure is recorded, never propagated.
//!    The caller reads the success count, not the call's success.
//! 3. Every guarded operation takes its entity's lock first and releases it
//!    on every exit path.
//! 4. All monetary arithmetic is checked. Wrapping arithmetic and money do
//!    not mix.

pub mod access;
pub mod batch;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod payments;
pub mod reentrancy;
pub mod vault;

pub use access::{AccessGuard, Owned, OwnershipState};
pub use batch::{BatchOutcome, ElementOutcome};
pub use error::CustodyError;
pub use events::{BatchOperation, CustodyEvent};
pub use orchestrator::BatchOrchestrator;
pub use payments::BatchPaymentProcessor;
pub use reentrancy::{LockGuard, ReentrancyLock};
pub use vault::Vault;
