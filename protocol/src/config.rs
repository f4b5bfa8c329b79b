//! # Protocol Configuration & Constants
//!
//! Every magic number in the custody layer lives here. If you're hardcoding
//! a batch limit or a call budget somewhere else, move it here instead.
//!
//! The constants split into two groups: limits that the custody contracts
//! enforce (batch cap, payment stipend) and parameters of the execution
//! host (call overhead, call depth). The latter are bundled into
//! [`HostConfig`] so that tests and the simulator can tune them.

use serde::{Deserialize, Serialize};

use crate::abi::Selector;

// ---------------------------------------------------------------------------
// Batch Limits
// ---------------------------------------------------------------------------

/// Maximum number of elements processed by a single batch call. Applies to
/// vault creation, orchestrator fan-out, and every payment operation.
pub const MAX_BATCH_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// Call Budgets
// ---------------------------------------------------------------------------

/// Budget handed to each recipient of a batched native payment.
///
/// Large enough for a receive handler that logs or updates a counter, small
/// enough that a hostile recipient cannot burn the batch's whole budget.
/// Vault transfers do not use this; they forward the full remaining budget.
pub const PAYMENT_CALL_STIPEND: u64 = 50_000;

/// Units charged to the calling frame for every nested call, on top of
/// whatever the callee consumes.
pub const DEFAULT_CALL_OVERHEAD: u64 = 700;

/// Maximum nesting depth of calls. A chain of reentrant callbacks hits this
/// long before it can exhaust the host's stack.
pub const MAX_CALL_DEPTH: usize = 128;

// ---------------------------------------------------------------------------
// Well-Known Values
// ---------------------------------------------------------------------------

/// Acknowledgement a contract must return from a non-fungible receipt
/// callback for a safe transfer into it to go through.
pub const NON_FUNGIBLE_RECEIVED: Selector = Selector::new([0x15, 0x0b, 0x7a, 0x02]);

/// Reason recorded when a failing callee gives no reason of its own.
pub const UNKNOWN_ERROR_REASON: &str = "unknown error";

// ---------------------------------------------------------------------------
// Host Configuration
// ---------------------------------------------------------------------------

/// Tunable parameters of the execution host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Units charged to the caller for each nested call.
    pub call_overhead: u64,
    /// Maximum call depth before nested calls revert.
    pub max_call_depth: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            call_overhead: DEFAULT_CALL_OVERHEAD,
            max_call_depth: MAX_CALL_DEPTH,
        }
    }
}
