// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Custody Protocol — Execution Host
//!
//! The ground the custody contracts stand on: an in-process execution host
//! where every external call can fail, re-enter, or run out of budget, and
//! where a failed call leaves no trace in host-owned state.
//!
//! ## Architecture
//!
//! - **identity** — 20-byte account identities. Labels for people, derived
//!   addresses for contracts.
//! - **abi** — What crosses a contract boundary: messages, outputs, reverts,
//!   selectors, and the one capability object for arbitrary calls.
//! - **host** — The host itself: world state, call frames, budgets, the
//!   revert journal, and the event log.
//! - **tokens** — Reference fungible and non-fungible tokens, plus typed
//!   clients that talk to any contract implementing those interfaces.
//! - **config** — Protocol constants and host parameters.
//!
//! ## Design Philosophy
//!
//! 1. Every external call is a suspension point. Code that makes one must
//!    already have finished its checks.
//! 2. Failures are values. A nested call that reverts hands the revert back
//!    to its caller, who decides whether it is fatal.
//! 3. No locks are held across calls. Reentrancy is a question for the
//!    callee's own guards, not for the host's mutex.

pub mod abi;
pub mod config;
pub mod host;
pub mod identity;
pub mod tokens;

pub use abi::{Amount, CallRequest, Message, Output, Revert, Selector, TokenId};
pub use host::{CallBudget, Contract, Frame, Host, HostFault, LogEntry, LogEvent, TxId};
pub use identity::Identity;
