//! # Access Guard
//!
//! Two-phase ownership for every privileged entity.
//!
//! ```text
//!             begin_transfer(new)            accept_transfer (by new)
//!   Stable(owner) ──────────────▶ Pending(owner, new) ──────────────▶ Stable(new)
//!                                   │        ▲
//!                                   └────────┘
//!                            begin_transfer(other) overwrites
//! ```
//!
//! There is no cancel transition and no way to renounce: an entity always
//! has exactly one owner.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use custody_protocol::{Frame, Identity};

use crate::error::CustodyError;
use crate::events::CustodyEvent;

/// Ownership state of a guarded entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnershipState {
    Stable {
        owner: Identity,
    },
    Pending {
        owner: Identity,
        pending_owner: Identity,
    },
}

impl OwnershipState {
    pub fn owner(&self) -> Identity {
        match self {
            OwnershipState::Stable { owner } | OwnershipState::Pending { owner, .. } => *owner,
        }
    }

    pub fn pending_owner(&self) -> Option<Identity> {
        match self {
            OwnershipState::Stable { .. } => None,
            OwnershipState::Pending { pending_owner, .. } => Some(*pending_owner),
        }
    }
}

/// Owner record embedded in each guarded entity.
#[derive(Debug)]
pub struct AccessGuard {
    state: Mutex<OwnershipState>,
}

impl AccessGuard {
    /// A guard owned by `owner`.
    pub fn new(owner: Identity) -> Self {
        Self {
            state: Mutex::new(OwnershipState::Stable { owner }),
        }
    }

    pub fn state(&self) -> OwnershipState {
        *self.state.lock()
    }

    pub fn owner(&self) -> Identity {
        self.state.lock().owner()
    }

    pub fn pending_owner(&self) -> Option<Identity> {
        self.state.lock().pending_owner()
    }

    /// Fails with [`CustodyError::Unauthorized`] unless `caller` is the owner.
    pub fn require_owner(&self, caller: Identity) -> Result<(), CustodyError> {
        if self.owner() == caller {
            Ok(())
        } else {
            Err(CustodyError::Unauthorized { caller })
        }
    }

    /// Nominates `new_owner`. The frame's caller must be the current owner.
    /// Nominating again while a transfer is pending replaces the nominee.
    pub fn begin_transfer(&self, frame: &Frame<'_>, new_owner: Identity) -> Result<(), CustodyError> {
        let caller = frame.caller();
        let previous_owner = {
            let mut state = self.state.lock();
            let owner = state.owner();
            if caller != owner {
                return Err(CustodyError::Unauthorized { caller });
            }
            if new_owner.is_null() {
                return Err(CustodyError::InvalidIdentity("new owner"));
            }
            *state = OwnershipState::Pending {
                owner,
                pending_owner: new_owner,
            };
            owner
        };
        tracing::info!(entity = %frame.address(), %previous_owner, %new_owner, "ownership transfer started");
        frame.emit(&CustodyEvent::OwnershipTransferStarted {
            previous_owner,
            new_owner,
        });
        Ok(())
    }

    /// Completes a pending transfer. The frame's caller must be the
    /// nominee.
    pub fn accept_transfer(&self, frame: &Frame<'_>) -> Result<(), CustodyError> {
        let caller = frame.caller();
        let previous_owner = {
            let mut state = self.state.lock();
            match *state {
                OwnershipState::Pending {
                    owner,
                    pending_owner,
                } if pending_owner == caller => {
                    *state = OwnershipState::Stable { owner: caller };
                    owner
                }
                _ => return Err(CustodyError::NotPendingOwner { caller }),
            }
        };
        tracing::info!(entity = %frame.address(), %previous_owner, new_owner = %caller, "ownership transferred");
        frame.emit(&CustodyEvent::OwnershipTransferred {
            previous_owner,
            new_owner: caller,
        });
        Ok(())
    }
}

/// An entity with an [`AccessGuard`].
pub trait Owned {
    fn access(&self) -> &AccessGuard;

    fn owner(&self) -> Identity {
        self.access().owner()
    }

    fn pending_owner(&self) -> Option<Identity> {
        self.access().pending_owner()
    }

    /// See [`AccessGuard::begin_transfer`].
    fn transfer_ownership(&self, frame: &Frame<'_>, new_owner: Identity) -> Result<(), CustodyError> {
        self.access().begin_transfer(frame, new_owner)
    }

    /// See [`AccessGuard::accept_transfer`].
    fn accept_ownership(&self, frame: &Frame<'_>) -> Result<(), CustodyError> {
        self.access().accept_transfer(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_protocol::{Host, Revert};

    fn id(label: &str) -> Identity {
        Identity::from_label(label)
    }

    fn as_caller<T>(
        host: &Host,
        caller: &str,
        f: impl FnOnce(&Frame<'_>) -> Result<T, CustodyError>,
    ) -> Result<T, CustodyError> {
        host.transact(id(caller), id("entity"), 0, f)
    }

    #[test]
    fn starts_stable_with_creator() {
        let guard = AccessGuard::new(id("admin"));
        assert_eq!(guard.state(), OwnershipState::Stable { owner: id("admin") });
        assert_eq!(guard.pending_owner(), None);
        assert!(guard.require_owner(id("admin")).is_ok());
        assert_eq!(
            guard.require_owner(id("mallory")),
            Err(CustodyError::Unauthorized { caller: id("mallory") })
        );
    }

    #[test]
    fn two_step_transfer() {
        let host = Host::new();
        let guard = AccessGuard::new(id("admin"));

        as_caller(&host, "admin", |f| guard.begin_transfer(f, id("heir"))).unwrap();
        assert_eq!(guard.owner(), id("admin"));
        assert_eq!(guard.pending_owner(), Some(id("heir")));

        as_caller(&host, "heir", |f| guard.accept_transfer(f)).unwrap();
        assert_eq!(guard.state(), OwnershipState::Stable { owner: id("heir") });

        let topics: Vec<_> = host.logs().into_iter().map(|l| l.topic).collect();
        assert_eq!(topics, ["OwnershipTransferStarted", "OwnershipTransferred"]);
    }

    #[test]
    fn non_owner_cannot_begin() {
        let host = Host::new();
        let guard = AccessGuard::new(id("admin"));
        let err = as_caller(&host, "mallory", |f| guard.begin_transfer(f, id("mallory"))).unwrap_err();
        assert_eq!(err, CustodyError::Unauthorized { caller: id("mallory") });
        assert_eq!(guard.state(), OwnershipState::Stable { owner: id("admin") });
        assert_eq!(host.log_count(), 0);
    }

    #[test]
    fn null_nominee_is_rejected() {
        let host = Host::new();
        let guard = AccessGuard::new(id("admin"));
        let err = as_caller(&host, "admin", |f| guard.begin_transfer(f, Identity::NULL)).unwrap_err();
        assert_eq!(err, CustodyError::InvalidIdentity("new owner"));
    }

    #[test]
    fn only_nominee_can_accept() {
        let host = Host::new();
        let guard = AccessGuard::new(id("admin"));

        let err = as_caller(&host, "heir", |f| guard.accept_transfer(f)).unwrap_err();
        assert_eq!(err, CustodyError::NotPendingOwner { caller: id("heir") });

        as_caller(&host, "admin", |f| guard.begin_transfer(f, id("heir"))).unwrap();
        for caller in ["admin", "mallory"] {
            let err = as_caller(&host, caller, |f| guard.accept_transfer(f)).unwrap_err();
            assert_eq!(err, CustodyError::NotPendingOwner { caller: id(caller) });
        }
        assert_eq!(guard.pending_owner(), Some(id("heir")));
    }

    #[test]
    fn second_nomination_overwrites_first() {
        let host = Host::new();
        let guard = AccessGuard::new(id("admin"));
        as_caller(&host, "admin", |f| guard.begin_transfer(f, id("first"))).unwrap();
        as_caller(&host, "admin", |f| guard.begin_transfer(f, id("second"))).unwrap();

        assert!(as_caller(&host, "first", |f| guard.accept_transfer(f)).is_err());
        as_caller(&host, "second", |f| guard.accept_transfer(f)).unwrap();
        assert_eq!(guard.owner(), id("second"));
    }

    #[test]
    fn failed_transfer_reverts_as_custody_reason() {
        let host = Host::new();
        let guard = AccessGuard::new(id("admin"));
        let revert: Revert = as_caller(&host, "mallory", |f| guard.accept_transfer(f))
            .unwrap_err()
            .into();
        assert!(revert.reason_or_unknown().ends_with("is not the pending owner"));
    }
}
