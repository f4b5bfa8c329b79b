//! Per-entity reentrancy lock.
//!
//! [`ReentrancyLock::enter`] flips the flag from free to locked or fails
//! with [`CustodyError::ReentrantCall`]. The returned [`LockGuard`] frees it
//! again when dropped, on success and error paths alike.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::CustodyError;

#[derive(Debug, Default)]
pub struct ReentrancyLock {
    locked: AtomicBool,
}

impl ReentrancyLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for the lifetime of the returned guard.
    pub fn enter(&self) -> Result<LockGuard<'_>, CustodyError> {
        self.locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CustodyError::ReentrantCall)?;
        Ok(LockGuard { lock: self })
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

/// Holds a [`ReentrancyLock`] until dropped.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a ReentrancyLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}
