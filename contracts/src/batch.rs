//! Batch validation and outcome recording.
//!
//! Every batch call validates its whole request up front with the checks in
//! this module, then feeds each element's result into a [`BatchRecorder`].
//! The recorder emits `ElementFailed` as failures happen and one
//! `BatchCompleted` at the end, and returns the same information to the
//! caller as a [`BatchOutcome`].

use serde::{Deserialize, Serialize};

use custody_protocol::config::MAX_BATCH_SIZE;
use custody_protocol::{Amount, Frame, Identity};

use crate::error::CustodyError;
use crate::events::{BatchOperation, CustodyEvent};

/// Fails unless `1 <= len <= MAX_BATCH_SIZE`.
pub fn check_batch_len(len: usize) -> Result<(), CustodyError> {
    if len == 0 {
        return Err(CustodyError::EmptyArray);
    }
    if len > MAX_BATCH_SIZE {
        return Err(CustodyError::ArrayTooLarge {
            len,
            max: MAX_BATCH_SIZE,
        });
    }
    Ok(())
}

/// Fails unless targets and per-element parameters pair up exactly.
pub fn check_paired(targets: usize, params: usize) -> Result<(), CustodyError> {
    if targets != params {
        return Err(CustodyError::ArrayLengthMismatch { targets, params });
    }
    Ok(())
}

pub fn check_not_null(identity: Identity, what: &'static str) -> Result<(), CustodyError> {
    if identity.is_null() {
        return Err(CustodyError::InvalidIdentity(what));
    }
    Ok(())
}

/// What happened to one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ElementOutcome {
    Succeeded { amount: Amount },
    Failed { reason: String },
    /// Nothing to do (a zero amount). Neither a success nor a failure.
    Skipped,
}

/// Result of a whole batch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub operation: BatchOperation,
    pub elements: Vec<ElementOutcome>,
    pub success_count: usize,
    pub total_count: usize,
    /// Sum of the amounts of successful elements.
    pub total_amount: Amount,
}

impl BatchOutcome {
    pub fn failure_count(&self) -> usize {
        self.elements
            .iter()
            .filter(|e| matches!(e, ElementOutcome::Failed { .. }))
            .count()
    }

    /// Reasons of failed elements, by index.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.elements.iter().enumerate().filter_map(|(i, e)| match e {
            ElementOutcome::Failed { reason } => Some((i, reason.as_str())),
            _ => None,
        })
    }
}

/// Accumulates element outcomes for one batch.
pub(crate) struct BatchRecorder {
    operation: BatchOperation,
    elements: Vec<ElementOutcome>,
    success_count: usize,
    total_amount: Amount,
}

impl BatchRecorder {
    pub(crate) fn new(operation: BatchOperation, len: usize) -> Self {
        Self {
            operation,
            elements: Vec::with_capacity(len),
            success_count: 0,
            total_amount: 0,
        }
    }

    pub(crate) fn succeed(&mut self, amount: Amount) -> Result<(), CustodyError> {
        self.total_amount = self
            .total_amount
            .checked_add(amount)
            .ok_or(CustodyError::Overflow("batch total"))?;
        self.success_count += 1;
        self.elements.push(ElementOutcome::Succeeded { amount });
        Ok(())
    }

    pub(crate) fn skip(&mut self) {
        self.elements.push(ElementOutcome::Skipped);
    }

    pub(crate) fn fail(&mut self, frame: &Frame<'_>, target: Identity, reason: impl Into<String>) {
        let index = self.elements.len();
        let reason = reason.into();
        tracing::warn!(
            operation = %self.operation,
            index,
            %target,
            reason = %reason,
            "batch element failed"
        );
        frame.emit(&CustodyEvent::ElementFailed {
            operation: self.operation,
            index,
            target,
            reason: reason.clone(),
        });
        self.elements.push(ElementOutcome::Failed { reason });
    }

    /// Emits `BatchCompleted` and returns the outcome.
    pub(crate) fn finish(self, frame: &Frame<'_>) -> BatchOutcome {
        let total_count = self.elements.len();
        tracing::info!(
            operation = %self.operation,
            success_count = self.success_count,
            total_count,
            total_amount = self.total_amount,
            "batch completed"
        );
        frame.emit(&CustodyEvent::BatchCompleted {
            operation: self.operation,
            success_count: self.success_count,
            total_count,
            total_amount: self.total_amount,
        });
        BatchOutcome {
            operation: self.operation,
            elements: self.elements,
            success_count: self.success_count,
            total_count,
            total_amount: self.total_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_protocol::Host;

    #[test]
    fn batch_len_bounds() {
        assert_eq!(check_batch_len(0), Err(CustodyError::EmptyArray));
        assert!(check_batch_len(1).is_ok());
        assert!(check_batch_len(MAX_BATCH_SIZE).is_ok());
        assert_eq!(
            check_batch_len(MAX_BATCH_SIZE + 1),
            Err(CustodyError::ArrayTooLarge { len: 101, max: 100 })
        );
    }

    #[test]
    fn pairing_check() {
        assert!(check_paired(3, 3).is_ok());
        assert_eq!(
            check_paired(3, 2),
            Err(CustodyError::ArrayLengthMismatch { targets: 3, params: 2 })
        );
    }

    #[test]
    fn recorder_counts_and_emits() {
        let host = Host::new();
        let who = Identity::from_label("who");
        let outcome = host
            .transact::<_, CustodyError, _>(who, who, 0, |frame| {
                let mut batch = BatchRecorder::new(BatchOperation::EqualNativePayment, 4);
                batch.succeed(10)?;
                batch.fail(frame, Identity::NULL, "invalid recipient");
                batch.skip();
                batch.succeed(5)?;
                Ok(batch.finish(frame))
            })
            .unwrap();

        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.total_count, 4);
        assert_eq!(outcome.total_amount, 15);
        assert_eq!(outcome.failure_count(), 1);
        assert_eq!(outcome.failures().collect::<Vec<_>>(), vec![(1, "invalid recipient")]);

        let topics: Vec<_> = host.logs().into_iter().map(|l| l.topic).collect();
        assert_eq!(topics, ["ElementFailed", "BatchCompleted"]);
    }

    #[test]
    fn recorder_rejects_overflowing_total() {
        let mut batch = BatchRecorder::new(BatchOperation::FungibleTransfer, 2);
        batch.succeed(Amount::MAX).unwrap();
        assert_eq!(batch.succeed(1), Err(CustodyError::Overflow("batch total")));
        assert_eq!(batch.success_count, 1);
        assert_eq!(batch.total_amount, Amount::MAX);
    }
}
