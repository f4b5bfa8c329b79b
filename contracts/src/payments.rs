//! # Batch Payment Processor
//!
//! Pays many recipients in one call, straight from the caller's own funds:
//! the value attached to the call for native currency, the caller's
//! allowance for fungible tokens. There is no owner; anyone may use it.
//!
//! ## Native payments
//!
//! The attached value must match the batch total exactly. Each recipient
//! gets a value call capped by [`PAYMENT_CALL_STIPEND`], so a recipient
//! that burns computation in its receive handler fails its own element and
//! nothing else. Whatever was not delivered goes back to the caller. If
//! that refund fails the whole call reverts; the processor never keeps
//! funds.
//!
//! ## Token payments
//!
//! Each element is a `transferFrom(caller, recipient, amount)` on the token.
//! A revert is recorded with the token's own reason, or `"unknown error"`
//! when it gave none.

use custody_protocol::config::PAYMENT_CALL_STIPEND;
use custody_protocol::tokens::FungibleTokenRef;
use custody_protocol::{Amount, CallBudget, Contract, Frame, Identity, Message, Output, Revert};

use crate::batch::{check_batch_len, check_not_null, check_paired, BatchOutcome, BatchRecorder};
use crate::error::CustodyError;
use crate::events::{BatchOperation, CustodyEvent};
use crate::reentrancy::{LockGuard, ReentrancyLock};

const INVALID_RECIPIENT: &str = "invalid recipient: null identity";
const RETURNED_FALSE: &str = "transfer returned false";

#[derive(Debug)]
pub struct BatchPaymentProcessor {
    address: Identity,
    lock: ReentrancyLock,
}

impl BatchPaymentProcessor {
    pub fn new(address: Identity) -> Self {
        Self {
            address,
            lock: ReentrancyLock::new(),
        }
    }

    pub fn address(&self) -> Identity {
        self.address
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    fn enter(&self, frame: &Frame<'_>) -> Result<LockGuard<'_>, CustodyError> {
        let guard = self.lock.enter()?;
        if frame.address() != self.address {
            return Err(CustodyError::Unauthorized {
                caller: frame.caller(),
            });
        }
        Ok(guard)
    }

    /// Pays `amount` to every recipient. The attached value must be
    /// exactly `amount × recipients.len()`. A zero `amount` is rejected
    /// with [`CustodyError::InvalidInput`].
    pub fn pay_equal_native(
        &self,
        frame: &Frame<'_>,
        recipients: &[Identity],
        amount: Amount,
    ) -> Result<BatchOutcome, CustodyError> {
        let _guard = self.enter(frame)?;
        check_batch_len(recipients.len())?;
        if amount == 0 {
            return Err(CustodyError::InvalidInput("amount must be positive".into()));
        }
        let required = Amount::try_from(recipients.len())
            .ok()
            .and_then(|n| amount.checked_mul(n))
            .ok_or_else(|| CustodyError::InvalidInput("total payment overflows".into()))?;
        check_attached(frame, required)?;

        let amounts = vec![amount; recipients.len()];
        self.pay_native(frame, BatchOperation::EqualNativePayment, recipients, &amounts)
    }

    /// Pays `amounts[i]` to `recipients[i]`. The attached value must equal
    /// the sum. Zero amounts are skipped.
    pub fn pay_variable_native(
        &self,
        frame: &Frame<'_>,
        recipients: &[Identity],
        amounts: &[Amount],
    ) -> Result<BatchOutcome, CustodyError> {
        let _guard = self.enter(frame)?;
        check_paired(recipients.len(), amounts.len())?;
        check_batch_len(recipients.len())?;
        let required = amounts
            .iter()
            .try_fold(0 as Amount, |sum, a| sum.checked_add(*a))
            .ok_or_else(|| CustodyError::InvalidInput("total payment overflows".into()))?;
        check_attached(frame, required)?;

        self.pay_native(frame, BatchOperation::VariableNativePayment, recipients, amounts)
    }

    fn pay_native(
        &self,
        frame: &Frame<'_>,
        operation: BatchOperation,
        recipients: &[Identity],
        amounts: &[Amount],
    ) -> Result<BatchOutcome, CustodyError> {
        let mut batch = BatchRecorder::new(operation, recipients.len());
        let mut sent: Amount = 0;

        for (&recipient, &amount) in recipients.iter().zip(amounts) {
            if amount == 0 {
                batch.skip();
                continue;
            }
            if recipient.is_null() {
                batch.fail(frame, recipient, INVALID_RECIPIENT);
                continue;
            }
            match frame.send(recipient, amount, CallBudget::Stipend(PAYMENT_CALL_STIPEND)) {
                Ok(()) => {
                    sent = sent
                        .checked_add(amount)
                        .ok_or(CustodyError::Overflow("amount sent"))?;
                    frame.emit(&CustodyEvent::PaymentSent {
                        token: None,
                        recipient,
                        amount,
                    });
                    batch.succeed(amount)?;
                }
                Err(revert) => batch.fail(frame, recipient, revert.reason_or_unknown()),
            }
        }

        let refund = frame
            .value()
            .checked_sub(sent)
            .ok_or(CustodyError::Overflow("refund"))?;
        if refund > 0 {
            let payer = frame.caller();
            frame
                .send(payer, refund, CallBudget::Forward)
                .map_err(|revert| CustodyError::TransferFailed {
                    to: payer,
                    reason: revert.reason_or_unknown().to_string(),
                })?;
            tracing::info!(processor = %self.address, %payer, refund, "unspent value refunded");
            frame.emit(&CustodyEvent::Refunded { to: payer, amount: refund });
        }

        Ok(batch.finish(frame))
    }

    /// Pays `amount` of `token` to every recipient from the caller's
    /// allowance.
    ///
    /// As with [`pay_equal_native`](Self::pay_equal_native), a zero
    /// `amount` is rejected with [`CustodyError::InvalidInput`]. The
    /// variable paths skip zero elements instead.
    pub fn pay_equal_fungible(
        &self,
        frame: &Frame<'_>,
        token: Identity,
        recipients: &[Identity],
        amount: Amount,
    ) -> Result<BatchOutcome, CustodyError> {
        let _guard = self.enter(frame)?;
        check_batch_len(recipients.len())?;
        check_not_null(token, "token")?;
        if amount == 0 {
            return Err(CustodyError::InvalidInput("amount must be positive".into()));
        }

        let amounts = vec![amount; recipients.len()];
        self.pay_fungible(frame, BatchOperation::EqualFungiblePayment, token, recipients, &amounts)
    }

    /// Pays `amounts[i]` of `token` to `recipients[i]` from the caller's
    /// allowance. Zero amounts are skipped.
    pub fn pay_variable_fungible(
        &self,
        frame: &Frame<'_>,
        token: Identity,
        recipients: &[Identity],
        amounts: &[Amount],
    ) -> Result<BatchOutcome, CustodyError> {
        let _guard = self.enter(frame)?;
        check_paired(recipients.len(), amounts.len())?;
        check_batch_len(recipients.len())?;
        check_not_null(token, "token")?;

        self.pay_fungible(frame, BatchOperation::VariableFungiblePayment, token, recipients, amounts)
    }

    fn pay_fungible(
        &self,
        frame: &Frame<'_>,
        operation: BatchOperation,
        token: Identity,
        recipients: &[Identity],
        amounts: &[Amount],
    ) -> Result<BatchOutcome, CustodyError> {
        let payer = frame.caller();
        let client = FungibleTokenRef::at(token);
        let mut batch = BatchRecorder::new(operation, recipients.len());

        for (&recipient, &amount) in recipients.iter().zip(amounts) {
            if amount == 0 {
                batch.skip();
                continue;
            }
            if recipient.is_null() {
                batch.fail(frame, recipient, INVALID_RECIPIENT);
                continue;
            }
            match client.transfer_from(frame, payer, recipient, amount) {
                Ok(true) => {
                    frame.emit(&CustodyEvent::PaymentSent {
                        token: Some(token),
                        recipient,
                        amount,
                    });
                    batch.succeed(amount)?;
                }
                Ok(false) => batch.fail(frame, recipient, RETURNED_FALSE),
                Err(revert) => batch.fail(frame, recipient, revert.reason_or_unknown()),
            }
        }
        Ok(batch.finish(frame))
    }
}

fn check_attached(frame: &Frame<'_>, required: Amount) -> Result<(), CustodyError> {
    if frame.value() != required {
        return Err(CustodyError::InvalidInput(format!(
            "attached value {} does not match required {required}",
            frame.value()
        )));
    }
    Ok(())
}

impl Contract for BatchPaymentProcessor {
    fn handle(&self, _frame: &Frame<'_>, message: &Message) -> Result<Output, Revert> {
        Err(Revert::new(format!(
            "payment processor does not handle {} messages",
            message.kind()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_protocol::Host;
    use std::sync::Arc;

    fn id(label: &str) -> Identity {
        Identity::from_label(label)
    }

    fn setup() -> (Host, Arc<BatchPaymentProcessor>) {
        let host = Host::new();
        let processor = host
            .deploy::<_, Revert, _>(id("deployer"), |address| Ok(BatchPaymentProcessor::new(address)))
            .unwrap();
        host.fund(id("payer"), 1_000).unwrap();
        (host, processor)
    }

    #[test]
    fn exact_value_is_required() {
        let (host, processor) = setup();
        let recipients = [id("a"), id("b"), id("c")];
        for value in [29, 31] {
            let err = host
                .transact(id("payer"), processor.address(), value, |f| {
                    processor.pay_equal_native(f, &recipients, 10)
                })
                .unwrap_err();
            assert!(matches!(err, CustodyError::InvalidInput(_)));
        }
        assert_eq!(host.balance_of(&id("payer")), 1_000);
        assert_eq!(host.balance_of(&processor.address()), 0);
    }

    #[test]
    fn zero_equal_amount_is_invalid() {
        let (host, processor) = setup();
        let err = host
            .transact(id("payer"), processor.address(), 0, |f| {
                processor.pay_equal_native(f, &[id("a")], 0)
            })
            .unwrap_err();
        assert_eq!(err, CustodyError::InvalidInput("amount must be positive".into()));
    }

    #[test]
    fn overflowing_total_is_invalid() {
        let (host, processor) = setup();
        let err = host
            .transact(id("payer"), processor.address(), 0, |f| {
                processor.pay_variable_native(f, &[id("a"), id("b")], &[Amount::MAX, 1])
            })
            .unwrap_err();
        assert_eq!(err, CustodyError::InvalidInput("total payment overflows".into()));
    }

    #[test]
    fn variable_payment_skips_zero_amounts() {
        let (host, processor) = setup();
        let outcome = host
            .transact(id("payer"), processor.address(), 15, |f| {
                processor.pay_variable_native(f, &[id("a"), id("b"), id("c")], &[5, 0, 10])
            })
            .unwrap();
        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.failure_count(), 0);
        assert_eq!(outcome.total_amount, 15);
        assert_eq!(outcome.elements[1], crate::batch::ElementOutcome::Skipped);
        assert_eq!(host.balance_of(&id("b")), 0);
        assert_eq!(host.balance_of(&id("payer")), 985);
    }

    #[test]
    fn null_recipient_value_is_refunded() {
        let (host, processor) = setup();
        let outcome = host
            .transact(id("payer"), processor.address(), 20, |f| {
                processor.pay_equal_native(f, &[id("a"), Identity::NULL], 10)
            })
            .unwrap();
        assert_eq!(outcome.success_count, 1);
        assert_eq!(host.balance_of(&id("payer")), 990);
        assert_eq!(host.balance_of(&processor.address()), 0);

        let events: Vec<_> = host.logs().iter().filter_map(CustodyEvent::from_log).collect();
        assert!(events.contains(&CustodyEvent::Refunded {
            to: id("payer"),
            amount: 10
        }));
    }

    #[test]
    fn direct_deposit_is_rejected() {
        let (host, processor) = setup();
        assert!(host.send(id("payer"), processor.address(), 1).is_err());
        assert_eq!(host.balance_of(&id("payer")), 1_000);
    }

    #[test]
    fn null_token_is_rejected() {
        let (host, processor) = setup();
        let err = host
            .transact(id("payer"), processor.address(), 0, |f| {
                processor.pay_equal_fungible(f, Identity::NULL, &[id("a")], 1)
            })
            .unwrap_err();
        assert_eq!(err, CustodyError::InvalidIdentity("token"));
    }
}
