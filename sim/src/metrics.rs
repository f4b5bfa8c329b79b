//! # Prometheus Metrics
//!
//! Counters for one simulator run, printed in the Prometheus text
//! exposition format when `--metrics` is passed.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] under
//! the `custody` namespace.

use custody_contracts::BatchOutcome;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone, Debug)]
pub struct SimMetrics {
    registry: Registry,
    /// Transactions submitted to the host, committed or not.
    pub transactions_total: IntCounter,
    /// Transactions that reverted as a whole.
    pub transactions_reverted_total: IntCounter,
    /// Completed batch calls, by operation.
    pub batches_total: IntCounterVec,
    pub batch_elements_succeeded_total: IntCounter,
    pub batch_elements_failed_total: IntCounter,
    /// Elements per completed batch.
    pub batch_size: Histogram,
}

impl SimMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("custody".into()), None)?;

        let transactions_total = IntCounter::new(
            "transactions_total",
            "Total number of transactions submitted to the host",
        )?;
        registry.register(Box::new(transactions_total.clone()))?;

        let transactions_reverted_total = IntCounter::new(
            "transactions_reverted_total",
            "Total number of transactions that reverted",
        )?;
        registry.register(Box::new(transactions_reverted_total.clone()))?;

        let batches_total = IntCounterVec::new(
            Opts::new("batches_total", "Total number of completed batch calls"),
            &["operation"],
        )?;
        registry.register(Box::new(batches_total.clone()))?;

        let batch_elements_succeeded_total = IntCounter::new(
            "batch_elements_succeeded_total",
            "Total number of batch elements that succeeded",
        )?;
        registry.register(Box::new(batch_elements_succeeded_total.clone()))?;

        let batch_elements_failed_total = IntCounter::new(
            "batch_elements_failed_total",
            "Total number of batch elements that failed",
        )?;
        registry.register(Box::new(batch_elements_failed_total.clone()))?;

        let batch_size = Histogram::with_opts(
            HistogramOpts::new("batch_size", "Number of elements per completed batch call")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0]),
        )?;
        registry.register(Box::new(batch_size.clone()))?;

        Ok(Self {
            registry,
            transactions_total,
            transactions_reverted_total,
            batches_total,
            batch_elements_succeeded_total,
            batch_elements_failed_total,
            batch_size,
        })
    }

    pub fn record_transaction(&self, committed: bool) {
        self.transactions_total.inc();
        if !committed {
            self.transactions_reverted_total.inc();
        }
    }

    pub fn record_batch(&self, outcome: &BatchOutcome) {
        self.batches_total
            .with_label_values(&[&outcome.operation.to_string()])
            .inc();
        self.batch_elements_succeeded_total
            .inc_by(outcome.success_count as u64);
        self.batch_elements_failed_total
            .inc_by(outcome.failure_count() as u64);
        self.batch_size.observe(outcome.total_count as f64);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_contracts::{BatchOperation, ElementOutcome};

    #[test]
    fn batch_is_counted_by_operation() {
        let metrics = SimMetrics::new().unwrap();
        metrics.record_transaction(true);
        metrics.record_transaction(false);
        metrics.record_batch(&BatchOutcome {
            operation: BatchOperation::NativeTransfer,
            elements: vec![
                ElementOutcome::Succeeded { amount: 50 },
                ElementOutcome::Failed {
                    reason: "insufficient balance".into(),
                },
                ElementOutcome::Skipped,
            ],
            success_count: 1,
            total_count: 3,
            total_amount: 50,
        });

        assert_eq!(metrics.transactions_total.get(), 2);
        assert_eq!(metrics.transactions_reverted_total.get(), 1);
        assert_eq!(metrics.batch_elements_succeeded_total.get(), 1);
        assert_eq!(metrics.batch_elements_failed_total.get(), 1);

        let text = metrics.encode().unwrap();
        assert!(text.contains("custody_batches_total{operation=\"native_transfer\"} 1"));
        assert!(text.contains("custody_batch_size_count 1"));
    }
}
