//! Metrics collection for observability
//!
//! Prometheus metrics for the ledger writer, kept in a private registry so
//! several ledgers can live in one process (tests open many).
//!
//! # Metrics
//!
//! - `ledger_deposits_total` - Committed deposits
//! - `ledger_withdrawals_total` - Committed withdrawals
//! - `ledger_transfers_total` - Committed transfers
//! - `ledger_rejected_total` - Requests rejected by validation or balance checks
//! - `ledger_commit_retries_total` - Commits retried on a transient storage status
//! - `ledger_commit_duration_seconds` - Histogram of commit latencies

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Committed deposits
    pub deposits_total: IntCounter,

    /// Committed withdrawals
    pub withdrawals_total: IntCounter,

    /// Committed transfers
    pub transfers_total: IntCounter,

    /// Rejected requests
    pub rejected_total: IntCounter,

    /// Commit retries
    pub commit_retries_total: IntCounter,

    /// Commit duration histogram
    pub commit_duration: Histogram,

    /// Prometheus registry
    registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let deposits_total = IntCounter::new("ledger_deposits_total", "Committed deposits")?;
        registry.register(Box::new(deposits_total.clone()))?;

        let withdrawals_total =
            IntCounter::new("ledger_withdrawals_total", "Committed withdrawals")?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let transfers_total = IntCounter::new("ledger_transfers_total", "Committed transfers")?;
        registry.register(Box::new(transfers_total.clone()))?;

        let rejected_total = IntCounter::new(
            "ledger_rejected_total",
            "Requests rejected by validation or balance checks",
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let commit_retries_total = IntCounter::new(
            "ledger_commit_retries_total",
            "Commits retried on a transient storage status",
        )?;
        registry.register(Box::new(commit_retries_total.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_commit_duration_seconds",
                "Histogram of commit latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        Ok(Self {
            deposits_total,
            withdrawals_total,
            transfers_total,
            rejected_total,
            commit_retries_total,
            commit_duration,
            registry,
        })
    }

    /// Record a rejected request
    pub fn record_rejected(&self) {
        self.rejected_total.inc();
    }

    /// Record a commit retry
    pub fn record_retry(&self) {
        self.commit_retries_total.inc();
    }

    /// Record commit duration
    pub fn record_commit_duration(&self, duration_seconds: f64) {
        self.commit_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of everything in the registry
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
