//! Prometheus metrics for monitoring
//!
//! Exposes counters for the transaction lifecycle, rollbacks by reason,
//! prepare failures by store, and reaper activity. No exporter is started
//! here; embedding applications scrape via `prometheus::gather()`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_int_gauge, Counter,
    CounterVec, Histogram, IntGauge,
};

lazy_static! {
    pub static ref TX_BEGUN: Counter = register_counter!(
        "kgtx_transactions_begun_total",
        "Total transactions started"
    )
    .unwrap();

    pub static ref TX_COMMITTED: Counter = register_counter!(
        "kgtx_transactions_committed_total",
        "Total transactions committed on both stores"
    )
    .unwrap();

    pub static ref TX_FAILED: Counter = register_counter!(
        "kgtx_transactions_failed_total",
        "Total transactions failed in the first commit phase"
    )
    .unwrap();

    pub static ref TX_ROLLED_BACK: CounterVec = register_counter_vec!(
        "kgtx_transactions_rolled_back_total",
        "Total transactions rolled back, by reason",
        &["reason"]
    )
    .unwrap();

    pub static ref PREPARE_FAILURES: CounterVec = register_counter_vec!(
        "kgtx_prepare_failures_total",
        "Total prepare-phase failures, by store",
        &["store"]
    )
    .unwrap();

    pub static ref PARTIAL_FAILURES: Counter = register_counter!(
        "kgtx_partial_failures_total",
        "Total second-phase commit failures requiring reconciliation"
    )
    .unwrap();

    pub static ref TX_REAPED: Counter = register_counter!(
        "kgtx_transactions_reaped_total",
        "Total expired transactions rolled back by the reaper"
    )
    .unwrap();

    pub static ref TX_PURGED: Counter = register_counter!(
        "kgtx_transactions_purged_total",
        "Total terminal records removed by retention cleanup"
    )
    .unwrap();

    pub static ref TX_IN_FLIGHT: IntGauge = register_int_gauge!(
        "kgtx_transactions_in_flight",
        "Transactions currently in a non-terminal state"
    )
    .unwrap();

    pub static ref COMMIT_LATENCY: Histogram = register_histogram!(
        "kgtx_commit_latency_seconds",
        "Duration of the two-store commit phase",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();
}

// Helper functions to record metrics

pub fn record_tx_begun() {
    TX_BEGUN.inc();
    TX_IN_FLIGHT.inc();
}

pub fn record_tx_committed(latency_secs: f64) {
    TX_COMMITTED.inc();
    TX_IN_FLIGHT.dec();
    COMMIT_LATENCY.observe(latency_secs);
}

pub fn record_tx_failed() {
    TX_FAILED.inc();
    TX_IN_FLIGHT.dec();
}

pub fn record_tx_rolled_back(reason: &str) {
    TX_ROLLED_BACK.with_label_values(&[reason]).inc();
    TX_IN_FLIGHT.dec();
}

pub fn record_prepare_failure(store: &str) {
    PREPARE_FAILURES.with_label_values(&[store]).inc();
}

pub fn record_partial_failure() {
    PARTIAL_FAILURES.inc();
    TX_IN_FLIGHT.dec();
}

pub fn record_tx_reaped(count: usize) {
    TX_REAPED.inc_by(count as f64);
}

pub fn record_tx_purged(count: usize) {
    TX_PURGED.inc_by(count as f64);
}
