//! Prometheus metrics for the relay
//!
//! Tracks:
//! - Job outcomes and durations
//! - Extractor pool occupancy and exhaustion stalls
//! - Batch delivery results and recovery actions

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter, CounterVec, Gauge,
    Histogram,
};

// ======================
// JOB METRICS
// ======================

/// Finished jobs by outcome
/// Labels: outcome (success/partial/failed/timeout)
pub static JOBS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("relay_jobs_total", "Total number of finished relay jobs", &["outcome"])
        .unwrap_or_else(|e| panic!("relay_jobs_total registration: {}", e))
});

/// Wall-clock time of a single job (extraction + delivery)
pub static JOB_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "relay_job_duration_seconds",
        "Time spent on one relay job",
        vec![0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .unwrap_or_else(|e| panic!("relay_job_duration_seconds registration: {}", e))
});

// ======================
// POOL METRICS
// ======================

/// Extractor handles currently checked out
pub static POOL_IN_USE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("relay_pool_in_use", "Extractor handles currently checked out")
        .unwrap_or_else(|e| panic!("relay_pool_in_use registration: {}", e))
});

/// Times `acquire` kept waiting past the stall warning threshold
pub static POOL_STALLS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "relay_pool_stalls_total",
        "Number of extractor pool exhaustion stalls"
    )
    .unwrap_or_else(|e| panic!("relay_pool_stalls_total registration: {}", e))
});

/// Extractor instances constructed
pub static POOL_CONSTRUCTIONS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("relay_pool_constructions_total", "Extractor instances constructed")
        .unwrap_or_else(|e| panic!("relay_pool_constructions_total registration: {}", e))
});

// ======================
// DELIVERY METRICS
// ======================

/// Batches sent successfully
pub static BATCHES_SENT_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("relay_batches_sent_total", "Media batches delivered")
        .unwrap_or_else(|e| panic!("relay_batches_sent_total registration: {}", e))
});

/// Batches that failed
/// Labels: kind (content_unavailable/generic)
pub static BATCHES_FAILED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("relay_batches_failed_total", "Media batches that failed", &["kind"])
        .unwrap_or_else(|e| panic!("relay_batches_failed_total registration: {}", e))
});

/// Recovery actions taken
/// Labels: action (retry/available/cancel/expired/evicted)
pub static RECOVERY_ACTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "relay_recovery_actions_total",
        "Recovery decisions applied to pending deliveries",
        &["action"]
    )
    .unwrap_or_else(|e| panic!("relay_recovery_actions_total registration: {}", e))
});

/// Forces registration of every metric so they show up before first use.
pub fn init_metrics() {
    Lazy::force(&JOBS_TOTAL);
    Lazy::force(&JOB_DURATION_SECONDS);
    Lazy::force(&POOL_IN_USE);
    Lazy::force(&POOL_STALLS_TOTAL);
    Lazy::force(&POOL_CONSTRUCTIONS_TOTAL);
    Lazy::force(&BATCHES_SENT_TOTAL);
    Lazy::force(&BATCHES_FAILED_TOTAL);
    Lazy::force(&RECOVERY_ACTIONS_TOTAL);
    log::info!("Metrics registry initialized");
}

pub fn record_job(outcome: &str, duration_secs: f64) {
    JOBS_TOTAL.with_label_values(&[outcome]).inc();
    JOB_DURATION_SECONDS.observe(duration_secs);
}

pub fn set_pool_in_use(count: usize) {
    POOL_IN_USE.set(count as f64);
}

pub fn record_pool_stall() {
    POOL_STALLS_TOTAL.inc();
}

pub fn record_pool_construction() {
    POOL_CONSTRUCTIONS_TOTAL.inc();
}

pub fn record_batch_sent() {
    BATCHES_SENT_TOTAL.inc();
}

pub fn record_batch_failed(kind: &str) {
    BATCHES_FAILED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_recovery_action(action: &str) {
    RECOVERY_ACTIONS_TOTAL.with_label_values(&[action]).inc();
}
