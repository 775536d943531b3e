// Path: crates/telemetry/src/prometheus.rs
//! A concrete implementation of the metrics sinks using the Prometheus crate.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec,
};

// --- Metric Statics ---
// OnceCells hold the collectors; `install` initializes them exactly once.

static AUTH_INITIATED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static CHALLENGES_SENT_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static CHALLENGES_VERIFIED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static THROTTLED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static SIGNATURES_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static SIGN_REJECTED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static TOKENS_ISSUED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static TOKENS_SWEPT_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static JOBS_STARTED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static JOBS_COMPLETED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static JOB_ROWS_REJECTED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

/// The Prometheus-backed sink.
#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Helper macro to reduce boilerplate for getting a metric from OnceCell.
/// This will panic if `install()` has not been called, which is intentional
/// as it indicates a critical application setup error.
macro_rules! get_metric {
    ($metric:ident) => {
        $metric.get().expect(
            "Prometheus sink not initialized. Call telemetry::prometheus::install() first.",
        )
    };
}

impl AuthMetricsSink for PrometheusSink {
    fn inc_auth_initiated(&self, outcome: &'static str) {
        get_metric!(AUTH_INITIATED_TOTAL)
            .with_label_values(&[outcome])
            .inc();
    }
    fn inc_challenge_sent(&self, channel: &str) {
        get_metric!(CHALLENGES_SENT_TOTAL)
            .with_label_values(&[channel])
            .inc();
    }
    fn inc_challenge_verified(&self, outcome: &'static str) {
        get_metric!(CHALLENGES_VERIFIED_TOTAL)
            .with_label_values(&[outcome])
            .inc();
    }
    fn inc_throttled(&self, gate: &'static str) {
        get_metric!(THROTTLED_TOTAL).with_label_values(&[gate]).inc();
    }
}

impl SigningMetricsSink for PrometheusSink {
    fn inc_signatures(&self) {
        get_metric!(SIGNATURES_TOTAL).inc();
    }
    fn inc_sign_rejected(&self, reason: &'static str) {
        get_metric!(SIGN_REJECTED_TOTAL)
            .with_label_values(&[reason])
            .inc();
    }
}

impl TokenMetricsSink for PrometheusSink {
    fn inc_tokens_issued(&self) {
        get_metric!(TOKENS_ISSUED_TOTAL).inc();
    }
    fn inc_tokens_swept(&self, count: u64) {
        get_metric!(TOKENS_SWEPT_TOTAL).inc_by(count);
    }
}

impl JobMetricsSink for PrometheusSink {
    fn inc_jobs_started(&self, job_type: &str) {
        get_metric!(JOBS_STARTED_TOTAL)
            .with_label_values(&[job_type])
            .inc();
    }
    fn inc_jobs_completed(&self, job_type: &str) {
        get_metric!(JOBS_COMPLETED_TOTAL)
            .with_label_values(&[job_type])
            .inc();
    }
    fn inc_job_rows_rejected(&self, count: u64) {
        get_metric!(JOB_ROWS_REJECTED_TOTAL).inc_by(count);
    }
}

impl ErrorMetricsSink for PrometheusSink {
    fn inc_error(&self, kind: &'static str, variant: &'static str) {
        get_metric!(ERRORS_TOTAL)
            .with_label_values(&[kind, variant])
            .inc();
    }
}

impl MetricsSink for PrometheusSink {}

/// Initializes all Prometheus collectors and returns a static reference to
/// the sink. Must be called only once at application startup.
#[allow(clippy::expect_used)]
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    AUTH_INITIATED_TOTAL
        .set(register_int_counter_vec!(
            "tally_csp_auth_initiated_total",
            "Total initiate_auth calls by outcome.",
            &["outcome"]
        )?)
        .expect("static already initialized");
    CHALLENGES_SENT_TOTAL
        .set(register_int_counter_vec!(
            "tally_csp_challenges_sent_total",
            "Total challenges handed to the notifier, by channel.",
            &["channel"]
        )?)
        .expect("static already initialized");
    CHALLENGES_VERIFIED_TOTAL
        .set(register_int_counter_vec!(
            "tally_csp_challenges_verified_total",
            "Total challenge verifications by outcome.",
            &["outcome"]
        )?)
        .expect("static already initialized");
    THROTTLED_TOTAL
        .set(register_int_counter_vec!(
            "tally_csp_throttled_total",
            "Total requests rejected by a throttle gate.",
            &["gate"]
        )?)
        .expect("static already initialized");
    SIGNATURES_TOTAL
        .set(register_int_counter!(
            "tally_csp_signatures_total",
            "Total signatures produced."
        )?)
        .expect("static already initialized");
    SIGN_REJECTED_TOTAL
        .set(register_int_counter_vec!(
            "tally_csp_sign_rejected_total",
            "Total rejected sign calls by reason.",
            &["reason"]
        )?)
        .expect("static already initialized");
    TOKENS_ISSUED_TOTAL
        .set(register_int_counter!(
            "tally_csp_tokens_issued_total",
            "Total auth tokens issued."
        )?)
        .expect("static already initialized");
    TOKENS_SWEPT_TOTAL
        .set(register_int_counter!(
            "tally_csp_tokens_swept_total",
            "Total expired tokens removed by the sweeper."
        )?)
        .expect("static already initialized");
    JOBS_STARTED_TOTAL
        .set(register_int_counter_vec!(
            "tally_csp_jobs_started_total",
            "Total background jobs started, by type.",
            &["type"]
        )?)
        .expect("static already initialized");
    JOBS_COMPLETED_TOTAL
        .set(register_int_counter_vec!(
            "tally_csp_jobs_completed_total",
            "Total background jobs completed, by type.",
            &["type"]
        )?)
        .expect("static already initialized");
    JOB_ROWS_REJECTED_TOTAL
        .set(register_int_counter!(
            "tally_csp_job_rows_rejected_total",
            "Total rows rejected by job-side validation."
        )?)
        .expect("static already initialized");
    ERRORS_TOTAL
        .set(register_int_counter_vec!(
            "tally_csp_errors_total",
            "Total errors by kind and variant code.",
            &["kind", "variant"]
        )?)
        .expect("static already initialized");

    static SINK_IMPL: PrometheusSink = PrometheusSink;
    let sink: &'static dyn MetricsSink = &SINK_IMPL;
    let _ = crate::sinks::SINK.set(sink);
    Ok(sink)
}
