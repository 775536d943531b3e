// Path: crates/telemetry/src/sinks.rs
//! Defines abstract traits for metrics reporting, decoupling the engines
//! from the backend.

use once_cell::sync::OnceCell;

// --- Static Sink Access ---

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global sink implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns a static reference to the configured auth metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn auth_metrics() -> &'static dyn AuthMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured signing metrics sink.
pub fn signing_metrics() -> &'static dyn SigningMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured token metrics sink.
pub fn token_metrics() -> &'static dyn TokenMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured job metrics sink.
pub fn job_metrics() -> &'static dyn JobMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured error metrics sink.
pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

// --- Trait Definitions ---

/// A sink for metrics of the two-step authentication flow.
pub trait AuthMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter for `initiate_auth` calls, labeled by outcome
    /// (`ok`, `unauthorized`, `bad_request`, `throttled`, `error`).
    fn inc_auth_initiated(&self, outcome: &'static str);
    /// Increments the counter for delivered challenges, labeled by channel.
    fn inc_challenge_sent(&self, channel: &str);
    /// Increments the counter for challenge verifications, labeled by
    /// outcome (`ok`, `invalid`, `expired`, `exhausted`).
    fn inc_challenge_verified(&self, outcome: &'static str);
    /// Increments the counter for throttle rejections, labeled by which gate
    /// fired (`address`, `cooldown`).
    fn inc_throttled(&self, gate: &'static str);
}
impl AuthMetricsSink for NopSink {
    fn inc_auth_initiated(&self, _outcome: &'static str) {}
    fn inc_challenge_sent(&self, _channel: &str) {}
    fn inc_challenge_verified(&self, _outcome: &'static str) {}
    fn inc_throttled(&self, _gate: &'static str) {}
}

/// A sink for metrics of the signing engine.
pub trait SigningMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter of signatures produced.
    fn inc_signatures(&self);
    /// Increments the counter of rejected sign calls, labeled by reason
    /// (`not_verified`, `not_in_bundle`, `consumed`, `not_participant`).
    fn inc_sign_rejected(&self, reason: &'static str);
}
impl SigningMetricsSink for NopSink {
    fn inc_signatures(&self) {}
    fn inc_sign_rejected(&self, _reason: &'static str) {}
}

/// A sink for metrics of the token lifecycle.
pub trait TokenMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter of issued tokens.
    fn inc_tokens_issued(&self);
    /// Increments the counter of tokens removed by the TTL sweeper.
    fn inc_tokens_swept(&self, count: u64);
}
impl TokenMetricsSink for NopSink {
    fn inc_tokens_issued(&self) {}
    fn inc_tokens_swept(&self, _count: u64) {}
}

/// A sink for metrics of the background job engine.
pub trait JobMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter of started jobs, labeled by job type.
    fn inc_jobs_started(&self, job_type: &str);
    /// Increments the counter of completed jobs, labeled by job type.
    fn inc_jobs_completed(&self, job_type: &str);
    /// Increments the counter of rows rejected by job-side validation.
    fn inc_job_rows_rejected(&self, count: u64);
}
impl JobMetricsSink for NopSink {
    fn inc_jobs_started(&self, _job_type: &str) {}
    fn inc_jobs_completed(&self, _job_type: &str) {}
    fn inc_job_rows_rejected(&self, _count: u64) {}
}

/// A sink for counting errors by kind and variant.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for an error, labeled by kind and variant code.
    fn inc_error(&self, kind: &'static str, variant: &'static str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _kind: &'static str, _variant: &'static str) {}
}

/// The combined sink contract a backend implements.
pub trait MetricsSink:
    AuthMetricsSink + SigningMetricsSink + TokenMetricsSink + JobMetricsSink + ErrorMetricsSink
{
}
impl MetricsSink for NopSink {}
