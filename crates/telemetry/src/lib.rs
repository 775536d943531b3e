// Path: crates/telemetry/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # Tally CSP Telemetry
//!
//! Observability infrastructure for the CSP: structured logging
//! initialization, abstract metrics sinks the engines report into, a
//! Prometheus implementation of those sinks, and a lightweight HTTP endpoint
//! exposing them.
//!
//! Engines never log challenge codes, salts, or key material; the sinks only
//! carry counters and coarse labels.

/// A lightweight HTTP server for `/metrics`, `/healthz`, and `/readyz`.
pub mod http;
/// The initialization routine for global structured logging.
pub mod init;
/// The concrete implementation of metrics sinks using the `prometheus` crate.
pub mod prometheus;
/// Abstract traits (`*MetricsSink`) that define the contract for metrics
/// reporting.
pub mod sinks;

pub use sinks::{auth_metrics, error_metrics, job_metrics, signing_metrics, token_metrics};
