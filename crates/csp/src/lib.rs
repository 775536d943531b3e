// Path: crates/csp/src/lib.rs
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

//! # Tally CSP Core
//!
//! The engines of the Credential Service Provider: the two-step
//! authentication state machine over hashed member records, one-time
//! challenge issuance and verification with throttling, the auth-token
//! lifecycle with per-process single-use enforcement, ECDSA signing of
//! per-process payloads, and the background job engine that materializes
//! censuses from member groups.
//!
//! Everything here is written against the `tally-api` contracts; wire a
//! store, a notifier, a signer, and a role predicate into [`Csp::start`] and
//! the public operations of [`service::Csp`] are the whole surface.

/// The two-step authentication state machine.
pub mod auth;
/// Per-bundle member status.
pub mod bundle;
/// Background job execution with a bounded worker pool.
pub mod jobs;
/// One-time challenge issuance and verification.
pub mod otp;
/// Census materialization, validation, and member ingestion.
pub mod publish;
/// The public operations facade.
pub mod service;
/// Payload signing with per-process consumption.
pub mod signing;
/// In-memory minimum-interval gates.
pub mod throttle;
/// The auth-token lifecycle and the TTL sweeper.
pub mod token;

pub use service::{Csp, IngestionOutcome, PublishOutcome};
