// Path: crates/types/src/lib.rs
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

//! # Tally CSP Types
//!
//! Domain data structures shared by every crate of the Tally Credential
//! Service Provider: organization members, censuses and their participants,
//! voting processes and process bundles, authentication tokens, challenge
//! records, background jobs, configuration, and the error taxonomy.
//!
//! This crate deliberately contains no I/O and no cryptography; it is the
//! stable vocabulary the engine and storage crates agree on.

/// Authentication tokens and one-time challenge records.
pub mod auth;
/// Censuses, auth field enums, and census participants.
pub mod census;
/// Canonical binary codec for stored records.
pub mod codec;
/// Configuration structures for the CSP runtime.
pub mod config;
/// Voting processes, process bundles, and per-process member status.
pub mod election;
/// Error types and their stable codes and wire projection.
pub mod error;
/// Opaque identifier newtypes.
pub mod ids;
/// Background census-materialization jobs.
pub mod job;
/// Organization members and voter-supplied identity data.
pub mod member;
/// Wall-clock helpers shared by the engines.
pub mod time;
