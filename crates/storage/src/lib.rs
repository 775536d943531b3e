// Path: crates/storage/src/lib.rs
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

//! Pure-Rust persistent storage (redb) for the Tally CSP.
//!
//! One database file, one table per record family, values in the canonical
//! binary codec. Conditional updates (token consumption, challenge rotation,
//! verify CAS) are single redb write transactions; redb serializes writers,
//! which is what gives those operations their linearizability.

pub mod redb_store;

pub use redb_store::RedbCensusStore;
