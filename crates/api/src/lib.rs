// Path: crates/api/src/lib.rs

//! # Tally CSP API Crate Lints
//!
//! This crate enforces a strict set of lints to ensure high-quality,
//! panic-free, and well-documented code. Panics are disallowed in non-test
//! code to promote robust error handling.
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

//! # Tally CSP API
//!
//! Abstract contracts between the CSP engines and their collaborators. The
//! engines in `tally-csp` are written purely against these traits; concrete
//! backends (the redb store, the in-memory test store, delivery providers,
//! the secp256k1 signer) live in sibling crates.

/// The admin role predicate injected by the caller.
pub mod access;
/// The signing contract the CSP key fulfils.
pub mod crypto;
/// Abstract challenge delivery.
pub mod notifier;
/// The persistence contract.
pub mod store;

pub use access::{AllowAll, OrgRole, RoleChecker};
pub use crypto::{CspSigner, SignerError};
pub use notifier::{Notification, Notifier, NotifyError};
pub use store::CensusStore;
