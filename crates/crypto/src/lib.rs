// Path: crates/crypto/src/lib.rs
//! # Tally CSP Crypto Crate Lints
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
        clippy::indexing_slicing
    )
)]
//! # Tally CSP Cryptography
//!
//! The three primitives the CSP is built on: salted org-scoped hashing for
//! identity data, CSPRNG token and challenge-code generation, and the
//! recoverable secp256k1 ECDSA signer whose compressed public key is the
//! published census root.

pub mod ecdsa;
pub mod error;
pub mod hash;
pub mod rand;

pub use ecdsa::CspKey;
pub use error::CryptoError;
