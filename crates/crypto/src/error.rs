// Path: crates/crypto/src/error.rs

//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors produced by the crypto primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material could not be parsed or used.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// The input had an unexpected length.
    #[error("invalid length: expected {expected}, got {got}")]
    InvalidLength {
        /// The expected byte length.
        expected: usize,
        /// The length actually supplied.
        got: usize,
    },
    /// A cryptographic operation failed.
    #[error("operation failed: {0}")]
    OperationFailed(String),
}
