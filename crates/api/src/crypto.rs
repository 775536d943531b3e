// Path: crates/api/src/crypto.rs

//! The signing contract the CSP key fulfils.

use thiserror::Error;

/// Errors surfaced by the signer.
#[derive(Debug, Error)]
pub enum SignerError {
    /// The configured key material could not be used.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    /// The signing operation itself failed.
    #[error("signing failed: {0}")]
    Signing(String),
}

/// A long-lived signing identity producing recoverable ECDSA signatures.
///
/// The compressed public key doubles as the census root published for every
/// group-based census: proving a signature recovers to this key proves the
/// signer was the CSP.
pub trait CspSigner: Send + Sync {
    /// Signs a message, returning the 65-byte `r || s || v` signature.
    fn sign_recoverable(&self, msg: &[u8]) -> Result<[u8; 65], SignerError>;

    /// Returns the 33-byte compressed public key.
    fn public_key(&self) -> [u8; 33];
}
