// Path: crates/crypto/src/ecdsa/mod.rs

//! The CSP signing key: recoverable secp256k1 ECDSA.
//!
//! Signatures are the 65-byte `r || s || v` form so a verifier can recover
//! the signing key from the signature alone and compare it against the
//! published census root. The message is hashed with SHA-256 before signing.

use crate::error::CryptoError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use tally_api::crypto::{CspSigner, SignerError};

/// The byte length of a recoverable signature.
pub const SIGNATURE_LEN: usize = 65;
/// The byte length of a compressed public key.
pub const PUBKEY_LEN: usize = 33;

/// The CSP's long-lived signing key.
///
/// Loaded once at startup from configured material and shared read-only
/// afterwards. The compressed public key is the census root published for
/// every group-based census.
#[derive(Clone)]
pub struct CspKey {
    signing: SigningKey,
    public: [u8; PUBKEY_LEN],
}

impl CspKey {
    /// Loads a key from its 32-byte scalar representation.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, CryptoError> {
        if raw.len() != 32 {
            return Err(CryptoError::InvalidLength {
                expected: 32,
                got: raw.len(),
            });
        }
        let signing = SigningKey::from_slice(raw)
            .map_err(|e| CryptoError::InvalidKey(format!("not a valid secp256k1 scalar: {}", e)))?;
        let public = compress(signing.verifying_key())?;
        Ok(Self { signing, public })
    }

    /// Loads a key from a hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let raw = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| CryptoError::InvalidKey(format!("not hex: {}", e)))?;
        Self::from_bytes(&raw)
    }

    /// Generates a fresh key. Test and bootstrap use only.
    pub fn generate() -> Result<Self, CryptoError> {
        let signing = SigningKey::random(&mut OsRng);
        let public = compress(signing.verifying_key())?;
        Ok(Self { signing, public })
    }

    /// The compressed public key as a hex string, as published for census
    /// roots.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public)
    }
}

impl std::fmt::Debug for CspKey {
    /// Shows only the public half.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CspKey({})", self.public_key_hex())
    }
}

impl CspSigner for CspKey {
    fn sign_recoverable(&self, msg: &[u8]) -> Result<[u8; SIGNATURE_LEN], SignerError> {
        let (sig, recid) = self
            .signing
            .sign_recoverable(msg)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(pack(&sig, recid))
    }

    fn public_key(&self) -> [u8; PUBKEY_LEN] {
        self.public
    }
}

fn compress(key: &VerifyingKey) -> Result<[u8; PUBKEY_LEN], CryptoError> {
    let point = key.to_encoded_point(true);
    point
        .as_bytes()
        .try_into()
        .map_err(|_| CryptoError::InvalidLength {
            expected: PUBKEY_LEN,
            got: point.as_bytes().len(),
        })
}

fn pack(sig: &Signature, recid: RecoveryId) -> [u8; SIGNATURE_LEN] {
    let mut out = [0u8; SIGNATURE_LEN];
    let (rs, v) = out.split_at_mut(64);
    rs.copy_from_slice(&sig.to_bytes());
    if let Some(last) = v.first_mut() {
        *last = recid.to_byte();
    }
    out
}

/// Recovers the compressed public key that produced a 65-byte signature over
/// `msg`. Used by verifiers and tests; the CSP itself only signs.
pub fn recover_public_key(msg: &[u8], signature: &[u8]) -> Result<[u8; PUBKEY_LEN], CryptoError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(CryptoError::InvalidLength {
            expected: SIGNATURE_LEN,
            got: signature.len(),
        });
    }
    let (rs, v) = signature.split_at(64);
    let sig = Signature::from_slice(rs)
        .map_err(|e| CryptoError::OperationFailed(format!("malformed signature: {}", e)))?;
    let recid_byte = v.first().copied().unwrap_or_default();
    let recid = RecoveryId::from_byte(recid_byte)
        .ok_or_else(|| CryptoError::OperationFailed("invalid recovery id".to_string()))?;
    let key = VerifyingKey::recover_from_msg(msg, &sig, recid)
        .map_err(|e| CryptoError::OperationFailed(format!("recovery failed: {}", e)))?;
    compress(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_recover() {
        let key = CspKey::generate().unwrap();
        let msg = b"process-id-bytes || payload";
        let sig = key.sign_recoverable(msg).unwrap();
        assert_eq!(sig.len(), SIGNATURE_LEN);

        let recovered = recover_public_key(msg, &sig).unwrap();
        assert_eq!(recovered, key.public_key());
    }

    #[test]
    fn recovery_fails_for_other_message() {
        let key = CspKey::generate().unwrap();
        let sig = key.sign_recoverable(b"message a").unwrap();
        let recovered = recover_public_key(b"message b", &sig);
        // Recovery either fails outright or yields a different key.
        match recovered {
            Ok(pk) => assert_ne!(pk, key.public_key()),
            Err(_) => {}
        }
    }

    #[test]
    fn key_roundtrips_through_hex() {
        let key = CspKey::generate().unwrap();
        let raw = key.signing.to_bytes();
        let reloaded = CspKey::from_hex(&hex::encode(raw)).unwrap();
        assert_eq!(reloaded.public_key(), key.public_key());
    }

    #[test]
    fn rejects_bad_material() {
        assert!(CspKey::from_bytes(&[0u8; 16]).is_err());
        assert!(CspKey::from_bytes(&[0u8; 32]).is_err()); // zero scalar
        assert!(CspKey::from_hex("zz").is_err());
    }
}
