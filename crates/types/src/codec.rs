// Path: crates/types/src/codec.rs

//! Defines the canonical binary codec for all stored CSP records.
//!
//! Thin wrappers around `bincode`. Centralizing the codec in the base types
//! crate keeps every store backend on the exact same byte representation, so
//! a record written by one backend decodes in another.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value into its canonical byte representation.
pub fn to_bytes_canonical<T: Serialize>(v: &T) -> Result<Vec<u8>, String> {
    bincode::serialize(v).map_err(|e| format!("canonical encode failed: {}", e))
}

/// Decodes a value from its canonical byte representation.
///
/// Fails fast on any decoding error so malformed stored data is surfaced
/// rather than silently truncated.
pub fn from_bytes_canonical<T: DeserializeOwned>(b: &[u8]) -> Result<T, String> {
    bincode::deserialize(b).map_err(|e| format!("canonical decode failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthToken, TokenState};
    use crate::ids::{BundleId, MemberId, ProcessId, TokenId};

    #[test]
    fn token_roundtrip() {
        let token = AuthToken {
            id: TokenId([9u8; 16]),
            bundle_id: BundleId::from("bundle-1"),
            member_id: MemberId::from("member-1"),
            state: TokenState::Pending,
            created_at: 1_700_000_000_000,
            expires_at: 1_700_000_600_000,
            consumed_processes: vec![ProcessId(vec![1, 2, 3])],
        };
        let bytes = to_bytes_canonical(&token).unwrap();
        let decoded: AuthToken = from_bytes_canonical(&bytes).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(from_bytes_canonical::<AuthToken>(&[0xff, 0x00]).is_err());
    }
}
