// Path: crates/types/src/error/mod.rs

//! Error types for the Tally CSP.
//!
//! The voter- and admin-facing taxonomy is deliberately small: identity
//! mismatches of any kind collapse into `Unauthorized` so a caller probing the
//! census learns nothing about which field failed, while malformed requests
//! (a missing contact for a census that requires one) stay distinguishable as
//! `BadRequest`.

use crate::ids::MemberId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors produced by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A generic error originating from the underlying store backend.
    #[error("backend error: {0}")]
    Backend(String),
    /// An error occurred while serializing data for storage.
    #[error("encode error: {0}")]
    Encode(String),
    /// An error occurred while deserializing data from storage.
    #[error("decode error: {0}")]
    Decode(String),
    /// The requested record was not found.
    #[error("not found")]
    NotFound,
    /// A conditional update found the record in a conflicting state.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "STORE_BACKEND_ERROR",
            Self::Encode(_) => "STORE_ENCODE_ERROR",
            Self::Decode(_) => "STORE_DECODE_ERROR",
            Self::NotFound => "STORE_NOT_FOUND",
            Self::Conflict(_) => "STORE_CONFLICT",
        }
    }
}

/// The structured payload of a failed census publication.
///
/// All duplicates and missing required values found in a single scan; nothing
/// is published when this is non-empty.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CensusValidation {
    /// Every member that failed validation, in scan order.
    pub members: Vec<MemberId>,
    /// Members missing a value for a declared auth field.
    pub missing_data: Vec<MemberId>,
    /// Members whose login hash collides with another member's.
    pub duplicates: Vec<MemberId>,
}

impl CensusValidation {
    /// Returns true if the scan found no problems.
    pub fn is_clean(&self) -> bool {
        self.missing_data.is_empty() && self.duplicates.is_empty()
    }
}

/// The public error taxonomy of the CSP.
#[derive(Debug, Error)]
pub enum CspError {
    /// The request body could not be decoded.
    #[error("malformed body: {0}")]
    MalformedBody(String),
    /// An identifier in the request path could not be parsed.
    #[error("malformed parameter: {0}")]
    MalformedParam(String),
    /// The request is well-formed JSON but semantically incomplete, such as a
    /// missing contact field for the census's challenge channel.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Identity mismatch, wrong or expired challenge code, or a consumed or
    /// expired token. Carries no detail on purpose.
    #[error("unauthorized")]
    Unauthorized,
    /// A send or re-issue arrived before the throttle or cooldown elapsed.
    #[error("throttled, retry in {retry_after_secs}s")]
    Throttled {
        /// Seconds until the caller may retry.
        retry_after_secs: u64,
    },
    /// A non-idempotent operation found its target already in the requested
    /// state.
    #[error("duplicate conflict: {0}")]
    DuplicateConflict(String),
    /// The requested process does not belong to the token's bundle.
    #[error("process not in bundle")]
    ProcessNotInBundle,
    /// Census publication failed validation; the payload lists every
    /// offending member.
    #[error("census validation failed")]
    ValidationFailed(CensusValidation),
    /// The caller lacks the required organization role.
    #[error("forbidden")]
    Forbidden,
    /// An unexpected failure in the store, notifier, or signer.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CspError {
    /// The HTTP status this error surfaces as.
    pub fn status(&self) -> u16 {
        match self {
            Self::MalformedBody(_)
            | Self::MalformedParam(_)
            | Self::BadRequest(_)
            | Self::ProcessNotInBundle
            | Self::ValidationFailed(_) => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::DuplicateConflict(_) => 409,
            Self::Throttled { .. } => 429,
            Self::Internal(_) => 500,
        }
    }

    /// The numeric subcode carried next to the HTTP status.
    pub fn subcode(&self) -> u32 {
        match self {
            Self::MalformedBody(_) => 40004,
            Self::BadRequest(_) => 40005,
            Self::MalformedParam(_) => 40010,
            Self::ValidationFailed(_) => 40011,
            Self::ProcessNotInBundle => 40012,
            Self::Unauthorized => 40001,
            Self::Forbidden => 40301,
            Self::DuplicateConflict(_) => 40901,
            Self::Throttled { .. } => 42901,
            Self::Internal(_) => 50002,
        }
    }
}

impl ErrorCode for CspError {
    fn code(&self) -> &'static str {
        match self {
            Self::MalformedBody(_) => "CSP_MALFORMED_BODY",
            Self::MalformedParam(_) => "CSP_MALFORMED_PARAM",
            Self::BadRequest(_) => "CSP_BAD_REQUEST",
            Self::Unauthorized => "CSP_UNAUTHORIZED",
            Self::Throttled { .. } => "CSP_THROTTLED",
            Self::DuplicateConflict(_) => "CSP_DUPLICATE_CONFLICT",
            Self::ProcessNotInBundle => "CSP_PROCESS_NOT_IN_BUNDLE",
            Self::ValidationFailed(_) => "CSP_VALIDATION_FAILED",
            Self::Forbidden => "CSP_FORBIDDEN",
            Self::Internal(_) => "CSP_INTERNAL",
        }
    }
}

impl From<StoreError> for CspError {
    /// Maps unexpected store failures to `Internal`.
    ///
    /// Engines intercept the store errors they expect (`NotFound` on a login
    /// hash lookup is `Unauthorized`, `Conflict` on token consumption is
    /// `Unauthorized`) before the `?` operator reaches this blanket mapping.
    fn from(e: StoreError) -> Self {
        CspError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_projection() {
        assert_eq!(CspError::Unauthorized.status(), 401);
        assert_eq!(CspError::Unauthorized.subcode(), 40001);
        assert_eq!(CspError::BadRequest("x".into()).subcode(), 40005);
        assert_eq!(CspError::MalformedBody("x".into()).subcode(), 40004);
        assert_eq!(CspError::MalformedParam("x".into()).subcode(), 40010);
        assert_eq!(CspError::DuplicateConflict("x".into()).status(), 409);
        assert_eq!(
            CspError::Throttled {
                retry_after_secs: 3
            }
            .status(),
            429
        );
        assert_eq!(CspError::Internal("x".into()).subcode(), 50002);
    }

    #[test]
    fn validation_payload_wire_shape() {
        let v = CensusValidation {
            members: vec![MemberId::from("a"), MemberId::from("b")],
            missing_data: vec![MemberId::from("a")],
            duplicates: vec![MemberId::from("b")],
        };
        let json = serde_json::to_value(&v).unwrap();
        assert!(json.get("missingData").is_some());
        assert!(json.get("duplicates").is_some());
        assert!(!v.is_clean());
    }

    #[test]
    fn unauthorized_carries_no_detail() {
        assert_eq!(CspError::Unauthorized.to_string(), "unauthorized");
    }
}
