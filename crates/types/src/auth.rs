// Path: crates/types/src/auth.rs

//! Authentication tokens and one-time challenge records.

use crate::ids::{BundleId, MemberId, ProcessId, TokenId};
use crate::time::UnixMillis;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle state of an authentication token.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    /// Issued, challenge not yet answered.
    Pending,
    /// Challenge answered (or not required); may sign.
    Verified,
}

/// An authentication token binding a verified identity to a bundle.
///
/// Issued pending by `initiate_auth`, flipped to verified by
/// `verify_challenge`, and consumed one process at a time by `sign`. A
/// process identifier appears in `consumed_processes` at most once.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuthToken {
    /// The opaque token handle.
    pub id: TokenId,
    /// The bundle this token authenticates for.
    pub bundle_id: BundleId,
    /// The member this token was issued to.
    pub member_id: MemberId,
    /// Current lifecycle state.
    pub state: TokenState,
    /// Issue time.
    pub created_at: UnixMillis,
    /// Expiry time; extended when the token transitions to verified.
    pub expires_at: UnixMillis,
    /// Processes this token has already produced a signature for.
    #[serde(default)]
    pub consumed_processes: Vec<ProcessId>,
}

impl AuthToken {
    /// Returns true if the token has expired at `now`.
    pub fn is_expired(&self, now: UnixMillis) -> bool {
        now >= self.expires_at
    }

    /// Returns true if the token has already signed for the given process.
    pub fn has_consumed(&self, process: &ProcessId) -> bool {
        self.consumed_processes.iter().any(|p| p == process)
    }
}

/// The key a challenge record is stored under: one live challenge per
/// member per bundle.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct ChallengeKey {
    /// The bundle the challenge was issued for.
    pub bundle_id: BundleId,
    /// The member the challenge was issued to.
    pub member_id: MemberId,
}

impl fmt::Display for ChallengeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bundle_id, self.member_id)
    }
}

/// A one-time challenge record.
///
/// Created on first auth, rotated on re-issue once the send throttle has
/// elapsed, and deleted on verify success or when the attempt budget is
/// exhausted. The code itself never appears in logs.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChallengeRecord {
    /// The record key.
    pub key: ChallengeKey,
    /// The current 6-digit code.
    pub code: String,
    /// When the current code was issued.
    pub issued_at: UnixMillis,
    /// When the current code expires.
    pub expires_at: UnixMillis,
    /// Verification attempts left before the record is deleted.
    pub attempts_left: u32,
    /// When a challenge was last handed to the notifier for this key.
    pub last_sent_at: UnixMillis,
}

impl ChallengeRecord {
    /// Returns true if the current code has expired at `now`.
    pub fn is_expired(&self, now: UnixMillis) -> bool {
        now >= self.expires_at
    }
}

/// The code-less projection of a challenge record returned to admin tooling.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeInfo {
    /// When the current code was issued.
    pub issued_at: UnixMillis,
    /// When the current code expires.
    pub expires_at: UnixMillis,
    /// Verification attempts left.
    pub attempts_left: u32,
}

impl From<&ChallengeRecord> for ChallengeInfo {
    fn from(rec: &ChallengeRecord) -> Self {
        Self {
            issued_at: rec.issued_at,
            expires_at: rec.expires_at,
            attempts_left: rec.attempts_left,
        }
    }
}

/// The out-of-band channel a challenge is delivered over.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContactChannel {
    /// Email delivery.
    Email,
    /// SMS delivery.
    Sms,
}

impl fmt::Display for ContactChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactChannel::Email => write!(f, "email"),
            ContactChannel::Sms => write!(f, "sms"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_expiry_and_consumption() {
        let t = AuthToken {
            id: TokenId([1u8; 16]),
            bundle_id: BundleId::from("b1"),
            member_id: MemberId::from("m1"),
            state: TokenState::Verified,
            created_at: 1_000,
            expires_at: 2_000,
            consumed_processes: vec![ProcessId(vec![1])],
        };
        assert!(!t.is_expired(1_999));
        assert!(t.is_expired(2_000));
        assert!(t.has_consumed(&ProcessId(vec![1])));
        assert!(!t.has_consumed(&ProcessId(vec![2])));
    }

    #[test]
    fn challenge_info_strips_code() {
        let rec = ChallengeRecord {
            key: ChallengeKey {
                bundle_id: BundleId::from("b1"),
                member_id: MemberId::from("m1"),
            },
            code: "123456".into(),
            issued_at: 10,
            expires_at: 20,
            attempts_left: 5,
            last_sent_at: 10,
        };
        let info = ChallengeInfo::from(&rec);
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("123456"));
        assert_eq!(info.attempts_left, 5);
    }
}
