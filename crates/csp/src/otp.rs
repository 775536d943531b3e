// Path: crates/csp/src/otp.rs

//! One-time challenge issuance and verification.
//!
//! One live challenge record exists per `(bundle, member)` key. Issuance
//! creates or rotates it behind a guarded store write, so two concurrent
//! initiations cannot both rotate the code; verification burns attempts and
//! deletes the record on success or exhaustion. Codes are never logged.

use std::sync::Arc;
use tally_api::store::CensusStore;
use tally_telemetry::auth_metrics;
use tally_types::auth::{ChallengeInfo, ChallengeKey, ChallengeRecord};
use tally_types::config::CspConfig;
use tally_types::error::{CspError, StoreError};
use tally_types::time::{now_ms, UnixMillis};

/// The challenge engine.
#[derive(Clone)]
pub struct OtpEngine {
    store: Arc<dyn CensusStore>,
    cfg: Arc<CspConfig>,
}

impl OtpEngine {
    /// Creates the engine over a store.
    pub fn new(store: Arc<dyn CensusStore>, cfg: Arc<CspConfig>) -> Self {
        Self { store, cfg }
    }

    /// Issues a challenge for a key, returning the code to deliver.
    ///
    /// Creates a fresh record when none exists. When one exists, the code is
    /// rotated only if the send throttle has elapsed since the last send;
    /// otherwise the caller is throttled. The attempt budget is not
    /// replenished by rotation, so re-requesting codes does not extend a
    /// brute-force window.
    pub async fn issue(&self, key: &ChallengeKey) -> Result<String, CspError> {
        let now = now_ms();
        match self.store.challenge(key).await? {
            None => {
                let record = self.fresh_record(key, now, self.cfg.otp_attempts);
                let code = record.code.clone();
                match self.store.put_challenge_guarded(&record, None).await {
                    Ok(()) => Ok(code),
                    Err(StoreError::Conflict(_)) => Err(self.throttled(now, now)),
                    Err(e) => Err(e.into()),
                }
            }
            Some(existing) => {
                let elapsed = now.saturating_sub(existing.last_sent_at);
                if elapsed < self.cfg.throttle_ms {
                    auth_metrics().inc_throttled("challenge");
                    return Err(self.throttled(existing.last_sent_at, now));
                }
                let mut record = self.fresh_record(key, now, existing.attempts_left);
                if existing.is_expired(now) {
                    // A dead record's leftover budget does not carry over.
                    record.attempts_left = self.cfg.otp_attempts;
                }
                let code = record.code.clone();
                match self
                    .store
                    .put_challenge_guarded(&record, Some(existing.last_sent_at))
                    .await
                {
                    Ok(()) => Ok(code),
                    // Lost the rotation race: somebody else just sent.
                    Err(StoreError::Conflict(_)) => Err(self.throttled(now, now)),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Verifies a submitted code for a key.
    ///
    /// Every failure collapses to `Unauthorized` on the wire; the metrics
    /// sink keeps the distinction between expired, invalid, and exhausted.
    pub async fn verify(&self, key: &ChallengeKey, code: &str) -> Result<(), CspError> {
        let now = now_ms();
        let record = match self.store.challenge(key).await? {
            Some(r) => r,
            None => {
                auth_metrics().inc_challenge_verified("expired");
                return Err(CspError::Unauthorized);
            }
        };
        if record.is_expired(now) {
            self.store.delete_challenge(key).await?;
            auth_metrics().inc_challenge_verified("expired");
            return Err(CspError::Unauthorized);
        }
        let remaining = match self.store.decrement_challenge_attempts(key).await {
            Ok(r) => r,
            Err(StoreError::NotFound) => {
                auth_metrics().inc_challenge_verified("expired");
                return Err(CspError::Unauthorized);
            }
            Err(e) => return Err(e.into()),
        };
        if record.code == code {
            self.store.delete_challenge(key).await?;
            auth_metrics().inc_challenge_verified("ok");
            return Ok(());
        }
        if remaining == 0 {
            self.store.delete_challenge(key).await?;
            auth_metrics().inc_challenge_verified("exhausted");
        } else {
            auth_metrics().inc_challenge_verified("invalid");
        }
        Err(CspError::Unauthorized)
    }

    /// The code-less projection of a key's live record, for admin tooling.
    pub async fn info(&self, key: &ChallengeKey) -> Result<Option<ChallengeInfo>, CspError> {
        Ok(self
            .store
            .challenge(key)
            .await?
            .as_ref()
            .map(ChallengeInfo::from))
    }

    fn fresh_record(&self, key: &ChallengeKey, now: UnixMillis, attempts: u32) -> ChallengeRecord {
        ChallengeRecord {
            key: key.clone(),
            code: tally_crypto::rand::new_otp(),
            issued_at: now,
            expires_at: now.saturating_add(self.cfg.otp_validity_ms),
            attempts_left: attempts,
            last_sent_at: now,
        }
    }

    fn throttled(&self, last_sent: UnixMillis, now: UnixMillis) -> CspError {
        let elapsed = now.saturating_sub(last_sent);
        let wait_ms = self.cfg.throttle_ms.saturating_sub(elapsed);
        CspError::Throttled {
            retry_after_secs: wait_ms.div_ceil(1_000).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_test_utils::MemCensusStore;
    use tally_types::ids::{BundleId, MemberId};

    fn engine(throttle_ms: u64, attempts: u32) -> (OtpEngine, Arc<MemCensusStore>) {
        let store = Arc::new(MemCensusStore::new());
        let cfg = Arc::new(CspConfig {
            throttle_ms,
            otp_attempts: attempts,
            ..Default::default()
        });
        (OtpEngine::new(store.clone(), cfg), store)
    }

    fn key() -> ChallengeKey {
        ChallengeKey {
            bundle_id: BundleId::from("b1"),
            member_id: MemberId::from("m1"),
        }
    }

    #[tokio::test]
    async fn issue_then_verify_deletes_the_record() {
        let (engine, store) = engine(0, 5);
        let code = engine.issue(&key()).await.unwrap();
        assert_eq!(code.len(), 6);

        engine.verify(&key(), &code).await.unwrap();
        assert!(store.challenge(&key()).await.unwrap().is_none());

        // The code is single-use.
        assert!(matches!(
            engine.verify(&key(), &code).await.unwrap_err(),
            CspError::Unauthorized
        ));
    }

    #[tokio::test]
    async fn reissue_is_throttled_within_interval() {
        let (engine, store) = engine(60_000, 5);
        let first = engine.issue(&key()).await.unwrap();
        let err = engine.issue(&key()).await.unwrap_err();
        assert!(matches!(err, CspError::Throttled { .. }));
        // Unchanged code while throttled.
        assert_eq!(store.challenge(&key()).await.unwrap().unwrap().code, first);
    }

    #[tokio::test]
    async fn wrong_attempts_exhaust_the_budget() {
        let (engine, store) = engine(0, 3);
        let code = engine.issue(&key()).await.unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        for _ in 0..3 {
            assert!(matches!(
                engine.verify(&key(), wrong).await.unwrap_err(),
                CspError::Unauthorized
            ));
        }
        // Third wrong attempt deleted the record; even the right code is
        // dead now.
        assert!(store.challenge(&key()).await.unwrap().is_none());
        assert!(matches!(
            engine.verify(&key(), &code).await.unwrap_err(),
            CspError::Unauthorized
        ));
    }

    #[tokio::test]
    async fn rotation_keeps_remaining_budget() {
        let (engine, store) = engine(0, 3);
        let code = engine.issue(&key()).await.unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };
        engine.verify(&key(), wrong).await.unwrap_err();

        let _rotated = engine.issue(&key()).await.unwrap();
        assert_eq!(
            store.challenge(&key()).await.unwrap().unwrap().attempts_left,
            2
        );
    }
}
