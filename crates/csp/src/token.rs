// Path: crates/csp/src/token.rs

//! The auth-token lifecycle and the TTL sweeper.

use std::sync::Arc;
use std::time::Duration;
use tally_api::store::CensusStore;
use tally_telemetry::token_metrics;
use tally_types::auth::{AuthToken, TokenState};
use tally_types::config::CspConfig;
use tally_types::error::{CspError, StoreError};
use tally_types::ids::{BundleId, MemberId, TokenId};
use tally_types::time::now_ms;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// The token engine.
#[derive(Clone)]
pub struct TokenEngine {
    store: Arc<dyn CensusStore>,
    cfg: Arc<CspConfig>,
}

impl TokenEngine {
    /// Creates the engine over a store.
    pub fn new(store: Arc<dyn CensusStore>, cfg: Arc<CspConfig>) -> Self {
        Self { store, cfg }
    }

    /// Issues a fresh token for a `(bundle, member)` pair.
    ///
    /// Auth-only censuses issue directly in the verified state with the
    /// longer TTL; everything else starts pending.
    pub async fn create(
        &self,
        bundle: &BundleId,
        member: &MemberId,
        verified: bool,
    ) -> Result<AuthToken, CspError> {
        let now = now_ms();
        let ttl = if verified {
            self.cfg.token_ttl_verified_ms
        } else {
            self.cfg.token_ttl_pending_ms
        };
        let token = AuthToken {
            id: tally_crypto::rand::new_token(),
            bundle_id: bundle.clone(),
            member_id: member.clone(),
            state: if verified {
                TokenState::Verified
            } else {
                TokenState::Pending
            },
            created_at: now,
            expires_at: now.saturating_add(ttl),
            consumed_processes: Vec::new(),
        };
        self.store.put_token(&token).await?;
        token_metrics().inc_tokens_issued();
        Ok(token)
    }

    /// Loads a token, treating absence and expiry as `Unauthorized`.
    pub async fn live(&self, id: &TokenId) -> Result<AuthToken, CspError> {
        let token = self
            .store
            .token(id)
            .await?
            .ok_or(CspError::Unauthorized)?;
        if token.is_expired(now_ms()) {
            return Err(CspError::Unauthorized);
        }
        Ok(token)
    }

    /// Transitions a token to verified, extending its TTL. Idempotent.
    pub async fn mark_verified(&self, id: &TokenId) -> Result<AuthToken, CspError> {
        let expires_at = now_ms().saturating_add(self.cfg.token_ttl_verified_ms);
        match self.store.mark_token_verified(id, expires_at).await {
            Ok(token) => Ok(token),
            Err(StoreError::NotFound) => Err(CspError::Unauthorized),
            Err(e) => Err(e.into()),
        }
    }
}

/// Spawns the background sweeper that deletes expired tokens.
///
/// Runs until the shutdown signal flips; each pass is one store call, so a
/// slow store delays the next pass rather than stacking them.
pub fn spawn_sweeper(
    store: Arc<dyn CensusStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.delete_expired_tokens(now_ms()).await {
                        Ok(0) => {}
                        Ok(removed) => {
                            token_metrics().inc_tokens_swept(removed);
                            tracing::debug!(removed, "swept expired tokens");
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "token sweep failed");
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}
