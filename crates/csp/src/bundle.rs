// Path: crates/csp/src/bundle.rs

//! Per-bundle member status.
//!
//! Eligibility for every process in a bundle is derived from the bundle's
//! census, never from the individual process; all processes in a bundle
//! therefore share one voter set. This module joins that census view with
//! the member's active token and challenge record.

use std::sync::Arc;
use tally_api::store::CensusStore;
use tally_types::auth::ChallengeKey;
use tally_types::config::CspConfig;
use tally_types::election::ElectionInfo;
use tally_types::error::{CspError, StoreError};
use tally_types::ids::{BundleId, MemberId};

/// The bundle coordinator.
#[derive(Clone)]
pub struct BundleCoordinator {
    store: Arc<dyn CensusStore>,
    cfg: Arc<CspConfig>,
}

impl BundleCoordinator {
    /// Creates the coordinator over a store.
    pub fn new(store: Arc<dyn CensusStore>, cfg: Arc<CspConfig>) -> Self {
        Self { store, cfg }
    }

    /// Returns one status row per process in the bundle for a member.
    ///
    /// Unknown members (and unknown bundles) yield an empty list rather than
    /// an error: the endpoint is voter-facing and must not confirm
    /// membership to probes.
    pub async fn member_info(
        &self,
        bundle_id: &BundleId,
        member_id: &MemberId,
    ) -> Result<Vec<ElectionInfo>, CspError> {
        let bundle = match self.store.bundle(bundle_id).await {
            Ok(b) => b,
            Err(StoreError::NotFound) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let participant = self
            .store
            .participant_for_member(&bundle.census_id, member_id)
            .await?;
        if participant.is_none() {
            return Ok(Vec::new());
        }

        let token = self.store.latest_token_for(bundle_id, member_id).await?;
        let key = ChallengeKey {
            bundle_id: bundle_id.clone(),
            member_id: member_id.clone(),
        };
        let remaining_attempts = self
            .store
            .challenge(&key)
            .await?
            .map(|rec| rec.attempts_left)
            .unwrap_or(self.cfg.otp_attempts);

        Ok(bundle
            .processes
            .iter()
            .map(|process_id| ElectionInfo {
                process_id: process_id.clone(),
                consumed: token
                    .as_ref()
                    .map(|t| t.has_consumed(process_id))
                    .unwrap_or(false),
                remaining_attempts,
                extra: Vec::new(),
            })
            .collect())
    }
}
