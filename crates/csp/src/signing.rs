// Path: crates/csp/src/signing.rs

//! Payload signing with per-process consumption.
//!
//! The message the CSP signs is `process_id || payload`; the payload is
//! typically the voter's on-chain address, which the external chain later
//! verifies against the bundle's published census root. Consumption is the
//! single point enforcing at-most-one signature per `(token, process)`.

use crate::token::TokenEngine;
use std::sync::Arc;
use tally_api::crypto::CspSigner;
use tally_api::store::CensusStore;
use tally_telemetry::signing_metrics;
use tally_types::auth::TokenState;
use tally_types::error::{CspError, StoreError};
use tally_types::ids::{ProcessId, TokenId};

/// The maximum accepted payload size. Payloads are opaque; the cap only
/// bounds what a caller can make the CSP sign.
pub const MAX_PAYLOAD_BYTES: usize = 1024;

/// The signing engine.
#[derive(Clone)]
pub struct SignEngine {
    store: Arc<dyn CensusStore>,
    tokens: TokenEngine,
    signer: Arc<dyn CspSigner>,
}

impl SignEngine {
    /// Wires the engine.
    pub fn new(
        store: Arc<dyn CensusStore>,
        tokens: TokenEngine,
        signer: Arc<dyn CspSigner>,
    ) -> Self {
        Self {
            store,
            tokens,
            signer,
        }
    }

    /// Signs `process_id || payload` for a verified token, consuming the
    /// process.
    pub async fn sign(
        &self,
        token_id: &TokenId,
        process_id: &ProcessId,
        payload: &[u8],
    ) -> Result<[u8; 65], CspError> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(CspError::BadRequest("payload too large".to_string()));
        }

        let token = self.tokens.live(token_id).await?;
        if token.state != TokenState::Verified {
            signing_metrics().inc_sign_rejected("not_verified");
            return Err(CspError::Unauthorized);
        }

        let bundle = self.store.bundle(&token.bundle_id).await?;
        if !bundle.contains(process_id) {
            signing_metrics().inc_sign_rejected("not_in_bundle");
            return Err(CspError::ProcessNotInBundle);
        }

        match self.store.consume_token_process(token_id, process_id).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) | Err(StoreError::NotFound) => {
                signing_metrics().inc_sign_rejected("consumed");
                return Err(CspError::Unauthorized);
            }
            Err(e) => return Err(e.into()),
        }

        // Re-check membership after consuming: a census edit racing this
        // call must not leave a signature for a member no longer in it.
        let still_in = self
            .store
            .participant_for_member(&bundle.census_id, &token.member_id)
            .await?
            .is_some();
        if !still_in {
            signing_metrics().inc_sign_rejected("not_participant");
            return Err(CspError::Unauthorized);
        }

        let mut msg = Vec::with_capacity(process_id.as_bytes().len() + payload.len());
        msg.extend_from_slice(process_id.as_bytes());
        msg.extend_from_slice(payload);
        let signature = self
            .signer
            .sign_recoverable(&msg)
            .map_err(|e| CspError::Internal(format!("signing: {}", e)))?;
        signing_metrics().inc_signatures();
        // The token handle is a bearer credential; only the process makes it
        // into the log.
        tracing::info!(process = %process_id, "issued signature");
        Ok(signature)
    }
}
