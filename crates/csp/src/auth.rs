// Path: crates/csp/src/auth.rs

//! The two-step authentication state machine.
//!
//! Step 0 (`initiate`) matches the voter's identity fields against the
//! bundle's census by login hash, verifies the supplied contact against the
//! stored hash, and sends a challenge. Step 1 (`verify`) burns the challenge
//! and flips the token to verified. Identity failures of every kind collapse
//! to `Unauthorized`; only a structurally incomplete request (no contact for
//! the census's channel) is `BadRequest`.

use crate::otp::OtpEngine;
use crate::throttle::ThrottleClock;
use crate::token::TokenEngine;
use std::sync::Arc;
use tally_api::notifier::{Notification, Notifier};
use tally_api::store::CensusStore;
use tally_crypto::hash::{auth_login_hash, hash_org_data};
use tally_telemetry::auth_metrics;
use tally_types::auth::{AuthToken, ChallengeKey, ContactChannel, TokenState};
use tally_types::census::TwoFaField;
use tally_types::config::CspConfig;
use tally_types::error::{CspError, StoreError};
use tally_types::ids::{BundleId, TokenId};
use tally_types::member::{MemberAuthInput, OrgMember};
use tally_types::time::now_ms;

/// The authentication engine.
#[derive(Clone)]
pub struct AuthEngine {
    store: Arc<dyn CensusStore>,
    notifier: Arc<dyn Notifier>,
    otp: OtpEngine,
    tokens: TokenEngine,
    clock: Arc<ThrottleClock>,
    cfg: Arc<CspConfig>,
}

/// The channel and cleartext address step 0 resolved for delivery.
struct Delivery {
    channel: ContactChannel,
    address: String,
}

impl AuthEngine {
    /// Wires the engine.
    pub fn new(
        store: Arc<dyn CensusStore>,
        notifier: Arc<dyn Notifier>,
        otp: OtpEngine,
        tokens: TokenEngine,
        clock: Arc<ThrottleClock>,
        cfg: Arc<CspConfig>,
    ) -> Self {
        Self {
            store,
            notifier,
            otp,
            tokens,
            clock,
            cfg,
        }
    }

    /// Step 0: authenticate identity fields and send a challenge.
    ///
    /// Returns the opaque token handle; the challenge code travels only over
    /// the out-of-band channel.
    pub async fn initiate(
        &self,
        bundle_id: &BundleId,
        input: &MemberAuthInput,
        lang: Option<String>,
    ) -> Result<TokenId, CspError> {
        let bundle = match self.store.bundle(bundle_id).await {
            Ok(b) => b,
            Err(StoreError::NotFound) => {
                auth_metrics().inc_auth_initiated("unauthorized");
                return Err(CspError::Unauthorized);
            }
            Err(e) => return Err(e.into()),
        };
        let census = self.store.census(&bundle.census_id).await?;

        // Identity match by login hash. The input carries exactly the fields
        // the caller chose to provide; missing required fields simply hash
        // to the wrong value, which keeps the failure indistinguishable.
        let login_hash = auth_login_hash(&census.org_address, &census.auth_fields, input);
        let participant = match self
            .store
            .participant_by_login_hash(&census.id, &login_hash)
            .await?
        {
            Some(p) => p,
            None => {
                auth_metrics().inc_auth_initiated("unauthorized");
                return Err(CspError::Unauthorized);
            }
        };
        let member = match self
            .store
            .member(&census.org_address, &participant.member_id)
            .await
        {
            Ok(m) => m,
            Err(StoreError::NotFound) => {
                auth_metrics().inc_auth_initiated("unauthorized");
                return Err(CspError::Unauthorized);
            }
            Err(e) => return Err(e.into()),
        };

        let key = ChallengeKey {
            bundle_id: bundle.id.clone(),
            member_id: member.id.clone(),
        };

        if census.is_auth_only() {
            // No challenge step; the token is born verified. Initiation is
            // still rate-limited per key so the endpoint cannot be hammered.
            self.check_cooldown(&key)?;
            let token = self.tokens.create(&bundle.id, &member.id, true).await?;
            auth_metrics().inc_auth_initiated("ok");
            return Ok(token.id);
        }

        let delivery = match self.resolve_delivery(&census.two_fa_fields, input, &member) {
            Ok(d) => d,
            Err(e) => {
                auth_metrics().inc_auth_initiated(match &e {
                    CspError::BadRequest(_) => "bad_request",
                    _ => "unauthorized",
                });
                return Err(e);
            }
        };

        self.check_cooldown(&key)?;

        // Per-address gate, across bundles and members: keyed by the stored
        // hash so the cleartext address never sits in the map.
        let address_key = hash_org_data(&census.org_address, &delivery.address);
        if let Err(wait_ms) =
            self.clock
                .try_stamp(&address_key, self.cfg.throttle(), now_ms())
        {
            auth_metrics().inc_throttled("address");
            return Err(CspError::Throttled {
                retry_after_secs: wait_ms.div_ceil(1_000).max(1),
            });
        }

        let code = self.otp.issue(&key).await?;
        let token = self.tokens.create(&bundle.id, &member.id, false).await?;

        let notification = Notification {
            channel: delivery.channel,
            address: delivery.address,
            subject: "Your verification code".to_string(),
            body: format!("Your verification code is {}", code),
            lang,
        };
        let send = self.notifier.send(notification);
        match tokio::time::timeout(self.cfg.notifier_timeout(), send).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                auth_metrics().inc_auth_initiated("error");
                return Err(CspError::Internal(format!("challenge delivery: {}", e)));
            }
            Err(_) => {
                auth_metrics().inc_auth_initiated("error");
                return Err(CspError::Internal("challenge delivery timed out".into()));
            }
        }
        auth_metrics().inc_challenge_sent(delivery_channel_label(delivery.channel));
        auth_metrics().inc_auth_initiated("ok");
        Ok(token.id)
    }

    /// Step 1: verify the challenge code and flip the token to verified.
    pub async fn verify(&self, token_id: &TokenId, code: &str) -> Result<AuthToken, CspError> {
        let token = self.tokens.live(token_id).await?;
        match token.state {
            TokenState::Pending => {
                let key = ChallengeKey {
                    bundle_id: token.bundle_id.clone(),
                    member_id: token.member_id.clone(),
                };
                self.otp.verify(&key, code).await?;
                self.tokens.mark_verified(token_id).await
            }
            TokenState::Verified => {
                // Auth-only censuses make this step a no-op; for everything
                // else a repeated verify is a duplicate.
                let bundle = self.store.bundle(&token.bundle_id).await?;
                let census = self.store.census(&bundle.census_id).await?;
                if census.is_auth_only() {
                    Ok(token)
                } else {
                    Err(CspError::DuplicateConflict(
                        "token already verified".to_string(),
                    ))
                }
            }
        }
    }

    fn check_cooldown(&self, key: &ChallengeKey) -> Result<(), CspError> {
        let cooldown_key = format!("cooldown/{}", key);
        if let Err(wait_ms) = self
            .clock
            .try_stamp(&cooldown_key, self.cfg.cooldown(), now_ms())
        {
            auth_metrics().inc_throttled("cooldown");
            return Err(CspError::Throttled {
                retry_after_secs: wait_ms.div_ceil(1_000).max(1),
            });
        }
        Ok(())
    }

    /// Applies the channel selection rule and checks the supplied contact
    /// against the member's stored hash.
    fn resolve_delivery(
        &self,
        two_fa_fields: &[TwoFaField],
        input: &MemberAuthInput,
        member: &OrgMember,
    ) -> Result<Delivery, CspError> {
        let field = select_channel(two_fa_fields, input)?;
        let (address, stored) = match field {
            TwoFaField::Email => (input.email.clone(), member.hashed_email.as_deref()),
            TwoFaField::Phone => (input.phone.clone(), member.hashed_phone.as_deref()),
        };
        let address = address.unwrap_or_default();
        let stored = stored.ok_or(CspError::Unauthorized)?;
        if hash_org_data(&member.org_address, &address) != stored {
            return Err(CspError::Unauthorized);
        }
        Ok(Delivery {
            channel: match field {
                TwoFaField::Email => ContactChannel::Email,
                TwoFaField::Phone => ContactChannel::Sms,
            },
            address,
        })
    }
}

fn delivery_channel_label(channel: ContactChannel) -> &'static str {
    match channel {
        ContactChannel::Email => "email",
        ContactChannel::Sms => "sms",
    }
}

/// The channel selection rule.
///
/// With both fields declared, email wins when both are supplied; supplying
/// neither is a malformed request, not a failed credential.
pub fn select_channel(
    two_fa_fields: &[TwoFaField],
    input: &MemberAuthInput,
) -> Result<TwoFaField, CspError> {
    let wants_email = two_fa_fields.contains(&TwoFaField::Email);
    let wants_phone = two_fa_fields.contains(&TwoFaField::Phone);
    match (wants_email, wants_phone) {
        (true, false) => input
            .has_email()
            .then_some(TwoFaField::Email)
            .ok_or_else(|| CspError::BadRequest("email required".to_string())),
        (false, true) => input
            .has_phone()
            .then_some(TwoFaField::Phone)
            .ok_or_else(|| CspError::BadRequest("phone required".to_string())),
        (true, true) => {
            if input.has_email() {
                Ok(TwoFaField::Email)
            } else if input.has_phone() {
                Ok(TwoFaField::Phone)
            } else {
                Err(CspError::BadRequest("email or phone required".to_string()))
            }
        }
        (false, false) => Err(CspError::BadRequest(
            "census declares no challenge channel".to_string(),
        )),
    }
}
