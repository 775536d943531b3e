// Path: crates/csp/src/service.rs

//! The public operations facade.
//!
//! [`Csp`] wires the engines over the injected collaborators (store,
//! notifier, signer, role predicate) and exposes the whole voter- and
//! admin-facing surface. Voter operations are unauthenticated; admin
//! operations go through the injected [`RoleChecker`] before touching state.

use crate::auth::AuthEngine;
use crate::bundle::BundleCoordinator;
use crate::jobs::{JobEngine, JobWork};
use crate::otp::OtpEngine;
use crate::publish::{
    ingest_members, IngestOutcome, PublishDeclaration, PublishEngine, PublishedCensus,
};
use crate::signing::SignEngine;
use crate::throttle::ThrottleClock;
use crate::token::{self, TokenEngine};
use std::sync::Arc;
use std::time::Duration;
use tally_api::access::{OrgRole, RoleChecker};
use tally_api::crypto::CspSigner;
use tally_api::notifier::Notifier;
use tally_api::store::CensusStore;
use tally_telemetry::error_metrics;
use tally_types::auth::{AuthToken, ChallengeInfo, ChallengeKey};
use tally_types::census::{Census, CensusRoot};
use tally_types::config::CspConfig;
use tally_types::election::{ElectionInfo, ProcessBundle};
use tally_types::error::{CspError, ErrorCode, StoreError};
use tally_types::ids::{BundleId, CensusId, GroupId, JobId, MemberId, OrgAddress, ProcessId, TokenId};
use tally_types::job::{Job, JobType};
use tally_types::member::{MemberAuthInput, RawMember};
use tally_types::time::now_ms;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// What a publish call produced: a published census, or a queued job.
#[derive(Debug)]
pub enum PublishOutcome {
    /// The synchronous path finished and the census is published.
    Published(PublishedCensus),
    /// The asynchronous path queued a job; poll it for progress.
    Queued {
        /// The job to poll.
        job_id: JobId,
    },
}

/// The outcome of a member ingestion call.
#[derive(Debug)]
pub enum IngestionOutcome {
    /// The synchronous path finished.
    Ingested(IngestOutcome),
    /// The asynchronous path queued a job.
    Queued {
        /// The job to poll.
        job_id: JobId,
    },
}

/// Counts a failed operation by its stable error code before handing the
/// result back to the caller.
fn observe<T>(op: &'static str, result: Result<T, CspError>) -> Result<T, CspError> {
    if let Err(e) = &result {
        error_metrics().inc_error(op, e.code());
    }
    result
}

/// The Credential Service Provider.
pub struct Csp {
    store: Arc<dyn CensusStore>,
    signer: Arc<dyn CspSigner>,
    roles: Arc<dyn RoleChecker>,
    cfg: Arc<CspConfig>,
    auth: AuthEngine,
    otp: OtpEngine,
    signing: SignEngine,
    bundles: BundleCoordinator,
    publish: PublishEngine,
    jobs: JobEngine,
    shutdown_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Csp {
    /// Wires the engines and spawns the background tasks (token sweeper and
    /// job worker pool). Must be called from within a tokio runtime.
    pub fn start(
        store: Arc<dyn CensusStore>,
        notifier: Arc<dyn Notifier>,
        signer: Arc<dyn CspSigner>,
        roles: Arc<dyn RoleChecker>,
        cfg: CspConfig,
    ) -> Arc<Self> {
        let cfg = Arc::new(cfg);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let otp = OtpEngine::new(store.clone(), cfg.clone());
        let tokens = TokenEngine::new(store.clone(), cfg.clone());
        let clock = Arc::new(ThrottleClock::new());
        let auth = AuthEngine::new(
            store.clone(),
            notifier,
            otp.clone(),
            tokens.clone(),
            clock,
            cfg.clone(),
        );
        let signing = SignEngine::new(store.clone(), tokens, signer.clone());
        let bundles = BundleCoordinator::new(store.clone(), cfg.clone());
        let root = CensusRoot(hex::encode(signer.public_key()));
        let publish = PublishEngine::new(store.clone(), cfg.clone(), root);
        let jobs = JobEngine::start(
            store.clone(),
            cfg.clone(),
            publish.clone(),
            shutdown_rx.clone(),
        );
        let sweeper = token::spawn_sweeper(
            store.clone(),
            Duration::from_millis(cfg.token_sweep_interval_ms),
            shutdown_rx,
        );

        Arc::new(Self {
            store,
            signer,
            roles,
            cfg,
            auth,
            otp,
            signing,
            bundles,
            publish,
            jobs,
            shutdown_tx,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Signals the background tasks and waits for them to stop.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.sweeper.lock().await.take() {
            let _ = handle.await;
        }
        self.jobs.join().await;
    }

    // ---- Voter-facing operations ----

    /// Step 0 of voter authentication: match identity, deliver a challenge,
    /// return the opaque token handle.
    pub async fn initiate_auth(
        &self,
        bundle_id: &BundleId,
        input: &MemberAuthInput,
        lang: Option<String>,
    ) -> Result<TokenId, CspError> {
        observe("initiate_auth", self.auth.initiate(bundle_id, input, lang).await)
    }

    /// Step 1 of voter authentication: verify the challenge code.
    pub async fn verify_challenge(
        &self,
        token: &TokenId,
        code: &str,
    ) -> Result<AuthToken, CspError> {
        observe("verify_challenge", self.auth.verify(token, code).await)
    }

    /// Signs `process_id || payload` for a verified token, consuming the
    /// process for that token.
    pub async fn sign(
        &self,
        token: &TokenId,
        process_id: &ProcessId,
        payload: &[u8],
    ) -> Result<[u8; 65], CspError> {
        observe("sign", self.signing.sign(token, process_id, payload).await)
    }

    /// Per-process status of a member within a bundle. Unknown members yield
    /// an empty list.
    pub async fn member_info(
        &self,
        bundle_id: &BundleId,
        member_id: &MemberId,
    ) -> Result<Vec<ElectionInfo>, CspError> {
        observe("member_info", self.bundles.member_info(bundle_id, member_id).await)
    }

    /// Read-only projection of a token's state.
    pub async fn token_status(&self, token: &TokenId) -> Result<AuthToken, CspError> {
        let result = async {
            self.store
                .token(token)
                .await?
                .ok_or(CspError::Unauthorized)
        }
        .await;
        observe("token_status", result)
    }

    /// The CSP public key: the census root every group-based census anchors
    /// to.
    pub fn pub_key(&self) -> [u8; 33] {
        self.signer.public_key()
    }

    /// The CSP public key as lowercase hex.
    pub fn pub_key_hex(&self) -> String {
        hex::encode(self.signer.public_key())
    }

    // ---- Admin-facing operations ----

    /// Publishes a member group into a census, synchronously or as a job.
    pub async fn publish_group_census(
        &self,
        user: &str,
        census_id: &CensusId,
        group_id: &GroupId,
        declaration: PublishDeclaration,
        run_async: bool,
    ) -> Result<PublishOutcome, CspError> {
        let result = async {
            let census = self.load_census(census_id).await?;
            self.ensure_role(user, &census.org_address)?;

            if !run_async {
                let published = self
                    .publish
                    .publish_group(census_id, group_id, &declaration)
                    .await?;
                return Ok(PublishOutcome::Published(published));
            }

            let group = match self.store.group(&census.org_address, group_id).await {
                Ok(g) => g,
                Err(StoreError::NotFound) => {
                    return Err(CspError::MalformedParam(format!(
                        "unknown group {}",
                        group_id
                    )))
                }
                Err(e) => return Err(e.into()),
            };
            let job = Job {
                id: tally_crypto::rand::new_job_id(),
                job_type: JobType::CensusParticipants,
                org_address: census.org_address.clone(),
                total: group.member_ids.len() as u64,
                added: 0,
                completed: false,
                created_at: now_ms(),
                completed_at: None,
                errors: Vec::new(),
            };
            let job_id = job.id;
            self.jobs
                .submit(
                    job,
                    JobWork::PublishCensus {
                        census_id: census_id.clone(),
                        group_id: group_id.clone(),
                        declaration,
                    },
                )
                .await?;
            Ok(PublishOutcome::Queued { job_id })
        }
        .await;
        observe("publish_group_census", result)
    }

    /// Ingests raw member rows for an organization, hashing contact data on
    /// the way in; synchronously or as a job.
    pub async fn add_members(
        &self,
        user: &str,
        org: &OrgAddress,
        members: Vec<RawMember>,
        run_async: bool,
    ) -> Result<IngestionOutcome, CspError> {
        let result = async {
            self.ensure_role(user, org)?;

            if !run_async {
                let outcome =
                    ingest_members(&self.store, org, self.cfg.salt.reveal(), members).await?;
                return Ok(IngestionOutcome::Ingested(outcome));
            }

            let job = Job {
                id: tally_crypto::rand::new_job_id(),
                job_type: JobType::OrgMembers,
                org_address: org.clone(),
                total: members.len() as u64,
                added: 0,
                completed: false,
                created_at: now_ms(),
                completed_at: None,
                errors: Vec::new(),
            };
            let job_id = job.id;
            self.jobs
                .submit(
                    job,
                    JobWork::IngestMembers {
                        org: org.clone(),
                        members,
                    },
                )
                .await?;
            Ok(IngestionOutcome::Queued { job_id })
        }
        .await;
        observe("add_members", result)
    }

    /// Returns the current snapshot of a job.
    pub async fn get_job(
        &self,
        user: &str,
        org: &OrgAddress,
        job_id: &JobId,
    ) -> Result<Job, CspError> {
        let result = async {
            self.ensure_role(user, org)?;
            self.store
                .job(org, job_id)
                .await?
                .ok_or_else(|| CspError::MalformedParam(format!("unknown job {}", job_id)))
        }
        .await;
        observe("get_job", result)
    }

    /// The code-less state of a member's live challenge, for admin support
    /// tooling.
    pub async fn challenge_info(
        &self,
        user: &str,
        bundle_id: &BundleId,
        member_id: &MemberId,
    ) -> Result<Option<ChallengeInfo>, CspError> {
        let result = async {
            let bundle = self.load_bundle(bundle_id).await?;
            self.ensure_role(user, &bundle.org_address)?;
            self.otp
                .info(&ChallengeKey {
                    bundle_id: bundle_id.clone(),
                    member_id: member_id.clone(),
                })
                .await
        }
        .await;
        observe("challenge_info", result)
    }

    // ---- Shared lookups ----

    /// Returns a census, mapping absence to a parameter error.
    pub async fn get_census(&self, id: &CensusId) -> Result<Census, CspError> {
        observe("get_census", self.load_census(id).await)
    }

    /// Returns a bundle, mapping absence to a parameter error.
    pub async fn get_bundle(&self, id: &BundleId) -> Result<ProcessBundle, CspError> {
        observe("get_bundle", self.load_bundle(id).await)
    }

    async fn load_census(&self, id: &CensusId) -> Result<Census, CspError> {
        match self.store.census(id).await {
            Ok(c) => Ok(c),
            Err(StoreError::NotFound) => {
                Err(CspError::MalformedParam(format!("unknown census {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load_bundle(&self, id: &BundleId) -> Result<ProcessBundle, CspError> {
        match self.store.bundle(id).await {
            Ok(b) => Ok(b),
            Err(StoreError::NotFound) => {
                Err(CspError::MalformedParam(format!("unknown bundle {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_role(&self, user: &str, org: &OrgAddress) -> Result<(), CspError> {
        if self.roles.has_role_for(user, org, OrgRole::Manager) {
            Ok(())
        } else {
            Err(CspError::Forbidden)
        }
    }
}
