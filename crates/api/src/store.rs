// Path: crates/api/src/store.rs

//! The persistence contract of the CSP.
//!
//! The store is the single writer of durable state. Implementations must
//! provide atomicity for participant insertion (all-or-nothing per batch) and
//! linearizable conditional updates for token consumption and challenge
//! rotation; everything else is plain keyed CRUD over a document store.

use async_trait::async_trait;
use tally_types::auth::{AuthToken, ChallengeKey, ChallengeRecord};
use tally_types::census::{Census, CensusParticipant, CensusRoot, LoginHash};
use tally_types::election::{Process, ProcessBundle};
use tally_types::error::StoreError;
use tally_types::ids::{BundleId, CensusId, GroupId, JobId, MemberId, OrgAddress, ProcessId, TokenId};
use tally_types::job::Job;
use tally_types::member::{MemberGroup, OrgMember};
use tally_types::time::UnixMillis;

/// The CSP persistence contract.
///
/// All reads are read-your-writes within one request and monotonic across
/// requests. Methods returning `Option` treat absence as a normal outcome;
/// methods returning the record directly fail `NotFound`.
#[async_trait]
pub trait CensusStore: Send + Sync {
    // ---- Members ----

    /// Inserts or replaces a member.
    ///
    /// Fails `Conflict` when a different member of the same organization
    /// already uses the member number.
    async fn put_member(&self, member: &OrgMember) -> Result<(), StoreError>;

    /// Returns a member of an organization by internal identifier.
    async fn member(&self, org: &OrgAddress, id: &MemberId) -> Result<OrgMember, StoreError>;

    // ---- Groups ----

    /// Inserts or replaces a member group.
    async fn put_group(&self, group: &MemberGroup) -> Result<(), StoreError>;

    /// Returns a group of an organization.
    async fn group(&self, org: &OrgAddress, id: &GroupId) -> Result<MemberGroup, StoreError>;

    /// Returns one page of a group's members, resolving each identifier to
    /// the stored member row. Missing members are skipped.
    async fn group_members_page(
        &self,
        org: &OrgAddress,
        id: &GroupId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<OrgMember>, StoreError>;

    // ---- Censuses ----

    /// Inserts or replaces a census.
    async fn put_census(&self, census: &Census) -> Result<(), StoreError>;

    /// Returns a census by identifier.
    async fn census(&self, id: &CensusId) -> Result<Census, StoreError>;

    /// Deletes a census.
    ///
    /// Fails `Conflict` while any bundle references the census.
    async fn delete_census(&self, id: &CensusId) -> Result<(), StoreError>;

    /// Records the published root and URI of a census.
    ///
    /// Publication is monotonic: fails `Conflict` when the census is already
    /// published with a different root.
    async fn set_published_census(
        &self,
        id: &CensusId,
        root: &CensusRoot,
        uri: &str,
    ) -> Result<(), StoreError>;

    /// Inserts a batch of census participants, all-or-nothing.
    ///
    /// Fails `Conflict` when any row collides with an existing
    /// `(census, login_hash)` pair; no row of the batch is kept.
    async fn insert_census_participants(
        &self,
        id: &CensusId,
        batch: &[CensusParticipant],
    ) -> Result<(), StoreError>;

    /// Looks up a participant by login hash.
    async fn participant_by_login_hash(
        &self,
        id: &CensusId,
        hash: &LoginHash,
    ) -> Result<Option<CensusParticipant>, StoreError>;

    /// Looks up a participant by member identifier.
    async fn participant_for_member(
        &self,
        id: &CensusId,
        member: &MemberId,
    ) -> Result<Option<CensusParticipant>, StoreError>;

    /// Returns the number of participants of a census.
    async fn census_size(&self, id: &CensusId) -> Result<u64, StoreError>;

    // ---- Processes & bundles ----

    /// Inserts or replaces a process.
    ///
    /// Fails `Conflict` when the stored process is no longer a draft;
    /// processes are immutable after their first non-draft save.
    async fn put_process(&self, process: &Process) -> Result<(), StoreError>;

    /// Returns a process by identifier.
    async fn process(&self, id: &ProcessId) -> Result<Process, StoreError>;

    /// Inserts or replaces a bundle.
    async fn put_bundle(&self, bundle: &ProcessBundle) -> Result<(), StoreError>;

    /// Returns a bundle by identifier.
    async fn bundle(&self, id: &BundleId) -> Result<ProcessBundle, StoreError>;

    /// Appends processes to a bundle's list. Append-only: existing entries
    /// are never removed or reordered; already-present processes are skipped.
    async fn append_bundle_processes(
        &self,
        id: &BundleId,
        processes: &[ProcessId],
    ) -> Result<(), StoreError>;

    /// Returns how many bundles reference a census.
    async fn bundles_referencing_census(&self, id: &CensusId) -> Result<u64, StoreError>;

    // ---- Challenges ----

    /// Returns the challenge record for a key, when one exists.
    async fn challenge(&self, key: &ChallengeKey) -> Result<Option<ChallengeRecord>, StoreError>;

    /// Writes a challenge record guarded by the previously-observed send
    /// time.
    ///
    /// `expected_last_sent` is `None` when the caller observed no record.
    /// Fails `Conflict` when the stored state no longer matches, which is how
    /// concurrent rotations for the same key are serialized: exactly one
    /// caller wins, the loser surfaces a throttle error.
    async fn put_challenge_guarded(
        &self,
        record: &ChallengeRecord,
        expected_last_sent: Option<UnixMillis>,
    ) -> Result<(), StoreError>;

    /// Atomically decrements a challenge's attempt counter, returning the
    /// remaining budget. Fails `NotFound` when no record exists.
    async fn decrement_challenge_attempts(&self, key: &ChallengeKey) -> Result<u32, StoreError>;

    /// Deletes the challenge record for a key. Deleting an absent record is
    /// not an error.
    async fn delete_challenge(&self, key: &ChallengeKey) -> Result<(), StoreError>;

    // ---- Tokens ----

    /// Inserts a token.
    async fn put_token(&self, token: &AuthToken) -> Result<(), StoreError>;

    /// Returns a token, when one exists.
    async fn token(&self, id: &TokenId) -> Result<Option<AuthToken>, StoreError>;

    /// Returns the most recently created token for a `(bundle, member)`
    /// pair, when any.
    async fn latest_token_for(
        &self,
        bundle: &BundleId,
        member: &MemberId,
    ) -> Result<Option<AuthToken>, StoreError>;

    /// Compare-and-swaps a token from pending to verified, setting the new
    /// expiry. Idempotent when the token is already verified. Fails
    /// `NotFound` for unknown tokens.
    async fn mark_token_verified(
        &self,
        id: &TokenId,
        expires_at: UnixMillis,
    ) -> Result<AuthToken, StoreError>;

    /// Appends a process to a token's consumed set.
    ///
    /// The update is conditional and linearizable: fails `Conflict` when the
    /// process is already present, so one signature per `(token, process)`
    /// pair can ever be produced. A naive read-modify-write is not an
    /// acceptable implementation.
    async fn consume_token_process(
        &self,
        id: &TokenId,
        process: &ProcessId,
    ) -> Result<(), StoreError>;

    /// Deletes every token whose expiry is at or before `now`, returning how
    /// many were removed.
    async fn delete_expired_tokens(&self, now: UnixMillis) -> Result<u64, StoreError>;

    // ---- Jobs ----

    /// Persists a job snapshot, inserting or replacing.
    async fn save_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Returns a job of an organization, when one exists.
    async fn job(&self, org: &OrgAddress, id: &JobId) -> Result<Option<Job>, StoreError>;

    /// Deletes a job row. Deleting an absent row is not an error.
    async fn delete_job(&self, id: &JobId) -> Result<(), StoreError>;
}
