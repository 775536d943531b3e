// Path: crates/test-utils/src/mem_store.rs

//! An in-memory [`CensusStore`] with the same semantics as the durable
//! backend.
//!
//! One mutex guards the whole state, which trivially makes every operation
//! linearizable; the conditional updates (consume, guarded challenge write,
//! verify CAS) check and mutate under the same lock acquisition.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tally_api::store::CensusStore;
use tally_types::auth::{AuthToken, ChallengeKey, ChallengeRecord, TokenState};
use tally_types::census::{Census, CensusParticipant, CensusRoot, LoginHash};
use tally_types::election::{Process, ProcessBundle};
use tally_types::error::StoreError;
use tally_types::ids::{
    BundleId, CensusId, GroupId, JobId, MemberId, OrgAddress, ProcessId, TokenId,
};
use tally_types::job::Job;
use tally_types::member::{MemberGroup, OrgMember};
use tally_types::time::UnixMillis;

#[derive(Default)]
struct State {
    members: HashMap<(OrgAddress, MemberId), OrgMember>,
    groups: HashMap<(OrgAddress, GroupId), MemberGroup>,
    censuses: HashMap<CensusId, Census>,
    participants: HashMap<(CensusId, LoginHash), CensusParticipant>,
    participants_by_member: HashMap<(CensusId, MemberId), LoginHash>,
    processes: HashMap<ProcessId, Process>,
    bundles: HashMap<BundleId, ProcessBundle>,
    challenges: HashMap<ChallengeKey, ChallengeRecord>,
    tokens: HashMap<TokenId, AuthToken>,
    tokens_by_key: HashMap<(BundleId, MemberId), TokenId>,
    jobs: HashMap<JobId, Job>,
}

/// The in-memory store.
#[derive(Clone, Default)]
pub struct MemCensusStore {
    state: Arc<Mutex<State>>,
}

impl MemCensusStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned mutex means a test already panicked; propagate.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl CensusStore for MemCensusStore {
    async fn put_member(&self, member: &OrgMember) -> Result<(), StoreError> {
        let mut s = self.lock();
        if !member.member_number.is_empty() {
            let taken = s.members.values().any(|m| {
                m.org_address == member.org_address
                    && m.member_number == member.member_number
                    && m.id != member.id
            });
            if taken {
                return Err(StoreError::Conflict(format!(
                    "member number {} already in use",
                    member.member_number
                )));
            }
        }
        s.members.insert(
            (member.org_address.clone(), member.id.clone()),
            member.clone(),
        );
        Ok(())
    }

    async fn member(&self, org: &OrgAddress, id: &MemberId) -> Result<OrgMember, StoreError> {
        self.lock()
            .members
            .get(&(org.clone(), id.clone()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn put_group(&self, group: &MemberGroup) -> Result<(), StoreError> {
        self.lock().groups.insert(
            (group.org_address.clone(), group.id.clone()),
            group.clone(),
        );
        Ok(())
    }

    async fn group(&self, org: &OrgAddress, id: &GroupId) -> Result<MemberGroup, StoreError> {
        self.lock()
            .groups
            .get(&(org.clone(), id.clone()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn group_members_page(
        &self,
        org: &OrgAddress,
        id: &GroupId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<OrgMember>, StoreError> {
        let s = self.lock();
        let group = s
            .groups
            .get(&(org.clone(), id.clone()))
            .ok_or(StoreError::NotFound)?;
        Ok(group
            .member_ids
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|mid| s.members.get(&(org.clone(), mid.clone())).cloned())
            .collect())
    }

    async fn put_census(&self, census: &Census) -> Result<(), StoreError> {
        self.lock().censuses.insert(census.id.clone(), census.clone());
        Ok(())
    }

    async fn census(&self, id: &CensusId) -> Result<Census, StoreError> {
        self.lock()
            .censuses
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete_census(&self, id: &CensusId) -> Result<(), StoreError> {
        let mut s = self.lock();
        if s.bundles.values().any(|b| &b.census_id == id) {
            return Err(StoreError::Conflict(
                "census is referenced by a bundle".to_string(),
            ));
        }
        s.censuses.remove(id);
        Ok(())
    }

    async fn set_published_census(
        &self,
        id: &CensusId,
        root: &CensusRoot,
        uri: &str,
    ) -> Result<(), StoreError> {
        let mut s = self.lock();
        let census = s.censuses.get_mut(id).ok_or(StoreError::NotFound)?;
        match &census.published_root {
            Some(existing) if existing != root => Err(StoreError::Conflict(
                "census already published with a different root".to_string(),
            )),
            Some(_) => Ok(()),
            None => {
                census.published_root = Some(root.clone());
                census.published_uri = Some(uri.to_string());
                Ok(())
            }
        }
    }

    async fn insert_census_participants(
        &self,
        id: &CensusId,
        batch: &[CensusParticipant],
    ) -> Result<(), StoreError> {
        let mut s = self.lock();
        // Validate the whole batch before touching state: all-or-nothing.
        for row in batch {
            if let Some(existing) = s.participants.get(&(id.clone(), row.login_hash.clone())) {
                if existing.member_id != row.member_id {
                    return Err(StoreError::Conflict(format!(
                        "login hash collision in census {}",
                        id
                    )));
                }
            }
        }
        for row in batch {
            s.participants
                .insert((id.clone(), row.login_hash.clone()), row.clone());
            s.participants_by_member
                .insert((id.clone(), row.member_id.clone()), row.login_hash.clone());
        }
        Ok(())
    }

    async fn participant_by_login_hash(
        &self,
        id: &CensusId,
        hash: &LoginHash,
    ) -> Result<Option<CensusParticipant>, StoreError> {
        Ok(self
            .lock()
            .participants
            .get(&(id.clone(), hash.clone()))
            .cloned())
    }

    async fn participant_for_member(
        &self,
        id: &CensusId,
        member: &MemberId,
    ) -> Result<Option<CensusParticipant>, StoreError> {
        let s = self.lock();
        Ok(s.participants_by_member
            .get(&(id.clone(), member.clone()))
            .and_then(|hash| s.participants.get(&(id.clone(), hash.clone())))
            .cloned())
    }

    async fn census_size(&self, id: &CensusId) -> Result<u64, StoreError> {
        Ok(self
            .lock()
            .participants
            .keys()
            .filter(|(cid, _)| cid == id)
            .count() as u64)
    }

    async fn put_process(&self, process: &Process) -> Result<(), StoreError> {
        let mut s = self.lock();
        if let Some(existing) = s.processes.get(&process.id) {
            if !existing.draft {
                return Err(StoreError::Conflict(format!(
                    "process {} is immutable",
                    process.id
                )));
            }
        }
        s.processes.insert(process.id.clone(), process.clone());
        Ok(())
    }

    async fn process(&self, id: &ProcessId) -> Result<Process, StoreError> {
        self.lock()
            .processes
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn put_bundle(&self, bundle: &ProcessBundle) -> Result<(), StoreError> {
        self.lock().bundles.insert(bundle.id.clone(), bundle.clone());
        Ok(())
    }

    async fn bundle(&self, id: &BundleId) -> Result<ProcessBundle, StoreError> {
        self.lock()
            .bundles
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn append_bundle_processes(
        &self,
        id: &BundleId,
        processes: &[ProcessId],
    ) -> Result<(), StoreError> {
        let mut s = self.lock();
        let bundle = s.bundles.get_mut(id).ok_or(StoreError::NotFound)?;
        for p in processes {
            if !bundle.contains(p) {
                bundle.processes.push(p.clone());
            }
        }
        Ok(())
    }

    async fn bundles_referencing_census(&self, id: &CensusId) -> Result<u64, StoreError> {
        Ok(self
            .lock()
            .bundles
            .values()
            .filter(|b| &b.census_id == id)
            .count() as u64)
    }

    async fn challenge(&self, key: &ChallengeKey) -> Result<Option<ChallengeRecord>, StoreError> {
        Ok(self.lock().challenges.get(key).cloned())
    }

    async fn put_challenge_guarded(
        &self,
        record: &ChallengeRecord,
        expected_last_sent: Option<UnixMillis>,
    ) -> Result<(), StoreError> {
        let mut s = self.lock();
        let current = s.challenges.get(&record.key).map(|r| r.last_sent_at);
        if current != expected_last_sent {
            return Err(StoreError::Conflict(
                "challenge rotated concurrently".to_string(),
            ));
        }
        s.challenges.insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn decrement_challenge_attempts(&self, key: &ChallengeKey) -> Result<u32, StoreError> {
        let mut s = self.lock();
        let rec = s.challenges.get_mut(key).ok_or(StoreError::NotFound)?;
        rec.attempts_left = rec.attempts_left.saturating_sub(1);
        Ok(rec.attempts_left)
    }

    async fn delete_challenge(&self, key: &ChallengeKey) -> Result<(), StoreError> {
        self.lock().challenges.remove(key);
        Ok(())
    }

    async fn put_token(&self, token: &AuthToken) -> Result<(), StoreError> {
        let mut s = self.lock();
        s.tokens.insert(token.id, token.clone());
        s.tokens_by_key.insert(
            (token.bundle_id.clone(), token.member_id.clone()),
            token.id,
        );
        Ok(())
    }

    async fn token(&self, id: &TokenId) -> Result<Option<AuthToken>, StoreError> {
        Ok(self.lock().tokens.get(id).cloned())
    }

    async fn latest_token_for(
        &self,
        bundle: &BundleId,
        member: &MemberId,
    ) -> Result<Option<AuthToken>, StoreError> {
        let s = self.lock();
        Ok(s.tokens_by_key
            .get(&(bundle.clone(), member.clone()))
            .and_then(|id| s.tokens.get(id))
            .cloned())
    }

    async fn mark_token_verified(
        &self,
        id: &TokenId,
        expires_at: UnixMillis,
    ) -> Result<AuthToken, StoreError> {
        let mut s = self.lock();
        let token = s.tokens.get_mut(id).ok_or(StoreError::NotFound)?;
        if token.state == TokenState::Pending {
            token.state = TokenState::Verified;
            token.expires_at = expires_at;
        }
        Ok(token.clone())
    }

    async fn consume_token_process(
        &self,
        id: &TokenId,
        process: &ProcessId,
    ) -> Result<(), StoreError> {
        let mut s = self.lock();
        let token = s.tokens.get_mut(id).ok_or(StoreError::NotFound)?;
        if token.has_consumed(process) {
            return Err(StoreError::Conflict(format!(
                "process {} already consumed",
                process
            )));
        }
        token.consumed_processes.push(process.clone());
        Ok(())
    }

    async fn delete_expired_tokens(&self, now: UnixMillis) -> Result<u64, StoreError> {
        let mut s = self.lock();
        let expired: Vec<AuthToken> = s
            .tokens
            .values()
            .filter(|t| t.is_expired(now))
            .cloned()
            .collect();
        for token in &expired {
            s.tokens.remove(&token.id);
            let key = (token.bundle_id.clone(), token.member_id.clone());
            if s.tokens_by_key.get(&key) == Some(&token.id) {
                s.tokens_by_key.remove(&key);
            }
        }
        Ok(expired.len() as u64)
    }

    async fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        self.lock().jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn job(&self, org: &OrgAddress, id: &JobId) -> Result<Option<Job>, StoreError> {
        Ok(self
            .lock()
            .jobs
            .get(id)
            .filter(|j| &j.org_address == org)
            .cloned())
    }

    async fn delete_job(&self, id: &JobId) -> Result<(), StoreError> {
        self.lock().jobs.remove(id);
        Ok(())
    }
}
