// Path: crates/storage/src/redb_store.rs

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tally_api::store::CensusStore;
use tally_types::auth::{AuthToken, ChallengeKey, ChallengeRecord, TokenState};
use tally_types::census::{Census, CensusParticipant, CensusRoot, LoginHash};
use tally_types::codec;
use tally_types::election::{Process, ProcessBundle};
use tally_types::error::StoreError;
use tally_types::ids::{
    BundleId, CensusId, GroupId, JobId, MemberId, OrgAddress, ProcessId, TokenId,
};
use tally_types::job::Job;
use tally_types::member::{MemberGroup, OrgMember};
use tally_types::time::UnixMillis;

/// ---- Table definitions (single DB, length-prefixed composite keys) ----
const MEMBERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("MEMBERS");
const MEMBER_NUMBERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("MEMBER_NUMBERS");
const GROUPS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("GROUPS");
const CENSUSES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("CENSUSES");
const PARTICIPANTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("PARTICIPANTS");
const PARTICIPANTS_BY_MEMBER: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("PARTICIPANTS_BY_MEMBER");
const PROCESSES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("PROCESSES");
const BUNDLES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("BUNDLES");
const CHALLENGES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("CHALLENGES");
const TOKENS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("TOKENS");
const TOKENS_BY_KEY: TableDefinition<&[u8], &[u8]> = TableDefinition::new("TOKENS_BY_KEY");
const JOBS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("JOBS");

/// Composite key: `[len(a) be32][a][b]`. The length prefix keeps `(a, b)`
/// pairs unambiguous and makes every key with the same `a` share a scannable
/// prefix.
fn k2(a: &str, b: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + a.len() + b.len());
    key.extend_from_slice(&(a.len() as u32).to_be_bytes());
    key.extend_from_slice(a.as_bytes());
    key.extend_from_slice(b.as_bytes());
    key
}

/// The shared scan prefix of every `k2(a, _)` key.
fn k2_prefix(a: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + a.len());
    key.extend_from_slice(&(a.len() as u32).to_be_bytes());
    key.extend_from_slice(a.as_bytes());
    key
}

/// The smallest byte string strictly greater than every string with the
/// given prefix, or `None` when the prefix is all `0xff`.
fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut succ = prefix.to_vec();
    while let Some(last) = succ.pop() {
        if last < 0xff {
            succ.push(last + 1);
            return Some(succ);
        }
    }
    None
}

fn backend<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn enc<T: serde::Serialize>(v: &T) -> Result<Vec<u8>, StoreError> {
    codec::to_bytes_canonical(v).map_err(StoreError::Encode)
}

fn dec<T: serde::de::DeserializeOwned>(b: &[u8]) -> Result<T, StoreError> {
    codec::from_bytes_canonical(b).map_err(StoreError::Decode)
}

/// A durable [`CensusStore`] backed by a single redb database file.
#[derive(Clone)]
pub struct RedbCensusStore {
    db: Arc<Database>,
}

impl RedbCensusStore {
    /// Opens (or creates) the database and ensures every table exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(backend)?;
        {
            let w = db.begin_write().map_err(backend)?;
            {
                w.open_table(MEMBERS).map_err(backend)?;
                w.open_table(MEMBER_NUMBERS).map_err(backend)?;
                w.open_table(GROUPS).map_err(backend)?;
                w.open_table(CENSUSES).map_err(backend)?;
                w.open_table(PARTICIPANTS).map_err(backend)?;
                w.open_table(PARTICIPANTS_BY_MEMBER).map_err(backend)?;
                w.open_table(PROCESSES).map_err(backend)?;
                w.open_table(BUNDLES).map_err(backend)?;
                w.open_table(CHALLENGES).map_err(backend)?;
                w.open_table(TOKENS).map_err(backend)?;
                w.open_table(TOKENS_BY_KEY).map_err(backend)?;
                w.open_table(JOBS).map_err(backend)?;
            }
            w.commit().map_err(backend)?;
        }
        Ok(Self { db: Arc::new(db) })
    }

    /// Point read of one record.
    fn get_raw(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let r = self.db.begin_read().map_err(backend)?;
        let t = r.open_table(table).map_err(backend)?;
        let result = t.get(key).map_err(backend)?.map(|v| v.value().to_vec());
        Ok(result)
    }

    /// Point write of one record.
    fn put_raw(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), StoreError> {
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut t = w.open_table(table).map_err(backend)?;
            t.insert(key, value).map_err(backend)?;
        }
        w.commit().map_err(backend)
    }

    fn delete_raw(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
    ) -> Result<(), StoreError> {
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut t = w.open_table(table).map_err(backend)?;
            t.remove(key).map_err(backend)?;
        }
        w.commit().map_err(backend)
    }

    /// Collects every value whose key starts with `prefix`.
    fn scan_prefix(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        prefix: &[u8],
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        let r = self.db.begin_read().map_err(backend)?;
        let t = r.open_table(table).map_err(backend)?;
        let mut out = Vec::new();
        let iter = match prefix_successor(prefix) {
            Some(end) => t.range(prefix..end.as_slice()).map_err(backend)?,
            None => t.range(prefix..).map_err(backend)?,
        };
        for entry in iter {
            let (_, v) = entry.map_err(backend)?;
            out.push(v.value().to_vec());
        }
        Ok(out)
    }
}

#[async_trait]
impl CensusStore for RedbCensusStore {
    async fn put_member(&self, member: &OrgMember) -> Result<(), StoreError> {
        let value = enc(member)?;
        let member_key = k2(member.org_address.as_str(), member.id.as_str());
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut numbers = w.open_table(MEMBER_NUMBERS).map_err(backend)?;
            if !member.member_number.is_empty() {
                let number_key = k2(member.org_address.as_str(), &member.member_number);
                if let Some(existing) = numbers.get(number_key.as_slice()).map_err(backend)? {
                    if existing.value() != member.id.as_str().as_bytes() {
                        return Err(StoreError::Conflict(format!(
                            "member number {} already in use",
                            member.member_number
                        )));
                    }
                }
                numbers
                    .insert(number_key.as_slice(), member.id.as_str().as_bytes())
                    .map_err(backend)?;
            }
            let mut members = w.open_table(MEMBERS).map_err(backend)?;
            members
                .insert(member_key.as_slice(), value.as_slice())
                .map_err(backend)?;
        }
        w.commit().map_err(backend)
    }

    async fn member(&self, org: &OrgAddress, id: &MemberId) -> Result<OrgMember, StoreError> {
        let raw = self
            .get_raw(MEMBERS, &k2(org.as_str(), id.as_str()))?
            .ok_or(StoreError::NotFound)?;
        dec(&raw)
    }

    async fn put_group(&self, group: &MemberGroup) -> Result<(), StoreError> {
        self.put_raw(
            GROUPS,
            &k2(group.org_address.as_str(), group.id.as_str()),
            &enc(group)?,
        )
    }

    async fn group(&self, org: &OrgAddress, id: &GroupId) -> Result<MemberGroup, StoreError> {
        let raw = self
            .get_raw(GROUPS, &k2(org.as_str(), id.as_str()))?
            .ok_or(StoreError::NotFound)?;
        dec(&raw)
    }

    async fn group_members_page(
        &self,
        org: &OrgAddress,
        id: &GroupId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<OrgMember>, StoreError> {
        let group = self.group(org, id).await?;
        let mut page = Vec::new();
        for member_id in group.member_ids.iter().skip(offset).take(limit) {
            match self.member(org, member_id).await {
                Ok(m) => page.push(m),
                Err(StoreError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(page)
    }

    async fn put_census(&self, census: &Census) -> Result<(), StoreError> {
        self.put_raw(CENSUSES, census.id.as_str().as_bytes(), &enc(census)?)
    }

    async fn census(&self, id: &CensusId) -> Result<Census, StoreError> {
        let raw = self
            .get_raw(CENSUSES, id.as_str().as_bytes())?
            .ok_or(StoreError::NotFound)?;
        dec(&raw)
    }

    async fn delete_census(&self, id: &CensusId) -> Result<(), StoreError> {
        if self.bundles_referencing_census(id).await? > 0 {
            return Err(StoreError::Conflict(
                "census is referenced by a bundle".to_string(),
            ));
        }
        self.delete_raw(CENSUSES, id.as_str().as_bytes())
    }

    async fn set_published_census(
        &self,
        id: &CensusId,
        root: &CensusRoot,
        uri: &str,
    ) -> Result<(), StoreError> {
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut censuses = w.open_table(CENSUSES).map_err(backend)?;
            let mut census: Census = match censuses.get(id.as_str().as_bytes()).map_err(backend)? {
                Some(raw) => dec(raw.value())?,
                None => return Err(StoreError::NotFound),
            };
            match &census.published_root {
                Some(existing) if existing != root => {
                    return Err(StoreError::Conflict(
                        "census already published with a different root".to_string(),
                    ));
                }
                Some(_) => {} // idempotent republish
                None => {
                    census.published_root = Some(root.clone());
                    census.published_uri = Some(uri.to_string());
                }
            }
            let value = enc(&census)?;
            censuses
                .insert(id.as_str().as_bytes(), value.as_slice())
                .map_err(backend)?;
        }
        w.commit().map_err(backend)
    }

    async fn insert_census_participants(
        &self,
        id: &CensusId,
        batch: &[CensusParticipant],
    ) -> Result<(), StoreError> {
        // One write transaction: dropping it without commit aborts the whole
        // batch, which is what gives the all-or-nothing guarantee.
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut by_hash = w.open_table(PARTICIPANTS).map_err(backend)?;
            let mut by_member = w.open_table(PARTICIPANTS_BY_MEMBER).map_err(backend)?;
            for row in batch {
                let hash_key = k2(id.as_str(), row.login_hash.as_str());
                if let Some(existing) = by_hash.get(hash_key.as_slice()).map_err(backend)? {
                    let current: CensusParticipant = dec(existing.value())?;
                    if current.member_id != row.member_id {
                        return Err(StoreError::Conflict(format!(
                            "login hash collision in census {}",
                            id
                        )));
                    }
                }
                let value = enc(row)?;
                by_hash
                    .insert(hash_key.as_slice(), value.as_slice())
                    .map_err(backend)?;
                let member_key = k2(id.as_str(), row.member_id.as_str());
                by_member
                    .insert(member_key.as_slice(), row.login_hash.as_str().as_bytes())
                    .map_err(backend)?;
            }
        }
        w.commit().map_err(backend)
    }

    async fn participant_by_login_hash(
        &self,
        id: &CensusId,
        hash: &LoginHash,
    ) -> Result<Option<CensusParticipant>, StoreError> {
        match self.get_raw(PARTICIPANTS, &k2(id.as_str(), hash.as_str()))? {
            Some(raw) => Ok(Some(dec(&raw)?)),
            None => Ok(None),
        }
    }

    async fn participant_for_member(
        &self,
        id: &CensusId,
        member: &MemberId,
    ) -> Result<Option<CensusParticipant>, StoreError> {
        let hash = match self.get_raw(PARTICIPANTS_BY_MEMBER, &k2(id.as_str(), member.as_str()))? {
            Some(raw) => String::from_utf8(raw).map_err(|e| StoreError::Decode(e.to_string()))?,
            None => return Ok(None),
        };
        self.participant_by_login_hash(id, &LoginHash(hash)).await
    }

    async fn census_size(&self, id: &CensusId) -> Result<u64, StoreError> {
        Ok(self.scan_prefix(PARTICIPANTS, &k2_prefix(id.as_str()))?.len() as u64)
    }

    async fn put_process(&self, process: &Process) -> Result<(), StoreError> {
        let value = enc(process)?;
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut processes = w.open_table(PROCESSES).map_err(backend)?;
            if let Some(existing) = processes.get(process.id.as_bytes()).map_err(backend)? {
                let current: Process = dec(existing.value())?;
                if !current.draft {
                    return Err(StoreError::Conflict(format!(
                        "process {} is immutable",
                        process.id
                    )));
                }
            }
            processes
                .insert(process.id.as_bytes(), value.as_slice())
                .map_err(backend)?;
        }
        w.commit().map_err(backend)
    }

    async fn process(&self, id: &ProcessId) -> Result<Process, StoreError> {
        let raw = self
            .get_raw(PROCESSES, id.as_bytes())?
            .ok_or(StoreError::NotFound)?;
        dec(&raw)
    }

    async fn put_bundle(&self, bundle: &ProcessBundle) -> Result<(), StoreError> {
        self.put_raw(BUNDLES, bundle.id.as_str().as_bytes(), &enc(bundle)?)
    }

    async fn bundle(&self, id: &BundleId) -> Result<ProcessBundle, StoreError> {
        let raw = self
            .get_raw(BUNDLES, id.as_str().as_bytes())?
            .ok_or(StoreError::NotFound)?;
        dec(&raw)
    }

    async fn append_bundle_processes(
        &self,
        id: &BundleId,
        processes: &[ProcessId],
    ) -> Result<(), StoreError> {
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut bundles = w.open_table(BUNDLES).map_err(backend)?;
            let mut bundle: ProcessBundle =
                match bundles.get(id.as_str().as_bytes()).map_err(backend)? {
                    Some(raw) => dec(raw.value())?,
                    None => return Err(StoreError::NotFound),
                };
            for p in processes {
                if !bundle.contains(p) {
                    bundle.processes.push(p.clone());
                }
            }
            let value = enc(&bundle)?;
            bundles
                .insert(id.as_str().as_bytes(), value.as_slice())
                .map_err(backend)?;
        }
        w.commit().map_err(backend)
    }

    async fn bundles_referencing_census(&self, id: &CensusId) -> Result<u64, StoreError> {
        let r = self.db.begin_read().map_err(backend)?;
        let t = r.open_table(BUNDLES).map_err(backend)?;
        let mut count = 0u64;
        for entry in t.iter().map_err(backend)? {
            let (_, v) = entry.map_err(backend)?;
            let bundle: ProcessBundle = dec(v.value())?;
            if &bundle.census_id == id {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn challenge(&self, key: &ChallengeKey) -> Result<Option<ChallengeRecord>, StoreError> {
        match self.get_raw(
            CHALLENGES,
            &k2(key.bundle_id.as_str(), key.member_id.as_str()),
        )? {
            Some(raw) => Ok(Some(dec(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put_challenge_guarded(
        &self,
        record: &ChallengeRecord,
        expected_last_sent: Option<UnixMillis>,
    ) -> Result<(), StoreError> {
        let key = k2(record.key.bundle_id.as_str(), record.key.member_id.as_str());
        let value = enc(record)?;
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut challenges = w.open_table(CHALLENGES).map_err(backend)?;
            let current = match challenges.get(key.as_slice()).map_err(backend)? {
                Some(raw) => {
                    let rec: ChallengeRecord = dec(raw.value())?;
                    Some(rec.last_sent_at)
                }
                None => None,
            };
            if current != expected_last_sent {
                return Err(StoreError::Conflict(
                    "challenge rotated concurrently".to_string(),
                ));
            }
            challenges
                .insert(key.as_slice(), value.as_slice())
                .map_err(backend)?;
        }
        w.commit().map_err(backend)
    }

    async fn decrement_challenge_attempts(&self, key: &ChallengeKey) -> Result<u32, StoreError> {
        let raw_key = k2(key.bundle_id.as_str(), key.member_id.as_str());
        let w = self.db.begin_write().map_err(backend)?;
        let remaining;
        {
            let mut challenges = w.open_table(CHALLENGES).map_err(backend)?;
            let mut rec: ChallengeRecord =
                match challenges.get(raw_key.as_slice()).map_err(backend)? {
                    Some(raw) => dec(raw.value())?,
                    None => return Err(StoreError::NotFound),
                };
            rec.attempts_left = rec.attempts_left.saturating_sub(1);
            remaining = rec.attempts_left;
            let value = enc(&rec)?;
            challenges
                .insert(raw_key.as_slice(), value.as_slice())
                .map_err(backend)?;
        }
        w.commit().map_err(backend)?;
        Ok(remaining)
    }

    async fn delete_challenge(&self, key: &ChallengeKey) -> Result<(), StoreError> {
        self.delete_raw(
            CHALLENGES,
            &k2(key.bundle_id.as_str(), key.member_id.as_str()),
        )
    }

    async fn put_token(&self, token: &AuthToken) -> Result<(), StoreError> {
        let value = enc(token)?;
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut tokens = w.open_table(TOKENS).map_err(backend)?;
            tokens
                .insert(token.id.as_bytes(), value.as_slice())
                .map_err(backend)?;
            let mut by_key = w.open_table(TOKENS_BY_KEY).map_err(backend)?;
            let key = k2(token.bundle_id.as_str(), token.member_id.as_str());
            by_key
                .insert(key.as_slice(), token.id.as_bytes())
                .map_err(backend)?;
        }
        w.commit().map_err(backend)
    }

    async fn token(&self, id: &TokenId) -> Result<Option<AuthToken>, StoreError> {
        match self.get_raw(TOKENS, id.as_bytes())? {
            Some(raw) => Ok(Some(dec(&raw)?)),
            None => Ok(None),
        }
    }

    async fn latest_token_for(
        &self,
        bundle: &BundleId,
        member: &MemberId,
    ) -> Result<Option<AuthToken>, StoreError> {
        let token_id = match self.get_raw(TOKENS_BY_KEY, &k2(bundle.as_str(), member.as_str()))? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        match self.get_raw(TOKENS, &token_id)? {
            Some(raw) => Ok(Some(dec(&raw)?)),
            None => Ok(None), // swept since
        }
    }

    async fn mark_token_verified(
        &self,
        id: &TokenId,
        expires_at: UnixMillis,
    ) -> Result<AuthToken, StoreError> {
        let w = self.db.begin_write().map_err(backend)?;
        let updated;
        {
            let mut tokens = w.open_table(TOKENS).map_err(backend)?;
            let mut token: AuthToken = match tokens.get(id.as_bytes()).map_err(backend)? {
                Some(raw) => dec(raw.value())?,
                None => return Err(StoreError::NotFound),
            };
            if token.state == TokenState::Pending {
                token.state = TokenState::Verified;
                token.expires_at = expires_at;
                let value = enc(&token)?;
                tokens
                    .insert(id.as_bytes(), value.as_slice())
                    .map_err(backend)?;
            }
            updated = token;
        }
        w.commit().map_err(backend)?;
        Ok(updated)
    }

    async fn consume_token_process(
        &self,
        id: &TokenId,
        process: &ProcessId,
    ) -> Result<(), StoreError> {
        // Conditional update inside a single writer transaction. redb
        // serializes writers, so two concurrent consumers of the same
        // (token, process) pair cannot both observe it absent.
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut tokens = w.open_table(TOKENS).map_err(backend)?;
            let mut token: AuthToken = match tokens.get(id.as_bytes()).map_err(backend)? {
                Some(raw) => dec(raw.value())?,
                None => return Err(StoreError::NotFound),
            };
            if token.has_consumed(process) {
                return Err(StoreError::Conflict(format!(
                    "process {} already consumed",
                    process
                )));
            }
            token.consumed_processes.push(process.clone());
            let value = enc(&token)?;
            tokens
                .insert(id.as_bytes(), value.as_slice())
                .map_err(backend)?;
        }
        w.commit().map_err(backend)
    }

    async fn delete_expired_tokens(&self, now: UnixMillis) -> Result<u64, StoreError> {
        let w = self.db.begin_write().map_err(backend)?;
        let mut removed = 0u64;
        {
            let mut tokens = w.open_table(TOKENS).map_err(backend)?;
            let mut by_key = w.open_table(TOKENS_BY_KEY).map_err(backend)?;
            let mut expired = Vec::new();
            for entry in tokens.iter().map_err(backend)? {
                let (k, v) = entry.map_err(backend)?;
                let token: AuthToken = dec(v.value())?;
                if token.is_expired(now) {
                    expired.push((k.value().to_vec(), token));
                }
            }
            for (raw_id, token) in expired {
                tokens.remove(raw_id.as_slice()).map_err(backend)?;
                let key = k2(token.bundle_id.as_str(), token.member_id.as_str());
                // Only drop the index entry if it still points at this token.
                let points_here = by_key
                    .get(key.as_slice())
                    .map_err(backend)?
                    .map(|v| v.value() == raw_id.as_slice())
                    .unwrap_or(false);
                if points_here {
                    by_key.remove(key.as_slice()).map_err(backend)?;
                }
                removed += 1;
            }
        }
        w.commit().map_err(backend)?;
        Ok(removed)
    }

    async fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        self.put_raw(JOBS, job.id.as_bytes(), &enc(job)?)
    }

    async fn job(&self, org: &OrgAddress, id: &JobId) -> Result<Option<Job>, StoreError> {
        match self.get_raw(JOBS, id.as_bytes())? {
            Some(raw) => {
                let job: Job = dec(&raw)?;
                if &job.org_address != org {
                    return Ok(None);
                }
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn delete_job(&self, id: &JobId) -> Result<(), StoreError> {
        self.delete_raw(JOBS, id.as_bytes())
    }
}
