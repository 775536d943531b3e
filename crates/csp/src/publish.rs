// Path: crates/csp/src/publish.rs

//! Census materialization, validation, and member ingestion.
//!
//! Publication streams a group's members in batches, derives each login
//! hash, and detects duplicates and missing required values in a single
//! pass. The synchronous path publishes nothing unless the whole scan is
//! clean; the job path (driven by `jobs`) skips bad rows, records them on
//! the job, and publishes the rest.

use std::collections::HashMap;
use std::sync::Arc;
use tally_api::store::CensusStore;
use tally_crypto::hash::{auth_login_hash, hash_org_data, hash_password};
use tally_types::census::{
    AuthField, AuthFieldSource, Census, CensusParticipant, CensusRoot, TwoFaField,
};
use tally_types::config::CspConfig;
use tally_types::error::{CensusValidation, CspError, StoreError};
use tally_types::ids::{CensusId, GroupId, MemberId, OrgAddress};
use tally_types::job::JobRowError;
use tally_types::member::{valid_birth_date, OrgMember, RawMember};
use tally_types::time::now_ms;

/// The published view of a census returned to the admin.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedCensus {
    /// The census root: the CSP public key.
    pub root: CensusRoot,
    /// The public census URI.
    pub uri: String,
    /// Number of participants after publication.
    pub size: u64,
}

/// The field declaration accompanying a publish call. Unset fields keep the
/// census's stored declaration.
#[derive(Debug, Clone, Default)]
pub struct PublishDeclaration {
    /// Identity fields to match, in order.
    pub auth_fields: Option<Vec<AuthField>>,
    /// Challenge channels, in order.
    pub two_fa_fields: Option<Vec<TwoFaField>>,
    /// Whether participant weights are significant.
    pub weighted: Option<bool>,
}

/// The outcome of one scanned member row.
enum ScannedRow {
    Valid(CensusParticipant),
    Missing(MemberId),
}

/// The census publication engine.
#[derive(Clone)]
pub struct PublishEngine {
    store: Arc<dyn CensusStore>,
    cfg: Arc<CspConfig>,
    root: CensusRoot,
}

impl PublishEngine {
    /// Creates the engine. `root` is the CSP public key, identical for every
    /// group-based census.
    pub fn new(store: Arc<dyn CensusStore>, cfg: Arc<CspConfig>, root: CensusRoot) -> Self {
        Self { store, cfg, root }
    }

    /// The census root every publication anchors to.
    pub fn root(&self) -> &CensusRoot {
        &self.root
    }

    /// Builds the public URI a published census is served under.
    pub fn census_uri(&self, id: &CensusId) -> String {
        format!(
            "{}/process/census/{}",
            self.cfg.server_url.trim_end_matches('/'),
            id
        )
    }

    /// Synchronous publication: all-or-nothing.
    ///
    /// A dirty scan returns the structured validation payload and publishes
    /// nothing. Re-publishing an already-published census with the same
    /// declaration is idempotent and returns the stored root and URI.
    pub async fn publish_group(
        &self,
        census_id: &CensusId,
        group_id: &GroupId,
        declaration: &PublishDeclaration,
    ) -> Result<PublishedCensus, CspError> {
        let census = self.prepare(census_id, group_id, declaration).await?;

        let mut validation = CensusValidation::default();
        let mut rows: Vec<CensusParticipant> = Vec::new();
        let mut by_hash: HashMap<String, Vec<MemberId>> = HashMap::new();
        self.scan(&census, group_id, |scanned| match scanned {
            ScannedRow::Valid(row) => {
                let owners = by_hash.entry(row.login_hash.as_str().to_string()).or_default();
                if !owners.contains(&row.member_id) {
                    owners.push(row.member_id.clone());
                    rows.push(row);
                }
            }
            ScannedRow::Missing(id) => {
                validation.members.push(id.clone());
                validation.missing_data.push(id);
            }
        })
        .await?;

        // Every member of a colliding hash group is reported, including the
        // first one scanned.
        for owners in by_hash.values() {
            if owners.len() > 1 {
                for id in owners {
                    validation.members.push(id.clone());
                    validation.duplicates.push(id.clone());
                }
            }
        }

        if !validation.is_clean() {
            return Err(CspError::ValidationFailed(validation));
        }

        for chunk in rows.chunks(self.cfg.job_batch_size.max(1)) {
            match self.store.insert_census_participants(census_id, chunk).await {
                Ok(()) => {}
                Err(StoreError::Conflict(msg)) => {
                    return Err(CspError::DuplicateConflict(msg));
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.finish(census_id).await
    }

    /// Job-path publication: bad rows are recorded, good rows are published.
    ///
    /// Invokes `checkpoint` with `(processed, row_errors)` after every
    /// streamed batch so the caller can persist progress; a row failure
    /// never aborts the run.
    pub async fn publish_group_for_job<F, Fut>(
        &self,
        census_id: &CensusId,
        group_id: &GroupId,
        declaration: &PublishDeclaration,
        mut checkpoint: F,
    ) -> Result<PublishedCensus, CspError>
    where
        F: FnMut(u64, Vec<JobRowError>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let census = self.prepare(census_id, group_id, declaration).await?;
        self.ensure_group(&census.org_address, group_id).await?;

        let mut seen: HashMap<String, MemberId> = HashMap::new();
        let batch = self.cfg.job_batch_size.max(1);
        let mut offset = 0usize;
        let mut processed = 0u64;
        loop {
            let page = self
                .store
                .group_members_page(&census.org_address, group_id, offset, batch)
                .await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();

            let mut rows = Vec::new();
            let mut errors = Vec::new();
            for member in &page {
                processed += 1;
                match self.classify(&census, member) {
                    ScannedRow::Valid(row) => match seen.get(row.login_hash.as_str()) {
                        // First occurrence wins; a later member with the
                        // same hash becomes a row error.
                        None => {
                            seen.insert(row.login_hash.as_str().to_string(), row.member_id.clone());
                            rows.push(row);
                        }
                        Some(first) if first == &row.member_id => {}
                        Some(_) => errors.push(JobRowError {
                            member_id: row.member_id,
                            reason: "duplicate login hash".to_string(),
                        }),
                    },
                    ScannedRow::Missing(id) => errors.push(JobRowError {
                        member_id: id,
                        reason: "missing required auth field value".to_string(),
                    }),
                }
            }

            match self.store.insert_census_participants(census_id, &rows).await {
                Ok(()) => {}
                Err(StoreError::Conflict(_)) => {
                    // A clash against rows published earlier: retry the
                    // batch row by row so only the colliding ones drop out.
                    for row in &rows {
                        match self
                            .store
                            .insert_census_participants(census_id, std::slice::from_ref(row))
                            .await
                        {
                            Ok(()) => {}
                            Err(StoreError::Conflict(_)) => errors.push(JobRowError {
                                member_id: row.member_id.clone(),
                                reason: "duplicate login hash".to_string(),
                            }),
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
            checkpoint(processed, errors).await;
        }

        self.finish(census_id).await
    }

    /// Loads and prepares the census: declaration updates, idempotency, and
    /// monotonic publication checks.
    async fn prepare(
        &self,
        census_id: &CensusId,
        group_id: &GroupId,
        declaration: &PublishDeclaration,
    ) -> Result<Census, CspError> {
        let mut census = match self.store.census(census_id).await {
            Ok(c) => c,
            Err(StoreError::NotFound) => {
                return Err(CspError::MalformedParam(format!(
                    "unknown census {}",
                    census_id
                )))
            }
            Err(e) => return Err(e.into()),
        };

        if census.is_published() {
            let same_auth = declaration
                .auth_fields
                .as_ref()
                .map_or(true, |f| f == &census.auth_fields);
            let same_two_fa = declaration
                .two_fa_fields
                .as_ref()
                .map_or(true, |f| f == &census.two_fa_fields);
            if !same_auth || !same_two_fa {
                return Err(CspError::DuplicateConflict(
                    "census already published with a different declaration".to_string(),
                ));
            }
            return Ok(census);
        }

        if let Some(fields) = &declaration.auth_fields {
            census.auth_fields = fields.clone();
        }
        if let Some(fields) = &declaration.two_fa_fields {
            census.two_fa_fields = fields.clone();
        }
        if let Some(weighted) = declaration.weighted {
            census.weighted = weighted;
        }
        if !census.valid_field_sets() {
            return Err(CspError::BadRequest(
                "census needs at least one auth or challenge field".to_string(),
            ));
        }
        census.group_id = Some(group_id.clone());
        self.store.put_census(&census).await?;
        Ok(census)
    }

    async fn ensure_group(&self, org: &OrgAddress, group_id: &GroupId) -> Result<(), CspError> {
        match self.store.group(org, group_id).await {
            Ok(_) => Ok(()),
            Err(StoreError::NotFound) => Err(CspError::MalformedParam(format!(
                "unknown group {}",
                group_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Streams the group's members in batches and classifies every row in a
    /// single pass.
    async fn scan<F>(
        &self,
        census: &Census,
        group_id: &GroupId,
        mut each: F,
    ) -> Result<(), CspError>
    where
        F: FnMut(ScannedRow),
    {
        let org = &census.org_address;
        self.ensure_group(org, group_id).await?;

        let batch = self.cfg.job_batch_size.max(1);
        let mut offset = 0usize;
        loop {
            let page = self
                .store
                .group_members_page(org, group_id, offset, batch)
                .await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();
            for member in &page {
                each(self.classify(census, member));
            }
        }
        Ok(())
    }

    fn classify(&self, census: &Census, member: &OrgMember) -> ScannedRow {
        let missing = census
            .auth_fields
            .iter()
            .any(|field| member.auth_field_value(*field).is_empty());
        if missing {
            return ScannedRow::Missing(member.id.clone());
        }
        let login_hash = auth_login_hash(&census.org_address, &census.auth_fields, member);
        ScannedRow::Valid(CensusParticipant {
            census_id: census.id.clone(),
            member_id: member.id.clone(),
            login_hash,
            weight: if census.weighted { member.weight } else { 1 },
        })
    }

    /// Records the root and URI and returns the published view.
    async fn finish(&self, census_id: &CensusId) -> Result<PublishedCensus, CspError> {
        let uri = self.census_uri(census_id);
        match self
            .store
            .set_published_census(census_id, &self.root, &uri)
            .await
        {
            Ok(()) => {}
            Err(StoreError::Conflict(msg)) => return Err(CspError::DuplicateConflict(msg)),
            Err(e) => return Err(e.into()),
        }
        // Publication is monotonic; a republish returns the stored values.
        let census = self.store.census(census_id).await?;
        let size = self.store.census_size(census_id).await?;
        Ok(PublishedCensus {
            root: census.published_root.unwrap_or_else(|| self.root.clone()),
            uri: census.published_uri.unwrap_or(uri),
            size,
        })
    }
}

/// The outcome of a synchronous member ingestion.
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    /// Rows stored.
    pub added: u64,
    /// Rows rejected, with reasons.
    pub errors: Vec<JobRowError>,
}

/// Hashes a raw member row into its stored shape.
///
/// This is the only place cleartext contact data is consumed; the returned
/// member carries hashes only.
pub fn ingest_member(
    org: &OrgAddress,
    salt: &[u8],
    raw: RawMember,
) -> Result<OrgMember, String> {
    if !valid_birth_date(&raw.birth_date) {
        return Err(format!("invalid birth date {:?}", raw.birth_date));
    }
    let id = raw
        .id
        .unwrap_or_else(|| MemberId::from(tally_crypto::rand::new_token().to_string()));
    let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
    Ok(OrgMember {
        id,
        org_address: org.clone(),
        member_number: raw.member_number,
        name: raw.name,
        surname: raw.surname,
        national_id: raw.national_id,
        birth_date: raw.birth_date,
        hashed_email: non_empty(raw.email).map(|e| hash_org_data(org, &e)),
        hashed_phone: non_empty(raw.phone).map(|p| hash_org_data(org, &p)),
        hashed_password: non_empty(raw.password).map(|p| hash_password(salt, &p)),
        weight: raw.weight,
        other: raw.other,
        created_at: now_ms(),
    })
}

/// Ingests a batch of raw members, accumulating per-row failures.
pub async fn ingest_members(
    store: &Arc<dyn CensusStore>,
    org: &OrgAddress,
    salt: &[u8],
    batch: Vec<RawMember>,
) -> Result<IngestOutcome, CspError> {
    let mut outcome = IngestOutcome::default();
    for raw in batch {
        let number = raw.member_number.clone();
        let member = match ingest_member(org, salt, raw) {
            Ok(m) => m,
            Err(reason) => {
                outcome.errors.push(JobRowError {
                    member_id: MemberId::from(number.as_str()),
                    reason,
                });
                continue;
            }
        };
        match store.put_member(&member).await {
            Ok(()) => outcome.added += 1,
            Err(StoreError::Conflict(reason)) => outcome.errors.push(JobRowError {
                member_id: member.id.clone(),
                reason,
            }),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> OrgAddress {
        OrgAddress::from("0xorg")
    }

    #[test]
    fn ingestion_hashes_contacts_and_drops_cleartext() {
        let raw = RawMember {
            member_number: "P001".into(),
            name: "John".into(),
            email: Some("j@x".into()),
            phone: Some("+34600000000".into()),
            password: Some("hunter2".into()),
            ..Default::default()
        };
        let member = ingest_member(&org(), b"salt", raw).unwrap();
        assert_eq!(member.hashed_email.as_deref(), Some(hash_org_data(&org(), "j@x").as_str()));
        assert_eq!(
            member.hashed_phone.as_deref(),
            Some(hash_org_data(&org(), "+34600000000").as_str())
        );
        assert_eq!(
            member.hashed_password.as_deref(),
            Some(hash_password(b"salt", "hunter2").as_str())
        );
    }

    #[test]
    fn weight_defaults_to_one_only_when_unset() {
        // Absent on the wire: the serde default applies.
        let raw: RawMember = serde_json::from_str(r#"{"memberNumber":"P001"}"#).unwrap();
        let member = ingest_member(&org(), b"salt", raw).unwrap();
        assert_eq!(member.weight, 1);

        // An explicit zero is a deliberate assignment and survives as-is.
        let raw: RawMember =
            serde_json::from_str(r#"{"memberNumber":"P002","weight":0}"#).unwrap();
        let member = ingest_member(&org(), b"salt", raw).unwrap();
        assert_eq!(member.weight, 0);
    }

    #[test]
    fn broken_birth_dates_are_rejected() {
        let raw = RawMember {
            member_number: "P001".into(),
            birth_date: "01/05/1990".into(),
            ..Default::default()
        };
        assert!(ingest_member(&org(), b"salt", raw).is_err());
    }
}
