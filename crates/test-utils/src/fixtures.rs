// Path: crates/test-utils/src/fixtures.rs

//! Builders for the records tests seed the store with.

use tally_crypto::hash::hash_org_data;
use tally_types::census::{AuthField, Census, TwoFaField};
use tally_types::election::{Process, ProcessBundle};
use tally_types::ids::{BundleId, CensusId, GroupId, MemberId, OrgAddress, ProcessId};
use tally_types::member::{MemberGroup, OrgMember, RawMember};

/// The organization address most fixtures live under.
pub fn org() -> OrgAddress {
    OrgAddress::from("0x4242424242424242424242424242424242424242")
}

/// A stored member with hashed contact data.
pub fn member(id: &str, number: &str, name: &str, surname: &str, email: &str) -> OrgMember {
    let org = org();
    OrgMember {
        id: MemberId::from(id),
        org_address: org.clone(),
        member_number: number.into(),
        name: name.into(),
        surname: surname.into(),
        national_id: String::new(),
        birth_date: String::new(),
        hashed_email: (!email.is_empty()).then(|| hash_org_data(&org, email)),
        hashed_phone: None,
        hashed_password: None,
        weight: 1,
        other: Default::default(),
        created_at: 0,
    }
}

/// Adds a hashed phone to a member fixture.
pub fn with_phone(mut m: OrgMember, phone: &str) -> OrgMember {
    m.hashed_phone = Some(hash_org_data(&m.org_address, phone));
    m
}

/// A raw (pre-ingestion) member row.
pub fn raw_member(number: &str, name: &str, surname: &str, email: &str) -> RawMember {
    RawMember {
        id: None,
        member_number: number.into(),
        name: name.into(),
        surname: surname.into(),
        national_id: String::new(),
        birth_date: String::new(),
        email: (!email.is_empty()).then(|| email.to_string()),
        phone: None,
        password: None,
        weight: 1,
        other: Default::default(),
    }
}

/// A group over the given member identifiers.
pub fn group(id: &str, member_ids: &[&str]) -> MemberGroup {
    MemberGroup {
        id: GroupId::from(id),
        org_address: org(),
        title: format!("group {}", id),
        member_ids: member_ids.iter().map(|m| MemberId::from(*m)).collect(),
        created_at: 0,
    }
}

/// An unpublished census with the given field declaration.
pub fn census(id: &str, auth: &[AuthField], two_fa: &[TwoFaField]) -> Census {
    Census {
        id: CensusId::from(id),
        org_address: org(),
        auth_fields: auth.to_vec(),
        two_fa_fields: two_fa.to_vec(),
        weighted: false,
        group_id: None,
        published_root: None,
        published_uri: None,
        created_at: 0,
    }
}

/// A non-draft process drawing on the given census.
pub fn process(id: u8, census_id: &str) -> Process {
    Process {
        id: ProcessId(vec![id; 32]),
        org_address: org(),
        census_id: CensusId::from(census_id),
        census_root: None,
        census_uri: None,
        metadata: None,
        draft: false,
        created_at: 0,
    }
}

/// A bundle over the given processes.
pub fn bundle(id: &str, census_id: &str, processes: &[u8]) -> ProcessBundle {
    ProcessBundle {
        id: BundleId::from(id),
        org_address: org(),
        census_id: CensusId::from(census_id),
        processes: processes.iter().map(|p| ProcessId(vec![*p; 32])).collect(),
        created_at: 0,
    }
}
