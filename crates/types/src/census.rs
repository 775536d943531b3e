// Path: crates/types/src/census.rs

//! Censuses, the closed auth/two-factor field sets, and census participants.

use crate::ids::{CensusId, GroupId, MemberId, OrgAddress};
use crate::time::UnixMillis;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The separator byte joining auth field values before hashing.
///
/// ASCII unit separator: it cannot appear in any of the field values, so the
/// concatenation of `n` values is injective for a fixed field order.
pub const LOGIN_HASH_SEPARATOR: u8 = 0x1f;

/// An identity field a census may declare for voter authentication.
///
/// The set is closed; the declared order is part of the login-hash input and
/// therefore significant.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuthField {
    /// Given name.
    #[serde(rename = "name")]
    Name,
    /// Family name.
    #[serde(rename = "surname")]
    Surname,
    /// Organization-assigned member number.
    #[serde(rename = "memberNumber")]
    MemberNumber,
    /// National identity document number.
    #[serde(rename = "nationalID")]
    NationalId,
    /// Birth date.
    #[serde(rename = "birthDate")]
    BirthDate,
}

impl AuthField {
    /// All auth fields, in canonical declaration order.
    pub const ALL: [AuthField; 5] = [
        AuthField::Name,
        AuthField::Surname,
        AuthField::MemberNumber,
        AuthField::NationalId,
        AuthField::BirthDate,
    ];

    /// The wire name of the field.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthField::Name => "name",
            AuthField::Surname => "surname",
            AuthField::MemberNumber => "memberNumber",
            AuthField::NationalId => "nationalID",
            AuthField::BirthDate => "birthDate",
        }
    }
}

impl fmt::Display for AuthField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A challenge-delivery field a census may declare for the second auth step.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TwoFaField {
    /// Challenge delivered by email.
    #[serde(rename = "email")]
    Email,
    /// Challenge delivered by SMS.
    #[serde(rename = "phone")]
    Phone,
}

impl TwoFaField {
    /// The wire name of the field.
    pub fn as_str(&self) -> &'static str {
        match self {
            TwoFaField::Email => "email",
            TwoFaField::Phone => "phone",
        }
    }
}

impl fmt::Display for TwoFaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Anything that can resolve auth fields to values: a stored member row or
/// the identity data a voter submits. Both feed the same login-hash
/// derivation, which is what makes the lookup work.
pub trait AuthFieldSource {
    /// Resolves a field to its UTF-8 value; unset fields resolve empty.
    fn auth_field_value(&self, field: AuthField) -> &str;
}

/// The salted hash identifying a census participant.
///
/// Derived from the member's values for the census's declared auth fields,
/// concatenated in declared order and scoped to the owning organization.
/// Stored as lowercase hex.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct LoginHash(pub String);

impl LoginHash {
    /// Returns the hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoginHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The published anchor of a census: the CSP public key, hex-encoded.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct CensusRoot(pub String);

impl CensusRoot {
    /// Returns the root as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CensusRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A census: the declaration of how an organization's members authenticate
/// for a bundle of processes.
///
/// A census may be created empty and populated later by publishing a member
/// group into it. Publication is monotonic: once `published_root` is set it
/// never changes, and re-publishing returns the stored values.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Census {
    /// The census identifier.
    pub id: CensusId,
    /// The owning organization.
    pub org_address: OrgAddress,
    /// Identity fields matched during the first auth step, in declared order.
    pub auth_fields: Vec<AuthField>,
    /// Challenge-delivery fields for the second auth step, in declared order.
    pub two_fa_fields: Vec<TwoFaField>,
    /// Whether participant weights are significant.
    #[serde(default)]
    pub weighted: bool,
    /// The group this census was last published from, when any.
    #[serde(default)]
    pub group_id: Option<GroupId>,
    /// The published census root, set exactly once.
    #[serde(default)]
    pub published_root: Option<CensusRoot>,
    /// The published census URI, set together with the root.
    #[serde(default)]
    pub published_uri: Option<String>,
    /// Creation time.
    #[serde(default)]
    pub created_at: UnixMillis,
}

impl Census {
    /// Returns true if this census authenticates on identity fields alone,
    /// with no challenge step.
    pub fn is_auth_only(&self) -> bool {
        self.two_fa_fields.is_empty()
    }

    /// Returns true if the census has been published.
    pub fn is_published(&self) -> bool {
        self.published_root.is_some()
    }

    /// Validates the field declaration: at least one of the two sets must be
    /// non-empty, and neither set may contain duplicates.
    pub fn valid_field_sets(&self) -> bool {
        if self.auth_fields.is_empty() && self.two_fa_fields.is_empty() {
            return false;
        }
        let mut auth = self.auth_fields.clone();
        auth.sort();
        auth.dedup();
        let mut two_fa = self.two_fa_fields.clone();
        two_fa.sort();
        two_fa.dedup();
        auth.len() == self.auth_fields.len() && two_fa.len() == self.two_fa_fields.len()
    }
}

/// A row of a published census.
///
/// `(census_id, login_hash)` is unique; two members of the same census
/// producing the same hash block publication.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CensusParticipant {
    /// The census this row belongs to.
    pub census_id: CensusId,
    /// The member this row was derived from.
    pub member_id: MemberId,
    /// The member's login hash under this census's field declaration.
    pub login_hash: LoginHash,
    /// The member's voting weight, copied at publication time.
    pub weight: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn census(auth: Vec<AuthField>, two_fa: Vec<TwoFaField>) -> Census {
        Census {
            id: CensusId::from("c1"),
            org_address: OrgAddress::from("0xorg"),
            auth_fields: auth,
            two_fa_fields: two_fa,
            weighted: false,
            group_id: None,
            published_root: None,
            published_uri: None,
            created_at: 0,
        }
    }

    #[test]
    fn field_wire_names() {
        assert_eq!(
            serde_json::to_string(&AuthField::NationalId).unwrap(),
            "\"nationalID\""
        );
        assert_eq!(
            serde_json::to_string(&AuthField::MemberNumber).unwrap(),
            "\"memberNumber\""
        );
        assert_eq!(
            serde_json::from_str::<TwoFaField>("\"phone\"").unwrap(),
            TwoFaField::Phone
        );
    }

    #[test]
    fn field_set_validation() {
        assert!(!census(vec![], vec![]).valid_field_sets());
        assert!(census(vec![AuthField::Name], vec![]).valid_field_sets());
        assert!(census(vec![], vec![TwoFaField::Email]).valid_field_sets());
        assert!(!census(vec![AuthField::Name, AuthField::Name], vec![]).valid_field_sets());
    }

    #[test]
    fn auth_only_detection() {
        assert!(census(vec![AuthField::Name], vec![]).is_auth_only());
        assert!(!census(vec![AuthField::Name], vec![TwoFaField::Email]).is_auth_only());
    }
}
