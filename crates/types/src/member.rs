// Path: crates/types/src/member.rs

//! Organization members and the identity data voters submit.
//!
//! Two shapes exist on purpose. [`RawMember`] is the ingestion shape and the
//! only place cleartext email, phone, and password ever appear; the ingestion
//! path hashes those fields and produces an [`OrgMember`], which is what the
//! store persists. The cleartext is never retained.

use crate::census::AuthField;
use crate::ids::{MemberId, OrgAddress};
use crate::time::UnixMillis;
use chrono::NaiveDate;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// An arbitrary scalar value attached to a member under a free-form key.
///
/// Serializes untagged in human-readable formats (JSON ingestion sees plain
/// strings, integers, and booleans) and externally tagged in the canonical
/// binary codec, which cannot sniff types.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// A text value.
    Text(String),
    /// An integer value.
    Integer(i64),
    /// A boolean value.
    Boolean(bool),
}

#[derive(Serialize, Deserialize)]
enum TaggedScalar {
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            match self {
                ScalarValue::Text(v) => serializer.serialize_str(v),
                ScalarValue::Integer(v) => serializer.serialize_i64(*v),
                ScalarValue::Boolean(v) => serializer.serialize_bool(*v),
            }
        } else {
            let tagged = match self {
                ScalarValue::Text(v) => TaggedScalar::Text(v.clone()),
                ScalarValue::Integer(v) => TaggedScalar::Integer(*v),
                ScalarValue::Boolean(v) => TaggedScalar::Boolean(*v),
            };
            tagged.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for ScalarValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            struct ScalarVisitor;

            impl<'de> Visitor<'de> for ScalarVisitor {
                type Value = ScalarValue;

                fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str("a string, integer, or boolean")
                }

                fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                    Ok(ScalarValue::Text(v.to_string()))
                }

                fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                    Ok(ScalarValue::Text(v))
                }

                fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                    Ok(ScalarValue::Integer(v))
                }

                fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                    i64::try_from(v)
                        .map(ScalarValue::Integer)
                        .map_err(|_| E::custom("integer out of range"))
                }

                fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
                    Ok(ScalarValue::Boolean(v))
                }
            }

            deserializer.deserialize_any(ScalarVisitor)
        } else {
            Ok(match TaggedScalar::deserialize(deserializer)? {
                TaggedScalar::Text(v) => ScalarValue::Text(v),
                TaggedScalar::Integer(v) => ScalarValue::Integer(v),
                TaggedScalar::Boolean(v) => ScalarValue::Boolean(v),
            })
        }
    }
}

/// A member of an organization as persisted by the store.
///
/// Contact fields are salted hashes scoped to the owning organization
/// (`hash_org_data(org_address, cleartext)`); the password, when present, is
/// hashed with the process-global salt.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrgMember {
    /// The internal, stable member identifier.
    pub id: MemberId,
    /// The owning organization.
    pub org_address: OrgAddress,
    /// The organization-assigned member number.
    #[serde(default)]
    pub member_number: String,
    /// Given name.
    #[serde(default)]
    pub name: String,
    /// Family name.
    #[serde(default)]
    pub surname: String,
    /// National identity document number.
    #[serde(default)]
    pub national_id: String,
    /// Birth date as an ISO `YYYY-MM-DD` string.
    #[serde(default)]
    pub birth_date: String,
    /// Salted hash of the member's email address, when one was provided.
    #[serde(default)]
    pub hashed_email: Option<String>,
    /// Salted hash of the member's phone number, when one was provided.
    #[serde(default)]
    pub hashed_phone: Option<String>,
    /// Salted hash of the member's password, when one was provided.
    #[serde(default)]
    pub hashed_password: Option<String>,
    /// Voting weight for weighted censuses.
    #[serde(default = "default_weight")]
    pub weight: u64,
    /// Free-form scalar attributes.
    #[serde(default)]
    pub other: BTreeMap<String, ScalarValue>,
    /// Creation time.
    #[serde(default)]
    pub created_at: UnixMillis,
}

fn default_weight() -> u64 {
    1
}

impl crate::census::AuthFieldSource for OrgMember {
    /// Resolves an auth field to this member's stored value.
    ///
    /// Unset fields resolve to the empty string; the census publication scan
    /// treats an empty required value as missing data.
    fn auth_field_value(&self, field: AuthField) -> &str {
        match field {
            AuthField::Name => &self.name,
            AuthField::Surname => &self.surname,
            AuthField::MemberNumber => &self.member_number,
            AuthField::NationalId => &self.national_id,
            AuthField::BirthDate => &self.birth_date,
        }
    }
}

/// A member row as supplied by the organization admin, before ingestion.
///
/// This is the only type carrying cleartext contact data. It exists only in
/// transit; ingestion hashes it into an [`OrgMember`].
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RawMember {
    /// Optional caller-chosen internal identifier; generated when absent.
    #[serde(default)]
    pub id: Option<MemberId>,
    /// The organization-assigned member number.
    #[serde(default)]
    pub member_number: String,
    /// Given name.
    #[serde(default)]
    pub name: String,
    /// Family name.
    #[serde(default)]
    pub surname: String,
    /// National identity document number.
    #[serde(default)]
    pub national_id: String,
    /// Birth date as an ISO `YYYY-MM-DD` string.
    #[serde(default)]
    pub birth_date: String,
    /// Cleartext email address; hashed during ingestion.
    #[serde(default)]
    pub email: Option<String>,
    /// Cleartext phone number; hashed during ingestion.
    #[serde(default)]
    pub phone: Option<String>,
    /// Cleartext password; hashed during ingestion.
    #[serde(default)]
    pub password: Option<String>,
    /// Voting weight for weighted censuses.
    #[serde(default = "default_weight")]
    pub weight: u64,
    /// Free-form scalar attributes.
    #[serde(default)]
    pub other: BTreeMap<String, ScalarValue>,
}

/// The identity data a voter submits to `initiate_auth`.
///
/// Carries exactly the auth fields the caller chose to provide plus the
/// cleartext contact used for challenge delivery. Unset auth fields resolve
/// to the empty string, which matches an unset stored field.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemberAuthInput {
    /// Given name.
    #[serde(default)]
    pub name: String,
    /// Family name.
    #[serde(default)]
    pub surname: String,
    /// The organization-assigned member number.
    #[serde(default)]
    pub member_number: String,
    /// National identity document number.
    #[serde(default, rename = "nationalID")]
    pub national_id: String,
    /// Birth date as an ISO `YYYY-MM-DD` string.
    #[serde(default)]
    pub birth_date: String,
    /// Cleartext email address, when email is the challenge channel.
    #[serde(default)]
    pub email: Option<String>,
    /// Cleartext phone number, when SMS is the challenge channel.
    #[serde(default)]
    pub phone: Option<String>,
}

impl crate::census::AuthFieldSource for MemberAuthInput {
    /// Resolves an auth field to the value supplied by the voter.
    fn auth_field_value(&self, field: AuthField) -> &str {
        match field {
            AuthField::Name => &self.name,
            AuthField::Surname => &self.surname,
            AuthField::MemberNumber => &self.member_number,
            AuthField::NationalId => &self.national_id,
            AuthField::BirthDate => &self.birth_date,
        }
    }
}

impl MemberAuthInput {
    /// Returns true if a non-empty email was supplied.
    pub fn has_email(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Returns true if a non-empty phone number was supplied.
    pub fn has_phone(&self) -> bool {
        self.phone.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// A named set of members within an organization.
///
/// Groups are the unit a census is published from: publication streams the
/// group's members, derives each login hash, and materializes the census
/// participant rows.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MemberGroup {
    /// The group identifier.
    pub id: crate::ids::GroupId,
    /// The owning organization.
    pub org_address: OrgAddress,
    /// Human-readable title.
    #[serde(default)]
    pub title: String,
    /// The members of this group, in insertion order.
    pub member_ids: Vec<MemberId>,
    /// Creation time.
    #[serde(default)]
    pub created_at: UnixMillis,
}

/// Validates an ISO `YYYY-MM-DD` birth date string.
///
/// The empty string is accepted: birth date is optional member data unless a
/// census declares it as an auth field, and the publication scan is where a
/// missing required value is reported.
pub fn valid_birth_date(s: &str) -> bool {
    s.is_empty() || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::census::AuthFieldSource;

    #[test]
    fn auth_field_resolution_covers_all_fields() {
        let m = OrgMember {
            id: MemberId::from("m1"),
            org_address: OrgAddress::from("0xorg"),
            member_number: "P001".into(),
            name: "John".into(),
            surname: "Doe".into(),
            national_id: "X1".into(),
            birth_date: "1990-05-01".into(),
            hashed_email: None,
            hashed_phone: None,
            hashed_password: None,
            weight: 1,
            other: BTreeMap::new(),
            created_at: 0,
        };
        assert_eq!(m.auth_field_value(AuthField::Name), "John");
        assert_eq!(m.auth_field_value(AuthField::Surname), "Doe");
        assert_eq!(m.auth_field_value(AuthField::MemberNumber), "P001");
        assert_eq!(m.auth_field_value(AuthField::NationalId), "X1");
        assert_eq!(m.auth_field_value(AuthField::BirthDate), "1990-05-01");
    }

    #[test]
    fn birth_date_validation() {
        assert!(valid_birth_date(""));
        assert!(valid_birth_date("1990-05-01"));
        assert!(!valid_birth_date("1990-13-01"));
        assert!(!valid_birth_date("01/05/1990"));
    }

    #[test]
    fn scalar_values_in_both_codecs() {
        let mut other = BTreeMap::new();
        other.insert("office".to_string(), ScalarValue::Text("Madrid".into()));
        other.insert("age".to_string(), ScalarValue::Integer(42));
        other.insert("active".to_string(), ScalarValue::Boolean(true));

        let json = serde_json::to_string(&other).unwrap();
        assert!(json.contains("\"Madrid\""));
        assert!(json.contains("42"));
        let from_json: BTreeMap<String, ScalarValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(from_json, other);

        let bytes = crate::codec::to_bytes_canonical(&other).unwrap();
        let from_bin: BTreeMap<String, ScalarValue> =
            crate::codec::from_bytes_canonical(&bytes).unwrap();
        assert_eq!(from_bin, other);
    }

    #[test]
    fn auth_input_wire_names() {
        let input: MemberAuthInput = serde_json::from_str(
            r#"{"name":"John","memberNumber":"P001","nationalID":"X1","email":"j@x"}"#,
        )
        .unwrap();
        assert_eq!(input.member_number, "P001");
        assert_eq!(input.national_id, "X1");
        assert!(input.has_email());
        assert!(!input.has_phone());
    }
}
