// Path: crates/crypto/src/hash/mod.rs

//! Salted, organization-scoped hashing for identity data.
//!
//! Every stored contact value and every login hash is scoped to the owning
//! organization by prefixing the hash input with the organization address:
//! the same email under two organizations produces unrelated digests, so a
//! leaked store from one organization says nothing about another's members.

use sha2::{Digest, Sha256};
use tally_types::census::{AuthField, AuthFieldSource, LoginHash, LOGIN_HASH_SEPARATOR};
use tally_types::ids::OrgAddress;

#[cfg(test)]
mod tests;

/// Hashes a value scoped to an organization: `SHA-256(org_addr || value)`,
/// returned as lowercase hex.
pub fn hash_org_data(org: &OrgAddress, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(org.as_str().as_bytes());
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hashes a password with the process-global salt: `SHA-256(salt || value)`,
/// returned as lowercase hex.
pub fn hash_password(salt: &[u8], value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derives the login hash for a member under a census's auth field
/// declaration.
///
/// Values are resolved in the declared field order and joined with the unit
/// separator before hashing, so the declared order is part of the function:
/// reordering the fields changes every participant's hash.
pub fn auth_login_hash<S: AuthFieldSource>(
    org: &OrgAddress,
    auth_fields: &[AuthField],
    source: &S,
) -> LoginHash {
    let mut concat = Vec::new();
    for (i, field) in auth_fields.iter().enumerate() {
        if i > 0 {
            concat.push(LOGIN_HASH_SEPARATOR);
        }
        concat.extend_from_slice(source.auth_field_value(*field).as_bytes());
    }
    let mut hasher = Sha256::new();
    hasher.update(org.as_str().as_bytes());
    hasher.update(&concat);
    LoginHash(hex::encode(hasher.finalize()))
}
