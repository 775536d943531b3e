// Path: crates/crypto/src/hash/tests.rs
//! Tests for the salted hashing primitives.

use super::{auth_login_hash, hash_org_data, hash_password};
use tally_types::census::AuthField;
use tally_types::ids::OrgAddress;
use tally_types::member::MemberAuthInput;

fn org() -> OrgAddress {
    OrgAddress::from("0x1111")
}

fn input(name: &str, surname: &str, number: &str) -> MemberAuthInput {
    MemberAuthInput {
        name: name.into(),
        surname: surname.into(),
        member_number: number.into(),
        ..Default::default()
    }
}

#[test]
fn org_scoping_changes_the_digest() {
    let a = hash_org_data(&OrgAddress::from("0xaaaa"), "j@x");
    let b = hash_org_data(&OrgAddress::from("0xbbbb"), "j@x");
    assert_ne!(a, b);
    assert_eq!(a.len(), 64);
    assert_eq!(a, hash_org_data(&OrgAddress::from("0xaaaa"), "j@x"));
}

#[test]
fn password_hash_depends_on_salt() {
    let a = hash_password(b"salt-a", "hunter2");
    let b = hash_password(b"salt-b", "hunter2");
    assert_ne!(a, b);
    assert_eq!(a, hash_password(b"salt-a", "hunter2"));
}

#[test]
fn login_hash_is_deterministic() {
    let fields = [AuthField::Name, AuthField::Surname];
    let h1 = auth_login_hash(&org(), &fields, &input("John", "Doe", ""));
    let h2 = auth_login_hash(&org(), &fields, &input("John", "Doe", ""));
    assert_eq!(h1, h2);
}

#[test]
fn login_hash_is_order_sensitive() {
    let forward = [AuthField::Name, AuthField::Surname];
    let reverse = [AuthField::Surname, AuthField::Name];
    let m = input("John", "Doe", "");
    assert_ne!(
        auth_login_hash(&org(), &forward, &m),
        auth_login_hash(&org(), &reverse, &m)
    );
}

#[test]
fn separator_prevents_concatenation_aliasing() {
    // "ab" + "c" must not collide with "a" + "bc".
    let fields = [AuthField::Name, AuthField::Surname];
    assert_ne!(
        auth_login_hash(&org(), &fields, &input("ab", "c", "")),
        auth_login_hash(&org(), &fields, &input("a", "bc", ""))
    );
}

#[test]
fn collisions_are_exactly_equal_value_tuples() {
    // Exhaustive small partition of values into two fields: the hash may
    // collide only where the joined byte strings are identical, i.e. for
    // equal value tuples.
    let fields = [AuthField::Name, AuthField::MemberNumber];
    let values = ["", "a", "b", "ab", "ba", "a b"];
    let mut seen = std::collections::HashMap::new();
    for name in values {
        for number in values {
            let h = auth_login_hash(&org(), &fields, &input(name, "", number));
            if let Some(prev) = seen.insert(h, (name, number)) {
                assert_eq!(prev, (name, number), "unexpected collision");
            }
        }
    }
    assert_eq!(seen.len(), values.len() * values.len());
}
