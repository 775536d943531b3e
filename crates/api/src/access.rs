// Path: crates/api/src/access.rs

//! The admin role predicate.
//!
//! Voter-facing operations are unauthenticated; admin-facing operations
//! (census publication, job polling) require an organization role. User
//! sessions live outside the CSP, so the check is injected as a predicate
//! rather than implemented here.

use serde::{Deserialize, Serialize};

/// The organization roles the CSP distinguishes.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    /// Full control over the organization.
    Admin,
    /// May manage censuses, processes, and jobs.
    Manager,
    /// Read-only access.
    Viewer,
}

/// The role predicate supplied by the surrounding application.
pub trait RoleChecker: Send + Sync {
    /// Returns true if `user` holds at least `role` within `org`.
    fn has_role_for(&self, user: &str, org: &tally_types::ids::OrgAddress, role: OrgRole) -> bool;
}

/// A checker that grants every request; the default for embedded and test
/// deployments where the caller performs its own access control.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl RoleChecker for AllowAll {
    fn has_role_for(&self, _: &str, _: &tally_types::ids::OrgAddress, _: OrgRole) -> bool {
        true
    }
}
