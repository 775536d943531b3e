// Path: crates/types/src/job.rs

//! Background jobs for asynchronous census and member materialization.

use crate::ids::{JobId, MemberId, OrgAddress};
use crate::time::UnixMillis;
use serde::{Deserialize, Serialize};

/// The kind of work a job performs.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Materialize census participants from a member group.
    CensusParticipants,
    /// Bulk-ingest organization members.
    OrgMembers,
}

/// A per-row failure accumulated while a job runs.
///
/// Row failures do not abort the job; the job completes and carries them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JobRowError {
    /// The member the row belonged to.
    pub member_id: MemberId,
    /// Why the row was rejected.
    pub reason: String,
}

/// A background job snapshot.
///
/// Jobs not marked completed at process restart are considered lost; clients
/// re-issue. Completed jobs are garbage-collected after a configured delay.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Job {
    /// The job identifier.
    pub id: JobId,
    /// The kind of work performed.
    pub job_type: JobType,
    /// The owning organization.
    pub org_address: OrgAddress,
    /// Total rows the job will process.
    pub total: u64,
    /// Rows processed so far.
    pub added: u64,
    /// Whether the job has finished.
    pub completed: bool,
    /// Creation time.
    pub created_at: UnixMillis,
    /// Completion time, when finished.
    #[serde(default)]
    pub completed_at: Option<UnixMillis>,
    /// Per-row failures accumulated while running.
    #[serde(default)]
    pub errors: Vec<JobRowError>,
}

impl Job {
    /// Progress in whole percent, `floor(100 * added / total)`.
    ///
    /// An empty job reports 100 once completed so pollers terminate.
    pub fn progress(&self) -> u8 {
        if self.total == 0 {
            return if self.completed { 100 } else { 0 };
        }
        ((self.added.saturating_mul(100)) / self.total).min(100) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(total: u64, added: u64, completed: bool) -> Job {
        Job {
            id: JobId([1u8; 16]),
            job_type: JobType::CensusParticipants,
            org_address: OrgAddress::from("0xorg"),
            total,
            added,
            completed,
            created_at: 0,
            completed_at: None,
            errors: vec![],
        }
    }

    #[test]
    fn progress_is_floored() {
        assert_eq!(job(3, 1, false).progress(), 33);
        assert_eq!(job(3, 2, false).progress(), 66);
        assert_eq!(job(3, 3, true).progress(), 100);
    }

    #[test]
    fn empty_job_progress() {
        assert_eq!(job(0, 0, false).progress(), 0);
        assert_eq!(job(0, 0, true).progress(), 100);
    }

    #[test]
    fn job_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&JobType::CensusParticipants).unwrap(),
            "\"census_participants\""
        );
        assert_eq!(
            serde_json::to_string(&JobType::OrgMembers).unwrap(),
            "\"org_members\""
        );
    }
}
