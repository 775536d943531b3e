// Path: crates/types/src/election.rs

//! Voting processes, process bundles, and the per-process status rows
//! returned to members.

use crate::ids::{BundleId, CensusId, OrgAddress, ProcessId};
use crate::time::UnixMillis;
use serde::{Deserialize, Serialize};

/// The maximum accepted size for an opaque process metadata blob.
pub const MAX_METADATA_BYTES: usize = 64 * 1024;

/// A voting process on the external chain, as known to the CSP.
///
/// The CSP treats the metadata blob as an opaque passthrough. A process is
/// immutable after its first non-draft save.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Process {
    /// The on-chain process identifier.
    pub id: ProcessId,
    /// The owning organization.
    pub org_address: OrgAddress,
    /// The census this process draws its voter set from.
    pub census_id: CensusId,
    /// The published census root at process creation time.
    #[serde(default)]
    pub census_root: Option<String>,
    /// The published census URI at process creation time.
    #[serde(default)]
    pub census_uri: Option<String>,
    /// Opaque metadata blob, capped at [`MAX_METADATA_BYTES`].
    #[serde(default)]
    pub metadata: Option<Vec<u8>>,
    /// Whether the process is still a draft and may be overwritten.
    #[serde(default)]
    pub draft: bool,
    /// Creation time.
    #[serde(default)]
    pub created_at: UnixMillis,
}

impl Process {
    /// Returns true if the metadata blob, when present, fits the cap.
    pub fn metadata_within_cap(&self) -> bool {
        self.metadata
            .as_ref()
            .map_or(true, |m| m.len() <= MAX_METADATA_BYTES)
    }
}

/// An ordered list of processes sharing one census and therefore one voter
/// set.
///
/// The process list is append-only; eligibility checks always resolve against
/// the bundle's census, never against the individual process.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProcessBundle {
    /// The bundle identifier.
    pub id: BundleId,
    /// The owning organization.
    pub org_address: OrgAddress,
    /// The census every process in this bundle shares.
    pub census_id: CensusId,
    /// The processes of this bundle, in append order.
    pub processes: Vec<ProcessId>,
    /// Creation time.
    #[serde(default)]
    pub created_at: UnixMillis,
}

impl ProcessBundle {
    /// Returns true if the bundle contains the given process.
    pub fn contains(&self, process: &ProcessId) -> bool {
        self.processes.iter().any(|p| p == process)
    }
}

/// The per-process status row returned by `member_info`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElectionInfo {
    /// The process this row describes.
    pub process_id: ProcessId,
    /// Whether the member's token has already produced a signature for this
    /// process.
    pub consumed: bool,
    /// Challenge attempts left on the member's active record, when any.
    pub remaining_attempts: u32,
    /// Reserved extra data.
    #[serde(default)]
    pub extra: Vec<String>,
}
