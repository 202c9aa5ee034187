//! Checkpoint data model shared by persistence, drift detection and the lifecycle.
//!
//! A checkpoint is a token-cheap snapshot of governance-relevant workspace
//! state: VCS head and cleanliness, audit-ledger position, and a per-folder
//! manifold instead of per-file hashes.
//!
//! Sealed checkpoints are baselines: once `sealed` is true only
//! `user_overrides` may grow. Anything else produces a new checkpoint.

use crate::core::time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CHECKPOINT_VERSION: u32 = 1;

pub const PAUSE_SESSION: &str = "ql-pause";
pub const RESUME_SESSION: &str = "ql-resume";

/// Per-folder aggregate statistics, one per tracked folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderManifold {
    pub file_count: u64,
    pub total_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

/// Tracked folder name -> stats, or `None` when the folder does not exist.
pub type Manifold = BTreeMap<String, Option<FolderManifold>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GitState {
    Clean,
    Dirty,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Snapshot {
    pub git_head: Option<String>,
    pub git_status: GitState,
    pub ledger_chain_head: Option<String>,
    pub sentinel_events_processed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOverride {
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub version: u32,
    pub created: DateTime<Utc>,
    pub sealed: bool,
    pub skill_session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "checkpoint")]
    pub meta: CheckpointMeta,
    pub snapshot: Snapshot,
    #[serde(default)]
    pub manifold: Manifold,
    #[serde(default)]
    pub user_overrides: Vec<UserOverride>,
}

impl Checkpoint {
    /// A fresh, unsealed work-in-progress checkpoint.
    pub fn unsealed(skill_session: Option<&str>, snapshot: Snapshot, manifold: Manifold) -> Self {
        Self {
            meta: CheckpointMeta {
                version: CHECKPOINT_VERSION,
                created: time::now(),
                sealed: false,
                skill_session: skill_session.map(str::to_string),
                paused: None,
                pause_reason: None,
            },
            snapshot,
            manifold,
            user_overrides: Vec::new(),
        }
    }

    /// A sealed pause checkpoint carrying exactly one acknowledged override.
    pub fn pause(reason: &str, snapshot: Snapshot, manifold: Manifold) -> Self {
        let created = time::now();
        Self {
            meta: CheckpointMeta {
                version: CHECKPOINT_VERSION,
                created,
                sealed: true,
                skill_session: Some(PAUSE_SESSION.to_string()),
                paused: Some(true),
                pause_reason: Some(reason.to_string()),
            },
            snapshot,
            manifold,
            user_overrides: vec![UserOverride {
                timestamp: created,
                reason: reason.to_string(),
                acknowledged: true,
            }],
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.meta.sealed
    }

    pub fn is_paused(&self) -> bool {
        self.meta.paused.unwrap_or(false)
    }

    /// Seal a work-in-progress checkpoint with fresh state. Returns `None`
    /// for a checkpoint that is already sealed: sealed baselines are never
    /// re-captured in place.
    pub fn sealed_with(&self, snapshot: Snapshot, manifold: Manifold) -> Option<Checkpoint> {
        if self.meta.sealed {
            return None;
        }
        let mut next = self.clone();
        next.snapshot = snapshot;
        next.manifold = manifold;
        next.meta.sealed = true;
        Some(next)
    }

    /// Append-only; the one field that may change on a sealed checkpoint.
    pub fn record_override(&mut self, reason: &str) {
        self.user_overrides.push(UserOverride {
            timestamp: time::now(),
            reason: reason.to_string(),
            acknowledged: true,
        });
    }
}

/// `folder -> file_count` summary written to the ledger on seal.
pub fn summarize_manifold(manifold: &Manifold) -> BTreeMap<String, u64> {
    manifold
        .iter()
        .map(|(folder, stats)| (folder.clone(), stats.as_ref().map_or(0, |s| s.file_count)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDelta {
    pub file_count_delta: i64,
    pub bytes_delta: i64,
}

pub type ManifoldDelta = BTreeMap<String, FolderDelta>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RiskClassification {
    #[serde(rename = "L1")]
    pub l1: usize,
    #[serde(rename = "L2")]
    pub l2: usize,
    #[serde(rename = "L3")]
    pub l3: usize,
}

impl RiskClassification {
    pub fn total(&self) -> usize {
        self.l1 + self.l2 + self.l3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DriftSource {
    ThirdPartySkill,
    ManualEdit,
    #[default]
    Unknown,
}

/// Output-only comparison of a checkpoint against the live workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DriftReport {
    pub detected: bool,
    pub duration_ms: u64,
    pub git_commits: usize,
    pub files_changed: Vec<String>,
    pub manifold_delta: ManifoldDelta,
    pub classification: RiskClassification,
    pub source: DriftSource,
}

impl DriftReport {
    /// The undetected, all-zero report returned when there is no usable baseline.
    pub fn empty() -> Self {
        Self::default()
    }
}
