//! Drift detection: what changed in the workspace since a checkpoint.
//!
//! Compares a stored checkpoint against a freshly captured snapshot and
//! manifold. Changed files come from git (diff + commit count between the
//! two heads); folder deltas come from the manifolds. Each changed path gets
//! a coarse risk tier from keyword matching on the lowercased path.

use crate::core::checkpoint::{
    Checkpoint, DriftReport, DriftSource, FolderDelta, Manifold, ManifoldDelta,
    RiskClassification, Snapshot,
};
use crate::core::git::GitResetService;
use crate::core::time;
use crate::plugins::manifold::ManifoldCalculator;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const L3_KEYWORDS: &[&str] = &["auth", "crypto", "secret", "password", "key"];
const L2_KEYWORDS: &[&str] = &["api", "service", "controller", "handler"];

/// Captures the live VCS/ledger snapshot. Closures qualify.
pub trait SnapshotSource {
    fn capture_snapshot(&self) -> Snapshot;
}

impl<F> SnapshotSource for F
where
    F: Fn() -> Snapshot,
{
    fn capture_snapshot(&self) -> Snapshot {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    L1,
    L2,
    L3,
}

/// Security-sensitive keywords win over service keywords; everything else is L1.
pub fn classify_path(path: &str) -> RiskLevel {
    let lower = path.to_lowercase();
    if L3_KEYWORDS.iter().any(|k| lower.contains(k)) {
        RiskLevel::L3
    } else if L2_KEYWORDS.iter().any(|k| lower.contains(k)) {
        RiskLevel::L2
    } else {
        RiskLevel::L1
    }
}

pub fn classify_files(files: &[String]) -> RiskClassification {
    let mut classification = RiskClassification::default();
    for file in files {
        match classify_path(file) {
            RiskLevel::L1 => classification.l1 += 1,
            RiskLevel::L2 => classification.l2 += 1,
            RiskLevel::L3 => classification.l3 += 1,
        }
    }
    classification
}

/// Signed per-folder deltas, only for folders present on both sides.
pub fn manifold_delta(before: &Manifold, after: &Manifold) -> ManifoldDelta {
    after
        .iter()
        .filter_map(|(folder, now)| {
            let now = now.as_ref()?;
            let then = before.get(folder)?.as_ref()?;
            Some((
                folder.clone(),
                FolderDelta {
                    file_count_delta: now.file_count as i64 - then.file_count as i64,
                    bytes_delta: now.total_bytes as i64 - then.total_bytes as i64,
                },
            ))
        })
        .collect()
}

#[derive(Clone)]
pub struct DriftDetector {
    root: PathBuf,
    manifold: ManifoldCalculator,
    git: GitResetService,
}

impl DriftDetector {
    pub fn new(root: &Path, manifold: ManifoldCalculator, git: GitResetService) -> Self {
        Self {
            root: root.to_path_buf(),
            manifold,
            git,
        }
    }

    pub fn detect_drift(
        &self,
        checkpoint: &Checkpoint,
        snapshots: &dyn SnapshotSource,
    ) -> DriftReport {
        let current_snapshot = snapshots.capture_snapshot();
        let current_manifold = self.manifold.calculate_manifold();

        let elapsed = time::now() - checkpoint.meta.created;
        let duration_ms = elapsed.num_milliseconds().max(0) as u64;

        let (files_changed, git_commits) = self.git_changes(
            checkpoint.snapshot.git_head.as_deref(),
            current_snapshot.git_head.as_deref(),
        );
        let manifold_delta = manifold_delta(&checkpoint.manifold, &current_manifold);
        let classification = classify_files(&files_changed);

        DriftReport {
            detected: !files_changed.is_empty() || git_commits > 0,
            duration_ms,
            git_commits,
            files_changed,
            manifold_delta,
            classification,
            source: if checkpoint.is_paused() {
                DriftSource::ThirdPartySkill
            } else {
                DriftSource::Unknown
            },
        }
    }

    /// Changed paths and commit count between two heads. Any git failure
    /// (unknown commit, rewritten history, malformed hash) yields nothing.
    pub fn git_changes(
        &self,
        old_head: Option<&str>,
        new_head: Option<&str>,
    ) -> (Vec<String>, usize) {
        let (Some(old_head), Some(new_head)) = (old_head, new_head) else {
            return (Vec::new(), 0);
        };

        let changes = self
            .git
            .diff_names(&self.root, old_head, new_head)
            .and_then(|files| {
                let commits = self.git.commit_count(&self.root, old_head, new_head)?;
                Ok((files, commits))
            });

        match changes {
            Ok(changes) => changes,
            Err(e) => {
                debug!(
                    error = %e,
                    old_head,
                    new_head,
                    "git drift query failed; reporting no changes"
                );
                (Vec::new(), 0)
            }
        }
    }
}
