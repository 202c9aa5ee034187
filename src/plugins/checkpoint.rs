//! Checkpoint facade.
//!
//! Wires persistence, manifold, drift detection and the audit ledger
//! together for one workspace. Pause/resume are delegated to
//! [`CheckpointLifecycle`], which is built on demand over borrowed parts.

use crate::core::checkpoint::{Checkpoint, DriftReport, GitState, Snapshot, summarize_manifold};
use crate::core::error::FailsafeError;
use crate::core::git::GitResetService;
use crate::core::ledger::{AuditLedger, LedgerEntry, LedgerEventType};
use crate::core::store::Store;
use crate::plugins::drift::{DriftDetector, SnapshotSource};
use crate::plugins::lifecycle::{CheckpointFactory, CheckpointLifecycle, LifecycleState};
use crate::plugins::manifold::ManifoldCalculator;
use crate::plugins::persistence::CheckpointPersistence;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const UNKNOWN_AGENT: &str = "unknown";

/// Snapshot capture backed by the git CLI and the audit ledger head.
/// Failures degrade to `None` / `unknown`; capture itself never fails.
pub struct GitSnapshotter {
    root: PathBuf,
    git: GitResetService,
    ledger: Option<Arc<dyn AuditLedger>>,
}

impl GitSnapshotter {
    pub fn new(root: &Path, git: GitResetService, ledger: Option<Arc<dyn AuditLedger>>) -> Self {
        Self {
            root: root.to_path_buf(),
            git,
            ledger,
        }
    }
}

impl SnapshotSource for GitSnapshotter {
    fn capture_snapshot(&self) -> Snapshot {
        let git_head = self.git.head(&self.root).unwrap_or_else(|e| {
            debug!(error = %e, "could not resolve HEAD; snapshot head left empty");
            None
        });
        let git_status = match self.git.get_status(&self.root) {
            Ok(status) if status.clean => GitState::Clean,
            Ok(_) => GitState::Dirty,
            Err(e) => {
                debug!(error = %e, "git status unavailable; snapshot status unknown");
                GitState::Unknown
            }
        };

        Snapshot {
            git_head,
            git_status,
            ledger_chain_head: self.ledger.as_ref().and_then(|l| l.chain_head()),
            sentinel_events_processed: 0,
        }
    }
}

pub struct CheckpointManager {
    persistence: CheckpointPersistence,
    manifold: ManifoldCalculator,
    drift: DriftDetector,
    snapshots: Box<dyn SnapshotSource>,
    ledger: Option<Arc<dyn AuditLedger>>,
}

impl CheckpointManager {
    pub fn new(store: &Store, ledger: Option<Arc<dyn AuditLedger>>) -> Self {
        Self::with_git(store, GitResetService::new(), ledger)
    }

    pub fn with_git(
        store: &Store,
        git: GitResetService,
        ledger: Option<Arc<dyn AuditLedger>>,
    ) -> Self {
        let manifold = ManifoldCalculator::from_store(store);
        let drift = DriftDetector::new(&store.root, manifold.clone(), git.clone());
        let snapshots = GitSnapshotter::new(&store.root, git, ledger.clone());
        Self {
            persistence: CheckpointPersistence::from_store(store),
            manifold,
            drift,
            snapshots: Box::new(snapshots),
            ledger,
        }
    }

    /// Replace snapshot capture (tests, or hosts with their own VCS access).
    pub fn with_snapshots(mut self, snapshots: impl SnapshotSource + 'static) -> Self {
        self.snapshots = Box::new(snapshots);
        self
    }

    pub fn persistence(&self) -> &CheckpointPersistence {
        &self.persistence
    }

    pub fn load(&self) -> Option<Checkpoint> {
        self.persistence.load()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle().state()
    }

    /// Capture and persist a fresh unsealed checkpoint for `skill_session`.
    pub fn create(&self, skill_session: &str) -> Result<Checkpoint, FailsafeError> {
        let checkpoint = Checkpoint::unsealed(
            Some(skill_session),
            self.snapshots.capture_snapshot(),
            self.manifold.calculate_manifold(),
        );
        self.persistence.save(&checkpoint)?;
        debug!(skill_session, "created checkpoint");
        Ok(checkpoint)
    }

    /// Re-capture state onto the current unsealed checkpoint and seal it.
    /// `Ok(None)` when there is nothing to seal.
    pub fn seal(&self) -> Result<Option<Checkpoint>, FailsafeError> {
        let Some(current) = self.persistence.load() else {
            warn!("no checkpoint to seal");
            return Ok(None);
        };
        let Some(sealed) = current.sealed_with(
            self.snapshots.capture_snapshot(),
            self.manifold.calculate_manifold(),
        ) else {
            warn!(created = %current.meta.created, "checkpoint already sealed; nothing to seal");
            return Ok(None);
        };

        self.persistence.save(&sealed)?;

        if let Some(ledger) = &self.ledger {
            let agent = sealed.meta.skill_session.as_deref().unwrap_or(UNKNOWN_AGENT);
            ledger.append_entry(LedgerEntry::new(
                LedgerEventType::CheckpointCreated,
                agent,
                serde_json::json!({
                    "git_head": sealed.snapshot.git_head,
                    "manifold_summary": summarize_manifold(&sealed.manifold),
                }),
            ))?;
        }
        info!(git_head = ?sealed.snapshot.git_head, "checkpoint sealed");
        Ok(Some(sealed))
    }

    pub fn pause(&self, reason: &str) -> Result<Checkpoint, FailsafeError> {
        self.lifecycle().pause(reason)
    }

    pub fn resume(&self) -> Result<DriftReport, FailsafeError> {
        self.lifecycle().resume()
    }

    /// Drift against the current checkpoint, if it is a sealed baseline.
    pub fn validate(&self) -> DriftReport {
        match self.persistence.load() {
            Some(checkpoint) if checkpoint.is_sealed() => {
                self.drift.detect_drift(&checkpoint, self.snapshots.as_ref())
            }
            _ => DriftReport::empty(),
        }
    }

    fn lifecycle(&self) -> CheckpointLifecycle<'_> {
        CheckpointLifecycle {
            ledger: self.ledger.as_deref(),
            drift: &self.drift,
            persistence: &self.persistence,
            manifold: &self.manifold,
            snapshots: self.snapshots.as_ref(),
            creator: self,
        }
    }
}

impl CheckpointFactory for CheckpointManager {
    fn create_checkpoint(&self, skill_session: &str) -> Result<Checkpoint, FailsafeError> {
        self.create(skill_session)
    }
}
