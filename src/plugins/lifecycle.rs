//! Pause/resume state machine.
//!
//! * active: no current checkpoint, or the current one is not paused
//! * paused: the current checkpoint has `paused: true`
//!
//! `pause` is user-initiated only; no agent-facing surface calls it.
//! `resume` is idempotent: with nothing paused it returns an empty report
//! and writes nothing.

use crate::core::checkpoint::{Checkpoint, DriftReport, RESUME_SESSION};
use crate::core::error::FailsafeError;
use crate::core::ledger::{AuditLedger, LedgerEntry, LedgerEventType, SOVEREIGN_AGENT};
use crate::plugins::drift::{DriftDetector, SnapshotSource};
use crate::plugins::manifold::ManifoldCalculator;
use crate::plugins::persistence::CheckpointPersistence;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Creates (and persists) a fresh unsealed checkpoint for a skill session.
pub trait CheckpointFactory {
    fn create_checkpoint(&self, skill_session: &str) -> Result<Checkpoint, FailsafeError>;
}

impl<F> CheckpointFactory for F
where
    F: Fn(&str) -> Result<Checkpoint, FailsafeError>,
{
    fn create_checkpoint(&self, skill_session: &str) -> Result<Checkpoint, FailsafeError> {
        self(skill_session)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Active,
    Paused,
}

pub struct CheckpointLifecycle<'a> {
    pub ledger: Option<&'a dyn AuditLedger>,
    pub drift: &'a DriftDetector,
    pub persistence: &'a CheckpointPersistence,
    pub manifold: &'a ManifoldCalculator,
    pub snapshots: &'a dyn SnapshotSource,
    pub creator: &'a dyn CheckpointFactory,
}

impl CheckpointLifecycle<'_> {
    pub fn state(&self) -> LifecycleState {
        match self.persistence.load() {
            Some(cp) if cp.is_paused() => LifecycleState::Paused,
            _ => LifecycleState::Active,
        }
    }

    pub fn pause(&self, reason: &str) -> Result<Checkpoint, FailsafeError> {
        let checkpoint = match self.persistence.load() {
            // Keep the original baseline; only the override list grows.
            Some(mut current) if current.is_paused() => {
                current.record_override(reason);
                current
            }
            _ => Checkpoint::pause(
                reason,
                self.snapshots.capture_snapshot(),
                self.manifold.calculate_manifold(),
            ),
        };

        self.persistence.save(&checkpoint)?;
        self.append(LedgerEntry::new(
            LedgerEventType::GovernancePaused,
            SOVEREIGN_AGENT,
            serde_json::json!({ "reason": reason }),
        ))?;
        info!(reason, overrides = checkpoint.user_overrides.len(), "governance paused");
        Ok(checkpoint)
    }

    pub fn resume(&self) -> Result<DriftReport, FailsafeError> {
        let Some(pause_checkpoint) = self.persistence.load().filter(Checkpoint::is_paused) else {
            return Ok(DriftReport::empty());
        };

        let drift = self.drift.detect_drift(&pause_checkpoint, self.snapshots);
        self.persistence.archive_checkpoint(&pause_checkpoint)?;
        self.create_and_seal_resume_checkpoint()?;
        self.record_resume(&drift)?;

        info!(
            detected = drift.detected,
            files_changed = drift.files_changed.len(),
            duration_ms = drift.duration_ms,
            "governance resumed"
        );
        Ok(drift)
    }

    fn create_and_seal_resume_checkpoint(&self) -> Result<Checkpoint, FailsafeError> {
        let mut next = self.creator.create_checkpoint(RESUME_SESSION)?;
        next.meta.sealed = true;
        next.meta.paused = Some(false);
        self.persistence.save(&next)?;
        Ok(next)
    }

    fn record_resume(&self, drift: &DriftReport) -> Result<(), FailsafeError> {
        self.append(LedgerEntry::new(
            LedgerEventType::GovernanceResumed,
            SOVEREIGN_AGENT,
            serde_json::json!({
                "pause_duration_ms": drift.duration_ms,
                "files_changed": drift.files_changed.len(),
            }),
        ))?;

        if drift.detected {
            self.append(LedgerEntry::new(
                LedgerEventType::ExternalDrift,
                SOVEREIGN_AGENT,
                serde_json::json!({
                    "source": drift.source,
                    "files_changed": drift.files_changed,
                    "manifold_delta": drift.manifold_delta,
                }),
            ))?;
        }
        Ok(())
    }

    fn append(&self, entry: LedgerEntry) -> Result<(), FailsafeError> {
        if let Some(ledger) = self.ledger {
            ledger.append_entry(entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::checkpoint::{Manifold, Snapshot};
    use crate::core::config::ManifoldConfig;
    use crate::core::git::GitResetService;
    use crate::core::ledger::LedgerReceipt;
    use crate::core::runner::CommandOutput;
    use std::cell::RefCell;
    use std::path::Path;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingLedger {
        entries: RefCell<Vec<LedgerEntry>>,
    }

    impl AuditLedger for RecordingLedger {
        fn append_entry(&self, entry: LedgerEntry) -> Result<LedgerReceipt, FailsafeError> {
            self.entries.borrow_mut().push(entry);
            Ok(LedgerReceipt {
                id: format!("entry-{}", self.entries.borrow().len()),
            })
        }
    }

    struct Fixture {
        persistence: CheckpointPersistence,
        manifold: ManifoldCalculator,
        drift: DriftDetector,
        ledger: RecordingLedger,
    }

    fn fixture(root: &Path) -> Fixture {
        let manifold = ManifoldCalculator::new(
            root,
            &ManifoldConfig {
                tracked_folders: vec!["src".into()],
                ignored_names: vec![],
            },
        );
        let git = GitResetService::with_runner(
            |_p: &str, _a: &[&str], _c: &Path| -> Result<CommandOutput, FailsafeError> {
                Ok(CommandOutput::failed(128, "not a repository"))
            },
        );
        Fixture {
            persistence: CheckpointPersistence::new(
                &root.join("cp/latest.yaml"),
                &root.join("cp/archive"),
                10,
            ),
            drift: DriftDetector::new(root, manifold.clone(), git),
            manifold,
            ledger: RecordingLedger::default(),
        }
    }

    fn no_snapshot() -> Snapshot {
        Snapshot::default()
    }

    #[test]
    fn resume_while_active_is_a_no_op() {
        let tmp = tempdir().unwrap();
        let f = fixture(tmp.path());
        let creator = |session: &str| -> Result<Checkpoint, FailsafeError> {
            Ok(Checkpoint::unsealed(Some(session), Snapshot::default(), Manifold::new()))
        };
        let lifecycle = CheckpointLifecycle {
            ledger: Some(&f.ledger),
            drift: &f.drift,
            persistence: &f.persistence,
            manifold: &f.manifold,
            snapshots: &no_snapshot,
            creator: &creator,
        };

        assert_eq!(lifecycle.state(), LifecycleState::Active);
        let report = lifecycle.resume().unwrap();
        assert_eq!(report, DriftReport::empty());
        assert!(f.ledger.entries.borrow().is_empty());
        assert!(!f.persistence.archive_dir().exists());
        assert!(f.persistence.load().is_none());
    }

    #[test]
    fn pause_then_resume_round_trip() {
        let tmp = tempdir().unwrap();
        let f = fixture(tmp.path());
        let creator = |session: &str| -> Result<Checkpoint, FailsafeError> {
            Ok(Checkpoint::unsealed(Some(session), Snapshot::default(), Manifold::new()))
        };
        let lifecycle = CheckpointLifecycle {
            ledger: Some(&f.ledger),
            drift: &f.drift,
            persistence: &f.persistence,
            manifold: &f.manifold,
            snapshots: &no_snapshot,
            creator: &creator,
        };

        let paused = lifecycle.pause("trying a codegen skill").unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Paused);
        assert_eq!(f.persistence.load(), Some(paused.clone()));

        let report = lifecycle.resume().unwrap();
        assert!(!report.detected);
        assert_eq!(lifecycle.state(), LifecycleState::Active);

        let current = f.persistence.load().unwrap();
        assert!(current.is_sealed());
        assert_eq!(current.meta.paused, Some(false));
        assert_eq!(current.meta.skill_session.as_deref(), Some(RESUME_SESSION));

        let archives = f.persistence.list_archives().unwrap();
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].checkpoint, paused);

        let kinds: Vec<LedgerEventType> =
            f.ledger.entries.borrow().iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![LedgerEventType::GovernancePaused, LedgerEventType::GovernanceResumed]
        );
    }

    #[test]
    fn second_pause_appends_override_and_keeps_baseline() {
        let tmp = tempdir().unwrap();
        let f = fixture(tmp.path());
        let creator = |session: &str| -> Result<Checkpoint, FailsafeError> {
            Ok(Checkpoint::unsealed(Some(session), Snapshot::default(), Manifold::new()))
        };
        let lifecycle = CheckpointLifecycle {
            ledger: None,
            drift: &f.drift,
            persistence: &f.persistence,
            manifold: &f.manifold,
            snapshots: &no_snapshot,
            creator: &creator,
        };

        let first = lifecycle.pause("first").unwrap();
        let second = lifecycle.pause("second").unwrap();
        assert_eq!(second.meta, first.meta);
        let reasons: Vec<&str> = second.user_overrides.iter().map(|o| o.reason.as_str()).collect();
        assert_eq!(reasons, vec!["first", "second"]);
    }
}
