//! Transactional rollback to a named checkpoint.
//!
//! Three ordered steps: `git_reset`, `rag_purge`, `ledger_seal`. Step
//! failures never escape `revert`; they are recorded per step so the caller
//! always gets a complete, inspectable [`RevertResult`].
//!
//! The workspace status is checked twice before the destructive reset.
//! Nothing is locked: a workspace that turns dirty between the checks aborts
//! with `workspace_changed_during_revert` and the caller retries from scratch.

use crate::core::error::FailsafeError;
use crate::core::git::{DEFAULT_LOG_LIMIT, GitLogEntry, GitResetService};
use crate::core::ledger::{AuditLedger, JsonlLedger, LedgerEntry, LedgerEventType};
use crate::core::store::Store;
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const WORKSPACE_CHANGED: &str = "workspace_changed_during_revert";
pub const LEDGER_SEAL_FAILED: &str = "ledger_seal_failed_emergency_logged";

/// Ledger-addressable pointer to a revert target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRef {
    pub checkpoint_id: String,
    pub git_hash: String,
    pub timestamp: String,
    pub phase: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertRequest {
    pub target_checkpoint: CheckpointRef,
    pub reason: String,
    pub actor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevertStepStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    GitReset,
    RagPurge,
    LedgerSeal,
}

impl StepName {
    pub fn as_str(self) -> &'static str {
        match self {
            StepName::GitReset => "git_reset",
            StepName::RagPurge => "rag_purge",
            StepName::LedgerSeal => "ledger_seal",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertStep {
    pub name: StepName,
    pub status: RevertStepStatus,
    pub detail: String,
}

impl RevertStep {
    fn new(name: StepName, status: RevertStepStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }

    fn settled(&self) -> bool {
        matches!(self.status, RevertStepStatus::Success | RevertStepStatus::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertResult {
    pub success: bool,
    pub steps: Vec<RevertStep>,
    pub revert_checkpoint_id: Option<String>,
    pub error: Option<String>,
}

impl RevertResult {
    fn aborted(error: impl Into<String>) -> Self {
        Self {
            success: false,
            steps: Vec::new(),
            revert_checkpoint_id: None,
            error: Some(error.into()),
        }
    }

    pub fn step(&self, name: StepName) -> Option<&RevertStep> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Discards knowledge-store observations newer than a checkpoint.
/// Must be idempotent: an already-purged range yields 0.
pub trait RagPurger {
    fn purge_rag_after(&self, timestamp: &str) -> Result<usize, FailsafeError>;
}

impl<F> RagPurger for F
where
    F: Fn(&str) -> Result<usize, FailsafeError>,
{
    fn purge_rag_after(&self, timestamp: &str) -> Result<usize, FailsafeError> {
        self(timestamp)
    }
}

/// Records that a revert happened; returns the new checkpoint id.
pub trait RevertRecorder {
    fn record_revert_checkpoint(
        &self,
        request: &RevertRequest,
        steps: &[RevertStep],
    ) -> Result<String, FailsafeError>;
}

impl<F> RevertRecorder for F
where
    F: Fn(&RevertRequest, &[RevertStep]) -> Result<String, FailsafeError>,
{
    fn record_revert_checkpoint(
        &self,
        request: &RevertRequest,
        steps: &[RevertStep],
    ) -> Result<String, FailsafeError> {
        self(request, steps)
    }
}

/// Seals a revert into an audit ledger as `CHECKPOINT_REVERTED`.
pub struct LedgerSeal {
    ledger: Arc<dyn AuditLedger>,
}

impl LedgerSeal {
    pub fn new(ledger: Arc<dyn AuditLedger>) -> Self {
        Self { ledger }
    }
}

impl RevertRecorder for LedgerSeal {
    fn record_revert_checkpoint(
        &self,
        request: &RevertRequest,
        steps: &[RevertStep],
    ) -> Result<String, FailsafeError> {
        let receipt = self.ledger.append_entry(LedgerEntry::new(
            LedgerEventType::CheckpointReverted,
            &request.actor,
            serde_json::json!({
                "target_checkpoint": request.target_checkpoint,
                "reason": request.reason,
                "steps": steps,
            }),
        ))?;
        Ok(receipt.id)
    }
}

impl JsonlLedger {
    /// Resolve a `CHECKPOINT_CREATED` record into a revert target.
    pub fn checkpoint_ref(&self, id: &str) -> Result<CheckpointRef, FailsafeError> {
        let record = self
            .records()?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| FailsafeError::NotFound(format!("ledger entry {}", id)))?;

        if record.entry.event_type != LedgerEventType::CheckpointCreated {
            return Err(FailsafeError::ValidationError(format!(
                "ledger entry {} is {}, not {}",
                id,
                record.entry.event_type.as_str(),
                LedgerEventType::CheckpointCreated.as_str()
            )));
        }
        let git_hash = record
            .entry
            .payload
            .get("git_head")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                FailsafeError::ValidationError(format!("ledger entry {} has no git_head", id))
            })?;

        Ok(CheckpointRef {
            checkpoint_id: record.id.clone(),
            git_hash: git_hash.to_string(),
            timestamp: record.ts.clone(),
            phase: record.entry.agent_did.clone(),
            status: "sealed".to_string(),
        })
    }
}

#[derive(Serialize)]
struct EmergencyRecord<'a> {
    timestamp: String,
    request: &'a RevertRequest,
    steps: &'a [RevertStep],
    error: String,
}

pub struct FailSafeRevertService {
    root: PathBuf,
    git: GitResetService,
    rag: Box<dyn RagPurger>,
    recorder: Box<dyn RevertRecorder>,
    emergency_log: PathBuf,
}

impl FailSafeRevertService {
    pub fn new(
        store: &Store,
        git: GitResetService,
        rag: impl RagPurger + 'static,
        recorder: impl RevertRecorder + 'static,
    ) -> Self {
        Self {
            root: store.root.clone(),
            git,
            rag: Box::new(rag),
            recorder: Box::new(recorder),
            emergency_log: store.emergency_log_path(),
        }
    }

    pub fn emergency_log_path(&self) -> &Path {
        &self.emergency_log
    }

    /// Commits a revert to `target` would discard, newest first.
    pub fn pending_discards(
        &self,
        target: &CheckpointRef,
    ) -> Result<Vec<GitLogEntry>, FailsafeError> {
        self.git.get_log(&self.root, &target.git_hash, DEFAULT_LOG_LIMIT)
    }

    pub fn revert(&self, request: &RevertRequest) -> RevertResult {
        let target = &request.target_checkpoint;

        match self.git.get_status(&self.root) {
            Ok(status) if !status.clean => {
                return RevertResult::aborted(format!(
                    "Workspace has uncommitted changes: {}",
                    status.uncommitted_files.join(", ")
                ));
            }
            Ok(_) => {}
            Err(e) => return RevertResult::aborted(e.to_string()),
        }
        // Second look right before the destructive step.
        match self.git.get_status(&self.root) {
            Ok(status) if !status.clean => {
                warn!(
                    files = ?status.uncommitted_files,
                    "workspace changed during revert preflight"
                );
                return RevertResult::aborted(WORKSPACE_CHANGED);
            }
            Ok(_) => {}
            Err(e) => return RevertResult::aborted(e.to_string()),
        }

        let mut steps = Vec::with_capacity(3);
        steps.push(self.git_reset(&target.git_hash));
        let purge = self.rag_purge(&steps[0], &target.timestamp);
        steps.push(purge);
        let seal = self.ledger_seal(request, &steps);
        steps.push(seal);

        let success = steps.iter().all(RevertStep::settled);
        let revert_checkpoint_id = steps
            .last()
            .filter(|s| s.status == RevertStepStatus::Success)
            .map(|s| s.detail.clone());
        let error = (!success).then(|| summarize_failures(&steps));

        info!(
            success,
            target = %target.checkpoint_id,
            actor = %request.actor,
            "revert finished"
        );
        RevertResult {
            success,
            steps,
            revert_checkpoint_id,
            error,
        }
    }

    fn git_reset(&self, git_hash: &str) -> RevertStep {
        let step = match self.git.reset_hard(&self.root, git_hash) {
            Ok(outcome) if outcome.success => RevertStep::new(
                StepName::GitReset,
                RevertStepStatus::Success,
                format!("Reset to {}", git_hash.get(..8).unwrap_or(git_hash)),
            ),
            Ok(outcome) => RevertStep::new(
                StepName::GitReset,
                RevertStepStatus::Failed,
                outcome.stderr.trim(),
            ),
            Err(e) => RevertStep::new(StepName::GitReset, RevertStepStatus::Failed, e.to_string()),
        };
        log_step(&step);
        step
    }

    fn rag_purge(&self, reset: &RevertStep, timestamp: &str) -> RevertStep {
        // Never purge knowledge for code that was not rolled back.
        if reset.status == RevertStepStatus::Failed {
            let step = RevertStep::new(
                StepName::RagPurge,
                RevertStepStatus::Skipped,
                "git_reset failed",
            );
            log_step(&step);
            return step;
        }
        let step = match self.rag.purge_rag_after(timestamp) {
            Ok(purged) => RevertStep::new(
                StepName::RagPurge,
                RevertStepStatus::Success,
                format!("Purged {} observations", purged),
            ),
            Err(e) => RevertStep::new(StepName::RagPurge, RevertStepStatus::Failed, e.to_string()),
        };
        log_step(&step);
        step
    }

    fn ledger_seal(&self, request: &RevertRequest, prior: &[RevertStep]) -> RevertStep {
        let step = match self.recorder.record_revert_checkpoint(request, prior) {
            Ok(checkpoint_id) => {
                RevertStep::new(StepName::LedgerSeal, RevertStepStatus::Success, checkpoint_id)
            }
            Err(e) => {
                self.write_emergency_log(request, prior, &e);
                RevertStep::new(StepName::LedgerSeal, RevertStepStatus::Failed, LEDGER_SEAL_FAILED)
            }
        };
        log_step(&step);
        step
    }

    /// Best effort; a failed write here has no further fallback.
    fn write_emergency_log(
        &self,
        request: &RevertRequest,
        steps: &[RevertStep],
        cause: &FailsafeError,
    ) {
        let record = EmergencyRecord {
            timestamp: time::now_rfc3339(),
            request,
            steps,
            error: cause.to_string(),
        };
        match append_json_line(&self.emergency_log, &record) {
            Ok(()) => error!(
                path = %self.emergency_log.display(),
                error = %cause,
                "ledger seal failed; revert written to emergency log"
            ),
            Err(e) => error!(
                path = %self.emergency_log.display(),
                error = %cause,
                log_error = %e,
                "ledger seal failed and emergency log is unwritable"
            ),
        }
    }
}

fn append_json_line(path: &Path, record: &impl Serialize) -> Result<(), FailsafeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(FailsafeError::IoError)?;
    }
    let line = serde_json::to_string(record)?;
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(FailsafeError::IoError)?;
    writeln!(f, "{}", line).map_err(FailsafeError::IoError)?;
    f.sync_data().map_err(FailsafeError::IoError)
}

fn log_step(step: &RevertStep) {
    match step.status {
        RevertStepStatus::Failed => {
            warn!(step = %step.name, detail = %step.detail, "revert step failed")
        }
        status => info!(step = %step.name, ?status, detail = %step.detail, "revert step"),
    }
}

fn summarize_failures(steps: &[RevertStep]) -> String {
    steps
        .iter()
        .filter(|s| s.status == RevertStepStatus::Failed)
        .map(|s| format!("{}: {}", s.name, s.detail))
        .collect::<Vec<_>>()
        .join("; ")
}
