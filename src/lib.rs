//! failsafe: governance continuity for agentic workspaces
//!
//! **Pause, resume and revert without losing the audit trail.**
//!
//! A governed workspace is one where an AI agent works under policy and every
//! governance-relevant event lands in an append-only ledger. Two things break
//! that continuity: a user temporarily handing the workspace to an ungoverned
//! tool, and a governed change that has to be undone. This crate covers both.
//!
//! # Checkpoints
//!
//! - **Token-cheap**: VCS head and cleanliness, ledger chain head, and a
//!   per-folder manifold (file count, bytes, newest mtime) instead of file hashes
//! - **Sealed baselines**: a sealed checkpoint is never re-captured in place
//! - **Fail-open on local corruption**: an unreadable checkpoint file is "no checkpoint"
//!
//! # Pause / resume
//!
//! `pause` stores a sealed pause checkpoint. `resume` diffs the workspace
//! against it, archives it, seals a fresh baseline and records
//! `GOVERNANCE_RESUMED` (plus `EXTERNAL_DRIFT` when anything changed).
//!
//! # Revert
//!
//! A three-step transaction (`git_reset`, `rag_purge`, `ledger_seal`) guarded by
//! a double workspace-status check. Step failures are recorded, never thrown.
//!
//! ```bash
//! failsafe checkpoint pause --reason "trying a codegen skill"
//! failsafe checkpoint resume
//! failsafe revert --checkpoint 01J... --reason "bad migration" --dry-run
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: shared primitives (config, store, git, ledger, checkpoint model)
//! - [`plugins`]: subsystems (manifold, persistence, drift, lifecycle, revert, rag)

pub mod core;
pub mod plugins;

mod cli;

use crate::cli::{CheckpointCommand, Cli, Command, OutputFormat, RevertCli};
use crate::core::checkpoint::{Checkpoint, DriftReport};
use crate::core::error::FailsafeError;
use crate::core::git::GitResetService;
use crate::core::ledger::{AuditLedger, JsonlLedger};
use crate::core::logging;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::checkpoint::CheckpointManager;
use crate::plugins::rag::ObservationStore;
use crate::plugins::revert::{
    CheckpointRef, FailSafeRevertService, LedgerSeal, RevertRequest, RevertResult, RevertStepStatus,
};
use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;

pub fn run() -> Result<ExitCode, FailsafeError> {
    logging::init_logging();
    let cli = Cli::parse();

    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().map_err(FailsafeError::IoError)?,
    };
    let store = Store::open(&root)?;
    let ledger = Arc::new(JsonlLedger::new(&store.ledger_path()));

    match cli.command {
        Command::Checkpoint(group) => {
            let shared: Arc<dyn AuditLedger> = ledger;
            let manager = CheckpointManager::new(&store, Some(shared));
            run_checkpoint(&manager, group.command, cli.format)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Revert(args) => run_revert(&store, ledger, args, cli.format),
    }
}

fn run_checkpoint(
    manager: &CheckpointManager,
    command: CheckpointCommand,
    format: OutputFormat,
) -> Result<(), FailsafeError> {
    match command {
        CheckpointCommand::Create { session } => {
            let checkpoint = manager.create(&session)?;
            emit(format, &checkpoint, || {
                println!("{} checkpoint for session {}", "created".green(), session.bold());
                print_checkpoint(&checkpoint);
            })
        }
        CheckpointCommand::Seal => {
            let sealed = manager.seal()?;
            emit(format, &sealed, || match &sealed {
                Some(checkpoint) => {
                    println!("{}", "sealed".green());
                    print_checkpoint(checkpoint);
                }
                None => println!("{}", "nothing to seal".yellow()),
            })
        }
        CheckpointCommand::Status => {
            let state = manager.state();
            let current = manager.load();
            let view = serde_json::json!({ "state": state, "checkpoint": current });
            emit(format, &view, || {
                println!("state: {}", format!("{:?}", state).to_lowercase().bold());
                match &current {
                    Some(checkpoint) => print_checkpoint(checkpoint),
                    None => println!("{}", "no current checkpoint".dimmed()),
                }
            })
        }
        CheckpointCommand::Validate => {
            let report = manager.validate();
            emit(format, &report, || print_drift(&report))
        }
        CheckpointCommand::Pause { reason } => {
            let checkpoint = manager.pause(&reason)?;
            emit(format, &checkpoint, || {
                println!("{} ({})", "governance paused".yellow().bold(), reason);
                print_checkpoint(&checkpoint);
            })
        }
        CheckpointCommand::Resume => {
            let report = manager.resume()?;
            emit(format, &report, || {
                println!("{}", "governance active".green().bold());
                print_drift(&report);
            })
        }
        CheckpointCommand::History => {
            let archives = manager.persistence().list_archives()?;
            let view: Vec<serde_json::Value> = archives
                .iter()
                .map(|a| {
                    serde_json::json!({
                        "path": a.path,
                        "created": a.checkpoint.meta.created,
                        "skill_session": a.checkpoint.meta.skill_session,
                        "paused": a.checkpoint.is_paused(),
                    })
                })
                .collect();
            emit(format, &view, || {
                if archives.is_empty() {
                    println!("{}", "no archived checkpoints".dimmed());
                }
                for archive in &archives {
                    let meta = &archive.checkpoint.meta;
                    println!(
                        "{}  {}{}",
                        time::to_rfc3339(&meta.created),
                        meta.skill_session.as_deref().unwrap_or("-").bold(),
                        if archive.checkpoint.is_paused() { "  (pause)" } else { "" }
                    );
                }
            })
        }
    }
}

fn run_revert(
    store: &Store,
    ledger: Arc<JsonlLedger>,
    args: RevertCli,
    format: OutputFormat,
) -> Result<ExitCode, FailsafeError> {
    let target = match (&args.checkpoint, &args.hash, &args.since) {
        (Some(id), _, _) => ledger.checkpoint_ref(id)?,
        (None, Some(hash), Some(since)) => CheckpointRef {
            checkpoint_id: format!("manual-{}", hash.get(..8).unwrap_or(hash)),
            git_hash: hash.clone(),
            timestamp: since.clone(),
            phase: "manual".to_string(),
            status: "sealed".to_string(),
        },
        _ => {
            return Err(FailsafeError::ValidationError(
                "revert needs --checkpoint, or --hash with --since".to_string(),
            ));
        }
    };

    let rag = ObservationStore::from_store(store)?;
    let service = FailSafeRevertService::new(
        store,
        GitResetService::new(),
        rag,
        LedgerSeal::new(ledger),
    );

    if args.dry_run {
        let commits = service.pending_discards(&target)?;
        emit(format, &commits, || {
            println!(
                "revert to {} would discard {} commit(s):",
                target.git_hash.bold(),
                commits.len()
            );
            for c in &commits {
                println!("  {} {}", c.hash.get(..8).unwrap_or(&c.hash).yellow(), c.subject);
            }
        })?;
        return Ok(ExitCode::SUCCESS);
    }

    let result = service.revert(&RevertRequest {
        target_checkpoint: target,
        reason: args.reason,
        actor: args.actor,
    });
    emit(format, &result, || print_revert(&result))?;
    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn emit<T: Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce(),
) -> Result<(), FailsafeError> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(),
    }
    Ok(())
}

fn print_checkpoint(checkpoint: &Checkpoint) {
    let meta = &checkpoint.meta;
    println!("  created:  {}", time::to_rfc3339(&meta.created));
    println!("  session:  {}", meta.skill_session.as_deref().unwrap_or("-"));
    println!("  sealed:   {}", meta.sealed);
    if let Some(reason) = &meta.pause_reason {
        println!("  paused:   {} ({})", checkpoint.is_paused(), reason);
    }
    println!(
        "  git:      {} [{:?}]",
        checkpoint.snapshot.git_head.as_deref().unwrap_or("-"),
        checkpoint.snapshot.git_status
    );
}

fn print_drift(report: &DriftReport) {
    if !report.detected {
        println!("{}", "no drift detected".green());
        return;
    }
    println!(
        "{} {} file(s), {} commit(s) over {}s [{:?}]",
        "drift:".red().bold(),
        report.files_changed.len(),
        report.git_commits,
        report.duration_ms / 1000,
        report.source
    );
    let c = &report.classification;
    println!("  L3 {}  L2 {}  L1 {}", c.l3.to_string().red(), c.l2.to_string().yellow(), c.l1);
    for file in &report.files_changed {
        println!("  {}", file);
    }
}

fn print_revert(result: &RevertResult) {
    for step in &result.steps {
        let status = match step.status {
            RevertStepStatus::Success => "success".green(),
            RevertStepStatus::Skipped => "skipped".yellow(),
            RevertStepStatus::Failed => "failed".red(),
            RevertStepStatus::Pending => "pending".dimmed(),
        };
        println!("  {:<12} {:<8} {}", step.name.as_str(), status, step.detail);
    }
    match (&result.revert_checkpoint_id, &result.error) {
        (Some(id), None) => println!("{} ({})", "revert complete".green().bold(), id),
        (_, Some(error)) => println!("{} {}", "revert failed:".red().bold(), error),
        (None, None) => println!("{}", "revert complete".green().bold()),
    }
}
