//! CLI struct definitions for the failsafe command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "failsafe",
    version = env!("CARGO_PKG_VERSION"),
    about = "Checkpoint, drift detection and fail-safe revert for governed agent workspaces."
)]
pub(crate) struct Cli {
    /// Workspace root (defaults to the current directory).
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,
    /// Output format.
    #[clap(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Checkpoint capture, sealing and pause/resume.
    Checkpoint(CheckpointCli),
    /// Roll the workspace back to a recorded checkpoint.
    Revert(RevertCli),
}

#[derive(clap::Args, Debug)]
pub(crate) struct CheckpointCli {
    #[clap(subcommand)]
    pub command: CheckpointCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum CheckpointCommand {
    /// Capture a fresh unsealed checkpoint.
    Create {
        #[clap(long)]
        session: String,
    },
    /// Seal the current checkpoint and record it in the ledger.
    Seal,
    /// Show lifecycle state and the current checkpoint.
    Status,
    /// Report drift against the last sealed checkpoint.
    Validate,
    /// Hand control to an ungoverned tool (user-initiated only).
    Pause {
        #[clap(long)]
        reason: String,
    },
    /// Take control back and report what changed while paused.
    Resume,
    /// List archived checkpoints, newest first.
    History,
}

#[derive(clap::Args, Debug)]
#[clap(group(ArgGroup::new("target").required(true).args(["checkpoint", "hash"])))]
pub(crate) struct RevertCli {
    /// Ledger id of a CHECKPOINT_CREATED entry.
    #[clap(long)]
    pub checkpoint: Option<String>,
    /// Target commit, when reverting without a ledger entry.
    #[clap(long, requires = "since")]
    pub hash: Option<String>,
    /// RFC 3339 time of the target; observations after it are purged.
    #[clap(long)]
    pub since: Option<String>,
    #[clap(long)]
    pub reason: String,
    #[clap(long, default_value = "user.local")]
    pub actor: String,
    /// List the commits that would be discarded and stop.
    #[clap(long)]
    pub dry_run: bool,
}
