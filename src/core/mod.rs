//! Shared primitives for the checkpoint and revert subsystems.
//!
//! Configuration, path resolution, subprocess and git access, the audit
//! ledger, and the checkpoint data model all live here.

pub mod checkpoint;
pub mod config;
pub mod db;
pub mod error;
pub mod git;
pub mod gitignore;
pub mod ledger;
pub mod logging;
pub mod runner;
pub mod store;
pub mod time;
