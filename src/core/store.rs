//! Store abstraction binding a governed workspace to its configuration.
//!
//! Every on-disk artifact the subsystems touch (current checkpoint, archive,
//! ledger, observation store, emergency log) is resolved through a `Store`
//! so tests can point a whole stack at a temp directory.

use crate::core::config::{self, FailsafeConfig};
use crate::core::error::FailsafeError;
use crate::core::gitignore;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the workspace root (the VCS working tree).
    pub root: PathBuf,
    pub config: FailsafeConfig,
}

impl Store {
    /// Open a store, reading `.failsafe/config.toml` if present, and make
    /// sure `.gitignore` hides the state directories. A failed `.gitignore`
    /// update is logged, not returned.
    pub fn open(root: &Path) -> Result<Self, FailsafeError> {
        let config = config::load_config(root)?;
        let store = Self::with_config(root, config);
        store.ensure_state_ignored();
        Ok(store)
    }

    pub fn with_config(root: &Path, config: FailsafeConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
        }
    }

    fn ensure_state_ignored(&self) {
        let entries = gitignore::state_entries(&self.config);
        match gitignore::ensure_ignored(&self.root, &entries) {
            Ok(added) if !added.is_empty() => info!(?added, "updated .gitignore"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not update .gitignore"),
        }
    }

    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.resolve(&self.config.checkpoint.dir)
            .join(&self.config.checkpoint.latest_file)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.resolve(&self.config.checkpoint.archive_dir)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.resolve(&self.config.ledger.path)
    }

    pub fn rag_db_path(&self) -> PathBuf {
        self.resolve(&self.config.rag.db_path)
    }

    pub fn emergency_log_path(&self) -> PathBuf {
        self.resolve(&self.config.revert.emergency_log)
    }
}
