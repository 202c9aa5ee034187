//! Checkpoint file I/O: the single "current" checkpoint plus a pruned archive.
//!
//! `save` overwrites the whole file, so a crash mid-write can leave a
//! truncated document behind. `load` therefore treats anything it cannot
//! parse as "no checkpoint" rather than failing governance resumption.

use crate::core::checkpoint::{CHECKPOINT_VERSION, Checkpoint};
use crate::core::error::FailsafeError;
use crate::core::store::Store;
use crate::core::time;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ARCHIVE_PREFIX: &str = "checkpoint-";
pub const ARCHIVE_EXT: &str = "yaml";

#[derive(Debug, Clone)]
pub struct ArchivedCheckpoint {
    pub path: PathBuf,
    pub checkpoint: Checkpoint,
}

#[derive(Debug, Clone)]
pub struct CheckpointPersistence {
    checkpoint_path: PathBuf,
    archive_dir: PathBuf,
    max_archive_depth: usize,
}

impl CheckpointPersistence {
    pub fn new(checkpoint_path: &Path, archive_dir: &Path, max_archive_depth: usize) -> Self {
        Self {
            checkpoint_path: checkpoint_path.to_path_buf(),
            archive_dir: archive_dir.to_path_buf(),
            max_archive_depth,
        }
    }

    pub fn from_store(store: &Store) -> Self {
        Self::new(
            &store.checkpoint_path(),
            &store.archive_dir(),
            store.config.checkpoint.max_archive_depth,
        )
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Current checkpoint, or `None` if missing or unreadable.
    pub fn load(&self) -> Option<Checkpoint> {
        if !self.checkpoint_path.exists() {
            return None;
        }
        match read_checkpoint(&self.checkpoint_path) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                warn!(
                    path = %self.checkpoint_path.display(),
                    error = %e,
                    "failed to load checkpoint; treating as absent"
                );
                None
            }
        }
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), FailsafeError> {
        if let Some(dir) = self.checkpoint_path.parent() {
            fs::create_dir_all(dir).map_err(FailsafeError::IoError)?;
        }
        let content = serde_yaml::to_string(checkpoint)?;
        fs::write(&self.checkpoint_path, content).map_err(FailsafeError::IoError)
    }

    /// Copy `checkpoint` into the archive under a timestamp name, then prune
    /// so at most `max_archive_depth` archives remain.
    pub fn archive_checkpoint(&self, checkpoint: &Checkpoint) -> Result<PathBuf, FailsafeError> {
        fs::create_dir_all(&self.archive_dir).map_err(FailsafeError::IoError)?;

        let file_name = format!(
            "{}{}.{}",
            ARCHIVE_PREFIX,
            time::file_stamp(&checkpoint.meta.created),
            ARCHIVE_EXT
        );
        let archive_file = self.archive_dir.join(file_name);
        let content = serde_yaml::to_string(checkpoint)?;
        fs::write(&archive_file, content).map_err(FailsafeError::IoError)?;

        let pruned = self.prune_archives()?;
        if pruned > 0 {
            info!(pruned, keep = self.max_archive_depth, "pruned checkpoint archive");
        }
        Ok(archive_file)
    }

    // Assumes serialized access: two concurrent archivers may each prune the
    // other's fresh file.
    fn prune_archives(&self) -> Result<usize, FailsafeError> {
        let archives = self.archive_names()?;
        let mut pruned = 0;
        for name in archives.iter().skip(self.max_archive_depth) {
            fs::remove_file(self.archive_dir.join(name)).map_err(FailsafeError::IoError)?;
            pruned += 1;
        }
        Ok(pruned)
    }

    /// Archive file names, newest first.
    fn archive_names(&self) -> Result<Vec<String>, FailsafeError> {
        if !self.archive_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = fs::read_dir(&self.archive_dir)
            .map_err(FailsafeError::IoError)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with(ARCHIVE_PREFIX))
            .collect();
        names.sort();
        names.reverse();
        Ok(names)
    }

    /// Archived checkpoints, newest first. Unreadable archives are skipped.
    pub fn list_archives(&self) -> Result<Vec<ArchivedCheckpoint>, FailsafeError> {
        let mut out = Vec::new();
        for name in self.archive_names()? {
            let path = self.archive_dir.join(&name);
            match read_checkpoint(&path) {
                Ok(checkpoint) => out.push(ArchivedCheckpoint { path, checkpoint }),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable archive"),
            }
        }
        Ok(out)
    }
}

fn read_checkpoint(path: &Path) -> Result<Checkpoint, FailsafeError> {
    let content = fs::read_to_string(path).map_err(FailsafeError::IoError)?;
    let checkpoint: Checkpoint = serde_yaml::from_str(&content)?;
    if checkpoint.meta.version != CHECKPOINT_VERSION {
        warn!(
            expected = CHECKPOINT_VERSION,
            found = checkpoint.meta.version,
            path = %path.display(),
            "checkpoint version mismatch"
        );
    }
    Ok(checkpoint)
}
