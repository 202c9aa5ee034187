//! Keep the tool's own state out of the governed working tree.
//!
//! Checkpoints, the ledger and the observation store live inside the
//! workspace. Unless git ignores them, the first `git status --porcelain`
//! reports them as untracked and every revert preflight aborts.

use crate::core::config::{CONFIG_DIR, FailsafeConfig};
use crate::core::error::FailsafeError;
use std::fs;
use std::path::{Component, Path};

pub const GITIGNORE_FILE: &str = ".gitignore";

/// Directory entries (`dir/`) holding everything the configuration writes.
/// Paths outside the workspace are skipped.
pub fn state_entries(config: &FailsafeConfig) -> Vec<String> {
    let mut entries = vec![format!("{}/", CONFIG_DIR)];
    let dirs = [
        Some(config.checkpoint.dir.as_str()),
        Some(config.checkpoint.archive_dir.as_str()),
        parent_of(&config.ledger.path),
        parent_of(&config.rag.db_path),
        parent_of(&config.revert.emergency_log),
    ];
    for entry in dirs.into_iter().flatten().filter_map(normalize) {
        if !entries.iter().any(|e| covers(e, &entry)) {
            entries.push(entry);
        }
    }
    entries
}

fn parent_of(path: &str) -> Option<&str> {
    Path::new(path).parent().and_then(|p| p.to_str())
}

/// `./a/b` and `a/b/` become `a/b/`. Empty, absolute and `..` paths yield `None`.
fn normalize(dir: &str) -> Option<String> {
    let mut parts = Vec::new();
    for component in Path::new(dir).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(format!("{}/", parts.join("/")))
}

/// Whether an existing ignore line already hides `entry`. Only plain
/// directory lines are understood; globs and negations never count.
fn covers(line: &str, entry: &str) -> bool {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
        return false;
    }
    if line.contains(['*', '?', '[']) {
        return false;
    }
    let dir = line.trim_start_matches('/').trim_end_matches('/');
    if dir.is_empty() {
        return false;
    }
    entry.starts_with(&format!("{}/", dir))
}

/// Append each missing entry to `<root>/.gitignore`, creating the file if
/// needed. Returns the entries that were added.
pub fn ensure_ignored(root: &Path, entries: &[String]) -> Result<Vec<String>, FailsafeError> {
    let path = root.join(GITIGNORE_FILE);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(FailsafeError::IoError(e)),
    };

    let missing: Vec<String> = entries
        .iter()
        .filter(|entry| !content.lines().any(|line| covers(line, entry)))
        .cloned()
        .collect();
    if missing.is_empty() {
        return Ok(missing);
    }

    let mut updated = content;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    for entry in &missing {
        updated.push_str(entry);
        updated.push('\n');
    }
    fs::write(&path, updated).map_err(FailsafeError::IoError)?;
    Ok(missing)
}
