//! Guarded git access: status, log, diff and hard reset.
//!
//! Every hash that ends up on a git command line must match
//! `^[0-9a-f]{40}$|^[0-9a-f]{64}$` first. Anything else (including option
//! shaped values like `--upload-pack=...`) is rejected locally and never
//! reaches the runner.

use crate::core::error::FailsafeError;
use crate::core::runner::{CommandOutput, CommandRunner, ProcessRunner};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::debug;

static GIT_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{40}$|^[0-9a-f]{64}$").unwrap());

pub const DEFAULT_LOG_LIMIT: usize = 50;

/// SHA-1 (40) or SHA-256 (64) object name, lowercase hex only.
pub fn is_valid_hash(candidate: &str) -> bool {
    GIT_HASH_RE.is_match(candidate)
}

pub fn validate_hash(candidate: &str) -> Result<&str, FailsafeError> {
    if is_valid_hash(candidate) {
        Ok(candidate)
    } else {
        Err(FailsafeError::InvalidHashFormat(candidate.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitStatus {
    pub clean: bool,
    pub current_branch: String,
    pub current_hash: String,
    pub uncommitted_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLogEntry {
    pub hash: String,
    pub subject: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Clone)]
pub struct GitResetService {
    runner: Arc<dyn CommandRunner>,
}

impl Default for GitResetService {
    fn default() -> Self {
        Self::new()
    }
}

impl GitResetService {
    pub fn new() -> Self {
        Self::with_runner(ProcessRunner)
    }

    pub fn with_runner(runner: impl CommandRunner + 'static) -> Self {
        Self {
            runner: Arc::new(runner),
        }
    }

    fn run(&self, root: &Path, args: &[&str]) -> Result<CommandOutput, FailsafeError> {
        self.runner.run("git", args, root)
    }

    pub fn get_status(&self, root: &Path) -> Result<GitStatus, FailsafeError> {
        let porcelain = self.run(root, &["status", "--porcelain"])?;
        if !porcelain.success() {
            return Err(FailsafeError::Git(format!(
                "status failed: {}",
                porcelain.stderr.trim()
            )));
        }
        let head = self.run(root, &["rev-parse", "HEAD"])?;
        let branch = self.run(root, &["branch", "--show-current"])?;

        // Porcelain v1 lines are `XY <path>`; keep the leading status columns intact.
        let uncommitted_files: Vec<String> = porcelain
            .stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| line.get(3..).unwrap_or_default().to_string())
            .collect();

        Ok(GitStatus {
            clean: uncommitted_files.is_empty(),
            current_branch: branch.stdout.trim().to_string(),
            current_hash: if head.success() {
                head.stdout.trim().to_string()
            } else {
                String::new()
            },
            uncommitted_files,
        })
    }

    /// Commits reachable from HEAD but not from `since_hash`, newest first.
    /// A failing log (unknown or rewritten ancestor) is an empty history.
    pub fn get_log(
        &self,
        root: &Path,
        since_hash: &str,
        limit: usize,
    ) -> Result<Vec<GitLogEntry>, FailsafeError> {
        let since_hash = validate_hash(since_hash)?;
        let range = format!("{}..HEAD", since_hash);
        let max = format!("-{}", limit);
        let out = self.run(root, &["log", "--format=%H|%s|%aI", &range, &max])?;
        if !out.success() {
            debug!(
                code = out.code,
                stderr = %out.stderr.trim(),
                "git log failed; treating as empty"
            );
            return Ok(Vec::new());
        }

        Ok(out
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(parse_log_line)
            .collect())
    }

    pub fn reset_hard(
        &self,
        root: &Path,
        target_hash: &str,
    ) -> Result<ResetOutcome, FailsafeError> {
        let target_hash = validate_hash(target_hash)?;
        let out = self.run(root, &["reset", "--hard", target_hash])?;
        Ok(ResetOutcome {
            success: out.success(),
            stdout: out.stdout,
            stderr: out.stderr,
        })
    }

    /// Resolved HEAD, or `None` when there is none (no commits, not a repository).
    pub fn head(&self, root: &Path) -> Result<Option<String>, FailsafeError> {
        let out = self.run(root, &["rev-parse", "HEAD"])?;
        let hash = out.stdout.trim();
        if !out.success() || hash.is_empty() {
            return Ok(None);
        }
        Ok(Some(hash.to_string()))
    }

    pub fn diff_names(
        &self,
        root: &Path,
        from: &str,
        to: &str,
    ) -> Result<Vec<String>, FailsafeError> {
        let from = validate_hash(from)?;
        let to = validate_hash(to)?;
        let out = self.run(
            root,
            &["-c", "core.quotepath=false", "diff", "--name-only", from, to],
        )?;
        if !out.success() {
            return Err(FailsafeError::Git(format!("diff failed: {}", out.stderr.trim())));
        }
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn commit_count(&self, root: &Path, from: &str, to: &str) -> Result<usize, FailsafeError> {
        let range = format!("{}..{}", validate_hash(from)?, validate_hash(to)?);
        let out = self.run(root, &["rev-list", "--count", &range])?;
        if !out.success() {
            return Err(FailsafeError::Git(format!("rev-list failed: {}", out.stderr.trim())));
        }
        out.stdout
            .trim()
            .parse::<usize>()
            .map_err(|e| FailsafeError::Git(format!("unexpected rev-list output: {}", e)))
    }
}

fn parse_log_line(line: &str) -> Option<GitLogEntry> {
    // Subjects may contain '|'; hash is the first field and the ISO date the last.
    let (hash, rest) = line.split_once('|')?;
    let (subject, timestamp) = rest.rsplit_once('|')?;
    Some(GitLogEntry {
        hash: hash.to_string(),
        subject: subject.to_string(),
        timestamp: timestamp.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording(
        calls: Arc<Mutex<Vec<Vec<String>>>>,
        reply: CommandOutput,
    ) -> impl Fn(&str, &[&str], &Path) -> Result<CommandOutput, FailsafeError> {
        move |_program: &str, args: &[&str], _cwd: &Path| -> Result<CommandOutput, FailsafeError> {
            calls
                .lock()
                .unwrap()
                .push(args.iter().map(|a| a.to_string()).collect());
            Ok(reply.clone())
        }
    }

    #[test]
    fn hash_pattern_accepts_sha1_and_sha256_only() {
        assert!(is_valid_hash(&"a".repeat(40)));
        assert!(is_valid_hash(&"0123456789abcdef".repeat(4)));
        assert!(!is_valid_hash(&"A".repeat(40)));
        assert!(!is_valid_hash(&"a".repeat(39)));
        assert!(!is_valid_hash(&"a".repeat(41)));
        assert!(!is_valid_hash("HEAD"));
        assert!(!is_valid_hash(&format!("{}\n", "a".repeat(40))));
    }

    #[test]
    fn status_parses_porcelain_paths() {
        let svc = GitResetService::with_runner(
            |_p: &str, args: &[&str], _c: &Path| -> Result<CommandOutput, FailsafeError> {
                Ok(match args[0] {
                    "status" => CommandOutput::ok(" M src/lib.rs\n?? notes.md\n"),
                    "rev-parse" => CommandOutput::ok(format!("{}\n", "b".repeat(40))),
                    _ => CommandOutput::ok("feature/x\n"),
                })
            },
        );
        let status = svc.get_status(Path::new(".")).unwrap();
        assert!(!status.clean);
        assert_eq!(status.uncommitted_files, vec!["src/lib.rs", "notes.md"]);
        assert_eq!(status.current_branch, "feature/x");
        assert_eq!(status.current_hash, "b".repeat(40));
    }

    #[test]
    fn status_outside_repository_is_an_error() {
        let svc = GitResetService::with_runner(
            |_p: &str, _a: &[&str], _c: &Path| -> Result<CommandOutput, FailsafeError> {
                Ok(CommandOutput::failed(128, "fatal: not a git repository"))
            },
        );
        let err = svc.get_status(Path::new(".")).unwrap_err();
        assert!(matches!(err, FailsafeError::Git(_)));
    }

    #[test]
    fn log_keeps_pipes_inside_subjects() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let svc = GitResetService::with_runner(recording(
            calls.clone(),
            CommandOutput::ok(format!(
                "{}|fix: a | b|2026-02-27T09:00:00+00:00\n",
                "c".repeat(40)
            )),
        ));
        let entries = svc.get_log(Path::new("."), &"d".repeat(40), 5).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].subject, "fix: a | b");
        assert_eq!(entries[0].timestamp, "2026-02-27T09:00:00+00:00");

        let recorded = calls.lock().unwrap();
        assert_eq!(recorded[0][2], format!("{}..HEAD", "d".repeat(40)));
        assert_eq!(recorded[0][3], "-5");
    }

    #[test]
    fn log_failure_is_empty_not_error() {
        let svc = GitResetService::with_runner(recording(
            Arc::new(Mutex::new(Vec::new())),
            CommandOutput::failed(128, "fatal: bad revision"),
        ));
        let entries = svc.get_log(Path::new("."), &"d".repeat(40), 50).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn diff_and_count_validate_both_ends() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let svc = GitResetService::with_runner(recording(calls.clone(), CommandOutput::ok("3\n")));
        let good = "e".repeat(40);
        assert!(svc.diff_names(Path::new("."), &good, "--output=/tmp/x").is_err());
        assert!(svc.commit_count(Path::new("."), "HEAD~1", &good).is_err());
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(svc.commit_count(Path::new("."), &good, &good).unwrap(), 3);
    }
}
