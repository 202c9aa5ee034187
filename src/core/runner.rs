//! External process invocation.
//!
//! All subprocess calls (today: only `git`) go through a `CommandRunner` so the
//! git layer can be exercised against scripted outputs. Arguments are passed as
//! an argv vector, never through a shell.

use crate::core::error::FailsafeError;
use std::path::Path;
use std::process::Command;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

pub trait CommandRunner {
    /// Run `program` with `args` in `cwd`. A non-zero exit is *not* an error;
    /// only a failure to spawn is.
    fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<CommandOutput, FailsafeError>;
}

impl<F> CommandRunner for F
where
    F: Fn(&str, &[&str], &Path) -> Result<CommandOutput, FailsafeError>,
{
    fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
    ) -> Result<CommandOutput, FailsafeError> {
        self(program, args, cwd)
    }
}

/// Default runner backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
    ) -> Result<CommandOutput, FailsafeError> {
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(FailsafeError::IoError)?;

        // Killed by signal has no code; report it like git's own fatal exit.
        let code = output.status.code().unwrap_or(128);
        debug!(program, ?args, cwd = %cwd.display(), code, "external command finished");

        Ok(CommandOutput {
            code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_runners() {
        let runner =
            |program: &str, args: &[&str], _cwd: &Path| -> Result<CommandOutput, FailsafeError> {
                Ok(CommandOutput::ok(format!("{} {}", program, args.join(" "))))
            };
        let out = runner.run("git", &["status"], Path::new(".")).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "git status");
    }

    #[test]
    fn process_runner_reports_spawn_failure() {
        let err = ProcessRunner
            .run("failsafe-no-such-binary", &[], Path::new("."))
            .unwrap_err();
        assert!(matches!(err, FailsafeError::IoError(_)));
    }
}
