//! Bounded git subprocess execution.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument};

/// Captured output of a successful git command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Why a git command did not succeed.
#[derive(Debug, Error)]
pub enum GitFailure {
    #[error("failed to run git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("git timed out after {0:?}")]
    Timeout(Duration),

    #[error("git exited with status {code:?}: {stderr}")]
    Exit {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

impl GitFailure {
    /// Text describing the failure, preferring git's own stderr.
    pub fn message(&self) -> String {
        match self {
            Self::Exit { stderr, stdout, .. } => {
                let stderr = stderr.trim();
                let stdout = stdout.trim();
                if !stderr.is_empty() {
                    stderr.to_owned()
                } else if !stdout.is_empty() {
                    stdout.to_owned()
                } else {
                    self.to_string()
                }
            }
            other => other.to_string(),
        }
    }
}

/// Runs git commands non-interactively with a bounded timeout.
///
/// Commands run with stdin closed, English messages (`LC_ALL=C`), and
/// credential and editor prompts disabled, so nothing can wait on a user.
/// A command that exceeds its timeout is killed.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run `git <args>` in `cwd`.
    ///
    /// # Errors
    ///
    /// Returns `GitFailure::Spawn` if git cannot be started,
    /// `GitFailure::Timeout` if it runs longer than `timeout`, and
    /// `GitFailure::Exit` on a non-zero exit status.
    #[instrument(skip(self, args), fields(cwd = %cwd.display()))]
    pub async fn run<I, S>(
        &self,
        cwd: &Path,
        args: I,
        timeout: Duration,
    ) -> Result<GitOutput, GitFailure>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(args)
            .current_dir(cwd)
            .env("LC_ALL", "C")
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_MERGE_AUTOEDIT", "no")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result.map_err(GitFailure::Spawn)?,
            Err(_) => return Err(GitFailure::Timeout(timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            debug!(code = ?output.status.code(), stderr = %stderr.trim(), "git command failed");
            return Err(GitFailure::Exit {
                code: output.status.code(),
                stdout,
                stderr,
            });
        }

        Ok(GitOutput { stdout, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_should_capture_stdout_of_successful_command() {
        let output = GitCli::default()
            .run(Path::new("."), ["--version"], TIMEOUT)
            .await
            .expect("git --version should succeed");
        assert!(output.stdout.starts_with("git version"));
    }

    #[tokio::test]
    async fn test_should_report_exit_failure_with_stderr() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let err = GitCli::default()
            .run(dir.path(), ["rev-parse", "HEAD"], TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, GitFailure::Exit { .. }));
        assert!(err.message().contains("not a git repository"));
    }

    #[tokio::test]
    async fn test_should_report_spawn_failure_for_missing_binary() {
        let err = GitCli::new("/nonexistent/bin/git")
            .run(Path::new("."), ["status"], TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, GitFailure::Spawn(_)));
        assert!(err.message().starts_with("failed to run git"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_should_time_out_slow_command() {
        // `sh -c` stands in for a hung git process.
        let err = GitCli::new("sh")
            .run(Path::new("."), ["-c", "sleep 5"], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, GitFailure::Timeout(_)));
        assert_eq!(err.message(), "git timed out after 100ms");
    }

    #[test]
    fn test_should_fall_back_to_stdout_then_status_in_message() {
        let from_stdout = GitFailure::Exit {
            code: Some(1),
            stdout: "nothing to commit\n".to_owned(),
            stderr: String::new(),
        };
        assert_eq!(from_stdout.message(), "nothing to commit");

        let bare = GitFailure::Exit {
            code: Some(128),
            stdout: String::new(),
            stderr: "  ".to_owned(),
        };
        assert!(bare.message().contains("128"));
    }
}
