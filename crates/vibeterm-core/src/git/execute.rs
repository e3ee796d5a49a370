//! Sequential plan execution.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::cli::{GitCli, GitFailure};
use super::plan::{GitCommand, RemediationPlan};

/// Outcome of executing a [`RemediationPlan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemediationResult {
    pub success: bool,
    /// Output of every completed command, each prefixed by its command line.
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a single push, pull or fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs remediation commands against a working directory.
///
/// Completed commands are never rolled back; a partially applied plan is
/// reported as such.
#[derive(Debug, Clone)]
pub struct Executor {
    git: GitCli,
    timeout: Duration,
}

impl Executor {
    /// Create an executor bounding each plan command by `timeout`.
    pub fn new(git: GitCli, timeout: Duration) -> Self {
        Self { git, timeout }
    }

    /// Run `plan`'s commands in order in `path`, stopping at the first failure.
    #[instrument(
        skip(self, path, plan),
        fields(path = %path.display(), commands = plan.commands.len())
    )]
    pub async fn execute(&self, path: &Path, plan: &RemediationPlan) -> RemediationResult {
        if !plan.can_fix || plan.commands.is_empty() {
            return RemediationResult {
                success: false,
                output: String::new(),
                error: Some("Nothing to fix".to_owned()),
            };
        }

        let mut outputs = Vec::with_capacity(plan.commands.len());
        for command in &plan.commands {
            debug!(%command, "running remediation command");
            match self.git.run(path, command.args(), self.timeout).await {
                Ok(output) => outputs.push(format!("$ {command}\n{}", output.stdout)),
                Err(e) => {
                    warn!(%command, error = %e.message(), "remediation stopped");
                    return RemediationResult {
                        success: false,
                        output: outputs.join("\n"),
                        error: Some(e.message()),
                    };
                }
            }
        }

        info!("remediation completed");
        RemediationResult {
            success: true,
            output: outputs.join("\n"),
            error: None,
        }
    }

    /// Run one remote command with its own timeout.
    ///
    /// `default_error` is reported when git fails without saying why.
    #[instrument(skip(self, path, command), fields(path = %path.display(), command = %command))]
    pub async fn run_single(
        &self,
        path: &Path,
        command: &GitCommand,
        timeout: Duration,
        default_error: &str,
    ) -> CommandResult {
        match self.git.run(path, command.args(), timeout).await {
            Ok(output) => {
                // push and fetch report progress on stderr only.
                let text = if output.stdout.trim().is_empty() {
                    output.stderr
                } else {
                    output.stdout
                };
                CommandResult {
                    success: true,
                    output: Some(text),
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e.message(), "git command failed");
                let error = match &e {
                    GitFailure::Exit { stdout, stderr, .. }
                        if stdout.trim().is_empty() && stderr.trim().is_empty() =>
                    {
                        default_error.to_owned()
                    }
                    other => other.message(),
                };
                CommandResult {
                    success: false,
                    output: None,
                    error: Some(error),
                }
            }
        }
    }
}
