//! Remediation planning.
//!
//! [`build_plan`] derives an ordered, unattended command sequence from a
//! [`RepositoryStatus`]. Local-commit and remote-sync steps are composed
//! independently, so a dirty, diverged repository yields stage, commit,
//! rebase-pull and push in that order. Planning never fails and never
//! touches the repository.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{Local, NaiveDateTime};
use serde::{Serialize, Serializer};
use serde_json::json;
use tracing::warn;
use vibeterm_template::{COMMIT_TEMPLATE, TemplateManager};

use super::status::RepositoryStatus;
use crate::error::CoreError;

/// A git command a plan may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCommand {
    /// `git add -A`
    StageAll,
    /// `git commit -m <message>`
    Commit { message: String },
    /// `git pull --rebase`, or `git pull --no-rebase` for a merge pull
    Pull { rebase: bool },
    /// `git push`
    Push,
    /// `git fetch`
    Fetch,
}

impl GitCommand {
    /// Arguments passed to git.
    pub fn args(&self) -> Vec<&str> {
        match self {
            Self::StageAll => vec!["add", "-A"],
            Self::Commit { message } => vec!["commit", "-m", message.as_str()],
            Self::Pull { rebase: true } => vec!["pull", "--rebase"],
            Self::Pull { rebase: false } => vec!["pull", "--no-rebase"],
            Self::Push => vec!["push"],
            Self::Fetch => vec!["fetch"],
        }
    }

    /// Returns whether the command talks to a remote.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Pull { .. } | Self::Push | Self::Fetch)
    }
}

impl std::fmt::Display for GitCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Commit { message } => write!(f, "git commit -m {message:?}"),
            other => write!(f, "git {}", other.args().join(" ")),
        }
    }
}

impl Serialize for GitCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Ordered corrective steps for one repository.
///
/// `commands` is empty exactly when `can_fix` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationPlan {
    pub can_fix: bool,
    /// Human-readable steps, for display.
    pub actions: Vec<String>,
    pub commands: Vec<GitCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl RemediationPlan {
    /// A plan that explains why nothing can be done.
    pub fn unfixable(action: impl Into<String>) -> Self {
        Self {
            can_fix: false,
            actions: vec![action.into()],
            commands: Vec::new(),
            warning: None,
        }
    }
}

/// Derive the remediation plan for `status`.
///
/// `commit_message` is called with the number of changed files when the
/// plan needs a commit.
pub fn build_plan(
    status: &RepositoryStatus,
    commit_message: impl FnOnce(u32) -> String,
) -> RemediationPlan {
    match status {
        RepositoryStatus::Clean => return RemediationPlan::unfixable("Already clean"),
        RepositoryStatus::NotARepository => {
            return RemediationPlan::unfixable("Not a git repository");
        }
        RepositoryStatus::Error => {
            return RemediationPlan::unfixable("Could not determine git status");
        }
        _ => {}
    }

    let local = status.local_changes();
    // (action, command) pairs in execution order.
    let mut steps: Vec<(String, GitCommand)> = Vec::new();
    let mut warning = None;

    if local.is_dirty() {
        let files = local.total();
        let message = commit_message(files);
        steps.push((format!("Stage {files} file(s)"), GitCommand::StageAll));
        steps.push((
            format!("Commit with auto-generated message \"{message}\""),
            GitCommand::Commit { message },
        ));
    }

    match *status {
        RepositoryStatus::Diverged { behind, .. } => {
            steps.push((
                format!("Pull {behind} commit(s) with rebase"),
                GitCommand::Pull { rebase: true },
            ));
            warning = Some("Local commits will be replayed on top of remote changes.".to_owned());
        }
        RepositoryStatus::Behind { behind, .. } => {
            steps.push((
                format!("Pull {behind} commit(s)"),
                GitCommand::Pull { rebase: false },
            ));
        }
        _ => {}
    }

    let push_count = match *status {
        RepositoryStatus::Ahead { ahead, .. } | RepositoryStatus::Diverged { ahead, .. } => {
            Some(ahead)
        }
        // The commit created above is the one to push.
        _ if local.is_dirty() => Some(1),
        _ => None,
    };
    if let Some(count) = push_count {
        steps.push((format!("Push {count} commit(s)"), GitCommand::Push));
    }

    if let RepositoryStatus::NoRemote { .. } = status {
        if !local.is_dirty() {
            return RemediationPlan::unfixable("No remote configured - can only commit locally");
        }
        steps.retain(|(_, command)| !command.is_remote());
        warning =
            Some("No remote configured. Changes will only be committed locally.".to_owned());
    }

    let (actions, commands): (Vec<String>, Vec<GitCommand>) = steps.into_iter().unzip();
    RemediationPlan {
        can_fix: !commands.is_empty(),
        actions,
        commands,
        warning,
    }
}

/// Plans remediations, rendering commit messages from templates.
#[derive(Debug)]
pub struct Planner {
    templates: TemplateManager,
    timestamp_format: String,
}

impl Planner {
    /// Create a planner using `templates` and a `strftime` timestamp format.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Config` if `timestamp_format` is not a valid
    /// `strftime` format.
    pub fn new(
        templates: TemplateManager,
        timestamp_format: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let timestamp_format = timestamp_format.into();
        if StrftimeItems::new(&timestamp_format).any(|item| matches!(item, Item::Error)) {
            return Err(CoreError::Config(format!(
                "invalid timestamp format: {timestamp_format}"
            )));
        }
        Ok(Self {
            templates,
            timestamp_format,
        })
    }

    /// Plan with the current local time as the commit timestamp.
    pub fn plan(&self, status: &RepositoryStatus) -> RemediationPlan {
        self.plan_at(status, Local::now().naive_local())
    }

    /// Plan with an explicit commit timestamp.
    pub fn plan_at(&self, status: &RepositoryStatus, timestamp: NaiveDateTime) -> RemediationPlan {
        build_plan(status, |files| self.commit_message(timestamp, files))
    }

    fn commit_message(&self, timestamp: NaiveDateTime, files: u32) -> String {
        let mut stamp = String::new();
        if write!(stamp, "{}", timestamp.format(&self.timestamp_format)).is_err() {
            stamp = timestamp.to_string();
        }

        match self
            .templates
            .render(COMMIT_TEMPLATE, &json!({ "timestamp": stamp, "files": files }))
        {
            Ok(message) if !message.is_empty() => message,
            Ok(_) => {
                warn!("commit template rendered empty; using default message");
                format!("Auto-commit: {stamp}")
            }
            Err(e) => {
                warn!(error = %e, "commit template failed; using default message");
                format!("Auto-commit: {stamp}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use vibeterm_template::MessageTemplate;

    use super::*;

    fn message(_files: u32) -> String {
        "Auto-commit: test".to_owned()
    }

    fn all_statuses() -> Vec<RepositoryStatus> {
        let mut statuses = vec![
            RepositoryStatus::NotARepository,
            RepositoryStatus::Error,
            RepositoryStatus::Clean,
        ];
        for (modified, untracked) in [(0, 0), (1, 0), (0, 2), (3, 4)] {
            statuses.push(RepositoryStatus::Modified {
                modified,
                untracked,
            });
            statuses.push(RepositoryStatus::NoRemote {
                modified,
                untracked,
            });
            for n in [1, 5] {
                statuses.push(RepositoryStatus::Ahead {
                    ahead: n,
                    modified,
                    untracked,
                });
                statuses.push(RepositoryStatus::Behind {
                    behind: n,
                    modified,
                    untracked,
                });
                statuses.push(RepositoryStatus::Diverged {
                    ahead: n,
                    behind: n + 1,
                    modified,
                    untracked,
                });
            }
        }
        statuses
    }

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .and_then(|d| d.and_hms_opt(15, 9, 26))
            .expect("valid timestamp")
    }

    #[test]
    fn test_should_only_refuse_clean_unknown_and_remote_less_clean_trees() {
        for status in all_statuses() {
            let plan = build_plan(&status, message);
            let expect_unfixable = match status {
                RepositoryStatus::Clean
                | RepositoryStatus::NotARepository
                | RepositoryStatus::Error => true,
                RepositoryStatus::NoRemote { .. } => !status.local_changes().is_dirty(),
                _ => false,
            };
            assert_eq!(!plan.can_fix, expect_unfixable, "status: {status:?}");
            assert_eq!(plan.commands.is_empty(), !plan.can_fix, "status: {status:?}");
            assert!(!plan.actions.is_empty(), "status: {status:?}");
        }
    }

    #[test]
    fn test_should_plan_commit_rebase_and_push_for_dirty_divergence() {
        let status = RepositoryStatus::Diverged {
            ahead: 2,
            behind: 3,
            modified: 1,
            untracked: 0,
        };
        let plan = build_plan(&status, message);

        assert!(plan.can_fix);
        assert_eq!(
            plan.commands,
            vec![
                GitCommand::StageAll,
                GitCommand::Commit {
                    message: "Auto-commit: test".to_owned(),
                },
                GitCommand::Pull { rebase: true },
                GitCommand::Push,
            ]
        );
        assert_eq!(plan.actions[0], "Stage 1 file(s)");
        assert_eq!(plan.actions[2], "Pull 3 commit(s) with rebase");
        assert_eq!(plan.actions[3], "Push 2 commit(s)");
        assert!(plan.warning.as_deref().is_some_and(|w| !w.is_empty()));
    }

    #[test]
    fn test_should_plan_plain_pull_when_behind() {
        let status = RepositoryStatus::Behind {
            behind: 4,
            modified: 0,
            untracked: 0,
        };
        let plan = build_plan(&status, message);

        assert!(plan.can_fix);
        assert_eq!(plan.commands, vec![GitCommand::Pull { rebase: false }]);
        assert_eq!(plan.actions, vec!["Pull 4 commit(s)"]);
        assert!(plan.warning.is_none());
    }

    #[test]
    fn test_should_commit_pull_and_push_one_when_dirty_and_behind() {
        let status = RepositoryStatus::Behind {
            behind: 2,
            modified: 1,
            untracked: 1,
        };
        let plan = build_plan(&status, message);

        assert_eq!(
            plan.commands,
            vec![
                GitCommand::StageAll,
                GitCommand::Commit {
                    message: "Auto-commit: test".to_owned(),
                },
                GitCommand::Pull { rebase: false },
                GitCommand::Push,
            ]
        );
        assert_eq!(plan.actions.last().map(String::as_str), Some("Push 1 commit(s)"));
    }

    #[test]
    fn test_should_push_exact_ahead_count() {
        let status = RepositoryStatus::Ahead {
            ahead: 5,
            modified: 2,
            untracked: 0,
        };
        let plan = build_plan(&status, message);

        assert_eq!(plan.commands.len(), 3);
        assert_eq!(plan.commands[2], GitCommand::Push);
        assert_eq!(plan.actions[2], "Push 5 commit(s)");
    }

    #[test]
    fn test_should_only_commit_locally_without_remote() {
        let status = RepositoryStatus::NoRemote {
            modified: 0,
            untracked: 2,
        };
        let plan = build_plan(&status, message);

        assert!(plan.can_fix);
        assert_eq!(
            plan.commands,
            vec![
                GitCommand::StageAll,
                GitCommand::Commit {
                    message: "Auto-commit: test".to_owned(),
                },
            ]
        );
        assert!(plan.commands.iter().all(|c| !c.is_remote()));
        assert_eq!(plan.actions.len(), 2);
        assert!(
            plan.warning
                .as_deref()
                .is_some_and(|w| w.contains("only be committed locally"))
        );
    }

    #[test]
    fn test_should_refuse_clean_tree_without_remote() {
        let status = RepositoryStatus::NoRemote {
            modified: 0,
            untracked: 0,
        };
        let plan = build_plan(&status, message);

        assert!(!plan.can_fix);
        assert!(plan.commands.is_empty());
        assert_eq!(
            plan.actions,
            vec!["No remote configured - can only commit locally"]
        );
    }

    #[test]
    fn test_should_not_render_commit_message_when_clean() {
        let status = RepositoryStatus::Ahead {
            ahead: 1,
            modified: 0,
            untracked: 0,
        };
        let plan = build_plan(&status, |_| panic!("no commit expected"));
        assert_eq!(plan.commands, vec![GitCommand::Push]);
    }

    #[test]
    fn test_should_render_command_lines() {
        assert_eq!(GitCommand::StageAll.to_string(), "git add -A");
        assert_eq!(
            GitCommand::Commit {
                message: "Auto-commit: now".to_owned(),
            }
            .to_string(),
            "git commit -m \"Auto-commit: now\""
        );
        assert_eq!(GitCommand::Pull { rebase: true }.to_string(), "git pull --rebase");
        assert_eq!(
            GitCommand::Pull { rebase: false }.to_string(),
            "git pull --no-rebase"
        );
        assert_eq!(GitCommand::Push.to_string(), "git push");
        assert_eq!(GitCommand::Fetch.to_string(), "git fetch");
    }

    #[test]
    fn test_should_serialize_plan_with_command_lines() {
        let plan = build_plan(
            &RepositoryStatus::Behind {
                behind: 1,
                modified: 0,
                untracked: 0,
            },
            message,
        );
        let value = serde_json::to_value(&plan).expect("should serialize");
        assert_eq!(value["canFix"], true);
        assert_eq!(value["commands"], json!(["git pull --no-rebase"]));
        assert!(value.get("warning").is_none());
    }

    #[test]
    fn test_should_stamp_commit_message_with_template() {
        let planner = Planner::new(TemplateManager::new(), "%Y-%m-%d %H:%M:%S").expect("planner");
        let plan = planner.plan_at(
            &RepositoryStatus::Modified {
                modified: 1,
                untracked: 0,
            },
            timestamp(),
        );
        assert_eq!(
            plan.commands[1],
            GitCommand::Commit {
                message: "Auto-commit: 2026-03-14 15:09:26".to_owned(),
            }
        );
    }

    #[test]
    fn test_should_use_custom_commit_template() {
        let mut templates = TemplateManager::new();
        templates
            .add_template(MessageTemplate::new(
                COMMIT_TEMPLATE,
                "sync {{ files }} file(s) @ {{ timestamp }}",
            ))
            .expect("should add");
        let planner = Planner::new(templates, "%H:%M").expect("planner");

        let plan = planner.plan_at(
            &RepositoryStatus::Modified {
                modified: 2,
                untracked: 1,
            },
            timestamp(),
        );
        assert_eq!(
            plan.commands[1],
            GitCommand::Commit {
                message: "sync 3 file(s) @ 15:09".to_owned(),
            }
        );
    }

    #[test]
    fn test_should_fall_back_when_template_fails() {
        let mut templates = TemplateManager::new();
        templates
            .add_template(MessageTemplate::new(COMMIT_TEMPLATE, "{{ missing_var }}"))
            .expect("should add");
        let planner = Planner::new(templates, "%Y").expect("planner");

        let plan = planner.plan_at(
            &RepositoryStatus::Modified {
                modified: 1,
                untracked: 0,
            },
            timestamp(),
        );
        assert_eq!(
            plan.commands[1],
            GitCommand::Commit {
                message: "Auto-commit: 2026".to_owned(),
            }
        );
    }

    #[test]
    fn test_should_reject_invalid_timestamp_format() {
        let err = Planner::new(TemplateManager::new(), "%Q").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
