//! Repository status inspection.
//!
//! A status is computed from three queries: `git status --porcelain` for
//! local working-tree changes, `git rev-parse @{u}` to find the upstream, and
//! `git rev-list --count --left-right HEAD...@{u}` for the ahead/behind
//! counts against it. The classification itself ([`classify`]) is a pure
//! function of the local changes and the counts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::cli::{GitCli, GitFailure};

/// Synchronization state of a working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RepositoryStatus {
    /// The directory has no `.git` marker.
    #[serde(rename = "not-git")]
    NotARepository,

    /// The upstream query failed for a reason other than a missing upstream.
    Error,

    /// Nothing to commit and in sync with the upstream.
    Clean,

    /// Local changes only; in sync with the upstream.
    Modified { modified: u32, untracked: u32 },

    /// Local commits not yet pushed.
    Ahead {
        ahead: u32,
        modified: u32,
        untracked: u32,
    },

    /// Upstream commits not yet pulled.
    Behind {
        behind: u32,
        modified: u32,
        untracked: u32,
    },

    /// Both local and upstream commits the other side lacks.
    Diverged {
        ahead: u32,
        behind: u32,
        modified: u32,
        untracked: u32,
    },

    /// No upstream branch is configured.
    NoRemote { modified: u32, untracked: u32 },
}

impl RepositoryStatus {
    /// Local working-tree changes carried by this status.
    pub fn local_changes(&self) -> LocalChanges {
        match *self {
            Self::NotARepository | Self::Error | Self::Clean => LocalChanges::default(),
            Self::Modified {
                modified,
                untracked,
            }
            | Self::Ahead {
                modified,
                untracked,
                ..
            }
            | Self::Behind {
                modified,
                untracked,
                ..
            }
            | Self::Diverged {
                modified,
                untracked,
                ..
            }
            | Self::NoRemote {
                modified,
                untracked,
            } => LocalChanges {
                modified,
                untracked,
            },
        }
    }

    /// Short lowercase label, matching the serialized tag.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotARepository => "not-git",
            Self::Error => "error",
            Self::Clean => "clean",
            Self::Modified { .. } => "modified",
            Self::Ahead { .. } => "ahead",
            Self::Behind { .. } => "behind",
            Self::Diverged { .. } => "diverged",
            Self::NoRemote { .. } => "no-remote",
        }
    }
}

impl std::fmt::Display for RepositoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let local = self.local_changes();
        match *self {
            Self::NotARepository => f.write_str("not a git repository"),
            Self::Error => f.write_str("error"),
            Self::Clean => f.write_str("clean"),
            Self::Modified { .. } => write!(f, "modified ({local})"),
            Self::Ahead { ahead, .. } => write!(f, "ahead {ahead} ({local})"),
            Self::Behind { behind, .. } => write!(f, "behind {behind} ({local})"),
            Self::Diverged { ahead, behind, .. } => {
                write!(f, "diverged +{ahead}/-{behind} ({local})")
            }
            Self::NoRemote { .. } => write!(f, "no remote ({local})"),
        }
    }
}

/// Counts of uncommitted working-tree entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalChanges {
    /// Every non-untracked entry: staged, unstaged, renamed, deleted.
    pub modified: u32,
    pub untracked: u32,
}

impl LocalChanges {
    /// Bucket `git status --porcelain` output.
    ///
    /// Lines starting with `??` are untracked; every other entry counts as
    /// modified regardless of its index/worktree flags.
    pub fn from_porcelain(output: &str) -> Self {
        output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .fold(Self::default(), |mut acc, line| {
                if line.starts_with("??") {
                    acc.untracked += 1;
                } else {
                    acc.modified += 1;
                }
                acc
            })
    }

    pub fn total(&self) -> u32 {
        self.modified + self.untracked
    }

    pub fn is_dirty(&self) -> bool {
        self.total() > 0
    }
}

impl std::fmt::Display for LocalChanges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} modified, {} untracked", self.modified, self.untracked)
    }
}

/// Commit counts relative to the upstream branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AheadBehind {
    pub ahead: u32,
    pub behind: u32,
}

impl AheadBehind {
    /// Parse `git rev-list --count --left-right` output (`"<ahead>\t<behind>"`).
    pub fn parse(output: &str) -> Option<Self> {
        let mut parts = output.split_whitespace();
        let ahead = parts.next()?.parse().ok()?;
        let behind = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { ahead, behind })
    }
}

/// Classify a repository from its local changes and upstream counts.
///
/// `upstream` is `None` when no upstream is configured. Divergence wins over
/// direction, direction over local dirtiness, dirtiness over clean.
pub fn classify(local: LocalChanges, upstream: Option<AheadBehind>) -> RepositoryStatus {
    let LocalChanges {
        modified,
        untracked,
    } = local;
    let Some(AheadBehind { ahead, behind }) = upstream else {
        return RepositoryStatus::NoRemote {
            modified,
            untracked,
        };
    };

    if ahead > 0 && behind > 0 {
        RepositoryStatus::Diverged {
            ahead,
            behind,
            modified,
            untracked,
        }
    } else if ahead > 0 {
        RepositoryStatus::Ahead {
            ahead,
            modified,
            untracked,
        }
    } else if behind > 0 {
        RepositoryStatus::Behind {
            behind,
            modified,
            untracked,
        }
    } else if local.is_dirty() {
        RepositoryStatus::Modified {
            modified,
            untracked,
        }
    } else {
        RepositoryStatus::Clean
    }
}

/// Determines the [`RepositoryStatus`] of working directories.
///
/// Results are never cached; every call queries git afresh.
#[derive(Debug, Clone)]
pub struct StatusInspector {
    git: GitCli,
    timeout: Duration,
}

impl StatusInspector {
    /// Create an inspector bounding each git query by `timeout`.
    pub fn new(git: GitCli, timeout: Duration) -> Self {
        Self { git, timeout }
    }

    /// Classify the working directory at `path`.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn status(&self, path: &Path) -> RepositoryStatus {
        if !path.join(".git").exists() {
            return RepositoryStatus::NotARepository;
        }

        let local = match self
            .git
            .run(path, ["status", "--porcelain"], self.timeout)
            .await
        {
            Ok(output) => LocalChanges::from_porcelain(&output.stdout),
            Err(e) => {
                warn!(error = %e.message(), "local status query failed; assuming no changes");
                LocalChanges::default()
            }
        };

        // Any non-zero exit means the branch has no usable upstream.
        match self
            .git
            .run(
                path,
                ["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"],
                self.timeout,
            )
            .await
        {
            Ok(output) => debug!(upstream = %output.stdout.trim(), "found upstream"),
            Err(GitFailure::Exit { .. }) => return classify(local, None),
            Err(e) => {
                warn!(error = %e.message(), "upstream query failed");
                return RepositoryStatus::Error;
            }
        }

        let upstream = match self
            .git
            .run(
                path,
                ["rev-list", "--count", "--left-right", "HEAD...@{u}"],
                self.timeout,
            )
            .await
        {
            Ok(output) => match AheadBehind::parse(&output.stdout) {
                Some(counts) => counts,
                None => {
                    warn!(output = %output.stdout.trim(), "unexpected ahead/behind output");
                    return RepositoryStatus::Error;
                }
            },
            Err(e) => {
                warn!(error = %e.message(), "ahead/behind query failed");
                return RepositoryStatus::Error;
            }
        };

        let status = classify(local, Some(upstream));
        debug!(status = %status, "classified repository");
        status
    }

    /// Classify every path independently and concurrently.
    ///
    /// There is no snapshot guarantee across paths.
    #[instrument(skip_all, fields(count = paths.len()))]
    pub async fn status_all(&self, paths: &[PathBuf]) -> BTreeMap<PathBuf, RepositoryStatus> {
        let statuses = join_all(paths.iter().map(|path| self.status(path))).await;
        paths.iter().cloned().zip(statuses).collect()
    }
}
