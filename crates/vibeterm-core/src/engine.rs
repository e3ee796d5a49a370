//! Core engine.
//!
//! The [`Engine`] is the boundary the UI layer talks to. It owns the session
//! registry and the git reconciliation pipeline (inspect, plan, execute), and
//! converts every failure into result data so nothing escapes as an error
//! once the engine is built.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};
use vibeterm_template::{COMMIT_TEMPLATE, MessageTemplate, TemplateManager};

use crate::config::{AppConfig, EngineConfig, load_app_config};
use crate::error::CoreError;
use crate::events::{DiscardSink, OutputSink};
use crate::git::{
    CommandResult, Executor, GitCli, GitCommand, Planner, RemediationPlan, RemediationResult,
    RepositoryStatus, StatusInspector,
};
use crate::pty::{ProcessSpawner, PtySpawner};
use crate::scan::{DiscoveredProject, scan_projects};
use crate::session::{SessionInfo, SessionManager};

/// Outcome of opening a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenSessionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Engine driving terminal sessions and git reconciliation.
///
/// # Examples
///
/// ```no_run
/// use std::path::{Path, PathBuf};
/// use vibeterm_core::{Engine, EngineConfig, events};
///
/// # async fn example() -> Result<(), vibeterm_core::CoreError> {
/// let config = EngineConfig::builder()
///     .config_path(PathBuf::from("/tmp/vibeterm.yaml"))
///     .build();
///
/// let (sink, mut events) = events::channel();
/// let engine = Engine::new(config)?.with_output_sink(sink);
///
/// let opened = engine.open_session("main", Path::new("/tmp"));
/// assert!(opened.success);
/// engine.write_session("main", b"ls\n");
/// let _event = events.next().await;
///
/// let plan = engine.get_fix_plan(Path::new("/tmp")).await;
/// println!("{:?}", plan.actions);
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    config: EngineConfig,
    app_config: AppConfig,
    sessions: SessionManager,
    sink: Arc<dyn OutputSink>,
    inspector: StatusInspector,
    planner: Planner,
    executor: Executor,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("app_config", &self.app_config)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine, loading the config file named by `config`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Io` or `CoreError::Yaml` if the config file exists
    /// but cannot be read or parsed, and `CoreError::Template` or
    /// `CoreError::Config` if the commit message settings are invalid.
    #[instrument(skip_all)]
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        let config_path = config.config_path();
        info!(config = %config_path.display(), "initializing engine");
        let app_config = load_app_config(&config_path)?;
        Self::with_app_config(config, app_config)
    }

    /// Create an engine from an already loaded [`AppConfig`].
    ///
    /// # Errors
    ///
    /// Same as [`Engine::new`], minus the file loading.
    pub fn with_app_config(config: EngineConfig, app_config: AppConfig) -> Result<Self, CoreError> {
        let mut shell = app_config.shell.clone();
        if let Some(program) = config.shell() {
            shell.program = Some(program.to_owned());
        }
        let profile = shell.resolve();

        let mut templates = TemplateManager::new();
        if let Some(dir) = &app_config.git.template_dir {
            let loaded = templates.load_dir(dir)?;
            info!(dir = %dir.display(), loaded, "loaded custom templates");
        }
        if let Some(source) = &app_config.git.commit_template {
            templates.add_template(MessageTemplate::new(COMMIT_TEMPLATE, source.as_str()))?;
        }

        let git = GitCli::default();
        let planner = Planner::new(templates, app_config.git.timestamp_format.as_str())?;
        let inspector = StatusInspector::new(git.clone(), app_config.git.status_timeout());
        let executor = Executor::new(git, app_config.git.fix_timeout());

        Ok(Self {
            config,
            sessions: SessionManager::new(Arc::new(PtySpawner), profile),
            app_config,
            sink: Arc::new(DiscardSink),
            inspector,
            planner,
            executor,
        })
    }

    /// Deliver output of sessions opened with [`Engine::open_session`] to `sink`.
    pub fn with_output_sink(mut self, sink: impl OutputSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Start shells through `spawner` instead of native pseudo-terminals.
    ///
    /// Live sessions of the previous spawner are destroyed.
    pub fn with_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        let profile = self.sessions.profile().clone();
        self.sessions = SessionManager::new(spawner, profile);
        self
    }

    /// Run git commands through `git` instead of the `git` on `PATH`.
    pub fn with_git(mut self, git: GitCli) -> Self {
        self.inspector = StatusInspector::new(git.clone(), self.app_config.git.status_timeout());
        self.executor = Executor::new(git, self.app_config.git.fix_timeout());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn app_config(&self) -> &AppConfig {
        &self.app_config
    }

    /// Project paths listed in the config file.
    pub fn tracked_projects(&self) -> Vec<PathBuf> {
        self.app_config
            .projects
            .iter()
            .map(|project| project.path.clone())
            .collect()
    }

    /// Startup command configured for the project at `cwd`.
    pub fn startup_command(&self, cwd: &Path) -> Option<&str> {
        let canonical = cwd.canonicalize().ok();
        self.app_config
            .projects
            .iter()
            .find(|project| {
                project.path == cwd
                    || (canonical.is_some() && project.path.canonicalize().ok() == canonical)
            })
            .and_then(|project| project.startup_command.as_deref())
    }

    // ── Sessions ─────────────────────────────────────────────

    /// Open a shell session delivering output to the engine's sink.
    pub fn open_session(&self, id: &str, cwd: &Path) -> OpenSessionResult {
        self.open_session_with(id, cwd, Arc::clone(&self.sink))
    }

    /// Open a shell session delivering output to `sink`.
    ///
    /// A live session under the same id is replaced.
    pub fn open_session_with(
        &self,
        id: &str,
        cwd: &Path,
        sink: Arc<dyn OutputSink>,
    ) -> OpenSessionResult {
        match self.sessions.create(id, cwd, sink) {
            Ok(()) => OpenSessionResult {
                success: true,
                error: None,
            },
            Err(e) => OpenSessionResult {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }

    /// Open a shell session in a project and type its startup command.
    ///
    /// `command` overrides the one configured for `cwd`. The command is
    /// written only once the session is running.
    pub fn open_project_session(
        &self,
        id: &str,
        cwd: &Path,
        sink: Arc<dyn OutputSink>,
        command: Option<&str>,
    ) -> OpenSessionResult {
        let opened = self.open_session_with(id, cwd, sink);
        let command = command
            .or_else(|| self.startup_command(cwd))
            .filter(|command| !command.trim().is_empty());
        if opened.success
            && let Some(command) = command
        {
            info!(id, command, "running startup command");
            self.write_session(id, format!("{command}\n").as_bytes());
        }
        opened
    }

    pub fn write_session(&self, id: &str, data: &[u8]) {
        self.sessions.write(id, data);
    }

    pub fn resize_session(&self, id: &str, cols: u16, rows: u16) {
        self.sessions.resize(id, cols, rows);
    }

    pub fn close_session(&self, id: &str) {
        self.sessions.destroy(id);
    }

    /// Terminate every session. Safe to call from several shutdown paths.
    pub fn close_all_sessions(&self) {
        self.sessions.destroy_all();
    }

    pub fn is_session_live(&self, id: &str) -> bool {
        self.sessions.is_live(id)
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions.sessions()
    }

    // ── Git reconciliation ───────────────────────────────────

    pub async fn get_status(&self, path: &Path) -> RepositoryStatus {
        self.inspector.status(path).await
    }

    pub async fn get_status_all(&self, paths: &[PathBuf]) -> BTreeMap<PathBuf, RepositoryStatus> {
        self.inspector.status_all(paths).await
    }

    /// Inspect `path` and plan its remediation. Never touches the repository.
    pub async fn get_fix_plan(&self, path: &Path) -> RemediationPlan {
        let status = self.inspector.status(path).await;
        self.planner.plan(&status)
    }

    /// Re-inspect, re-plan and execute the remediation for `path`.
    ///
    /// For a plan the user has already reviewed, use [`Engine::execute_plan`].
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn execute_fix(&self, path: &Path) -> RemediationResult {
        let plan = self.get_fix_plan(path).await;
        self.executor.execute(path, &plan).await
    }

    /// Execute exactly `plan` in `path`, without inspecting again.
    pub async fn execute_plan(&self, path: &Path, plan: &RemediationPlan) -> RemediationResult {
        self.executor.execute(path, plan).await
    }

    pub async fn push(&self, path: &Path) -> CommandResult {
        self.executor
            .run_single(
                path,
                &GitCommand::Push,
                self.app_config.git.push_timeout(),
                "Push failed",
            )
            .await
    }

    pub async fn pull(&self, path: &Path) -> CommandResult {
        self.executor
            .run_single(
                path,
                &GitCommand::Pull { rebase: false },
                self.app_config.git.pull_timeout(),
                "Pull failed",
            )
            .await
    }

    pub async fn fetch(&self, path: &Path) -> CommandResult {
        self.executor
            .run_single(
                path,
                &GitCommand::Fetch,
                self.app_config.git.fetch_timeout(),
                "Fetch failed",
            )
            .await
    }

    // ── Discovery ────────────────────────────────────────────

    pub fn scan_projects(&self, root: &Path) -> Vec<DiscoveredProject> {
        scan_projects(root, &self.app_config.scan)
    }
}
