//! Configuration types for vibeterm-core.
//!
//! This module defines [`EngineConfig`] (CLI-level overrides) and
//! [`AppConfig`] (from `config.yaml`) with its sub-configuration types.
//! During engine initialization, values in `EngineConfig` take precedence
//! over values read from `AppConfig`, which in turn take precedence over
//! the host environment (`$SHELL`, `$LANG`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::pty::{ShellProfile, TerminalSize};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "VIBETERM_CONFIG";

/// Locale used when the host does not provide `$LANG`.
pub const DEFAULT_LANG: &str = "en_US.UTF-8";

// ── Engine Configuration (CLI-level) ─────────────────────────

/// Engine configuration provided by the CLI layer.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use vibeterm_core::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .config_path(PathBuf::from("/tmp/vibeterm.yaml"))
///     .shell("/bin/bash")
///     .build();
/// assert_eq!(config.shell(), Some("/bin/bash"));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, TypedBuilder)]
pub struct EngineConfig {
    /// Explicit config file (defaults to [`default_config_path`]).
    #[builder(default, setter(strip_option))]
    #[serde(skip_serializing_if = "Option::is_none")]
    config_path: Option<PathBuf>,

    /// Override the shell program (takes precedence over config.yaml).
    #[builder(default, setter(strip_option, into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    shell: Option<String>,
}

impl EngineConfig {
    /// Returns the config file path, falling back to the default location.
    pub fn config_path(&self) -> PathBuf {
        self.config_path.clone().unwrap_or_else(default_config_path)
    }

    /// Returns the shell override, if set.
    pub fn shell(&self) -> Option<&str> {
        self.shell.as_deref()
    }
}

/// Resolve the default config file location.
///
/// Checks `$VIBETERM_CONFIG`, then `$XDG_CONFIG_HOME/vibeterm/config.yaml`,
/// then `~/.config/vibeterm/config.yaml`.
pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("vibeterm").join("config.yaml")
}

// ── Application Configuration (config.yaml) ──────────────────

/// Application configuration, deserialized from `config.yaml`.
///
/// All fields have serde defaults so that missing keys produce valid
/// configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Tracked project directories.
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,

    /// Interactive shell settings.
    #[serde(default)]
    pub shell: ShellConfig,

    /// Git query and remediation settings.
    #[serde(default)]
    pub git: GitConfig,

    /// Project discovery settings.
    #[serde(default)]
    pub scan: ScanConfig,
}

/// A tracked project.
///
/// In `config.yaml` an entry is either a bare path or a map with `path`
/// and an optional `startupCommand`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ProjectEntry")]
pub struct ProjectConfig {
    pub path: PathBuf,

    /// Typed into every shell opened in this project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_command: Option<String>,
}

impl ProjectConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            startup_command: None,
        }
    }

    pub fn with_startup_command(mut self, command: impl Into<String>) -> Self {
        self.startup_command = Some(command.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProjectEntry {
    Path(PathBuf),
    #[serde(rename_all = "camelCase")]
    Detailed {
        path: PathBuf,
        #[serde(default)]
        startup_command: Option<String>,
    },
}

impl From<ProjectEntry> for ProjectConfig {
    fn from(entry: ProjectEntry) -> Self {
        match entry {
            ProjectEntry::Path(path) => Self::new(path),
            ProjectEntry::Detailed {
                path,
                startup_command,
            } => Self {
                path,
                startup_command,
            },
        }
    }
}

/// Shell settings for new sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellConfig {
    /// Shell program. Defaults to `$SHELL`, then a platform fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    /// Arguments passed to the shell.
    #[serde(default = "default_shell_args")]
    pub args: Vec<String>,

    /// Value of `TERM` in the session.
    #[serde(default = "default_term")]
    pub term: String,

    /// Value of `COLORTERM` in the session.
    #[serde(default = "default_colorterm")]
    pub colorterm: String,

    /// Value of `LANG` in the session. Defaults to `$LANG`, then `en_US.UTF-8`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,

    /// Initial terminal width.
    #[serde(default = "default_cols")]
    pub cols: u16,

    /// Initial terminal height.
    #[serde(default = "default_rows")]
    pub rows: u16,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: default_shell_args(),
            term: default_term(),
            colorterm: default_colorterm(),
            lang: None,
            cols: default_cols(),
            rows: default_rows(),
        }
    }
}

impl ShellConfig {
    /// Resolve the shell profile against the host environment.
    pub fn resolve(&self) -> ShellProfile {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve the shell profile using `lookup` for host variables.
    pub fn resolve_with(&self, lookup: impl Fn(&str) -> Option<String>) -> ShellProfile {
        let program = self
            .program
            .clone()
            .or_else(|| lookup("SHELL").filter(|s| !s.is_empty()))
            .unwrap_or_else(|| fallback_shell().to_owned());
        let lang = self
            .lang
            .clone()
            .or_else(|| lookup("LANG").filter(|s| !s.is_empty()))
            .unwrap_or_else(|| DEFAULT_LANG.to_owned());

        ShellProfile::builder()
            .program(program)
            .args(self.args.clone())
            .env(vec![
                ("TERM".to_owned(), self.term.clone()),
                ("COLORTERM".to_owned(), self.colorterm.clone()),
                ("LANG".to_owned(), lang),
            ])
            .size(TerminalSize::new(self.cols, self.rows))
            .build()
    }
}

/// Git query and remediation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitConfig {
    /// Timeout for each status query.
    #[serde(default = "default_status_timeout")]
    pub status_timeout_secs: u64,

    /// Timeout for each command of a remediation plan.
    #[serde(default = "default_fix_timeout")]
    pub fix_timeout_secs: u64,

    /// Timeout for `git push`.
    #[serde(default = "default_push_timeout")]
    pub push_timeout_secs: u64,

    /// Timeout for `git pull`.
    #[serde(default = "default_pull_timeout")]
    pub pull_timeout_secs: u64,

    /// Timeout for `git fetch`.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Commit message template. Variables: `{{ timestamp }}`, `{{ files }}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_template: Option<String>,

    /// Directory of `*.j2` templates overriding the built-in ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,

    /// `strftime` format of the commit timestamp.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            status_timeout_secs: default_status_timeout(),
            fix_timeout_secs: default_fix_timeout(),
            push_timeout_secs: default_push_timeout(),
            pull_timeout_secs: default_pull_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
            commit_template: None,
            template_dir: None,
            timestamp_format: default_timestamp_format(),
        }
    }
}

impl GitConfig {
    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    pub fn fix_timeout(&self) -> Duration {
        Duration::from_secs(self.fix_timeout_secs)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Project discovery settings.
///
/// A directory containing any of the `indicators` is a project. Hidden
/// directories and `skip_dirs` are never entered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    /// Maximum recursion depth below the scan root.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// File or directory names marking a project root.
    #[serde(default = "default_indicators")]
    pub indicators: Vec<String>,

    /// Directory names never descended into.
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            indicators: default_indicators(),
            skip_dirs: default_skip_dirs(),
        }
    }
}

// ── Default value functions for serde ────────────────────────

fn fallback_shell() -> &'static str {
    if cfg!(target_os = "macos") {
        "/bin/zsh"
    } else {
        "/bin/bash"
    }
}

fn default_shell_args() -> Vec<String> {
    vec!["-l".to_owned()]
}

fn default_term() -> String {
    "xterm-256color".to_owned()
}

fn default_colorterm() -> String {
    "truecolor".to_owned()
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

fn default_status_timeout() -> u64 {
    5
}

fn default_fix_timeout() -> u64 {
    30
}

fn default_push_timeout() -> u64 {
    60
}

fn default_pull_timeout() -> u64 {
    60
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_timestamp_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_owned()
}

fn default_max_depth() -> usize {
    3
}

fn default_indicators() -> Vec<String> {
    [
        ".git",
        "package.json",
        "Cargo.toml",
        "go.mod",
        "pyproject.toml",
        "setup.py",
        "Gemfile",
        "pom.xml",
        "build.gradle",
        ".project",
        "Makefile",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

fn default_skip_dirs() -> Vec<String> {
    ["node_modules", "Library", "Applications"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

// ── Config loading ───────────────────────────────────────────

/// Load [`AppConfig`] from a YAML file.
///
/// If the file does not exist, returns the default configuration. Paths
/// starting with `~` are expanded against `$HOME`.
///
/// # Errors
///
/// Returns `CoreError::Io` if the file exists but cannot be read.
/// Returns `CoreError::Yaml` if the file contains invalid YAML.
pub fn load_app_config(config_path: &Path) -> Result<AppConfig, crate::CoreError> {
    if !config_path.exists() {
        return Ok(AppConfig::default());
    }
    let content = std::fs::read_to_string(config_path)?;
    let mut config: AppConfig = serde_yaml::from_str(&content)?;

    let home = std::env::var_os("HOME").map(PathBuf::from);
    for project in &mut config.projects {
        project.path = expand_home(&project.path, home.as_deref());
    }
    config.git.template_dir = config
        .git
        .template_dir
        .as_deref()
        .map(|p| expand_home(p, home.as_deref()));

    Ok(config)
}

/// Expand a leading `~` component against `home`.
pub fn expand_home(path: &Path, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
