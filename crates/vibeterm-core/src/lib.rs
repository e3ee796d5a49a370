//! VibeTerm core: terminal sessions over pseudo-terminals and git drift
//! reconciliation for tracked project directories.

mod config;
mod engine;
mod error;
pub mod events;
pub mod git;
mod pty;
mod scan;
mod session;

pub use config::{
    AppConfig, CONFIG_ENV, DEFAULT_LANG, EngineConfig, GitConfig, ProjectConfig, ScanConfig,
    ShellConfig, default_config_path, expand_home, load_app_config,
};
pub use engine::{Engine, OpenSessionResult};
pub use error::CoreError;
pub use pty::{
    ExitWaiter, ProcessHandle, ProcessSpawner, PtySpawner, ShellProfile, SpawnedProcess,
    TerminalSize,
};
pub use scan::{DiscoveredProject, scan_projects};
pub use session::{SessionInfo, SessionManager};
