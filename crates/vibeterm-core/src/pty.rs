//! Process handles for interactive shells.
//!
//! A [`ProcessSpawner`] starts one shell per session and hands back a
//! [`SpawnedProcess`]: a shared [`ProcessHandle`] for input, resizing and
//! termination, the blocking output reader, and an [`ExitWaiter`]. The
//! production spawner is [`PtySpawner`], which runs the shell inside a
//! pseudo-terminal via `portable-pty`.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use typed_builder::TypedBuilder;

use crate::error::CoreError;

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Returns whether both dimensions are positive.
    pub fn is_valid(&self) -> bool {
        self.cols > 0 && self.rows > 0
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

impl From<TerminalSize> for PtySize {
    fn from(size: TerminalSize) -> Self {
        PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

/// Fully resolved description of the shell every session runs.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct ShellProfile {
    /// Shell program path.
    #[builder(setter(into))]
    pub program: String,

    /// Arguments passed to the shell (`-l` for a login shell).
    #[builder(default)]
    pub args: Vec<String>,

    /// Variables set on top of the inherited host environment.
    #[builder(default)]
    pub env: Vec<(String, String)>,

    /// Initial terminal size.
    #[builder(default)]
    pub size: TerminalSize,
}

/// Control surface of one running shell process.
pub trait ProcessHandle: Send + Sync {
    /// Write raw input bytes to the process.
    fn write(&self, data: &[u8]) -> std::io::Result<()>;

    /// Change the terminal size seen by the process.
    fn resize(&self, size: TerminalSize) -> Result<(), CoreError>;

    /// Send the process a termination signal.
    fn terminate(&self) -> Result<(), CoreError>;

    /// OS process id, when known.
    fn pid(&self) -> Option<u32>;
}

/// Blocks until the process exits and reports its exit code.
pub trait ExitWaiter: Send {
    fn wait(self: Box<Self>) -> Option<u32>;
}

/// Everything a freshly spawned shell hands back to the session manager.
pub struct SpawnedProcess {
    pub handle: Arc<dyn ProcessHandle>,
    /// Blocking reader over the process output; EOF once the process is gone.
    pub output: Box<dyn Read + Send>,
    pub exit: Box<dyn ExitWaiter>,
}

impl std::fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("pid", &self.handle.pid())
            .finish_non_exhaustive()
    }
}

/// Starts shell processes for sessions.
pub trait ProcessSpawner: Send + Sync {
    /// Spawn `profile` with `cwd` as its working directory.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidWorkingDirectory` if `cwd` is not a directory.
    /// Returns `CoreError::Spawn` or `CoreError::Pty` if the process cannot start.
    fn spawn(&self, profile: &ShellProfile, cwd: &Path) -> Result<SpawnedProcess, CoreError>;
}

/// Spawns shells inside native pseudo-terminals.
#[derive(Debug, Clone, Copy, Default)]
pub struct PtySpawner;

impl ProcessSpawner for PtySpawner {
    #[instrument(skip(self, profile), fields(program = %profile.program))]
    fn spawn(&self, profile: &ShellProfile, cwd: &Path) -> Result<SpawnedProcess, CoreError> {
        if !cwd.is_dir() {
            return Err(CoreError::InvalidWorkingDirectory(cwd.to_path_buf()));
        }

        let pair = native_pty_system()
            .openpty(profile.size.into())
            .map_err(|e| CoreError::Pty(format!("failed to open pty: {e:#}")))?;

        let mut cmd = CommandBuilder::new(&profile.program);
        cmd.args(&profile.args);
        cmd.cwd(cwd);
        for (key, value) in &profile.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| CoreError::Spawn(format!("{}: {e:#}", profile.program)))?;
        // The child holds its own copy of the slave side; ours would keep the
        // reader from seeing EOF after the shell exits.
        drop(pair.slave);

        let pid = child.process_id();
        let killer = child.clone_killer();
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| CoreError::Pty(format!("failed to clone pty reader: {e:#}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| CoreError::Pty(format!("failed to acquire pty writer: {e:#}")))?;

        debug!(?pid, cwd = %cwd.display(), "spawned shell");

        Ok(SpawnedProcess {
            handle: Arc::new(PtyHandle {
                master: Mutex::new(pair.master),
                writer: Mutex::new(writer),
                killer: Mutex::new(killer),
                pid,
            }),
            output: reader,
            exit: Box::new(PtyExit { child }),
        })
    }
}

struct PtyHandle {
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    pid: Option<u32>,
}

impl ProcessHandle for PtyHandle {
    fn write(&self, data: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(data)?;
        writer.flush()
    }

    fn resize(&self, size: TerminalSize) -> Result<(), CoreError> {
        self.master
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resize(size.into())
            .map_err(|e| CoreError::Pty(format!("resize failed: {e:#}")))
    }

    fn terminate(&self) -> Result<(), CoreError> {
        self.killer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .kill()
            .map_err(|e| CoreError::Pty(format!("kill failed: {e}")))
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

struct PtyExit {
    child: Box<dyn Child + Send + Sync>,
}

impl ExitWaiter for PtyExit {
    fn wait(mut self: Box<Self>) -> Option<u32> {
        self.child.wait().ok().map(|status| status.exit_code())
    }
}
