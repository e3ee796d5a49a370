//! Session manager: the registry of live shell processes.
//!
//! Each session id maps to at most one live process. Creating a session under
//! a live id replaces it. A session ends when it is destroyed, when every
//! session is swept by [`SessionManager::destroy_all`], or when its process
//! exits on its own; all three remove the registry entry.
//!
//! Every process gets a reader thread that forwards output to the session's
//! [`OutputSink`] and, after EOF, waits for the exit and runs the exit
//! observer. Entries carry a generation number so the observer of a replaced
//! process never removes its successor.

use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::error::CoreError;
use crate::events::OutputSink;
use crate::pty::{ExitWaiter, ProcessHandle, ProcessSpawner, ShellProfile, TerminalSize};

/// Size of the buffer each reader thread reads into.
const READ_BUFFER_SIZE: usize = 8192;

/// Snapshot of a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub working_directory: PathBuf,
    pub pid: Option<u32>,
}

struct SessionEntry {
    generation: u64,
    working_directory: PathBuf,
    handle: Arc<dyn ProcessHandle>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<String, SessionEntry>,
    next_generation: u64,
}

impl Registry {
    fn remove_generation(&mut self, id: &str, generation: u64) -> Option<SessionEntry> {
        match self.sessions.get(id) {
            Some(entry) if entry.generation == generation => self.sessions.remove(id),
            _ => None,
        }
    }
}

type SharedRegistry = Arc<Mutex<Registry>>;

fn lock(registry: &SharedRegistry) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns every live session and the processes behind them.
///
/// All registry mutation goes through the methods below, serialized by an
/// internal mutex that is never held while talking to a process.
pub struct SessionManager {
    spawner: Arc<dyn ProcessSpawner>,
    profile: ShellProfile,
    registry: SharedRegistry,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("profile", &self.profile)
            .field("live", &self.len())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager spawning `profile` through `spawner`.
    pub fn new(spawner: Arc<dyn ProcessSpawner>, profile: ShellProfile) -> Self {
        Self {
            spawner,
            profile,
            registry: SharedRegistry::default(),
        }
    }

    /// Returns the shell profile used for new sessions.
    pub fn profile(&self) -> &ShellProfile {
        &self.profile
    }

    /// Start a shell for `id` in `working_directory`.
    ///
    /// A live session under the same id is destroyed first. Output is
    /// delivered to `sink` until the process ends.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidWorkingDirectory`, `CoreError::Spawn` or
    /// `CoreError::Pty` if the shell cannot be started. Nothing stays
    /// registered under `id` in that case.
    #[instrument(skip(self, sink), fields(cwd = %working_directory.display()))]
    pub fn create(
        &self,
        id: &str,
        working_directory: &Path,
        sink: Arc<dyn OutputSink>,
    ) -> Result<(), CoreError> {
        self.destroy(id);

        let spawned = self
            .spawner
            .spawn(&self.profile, working_directory)
            .inspect_err(|e| error!(error = %e, "failed to spawn session"))?;
        let handle = spawned.handle;

        let (generation, displaced) = {
            let mut registry = lock(&self.registry);
            registry.next_generation += 1;
            let generation = registry.next_generation;
            let displaced = registry.sessions.insert(
                id.to_owned(),
                SessionEntry {
                    generation,
                    working_directory: working_directory.to_path_buf(),
                    handle: Arc::clone(&handle),
                },
            );
            (generation, displaced)
        };
        // A concurrent create for the same id won the race after our destroy.
        if let Some(entry) = displaced {
            terminate(id, &entry);
        }

        let reader = ReaderTask {
            id: id.to_owned(),
            generation,
            output: spawned.output,
            exit: spawned.exit,
            sink,
            registry: Arc::clone(&self.registry),
        };
        let spawn_result = thread::Builder::new()
            .name(format!("vibeterm-pty-{id}"))
            .spawn(move || reader.run());

        if let Err(e) = spawn_result {
            let entry = lock(&self.registry).remove_generation(id, generation);
            if let Some(entry) = entry {
                terminate(id, &entry);
            }
            return Err(CoreError::Spawn(format!("failed to start reader thread: {e}")));
        }

        info!(generation, pid = ?handle.pid(), "session created");
        Ok(())
    }

    /// Forward input to a live session. Unknown ids are ignored.
    pub fn write(&self, id: &str, data: &[u8]) {
        let Some(handle) = self.handle(id) else {
            debug!(id, "write to unknown session dropped");
            return;
        };
        if let Err(e) = handle.write(data) {
            warn!(id, error = %e, "failed to write to session");
        }
    }

    /// Resize a live session's terminal. Unknown ids and zero sizes are ignored.
    pub fn resize(&self, id: &str, cols: u16, rows: u16) {
        let size = TerminalSize::new(cols, rows);
        if !size.is_valid() {
            debug!(id, cols, rows, "ignoring empty terminal size");
            return;
        }
        let Some(handle) = self.handle(id) else {
            debug!(id, "resize of unknown session dropped");
            return;
        };
        if let Err(e) = handle.resize(size) {
            warn!(id, error = %e, "failed to resize session");
        }
    }

    /// Terminate a session and forget it. Unknown ids are ignored.
    pub fn destroy(&self, id: &str) {
        let entry = lock(&self.registry).sessions.remove(id);
        if let Some(entry) = entry {
            terminate(id, &entry);
            info!(id, generation = entry.generation, "session destroyed");
        }
    }

    /// Terminate every live session.
    ///
    /// Safe to call repeatedly and from several shutdown paths.
    pub fn destroy_all(&self) {
        let drained: Vec<(String, SessionEntry)> =
            lock(&self.registry).sessions.drain().collect();
        if drained.is_empty() {
            return;
        }
        info!(count = drained.len(), "destroying all sessions");
        for (id, entry) in &drained {
            terminate(id, entry);
        }
    }

    /// Returns whether `id` currently has a live process.
    pub fn is_live(&self, id: &str) -> bool {
        lock(&self.registry).sessions.contains_key(id)
    }

    /// Returns the working directory of a live session.
    pub fn working_directory(&self, id: &str) -> Option<PathBuf> {
        lock(&self.registry)
            .sessions
            .get(id)
            .map(|entry| entry.working_directory.clone())
    }

    /// Returns a snapshot of every live session, sorted by id.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = lock(&self.registry)
            .sessions
            .iter()
            .map(|(id, entry)| SessionInfo {
                id: id.clone(),
                working_directory: entry.working_directory.clone(),
                pid: entry.handle.pid(),
            })
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        lock(&self.registry).sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handle(&self, id: &str) -> Option<Arc<dyn ProcessHandle>> {
        lock(&self.registry)
            .sessions
            .get(id)
            .map(|entry| Arc::clone(&entry.handle))
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

fn terminate(id: &str, entry: &SessionEntry) {
    // Killing a process that already exited fails harmlessly.
    if let Err(e) = entry.handle.terminate() {
        debug!(id, error = %e, "terminate failed; process likely already exited");
    }
}

/// Pumps one process's output into its sink, then observes its exit.
struct ReaderTask {
    id: String,
    generation: u64,
    output: Box<dyn Read + Send>,
    exit: Box<dyn ExitWaiter>,
    sink: Arc<dyn OutputSink>,
    registry: SharedRegistry,
}

impl ReaderTask {
    fn run(mut self) {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            match self.output.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => self.sink.output(&self.id, &buf[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // Linux reports EIO on the master once the slave side closes.
                Err(e) => {
                    debug!(id = %self.id, error = %e, "session output closed");
                    break;
                }
            }
        }

        let exit_code = self.exit.wait();
        let removed = lock(&self.registry).remove_generation(&self.id, self.generation);
        if removed.is_some() {
            info!(id = %self.id, ?exit_code, "session exited");
        } else {
            debug!(id = %self.id, ?exit_code, "destroyed session reaped");
        }
        self.sink.exited(&self.id, exit_code);
    }
}
