//! Attach the controlling terminal to a session.
//!
//! The terminal is put in raw mode so keystrokes, including Ctrl-C, reach
//! the shell unchanged. Input is forwarded from a blocking stdin thread,
//! output is copied to stdout, and window-size changes are forwarded until
//! the shell exits.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use crossterm::terminal;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use vibeterm_core::Engine;
use vibeterm_core::events::{self, GatedSink, SessionEvent};

const SESSION_ID: &str = "attached";

/// Restores cooked mode when dropped.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode().context("failed to enable raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            warn!(error = %e, "failed to restore terminal mode");
        }
    }
}

/// Run a shell in `cwd` attached to this terminal until it exits.
///
/// `command`, or else the project's configured startup command, is typed
/// into the shell once it is running.
pub async fn attach(engine: Arc<Engine>, cwd: &Path, command: Option<&str>) -> Result<()> {
    let (sink, mut events) = events::channel();
    let sink = GatedSink::new(sink);
    let gate = sink.gate();
    let opened = engine.open_project_session(SESSION_ID, cwd, Arc::new(sink), command);
    if !opened.success {
        bail!(
            "failed to open shell in {}: {}",
            cwd.display(),
            opened.error.as_deref().unwrap_or("unknown error")
        );
    }
    info!(cwd = %cwd.display(), "attached shell session");

    let guard = RawModeGuard::enable()?;
    forward_size(&engine);
    spawn_input_forwarder(Arc::clone(&engine));

    let result = pump_output(&engine, &mut events).await;

    // Nothing may reach stdout once the terminal is restored.
    gate.begin_teardown();
    drop(guard);
    engine.close_all_sessions();
    result
}

async fn pump_output(engine: &Engine, events: &mut events::SessionEvents) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut resized = window_changes()?;

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(SessionEvent::Output { data, .. }) => {
                    stdout.write_all(&data).await?;
                    stdout.flush().await?;
                }
                Some(SessionEvent::Exited { exit_code, .. }) => {
                    info!(?exit_code, "shell exited");
                    return Ok(());
                }
                None => return Ok(()),
            },
            Some(()) = resized.recv() => forward_size(engine),
        }
    }
}

fn forward_size(engine: &Engine) {
    match terminal::size() {
        Ok((cols, rows)) => engine.resize_session(SESSION_ID, cols, rows),
        Err(e) => debug!(error = %e, "cannot read terminal size"),
    }
}

/// Copy stdin to the session on a dedicated thread.
///
/// The thread blocks on stdin and ends with the process.
fn spawn_input_forwarder(engine: Arc<Engine>) {
    let spawned = std::thread::Builder::new()
        .name("vibeterm-stdin".to_owned())
        .spawn(move || {
            let mut stdin = std::io::stdin();
            let mut buf = [0u8; 1024];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if !engine.is_session_live(SESSION_ID) {
                            break;
                        }
                        engine.write_session(SESSION_ID, &buf[..n]);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!(error = %e, "stdin closed");
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "failed to start stdin forwarder");
    }
}

/// Stream of terminal resize notifications.
#[cfg(unix)]
fn window_changes() -> Result<tokio::sync::mpsc::Receiver<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut winch = signal(SignalKind::window_change()).context("failed to watch SIGWINCH")?;
    let (tx, rx) = tokio::sync::mpsc::channel(1);
    tokio::spawn(async move {
        while winch.recv().await.is_some() {
            // A pending notification already covers this change.
            let _ = tx.try_send(());
            if tx.is_closed() {
                break;
            }
        }
    });
    Ok(rx)
}

#[cfg(not(unix))]
fn window_changes() -> Result<tokio::sync::mpsc::Receiver<()>> {
    let (_tx, rx) = tokio::sync::mpsc::channel(1);
    Ok(rx)
}
