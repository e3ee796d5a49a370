//! Real pseudo-terminal sessions running `/bin/sh`.

#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::timeout;
use vibeterm_core::events::{self, SessionEvent, SessionEvents};
use vibeterm_core::{AppConfig, Engine, EngineConfig, ShellConfig};

const WAIT: Duration = Duration::from_secs(10);

fn engine() -> (Engine, SessionEvents) {
    let app_config = AppConfig {
        shell: ShellConfig {
            program: Some("/bin/sh".to_owned()),
            args: Vec::new(),
            ..ShellConfig::default()
        },
        ..AppConfig::default()
    };
    let (sink, events) = events::channel();
    let engine = Engine::with_app_config(EngineConfig::default(), app_config)
        .expect("should create engine")
        .with_output_sink(sink);
    (engine, events)
}

/// Collect output of `id` until it contains `needle`.
async fn wait_for_output(events: &mut SessionEvents, id: &str, needle: &str) -> String {
    let mut seen = String::new();
    let result = timeout(WAIT, async {
        while let Some(event) = events.next().await {
            if let SessionEvent::Output { session_id, data } = event
                && session_id == id
            {
                seen.push_str(&String::from_utf8_lossy(&data));
                if seen.contains(needle) {
                    return;
                }
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {needle:?}; saw {seen:?}");
    seen
}

async fn wait_for_exit(events: &mut SessionEvents, id: &str) {
    let result = timeout(WAIT, async {
        while let Some(event) = events.next().await {
            if matches!(event, SessionEvent::Exited { ref session_id, .. } if session_id == id) {
                return;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {id} to exit");
}

#[tokio::test]
async fn test_should_echo_command_output() {
    let dir = TempDir::new().expect("should create temp dir");
    let (engine, mut events) = engine();

    let opened = engine.open_session("smoke", dir.path());
    assert!(opened.success, "open failed: {:?}", opened.error);

    engine.resize_session("smoke", 120, 40);
    engine.write_session("smoke", b"echo vibeterm-$((20 + 22))\n");
    wait_for_output(&mut events, "smoke", "vibeterm-42").await;

    engine.write_session("smoke", b"exit\n");
    wait_for_exit(&mut events, "smoke").await;
    assert!(!engine.is_session_live("smoke"));
}

#[tokio::test]
async fn test_should_start_in_working_directory() {
    let dir = TempDir::new().expect("should create temp dir");
    let (engine, mut events) = engine();

    assert!(engine.open_session("cwd", dir.path()).success);
    engine.write_session("cwd", b"pwd; echo done-$((1 + 1))\n");
    let output = wait_for_output(&mut events, "cwd", "done-2").await;

    let name = dir
        .path()
        .file_name()
        .and_then(|n| n.to_str())
        .expect("temp dir has a name");
    assert!(output.contains(name), "pwd output: {output:?}");
    engine.close_all_sessions();
}

#[tokio::test]
async fn test_should_replace_session_under_same_id() {
    let first = TempDir::new().expect("should create temp dir");
    let second = TempDir::new().expect("should create temp dir");
    let (engine, mut events) = engine();

    assert!(engine.open_session("tab", first.path()).success);
    assert!(engine.open_session("tab", second.path()).success);

    let sessions = engine.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].working_directory, second.path());

    engine.close_session("tab");
    engine.close_session("tab");
    wait_for_exit(&mut events, "tab").await;
    assert!(engine.sessions().is_empty());
}

#[tokio::test]
async fn test_should_report_missing_directory() {
    let (engine, _events) = engine();

    let opened = engine.open_session("bad", Path::new("/nonexistent/vibeterm/cwd"));

    assert!(!opened.success);
    assert!(opened.error.is_some());
    assert!(!engine.is_session_live("bad"));
}
