//! Logging initialization and log file management.
//!
//! Every command writes a JSON log file at
//! `<log root>/<command>/<YYYYMMDD_HHMMSS>.log`. One-shot commands also log
//! human-readable lines to stderr; the interactive commands (`shell`,
//! `dashboard`) own the terminal and log to the file only.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Maximum age of log files before cleanup, in days.
const LOG_RETENTION_DAYS: u64 = 3;

/// Environment variable overriding the log root.
const LOG_DIR_ENV: &str = "VIBETERM_LOG_DIR";

/// Returns the directory holding per-command log directories.
///
/// `$VIBETERM_LOG_DIR`, else `~/.vibeterm/logs`, else a temp directory.
pub fn default_log_root() -> PathBuf {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".vibeterm").join("logs"),
        None => std::env::temp_dir().join("vibeterm").join("logs"),
    }
}

/// Initialize the tracing subscriber.
///
/// Returns a [`WorkerGuard`] that must be held for the lifetime of the
/// program to ensure all buffered logs are flushed.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or the
/// log file cannot be opened.
pub fn init_tracing(log_root: &Path, command: &str, interactive: bool) -> Result<WorkerGuard> {
    let (subscriber, guard) = build_tracing(log_root, command, interactive)?;
    subscriber.init();
    Ok(guard)
}

/// Build the tracing subscriber layers without registering globally.
fn build_tracing(
    log_root: &Path,
    command: &str,
    interactive: bool,
) -> Result<(impl tracing::Subscriber + Send + Sync + use<>, WorkerGuard)> {
    let (non_blocking, guard) = open_log_writer(log_root, command)?;

    let stderr_layer = (!interactive).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(EnvFilter::from_default_env())
    });

    let subscriber = tracing_subscriber::registry().with(stderr_layer).with(
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(EnvFilter::from_default_env()),
    );

    Ok((subscriber, guard))
}

/// Create the log directory and file, returning a non-blocking writer and guard.
fn open_log_writer(
    log_root: &Path,
    command: &str,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let log_dir = log_root.join(command);
    let log_path = log_dir.join(format!("{}.log", format_utc_timestamp(Utc::now())));

    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let log_file = fs::File::create(&log_path)
        .with_context(|| format!("failed to create log file: {}", log_path.display()))?;

    Ok(tracing_appender::non_blocking(log_file))
}

/// Remove log files older than 3 days from `log_root`.
///
/// Best effort: failures are reported with `eprintln!` (tracing is not
/// initialized yet) and never abort startup. Directories left empty are
/// removed.
pub fn cleanup_old_logs(log_root: &Path) {
    if !log_root.is_dir() {
        return;
    }

    let cutoff = std::time::SystemTime::now()
        - std::time::Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);

    remove_old_log_files(log_root, cutoff);
    remove_empty_dirs(log_root);
}

/// Format a UTC time as `YYYYMMDD_HHMMSS`.
fn format_utc_timestamp(time: DateTime<Utc>) -> String {
    time.format("%Y%m%d_%H%M%S").to_string()
}

/// Recursively remove `.log` files older than `cutoff` from `dir`.
fn remove_old_log_files(dir: &Path, cutoff: std::time::SystemTime) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!(
                "warning: failed to read log directory {}: {e}",
                dir.display()
            );
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            remove_old_log_files(&path, cutoff);
            continue;
        }

        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                eprintln!(
                    "warning: failed to read metadata for {}: {e}",
                    path.display()
                );
                continue;
            }
        };

        if modified < cutoff
            && let Err(e) = fs::remove_file(&path)
        {
            eprintln!(
                "warning: failed to remove old log file {}: {e}",
                path.display(),
            );
        }
    }
}

/// Remove empty subdirectories under `dir` (does not remove `dir` itself).
fn remove_empty_dirs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            remove_empty_dirs(&path);
            // Fails when not empty.
            let _ = fs::remove_dir(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use chrono::TimeZone;

    use super::*;

    fn backdate(path: &Path, days: u64) {
        let then = SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60);
        filetime::set_file_mtime(path, filetime::FileTime::from_system_time(then))
            .expect("should set mtime");
    }

    #[test]
    fn test_should_format_utc_timestamp_at_epoch() {
        let epoch = Utc.timestamp_opt(0, 0).single().expect("valid timestamp");
        assert_eq!(format_utc_timestamp(epoch), "19700101_000000");
    }

    #[test]
    fn test_should_format_utc_timestamp_known_date() {
        // 2026-02-03 14:30:12 UTC
        let time = Utc
            .timestamp_opt(1_770_129_012, 0)
            .single()
            .expect("valid timestamp");
        assert_eq!(format_utc_timestamp(time), "20260203_143012");
    }

    #[test]
    fn test_should_cleanup_old_log_files() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        let status_dir = tmp.path().join("status");
        fs::create_dir_all(&status_dir).expect("should create dir");

        let recent = status_dir.join("recent.log");
        fs::write(&recent, "recent log").expect("should write");
        let old = status_dir.join("old.log");
        fs::write(&old, "old log").expect("should write");
        backdate(&old, 4);

        cleanup_old_logs(tmp.path());

        assert!(recent.exists(), "recent log file should be preserved");
        assert!(!old.exists(), "old log file should be removed");
    }

    #[test]
    fn test_should_remove_empty_dirs_after_cleanup() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        let shell_dir = tmp.path().join("shell");
        fs::create_dir_all(&shell_dir).expect("should create dir");

        let old = shell_dir.join("old.log");
        fs::write(&old, "old").expect("should write");
        backdate(&old, 4);

        cleanup_old_logs(tmp.path());

        assert!(!shell_dir.exists(), "empty command directory should be removed");
        assert!(tmp.path().exists(), "log root itself should be kept");
    }

    #[test]
    fn test_should_skip_non_log_files() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        let notes = tmp.path().join("notes.txt");
        fs::write(&notes, "notes").expect("should write");
        backdate(&notes, 4);

        cleanup_old_logs(tmp.path());

        assert!(notes.exists(), "non-.log files should not be removed");
    }

    #[test]
    fn test_should_handle_nonexistent_log_root() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        cleanup_old_logs(&tmp.path().join("missing"));
    }

    #[test]
    fn test_should_create_log_file_per_command() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        let (_non_blocking, _guard) =
            open_log_writer(tmp.path(), "dashboard").expect("should open log writer");

        let entries: Vec<_> = fs::read_dir(tmp.path().join("dashboard"))
            .expect("log directory should exist")
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1, "exactly one log file should be created");

        let log_file = entries[0].path();
        assert_eq!(log_file.extension().and_then(|e| e.to_str()), Some("log"));
        let stem = log_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        assert_eq!(stem.len(), 15);
        assert_eq!(&stem[8..9], "_");
    }

    #[test]
    fn test_should_return_error_for_invalid_log_root() {
        let result = open_log_writer(Path::new("/dev/null"), "status");
        assert!(result.is_err(), "should fail when directory cannot be created");
    }

    #[test]
    fn test_should_build_subscriber_for_interactive_commands() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        let built = build_tracing(tmp.path(), "shell", true);
        assert!(built.is_ok());
        assert!(tmp.path().join("shell").is_dir());
    }
}
