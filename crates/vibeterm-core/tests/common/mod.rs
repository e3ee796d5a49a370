//! Scratch git repositories for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Run git in `dir`, panicking on failure. Returns trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("should run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_owned()
}

/// Local identity so commits work regardless of the host's git config.
pub fn configure(dir: &Path) {
    git(dir, &["config", "user.name", "VibeTerm Test"]);
    git(dir, &["config", "user.email", "test@vibeterm.invalid"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

pub fn init_repo(dir: &Path) {
    fs::create_dir_all(dir).expect("should create repo dir");
    git(dir, &["init", "-q"]);
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    configure(dir);
}

pub fn write_file(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).expect("should write file");
}

pub fn commit_file(dir: &Path, name: &str, content: &str) {
    write_file(dir, name, content);
    git(dir, &["add", name]);
    git(dir, &["commit", "-q", "-m", &format!("update {name}")]);
}

pub fn commit_count(dir: &Path) -> u32 {
    git(dir, &["rev-list", "--count", "HEAD"])
        .parse()
        .expect("should parse commit count")
}

/// A bare remote seeded with one commit on `main`, plus a scratch root.
pub struct Fixture {
    pub root: TempDir,
    pub remote: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let root = TempDir::new().expect("should create temp dir");
        let remote = root.path().join("remote.git");
        fs::create_dir_all(&remote).expect("should create remote dir");
        git(&remote, &["init", "-q", "--bare"]);
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let seed = root.path().join("seed");
        init_repo(&seed);
        commit_file(&seed, "README.md", "seed\n");
        git(&seed, &["remote", "add", "origin", path_str(&remote)]);
        git(&seed, &["push", "-q", "-u", "origin", "main"]);

        Self { root, remote }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// Clone the remote into `name`, tracking `origin/main`.
    pub fn clone_repo(&self, name: &str) -> PathBuf {
        let dest = self.path(name);
        git(
            self.root.path(),
            &["clone", "-q", path_str(&self.remote), path_str(&dest)],
        );
        configure(&dest);
        dest
    }

    /// Push a commit to the remote from a throwaway clone.
    pub fn push_upstream_commit(&self, name: &str) {
        let other = self.clone_repo(&format!("upstream-{name}"));
        commit_file(&other, name, "upstream\n");
        git(&other, &["push", "-q"]);
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp paths are utf-8")
}
