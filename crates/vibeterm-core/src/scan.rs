//! Project discovery under a root directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::ScanConfig;

/// A directory recognized as a project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredProject {
    pub path: PathBuf,
    /// Directory name.
    pub name: String,
}

/// Find project directories below `root`.
///
/// Subdirectories of `root` are examined at depth 0. A directory holding
/// any configured indicator is reported and not descended into; other
/// directories are searched while the depth is below `max_depth`.
/// Unreadable directories are skipped.
#[instrument(skip(root, config), fields(root = %root.display()))]
pub fn scan_projects(root: &Path, config: &ScanConfig) -> Vec<DiscoveredProject> {
    let mut found = Vec::new();
    scan_dir(root, 0, config, &mut found);
    info!(count = found.len(), "project scan finished");
    found
}

fn scan_dir(dir: &Path, depth: usize, config: &ScanConfig, found: &mut Vec<DiscoveredProject>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if depth == 0 {
                warn!(dir = %dir.display(), error = %e, "cannot read scan root");
            }
            return;
        }
    };

    let mut children: Vec<(String, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            Some((name, entry.path()))
        })
        .filter(|(name, _)| !name.starts_with('.') && !config.skip_dirs.contains(name))
        .collect();
    children.sort();

    for (name, path) in children {
        if config
            .indicators
            .iter()
            .any(|indicator| path.join(indicator).exists())
        {
            debug!(path = %path.display(), "found project");
            found.push(DiscoveredProject { path, name });
        } else if depth < config.max_depth {
            scan_dir(&path, depth + 1, config, found);
        }
    }
}
