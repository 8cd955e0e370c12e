//! Locating `.clap` binaries on disk.

use crate::error::{HostError, LoadStage, Result};
use std::path::{Path, PathBuf};

/// Check if a path is a CLAP binary (a file, or a bundle on macOS)
pub fn is_plugin_file(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("clap")
}

/// Directories listed in `CLAP_PATH`, then the platform's standard ones.
pub fn clap_search_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = std::env::var_os("CLAP_PATH")
        .map(|value| std::env::split_paths(&value).collect())
        .unwrap_or_default();
    paths.extend(platform_paths());
    paths
}

fn home() -> String {
    std::env::var("HOME").unwrap_or_default()
}

#[cfg(target_os = "macos")]
fn platform_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/Library/Audio/Plug-Ins/CLAP"),
        PathBuf::from(format!("{}/Library/Audio/Plug-Ins/CLAP", home())),
    ]
}

#[cfg(target_os = "windows")]
fn platform_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("C:\\Program Files\\Common Files\\CLAP")];
    if let Ok(local) = std::env::var("LOCALAPPDATA") {
        paths.push(PathBuf::from(format!("{local}\\Programs\\Common\\CLAP")));
    }
    paths
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn platform_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/lib/clap"),
        PathBuf::from("/usr/local/lib/clap"),
        PathBuf::from(format!("{}/.clap", home())),
    ]
}

/// Every CLAP binary under `dir`, searched recursively, sorted by path.
///
/// A `.clap` bundle directory counts as one plugin and is not descended into.
pub fn find_plugins(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(HostError::LoadFailed {
            path: dir.to_path_buf(),
            stage: LoadStage::Opening,
            reason: "Not a directory".to_string(),
        });
    }

    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", current.display(), e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if is_plugin_file(&path) {
                found.push(path);
            } else if path.is_dir() {
                pending.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Plugins in every search path that exists.
pub fn find_system_plugins() -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in clap_search_paths().into_iter().filter(|p| p.is_dir()) {
        match find_plugins(&dir) {
            Ok(paths) => {
                tracing::debug!(dir = %dir.display(), count = paths.len(), "Scanned plugin directory");
                found.extend(paths);
            }
            Err(e) => tracing::warn!("Failed to scan {}: {}", dir.display(), e),
        }
    }
    found
}
