//! Removal of stale generated files from a source checkout.
//!
//! Compiled forms, merge leftovers and form modules whose `.ui` source is
//! gone would otherwise be deployed along with the real sources.

use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// What a prune pass removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub files_removed: usize,
    pub dirs_removed: usize,
}

fn is_stale_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.ends_with(".pyc") || name.ends_with(".orig") {
        return true;
    }
    // Ui_<form>.py is generated from <form>.ui in the same directory
    if let Some(form) = name
        .strip_prefix("Ui_")
        .and_then(|rest| rest.strip_suffix(".py"))
    {
        return !path.with_file_name(format!("{}.ui", form)).exists();
    }
    false
}

/// Remove stale generated files and empty directories below `dir`.
///
/// Failures to remove individual entries are logged and skipped.
pub fn clean_source_tree(dir: &Path) -> PruneStats {
    let mut stats = PruneStats::default();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir() && entry.file_name() == "__pycache__")
        });

    let mut caches = Vec::new();
    for entry in walker.filter_map(|e| e.ok()) {
        if entry.file_type().is_dir() {
            let cache = entry.path().join("__pycache__");
            if cache.is_dir() {
                caches.push(cache);
            }
            continue;
        }
        if is_stale_file(entry.path()) {
            match fs::remove_file(entry.path()) {
                Ok(()) => stats.files_removed += 1,
                Err(e) => tracing::warn!("Could not remove {}: {}", entry.path().display(), e),
            }
        }
    }
    let top_cache = dir.join("__pycache__");
    if top_cache.is_dir() {
        caches.push(top_cache);
    }

    for cache in caches {
        match fs::remove_dir_all(&cache) {
            Ok(()) => stats.dirs_removed += 1,
            Err(e) => tracing::warn!("Could not remove {}: {}", cache.display(), e),
        }
    }

    // Deepest first, so parents emptied by their children go too
    let mut dirs: Vec<_> = WalkDir::new(dir)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();
    dirs.dedup();
    for empty in dirs {
        let is_empty = fs::read_dir(&empty)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty && fs::remove_dir(&empty).is_ok() {
            stats.dirs_removed += 1;
        }
    }

    tracing::debug!(
        "Cleaned {}: {} files, {} directories removed",
        dir.display(),
        stats.files_removed,
        stats.dirs_removed
    );
    stats
}
