//! Resource tree deployment
//!
//! Copies filtered subtrees of the application source into their role
//! directories. Each job is described by a [`ManifestEntry`]; files are
//! selected by glob filters, excluded by glob and by subdirectory, and
//! always land with mode 0644 regardless of their source mode.

pub mod manifest;
pub mod prune;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;
use wax::{CandidatePath, Glob, Pattern};

pub use manifest::ManifestEntry;

/// Mode of deployed data files
pub const FILE_MODE: u32 = 0o644;

/// Mode of launchers and other executables
pub const EXEC_MODE: u32 = 0o755;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("{action} {} failed: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl DeployError {
    fn io(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }
}

/// Outcome of one copy job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployStats {
    pub files_copied: usize,
    pub files_skipped: usize,
}

impl DeployStats {
    pub fn merge(&mut self, other: DeployStats) {
        self.files_copied += other.files_copied;
        self.files_skipped += other.files_skipped;
    }
}

/// Compiled glob patterns of one kind (filters or exclusions)
struct PatternSet<'t> {
    globs: Vec<(Glob<'t>, bool)>,
}

impl<'t> PatternSet<'t> {
    fn compile(patterns: &'t [String]) -> Result<Self, DeployError> {
        let globs = patterns
            .iter()
            .map(|pattern| {
                Glob::new(pattern)
                    .map(|glob| (glob, pattern.contains('/')))
                    .map_err(|e| DeployError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { globs })
    }

    /// Patterns containing `/` match the relative path, others the file name
    fn matches(&self, file_name: &str, relative: &str) -> bool {
        self.globs.iter().any(|(glob, by_path)| {
            let subject = if *by_path { relative } else { file_name };
            glob.matched(&CandidatePath::from(subject)).is_some()
        })
    }
}

/// Copy every file below `entry.source` selected by the entry's globs.
///
/// A missing source directory copies nothing and is not an error.
pub fn copy_subtree(entry: &ManifestEntry) -> Result<DeployStats, DeployError> {
    let mut stats = DeployStats::default();
    if !entry.source.is_dir() {
        tracing::debug!(
            "Source {} does not exist, nothing to deploy",
            entry.source.display()
        );
        return Ok(stats);
    }

    let filters = PatternSet::compile(&entry.filters)?;
    let exclusions = PatternSet::compile(&entry.excluded_globs)?;

    let walker = WalkDir::new(&entry.source)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let excluded = e.depth() > 0
                && e.file_type().is_dir()
                && (entry.is_excluded_dir(e.path())
                    || exclusions.matches(
                        &e.file_name().to_string_lossy(),
                        &relative_text(&entry.source, e.path()),
                    ));
            !excluded
        });

    for dir_entry in walker {
        let dir_entry = dir_entry.map_err(|e| {
            let path = e.path().unwrap_or(&entry.source).to_path_buf();
            DeployError::Io {
                action: "walking",
                path,
                source: e.into(),
            }
        })?;
        if dir_entry.file_type().is_dir() {
            continue;
        }

        let relative = dir_entry
            .path()
            .strip_prefix(&entry.source)
            .unwrap_or(dir_entry.path());
        let relative_str = relative_text(&entry.source, dir_entry.path());
        let file_name = dir_entry.file_name().to_string_lossy();

        if !filters.matches(&file_name, &relative_str)
            || exclusions.matches(&file_name, &relative_str)
        {
            stats.files_skipped += 1;
            continue;
        }

        let dest = entry.dest.join(relative);
        copy_file(dir_entry.path(), &dest, FILE_MODE)?;
        stats.files_copied += 1;
    }

    tracing::debug!(
        "Deployed {} -> {}: {} copied, {} skipped",
        entry.source.display(),
        entry.dest.display(),
        stats.files_copied,
        stats.files_skipped
    );
    Ok(stats)
}

/// `path` relative to `root` with `/` separators, as globs expect
fn relative_text(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Copy `src` onto `dest`, creating parent directories, and set `mode`
pub fn copy_file(src: &Path, dest: &Path, mode: u32) -> Result<(), DeployError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(DeployError::io("creating", parent))?;
    }
    fs::copy(src, dest).map_err(DeployError::io("copying", src))?;
    set_mode(dest, mode).map_err(DeployError::io("setting permissions on", dest))
}

/// Install a single file. When `dest` is an existing directory the file keeps
/// its name inside it; otherwise `dest` is the target file path.
pub fn install_file(src: &Path, dest: &Path, mode: u32) -> Result<PathBuf, DeployError> {
    let target = match src.file_name() {
        Some(name) if dest.is_dir() => dest.join(name),
        _ => dest.to_path_buf(),
    };
    copy_file(src, &target, mode)?;
    Ok(target)
}

/// Write `contents` to `path` with `mode`, creating parent directories
pub fn write_file(path: &Path, contents: &str, mode: u32) -> Result<(), DeployError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(DeployError::io("creating", parent))?;
    }
    fs::write(path, contents).map_err(DeployError::io("writing", path))?;
    set_mode(path, mode).map_err(DeployError::io("setting permissions on", path))
}

/// Create `path` and its parents
pub fn create_dir(path: &Path) -> Result<(), DeployError> {
    fs::create_dir_all(path).map_err(DeployError::io("creating", path))
}

/// Set the permission bits of `path` (no-op off Unix)
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Remove a file, treating absence as success. Returns whether it existed.
pub fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Remove a directory tree, treating absence as success
pub fn remove_dir_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
