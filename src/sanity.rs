//! Pre-flight sanity checks for the runtime environment
//!
//! This module answers questions about the host before any installation
//! work starts:
//! - Where executables live (`PATH` lookup)
//! - Whether the installer runs with elevated privileges
//! - Whether a directory is writable by the current user
//! - Who invoked the installer
//!
//! If the interpreter or the source distribution is missing, the program
//! exits with a clear error message before touching the filesystem.

use std::env;
use std::path::{Path, PathBuf};

use crate::deploy::manifest::SourceTree;

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub interpreter_found: bool,
    pub source_valid: bool,
}

impl SanityCheckResult {
    pub fn is_ok(&self) -> bool {
        self.interpreter_found && self.source_valid
    }
}

/// Locate `name` on `PATH`. Names containing a path separator are checked
/// as given.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = env::var_os("PATH")?;
    env::split_paths(&path).find_map(|dir| {
        executable_names(name)
            .into_iter()
            .map(|file| dir.join(file))
            .find(|full| full.is_file())
    })
}

#[cfg(windows)]
fn executable_names(name: &str) -> Vec<String> {
    if Path::new(name).extension().is_some() {
        vec![name.to_string()]
    } else {
        vec![format!("{}.exe", name), format!("{}.cmd", name), name.to_string()]
    }
}

#[cfg(not(windows))]
fn executable_names(name: &str) -> Vec<String> {
    vec![name.to_string()]
}

/// True when running with administrative rights.
///
/// On macOS installs under sudo are treated like user installs.
#[cfg(unix)]
pub fn is_elevated() -> bool {
    !cfg!(target_os = "macos") && nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn is_elevated() -> bool {
    false
}

/// True if the current user may create files in `dir`
#[cfg(unix)]
pub fn is_writable(dir: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};
    access(dir, AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
pub fn is_writable(dir: &Path) -> bool {
    std::fs::metadata(dir)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

/// Name of the user running the installer
pub fn invoking_user() -> String {
    #[cfg(unix)]
    {
        if let Ok(Some(user)) = nix::unistd::User::from_uid(nix::unistd::getuid()) {
            return user.name;
        }
    }
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Check that the interpreter and the source distribution are usable
pub fn verify_environment(interpreter: &Path, source: &SourceTree) -> SanityCheckResult {
    SanityCheckResult {
        interpreter_found: interpreter.is_file(),
        source_valid: source.is_valid(),
    }
}

/// Print what is wrong with the environment and exit
pub fn print_error_and_exit(
    result: &SanityCheckResult,
    interpreter: &Path,
    source: &SourceTree,
) -> ! {
    eprintln!();
    eprintln!("app7 installer - pre-flight check failed");
    eprintln!();
    if !result.interpreter_found {
        eprintln!("  Interpreter not found: {}", interpreter.display());
        eprintln!("  Pass the interpreter to install for with --python.");
        eprintln!();
    }
    if !result.source_valid {
        eprintln!(
            "  {} does not contain an app7 distribution.",
            source.root().display()
        );
        eprintln!("  Run the installer from the distribution root or pass --source.");
        eprintln!();
    }
    std::process::exit(crate::error::ExitCode::Filesystem.code());
}

/// Verify the environment, exiting on failure
pub fn run_preflight_checks(interpreter: &Path, source: &SourceTree) {
    tracing::debug!("Running pre-flight sanity checks...");
    let result = verify_environment(interpreter, source);
    if !result.is_ok() {
        print_error_and_exit(&result, interpreter, source);
    }
    tracing::debug!("Pre-flight checks passed");
}
