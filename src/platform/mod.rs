//! Platform integration
//!
//! Provides one integrator per operating system for the artifacts that make
//! an installed application usable from the desktop:
//! - Launchers in the binary directory (every platform)
//! - Menu entries (XDG metainfo and icons, macOS application bundle,
//!   Windows Start Menu folder)
//! - Desktop entries (XDG `.desktop` files, Windows desktop shortcuts)
//!
//! # Platform Support
//!
//! The platform is chosen once at startup with [`Platform::current`]. All
//! three integrators are plain filesystem code and can be exercised on any
//! host; only the Windows shortcut writer needs the real OS.
//!
//! Menu and desktop entries never fail an installation: problems are
//! collected in an [`IntegrationReport`].

pub mod launcher;
pub mod linux;
pub mod macos;
pub mod windows;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::deploy::manifest::SourceTree;
use crate::deploy::{self, DeployError};
use crate::layout::Placement;

pub use launcher::{LauncherSpec, LAUNCHERS};

/// Operating system family
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// The platform this binary was built for
    pub const fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Subdirectory of the source data directory holding this platform's
    /// templates
    pub const fn data_subdir(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Linux => "linux",
        }
    }
}

#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: DeployError,
    },

    #[error("template '{0}' is not available")]
    MissingTemplate(String),

    #[error("{0}")]
    Unavailable(String),
}

/// What an integration step did; failures are recorded, never raised
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationReport {
    pub created: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub skipped: Vec<String>,
    pub failures: Vec<String>,
}

impl IntegrationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: IntegrationReport) {
        self.created.extend(other.created);
        self.removed.extend(other.removed);
        self.skipped.extend(other.skipped);
        self.failures.extend(other.failures);
    }

    /// Record the outcome of creating `path`
    pub fn record_created<E: std::fmt::Display>(&mut self, path: &Path, result: Result<(), E>) {
        match result {
            Ok(()) => {
                tracing::debug!("Created {}", path.display());
                self.created.push(path.to_path_buf());
            }
            Err(e) => {
                tracing::warn!("Could not create {}: {}", path.display(), e);
                self.failures.push(format!("{}: {}", path.display(), e));
            }
        }
    }

    /// Remove a file, tolerating absence
    pub fn remove_file(&mut self, path: &Path) {
        match deploy::remove_file_if_exists(path) {
            Ok(true) => self.removed.push(path.to_path_buf()),
            Ok(false) => {}
            Err(e) => self.failures.push(format!("{}: {}", path.display(), e)),
        }
    }

    /// Remove a directory tree, tolerating absence
    pub fn remove_dir(&mut self, path: &Path) {
        match deploy::remove_dir_if_exists(path) {
            Ok(true) => self.removed.push(path.to_path_buf()),
            Ok(false) => {}
            Err(e) => self.failures.push(format!("{}: {}", path.display(), e)),
        }
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::debug!("Skipped: {}", reason);
        self.skipped.push(reason);
    }
}

/// Integration file templates, keyed by file name without the `.in` suffix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Templates {
    entries: BTreeMap<String, String>,
}

impl Templates {
    /// Read every `*.in` file in `dir`; a missing directory yields no templates
    pub fn load(dir: &Path) -> Self {
        let mut templates = Self::default();
        let Ok(entries) = fs::read_dir(dir) else {
            tracing::debug!("No integration templates in {}", dir.display());
            return templates;
        };
        for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
            let Some(name) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".in"))
            else {
                continue;
            };
            match fs::read_to_string(&path) {
                Ok(text) => templates.insert(name, text),
                Err(e) => tracing::warn!("Could not read template {}: {}", path.display(), e),
            }
        }
        templates
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(name.into(), text.into());
    }

    pub fn get(&self, name: &str) -> Result<&str, IntegrationError> {
        self.entries
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| IntegrationError::MissingTemplate(name.to_string()))
    }
}

/// Replace every `@KEY@` marker listed in `values`
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |text, (key, value)| {
            text.replace(&format!("@{}@", key), value)
        })
}

/// Where the macOS application bundle goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacBundle {
    pub dir: PathBuf,
    pub name: String,
}

impl Default for MacBundle {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(macos::DEFAULT_BUNDLE_DIR),
            name: macos::DEFAULT_BUNDLE_NAME.to_string(),
        }
    }
}

/// Inputs shared by every integrator
#[derive(Debug, Clone)]
pub struct IntegrationSettings {
    pub interpreter: PathBuf,
    pub source: SourceTree,
    pub elevated: bool,
    pub home_dir: Option<PathBuf>,
    pub desktop_dir: Option<PathBuf>,
    /// Start Menu programs folder (Windows)
    pub programs_dir: Option<PathBuf>,
    pub mac_bundle: MacBundle,
    /// Also remove desktop shortcuts on cleanup (Windows)
    pub clean_desktop: bool,
    /// Substituted for `@VERSION@`
    pub version: String,
    /// Substituted for `@MARKER@`
    pub marker: String,
}

impl IntegrationSettings {
    /// Settings with per-user locations taken from the running session
    pub fn detect(interpreter: PathBuf, source: SourceTree, elevated: bool) -> Self {
        Self {
            interpreter,
            source,
            elevated,
            home_dir: dirs::home_dir(),
            desktop_dir: dirs::desktop_dir(),
            programs_dir: dirs::data_dir()
                .map(|d| d.join("Microsoft/Windows/Start Menu/Programs")),
            mac_bundle: MacBundle::default(),
            clean_desktop: false,
            version: env!("CARGO_PKG_VERSION").to_string(),
            marker: String::new(),
        }
    }

    /// Major version of the interpreter, guessed from its file name
    pub fn py_marker(&self) -> String {
        self.interpreter
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix("python"))
            .and_then(|rest| rest.chars().next())
            .filter(char::is_ascii_digit)
            .map(String::from)
            .unwrap_or_default()
    }
}

/// Creates and removes the platform artifacts of an installation
pub trait PlatformIntegrator {
    fn platform(&self) -> Platform;

    /// File names a launcher called `name` may have in `bin_dir`
    fn launcher_paths(&self, bin_dir: &Path, name: &str) -> Vec<PathBuf>;

    /// Write a launcher into the target binary directory that runs
    /// `<appDir>/<name>` with the interpreter, passing all arguments through
    fn create_launcher(
        &self,
        placement: &Placement,
        name: &str,
        gui: bool,
    ) -> Result<PathBuf, IntegrationError>;

    fn create_menu_entry(&self, placement: &Placement, templates: &Templates) -> IntegrationReport;

    fn create_desktop_entry(
        &self,
        placement: &Placement,
        templates: &Templates,
    ) -> IntegrationReport;

    /// Remove every artifact this integrator can create, plus the launchers
    /// in each of `bin_dirs`. `recorded` holds the [`config_extras`] of the
    /// installation being removed. Absent artifacts are not an error.
    ///
    /// [`config_extras`]: PlatformIntegrator::config_extras
    fn remove_all(
        &self,
        placement: &Placement,
        bin_dirs: &[PathBuf],
        recorded: &BTreeMap<String, String>,
    ) -> IntegrationReport;

    /// Platform values recorded in the configuration artifact
    fn config_extras(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Remove every known launcher from each of `bin_dirs`
pub fn remove_launchers(
    integrator: &dyn PlatformIntegrator,
    bin_dirs: &[PathBuf],
    report: &mut IntegrationReport,
) {
    for bin_dir in bin_dirs {
        for launcher in LAUNCHERS {
            for path in integrator.launcher_paths(bin_dir, launcher.name) {
                report.remove_file(&path);
            }
        }
    }
}

/// The integrator for `platform`
pub fn integrator_for(
    platform: Platform,
    settings: IntegrationSettings,
) -> Box<dyn PlatformIntegrator> {
    match platform {
        Platform::Linux => Box::new(linux::LinuxIntegrator::new(settings)),
        Platform::MacOs => Box::new(macos::MacOsIntegrator::new(settings)),
        Platform::Windows => Box::new(windows::WindowsIntegrator::new(
            settings,
            Box::new(windows::PowerShellShortcuts),
        )),
    }
}
