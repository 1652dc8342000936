//! Run settings
//!
//! Everything the installer needs to know about one run is collected into
//! an immutable [`InstallSettings`] before any work starts, then lent to
//! every component by reference.

use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::command_runner::run_captured;
use crate::config_file::PathConfig;
use crate::deploy::manifest::SourceTree;
use crate::error::{InstallerError, Result};
use crate::layout::{self, PathLayout, ResolverInput};
use crate::platform::{MacBundle, Platform};
use crate::sanity;

const LEGACY_BIN_DIR: &str = "/usr/local/bin";

const PLATLIB_SCRIPT: &str = "import sysconfig; print(sysconfig.get_path('platlib'))";

/// Locations derived from the interpreter and the session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectedDefaults {
    pub module_dir: Option<PathBuf>,
    pub bin_dir: PathBuf,
    pub api_dir: Option<PathBuf>,
    /// Directory older installers put launchers in, cleaned up as well
    pub legacy_bin_dir: Option<PathBuf>,
}

/// Interpreter used when `--python` is not given
pub fn default_interpreter() -> PathBuf {
    ["python3", "python"]
        .iter()
        .find_map(|name| sanity::find_executable(name))
        .unwrap_or_else(|| PathBuf::from("python3"))
}

/// Detect default locations for `interpreter`
pub fn detect_defaults(interpreter: &Path) -> DetectedDefaults {
    let module_dir = query_platlib(interpreter);
    let api_dir = module_dir.as_deref().and_then(detect_api_dir);
    let bin_dir = default_bin_dir(interpreter);

    let legacy = Path::new(LEGACY_BIN_DIR);
    let legacy_bin_dir = (!cfg!(windows) && bin_dir != legacy && sanity::is_writable(legacy))
        .then(|| legacy.to_path_buf());

    tracing::debug!(
        "Defaults: module dir {:?}, bin dir {}, api dir {:?}",
        module_dir,
        bin_dir.display(),
        api_dir
    );
    DetectedDefaults {
        module_dir,
        bin_dir,
        api_dir,
        legacy_bin_dir,
    }
}

fn query_platlib(interpreter: &Path) -> Option<PathBuf> {
    match run_captured(interpreter, ["-c", PLATLIB_SCRIPT]) {
        Ok(out) if out.success && !out.stdout.trim().is_empty() => {
            Some(PathBuf::from(out.stdout.trim()))
        }
        Ok(out) => {
            tracing::warn!("Could not query module directory: {}", out.stderr.trim());
            None
        }
        Err(e) => {
            tracing::warn!("Could not query module directory: {:#}", e);
            None
        }
    }
}

/// API directory of the editor component bundled with the Qt bindings
fn detect_api_dir(module_dir: &Path) -> Option<PathBuf> {
    let bindings = module_dir.join("PyQt6");
    [bindings.join("Qt6/qsci"), bindings.join("qsci")]
        .into_iter()
        .find(|dir| dir.is_dir())
        .map(|dir| dir.join("api"))
}

fn default_bin_dir(interpreter: &Path) -> PathBuf {
    let interpreter_dir = interpreter
        .parent()
        .map(layout::normalize)
        .unwrap_or_default();

    if cfg!(windows) {
        let scripts = interpreter_dir.join("Scripts");
        return if scripts.is_dir() {
            scripts
        } else {
            interpreter_dir
        };
    }

    if sanity::is_writable(&interpreter_dir) {
        interpreter_dir
    } else {
        dirs::home_dir()
            .map(|home| home.join("bin"))
            .unwrap_or(interpreter_dir)
    }
}

/// Where the natural layout comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutSource {
    /// Derived from base directories
    Dirs(ResolverInput),
    /// Taken verbatim from a path configuration file
    File(PathConfig),
}

impl LayoutSource {
    pub fn resolve(&self) -> Result<PathLayout> {
        Ok(match self {
            Self::Dirs(input) => layout::resolve(input)?,
            Self::File(config) => config.to_layout()?,
        })
    }
}

/// Immutable settings of one run
#[derive(Debug, Clone)]
pub struct InstallSettings {
    pub interpreter: PathBuf,
    pub source: SourceTree,
    pub platform: Platform,
    pub elevated: bool,
    pub layout: LayoutSource,
    pub install_prefix: Option<PathBuf>,
    pub legacy_bin_dir: Option<PathBuf>,
    pub mac_bundle: MacBundle,
    pub uninstall: bool,
    pub no_apis: bool,
    pub no_cleanup: bool,
    pub no_deps: bool,
    pub no_compile: bool,
    pub no_info: bool,
    pub assume_yes: bool,
    pub with_tools: bool,
    pub clean_desktop: bool,
    pub clean_source: bool,
}

impl InstallSettings {
    /// Combine command line arguments with detected defaults.
    ///
    /// A path configuration file is loaded and validated here, so a bad
    /// file fails the run before anything else happens.
    pub fn from_cli(cli: &Cli, interpreter: PathBuf, defaults: DetectedDefaults) -> Result<Self> {
        let layout = match &cli.config_file {
            Some(path) => LayoutSource::File(PathConfig::load_from_file(path)?),
            None => {
                let module_dir = cli.module_dir.clone().or(defaults.module_dir).ok_or_else(|| {
                    InstallerError::general(
                        "Cannot determine the module directory; pass it with --module-dir",
                    )
                })?;
                LayoutSource::Dirs(ResolverInput {
                    module_dir: absolute(module_dir),
                    bin_dir: absolute(cli.bin_dir.clone().unwrap_or(defaults.bin_dir)),
                    api_dir: cli.api_dir.clone().or(defaults.api_dir).map(absolute),
                })
            }
        };

        let source = SourceTree::new(absolute(
            cli.source.clone().unwrap_or_else(|| PathBuf::from(".")),
        ));

        let mut mac_bundle = MacBundle::default();
        if let Some(dir) = &cli.bundle_path {
            mac_bundle.dir = dir.clone();
        }
        if let Some(name) = &cli.bundle_name {
            mac_bundle.name = name.clone();
        }

        Ok(Self {
            interpreter,
            source,
            platform: Platform::current(),
            elevated: sanity::is_elevated(),
            layout,
            install_prefix: cli.install_prefix.clone().map(absolute),
            legacy_bin_dir: defaults.legacy_bin_dir,
            mac_bundle,
            uninstall: cli.uninstall,
            no_apis: cli.no_apis,
            no_cleanup: cli.no_cleanup,
            no_deps: cli.no_deps,
            no_compile: cli.no_compile,
            no_info: cli.no_info,
            assume_yes: cli.yes,
            with_tools: cli.with_tools,
            clean_desktop: cli.clean_desktop,
            clean_source: cli.clean_source,
        })
    }
}

/// Anchor a relative command line path at the working directory
fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return layout::normalize(&path);
    }
    match std::env::current_dir() {
        Ok(cwd) => layout::normalize(&cwd.join(path)),
        Err(_) => path,
    }
}
