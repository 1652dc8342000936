//! app7 installer library
//!
//! Installs, upgrades and removes the app7 application: checks its
//! dependencies, resolves where every part goes, deploys the resource
//! trees, records the installed layout and integrates with the desktop.

pub mod cli;
pub mod command_runner;
pub mod compiler;
pub mod config;
pub mod config_file;
pub mod config_store;
pub mod deploy;
pub mod error;
pub mod gate;
pub mod install_record;
pub mod install_state;
pub mod installer;
pub mod layout;
pub mod platform;
pub mod process_guard;
pub mod sanity;
pub mod version;

// Re-export main types for convenience
pub use config::{InstallSettings, LayoutSource};
pub use config_file::PathConfig;
pub use config_store::{ConfigExtras, InstalledConfig};
pub use error::{ExitCode, InstallerError};
pub use gate::{DependencyGate, DependencySpec, GateReport, Requirement};
pub use install_state::{InstallStage, InstallTransitionError, LifecycleContext, LifecycleMode};
pub use installer::{InstallSummary, Installer, LifecycleError};
pub use layout::{PathLayout, Placement, Role};
pub use platform::{Platform, PlatformIntegrator};
pub use process_guard::{ChildRegistry, CommandProcessGroup};
pub use version::Version;
