//! Error handling module for the app7 installer
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Every fatal condition surfaces as an [`InstallerError`], and every
//! `InstallerError` maps onto exactly one process [`ExitCode`].

use std::path::PathBuf;
use thiserror::Error;

use crate::config_file::ConfigFormatError;
use crate::config_store::ConfigStoreError;
use crate::deploy::DeployError;
use crate::gate::GateFailure;
use crate::install_state::InstallTransitionError;
use crate::layout::ResolveError;
use crate::platform::IntegrationError;

/// Process exit codes, one per failure category.
///
/// Code 2 matches what clap uses for command line usage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    DependencyMissing = 1,
    Usage = 2,
    BelowMinimum = 3,
    Blacklisted = 4,
    IncompatibleHost = 5,
    ConfigFormat = 6,
    Filesystem = 7,
    HostCapabilityMissing = 8,
    Internal = 9,
}

impl ExitCode {
    /// Numeric value handed to `std::process::exit`
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Main error type for the installer
#[derive(Error, Debug)]
pub enum InstallerError {
    /// One or more required capabilities failed the dependency gate
    #[error("Dependency check failed: {}", describe_failures(.0))]
    Gate(Vec<GateFailure>),

    /// External path configuration file is malformed
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigFormatError),

    /// Path layout could not be resolved
    #[error("Path resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Installed configuration artifact could not be written or read
    #[error("Configuration store error: {0}")]
    Store(#[from] ConfigStoreError),

    /// Resource tree deployment failed
    #[error("Deployment error: {0}")]
    Deploy(#[from] DeployError),

    /// A launcher could not be written
    #[error("Launcher error: {0}")]
    Integration(#[from] IntegrationError),

    /// Filesystem mutation failed (cleanup, directory creation)
    #[error("Filesystem error while {action} {}: {source}", path.display())]
    Filesystem {
        action: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Lifecycle state machine transition errors
    #[error("Install transition error: {0}")]
    InstallTransition(#[from] InstallTransitionError),

    /// IO errors not tied to a particular path
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// General errors (catch-all for edge cases)
    #[error("{0}")]
    General(String),
}

/// Result type alias for installer operations
pub type Result<T> = std::result::Result<T, InstallerError>;

fn describe_failures(failures: &[GateFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl InstallerError {
    /// Create a filesystem error for `action` on `path`
    pub fn filesystem(
        action: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Filesystem {
            action: action.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a general error
    pub fn general(msg: impl Into<String>) -> Self {
        Self::General(msg.into())
    }

    /// Exit code reported to the invoking shell
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Gate(failures) => failures
                .first()
                .map(GateFailure::exit_code)
                .unwrap_or(ExitCode::DependencyMissing),
            Self::Config(_) => ExitCode::ConfigFormat,
            Self::Resolve(_) => ExitCode::ConfigFormat,
            Self::Store(_)
            | Self::Deploy(_)
            | Self::Integration(_)
            | Self::Filesystem { .. }
            | Self::Io(_) => ExitCode::Filesystem,
            Self::InstallTransition(_) | Self::General(_) => ExitCode::Internal,
        }
    }

    /// Remediation hint printed below the error message, if any
    pub fn hint(&self) -> Option<&'static str> {
        match self.exit_code() {
            ExitCode::Filesystem => Some("Try again with elevated privileges."),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{GapReason, Requirement};
    use crate::version::Version;

    #[test]
    fn test_error_display() {
        let err = InstallerError::general("something odd");
        assert_eq!(err.to_string(), "something odd");

        let err = InstallerError::filesystem(
            "removing",
            "/usr/lib/app/app7",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(
            err.to_string(),
            "Filesystem error while removing /usr/lib/app/app7: denied"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: InstallerError = io_err.into();
        assert!(matches!(err, InstallerError::Io(_)));
        assert_eq!(err.exit_code(), ExitCode::Filesystem);
        assert_eq!(err.hint(), Some("Try again with elevated privileges."));
    }

    #[test]
    fn test_gate_exit_code_follows_first_failure() {
        let failures = vec![
            GateFailure::new(
                "X",
                Requirement::Required,
                GapReason::Blacklisted(Version::new(1, 3, 0)),
            ),
            GateFailure::new("Y", Requirement::Required, GapReason::Absent),
        ];
        let err = InstallerError::Gate(failures);
        assert_eq!(err.exit_code(), ExitCode::Blacklisted);
        assert_eq!(
            err.to_string(),
            "Dependency check failed: X: blacklisted: 1.3.0; Y: absent"
        );
    }

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::DependencyMissing.code(), 1);
        assert_eq!(ExitCode::ConfigFormat.code(), 6);
        assert_eq!(ExitCode::Filesystem.code(), 7);
        assert_eq!(ExitCode::HostCapabilityMissing.code(), 8);
    }
}
