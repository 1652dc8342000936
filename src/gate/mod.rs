//! Dependency gate
//!
//! Verifies that every external capability the application needs is present
//! in an acceptable version before anything is written to disk. Shortfalls
//! of remediable capabilities are handed to a [`PackageInstaller`] and the
//! capability is probed once more; anything still missing is reported.
//!
//! # Design Principles
//!
//! - **Ordered**: capabilities are checked in declaration order
//! - **Side-effect free**: only remediation installs touch the system
//! - **Exact blacklists**: a listed version fails, its neighbours pass
//! - **Optional never fatal**: optional shortfalls are collected as gaps

pub mod catalog;
pub mod probe;
pub mod remediation;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use strum::{Display, EnumString};

use crate::error::ExitCode;
use crate::platform::Platform;
use crate::version::Version;

pub use probe::{CapabilityProbe, ProbeOutcome};
pub use remediation::PackageInstaller;

/// How strictly a capability is needed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Requirement {
    /// Host-level capability of the interpreter itself; never remediated
    Host,
    /// Part of the base toolkit; cannot be installed on its own
    Base,
    /// Needed; remediated when allowed
    Required,
    /// Nice to have; remediated on request, never fatal
    Optional,
}

impl Requirement {
    pub const fn is_required(self) -> bool {
        !matches!(self, Self::Optional)
    }

    pub const fn is_remediable(self) -> bool {
        matches!(self, Self::Required | Self::Optional)
    }
}

/// How a capability is detected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// Import a module in the host interpreter and read a version attribute
    Module {
        module: String,
        version_attr: Option<String>,
    },
    /// Run an executable and parse the version it reports
    Executable { program: String, args: Vec<String> },
    /// Ask the package registry for the installed version
    Registry { project: String },
}

/// One capability the application depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub name: String,
    /// Package to install for remediation
    pub package: String,
    pub min_version: Option<Version>,
    /// Versions rejected on every platform
    pub blacklist: BTreeSet<Version>,
    /// Versions rejected on one platform only
    pub platform_blacklist: BTreeMap<Platform, BTreeSet<Version>>,
    pub requirement: Requirement,
    pub detection: Detection,
}

impl DependencySpec {
    pub fn new(
        name: impl Into<String>,
        requirement: Requirement,
        detection: Detection,
    ) -> Self {
        let name = name.into();
        Self {
            package: name.clone(),
            name,
            min_version: None,
            blacklist: BTreeSet::new(),
            platform_blacklist: BTreeMap::new(),
            requirement,
            detection,
        }
    }

    /// A module imported from the host interpreter
    pub fn module(
        name: impl Into<String>,
        requirement: Requirement,
        module: &str,
        version_attr: Option<&str>,
    ) -> Self {
        Self::new(
            name,
            requirement,
            Detection::Module {
                module: module.to_string(),
                version_attr: version_attr.map(str::to_string),
            },
        )
    }

    /// A project known to the package registry
    pub fn registry(name: impl Into<String>, requirement: Requirement) -> Self {
        let name = name.into();
        let detection = Detection::Registry {
            project: name.clone(),
        };
        Self::new(name, requirement, detection)
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn with_min_version(mut self, version: Version) -> Self {
        self.min_version = Some(version);
        self
    }

    pub fn with_blacklisted(mut self, versions: impl IntoIterator<Item = Version>) -> Self {
        self.blacklist.extend(versions);
        self
    }

    pub fn with_platform_blacklisted(
        mut self,
        platform: Platform,
        versions: impl IntoIterator<Item = Version>,
    ) -> Self {
        self.platform_blacklist
            .entry(platform)
            .or_default()
            .extend(versions);
        self
    }

    /// Exact match against the global list and the list of `platform`
    pub fn is_blacklisted(&self, version: Version, platform: Platform) -> bool {
        self.blacklist.contains(&version)
            || self
                .platform_blacklist
                .get(&platform)
                .is_some_and(|list| list.contains(&version))
    }

    /// Argument handed to the package installer
    pub fn install_target(&self) -> String {
        match self.min_version {
            Some(min) => format!("{}>={}", self.package, min),
            None => self.package.clone(),
        }
    }
}

/// Why a capability is not acceptable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GapReason {
    Absent,
    BelowMinimum { found: Version, minimum: Version },
    Blacklisted(Version),
    HostIncompatible {
        found: Version,
        minimum: Version,
        maximum: Version,
    },
}

impl fmt::Display for GapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::BelowMinimum { found, minimum } => {
                write!(f, "below minimum: {} < {}", found, minimum)
            }
            Self::Blacklisted(version) => write!(f, "blacklisted: {}", version),
            Self::HostIncompatible {
                found,
                minimum,
                maximum,
            } => write!(
                f,
                "host runtime {} outside [{}, {})",
                found, minimum, maximum
            ),
        }
    }
}

/// A capability that failed the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateFailure {
    pub name: String,
    pub requirement: Requirement,
    pub reason: GapReason,
    /// Command the user can run to fix the shortfall
    pub remediation: Option<String>,
}

impl GateFailure {
    pub fn new(name: impl Into<String>, requirement: Requirement, reason: GapReason) -> Self {
        Self {
            name: name.into(),
            requirement,
            reason,
            remediation: None,
        }
    }

    /// Exit code of the failure category
    pub fn exit_code(&self) -> ExitCode {
        match (&self.reason, self.requirement) {
            (GapReason::HostIncompatible { .. }, _) => ExitCode::IncompatibleHost,
            (GapReason::Absent, Requirement::Host) => ExitCode::HostCapabilityMissing,
            (GapReason::Blacklisted(_), _) => ExitCode::Blacklisted,
            (GapReason::BelowMinimum { .. }, _) => ExitCode::BelowMinimum,
            (GapReason::Absent, _) => ExitCode::DependencyMissing,
        }
    }
}

impl fmt::Display for GateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.reason)
    }
}

/// Supported interpreter versions: `minimum <= v < maximum`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostRange {
    pub minimum: Version,
    pub maximum: Version,
}

impl HostRange {
    pub fn contains(&self, version: Version) -> bool {
        self.minimum <= version && version < self.maximum
    }
}

/// Gate behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOptions {
    /// Never install anything (elevated runs)
    pub no_modify: bool,
    pub platform: Platform,
    pub host: Option<HostRange>,
}

/// Outcome of a gate run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateReport {
    pub fatal_failures: Vec<GateFailure>,
    pub non_fatal_gaps: Vec<GateFailure>,
    /// Capabilities found in an acceptable version
    pub satisfied: Vec<(String, Version)>,
    /// Capabilities whose version could not be determined
    pub undetermined: Vec<String>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.fatal_failures.is_empty()
    }

    /// `(name, reason)` pairs of the fatal failures
    pub fn fatal_summary(&self) -> Vec<(String, String)> {
        self.fatal_failures
            .iter()
            .map(|f| (f.name.clone(), f.reason.to_string()))
            .collect()
    }
}

/// Result of judging one probe outcome
enum Assessment {
    Satisfied(Version),
    Undetermined,
    Shortfall(GapReason),
    Rejected(GapReason),
}

/// Checks dependency specs against a probe, remediating through an installer
pub struct DependencyGate<'a> {
    probe: &'a dyn CapabilityProbe,
    installer: &'a dyn PackageInstaller,
    options: GateOptions,
}

impl<'a> DependencyGate<'a> {
    pub fn new(
        probe: &'a dyn CapabilityProbe,
        installer: &'a dyn PackageInstaller,
        options: GateOptions,
    ) -> Self {
        Self {
            probe,
            installer,
            options,
        }
    }

    fn assess(&self, spec: &DependencySpec, outcome: ProbeOutcome) -> Assessment {
        match outcome {
            ProbeOutcome::Unknown => Assessment::Undetermined,
            ProbeOutcome::NotFound => Assessment::Shortfall(GapReason::Absent),
            ProbeOutcome::Found(found) => match spec.min_version {
                Some(minimum) if found < minimum => {
                    Assessment::Shortfall(GapReason::BelowMinimum { found, minimum })
                }
                _ if spec.is_blacklisted(found, self.options.platform) => {
                    Assessment::Rejected(GapReason::Blacklisted(found))
                }
                _ => Assessment::Satisfied(found),
            },
        }
    }

    /// Try to fix a shortfall; returns the re-assessment if an install ran
    fn remediate(&self, spec: &DependencySpec, reason: &GapReason) -> Option<Assessment> {
        if !spec.requirement.is_remediable() || self.options.no_modify {
            return None;
        }
        let message = match reason {
            GapReason::Absent => format!("{} is not installed.", spec.name),
            other => format!("{} is {}.", spec.name, other),
        };
        let force = spec.requirement == Requirement::Required;
        if !self.installer.install(&spec.install_target(), &message, force) {
            return None;
        }
        let outcome = self.probe.probe(spec);
        tracing::debug!("Re-probed {} after install: {:?}", spec.name, outcome);
        Some(self.assess(spec, outcome))
    }

    fn check_host(&self, report: &mut GateReport) {
        let Some(range) = self.options.host else {
            return;
        };
        match self.probe.host_runtime() {
            ProbeOutcome::Found(found) if !range.contains(found) => {
                report.fatal_failures.push(GateFailure::new(
                    "host runtime",
                    Requirement::Host,
                    GapReason::HostIncompatible {
                        found,
                        minimum: range.minimum,
                        maximum: range.maximum,
                    },
                ));
            }
            ProbeOutcome::Found(found) => report.satisfied.push(("host runtime".into(), found)),
            _ => report.undetermined.push("host runtime".into()),
        }
    }

    /// Check every spec in order
    pub fn check(&self, specs: &[DependencySpec]) -> GateReport {
        let mut report = GateReport::default();

        self.check_host(&mut report);
        if !report.passed() {
            return report;
        }

        for spec in specs {
            let mut assessment = self.assess(spec, self.probe.probe(spec));
            let mut remediation = None;

            if let Assessment::Shortfall(reason) = &assessment {
                match self.remediate(spec, reason) {
                    Some(after) => assessment = after,
                    None if spec.requirement.is_remediable() => {
                        remediation = Some(self.installer.remediation_hint(&spec.install_target()));
                    }
                    None => {}
                }
            }

            let reason = match assessment {
                Assessment::Satisfied(version) => {
                    tracing::debug!("{} {} found", spec.name, version);
                    report.satisfied.push((spec.name.clone(), version));
                    continue;
                }
                Assessment::Undetermined => {
                    tracing::debug!("{}: version undetermined, assuming usable", spec.name);
                    report.undetermined.push(spec.name.clone());
                    continue;
                }
                Assessment::Shortfall(reason) | Assessment::Rejected(reason) => reason,
            };

            let failure = GateFailure {
                name: spec.name.clone(),
                requirement: spec.requirement,
                reason,
                remediation,
            };
            if spec.requirement.is_required() {
                tracing::error!("{}", failure);
                report.fatal_failures.push(failure);
            } else {
                tracing::warn!("Optional {}", failure);
                report.non_fatal_gaps.push(failure);
            }
        }

        report
    }
}
