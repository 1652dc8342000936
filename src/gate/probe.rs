//! Capability probes
//!
//! A probe answers one question per capability: is it there, and in which
//! version. Each detection strategy is its own probe; [`SystemProbe`]
//! dispatches on the strategy a spec declares.

use std::path::{Path, PathBuf};

use super::{DependencySpec, Detection};
use crate::command_runner::run_captured;
use crate::version::Version;

/// Result of probing one capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    NotFound,
    Found(Version),
    /// Present, or not checkable, but the version cannot be determined
    Unknown,
}

impl ProbeOutcome {
    /// Outcome for a reported version string
    pub fn from_reported(reported: &str) -> Self {
        Version::parse_reported(reported)
            .map(Self::Found)
            .unwrap_or(Self::Unknown)
    }
}

/// Detects capabilities on the host
pub trait CapabilityProbe {
    fn probe(&self, spec: &DependencySpec) -> ProbeOutcome;

    /// Version of the interpreter the application will run on
    fn host_runtime(&self) -> ProbeOutcome {
        ProbeOutcome::Unknown
    }
}

// Reads a module attribute without executing anything beyond the import
const INTROSPECT_SCRIPT: &str = "\
import importlib, sys
module = importlib.import_module(sys.argv[1])
attr = sys.argv[2] if len(sys.argv) > 2 else ''
print(getattr(module, attr, '') if attr else '')
";

const HOST_VERSION_SCRIPT: &str = "import sys; print('%d.%d.%d' % sys.version_info[:3])";

/// Imports a module in the host interpreter and reads its version attribute
#[derive(Debug, Clone)]
pub struct IntrospectionProbe {
    interpreter: PathBuf,
}

impl IntrospectionProbe {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    fn introspect(&self, module: &str, version_attr: Option<&str>) -> ProbeOutcome {
        let mut args = vec!["-c", INTROSPECT_SCRIPT, module];
        args.extend(version_attr);
        match run_captured(&self.interpreter, &args) {
            Err(e) => {
                tracing::debug!("Interpreter unavailable for probing {}: {:#}", module, e);
                ProbeOutcome::Unknown
            }
            Ok(out) if !out.success => ProbeOutcome::NotFound,
            Ok(out) => ProbeOutcome::from_reported(&out.stdout),
        }
    }
}

impl CapabilityProbe for IntrospectionProbe {
    fn probe(&self, spec: &DependencySpec) -> ProbeOutcome {
        match &spec.detection {
            Detection::Module {
                module,
                version_attr,
            } => self.introspect(module, version_attr.as_deref()),
            _ => ProbeOutcome::Unknown,
        }
    }

    fn host_runtime(&self) -> ProbeOutcome {
        match run_captured(&self.interpreter, ["-c", HOST_VERSION_SCRIPT]) {
            Ok(out) if out.success => ProbeOutcome::from_reported(&out.stdout),
            Ok(_) => ProbeOutcome::Unknown,
            Err(e) => {
                tracing::debug!("Could not query interpreter version: {:#}", e);
                ProbeOutcome::Unknown
            }
        }
    }
}

/// Runs an executable and parses the first version-looking token it prints
#[derive(Debug, Clone, Default)]
pub struct ExecutableProbe;

impl ExecutableProbe {
    fn query(program: &str, args: &[String]) -> ProbeOutcome {
        let Some(path) = crate::sanity::find_executable(program) else {
            return ProbeOutcome::NotFound;
        };
        match run_captured(&path, args) {
            Ok(out) if out.success => {
                let text = if out.stdout.trim().is_empty() {
                    out.stderr
                } else {
                    out.stdout
                };
                version_token(&text)
                    .map(ProbeOutcome::from_reported)
                    .unwrap_or(ProbeOutcome::Unknown)
            }
            Ok(_) => ProbeOutcome::Unknown,
            Err(e) => {
                tracing::debug!("Could not run {}: {:#}", program, e);
                ProbeOutcome::Unknown
            }
        }
    }
}

impl CapabilityProbe for ExecutableProbe {
    fn probe(&self, spec: &DependencySpec) -> ProbeOutcome {
        match &spec.detection {
            Detection::Executable { program, args } => Self::query(program, args),
            _ => ProbeOutcome::Unknown,
        }
    }
}

/// First whitespace-separated token that starts with a digit
fn version_token(text: &str) -> Option<&str> {
    text.split_whitespace()
        .find(|token| token.starts_with(|c: char| c.is_ascii_digit()))
}

/// Asks the package registry (`pip show`) for the installed version
#[derive(Debug, Clone)]
pub struct RegistryProbe {
    interpreter: PathBuf,
}

impl RegistryProbe {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    fn show(&self, project: &str) -> ProbeOutcome {
        match run_captured(&self.interpreter, ["-m", "pip", "show", project]) {
            Err(e) => {
                tracing::debug!("Package registry unavailable: {:#}", e);
                ProbeOutcome::Unknown
            }
            Ok(out) if !out.success => ProbeOutcome::NotFound,
            Ok(out) => parse_pip_show(&out.stdout),
        }
    }
}

/// Extract the `Version:` field of `pip show` output
pub fn parse_pip_show(output: &str) -> ProbeOutcome {
    output
        .lines()
        .find_map(|line| line.strip_prefix("Version:"))
        .map(|v| ProbeOutcome::from_reported(v.trim()))
        .unwrap_or(ProbeOutcome::Unknown)
}

impl CapabilityProbe for RegistryProbe {
    fn probe(&self, spec: &DependencySpec) -> ProbeOutcome {
        match &spec.detection {
            Detection::Registry { project } => self.show(project),
            _ => ProbeOutcome::Unknown,
        }
    }
}

/// Dispatches each spec to the probe of its detection strategy
#[derive(Debug, Clone)]
pub struct SystemProbe {
    introspection: IntrospectionProbe,
    executable: ExecutableProbe,
    registry: RegistryProbe,
}

impl SystemProbe {
    pub fn new(interpreter: &Path) -> Self {
        Self {
            introspection: IntrospectionProbe::new(interpreter),
            executable: ExecutableProbe,
            registry: RegistryProbe::new(interpreter),
        }
    }
}

impl CapabilityProbe for SystemProbe {
    fn probe(&self, spec: &DependencySpec) -> ProbeOutcome {
        let outcome = match spec.detection {
            Detection::Module { .. } => self.introspection.probe(spec),
            Detection::Executable { .. } => self.executable.probe(spec),
            Detection::Registry { .. } => self.registry.probe(spec),
        };
        tracing::debug!("Probed {}: {:?}", spec.name, outcome);
        outcome
    }

    fn host_runtime(&self) -> ProbeOutcome {
        self.introspection.host_runtime()
    }
}
