//! Byte-compilation of the installed sources

use std::path::{Path, PathBuf};

use crate::command_runner::run_captured;

/// Compiles a deployed source tree in place
pub trait SourceCompiler {
    /// Compile everything below `target`, recording `natural` as the source
    /// location inside the compiled files. Returns true on success.
    fn compile(&self, target: &Path, natural: &Path) -> bool;
}

/// Debugger client sources that must stay in their original form
const EXCLUDE_PATTERN: &str = r"DebugClients[\\/]Python[\\/]";

/// `python -m compileall`
#[derive(Debug, Clone)]
pub struct PythonCompiler {
    interpreter: PathBuf,
}

impl PythonCompiler {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    fn args(target: &Path, natural: &Path) -> Vec<String> {
        vec![
            "-m".into(),
            "compileall".into(),
            "-q".into(),
            "-x".into(),
            EXCLUDE_PATTERN.into(),
            "-d".into(),
            natural.display().to_string(),
            target.display().to_string(),
        ]
    }
}

impl SourceCompiler for PythonCompiler {
    fn compile(&self, target: &Path, natural: &Path) -> bool {
        tracing::info!("Compiling sources in {}", target.display());
        match run_captured(&self.interpreter, Self::args(target, natural)) {
            Ok(out) if out.success => true,
            Ok(out) => {
                tracing::warn!("Compilation reported errors: {}", out.stderr.trim());
                false
            }
            Err(e) => {
                tracing::warn!("Could not run the compiler: {:#}", e);
                false
            }
        }
    }
}
