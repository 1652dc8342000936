//! Subprocess execution
//!
//! Every external program the installer runs (interpreter probes, the package
//! installer, the byte compiler, the shortcut helper) goes through this
//! module so that children are spawned in their own process group and
//! registered with [`ChildRegistry`] for cleanup on interruption.

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::process::{Child, Command, ExitStatus, Stdio};

use crate::process_guard::{ChildRegistry, CommandProcessGroup};

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

fn register(child: &Child) -> u32 {
    let pid = child.id();
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.register(pid);
    }
    pid
}

fn unregister(pid: u32) {
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.unregister(pid);
    }
}

/// Run `program` with `args`, capturing stdout and stderr.
///
/// Returns `Err` only if the program could not be started; a non-zero exit
/// is reported through [`CommandOutput::success`].
pub fn run_captured<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program = program.as_ref();
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .in_new_process_group()
        .spawn()
        .with_context(|| format!("Failed to start {}", program.to_string_lossy()))?;

    let pid = register(&child);
    let output = child.wait_with_output();
    unregister(pid);

    let output =
        output.with_context(|| format!("Failed waiting for {}", program.to_string_lossy()))?;
    Ok(CommandOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `program` with inherited output so the user sees its progress
pub fn run_interactive<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<ExitStatus>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program = program.as_ref();
    // Outside the foreground group a read from the terminal would stop the child
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .in_new_process_group()
        .spawn()
        .with_context(|| format!("Failed to start {}", program.to_string_lossy()))?;

    let pid = register(&child);
    let status = child.wait();
    unregister(pid);

    status.with_context(|| format!("Failed waiting for {}", program.to_string_lossy()))
}
