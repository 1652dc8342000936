//! Remediation through the interpreter's package installer

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::command_runner::{run_captured, run_interactive};

/// Installs packages by name
pub trait PackageInstaller {
    /// Install `target`, explaining why with `message`. Without `force` the
    /// user is asked first. Returns true if the install succeeded.
    fn install(&self, target: &str, message: &str, force: bool) -> bool;

    /// Command a user can run to install `target` by hand
    fn remediation_hint(&self, target: &str) -> String;
}

/// Ask a yes/no question on stdin; an empty answer means yes
pub fn confirm(question: &str) -> bool {
    print!("{} (Y/n) ", question);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(0) | Err(_) => false,
        Ok(_) => is_affirmative(&answer),
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim(), "" | "y" | "Y" | "yes" | "Yes")
}

/// `pip` driven through the target interpreter
#[derive(Debug, Clone)]
pub struct PipInstaller {
    interpreter: PathBuf,
    assume_yes: bool,
}

impl PipInstaller {
    pub fn new(interpreter: impl Into<PathBuf>, assume_yes: bool) -> Self {
        Self {
            interpreter: interpreter.into(),
            assume_yes,
        }
    }

    fn pip_args<'a>(&self, extra: &[&'a str]) -> Vec<&'a str> {
        let mut args = vec!["-m", "pip"];
        args.extend_from_slice(extra);
        args
    }

    /// True if the registry reports a newer pip than the installed one
    pub fn is_outdated(&self) -> bool {
        let args = self.pip_args(&["list", "--outdated", "--format=json"]);
        match run_captured(&self.interpreter, &args) {
            Ok(out) if out.success => lists_pip(&out.stdout),
            Ok(_) => false,
            Err(e) => {
                tracing::debug!("Could not check for pip updates: {:#}", e);
                false
            }
        }
    }

    /// Offer to upgrade pip itself; failures are reported and ignored
    pub fn upgrade_self(&self) {
        if !self.assume_yes && !confirm("A newer pip is available. Upgrade it now?") {
            return;
        }
        let args = self.pip_args(&["install", "--prefer-binary", "--upgrade", "pip"]);
        match run_interactive(&self.interpreter, &args) {
            Ok(status) if status.success() => tracing::info!("pip upgraded"),
            Ok(status) => tracing::warn!("pip upgrade failed ({})", status),
            Err(e) => tracing::warn!("pip upgrade failed: {:#}", e),
        }
    }
}

/// `pip list --outdated --format=json` output mentions pip itself
fn lists_pip(json: &str) -> bool {
    serde_json::from_str::<Vec<serde_json::Value>>(json)
        .map(|entries| {
            entries
                .iter()
                .any(|e| e.get("name").and_then(|n| n.as_str()) == Some("pip"))
        })
        .unwrap_or(false)
}

impl PackageInstaller for PipInstaller {
    fn install(&self, target: &str, message: &str, force: bool) -> bool {
        println!("{}", message);
        let proceed = force || self.assume_yes || confirm(&format!("Install '{}' now?", target));
        if !proceed {
            return false;
        }

        let args = self.pip_args(&["install", "--prefer-binary", "--upgrade", target]);
        match run_interactive(&self.interpreter, &args) {
            Ok(status) if status.success() => {
                tracing::info!("Installed {}", target);
                true
            }
            Ok(status) => {
                tracing::warn!("Installing {} failed ({})", target, status);
                false
            }
            Err(e) => {
                tracing::warn!("Installing {} failed: {:#}", target, e);
                false
            }
        }
    }

    fn remediation_hint(&self, target: &str) -> String {
        format!(
            "{} -m pip install --prefer-binary --upgrade '{}'",
            self.interpreter.display(),
            target
        )
    }
}
