//! app7 installer - main entry point
//!
//! Installs app7 for a Python interpreter, or removes it with `--uninstall`.

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use app7_installer::cli::Cli;
use app7_installer::compiler::PythonCompiler;
use app7_installer::config::{self, InstallSettings};
use app7_installer::error::InstallerError;
use app7_installer::gate::probe::SystemProbe;
use app7_installer::gate::remediation::PipInstaller;
use app7_installer::installer::{InstallSummary, Installer};
use app7_installer::layout::Role;
use app7_installer::platform::{self, IntegrationSettings};
use app7_installer::{process_guard, sanity};

/// Initialize logging; `RUST_LOG` overrides the level chosen by `--verbose`
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn report_error(error: &InstallerError) {
    eprintln!("Error: {}", error);
    if let InstallerError::Gate(failures) = error {
        for failure in failures {
            if let Some(command) = &failure.remediation {
                eprintln!("  To fix {}, run: {}", failure.name, command);
            }
        }
    }
    if let Some(hint) = error.hint() {
        eprintln!("{}", hint);
    }
}

fn print_summary(summary: &InstallSummary, uninstall: bool) {
    let Some(placement) = &summary.placement else {
        return;
    };
    if uninstall {
        if summary.removed_previous {
            println!("app7 was removed.");
        } else {
            println!("No app7 installation found.");
        }
        return;
    }

    println!();
    println!(
        "app7 was installed to {}",
        placement.natural.get(Role::AppDir).display()
    );
    println!(
        "  {} files deployed, {} launchers in {}",
        summary.deployed.files_copied,
        summary.launchers.len(),
        placement.natural.get(Role::BinDir).display()
    );
    if let Some(prefix) = &placement.prefix {
        println!("  staged below {}", prefix.display());
    }
    if !summary.warnings.is_empty() {
        println!("  {} warnings, see the log above", summary.warnings.len());
    }
}

fn resolve_interpreter(cli: &Cli) -> PathBuf {
    match &cli.interpreter {
        Some(path) => {
            sanity::find_executable(&path.to_string_lossy()).unwrap_or_else(|| path.clone())
        }
        None => config::default_interpreter(),
    }
}

fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    // Children (pip, compileall, shells) must not outlive an interrupted run
    if let Err(e) = process_guard::init_signal_handlers() {
        tracing::warn!("Failed to initialize signal handlers: {}", e);
    }

    let interpreter = resolve_interpreter(&cli);
    let defaults = config::detect_defaults(&interpreter);
    let settings = match InstallSettings::from_cli(&cli, interpreter, defaults) {
        Ok(settings) => settings,
        Err(e) => {
            report_error(&e);
            std::process::exit(e.exit_code().code());
        }
    };

    if !settings.uninstall {
        sanity::run_preflight_checks(&settings.interpreter, &settings.source);
    }

    let probe = SystemProbe::new(&settings.interpreter);
    let packages = PipInstaller::new(&settings.interpreter, settings.assume_yes);
    if !settings.uninstall && !settings.no_deps && !settings.elevated && packages.is_outdated() {
        packages.upgrade_self();
    }

    let mut integration = IntegrationSettings::detect(
        settings.interpreter.clone(),
        settings.source.clone(),
        settings.elevated,
    );
    integration.mac_bundle = settings.mac_bundle.clone();
    integration.clean_desktop = settings.clean_desktop;
    let integrator = platform::integrator_for(settings.platform, integration);
    let compiler = PythonCompiler::new(&settings.interpreter);

    let installer = Installer::new(&settings, &probe, &packages, integrator.as_ref())
        .with_compiler(&compiler);
    let result = if settings.uninstall {
        installer.uninstall()
    } else {
        installer.install()
    };

    match result {
        Ok(summary) => print_summary(&summary, settings.uninstall),
        Err(e) => {
            report_error(&e.error);
            std::process::exit(e.exit_code().code());
        }
    }
}
