use clap::Parser;
use std::path::PathBuf;

use crate::error::ExitCode;

/// app7 installer - installs, upgrades and removes app7
#[derive(Parser, Debug, Default)]
#[command(name = "app7-install")]
#[command(about = "Install or uninstall the app7 application")]
#[command(version)]
pub struct Cli {
    /// Directory for the API files
    #[arg(short = 'a', long, value_name = "DIR")]
    pub api_dir: Option<PathBuf>,

    /// Do not install the API files
    #[arg(long)]
    pub no_apis: bool,

    /// Directory for the launchers
    #[arg(short = 'b', long, value_name = "DIR")]
    pub bin_dir: Option<PathBuf>,

    /// Directory the application package is installed into
    #[arg(short = 'd', long, value_name = "DIR")]
    pub module_dir: Option<PathBuf>,

    /// JSON file naming the directory of every installation role.
    ///
    /// Takes precedence over -a, -b and -d.
    #[arg(short = 'f', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Stage the installation below DIR (for packaging)
    #[arg(short = 'i', long = "install-prefix", value_name = "DIR")]
    pub install_prefix: Option<PathBuf>,

    /// Name of the macOS application bundle
    #[arg(short = 'm', long, value_name = "NAME")]
    pub bundle_name: Option<String>,

    /// Directory of the macOS application bundle
    #[arg(short = 'n', long, value_name = "DIR")]
    pub bundle_path: Option<PathBuf>,

    /// Interpreter the application runs on (default: python3 on PATH)
    #[arg(short = 'p', long = "python", value_name = "PATH")]
    pub interpreter: Option<PathBuf>,

    /// Keep a previous installation in place
    #[arg(short = 'c', long)]
    pub no_cleanup: bool,

    /// Do not check or install dependencies
    #[arg(short = 'x', long)]
    pub no_deps: bool,

    /// Do not byte-compile the installed sources
    #[arg(short = 'z', long)]
    pub no_compile: bool,

    /// Answer yes to every installation prompt
    #[arg(long)]
    pub yes: bool,

    /// Do not write the install record
    #[arg(long)]
    pub no_info: bool,

    /// Also install the Qt designer tools
    #[arg(long)]
    pub with_tools: bool,

    /// Also remove desktop shortcuts (Windows)
    #[arg(long)]
    pub clean_desktop: bool,

    /// Remove stale build artifacts from the source tree before copying
    #[arg(long)]
    pub clean_source: bool,

    /// Root of the app7 source tree (default: current directory)
    #[arg(short = 's', long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Remove an existing installation instead of installing
    #[arg(long)]
    pub uninstall: bool,
}

impl Cli {
    /// Parse the process arguments; help, version and usage errors exit here
    pub fn parse_args() -> Self {
        match Self::try_parse() {
            Ok(cli) => cli,
            Err(e) => {
                let _ = e.print();
                std::process::exit(parse_exit_code(&e).code())
            }
        }
    }
}

/// Exit code for arguments clap did not turn into a [`Cli`]
pub fn parse_exit_code(error: &clap::Error) -> ExitCode {
    if error.use_stderr() {
        ExitCode::Usage
    } else {
        ExitCode::Success
    }
}
