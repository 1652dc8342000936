//! Installation lifecycle
//!
//! Drives one install or uninstall run through the stages of
//! [`LifecycleContext`](crate::install_state::LifecycleContext):
//! dependency gate, path resolution, removal of a previous installation,
//! deployment, configuration artifact, desktop integration and the install
//! record. Every collaborator that touches the outside world (probe,
//! package installer, platform integrator, compiler) is passed in, so the
//! whole lifecycle runs against fakes in tests.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::compiler::SourceCompiler;
use crate::config::InstallSettings;
use crate::config_store::{self, ConfigExtras, ConfigStoreError};
use crate::deploy::manifest::{default_manifest, API_LANGUAGES};
use crate::deploy::{self, prune, DeployStats, FILE_MODE};
use crate::error::{ExitCode, InstallerError, Result};
use crate::gate::catalog;
use crate::gate::{
    CapabilityProbe, DependencyGate, DependencySpec, GateOptions, GateReport, HostRange,
    PackageInstaller,
};
use crate::install_record::InstallRecord;
use crate::install_state::{InstallStage, LifecycleContext, LifecycleMode};
use crate::layout::{PathLayout, Placement, Role, APP_NAME};
use crate::platform::{IntegrationReport, PlatformIntegrator, Templates, LAUNCHERS};
use crate::sanity;

/// Package created next to the application for system-wide plugins
const GLOBAL_PLUGINS_PACKAGE: &str = "app7plugins";

const LICENSE_FILE: &str = "LICENSE.GPL3";

/// A run that stopped at `stage`
#[derive(Error, Debug)]
#[error("{error}")]
pub struct LifecycleError {
    /// Last stage completed before the failure
    pub stage: InstallStage,
    #[source]
    pub error: InstallerError,
}

impl LifecycleError {
    pub fn exit_code(&self) -> ExitCode {
        self.error.exit_code()
    }
}

/// What a finished run did
#[derive(Debug, Clone, Default)]
pub struct InstallSummary {
    pub gate: Option<GateReport>,
    pub placement: Option<Placement>,
    /// A previous installation was found and removed
    pub removed_previous: bool,
    pub deployed: DeployStats,
    pub launchers: Vec<PathBuf>,
    pub integration: IntegrationReport,
    pub artifact: Option<PathBuf>,
    pub record: Option<PathBuf>,
    /// Problems that did not stop the run
    pub warnings: Vec<String>,
    pub history: Vec<(InstallStage, u64)>,
}

impl InstallSummary {
    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Lifecycle orchestrator
pub struct Installer<'a> {
    settings: &'a InstallSettings,
    probe: &'a dyn CapabilityProbe,
    packages: &'a dyn PackageInstaller,
    integrator: &'a dyn PlatformIntegrator,
    compiler: Option<&'a dyn SourceCompiler>,
    dependencies: Vec<DependencySpec>,
    host_range: Option<HostRange>,
}

impl<'a> Installer<'a> {
    /// Orchestrator checking the default app7 dependencies
    pub fn new(
        settings: &'a InstallSettings,
        probe: &'a dyn CapabilityProbe,
        packages: &'a dyn PackageInstaller,
        integrator: &'a dyn PlatformIntegrator,
    ) -> Self {
        Self {
            settings,
            probe,
            packages,
            integrator,
            compiler: None,
            dependencies: catalog::default_dependencies(settings.with_tools),
            host_range: Some(catalog::default_host_range()),
        }
    }

    pub fn with_compiler(mut self, compiler: &'a dyn SourceCompiler) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<DependencySpec>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_host_range(mut self, range: Option<HostRange>) -> Self {
        self.host_range = range;
        self
    }

    /// Run the installation lifecycle
    pub fn install(&self) -> std::result::Result<InstallSummary, LifecycleError> {
        let mut ctx = LifecycleContext::new(LifecycleMode::Install);
        let mut summary = InstallSummary::default();
        let result = self.run_install(&mut ctx, &mut summary);
        finish(ctx, summary, result)
    }

    /// Remove the installation recorded at the target module directory.
    ///
    /// Removing an installation that is not there succeeds.
    pub fn uninstall(&self) -> std::result::Result<InstallSummary, LifecycleError> {
        let mut ctx = LifecycleContext::new(LifecycleMode::Uninstall);
        let mut summary = InstallSummary::default();
        let result = self.run_uninstall(&mut ctx, &mut summary);
        finish(ctx, summary, result)
    }

    fn run_install(&self, ctx: &mut LifecycleContext, summary: &mut InstallSummary) -> Result<()> {
        if self.settings.no_deps {
            tracing::info!("Skipping dependency checks");
        } else {
            let report = self.check_dependencies();
            if !report.passed() {
                return Err(InstallerError::Gate(report.fatal_failures));
            }
            for gap in &report.non_fatal_gaps {
                summary.warn(format!("Optional dependency {}", gap));
            }
            summary.gate = Some(report);
        }
        ctx.transition_to(InstallStage::GateChecked)?;

        let placement = self.resolve()?;
        ctx.transition_to(InstallStage::Resolved)?;

        if !self.settings.no_cleanup {
            let removed = self.remove_previous(&placement, summary)?;
            summary.removed_previous = removed;
            ctx.transition_to(InstallStage::OldCleanedUp)?;
        }

        self.deploy(&placement, summary)?;
        ctx.transition_to(InstallStage::Deployed)?;

        summary.artifact = Some(self.write_config(&placement)?);
        ctx.transition_to(InstallStage::Configured)?;

        self.integrate(&placement, summary);
        ctx.transition_to(InstallStage::Integrated)?;

        if !self.settings.no_info {
            summary.record = self.write_record(&placement, summary);
        }
        ctx.transition_to(InstallStage::Recorded)?;

        summary.placement = Some(placement);
        ctx.transition_to(InstallStage::Done)?;
        Ok(())
    }

    fn run_uninstall(
        &self,
        ctx: &mut LifecycleContext,
        summary: &mut InstallSummary,
    ) -> Result<()> {
        let placement = self.resolve()?;
        ctx.transition_to(InstallStage::Resolved)?;

        let removed = self.remove_previous(&placement, summary)?;
        if !removed {
            tracing::info!(
                "No installation found at {}",
                placement.target.get(Role::ModuleDir).display()
            );
        }
        summary.removed_previous = removed;
        ctx.transition_to(InstallStage::OldCleanedUp)?;

        summary.placement = Some(placement);
        ctx.transition_to(InstallStage::Done)?;
        Ok(())
    }

    fn check_dependencies(&self) -> GateReport {
        tracing::info!("Checking dependencies");
        let options = GateOptions {
            no_modify: self.settings.elevated,
            platform: self.settings.platform,
            host: self.host_range,
        };
        DependencyGate::new(self.probe, self.packages, options).check(&self.dependencies)
    }

    fn resolve(&self) -> Result<Placement> {
        let natural = self.settings.layout.resolve()?;
        let placement = Placement::new(natural, self.settings.install_prefix.as_deref())?;
        tracing::debug!(
            "Installing {} into {}",
            APP_NAME,
            placement.target.get(Role::AppDir).display()
        );
        Ok(placement)
    }

    /// Remove the installation described by the artifact at the target
    /// module directory. Returns false if there was none.
    ///
    /// An artifact that no longer loads still guides the cleanup: the roles
    /// it records are used and the rest fall back to this run's layout.
    fn remove_previous(&self, placement: &Placement, summary: &mut InstallSummary) -> Result<bool> {
        let artifact = config_store::artifact_path(&placement.target);
        let (layout, apis, extras) = match config_store::read_artifact(&artifact) {
            Ok(Some(installed)) => (
                installed.layout().clone(),
                installed.apis().to_vec(),
                installed.extras().clone(),
            ),
            Ok(None) => {
                tracing::debug!("No previous installation at {}", artifact.display());
                return Ok(false);
            }
            Err(e @ (ConfigStoreError::Malformed(_) | ConfigStoreError::Incomplete(_))) => {
                summary.warn(format!(
                    "Previous configuration {} is unusable: {}",
                    artifact.display(),
                    e
                ));
                let Some(recorded) = config_store::salvage_artifact(&artifact) else {
                    config_store::remove_artifact(&artifact)?;
                    return Ok(false);
                };
                let layout = recorded.complete(&placement.natural)?;
                (layout, recorded.apis, recorded.extras)
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!("Removing previous installation");

        let previous = Placement::new(layout, self.settings.install_prefix.as_deref())?;

        let mut bin_dirs = BTreeSet::from([
            placement.target.get(Role::BinDir).to_path_buf(),
            previous.target.get(Role::BinDir).to_path_buf(),
        ]);
        if placement.prefix.is_none() {
            bin_dirs.extend(self.settings.legacy_bin_dir.clone());
        }
        let bin_dirs: Vec<PathBuf> = bin_dirs.into_iter().collect();

        let report = self.integrator.remove_all(&previous, &bin_dirs, &extras);
        for failure in &report.failures {
            summary.warn(format!("Could not remove {}", failure));
        }

        config_store::remove_artifact(&artifact)?;
        remove_tree(&previous.target)?;
        remove_translations(previous.target.get(Role::TranslationsDir))?;
        remove_apis(previous.target.get(Role::ApiDir), &apis)?;
        Ok(true)
    }

    fn deploy(&self, placement: &Placement, summary: &mut InstallSummary) -> Result<()> {
        let source = &self.settings.source;
        let target = &placement.target;

        if self.settings.clean_source {
            let stats = prune::clean_source_tree(&source.package_dir());
            tracing::info!(
                "Cleaned source tree: {} files, {} directories removed",
                stats.files_removed,
                stats.dirs_removed
            );
        }

        for (role, dir) in target.iter() {
            if role != Role::ApiDir {
                deploy::create_dir(dir)?;
            }
        }

        tracing::info!("Copying files to {}", target.get(Role::AppDir).display());
        for entry in default_manifest(source, target) {
            match deploy::copy_subtree(&entry) {
                Ok(stats) => summary.deployed.merge(stats),
                Err(e) if entry.optional => {
                    summary.warn(format!("Could not install {}: {}", entry.source.display(), e))
                }
                Err(e) => return Err(e.into()),
            }
        }

        for launcher in LAUNCHERS {
            let path = self
                .integrator
                .create_launcher(placement, launcher.name, launcher.gui)?;
            summary.launchers.push(path);
        }

        deploy::install_file(
            &source.root().join(LICENSE_FILE),
            target.get(Role::AppDir),
            FILE_MODE,
        )?;
        create_global_plugins_package(target.get(Role::ModuleDir))?;

        for doc in source.documentation_files() {
            if let Err(e) = deploy::install_file(&doc, target.get(Role::DocDir), FILE_MODE) {
                summary.warn(format!("Could not install {}: {}", doc.display(), e));
            }
        }

        if !self.settings.no_apis {
            self.install_apis(target.get(Role::ApiDir), summary);
        }

        match self.compiler {
            Some(compiler) if !self.settings.no_compile => {
                let app_dir = target.get(Role::AppDir);
                if !compiler.compile(app_dir, placement.natural.get(Role::AppDir)) {
                    summary.warn(format!("Compiling {} failed", app_dir.display()));
                }
            }
            _ => tracing::debug!("Skipping compilation"),
        }
        Ok(())
    }

    fn install_apis(&self, api_dir: &Path, summary: &mut InstallSummary) {
        let writable = match fs::create_dir_all(api_dir) {
            Ok(()) => sanity::is_writable(api_dir),
            Err(_) => false,
        };
        if !writable {
            summary.warn(format!(
                "The API directory {} is not writable; API files not installed",
                api_dir.display()
            ));
            return;
        }

        for language in API_LANGUAGES {
            let dest = api_dir.join(language.to_lowercase());
            let files = self.settings.source.api_files(language);
            if files.is_empty() {
                continue;
            }
            tracing::info!("Installing {} API files to {}", language, dest.display());
            if let Err(e) = deploy::create_dir(&dest) {
                summary.warn(format!("Could not install {} API files: {}", language, e));
                continue;
            }
            for file in files {
                if let Err(e) = deploy::install_file(&file, &dest, FILE_MODE) {
                    summary.warn(format!("Could not install {}: {}", file.display(), e));
                }
            }
        }
    }

    fn write_config(&self, placement: &Placement) -> Result<PathBuf> {
        let extras = ConfigExtras {
            apis: if self.settings.no_apis {
                Vec::new()
            } else {
                self.settings.source.api_names()
            },
            values: self.integrator.config_extras(),
        };
        let path = config_store::write_artifact(
            placement.target.get(Role::ModuleDir),
            &placement.natural,
            &extras,
        )?;
        tracing::info!("Wrote configuration {}", path.display());
        Ok(path)
    }

    fn integrate(&self, placement: &Placement, summary: &mut InstallSummary) {
        let templates = Templates::load(
            &self
                .settings
                .source
                .data_dir()
                .join(self.settings.platform.data_subdir()),
        );

        let mut report = self.integrator.create_menu_entry(placement, &templates);
        report.merge(self.integrator.create_desktop_entry(placement, &templates));
        for failure in &report.failures {
            summary.warn(format!("Desktop integration: {}", failure));
        }
        summary.integration = report;
    }

    fn write_record(&self, placement: &Placement, summary: &mut InstallSummary) -> Option<PathBuf> {
        let record = InstallRecord::capture(
            &self.settings.interpreter,
            placement.natural.get(Role::AppDir),
            self.settings.elevated,
        );
        match record.write(placement.target.get(Role::AppDir)) {
            Ok(path) => Some(path),
            Err(e) => {
                summary.warn(format!("Install record not written: {}", e));
                None
            }
        }
    }
}

fn finish(
    mut ctx: LifecycleContext,
    mut summary: InstallSummary,
    result: Result<()>,
) -> std::result::Result<InstallSummary, LifecycleError> {
    match result {
        Ok(()) => {
            summary.history = ctx.stage_history().to_vec();
            Ok(summary)
        }
        Err(error) => {
            let stage = ctx.current_stage();
            if let Err(e) = ctx.fail(error.to_string()) {
                tracing::debug!("{}", e);
            }
            tracing::error!("Stopped after stage '{}': {}", stage, error);
            Err(LifecycleError { stage, error })
        }
    }
}

/// Remove every role directory that holds only installed content
fn remove_tree(layout: &PathLayout) -> Result<()> {
    for role in Role::tree_roles() {
        let dir = layout.get(role);
        if deploy::remove_dir_if_exists(dir)
            .map_err(|e| InstallerError::filesystem("removing", dir, e))?
        {
            tracing::debug!("Removed {}", dir.display());
        }
    }
    Ok(())
}

/// Remove the application's `*.qm` files from a possibly shared directory
fn remove_translations(dir: &Path) -> Result<()> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(());
    };
    let prefix = format!("{}_", APP_NAME);
    for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
        let ours = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".qm"));
        if ours {
            deploy::remove_file_if_exists(&path)
                .map_err(|e| InstallerError::filesystem("removing", &path, e))?;
        }
    }
    Ok(())
}

/// Remove recorded API files and prepared files of every language, then
/// the language directories if they end up empty
fn remove_apis(api_dir: &Path, apis: &[String]) -> Result<()> {
    for language in API_LANGUAGES {
        let lowercase = language.to_lowercase();
        let mut dirs = vec![api_dir.join(language)];
        if lowercase != *language {
            dirs.push(api_dir.join(&lowercase));
        }

        for dir in dirs {
            let mut files: Vec<PathBuf> = apis.iter().map(|name| dir.join(name)).collect();
            if let Ok(entries) = fs::read_dir(&dir) {
                files.extend(
                    entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.path())
                        .filter(|p| p.extension().is_some_and(|e| e == "bas")),
                );
            }
            for file in files {
                deploy::remove_file_if_exists(&file)
                    .map_err(|e| InstallerError::filesystem("removing", &file, e))?;
            }
            // Fails harmlessly when the directory still holds foreign files
            let _ = fs::remove_dir(&dir);
        }
    }
    Ok(())
}

fn create_global_plugins_package(module_dir: &Path) -> Result<()> {
    let package = module_dir.join(GLOBAL_PLUGINS_PACKAGE);
    let init = package.join("__init__.py");
    if init.exists() {
        return Ok(());
    }
    deploy::write_file(
        &init,
        "\"\"\"\nPackage containing the global plugins.\n\"\"\"\n",
        FILE_MODE,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remove_translations_keeps_foreign_files() {
        let tmp = TempDir::new().unwrap();
        for name in ["app7_de.qm", "app7_fr.qm", "qt_de.qm", "app7_notes.txt"] {
            fs::write(tmp.path().join(name), "").unwrap();
        }
        remove_translations(tmp.path()).unwrap();

        assert!(!tmp.path().join("app7_de.qm").exists());
        assert!(tmp.path().join("qt_de.qm").exists());
        assert!(tmp.path().join("app7_notes.txt").exists());
        remove_translations(&tmp.path().join("absent")).unwrap();
    }

    #[test]
    fn test_remove_apis() {
        let tmp = TempDir::new().unwrap();
        let py = tmp.path().join("python3");
        fs::create_dir_all(&py).unwrap();
        fs::write(py.join("app7.api"), "").unwrap();
        fs::write(py.join("app7.bas"), "").unwrap();
        fs::write(py.join("other.api"), "").unwrap();

        remove_apis(tmp.path(), &["app7.api".to_string()]).unwrap();
        assert!(!py.join("app7.api").exists());
        assert!(!py.join("app7.bas").exists());
        assert!(py.join("other.api").exists());

        fs::remove_file(py.join("other.api")).unwrap();
        remove_apis(tmp.path(), &[]).unwrap();
        assert!(!py.exists());
    }

    #[test]
    fn test_global_plugins_package_kept() {
        let tmp = TempDir::new().unwrap();
        create_global_plugins_package(tmp.path()).unwrap();
        let init = tmp.path().join("app7plugins/__init__.py");
        assert!(fs::read_to_string(&init).unwrap().contains("global plugins"));

        fs::write(&init, "custom").unwrap();
        create_global_plugins_package(tmp.path()).unwrap();
        assert_eq!(fs::read_to_string(&init).unwrap(), "custom");
    }

    #[test]
    fn test_lifecycle_error_exit_code() {
        let err = LifecycleError {
            stage: InstallStage::Deployed,
            error: InstallerError::general("x"),
        };
        assert_eq!(err.exit_code(), ExitCode::Internal);
        assert_eq!(err.to_string(), "x");
    }
}
