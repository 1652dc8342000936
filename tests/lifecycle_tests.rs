//! End-to-end install and uninstall runs against a staged prefix
//!
//! Every run writes below a temporary staging directory; the natural layout
//! names ordinary system paths that are never touched.

#![cfg(unix)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

use app7_installer::config::{InstallSettings, LayoutSource};
use app7_installer::config_store;
use app7_installer::deploy::manifest::SourceTree;
use app7_installer::error::ExitCode;
use app7_installer::gate::{
    CapabilityProbe, DependencySpec, HostRange, PackageInstaller, ProbeOutcome, Requirement,
};
use app7_installer::install_record::INSTALL_RECORD_NAME;
use app7_installer::install_state::InstallStage;
use app7_installer::installer::Installer;
use app7_installer::layout::{reroot, ResolverInput};
use app7_installer::platform::linux::LinuxIntegrator;
use app7_installer::platform::macos::MacOsIntegrator;
use app7_installer::platform::{IntegrationSettings, MacBundle, Platform};
use app7_installer::version::Version;

const MODULE_DIR: &str = "/usr/lib/python3/site-packages";
const APP_DIR: &str = "/usr/lib/python3/site-packages/app7";
const BIN_DIR: &str = "/usr/bin";

/// Probe answering from a table; anything unlisted is present in a recent version
struct FixedProbe {
    answers: Vec<(String, ProbeOutcome)>,
    host: ProbeOutcome,
}

impl FixedProbe {
    fn all_present() -> Self {
        Self {
            answers: Vec::new(),
            host: ProbeOutcome::Found(Version::new(3, 11, 4)),
        }
    }

    fn with(mut self, name: &str, outcome: ProbeOutcome) -> Self {
        self.answers.push((name.to_string(), outcome));
        self
    }
}

impl CapabilityProbe for FixedProbe {
    fn probe(&self, spec: &DependencySpec) -> ProbeOutcome {
        self.answers
            .iter()
            .find(|(name, _)| *name == spec.name)
            .map(|(_, outcome)| *outcome)
            .unwrap_or(ProbeOutcome::Found(Version::new(9, 0, 0)))
    }

    fn host_runtime(&self) -> ProbeOutcome {
        self.host
    }
}

#[derive(Default)]
struct RefusingInstaller {
    asked: RefCell<Vec<String>>,
}

impl PackageInstaller for RefusingInstaller {
    fn install(&self, target: &str, _message: &str, _force: bool) -> bool {
        self.asked.borrow_mut().push(target.to_string());
        false
    }

    fn remediation_hint(&self, target: &str) -> String {
        format!("pip install {}", target)
    }
}

struct Fixture {
    _tmp: TempDir,
    source: PathBuf,
    stage: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("dist");
        let stage = tmp.path().join("stage");
        fs::create_dir_all(&stage).unwrap();

        let files = [
            ("LICENSE.GPL3", "GPL"),
            ("README.md", "readme"),
            ("changelog.md", "changes"),
            ("app7/app7.py", "print('app7')"),
            ("app7/app7_browser.py", ""),
            ("app7/app7config.py", "generated"),
            ("app7/Utilities/misc.py", ""),
            ("app7/Plugins/PluginAbout.py", ""),
            ("app7/Plugins/About/about.png", ""),
            ("app7/pixmaps/app7_icon.png", "png"),
            ("app7/pixmaps/app7_48_icon.png", "png"),
            ("app7/pixmaps/app7Web48_icon.png", "png"),
            ("app7/i18n/app7_de.qm", "qm"),
            ("app7/Documentation/index.html", "<html/>"),
            ("app7/Documentation/notes.txt", "skipped"),
            ("app7/APIs/Python3/app7.api", "api"),
            ("app7/APIs/Python3/app7.bas", "bas"),
            ("app7/data/linux/app7.desktop.in", "Exec=@BINDIR@/app7\n"),
            ("app7/data/linux/app7_browser.desktop.in", "Exec=@BINDIR@/app7_browser\n"),
            ("app7/data/linux/app7.appdata.xml.in", "<release version=\"@VERSION@\"/>\n"),
        ];
        for (relative, contents) in files {
            let path = source.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        Self {
            _tmp: tmp,
            source,
            stage,
        }
    }

    fn settings(&self) -> InstallSettings {
        InstallSettings {
            interpreter: PathBuf::from("/usr/bin/python3"),
            source: SourceTree::new(&self.source),
            platform: Platform::Linux,
            elevated: false,
            layout: LayoutSource::Dirs(ResolverInput {
                module_dir: PathBuf::from(MODULE_DIR),
                bin_dir: PathBuf::from(BIN_DIR),
                api_dir: None,
            }),
            install_prefix: Some(self.stage.clone()),
            legacy_bin_dir: None,
            mac_bundle: MacBundle::default(),
            uninstall: false,
            no_apis: false,
            no_cleanup: false,
            no_deps: false,
            no_compile: true,
            no_info: false,
            assume_yes: false,
            with_tools: false,
            clean_desktop: false,
            clean_source: false,
        }
    }

    fn integration_settings(&self) -> IntegrationSettings {
        let mut settings = IntegrationSettings::detect(
            PathBuf::from("/usr/bin/python3"),
            SourceTree::new(&self.source),
            false,
        );
        settings.home_dir = Some(self.stage.join("home"));
        settings
    }

    fn integrator(&self) -> LinuxIntegrator {
        LinuxIntegrator::new(self.integration_settings())
    }

    fn mac_integrator(&self, bundle: MacBundle) -> MacOsIntegrator {
        let mut settings = self.integration_settings();
        settings.mac_bundle = bundle;
        MacOsIntegrator::new(settings)
    }

    /// Sorted listing of everything below the staging directory
    fn snapshot(&self) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = WalkDir::new(&self.stage)
            .into_iter()
            .map(|entry| {
                entry
                    .unwrap()
                    .path()
                    .strip_prefix(&self.stage)
                    .unwrap()
                    .to_path_buf()
            })
            .collect();
        entries.sort();
        entries
    }

    /// Where `natural` lands below the staging directory
    fn staged(&self, natural: &str) -> PathBuf {
        reroot(&self.stage, Path::new(natural))
    }
}

fn stages(history: &[(InstallStage, u64)]) -> Vec<InstallStage> {
    history.iter().map(|(stage, _)| *stage).collect()
}

#[test]
fn test_install_into_staged_prefix() {
    let fx = Fixture::new();
    let settings = fx.settings();
    let probe = FixedProbe::all_present();
    let packages = RefusingInstaller::default();
    let integrator = fx.integrator();

    let summary = Installer::new(&settings, &probe, &packages, &integrator)
        .install()
        .unwrap();

    assert_eq!(
        stages(&summary.history),
        vec![
            InstallStage::GateChecked,
            InstallStage::Resolved,
            InstallStage::OldCleanedUp,
            InstallStage::Deployed,
            InstallStage::Configured,
            InstallStage::Integrated,
            InstallStage::Recorded,
            InstallStage::Done,
        ]
    );
    assert!(!summary.removed_previous);

    let app_dir = fx.staged(APP_DIR);
    assert!(app_dir.join("app7.py").is_file());
    assert!(app_dir.join("Utilities/misc.py").is_file());
    assert!(app_dir.join("Plugins/PluginAbout.py").is_file());
    assert!(app_dir.join("Plugins/About/about.png").is_file());
    assert!(!app_dir.join("app7config.py").exists());
    assert!(app_dir.join("LICENSE.GPL3").is_file());
    assert!(app_dir.join("Documentation/index.html").is_file());
    assert!(!app_dir.join("Documentation/notes.txt").exists());
    assert!(app_dir.join("Documentation/README.md").is_file());
    assert!(app_dir.join("i18n/app7_de.qm").is_file());
    assert!(app_dir.join("api/python3/app7.api").is_file());
    assert!(app_dir.join(INSTALL_RECORD_NAME).is_file());
    assert!(fx
        .staged(MODULE_DIR)
        .join("app7plugins/__init__.py")
        .is_file());

    // Launchers point at the natural application directory
    let launcher = fs::read_to_string(fx.staged(BIN_DIR).join("app7")).unwrap();
    assert!(launcher.contains(&format!("\"{}/app7.py\"", APP_DIR)));
    assert!(!launcher.contains(&fx.stage.display().to_string()));
    assert_eq!(summary.launchers.len(), 22);

    // The artifact records natural paths only
    let artifact = summary.artifact.clone().unwrap();
    assert_eq!(artifact, fx.staged(MODULE_DIR).join("app7config.json"));
    let installed = config_store::read_artifact(&artifact).unwrap().unwrap();
    assert_eq!(installed.get("appDir").unwrap(), Path::new(APP_DIR));
    assert_eq!(installed.apis(), ["app7.api".to_string()]);
    assert!(!fs::read_to_string(&artifact)
        .unwrap()
        .contains(&fx.stage.display().to_string()));

    // Desktop integration is staged as well
    let desktop =
        fs::read_to_string(fx.staged("/usr/share/applications/app7.desktop")).unwrap();
    assert_eq!(desktop, "Exec=/usr/bin/app7\n");
    assert!(fx.staged("/usr/share/icons/app7.png").is_file());
    assert!(summary.integration.is_clean());
    assert!(!fx.stage.join("home").exists());
}

#[test]
fn test_reinstall_replaces_previous_installation() {
    let fx = Fixture::new();
    let settings = fx.settings();
    let probe = FixedProbe::all_present();
    let packages = RefusingInstaller::default();
    let integrator = fx.integrator();
    let installer = Installer::new(&settings, &probe, &packages, &integrator);

    installer.install().unwrap();
    let stale = fx.staged(APP_DIR).join("Utilities/removed_module.py");
    fs::write(&stale, "").unwrap();

    let summary = installer.install().unwrap();
    assert!(summary.removed_previous);
    assert!(!stale.exists());
    assert!(fx.staged(APP_DIR).join("app7.py").is_file());
}

#[test]
fn test_no_cleanup_skips_optional_stage() {
    let fx = Fixture::new();
    let mut settings = fx.settings();
    settings.no_cleanup = true;
    let probe = FixedProbe::all_present();
    let packages = RefusingInstaller::default();
    let integrator = fx.integrator();
    let installer = Installer::new(&settings, &probe, &packages, &integrator);

    installer.install().unwrap();
    let stale = fx.staged(APP_DIR).join("Utilities/removed_module.py");
    fs::write(&stale, "").unwrap();

    let summary = installer.install().unwrap();
    assert!(!stages(&summary.history).contains(&InstallStage::OldCleanedUp));
    assert!(stale.exists());
}

#[test]
fn test_uninstall_twice() {
    let fx = Fixture::new();
    let mut settings = fx.settings();
    let probe = FixedProbe::all_present();
    let packages = RefusingInstaller::default();
    let integrator = fx.integrator();

    Installer::new(&settings, &probe, &packages, &integrator)
        .install()
        .unwrap();
    let foreign = fx.staged(MODULE_DIR).join("othermodule.py");
    fs::write(&foreign, "").unwrap();

    settings.uninstall = true;
    let installer = Installer::new(&settings, &probe, &packages, &integrator);
    let summary = installer.uninstall().unwrap();
    assert!(summary.removed_previous);
    assert_eq!(
        stages(&summary.history),
        vec![
            InstallStage::Resolved,
            InstallStage::OldCleanedUp,
            InstallStage::Done,
        ]
    );

    assert!(!fx.staged(APP_DIR).exists());
    assert!(!fx.staged(BIN_DIR).join("app7").exists());
    assert!(!fx.staged(MODULE_DIR).join("app7config.json").exists());
    assert!(!fx.staged("/usr/share/applications/app7.desktop").exists());
    assert!(foreign.exists());

    let after_first = fx.snapshot();
    let again = installer.uninstall().unwrap();
    assert!(!again.removed_previous);
    assert_eq!(again.history.last().map(|(s, _)| *s), Some(InstallStage::Done));
    assert_eq!(fx.snapshot(), after_first);
}

#[test]
fn test_reinstall_with_new_bin_dir_removes_old_launchers() {
    let fx = Fixture::new();
    let mut settings = fx.settings();
    let probe = FixedProbe::all_present();
    let packages = RefusingInstaller::default();
    let integrator = fx.integrator();

    Installer::new(&settings, &probe, &packages, &integrator)
        .install()
        .unwrap();
    assert!(fx.staged(BIN_DIR).join("app7").is_file());

    let new_bin = "/usr/local/bin";
    settings.layout = LayoutSource::Dirs(ResolverInput {
        module_dir: PathBuf::from(MODULE_DIR),
        bin_dir: PathBuf::from(new_bin),
        api_dir: None,
    });
    let summary = Installer::new(&settings, &probe, &packages, &integrator)
        .install()
        .unwrap();

    assert!(summary.removed_previous);
    assert!(fx.staged(new_bin).join("app7").is_file());
    assert_eq!(fs::read_dir(fx.staged(BIN_DIR)).unwrap().count(), 0);
    let installed = config_store::read_artifact(&summary.artifact.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(installed.get("binDir").unwrap(), Path::new(new_bin));
}

#[test]
fn test_uninstall_removes_bundle_at_recorded_location() {
    let fx = Fixture::new();
    let mut settings = fx.settings();
    settings.platform = Platform::MacOs;
    let probe = FixedProbe::all_present();
    let packages = RefusingInstaller::default();

    let custom = fx.mac_integrator(MacBundle {
        dir: PathBuf::from("/opt/Tools"),
        name: "app7.app".into(),
    });
    Installer::new(&settings, &probe, &packages, &custom)
        .install()
        .unwrap();
    let bundle = fx.staged("/opt/Tools/app7.app");
    assert!(bundle.join("Contents/Info.plist").is_file());

    settings.uninstall = true;
    let default = fx.mac_integrator(MacBundle::default());
    let summary = Installer::new(&settings, &probe, &packages, &default)
        .uninstall()
        .unwrap();

    assert!(summary.removed_previous);
    assert!(!bundle.exists());
    assert!(!fx.staged(BIN_DIR).join("app7").exists());
}

#[test]
fn test_reinstall_over_outdated_artifact() {
    let fx = Fixture::new();
    let settings = fx.settings();
    let probe = FixedProbe::all_present();
    let packages = RefusingInstaller::default();
    let integrator = fx.integrator();
    let installer = Installer::new(&settings, &probe, &packages, &integrator);

    let first = installer.install().unwrap();
    let artifact = first.artifact.unwrap();
    let stale = fx.staged(APP_DIR).join("Utilities/removed_module.py");
    fs::write(&stale, "").unwrap();
    // Older format: fewer roles plus a key this version does not know
    fs::write(
        &artifact,
        format!(
            r#"{{"paths": {{"appDir": "{}", "binDir": "{}", "ericDir": "{}"}}}}"#,
            APP_DIR, BIN_DIR, APP_DIR
        ),
    )
    .unwrap();

    let summary = installer.install().unwrap();
    assert!(summary.removed_previous);
    assert!(!stale.exists());
    assert!(summary.warnings.iter().any(|w| w.contains("unusable")));
    assert!(config_store::read_artifact(&artifact).unwrap().is_some());
}

#[test]
fn test_unreadable_artifact_counts_as_no_installation() {
    let fx = Fixture::new();
    let mut settings = fx.settings();
    let probe = FixedProbe::all_present();
    let packages = RefusingInstaller::default();
    let integrator = fx.integrator();

    let artifact = fx.staged(MODULE_DIR).join("app7config.json");
    fs::create_dir_all(artifact.parent().unwrap()).unwrap();
    fs::write(&artifact, "not json").unwrap();

    settings.uninstall = true;
    let summary = Installer::new(&settings, &probe, &packages, &integrator)
        .uninstall()
        .unwrap();
    assert!(!summary.removed_previous);
    assert!(!artifact.exists());

    fs::write(&artifact, "not json").unwrap();
    settings.uninstall = false;
    let summary = Installer::new(&settings, &probe, &packages, &integrator)
        .install()
        .unwrap();
    assert!(!summary.removed_previous);
    assert!(fx.staged(APP_DIR).join("app7.py").is_file());
}

#[test]
fn test_blacklisted_dependency_stops_before_resolution() {
    let fx = Fixture::new();
    let settings = fx.settings();
    let probe = FixedProbe::all_present().with("X", ProbeOutcome::Found(Version::new(1, 3, 0)));
    let packages = RefusingInstaller::default();
    let integrator = fx.integrator();
    let spec = DependencySpec::registry("X", Requirement::Required)
        .with_min_version(Version::new(1, 2, 0))
        .with_blacklisted([Version::new(1, 3, 0)]);

    let err = Installer::new(&settings, &probe, &packages, &integrator)
        .with_dependencies(vec![spec])
        .install()
        .unwrap_err();

    assert_eq!(err.stage, InstallStage::Init);
    assert_eq!(err.exit_code(), ExitCode::Blacklisted);
    assert!(packages.asked.borrow().is_empty());
    assert_eq!(fs::read_dir(&fx.stage).unwrap().count(), 0);
}

#[test]
fn test_incompatible_host_stops_install() {
    let fx = Fixture::new();
    let settings = fx.settings();
    let mut probe = FixedProbe::all_present();
    probe.host = ProbeOutcome::Found(Version::new(3, 6, 15));
    let packages = RefusingInstaller::default();
    let integrator = fx.integrator();

    let err = Installer::new(&settings, &probe, &packages, &integrator)
        .with_host_range(Some(HostRange {
            minimum: Version::new(3, 7, 0),
            maximum: Version::new(3, 12, 0),
        }))
        .install()
        .unwrap_err();
    assert_eq!(err.exit_code(), ExitCode::IncompatibleHost);
}

#[test]
fn test_missing_optional_dependency_is_a_warning() {
    let fx = Fixture::new();
    let settings = fx.settings();
    let probe = FixedProbe::all_present().with("spell", ProbeOutcome::NotFound);
    let packages = RefusingInstaller::default();
    let integrator = fx.integrator();

    let summary = Installer::new(&settings, &probe, &packages, &integrator)
        .with_dependencies(vec![DependencySpec::registry(
            "spell",
            Requirement::Optional,
        )])
        .install()
        .unwrap();

    let gate = summary.gate.unwrap();
    assert_eq!(gate.non_fatal_gaps.len(), 1);
    assert!(summary.warnings.iter().any(|w| w.contains("spell")));
    assert_eq!(packages.asked.borrow().as_slice(), ["spell".to_string()]);
}

#[test]
fn test_unwritable_target_fails_with_filesystem_code() {
    let fx = Fixture::new();
    let settings = fx.settings();
    let probe = FixedProbe::all_present();
    let packages = RefusingInstaller::default();
    let integrator = fx.integrator();

    // A plain file where the binary directory should be
    let bin = fx.staged(BIN_DIR);
    fs::create_dir_all(bin.parent().unwrap()).unwrap();
    fs::write(&bin, "").unwrap();

    let err = Installer::new(&settings, &probe, &packages, &integrator)
        .install()
        .unwrap_err();
    assert_eq!(err.stage, InstallStage::OldCleanedUp);
    assert_eq!(err.exit_code(), ExitCode::Filesystem);
}

#[test]
fn test_no_apis_leaves_api_dir_alone() {
    let fx = Fixture::new();
    let mut settings = fx.settings();
    settings.no_apis = true;
    let probe = FixedProbe::all_present();
    let packages = RefusingInstaller::default();
    let integrator = fx.integrator();

    let summary = Installer::new(&settings, &probe, &packages, &integrator)
        .install()
        .unwrap();
    assert!(!fx.staged(APP_DIR).join("api").exists());
    let installed = config_store::read_artifact(&summary.artifact.unwrap())
        .unwrap()
        .unwrap();
    assert!(installed.apis().is_empty());
}
