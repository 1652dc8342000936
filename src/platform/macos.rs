//! macOS application bundle

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::launcher::unix_script;
use super::{
    fill_template, remove_launchers, IntegrationError, IntegrationReport, IntegrationSettings,
    Platform, PlatformIntegrator, Templates,
};
use crate::config_store::{EXTRA_MAC_BUNDLE_NAME, EXTRA_MAC_BUNDLE_PATH};
use crate::deploy::{self, EXEC_MODE, FILE_MODE};
use crate::layout::{Placement, Role, APP_NAME};

pub const DEFAULT_BUNDLE_DIR: &str = "/Applications";
pub const DEFAULT_BUNDLE_NAME: &str = "app7.app";

const BUNDLE_ICON_SOURCE: &str = "app7_2.icns";
const BUNDLE_ICON: &str = "app7.icns";
const INFO_PLIST: &str = "Info.plist";

const DEFAULT_INFO_PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN"
          "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleExecutable</key>
    <string>app7</string>
    <key>CFBundleIconFile</key>
    <string>app7.icns</string>
    <key>CFBundleInfoDictionaryVersion</key>
    <string>@VERSION@</string>
    <key>CFBundleName</key>
    <string>@NAME@</string>
    <key>CFBundleDisplayName</key>
    <string>@NAME@</string>
    <key>CFBundlePackageType</key>
    <string>APPL</string>
    <key>CFBundleVersion</key>
    <string>@VERSION@</string>
    <key>CFBundleIdentifier</key>
    <string>org.app7.app7</string>
    <key>NSRequiresAquaSystemAppearance</key>
    <string>false</string>
    <key>LSEnvironment</key>
    <dict>
        <key>LANG</key>
        <string>en_US.UTF-8</string>
        <key>LC_ALL</key>
        <string>en_US.UTF-8</string>
    </dict>
</dict>
</plist>
"#;

pub struct MacOsIntegrator {
    settings: IntegrationSettings,
}

impl MacOsIntegrator {
    pub fn new(settings: IntegrationSettings) -> Self {
        Self { settings }
    }

    fn bundle_path(&self) -> PathBuf {
        self.settings
            .mac_bundle
            .dir
            .join(&self.settings.mac_bundle.name)
    }

    /// `PATH` for the bundle launcher: the interpreter's directory first,
    /// then the caller's search path without duplicates
    fn path_line(&self) -> String {
        let mut entries: Vec<PathBuf> = self
            .settings
            .interpreter
            .parent()
            .map(Path::to_path_buf)
            .into_iter()
            .collect();
        if let Some(path) = std::env::var_os("PATH") {
            for entry in std::env::split_paths(&path) {
                if !entry.as_os_str().is_empty() && !entries.contains(&entry) {
                    entries.push(entry);
                }
            }
        }
        match std::env::join_paths(&entries) {
            Ok(joined) if !entries.is_empty() => format!("PATH={}\n", joined.to_string_lossy()),
            _ => String::new(),
        }
    }

    fn bundle_script(&self, app_dir: &Path) -> String {
        let script = unix_script(&self.settings.interpreter, app_dir, APP_NAME);
        // Environment goes between the shebang and the exec line
        match script.split_once("\n\n") {
            Some((shebang, exec)) => format!("{}\n\n{}{}", shebang, self.path_line(), exec),
            None => script,
        }
    }
}

impl PlatformIntegrator for MacOsIntegrator {
    fn platform(&self) -> Platform {
        Platform::MacOs
    }

    fn launcher_paths(&self, bin_dir: &Path, name: &str) -> Vec<PathBuf> {
        vec![bin_dir.join(name)]
    }

    fn create_launcher(
        &self,
        placement: &Placement,
        name: &str,
        _gui: bool,
    ) -> Result<PathBuf, IntegrationError> {
        let path = placement.target.get(Role::BinDir).join(name);
        let script = unix_script(
            &self.settings.interpreter,
            placement.natural.get(Role::AppDir),
            name,
        );
        deploy::write_file(&path, &script, EXEC_MODE).map_err(|source| {
            IntegrationError::Write {
                path: path.clone(),
                source,
            }
        })?;
        Ok(path)
    }

    fn create_menu_entry(&self, placement: &Placement, templates: &Templates) -> IntegrationReport {
        let mut report = IntegrationReport::default();
        let contents = placement.target_path(&self.bundle_path()).join("Contents");

        let launcher = contents.join("MacOS").join(APP_NAME);
        let script = self.bundle_script(placement.natural.get(Role::AppDir));
        report.record_created(&launcher, deploy::write_file(&launcher, &script, EXEC_MODE));

        let icon = contents.join("Resources").join(BUNDLE_ICON);
        let result = deploy::copy_file(
            &self.settings.source.pixmaps_dir().join(BUNDLE_ICON_SOURCE),
            &icon,
            FILE_MODE,
        );
        report.record_created(&icon, result);

        let plist = contents.join(INFO_PLIST);
        let template = templates.get(INFO_PLIST).unwrap_or(DEFAULT_INFO_PLIST);
        let display_name = self
            .settings
            .mac_bundle
            .name
            .trim_end_matches(".app")
            .to_string();
        let text = fill_template(
            template,
            &[
                ("NAME", display_name.as_str()),
                ("VERSION", self.settings.version.as_str()),
            ],
        );
        report.record_created(&plist, deploy::write_file(&plist, &text, FILE_MODE));
        report
    }

    fn create_desktop_entry(
        &self,
        _placement: &Placement,
        _templates: &Templates,
    ) -> IntegrationReport {
        let mut report = IntegrationReport::default();
        report.skip("macOS has no desktop entries");
        report
    }

    fn remove_all(
        &self,
        placement: &Placement,
        bin_dirs: &[PathBuf],
        recorded: &BTreeMap<String, String>,
    ) -> IntegrationReport {
        let mut report = IntegrationReport::default();
        remove_launchers(self, bin_dirs, &mut report);

        let name = &self.settings.mac_bundle.name;
        let mut bundles = vec![Path::new(DEFAULT_BUNDLE_DIR).join(name), self.bundle_path()];
        if let Some(dir) = recorded.get(EXTRA_MAC_BUNDLE_PATH) {
            let recorded_name = recorded.get(EXTRA_MAC_BUNDLE_NAME).unwrap_or(name);
            bundles.push(Path::new(dir).join(recorded_name));
        }
        bundles.sort();
        bundles.dedup();
        for bundle in bundles {
            report.remove_dir(&placement.target_path(&bundle));
        }
        report
    }

    fn config_extras(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                EXTRA_MAC_BUNDLE_PATH.to_string(),
                self.settings.mac_bundle.dir.display().to_string(),
            ),
            (
                EXTRA_MAC_BUNDLE_NAME.to_string(),
                self.settings.mac_bundle.name.clone(),
            ),
        ])
    }
}
