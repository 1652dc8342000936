//! Windows launchers, Start Menu folder and desktop shortcuts

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::launcher::windows_script;
use super::{
    remove_launchers, IntegrationError, IntegrationReport, IntegrationSettings, Platform,
    PlatformIntegrator, Templates,
};
use crate::command_runner::run_captured;
use crate::deploy::{self, FILE_MODE};
use crate::layout::{Placement, Role, APP_NAME};
use crate::sanity::find_executable;

/// (link name, launcher it points to, icon in the pixmap directory)
const SHORTCUTS: &[(&str, &str, &str)] = &[
    ("app7.lnk", "app7.cmd", "app7.ico"),
    ("app7 Browser.lnk", "app7_browser.cmd", "app7Web48.ico"),
];

/// Writes `.lnk` shortcut files
pub trait ShortcutWriter {
    fn create(&self, link: &Path, target: &Path, icon: &Path) -> Result<(), IntegrationError>;
}

/// Creates shortcuts through the `WScript.Shell` COM object driven by
/// PowerShell
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerShellShortcuts;

impl PowerShellShortcuts {
    fn quote(path: &Path) -> String {
        format!("'{}'", path.display().to_string().replace('\'', "''"))
    }

    fn script(link: &Path, target: &Path, icon: &Path) -> String {
        let workdir = target.parent().unwrap_or(target);
        format!(
            "$s = (New-Object -ComObject WScript.Shell).CreateShortcut({}); \
             $s.TargetPath = {}; $s.WorkingDirectory = {}; $s.IconLocation = {}; $s.Save()",
            Self::quote(link),
            Self::quote(target),
            Self::quote(workdir),
            Self::quote(icon)
        )
    }
}

impl ShortcutWriter for PowerShellShortcuts {
    fn create(&self, link: &Path, target: &Path, icon: &Path) -> Result<(), IntegrationError> {
        let shell = find_executable("powershell")
            .or_else(|| find_executable("pwsh"))
            .ok_or_else(|| IntegrationError::Unavailable("PowerShell not found on PATH".into()))?;

        let script = Self::script(link, target, icon);
        let args = ["-NoProfile", "-NonInteractive", "-Command", script.as_str()];
        let out = run_captured(&shell, args)
            .map_err(|e| IntegrationError::Unavailable(format!("{:#}", e)))?;
        if out.success {
            Ok(())
        } else {
            Err(IntegrationError::Unavailable(format!(
                "shortcut {} not created: {}",
                link.display(),
                out.stderr.trim()
            )))
        }
    }
}

pub struct WindowsIntegrator {
    settings: IntegrationSettings,
    shortcuts: Box<dyn ShortcutWriter>,
}

impl WindowsIntegrator {
    pub fn new(settings: IntegrationSettings, shortcuts: Box<dyn ShortcutWriter>) -> Self {
        Self {
            settings,
            shortcuts,
        }
    }

    fn start_menu_dir(&self) -> Option<PathBuf> {
        self.settings
            .programs_dir
            .as_ref()
            .map(|dir| dir.join(APP_NAME))
    }

    fn create_links(&self, placement: &Placement, folder: &Path) -> IntegrationReport {
        let mut report = IntegrationReport::default();
        let bin_dir = placement.natural.get(Role::BinDir);
        let pix_dir = placement.natural.get(Role::PixDir);
        for (link, target, icon) in SHORTCUTS {
            let link = folder.join(link);
            let result = self
                .shortcuts
                .create(&link, &bin_dir.join(target), &pix_dir.join(icon));
            report.record_created(&link, result);
        }
        report
    }
}

impl PlatformIntegrator for WindowsIntegrator {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn launcher_paths(&self, bin_dir: &Path, name: &str) -> Vec<PathBuf> {
        vec![
            bin_dir.join(format!("{}.cmd", name)),
            bin_dir.join(format!("{}.bat", name)),
        ]
    }

    fn create_launcher(
        &self,
        placement: &Placement,
        name: &str,
        gui: bool,
    ) -> Result<PathBuf, IntegrationError> {
        let path = placement
            .target
            .get(Role::BinDir)
            .join(format!("{}.cmd", name));
        let script = windows_script(
            &self.settings.interpreter,
            placement.natural.get(Role::AppDir),
            name,
            gui,
        );
        deploy::write_file(&path, &script, FILE_MODE).map_err(|source| {
            IntegrationError::Write {
                path: path.clone(),
                source,
            }
        })?;
        Ok(path)
    }

    fn create_menu_entry(&self, placement: &Placement, _templates: &Templates) -> IntegrationReport {
        if placement.prefix.is_some() {
            let mut report = IntegrationReport::default();
            report.skip("Start Menu entries are not created for staged installs");
            return report;
        }
        let Some(folder) = self.start_menu_dir() else {
            let mut report = IntegrationReport::default();
            report.skip("Start Menu folder unknown");
            return report;
        };
        if let Err(e) = deploy::create_dir(&folder) {
            let mut report = IntegrationReport::default();
            report.failures.push(e.to_string());
            return report;
        }
        self.create_links(placement, &folder)
    }

    fn create_desktop_entry(
        &self,
        placement: &Placement,
        _templates: &Templates,
    ) -> IntegrationReport {
        match (&placement.prefix, &self.settings.desktop_dir) {
            (None, Some(desktop)) => self.create_links(placement, desktop),
            _ => {
                let mut report = IntegrationReport::default();
                report.skip("desktop shortcuts not created");
                report
            }
        }
    }

    fn remove_all(
        &self,
        placement: &Placement,
        bin_dirs: &[PathBuf],
        _recorded: &BTreeMap<String, String>,
    ) -> IntegrationReport {
        let mut report = IntegrationReport::default();
        remove_launchers(self, bin_dirs, &mut report);
        if placement.prefix.is_some() {
            return report;
        }

        if self.settings.clean_desktop {
            if let Some(desktop) = &self.settings.desktop_dir {
                for (link, _, _) in SHORTCUTS {
                    report.remove_file(&desktop.join(link));
                }
            }
        }
        if let Some(folder) = self.start_menu_dir() {
            report.remove_dir(&folder);
        }
        report
    }
}
