//! Freedesktop integration: icons, AppStream metainfo and `.desktop` files

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::launcher::unix_script;
use super::{
    fill_template, remove_launchers, IntegrationError, IntegrationReport, IntegrationSettings,
    Platform, PlatformIntegrator, Templates,
};
use crate::deploy::{self, EXEC_MODE, FILE_MODE};
use crate::layout::{Placement, Role, APP_NAME};

const SYSTEM_SHARE_DIR: &str = "/usr/share";

/// (pixmap in the source tree, destination below the share directory)
const ICONS: &[(&str, &str)] = &[
    ("app7_icon.png", "icons/app7.png"),
    ("app7_48_icon.png", "icons/hicolor/48x48/apps/app7.png"),
    ("app7Web48_icon.png", "icons/app7Web.png"),
];

const METAINFO: &str = "app7.appdata.xml";
const METAINFO_DEST: &str = "metainfo/app7.appdata.xml";

const DESKTOP_FILES: &[&str] = &["app7.desktop", "app7_browser.desktop"];

pub struct LinuxIntegrator {
    settings: IntegrationSettings,
}

impl LinuxIntegrator {
    pub fn new(settings: IntegrationSettings) -> Self {
        Self { settings }
    }

    fn user_share_dir(&self) -> Option<PathBuf> {
        self.settings
            .home_dir
            .as_ref()
            .map(|home| home.join(".local/share"))
    }

    /// Share directory integration files are written to
    fn share_dir(&self, placement: &Placement) -> Option<PathBuf> {
        if placement.prefix.is_some() {
            Some(placement.target_path(Path::new(SYSTEM_SHARE_DIR)))
        } else if self.settings.elevated {
            Some(PathBuf::from(SYSTEM_SHARE_DIR))
        } else {
            self.user_share_dir()
        }
    }

    /// Every share directory a previous installation may have used
    fn cleanup_share_dirs(&self, placement: &Placement) -> Vec<PathBuf> {
        if placement.prefix.is_some() {
            return self.share_dir(placement).into_iter().collect();
        }
        let mut dirs = Vec::new();
        if self.settings.elevated {
            dirs.push(PathBuf::from(SYSTEM_SHARE_DIR));
        }
        dirs.extend(self.user_share_dir());
        dirs
    }

    fn desktop_values(&self, placement: &Placement) -> Vec<(&'static str, String)> {
        vec![
            (
                "BINDIR",
                placement.natural.get(Role::BinDir).display().to_string(),
            ),
            ("MARKER", self.settings.marker.clone()),
            ("PY_MARKER", self.settings.py_marker()),
        ]
    }

    fn write_filled(
        report: &mut IntegrationReport,
        templates: &Templates,
        name: &str,
        dest: &Path,
        values: &[(&str, String)],
    ) {
        let result = templates.get(name).and_then(|template| {
            let pairs: Vec<(&str, &str)> = values.iter().map(|(k, v)| (*k, v.as_str())).collect();
            deploy::write_file(dest, &fill_template(template, &pairs), FILE_MODE).map_err(
                |source| IntegrationError::Write {
                    path: dest.to_path_buf(),
                    source,
                },
            )
        });
        report.record_created(dest, result);
    }
}

impl PlatformIntegrator for LinuxIntegrator {
    fn platform(&self) -> Platform {
        Platform::Linux
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
        let Some(share) = self.share_dir(placement) else {
            report.skip("no home directory for per-user menu entries");
            return report;
        };

        let pixmaps = self.settings.source.pixmaps_dir();
        for (icon, dest) in ICONS {
            let dest = share.join(dest);
            let result = deploy::copy_file(&pixmaps.join(icon), &dest, FILE_MODE);
            report.record_created(&dest, result);
        }

        let date = chrono::Local::now().format("%Y-%m-%d").to_string();
        let values = [
            ("MARKER", self.settings.marker.clone()),
            ("VERSION", self.settings.version.clone()),
            ("DATE", date),
        ];
        Self::write_filled(
            &mut report,
            templates,
            METAINFO,
            &share.join(METAINFO_DEST),
            &values,
        );
        report
    }

    fn create_desktop_entry(
        &self,
        placement: &Placement,
        templates: &Templates,
    ) -> IntegrationReport {
        let mut report = IntegrationReport::default();
        let Some(share) = self.share_dir(placement) else {
            report.skip("no home directory for per-user desktop entries");
            return report;
        };

        let values = self.desktop_values(placement);
        for name in DESKTOP_FILES {
            let dest = share.join("applications").join(name);
            Self::write_filled(&mut report, templates, name, &dest, &values);
        }
        report
    }

    fn remove_all(
        &self,
        placement: &Placement,
        bin_dirs: &[PathBuf],
        _recorded: &BTreeMap<String, String>,
    ) -> IntegrationReport {
        let mut report = IntegrationReport::default();
        remove_launchers(self, bin_dirs, &mut report);

        for share in self.cleanup_share_dirs(placement) {
            for (_, dest) in ICONS {
                report.remove_file(&share.join(dest));
            }
            report.remove_file(&share.join(METAINFO_DEST));
            report.remove_file(&share.join("appdata").join(METAINFO));
            for name in DESKTOP_FILES {
                report.remove_file(&share.join("applications").join(name));
            }
        }
        tracing::debug!(
            "Removed {} {} integration files",
            report.removed.len(),
            APP_NAME
        );
        report
    }
}
