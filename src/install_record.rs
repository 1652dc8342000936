//! Record of how app7 was installed, kept next to the installed package

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{InstallerError, Result};

pub const INSTALL_RECORD_NAME: &str = "app7install.json";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Whether the record was produced by this installer or reconstructed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFlags {
    pub guessed: bool,
    pub edited: bool,
    pub package_manager: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRecord {
    pub timestamp: String,
    pub user: String,
    pub elevated: bool,
    pub interpreter: PathBuf,
    /// Invocation, shell-quoted
    pub argv: String,
    pub working_dir: PathBuf,
    pub app_dir: PathBuf,
    /// The application directory lives below the user's home
    pub virtualenv: bool,
    pub installed: bool,
    pub flags: RecordFlags,
    pub remarks: String,
}

impl InstallRecord {
    /// Describe the running installation of `app_dir`
    pub fn capture(interpreter: &Path, app_dir: &Path, elevated: bool) -> Self {
        let argv: Vec<String> = std::env::args().collect();
        let virtualenv = dirs::home_dir().is_some_and(|home| app_dir.starts_with(home));
        Self {
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            user: crate::sanity::invoking_user(),
            elevated,
            interpreter: interpreter.to_path_buf(),
            argv: quote_args(&argv),
            working_dir: std::env::current_dir().unwrap_or_default(),
            app_dir: app_dir.to_path_buf(),
            virtualenv,
            installed: true,
            flags: RecordFlags::default(),
            remarks: String::new(),
        }
    }

    /// Write the record into `dir`, replacing any previous one
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(INSTALL_RECORD_NAME);
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| InstallerError::general(format!("Cannot serialize install record: {}", e)))?;
        fs::write(&path, format!("{}\n", text))
            .map_err(|e| InstallerError::filesystem("writing", &path, e))?;
        tracing::debug!("Wrote install record {}", path.display());
        Ok(path)
    }

    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(INSTALL_RECORD_NAME);
        let text =
            fs::read_to_string(&path).map_err(|e| InstallerError::filesystem("reading", &path, e))?;
        serde_json::from_str(&text).map_err(|e| {
            InstallerError::general(format!("Invalid install record {}: {}", path.display(), e))
        })
    }
}

/// Join arguments so a POSIX shell splits them back identically
pub fn quote_args(args: &[String]) -> String {
    args.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r#"'"'"'"#))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("-d"), "-d");
        assert_eq!(shell_quote("/usr/lib"), "/usr/lib");
        assert_eq!(shell_quote("my dir"), "'my dir'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), r#"'it'"'"'s'"#);
    }

    #[test]
    fn test_quote_args() {
        let args = vec!["app7-install".to_string(), "-d".into(), "/a b".into()];
        assert_eq!(quote_args(&args), "app7-install -d '/a b'");
    }

    #[test]
    fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let record = InstallRecord::capture(Path::new("/usr/bin/python3"), tmp.path(), false);
        assert!(record.installed);
        assert_eq!(record.timestamp.len(), 19);

        let path = record.write(tmp.path()).unwrap();
        assert_eq!(path, tmp.path().join(INSTALL_RECORD_NAME));

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"workingDir\""));
        assert!(text.contains("\"packageManager\": false"));
        assert_eq!(InstallRecord::read(tmp.path()).unwrap(), record);
    }

    #[test]
    fn test_write_overwrites() {
        let tmp = TempDir::new().unwrap();
        let mut record = InstallRecord::capture(Path::new("python3"), tmp.path(), false);
        record.write(tmp.path()).unwrap();
        record.remarks = "second".into();
        record.write(tmp.path()).unwrap();
        assert_eq!(InstallRecord::read(tmp.path()).unwrap().remarks, "second");
    }

    #[test]
    fn test_write_into_missing_dir_fails() {
        let tmp = TempDir::new().unwrap();
        let record = InstallRecord::capture(Path::new("python3"), tmp.path(), false);
        let err = record.write(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, InstallerError::Filesystem { .. }));
    }
}
