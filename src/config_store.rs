//! Installed configuration artifact
//!
//! After deployment the installer writes `app7config.json` into the module
//! directory. The installed application reads it to find its resources, and
//! later installer runs read it to find what a previous install placed.
//!
//! The artifact records the *natural* layout: where files live at run time,
//! not where a staged install physically wrote them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::layout::{PathLayout, ResolveError, Role};

/// File name of the artifact inside the module directory
pub const CONFIG_ARTIFACT_NAME: &str = "app7config.json";

/// Extra key holding the macOS application bundle directory
pub const EXTRA_MAC_BUNDLE_PATH: &str = "macAppBundlePath";

/// Extra key holding the macOS application bundle name
pub const EXTRA_MAC_BUNDLE_NAME: &str = "macAppBundleName";

/// Lookup of a name that is neither a role nor a recorded extra
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("\"{name}\" is not a valid configuration value")]
pub struct UnknownRoleError {
    pub name: String,
}

#[derive(Error, Debug)]
pub enum ConfigStoreError {
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("malformed configuration artifact: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("incomplete configuration artifact: {0}")]
    Incomplete(#[from] ResolveError),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Values stored alongside the role paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigExtras {
    /// Names of the installed API files
    pub apis: Vec<String>,
    /// Platform specific values
    pub values: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Artifact {
    paths: BTreeMap<Role, PathBuf>,
    #[serde(default)]
    apis: Vec<String>,
    #[serde(default)]
    extras: BTreeMap<String, String>,
}

/// A loaded configuration artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledConfig {
    layout: PathLayout,
    apis: Vec<String>,
    extras: BTreeMap<String, String>,
}

impl InstalledConfig {
    /// Path recorded for the role called `name`
    pub fn get(&self, name: &str) -> Result<&Path, UnknownRoleError> {
        Role::from_str(name)
            .map(|role| self.layout.get(role))
            .map_err(|_| UnknownRoleError {
                name: name.to_string(),
            })
    }

    /// Platform extra recorded under `name`
    pub fn extra(&self, name: &str) -> Result<&str, UnknownRoleError> {
        self.extras
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| UnknownRoleError {
                name: name.to_string(),
            })
    }

    pub fn layout(&self) -> &PathLayout {
        &self.layout
    }

    pub fn apis(&self) -> &[String] {
        &self.apis
    }

    /// Every platform extra that was recorded
    pub fn extras(&self) -> &BTreeMap<String, String> {
        &self.extras
    }
}

/// What a damaged or older-format artifact still records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedPaths {
    pub paths: BTreeMap<Role, PathBuf>,
    pub apis: Vec<String>,
    pub extras: BTreeMap<String, String>,
}

impl RecordedPaths {
    /// The recorded roles, with `fallback` standing in for the missing ones
    pub fn complete(&self, fallback: &PathLayout) -> Result<PathLayout, ResolveError> {
        let mut entries = fallback.to_entries();
        entries.extend(self.paths.iter().map(|(role, path)| (*role, path.clone())));
        PathLayout::from_entries(&entries)
    }
}

/// Serialize a layout and its extras
pub fn save(layout: &PathLayout, extras: &ConfigExtras) -> Result<String, ConfigStoreError> {
    let mut apis = extras.apis.clone();
    apis.sort();
    apis.dedup();

    let artifact = Artifact {
        paths: layout.to_entries(),
        apis,
        extras: extras.values.clone(),
    };
    serde_json::to_string_pretty(&artifact).map_err(ConfigStoreError::Serialize)
}

/// Parse an artifact; unknown or missing roles are rejected
pub fn load(text: &str) -> Result<InstalledConfig, ConfigStoreError> {
    let artifact: Artifact = serde_json::from_str(text).map_err(ConfigStoreError::Malformed)?;
    Ok(InstalledConfig {
        layout: PathLayout::from_entries(&artifact.paths)?,
        apis: artifact.apis,
        extras: artifact.extras,
    })
}

/// Salvage what [`load`] rejects: known roles with absolute paths, API
/// names and string extras. `None` if the text is not a JSON object.
pub fn load_partial(text: &str) -> Option<RecordedPaths> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;
    let section = |key: &str| object.get(key).and_then(serde_json::Value::as_object);

    let paths = section("paths")
        .into_iter()
        .flatten()
        .filter_map(|(name, path)| {
            let role = Role::from_str(name).ok()?;
            let path = PathBuf::from(path.as_str()?);
            path.is_absolute().then_some((role, path))
        })
        .collect();
    let apis = object
        .get("apis")
        .and_then(serde_json::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|api| api.as_str().map(String::from))
        .collect();
    let extras = section("extras")
        .into_iter()
        .flatten()
        .filter_map(|(key, value)| Some((key.clone(), value.as_str()?.to_string())))
        .collect();

    Some(RecordedPaths {
        paths,
        apis,
        extras,
    })
}

/// Location of the artifact for a layout
pub fn artifact_path(layout: &PathLayout) -> PathBuf {
    layout.get(Role::ModuleDir).join(CONFIG_ARTIFACT_NAME)
}

/// Write `natural` (and extras) into `target_dir`
pub fn write_artifact(
    target_dir: &Path,
    natural: &PathLayout,
    extras: &ConfigExtras,
) -> Result<PathBuf, ConfigStoreError> {
    let text = save(natural, extras)?;
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ConfigStoreError::Io { path, source }
    };

    fs::create_dir_all(target_dir).map_err(io_err(target_dir))?;
    let path = target_dir.join(CONFIG_ARTIFACT_NAME);
    fs::write(&path, format!("{}\n", text)).map_err(io_err(&path))?;
    tracing::debug!("Wrote configuration artifact {}", path.display());
    Ok(path)
}

/// Read the artifact at `path`; an absent file is `Ok(None)`
pub fn read_artifact(path: &Path) -> Result<Option<InstalledConfig>, ConfigStoreError> {
    match fs::read_to_string(path) {
        Ok(text) => load(&text).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigStoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Read the artifact at `path` with [`load_partial`]
pub fn salvage_artifact(path: &Path) -> Option<RecordedPaths> {
    fs::read_to_string(path)
        .ok()
        .and_then(|text| load_partial(&text))
}

/// Remove the artifact at `path`; absence is success
pub fn remove_artifact(path: &Path) -> Result<bool, ConfigStoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(ConfigStoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{resolve, ResolverInput};
    use strum::IntoEnumIterator;
    use tempfile::TempDir;

    fn layout() -> PathLayout {
        resolve(&ResolverInput {
            module_dir: PathBuf::from("/usr/lib/app"),
            bin_dir: PathBuf::from("/usr/bin"),
            api_dir: None,
        })
        .unwrap()
    }

    #[test]
    fn test_round_trip_every_role() {
        let layout = layout();
        let text = save(&layout, &ConfigExtras::default()).unwrap();
        let loaded = load(&text).unwrap();
        for role in Role::iter() {
            assert_eq!(loaded.get(role.as_ref()).unwrap(), layout.get(role));
        }
        assert_eq!(loaded.layout(), &layout);
    }

    #[test]
    fn test_unknown_role_lookup() {
        let loaded = load(&save(&layout(), &ConfigExtras::default()).unwrap()).unwrap();
        let err = loaded.get("not-a-role").unwrap_err();
        assert_eq!(err.name, "not-a-role");
        assert_eq!(
            err.to_string(),
            "\"not-a-role\" is not a valid configuration value"
        );
    }

    #[test]
    fn test_extras_and_apis() {
        let mut extras = ConfigExtras {
            apis: vec!["Python3.api".into(), "MicroPython.api".into(), "Python3.api".into()],
            values: BTreeMap::new(),
        };
        extras
            .values
            .insert(EXTRA_MAC_BUNDLE_NAME.to_string(), "app7.app".to_string());

        let loaded = load(&save(&layout(), &extras).unwrap()).unwrap();
        assert_eq!(loaded.apis(), ["MicroPython.api", "Python3.api"]);
        assert_eq!(loaded.extra(EXTRA_MAC_BUNDLE_NAME).unwrap(), "app7.app");
        assert!(loaded.extra(EXTRA_MAC_BUNDLE_PATH).is_err());
    }

    #[test]
    fn test_load_is_strict() {
        let text = save(&layout(), &ConfigExtras::default()).unwrap();

        let mut value: serde_json::Value = serde_json::from_str(&text).unwrap();
        value["paths"]["ericDir"] = serde_json::json!("/x");
        assert!(matches!(
            load(&value.to_string()),
            Err(ConfigStoreError::Malformed(_))
        ));

        let mut value: serde_json::Value = serde_json::from_str(&text).unwrap();
        value["paths"].as_object_mut().unwrap().remove("apiDir");
        assert!(matches!(
            load(&value.to_string()),
            Err(ConfigStoreError::Incomplete(_))
        ));

        assert!(load("not json").is_err());
    }

    #[test]
    fn test_partial_load_salvages_known_roles() {
        let text = r#"{
            "paths": {"appDir": "/opt/old/app7", "binDir": "/opt/old/bin", "ericDir": "/x", "docDir": "relative"},
            "apis": ["Python3.api", 3],
            "extras": {"macAppBundleName": "Old.app"},
            "version": 5
        }"#;
        assert!(load(text).is_err());

        let recorded = load_partial(text).unwrap();
        assert_eq!(
            recorded.paths.keys().copied().collect::<Vec<_>>(),
            vec![Role::AppDir, Role::BinDir]
        );
        assert_eq!(recorded.apis, ["Python3.api"]);
        assert_eq!(recorded.extras[EXTRA_MAC_BUNDLE_NAME], "Old.app");

        let completed = recorded.complete(&layout()).unwrap();
        assert_eq!(completed.get(Role::BinDir), Path::new("/opt/old/bin"));
        assert_eq!(completed.get(Role::DocDir), layout().get(Role::DocDir));

        assert!(load_partial("not json").is_none());
        assert!(load_partial("[1, 2]").is_none());
        assert_eq!(load_partial("{}"), Some(RecordedPaths::default()));
    }

    #[test]
    fn test_write_read_remove() {
        let dir = TempDir::new().unwrap();
        let written = write_artifact(dir.path(), &layout(), &ConfigExtras::default()).unwrap();
        assert_eq!(written, dir.path().join(CONFIG_ARTIFACT_NAME));

        let loaded = read_artifact(&written).unwrap().unwrap();
        assert_eq!(loaded.layout(), &layout());

        assert!(remove_artifact(&written).unwrap());
        assert!(!remove_artifact(&written).unwrap());
        assert!(read_artifact(&written).unwrap().is_none());
    }

    #[test]
    fn test_artifact_path_is_in_module_dir() {
        assert_eq!(
            artifact_path(&layout()),
            PathBuf::from("/usr/lib/app/app7config.json")
        );
    }
}
