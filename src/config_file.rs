//! External path configuration file.
//!
//! A path configuration is a JSON object whose keys are exactly the role
//! names (`appDir`, `binDir`, ...) and whose values are absolute paths.
//! Anything else, including missing or extra keys and non-string values,
//! is rejected before any installation work starts.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::layout::{PathLayout, ResolveError, Role};

/// Errors raised while reading a path configuration file
#[derive(Error, Debug)]
pub enum ConfigFormatError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config file {} must contain a JSON object", path.display())]
    NotAnObject { path: PathBuf },

    #[error("config file {} has unknown keys: {}", path.display(), keys.join(", "))]
    UnknownKeys { path: PathBuf, keys: Vec<String> },

    #[error("config file {} is missing keys: {}", path.display(), keys.join(", "))]
    MissingKeys { path: PathBuf, keys: Vec<String> },

    #[error("config file {}: value of '{key}' must be a string", path.display())]
    NotAString { path: PathBuf, key: String },

    #[error("config file {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: ResolveError,
    },
}

/// Role paths read from a configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConfig {
    origin: PathBuf,
    entries: BTreeMap<Role, PathBuf>,
}

impl PathConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigFormatError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigFormatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&content, path)?;
        tracing::debug!("Loaded path configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration text; `origin` is used in error messages only
    pub fn from_json(content: &str, origin: &Path) -> Result<Self, ConfigFormatError> {
        let value: Value =
            serde_json::from_str(content).map_err(|source| ConfigFormatError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
        let Value::Object(object) = value else {
            return Err(ConfigFormatError::NotAnObject {
                path: origin.to_path_buf(),
            });
        };

        let config = Self {
            origin: origin.to_path_buf(),
            entries: collect_entries(&object, origin)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every role is present and every path absolute
    pub fn validate(&self) -> Result<(), ConfigFormatError> {
        let missing: Vec<String> = Role::iter()
            .filter(|role| !self.entries.contains_key(role))
            .map(|role| role.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigFormatError::MissingKeys {
                path: self.origin.clone(),
                keys: missing,
            });
        }

        PathLayout::from_entries(&self.entries)
            .map(|_| ())
            .map_err(|source| ConfigFormatError::Invalid {
                path: self.origin.clone(),
                source,
            })
    }

    /// The configured natural layout
    pub fn to_layout(&self) -> Result<PathLayout, ConfigFormatError> {
        PathLayout::from_entries(&self.entries).map_err(|source| ConfigFormatError::Invalid {
            path: self.origin.clone(),
            source,
        })
    }

    /// Configured path for `role`
    pub fn get(&self, role: Role) -> Option<&Path> {
        self.entries.get(&role).map(PathBuf::as_path)
    }
}

fn collect_entries(
    object: &Map<String, Value>,
    origin: &Path,
) -> Result<BTreeMap<Role, PathBuf>, ConfigFormatError> {
    let unknown: Vec<String> = object
        .keys()
        .filter(|key| Role::from_str(key).is_err())
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(ConfigFormatError::UnknownKeys {
            path: origin.to_path_buf(),
            keys: unknown,
        });
    }

    let mut entries = BTreeMap::new();
    for (key, value) in object {
        let Value::String(text) = value else {
            return Err(ConfigFormatError::NotAString {
                path: origin.to_path_buf(),
                key: key.clone(),
            });
        };
        if let Ok(role) = Role::from_str(key) {
            entries.insert(role, PathBuf::from(text));
        }
    }
    Ok(entries)
}
