//! Version codec
//!
//! Versions are ordered triples of byte-sized components packed into a single
//! integer, most significant component first. Comparing two packed values is
//! the same as comparing the triples lexicographically.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest value a single component can hold
pub const MAX_COMPONENT: u32 = 0xFF;

/// Number of components in a version
pub const COMPONENTS: usize = 3;

/// Errors raised while building or parsing a version
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// A component does not fit in a byte
    #[error("version component {component} is out of range (0-255)")]
    Range { component: String },

    /// The textual form is not a dotted list of one to three numbers
    #[error("invalid version '{input}': {reason}")]
    Format { input: String, reason: &'static str },
}

/// A packed `major.minor.patch` version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(u32);

impl Version {
    /// Build a version from components known to fit in a byte
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self(((major as u32) << 16) | ((minor as u32) << 8) | patch as u32)
    }

    /// Pack three components, rejecting any above 255
    pub fn encode(major: u32, minor: u32, patch: u32) -> Result<Self, VersionError> {
        let mut packed = 0u32;
        for component in [major, minor, patch] {
            if component > MAX_COMPONENT {
                return Err(VersionError::Range {
                    component: component.to_string(),
                });
            }
            packed = (packed << 8) | component;
        }
        Ok(Self(packed))
    }

    /// Unpack into `[major, minor, patch]`; always three components
    pub const fn decode(self) -> [u32; COMPONENTS] {
        [
            (self.0 >> 16) & MAX_COMPONENT,
            (self.0 >> 8) & MAX_COMPONENT,
            self.0 & MAX_COMPONENT,
        ]
    }

    /// The packed integer form
    #[inline]
    pub const fn packed(self) -> u32 {
        self.0
    }

    /// Integer comparison of the packed forms
    #[inline]
    pub fn compare(self, other: Self) -> Ordering {
        self.0.cmp(&other.0)
    }

    /// Parse `major[.minor[.patch]]`, padding missing components with zeros
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let format_error = |reason| VersionError::Format {
            input: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(format_error("empty version string"));
        }

        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() > COMPONENTS {
            return Err(format_error("more than three components"));
        }

        let mut components = [0u32; COMPONENTS];
        for (slot, part) in components.iter_mut().zip(&parts) {
            if part.is_empty() {
                return Err(format_error("empty component"));
            }
            if !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format_error("non-numeric component"));
            }
            // All digits: the only way this fails is overflow, which is out of range anyway
            *slot = part.parse::<u32>().map_err(|_| VersionError::Range {
                component: (*part).to_string(),
            })?;
        }

        Self::encode(components[0], components[1], components[2])
    }

    /// Interpret a version string reported by installed software.
    ///
    /// Development builds (`dev`, `snapshot`) cannot be compared and yield
    /// `None`; they are assumed to be new enough. Otherwise the leading
    /// numeric dotted prefix is used, so `6.5.1.post2` reads as `6.5.1`.
    pub fn parse_reported(reported: &str) -> Option<Self> {
        let reported = reported.trim();
        let lowered = reported.to_ascii_lowercase();
        if lowered.contains("dev") || lowered.contains("snapshot") {
            return None;
        }

        let token = reported.split_whitespace().next()?;
        let token = token.strip_prefix('v').unwrap_or(token);
        let numeric: Vec<&str> = token
            .split('.')
            .take_while(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
            .take(COMPONENTS)
            .collect();
        if numeric.is_empty() {
            return None;
        }
        Self::parse(&numeric.join(".")).ok()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [major, minor, patch] = self.decode();
        write!(f, "{}.{}.{}", major, minor, patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let v = Version::encode(6, 2, 1).unwrap();
        assert_eq!(v.decode(), [6, 2, 1]);
        assert_eq!(v.packed(), 0x060201);
        assert_eq!(Version::new(6, 2, 1), v);
    }

    #[test]
    fn test_encode_rejects_out_of_range() {
        let err = Version::encode(1, 256, 0).unwrap_err();
        assert_eq!(
            err,
            VersionError::Range {
                component: "256".to_string()
            }
        );
    }

    #[test]
    fn test_compare() {
        let a: Version = "1.2.0".parse().unwrap();
        let b: Version = "1.2.1".parse().unwrap();
        assert_eq!(a.compare(b), Ordering::Less);

        let c: Version = "2.0.0".parse().unwrap();
        let d: Version = "1.9.9".parse().unwrap();
        assert_eq!(c.compare(d), Ordering::Greater);
        assert!(c > d);
    }

    #[test]
    fn test_parse_pads_short_versions() {
        assert_eq!(Version::parse("6").unwrap(), Version::new(6, 0, 0));
        assert_eq!(Version::parse("6.5").unwrap(), Version::new(6, 5, 0));
        assert_eq!(Version::parse(" 2.13.4 ").unwrap(), Version::new(2, 13, 4));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in ["", "   ", "1..2", "1.2.3.4", "a.b", "1.2-beta", ".1", "1."] {
            assert!(
                matches!(Version::parse(input), Err(VersionError::Format { .. })),
                "{:?} should be a format error",
                input
            );
        }
        assert!(matches!(
            Version::parse("1.300"),
            Err(VersionError::Range { .. })
        ));
        assert!(matches!(
            Version::parse("99999999999999999999"),
            Err(VersionError::Range { .. })
        ));
    }

    #[test]
    fn test_display_always_three_components() {
        assert_eq!(Version::parse("3").unwrap().to_string(), "3.0.0");
        assert_eq!(Version::new(0, 0, 0).to_string(), "0.0.0");
    }

    #[test]
    fn test_parse_reported() {
        assert_eq!(Version::parse_reported("6.5.1"), Some(Version::new(6, 5, 1)));
        assert_eq!(
            Version::parse_reported("6.5.1.post2"),
            Some(Version::new(6, 5, 1))
        );
        assert_eq!(Version::parse_reported("2.14"), Some(Version::new(2, 14, 0)));
        assert_eq!(Version::parse_reported("v1.2.3 (build)"), Some(Version::new(1, 2, 3)));
        assert_eq!(Version::parse_reported("6.6.0.dev2403"), None);
        assert_eq!(Version::parse_reported("snapshot-6.5"), None);
        assert_eq!(Version::parse_reported(""), None);
        assert_eq!(Version::parse_reported("unknown"), None);
    }

    #[test]
    fn test_serde_uses_string_form() {
        let v = Version::new(1, 3, 0);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"1.3.0\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert!(serde_json::from_str::<Version>("\"1.x\"").is_err());
    }
}
