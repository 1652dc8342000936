//! The capabilities app7 depends on

use super::{DependencySpec, HostRange, Requirement};
use crate::platform::Platform;
use crate::version::Version;

/// Interpreter versions app7 runs on
pub const fn default_host_range() -> HostRange {
    HostRange {
        minimum: Version::new(3, 7, 0),
        maximum: Version::new(3, 12, 0),
    }
}

/// Toolkit modules that ship with the Qt bindings and cannot be installed
/// separately
const BASE_MODULES: &[&str] = &[
    "PyQt6.QtGui",
    "PyQt6.QtNetwork",
    "PyQt6.QtPrintSupport",
    "PyQt6.QtSql",
    "PyQt6.QtSvg",
    "PyQt6.QtSvgWidgets",
    "PyQt6.QtWidgets",
];

/// Pure-Python libraries installed on demand
const REQUIRED_LIBRARIES: &[&str] = &[
    "tomlkit",
    "asttokens",
    "EditorConfig",
    "Send2Trash",
    "pyenchant",
    "wheel",
    "parso",
    "jedi",
    "packaging",
    "pipdeptree",
    "cyclonedx-python-lib",
    "cyclonedx-bom",
    "trove-classifiers",
    "black",
    "isort",
    "coverage",
    "pycodestyle",
    "pyflakes",
    "pyyaml",
];

/// Known broken releases, by dependency name
const BLACKLIST: &[(&str, &[Version])] = &[("sip", &[]), ("PyQt6", &[]), ("QScintilla", &[])];

/// Known broken releases on one platform only
const PLATFORM_BLACKLIST: &[(Platform, &str, &[Version])] = &[];

fn with_blacklists(spec: DependencySpec) -> DependencySpec {
    let name = spec.name.clone();
    let spec = BLACKLIST
        .iter()
        .filter(|(listed, _)| *listed == name)
        .fold(spec, |spec, (_, versions)| {
            spec.with_blacklisted(versions.iter().copied())
        });
    PLATFORM_BLACKLIST
        .iter()
        .filter(|(_, listed, _)| *listed == name)
        .fold(spec, |spec, (platform, _, versions)| {
            spec.with_platform_blacklisted(*platform, versions.iter().copied())
        })
}

/// Ordered dependency list; `with_tools` adds the Qt designer tools
pub fn default_dependencies(with_tools: bool) -> Vec<DependencySpec> {
    let mut specs = vec![DependencySpec::module(
        "XML support",
        Requirement::Host,
        "xml.etree.ElementTree",
        None,
    )];

    specs.push(
        DependencySpec::module(
            "PyQt6",
            Requirement::Required,
            "PyQt6.QtCore",
            Some("PYQT_VERSION_STR"),
        )
        .with_min_version(Version::new(6, 2, 0)),
    );
    specs.push(
        DependencySpec::module(
            "sip",
            Requirement::Required,
            "PyQt6.sip",
            Some("SIP_VERSION_STR"),
        )
        .with_package("PyQt6-sip")
        .with_min_version(Version::new(6, 1, 0)),
    );
    specs.push(
        DependencySpec::module(
            "QScintilla",
            Requirement::Required,
            "PyQt6.Qsci",
            Some("QSCINTILLA_VERSION_STR"),
        )
        .with_package("PyQt6-QScintilla")
        .with_min_version(Version::new(2, 13, 0)),
    );

    specs.extend(
        BASE_MODULES
            .iter()
            .map(|module| DependencySpec::module(*module, Requirement::Base, module, None)),
    );

    specs.push(
        DependencySpec::module(
            "PyQt6-Charts",
            Requirement::Optional,
            "PyQt6.QtCharts",
            Some("PYQT_CHART_VERSION_STR"),
        )
        .with_min_version(Version::new(6, 2, 0)),
    );
    specs.push(
        DependencySpec::module(
            "PyQt6-WebEngine",
            Requirement::Optional,
            "PyQt6.QtWebEngineCore",
            Some("PYQT_WEBENGINE_VERSION_STR"),
        )
        .with_min_version(Version::new(6, 2, 0)),
    );

    specs.extend(
        REQUIRED_LIBRARIES
            .iter()
            .map(|name| DependencySpec::registry(*name, Requirement::Required)),
    );
    specs.push(DependencySpec::registry("docutils", Requirement::Optional));
    specs.push(DependencySpec::registry("Markdown", Requirement::Optional));

    if with_tools {
        specs.push(DependencySpec::registry("qt6-applications", Requirement::Required));
    }

    specs.into_iter().map(with_blacklists).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let specs = default_dependencies(true);
        let names: HashSet<_> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), specs.len());
    }

    #[test]
    fn test_host_capability_is_checked_first() {
        let specs = default_dependencies(false);
        assert_eq!(specs[0].requirement, Requirement::Host);
    }

    #[test]
    fn test_with_tools_adds_designer() {
        let without = default_dependencies(false);
        let with = default_dependencies(true);
        assert_eq!(with.len(), without.len() + 1);
        assert!(with.iter().any(|s| s.name == "qt6-applications"));
    }

    #[test]
    fn test_minimum_versions() {
        let specs = default_dependencies(false);
        let minimum = |name: &str| {
            specs
                .iter()
                .find(|s| s.name == name)
                .and_then(|s| s.min_version)
        };
        assert_eq!(minimum("PyQt6"), Some(Version::new(6, 2, 0)));
        assert_eq!(minimum("sip"), Some(Version::new(6, 1, 0)));
        assert_eq!(minimum("QScintilla"), Some(Version::new(2, 13, 0)));
        assert_eq!(minimum("PyQt6-Charts"), Some(Version::new(6, 2, 0)));
        assert_eq!(minimum("PyQt6-WebEngine"), Some(Version::new(6, 2, 0)));
    }

    #[test]
    fn test_no_release_is_blacklisted() {
        for spec in default_dependencies(true) {
            assert!(spec.blacklist.is_empty(), "{}", spec.name);
            assert!(spec.platform_blacklist.is_empty(), "{}", spec.name);
        }
    }

    #[test]
    fn test_host_range() {
        let range = default_host_range();
        assert!(range.contains(Version::new(3, 7, 0)));
        assert!(range.contains(Version::new(3, 11, 9)));
        assert!(!range.contains(Version::new(3, 12, 0)));
        assert!(!range.contains(Version::new(3, 6, 15)));
    }
}
