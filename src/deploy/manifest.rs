//! Deployment manifest for the app7 source tree

use std::fs;
use std::path::{Path, PathBuf};

use crate::layout::{PathLayout, Role, APP_NAME};

/// Languages whose API files are shipped with the application
pub const API_LANGUAGES: &[&str] = &["MicroPython", "Python3", "QSS"];

/// Documentation files copied from the distribution root (non-fatal)
pub const DOC_FILES: &[&str] = &["LICENSE.GPL3", "THANKS", "changelog.md"];

/// One copy job: a source subtree, its destination and its selectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub source: PathBuf,
    pub dest: PathBuf,
    /// A file is copied only if it matches one of these
    pub filters: Vec<String>,
    /// Absolute directories pruned from the walk at any depth
    pub excluded_subdirs: Vec<PathBuf>,
    /// A file matching one of these is never copied
    pub excluded_globs: Vec<String>,
    /// Failure of an optional job is logged instead of aborting the install
    pub optional: bool,
}

impl ManifestEntry {
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>, filters: &[&str]) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            filters: filters.iter().map(|f| (*f).to_string()).collect(),
            excluded_subdirs: Vec::new(),
            excluded_globs: Vec::new(),
            optional: false,
        }
    }

    pub fn with_excluded_globs(mut self, globs: &[&str]) -> Self {
        self.excluded_globs
            .extend(globs.iter().map(|g| (*g).to_string()));
        self
    }

    pub fn with_excluded_subdirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.excluded_subdirs.extend(dirs);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// True if `dir` is one of the pruned subdirectories
    pub fn is_excluded_dir(&self, dir: &Path) -> bool {
        self.excluded_subdirs.iter().any(|excluded| excluded == dir)
    }
}

/// The application distribution being installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    root: PathBuf,
}

impl SourceTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Distribution root (license, changelog, readme files)
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The application package directory
    pub fn package_dir(&self) -> PathBuf {
        self.root.join(APP_NAME)
    }

    /// Platform integration templates and icons
    pub fn data_dir(&self) -> PathBuf {
        self.package_dir().join("data")
    }

    pub fn pixmaps_dir(&self) -> PathBuf {
        self.package_dir().join("pixmaps")
    }

    /// True if the tree looks like an app7 distribution
    pub fn is_valid(&self) -> bool {
        self.package_dir().join(format!("{}.py", APP_NAME)).is_file()
    }

    /// Documentation files that exist in the distribution root
    pub fn documentation_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = DOC_FILES
            .iter()
            .map(|name| self.root.join(name))
            .filter(|path| path.is_file())
            .collect();

        if let Ok(entries) = fs::read_dir(&self.root) {
            let mut readmes: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.is_file()
                        && path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.starts_with("README"))
                })
                .collect();
            readmes.sort();
            files.extend(readmes);
        }
        files
    }

    /// Directory holding the API files of `language`
    pub fn api_dir(&self, language: &str) -> PathBuf {
        self.package_dir().join("APIs").join(language)
    }

    /// API (`*.api`) and prepared (`*.bas`) files of `language`, sorted
    pub fn api_files(&self, language: &str) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.api_dir(language)) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e == "api" || e == "bas")
            })
            .collect();
        files.sort();
        files
    }

    /// Base names of every shipped `*.api` file, sorted
    pub fn api_names(&self) -> Vec<String> {
        let mut names: Vec<String> = API_LANGUAGES
            .iter()
            .flat_map(|language| self.api_files(language))
            .filter(|path| path.extension().is_some_and(|e| e == "api"))
            .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }
}

/// Copy jobs for the application tree, targeting `layout`
pub fn default_manifest(source: &SourceTree, layout: &PathLayout) -> Vec<ManifestEntry> {
    let pkg = source.package_dir();
    let app_dir = layout.get(Role::AppDir);

    let resource_dirs = [
        "Documentation",
        "CSSs",
        "Styles",
        "Themes",
        "i18n",
        "icons",
        "pixmaps",
        "DesignerTemplates",
        "CodeTemplates",
        "DTDs",
        "Examples",
        "APIs",
        "data",
    ];

    vec![
        ManifestEntry::new(&pkg, app_dir, &["*.py", "*.pyw"])
            .with_excluded_globs(&["app7config.py*"])
            .with_excluded_subdirs(resource_dirs.iter().map(|d| pkg.join(d))),
        ManifestEntry::new(
            pkg.join("Plugins"),
            app_dir.join("Plugins"),
            &["*.svgz", "*.svg", "*.png", "*.style", "*.tmpl", "*.txt"],
        ),
        ManifestEntry::new(
            pkg.join("Documentation"),
            layout.get(Role::DocDir),
            &["*.html", "*.qch"],
        ),
        ManifestEntry::new(pkg.join("CSSs"), layout.get(Role::CssDir), &["*.css"]),
        ManifestEntry::new(
            pkg.join("Styles"),
            layout.get(Role::StylesDir),
            &["*.qss", "*.ehj"],
        ),
        ManifestEntry::new(pkg.join("Themes"), layout.get(Role::ThemesDir), &["*.ethj"]),
        ManifestEntry::new(
            pkg.join("i18n"),
            layout.get(Role::TranslationsDir),
            &["*.qm"],
        ),
        ManifestEntry::new(
            pkg.join("icons"),
            layout.get(Role::IconDir),
            &["*.svg", "*.svgz", "*.png", "LICENSE*.*", "readme.txt"],
        ),
        ManifestEntry::new(
            pkg.join("pixmaps"),
            layout.get(Role::PixDir),
            &["*.svg", "*.svgz", "*.png", "*.xpm", "*.ico", "*.gif", "*.icns"],
        ),
        ManifestEntry::new(
            pkg.join("DesignerTemplates"),
            layout.get(Role::TemplatesDir),
            &["*.tmpl"],
        ),
        ManifestEntry::new(
            pkg.join("CodeTemplates"),
            layout.get(Role::CodeTemplatesDir),
            &["*.tmpl"],
        ),
        ManifestEntry::new(pkg.join("DTDs"), layout.get(Role::DtdDir), &["*.dtd"]),
        ManifestEntry::new(pkg.join("Examples"), layout.get(Role::ExamplesDir), &["*"]).optional(),
        ManifestEntry::new(
            pkg.join("Others"),
            layout.get(Role::OthersDir),
            &["*.txt", "*.md", "*.html"],
        )
        .optional(),
    ]
}
