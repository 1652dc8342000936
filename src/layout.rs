//! Path roles and layout resolution
//!
//! A [`PathLayout`] maps every [`Role`] to exactly one absolute path. Layouts
//! are produced only by [`resolve`] (from base directories) or by
//! [`PathLayout::from_entries`] (from a complete role map), and can be
//! redirected as a whole under an install prefix for staged installs.
//!
//! # Design Principles
//!
//! - **Total**: every role is always present; lookups cannot fail
//! - **Uniform**: a prefix applies to every role or to none
//! - **Lexical**: normalization never touches the filesystem

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use thiserror::Error;

/// Name of the application directory created under the module directory
pub const APP_NAME: &str = "app7";

/// Number of path roles
pub const ROLE_COUNT: usize = 16;

/// Named slot for an installation location
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
#[repr(usize)]
pub enum Role {
    AppDir = 0,
    PixDir,
    IconDir,
    DtdDir,
    CssDir,
    StylesDir,
    ThemesDir,
    DocDir,
    ExamplesDir,
    TranslationsDir,
    TemplatesDir,
    CodeTemplatesDir,
    OthersDir,
    BinDir,
    ModuleDir,
    ApiDir,
}

impl Role {
    /// Position of this role inside a layout
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Subdirectory of the application directory this role lives in, if any
    pub const fn app_subdir(self) -> Option<&'static str> {
        match self {
            Self::PixDir => Some("pixmaps"),
            Self::IconDir => Some("icons"),
            Self::DtdDir => Some("DTDs"),
            Self::CssDir => Some("CSSs"),
            Self::StylesDir => Some("Styles"),
            Self::ThemesDir => Some("Themes"),
            Self::DocDir => Some("Documentation"),
            Self::ExamplesDir => Some("Examples"),
            Self::TranslationsDir => Some("i18n"),
            Self::TemplatesDir => Some("DesignerTemplates"),
            Self::CodeTemplatesDir => Some("CodeTemplates"),
            _ => None,
        }
    }

    /// Roles whose directories hold only installed content and are removed
    /// wholesale on cleanup. Translations may share a directory with other
    /// applications and are removed file by file instead.
    pub fn tree_roles() -> impl Iterator<Item = Role> {
        Role::iter().filter(|role| {
            *role != Role::TranslationsDir
                && (role.app_subdir().is_some() || matches!(role, Role::AppDir | Role::OthersDir))
        })
    }
}

/// Errors raised while resolving a layout
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A base directory or configured path is not absolute
    #[error("{role} path must be absolute, got '{}'", path.display())]
    RelativePath { role: String, path: PathBuf },

    /// The install prefix is not absolute
    #[error("install prefix must be absolute, got '{}'", .0.display())]
    RelativePrefix(PathBuf),

    /// A role map is missing entries
    #[error("missing roles: {}", .0.join(", "))]
    MissingRoles(Vec<String>),
}

/// Complete mapping from role to absolute path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    paths: [PathBuf; ROLE_COUNT],
}

impl PathLayout {
    fn from_fn(mut f: impl FnMut(Role) -> PathBuf) -> Self {
        let mut roles = Role::iter();
        Self {
            paths: std::array::from_fn(|_| roles.next().map(&mut f).unwrap_or_default()),
        }
    }

    /// Build a layout from an explicit role map.
    ///
    /// Every role must be present and every path absolute.
    pub fn from_entries(entries: &BTreeMap<Role, PathBuf>) -> Result<Self, ResolveError> {
        let missing: Vec<String> = Role::iter()
            .filter(|role| !entries.contains_key(role))
            .map(|role| role.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ResolveError::MissingRoles(missing));
        }

        for (role, path) in entries {
            require_absolute(&role.to_string(), path)?;
        }

        Ok(Self::from_fn(|role| {
            entries.get(&role).map(|p| normalize(p)).unwrap_or_default()
        }))
    }

    /// Path assigned to `role`
    #[inline]
    pub fn get(&self, role: Role) -> &Path {
        &self.paths[role.index()]
    }

    /// All `(role, path)` pairs in role order
    pub fn iter(&self) -> impl Iterator<Item = (Role, &Path)> {
        Role::iter().zip(self.paths.iter().map(PathBuf::as_path))
    }

    /// Role map suitable for serialization
    pub fn to_entries(&self) -> BTreeMap<Role, PathBuf> {
        self.iter().map(|(role, path)| (role, path.to_path_buf())).collect()
    }

    /// Rewrite every role as `prefix + path`, keeping the original path
    /// structure below the prefix.
    pub fn redirect(&self, prefix: &Path) -> Result<Self, ResolveError> {
        if !prefix.is_absolute() {
            return Err(ResolveError::RelativePrefix(prefix.to_path_buf()));
        }
        Ok(Self::from_fn(|role| reroot(prefix, self.get(role))))
    }

    /// True if every role lies below `prefix`
    pub fn is_under(&self, prefix: &Path) -> bool {
        self.paths.iter().all(|p| p.starts_with(prefix))
    }
}

/// Base directories the layout is derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverInput {
    pub module_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub api_dir: Option<PathBuf>,
}

/// Derive the natural layout from the base directories.
///
/// Pure and deterministic; fails only on relative inputs.
pub fn resolve(input: &ResolverInput) -> Result<PathLayout, ResolveError> {
    require_absolute("moduleDir", &input.module_dir)?;
    require_absolute("binDir", &input.bin_dir)?;
    if let Some(api_dir) = &input.api_dir {
        require_absolute("apiDir", api_dir)?;
    }

    let module_dir = normalize(&input.module_dir);
    let app_dir = module_dir.join(APP_NAME);
    let api_dir = input
        .api_dir
        .as_deref()
        .map(normalize)
        .unwrap_or_else(|| app_dir.join("api"));

    Ok(PathLayout::from_fn(|role| match role {
        Role::AppDir | Role::OthersDir => app_dir.clone(),
        Role::BinDir => normalize(&input.bin_dir),
        Role::ModuleDir => module_dir.clone(),
        Role::ApiDir => api_dir.clone(),
        other => other
            .app_subdir()
            .map(|sub| app_dir.join(sub))
            .unwrap_or_else(|| app_dir.clone()),
    }))
}

/// The layout pair of one run: where things live at run time (`natural`)
/// and where they are physically written (`target`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub natural: PathLayout,
    pub target: PathLayout,
    pub prefix: Option<PathBuf>,
}

impl Placement {
    /// Pair a natural layout with its redirection under `prefix`, if any
    pub fn new(natural: PathLayout, prefix: Option<&Path>) -> Result<Self, ResolveError> {
        let target = match prefix {
            Some(prefix) => natural.redirect(prefix)?,
            None => natural.clone(),
        };
        Ok(Self {
            natural,
            target,
            prefix: prefix.map(normalize),
        })
    }

    /// Re-root an arbitrary natural path the same way the target layout was
    pub fn target_path(&self, natural: &Path) -> PathBuf {
        match &self.prefix {
            Some(prefix) => reroot(prefix, natural),
            None => natural.to_path_buf(),
        }
    }
}

fn require_absolute(role: &str, path: &Path) -> Result<(), ResolveError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(ResolveError::RelativePath {
            role: role.to_string(),
            path: path.to_path_buf(),
        })
    }
}

/// Place `path` below `prefix`, dropping its root (and drive on Windows)
pub fn reroot(prefix: &Path, path: &Path) -> PathBuf {
    let relative: PathBuf = normalize(path)
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    normalize(&prefix.join(relative))
}

/// Resolve `.` and `..` lexically
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(module: &str) -> ResolverInput {
        ResolverInput {
            module_dir: PathBuf::from(module),
            bin_dir: PathBuf::from("/usr/bin"),
            api_dir: None,
        }
    }

    // =========================================================================
    // Role Tests
    // =========================================================================

    #[test]
    fn test_role_names() {
        assert_eq!(Role::AppDir.to_string(), "appDir");
        assert_eq!(Role::CodeTemplatesDir.to_string(), "codeTemplatesDir");
        assert_eq!(Role::DtdDir.as_ref(), "dtdDir");
        assert_eq!("translationsDir".parse::<Role>().unwrap(), Role::TranslationsDir);
        assert!("bogusDir".parse::<Role>().is_err());
        assert_eq!(Role::iter().count(), ROLE_COUNT);
    }

    #[test]
    fn test_role_index_matches_iteration_order() {
        for (i, role) in Role::iter().enumerate() {
            assert_eq!(role.index(), i);
        }
    }

    // =========================================================================
    // Resolver Tests
    // =========================================================================

    #[test]
    fn test_resolve_natural_layout() {
        let layout = resolve(&input("/usr/lib/app")).unwrap();
        assert_eq!(layout.get(Role::AppDir), Path::new("/usr/lib/app/app7"));
        assert_eq!(layout.get(Role::OthersDir), Path::new("/usr/lib/app/app7"));
        assert_eq!(layout.get(Role::PixDir), Path::new("/usr/lib/app/app7/pixmaps"));
        assert_eq!(
            layout.get(Role::TemplatesDir),
            Path::new("/usr/lib/app/app7/DesignerTemplates")
        );
        assert_eq!(layout.get(Role::ApiDir), Path::new("/usr/lib/app/app7/api"));
        assert_eq!(layout.get(Role::BinDir), Path::new("/usr/bin"));
        assert_eq!(layout.get(Role::ModuleDir), Path::new("/usr/lib/app"));
    }

    #[test]
    fn test_resolve_api_override() {
        let mut inp = input("/usr/lib/app");
        inp.api_dir = Some(PathBuf::from("/usr/share/qsci/api/"));
        let layout = resolve(&inp).unwrap();
        assert_eq!(layout.get(Role::ApiDir), Path::new("/usr/share/qsci/api"));
    }

    #[test]
    fn test_resolve_rejects_relative_paths() {
        let err = resolve(&input("lib/app")).unwrap_err();
        assert!(matches!(err, ResolveError::RelativePath { ref role, .. } if role == "moduleDir"));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        assert_eq!(
            resolve(&input("/opt/x")).unwrap(),
            resolve(&input("/opt/x")).unwrap()
        );
    }

    #[test]
    fn test_redirect_under_prefix() {
        let natural = resolve(&input("/usr/lib/app")).unwrap();
        let staged = natural.redirect(Path::new("/stage")).unwrap();
        assert_eq!(staged.get(Role::AppDir), Path::new("/stage/usr/lib/app/app7"));
        assert!(staged.is_under(Path::new("/stage")));
        assert!(!natural.is_under(Path::new("/stage")));
    }

    #[test]
    fn test_redirect_rejects_relative_prefix() {
        let natural = resolve(&input("/usr/lib/app")).unwrap();
        assert!(matches!(
            natural.redirect(Path::new("stage")),
            Err(ResolveError::RelativePrefix(_))
        ));
    }

    #[test]
    fn test_placement_without_prefix_is_identity() {
        let natural = resolve(&input("/usr/lib/app")).unwrap();
        let placement = Placement::new(natural.clone(), None).unwrap();
        assert_eq!(placement.target, natural);
        assert_eq!(
            placement.target_path(Path::new("/usr/share")),
            PathBuf::from("/usr/share")
        );
    }

    #[test]
    fn test_placement_target_path() {
        let natural = resolve(&input("/usr/lib/app")).unwrap();
        let placement = Placement::new(natural, Some(Path::new("/tmp/pkg/"))).unwrap();
        assert_eq!(
            placement.target_path(Path::new("/usr/share/applications")),
            PathBuf::from("/tmp/pkg/usr/share/applications")
        );
    }

    // =========================================================================
    // from_entries Tests
    // =========================================================================

    #[test]
    fn test_from_entries_requires_every_role() {
        let mut entries = resolve(&input("/usr/lib/app")).unwrap().to_entries();
        entries.remove(&Role::DocDir);
        entries.remove(&Role::BinDir);
        let err = PathLayout::from_entries(&entries).unwrap_err();
        assert_eq!(
            err,
            ResolveError::MissingRoles(vec!["docDir".to_string(), "binDir".to_string()])
        );
    }

    #[test]
    fn test_from_entries_round_trip() {
        let layout = resolve(&input("/usr/lib/app")).unwrap();
        let rebuilt = PathLayout::from_entries(&layout.to_entries()).unwrap();
        assert_eq!(rebuilt, layout);
    }

    // =========================================================================
    // Normalization Tests
    // =========================================================================

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize(Path::new("/a/b/")), PathBuf::from("/a/b"));
    }

    #[test]
    fn test_reroot() {
        assert_eq!(
            reroot(Path::new("/stage"), Path::new("/usr/bin")),
            PathBuf::from("/stage/usr/bin")
        );
        assert_eq!(
            reroot(Path::new("/stage"), Path::new("/usr/../etc")),
            PathBuf::from("/stage/etc")
        );
        assert_eq!(
            reroot(Path::new("/stage"), Path::new("/../escape")),
            PathBuf::from("/stage/escape")
        );
    }

    #[test]
    fn test_tree_roles() {
        let roles: Vec<Role> = Role::tree_roles().collect();
        assert!(roles.contains(&Role::AppDir));
        assert!(roles.contains(&Role::DocDir));
        for shared in [Role::TranslationsDir, Role::BinDir, Role::ModuleDir, Role::ApiDir] {
            assert!(!roles.contains(&shared), "{} must not be removed wholesale", shared);
        }
    }
}
