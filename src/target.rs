use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::blocks::{UPSTREAM_FILE, UPSTREAM_PACKAGE};

const MANIFEST: &str = "package.json";
// plots.js sits three directories below its package root
const MAX_MANIFEST_ASCENT: usize = 3;

/// `<root>/node_modules/plotly.js/src/plots/plots.js`
pub fn default_target(root: &Path) -> PathBuf {
    let mut path = root.join("node_modules").join(UPSTREAM_PACKAGE);
    for part in UPSTREAM_FILE {
        path.push(part);
    }
    path
}

pub fn resolve_root(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => std::env::current_dir().context("resolving current directory"),
    }
}

pub fn resolve_target(root: &Path, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => root.join(path),
        None => default_target(root),
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UpstreamPackage {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(skip)]
    pub manifest: PathBuf,
}

/// Reads the manifest of the package that contains `target`, if any.
pub fn read_upstream_package(target: &Path) -> Result<Option<UpstreamPackage>> {
    let Some(manifest) = target
        .ancestors()
        .skip(1)
        .take(MAX_MANIFEST_ASCENT)
        .map(|dir| dir.join(MANIFEST))
        .find(|candidate| candidate.is_file())
    else {
        return Ok(None);
    };

    let data = match fs::read(&manifest) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("reading {}", manifest.display()));
        }
    };
    let mut package: UpstreamPackage = serde_json::from_slice(&data)
        .with_context(|| format!("parsing {}", manifest.display()))?;
    package.manifest = manifest;
    Ok(Some(package))
}

/// Returns a warning when the installed version differs from `expected`.
pub fn version_mismatch(package: Option<&UpstreamPackage>, expected: &str) -> Option<String> {
    let found = package.and_then(|pkg| pkg.version.as_deref());
    match found {
        Some(version) if version == expected => None,
        Some(version) => Some(format!(
            "{UPSTREAM_PACKAGE} {version} is installed but the anchors were taken from {expected}"
        )),
        None => Some(format!(
            "could not determine the installed {UPSTREAM_PACKAGE} version (expected {expected})"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_target_points_into_node_modules() {
        let target = default_target(Path::new("/app"));
        assert_eq!(
            target,
            PathBuf::from("/app/node_modules/plotly.js/src/plots/plots.js")
        );
    }

    #[test]
    fn relative_override_is_joined_to_root() {
        let root = Path::new("/app");
        assert_eq!(
            resolve_target(root, Some(Path::new("vendor/plots.js"))),
            PathBuf::from("/app/vendor/plots.js")
        );
        assert_eq!(
            resolve_target(root, Some(Path::new("/elsewhere/plots.js"))),
            PathBuf::from("/elsewhere/plots.js")
        );
    }

    #[test]
    fn reads_nearest_manifest() {
        let temp = tempdir().expect("temp dir");
        let target = default_target(temp.path());
        std::fs::create_dir_all(target.parent().expect("parent")).expect("dirs");
        let manifest = temp.path().join("node_modules/plotly.js/package.json");
        std::fs::write(&manifest, r#"{"name": "plotly.js", "version": "2.35.2"}"#)
            .expect("manifest");

        let package = read_upstream_package(&target)
            .expect("read")
            .expect("package found");
        assert_eq!(package.version.as_deref(), Some("2.35.2"));
        assert_eq!(package.manifest, manifest);
        assert!(version_mismatch(Some(&package), "2.35.2").is_none());
        let warning = version_mismatch(Some(&package), "2.9.0").expect("mismatch");
        assert!(warning.contains("2.35.2"));
    }

    #[test]
    fn missing_manifest_is_not_an_error() {
        let temp = tempdir().expect("temp dir");
        let target = temp.path().join("a/b/c/plots.js");
        assert!(read_upstream_package(&target).expect("read").is_none());
        assert!(version_mismatch(None, "1.0.0").is_some());
    }
}
