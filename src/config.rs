use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::ColorChoice;

/// Optional settings file; every key can also be given on the command line.
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub root: Option<PathBuf>,
    pub target: Option<PathBuf>,
    pub backup: Option<bool>,
    pub undo_log: Option<PathBuf>,
    pub change_log: Option<bool>,
    pub expect_version: Option<String>,
    pub context: Option<usize>,
    pub color: Option<ColorChoice>,
}

pub fn load_config(path: &Path) -> Result<FileConfig> {
    let data = fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
    let mut config: FileConfig = if path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
    {
        serde_json::from_slice(&data)
            .with_context(|| format!("parsing config {}", path.display()))?
    } else {
        serde_yaml::from_slice(&data)
            .with_context(|| format!("parsing config {}", path.display()))?
    };
    if let Some(base) = path.parent() {
        config.root = config.root.map(|root| anchor_to(base, root));
        config.undo_log = config.undo_log.map(|dir| anchor_to(base, dir));
    }
    Ok(config)
}

// relative paths in a config file are relative to the file itself
fn anchor_to(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() || base.as_os_str().is_empty() {
        path
    } else {
        base.join(path)
    }
}
