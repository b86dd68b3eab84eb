use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub const LOG_DIR: &str = ".tickpatch";
const LOG_FILE: &str = "change_log.jsonl";
const MAX_ENTRIES: usize = 500;

#[derive(Debug, Serialize)]
pub struct ChangeLogEntry<'a> {
    pub timestamp: &'a str,
    pub command: &'a str,
    pub path: &'a Path,
    pub outcome: &'a str,
    pub detail: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<&'a str>,
}

pub struct ChangeRecord<'a> {
    pub command: &'a str,
    pub path: &'a Path,
    pub outcome: &'a str,
    pub detail: &'a str,
    pub version: Option<&'a str>,
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".into())
}

/// Appends one entry to `<root>/.tickpatch/change_log.jsonl`.
pub fn record_change(root: &Path, record: &ChangeRecord<'_>) -> Result<PathBuf> {
    let log_path = ensure_log_file(root)?;
    let timestamp = now_rfc3339();
    let entry = ChangeLogEntry {
        timestamp: &timestamp,
        command: record.command,
        path: record.path,
        outcome: record.outcome,
        detail: record.detail,
        version: record.version,
    };
    let json = serde_json::to_string(&entry)?;
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;
    writeln!(file, "{json}")?;
    truncate_log(&log_path)?;
    Ok(log_path)
}

fn ensure_log_file(root: &Path) -> Result<PathBuf> {
    let dir = root.join(LOG_DIR);
    if !dir.exists() {
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    Ok(dir.join(LOG_FILE))
}

fn truncate_log(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let reader = BufReader::new(file);
    let lines: Vec<_> = reader.lines().collect::<Result<_, _>>()?;
    if lines.len() <= MAX_ENTRIES {
        return Ok(());
    }
    let keep = &lines[lines.len() - MAX_ENTRIES..];
    fs::write(path, keep.join("\n") + "\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record<'a>(path: &'a Path, detail: &'a str) -> ChangeRecord<'a> {
        ChangeRecord {
            command: "apply",
            path,
            outcome: "applied",
            detail,
            version: Some("2.35.2"),
        }
    }

    #[test]
    fn appends_json_lines() {
        let temp = tempdir().expect("temp dir");
        let target = temp.path().join("plots.js");
        let log = record_change(temp.path(), &record(&target, "first")).expect("log");
        record_change(temp.path(), &record(&target, "second")).expect("log");

        let text = fs::read_to_string(&log).expect("read log");
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let entry: serde_json::Value = serde_json::from_str(lines[1]).expect("json");
        assert_eq!(entry["outcome"], "applied");
        assert_eq!(entry["detail"], "second");
        assert_eq!(entry["version"], "2.35.2");
    }

    #[test]
    fn keeps_only_newest_entries() {
        let temp = tempdir().expect("temp dir");
        let target = temp.path().join("plots.js");
        let mut log = PathBuf::new();
        for idx in 0..MAX_ENTRIES + 3 {
            let detail = idx.to_string();
            log = record_change(temp.path(), &record(&target, &detail)).expect("log");
        }
        let text = fs::read_to_string(&log).expect("read log");
        assert_eq!(text.lines().count(), MAX_ENTRIES);
        assert!(text.lines().next().expect("first").contains("\"detail\":\"3\""));
    }
}
