use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;

use crate::blocks::PatchBlocks;
use crate::diff::{self, DiffDisplay};
use crate::encoding::decode_source;
use crate::logging::now_rfc3339;
use crate::patch::{PatchError, StepKind, apply_patch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchOutcome {
    AlreadyPatched,
    Applied,
    TargetMissing,
    AnchorNotFound,
}

impl PatchOutcome {
    pub fn label(self) -> &'static str {
        match self {
            PatchOutcome::AlreadyPatched => "already-patched",
            PatchOutcome::Applied => "applied",
            PatchOutcome::TargetMissing => "target-missing",
            PatchOutcome::AnchorNotFound => "anchor-not-found",
        }
    }

    /// Outcomes that leave plotly.js on its default formatter.
    pub fn is_warning(self) -> bool {
        matches!(
            self,
            PatchOutcome::TargetMissing | PatchOutcome::AnchorNotFound
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub backup: bool,
    pub undo_dir: Option<PathBuf>,
    pub diff: Option<DiffDisplay>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: PatchOutcome,
    pub target: PathBuf,
    pub steps: Vec<StepKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_anchor: Option<StepKind>,
    pub dry_run: bool,
    pub written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undo_patch: Option<PathBuf>,
    pub message: String,
    #[serde(skip)]
    pub preview: Option<String>,
}

impl RunReport {
    fn new(target: &Path, dry_run: bool) -> Self {
        Self {
            outcome: PatchOutcome::TargetMissing,
            target: target.to_path_buf(),
            steps: Vec::new(),
            missing_anchor: None,
            dry_run,
            written: false,
            backup: None,
            undo_patch: None,
            message: String::new(),
            preview: None,
        }
    }

    fn finish(mut self, outcome: PatchOutcome, message: String) -> Self {
        self.outcome = outcome;
        self.message = message;
        self
    }
}

/// One patch run against `target`.
///
/// Missing files and anchor mismatches come back as outcomes; only I/O and
/// decoding failures are errors. The file is written at most once, and only
/// when the text actually changed.
pub fn patch_target(target: &Path, blocks: &PatchBlocks, options: &RunOptions) -> Result<RunReport> {
    let mut report = RunReport::new(target, options.dry_run);
    if !target.exists() {
        let message = format!(
            "File not found: {}. Skipping relative time patch.",
            target.display()
        );
        return Ok(report.finish(PatchOutcome::TargetMissing, message));
    }

    let bytes = fs::read(target).with_context(|| format!("failed to read {}", target.display()))?;
    let source =
        decode_source(&bytes).with_context(|| format!("decoding {}", target.display()))?;

    let patched = match apply_patch(&source.text, blocks) {
        Ok(patched) => patched,
        Err(err) => {
            report.missing_anchor = Some(err.step());
            return Ok(report.finish(PatchOutcome::AnchorNotFound, fallback_message(&err)));
        }
    };

    if patched.is_unchanged() {
        return Ok(report.finish(
            PatchOutcome::AlreadyPatched,
            "Plotly already contains the relative time formatter.".to_string(),
        ));
    }

    report.steps = patched.applied.clone();
    report.preview = options
        .diff
        .map(|display| diff::render_diff(&source.text, &patched.text, display));

    if options.dry_run {
        let message = format!(
            "Would apply {} to {}; dry run, nothing written.",
            describe_steps(&patched.applied),
            target.display()
        );
        return Ok(report.finish(PatchOutcome::Applied, message));
    }

    if let Some(dir) = &options.undo_dir {
        report.undo_patch = Some(write_undo_patch(dir, target, &source.text, &patched.text)?);
    }
    if options.backup {
        report.backup = Some(create_backup(target)?);
    }
    write_via_temp(target, &source.encode(&patched.text))
        .with_context(|| format!("writing {}", target.display()))?;
    report.written = true;

    Ok(report.finish(
        PatchOutcome::Applied,
        "Applied relative time formatter to Plotly axis labels.".to_string(),
    ))
}

fn fallback_message(err: &PatchError) -> String {
    format!("{err}. Plotly axis ticks will fall back to the default formatter.")
}

pub fn describe_steps(steps: &[StepKind]) -> String {
    steps
        .iter()
        .map(|step| step.label())
        .collect::<Vec<_>>()
        .join(" + ")
}

fn create_backup(path: &Path) -> Result<PathBuf> {
    let mut attempt = 0usize;
    loop {
        let candidate = backup_candidate(path, attempt);
        if !candidate.exists() {
            fs::copy(path, &candidate)
                .with_context(|| format!("creating backup {}", candidate.display()))?;
            return Ok(candidate);
        }
        attempt += 1;
    }
}

fn backup_candidate(path: &Path, index: usize) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("plots.js");
    let suffix = if index == 0 {
        ".bak".to_string()
    } else {
        format!(".bak{index}")
    };
    path.with_file_name(format!("{name}{suffix}"))
}

fn write_via_temp(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let base_dir = parent.unwrap_or_else(|| Path::new("."));
    let unique = format!(
        ".tickpatch-tmp-{}-{}",
        std::process::id(),
        OffsetDateTime::now_utc().unix_timestamp_nanos()
    );
    let temp_path = base_dir.join(unique);
    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("creating temp file {}", temp_path.display()))?;
        file.write_all(data)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("syncing temp file {}", temp_path.display()))?;
    }
    fs::rename(&temp_path, path).or_else(|err| {
        let _ = fs::remove_file(&temp_path);
        Err(err).with_context(|| format!("replacing {}", path.display()))
    })?;
    Ok(())
}

fn write_undo_patch(dir: &Path, target: &Path, original: &str, patched: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating undo dir {}", dir.display()))?;
    let file_name = format!(
        "{}_{}.patch",
        sanitize_path(&now_rfc3339()),
        sanitize_path(&target.display().to_string())
    );
    let patch_path = dir.join(file_name);
    let label = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("plots.js");
    fs::write(&patch_path, diff::undo_patch(label, original, patched))
        .with_context(|| format!("writing undo patch {}", patch_path.display()))?;
    Ok(patch_path)
}

fn sanitize_path(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => ch,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{FORMATTER_SIGNATURE, NUMBER_FORMAT_BLOCK, sample_plots_js};
    use tempfile::tempdir;

    fn write_target(dir: &Path, text: &str) -> PathBuf {
        let target = dir.join("plots.js");
        fs::write(&target, text).expect("write target");
        target
    }

    #[test]
    fn missing_target_is_skipped() {
        let temp = tempdir().expect("temp dir");
        let target = temp.path().join("plots.js");
        let report = patch_target(&target, &PatchBlocks::relative_time(), &RunOptions::default())
            .expect("run");
        assert_eq!(report.outcome, PatchOutcome::TargetMissing);
        assert!(report.message.starts_with("File not found"));
        assert!(!report.written);
        assert!(!target.exists());
    }

    #[test]
    fn pristine_target_is_patched_then_left_alone() {
        let temp = tempdir().expect("temp dir");
        let target = write_target(temp.path(), &sample_plots_js());
        let blocks = PatchBlocks::relative_time();

        let first = patch_target(&target, &blocks, &RunOptions::default()).expect("first run");
        assert_eq!(first.outcome, PatchOutcome::Applied);
        assert!(first.written);
        assert_eq!(first.steps, vec![StepKind::Injection, StepKind::Replacement]);
        let patched = fs::read_to_string(&target).expect("read");
        assert!(patched.contains(FORMATTER_SIGNATURE));
        assert!(!patched.contains(NUMBER_FORMAT_BLOCK));

        let second = patch_target(&target, &blocks, &RunOptions::default()).expect("second run");
        assert_eq!(second.outcome, PatchOutcome::AlreadyPatched);
        assert!(!second.written);
        assert_eq!(fs::read_to_string(&target).expect("read"), patched);
    }

    #[test]
    fn unrecognized_target_is_left_unchanged() {
        let temp = tempdir().expect("temp dir");
        let original = "module.exports = function plots() {};\n";
        let target = write_target(temp.path(), original);

        let report = patch_target(&target, &PatchBlocks::relative_time(), &RunOptions::default())
            .expect("run");
        assert_eq!(report.outcome, PatchOutcome::AnchorNotFound);
        assert_eq!(report.missing_anchor, Some(StepKind::Injection));
        assert!(report.outcome.is_warning());
        assert!(report.message.contains("getFormatter"));
        assert!(report.message.ends_with("fall back to the default formatter."));
        assert_eq!(fs::read_to_string(&target).expect("read"), original);
    }

    #[test]
    fn dry_run_previews_without_writing() {
        let temp = tempdir().expect("temp dir");
        let original = sample_plots_js();
        let target = write_target(temp.path(), &original);
        let options = RunOptions {
            dry_run: true,
            diff: Some(DiffDisplay {
                context: 0,
                colorize: false,
            }),
            ..RunOptions::default()
        };

        let report = patch_target(&target, &PatchBlocks::relative_time(), &options).expect("run");
        assert_eq!(report.outcome, PatchOutcome::Applied);
        assert!(report.dry_run);
        assert!(!report.written);
        let preview = report.preview.expect("preview");
        assert!(preview.contains(&format!("+ {FORMATTER_SIGNATURE} {{")));
        assert_eq!(fs::read_to_string(&target).expect("read"), original);
    }

    #[test]
    fn backup_and_undo_patch_capture_the_original() {
        let temp = tempdir().expect("temp dir");
        let original = sample_plots_js();
        let target = write_target(temp.path(), &original);
        let undo_dir = temp.path().join("undo");
        let options = RunOptions {
            backup: true,
            undo_dir: Some(undo_dir.clone()),
            ..RunOptions::default()
        };

        let report = patch_target(&target, &PatchBlocks::relative_time(), &options).expect("run");
        let backup = report.backup.expect("backup path");
        assert_eq!(backup, temp.path().join("plots.js.bak"));
        assert_eq!(fs::read_to_string(&backup).expect("backup"), original);

        let undo = report.undo_patch.expect("undo path");
        assert!(undo.starts_with(&undo_dir));
        let patch_text = fs::read_to_string(&undo).expect("undo patch");
        let parsed = diffy::Patch::from_str(&patch_text).expect("parses");
        let current = fs::read_to_string(&target).expect("read");
        assert_eq!(diffy::apply(&current, &parsed).expect("applies"), original);
    }

    #[test]
    fn repeated_backups_get_numbered() {
        let temp = tempdir().expect("temp dir");
        let target = write_target(temp.path(), "x");
        fs::write(temp.path().join("plots.js.bak"), "older").expect("old backup");
        let backup = create_backup(&target).expect("backup");
        assert_eq!(backup, temp.path().join("plots.js.bak1"));
    }

    #[test]
    fn bom_survives_rewrite() {
        let temp = tempdir().expect("temp dir");
        let target = temp.path().join("plots.js");
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(sample_plots_js().as_bytes());
        fs::write(&target, &bytes).expect("write");

        let report = patch_target(&target, &PatchBlocks::relative_time(), &RunOptions::default())
            .expect("run");
        assert_eq!(report.outcome, PatchOutcome::Applied);
        let written = fs::read(&target).expect("read");
        assert!(written.starts_with(&[0xEF, 0xBB, 0xBF]));
        assert!(!written[3..].starts_with(&[0xEF, 0xBB, 0xBF]));
    }

    #[test]
    fn outcome_labels_are_kebab_case() {
        let json = serde_json::to_value(PatchOutcome::AnchorNotFound).expect("json");
        assert_eq!(json, "anchor-not-found");
        assert_eq!(PatchOutcome::AlreadyPatched.label(), "already-patched");
        assert_eq!(describe_steps(&[StepKind::Injection]), "formatter injection");
    }
}
