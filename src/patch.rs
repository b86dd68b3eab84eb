use std::fmt;

use serde::Serialize;

use crate::blocks::PatchBlocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Injection,
    Replacement,
}

impl StepKind {
    pub fn label(self) -> &'static str {
        match self {
            StepKind::Injection => "formatter injection",
            StepKind::Replacement => "numberFormat replacement",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// Target content already present.
    Applied,
    /// Anchor present, step would change the text.
    Pending,
    /// Neither the anchor nor the target content is present.
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorHint {
    pub line: usize,
    pub column: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    AnchorNotFound {
        step: StepKind,
        hint: Option<AnchorHint>,
    },
}

impl PatchError {
    pub fn step(&self) -> StepKind {
        match self {
            PatchError::AnchorNotFound { step, .. } => *step,
        }
    }
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::AnchorNotFound { step, hint } => {
                match step {
                    StepKind::Injection => f.write_str(
                        "unable to find the getFormatter definition to inject the formatter before",
                    )?,
                    StepKind::Replacement => {
                        f.write_str("unable to locate the numberFormat block to replace")?
                    }
                }
                if let Some(hint) = hint {
                    write!(
                        f,
                        " (closest match near line {} column {}: {})",
                        hint.line, hint.column, hint.text
                    )?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for PatchError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedSource {
    pub text: String,
    pub applied: Vec<StepKind>,
}

impl PatchedSource {
    pub fn is_unchanged(&self) -> bool {
        self.applied.is_empty()
    }
}

pub fn injection_state(source: &str, blocks: &PatchBlocks) -> StepState {
    step_state(
        source,
        &blocks.injection.marker,
        &blocks.injection.anchor,
    )
}

pub fn replacement_state(source: &str, blocks: &PatchBlocks) -> StepState {
    step_state(
        source,
        &blocks.replacement.content,
        &blocks.replacement.anchor,
    )
}

fn step_state(source: &str, marker: &str, anchor: &str) -> StepState {
    if source.contains(marker) {
        StepState::Applied
    } else if source.contains(anchor) {
        StepState::Pending
    } else {
        StepState::Blocked
    }
}

/// Applies both steps to `source`, each at most once.
///
/// Steps whose content is already present are skipped, so re-running on the
/// output is a no-op. A missing anchor aborts the whole attempt.
pub fn apply_patch(source: &str, blocks: &PatchBlocks) -> Result<PatchedSource, PatchError> {
    let mut text = source.to_string();
    let mut applied = Vec::new();

    match injection_state(&text, blocks) {
        StepState::Applied => {}
        StepState::Pending => {
            let anchor = &blocks.injection.anchor;
            let inserted = format!("{}{anchor}", blocks.injection.content);
            text = text.replacen(anchor.as_str(), &inserted, 1);
            applied.push(StepKind::Injection);
        }
        StepState::Blocked => {
            return Err(anchor_not_found(
                StepKind::Injection,
                &text,
                &blocks.injection.anchor,
            ));
        }
    }

    match replacement_state(&text, blocks) {
        StepState::Applied => {}
        StepState::Pending => {
            text = text.replacen(
                blocks.replacement.anchor.as_str(),
                &blocks.replacement.content,
                1,
            );
            applied.push(StepKind::Replacement);
        }
        StepState::Blocked => {
            return Err(anchor_not_found(
                StepKind::Replacement,
                &text,
                &blocks.replacement.anchor,
            ));
        }
    }

    Ok(PatchedSource { text, applied })
}

fn anchor_not_found(step: StepKind, text: &str, anchor: &str) -> PatchError {
    PatchError::AnchorNotFound {
        step,
        hint: closest_line(text, anchor),
    }
}

/// Finds the line that best resembles the first line of `anchor`: an exact
/// substring hit wins, otherwise the smallest edit distance.
pub fn closest_line(text: &str, anchor: &str) -> Option<AnchorHint> {
    let needle = anchor.lines().map(str::trim).find(|line| !line.is_empty())?;
    let mut best: Option<(usize, usize, usize, &str)> = None;
    for (line_idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry = if let Some(pos) = line.find(needle) {
            (0, line_idx, line[..pos].chars().count(), line)
        } else {
            let trimmed = line.trim_start();
            let col = line.chars().count() - trimmed.chars().count();
            (mismatch_score(trimmed, needle), line_idx, col, line)
        };

        best = match best {
            Some(current) if entry.0 >= current.0 => Some(current),
            Some(_) | None => Some(entry),
        };

        if entry.0 == 0 {
            break;
        }
    }

    best.map(|(_, line_idx, col, line)| AnchorHint {
        line: line_idx + 1,
        column: col + 1,
        text: line.trim().to_string(),
    })
}

fn mismatch_score(line: &str, needle: &str) -> usize {
    let snippet: String = line.chars().take(needle.chars().count()).collect();
    levenshtein(&snippet, needle)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut costs = (0..=b.len()).collect::<Vec<_>>();
    for (i, ca) in a.chars().enumerate() {
        let mut last = i;
        costs[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let new = if ca == *cb {
                last
            } else {
                1 + std::cmp::min(std::cmp::min(costs[j], costs[j + 1]), last)
            };
            last = costs[j + 1];
            costs[j + 1] = new;
        }
    }
    costs[b.len()]
}
