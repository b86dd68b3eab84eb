use std::fmt::Write as _;

use similar::{ChangeTag, TextDiff};

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy)]
pub struct DiffDisplay {
    pub context: usize,
    pub colorize: bool,
}

pub fn render_diff(old: &str, new: &str, display: DiffDisplay) -> String {
    let diff = TextDiff::configure()
        .algorithm(similar::Algorithm::Myers)
        .diff_lines(old, new);

    let mut out = String::new();
    for (idx, group) in diff.grouped_ops(display.context).iter().enumerate() {
        if idx > 0 {
            out.push_str("...\n");
        }
        for op in group {
            for change in diff.iter_changes(op) {
                let (sign, color) = match change.tag() {
                    ChangeTag::Delete => ("- ", RED),
                    ChangeTag::Insert => ("+ ", GREEN),
                    ChangeTag::Equal => ("  ", ""),
                };
                let colored = display.colorize && !color.is_empty();
                if colored {
                    out.push_str(color);
                }
                let _ = write!(out, "{sign}{}", change.value().trim_end_matches('\n'));
                if colored {
                    out.push_str(RESET);
                }
                out.push('\n');
            }
        }
    }
    out
}

/// Reverse patch that turns `patched` back into `original`.
pub fn undo_patch(label: &str, original: &str, patched: &str) -> String {
    let patch = diffy::create_patch(patched, original);
    let body = patch.to_string();
    // diffy labels both sides "original"/"modified"; name the real file instead
    body.replacen("--- original", &format!("--- a/{label}"), 1)
        .replacen("+++ modified", &format!("+++ b/{label}"), 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: DiffDisplay = DiffDisplay {
        context: 1,
        colorize: false,
    };

    #[test]
    fn marks_inserted_and_removed_lines() {
        let rendered = render_diff("a\nb\nc\n", "a\nB\nc\n", PLAIN);
        assert_eq!(rendered, "  a\n- b\n+ B\n  c\n");
    }

    #[test]
    fn separates_distant_hunks() {
        let old = "1\n2\n3\n4\n5\n6\n7\n8\n";
        let new = "x\n2\n3\n4\n5\n6\n7\ny\n";
        let rendered = render_diff(old, new, PLAIN);
        assert!(rendered.contains("...\n"));
    }

    #[test]
    fn colors_only_changed_lines() {
        let rendered = render_diff(
            "a\nb\n",
            "a\nc\n",
            DiffDisplay {
                context: 1,
                colorize: true,
            },
        );
        assert!(rendered.starts_with("  a\n"));
        assert!(rendered.contains("\x1b[31m- b\x1b[0m"));
        assert!(rendered.contains("\x1b[32m+ c\x1b[0m"));
    }

    #[test]
    fn undo_patch_restores_original() {
        let original = "alpha\nbeta\n";
        let patched = "alpha\ninserted\nbeta\n";
        let text = undo_patch("plots.js", original, patched);
        assert!(text.starts_with("--- a/plots.js\n+++ b/plots.js\n"));
        let parsed = diffy::Patch::from_str(&text).expect("patch parses");
        let restored = diffy::apply(patched, &parsed).expect("applies");
        assert_eq!(restored, original);
    }
}
