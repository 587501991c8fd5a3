// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plain-text rendering of file diffs.

use std::fmt::Write;

use codeplan_core::types::{ChunkKind, FileAction, FileChange, FileDiff};

use crate::compute_diff;

/// `+3 -1` style summary.
pub fn render_summary(diff: &FileDiff) -> String {
    format!("+{} -{}", diff.additions, diff.deletions)
}

/// Renders one change as unified-style text: a `---`/`+++` header followed by
/// one line per chunk prefixed with `+`, `-` or a space.
///
/// Uses the change's own diff when present, otherwise computes one.
pub fn render_unified(change: &FileChange) -> String {
    let computed;
    let diff = match &change.diff {
        Some(diff) => diff,
        None => {
            computed = compute_diff(
                change.old_content.as_deref(),
                change.new_content.as_deref(),
                change.action,
            );
            &computed
        }
    };

    let (from, to) = match change.action {
        FileAction::Create => ("/dev/null".to_string(), format!("b/{}", change.path)),
        FileAction::Delete => (format!("a/{}", change.path), "/dev/null".to_string()),
        FileAction::Update => (format!("a/{}", change.path), format!("b/{}", change.path)),
    };

    let mut out = String::new();
    let _ = writeln!(out, "--- {from}");
    let _ = writeln!(out, "+++ {to}");
    for chunk in &diff.changes {
        let prefix = match chunk.kind {
            ChunkKind::Add => '+',
            ChunkKind::Remove => '-',
            ChunkKind::Context => ' ',
        };
        let _ = writeln!(out, "{prefix}{}", chunk.content);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_update_with_headers() {
        let change = FileChange {
            path: "Login.tsx".into(),
            action: FileAction::Update,
            old_content: Some("<div>\n</div>".into()),
            new_content: Some("<div>\n<Button />\n</div>".into()),
            diff: None,
        };
        let text = render_unified(&change);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "--- a/Login.tsx",
                "+++ b/Login.tsx",
                " <div>",
                "-</div>",
                "+<Button />",
                "+</div>",
            ]
        );
    }

    #[test]
    fn create_renders_from_dev_null() {
        let change = FileChange {
            path: "new.rs".into(),
            action: FileAction::Create,
            old_content: None,
            new_content: Some("fn x() {}".into()),
            diff: None,
        };
        let text = render_unified(&change);
        assert!(text.starts_with("--- /dev/null\n+++ b/new.rs\n"));
        assert!(text.ends_with("+fn x() {}\n"));
    }

    #[test]
    fn summary_counts() {
        let diff = compute_diff(Some("a\nb"), Some("a\nc\nd"), FileAction::Update);
        assert_eq!(render_summary(&diff), "+2 -1");
    }
}
