// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line-level diffs for proposed file changes.
//!
//! Lines are compared positionally: line `i` of the old content is paired
//! with line `i` of the new content. Equal pairs are context, unequal pairs
//! become a removal immediately followed by an addition, and lines present on
//! only one side are pure additions or removals. This is not a minimal edit
//! script; an insertion near the top of a file shows every following line as
//! changed.
//!
//! Content is split on `'\n'` without dropping the final segment, so a
//! trailing newline shows up as a final empty line. That keeps
//! [`apply_chunks`] exact.

mod render;

pub use render::{render_summary, render_unified};

use codeplan_core::types::{ChunkKind, DiffChunk, FileAction, FileChange, FileDiff};
use tracing::debug;

/// Splits content into lines. Empty content has no lines.
fn split_lines(content: &str) -> Vec<&str> {
    if content.is_empty() {
        Vec::new()
    } else {
        content.split('\n').collect()
    }
}

fn chunk(kind: ChunkKind, line_number: usize, content: &str) -> DiffChunk {
    DiffChunk {
        kind,
        line_number,
        content: content.to_string(),
    }
}

/// Positional diff of two texts.
pub fn diff_lines(old: &str, new: &str) -> Vec<DiffChunk> {
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let mut chunks = Vec::with_capacity(old_lines.len().max(new_lines.len()));

    for i in 0..old_lines.len().max(new_lines.len()) {
        let line_number = i + 1;
        match (old_lines.get(i), new_lines.get(i)) {
            (Some(o), Some(n)) if o == n => chunks.push(chunk(ChunkKind::Context, line_number, n)),
            (Some(o), Some(n)) => {
                chunks.push(chunk(ChunkKind::Remove, line_number, o));
                chunks.push(chunk(ChunkKind::Add, line_number, n));
            }
            (Some(o), None) => chunks.push(chunk(ChunkKind::Remove, line_number, o)),
            (None, Some(n)) => chunks.push(chunk(ChunkKind::Add, line_number, n)),
            (None, None) => unreachable!("index below the longer side's length"),
        }
    }

    chunks
}

/// Computes the diff for one file change.
///
/// `create` ignores `old`, `delete` ignores `new`; a missing side counts as
/// empty content.
pub fn compute_diff(old: Option<&str>, new: Option<&str>, action: FileAction) -> FileDiff {
    let chunks = match action {
        FileAction::Create => diff_lines("", new.unwrap_or_default()),
        FileAction::Delete => diff_lines(old.unwrap_or_default(), ""),
        FileAction::Update => diff_lines(old.unwrap_or_default(), new.unwrap_or_default()),
    };
    from_chunks(chunks)
}

/// Wraps chunks with their add/remove counts.
pub fn from_chunks(changes: Vec<DiffChunk>) -> FileDiff {
    let additions = changes.iter().filter(|c| c.kind == ChunkKind::Add).count();
    let deletions = changes
        .iter()
        .filter(|c| c.kind == ChunkKind::Remove)
        .count();
    FileDiff {
        additions,
        deletions,
        changes,
    }
}

/// Fills in `change.diff` when the backend did not send one.
pub fn annotate(change: &mut FileChange) {
    if change.diff.is_some() {
        return;
    }
    let diff = compute_diff(
        change.old_content.as_deref(),
        change.new_content.as_deref(),
        change.action,
    );
    debug!(
        path = change.path.as_str(),
        additions = diff.additions,
        deletions = diff.deletions,
        "computed diff"
    );
    change.diff = Some(diff);
}

/// Rebuilds the new content from a chunk sequence (context and additions).
pub fn apply_chunks(chunks: &[DiffChunk]) -> String {
    join_kinds(chunks, ChunkKind::Add)
}

/// Rebuilds the old content from a chunk sequence (context and removals).
pub fn revert_chunks(chunks: &[DiffChunk]) -> String {
    join_kinds(chunks, ChunkKind::Remove)
}

fn join_kinds(chunks: &[DiffChunk], side: ChunkKind) -> String {
    chunks
        .iter()
        .filter(|c| c.kind == side || c.kind == ChunkKind::Context)
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kinds(chunks: &[DiffChunk]) -> Vec<ChunkKind> {
        chunks.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn create_adds_every_line() {
        let diff = compute_diff(None, Some("a\nb"), FileAction::Create);
        assert_eq!(kinds(&diff.changes), vec![ChunkKind::Add, ChunkKind::Add]);
        assert_eq!(diff.additions, 2);
        assert_eq!(diff.deletions, 0);
        assert_eq!(diff.changes[1].line_number, 2);
    }

    #[test]
    fn delete_removes_every_line() {
        let diff = compute_diff(Some("x\ny\nz"), None, FileAction::Delete);
        assert_eq!(diff.deletions, 3);
        assert!(diff.changes.iter().all(|c| c.kind == ChunkKind::Remove));
    }

    #[test]
    fn update_pairs_lines_by_position() {
        let chunks = diff_lines("keep\nold\ntail", "keep\nnew\ntail\nextra");
        assert_eq!(
            kinds(&chunks),
            vec![
                ChunkKind::Context,
                ChunkKind::Remove,
                ChunkKind::Add,
                ChunkKind::Context,
                ChunkKind::Add,
            ]
        );
        assert_eq!(chunks[1].content, "old");
        assert_eq!(chunks[2].content, "new");
        assert_eq!(chunks[4].line_number, 4);
    }

    #[test]
    fn shorter_new_side_emits_pure_removals() {
        let chunks = diff_lines("a\nb\nc", "a");
        assert_eq!(
            kinds(&chunks),
            vec![ChunkKind::Context, ChunkKind::Remove, ChunkKind::Remove]
        );
    }

    #[test]
    fn empty_content_has_no_lines() {
        assert!(diff_lines("", "").is_empty());
        let diff = compute_diff(None, Some(""), FileAction::Create);
        assert_eq!(diff, FileDiff::default());
    }

    #[test]
    fn trailing_newline_round_trips() {
        let old = "fn main() {}\n";
        let new = "fn main() {\n    run();\n}\n";
        let chunks = diff_lines(old, new);
        assert_eq!(apply_chunks(&chunks), new);
        assert_eq!(revert_chunks(&chunks), old);
    }

    #[test]
    fn annotate_keeps_backend_diff() {
        let mut change = FileChange {
            path: "a.rs".into(),
            action: FileAction::Update,
            old_content: Some("1".into()),
            new_content: Some("2".into()),
            diff: Some(FileDiff::default()),
        };
        annotate(&mut change);
        assert_eq!(change.diff, Some(FileDiff::default()));

        change.diff = None;
        annotate(&mut change);
        let diff = change.diff.expect("diff filled in");
        assert_eq!((diff.additions, diff.deletions), (1, 1));
    }

    proptest! {
        #[test]
        fn update_round_trip(old in "[a-c\n]{0,40}", new in "[a-c\n]{0,40}") {
            let diff = compute_diff(Some(&old), Some(&new), FileAction::Update);
            prop_assert_eq!(apply_chunks(&diff.changes), new);
            prop_assert_eq!(revert_chunks(&diff.changes), old);
        }

        #[test]
        fn counts_match_chunks(old in "[ab\n]{0,20}", new in "[ab\n]{0,20}") {
            let diff = compute_diff(Some(&old), Some(&new), FileAction::Update);
            let adds = diff.changes.iter().filter(|c| c.kind == ChunkKind::Add).count();
            prop_assert_eq!(diff.additions, adds);
        }
    }
}
