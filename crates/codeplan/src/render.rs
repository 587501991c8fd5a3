// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal rendering: colored diffs, plans, and errors.

use std::path::Path;

use codeplan_core::CodeplanError;
use codeplan_core::types::{FileAction, FileChange, Plan, StepStatus};
use codeplan_diff::{annotate, render_summary, render_unified};
use colored::Colorize;

/// `codeplan diff OLD NEW`.
pub async fn run_diff(old: &Path, new: &Path) -> Result<(), CodeplanError> {
    let old_content = read_file(old).await?;
    let new_content = read_file(new).await?;

    let mut change = FileChange {
        path: new.display().to_string(),
        action: FileAction::Update,
        old_content: Some(old_content),
        new_content: Some(new_content),
        diff: None,
    };
    annotate(&mut change);
    print!("{}", colorize_unified(&render_unified(&change)));
    Ok(())
}

async fn read_file(path: &Path) -> Result<String, CodeplanError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CodeplanError::Storage {
            source: format!("cannot read {}: {e}", path.display()).into(),
        })
}

/// Prints every proposed change with a one-line summary header.
pub fn print_diffs(changes: &[FileChange]) {
    for change in changes {
        let summary = change
            .diff
            .as_ref()
            .map(render_summary)
            .unwrap_or_default();
        println!(
            "\n{} {} {}",
            change.action.to_string().bold(),
            change.path.bold(),
            summary.dimmed()
        );
        print!("{}", colorize_unified(&render_unified(change)));
    }
}

/// Colors unified diff text line by line.
fn colorize_unified(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let colored = if line.starts_with("---") || line.starts_with("+++") {
            line.bold().to_string()
        } else if line.starts_with('+') {
            line.green().to_string()
        } else if line.starts_with('-') {
            line.red().to_string()
        } else {
            line.to_string()
        };
        out.push_str(&colored);
        out.push('\n');
    }
    out
}

/// Prints a plan with one line per step.
pub fn print_plan(plan: &Plan) {
    println!("\n{} {}", "plan:".bold(), plan.title);
    if !plan.description.is_empty() {
        println!("  {}", plan.description.dimmed());
    }
    for (i, step) in plan.steps.iter().enumerate() {
        println!("  {} {}. {}", step_marker(step.status), i + 1, step.description);
    }
}

fn step_marker(status: StepStatus) -> String {
    match status {
        StepStatus::Pending => "[ ]".dimmed().to_string(),
        StepStatus::InProgress => "[~]".yellow().to_string(),
        StepStatus::Completed => "[x]".green().to_string(),
        StepStatus::Failed => "[!]".red().to_string(),
        StepStatus::Skipped => "[-]".dimmed().to_string(),
    }
}

pub fn print_error(error: &CodeplanError) {
    eprintln!("{}: {error}", "error".red());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colorize_keeps_every_line() {
        colored::control::set_override(false);
        let text = "--- a/x\n+++ b/x\n-old\n+new\n same\n";
        assert_eq!(colorize_unified(text), text);
    }

    #[tokio::test]
    async fn diff_of_missing_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        std::fs::write(&present, "x").unwrap();
        let err = run_diff(&dir.path().join("absent.txt"), &present)
            .await
            .unwrap_err();
        assert!(matches!(err, CodeplanError::Storage { .. }));
        assert!(err.to_string().contains("absent.txt"));
    }

    #[tokio::test]
    async fn diff_of_two_files_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.txt");
        let new = dir.path().join("new.txt");
        std::fs::write(&old, "a\nb\n").unwrap();
        std::fs::write(&new, "a\nc\n").unwrap();
        run_diff(&old, &new).await.unwrap();
    }
}
