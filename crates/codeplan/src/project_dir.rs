// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Directory-backed project store.
//!
//! Each project is a directory under the configured root. Listing skips
//! hidden entries, files that are not UTF-8, and files above a size limit.
//! Batches are staged beside their targets and swapped in all or nothing.

use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use codeplan_core::CodeplanError;
use codeplan_core::traits::ProjectStore;
use codeplan_core::types::{FileAction, FileChange, ProjectFile};
use tempfile::{Builder, NamedTempFile, TempPath};
use tracing::{debug, warn};

/// Files larger than this are not sent as context.
const MAX_CONTEXT_FILE_BYTES: u64 = 256 * 1024;

pub struct DirectoryProjectStore {
    root: PathBuf,
}

impl DirectoryProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn project_dir(&self, project_id: &str) -> Result<PathBuf, CodeplanError> {
        let relative = checked_relative(project_id).ok_or_else(|| {
            CodeplanError::Config(format!("invalid project id: {project_id}"))
        })?;
        Ok(self.root.join(relative))
    }
}

fn storage_error(e: std::io::Error) -> CodeplanError {
    CodeplanError::Storage {
        source: Box::new(e),
    }
}

/// `path` as a relative path that stays inside its base directory.
fn checked_relative(path: &str) -> Option<PathBuf> {
    let candidate = Path::new(path);
    if path.is_empty() || candidate.is_absolute() {
        return None;
    }
    let mut out = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

#[async_trait]
impl ProjectStore for DirectoryProjectStore {
    async fn list_files(&self, project_id: &str) -> Result<Vec<ProjectFile>, CodeplanError> {
        let base = self.project_dir(project_id)?;
        if !tokio::fs::try_exists(&base).await.map_err(storage_error)? {
            debug!(project_id, "project directory does not exist yet");
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut pending = vec![base.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(storage_error)?;
            while let Some(entry) = entries.next_entry().await.map_err(storage_error)? {
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(storage_error)?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                let size = entry.metadata().await.map_err(storage_error)?.len();
                if size > MAX_CONTEXT_FILE_BYTES {
                    debug!(path = %path.display(), size, "skipping large file");
                    continue;
                }
                let bytes = tokio::fs::read(&path).await.map_err(storage_error)?;
                let Ok(content) = String::from_utf8(bytes) else {
                    continue;
                };
                let relative = path.strip_prefix(&base).unwrap_or(&path);
                files.push(ProjectFile {
                    path: relative.to_string_lossy().replace('\\', "/"),
                    content,
                });
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn write_batch(
        &self,
        project_id: &str,
        changes: &[FileChange],
    ) -> Result<(), CodeplanError> {
        let base = self.project_dir(project_id)?;

        // Validate everything before touching the disk.
        let mut writes = Vec::with_capacity(changes.len());
        for change in changes {
            change.validate()?;
            let relative =
                checked_relative(&change.path).ok_or_else(|| CodeplanError::InvalidFileChange {
                    path: change.path.clone(),
                    reason: "path must be relative and stay inside the project".to_string(),
                })?;
            let content = match change.action {
                FileAction::Delete => None,
                FileAction::Create | FileAction::Update => {
                    Some(change.new_content.clone().unwrap_or_default())
                }
            };
            writes.push(PlannedWrite {
                target: base.join(relative),
                content,
            });
        }

        let files = writes.len();
        tokio::task::spawn_blocking(move || apply_batch(writes))
            .await
            .map_err(|e| CodeplanError::Internal(format!("project write task failed: {e}")))?
            .map_err(storage_error)?;
        debug!(project_id, files, "batch written");
        Ok(())
    }
}

// --- All-or-nothing batch writes ---

/// Prefix of staged and backup files; hidden, so listing skips them.
const STAGING_PREFIX: &str = ".codeplan-";

/// A validated change. `content: None` deletes the target.
struct PlannedWrite {
    target: PathBuf,
    content: Option<String>,
}

enum Staged {
    Write { target: PathBuf, file: NamedTempFile },
    Delete { target: PathBuf },
}

impl Staged {
    fn target(&self) -> &Path {
        match self {
            Self::Write { target, .. } | Self::Delete { target } => target,
        }
    }
}

/// A change in place, with the file it displaced kept for rollback.
struct Committed {
    target: PathBuf,
    backup: Option<TempPath>,
}

/// Applies a batch all or nothing.
///
/// New contents are first written to temporary files beside their targets.
/// Targets are then swapped in one at a time, moving any existing file aside.
/// When a swap fails every earlier swap is undone. Dropping the leftover
/// staged files and backups removes them from disk.
fn apply_batch(writes: Vec<PlannedWrite>) -> io::Result<()> {
    let mut staged = Vec::with_capacity(writes.len());
    for write in writes {
        staged.push(stage(write)?);
    }

    let mut committed = Vec::with_capacity(staged.len());
    for item in staged {
        match commit(item) {
            Ok(done) => committed.push(done),
            Err(e) => {
                rollback(committed);
                return Err(e);
            }
        }
    }
    Ok(())
}

fn parent_dir(target: &Path) -> io::Result<&Path> {
    target.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", target.display()),
        )
    })
}

fn stage(write: PlannedWrite) -> io::Result<Staged> {
    let Some(content) = write.content else {
        return Ok(Staged::Delete {
            target: write.target,
        });
    };
    let dir = parent_dir(&write.target)?;
    std::fs::create_dir_all(dir)?;
    let mut file = Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(".tmp")
        .tempfile_in(dir)?;
    file.write_all(content.as_bytes())?;
    file.as_file().sync_all()?;
    Ok(Staged::Write {
        target: write.target,
        file,
    })
}

fn commit(item: Staged) -> io::Result<Committed> {
    let target = item.target().to_path_buf();
    let backup = move_aside(&target)?;
    match item {
        Staged::Write { file, .. } => {
            if let Err(e) = file.persist(&target) {
                restore(&target, backup);
                return Err(e.error);
            }
        }
        Staged::Delete { .. } => {
            if backup.is_none() {
                warn!(path = %target.display(), "file to delete was already gone");
            }
        }
    }
    Ok(Committed { target, backup })
}

/// Renames an existing target to a hidden backup beside it.
fn move_aside(target: &Path) -> io::Result<Option<TempPath>> {
    match std::fs::symlink_metadata(target) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    }
    let backup = Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(".bak")
        .tempfile_in(parent_dir(target)?)?
        .into_temp_path();
    std::fs::rename(target, &backup)?;
    Ok(Some(backup))
}

fn restore(target: &Path, backup: Option<TempPath>) {
    let Some(backup) = backup else {
        return;
    };
    if let Err(e) = backup.persist(target) {
        let kept = e.path.keep().ok();
        warn!(
            path = %target.display(),
            backup = ?kept,
            error = %e.error,
            "could not restore original file"
        );
    }
}

fn rollback(committed: Vec<Committed>) {
    for done in committed.into_iter().rev() {
        if let Err(e) = std::fs::remove_file(&done.target) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %done.target.display(), error = %e, "could not undo write");
            }
        }
        restore(&done.target, done.backup);
    }
}
