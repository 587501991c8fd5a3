// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory project store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use codeplan_core::CodeplanError;
use codeplan_core::traits::ProjectStore;
use codeplan_core::types::{FileAction, FileChange, ProjectFile};
use tokio::sync::Mutex;

type Files = BTreeMap<String, String>;

/// Project files kept in maps; every written batch is recorded.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProjectStore {
    projects: Arc<Mutex<HashMap<String, Files>>>,
    batches: Arc<Mutex<Vec<(String, Vec<FileChange>)>>>,
    write_failure: Arc<Mutex<Option<String>>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds one file.
    pub async fn insert(&self, project_id: &str, path: &str, content: &str) {
        self.projects
            .lock()
            .await
            .entry(project_id.to_string())
            .or_default()
            .insert(path.to_string(), content.to_string());
    }

    pub async fn file(&self, project_id: &str, path: &str) -> Option<String> {
        self.projects
            .lock()
            .await
            .get(project_id)
            .and_then(|files| files.get(path).cloned())
    }

    /// Makes every later `write_batch` fail with a storage error.
    pub async fn fail_writes(&self, reason: &str) {
        *self.write_failure.lock().await = Some(reason.to_string());
    }

    /// Every batch written so far, with its project id.
    pub async fn batches(&self) -> Vec<(String, Vec<FileChange>)> {
        self.batches.lock().await.clone()
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn list_files(&self, project_id: &str) -> Result<Vec<ProjectFile>, CodeplanError> {
        Ok(self
            .projects
            .lock()
            .await
            .get(project_id)
            .map(|files| {
                files
                    .iter()
                    .map(|(path, content)| ProjectFile {
                        path: path.clone(),
                        content: content.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn write_batch(
        &self,
        project_id: &str,
        changes: &[FileChange],
    ) -> Result<(), CodeplanError> {
        for change in changes {
            change.validate()?;
        }
        if let Some(reason) = self.write_failure.lock().await.clone() {
            return Err(CodeplanError::Storage {
                source: reason.into(),
            });
        }

        let mut projects = self.projects.lock().await;
        let files = projects.entry(project_id.to_string()).or_default();
        for change in changes {
            match change.action {
                FileAction::Delete => {
                    files.remove(&change.path);
                }
                FileAction::Create | FileAction::Update => {
                    files.insert(
                        change.path.clone(),
                        change.new_content.clone().unwrap_or_default(),
                    );
                }
            }
        }
        drop(projects);

        self.batches
            .lock()
            .await
            .push((project_id.to_string(), changes.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn batch_applies_all_actions() {
        let store = InMemoryProjectStore::new();
        store.insert("p", "old.rs", "gone").await;
        store.insert("p", "main.rs", "v1").await;

        let changes = vec![
            FileChange {
                path: "main.rs".into(),
                action: FileAction::Update,
                old_content: Some("v1".into()),
                new_content: Some("v2".into()),
                diff: None,
            },
            FileChange {
                path: "old.rs".into(),
                action: FileAction::Delete,
                old_content: Some("gone".into()),
                new_content: None,
                diff: None,
            },
        ];
        store.write_batch("p", &changes).await.unwrap();

        assert_eq!(store.file("p", "main.rs").await.as_deref(), Some("v2"));
        assert_eq!(store.file("p", "old.rs").await, None);
        assert_eq!(store.batches().await.len(), 1);
    }

    #[tokio::test]
    async fn failing_store_keeps_files() {
        let store = InMemoryProjectStore::new();
        store.insert("p", "main.rs", "v1").await;
        store.fail_writes("read-only volume").await;
        let changes = vec![FileChange {
            path: "main.rs".into(),
            action: FileAction::Update,
            old_content: Some("v1".into()),
            new_content: Some("v2".into()),
            diff: None,
        }];
        let err = store.write_batch("p", &changes).await.unwrap_err();
        assert!(err.to_string().contains("read-only volume"));
        assert_eq!(store.file("p", "main.rs").await.as_deref(), Some("v1"));
        assert!(store.batches().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_batch_writes_nothing() {
        let store = InMemoryProjectStore::new();
        let changes = vec![FileChange {
            path: "x.rs".into(),
            action: FileAction::Create,
            old_content: None,
            new_content: None,
            diff: None,
        }];
        assert!(store.write_batch("p", &changes).await.is_err());
        assert!(store.list_files("p").await.unwrap().is_empty());
        assert!(store.batches().await.is_empty());
    }
}
