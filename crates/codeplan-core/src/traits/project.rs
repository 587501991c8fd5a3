// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Project store trait: the external file persistence the core reads and writes.

use async_trait::async_trait;

use crate::error::CodeplanError;
use crate::types::{FileChange, ProjectFile};

/// Plain store for a project's files.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Lists the current files of a project, sent to the backend as context.
    async fn list_files(&self, project_id: &str) -> Result<Vec<ProjectFile>, CodeplanError>;

    /// Applies an approved batch of changes. Implementations apply all or nothing.
    async fn write_batch(
        &self,
        project_id: &str,
        changes: &[FileChange],
    ) -> Result<(), CodeplanError>;
}
