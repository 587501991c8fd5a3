// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Step executor trait used when an approved plan runs.

use async_trait::async_trait;

use crate::types::{Plan, Step};

/// Performs the work of one plan step.
///
/// Returning `Err` marks the step failed with the given text; the plan then
/// stops and the remaining steps are skipped.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, plan: &Plan, index: usize, step: &Step) -> Result<(), String>;
}
