// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Step executor that succeeds or fails by script.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use codeplan_core::traits::StepExecutor;
use codeplan_core::types::{Plan, Step};

/// Runs no real work; fails the steps whose index was scripted to fail and
/// records the id of every step it was asked to run.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    failures: HashMap<usize, String>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    /// Every step succeeds.
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// The step at `index` (0-based) fails with `message`.
    pub fn failing_at(index: usize, message: impl Into<String>) -> Self {
        let mut executor = Self::default();
        executor.failures.insert(index, message.into());
        executor
    }

    /// Ids of the steps executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(&self, _plan: &Plan, index: usize, step: &Step) -> Result<(), String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(step.id.clone());
        match self.failures.get(&index) {
            Some(message) => Err(message.clone()),
            None => Ok(()),
        }
    }
}
