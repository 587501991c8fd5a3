// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution plan lifecycle.
//!
//! A plan moves only forward:
//!
//! ```text
//! pending -> awaiting_confirmation -> approved -> executing -> completed
//!                                  |                       -> failed
//!                                  -> cancelled
//! ```
//!
//! [`PlanMachine`] rejects every other edge with
//! [`CodeplanError::InvalidTransition`] and leaves the plan untouched.
//! Execution is fail-fast: the first failed step fails the plan and every
//! later step is marked skipped.

use codeplan_core::CodeplanError;
use codeplan_core::traits::StepExecutor;
use codeplan_core::types::{Plan, PlanStatus, StepStatus};
use tracing::{debug, error, info, warn};

/// Whether `from -> to` is one of the permitted forward edges.
pub fn is_permitted(from: PlanStatus, to: PlanStatus) -> bool {
    use PlanStatus::*;
    matches!(
        (from, to),
        (Pending, AwaitingConfirmation)
            | (AwaitingConfirmation, Approved)
            | (AwaitingConfirmation, Cancelled)
            | (Approved, Executing)
            | (Executing, Completed)
            | (Executing, Failed)
    )
}

/// Owns one plan and enforces its lifecycle.
#[derive(Debug, Clone)]
pub struct PlanMachine {
    plan: Plan,
}

impl PlanMachine {
    pub fn new(plan: Plan) -> Self {
        Self { plan }
    }

    /// Wraps a plan received from the backend and presents it for confirmation.
    ///
    /// Plans that arrive `pending` move to `awaiting_confirmation`. A plan
    /// that claims any later status has not been approved here, so it is
    /// reset to `awaiting_confirmation` with every step pending.
    pub fn received(plan: Plan) -> Self {
        let mut machine = Self::new(plan);
        match machine.status() {
            PlanStatus::AwaitingConfirmation => {}
            PlanStatus::Pending => {
                // Pending -> AwaitingConfirmation is always permitted.
                let _ = machine.transition(PlanStatus::AwaitingConfirmation);
            }
            status => {
                warn!(
                    plan_id = machine.plan.id.as_str(),
                    %status,
                    "plan received past confirmation, resetting"
                );
                let plan = &mut machine.plan;
                plan.status = PlanStatus::AwaitingConfirmation;
                plan.failed_step = None;
                plan.rejection_reason = None;
                for step in &mut plan.steps {
                    step.status = StepStatus::Pending;
                    step.error = None;
                }
            }
        }
        machine
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn into_plan(self) -> Plan {
        self.plan
    }

    pub fn status(&self) -> PlanStatus {
        self.plan.status
    }

    /// Completed steps over total steps.
    pub fn progress(&self) -> f64 {
        self.plan.progress()
    }

    /// Moves to `to` if the edge is permitted.
    pub fn transition(&mut self, to: PlanStatus) -> Result<(), CodeplanError> {
        let from = self.plan.status;
        if !is_permitted(from, to) {
            error!(
                plan_id = self.plan.id.as_str(),
                %from,
                %to,
                "rejected invalid plan transition"
            );
            return Err(CodeplanError::InvalidTransition { from, to });
        }
        debug!(plan_id = self.plan.id.as_str(), %from, %to, "plan transition");
        self.plan.status = to;
        Ok(())
    }

    /// Approves the plan: `awaiting_confirmation -> approved -> executing`.
    ///
    /// Outside `awaiting_confirmation` this changes nothing and returns the
    /// rejected transition.
    pub fn approve(&mut self) -> Result<(), CodeplanError> {
        self.transition(PlanStatus::Approved)?;
        self.transition(PlanStatus::Executing)?;
        info!(
            plan_id = self.plan.id.as_str(),
            steps = self.plan.steps.len(),
            "plan approved"
        );
        Ok(())
    }

    /// Rejects the plan: `awaiting_confirmation -> cancelled`. Steps are untouched.
    pub fn reject(&mut self, reason: Option<String>) -> Result<(), CodeplanError> {
        self.transition(PlanStatus::Cancelled)?;
        info!(
            plan_id = self.plan.id.as_str(),
            reason = reason.as_deref().unwrap_or(""),
            "plan rejected"
        );
        self.plan.rejection_reason = reason;
        Ok(())
    }

    /// Index of the next step to run while executing.
    pub fn next_step(&self) -> Option<usize> {
        if self.plan.status != PlanStatus::Executing {
            return None;
        }
        self.plan
            .steps
            .iter()
            .position(|s| s.status == StepStatus::Pending)
    }

    /// Marks step `index` in progress. Only the next pending step may start.
    pub fn start_step(&mut self, index: usize) -> Result<(), CodeplanError> {
        if self.next_step() != Some(index) {
            warn!(
                plan_id = self.plan.id.as_str(),
                index,
                status = %self.plan.status,
                "step started out of order"
            );
            return Err(CodeplanError::Internal(format!(
                "step {index} of plan {} cannot start now",
                self.plan.id
            )));
        }
        self.plan.steps[index].status = StepStatus::InProgress;
        Ok(())
    }

    /// Marks an in-progress step completed; completes the plan after the last step.
    pub fn complete_step(&mut self, index: usize) -> Result<(), CodeplanError> {
        self.expect_in_progress(index)?;
        self.plan.steps[index].status = StepStatus::Completed;
        if self
            .plan
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Completed)
        {
            self.transition(PlanStatus::Completed)?;
            info!(plan_id = self.plan.id.as_str(), "plan completed");
        }
        Ok(())
    }

    /// Marks an in-progress step failed, skips every later step and fails the plan.
    pub fn fail_step(
        &mut self,
        index: usize,
        message: impl Into<String>,
    ) -> Result<(), CodeplanError> {
        self.expect_in_progress(index)?;
        let message = message.into();
        let step = &mut self.plan.steps[index];
        step.status = StepStatus::Failed;
        step.error = Some(message.clone());
        for later in &mut self.plan.steps[index + 1..] {
            later.status = StepStatus::Skipped;
        }
        self.plan.failed_step = Some(index);
        self.transition(PlanStatus::Failed)?;
        warn!(
            plan_id = self.plan.id.as_str(),
            step = index + 1,
            error = message.as_str(),
            "plan failed"
        );
        Ok(())
    }

    fn expect_in_progress(&self, index: usize) -> Result<(), CodeplanError> {
        match self.plan.steps.get(index) {
            Some(step) if step.status == StepStatus::InProgress => Ok(()),
            _ => Err(CodeplanError::Internal(format!(
                "step {index} of plan {} is not in progress",
                self.plan.id
            ))),
        }
    }

    /// Runs every step in index order through `executor`.
    ///
    /// The plan must be `executing` (see [`approve`](Self::approve)).
    /// `observe` sees a snapshot after every status change. Returns
    /// [`CodeplanError::StepFailed`] naming the failed step.
    pub async fn execute<E, F>(&mut self, executor: &E, mut observe: F) -> Result<(), CodeplanError>
    where
        E: StepExecutor + ?Sized,
        F: FnMut(&Plan) + Send,
    {
        if self.plan.status != PlanStatus::Executing {
            return Err(CodeplanError::Internal(format!(
                "plan {} is {}, not executing",
                self.plan.id, self.plan.status
            )));
        }

        if self.plan.steps.is_empty() {
            self.transition(PlanStatus::Completed)?;
            observe(&self.plan);
            return Ok(());
        }

        while let Some(index) = self.next_step() {
            self.start_step(index)?;
            observe(&self.plan);

            let outcome = executor
                .execute(&self.plan, index, &self.plan.steps[index])
                .await;

            match outcome {
                Ok(()) => {
                    self.complete_step(index)?;
                    observe(&self.plan);
                }
                Err(message) => {
                    self.fail_step(index, message.clone())?;
                    observe(&self.plan);
                    return Err(CodeplanError::StepFailed {
                        index,
                        step_id: self.plan.steps[index].id.clone(),
                        message,
                    });
                }
            }
        }

        Ok(())
    }
}
