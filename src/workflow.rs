//! The workflow state machine.
//!
//! ```text
//! not_started ──begin──▶ in_progress ──complete──▶ completed
//!                          │   ▲                       │
//!                        fail  └──────begin (retry or rerun)
//!                          ▼   │
//!                         failed
//! ```
//!
//! [`WorkflowState::can_run`] is the only ordering gate: a stage may begin
//! only once its predecessor in [`PIPELINE`](crate::model::PIPELINE) is
//! completed. Every transition recomputes `current_stage`.

use jiff::Timestamp;

use crate::model::{StageId, StageStatus, WorkflowState};

/// Rejected workflow transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("cannot run {stage}: {missing} must be completed first")]
    StageOrderViolation { stage: StageId, missing: StageId },

    #[error("cannot {action} {stage}: stage is {status}")]
    InvalidTransition {
        stage: StageId,
        action: &'static str,
        status: StageStatus,
    },
}

impl WorkflowState {
    /// Checks that `stage`'s predecessor is completed.
    ///
    /// Reruns of a completed stage and retries of a failed or abandoned one
    /// pass this gate.
    pub fn can_run(&self, stage: StageId) -> Result<(), WorkflowError> {
        match stage.predecessor() {
            Some(missing) if self.status(missing) != StageStatus::Completed => {
                Err(WorkflowError::StageOrderViolation { stage, missing })
            }
            _ => Ok(()),
        }
    }

    /// Marks `stage` as `in_progress`.
    pub fn begin(&mut self, stage: StageId) -> Result<(), WorkflowError> {
        self.can_run(stage)?;
        self.set_status(stage, StageStatus::InProgress);
        self.errors.remove(&stage);
        self.started_at.get_or_insert_with(Timestamp::now);
        if !self.is_complete() {
            self.completed_at = None;
        }
        Ok(())
    }

    /// Marks an `in_progress` stage as `completed`.
    pub fn complete(&mut self, stage: StageId, issues_found: usize) -> Result<(), WorkflowError> {
        self.require_in_progress(stage, "complete")?;
        self.set_status(stage, StageStatus::Completed);
        self.total_issues_found += issues_found;
        if self.is_complete() && self.completed_at.is_none() {
            self.completed_at = Some(Timestamp::now());
        }
        Ok(())
    }

    /// Marks an `in_progress` stage as `failed`, keeping the error message.
    pub fn fail(&mut self, stage: StageId, error: impl Into<String>) -> Result<(), WorkflowError> {
        self.require_in_progress(stage, "fail")?;
        self.set_status(stage, StageStatus::Failed);
        self.errors.insert(stage, error.into());
        Ok(())
    }

    fn require_in_progress(&self, stage: StageId, action: &'static str) -> Result<(), WorkflowError> {
        match self.status(stage) {
            StageStatus::InProgress => Ok(()),
            status => Err(WorkflowError::InvalidTransition {
                stage,
                action,
                status,
            }),
        }
    }
}
