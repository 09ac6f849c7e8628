//! Workflow state: where one manuscript stands in the pipeline.
//!
//! The transitions live in [`crate::workflow`]; this module only holds the
//! record and its read-side helpers.

use std::collections::BTreeMap;
use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::stage::{CurrentStage, PIPELINE, StageId};

/// Status of a single stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl StageStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage statuses, flattened into `workflow.json` as `<stage>_status` keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StageStatuses {
    #[serde(default)]
    acquisitions_status: StageStatus,
    #[serde(default)]
    developmental_status: StageStatus,
    #[serde(default)]
    line_status: StageStatus,
    #[serde(default)]
    copy_status: StageStatus,
    #[serde(default)]
    proof_status: StageStatus,
    #[serde(default)]
    cold_read_status: StageStatus,
}

impl StageStatuses {
    fn get(&self, stage: StageId) -> StageStatus {
        match stage {
            StageId::Acquisitions => self.acquisitions_status,
            StageId::Developmental => self.developmental_status,
            StageId::Line => self.line_status,
            StageId::Copy => self.copy_status,
            StageId::Proof => self.proof_status,
            StageId::ColdRead => self.cold_read_status,
        }
    }

    fn slot(&mut self, stage: StageId) -> &mut StageStatus {
        match stage {
            StageId::Acquisitions => &mut self.acquisitions_status,
            StageId::Developmental => &mut self.developmental_status,
            StageId::Line => &mut self.line_status,
            StageId::Copy => &mut self.copy_status,
            StageId::Proof => &mut self.proof_status,
            StageId::ColdRead => &mut self.cold_read_status,
        }
    }
}

/// The workflow record for one manuscript.
///
/// Mutated only through the transitions in [`crate::workflow`], which keep
/// `current_stage` in sync with the statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// The first required stage that is not completed, or `complete`.
    pub current_stage: CurrentStage,

    #[serde(flatten)]
    statuses: StageStatuses,

    /// Most recent failure message for stages whose status is `failed`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<StageId, String>,

    /// Issues reported across every completed run, reruns included.
    #[serde(default)]
    pub total_issues_found: usize,

    /// When the first stage run began.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,

    /// When every required stage last became completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowState {
    /// A fresh workflow: every stage `not_started`, acquisitions up next.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current_stage: CurrentStage::Stage(StageId::Acquisitions),
            statuses: StageStatuses::default(),
            errors: BTreeMap::new(),
            total_issues_found: 0,
            started_at: None,
            completed_at: None,
        }
    }

    #[must_use]
    pub fn status(&self, stage: StageId) -> StageStatus {
        self.statuses.get(stage)
    }

    /// Every stage and its status, in pipeline order.
    pub fn stages(&self) -> impl Iterator<Item = (StageId, StageStatus)> + '_ {
        StageId::ALL
            .into_iter()
            .map(|stage| (stage, self.status(stage)))
    }

    /// Stages whose status is `completed`, in pipeline order.
    pub fn completed_stages(&self) -> impl Iterator<Item = StageId> + '_ {
        self.stages()
            .filter(|(_, status)| *status == StageStatus::Completed)
            .map(|(stage, _)| stage)
    }

    /// Whether every required stage is completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.current_stage == CurrentStage::Complete
    }

    pub(crate) fn set_status(&mut self, stage: StageId, status: StageStatus) {
        *self.statuses.slot(stage) = status;
        self.current_stage = self.first_pending_required();
    }

    /// First required stage not yet completed; optional stages never gate.
    fn first_pending_required(&self) -> CurrentStage {
        PIPELINE
            .iter()
            .filter(|d| d.required)
            .find(|d| self.status(d.stage) != StageStatus::Completed)
            .map_or(CurrentStage::Complete, |d| CurrentStage::Stage(d.stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_workflow_has_every_stage_not_started() {
        let state = WorkflowState::new();
        assert_eq!(state.stages().count(), 6);
        assert!(
            state
                .stages()
                .all(|(_, status)| status == StageStatus::NotStarted)
        );
        assert_eq!(
            state.current_stage,
            CurrentStage::Stage(StageId::Acquisitions)
        );
    }

    #[test]
    fn serializes_flat_status_keys() {
        let mut state = WorkflowState::new();
        state.set_status(StageId::Acquisitions, StageStatus::Completed);

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["current_stage"], "developmental");
        assert_eq!(value["acquisitions_status"], "completed");
        assert_eq!(value["cold_read_status"], "not_started");
        assert!(value.get("errors").is_none());

        let back: WorkflowState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn missing_status_keys_default_to_not_started() {
        let state: WorkflowState =
            serde_json::from_str(r#"{"current_stage": "acquisitions"}"#).unwrap();
        assert_eq!(state.status(StageId::Proof), StageStatus::NotStarted);
    }

    #[test]
    fn optional_stage_does_not_gate_completion() {
        let mut state = WorkflowState::new();
        for stage in StageId::ALL.into_iter().filter(|s| s.is_required()) {
            state.set_status(stage, StageStatus::Completed);
        }
        assert!(state.is_complete());
        assert_eq!(state.status(StageId::ColdRead), StageStatus::NotStarted);
    }
}
