//! The editorial pipeline: stage identifiers and the static descriptor table.
//!
//! Ordering lives here as data. The workflow machine asks the table for a
//! stage's predecessor instead of hard-coding one gate per stage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::workflow::{StageStatus, WorkflowState};

/// One named step of the editorial pipeline.
///
/// Variants are declared in pipeline order, so the derived `Ord` sorts
/// stages the way the pipeline runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Market assessment; produces an editorial letter.
    Acquisitions,
    Developmental,
    Line,
    Copy,
    Proof,
    /// Optional fresh-eyes read after proofing.
    ColdRead,
}

/// A stage identifier that is not one of the six pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage: {0}")]
pub struct UnknownStage(pub String);

/// Static description of a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub stage: StageId,

    /// Whether the pipeline counts as complete without this stage.
    pub required: bool,

    /// The stage that must be completed before this one may run.
    pub predecessor: Option<StageId>,
}

/// The canonical pipeline, in order.
pub static PIPELINE: [StageDescriptor; 6] = [
    StageDescriptor {
        stage: StageId::Acquisitions,
        required: true,
        predecessor: None,
    },
    StageDescriptor {
        stage: StageId::Developmental,
        required: true,
        predecessor: Some(StageId::Acquisitions),
    },
    StageDescriptor {
        stage: StageId::Line,
        required: true,
        predecessor: Some(StageId::Developmental),
    },
    StageDescriptor {
        stage: StageId::Copy,
        required: true,
        predecessor: Some(StageId::Line),
    },
    StageDescriptor {
        stage: StageId::Proof,
        required: true,
        predecessor: Some(StageId::Copy),
    },
    StageDescriptor {
        stage: StageId::ColdRead,
        required: false,
        predecessor: Some(StageId::Proof),
    },
];

impl StageId {
    /// Every stage, in pipeline order.
    pub const ALL: [Self; 6] = [
        Self::Acquisitions,
        Self::Developmental,
        Self::Line,
        Self::Copy,
        Self::Proof,
        Self::ColdRead,
    ];

    /// The identifier used in file names, reports, and the wire format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Acquisitions => "acquisitions",
            Self::Developmental => "developmental",
            Self::Line => "line",
            Self::Copy => "copy",
            Self::Proof => "proof",
            Self::ColdRead => "cold_read",
        }
    }

    /// This stage's row in [`PIPELINE`].
    ///
    /// The table is indexed by declaration order.
    #[must_use]
    pub fn descriptor(self) -> &'static StageDescriptor {
        &PIPELINE[self as usize]
    }

    #[must_use]
    pub fn predecessor(self) -> Option<Self> {
        self.descriptor().predecessor
    }

    #[must_use]
    pub fn is_required(self) -> bool {
        self.descriptor().required
    }

    /// Acquisitions answers with a free-text letter; every other stage with issues.
    #[must_use]
    pub const fn produces_letter(self) -> bool {
        matches!(self, Self::Acquisitions)
    }

    /// Whether the agent receives the Series Bible as consistency context.
    #[must_use]
    pub const fn reads_bible(self) -> bool {
        !self.produces_letter()
    }

    /// Human-facing heading, e.g. "Cold Read".
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Acquisitions => "Acquisitions",
            Self::Developmental => "Developmental",
            Self::Line => "Line",
            Self::Copy => "Copy",
            Self::Proof => "Proof",
            Self::ColdRead => "Cold Read",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// Where the pipeline stands: the next stage to run, or done.
///
/// Serialized as the stage id or the literal `"complete"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum CurrentStage {
    Stage(StageId),
    Complete,
}

impl CurrentStage {
    pub const COMPLETE: &'static str = "complete";

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stage(stage) => stage.as_str(),
            Self::Complete => Self::COMPLETE,
        }
    }
}

impl fmt::Display for CurrentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<CurrentStage> for String {
    fn from(current: CurrentStage) -> Self {
        current.as_str().to_string()
    }
}

impl TryFrom<String> for CurrentStage {
    type Error = UnknownStage;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == Self::COMPLETE {
            Ok(Self::Complete)
        } else {
            value.parse().map(Self::Stage)
        }
    }
}

/// The stage that follows `current` in the table, or `Complete` after the last.
#[must_use]
pub fn next_stage(current: StageId) -> CurrentStage {
    PIPELINE
        .iter()
        .skip_while(|d| d.stage != current)
        .nth(1)
        .map_or(CurrentStage::Complete, |d| CurrentStage::Stage(d.stage))
}

/// Whether `stage` is waiting to be run: its predecessor is completed and it
/// has not completed itself.
///
/// A completed stage may still be rerun on request; that is an explicit
/// rerun, not pending work, so it is not reported as runnable here.
#[must_use]
pub fn is_runnable(state: &WorkflowState, stage: StageId) -> bool {
    let predecessor_done = stage
        .predecessor()
        .is_none_or(|p| state.status(p) == StageStatus::Completed);
    predecessor_done && state.status(stage) != StageStatus::Completed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_table_chains_predecessors_in_order() {
        assert_eq!(PIPELINE[0].predecessor, None);
        for pair in PIPELINE.windows(2) {
            assert_eq!(pair[1].predecessor, Some(pair[0].stage));
        }
        let order: Vec<StageId> = PIPELINE.iter().map(|d| d.stage).collect();
        assert_eq!(order, StageId::ALL);
        for stage in StageId::ALL {
            assert_eq!(stage.descriptor().stage, stage);
        }
    }

    #[test]
    fn cold_read_is_the_only_optional_stage() {
        let optional: Vec<StageId> = StageId::ALL
            .into_iter()
            .filter(|s| !s.is_required())
            .collect();
        assert_eq!(optional, vec![StageId::ColdRead]);
    }

    #[test]
    fn parses_every_identifier_and_rejects_others() {
        for stage in StageId::ALL {
            assert_eq!(stage.as_str().parse::<StageId>().unwrap(), stage);
        }
        let err = "bogus".parse::<StageId>().unwrap_err();
        assert_eq!(err, UnknownStage("bogus".into()));
        assert!("Line".parse::<StageId>().is_err());
    }

    #[test]
    fn next_stage_walks_the_table() {
        assert_eq!(
            next_stage(StageId::Acquisitions),
            CurrentStage::Stage(StageId::Developmental)
        );
        assert_eq!(
            next_stage(StageId::Proof),
            CurrentStage::Stage(StageId::ColdRead)
        );
        assert_eq!(next_stage(StageId::ColdRead), CurrentStage::Complete);
    }

    #[test]
    fn current_stage_serializes_as_plain_string() {
        let json = serde_json::to_string(&CurrentStage::Stage(StageId::ColdRead)).unwrap();
        assert_eq!(json, "\"cold_read\"");
        let json = serde_json::to_string(&CurrentStage::Complete).unwrap();
        assert_eq!(json, "\"complete\"");

        let back: CurrentStage = serde_json::from_str("\"line\"").unwrap();
        assert_eq!(back, CurrentStage::Stage(StageId::Line));
        assert!(serde_json::from_str::<CurrentStage>("\"nope\"").is_err());
    }

    #[test]
    fn runnable_requires_completed_predecessor() {
        let mut state = WorkflowState::new();
        assert!(is_runnable(&state, StageId::Acquisitions));
        assert!(!is_runnable(&state, StageId::Developmental));

        state.begin(StageId::Acquisitions).unwrap();
        state.complete(StageId::Acquisitions, 0).unwrap();

        assert!(!is_runnable(&state, StageId::Acquisitions));
        assert!(is_runnable(&state, StageId::Developmental));
        assert!(!is_runnable(&state, StageId::Line));
    }
}
