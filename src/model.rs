//! Core data model for the editorial desk.
//!
//! Manuscripts, the stage table, workflow state, stage reports, the Series
//! Bible, and the history ledger.

mod bible;
mod history;
mod project;
mod report;
mod stage;
mod workflow;

pub use bible::{BibleError, Entity, EntityKind, SeriesBible};
pub use history::{HistoryEntry, HistoryEvent};
pub use project::{
    Manuscript, Project, ProjectMeta, ProjectSummary, VersionInfo, text_digest, word_count,
};
pub use report::{Issue, Severity, StageReport};
pub use stage::{
    CurrentStage, PIPELINE, StageDescriptor, StageId, UnknownStage, is_runnable, next_stage,
};
pub use workflow::{StageStatus, WorkflowState};
