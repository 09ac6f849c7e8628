//! History: the append-only ledger of what happened to a project.

use std::fmt;
use std::str::FromStr;

use jiff::Timestamp;
use serde::Serialize;

use super::stage::StageId;

/// What kind of event a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEvent {
    Created,
    /// The project was copied from another; detail names the source.
    Duplicated,
    Renamed,
    StageStarted,
    StageCompleted,
    StageFailed,
    StageCancelled,
    FixesApplied,
    BibleUpdated,
    VersionRestored,
}

impl HistoryEvent {
    const ALL: [Self; 10] = [
        Self::Created,
        Self::Duplicated,
        Self::Renamed,
        Self::StageStarted,
        Self::StageCompleted,
        Self::StageFailed,
        Self::StageCancelled,
        Self::FixesApplied,
        Self::BibleUpdated,
        Self::VersionRestored,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Duplicated => "duplicated",
            Self::Renamed => "renamed",
            Self::StageStarted => "stage_started",
            Self::StageCompleted => "stage_completed",
            Self::StageFailed => "stage_failed",
            Self::StageCancelled => "stage_cancelled",
            Self::FixesApplied => "fixes_applied",
            Self::BibleUpdated => "bible_updated",
            Self::VersionRestored => "version_restored",
        }
    }
}

impl fmt::Display for HistoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| format!("unknown history event: {s}"))
    }
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Position in the ledger, starting at 1.
    pub seq: i64,
    pub event: HistoryEvent,
    pub stage: Option<StageId>,
    /// Free-text detail: an error message, a digest, a version label.
    pub detail: Option<String>,
    pub recorded_at: Timestamp,
}
