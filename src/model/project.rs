//! Projects: one manuscript and everything the pipeline produced for it.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::bible::SeriesBible;
use super::report::StageReport;
use super::stage::{CurrentStage, StageId};
use super::workflow::WorkflowState;

/// The text under review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manuscript {
    /// Opaque, immutable project id.
    pub id: String,
    pub title: String,
    /// The text as uploaded. Never rewritten.
    pub original_text: String,
    /// The latest accepted version.
    pub current_text: String,
    pub word_count: usize,
    pub created_at: Timestamp,
    pub last_modified: Timestamp,
}

/// Project metadata as stored in `project.json`.
///
/// The texts live in their own files so each can be replaced atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub id: String,
    pub title: String,
    pub word_count: usize,
    pub created_at: Timestamp,
    pub last_modified: Timestamp,
}

/// The aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub manuscript: Manuscript,
    pub workflow: WorkflowState,
    pub bible: SeriesBible,
    /// Text snapshots keyed by version label.
    pub versions: BTreeMap<String, String>,
    /// Persisted reports keyed by stage.
    pub reports: BTreeMap<StageId, StageReport>,
}

impl Project {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.manuscript.id
    }
}

/// One row of a project listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    pub id: String,
    pub title: String,
    pub current_stage: CurrentStage,
}

/// A stored text snapshot, without its contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub label: String,
    pub bytes: u64,
    /// Hex SHA-256 of the text.
    pub sha256: String,
    pub modified_at: Option<Timestamp>,
}

/// Whitespace-separated word count.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Hex SHA-256 of a text, used to tie reports and history to exact inputs.
#[must_use]
pub fn text_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
