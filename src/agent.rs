//! The editorial agent: the one capability the pipeline depends on.
//!
//! An agent turns a stage request into a [`StageReport`]. Optionally it can
//! also build a [`SeriesBible`] from a text and rewrite a text to address a
//! set of issues. Agents are stateless with respect to the store; the desk
//! loads their inputs and persists their outputs.

pub mod command;

pub use command::CommandAgent;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::model::{Issue, SeriesBible, StageId, StageReport};

/// Errors reported by an agent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// The agent could not produce a result.
    #[error("agent failed: {0}")]
    Failed(String),

    /// The agent produced output that is not a valid result.
    #[error("agent returned malformed output: {0}")]
    Malformed(String),

    /// The agent does not offer this capability.
    #[error("agent does not support {0}")]
    Unsupported(&'static str),

    /// The call was cancelled before it finished.
    #[error("cancelled")]
    Cancelled,
}

/// A cancellation signal for one agent call.
///
/// Cancellation is requested by creating a marker file, so it can come from
/// another process. Agents poll [`CancelToken::is_cancelled`] and stop where
/// stopping is safe.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    marker: Option<PathBuf>,
}

impl CancelToken {
    /// A token that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        Self::default()
    }

    /// A token that is cancelled once `marker` exists.
    #[must_use]
    pub fn watching(marker: impl Into<PathBuf>) -> Self {
        Self {
            marker: Some(marker.into()),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.marker.as_deref().is_some_and(Path::exists)
    }
}

/// What a stage run sends to the agent.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AgentRequest<'a> {
    pub stage: StageId,
    /// The current manuscript text.
    pub text: &'a str,
    /// The Series Bible, for every stage that reads it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bible: Option<&'a SeriesBible>,
    #[serde(skip)]
    pub cancel: &'a CancelToken,
}

/// An editorial agent.
///
/// Implementations must be safe to call from several threads at once, for
/// different projects.
pub trait EditorialAgent: Send + Sync {
    /// Analyzes a text for one stage.
    fn analyze(&self, request: &AgentRequest<'_>) -> Result<StageReport, AgentError>;

    /// Builds a Series Bible from a manuscript.
    fn extract_bible(&self, text: &str) -> Result<SeriesBible, AgentError> {
        let _ = text;
        Err(AgentError::Unsupported("bible extraction"))
    }

    /// Rewrites `text` to address `issues`, returning the new text.
    fn apply_fixes(&self, text: &str, issues: &[Issue]) -> Result<String, AgentError> {
        let _ = (text, issues);
        Err(AgentError::Unsupported("applying fixes"))
    }
}
