//! The editorial desk: the operations callers use.
//!
//! A [`Desk`] ties the store, the workflow machine, and an agent together.
//! Every operation that mutates a project runs inside that project's
//! exclusive section. Sections are keyed by project id, so different
//! projects never wait on each other. Entry uses `try_lock`: a second
//! caller gets [`DeskError::ProjectBusy`] instead of queueing behind an
//! agent call that may take minutes.
//!
//! History ledger writes are best effort: a failed write is logged and never
//! changes an operation's outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, TryLockError};

use serde::Serialize;
use uuid::Uuid;

use crate::agent::{AgentError, AgentRequest, CancelToken, EditorialAgent};
use crate::diff::{DiffLine, diff_lines};
use crate::model::{
    BibleError, CurrentStage, HistoryEntry, HistoryEvent, Issue, Manuscript, Project,
    ProjectSummary, SeriesBible, StageId, StageReport, StageStatus, UnknownStage, VersionInfo,
    WorkflowState, text_digest, word_count,
};
use crate::report::ConsolidatedReport;
use crate::storage::{Storage, StorageError};
use crate::workflow::WorkflowError;

/// Errors surfaced by desk operations.
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("project already exists: {0}")]
    DuplicateProject(String),

    #[error(transparent)]
    UnknownStage(#[from] UnknownStage),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("invalid bible: {0}")]
    Bible(#[from] BibleError),

    #[error("project {0} is busy with another operation")]
    ProjectBusy(String),

    #[error("no {stage} report for project {id}")]
    ReportNotFound { id: String, stage: StageId },

    #[error("{stage} report has {count} issues, no issue {index}")]
    IssueOutOfRange {
        stage: StageId,
        index: usize,
        count: usize,
    },

    #[error("{0} report has no issues to fix")]
    NothingToFix(StageId),

    #[error("no editorial agent configured")]
    NoAgent,

    #[error("no stage is running for project {0}")]
    NothingRunning(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for DeskError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ProjectNotFound(id) => Self::ProjectNotFound(id),
            StorageError::ProjectAlreadyExists(id) => Self::DuplicateProject(id),
            other => Self::Storage(other),
        }
    }
}

pub type Result<T> = core::result::Result<T, DeskError>;

/// The outcome of a successful stage run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageResult {
    pub stage: StageId,
    pub report: StageReport,
    /// Where the pipeline stands after this run.
    pub next_stage: CurrentStage,
    /// Hex SHA-256 of the text the agent analyzed.
    pub text_digest: String,
}

/// The outcome of applying fixes from a stage report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixesApplied {
    pub stage: StageId,
    /// The version label the new text was stored under.
    pub label: String,
    pub issues_applied: usize,
    pub text_digest: String,
}

/// Per-project exclusive sections.
#[derive(Debug, Default)]
struct ProjectLocks {
    sections: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ProjectLocks {
    fn section(&self, id: &str) -> Arc<Mutex<()>> {
        let mut sections = self.sections.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(sections.entry(id.to_string()).or_default())
    }

    /// Drops the project's section once no caller holds a handle to it.
    fn release(&self, id: &str) {
        let mut sections = self.sections.lock().unwrap_or_else(PoisonError::into_inner);
        if sections
            .get(id)
            .is_some_and(|section| Arc::strong_count(section) == 1)
        {
            sections.remove(id);
        }
    }
}

/// The editorial desk.
pub struct Desk {
    storage: Storage,
    agent: Option<Arc<dyn EditorialAgent>>,
    locks: ProjectLocks,
}

impl Desk {
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            agent: None,
            locks: ProjectLocks::default(),
        }
    }

    #[must_use]
    pub fn with_agent(mut self, agent: Arc<dyn EditorialAgent>) -> Self {
        self.agent = Some(agent);
        self
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Creates a project under a fresh id.
    pub fn create_project(&self, title: &str, text: &str) -> Result<Project> {
        self.create_project_with_id(&Uuid::new_v4().to_string(), title, text)
    }

    /// Creates a project under a caller-chosen id.
    pub fn create_project_with_id(&self, id: &str, title: &str, text: &str) -> Result<Project> {
        let project = self.storage.create_project(id, title, text)?;
        tracing::info!(project = id, words = project.manuscript.word_count, "project created");
        Ok(project)
    }

    /// Runs one stage of the pipeline for a project.
    ///
    /// The stage must be runnable per [`WorkflowState::can_run`]. On agent
    /// failure the stage is marked failed and the error returned; the desk
    /// never retries. A run stopped by [`Desk::cancel_stage`] ends the same
    /// way with [`AgentError::Cancelled`]. On success the report and a version of the analyzed
    /// text are stored under the stage's id, replacing any earlier run's.
    pub fn run_stage(&self, id: &str, stage: &str) -> Result<StageResult> {
        let stage: StageId = stage.parse()?;
        self.require_project(id)?;
        self.exclusive(id, || self.run_stage_locked(id, stage))
    }

    #[tracing::instrument(skip(self))]
    fn run_stage_locked(&self, id: &str, stage: StageId) -> Result<StageResult> {
        let mut workflow = self.storage.load_workflow(id)?;
        workflow.can_run(stage)?;
        let agent = self.agent()?;

        let text = self.storage.load_current_text(id)?;
        let bible = if stage.reads_bible() {
            Some(self.storage.load_bible(id)?)
        } else {
            None
        };
        let digest = text_digest(&text);
        self.storage.clear_cancel(id)?;
        let cancel = CancelToken::watching(self.storage.cancel_marker(id)?);

        workflow.begin(stage)?;
        self.storage.save_workflow(id, &workflow)?;
        let started = workflow.clone();
        self.note(id, HistoryEvent::StageStarted, Some(stage), Some(&digest));
        tracing::info!(words = word_count(&text), "stage started");

        let request = AgentRequest {
            stage,
            text: &text,
            bible: bible.as_ref(),
            cancel: &cancel,
        };
        let outcome = analyze(agent, &request)
            .map_err(DeskError::from)
            .and_then(|report| self.finish_stage(id, stage, &text, report, &mut workflow));
        if let Err(e) = self.storage.clear_cancel(id) {
            tracing::warn!(error = %e, "could not clear cancel marker");
        }

        match outcome {
            Ok(report) => {
                let issues = report.issue_count();
                self.note(
                    id,
                    HistoryEvent::StageCompleted,
                    Some(stage),
                    Some(&format!("{issues} issues")),
                );
                tracing::info!(issues, next = %workflow.current_stage, "stage completed");
                Ok(StageResult {
                    stage,
                    report,
                    next_stage: workflow.current_stage,
                    text_digest: digest,
                })
            }
            Err(e) => {
                self.abandon_stage(id, stage, started, &e);
                Err(e)
            }
        }
    }

    /// Stores a successful run's outputs and marks the stage completed.
    fn finish_stage(
        &self,
        id: &str,
        stage: StageId,
        text: &str,
        report: StageReport,
        workflow: &mut WorkflowState,
    ) -> Result<StageReport> {
        self.storage.save_stage_report(id, stage, &report)?;
        self.storage.save_manuscript_version(id, stage.as_str(), text)?;
        workflow.complete(stage, report.issue_count())?;
        self.storage.save_workflow(id, workflow)?;
        Ok(report)
    }

    /// Marks a run that did not complete as failed. Best effort: the run's
    /// own error is what the caller gets.
    fn abandon_stage(
        &self,
        id: &str,
        stage: StageId,
        mut workflow: WorkflowState,
        error: &DeskError,
    ) {
        let message = error.to_string();
        match workflow.fail(stage, &message) {
            Ok(()) => {
                if let Err(e) = self.storage.save_workflow(id, &workflow) {
                    tracing::error!(
                        error = %e,
                        "could not record stage failure; stage left in progress"
                    );
                }
            }
            Err(e) => tracing::error!(error = %e, "could not mark stage failed"),
        }
        let event = if matches!(error, DeskError::Agent(AgentError::Cancelled)) {
            HistoryEvent::StageCancelled
        } else {
            HistoryEvent::StageFailed
        };
        self.note(id, event, Some(stage), Some(&message));
        tracing::warn!(error = %message, "stage failed");
    }

    /// The project's workflow state.
    pub fn get_status(&self, id: &str) -> Result<WorkflowState> {
        Ok(self.storage.load_workflow(id)?)
    }

    /// The persisted report of one stage.
    pub fn get_stage_report(&self, id: &str, stage: &str) -> Result<StageReport> {
        let stage: StageId = stage.parse()?;
        self.storage
            .load_stage_report(id, stage)?
            .ok_or_else(|| DeskError::ReportNotFound {
                id: id.to_string(),
                stage,
            })
    }

    /// Summaries of every project, ordered by id.
    pub fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let mut summaries = self
            .storage
            .list_projects()?
            .collect::<core::result::Result<Vec<_>, _>>()?;
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }

    /// The full project aggregate.
    pub fn get_project(&self, id: &str) -> Result<Project> {
        self.storage
            .load_project(id)?
            .ok_or_else(|| DeskError::ProjectNotFound(id.to_string()))
    }

    /// Every completed stage's report and the current bible.
    ///
    /// Never fails because stages are missing; a partial report is valid.
    pub fn generate_complete_report(&self, id: &str) -> Result<ConsolidatedReport> {
        Ok(ConsolidatedReport::from_project(&self.get_project(id)?))
    }

    pub fn get_bible(&self, id: &str) -> Result<SeriesBible> {
        Ok(self.storage.load_bible(id)?)
    }

    /// Replaces the project's bible wholesale.
    ///
    /// Returns the archive number of the bible it replaced, if any.
    pub fn update_bible(&self, id: &str, bible: &SeriesBible) -> Result<Option<u64>> {
        bible.validate()?;
        self.require_project(id)?;
        self.exclusive(id, || self.replace_bible(id, bible, "updated"))
    }

    /// Builds a bible from the original text with the agent and stores it.
    pub fn extract_bible(&self, id: &str) -> Result<SeriesBible> {
        self.require_project(id)?;
        let agent = self.agent()?;
        self.exclusive(id, || {
            let manuscript = self.storage.load_manuscript(id)?;
            let bible = agent.extract_bible(&manuscript.original_text)?;
            bible.validate()?;
            self.replace_bible(id, &bible, "extracted")?;
            Ok(bible)
        })
    }

    pub fn list_bible_versions(&self, id: &str) -> Result<Vec<u64>> {
        Ok(self.storage.list_bible_versions(id)?)
    }

    /// Makes an archived bible current again, archiving the current one.
    pub fn restore_bible_version(&self, id: &str, n: u64) -> Result<Option<u64>> {
        self.require_project(id)?;
        self.exclusive(id, || {
            let bible = self.storage.load_bible_version(id, n)?;
            self.replace_bible(id, &bible, &format!("restored from #{n}"))
        })
    }

    fn replace_bible(&self, id: &str, bible: &SeriesBible, how: &str) -> Result<Option<u64>> {
        let archived = self.storage.save_bible(id, bible)?;
        let detail = format!("{how}: {} entities", bible.len());
        self.note(id, HistoryEvent::BibleUpdated, None, Some(&detail));
        tracing::info!(project = id, entities = bible.len(), ?archived, "bible {how}");
        Ok(archived)
    }

    /// Asks the agent to apply issues from a stage report to the current text.
    ///
    /// `indices` are zero-based positions in the report's issue list; empty
    /// means every issue. The result becomes the current text and is stored
    /// as `<stage>_fixes_applied`.
    pub fn apply_fixes(&self, id: &str, stage: &str, indices: &[usize]) -> Result<FixesApplied> {
        let stage: StageId = stage.parse()?;
        self.require_project(id)?;
        let agent = self.agent()?;
        self.exclusive(id, || {
            let report = self.get_stage_report(id, stage.as_str())?;
            let selected = select_issues(stage, report.issue_list(), indices)?;
            let text = self.storage.load_current_text(id)?;

            let fixed = agent.apply_fixes(&text, &selected)?;
            let label = format!("{stage}_fixes_applied");
            self.storage.save_manuscript_version(id, &label, &fixed)?;
            let digest = text_digest(&fixed);
            self.note(
                id,
                HistoryEvent::FixesApplied,
                Some(stage),
                Some(&format!("{} issues -> {digest}", selected.len())),
            );
            tracing::info!(project = id, %stage, issues = selected.len(), "fixes applied");

            Ok(FixesApplied {
                stage,
                label,
                issues_applied: selected.len(),
                text_digest: digest,
            })
        })
    }

    pub fn list_versions(&self, id: &str) -> Result<Vec<VersionInfo>> {
        Ok(self.storage.list_versions(id)?)
    }

    /// Makes a stored version the current text. Returns the backup label of
    /// the text it replaced.
    pub fn restore_version(&self, id: &str, label: &str) -> Result<String> {
        self.require_project(id)?;
        self.exclusive(id, || {
            let backup = self.storage.restore_version(id, label)?;
            self.note(
                id,
                HistoryEvent::VersionRestored,
                None,
                Some(&format!("{label} (previous text saved as {backup})")),
            );
            tracing::info!(project = id, label, backup, "version restored");
            Ok(backup)
        })
    }

    /// Marks a stage stuck in `in_progress` as failed.
    ///
    /// For runs abandoned by a crashed process. A run still active in this
    /// desk holds the project, so the call is rejected as busy; use
    /// [`Desk::cancel_stage`] for those.
    pub fn mark_stage_failed(&self, id: &str, stage: &str, reason: &str) -> Result<WorkflowState> {
        let stage: StageId = stage.parse()?;
        self.require_project(id)?;
        self.exclusive(id, || {
            let mut workflow = self.storage.load_workflow(id)?;
            workflow.fail(stage, reason)?;
            self.storage.save_workflow(id, &workflow)?;
            self.note(id, HistoryEvent::StageFailed, Some(stage), Some(reason));
            tracing::warn!(project = id, %stage, reason, "stage marked failed");
            Ok(workflow)
        })
    }

    /// Asks the stage running on a project to stop.
    ///
    /// Does not wait and does not take the project's section, so it reaches
    /// a run in this desk or in another process. The run ends with
    /// [`AgentError::Cancelled`] and the stage is marked failed. Returns the
    /// stage that was asked to stop.
    pub fn cancel_stage(&self, id: &str) -> Result<StageId> {
        let workflow = self.get_status(id)?;
        let stage = workflow
            .stages()
            .find(|(_, status)| *status == StageStatus::InProgress)
            .map(|(stage, _)| stage)
            .ok_or_else(|| DeskError::NothingRunning(id.to_string()))?;
        self.storage.request_cancel(id)?;
        tracing::info!(project = id, %stage, "cancel requested");
        Ok(stage)
    }

    /// Changes a project's title.
    pub fn rename_project(&self, id: &str, title: &str) -> Result<Manuscript> {
        self.require_project(id)?;
        self.exclusive(id, || {
            let old = self.storage.load_manuscript(id)?.title;
            self.storage.rename_project(id, title)?;
            let detail = format!("{old} -> {title}");
            self.note(id, HistoryEvent::Renamed, None, Some(&detail));
            tracing::info!(project = id, title, "project renamed");
            Ok(self.storage.load_manuscript(id)?)
        })
    }

    /// Copies a project under a fresh id, titled `"<title> (Copy)"`.
    pub fn duplicate_project(&self, id: &str) -> Result<Project> {
        self.require_project(id)?;
        self.exclusive(id, || {
            let copy = self
                .storage
                .duplicate_project(id, &Uuid::new_v4().to_string())?;
            tracing::info!(project = id, copy = copy.id(), "project duplicated");
            Ok(copy)
        })
    }

    /// Line diff between two stored versions, e.g. `original` and `current`.
    pub fn compare_versions(&self, id: &str, old: &str, new: &str) -> Result<Vec<DiffLine>> {
        let old = self.storage.load_version(id, old)?;
        let new = self.storage.load_version(id, new)?;
        Ok(diff_lines(&old, &new))
    }

    /// The project's event ledger, oldest first.
    pub fn history(&self, id: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self.storage.load_history(id)?)
    }

    fn note(
        &self,
        id: &str,
        event: HistoryEvent,
        stage: Option<StageId>,
        detail: Option<&str>,
    ) {
        if let Err(e) = self.storage.record_history(id, event, stage, detail) {
            tracing::warn!(project = id, %event, error = %e, "history write failed");
        }
    }

    fn require_project(&self, id: &str) -> Result<()> {
        if self.storage.project_exists(id) {
            Ok(())
        } else {
            Err(DeskError::ProjectNotFound(id.to_string()))
        }
    }

    fn agent(&self) -> Result<&dyn EditorialAgent> {
        self.agent.as_deref().ok_or(DeskError::NoAgent)
    }

    /// Runs `f` inside the project's exclusive section.
    fn exclusive<T>(&self, id: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let section = self.locks.section(id);
        let result = match section.try_lock() {
            Ok(_guard) => f(),
            Err(TryLockError::WouldBlock) => {
                tracing::debug!(project = id, "project busy");
                Err(DeskError::ProjectBusy(id.to_string()))
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                let _guard = poisoned.into_inner();
                f()
            }
        };
        drop(section);
        self.locks.release(id);
        result
    }
}

/// Calls the agent and checks the report has the shape the stage produces.
fn analyze(
    agent: &dyn EditorialAgent,
    request: &AgentRequest<'_>,
) -> core::result::Result<StageReport, AgentError> {
    let report = agent.analyze(request)?;
    if request.cancel.is_cancelled() {
        return Err(AgentError::Cancelled);
    }
    if report.fits(request.stage) {
        Ok(report)
    } else {
        let expected = if request.stage.produces_letter() {
            "an editorial letter"
        } else {
            "an issue list"
        };
        Err(AgentError::Malformed(format!(
            "{} must produce {expected}",
            request.stage
        )))
    }
}

/// Picks issues by zero-based index; no indices means all of them.
fn select_issues(stage: StageId, issues: &[Issue], indices: &[usize]) -> Result<Vec<Issue>> {
    if issues.is_empty() {
        return Err(DeskError::NothingToFix(stage));
    }
    if indices.is_empty() {
        return Ok(issues.to_vec());
    }
    indices
        .iter()
        .map(|&index| {
            issues
                .get(index)
                .cloned()
                .ok_or(DeskError::IssueOutOfRange {
                    stage,
                    index,
                    count: issues.len(),
                })
        })
        .collect()
}
