//! Output formatting for CLI display.

use std::fmt::Write;

use editdesk::diff::{DiffLine, LineChange};
use editdesk::model::{
    HistoryEntry, ProjectSummary, StageStatus, VersionInfo, WorkflowState,
};

/// One line per project: short id, next stage, title.
pub(super) fn format_summary(summary: &ProjectSummary) -> String {
    let short_id: String = summary.id.chars().take(8).collect();
    format!("{short_id}  [{}]  {}", summary.current_stage, summary.title)
}

/// Per-stage status table with errors and totals.
pub(super) fn format_status(workflow: &WorkflowState) -> String {
    let mut out = String::new();
    for (stage, status) in workflow.stages() {
        let marker = match status {
            StageStatus::NotStarted => " ",
            StageStatus::InProgress => "~",
            StageStatus::Completed => "x",
            StageStatus::Failed => "!",
        };
        let optional = if stage.is_required() { "" } else { " (optional)" };
        let _ = write!(out, "[{marker}] {:<14} {status}{optional}", stage.as_str());
        if let Some(error) = workflow.errors.get(&stage) {
            let _ = write!(out, ": {error}");
        }
        out.push('\n');
    }
    let _ = writeln!(out, "next: {}", workflow.current_stage);
    let _ = writeln!(out, "issues found: {}", workflow.total_issues_found);
    if let Some(started) = workflow.started_at {
        let _ = writeln!(out, "started: {started}");
    }
    if let Some(completed) = workflow.completed_at {
        let _ = writeln!(out, "completed: {completed}");
    }
    out
}

pub(super) fn format_versions(versions: &[VersionInfo]) -> String {
    let mut out = String::new();
    for v in versions {
        let modified = v
            .modified_at
            .map_or_else(|| "-".to_string(), |t| t.to_string());
        let _ = writeln!(
            out,
            "{:<32} {:>9} bytes  {}  {modified}",
            v.label,
            v.bytes,
            &v.sha256[..12.min(v.sha256.len())]
        );
    }
    out
}

pub(super) fn format_history(history: &[HistoryEntry]) -> String {
    let mut out = String::new();
    for entry in history {
        let _ = write!(out, "{:>4}  {}  {}", entry.seq, entry.recorded_at, entry.event);
        if let Some(stage) = entry.stage {
            let _ = write!(out, " {stage}");
        }
        if let Some(detail) = &entry.detail {
            let _ = write!(out, ": {detail}");
        }
        out.push('\n');
    }
    out
}

/// `+`, `-` or a blank before each line, like a unified diff body.
pub(super) fn format_diff(diff: &[DiffLine]) -> String {
    let mut out = String::new();
    for line in diff {
        let sign = match line.change {
            LineChange::Added => '+',
            LineChange::Removed => '-',
            LineChange::Unchanged => ' ',
        };
        let _ = writeln!(out, "{sign} {}", line.content);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use editdesk::model::{CurrentStage, StageId};

    #[test]
    fn summary_uses_short_id() {
        let summary = ProjectSummary {
            id: "a3b0fc12-0000-4000-8000-000000000000".into(),
            title: "The Salt Road".into(),
            current_stage: CurrentStage::Stage(StageId::Line),
        };
        assert_eq!(format_summary(&summary), "a3b0fc12  [line]  The Salt Road");
    }

    #[test]
    fn status_marks_each_stage() {
        let mut workflow = WorkflowState::new();
        workflow.begin(StageId::Acquisitions).unwrap();
        workflow.complete(StageId::Acquisitions, 0).unwrap();
        workflow.begin(StageId::Developmental).unwrap();
        workflow.fail(StageId::Developmental, "timeout").unwrap();

        let out = format_status(&workflow);

        assert!(out.contains("[x] acquisitions"));
        assert!(out.contains("[!] developmental  failed: timeout"));
        assert!(out.contains("[ ] cold_read      not_started (optional)"));
        assert!(out.contains("next: developmental"));
    }

    #[test]
    fn diff_lines_are_prefixed_by_change() {
        let diff = editdesk::diff::diff_lines("keep\nold", "keep\nnew");
        assert_eq!(format_diff(&diff), "  keep\n- old\n+ new\n");
    }
}
