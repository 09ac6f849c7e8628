//! The consolidated report: every completed stage's report plus the bible.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{
    CurrentStage, EntityKind, Project, SeriesBible, Severity, StageId, StageReport,
};

/// All completed stage reports for a project, in pipeline order.
///
/// Stages that have not completed are absent, so the key set shows how far
/// the pipeline has come.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidatedReport {
    pub project_id: String,
    pub title: String,
    pub current_stage: CurrentStage,
    pub stages: BTreeMap<StageId, StageReport>,
    pub bible: SeriesBible,
}

impl ConsolidatedReport {
    #[must_use]
    pub fn from_project(project: &Project) -> Self {
        let stages = project
            .workflow
            .completed_stages()
            .filter_map(|stage| {
                project
                    .reports
                    .get(&stage)
                    .map(|report| (stage, report.clone()))
            })
            .collect();

        Self {
            project_id: project.id().to_string(),
            title: project.manuscript.title.clone(),
            current_stage: project.workflow.current_stage,
            stages,
            bible: project.bible.clone(),
        }
    }

    /// Total issues across the included reports.
    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.stages.values().map(StageReport::issue_count).sum()
    }

    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            format!("# Editorial Report: {}", self.title),
            String::new(),
            format!("- Project: `{}`", self.project_id),
            format!("- Next stage: {}", self.current_stage),
            format!("- Issues: {}", self.issue_count()),
        ];

        for (stage, report) in &self.stages {
            lines.push(String::new());
            lines.push(render_stage(*stage, report));
        }

        if !self.bible.is_empty() {
            lines.push(String::new());
            lines.push("## Series Bible".to_string());
            for kind in EntityKind::ALL {
                let entities = self.bible.entities(kind);
                if entities.is_empty() {
                    continue;
                }
                lines.push(String::new());
                lines.push(format!("### {} ({})", capitalize(kind.as_str()), entities.len()));
                for entity in entities {
                    lines.push(format!("- {}", entity.name));
                }
            }
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

/// Renders one stage report as a markdown section.
///
/// Issues are grouped by severity, critical first, keeping the agent's
/// order within each group. Each issue is numbered by its 1-based position
/// in the agent's list, the number `fixes --issue` takes.
#[must_use]
pub fn render_stage(stage: StageId, report: &StageReport) -> String {
    let mut lines = vec![format!("## {}", stage.title())];

    match report {
        StageReport::Letter { letter } => {
            lines.push(String::new());
            lines.push(letter.trim().to_string());
        }
        StageReport::Issues { issues } if issues.is_empty() => {
            lines.push(String::new());
            lines.push("No issues found.".to_string());
        }
        StageReport::Issues { issues } => {
            for severity in Severity::ALL {
                let group: Vec<_> = (1_usize..)
                    .zip(issues)
                    .filter(|(_, i)| i.severity == severity)
                    .collect();
                if group.is_empty() {
                    continue;
                }
                lines.push(String::new());
                lines.push(format!(
                    "### {} ({})",
                    capitalize(severity.as_str()),
                    group.len()
                ));
                for (number, issue) in group {
                    lines.push(format!(
                        "{number}. **{}** at {}: {}",
                        issue.category, issue.location, issue.description
                    ));
                    if !issue.suggestion.is_empty() {
                        lines.push(format!("   - Suggestion: {}", issue.suggestion));
                    }
                }
            }
        }
    }

    lines.join("\n")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::Timestamp;

    use crate::model::{Entity, Issue, Manuscript, WorkflowState};

    fn issue(severity: Severity, description: &str) -> Issue {
        Issue {
            category: "plot".into(),
            severity,
            location: "Chapter 4".into(),
            description: description.into(),
            suggestion: String::new(),
        }
    }

    fn sample_project() -> Project {
        let now = Timestamp::now();
        Project {
            manuscript: Manuscript {
                id: "m1".into(),
                title: "The Salt Road".into(),
                original_text: "text".into(),
                current_text: "text".into(),
                word_count: 1,
                created_at: now,
                last_modified: now,
            },
            workflow: WorkflowState::new(),
            bible: SeriesBible::default(),
            versions: BTreeMap::new(),
            reports: BTreeMap::new(),
        }
    }

    fn complete(project: &mut Project, stage: StageId, report: StageReport) {
        project.workflow.begin(stage).unwrap();
        project.workflow.complete(stage, report.issue_count()).unwrap();
        project.reports.insert(stage, report);
    }

    #[test]
    fn only_completed_stages_are_included() {
        let mut project = sample_project();
        complete(&mut project, StageId::Acquisitions, StageReport::letter("Promising."));
        // A report left behind by a run that later failed.
        project.workflow.begin(StageId::Developmental).unwrap();
        project.workflow.fail(StageId::Developmental, "timeout").unwrap();
        project
            .reports
            .insert(StageId::Developmental, StageReport::issues(vec![]));

        let report = ConsolidatedReport::from_project(&project);

        assert_eq!(
            report.stages.keys().copied().collect::<Vec<_>>(),
            vec![StageId::Acquisitions]
        );
        assert_eq!(
            report.current_stage,
            CurrentStage::Stage(StageId::Developmental)
        );
    }

    #[test]
    fn empty_project_yields_partial_report_not_error() {
        let report = ConsolidatedReport::from_project(&sample_project());
        assert!(report.stages.is_empty());
        assert_eq!(report.issue_count(), 0);
        assert!(report.to_markdown().starts_with("# Editorial Report: The Salt Road\n"));
    }

    #[test]
    fn serializes_stage_keys_by_id() {
        let mut project = sample_project();
        complete(&mut project, StageId::Acquisitions, StageReport::letter("ok"));

        let json = serde_json::to_value(ConsolidatedReport::from_project(&project)).unwrap();

        assert_eq!(json["stages"]["acquisitions"]["letter"], "ok");
        assert_eq!(json["current_stage"], "developmental");
        assert_eq!(json["bible"]["characters"], serde_json::json!([]));
    }

    #[test]
    fn stage_markdown_groups_issues_by_severity() {
        let report = StageReport::issues(vec![
            issue(Severity::Minor, "Typo"),
            issue(Severity::Critical, "Dead character reappears"),
            issue(Severity::Minor, "Comma splice"),
        ]);

        let md = render_stage(StageId::Line, &report);

        let critical = md.find("### Critical (1)").unwrap();
        let minor = md.find("### Minor (2)").unwrap();
        assert!(critical < minor);
        assert!(!md.contains("### Major"));
        assert!(md.find("Typo").unwrap() < md.find("Comma splice").unwrap());
    }

    #[test]
    fn issues_keep_their_agent_order_number() {
        let report = StageReport::issues(vec![
            issue(Severity::Minor, "Typo"),
            issue(Severity::Critical, "Dead character reappears"),
        ]);

        let md = render_stage(StageId::Line, &report);

        let critical = md.lines().find(|l| l.contains("Dead character")).unwrap();
        assert!(critical.starts_with("2. "), "{critical}");
        let minor = md.lines().find(|l| l.contains("Typo")).unwrap();
        assert!(minor.starts_with("1. "), "{minor}");
    }

    #[test]
    fn markdown_lists_bible_entities() {
        let mut project = sample_project();
        project.bible.characters.push(Entity::new("Mara"));

        let md = ConsolidatedReport::from_project(&project).to_markdown();

        assert!(md.contains("## Series Bible"));
        assert!(md.contains("### Character (1)\n- Mara"));
    }
}
