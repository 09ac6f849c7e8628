//! Stage reports: an editorial letter or an ordered list of issues.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::stage::StageId;

/// How serious an issue is.
///
/// Declared most-severe first so sorting puts critical issues on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    pub const ALL: [Self; 3] = [Self::Critical, Self::Major, Self::Minor];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Major => "major",
            Self::Minor => "minor",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discrete finding from a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Free-form tag, e.g. `voice`, `plot`, `syntax`, `house_style`.
    pub category: String,
    pub severity: Severity,
    /// Free-text locator, e.g. "Chapter 3, paragraph 5".
    pub location: String,
    pub description: String,
    pub suggestion: String,
}

/// What a stage produced.
///
/// Persisted untagged: `{"letter": ...}` or `{"issues": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageReport {
    /// The acquisitions stage's free-text assessment.
    Letter { letter: String },

    /// Findings in the order the agent returned them.
    Issues { issues: Vec<Issue> },
}

impl StageReport {
    #[must_use]
    pub fn letter(text: impl Into<String>) -> Self {
        Self::Letter {
            letter: text.into(),
        }
    }

    #[must_use]
    pub fn issues(issues: Vec<Issue>) -> Self {
        Self::Issues { issues }
    }

    /// The issue list; empty for a letter.
    #[must_use]
    pub fn issue_list(&self) -> &[Issue] {
        match self {
            Self::Letter { .. } => &[],
            Self::Issues { issues } => issues,
        }
    }

    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.issue_list().len()
    }

    /// Whether this is the report shape `stage` is expected to produce.
    #[must_use]
    pub fn fits(&self, stage: StageId) -> bool {
        matches!(self, Self::Letter { .. }) == stage.produces_letter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(severity: Severity) -> Issue {
        Issue {
            category: "pacing".into(),
            severity,
            location: "Chapter 2".into(),
            description: "The middle sags.".into(),
            suggestion: "Cut the second flashback.".into(),
        }
    }

    #[test]
    fn reports_use_the_persisted_shapes() {
        let letter = serde_json::to_value(StageReport::letter("Strong debut.")).unwrap();
        assert_eq!(letter, serde_json::json!({ "letter": "Strong debut." }));

        let issues = serde_json::to_value(StageReport::issues(vec![issue(Severity::Major)])).unwrap();
        assert_eq!(issues["issues"][0]["severity"], "major");
        assert_eq!(issues["issues"][0]["category"], "pacing");
    }

    #[test]
    fn untagged_report_reads_back_either_shape() {
        let report: StageReport = serde_json::from_str(r#"{"letter": "ok"}"#).unwrap();
        assert_eq!(report, StageReport::letter("ok"));

        let report: StageReport = serde_json::from_str(r#"{"issues": []}"#).unwrap();
        assert_eq!(report, StageReport::issues(vec![]));

        assert!(serde_json::from_str::<StageReport>(r#"{"verdict": "ok"}"#).is_err());
    }

    #[test]
    fn shape_must_match_stage() {
        assert!(StageReport::letter("x").fits(StageId::Acquisitions));
        assert!(!StageReport::letter("x").fits(StageId::Line));
        assert!(StageReport::issues(vec![]).fits(StageId::ColdRead));
        assert!(!StageReport::issues(vec![]).fits(StageId::Acquisitions));
    }

    #[test]
    fn critical_sorts_first() {
        let mut severities = vec![Severity::Minor, Severity::Critical, Severity::Major];
        severities.sort();
        assert_eq!(severities, Severity::ALL);
    }
}
