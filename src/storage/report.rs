//! Stage report storage: one JSON file per stage, last write wins.

use crate::model::{StageId, StageReport};

use super::{REPORTS_DIR, Result, Storage, read_json, write_json};

impl Storage {
    /// Persists a stage's report, replacing any earlier one.
    pub fn save_stage_report(&self, id: &str, stage: StageId, report: &StageReport) -> Result<()> {
        let dir = self.existing_project_dir(id)?;
        write_json(
            &dir.join(REPORTS_DIR).join(format!("{stage}.json")),
            report,
        )
    }

    /// Loads a stage's report, or `None` if the stage never produced one.
    pub fn load_stage_report(&self, id: &str, stage: StageId) -> Result<Option<StageReport>> {
        let dir = self.existing_project_dir(id)?;
        read_json(&dir.join(REPORTS_DIR).join(format!("{stage}.json")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::model::{Issue, Severity};
    use crate::storage::StorageError;

    fn test_storage() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("projects")).unwrap();
        storage.create_project("m1", "Title", "text").unwrap();
        (dir, storage)
    }

    fn sample_issue() -> Issue {
        Issue {
            category: "syntax".into(),
            severity: Severity::Minor,
            location: "Chapter 1, paragraph 2".into(),
            description: "Run-on sentence.".into(),
            suggestion: "Split after the second clause.".into(),
        }
    }

    #[test]
    fn save_and_load_report() {
        let (_dir, storage) = test_storage();
        let report = StageReport::issues(vec![sample_issue()]);

        storage.save_stage_report("m1", StageId::Line, &report).unwrap();

        assert_eq!(
            storage.load_stage_report("m1", StageId::Line).unwrap(),
            Some(report)
        );
        assert!(storage.load_stage_report("m1", StageId::Copy).unwrap().is_none());
    }

    #[test]
    fn rerun_replaces_report() {
        let (_dir, storage) = test_storage();
        storage
            .save_stage_report("m1", StageId::Acquisitions, &StageReport::letter("first"))
            .unwrap();
        storage
            .save_stage_report("m1", StageId::Acquisitions, &StageReport::letter("second"))
            .unwrap();

        assert_eq!(
            storage.load_stage_report("m1", StageId::Acquisitions).unwrap(),
            Some(StageReport::letter("second"))
        );
    }

    #[test]
    fn report_for_nonexistent_project_fails() {
        let (_dir, storage) = test_storage();
        assert!(matches!(
            storage.load_stage_report("missing", StageId::Line),
            Err(StorageError::ProjectNotFound(_))
        ));
    }
}
