//! Project storage: create, load, and list projects.

use std::{collections::BTreeMap, fs, io, path::Path};

use jiff::Timestamp;

use crate::model::{
    HistoryEvent, Manuscript, Project, ProjectMeta, ProjectSummary, SeriesBible, StageId,
    WorkflowState, word_count,
};

use super::{
    BIBLE_FILE, BIBLE_VERSIONS_DIR, MANUSCRIPT_DIR, PROJECT_FILE, REPORTS_DIR, Result, Storage,
    StorageError, VERSIONS_DIR, WORKFLOW_FILE, history, read_json, read_text, validate_name,
    write_atomic, write_json,
};

impl Storage {
    /// Creates a new project with every stage `not_started`.
    ///
    /// The project is assembled in a hidden staging directory and renamed
    /// into place, so a half-created project is never visible.
    pub fn create_project(&self, id: &str, title: &str, text: &str) -> Result<Project> {
        validate_name(id)?;
        let dir = self.project_dir(id);
        if dir.exists() {
            return Err(StorageError::ProjectAlreadyExists(id.to_string()));
        }

        let now = Timestamp::now();
        let manuscript = Manuscript {
            id: id.to_string(),
            title: title.to_string(),
            original_text: text.to_string(),
            current_text: text.to_string(),
            word_count: word_count(text),
            created_at: now,
            last_modified: now,
        };
        let workflow = WorkflowState::new();
        let bible = SeriesBible::default();

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.root)?;
        populate(staging.path(), &manuscript, &workflow, &bible)?;
        move_into_place(staging.path(), &dir, id)?;

        tracing::debug!(project = id, words = manuscript.word_count, "project created");
        Ok(Project {
            manuscript,
            workflow,
            bible,
            versions: BTreeMap::new(),
            reports: BTreeMap::new(),
        })
    }

    /// Copies a project and everything it holds under a new id.
    ///
    /// The copy is titled `"<title> (Copy)"` and gets fresh timestamps; its
    /// history continues the source's with a `duplicated` entry. Like
    /// creation, the copy is staged and renamed into place.
    pub fn duplicate_project(&self, source: &str, id: &str) -> Result<Project> {
        let source_dir = self.existing_project_dir(source)?;
        validate_name(id)?;
        let dir = self.project_dir(id);
        if dir.exists() {
            return Err(StorageError::ProjectAlreadyExists(id.to_string()));
        }

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.root)?;
        copy_tree(&source_dir, staging.path())?;

        let meta_path = staging.path().join(PROJECT_FILE);
        let mut meta: ProjectMeta = read_json(&meta_path)?
            .ok_or_else(|| StorageError::Corrupt(format!("{source}: missing metadata")))?;
        let now = Timestamp::now();
        meta.id = id.to_string();
        meta.title = format!("{} (Copy)", meta.title);
        meta.created_at = now;
        meta.last_modified = now;
        write_json(&meta_path, &meta)?;
        {
            let conn = history::open_ledger(staging.path())?;
            history::append(&conn, HistoryEvent::Duplicated, None, Some(source))?;
        }

        move_into_place(staging.path(), &dir, id)?;
        tracing::debug!(project = id, source, "project duplicated");
        self.load_project(id)?
            .ok_or_else(|| StorageError::ProjectNotFound(id.to_string()))
    }

    /// Changes a project's title.
    pub fn rename_project(&self, id: &str, title: &str) -> Result<ProjectMeta> {
        let dir = self.existing_project_dir(id)?;
        let path = dir.join(PROJECT_FILE);
        let mut meta: ProjectMeta = read_json(&path)?
            .ok_or_else(|| StorageError::ProjectNotFound(id.to_string()))?;
        meta.title = title.to_string();
        meta.last_modified = Timestamp::now();
        write_json(&path, &meta)?;
        Ok(meta)
    }

    /// Loads the full project aggregate.
    ///
    /// Returns `None` when no such project exists.
    pub fn load_project(&self, id: &str) -> Result<Option<Project>> {
        if !self.project_exists(id) {
            return Ok(None);
        }
        let manuscript = self.load_manuscript(id)?;
        let workflow = self.load_workflow(id)?;
        let bible = self.load_bible(id)?;
        let versions = self.load_versions(id)?;

        let mut reports = BTreeMap::new();
        for stage in StageId::ALL {
            if let Some(report) = self.load_stage_report(id, stage)? {
                reports.insert(stage, report);
            }
        }

        Ok(Some(Project {
            manuscript,
            workflow,
            bible,
            versions,
            reports,
        }))
    }

    /// Loads the manuscript: metadata plus original and current text.
    pub fn load_manuscript(&self, id: &str) -> Result<Manuscript> {
        let dir = self.existing_project_dir(id)?;
        let meta: ProjectMeta = read_json(&dir.join(PROJECT_FILE))?
            .ok_or_else(|| StorageError::ProjectNotFound(id.to_string()))?;
        let texts = dir.join(MANUSCRIPT_DIR);
        let original_text = read_text(&texts.join("original.txt"))?
            .ok_or_else(|| StorageError::Corrupt(format!("{id}: missing original text")))?;
        let current_text = read_text(&texts.join("current.txt"))?
            .ok_or_else(|| StorageError::Corrupt(format!("{id}: missing current text")))?;

        Ok(Manuscript {
            id: meta.id,
            title: meta.title,
            original_text,
            current_text,
            word_count: meta.word_count,
            created_at: meta.created_at,
            last_modified: meta.last_modified,
        })
    }

    /// Lists project summaries by reading each project directory.
    ///
    /// Lazy and unordered. Staging directories and directories without
    /// `project.json` are skipped.
    pub fn list_projects(&self) -> Result<impl Iterator<Item = Result<ProjectSummary>>> {
        let entries = fs::read_dir(&self.root)?;
        Ok(entries.filter_map(|entry| {
            entry
                .map_err(StorageError::from)
                .and_then(|entry| {
                    if entry.file_name().to_string_lossy().starts_with('.') {
                        return Ok(None);
                    }
                    summarize(&entry.path())
                })
                .transpose()
        }))
    }
}

/// Renames a fully written staging directory to its final place.
fn move_into_place(staging: &Path, dir: &Path, id: &str) -> Result<()> {
    match fs::rename(staging, dir) {
        Ok(()) => Ok(()),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::AlreadyExists | io::ErrorKind::DirectoryNotEmpty
            ) =>
        {
            Err(StorageError::ProjectAlreadyExists(id.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Recursively copies `from` into the existing directory `to`, skipping
/// dot-files (temp files, cancel markers).
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&target)?;
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Writes the initial files of a project into `dir`.
fn populate(
    dir: &Path,
    manuscript: &Manuscript,
    workflow: &WorkflowState,
    bible: &SeriesBible,
) -> Result<()> {
    let texts = dir.join(MANUSCRIPT_DIR);
    fs::create_dir_all(texts.join(VERSIONS_DIR))?;
    fs::create_dir_all(dir.join(REPORTS_DIR))?;
    fs::create_dir_all(dir.join(BIBLE_VERSIONS_DIR))?;

    write_atomic(
        &texts.join("original.txt"),
        manuscript.original_text.as_bytes(),
    )?;
    write_atomic(&texts.join("current.txt"), manuscript.current_text.as_bytes())?;
    write_json(&dir.join(BIBLE_FILE), bible)?;
    write_json(&dir.join(WORKFLOW_FILE), workflow)?;

    {
        let conn = history::open_ledger(dir)?;
        history::append(&conn, HistoryEvent::Created, None, Some(&manuscript.title))?;
    }

    // Written last: its presence is what makes the directory a project.
    let meta = ProjectMeta {
        id: manuscript.id.clone(),
        title: manuscript.title.clone(),
        word_count: manuscript.word_count,
        created_at: manuscript.created_at,
        last_modified: manuscript.last_modified,
    };
    write_json(&dir.join(PROJECT_FILE), &meta)
}

/// Reads the listing row for one project directory.
fn summarize(dir: &Path) -> Result<Option<ProjectSummary>> {
    let Some(meta) = read_json::<ProjectMeta>(&dir.join(PROJECT_FILE))? else {
        return Ok(None);
    };
    let workflow: WorkflowState = read_json(&dir.join(WORKFLOW_FILE))?
        .ok_or_else(|| StorageError::Corrupt(format!("{}: missing workflow", meta.id)))?;
    Ok(Some(ProjectSummary {
        id: meta.id,
        title: meta.title,
        current_stage: workflow.current_stage,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::model::{CurrentStage, StageStatus};

    fn test_storage() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("projects")).unwrap();
        (dir, storage)
    }

    #[test]
    fn create_and_load_project() {
        let (_dir, storage) = test_storage();

        storage.create_project("m1", "Title", "Hello world").unwrap();
        let project = storage.load_project("m1").unwrap().unwrap();

        assert_eq!(project.manuscript.original_text, "Hello world");
        assert_eq!(project.manuscript.current_text, "Hello world");
        assert_eq!(project.manuscript.title, "Title");
        assert_eq!(project.manuscript.word_count, 2);
        assert_eq!(project.workflow.stages().count(), 6);
        assert!(
            project
                .workflow
                .stages()
                .all(|(_, status)| status == StageStatus::NotStarted)
        );
        assert!(project.reports.is_empty());
        assert!(project.versions.is_empty());
        assert!(project.bible.is_empty());
    }

    #[test]
    fn create_duplicate_project_fails() {
        let (_dir, storage) = test_storage();

        storage.create_project("m1", "Title", "Hello").unwrap();
        let err = storage.create_project("m1", "Other", "Bye").unwrap_err();

        assert!(matches!(err, StorageError::ProjectAlreadyExists(_)));
        let project = storage.load_project("m1").unwrap().unwrap();
        assert_eq!(project.manuscript.title, "Title");
    }

    #[test]
    fn create_leaves_no_staging_directory_behind() {
        let (_dir, storage) = test_storage();
        storage.create_project("m1", "Title", "Hello").unwrap();

        let names: Vec<String> = fs::read_dir(storage.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["m1"]);
    }

    #[test]
    fn create_rejects_ids_that_are_not_path_components() {
        let (_dir, storage) = test_storage();
        let err = storage.create_project("../escape", "T", "x").unwrap_err();
        assert!(matches!(err, StorageError::InvalidName(_)));
    }

    #[test]
    fn load_nonexistent_project_is_none() {
        let (_dir, storage) = test_storage();
        assert!(storage.load_project("missing").unwrap().is_none());
        assert!(storage.load_project("../etc").unwrap().is_none());
    }

    #[test]
    fn list_projects_empty() {
        let (_dir, storage) = test_storage();
        assert_eq!(storage.list_projects().unwrap().count(), 0);
    }

    #[test]
    fn list_projects_summarizes_each_and_skips_staging() {
        let (_dir, storage) = test_storage();
        storage.create_project("a", "First", "one").unwrap();
        storage.create_project("b", "Second", "two").unwrap();
        fs::create_dir(storage.root().join(".staging-abandoned")).unwrap();
        fs::create_dir(storage.root().join("stray")).unwrap();

        let mut summaries: Vec<ProjectSummary> = storage
            .list_projects()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        summaries.sort_by(|x, y| x.id.cmp(&y.id));

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].title, "First");
        assert_eq!(
            summaries[1].current_stage,
            CurrentStage::Stage(StageId::Acquisitions)
        );
    }

    #[test]
    fn duplicate_copies_everything_under_a_new_title() {
        let (_dir, storage) = test_storage();
        storage.create_project("m1", "Title", "Hello world").unwrap();
        storage.save_manuscript_version("m1", "line", "Hello, world").unwrap();
        let mut workflow = storage.load_workflow("m1").unwrap();
        workflow.begin(StageId::Acquisitions).unwrap();
        workflow.complete(StageId::Acquisitions, 0).unwrap();
        storage.save_workflow("m1", &workflow).unwrap();

        let copy = storage.duplicate_project("m1", "m2").unwrap();

        assert_eq!(copy.id(), "m2");
        assert_eq!(copy.manuscript.title, "Title (Copy)");
        assert_eq!(copy.manuscript.original_text, "Hello world");
        assert_eq!(copy.manuscript.current_text, "Hello, world");
        assert_eq!(copy.versions["line"], "Hello, world");
        assert_eq!(copy.workflow, workflow);

        let source = storage.load_project("m1").unwrap().unwrap();
        assert_eq!(source.manuscript.title, "Title");
        let history = storage.load_history("m2").unwrap();
        assert_eq!(history.last().unwrap().event, HistoryEvent::Duplicated);
        assert_eq!(history.last().unwrap().detail.as_deref(), Some("m1"));
        assert_eq!(storage.load_history("m1").unwrap().len(), 1);
    }

    #[test]
    fn duplicate_rejects_missing_source_and_taken_id() {
        let (_dir, storage) = test_storage();
        storage.create_project("m1", "Title", "text").unwrap();
        storage.create_project("m2", "Other", "text").unwrap();

        assert!(matches!(
            storage.duplicate_project("missing", "m3"),
            Err(StorageError::ProjectNotFound(_))
        ));
        assert!(matches!(
            storage.duplicate_project("m1", "m2"),
            Err(StorageError::ProjectAlreadyExists(_))
        ));
        let names: Vec<String> = fs::read_dir(storage.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with('.'))
            .collect();
        assert!(names.is_empty());
    }

    #[test]
    fn rename_changes_only_the_title() {
        let (_dir, storage) = test_storage();
        storage.create_project("m1", "Draft", "Hello world").unwrap();
        let before = storage.load_manuscript("m1").unwrap();

        let meta = storage.rename_project("m1", "The Salt Road").unwrap();

        assert_eq!(meta.title, "The Salt Road");
        let after = storage.load_manuscript("m1").unwrap();
        assert_eq!(after.title, "The Salt Road");
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.current_text, before.current_text);
        assert!(matches!(
            storage.rename_project("missing", "x"),
            Err(StorageError::ProjectNotFound(_))
        ));
    }
}
