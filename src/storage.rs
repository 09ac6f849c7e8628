//! Local persistence for editorial projects.
//!
//! Each project lives in its own directory under the storage root:
//!
//! ```text
//! <root>/<id>/
//!   project.json                  # id, title, word count, timestamps
//!   manuscript/original.txt       # as uploaded, never rewritten
//!   manuscript/current.txt        # latest accepted text
//!   manuscript/versions/<label>.txt
//!   reports/<stage>.json          # {"letter": ...} or {"issues": [...]}
//!   bible.json                    # the current Series Bible
//!   bible_versions/<n>.json       # replaced bibles, numbered from 1
//!   workflow.json                 # current stage and per-stage status
//!   history.sqlite                # append-only run ledger
//!   .cancel                       # present while a cancel is pending
//! ```
//!
//! Every file is replaced atomically: written to a temp file in the same
//! directory, synced, then renamed over the target. A reader sees the old
//! value or the new one, never a torn write.

mod bible;
mod history;
mod manuscript;
mod project;
mod report;
mod workflow;

pub use manuscript::{CURRENT, ORIGINAL};

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};
use tempfile::NamedTempFile;

const PROJECT_FILE: &str = "project.json";
const MANUSCRIPT_DIR: &str = "manuscript";
const VERSIONS_DIR: &str = "versions";
const REPORTS_DIR: &str = "reports";
const BIBLE_FILE: &str = "bible.json";
const BIBLE_VERSIONS_DIR: &str = "bible_versions";
const WORKFLOW_FILE: &str = "workflow.json";
const HISTORY_FILE: &str = "history.sqlite";
const CANCEL_FILE: &str = ".cancel";

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("project already exists: {0}")]
    ProjectAlreadyExists(String),

    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("version not found: {0}")]
    VersionNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt project data: {0}")]
    Corrupt(String),
}

pub type Result<T> = core::result::Result<T, StorageError>;

/// Local file-based storage for editorial projects.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Creates a new storage instance rooted at the given directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Returns the default storage root: `~/.editdesk/projects/`.
    #[must_use]
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".editdesk").join("projects"))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a project with this id exists.
    #[must_use]
    pub fn project_exists(&self, id: &str) -> bool {
        validate_name(id).is_ok() && self.project_dir(id).join(PROJECT_FILE).is_file()
    }

    fn project_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// The directory of an existing project.
    ///
    /// Ids that could never name a project directory are reported as not found.
    fn existing_project_dir(&self, id: &str) -> Result<PathBuf> {
        if self.project_exists(id) {
            Ok(self.project_dir(id))
        } else {
            Err(StorageError::ProjectNotFound(id.to_string()))
        }
    }
}

/// Checks that `name` is usable as a single path component.
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 200
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

/// Replaces `path` with `bytes` via temp file, fsync, and rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| StorageError::Corrupt(format!("no parent for {}", path.display())))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes())
}

/// Reads and parses a JSON file. A missing file is `None`.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_text(path)? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Reads a UTF-8 file. A missing file is `None`.
fn read_text(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn atomic_write_replaces_contents_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("unit.txt");

        write_atomic(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["unit.txt"]);
    }

    #[test]
    fn read_helpers_treat_missing_files_as_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");

        assert!(read_text(&path).unwrap().is_none());
        assert!(read_json::<serde_json::Value>(&path).unwrap().is_none());
    }

    #[test]
    fn names_must_be_single_visible_path_components() {
        assert!(validate_name("m1").is_ok());
        assert!(validate_name("line_fixes_applied").is_ok());
        for bad in ["", ".hidden", "..", "a/b", "a\\b"] {
            assert!(
                matches!(validate_name(bad), Err(StorageError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
