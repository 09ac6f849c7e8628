//! Series Bible storage with an archive of replaced bibles.

use std::fs;

use crate::model::SeriesBible;

use super::{
    BIBLE_FILE, BIBLE_VERSIONS_DIR, Result, Storage, StorageError, read_json, write_json,
};

impl Storage {
    /// Replaces the project's bible.
    ///
    /// A non-empty previous bible is archived first as
    /// `bible_versions/<n>.json`. Returns the archive number, if any.
    pub fn save_bible(&self, id: &str, bible: &SeriesBible) -> Result<Option<u64>> {
        let dir = self.existing_project_dir(id)?;
        let previous = self.load_bible(id)?;

        let archived = if previous.is_empty() {
            None
        } else {
            let versions = dir.join(BIBLE_VERSIONS_DIR);
            fs::create_dir_all(&versions)?;
            let n = self.next_bible_version(id)?;
            write_json(&versions.join(format!("{n}.json")), &previous)?;
            Some(n)
        };

        write_json(&dir.join(BIBLE_FILE), bible)?;
        tracing::debug!(project = id, entities = bible.len(), ?archived, "saved bible");
        Ok(archived)
    }

    /// Loads the project's bible. A project without one has an empty bible.
    pub fn load_bible(&self, id: &str) -> Result<SeriesBible> {
        let dir = self.existing_project_dir(id)?;
        Ok(read_json(&dir.join(BIBLE_FILE))?.unwrap_or_default())
    }

    /// Archived bible numbers, ascending.
    pub fn list_bible_versions(&self, id: &str) -> Result<Vec<u64>> {
        let dir = self.existing_project_dir(id)?.join(BIBLE_VERSIONS_DIR);
        let mut numbers = Vec::new();
        if !dir.exists() {
            return Ok(numbers);
        }
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".json")
                && let Ok(n) = stem.parse::<u64>()
            {
                numbers.push(n);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    /// Loads an archived bible.
    pub fn load_bible_version(&self, id: &str, n: u64) -> Result<SeriesBible> {
        let dir = self.existing_project_dir(id)?;
        read_json(&dir.join(BIBLE_VERSIONS_DIR).join(format!("{n}.json")))?
            .ok_or_else(|| StorageError::VersionNotFound(format!("bible #{n}")))
    }

    /// One past the highest archive number, starting at 1.
    fn next_bible_version(&self, id: &str) -> Result<u64> {
        Ok(self.list_bible_versions(id)?.last().map_or(1, |n| n + 1))
    }
}
