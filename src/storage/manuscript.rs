//! Manuscript storage: current text, labeled versions, and restore.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use jiff::Timestamp;

use crate::model::{ProjectMeta, VersionInfo, text_digest, word_count};

use super::{
    MANUSCRIPT_DIR, PROJECT_FILE, Result, Storage, StorageError, VERSIONS_DIR, read_json,
    read_text, validate_name, write_atomic, write_json,
};

/// The uploaded text. Always present, never rewritten.
pub const ORIGINAL: &str = "original";
/// The latest accepted text.
pub const CURRENT: &str = "current";

impl Storage {
    /// Stores `text` under `label` and makes it the current text.
    ///
    /// An existing version with the same label is replaced.
    pub fn save_manuscript_version(&self, id: &str, label: &str, text: &str) -> Result<()> {
        let dir = self.existing_project_dir(id)?;
        validate_label(label)?;
        let texts = dir.join(MANUSCRIPT_DIR);
        write_atomic(
            &texts.join(VERSIONS_DIR).join(format!("{label}.txt")),
            text.as_bytes(),
        )?;
        write_atomic(&texts.join("current.txt"), text.as_bytes())?;
        touch_meta(&dir, text)?;
        tracing::debug!(project = id, label, words = word_count(text), "saved version");
        Ok(())
    }

    /// Loads the current text.
    pub fn load_current_text(&self, id: &str) -> Result<String> {
        self.load_version(id, CURRENT)
    }

    /// Loads a version by label. `original` and `current` are always available.
    pub fn load_version(&self, id: &str, label: &str) -> Result<String> {
        let dir = self.existing_project_dir(id)?;
        let path = version_path(&dir, label)
            .ok_or_else(|| StorageError::VersionNotFound(label.to_string()))?;
        read_text(&path)?.ok_or_else(|| StorageError::VersionNotFound(label.to_string()))
    }

    /// Lists stored versions: `original` first, then labeled versions by age.
    pub fn list_versions(&self, id: &str) -> Result<Vec<VersionInfo>> {
        let dir = self.existing_project_dir(id)?;
        let texts = dir.join(MANUSCRIPT_DIR);
        let mut versions = vec![version_info(ORIGINAL, &texts.join("original.txt"))?];

        let mut labeled = Vec::new();
        for (label, path) in labeled_versions(&texts.join(VERSIONS_DIR))? {
            labeled.push(version_info(&label, &path)?);
        }
        labeled.sort_by(|a, b| {
            a.modified_at
                .cmp(&b.modified_at)
                .then_with(|| a.label.cmp(&b.label))
        });
        versions.extend(labeled);
        Ok(versions)
    }

    /// Makes a stored version the current text.
    ///
    /// The current text is first saved as `pre_restore_<millis>`, so a
    /// restore can itself be undone. A label already taken gets a `_2`, `_3`,
    /// ... suffix. Returns the backup label.
    pub fn restore_version(&self, id: &str, label: &str) -> Result<String> {
        let target = self.load_version(id, label)?;
        let current = self.load_current_text(id)?;
        let dir = self.existing_project_dir(id)?;
        let backup = unused_label(
            &dir.join(MANUSCRIPT_DIR).join(VERSIONS_DIR),
            &format!("pre_restore_{}", Timestamp::now().as_millisecond()),
        );
        self.save_manuscript_version(id, &backup, &current)?;

        write_atomic(
            &dir.join(MANUSCRIPT_DIR).join("current.txt"),
            target.as_bytes(),
        )?;
        touch_meta(&dir, &target)?;
        Ok(backup)
    }

    /// All labeled versions with their text.
    pub(super) fn load_versions(&self, id: &str) -> Result<BTreeMap<String, String>> {
        let dir = self.existing_project_dir(id)?;
        let mut versions = BTreeMap::new();
        for (label, path) in labeled_versions(&dir.join(MANUSCRIPT_DIR).join(VERSIONS_DIR))? {
            if let Some(text) = read_text(&path)? {
                versions.insert(label, text);
            }
        }
        Ok(versions)
    }
}

fn validate_label(label: &str) -> Result<()> {
    validate_name(label)?;
    if label == ORIGINAL || label == CURRENT {
        return Err(StorageError::InvalidName(label.to_string()));
    }
    Ok(())
}

/// `base`, or the first of `base_2`, `base_3`, ... with no stored version.
fn unused_label(versions: &Path, base: &str) -> String {
    let mut label = base.to_string();
    let mut n = 1;
    while versions.join(format!("{label}.txt")).exists() {
        n += 1;
        label = format!("{base}_{n}");
    }
    label
}

fn version_path(dir: &Path, label: &str) -> Option<PathBuf> {
    let texts = dir.join(MANUSCRIPT_DIR);
    match label {
        ORIGINAL => Some(texts.join("original.txt")),
        CURRENT => Some(texts.join("current.txt")),
        _ if validate_name(label).is_ok() => {
            Some(texts.join(VERSIONS_DIR).join(format!("{label}.txt")))
        }
        _ => None,
    }
}

/// `(label, path)` for each `<label>.txt` in the versions directory.
fn labeled_versions(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    if !dir.exists() {
        return Ok(found);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(label) = name.strip_suffix(".txt")
            && !label.starts_with('.')
        {
            found.push((label.to_string(), entry.path()));
        }
    }
    Ok(found)
}

fn version_info(label: &str, path: &Path) -> Result<VersionInfo> {
    let text = read_text(path)?.ok_or_else(|| StorageError::VersionNotFound(label.to_string()))?;
    let modified_at = fs::metadata(path)?
        .modified()
        .ok()
        .and_then(|t| Timestamp::try_from(t).ok());
    Ok(VersionInfo {
        label: label.to_string(),
        bytes: text.len() as u64,
        sha256: text_digest(&text),
        modified_at,
    })
}

/// Refreshes `last_modified` and `word_count` after the current text changes.
fn touch_meta(dir: &Path, text: &str) -> Result<()> {
    let path = dir.join(PROJECT_FILE);
    let mut meta: ProjectMeta = read_json(&path)?
        .ok_or_else(|| StorageError::Corrupt(format!("{}: missing metadata", dir.display())))?;
    meta.word_count = word_count(text);
    meta.last_modified = Timestamp::now();
    write_json(&path, &meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn test_storage() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("projects")).unwrap();
        storage
            .create_project("m1", "Title", "Hello world")
            .unwrap();
        (dir, storage)
    }

    #[test]
    fn saving_a_version_updates_current_text_and_word_count() {
        let (_dir, storage) = test_storage();

        storage
            .save_manuscript_version("m1", "line", "Hello, brave new world")
            .unwrap();

        assert_eq!(storage.load_current_text("m1").unwrap(), "Hello, brave new world");
        assert_eq!(storage.load_version("m1", "line").unwrap(), "Hello, brave new world");
        assert_eq!(storage.load_version("m1", ORIGINAL).unwrap(), "Hello world");
        let manuscript = storage.load_manuscript("m1").unwrap();
        assert_eq!(manuscript.word_count, 4);
        assert!(manuscript.last_modified >= manuscript.created_at);
    }

    #[test]
    fn reserved_and_unsafe_labels_are_rejected() {
        let (_dir, storage) = test_storage();
        for label in [ORIGINAL, CURRENT, "../x", ""] {
            assert!(matches!(
                storage.save_manuscript_version("m1", label, "x"),
                Err(StorageError::InvalidName(_))
            ));
        }
        assert_eq!(storage.load_current_text("m1").unwrap(), "Hello world");
    }

    #[test]
    fn missing_version_is_reported() {
        let (_dir, storage) = test_storage();
        assert!(matches!(
            storage.load_version("m1", "proof"),
            Err(StorageError::VersionNotFound(_))
        ));
        assert!(matches!(
            storage.load_version("m1", "../../etc/passwd"),
            Err(StorageError::VersionNotFound(_))
        ));
    }

    #[test]
    fn list_versions_starts_with_original() {
        let (_dir, storage) = test_storage();
        storage.save_manuscript_version("m1", "line", "a b").unwrap();

        let versions = storage.list_versions("m1").unwrap();
        let labels: Vec<_> = versions.iter().map(|v| v.label.as_str()).collect();
        assert_eq!(labels, vec![ORIGINAL, "line"]);
        assert_eq!(versions[1].bytes, 3);
        assert_eq!(versions[1].sha256, text_digest("a b"));
    }

    #[test]
    fn restore_backs_up_current_text_first() {
        let (_dir, storage) = test_storage();
        storage.save_manuscript_version("m1", "line", "edited").unwrap();

        let backup = storage.restore_version("m1", ORIGINAL).unwrap();

        assert!(backup.starts_with("pre_restore_"));
        assert_eq!(storage.load_current_text("m1").unwrap(), "Hello world");
        assert_eq!(storage.load_version("m1", &backup).unwrap(), "edited");
        assert_eq!(storage.load_manuscript("m1").unwrap().word_count, 2);
    }

    #[test]
    fn restore_missing_version_changes_nothing() {
        let (_dir, storage) = test_storage();
        assert!(storage.restore_version("m1", "nope").is_err());
        assert_eq!(storage.load_current_text("m1").unwrap(), "Hello world");
        assert!(storage.load_versions("m1").unwrap().is_empty());
    }

    #[test]
    fn backup_labels_never_overwrite_an_existing_version() {
        let (dir, storage) = test_storage();
        let versions = dir
            .path()
            .join("projects/m1")
            .join(MANUSCRIPT_DIR)
            .join(VERSIONS_DIR);

        assert_eq!(unused_label(&versions, "pre_restore_1000"), "pre_restore_1000");
        storage
            .save_manuscript_version("m1", "pre_restore_1000", "first")
            .unwrap();
        assert_eq!(unused_label(&versions, "pre_restore_1000"), "pre_restore_1000_2");
        storage
            .save_manuscript_version("m1", "pre_restore_1000_2", "second")
            .unwrap();
        assert_eq!(unused_label(&versions, "pre_restore_1000"), "pre_restore_1000_3");
    }

    #[test]
    fn back_to_back_restores_keep_every_backup() {
        let (_dir, storage) = test_storage();
        storage.save_manuscript_version("m1", "a", "text a").unwrap();

        let mut backups = Vec::new();
        for _ in 0..5 {
            backups.push(storage.restore_version("m1", "a").unwrap());
            backups.push(storage.restore_version("m1", ORIGINAL).unwrap());
        }

        let mut unique = backups.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), backups.len());
    }
}
